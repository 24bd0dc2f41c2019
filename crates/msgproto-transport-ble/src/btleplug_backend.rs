use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use btleplug::api::{
    Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use futures_util::StreamExt;
use thiserror::Error;
use tokio::sync::{mpsc as tokio_mpsc, oneshot};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::protocol::{
    MESSAGE_PROTOCOL_RX_CHAR_UUID, MESSAGE_PROTOCOL_SERVICE_UUID, MESSAGE_PROTOCOL_TX_CHAR_UUID,
};
use crate::GattLink;

#[derive(Debug, Clone)]
pub struct BtleplugLinkConfig {
    pub scan_interval: Duration,
    pub connect_timeout: Duration,
    /// Upper bound on waiting for the peripheral to confirm a write.
    pub write_timeout: Duration,
    pub command_queue_capacity: usize,
    pub inbound_queue_capacity: usize,
    /// Local name or address of the peripheral to use. When unset, the first
    /// peripheral advertising the message protocol service is used.
    pub device_filter: Option<String>,
}

impl Default for BtleplugLinkConfig {
    fn default() -> Self {
        Self {
            scan_interval: Duration::from_secs(2),
            connect_timeout: Duration::from_secs(6),
            write_timeout: Duration::from_secs(5),
            command_queue_capacity: 64,
            inbound_queue_capacity: 256,
            device_filter: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum BtleplugLinkError {
    #[error("bluetooth worker is not running")]
    WorkerFailed,
    #[error("peripheral is not connected")]
    NotConnected,
    #[error("timed out waiting for a peripheral connection")]
    ConnectTimeout,
    #[error("gatt write failed: {0}")]
    WriteFailed(String),
    #[error("timed out waiting for the write to complete")]
    WriteTimeout,
}

type WriteReply = mpsc::SyncSender<Result<(), String>>;

#[derive(Debug)]
enum LinkCommand {
    Write { bytes: Vec<u8>, reply: WriteReply },
    EnableNotifications,
    DisableNotifications,
}

impl LinkCommand {
    fn reject(self, reason: &str) {
        match self {
            LinkCommand::Write { reply, .. } => {
                let _ = reply.try_send(Err(reason.to_string()));
            }
            other => debug!(command = ?other, reason, "dropping command"),
        }
    }
}

/// Waits for the worker's verdict on one write.
fn await_write(
    reply_rx: &mpsc::Receiver<Result<(), String>>,
    timeout: Duration,
) -> Result<(), BtleplugLinkError> {
    match reply_rx.recv_timeout(timeout) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(reason)) => Err(BtleplugLinkError::WriteFailed(reason)),
        Err(mpsc::RecvTimeoutError::Timeout) => Err(BtleplugLinkError::WriteTimeout),
        Err(mpsc::RecvTimeoutError::Disconnected) => Err(BtleplugLinkError::WorkerFailed),
    }
}

/// GATT link backed by a btleplug worker thread.
///
/// Commands are queued to a current-thread tokio runtime; notification values
/// come back over a bounded std channel.
#[derive(Debug)]
pub struct BtleplugGattLink {
    command_tx: tokio_mpsc::Sender<LinkCommand>,
    inbound_rx: mpsc::Receiver<Vec<u8>>,
    connected: Arc<AtomicBool>,
    dropped: Arc<AtomicU64>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    worker: Option<JoinHandle<()>>,
    connect_timeout: Duration,
    write_timeout: Duration,
}

impl BtleplugGattLink {
    pub fn spawn(config: BtleplugLinkConfig) -> Result<Self, BtleplugLinkError> {
        let (command_tx, command_rx) =
            tokio_mpsc::channel::<LinkCommand>(config.command_queue_capacity);
        let (inbound_tx, inbound_rx) = mpsc::sync_channel::<Vec<u8>>(config.inbound_queue_capacity);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let connected = Arc::new(AtomicBool::new(false));
        let worker_connected = Arc::clone(&connected);
        let dropped = Arc::new(AtomicU64::new(0));
        let worker_dropped = Arc::clone(&dropped);
        let connect_timeout = config.connect_timeout;
        let write_timeout = config.write_timeout;

        let worker = thread::Builder::new()
            .name("msgproto-ble".to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(rt) => rt,
                    Err(err) => {
                        warn!(%err, "failed to start bluetooth runtime");
                        return;
                    }
                };
                runtime.block_on(run_worker(
                    config,
                    command_rx,
                    inbound_tx,
                    worker_connected,
                    worker_dropped,
                    shutdown_rx,
                ));
            })
            .map_err(|_| BtleplugLinkError::WorkerFailed)?;

        Ok(Self {
            command_tx,
            inbound_rx,
            connected,
            dropped,
            shutdown_tx: Some(shutdown_tx),
            worker: Some(worker),
            connect_timeout,
            write_timeout,
        })
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Blocks until the worker has connected and discovered the protocol
    /// characteristics, or the configured connect timeout elapses.
    pub fn wait_connected(&self) -> Result<(), BtleplugLinkError> {
        let deadline = Instant::now() + self.connect_timeout;
        while !self.is_connected() {
            if self.worker.as_ref().map_or(true, |w| w.is_finished()) {
                return Err(BtleplugLinkError::WorkerFailed);
            }
            if Instant::now() >= deadline {
                return Err(BtleplugLinkError::ConnectTimeout);
            }
            thread::sleep(Duration::from_millis(20));
        }
        Ok(())
    }

    fn send(&self, command: LinkCommand) -> Result<(), BtleplugLinkError> {
        if !self.is_connected() {
            return Err(BtleplugLinkError::NotConnected);
        }
        self.command_tx
            .try_send(command)
            .map_err(|_| BtleplugLinkError::WorkerFailed)
    }
}

impl GattLink for BtleplugGattLink {
    type Error = BtleplugLinkError;

    /// Blocks until the peripheral confirms the write or `write_timeout`
    /// elapses.
    fn write_rx(&mut self, bytes: &[u8]) -> Result<(), Self::Error> {
        let (reply, reply_rx) = mpsc::sync_channel(1);
        self.send(LinkCommand::Write {
            bytes: bytes.to_vec(),
            reply,
        })?;
        await_write(&reply_rx, self.write_timeout)
    }

    fn enable_tx_notifications(&mut self) -> Result<(), Self::Error> {
        self.send(LinkCommand::EnableNotifications)
    }

    fn disable_tx_notifications(&mut self) -> Result<(), Self::Error> {
        self.send(LinkCommand::DisableNotifications)
    }

    fn recv_tx(&mut self) -> Option<Vec<u8>> {
        self.inbound_rx.try_recv().ok()
    }

    fn dropped_notifications(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Drop for BtleplugGattLink {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

struct Session {
    peripheral: Peripheral,
    rx: Characteristic,
    tx: Characteristic,
    forwarder: Option<tokio::task::JoinHandle<()>>,
}

impl Session {
    async fn apply(
        &mut self,
        command: LinkCommand,
        inbound_tx: &mpsc::SyncSender<Vec<u8>>,
        dropped: &Arc<AtomicU64>,
    ) {
        match command {
            LinkCommand::Write { bytes, reply } => {
                let result = self
                    .peripheral
                    .write(&self.rx, &bytes, WriteType::WithResponse)
                    .await
                    .map_err(|err| err.to_string());
                if let Err(err) = &result {
                    warn!(%err, "rx characteristic write failed");
                }
                let _ = reply.try_send(result);
            }
            LinkCommand::EnableNotifications => {
                if self.forwarder.is_some() {
                    return;
                }
                if let Err(err) = self.peripheral.subscribe(&self.tx).await {
                    warn!(%err, "unable to subscribe to notifications");
                    return;
                }
                let mut notifications = match self.peripheral.notifications().await {
                    Ok(stream) => stream,
                    Err(err) => {
                        warn!(%err, "notification stream unavailable");
                        return;
                    }
                };
                let tx_uuid = self.tx.uuid;
                let inbound = inbound_tx.clone();
                let dropped = Arc::clone(dropped);
                self.forwarder = Some(tokio::spawn(async move {
                    while let Some(notification) = notifications.next().await {
                        if notification.uuid != tx_uuid {
                            continue;
                        }
                        if inbound.try_send(notification.value).is_err() {
                            dropped.fetch_add(1, Ordering::Relaxed);
                            warn!("inbound queue full, dropping notification");
                        }
                    }
                }));
            }
            LinkCommand::DisableNotifications => {
                if let Some(forwarder) = self.forwarder.take() {
                    forwarder.abort();
                }
                if let Err(err) = self.peripheral.unsubscribe(&self.tx).await {
                    warn!(%err, "unable to unsubscribe from notifications");
                }
            }
        }
    }
}

async fn run_worker(
    config: BtleplugLinkConfig,
    mut command_rx: tokio_mpsc::Receiver<LinkCommand>,
    inbound_tx: mpsc::SyncSender<Vec<u8>>,
    connected: Arc<AtomicBool>,
    dropped: Arc<AtomicU64>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    let Ok(service_uuid) = Uuid::parse_str(MESSAGE_PROTOCOL_SERVICE_UUID) else {
        return;
    };
    let manager = match Manager::new().await {
        Ok(m) => m,
        Err(err) => {
            warn!(%err, "bluetooth manager unavailable");
            return;
        }
    };
    let adapter = match manager.adapters().await {
        Ok(adapters) => match adapters.into_iter().next() {
            Some(a) => a,
            None => {
                warn!("no bluetooth adapter found");
                return;
            }
        },
        Err(err) => {
            warn!(%err, "bluetooth adapters unavailable");
            return;
        }
    };

    let filter = ScanFilter {
        services: vec![service_uuid],
    };
    if adapter.start_scan(filter.clone()).await.is_err() {
        return;
    }
    let mut events = match adapter.events().await {
        Ok(e) => e,
        Err(_) => return,
    };

    let mut session: Option<Session> = None;
    loop {
        tokio::select! {
            _ = &mut shutdown_rx => {
                break;
            }
            maybe_event = events.next(), if session.is_none() => {
                if let Some(CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id)) = maybe_event {
                    if let Some(found) = try_connect(&adapter, &config, service_uuid, &id).await {
                        let _ = adapter.stop_scan().await;
                        connected.store(true, Ordering::Release);
                        session = Some(found);
                    }
                }
            }
            Some(command) = command_rx.recv() => {
                match session.as_mut() {
                    Some(active) => active.apply(command, &inbound_tx, &dropped).await,
                    None => command.reject("peripheral is not connected"),
                }
            }
            _ = tokio::time::sleep(config.scan_interval), if session.is_none() => {
                let _ = adapter.start_scan(filter.clone()).await;
            }
        }
    }

    connected.store(false, Ordering::Release);
    if let Some(active) = session {
        if let Some(forwarder) = active.forwarder {
            forwarder.abort();
        }
        let _ = active.peripheral.disconnect().await;
    }
}

async fn try_connect(
    adapter: &Adapter,
    config: &BtleplugLinkConfig,
    service_uuid: Uuid,
    id: &PeripheralId,
) -> Option<Session> {
    let peripheral = adapter.peripheral(id).await.ok()?;
    let properties = peripheral.properties().await.ok().flatten()?;
    let wanted = match &config.device_filter {
        Some(filter) => {
            properties.local_name.as_deref() == Some(filter.as_str())
                || properties.address.to_string().eq_ignore_ascii_case(filter)
        }
        None => properties.services.contains(&service_uuid),
    };
    if !wanted {
        return None;
    }

    match tokio::time::timeout(config.connect_timeout, peripheral.connect()).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
            warn!(%err, address = %properties.address, "connect failed");
            return None;
        }
        Err(_) => {
            warn!(address = %properties.address, "connect timed out");
            return None;
        }
    }
    if let Err(err) = peripheral.discover_services().await {
        warn!(%err, "service discovery failed");
        return None;
    }

    let rx_uuid = Uuid::parse_str(MESSAGE_PROTOCOL_RX_CHAR_UUID).ok()?;
    let tx_uuid = Uuid::parse_str(MESSAGE_PROTOCOL_TX_CHAR_UUID).ok()?;
    let chars = peripheral.characteristics();
    let rx = chars.iter().find(|c| c.uuid == rx_uuid).cloned();
    let tx = chars.iter().find(|c| c.uuid == tx_uuid).cloned();
    let (Some(rx), Some(tx)) = (rx, tx) else {
        warn!(address = %properties.address, "peripheral lacks message protocol characteristics");
        let _ = peripheral.disconnect().await;
        return None;
    };

    info!(address = %properties.address, name = ?properties.local_name, "connected to peripheral");
    Some(Session {
        peripheral,
        rx,
        tx,
        forwarder: None,
    })
}
