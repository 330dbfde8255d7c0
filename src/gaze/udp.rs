//! Gaze samples received as UDP datagrams from a tracker bridge on the local machine.
//!
//! Each datagram carries one sample as text: `timestamp x y`, separated by commas
//! or whitespace, with `.` as the decimal point. When a bridge address is known the
//! stream registers with `SUBSCRIBE <mode>` on open and `UNSUBSCRIBE` on close, so the
//! bridge delivers in the requested filtering mode.

use super::{DeviceError, GazeDataMode, GazeDevice, GazeSample, GazeStream};
use log::{debug, info, warn};
use std::{
    io::ErrorKind,
    net::SocketAddr,
    sync::mpsc::Sender,
    thread::{self, JoinHandle},
};
use tokio::{net::UdpSocket, runtime, sync::oneshot};

const MAX_DATAGRAM: usize = 512;
const UNSUBSCRIBE: &str = "UNSUBSCRIBE";

pub struct UdpGazeDevice {
    bind_addr: String,
    bridge_addr: Option<String>,
}

impl UdpGazeDevice {
    pub fn new(bind_addr: impl Into<String>) -> Self {
        Self {
            bind_addr: bind_addr.into(),
            bridge_addr: None,
        }
    }

    /// Registers with the bridge at `bridge_addr` for every opened stream.
    pub fn with_bridge(mut self, bridge_addr: impl Into<String>) -> Self {
        self.bridge_addr = Some(bridge_addr.into());
        self
    }

    pub fn bind(
        &self,
        mode: GazeDataMode,
        samples: Sender<GazeSample>,
    ) -> Result<UdpGazeStream, DeviceError> {
        let rt = runtime::Builder::new_current_thread().enable_io().build()?;
        let socket = rt
            .block_on(UdpSocket::bind(self.bind_addr.as_str()))
            .map_err(|e| {
                DeviceError::Unavailable(format!("cannot bind {}: {}", self.bind_addr, e))
            })?;
        let local_addr = socket.local_addr()?;

        match &self.bridge_addr {
            Some(bridge) => {
                rt.block_on(socket.send_to(subscribe_message(mode).as_bytes(), bridge.as_str()))
                    .map_err(|e| {
                        DeviceError::Unavailable(format!("cannot reach bridge {}: {}", bridge, e))
                    })?;
                info!("Subscribed to {:?} gaze samples from {}", mode, bridge);
            }
            None => debug!("No bridge address; {:?} filtering is up to the sender", mode),
        }
        info!("Listening for gaze samples on {}", local_addr);

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let bridge = self.bridge_addr.clone();
        let handle = thread::Builder::new()
            .name("gaze-udp".to_string())
            .spawn(move || rt.block_on(receive_loop(socket, samples, bridge, shutdown_rx)))?;

        Ok(UdpGazeStream {
            local_addr,
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        })
    }
}

impl GazeDevice for UdpGazeDevice {
    fn open_stream(
        &self,
        mode: GazeDataMode,
        samples: Sender<GazeSample>,
    ) -> Result<Box<dyn GazeStream>, DeviceError> {
        Ok(Box::new(self.bind(mode, samples)?))
    }
}

pub struct UdpGazeStream {
    local_addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl UdpGazeStream {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    fn shutdown(&mut self) -> Result<(), DeviceError> {
        if let Some(shutdown) = self.shutdown.take() {
            // The receiver is gone only if the loop already ended on its own.
            let _ = shutdown.send(());
        }
        match self.handle.take() {
            Some(handle) => handle.join().map_err(|_| DeviceError::StreamPanicked),
            None => Ok(()),
        }
    }
}

impl GazeStream for UdpGazeStream {
    fn close(mut self: Box<Self>) -> Result<(), DeviceError> {
        self.shutdown()?;
        info!("Gaze stream on {} closed", self.local_addr);
        Ok(())
    }
}

impl Drop for UdpGazeStream {
    fn drop(&mut self) {
        if self.handle.is_some() {
            if let Err(e) = self.shutdown() {
                warn!("Failed to stop gaze stream on drop: {}", e);
            }
        }
    }
}

fn subscribe_message(mode: GazeDataMode) -> String {
    let mode = match mode {
        GazeDataMode::LightlyFiltered => "lightly_filtered",
        GazeDataMode::Unfiltered => "unfiltered",
    };
    format!("SUBSCRIBE {}", mode)
}

async fn receive_loop(
    socket: UdpSocket,
    samples: Sender<GazeSample>,
    bridge: Option<String>,
    mut shutdown: oneshot::Receiver<()>,
) {
    let mut buf = [0u8; MAX_DATAGRAM];
    loop {
        let received = tokio::select! {
            _ = &mut shutdown => break,
            received = socket.recv_from(&mut buf) => received,
        };
        match received {
            Ok((len, from)) => {
                let Some(sample) = std::str::from_utf8(&buf[..len])
                    .ok()
                    .and_then(parse_sample)
                else {
                    debug!("Dropping malformed gaze datagram from {}", from);
                    continue;
                };
                if samples.send(sample).is_err() {
                    debug!("Gaze consumer gone; stopping receiver");
                    break;
                }
            }
            // Windows reports an unreachable bridge on the next receive.
            Err(e) if e.kind() == ErrorKind::ConnectionReset => {
                debug!("Gaze bridge unreachable: {}", e);
            }
            Err(e) => {
                warn!("Gaze socket error: {}", e);
                break;
            }
        }
    }

    if let Some(bridge) = bridge {
        if let Err(e) = socket.send_to(UNSUBSCRIBE.as_bytes(), bridge.as_str()).await {
            warn!("Failed to unsubscribe from {}: {}", bridge, e);
        }
    }
}

/// Parses `timestamp x y`; commas, whitespace, or both may separate the fields.
pub fn parse_sample(text: &str) -> Option<GazeSample> {
    let mut fields = text
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|f| !f.is_empty())
        .map(str::parse::<f64>);

    let timestamp = fields.next()?.ok()?;
    let x = fields.next()?.ok()?;
    let y = fields.next()?.ok()?;
    if fields.next().is_some() {
        return None;
    }
    Some(GazeSample::new(timestamp, x, y))
}
