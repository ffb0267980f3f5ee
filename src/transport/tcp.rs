use async_trait::async_trait;
use log::{debug, error, info, warn};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use super::backoff::BackoffPolicy;
use super::port::{reconnect, Port};
use crate::utils::error::ModbusError;

pub const DEFAULT_MODBUS_TCP_PORT: u16 = 502;

/// `host` alone means the standard Modbus/TCP port.
pub fn with_default_port(address: &str) -> String {
    if address.contains(':') {
        address.to_string()
    } else {
        format!("{}:{}", address, DEFAULT_MODBUS_TCP_PORT)
    }
}

async fn connect_tcp(address: &str, connect_timeout: Duration) -> Result<TcpStream, ModbusError> {
    debug!("TCP connecting: {}", address);

    match timeout(connect_timeout, TcpStream::connect(address)).await {
        Ok(Ok(stream)) => {
            if let Err(e) = stream.set_nodelay(true) {
                debug!("TCP_NODELAY on {}: {}", address, e);
            }
            Ok(stream)
        }
        Ok(Err(e)) => Err(ModbusError::ConnectionError(format!(
            "Failed to connect to {}: {}",
            address, e
        ))),
        Err(_) => Err(ModbusError::ConnectionError(format!(
            "Connection to {} timed out",
            address
        ))),
    }
}

/// Modbus/TCP gateway or a serial-to-Ethernet bridge.
///
/// Same contract as the serial port: any I/O error or timeout drops the
/// connection until `reopen` succeeds.
pub struct TcpPort {
    address: String,
    connect_timeout: Duration,
    stream: Option<TcpStream>,
    backoff: BackoffPolicy,
    description: String,
}

impl TcpPort {
    pub async fn open(
        address: &str,
        connect_timeout: Duration,
        backoff: BackoffPolicy,
    ) -> Result<Self, ModbusError> {
        let address = with_default_port(address);
        let description = format!("tcp://{}", address);
        info!("🔌 Opening port {}", description);

        let stream = connect_tcp(&address, connect_timeout).await.map_err(|e| {
            error!("❌ Failed to open port {}: {}", description, e);
            e
        })?;

        info!("✅ Port {} is open", description);
        Ok(Self {
            address,
            connect_timeout,
            stream: Some(stream),
            backoff,
            description,
        })
    }

    fn not_open(&self) -> ModbusError {
        ModbusError::ConnectionError(format!("port {} is not open", self.description))
    }

    fn mark_broken(&mut self, err: &ModbusError) {
        warn!("⚠️  Port {} needs a reopen: {}", self.description, err);
        self.stream = None;
    }
}

#[async_trait]
impl Port for TcpPort {
    async fn write(&mut self, data: &[u8]) -> Result<(), ModbusError> {
        let result = match self.stream.as_mut() {
            Some(stream) => {
                let written = match stream.write_all(data).await {
                    Ok(()) => stream.flush().await,
                    Err(e) => Err(e),
                };
                written.map_err(|e| ModbusError::CommunicationError(format!("Write failed: {}", e)))
            }
            None => return Err(self.not_open()),
        };

        if let Err(e) = &result {
            self.mark_broken(e);
        }
        result
    }

    async fn read(&mut self, max_bytes: usize, read_timeout: Duration) -> Result<Vec<u8>, ModbusError> {
        if max_bytes == 0 {
            return Ok(Vec::new());
        }

        let result = match self.stream.as_mut() {
            Some(stream) => {
                let mut buffer = vec![0u8; max_bytes];
                match timeout(read_timeout, stream.read(&mut buffer)).await {
                    Ok(Ok(0)) => Err(ModbusError::CommunicationError(
                        "connection closed by peer".to_string(),
                    )),
                    Ok(Ok(n)) => {
                        buffer.truncate(n);
                        Ok(buffer)
                    }
                    Ok(Err(e)) => Err(e.into()),
                    Err(_) => Err(ModbusError::Timeout),
                }
            }
            None => return Err(self.not_open()),
        };

        if let Err(e) = &result {
            self.mark_broken(e);
        }
        result
    }

    async fn reopen(&mut self) -> Result<(), ModbusError> {
        self.stream = None;

        let address = self.address.as_str();
        let connect_timeout = self.connect_timeout;
        let stream = reconnect(&self.description, &self.backoff, || {
            connect_tcp(address, connect_timeout)
        })
        .await?;
        self.stream = Some(stream);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    fn description(&self) -> &str {
        &self.description
    }
}
