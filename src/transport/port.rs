use async_trait::async_trait;
use log::{debug, error, info, warn};
use std::future::{ready, Future};
use std::io::{Read, Write};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::sleep;

use super::backoff::BackoffPolicy;
use crate::utils::error::ModbusError;

/// A byte channel shared by every battery on the bus.
///
/// Any failed `read` or `write` leaves the port broken: further I/O is refused
/// until `reopen` succeeds.
#[async_trait]
pub trait Port: Send {
    async fn write(&mut self, data: &[u8]) -> Result<(), ModbusError>;

    /// Reads whatever arrives within `timeout`, at most `max_bytes`.
    async fn read(&mut self, max_bytes: usize, timeout: Duration) -> Result<Vec<u8>, ModbusError>;

    /// Closes the port and opens it again, backing off between attempts.
    async fn reopen(&mut self) -> Result<(), ModbusError>;

    fn is_open(&self) -> bool;

    fn description(&self) -> &str;
}

pub type SharedPort = Arc<Mutex<Box<dyn Port>>>;

pub fn shared(port: Box<dyn Port>) -> SharedPort {
    Arc::new(Mutex::new(port))
}

/// Opens blocking byte streams for a `StreamPort`.
pub trait Connector: Send + Sync {
    type Stream: Read + Write + Send;

    fn connect(&self) -> Result<Self::Stream, ModbusError>;

    fn set_read_timeout(&self, stream: &mut Self::Stream, timeout: Duration) -> Result<(), ModbusError>;

    fn description(&self) -> String;
}

pub struct StreamPort<C: Connector> {
    connector: C,
    stream: Option<C::Stream>,
    backoff: BackoffPolicy,
    description: String,
}

impl<C: Connector> StreamPort<C> {
    pub fn open(connector: C, backoff: BackoffPolicy) -> Result<Self, ModbusError> {
        let description = connector.description();
        info!("🔌 Opening port {}", description);

        let stream = connector.connect().map_err(|e| {
            error!("❌ Failed to open port {}: {}", description, e);
            e
        })?;

        info!("✅ Port {} is open", description);
        Ok(Self {
            connector,
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

fn read_some<C: Connector>(
    connector: &C,
    stream: &mut C::Stream,
    max_bytes: usize,
    timeout: Duration,
) -> Result<Vec<u8>, ModbusError> {
    // a zero timeout means "block forever" for some backends
    connector.set_read_timeout(stream, timeout.max(Duration::from_millis(1)))?;

    let mut buffer = vec![0u8; max_bytes];
    match stream.read(&mut buffer) {
        Ok(0) => Err(ModbusError::CommunicationError("connection closed by peer".to_string())),
        Ok(n) => {
            buffer.truncate(n);
            Ok(buffer)
        }
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl<C: Connector> Port for StreamPort<C> {
    async fn write(&mut self, data: &[u8]) -> Result<(), ModbusError> {
        let result = match self.stream.as_mut() {
            Some(stream) => stream
                .write_all(data)
                .and_then(|_| stream.flush())
                .map_err(|e| ModbusError::CommunicationError(format!("Write failed: {}", e))),
            None => return Err(self.not_open()),
        };

        if let Err(e) = &result {
            self.mark_broken(e);
        }
        result
    }

    async fn read(&mut self, max_bytes: usize, timeout: Duration) -> Result<Vec<u8>, ModbusError> {
        if max_bytes == 0 {
            return Ok(Vec::new());
        }

        let result = match self.stream.as_mut() {
            Some(stream) => read_some(&self.connector, stream, max_bytes, timeout),
            None => return Err(self.not_open()),
        };

        if let Err(e) = &result {
            self.mark_broken(e);
        }
        result
    }

    async fn reopen(&mut self) -> Result<(), ModbusError> {
        self.stream = None;

        let connector = &self.connector;
        let stream = reconnect(&self.description, &self.backoff, || ready(connector.connect())).await?;
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

/// Runs `connect` until it succeeds or `backoff` is exhausted, sleeping the
/// policy's delay before every attempt.
pub(crate) async fn reconnect<T, F, Fut>(
    description: &str,
    backoff: &BackoffPolicy,
    mut connect: F,
) -> Result<T, ModbusError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ModbusError>>,
{
    let attempts = backoff.max_attempts;
    let mut last = String::from("no reopen attempt allowed");
    let delays: Vec<Duration> = backoff.delays().collect();

    for (index, delay) in delays.into_iter().enumerate() {
        let attempt = index as u32 + 1;
        debug!("Waiting {:?} before reopening {}", delay, description);
        sleep(delay).await;

        match connect().await {
            Ok(stream) => {
                info!("🔄 Reopened port {} (attempt {}/{})", description, attempt, attempts);
                return Ok(stream);
            }
            Err(e) => {
                warn!("Reopen {}/{} of {} failed: {}", attempt, attempts, description, e);
                last = e.to_string();
            }
        }
    }

    error!("❌ Giving up on port {} after {} attempts", description, attempts);
    Err(ModbusError::ReopenFailed { attempts, last })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::memory::MemoryConnector;

    fn fast_backoff(max_attempts: u32) -> BackoffPolicy {
        BackoffPolicy::new(max_attempts, 1, 1)
    }

    #[tokio::test]
    async fn test_read_returns_queued_bytes() {
        let connector = MemoryConnector::new();
        connector.push_inbound(&[1, 2, 3, 4]);
        let mut port = StreamPort::open(connector.clone(), fast_backoff(1)).unwrap();

        port.write(&[9, 9]).await.unwrap();
        assert_eq!(connector.written(), vec![9, 9]);
        assert_eq!(port.read(3, Duration::from_millis(5)).await.unwrap(), vec![1, 2, 3]);
        assert_eq!(port.read(8, Duration::from_millis(5)).await.unwrap(), vec![4]);
        assert!(port.is_open());
    }

    #[tokio::test]
    async fn test_timeout_breaks_port_until_reopen() {
        let connector = MemoryConnector::new();
        let mut port = StreamPort::open(connector.clone(), fast_backoff(2)).unwrap();

        let err = port.read(4, Duration::from_millis(5)).await.unwrap_err();
        assert!(matches!(err, ModbusError::Timeout));
        assert!(!port.is_open());

        let err = port.write(&[1]).await.unwrap_err();
        assert!(matches!(err, ModbusError::ConnectionError(_)));

        port.reopen().await.unwrap();
        assert!(port.is_open());
        assert_eq!(connector.connects(), 2);
    }

    #[tokio::test]
    async fn test_reopen_retries_then_succeeds() {
        let connector = MemoryConnector::new();
        let mut port = StreamPort::open(connector.clone(), fast_backoff(3)).unwrap();

        connector.fail_next_connects(2);
        port.reopen().await.unwrap();
        assert!(port.is_open());
        assert_eq!(connector.connects(), 4);
    }

    #[tokio::test]
    async fn test_reopen_gives_up_after_policy() {
        let connector = MemoryConnector::new();
        let mut port = StreamPort::open(connector.clone(), fast_backoff(2)).unwrap();

        connector.fail_next_connects(5);
        match port.reopen().await {
            Err(ModbusError::ReopenFailed { attempts, .. }) => assert_eq!(attempts, 2),
            other => panic!("expected ReopenFailed, got {:?}", other),
        }
        assert!(!port.is_open());
    }

    #[test]
    fn test_open_failure_is_reported() {
        let connector = MemoryConnector::new();
        connector.fail_next_connects(1);
        assert!(matches!(
            StreamPort::open(connector, fast_backoff(1)),
            Err(ModbusError::ConnectionError(_))
        ));
    }
}
