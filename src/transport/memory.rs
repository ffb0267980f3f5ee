//! In-memory connector for exercising ports and readers without hardware.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::port::Connector;
use crate::utils::error::ModbusError;

#[derive(Clone, Default)]
pub struct MemoryConnector {
    inbound: Arc<Mutex<VecDeque<u8>>>,
    outbound: Arc<Mutex<Vec<u8>>>,
    connects: Arc<AtomicU32>,
    failing_connects: Arc<AtomicU32>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues bytes the device side will answer with.
    pub fn push_inbound(&self, bytes: &[u8]) {
        self.inbound.lock().unwrap().extend(bytes.iter().copied());
    }

    pub fn written(&self) -> Vec<u8> {
        self.outbound.lock().unwrap().clone()
    }

    pub fn fail_next_connects(&self, count: u32) {
        self.failing_connects.store(count, Ordering::SeqCst);
    }

    /// Connect attempts so far, failed ones included.
    pub fn connects(&self) -> u32 {
        self.connects.load(Ordering::SeqCst)
    }
}

pub struct MemoryStream {
    inbound: Arc<Mutex<VecDeque<u8>>>,
    outbound: Arc<Mutex<Vec<u8>>>,
}

impl Read for MemoryStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut inbound = self.inbound.lock().unwrap();
        if inbound.is_empty() {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "nothing to read"));
        }
        let n = buf.len().min(inbound.len());
        for (slot, byte) in buf.iter_mut().zip(inbound.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl Write for MemoryStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.outbound.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Connector for MemoryConnector {
    type Stream = MemoryStream;

    fn connect(&self) -> Result<Self::Stream, ModbusError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let failing = self.failing_connects.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_connects.store(failing - 1, Ordering::SeqCst);
            return Err(ModbusError::ConnectionError("device unplugged".to_string()));
        }
        Ok(MemoryStream {
            inbound: self.inbound.clone(),
            outbound: self.outbound.clone(),
        })
    }

    fn set_read_timeout(&self, _stream: &mut Self::Stream, _timeout: Duration) -> Result<(), ModbusError> {
        Ok(())
    }

    fn description(&self) -> String {
        "memory".to_string()
    }
}
