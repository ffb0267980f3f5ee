use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModbusError {
    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Communication error: {0}")]
    CommunicationError(String),

    #[error("CRC checksum mismatch (expected 0x{expected:04X}, received 0x{received:04X})")]
    CrcError { expected: u16, received: u16 },

    #[error("Invalid response from device: {0}")]
    InvalidResponse(String),

    #[error("Modbus exception 0x{code:02X} for function 0x{function:02X}")]
    Exception { function: u8, code: u8 },

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Timeout occurred")]
    Timeout,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Could not reopen port after {attempts} attempts: {last}")]
    ReopenFailed { attempts: u32, last: String },
}

impl From<std::io::Error> for ModbusError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => ModbusError::Timeout,
            _ => ModbusError::CommunicationError(format!("IO error: {}", err)),
        }
    }
}

impl From<serialport::Error> for ModbusError {
    fn from(err: serialport::Error) -> Self {
        ModbusError::ConnectionError(err.to_string())
    }
}

impl From<toml::de::Error> for ModbusError {
    fn from(err: toml::de::Error) -> Self {
        ModbusError::ConfigError(format!("TOML error: {}", err))
    }
}

/// Errors that end a polling run before every battery was attempted.
#[derive(Error, Debug)]
pub enum PollError {
    #[error("error opening port {port}: {source}")]
    Open {
        port: String,
        #[source]
        source: ModbusError,
    },

    #[error("error creating {protocol} reader: {source}")]
    Reader {
        protocol: String,
        #[source]
        source: ModbusError,
    },

    #[error("error reopening port after failure on ID#{id}: {source}")]
    Reopen {
        id: u8,
        #[source]
        source: ModbusError,
    },
}
