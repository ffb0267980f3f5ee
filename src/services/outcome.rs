use std::fmt;
use thiserror::Error;

use crate::utils::error::ModbusError;

/// Which read failed for a battery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Info,
    ExtraInfo,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Info => f.write_str("info"),
            Operation::ExtraInfo => f.write_str("extra info"),
        }
    }
}

#[derive(Debug)]
pub struct ReadFailure {
    pub id: u8,
    pub operation: Operation,
    pub error: ModbusError,
}

impl fmt::Display for ReadFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "error getting {} of ID#{}: {}", self.operation, self.id, self.error)
    }
}

/// Every per-battery failure of a run, in the order they happened.
#[derive(Debug, Default)]
pub struct RunOutcome {
    failures: Vec<ReadFailure>,
}

impl RunOutcome {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, id: u8, operation: Operation, error: ModbusError) {
        self.failures.push(ReadFailure { id, operation, error });
    }

    pub fn failures(&self) -> &[ReadFailure] {
        &self.failures
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    /// A run with any failure counts as failed, even if other batteries
    /// were read.
    pub fn into_result(self) -> Result<(), RunFailed> {
        if self.failures.is_empty() {
            Ok(())
        } else {
            Err(RunFailed {
                failures: self.failures,
            })
        }
    }
}

/// One line per failure.
#[derive(Error, Debug)]
#[error("{}", join_failures(.failures))]
pub struct RunFailed {
    pub failures: Vec<ReadFailure>,
}

fn join_failures(failures: &[ReadFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_outcome_is_success() {
        let outcome = RunOutcome::new();
        assert!(outcome.is_empty());
        assert!(outcome.into_result().is_ok());
    }

    #[test]
    fn test_failures_are_joined_in_order() {
        let mut outcome = RunOutcome::new();
        outcome.record(5, Operation::Info, ModbusError::Timeout);
        outcome.record(9, Operation::ExtraInfo, ModbusError::Exception { function: 3, code: 2 });
        assert_eq!(outcome.len(), 2);

        let err = outcome.into_result().unwrap_err();
        assert_eq!(
            err.to_string(),
            "error getting info of ID#5: Timeout occurred\n\
             error getting extra info of ID#9: Modbus exception 0x02 for function 0x03"
        );
    }

    #[test]
    fn test_run_failed_carries_through_anyhow() {
        let mut outcome = RunOutcome::new();
        outcome.record(2, Operation::Info, ModbusError::Timeout);
        outcome.record(4, Operation::Info, ModbusError::Timeout);

        let err: anyhow::Error = outcome.into_result().unwrap_err().into();
        assert_eq!(
            err.to_string(),
            "error getting info of ID#2: Timeout occurred\n\
             error getting info of ID#4: Timeout occurred"
        );
        let failed = err.downcast_ref::<RunFailed>().unwrap();
        assert_eq!(failed.failures.len(), 2);
    }
}
