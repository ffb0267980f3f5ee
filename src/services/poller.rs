use log::{info, warn};
use std::time::Duration;

use super::outcome::{Operation, RunOutcome};
use crate::devices::BatteryProfile;
use crate::modbus::RegisterReader;
use crate::output::ReportEmitter;
use crate::transport::SharedPort;
use crate::utils::error::{ModbusError, PollError};

/// Reads every battery on the bus one after the other.
///
/// A failed read is recorded and the port is reopened before moving on to
/// the next battery. Only a failed reopen stops the run.
pub struct BatteryPoller {
    port: SharedPort,
    reader: Box<dyn RegisterReader>,
    profile: Box<dyn BatteryProfile>,
    read_timeout: Duration,
}

impl BatteryPoller {
    pub fn new(
        port: SharedPort,
        reader: Box<dyn RegisterReader>,
        profile: Box<dyn BatteryProfile>,
        read_timeout: Duration,
    ) -> Self {
        Self {
            port,
            reader,
            profile,
            read_timeout,
        }
    }

    pub async fn poll(&self, ids: &[u8], emitter: &mut dyn ReportEmitter) -> Result<RunOutcome, PollError> {
        info!(
            "📡 Polling {} {} batteries using {} (timeout {:?})",
            ids.len(),
            self.profile.name(),
            self.reader.protocol(),
            self.read_timeout
        );

        let mut outcome = RunOutcome::new();

        for &id in ids {
            let info = match self
                .profile
                .read_info(self.reader.as_ref(), id, self.read_timeout)
                .await
            {
                Ok(info) => info,
                Err(e) => {
                    self.fail(&mut outcome, id, Operation::Info, e).await?;
                    continue;
                }
            };

            let extra = match self
                .profile
                .read_extra_info(self.reader.as_ref(), id, self.read_timeout)
                .await
            {
                Ok(extra) => extra,
                Err(e) => {
                    self.fail(&mut outcome, id, Operation::ExtraInfo, e).await?;
                    continue;
                }
            };

            emitter.begin_device(id);
            emitter.emit(&info);
            if let Some(extra) = &extra {
                emitter.emit(extra);
            }
            emitter.end_device(id);
        }

        if outcome.is_empty() {
            info!("✅ All {} batteries read", ids.len());
        } else {
            warn!("📊 {} of {} reads failed", outcome.len(), ids.len());
        }
        Ok(outcome)
    }

    async fn fail(
        &self,
        outcome: &mut RunOutcome,
        id: u8,
        operation: Operation,
        err: ModbusError,
    ) -> Result<(), PollError> {
        warn!("⚠️  Error getting {} of ID#{}: {}", operation, id, err);
        outcome.record(id, operation, err);

        self.port
            .lock()
            .await
            .reopen()
            .await
            .map_err(|source| PollError::Reopen { id, source })
    }
}
