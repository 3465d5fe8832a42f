use crate::errors::RelayError;
use crate::models::{CallResult, ScheduleEntry};
use crate::utils::args::build_raw_command;
use async_trait::async_trait;

/// Delivers the result of a scheduled call to a chat session. Implemented by
/// the host; the relay only calls it when an entry names a target session.
#[async_trait]
pub trait ScheduleDelivery: Send + Sync {
    async fn deliver(&self, target_session: &str, result: &CallResult) -> Result<(), RelayError>;
}

/// Command line fed through the normal pipeline for one schedule entry.
pub fn schedule_command(entry: &ScheduleEntry) -> String {
    build_raw_command(&entry.api_key, &entry.args, &entry.named)
}

/// Stable job identifier for the host's cron runner.
pub fn schedule_job_id(index: usize, entry: &ScheduleEntry) -> String {
    format!("apirelay_schedule_{}_{}", index, entry.api_key)
}
