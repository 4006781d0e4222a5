use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
#[error("{0}")]
pub struct NotificationError(pub String);

/// Outbound notification capability (webhook, chat channel, mail). The
/// core only consumes this interface: dispatch happens after the lifecycle
/// mutation is persisted, and a failure is reported to the caller without
/// reverting the already-committed record.
pub trait Notifier {
    fn notify(&self, target: &str, payload: &Value) -> Result<(), NotificationError>;
}

/// No-op dispatcher for callers that only want the persisted transition.
#[derive(Debug, Default)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn notify(&self, _target: &str, _payload: &Value) -> Result<(), NotificationError> {
        Ok(())
    }
}
