// Operation progress reported to the screens.
//
// Every user-triggered operation (sign-in, summary generation, manual
// contact alert, ...) surfaces through one of these cells. An error is
// shown as a transient notification and the cell then resets to Idle so
// the operation can be retried; failures are never silently swallowed at
// the UI boundary. Only the human-readable message crosses this surface -
// raw causes stay in the logs.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "status", content = "message")]
pub enum OperationStatus {
    #[default]
    Idle,
    Loading,
    Success(Option<String>),
    Error(String),
}

/// Observable status cell for one operation.
#[derive(Clone)]
pub struct OperationCell {
    tx: Arc<watch::Sender<OperationStatus>>,
}

impl OperationCell {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(OperationStatus::Idle);
        Self { tx: Arc::new(tx) }
    }

    pub fn current(&self) -> OperationStatus {
        self.tx.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<OperationStatus> {
        self.tx.subscribe()
    }

    pub fn begin(&self) {
        self.tx.send_replace(OperationStatus::Loading);
    }

    pub fn succeed(&self, message: Option<String>) {
        self.tx.send_replace(OperationStatus::Success(message));
    }

    pub fn fail(&self, message: impl Into<String>) {
        self.tx.send_replace(OperationStatus::Error(message.into()));
    }

    /// Back to Idle once the notification has been shown.
    pub fn reset(&self) {
        self.tx.send_replace(OperationStatus::Idle);
    }
}

impl Default for OperationCell {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_lifecycle() {
        let cell = OperationCell::new();
        assert_eq!(cell.current(), OperationStatus::Idle);

        cell.begin();
        assert_eq!(cell.current(), OperationStatus::Loading);

        cell.succeed(Some("recording saved".into()));
        assert_eq!(
            cell.current(),
            OperationStatus::Success(Some("recording saved".into()))
        );
    }

    /// An error is surfaced, then reset clears it for retry
    #[tokio::test]
    async fn test_error_then_reset_allows_retry() {
        let cell = OperationCell::new();
        let mut seen = cell.watch();

        cell.begin();
        cell.fail("upload failed");
        assert_eq!(cell.current(), OperationStatus::Error("upload failed".into()));

        cell.reset();
        assert_eq!(cell.current(), OperationStatus::Idle);

        seen.changed().await.unwrap();
        // The watcher converges on the latest value
        assert_eq!(*seen.borrow_and_update(), OperationStatus::Idle);
    }
}
