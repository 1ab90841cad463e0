//! Non-blocking user notifications.
//!
//! The auth client reports outcomes ("Logged in", "Login failed: ...") through a
//! [`Notifier`]; the view layer decides how to show them. Background failures
//! nobody awaits are funnelled through [`spawn_reported`] so they surface as a
//! generic notice instead of taking the active view down.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::errors::AuthError;

/// Shown for failures that carry no message of their own.
pub const GENERIC_FAILURE: &str = "An unexpected error occurred";

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Success,
    Error,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn success(message: impl Into<String>) -> Self {
        Notice {
            level: NoticeLevel::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Notice {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}

/// Receives user-facing notices. Must not block.
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// Writes notices to the log. The default when no view layer is attached.
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notice: Notice) {
        match notice.level {
            NoticeLevel::Success => info!(event_name = "notice.success", "{}", notice.message),
            NoticeLevel::Error => warn!(event_name = "notice.error", "{}", notice.message),
        }
    }
}

/// Runs `task` in the background. An error or a panic becomes a generic error
/// notice; nothing propagates to whoever spawned it.
pub fn spawn_reported<F, T>(notifier: Arc<dyn Notifier>, task: F) -> JoinHandle<Option<T>>
where
    F: Future<Output = Result<T, AuthError>> + Send + 'static,
    T: Send + 'static,
{
    tokio::spawn(async move {
        match AssertUnwindSafe(task).catch_unwind().await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(e)) => {
                error!(event_name = "task.failed", "background task failed: {}", e);
                notifier.notify(Notice::error(GENERIC_FAILURE));
                None
            }
            Err(_) => {
                error!(event_name = "task.panicked", "background task panicked");
                notifier.notify(Notice::error(GENERIC_FAILURE));
                None
            }
        }
    })
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Keeps every notice for assertions.
    #[derive(Default)]
    pub struct RecordingNotifier {
        pub notices: Mutex<Vec<Notice>>,
    }

    impl RecordingNotifier {
        pub fn taken(&self) -> Vec<Notice> {
            std::mem::take(&mut *self.notices.lock().unwrap())
        }
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, notice: Notice) {
            self.notices.lock().unwrap().push(notice);
        }
    }
}
