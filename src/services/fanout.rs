//! Best-effort notification fan-out. Runs after a state change has been
//! committed; each channel has its own failure boundary and nothing here can
//! fail the caller.

use futures::future::{join_all, BoxFuture};

pub struct NotificationTask<'a> {
    channel: &'static str,
    future: BoxFuture<'a, anyhow::Result<()>>,
}

impl<'a> NotificationTask<'a> {
    pub fn new(channel: &'static str, future: BoxFuture<'a, anyhow::Result<()>>) -> Self {
        Self { channel, future }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FanOutReport {
    pub delivered: Vec<&'static str>,
    pub failed: Vec<&'static str>,
}

impl FanOutReport {
    pub fn all_delivered(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Runs every task concurrently. `subject` identifies what the notifications
/// are about (content id, record id) in the logs.
pub async fn dispatch(subject: &str, tasks: Vec<NotificationTask<'_>>) -> FanOutReport {
    let channels: Vec<&'static str> = tasks.iter().map(|t| t.channel).collect();
    let results = join_all(tasks.into_iter().map(|t| t.future)).await;

    let mut report = FanOutReport::default();
    for (channel, result) in channels.into_iter().zip(results) {
        match result {
            Ok(()) => {
                tracing::debug!(subject, channel, "Notification delivered");
                report.delivered.push(channel);
            }
            Err(e) => {
                tracing::error!(subject, channel, error = ?e, "Notification failed");
                report.failed.push(channel);
            }
        }
    }
    report
}
