//! 摘要累加器 - 摘要模式下把邮件合并成一封

use chrono::NaiveDate;
use tracing::{info, warn};

use super::channel::{NotificationChannel, NotificationMessage};
use super::gate::{Admission, NotificationGate};
use super::kind::NotificationType;
use crate::issue::Issue;

/// 按插入顺序缓存待汇总的 Issue
#[derive(Debug, Default)]
pub struct DigestAccumulator {
    issues: Vec<Issue>,
}

impl DigestAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, issue: Issue) {
        self.issues.push(issue);
    }

    pub fn len(&self) -> usize {
        self.issues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn issues(&self) -> &[Issue] {
        &self.issues
    }

    /// 缓冲区里是否已有该 URL
    pub fn contains(&self, url: &str) -> bool {
        self.issues.iter().any(|i| i.url == url)
    }

    /// 发送一封摘要，返回是否送达
    ///
    /// 一份摘要在闸门中只算一条通知：`(Digest, "digest:<date>")`。
    /// 缓冲区为空时不做任何事；被拒或送达失败时保留缓冲区。
    pub fn flush(
        &mut self,
        gate: &NotificationGate,
        channel: &dyn NotificationChannel,
        today: NaiveDate,
    ) -> bool {
        if self.issues.is_empty() {
            return false;
        }

        let message = NotificationMessage::digest(today, self.issues.clone());
        let admission = gate.with_admission(NotificationType::Digest, &message.subject, || {
            channel.send(&message)
        });

        match admission {
            Admission::Sent => {
                info!(
                    channel = channel.name(),
                    subject = %message.subject,
                    issues = self.issues.len(),
                    "Digest sent"
                );
                self.issues.clear();
                true
            }
            Admission::Denied(reason) => {
                info!(
                    channel = channel.name(),
                    subject = %message.subject,
                    reason = %reason,
                    "Digest not sent"
                );
                false
            }
            Admission::Skipped(reason) => {
                info!(channel = channel.name(), reason = %reason, "Digest skipped by channel");
                false
            }
            Admission::Failed(reason) => {
                warn!(
                    channel = channel.name(),
                    subject = %message.subject,
                    error = %reason,
                    "Digest delivery failed"
                );
                false
            }
        }
    }
}
