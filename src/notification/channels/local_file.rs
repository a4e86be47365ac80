//! 本地文件渠道 - 将通知写入 notifications.log

use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::notification::audit::AuditLog;
use crate::notification::channel::{ChannelKind, NotificationChannel, NotificationMessage, SendResult};
use crate::notification::priority::Priority;

/// 本地文件渠道 - 记录所有通知到审计文件
pub struct LocalFileChannel {
    audit: Arc<AuditLog>,
}

impl LocalFileChannel {
    pub fn new(audit: Arc<AuditLog>) -> Self {
        Self { audit }
    }
}

impl NotificationChannel for LocalFileChannel {
    fn name(&self) -> &str {
        "local_file"
    }

    fn kind(&self) -> ChannelKind {
        ChannelKind::LogFile
    }

    fn should_send(&self, _message: &NotificationMessage) -> bool {
        // 记录所有通知
        true
    }

    fn send(&self, message: &NotificationMessage) -> Result<SendResult> {
        for issue in message.issues() {
            let priority = Priority::from_score(issue.score);
            if let Err(e) = self
                .audit
                .record_notification(&issue.title, &issue.url, issue.score, priority)
            {
                warn!(
                    channel = "local_file",
                    error = %e,
                    "Failed to write notification to local file"
                );
                return Ok(SendResult::Failed(e.to_string()));
            }
        }

        debug!(
            channel = "local_file",
            subject = %message.subject,
            "Notification recorded to local file"
        );
        Ok(SendResult::Sent)
    }
}
