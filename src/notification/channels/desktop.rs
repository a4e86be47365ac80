//! 桌面通知渠道 - 调用系统通知命令

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::process::Command;
use std::sync::Arc;
use tracing::{info, warn};

use crate::notification::audit::AuditLog;
use crate::notification::channel::{ChannelKind, NotificationChannel, NotificationMessage, SendResult};
use crate::notification::formatter::MessageFormatter;
use crate::notification::priority::Priority;

/// 通知命令的参数风格
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DesktopBackend {
    /// `notify-send -u normal -t 10000 -i dialog-information <title> <body>`
    NotifySend,
    /// `osascript -e 'display notification ...'`
    AppleScript,
}

pub struct DesktopChannel {
    program: PathBuf,
    backend: DesktopBackend,
    audit: Option<Arc<AuditLog>>,
}

impl DesktopChannel {
    pub fn new(program: impl Into<PathBuf>, backend: DesktopBackend) -> Self {
        Self {
            program: program.into(),
            backend,
            audit: None,
        }
    }

    /// 检测可用的通知命令；都不存在时返回 None
    pub fn detect() -> Option<Self> {
        if let Ok(path) = which::which("notify-send") {
            return Some(Self::new(path, DesktopBackend::NotifySend));
        }
        if cfg!(target_os = "macos") {
            if let Ok(path) = which::which("osascript") {
                return Some(Self::new(path, DesktopBackend::AppleScript));
            }
        }
        None
    }

    /// 送达后追加一行 `Desktop` 审计记录
    pub fn with_audit(mut self, audit: Arc<AuditLog>) -> Self {
        self.audit = Some(audit);
        self
    }

    fn build_args(&self, title: &str, body: &str) -> Vec<String> {
        match self.backend {
            DesktopBackend::NotifySend => vec![
                "-u".to_string(),
                "normal".to_string(),
                "-t".to_string(),
                "10000".to_string(),
                "-i".to_string(),
                "dialog-information".to_string(),
                title.to_string(),
                body.to_string(),
            ],
            DesktopBackend::AppleScript => vec![
                "-e".to_string(),
                format!(
                    "display notification \"{}\" with title \"{}\"",
                    escape_applescript(body),
                    escape_applescript(title)
                ),
            ],
        }
    }
}

fn escape_applescript(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

impl NotificationChannel for DesktopChannel {
    fn name(&self) -> &str {
        "desktop"
    }

    fn kind(&self) -> ChannelKind {
        ChannelKind::Desktop
    }

    fn should_send(&self, _message: &NotificationMessage) -> bool {
        true
    }

    fn send(&self, message: &NotificationMessage) -> Result<SendResult> {
        let (title, body) = MessageFormatter::desktop_alert(message);

        let output = Command::new(&self.program)
            .args(self.build_args(&title, &body))
            .output()
            .with_context(|| format!("Failed to run {}", self.program.display()));

        let output = match output {
            Ok(o) => o,
            Err(e) => {
                warn!(channel = "desktop", error = %e, "Desktop notification failed");
                return Ok(SendResult::Failed(format!("{:#}", e)));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(
                channel = "desktop",
                status = %output.status,
                stderr = %stderr.trim(),
                "Desktop notification command failed"
            );
            return Ok(SendResult::Failed(format!(
                "{} exited with {}",
                self.program.display(),
                output.status
            )));
        }

        info!(channel = "desktop", subject = %message.subject, "Desktop notification sent");

        if let Some(audit) = &self.audit {
            for issue in message.issues() {
                if let Err(e) = audit.record_notification(&issue.title, &issue.url, issue.score, Priority::Desktop) {
                    warn!(channel = "desktop", error = %e, "Failed to record desktop notification");
                }
            }
        }

        Ok(SendResult::Sent)
    }
}
