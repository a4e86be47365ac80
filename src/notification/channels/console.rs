//! 控制台渠道 - 把 Issue 卡片打印到 stdout

use anyhow::Result;
use std::io::Write;
use std::sync::Mutex;

use crate::notification::channel::{ChannelKind, NotificationChannel, NotificationMessage, SendResult};
use crate::notification::formatter::MessageFormatter;

pub struct ConsoleChannel {
    out: Mutex<Box<dyn Write + Send>>,
}

impl ConsoleChannel {
    pub fn new() -> Self {
        Self::with_writer(Box::new(std::io::stdout()))
    }

    /// 自定义输出（测试用）
    pub fn with_writer(out: Box<dyn Write + Send>) -> Self {
        Self { out: Mutex::new(out) }
    }
}

impl Default for ConsoleChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationChannel for ConsoleChannel {
    fn name(&self) -> &str {
        "console"
    }

    fn kind(&self) -> ChannelKind {
        ChannelKind::Console
    }

    fn should_send(&self, _message: &NotificationMessage) -> bool {
        true
    }

    fn send(&self, message: &NotificationMessage) -> Result<SendResult> {
        let mut out = self.out.lock().unwrap_or_else(|e| e.into_inner());
        for issue in message.issues() {
            writeln!(out, "{}", MessageFormatter::console_card(issue))?;
        }
        out.flush()?;
        Ok(SendResult::Sent)
    }
}
