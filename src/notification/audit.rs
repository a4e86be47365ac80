//! 审计日志 - 日志目录下的两个只追加文件
//!
//! - `notifications.log`：每条已发送通知一行，`title|url|score|priority`
//! - `issues.log`：带时间戳的运行事件

use super::priority::Priority;
use anyhow::{Context, Result};
use chrono::Local;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;

pub const NOTIFICATIONS_FILE: &str = "notifications.log";
pub const RUN_LOG_FILE: &str = "issues.log";

/// 审计日志（持有打开的文件句柄，drop 时关闭）
pub struct AuditLog {
    dir: PathBuf,
    notifications: Mutex<File>,
    run_log: Mutex<File>,
}

impl AuditLog {
    /// 创建日志目录并打开文件；目录无法创建属于配置错误
    pub fn open(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create log directory {}", dir.display()))?;

        let notifications = open_append(&dir.join(NOTIFICATIONS_FILE))?;
        let run_log = open_append(&dir.join(RUN_LOG_FILE))?;

        Ok(Self {
            dir: dir.to_path_buf(),
            notifications: Mutex::new(notifications),
            run_log: Mutex::new(run_log),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// 追加一条通知记录
    pub fn record_notification(&self, title: &str, url: &str, score: f64, priority: Priority) -> Result<()> {
        let line = format_notification_line(title, url, score, priority);
        let mut file = self.notifications.lock().unwrap_or_else(|e| e.into_inner());
        append_line(&mut file, &line)?;
        file.sync_data()?;
        Ok(())
    }

    /// 记录运行事件；写失败只告警
    pub fn log_event(&self, message: &str) {
        let line = format!("[{}] {}\n", Local::now().format("%Y-%m-%d %H:%M:%S"), message);
        let mut file = self.run_log.lock().unwrap_or_else(|e| e.into_inner());
        if let Err(e) = append_line(&mut file, &line) {
            warn!(file = RUN_LOG_FILE, error = %e, "Failed to append run log");
        }
    }
}

/// `title|url|score(%.2f)|priority`；字段内的 `|` 和换行替换为空格
pub fn format_notification_line(title: &str, url: &str, score: f64, priority: Priority) -> String {
    format!(
        "{}|{}|{:.2}|{}\n",
        sanitize_field(title),
        sanitize_field(url),
        score,
        priority
    )
}

fn sanitize_field(s: &str) -> String {
    s.replace(['|', '\n', '\r'], " ")
}

fn open_append(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open {}", path.display()))
}

/// 单次 write 调用写入整行（带文件锁）
fn append_line(file: &mut File, line: &str) -> Result<()> {
    use fs2::FileExt;

    file.lock_exclusive()?;
    let written = file.write_all(line.as_bytes());
    file.unlock()?;
    written?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_creates_directory_and_files() {
        let dir = TempDir::new().unwrap();
        let log_dir = dir.path().join("nested").join("logs");

        let audit = AuditLog::open(&log_dir).unwrap();
        assert_eq!(audit.dir(), log_dir.as_path());
        assert!(log_dir.join(NOTIFICATIONS_FILE).exists());
        assert!(log_dir.join(RUN_LOG_FILE).exists());
    }

    #[test]
    fn test_open_fails_when_dir_is_a_file() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("logs");
        fs::write(&blocker, "not a dir").unwrap();

        assert!(AuditLog::open(&blocker).is_err());
    }

    #[test]
    fn test_record_notification_format() {
        let dir = TempDir::new().unwrap();
        let audit = AuditLog::open(dir.path()).unwrap();

        audit
            .record_notification("Fix crash", "https://x/y/1", 0.856, Priority::High)
            .unwrap();
        audit
            .record_notification("Pipe | in title", "https://x/y/2", 0.5, Priority::Desktop)
            .unwrap();

        let content = fs::read_to_string(dir.path().join(NOTIFICATIONS_FILE)).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines, vec!["Fix crash|https://x/y/1|0.86|High", "Pipe   in title|https://x/y/2|0.50|Desktop"]);
    }

    #[test]
    fn test_log_event_is_timestamped() {
        let dir = TempDir::new().unwrap();
        let audit = AuditLog::open(dir.path()).unwrap();

        audit.log_event("Found 3 new issues");

        let content = fs::read_to_string(dir.path().join(RUN_LOG_FILE)).unwrap();
        assert!(content.starts_with('['));
        assert!(content.trim_end().ends_with("] Found 3 new issues"));
    }

    #[test]
    fn test_reopen_appends() {
        let dir = TempDir::new().unwrap();
        {
            let audit = AuditLog::open(dir.path()).unwrap();
            audit.record_notification("a", "u1", 0.1, Priority::Low).unwrap();
        }
        let audit = AuditLog::open(dir.path()).unwrap();
        audit.record_notification("b", "u2", 0.7, Priority::Medium).unwrap();

        let content = fs::read_to_string(dir.path().join(NOTIFICATIONS_FILE)).unwrap();
        assert_eq!(content.lines().count(), 2);
    }
}
