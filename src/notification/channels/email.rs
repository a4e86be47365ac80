//! 邮件渠道
//!
//! 发送原语抽象为 `MailTransport`；默认实现调用 `curl` 走 SMTP / SMTPS，
//! 连接和整体时长都受 `timeout_secs` 限制，超时按送达失败处理。
//! 账号密码写入权限为 0600 的临时 curl 配置文件，不出现在命令行参数里。

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as B64_ENGINE;
use base64::Engine;
use chrono::Utc;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{info, warn};

use crate::config::EmailConfig;
use crate::notification::channel::{ChannelKind, NotificationChannel, NotificationMessage, SendResult};
use crate::notification::formatter::{EmailContent, MessageFormatter};
use crate::notification::kind::NotificationType;

/// RFC 2047 encoded-word 中单段原文的最大字节数（base64 后不超过 60 字符）
const ENCODED_WORD_CHUNK: usize = 45;

/// 邮件发送原语
pub trait MailTransport: Send + Sync {
    fn send_mail(&self, email: &EmailContent) -> Result<()>;
}

/// 通过 curl 发送 SMTP 邮件
pub struct CurlSmtpTransport {
    config: EmailConfig,
    curl_cmd: PathBuf,
}

impl CurlSmtpTransport {
    pub fn new(config: EmailConfig) -> Self {
        let curl_cmd = which::which("curl").unwrap_or_else(|_| PathBuf::from("curl"));
        Self { config, curl_cmd }
    }

    fn url(&self) -> String {
        // 465 为隐式 TLS，其余端口走 STARTTLS
        let scheme = if self.config.smtp_port == 465 { "smtps" } else { "smtp" };
        format!("{}://{}:{}", scheme, self.config.smtp_host, self.config.smtp_port)
    }

    /// curl 配置文件内容（`-K` 读取）
    fn credentials_config(&self) -> String {
        format!(
            "user = \"{}\"\n",
            escape_curl_config(&format!("{}:{}", self.config.username, self.config.password))
        )
    }

    fn build_args(&self, credentials: &Path) -> Vec<String> {
        let timeout = self.config.timeout_secs.to_string();
        let mut args = vec![
            "--silent".to_string(),
            "--show-error".to_string(),
            "--config".to_string(),
            credentials.display().to_string(),
            "--url".to_string(),
            self.url(),
            "--mail-from".to_string(),
            self.config.from.clone(),
            "--mail-rcpt".to_string(),
            self.config.to.clone(),
            "--upload-file".to_string(),
            "-".to_string(),
            "--connect-timeout".to_string(),
            timeout.clone(),
            "--max-time".to_string(),
            timeout,
        ];
        if self.config.smtp_port != 465 && self.config.smtp_port != 25 {
            args.push("--ssl-reqd".to_string());
        }
        args
    }
}

impl MailTransport for CurlSmtpTransport {
    fn send_mail(&self, email: &EmailContent) -> Result<()> {
        let message = build_mime(&self.config.from, &self.config.to, email);

        // NamedTempFile 在 unix 上以 0600 创建，drop 时删除
        let mut credentials =
            tempfile::NamedTempFile::new().context("Failed to create curl credentials file")?;
        credentials
            .write_all(self.credentials_config().as_bytes())
            .context("Failed to write curl credentials file")?;
        credentials.flush()?;

        let mut child = Command::new(&self.curl_cmd)
            .args(self.build_args(credentials.path()))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to start {}", self.curl_cmd.display()))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(message.as_bytes())
                .context("Failed to stream message to curl")?;
        }

        let output = child.wait_with_output()?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("SMTP delivery via {} failed ({}): {}", self.url(), output.status, stderr.trim());
        }

        Ok(())
    }
}

fn escape_curl_config(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
}

/// 头部字段值：去掉换行，防止注入额外头部
fn header_value(s: &str) -> String {
    s.replace(['\r', '\n'], " ")
}

/// 非 ASCII 的主题按 RFC 2047 编码为 `=?UTF-8?B?...?=`，多段之间折行
pub fn encode_subject(subject: &str) -> String {
    let subject = header_value(subject);
    if subject.is_ascii() {
        return subject;
    }

    let mut words = Vec::new();
    let mut chunk = String::new();
    for ch in subject.chars() {
        if chunk.len() + ch.len_utf8() > ENCODED_WORD_CHUNK {
            words.push(std::mem::take(&mut chunk));
        }
        chunk.push(ch);
    }
    if !chunk.is_empty() {
        words.push(chunk);
    }

    words
        .iter()
        .map(|w| format!("=?UTF-8?B?{}?=", B64_ENGINE.encode(w.as_bytes())))
        .collect::<Vec<_>>()
        .join("\r\n ")
}

/// 组装 multipart/alternative 邮件；只有一种正文时直接发送该类型
pub fn build_mime(from: &str, to: &str, email: &EmailContent) -> String {
    let mut msg = String::new();
    msg.push_str(&format!("From: {}\r\n", header_value(from)));
    msg.push_str(&format!("To: {}\r\n", header_value(to)));
    msg.push_str(&format!("Subject: {}\r\n", encode_subject(&email.subject)));
    msg.push_str(&format!("Date: {}\r\n", Utc::now().to_rfc2822()));
    msg.push_str("MIME-Version: 1.0\r\n");

    match (email.html.is_empty(), email.text.is_empty()) {
        (false, false) => {
            let boundary = format!("issue-scout-{}", Utc::now().timestamp_nanos_opt().unwrap_or_default());
            msg.push_str(&format!(
                "Content-Type: multipart/alternative; boundary=\"{}\"\r\n\r\n",
                boundary
            ));
            msg.push_str(&format!("--{}\r\n", boundary));
            msg.push_str("Content-Type: text/plain; charset=UTF-8\r\n");
            msg.push_str("Content-Transfer-Encoding: 8bit\r\n\r\n");
            msg.push_str(&email.text);
            msg.push_str(&format!("\r\n--{}\r\n", boundary));
            msg.push_str("Content-Type: text/html; charset=UTF-8\r\n");
            msg.push_str("Content-Transfer-Encoding: 8bit\r\n\r\n");
            msg.push_str(&email.html);
            msg.push_str(&format!("\r\n--{}--\r\n", boundary));
        }
        (true, _) => {
            msg.push_str("Content-Type: text/plain; charset=UTF-8\r\n");
            msg.push_str("Content-Transfer-Encoding: 8bit\r\n\r\n");
            msg.push_str(&email.text);
        }
        (false, true) => {
            msg.push_str("Content-Type: text/html; charset=UTF-8\r\n");
            msg.push_str("Content-Transfer-Encoding: 8bit\r\n\r\n");
            msg.push_str(&email.html);
        }
    }

    msg
}

/// 邮件渠道
pub struct EmailChannel {
    transport: Box<dyn MailTransport>,
    /// 新 Issue 邮件的最低分数
    min_score: f64,
}

impl EmailChannel {
    pub fn new(transport: Box<dyn MailTransport>) -> Self {
        Self {
            transport,
            min_score: 0.0,
        }
    }

    pub fn from_config(config: &EmailConfig) -> Self {
        Self::new(Box::new(CurlSmtpTransport::new(config.clone()))).with_min_score(config.min_score)
    }

    pub fn with_min_score(mut self, min_score: f64) -> Self {
        self.min_score = min_score;
        self
    }
}

impl NotificationChannel for EmailChannel {
    fn name(&self) -> &str {
        "email"
    }

    fn kind(&self) -> ChannelKind {
        ChannelKind::Email
    }

    fn should_send(&self, message: &NotificationMessage) -> bool {
        match message.kind {
            NotificationType::NewIssue => message.max_score() >= self.min_score,
            _ => true,
        }
    }

    fn send(&self, message: &NotificationMessage) -> Result<SendResult> {
        let email = MessageFormatter::email(message);

        match self.transport.send_mail(&email) {
            Ok(()) => {
                info!(
                    channel = "email",
                    kind = %message.kind,
                    subject = %message.subject,
                    "Email sent"
                );
                Ok(SendResult::Sent)
            }
            Err(e) => {
                warn!(
                    channel = "email",
                    kind = %message.kind,
                    subject = %message.subject,
                    error = %e,
                    "Email delivery failed"
                );
                Ok(SendResult::Failed(format!("{:#}", e)))
            }
        }
    }
}
