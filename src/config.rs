//! 运行配置：默认值 → `~/.config/issue-scout/config.json` → 环境变量

use crate::notification::kind::NotificationType;
use crate::notification::ledger::DEFAULT_RETENTION_HOURS;
use crate::notification::rate_limiter::{Granularity, RateLimits};
use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

pub const DEFAULT_SMTP_PORT: u16 = 587;
pub const DEFAULT_MAX_EMAILS_PER_HOUR: u32 = 10;
pub const DEFAULT_MAX_EMAILS_PER_DAY: u32 = 50;
pub const DEFAULT_SMTP_TIMEOUT_SECS: u64 = 30;

/// 投递模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    /// 每个 Issue 一封邮件
    #[default]
    Instant,
    /// 邮件按批次汇总
    Digest,
}

impl FromStr for DeliveryMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "instant" => Ok(DeliveryMode::Instant),
            "digest" => Ok(DeliveryMode::Digest),
            other => Err(anyhow!("unknown delivery mode {:?} (expected instant or digest)", other)),
        }
    }
}

/// SMTP 配置
#[derive(Debug, Clone, PartialEq)]
pub struct EmailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
    pub to: String,
    /// 低于该分数的 Issue 不发邮件
    pub min_score: f64,
    /// 连接/整体超时
    pub timeout_secs: u64,
}

impl EmailConfig {
    /// 检查必填项
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("SMTP_HOST", &self.smtp_host),
            ("SMTP_USERNAME", &self.username),
            ("SMTP_PASSWORD", &self.password),
            ("FROM_EMAIL", &self.from),
            ("TO_EMAIL", &self.to),
        ];
        for (key, value) in required {
            if value.trim().is_empty() {
                bail!("incomplete SMTP configuration: {} is required", key);
            }
        }
        if !self.to.contains('@') || !self.from.contains('@') {
            bail!("FROM_EMAIL and TO_EMAIL must be email addresses");
        }
        Ok(())
    }
}

/// 配置文件内容（字段全部可选）
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub log_dir: Option<PathBuf>,
    pub smtp_host: Option<String>,
    pub smtp_port: Option<u16>,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub from_email: Option<String>,
    pub to_email: Option<String>,
    pub email_mode: Option<DeliveryMode>,
    pub email_min_score: Option<f64>,
    pub smtp_timeout_secs: Option<u64>,
    pub max_emails_per_hour: Option<u32>,
    pub max_emails_per_day: Option<u32>,
    /// 按类型细分的上限，覆盖上面的邮件总配置
    pub limits: Option<RateLimits>,
    pub dedup_retention_hours: Option<i64>,
    pub dedup_persist: Option<bool>,
    pub desktop_notify: Option<bool>,
    pub console: Option<bool>,
}

impl FileConfig {
    pub fn read(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config = serde_json::from_str(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        Ok(Some(config))
    }
}

/// 运行配置
#[derive(Debug, Clone, PartialEq)]
pub struct ScoutConfig {
    pub log_dir: PathBuf,
    /// `None` 表示未启用邮件
    pub email: Option<EmailConfig>,
    pub mode: DeliveryMode,
    pub limits: RateLimits,
    pub dedup_retention_hours: i64,
    /// 去重账本是否落盘（`<log_dir>/sent.jsonl`）
    pub dedup_persist: bool,
    pub desktop: bool,
    pub console: bool,
}

impl ScoutConfig {
    /// 配置文件路径
    pub fn config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join("issue-scout")
            .join("config.json")
    }

    /// 从配置文件和进程环境变量加载
    pub fn load() -> Result<Self> {
        let path = Self::config_path();
        let file = FileConfig::read(&path)?;
        if file.is_some() {
            debug!(path = %path.display(), "Using config file");
        }
        Self::from_sources(file.unwrap_or_default(), |key| std::env::var(key).ok())
    }

    /// 合并配置来源；`env` 返回某个环境变量的值
    pub fn from_sources<F>(file: FileConfig, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = |key: &str| env(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let log_dir = env("LOG_DIR")
            .map(PathBuf::from)
            .or(file.log_dir.clone())
            .unwrap_or_else(|| PathBuf::from("logs"));

        let mut mode = file.email_mode.unwrap_or_default();
        if let Some(m) = env("EMAIL_MODE") {
            mode = m.parse().context("Invalid EMAIL_MODE")?;
        }
        if parse_flag(&env, "DIGEST_MODE")?.unwrap_or(false) {
            mode = DeliveryMode::Digest;
        }

        let limits = Self::resolve_limits(&file, &env)?;

        let dedup_retention_hours = parse_env(&env, "DEDUP_RETENTION_HOURS")?
            .or(file.dedup_retention_hours)
            .unwrap_or(DEFAULT_RETENTION_HOURS);
        if dedup_retention_hours <= 0 {
            bail!("DEDUP_RETENTION_HOURS must be positive, got {}", dedup_retention_hours);
        }

        let email = Self::resolve_email(&file, &env)?;

        Ok(Self {
            log_dir,
            email,
            mode,
            limits,
            dedup_retention_hours,
            dedup_persist: parse_flag(&env, "DEDUP_PERSIST")?.or(file.dedup_persist).unwrap_or(true),
            desktop: parse_flag(&env, "DESKTOP_NOTIFY")?.or(file.desktop_notify).unwrap_or(false),
            console: parse_flag(&env, "CONSOLE_NOTIFY")?.or(file.console).unwrap_or(true),
        })
    }

    pub fn dedup_retention(&self) -> chrono::Duration {
        chrono::Duration::hours(self.dedup_retention_hours)
    }

    fn resolve_limits<F>(file: &FileConfig, env: &F) -> Result<RateLimits>
    where
        F: Fn(&str) -> Option<String>,
    {
        let per_hour = parse_env(env, "MAX_EMAILS_PER_HOUR")?;
        let per_day = parse_env(env, "MAX_EMAILS_PER_DAY")?;

        let mut limits = RateLimits::new();
        for kind in NotificationType::EMAIL {
            limits.set(
                kind,
                Granularity::Hour,
                file.max_emails_per_hour.unwrap_or(DEFAULT_MAX_EMAILS_PER_HOUR),
            );
            limits.set(
                kind,
                Granularity::Day,
                file.max_emails_per_day.unwrap_or(DEFAULT_MAX_EMAILS_PER_DAY),
            );
        }

        if let Some(overrides) = &file.limits {
            for (kind, limit) in &overrides.hourly {
                limits.set(*kind, Granularity::Hour, *limit);
            }
            for (kind, limit) in &overrides.daily {
                limits.set(*kind, Granularity::Day, *limit);
            }
        }

        for kind in NotificationType::EMAIL {
            if let Some(limit) = per_hour {
                limits.set(kind, Granularity::Hour, limit);
            }
            if let Some(limit) = per_day {
                limits.set(kind, Granularity::Day, limit);
            }
        }

        if let Some(limit) = parse_env(env, "MAX_DESKTOP_PER_HOUR")? {
            limits.set(NotificationType::Desktop, Granularity::Hour, limit);
        }
        if let Some(limit) = parse_env(env, "MAX_DESKTOP_PER_DAY")? {
            limits.set(NotificationType::Desktop, Granularity::Day, limit);
        }

        Ok(limits)
    }

    fn resolve_email<F>(file: &FileConfig, env: &F) -> Result<Option<EmailConfig>>
    where
        F: Fn(&str) -> Option<String>,
    {
        let Some(raw_host) = env("SMTP_HOST").or(file.smtp_host.clone()) else {
            return Ok(None);
        };

        // SMTP_HOST 可以带端口，显式的 SMTP_PORT 优先
        let (host, embedded_port) = split_host_port(&raw_host)?;
        let smtp_port = parse_env(env, "SMTP_PORT")?
            .or(file.smtp_port)
            .or(embedded_port)
            .unwrap_or(DEFAULT_SMTP_PORT);

        let pick = |key: &str, fallback: &Option<String>| env(key).or(fallback.clone()).unwrap_or_default();

        let email = EmailConfig {
            smtp_host: host,
            smtp_port,
            username: pick("SMTP_USERNAME", &file.smtp_username),
            password: pick("SMTP_PASSWORD", &file.smtp_password),
            from: pick("FROM_EMAIL", &file.from_email),
            to: pick("TO_EMAIL", &file.to_email),
            min_score: parse_env(env, "EMAIL_MIN_SCORE")?
                .or(file.email_min_score)
                .unwrap_or(0.0),
            timeout_secs: parse_env(env, "SMTP_TIMEOUT_SECS")?
                .or(file.smtp_timeout_secs)
                .unwrap_or(DEFAULT_SMTP_TIMEOUT_SECS),
        };
        email.validate()?;

        Ok(Some(email))
    }
}

/// 解析环境变量；值存在但无法解析时报配置错误
fn parse_env<T, F>(env: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    env(key)
        .map(|raw| {
            raw.parse::<T>()
                .map_err(|e| anyhow!("invalid value {:?} for {}: {}", raw, key, e))
        })
        .transpose()
}

/// 布尔开关，接受 true/false、1/0、yes/no、on/off
fn parse_flag<F>(env: &F, key: &str) -> Result<Option<bool>>
where
    F: Fn(&str) -> Option<String>,
{
    env(key)
        .map(|raw| match raw.to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(anyhow!("invalid value {:?} for {}: expected true or false", raw, key)),
        })
        .transpose()
}

fn split_host_port(raw: &str) -> Result<(String, Option<u16>)> {
    match raw.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() => {
            let port = port
                .parse::<u16>()
                .map_err(|e| anyhow!("invalid SMTP host {:?}: {}", raw, e))?;
            Ok((host.to_string(), Some(port)))
        }
        _ => Ok((raw.to_string(), None)),
    }
}
