//! 通知系统构建器 - 根据配置组装闸门和渠道

use super::audit::AuditLog;
use super::channels::{ConsoleChannel, DesktopChannel, EmailChannel, LocalFileChannel};
use super::clock::{Clock, SystemClock};
use super::dispatcher::Dispatcher;
use super::gate::NotificationGate;
use super::ledger::DedupLedger;
use super::rate_limiter::RateLimiter;
use super::store::DedupStore;
use crate::config::{DeliveryMode, ScoutConfig};
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

/// 通知系统构建器
pub struct NotificationBuilder {
    config: ScoutConfig,
    clock: Arc<dyn Clock>,
    dry_run: bool,
}

impl NotificationBuilder {
    pub fn new(config: ScoutConfig) -> Self {
        Self {
            config,
            clock: Arc::new(SystemClock),
            dry_run: false,
        }
    }

    /// 设置 dry-run 模式
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// 覆盖投递模式
    pub fn mode(mut self, mode: DeliveryMode) -> Self {
        self.config.mode = mode;
        self
    }

    /// 替换时钟（测试用）
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// 只构建准入闸门（status / cleanup 使用）
    pub fn build_gate(&self) -> Result<NotificationGate> {
        let retention = self.config.dedup_retention();
        let ledger = if self.config.dedup_persist {
            std::fs::create_dir_all(&self.config.log_dir).with_context(|| {
                format!("Failed to create log directory {}", self.config.log_dir.display())
            })?;
            let store = DedupStore::in_dir(&self.config.log_dir);
            DedupLedger::open(store, retention, self.clock.now())
                .context("Failed to load dedup ledger")?
        } else {
            DedupLedger::in_memory(retention)
        };

        let limiter = RateLimiter::new(self.config.limits.clone());
        Ok(NotificationGate::new(limiter, ledger, self.clock.clone()))
    }

    /// 构建 Dispatcher；日志目录无法创建或邮件配置不完整时报错
    pub fn build(self) -> Result<Dispatcher> {
        let audit = Arc::new(AuditLog::open(&self.config.log_dir)?);
        let gate = self.build_gate()?;

        let mut dispatcher = Dispatcher::new(gate)
            .with_mode(self.config.mode)
            .with_dry_run(self.dry_run)
            .with_audit(audit.clone());

        if self.config.console {
            dispatcher.register_channel(Arc::new(ConsoleChannel::new()));
        }

        dispatcher.register_channel(Arc::new(LocalFileChannel::new(audit.clone())));

        if let Some(email) = &self.config.email {
            email.validate()?;
            info!(
                channel = "email",
                host = %email.smtp_host,
                port = email.smtp_port,
                to = %email.to,
                "Detected SMTP configuration"
            );
            dispatcher.register_channel(Arc::new(EmailChannel::from_config(email)));
        } else if self.config.mode == DeliveryMode::Digest {
            warn!("Digest mode requested but email is not configured");
        }

        if self.config.desktop {
            match DesktopChannel::detect() {
                Some(channel) => dispatcher.register_channel(Arc::new(channel.with_audit(audit))),
                None => warn!(channel = "desktop", "No desktop notification command found"),
            }
        }

        Ok(dispatcher)
    }
}
