//! 通知准入闸门 - 组合去重账本和限流器
//!
//! 一次通知分两步：`can_send` 准入检查，渠道确认送达后 `record_sent` 提交。
//! 两部分状态放在同一把锁后面；`with_admission` 在持锁期间完成
//! 检查 → 发送 → 提交，保证同一 `(类型, 主体)` 不会被两个调用方同时放行。

use super::channel::SendResult;
use super::clock::Clock;
use super::kind::NotificationType;
use super::ledger::DedupLedger;
use super::rate_limiter::{RateLimiter, RateVerdict, WindowUsage};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// 去重拒绝原因
pub const REASON_DUPLICATE: &str = "duplicate";

/// 一次准入判断
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationAttempt {
    pub kind: NotificationType,
    pub subject: String,
    pub allowed: bool,
    pub reason: Option<String>,
}

impl NotificationAttempt {
    fn allowed(kind: NotificationType, subject: &str) -> Self {
        Self {
            kind,
            subject: subject.to_string(),
            allowed: true,
            reason: None,
        }
    }

    fn denied(kind: NotificationType, subject: &str, reason: impl Into<String>) -> Self {
        Self {
            kind,
            subject: subject.to_string(),
            allowed: false,
            reason: Some(reason.into()),
        }
    }

    pub fn reason(&self) -> &str {
        self.reason.as_deref().unwrap_or("")
    }
}

/// `with_admission` 的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// 已送达并提交
    Sent,
    /// 准入被拒（重复或限流），没有调用渠道
    Denied(String),
    /// 渠道主动跳过，没有提交
    Skipped(String),
    /// 送达失败，没有提交
    Failed(String),
}

/// 状态快照
#[derive(Debug, Clone, Serialize)]
pub struct GateStats {
    pub dedup_entries: usize,
    pub retention_hours: i64,
    pub usage: BTreeMap<NotificationType, WindowUsage>,
}

/// 配置的限额（`None` 表示不限）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConfiguredLimit {
    pub hourly: Option<u32>,
    pub daily: Option<u32>,
}

/// `scout status` 的输出
///
/// 限流计数只存在于进程内存中，新进程里恒为 0，这里只展示配置的限额和落盘的去重账本。
#[derive(Debug, Clone, Serialize)]
pub struct StatusView {
    pub dedup_entries: usize,
    pub retention_hours: i64,
    pub limits: BTreeMap<NotificationType, ConfiguredLimit>,
}

impl From<&GateStats> for StatusView {
    fn from(stats: &GateStats) -> Self {
        let limits = stats
            .usage
            .iter()
            .map(|(kind, usage)| {
                (
                    *kind,
                    ConfiguredLimit {
                        hourly: usage.hour_limit,
                        daily: usage.day_limit,
                    },
                )
            })
            .collect();
        Self {
            dedup_entries: stats.dedup_entries,
            retention_hours: stats.retention_hours,
            limits,
        }
    }
}

struct GateState {
    limiter: RateLimiter,
    ledger: DedupLedger,
}

impl GateState {
    fn check(&mut self, kind: NotificationType, subject: &str, now: DateTime<Utc>) -> NotificationAttempt {
        if self.ledger.has_sent(kind, subject, now) {
            return NotificationAttempt::denied(kind, subject, REASON_DUPLICATE);
        }
        match self.limiter.can_send(kind, now) {
            RateVerdict::Allowed => NotificationAttempt::allowed(kind, subject),
            RateVerdict::Denied(reason) => NotificationAttempt::denied(kind, subject, reason),
        }
    }

    fn commit(&mut self, kind: NotificationType, subject: &str, now: DateTime<Utc>) {
        self.limiter.record_sent(kind, now);
        self.ledger.record(kind, subject, now);
    }
}

/// 通知准入闸门
pub struct NotificationGate {
    state: Mutex<GateState>,
    clock: Arc<dyn Clock>,
}

impl NotificationGate {
    pub fn new(limiter: RateLimiter, ledger: DedupLedger, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(GateState { limiter, ledger }),
            clock,
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// 准入检查：先去重，再限流
    pub fn can_send(&self, kind: NotificationType, subject: &str) -> NotificationAttempt {
        let now = self.clock.now();
        self.lock().check(kind, subject, now)
    }

    /// 提交一次已确认送达的通知
    pub fn record_sent(&self, kind: NotificationType, subject: &str) {
        let now = self.clock.now();
        self.lock().commit(kind, subject, now);
    }

    /// 持锁执行 检查 → 发送 → 提交
    ///
    /// 只有 `send` 返回 `SendResult::Sent` 时才提交；`Err` 按送达失败处理。
    pub fn with_admission<F>(&self, kind: NotificationType, subject: &str, send: F) -> Admission
    where
        F: FnOnce() -> Result<SendResult>,
    {
        let mut state = self.lock();

        let attempt = state.check(kind, subject, self.clock.now());
        if !attempt.allowed {
            debug!(kind = %kind, subject = %subject, reason = attempt.reason(), "Admission denied");
            return Admission::Denied(attempt.reason().to_string());
        }

        match send() {
            Ok(SendResult::Sent) => {
                state.commit(kind, subject, self.clock.now());
                Admission::Sent
            }
            Ok(SendResult::Skipped(reason)) => Admission::Skipped(reason),
            Ok(SendResult::Failed(reason)) => Admission::Failed(reason),
            Err(e) => Admission::Failed(format!("{:#}", e)),
        }
    }

    /// 清理过期去重记录并重写持久化文件
    pub fn compact(&self) -> Result<usize> {
        let now = self.clock.now();
        self.lock().ledger.compact(now)
    }

    pub fn stats(&self) -> GateStats {
        let now = self.clock.now();
        let mut state = self.lock();
        let usage = NotificationType::ALL
            .iter()
            .map(|kind| (*kind, state.limiter.usage(*kind, now)))
            .collect();
        GateStats {
            dedup_entries: state.ledger.len(),
            retention_hours: state.ledger.retention().num_hours(),
            usage,
        }
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        // 锁被毒化时沿用内部状态
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}
