//! 发送限流 - 按通知类型维护小时/天两个滚动窗口
//!
//! 窗口惰性推进：每次检查或记录前，如果当前时间已越过
//! `window_start + length`，计数清零并把 `window_start` 对齐到当前窗口起点。
//! 未配置的桶视为不限流；配置为 0 表示该类型被禁用。

use super::kind::NotificationType;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 窗口粒度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    Hour,
    Day,
}

impl Granularity {
    pub fn length(&self) -> Duration {
        match self {
            Granularity::Hour => Duration::hours(1),
            Granularity::Day => Duration::days(1),
        }
    }

    /// 把时间向下对齐到窗口起点（基于 UTC epoch 秒）
    pub fn floor(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let len = self.length().num_seconds();
        let secs = now.timestamp();
        let start = secs - secs.rem_euclid(len);
        Utc.timestamp_opt(start, 0).single().unwrap_or(now)
    }

    fn exceeded_reason(&self) -> &'static str {
        match self {
            Granularity::Hour => "hourly limit exceeded",
            Granularity::Day => "daily limit exceeded",
        }
    }
}

/// 单个窗口的计数状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateWindow {
    pub count: u32,
    pub window_start: DateTime<Utc>,
}

impl RateWindow {
    fn new(granularity: Granularity, now: DateTime<Utc>) -> Self {
        Self {
            count: 0,
            window_start: granularity.floor(now),
        }
    }

    fn roll_forward(&mut self, granularity: Granularity, now: DateTime<Utc>) {
        if now >= self.window_start + granularity.length() {
            self.count = 0;
            self.window_start = granularity.floor(now);
        }
    }
}

/// 每类型、每粒度的上限配置
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimits {
    #[serde(default)]
    pub hourly: HashMap<NotificationType, u32>,
    #[serde(default)]
    pub daily: HashMap<NotificationType, u32>,
}

impl RateLimits {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(mut self, kind: NotificationType, granularity: Granularity, limit: u32) -> Self {
        self.set(kind, granularity, limit);
        self
    }

    pub fn set(&mut self, kind: NotificationType, granularity: Granularity, limit: u32) {
        match granularity {
            Granularity::Hour => self.hourly.insert(kind, limit),
            Granularity::Day => self.daily.insert(kind, limit),
        };
    }

    /// `None` 表示不限
    pub fn get(&self, kind: NotificationType, granularity: Granularity) -> Option<u32> {
        match granularity {
            Granularity::Hour => self.hourly.get(&kind).copied(),
            Granularity::Day => self.daily.get(&kind).copied(),
        }
    }
}

/// 限流检查结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateVerdict {
    Allowed,
    Denied(&'static str),
}

/// 当前窗口用量（用于状态展示）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WindowUsage {
    pub hour_count: u32,
    pub hour_limit: Option<u32>,
    pub day_count: u32,
    pub day_limit: Option<u32>,
}

/// 滚动窗口限流器
#[derive(Debug, Clone, Default)]
pub struct RateLimiter {
    limits: RateLimits,
    windows: HashMap<(NotificationType, Granularity), RateWindow>,
}

const GRANULARITIES: [Granularity; 2] = [Granularity::Hour, Granularity::Day];

impl RateLimiter {
    pub fn new(limits: RateLimits) -> Self {
        Self {
            limits,
            windows: HashMap::new(),
        }
    }

    pub fn limits(&self) -> &RateLimits {
        &self.limits
    }

    /// 检查是否还有配额；先检查小时窗口，再检查天窗口
    pub fn can_send(&mut self, kind: NotificationType, now: DateTime<Utc>) -> RateVerdict {
        for granularity in GRANULARITIES {
            let Some(limit) = self.limits.get(kind, granularity) else {
                continue;
            };
            let window = self.window_mut(kind, granularity, now);
            if window.count >= limit {
                return RateVerdict::Denied(granularity.exceeded_reason());
            }
        }
        RateVerdict::Allowed
    }

    /// 记录一次成功发送（两个窗口都加一）
    pub fn record_sent(&mut self, kind: NotificationType, now: DateTime<Utc>) {
        for granularity in GRANULARITIES {
            let window = self.window_mut(kind, granularity, now);
            window.count = window.count.saturating_add(1);
        }
    }

    pub fn usage(&mut self, kind: NotificationType, now: DateTime<Utc>) -> WindowUsage {
        let hour_count = self.window_mut(kind, Granularity::Hour, now).count;
        let day_count = self.window_mut(kind, Granularity::Day, now).count;
        WindowUsage {
            hour_count,
            hour_limit: self.limits.get(kind, Granularity::Hour),
            day_count,
            day_limit: self.limits.get(kind, Granularity::Day),
        }
    }

    /// 获取（必要时创建并推进）窗口
    fn window_mut(
        &mut self,
        kind: NotificationType,
        granularity: Granularity,
        now: DateTime<Utc>,
    ) -> &mut RateWindow {
        let window = self
            .windows
            .entry((kind, granularity))
            .or_insert_with(|| RateWindow::new(granularity, now));
        window.roll_forward(granularity, now);
        window
    }

    #[cfg(test)]
    fn window(&self, kind: NotificationType, granularity: Granularity) -> Option<&RateWindow> {
        self.windows.get(&(kind, granularity))
    }
}
