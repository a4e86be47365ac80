//! 通知分发核心
//!
//! # 组成
//! 1. 准入：`RateLimiter`（小时/天窗口）+ `DedupLedger`（保留期去重），由 `NotificationGate` 组合
//! 2. 渠道：console / 本地日志 / 邮件 / 桌面，统一实现 `NotificationChannel` trait
//! 3. 分发：`Dispatcher` 按渠道路由，摘要模式下邮件进入 `DigestAccumulator`
//!
//! # 使用示例
//! ```ignore
//! use issue_scout::{NotificationBuilder, ScoutConfig};
//!
//! let mut dispatcher = NotificationBuilder::new(ScoutConfig::load()?).build()?;
//! let report = dispatcher.dispatch(&issues);
//! dispatcher.finish();
//! ```

pub mod audit;
pub mod builder;
pub mod channel;
pub mod channels;
pub mod clock;
pub mod digest;
pub mod dispatcher;
pub mod formatter;
pub mod gate;
pub mod kind;
pub mod ledger;
pub mod priority;
pub mod rate_limiter;
pub mod store;

pub use audit::AuditLog;
pub use builder::NotificationBuilder;
pub use channel::{ChannelKind, MessageBody, NotificationChannel, NotificationMessage, SendResult};
pub use clock::{Clock, ManualClock, SystemClock};
pub use digest::DigestAccumulator;
pub use dispatcher::{ChannelOutcome, DispatchOutcome, DispatchReport, Dispatcher};
pub use formatter::{EmailContent, MessageFormatter};
pub use gate::{Admission, ConfiguredLimit, GateStats, NotificationAttempt, NotificationGate, StatusView};
pub use kind::NotificationType;
pub use ledger::DedupLedger;
pub use priority::Priority;
pub use rate_limiter::{Granularity, RateLimiter, RateLimits, RateVerdict, WindowUsage};
pub use store::{DedupEntry, DedupStore};
