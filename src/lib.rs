//! Issue Scout - 对已评分的 GitHub Issue 做限流、去重的多渠道通知

pub mod config;
pub mod issue;
pub mod notification;

pub use config::{DeliveryMode, EmailConfig, FileConfig, ScoutConfig};
pub use issue::{load_issues, parse_issues, Classification, Issue, Project};
pub use notification::{
    DispatchOutcome, DispatchReport, Dispatcher, NotificationBuilder, NotificationGate, NotificationType,
    SendResult,
};
