//! 通知渠道 trait 定义

use crate::issue::Issue;
use anyhow::Result;
use chrono::NaiveDate;

use super::kind::{digest_subject, NotificationType};

/// 消息主体
#[derive(Debug, Clone, PartialEq)]
pub enum MessageBody {
    /// 单个 Issue（新 Issue 提醒、认领确认/请求）
    Issue(Issue),
    /// 摘要：一封邮件包含多个 Issue
    Digest { date: NaiveDate, issues: Vec<Issue> },
}

/// 通知消息
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationMessage {
    /// 通知类型（决定限流桶和去重命名空间）
    pub kind: NotificationType,
    /// 去重主体（Issue URL 或 `digest:<date>`）
    pub subject: String,
    pub body: MessageBody,
}

impl NotificationMessage {
    /// 新 Issue 提醒
    pub fn new_issue(issue: &Issue) -> Self {
        Self {
            kind: NotificationType::NewIssue,
            subject: issue.url.clone(),
            body: MessageBody::Issue(issue.clone()),
        }
    }

    /// 认领相关通知
    pub fn assignment(issue: &Issue, kind: NotificationType) -> Self {
        Self {
            kind,
            subject: issue.url.clone(),
            body: MessageBody::Issue(issue.clone()),
        }
    }

    /// 摘要通知
    pub fn digest(date: NaiveDate, issues: Vec<Issue>) -> Self {
        Self {
            kind: NotificationType::Digest,
            subject: digest_subject(date),
            body: MessageBody::Digest { date, issues },
        }
    }

    /// 消息涉及的所有 Issue（按插入顺序）
    pub fn issues(&self) -> &[Issue] {
        match &self.body {
            MessageBody::Issue(issue) => std::slice::from_ref(issue),
            MessageBody::Digest { issues, .. } => issues,
        }
    }

    /// 消息中的最高分
    pub fn max_score(&self) -> f64 {
        self.issues()
            .iter()
            .map(|i| i.score)
            .fold(0.0, f64::max)
    }
}

/// 渠道种类（封闭集合）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    Console,
    LogFile,
    Email,
    Desktop,
}

impl ChannelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::Console => "console",
            ChannelKind::LogFile => "log_file",
            ChannelKind::Email => "email",
            ChannelKind::Desktop => "desktop",
        }
    }

    /// 经过准入闸门时使用的通知类型；`None` 表示本地尽力而为，不限流不去重
    pub fn gate_type(&self, message_kind: NotificationType) -> Option<NotificationType> {
        match self {
            ChannelKind::Console | ChannelKind::LogFile => None,
            ChannelKind::Email => Some(message_kind),
            ChannelKind::Desktop => Some(NotificationType::Desktop),
        }
    }

    /// 摘要模式下是否改为批量发送（只有邮件按条计费）
    pub fn batched_in_digest(&self) -> bool {
        matches!(self, ChannelKind::Email)
    }
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 发送结果
#[derive(Debug, Clone, PartialEq)]
pub enum SendResult {
    /// 发送成功
    Sent,
    /// 跳过（不符合渠道过滤条件）
    Skipped(String),
    /// 发送失败
    Failed(String),
}

/// 通知渠道 trait
///
/// `send` 返回 `Ok(Failed)` 表示送达失败（可在下次运行重试），
/// 返回 `Err` 表示本地错误；分发器对两者都只记录日志，不中断批处理。
pub trait NotificationChannel: Send + Sync {
    /// 渠道名称（用于日志和报告）
    fn name(&self) -> &str;

    fn kind(&self) -> ChannelKind;

    /// 是否应该发送此消息（渠道自己的过滤条件）
    fn should_send(&self, message: &NotificationMessage) -> bool;

    /// 同步发送消息
    fn send(&self, message: &NotificationMessage) -> Result<SendResult>;
}
