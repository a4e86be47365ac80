//! 通知类型：决定使用哪个限流桶和去重命名空间

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    NewIssue,
    Digest,
    AssignmentConfirmation,
    AssignmentRequest,
    Desktop,
}

impl NotificationType {
    pub const ALL: [NotificationType; 5] = [
        NotificationType::NewIssue,
        NotificationType::Digest,
        NotificationType::AssignmentConfirmation,
        NotificationType::AssignmentRequest,
        NotificationType::Desktop,
    ];

    /// 走邮件通道的类型（共享邮件配额配置）
    pub const EMAIL: [NotificationType; 4] = [
        NotificationType::NewIssue,
        NotificationType::Digest,
        NotificationType::AssignmentConfirmation,
        NotificationType::AssignmentRequest,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::NewIssue => "new_issue",
            NotificationType::Digest => "digest",
            NotificationType::AssignmentConfirmation => "assignment_confirmation",
            NotificationType::AssignmentRequest => "assignment_request",
            NotificationType::Desktop => "desktop",
        }
    }
}

impl std::fmt::Display for NotificationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 摘要邮件的去重主体：每天一封
pub fn digest_subject(date: chrono::NaiveDate) -> String {
    format!("digest:{}", date.format("%Y-%m-%d"))
}
