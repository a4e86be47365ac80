//! 通知分发器 - 对每个 Issue、每个渠道做路由、准入、发送和提交

use super::audit::AuditLog;
use super::channel::{ChannelKind, NotificationChannel, NotificationMessage, SendResult};
use super::digest::DigestAccumulator;
use super::gate::{Admission, GateStats, NotificationGate, REASON_DUPLICATE};
use super::kind::NotificationType;
use crate::config::DeliveryMode;
use crate::issue::Issue;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 单个渠道上的处理结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// 已送达
    Sent,
    /// 进入摘要缓冲区
    Queued,
    /// 被闸门拒绝（重复或限流）
    Denied(String),
    /// 渠道过滤或 dry-run
    Skipped(String),
    /// 送达失败，下次运行可重试
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelOutcome {
    pub subject: String,
    pub channel: String,
    pub outcome: DispatchOutcome,
}

/// 一次分发的结果汇总
#[derive(Debug, Clone, Default)]
pub struct DispatchReport {
    /// 参与分发的 Issue 数（不含不合格的）
    pub issues: usize,
    pub outcomes: Vec<ChannelOutcome>,
}

impl DispatchReport {
    fn push(&mut self, subject: &str, channel: &str, outcome: DispatchOutcome) {
        self.outcomes.push(ChannelOutcome {
            subject: subject.to_string(),
            channel: channel.to_string(),
            outcome,
        });
    }

    fn count(&self, pred: impl Fn(&DispatchOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(&o.outcome)).count()
    }

    pub fn sent(&self) -> usize {
        self.count(|o| matches!(o, DispatchOutcome::Sent))
    }

    pub fn queued(&self) -> usize {
        self.count(|o| matches!(o, DispatchOutcome::Queued))
    }

    pub fn denied(&self) -> usize {
        self.count(|o| matches!(o, DispatchOutcome::Denied(_)))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, DispatchOutcome::Skipped(_)))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, DispatchOutcome::Failed(_)))
    }

    /// 某个渠道上的结果（按处理顺序）
    pub fn for_channel<'a>(&'a self, channel: &'a str) -> impl Iterator<Item = &'a ChannelOutcome> + 'a {
        self.outcomes.iter().filter(move |o| o.channel == channel)
    }

    pub fn summary(&self) -> String {
        format!(
            "{} issues: {} sent, {} queued, {} denied, {} skipped, {} failed",
            self.issues,
            self.sent(),
            self.queued(),
            self.denied(),
            self.skipped(),
            self.failed()
        )
    }
}

/// 通知分发器
///
/// 持有渠道、准入闸门和摘要缓冲区，生命周期为一次运行；
/// `finish` 冲刷摘要并释放所有资源。
pub struct Dispatcher {
    channels: Vec<Arc<dyn NotificationChannel>>,
    gate: NotificationGate,
    mode: DeliveryMode,
    digest: DigestAccumulator,
    dry_run: bool,
    audit: Option<Arc<AuditLog>>,
}

impl Dispatcher {
    pub fn new(gate: NotificationGate) -> Self {
        Self {
            channels: Vec::new(),
            gate,
            mode: DeliveryMode::Instant,
            digest: DigestAccumulator::new(),
            dry_run: false,
            audit: None,
        }
    }

    pub fn with_mode(mut self, mode: DeliveryMode) -> Self {
        self.mode = mode;
        self
    }

    /// 设置 dry-run 模式
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// 运行事件写入 issues.log
    pub fn with_audit(mut self, audit: Arc<AuditLog>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// 注册渠道
    pub fn register_channel(&mut self, channel: Arc<dyn NotificationChannel>) {
        info!(channel = channel.name(), kind = %channel.kind(), "Registering notification channel");
        self.channels.push(channel);
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn channel_names(&self) -> Vec<&str> {
        self.channels.iter().map(|c| c.name()).collect()
    }

    pub fn mode(&self) -> DeliveryMode {
        self.mode
    }

    pub fn gate(&self) -> &NotificationGate {
        &self.gate
    }

    /// 摘要缓冲区中的 Issue 数
    pub fn pending_digest(&self) -> usize {
        self.digest.len()
    }

    pub fn stats(&self) -> GateStats {
        self.gate.stats()
    }

    /// 分发一批 Issue；任何单个失败都不会中断批处理
    pub fn dispatch(&mut self, issues: &[Issue]) -> DispatchReport {
        let mut report = DispatchReport::default();

        for issue in issues {
            if !issue.is_eligible() {
                debug!(subject = %issue.url, "Skipping ineligible issue");
                continue;
            }
            report.issues += 1;

            let message = NotificationMessage::new_issue(issue);
            // 同一次运行里重复出现的 Issue 不再进入摘要
            let buffered = self.digest.contains(&issue.url);
            let mut queued = false;

            for channel in &self.channels {
                let name = channel.name();

                if self.mode == DeliveryMode::Digest && channel.kind().batched_in_digest() {
                    if !channel.should_send(&message) {
                        report.push(&message.subject, name, DispatchOutcome::Skipped("filtered".to_string()));
                        continue;
                    }
                    if buffered {
                        debug!(channel = %name, subject = %message.subject, "Already in digest buffer");
                        report.push(&message.subject, name, DispatchOutcome::Denied(REASON_DUPLICATE.to_string()));
                        continue;
                    }
                    if !queued {
                        self.digest.add(issue.clone());
                        queued = true;
                    }
                    report.push(&message.subject, name, DispatchOutcome::Queued);
                    continue;
                }

                let outcome = Self::deliver(&self.gate, self.dry_run, channel.as_ref(), &message);
                report.push(&message.subject, name, outcome);
            }
        }

        info!(
            issues = report.issues,
            sent = report.sent(),
            queued = report.queued(),
            denied = report.denied(),
            failed = report.failed(),
            "Dispatch complete"
        );
        if let Some(audit) = &self.audit {
            audit.log_event(&format!("Dispatched {}", report.summary()));
        }

        report
    }

    /// 发送认领确认/请求邮件（只走邮件渠道）
    pub fn notify_assignment(&self, issue: &Issue, kind: NotificationType) -> DispatchReport {
        let mut report = DispatchReport {
            issues: 1,
            outcomes: Vec::new(),
        };

        if !matches!(
            kind,
            NotificationType::AssignmentConfirmation | NotificationType::AssignmentRequest
        ) {
            warn!(kind = %kind, "Not an assignment notification type");
            report.push(&issue.url, "email", DispatchOutcome::Skipped(format!("{} is not an assignment type", kind)));
            return report;
        }

        let message = NotificationMessage::assignment(issue, kind);
        for channel in self.channels.iter().filter(|c| c.kind() == ChannelKind::Email) {
            let outcome = Self::deliver(&self.gate, self.dry_run, channel.as_ref(), &message);
            report.push(&message.subject, channel.name(), outcome);
        }

        if report.outcomes.is_empty() {
            info!(subject = %issue.url, kind = %kind, "No email channel configured");
            report.push(&issue.url, "email", DispatchOutcome::Skipped("no email channel".to_string()));
        }
        if let Some(audit) = &self.audit {
            audit.log_event(&format!("{} for {}: {}", kind, issue.url, report.summary()));
        }

        report
    }

    /// 冲刷摘要缓冲区（使用第一个按批发送的渠道），返回是否送达
    pub fn flush_digest(&mut self) -> bool {
        if self.digest.is_empty() {
            return false;
        }

        let Some(channel) = self.channels.iter().find(|c| c.kind().batched_in_digest()) else {
            debug!(pending = self.digest.len(), "No digest channel registered");
            return false;
        };

        if self.dry_run {
            eprintln!(
                "[DRY-RUN] Would send digest of {} issues to channel: {}",
                self.digest.len(),
                channel.name()
            );
            return false;
        }

        let count = self.digest.len();
        let today = self.gate.clock().now().date_naive();
        let sent = self.digest.flush(&self.gate, channel.as_ref(), today);
        if sent {
            if let Some(audit) = &self.audit {
                audit.log_event(&format!("Digest with {} issues sent", count));
            }
        }
        sent
    }

    /// 结束本次运行：摘要模式下冲刷缓冲区，整理去重文件，释放渠道和文件句柄
    pub fn finish(mut self) -> bool {
        let digest_sent = self.mode == DeliveryMode::Digest && self.flush_digest();

        if !self.digest.is_empty() {
            // 缓冲区只在内存里，未送达的摘要随进程退出丢弃
            warn!(
                pending = self.digest.len(),
                "Digest not delivered; buffered issues are dropped and will be emailed again only if rescored in a later run"
            );
        }

        if !self.dry_run {
            match self.gate.compact() {
                Ok(live) => debug!(live, "Dedup ledger compacted"),
                Err(e) => warn!(error = %e, "Failed to compact dedup ledger"),
            }
        }

        if let Some(audit) = &self.audit {
            audit.log_event("Run finished");
        }

        digest_sent
    }

    /// 单个渠道的投递：本地渠道直接发送，其余经过闸门
    fn deliver(
        gate: &NotificationGate,
        dry_run: bool,
        channel: &dyn NotificationChannel,
        message: &NotificationMessage,
    ) -> DispatchOutcome {
        let name = channel.name();

        if !channel.should_send(message) {
            debug!(channel = %name, subject = %message.subject, "Filtered by channel");
            return DispatchOutcome::Skipped("filtered".to_string());
        }

        if dry_run {
            eprintln!("[DRY-RUN] Would send {} to channel: {}", message.subject, name);
            return DispatchOutcome::Skipped("dry-run".to_string());
        }

        let outcome = match channel.kind().gate_type(message.kind) {
            None => match channel.send(message) {
                Ok(SendResult::Sent) => DispatchOutcome::Sent,
                Ok(SendResult::Skipped(reason)) => DispatchOutcome::Skipped(reason),
                Ok(SendResult::Failed(reason)) => DispatchOutcome::Failed(reason),
                Err(e) => DispatchOutcome::Failed(e.to_string()),
            },
            Some(kind) => match gate.with_admission(kind, &message.subject, || channel.send(message)) {
                Admission::Sent => DispatchOutcome::Sent,
                Admission::Denied(reason) => DispatchOutcome::Denied(reason),
                Admission::Skipped(reason) => DispatchOutcome::Skipped(reason),
                Admission::Failed(reason) => DispatchOutcome::Failed(reason),
            },
        };

        match &outcome {
            DispatchOutcome::Denied(reason) => {
                info!(channel = %name, subject = %message.subject, reason = %reason, "Notification not sent");
            }
            DispatchOutcome::Failed(reason) => {
                warn!(channel = %name, subject = %message.subject, error = %reason, "Channel send failed");
            }
            _ => {}
        }

        outcome
    }
}
