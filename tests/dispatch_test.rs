use anyhow::{bail, Result};
use chrono::{Duration, TimeZone, Utc};
use issue_scout::notification::channels::{EmailChannel, LocalFileChannel, MailTransport};
use issue_scout::notification::{
    AuditLog, Clock, DedupLedger, DedupStore, DispatchOutcome, Dispatcher, EmailContent, Granularity, ManualClock,
    NotificationGate, NotificationType, RateLimiter, RateLimits,
};
use issue_scout::{parse_issues, Classification, DeliveryMode, Issue};
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// 记录每封邮件的主题，主题包含 `fail_on` 时返回错误
#[derive(Clone, Default)]
struct RecordingTransport {
    subjects: Arc<Mutex<Vec<String>>>,
    fail_on: Option<String>,
}

impl MailTransport for RecordingTransport {
    fn send_mail(&self, email: &EmailContent) -> Result<()> {
        self.subjects.lock().unwrap().push(email.subject.clone());
        if let Some(needle) = &self.fail_on {
            if email.subject.contains(needle.as_str()) {
                bail!("550 mailbox unavailable");
            }
        }
        Ok(())
    }
}

fn issues() -> Vec<Issue> {
    let json = r#"[
        {"title": "Issue one", "url": "https://github.com/acme/tool/issues/1", "score": 0.91,
         "created_at": "2026-10-10T08:00:00Z", "classification": "good_first",
         "project": {"org": "acme", "name": "tool", "stars": 1200, "category": "CLI"}},
        {"title": "Issue two", "url": "https://github.com/acme/tool/issues/2", "score": 0.72,
         "created_at": "2026-10-11T08:00:00Z",
         "project": {"org": "acme", "name": "tool", "stars": 1200, "category": "CLI"}},
        {"title": "Issue three", "url": "https://github.com/acme/tool/issues/3", "score": 0.65,
         "created_at": "2026-10-12T08:00:00Z",
         "project": {"org": "acme", "name": "tool", "stars": 1200, "category": "CLI"}},
        {"title": "Issue four", "url": "https://github.com/acme/tool/issues/4", "score": 0.55,
         "created_at": "2026-10-13T08:00:00Z",
         "project": {"org": "acme", "name": "tool", "stars": 1200, "category": "CLI"}},
        {"title": "Issue five", "url": "https://github.com/acme/tool/issues/5", "score": 0.51,
         "created_at": "2026-10-14T08:00:00Z",
         "project": {"org": "acme", "name": "tool", "stars": 1200, "category": "CLI"}}
    ]"#;
    parse_issues(json).unwrap()
}

fn clock() -> ManualClock {
    ManualClock::new(Utc.with_ymd_and_hms(2026, 10, 18, 9, 0, 0).unwrap())
}

/// 本地日志 + 邮件渠道，去重账本落盘到 `dir`
fn dispatcher(dir: &Path, clock: &ManualClock, limits: RateLimits, transport: RecordingTransport) -> Dispatcher {
    let audit = Arc::new(AuditLog::open(dir).unwrap());
    let ledger = DedupLedger::open(DedupStore::in_dir(dir), Duration::hours(24), clock.now()).unwrap();
    let gate = NotificationGate::new(RateLimiter::new(limits), ledger, Arc::new(clock.clone()));

    let mut dispatcher = Dispatcher::new(gate).with_audit(audit.clone());
    dispatcher.register_channel(Arc::new(LocalFileChannel::new(audit)));
    dispatcher.register_channel(Arc::new(EmailChannel::new(Box::new(transport))));
    dispatcher
}

fn notification_lines(dir: &Path) -> Vec<String> {
    fs::read_to_string(dir.join("notifications.log"))
        .unwrap()
        .lines()
        .map(String::from)
        .collect()
}

#[test]
fn test_email_failure_does_not_abort_batch() {
    let dir = TempDir::new().unwrap();
    let clock = clock();
    let transport = RecordingTransport {
        fail_on: Some("Issue three".to_string()),
        ..Default::default()
    };
    let mut dispatcher = dispatcher(dir.path(), &clock, RateLimits::new(), transport.clone());

    let report = dispatcher.dispatch(&issues());

    // 日志覆盖全部 5 个 Issue，邮件尝试 5 次，第 3 封失败
    assert_eq!(notification_lines(dir.path()).len(), 5);
    assert_eq!(transport.subjects.lock().unwrap().len(), 5);
    let email: Vec<_> = report.for_channel("email").map(|o| o.outcome.clone()).collect();
    assert_eq!(email.iter().filter(|o| **o == DispatchOutcome::Sent).count(), 4);
    assert!(matches!(email[2], DispatchOutcome::Failed(ref e) if e.contains("550")));

    let gate = dispatcher.gate();
    assert!(gate.can_send(NotificationType::NewIssue, "https://github.com/acme/tool/issues/3").allowed);
    assert!(!gate.can_send(NotificationType::NewIssue, "https://github.com/acme/tool/issues/4").allowed);
}

#[test]
fn test_duplicate_across_runs() {
    let dir = TempDir::new().unwrap();
    let clock = clock();
    let url = "https://github.com/acme/tool/issues/1";

    {
        let transport = RecordingTransport::default();
        let mut first = dispatcher(dir.path(), &clock, RateLimits::new(), transport.clone());
        first.dispatch(&issues()[..1]);
        first.finish();
        assert_eq!(transport.subjects.lock().unwrap().len(), 1);
    }

    clock.advance(Duration::minutes(10));

    let transport = RecordingTransport::default();
    let mut second = dispatcher(dir.path(), &clock, RateLimits::new(), transport.clone());
    let attempt = second.gate().can_send(NotificationType::NewIssue, url);
    assert!(!attempt.allowed);
    assert_eq!(attempt.reason(), "duplicate");

    let report = second.dispatch(&issues()[..1]);
    assert_eq!(transport.subjects.lock().unwrap().len(), 0);
    assert_eq!(
        report.for_channel("email").next().map(|o| o.outcome.clone()),
        Some(DispatchOutcome::Denied("duplicate".to_string()))
    );
}

#[test]
fn test_duplicate_expires_after_retention() {
    let dir = TempDir::new().unwrap();
    let clock = clock();

    {
        let mut first = dispatcher(dir.path(), &clock, RateLimits::new(), RecordingTransport::default());
        first.dispatch(&issues()[..1]);
    }

    clock.advance(Duration::hours(25));

    let transport = RecordingTransport::default();
    let mut later = dispatcher(dir.path(), &clock, RateLimits::new(), transport.clone());
    let report = later.dispatch(&issues()[..1]);
    assert_eq!(report.for_channel("email").next().unwrap().outcome, DispatchOutcome::Sent);
    assert_eq!(transport.subjects.lock().unwrap().len(), 1);
}

#[test]
fn test_hourly_window_rolls_over() {
    let dir = TempDir::new().unwrap();
    let clock = clock();
    let limits = RateLimits::new()
        .with_limit(NotificationType::NewIssue, Granularity::Hour, 3)
        .with_limit(NotificationType::NewIssue, Granularity::Day, 50);
    let transport = RecordingTransport::default();
    let mut dispatcher = dispatcher(dir.path(), &clock, limits, transport.clone());

    let all = issues();
    let report = dispatcher.dispatch(&all[..4]);
    assert_eq!(transport.subjects.lock().unwrap().len(), 3);
    assert_eq!(
        report.for_channel("email").last().unwrap().outcome,
        DispatchOutcome::Denied("hourly limit exceeded".to_string())
    );

    clock.advance(Duration::hours(1));
    let report = dispatcher.dispatch(&all[3..]);
    assert_eq!(report.sent(), 4);
    assert_eq!(transport.subjects.lock().unwrap().len(), 5);

    let usage = dispatcher.stats().usage[&NotificationType::NewIssue];
    assert_eq!(usage.hour_count, 2);
    assert_eq!(usage.day_count, 5);
}

#[test]
fn test_digest_run_sends_one_email() {
    let dir = TempDir::new().unwrap();
    let clock = clock();
    let transport = RecordingTransport::default();
    let mut dispatcher =
        dispatcher(dir.path(), &clock, RateLimits::new(), transport.clone()).with_mode(DeliveryMode::Digest);

    let mut batch = issues();
    batch[4].classification = Classification::Ineligible;
    let report = dispatcher.dispatch(&batch);
    assert_eq!(report.issues, 4);
    assert_eq!(report.queued(), 4);
    assert_eq!(notification_lines(dir.path()).len(), 4);

    assert!(dispatcher.finish());
    let subjects = transport.subjects.lock().unwrap().clone();
    assert_eq!(subjects, vec!["GitHub issue digest for October 18, 2026 (4 issues)".to_string()]);

    let entries = fs::read_to_string(dir.path().join("sent.jsonl")).unwrap();
    assert_eq!(entries.lines().count(), 1);
    assert!(entries.contains("digest:2026-10-18"));
}
