//! 去重账本 - 防止同一 Issue 在保留期内被重复通知
//!
//! 多次轮询会对同一个 Issue 重复评分，账本按 `(类型, 主体)` 记录已发送的通知。
//!
//! ## 去重策略
//! 1. key 为 `(NotificationType, subject)`，subject 通常是 Issue URL
//! 2. 保留期默认 24 小时，过期记录在查询时视为不存在
//! 3. 可选 JSONL 持久化，进程重启后保留期仍然有效

use super::kind::NotificationType;
use super::store::{DedupEntry, DedupStore};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tracing::{debug, warn};

/// 默认保留期
pub const DEFAULT_RETENTION_HOURS: i64 = 24;

/// 去重账本
#[derive(Debug)]
pub struct DedupLedger {
    /// (类型, 主体) -> 发送时间
    entries: HashMap<(NotificationType, String), DateTime<Utc>>,
    retention: Duration,
    store: Option<DedupStore>,
}

impl DedupLedger {
    /// 仅内存，进程退出即丢失
    pub fn in_memory(retention: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            retention,
            store: None,
        }
    }

    /// 从持久化文件加载，只保留每个 key 最新且未过期的记录
    pub fn open(store: DedupStore, retention: Duration, now: DateTime<Utc>) -> anyhow::Result<Self> {
        let mut ledger = Self {
            entries: HashMap::new(),
            retention,
            store: None,
        };

        let loaded = store.read_all()?;
        let total = loaded.len();
        for entry in loaded {
            ledger.insert(entry.kind, entry.subject, entry.sent_at);
        }
        ledger.sweep(now);

        debug!(
            path = %store.path().display(),
            total,
            live = ledger.len(),
            "Loaded dedup ledger"
        );

        ledger.store = Some(store);
        Ok(ledger)
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    /// 保留期内是否发送过
    pub fn has_sent(&self, kind: NotificationType, subject: &str, now: DateTime<Utc>) -> bool {
        match self.entries.get(&(kind, subject.to_string())) {
            Some(sent_at) => now.signed_duration_since(*sent_at) < self.retention,
            None => false,
        }
    }

    /// 记录一次发送（覆盖旧记录）；持久化失败只告警
    pub fn record(&mut self, kind: NotificationType, subject: &str, now: DateTime<Utc>) {
        self.entries.insert((kind, subject.to_string()), now);

        if let Some(store) = &self.store {
            let entry = DedupEntry {
                kind,
                subject: subject.to_string(),
                sent_at: now,
            };
            if let Err(e) = store.append(&entry) {
                warn!(
                    path = %store.path().display(),
                    error = %e,
                    "Failed to persist dedup entry"
                );
            }
        }
    }

    /// 清理过期记录（内存）
    pub fn sweep(&mut self, now: DateTime<Utc>) {
        let retention = self.retention;
        self.entries
            .retain(|_, sent_at| now.signed_duration_since(*sent_at) < retention);
    }

    /// 清理过期记录并重写持久化文件，返回保留的条数
    pub fn compact(&mut self, now: DateTime<Utc>) -> anyhow::Result<usize> {
        self.sweep(now);

        if let Some(store) = &self.store {
            let mut live: Vec<DedupEntry> = self
                .entries
                .iter()
                .map(|((kind, subject), sent_at)| DedupEntry {
                    kind: *kind,
                    subject: subject.clone(),
                    sent_at: *sent_at,
                })
                .collect();
            live.sort_by_key(|e| e.sent_at);
            store.rewrite(&live)?;
        }

        Ok(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn insert(&mut self, kind: NotificationType, subject: String, sent_at: DateTime<Utc>) {
        let slot = self.entries.entry((kind, subject)).or_insert(sent_at);
        if sent_at > *slot {
            *slot = sent_at;
        }
    }
}

impl Default for DedupLedger {
    fn default() -> Self {
        Self::in_memory(Duration::hours(DEFAULT_RETENTION_HOURS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    const URL: &str = "https://github.com/acme/tool/issues/1";

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 18, 9, 0, 0).unwrap()
    }

    #[test]
    fn test_record_then_has_sent() {
        let mut ledger = DedupLedger::default();
        assert!(!ledger.has_sent(NotificationType::NewIssue, URL, start()));

        ledger.record(NotificationType::NewIssue, URL, start());
        assert!(ledger.has_sent(NotificationType::NewIssue, URL, start() + Duration::minutes(10)));
    }

    #[test]
    fn test_namespace_is_per_type() {
        let mut ledger = DedupLedger::default();
        ledger.record(NotificationType::NewIssue, URL, start());

        assert!(!ledger.has_sent(NotificationType::Desktop, URL, start()));
        assert!(!ledger.has_sent(NotificationType::AssignmentRequest, URL, start()));
    }

    #[test]
    fn test_entry_expires_after_retention() {
        let mut ledger = DedupLedger::in_memory(Duration::hours(24));
        ledger.record(NotificationType::NewIssue, URL, start());

        assert!(ledger.has_sent(NotificationType::NewIssue, URL, start() + Duration::hours(23)));
        assert!(!ledger.has_sent(NotificationType::NewIssue, URL, start() + Duration::hours(24)));
    }

    #[test]
    fn test_record_overwrites_sent_at() {
        let mut ledger = DedupLedger::in_memory(Duration::hours(1));
        ledger.record(NotificationType::NewIssue, URL, start());
        ledger.record(NotificationType::NewIssue, URL, start() + Duration::minutes(50));

        assert!(ledger.has_sent(NotificationType::NewIssue, URL, start() + Duration::minutes(90)));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_sweep_removes_expired() {
        let mut ledger = DedupLedger::in_memory(Duration::hours(1));
        ledger.record(NotificationType::NewIssue, "old", start());
        ledger.record(NotificationType::NewIssue, "new", start() + Duration::minutes(45));

        ledger.sweep(start() + Duration::minutes(70));
        assert_eq!(ledger.len(), 1);
        assert!(ledger.has_sent(NotificationType::NewIssue, "new", start() + Duration::minutes(70)));
    }

    #[test]
    fn test_open_restores_live_entries() {
        let dir = TempDir::new().unwrap();
        let store = DedupStore::in_dir(dir.path());

        {
            let mut ledger = DedupLedger::open(store.clone(), Duration::hours(24), start()).unwrap();
            ledger.record(NotificationType::NewIssue, URL, start());
            ledger.record(NotificationType::NewIssue, "stale", start() - Duration::hours(30));
        }

        let later = start() + Duration::minutes(10);
        let ledger = DedupLedger::open(store, Duration::hours(24), later).unwrap();
        assert!(ledger.has_sent(NotificationType::NewIssue, URL, later));
        assert!(!ledger.has_sent(NotificationType::NewIssue, "stale", later));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_compact_rewrites_store() {
        let dir = TempDir::new().unwrap();
        let store = DedupStore::in_dir(dir.path());

        let mut ledger = DedupLedger::open(store.clone(), Duration::hours(1), start()).unwrap();
        ledger.record(NotificationType::NewIssue, "a", start());
        ledger.record(NotificationType::NewIssue, "b", start() + Duration::minutes(40));
        ledger.record(NotificationType::NewIssue, "b", start() + Duration::minutes(50));
        assert_eq!(store.read_all().unwrap().len(), 3);

        let kept = ledger.compact(start() + Duration::minutes(65)).unwrap();
        assert_eq!(kept, 1);

        let entries = store.read_all().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].subject, "b");
    }
}
