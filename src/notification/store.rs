//! 去重记录存储 - 本地 JSONL 文件读写

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use super::kind::NotificationType;

/// 去重记录（JSONL 一行）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DedupEntry {
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub subject: String,
    pub sent_at: DateTime<Utc>,
}

/// 去重记录存储
#[derive(Debug, Clone)]
pub struct DedupStore {
    path: PathBuf,
}

impl DedupStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<log_dir>/sent.jsonl`
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join("sent.jsonl"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 追加一条记录（带文件锁）
    pub fn append(&self, entry: &DedupEntry) -> Result<()> {
        use fs2::FileExt;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open {}", self.path.display()))?;

        file.lock_exclusive()?;
        let mut file = file;
        let line = format!("{}\n", serde_json::to_string(entry)?);
        let written = file.write_all(line.as_bytes());
        file.unlock()?;
        written?;

        Ok(())
    }

    /// 读取全部记录；损坏的行直接跳过
    pub fn read_all(&self) -> Result<Vec<DedupEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&self.path)
            .with_context(|| format!("Failed to open {}", self.path.display()))?;
        let reader = BufReader::new(file);

        // 按字节切行：非 UTF-8 的残行只影响它自己
        Ok(reader
            .split(b'\n')
            .filter_map(|line| line.ok())
            .filter_map(|line| serde_json::from_slice(&line).ok())
            .collect())
    }

    /// 用给定记录整体替换文件（先写临时文件再 rename）
    pub fn rewrite(&self, entries: &[DedupEntry]) -> Result<()> {
        use fs2::FileExt;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let tmp_path = self.path.with_extension("jsonl.tmp");
        {
            let mut tmp = File::create(&tmp_path)
                .with_context(|| format!("Failed to create {}", tmp_path.display()))?;
            for entry in entries {
                writeln!(tmp, "{}", serde_json::to_string(entry)?)?;
            }
            tmp.sync_all()?;
        }

        // 持锁期间替换，避免与并发 append 交错
        let lock = OpenOptions::new().create(true).append(true).open(&self.path)?;
        lock.lock_exclusive()?;
        let renamed = fs::rename(&tmp_path, &self.path);
        lock.unlock()?;
        renamed.with_context(|| format!("Failed to replace {}", self.path.display()))?;

        Ok(())
    }
}
