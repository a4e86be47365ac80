//! 候选 Issue 数据模型（由外部评分器产出，本 crate 只消费）

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Read;
use std::path::Path;

/// Issue 分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    /// good first issue
    GoodFirst,
    /// 合格，可以通知
    #[default]
    Qualified,
    /// 不合格，不发送任何通知
    Ineligible,
}

/// 所属项目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub org: String,
    pub name: String,
    #[serde(default)]
    pub stars: u64,
    #[serde(default)]
    pub category: String,
}

impl Project {
    /// `org/name`
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.org, self.name)
    }
}

/// 已评分的 Issue / PR
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub title: String,
    /// 稳定的外部标识，用作去重 key
    pub url: String,
    /// 0.0 - 1.0
    pub score: f64,
    #[serde(default)]
    pub comments: u32,
    #[serde(default)]
    pub labels: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub project: Project,
    #[serde(default)]
    pub classification: Classification,
}

impl Issue {
    pub fn is_eligible(&self) -> bool {
        self.classification != Classification::Ineligible
    }

    pub fn is_good_first(&self) -> bool {
        self.classification == Classification::GoodFirst
    }
}

/// 读取 JSON 数组形式的 Issue 列表，`-` 表示 stdin
pub fn load_issues(source: &Path) -> Result<Vec<Issue>> {
    let content = if source == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read issues from stdin")?;
        buf
    } else {
        fs::read_to_string(source)
            .with_context(|| format!("Failed to read issues from {}", source.display()))?
    };

    parse_issues(&content)
}

pub fn parse_issues(content: &str) -> Result<Vec<Issue>> {
    let issues: Vec<Issue> =
        serde_json::from_str(content).context("Issues must be a JSON array of scored issues")?;
    Ok(issues)
}
