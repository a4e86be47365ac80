//! Priority classification for the notification audit log
//!
//! - HIGH: score >= 0.8
//! - MEDIUM: 0.6 <= score < 0.8
//! - LOW: score < 0.6
//! - DESKTOP: line written for a delivered desktop alert

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Priority {
    High,
    Medium,
    Low,
    Desktop,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "High",
            Priority::Medium => "Medium",
            Priority::Low => "Low",
            Priority::Desktop => "Desktop",
        }
    }

    /// Classify a score into High / Medium / Low
    pub fn from_score(score: f64) -> Self {
        if score >= 0.8 {
            Priority::High
        } else if score >= 0.6 {
            Priority::Medium
        } else {
            Priority::Low
        }
    }

    /// Console / email marker for a score
    pub fn emoji(&self) -> &'static str {
        match self {
            Priority::High => "🔥",
            Priority::Medium => "⭐",
            Priority::Low => "✨",
            Priority::Desktop => "🔔",
        }
    }
}
