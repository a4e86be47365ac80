//! 消息格式化 - 控制台卡片、邮件模板、桌面提醒

use super::channel::{MessageBody, NotificationMessage};
use super::gate::StatusView;
use super::kind::NotificationType;
use super::priority::Priority;
use crate::issue::Issue;
use std::fmt::Write;

/// 摘要邮件中 good first issue 最多展示条数
const DIGEST_GOOD_FIRST_LIMIT: usize = 10;
/// 摘要邮件中其他 Issue 最多展示条数
const DIGEST_OTHER_LIMIT: usize = 5;
/// 桌面提醒标题截断长度
const DESKTOP_TITLE_MAX: usize = 40;

/// 渲染好的邮件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailContent {
    pub subject: String,
    pub html: String,
    pub text: String,
}

/// 消息格式化器
pub struct MessageFormatter;

impl MessageFormatter {
    /// 控制台卡片
    pub fn console_card(issue: &Issue) -> String {
        let priority = Priority::from_score(issue.score);
        let mut out = String::new();
        let _ = writeln!(out, "\n{} {}", priority.emoji(), issue.project.category);
        let _ = writeln!(
            out,
            "Score: {:.2} | Stars: {} | Comments: {}",
            issue.score, issue.project.stars, issue.comments
        );
        let _ = writeln!(out, "Title: {}", issue.title);
        let _ = writeln!(out, "URL: {}", issue.url);
        if !issue.labels.is_empty() {
            let _ = writeln!(out, "Labels: {}", issue.labels.join(", "));
        }
        let _ = writeln!(out, "Created: {}", issue.created_at.format("%Y-%m-%d"));
        out.push_str(&"-".repeat(80));
        out
    }

    /// 按消息类型渲染邮件
    pub fn email(message: &NotificationMessage) -> EmailContent {
        match (&message.body, message.kind) {
            (MessageBody::Digest { date, issues }, _) => {
                Self::digest_email(&date.format("%B %-d, %Y").to_string(), issues)
            }
            (MessageBody::Issue(issue), NotificationType::AssignmentConfirmation) => {
                Self::assignment_confirmation_email(issue)
            }
            (MessageBody::Issue(issue), NotificationType::AssignmentRequest) => {
                Self::assignment_request_email(issue)
            }
            (MessageBody::Issue(issue), _) => Self::new_issue_email(issue),
        }
    }

    pub fn new_issue_email(issue: &Issue) -> EmailContent {
        let priority = Priority::from_score(issue.score);
        let subject = format!(
            "{} New issue in {}: {}",
            priority.emoji(),
            issue.project.full_name(),
            issue.title
        );

        let labels_html: String = issue
            .labels
            .iter()
            .map(|l| {
                format!(
                    r#"<span style="background:#e1e4e8;padding:2px 8px;border-radius:12px;font-size:12px;margin-right:4px;">{}</span>"#,
                    escape_html(l)
                )
            })
            .collect();

        let html = format!(
            r#"<html><body style="font-family:Arial,sans-serif;max-width:800px;margin:0 auto;">
<h2><a href="{url}">{title}</a></h2>
<p>{project} ({stars} stars) • {category}</p>
<p>Score: <strong>{score:.2}</strong> ({priority}) • {comments} comments • opened {created}</p>
<p>{labels}</p>
</body></html>"#,
            url = escape_html(&issue.url),
            title = escape_html(&issue.title),
            project = escape_html(&issue.project.full_name()),
            stars = issue.project.stars,
            category = escape_html(&issue.project.category),
            score = issue.score,
            priority = priority,
            comments = issue.comments,
            created = issue.created_at.format("%Y-%m-%d"),
            labels = labels_html,
        );

        let mut text = String::new();
        let _ = writeln!(text, "{}", issue.title);
        let _ = writeln!(text, "Project: {} ({} stars)", issue.project.full_name(), issue.project.stars);
        let _ = writeln!(text, "Category: {}", issue.project.category);
        let _ = writeln!(text, "Score: {:.2} ({}) | Comments: {}", issue.score, priority, issue.comments);
        let _ = writeln!(text, "URL: {}", issue.url);
        if !issue.labels.is_empty() {
            let _ = writeln!(text, "Labels: {}", issue.labels.join(", "));
        }

        EmailContent { subject, html, text }
    }

    /// 摘要邮件：good first issue 优先，其余随后，保持插入顺序
    pub fn digest_email(date_label: &str, issues: &[Issue]) -> EmailContent {
        let subject = format!("GitHub issue digest for {} ({} issues)", date_label, issues.len());

        let (good_first, others): (Vec<&Issue>, Vec<&Issue>) =
            issues.iter().partition(|i| i.is_good_first());

        let mut html = String::from(
            r#"<html><body style="font-family:Arial,sans-serif;max-width:800px;margin:0 auto;">"#,
        );
        let mut text = String::new();
        let _ = writeln!(text, "Issue digest for {}\n", date_label);

        Self::digest_section(&mut html, &mut text, "🔥 Good First Issues", &good_first, DIGEST_GOOD_FIRST_LIMIT);
        Self::digest_section(&mut html, &mut text, "📋 Other Opportunities", &others, DIGEST_OTHER_LIMIT);

        html.push_str("<p style=\"color:#586069;\">GitHub Issue Scout</p></body></html>");

        EmailContent { subject, html, text }
    }

    fn digest_section(html: &mut String, text: &mut String, heading: &str, issues: &[&Issue], limit: usize) {
        if issues.is_empty() {
            return;
        }

        let _ = write!(html, "<h2>{}</h2>", heading);
        let _ = writeln!(text, "{}", heading);

        for (i, issue) in issues.iter().enumerate() {
            if i >= limit {
                let _ = write!(html, "<p>... and {} more</p>", issues.len() - limit);
                let _ = writeln!(text, "... and {} more", issues.len() - limit);
                break;
            }
            let _ = write!(
                html,
                r#"<div style="border:1px solid #e1e4e8;border-radius:8px;padding:16px;margin:12px 0;"><a href="{}">{}</a><p>{:.2} • {} • {} comments</p></div>"#,
                escape_html(&issue.url),
                escape_html(&issue.title),
                issue.score,
                escape_html(&issue.project.full_name()),
                issue.comments,
            );
            let _ = writeln!(
                text,
                "{}. [{}] {} ({:.2})\n   {}",
                i + 1,
                Priority::from_score(issue.score),
                issue.title,
                issue.score,
                issue.url
            );
        }
        text.push('\n');
    }

    pub fn assignment_confirmation_email(issue: &Issue) -> EmailContent {
        let subject = format!("✅ Assigned: {}", issue.title);
        let html = format!(
            r#"<html><body><h2>You have been assigned</h2><p><a href="{}">{}</a></p><p>{}</p></body></html>"#,
            escape_html(&issue.url),
            escape_html(&issue.title),
            escape_html(&issue.project.full_name()),
        );
        let text = format!(
            "You have been assigned to:\n{}\n{}\n{}\n",
            issue.title,
            issue.project.full_name(),
            issue.url
        );
        EmailContent { subject, html, text }
    }

    pub fn assignment_request_email(issue: &Issue) -> EmailContent {
        let subject = format!("🙋 Assignment requested: {}", issue.title);
        let html = format!(
            r#"<html><body><h2>Assignment request posted</h2><p><a href="{}">{}</a></p><p>Score {:.2} • {}</p></body></html>"#,
            escape_html(&issue.url),
            escape_html(&issue.title),
            issue.score,
            escape_html(&issue.project.full_name()),
        );
        let text = format!(
            "Assignment request posted for:\n{}\n{} (score {:.2})\n{}\n",
            issue.title,
            issue.project.full_name(),
            issue.score,
            issue.url
        );
        EmailContent { subject, html, text }
    }

    /// 桌面提醒 (title, body)
    pub fn desktop_alert(message: &NotificationMessage) -> (String, String) {
        let issues = message.issues();
        let title = if issues.len() == 1 {
            format!("{} New issue found", Priority::from_score(issues[0].score).emoji())
        } else {
            format!("{} new issues found", issues.len())
        };

        let body = issues
            .iter()
            .enumerate()
            .map(|(i, issue)| {
                format!(
                    "{}. [{}] {} (Score: {:.2})",
                    i + 1,
                    issue.project.name,
                    truncate(&issue.title, DESKTOP_TITLE_MAX),
                    issue.score
                )
            })
            .collect::<Vec<_>>()
            .join("\n");

        (title, body)
    }

    /// `scout status` 的文本表格：去重账本 + 各类型配置的限额
    pub fn status_table(status: &StatusView) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "Dedup ledger: {} entries (retention {}h)",
            status.dedup_entries, status.retention_hours
        );
        let _ = writeln!(out);
        let _ = writeln!(out, "{:<26} {:>8} {:>8}", "TYPE", "PER HOUR", "PER DAY");
        for (kind, limit) in &status.limits {
            let _ = writeln!(
                out,
                "{:<26} {:>8} {:>8}",
                kind.as_str(),
                format_limit(limit.hourly),
                format_limit(limit.daily)
            );
        }
        out
    }
}

fn format_limit(limit: Option<u32>) -> String {
    match limit {
        Some(0) => "off".to_string(),
        Some(n) => n.to_string(),
        None => "-".to_string(),
    }
}

/// 按字符截断，超长时追加 `...`
pub fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::issue::{Classification, Project};
    use chrono::{NaiveDate, TimeZone, Utc};

    fn issue(title: &str, score: f64, classification: Classification) -> Issue {
        Issue {
            title: title.to_string(),
            url: format!("https://github.com/acme/tool/issues/{}", title.len()),
            score,
            comments: 2,
            labels: vec!["good first issue".to_string(), "bug".to_string()],
            created_at: Utc.with_ymd_and_hms(2026, 10, 1, 0, 0, 0).unwrap(),
            project: Project {
                org: "acme".to_string(),
                name: "tool".to_string(),
                stars: 4200,
                category: "DevOps".to_string(),
            },
            classification,
        }
    }

    #[test]
    fn test_console_card() {
        let card = MessageFormatter::console_card(&issue("Fix crash", 0.85, Classification::Qualified));
        assert!(card.contains("🔥 DevOps"));
        assert!(card.contains("Score: 0.85 | Stars: 4200 | Comments: 2"));
        assert!(card.contains("Labels: good first issue, bug"));
        assert!(card.contains("Created: 2026-10-01"));
        assert!(card.ends_with(&"-".repeat(80)));
    }

    #[test]
    fn test_new_issue_email_escapes_html() {
        let email = MessageFormatter::new_issue_email(&issue("Handle <T> & co", 0.65, Classification::Qualified));
        assert!(email.subject.contains("acme/tool"));
        assert!(email.html.contains("Handle &lt;T&gt; &amp; co"));
        assert!(email.text.contains("Handle <T> & co"));
        assert!(email.text.contains("Score: 0.65 (Medium)"));
    }

    #[test]
    fn test_digest_groups_good_first_issues() {
        let issues = vec![
            issue("other one", 0.7, Classification::Qualified),
            issue("starter", 0.9, Classification::GoodFirst),
        ];
        let email = MessageFormatter::digest_email("October 18, 2026", &issues);

        assert!(email.subject.contains("2 issues"));
        let good = email.text.find("Good First Issues").unwrap();
        let other = email.text.find("Other Opportunities").unwrap();
        assert!(good < other);
    }

    #[test]
    fn test_digest_truncates_long_sections() {
        let issues: Vec<Issue> = (0..8)
            .map(|i| issue(&"x".repeat(i + 1), 0.7, Classification::Qualified))
            .collect();
        let email = MessageFormatter::digest_email("today", &issues);
        assert!(email.text.contains("... and 3 more"));
    }

    #[test]
    fn test_email_dispatches_on_kind() {
        let i = issue("Assign me", 0.9, Classification::Qualified);
        let msg = NotificationMessage::assignment(&i, NotificationType::AssignmentConfirmation);
        assert!(MessageFormatter::email(&msg).subject.starts_with("✅ Assigned"));

        let msg = NotificationMessage::assignment(&i, NotificationType::AssignmentRequest);
        assert!(MessageFormatter::email(&msg).subject.contains("Assignment requested"));

        let date = NaiveDate::from_ymd_opt(2026, 10, 18).unwrap();
        let msg = NotificationMessage::digest(date, vec![i]);
        assert!(MessageFormatter::email(&msg).subject.contains("October 18, 2026"));
    }

    #[test]
    fn test_desktop_alert() {
        let i = issue("A very long issue title that goes on and on and on forever", 0.9, Classification::Qualified);
        let (title, body) = MessageFormatter::desktop_alert(&NotificationMessage::new_issue(&i));
        assert_eq!(title, "🔥 New issue found");
        assert!(body.starts_with("1. [tool] A very long issue title that goes on ..."));
        assert!(body.ends_with("(Score: 0.90)"));
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("this is a long message", 10), "this is...");
        assert_eq!(truncate("中文标题很长很长", 5), "中文...");
    }

    #[test]
    fn test_status_table() {
        use crate::notification::gate::ConfiguredLimit;
        use std::collections::BTreeMap;

        let mut limits = BTreeMap::new();
        limits.insert(
            NotificationType::NewIssue,
            ConfiguredLimit {
                hourly: Some(10),
                daily: Some(50),
            },
        );
        limits.insert(
            NotificationType::Digest,
            ConfiguredLimit {
                hourly: Some(0),
                daily: None,
            },
        );
        let status = StatusView {
            dedup_entries: 3,
            retention_hours: 24,
            limits,
        };

        let table = MessageFormatter::status_table(&status);
        assert!(table.starts_with("Dedup ledger: 3 entries (retention 24h)\n"));
        let new_issue = table.lines().find(|l| l.starts_with("new_issue")).unwrap();
        assert_eq!(new_issue.split_whitespace().collect::<Vec<_>>(), ["new_issue", "10", "50"]);
        let digest = table.lines().find(|l| l.starts_with("digest")).unwrap();
        assert_eq!(digest.split_whitespace().collect::<Vec<_>>(), ["digest", "off", "-"]);
        assert!(!table.contains('/'));
    }
}
