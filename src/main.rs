//! Issue Scout CLI
//!
//! 把评分器产出的 Issue 列表分发到各个通知渠道

use anyhow::Result;
use clap::{Parser, Subcommand};
use issue_scout::notification::{MessageFormatter, StatusView};
use issue_scout::{load_issues, DeliveryMode, NotificationBuilder, NotificationType, ScoutConfig};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "scout")]
#[command(about = "Issue Scout - 对已评分的 GitHub Issue 发送限流、去重后的通知")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 分发一批已评分的 Issue
    Notify {
        /// Issue JSON 数组文件，`-` 表示 stdin
        #[arg(long, default_value = "-")]
        issues: PathBuf,
        /// 邮件按摘要发送（覆盖配置）
        #[arg(long, conflicts_with = "instant")]
        digest: bool,
        /// 每个 Issue 一封邮件（覆盖配置）
        #[arg(long)]
        instant: bool,
        /// 只打印将要发送的通知
        #[arg(long)]
        dry_run: bool,
        /// 启用桌面通知
        #[arg(long)]
        desktop: bool,
        /// 不在终端打印 Issue 卡片
        #[arg(long)]
        quiet: bool,
    },
    /// 发送认领确认或认领请求邮件
    Assign {
        /// Issue JSON 数组文件，`-` 表示 stdin
        #[arg(long, default_value = "-")]
        issues: PathBuf,
        /// 发送认领请求而不是确认
        #[arg(long)]
        request: bool,
        #[arg(long)]
        dry_run: bool,
    },
    /// 查看去重账本和配置的限额
    Status {
        /// 输出 JSON 格式
        #[arg(long)]
        json: bool,
    },
    /// 清理过期的去重记录
    Cleanup,
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("issue_scout=info,scout=info"));

    fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .init();

    let cli = Cli::parse();
    let mut config = ScoutConfig::load()?;

    match cli.command {
        Commands::Notify {
            issues,
            digest,
            instant,
            dry_run,
            desktop,
            quiet,
        } => {
            if digest {
                config.mode = DeliveryMode::Digest;
            } else if instant {
                config.mode = DeliveryMode::Instant;
            }
            config.desktop |= desktop;
            config.console &= !quiet;

            let issues = load_issues(&issues)?;
            info!(count = issues.len(), mode = ?config.mode, "Loaded issues");

            let mut dispatcher = NotificationBuilder::new(config).dry_run(dry_run).build()?;
            let report = dispatcher.dispatch(&issues);
            let digest_sent = dispatcher.finish();

            eprintln!("{}", report.summary());
            if digest_sent {
                eprintln!("Digest email sent");
            }
        }
        Commands::Assign {
            issues,
            request,
            dry_run,
        } => {
            let kind = if request {
                NotificationType::AssignmentRequest
            } else {
                NotificationType::AssignmentConfirmation
            };
            config.console = false;

            let issues = load_issues(&issues)?;
            let dispatcher = NotificationBuilder::new(config).dry_run(dry_run).build()?;
            for issue in &issues {
                let report = dispatcher.notify_assignment(issue, kind);
                eprintln!("{}: {}", issue.url, report.summary());
            }
            dispatcher.finish();
        }
        Commands::Status { json } => {
            let gate = NotificationBuilder::new(config).build_gate()?;
            let status = StatusView::from(&gate.stats());
            if json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                print!("{}", MessageFormatter::status_table(&status));
            }
        }
        Commands::Cleanup => {
            let gate = NotificationBuilder::new(config).build_gate()?;
            let live = gate.compact()?;
            println!("Dedup ledger compacted: {} live entries", live);
        }
    }

    Ok(())
}
