//! One-shot subcommands.
//!
//! Each command prints its result to stdout as pretty JSON.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use clap::{ArgGroup, Args, Subcommand};
use herald_auth::IssuedToken;
use herald_scheduler::{AnalyticsLookup, ScheduleRequest, Scheduler, TaskQueue};
use herald_store::{AnalyticsStore, AutoReplyAction, AutoReplyTrigger, Platform, Provider};
use miette::Result;
use serde::Serialize;
use serde_json::{Value, json};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::app::{App, DaemonHandoff};
use crate::autoreply::{IncomingComment, NewAutoReply};
use crate::content::ContentRequest;

#[derive(Debug, Args)]
#[command(group(ArgGroup::new("when").required(true).args(["at", "delay"])))]
pub struct ScheduleArgs {
    /// Owner of the post
    #[arg(long)]
    pub user: String,

    /// Target platform (repeatable or comma-separated)
    #[arg(long = "platform", value_delimiter = ',', required = true)]
    pub platforms: Vec<Platform>,

    /// Post text
    #[arg(long)]
    pub text: Option<String>,

    /// Media URL (repeatable)
    #[arg(long = "media")]
    pub media_urls: Vec<String>,

    /// Publication time (RFC 3339)
    #[arg(long)]
    pub at: Option<DateTime<Utc>>,

    /// Publish this many seconds from now
    #[arg(long = "in", value_name = "SECS")]
    pub delay: Option<u64>,
}

#[derive(Debug, Args)]
pub struct ListArgs {
    #[arg(long)]
    pub user: String,

    #[arg(long, default_value = "0")]
    pub skip: usize,

    #[arg(long, default_value = "20")]
    pub limit: usize,
}

#[derive(Debug, Args)]
pub struct PostArgs {
    #[arg(long)]
    pub user: String,

    /// Scheduled post id
    pub post_id: String,
}

#[derive(Debug, Args)]
pub struct AnalyticsArgs {
    #[command(flatten)]
    pub post: PostArgs,

    /// Seconds to wait for fetches queued by this lookup
    #[arg(long, default_value = "30")]
    pub wait_secs: u64,
}

#[derive(Debug, Args)]
pub struct LinkArgs {
    /// Identity provider the profile came from
    #[arg(long)]
    pub provider: Provider,

    /// JSON file with the provider's userinfo response
    #[arg(long)]
    pub userinfo: PathBuf,

    /// JSON file with the provider's token response
    #[arg(long)]
    pub token: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct GenerateArgs {
    #[arg(long)]
    pub user: String,

    #[arg(long)]
    pub platform: Platform,

    /// Keyword to work in (repeatable or comma-separated)
    #[arg(long = "keyword", value_delimiter = ',')]
    pub keywords: Vec<String>,

    #[arg(long, default_value = "friendly")]
    pub tone: String,

    /// Target length in words
    #[arg(long)]
    pub length: Option<u32>,

    /// Extra instructions
    #[arg(long)]
    pub notes: Option<String>,
}

#[derive(Debug, Args)]
pub struct UserArgs {
    #[arg(long)]
    pub user: String,
}

#[derive(Debug, Subcommand)]
pub enum AutoReplyCommand {
    /// Add an auto-reply rule
    Add(AutoReplyAddArgs),
    /// List a user's auto-reply rules
    List(UserArgs),
}

#[derive(Debug, Args)]
#[command(group(ArgGroup::new("reply").required(true).args(["template", "ai_prompt"])))]
pub struct AutoReplyAddArgs {
    #[arg(long)]
    pub user: String,

    #[arg(long)]
    pub platform: Platform,

    #[arg(long)]
    pub name: String,

    /// Trigger keyword (repeatable or comma-separated); omit to match every comment
    #[arg(long = "keyword", value_delimiter = ',')]
    pub keywords: Vec<String>,

    /// Reply template; {comment} is replaced with the comment text
    #[arg(long)]
    pub template: Option<String>,

    /// Prompt for a generated reply
    #[arg(long)]
    pub ai_prompt: Option<String>,

    /// Store the rule disabled
    #[arg(long)]
    pub inactive: bool,
}

#[derive(Debug, Args)]
pub struct CommentArgs {
    #[arg(long)]
    pub user: String,

    #[arg(long)]
    pub platform: Platform,

    /// Platform id of the comment to reply to
    #[arg(long)]
    pub comment_id: String,

    /// Comment text
    pub text: String,
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|e| miette::miette!("failed to render output: {}", e))?;
    println!("{}", rendered);
    Ok(())
}

async fn read_json(path: &Path) -> Result<Value> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| miette::miette!("failed to read {}: {}", path.display(), e))?;
    serde_json::from_str(&raw).map_err(|e| miette::miette!("invalid JSON in {}: {}", path.display(), e))
}

pub async fn schedule(app: &App, args: ScheduleArgs) -> Result<()> {
    let scheduled_at = match (args.at, args.delay) {
        (Some(at), _) => at,
        (None, Some(secs)) => {
            let secs = i64::try_from(secs)
                .ok()
                .and_then(chrono::Duration::try_seconds)
                .ok_or_else(|| miette::miette!("--in {} is out of range", secs))?;
            Utc::now() + secs
        }
        (None, None) => return Err(miette::miette!("either --at or --in is required")),
    };

    let service = app.post_service(Arc::new(DaemonHandoff));
    let post = service
        .schedule_post(
            &args.user,
            ScheduleRequest {
                platforms: args.platforms,
                text_content: args.text,
                media_urls: args.media_urls,
                scheduled_at,
            },
        )
        .await
        .map_err(|e| miette::miette!("failed to schedule post: {}", e))?;

    print_json(&post)
}

pub async fn list(app: &App, args: ListArgs) -> Result<()> {
    let posts = app
        .post_service(Arc::new(DaemonHandoff))
        .list_posts(&args.user, args.skip, args.limit)
        .await
        .map_err(|e| miette::miette!("failed to list posts: {}", e))?;
    print_json(&posts)
}

pub async fn show(app: &App, args: PostArgs) -> Result<()> {
    let post = app
        .post_service(Arc::new(DaemonHandoff))
        .get_post(&args.user, &args.post_id)
        .await
        .map_err(|e| miette::miette!("failed to get post: {}", e))?;
    print_json(&post)
}

/// Look up analytics, fetching misses with an in-process scheduler.
pub async fn analytics(app: &App, args: AnalyticsArgs) -> Result<()> {
    let scheduler = app.scheduler();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(Arc::clone(&scheduler).run(shutdown_rx));

    let report = analytics_report(app, &scheduler, &args).await;

    let _ = shutdown_tx.send(true);
    let _ = handle.await;

    print_json(&report?)
}

async fn analytics_report(
    app: &App,
    scheduler: &Arc<Scheduler>,
    args: &AnalyticsArgs,
) -> Result<Vec<Value>> {
    let user = &args.post.user;
    let queue: Arc<dyn TaskQueue> = scheduler.clone();
    let lookups = app
        .analytics_service(queue)
        .for_post(user, &args.post.post_id)
        .await
        .map_err(|e| miette::miette!("failed to look up analytics: {}", e))?;

    if lookups
        .iter()
        .any(|(_, _, lookup)| matches!(lookup, AnalyticsLookup::Pending))
    {
        wait_for_idle(scheduler, Duration::from_secs(args.wait_secs)).await;
    }

    let mut report = Vec::with_capacity(lookups.len());
    for (platform, platform_post_id, lookup) in lookups {
        let analytics = match lookup {
            AnalyticsLookup::Ready(analytics) => Some(analytics),
            AnalyticsLookup::Pending => app
                .store
                .find_analytics(user, platform, &platform_post_id)
                .await
                .map_err(|e| miette::miette!("failed to read analytics: {}", e))?,
        };
        let analytics = match analytics {
            Some(analytics) => json!(analytics),
            None => json!("pending"),
        };
        report.push(json!({
            "platform": platform,
            "platformPostId": platform_post_id,
            "analytics": analytics,
        }));
    }
    Ok(report)
}

async fn wait_for_idle(scheduler: &Scheduler, wait: Duration) {
    let idle = async {
        loop {
            let stats = scheduler.stats().await;
            if stats.queued + stats.running == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    };
    if tokio::time::timeout(wait, idle).await.is_err() {
        warn!(wait_secs = wait.as_secs(), "analytics fetch still pending");
    }
}

pub async fn link(app: &App, args: LinkArgs) -> Result<()> {
    let userinfo = read_json(&args.userinfo).await?;
    let token = match &args.token {
        Some(path) => {
            let response = read_json(path).await?;
            let token = IssuedToken::from_token_response(args.provider, &response, Utc::now())
                .map_err(|e| miette::miette!("invalid token response: {}", e))?;
            Some(token)
        }
        None => None,
    };

    let user = app
        .linker()
        .link(args.provider, &userinfo, token)
        .await
        .map_err(|e| miette::miette!("failed to link account: {}", e))?;

    info!(user_id = %user.id, provider = %args.provider, "account linked");
    print_json(&user)
}

pub async fn generate(app: &App, args: GenerateArgs) -> Result<()> {
    let content = app
        .content_service()
        .generate(
            &args.user,
            ContentRequest {
                platform: args.platform,
                keywords: args.keywords,
                tone: args.tone,
                length: args.length,
                notes: args.notes,
            },
        )
        .await
        .map_err(|e| miette::miette!("failed to generate content: {}", e))?;
    print_json(&content)
}

pub async fn history(app: &App, args: UserArgs) -> Result<()> {
    let history = app
        .content_service()
        .history(&args.user)
        .await
        .map_err(|e| miette::miette!("failed to read content history: {}", e))?;
    print_json(&history)
}

pub async fn auto_reply(app: &App, command: AutoReplyCommand) -> Result<()> {
    let service = app.auto_reply_service();
    match command {
        AutoReplyCommand::Add(args) => {
            let trigger = if args.keywords.is_empty() {
                AutoReplyTrigger::AllComments
            } else {
                AutoReplyTrigger::Keyword {
                    keywords: args.keywords,
                }
            };
            let action = match (args.template, args.ai_prompt) {
                (Some(template), _) => AutoReplyAction::Template { template },
                (None, Some(prompt)) => AutoReplyAction::AiGenerated { prompt },
                (None, None) => {
                    return Err(miette::miette!("either --template or --ai-prompt is required"));
                }
            };
            let config = service
                .configure(
                    &args.user,
                    NewAutoReply {
                        platform: args.platform,
                        name: args.name,
                        is_active: !args.inactive,
                        trigger,
                        action,
                    },
                )
                .await
                .map_err(|e| miette::miette!("failed to add auto-reply: {}", e))?;
            print_json(&config)
        }
        AutoReplyCommand::List(args) => {
            let configs = service
                .list(&args.user)
                .await
                .map_err(|e| miette::miette!("failed to list auto-replies: {}", e))?;
            print_json(&configs)
        }
    }
}

pub async fn comment(app: &App, args: CommentArgs) -> Result<()> {
    let comment = IncomingComment {
        platform: args.platform,
        comment_id: args.comment_id,
        text: args.text,
    };
    let outcome = app
        .auto_reply_service()
        .process_comment(&args.user, &comment)
        .await
        .map_err(|e| miette::miette!("failed to process comment: {}", e))?;

    let rendered = outcome.map(|outcome| {
        json!({
            "configId": outcome.config_id,
            "text": outcome.text,
            "replyId": outcome.reply_id,
        })
    });
    print_json(&rendered)
}
