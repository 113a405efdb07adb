//! Herald: social media automation
//!
//! Main binary with subcommands:
//! - `daemon`: Scheduler and reconciler publishing due posts
//! - `schedule`, `list`, `show`: Manage scheduled posts
//! - `analytics`: Cached or freshly fetched post metrics
//! - `link`: Create or update an account from a provider login
//! - `generate`, `history`: AI-generated post content
//! - `auto-reply`, `comment`: Keyword-triggered comment replies

use clap::{Parser, Subcommand};
use miette::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod app;
mod autoreply;
mod commands;
mod config;
mod content;
mod daemon;

use commands::{
    AnalyticsArgs, AutoReplyCommand, CommentArgs, GenerateArgs, LinkArgs, ListArgs, PostArgs,
    ScheduleArgs, UserArgs,
};
use config::Settings;

#[derive(Parser)]
#[command(name = "herald")]
#[command(about = "Social media automation", long_about = None)]
struct Cli {
    #[command(flatten)]
    settings: Settings,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the publishing daemon (scheduler, reconciler)
    Daemon,

    /// Schedule a post
    Schedule(ScheduleArgs),

    /// List a user's scheduled posts, newest first
    List(ListArgs),

    /// Show one scheduled post
    Show(PostArgs),

    /// Show analytics for a published post
    Analytics(AnalyticsArgs),

    /// Link a provider login to an account
    Link(LinkArgs),

    /// Generate post content
    Generate(GenerateArgs),

    /// List a user's generated content
    History(UserArgs),

    /// Manage auto-reply rules
    #[command(subcommand)]
    AutoReply(AutoReplyCommand),

    /// Answer a comment with the first matching auto-reply rule
    Comment(CommentArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing; stdout carries command output
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "herald=info".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let app = app::App::open(cli.settings).await?;

    match cli.command {
        Commands::Daemon => daemon::run(app).await,
        Commands::Schedule(args) => commands::schedule(&app, args).await,
        Commands::List(args) => commands::list(&app, args).await,
        Commands::Show(args) => commands::show(&app, args).await,
        Commands::Analytics(args) => commands::analytics(&app, args).await,
        Commands::Link(args) => commands::link(&app, args).await,
        Commands::Generate(args) => commands::generate(&app, args).await,
        Commands::History(args) => commands::history(&app, args).await,
        Commands::AutoReply(command) => commands::auto_reply(&app, command).await,
        Commands::Comment(args) => commands::comment(&app, args).await,
    }
}
