use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use automod::config::Config;
use automod::moderation::models::ModerationResult;
use automod::moderation::recorded::RecordedModel;
use automod::output::terminal;
use automod::pipeline::batch::ContentBatchItem;
use automod::pipeline::engine::ModerationEngine;
use automod::policy::decision::{decide, AuthorContext};
use automod::policy::rules::{FlaggingRules, RulesHandle};
use automod::store::memory::{AuthorRecord, InMemoryStore, LogNotifier};

/// Automod: automatic content moderation decisions.
///
/// Turns moderation model verdicts into approve / reject / flag / human
/// review actions, and carries those actions out.
#[derive(Parser)]
#[command(name = "automod", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the decision policy on a single saved verdict
    Decide {
        /// JSON file holding one moderation result
        result: PathBuf,

        /// Author reputation score (default: 100)
        #[arg(long, default_value = "100")]
        reputation: i64,

        /// Treat the author as a new user
        #[arg(long)]
        new_user: bool,
    },

    /// Replay a recorded batch through the full engine
    Replay {
        /// JSON file with items, recorded verdicts and authors
        batch: PathBuf,

        /// File a user report against this content after the batch (repeatable)
        #[arg(long = "report")]
        reports: Vec<String>,
    },

    /// Moderate one submission through the live model service
    #[cfg(feature = "http")]
    Check {
        /// Author of the submission
        #[arg(long)]
        author: String,

        /// Text content
        #[arg(long)]
        text: Option<String>,

        /// Image URL (repeatable)
        #[arg(long = "image")]
        images: Vec<String>,

        /// Author reputation score (default: 100)
        #[arg(long, default_value = "100")]
        reputation: i64,

        /// Treat the author as a new user
        #[arg(long)]
        new_user: bool,
    },

    /// Show the active flagging rules
    Rules,
}

/// A recorded batch: submissions, the verdicts the model gave for them,
/// and the authors involved.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReplayFile {
    items: Vec<ContentBatchItem>,
    verdicts: Vec<ModerationResult>,
    #[serde(default)]
    authors: Vec<AuthorRecord>,
    /// Overrides the configured rules for this replay
    #[serde(default)]
    rules: Option<FlaggingRules>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if missing)
    let _ = dotenvy::dotenv();

    // Set up structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("automod=info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Decide {
            result,
            reputation,
            new_user,
        } => {
            let config = Config::load()?;
            let rules = config.load_rules()?.snapshot();

            let verdict: ModerationResult = read_json(&result)?;
            verdict
                .validate()
                .with_context(|| format!("Invalid moderation result in {}", result.display()))?;

            let author = AuthorContext {
                reputation,
                is_new_user: new_user,
            };
            let action = decide(&verdict, &author, &rules);
            terminal::display_decision(&verdict, &author, &action);
        }

        Commands::Replay { batch, reports } => {
            let config = Config::load()?;
            let replay: ReplayFile = read_json(&batch)?;

            let rules = match replay.rules {
                Some(rules) => RulesHandle::new(rules)?,
                None => config.load_rules()?,
            };

            let store = Arc::new(InMemoryStore::new());
            for author in replay.authors {
                store.add_author(author).await;
            }
            let model = Arc::new(RecordedModel::new(replay.verdicts));
            info!(
                items = replay.items.len(),
                verdicts = model.len(),
                "Replaying recorded batch"
            );

            let engine = ModerationEngine::new(
                model,
                store,
                Arc::new(LogNotifier),
                Arc::new(rules),
                config.engine_settings(),
            );

            let pb = ProgressBar::new_spinner();
            pb.set_style(
                ProgressStyle::default_spinner()
                    .template("  {spinner} {msg} [{elapsed}]")
                    .expect("valid template"),
            );
            pb.set_message(format!("Moderating {} items...", replay.items.len()));
            pb.enable_steady_tick(Duration::from_millis(100));

            let results = engine.process_batch(replay.items).await;
            pb.finish_and_clear();

            terminal::display_results(&results);

            for content_id in &reports {
                match engine.report_content(content_id) {
                    Some(item) => println!(
                        "  Report on {} escalated it to the review queue ({} reports, {} priority)",
                        content_id.bold(),
                        item.report_count,
                        item.priority
                    ),
                    None => println!(
                        "  Report on {} recorded",
                        content_id.bold()
                    ),
                }
            }

            terminal::display_queue(&engine.queue().peek_all());
            terminal::display_statistics(&engine.statistics());

            engine.shutdown().await;
        }

        #[cfg(feature = "http")]
        Commands::Check {
            author,
            text,
            images,
            reputation,
            new_user,
        } => {
            let config = Config::load()?;
            config.require_model()?;

            let model = automod::moderation::http::HttpModerationModel::new(
                &config.model_url,
                config.model_api_key.clone(),
            )?;

            let store = Arc::new(InMemoryStore::new());
            store
                .add_author(AuthorRecord {
                    author_id: author.clone(),
                    reputation,
                    is_new_user: new_user,
                })
                .await;

            let item = ContentBatchItem {
                content_id: format!("check-{}", uuid::Uuid::new_v4()),
                content_type: if text.is_none() && !images.is_empty() {
                    automod::moderation::models::ContentType::Image
                } else {
                    automod::moderation::models::ContentType::Post
                },
                author_id: author,
                text,
                images,
                report_count: 0,
            };

            let engine = ModerationEngine::new(
                Arc::new(model),
                store,
                Arc::new(LogNotifier),
                Arc::new(config.load_rules()?),
                config.engine_settings(),
            );

            println!("Sending content to {}...", config.model_url);
            let result = engine.process_item(item).await;
            engine.shutdown().await;

            if let Some(error) = result.error() {
                anyhow::bail!("Moderation failed: {error}");
            }
            terminal::display_results(std::slice::from_ref(&result));
        }

        Commands::Rules => {
            let config = Config::load()?;
            let rules = config.load_rules()?.snapshot();
            match &config.rules_path {
                Some(path) => println!("Rules loaded from {}", path.display()),
                None => println!(
                    "{}",
                    "No AUTOMOD_RULES_PATH set; showing built-in defaults.".dimmed()
                ),
            }
            terminal::display_rules(&rules);
        }
    }

    Ok(())
}

/// Read and deserialize a JSON file, with the path in any error.
fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Failed to parse {}", path.display()))
}
