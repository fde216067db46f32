//! Paratrans - paragraph-level document translation
//!
//! Command line entry point: segment documents, translate them through an
//! OpenAI-compatible chat endpoint, and maintain the persisted paragraph maps.

use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, Level};
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use paratrans::blocks::{BlockFlow, TranslationEvent};
use paratrans::cache::LanguagePair;
use paratrans::cli::{Args, CacheAction, Commands};
use paratrans::config::Config;
use paratrans::segment;
use paratrans::store::FileParagraphStore;
use paratrans::translate::{Block, TranslatorFactory};
use paratrans::workflow::{DocumentWorkflow, RenderMode};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Setup logging to both console and file
    setup_logging(args.verbose)?;

    // Load configuration
    let mut config = match &args.config {
        Some(config_path) => Config::from_file(config_path)?,
        None => {
            if Path::new("paratrans.toml").exists() {
                info!("Found paratrans.toml in current directory, loading...");
                Config::from_file("paratrans.toml")?
            } else {
                Config::default()
            }
        }
    };
    config.apply_env();
    config.validate()?;

    match args.command {
        Commands::Segment {
            input,
            max_length,
            plain,
        } => {
            let text = tokio::fs::read_to_string(&input).await?;
            let max_length = max_length.unwrap_or(config.segmenter.max_length);
            let preserve = config.segmenter.preserve_structure && !plain;
            let segments = segment::split(&text, max_length, preserve);
            info!("Split {} into {} segments", input.display(), segments.len());
            println!("{}", serde_json::to_string_pretty(&segments)?);
        }
        Commands::Translate {
            input,
            target,
            source,
            document_id,
            bilingual,
            output,
        } => {
            info!("Translating document: {}", input.display());
            let text = tokio::fs::read_to_string(&input).await?;
            let pair = LanguagePair::new(
                source.unwrap_or_else(|| config.translator.source_language.clone()),
                target,
            );
            let document_id = document_id.unwrap_or_else(|| input.display().to_string());
            let mode = if bilingual {
                RenderMode::Bilingual
            } else {
                RenderMode::Replace
            };

            let pb = ProgressBar::new(0);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} segments ({eta})")?
                    .progress_chars("#>-"),
            );

            let workflow = DocumentWorkflow::new(config)?;
            let outcome = workflow
                .translate_document(&document_id, &text, &pair, mode, |_, done, total| {
                    pb.set_length(total as u64);
                    pb.set_position(done as u64);
                })
                .await?;
            pb.finish_and_clear();

            match output {
                Some(path) => {
                    tokio::fs::write(&path, &outcome.text).await?;
                    info!("Wrote translation to {}", path.display());
                }
                None => println!("{}", outcome.text),
            }
            info!(
                "{} segments: {} translated, {} cached, {} failed",
                outcome.segments, outcome.translated, outcome.cached, outcome.failed
            );
        }
        Commands::Blocks {
            input,
            document_id,
            target,
            source,
        } => {
            let content = tokio::fs::read_to_string(&input).await?;
            let blocks: Vec<Block> = serde_json::from_str(&content)?;
            let pair = LanguagePair::new(
                source.unwrap_or_else(|| config.translator.source_language.clone()),
                target,
            );

            let translator = TranslatorFactory::create_translator(config.translator.clone())?;
            let store = Arc::new(FileParagraphStore::new(&config.store.path));
            let flow = BlockFlow::new(
                translator,
                store,
                config.blocks.clone(),
                config.orchestrator.max_concurrent,
            );

            let (tx, mut rx) = mpsc::unbounded_channel::<TranslationEvent>();
            let printer = async {
                while let Some(event) = rx.recv().await {
                    print!("{}", event.to_sse());
                }
            };
            let (summary, _) = tokio::join!(flow.run(&document_id, &pair, blocks, tx), printer);
            let summary = summary?;
            info!(
                "Blocks done: {} total, {} success, {} failed, {} cached",
                summary.total, summary.success, summary.failed, summary.cached
            );
        }
        Commands::Cache { action } => {
            let store = FileParagraphStore::new(&config.store.path);
            match action {
                CacheAction::List => {
                    let records = store.list()?;
                    if records.is_empty() {
                        println!("No stored paragraph maps found.");
                    } else {
                        println!("\nStored Paragraph Maps:");
                        println!("{:<10} {:<10} {:<10} {:<15} {:<50}", "Pair", "Entries", "Revision", "Updated", "Document");
                        println!("{}", "-".repeat(100));
                        for record in records {
                            let age = (Utc::now() - record.updated_at).num_seconds().max(0) as u64;
                            println!(
                                "{:<10} {:<10} {:<10} {:<15} {:<50}",
                                record.language_pair,
                                record.entries,
                                record.revision,
                                format_duration(age),
                                record.document_id
                            );
                        }
                    }
                }
                CacheAction::Clear => {
                    let count = store.clear()?;
                    println!("Cleared {} stored paragraph maps", count);
                }
                CacheAction::Info => {
                    let records = store.list()?;
                    let entries: usize = records.iter().map(|r| r.entries).sum();
                    let size: u64 = records.iter().map(|r| r.size_bytes).sum();

                    println!("\nParagraph Map Statistics:");
                    println!("Location: {}", store.root().display());
                    println!("Documents: {}", records.len());
                    println!("Entries: {}", entries);
                    println!("Total size: {:.2} MB", size as f64 / 1024.0 / 1024.0);
                    if let Some(newest) = records.first() {
                        let age = (Utc::now() - newest.updated_at).num_seconds().max(0) as u64;
                        println!("Newest entry: {} ago", format_duration(age));
                    }
                    if let Some(oldest) = records.last() {
                        let age = (Utc::now() - oldest.updated_at).num_seconds().max(0) as u64;
                        println!("Oldest entry: {} ago", format_duration(age));
                    }
                }
            }
        }
    }

    Ok(())
}

/// Setup logging to both console and file
fn setup_logging(verbose: bool) -> Result<()> {
    let log_dir = std::env::current_dir()?.join(".paratrans").join("log");
    std::fs::create_dir_all(&log_dir)?;

    // Set up file appender with daily rotation
    let file_appender = rolling::daily(&log_dir, "paratrans.log");
    let (non_blocking_file, guard) = non_blocking(file_appender);
    // Keep the guard alive for the duration of the program
    std::mem::forget(guard);

    let log_level = if verbose { Level::DEBUG } else { Level::INFO };

    // Console goes to stderr so stdout stays clean for JSON and SSE output
    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_target(false)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!(
        "Logging initialized - console: {}, file: {}",
        log_level,
        log_dir.join("paratrans.log").display()
    );

    Ok(())
}

/// Format duration in seconds to human readable string
fn format_duration(seconds: u64) -> String {
    if seconds < 60 {
        format!("{}s", seconds)
    } else if seconds < 3600 {
        format!("{}m {}s", seconds / 60, seconds % 60)
    } else if seconds < 86_400 {
        format!("{}h {}m", seconds / 3600, (seconds % 3600) / 60)
    } else {
        format!("{}d {}h", seconds / 86_400, (seconds % 86_400) / 3600)
    }
}
