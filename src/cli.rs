use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Split a document into translation segments and print them as JSON
    Segment {
        /// Input document (HTML, Markdown or plain text)
        #[arg(short, long)]
        input: PathBuf,

        /// Soft upper bound on segment length, in characters
        #[arg(short, long)]
        max_length: Option<usize>,

        /// Ignore markup and split line by line
        #[arg(long)]
        plain: bool,
    },

    /// Translate a whole document paragraph by paragraph
    Translate {
        /// Input document
        #[arg(short, long)]
        input: PathBuf,

        /// Target language code
        #[arg(short, long)]
        target: String,

        /// Source language code (defaults to the configured one)
        #[arg(short, long)]
        source: Option<String>,

        /// Identifier the paragraph map is stored under (defaults to the input path)
        #[arg(short, long)]
        document_id: Option<String>,

        /// Render original and translation side by side
        #[arg(long)]
        bilingual: bool,

        /// Output file; stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Translate caller-identified blocks, printing server-sent events
    Blocks {
        /// JSON array of `{ "id": ..., "text": ... }` objects
        #[arg(short, long)]
        input: PathBuf,

        /// Identifier the paragraph map is stored under
        #[arg(short, long)]
        document_id: String,

        /// Target language code
        #[arg(short, long)]
        target: String,

        /// Source language code (defaults to the configured one)
        #[arg(short, long)]
        source: Option<String>,
    },

    /// Manage persisted paragraph maps
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
pub enum CacheAction {
    /// List stored paragraph maps
    List,

    /// Remove every stored paragraph map
    Clear,

    /// Show paragraph map statistics
    Info,
}
