use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

#[derive(Debug, Parser)]
#[command(
    name = "paperwork-index",
    about = "Keyword search, query suggestions and batch OCR for scanned documents"
)]
pub struct Cli {
    /// Override the XDG data directory
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Override the configured document directory
    #[arg(long, global = true)]
    pub workdir: Option<PathBuf>,

    /// Increase log verbosity (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log warnings and errors, and hide progress bars
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Reindex the whole document collection
    Sync,
    /// List documents matching a keyword query (all documents if empty)
    Search(SearchArgs),
    /// Propose corrected queries that match at least one document
    Suggest(SuggestArgs),
    /// Re-run OCR on every document, then reindex
    RedoOcr(RedoOcrArgs),
    /// Manage document labels
    Label {
        #[command(subcommand)]
        action: LabelAction,
    },
    /// Manage persistent settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Show index location and statistics
    Status(StatusArgs),
    /// Generate shell completions
    #[command(hide = true)]
    Completions(CompletionsArgs),
}

// -- Search --

#[derive(Debug, Parser)]
pub struct SearchArgs {
    /// Keywords; every word must match
    pub query: Vec<String>,

    /// Output results as JSON
    #[arg(long)]
    pub json: bool,
}

impl SearchArgs {
    pub fn query_text(&self) -> String {
        self.query.join(" ")
    }
}

#[derive(Debug, Parser)]
pub struct SuggestArgs {
    /// The (possibly misspelled) query
    #[arg(required = true)]
    pub query: Vec<String>,

    /// Output suggestions as JSON
    #[arg(long)]
    pub json: bool,
}

impl SuggestArgs {
    pub fn query_text(&self) -> String {
        self.query.join(" ")
    }
}

#[derive(Debug, Parser)]
pub struct RedoOcrArgs {
    /// OCR language (defaults to the `ocr_lang` setting)
    #[arg(long)]
    pub lang: Option<String>,

    /// Concurrent OCR jobs (defaults to the `ocr_workers` setting or the CPU count)
    #[arg(long)]
    pub workers: Option<usize>,
}

// -- Labels --

#[derive(Debug, Subcommand)]
pub enum LabelAction {
    /// List every label in use
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Attach a label to a document
    Add {
        /// Document identifier
        docid: String,
        /// Label name
        name: String,
        /// Label color, e.g. "#ff0000"
        #[arg(long)]
        color: Option<String>,
    },
    /// Rename a label on every document
    Rename {
        old: String,
        new: String,
        /// Color for the renamed label
        #[arg(long)]
        color: Option<String>,
    },
    /// Remove a label from every document
    Remove { name: String },
}

// -- Config --

#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Print a setting
    Get { key: String },
    /// Store a setting
    Set { key: String, value: String },
    /// Delete a setting
    Unset { key: String },
    /// List every stored setting
    List,
}

// -- Status --

#[derive(Debug, Parser)]
pub struct StatusArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Completions --

#[derive(Debug, Parser)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

impl CompletionsArgs {
    /// Generate shell completions and print to stdout.
    pub fn generate(&self) {
        let mut cmd = Cli::command();
        clap_complete::generate(
            self.shell,
            &mut cmd,
            "paperwork-index",
            &mut std::io::stdout(),
        );
    }
}
