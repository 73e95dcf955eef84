use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Debug, Parser)]
#[command(
    name = "playmark",
    version,
    about = "Track watch progress reported by embedded video players"
)]
pub struct Cli {
    /// Database file (defaults to the platform data directory)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Only log warnings and errors
    #[arg(long, short, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Read player messages from stdin, one per line, and record progress
    Ingest(IngestArgs),
    /// Show the continue-watching list
    List {
        /// Include completed and barely started items
        #[arg(long)]
        all: bool,
    },
    /// Show where to resume a movie or episode
    Resume(ContentArgs),
    /// Forget progress for one content id (e.g. `tv_119051_s1e8`)
    Clear { content_id: String },
    /// Forget all stored progress
    ClearAll,
    /// Print a player embed URL, resuming from stored progress
    Embed(EmbedArgs),
}

#[derive(Debug, Args)]
pub struct IngestArgs {
    /// Persist on time updates every N seconds of playback
    #[arg(long)]
    pub save_interval: Option<u64>,

    /// Percentage at which content counts as watched
    #[arg(long)]
    pub completion_threshold: Option<f64>,

    /// Also POST saved progress to `<URL>/api/progress`
    #[arg(long)]
    pub remote_url: Option<String>,

    /// Title stored with every record written in this session
    #[arg(long)]
    pub title: Option<String>,

    /// Do not write to the local database
    #[arg(long)]
    pub no_local: bool,
}

#[derive(Debug, Args)]
pub struct ContentArgs {
    pub tmdb_id: u64,

    #[arg(long, requires = "episode")]
    pub season: Option<u32>,

    #[arg(long, requires = "season")]
    pub episode: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EmbedKind {
    Movie,
    Tv,
}

#[derive(Debug, Args)]
pub struct EmbedArgs {
    pub kind: EmbedKind,

    #[command(flatten)]
    pub content: ContentArgs,

    /// Brand color as hex, with or without `#`
    #[arg(long)]
    pub color: Option<String>,

    /// Start at this many seconds instead of the stored position
    #[arg(long)]
    pub start: Option<f64>,

    /// Ignore stored progress
    #[arg(long)]
    pub no_resume: bool,

    #[arg(long)]
    pub no_autoplay: bool,
}
