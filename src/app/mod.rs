mod format;


use std::io::{self, BufRead};

use anyhow::{Context, Result, bail};
use tracing::{info, warn};

use crate::cli::{Cli, Command, ContentArgs, EmbedArgs, EmbedKind, IngestArgs};
use crate::config::Settings;
use crate::db::Database;
use crate::embed::{EmbedOptions, EmbedTarget, embed_url, resuming_embed_url};
use crate::http::HttpProgressSink;
use crate::progress::{
    ContentId, EventHandlers, IngestStats, PlayerEventIngestor, ProgressRecord, ProgressStore,
    ProgressTracker, SaveSideChannel, all_progress, incomplete_progress, resume_progress,
};

use self::format::{
    display_title, format_last_watched, format_time, progress_text, time_remaining, truncate,
};

pub fn run(cli: Cli) -> Result<()> {
    let mut settings = Settings::resolve(&cli);
    let store = open_store(&settings)?;

    match cli.command {
        Command::Ingest(args) => {
            settings.apply_ingest(&args);
            run_ingest(&store, &settings, &args)?
        }
        Command::List { all } => run_list(&store, all),
        Command::Resume(args) => run_resume(&store, &args),
        Command::Clear { content_id } => run_clear(&store, &content_id)?,
        Command::ClearAll => run_clear_all(&store),
        Command::Embed(args) => run_embed(&store, &args)?,
    }

    Ok(())
}

fn open_store(settings: &Settings) -> Result<ProgressStore> {
    let db_path = settings.database_path()?;
    let db = Database::open(&db_path)?;
    db.migrate()
        .with_context(|| format!("failed to prepare database at {}", db_path.display()))?;
    Ok(ProgressStore::new(Box::new(db), settings.namespace.clone()))
}

fn run_ingest(store: &ProgressStore, settings: &Settings, args: &IngestArgs) -> Result<()> {
    let stdin = io::stdin();
    let stats = ingest_from(store, settings, args.title.as_deref(), stdin.lock())?;
    println!(
        "Processed {} message(s): {} player event(s), {} ignored, {} invalid.",
        stats.received, stats.accepted, stats.ignored, stats.invalid
    );
    Ok(())
}

pub(crate) fn ingest_from<R: BufRead>(
    store: &ProgressStore,
    settings: &Settings,
    title: Option<&str>,
    reader: R,
) -> Result<IngestStats> {
    let mut tracker = ProgressTracker::new(store, settings.tracker.clone());
    if let Some(title) = title {
        tracker = tracker.with_title(title);
    }
    if let Some(url) = settings.remote_url.as_deref() {
        info!(url = %url, "sending progress to remote endpoint");
        tracker = tracker.with_remote(SaveSideChannel::spawn(HttpProgressSink::new(url)));
    }

    let console = tracker.config().enable_console_logging;
    let mut ingestor = PlayerEventIngestor::new(tracker);
    let console_output = console.then(|| {
        ingestor.subscribe(
            EventHandlers::default()
                .on_play(|event| {
                    println!(
                        "Playing {} from {}",
                        event.media.content_id(),
                        format_time(event.current_time)
                    )
                })
                .on_seeked(|event| {
                    println!(
                        "Seeked {} to {}",
                        event.media.content_id(),
                        format_time(event.current_time)
                    )
                })
                .on_pause(|event| {
                    println!(
                        "Paused {} at {} ({:.1}%)",
                        event.media.content_id(),
                        format_time(event.current_time),
                        event.progress
                    )
                })
                .on_ended(|event| {
                    println!(
                        "Finished {} ({})",
                        event.media.content_id(),
                        format_time(event.duration)
                    )
                }),
        )
    });

    let stats = ingestor
        .pump(reader)
        .context("failed reading player messages")?;
    if let Some(id) = console_output {
        ingestor.unsubscribe(id);
    }

    if let Some(remote) = ingestor.into_sink().finish() {
        let failures = remote.shutdown();
        if failures > 0 {
            warn!("{failures} progress update(s) could not be sent to the remote endpoint");
        }
    }
    Ok(stats)
}

fn run_list(store: &ProgressStore, all: bool) {
    let items = if all {
        all_progress(store)
    } else {
        incomplete_progress(store)
    };
    if items.is_empty() {
        if all {
            println!("No stored progress yet. Run `playmark ingest` first.");
        } else {
            println!("Nothing to continue watching.");
        }
        return;
    }

    for line in render_list(&items) {
        println!("{line}");
    }
}

pub(crate) fn render_list(items: &[ProgressRecord]) -> Vec<String> {
    let mut lines = vec![format!(
        "{:<24} {:<36} {:<14} {:<10} {:<24}",
        "CONTENT ID", "TITLE", "PROGRESS", "LEFT", "LAST WATCHED"
    )];
    for item in items {
        lines.push(format!(
            "{:<24} {:<36} {:<14} {:<10} {:<24}",
            truncate(item.id.as_str(), 24),
            truncate(&display_title(item), 36),
            progress_text(item),
            time_remaining(item),
            format_last_watched(item.last_watched)
        ));
    }
    lines
}

fn run_resume(store: &ProgressStore, args: &ContentArgs) {
    match resume_progress(store, args.tmdb_id, args.season, args.episode) {
        Some(record) => {
            println!("Resume {}", display_title(&record));
            println!(
                "  Position: {} of {}",
                format_time(record.current_time),
                format_time(record.duration)
            );
            println!("  Progress: {}", progress_text(&record));
            println!("  Remaining: {}", time_remaining(&record));
        }
        None => println!("No resume point; start from the beginning."),
    }
}

fn run_clear(store: &ProgressStore, raw_id: &str) -> Result<()> {
    let id = raw_id
        .parse::<ContentId>()
        .with_context(|| format!("invalid content id `{raw_id}`"))?;
    let existed = store.contains(&id);
    store.clear(&id);
    if existed {
        println!("Cleared progress for {id}.");
    } else {
        println!("No stored progress for {id}.");
    }
    Ok(())
}

fn run_clear_all(store: &ProgressStore) {
    store.clear_all();
    println!("Cleared all stored progress in `{}`.", store.namespace());
}

fn run_embed(store: &ProgressStore, args: &EmbedArgs) -> Result<()> {
    let content = &args.content;
    match (args.kind, content.season) {
        (EmbedKind::Movie, Some(_)) => bail!("movies do not take --season/--episode"),
        (EmbedKind::Tv, None) => bail!("TV shows require --season and --episode"),
        _ => {}
    }
    let target = EmbedTarget::new(content.tmdb_id, content.season, content.episode)?;
    let mut options = EmbedOptions {
        auto_play: !args.no_autoplay,
        start_time: args.start,
        ..EmbedOptions::default()
    };
    if let Some(color) = &args.color {
        options.color = Some(color.clone());
    }

    let url = if args.no_resume {
        embed_url(&target, &options)?
    } else {
        resuming_embed_url(store, &target, options)?
    };
    println!("{url}");
    Ok(())
}
