use std::sync::mpsc::{self, Sender};
use std::thread::{self, JoinHandle};

use thiserror::Error;
use tracing::{debug, info, warn};

use super::{
    PlayerEvent, PlayerEventKind, PlayerEventSink, ProgressRecord, ProgressStore, clamp_percent,
    now_millis,
};

pub(crate) const DEFAULT_SAVE_INTERVAL_SECS: u64 = 10;
pub(crate) const DEFAULT_COMPLETION_THRESHOLD: f64 = 90.0;

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct TrackerConfig {
    pub(crate) save_interval_secs: u64,
    pub(crate) completion_threshold: f64,
    pub(crate) enable_local_storage: bool,
    pub(crate) enable_console_logging: bool,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            save_interval_secs: DEFAULT_SAVE_INTERVAL_SECS,
            completion_threshold: DEFAULT_COMPLETION_THRESHOLD,
            enable_local_storage: true,
            enable_console_logging: true,
        }
    }
}

impl TrackerConfig {
    fn interval(&self) -> u64 {
        self.save_interval_secs.max(1)
    }
}

#[derive(Debug, Error)]
pub(crate) enum RemoteSaveError {
    #[error("HTTP status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Optional extra destination for every locally persisted record.
pub(crate) trait RemoteSave: Send + 'static {
    fn save(&self, record: &ProgressRecord) -> Result<(), RemoteSaveError>;
}

/// Best-effort delivery of records to a [`RemoteSave`] on a worker thread.
/// The caller never waits for a delivery; failures are only logged.
pub(crate) struct SaveSideChannel {
    sender: Option<Sender<ProgressRecord>>,
    worker: Option<JoinHandle<usize>>,
}

impl SaveSideChannel {
    pub(crate) fn spawn(remote: impl RemoteSave) -> Self {
        let (sender, receiver) = mpsc::channel::<ProgressRecord>();
        let worker = thread::spawn(move || {
            let mut failures = 0;
            for record in receiver {
                match remote.save(&record) {
                    Ok(()) => debug!(content_id = %record.id, "progress sent to remote"),
                    Err(err) => {
                        failures += 1;
                        warn!(content_id = %record.id, "remote progress save failed: {err}");
                    }
                }
            }
            failures
        });
        Self {
            sender: Some(sender),
            worker: Some(worker),
        }
    }

    fn submit(&self, record: ProgressRecord) {
        let Some(sender) = &self.sender else {
            return;
        };
        if sender.send(record).is_err() {
            warn!("remote progress worker is gone; dropping update");
        }
    }

    /// Closes the channel and waits for queued deliveries. Returns the number
    /// of failed deliveries.
    pub(crate) fn shutdown(mut self) -> usize {
        self.finish()
    }

    fn finish(&mut self) -> usize {
        self.sender.take();
        match self.worker.take().map(JoinHandle::join) {
            Some(Ok(failures)) => failures,
            Some(Err(_)) => {
                warn!("remote progress worker panicked");
                0
            }
            None => 0,
        }
    }
}

impl Drop for SaveSideChannel {
    fn drop(&mut self) {
        self.finish();
    }
}

/// Applies the save policy to player events and persists the results.
pub(crate) struct ProgressTracker<'a> {
    store: &'a ProgressStore,
    config: TrackerConfig,
    title: Option<String>,
    remote: Option<SaveSideChannel>,
}

impl<'a> ProgressTracker<'a> {
    pub(crate) fn new(store: &'a ProgressStore, config: TrackerConfig) -> Self {
        Self {
            store,
            config,
            title: None,
            remote: None,
        }
    }

    pub(crate) fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub(crate) fn with_remote(mut self, remote: SaveSideChannel) -> Self {
        self.remote = Some(remote);
        self
    }

    pub(crate) fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Returns the remote channel so the caller can drain it.
    pub(crate) fn finish(mut self) -> Option<SaveSideChannel> {
        self.remote.take()
    }

    /// Returns the record that was persisted, if the policy called for one.
    pub(crate) fn handle_event(&mut self, event: &PlayerEvent) -> Option<ProgressRecord> {
        self.log_event(event);
        let record = match event.kind {
            PlayerEventKind::TimeUpdate => {
                let second = event.current_time.floor() as u64;
                if event.current_time > 0.0 && second % self.config.interval() == 0 {
                    Some(self.to_record(event))
                } else {
                    None
                }
            }
            PlayerEventKind::Pause => {
                (event.current_time > 0.0).then(|| self.to_record(event))
            }
            PlayerEventKind::Ended => {
                let mut record = self.to_record(event);
                record.completed = true;
                record.progress = 100.0;
                record.current_time = event.duration;
                Some(record)
            }
            PlayerEventKind::Play | PlayerEventKind::Seeked => None,
        }?;

        self.persist(&record);
        Some(record)
    }

    pub(crate) fn to_record(&self, event: &PlayerEvent) -> ProgressRecord {
        let (season, episode) = event.media.season_episode();
        let progress = clamp_percent(event.progress);
        ProgressRecord {
            id: event.media.content_id(),
            media_type: event.media.kind(),
            tmdb_id: event.media.tmdb_id(),
            title: self.title.clone(),
            season,
            episode,
            current_time: event.current_time,
            duration: event.duration,
            progress,
            last_watched: now_millis(),
            completed: progress >= self.config.completion_threshold,
        }
    }

    fn persist(&self, record: &ProgressRecord) {
        if self.config.enable_local_storage {
            self.store.save(record);
        }
        if let Some(remote) = &self.remote {
            remote.submit(record.clone());
        }
        if self.config.enable_console_logging {
            info!(
                content_id = %record.id,
                progress = %format!("{:.1}%", record.progress),
                time = %format!("{}s", record.current_time.floor()),
                completed = record.completed,
                "progress saved"
            );
        }
    }

    fn log_event(&self, event: &PlayerEvent) {
        if !self.config.enable_console_logging {
            return;
        }
        let content_id = event.media.content_id();
        match event.kind {
            PlayerEventKind::TimeUpdate => debug!(
                content_id = %content_id,
                time = %format!("{}s", event.current_time.floor()),
                "time update"
            ),
            PlayerEventKind::Seeked => info!(
                content_id = %content_id,
                time = %format!("{}s", event.current_time.floor()),
                progress = %format!("{:.1}%", event.progress),
                "user seeked"
            ),
            kind => info!(
                content_id = %content_id,
                time = %format!("{}s", event.current_time.floor()),
                "player {kind}"
            ),
        }
    }
}

impl PlayerEventSink for ProgressTracker<'_> {
    fn on_player_event(&mut self, event: &PlayerEvent) {
        self.handle_event(event);
    }
}
