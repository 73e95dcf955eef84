use std::fmt;
use std::io::BufRead;
use std::str::FromStr;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::{ContentId, MediaKind, now_millis};

const PLAYER_EVENT_TYPE: &str = "PLAYER_EVENT";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum PlayerEventKind {
    Play,
    Pause,
    TimeUpdate,
    Ended,
    Seeked,
}

impl PlayerEventKind {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            PlayerEventKind::Play => "play",
            PlayerEventKind::Pause => "pause",
            PlayerEventKind::TimeUpdate => "timeupdate",
            PlayerEventKind::Ended => "ended",
            PlayerEventKind::Seeked => "seeked",
        }
    }
}

impl fmt::Display for PlayerEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlayerEventKind {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "play" => Ok(PlayerEventKind::Play),
            "pause" => Ok(PlayerEventKind::Pause),
            "timeupdate" => Ok(PlayerEventKind::TimeUpdate),
            "ended" => Ok(PlayerEventKind::Ended),
            "seeked" => Ok(PlayerEventKind::Seeked),
            other => Err(format!("unrecognized player event `{other}`")),
        }
    }
}

/// What the player is showing: a movie, or one episode of a show.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MediaRef {
    Movie { tmdb_id: u64 },
    Episode { tmdb_id: u64, season: u32, episode: u32 },
}

impl MediaRef {
    pub(crate) fn tmdb_id(self) -> u64 {
        match self {
            MediaRef::Movie { tmdb_id } | MediaRef::Episode { tmdb_id, .. } => tmdb_id,
        }
    }

    pub(crate) fn kind(self) -> MediaKind {
        match self {
            MediaRef::Movie { .. } => MediaKind::Movie,
            MediaRef::Episode { .. } => MediaKind::Tv,
        }
    }

    pub(crate) fn season_episode(self) -> (Option<u32>, Option<u32>) {
        match self {
            MediaRef::Movie { .. } => (None, None),
            MediaRef::Episode {
                season, episode, ..
            } => (Some(season), Some(episode)),
        }
    }

    pub(crate) fn content_id(self) -> ContentId {
        let (season, episode) = self.season_episode();
        ContentId::generate(self.tmdb_id(), season, episode)
    }
}

/// A validated player event. `progress` is not clamped here.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PlayerEvent {
    pub(crate) kind: PlayerEventKind,
    pub(crate) current_time: f64,
    pub(crate) duration: f64,
    pub(crate) progress: f64,
    pub(crate) media: MediaRef,
    pub(crate) timestamp: i64,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawExternalId {
    Text(String),
    Number(u64),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPlayerEvent {
    event: String,
    current_time: f64,
    duration: f64,
    #[serde(default)]
    progress: Option<f64>,
    id: RawExternalId,
    #[serde(default)]
    media_type: Option<String>,
    #[serde(default)]
    season: Option<u32>,
    #[serde(default)]
    episode: Option<u32>,
    #[serde(default)]
    timestamp: Option<f64>,
}

/// Why an inbound message did not become a [`PlayerEvent`].
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Rejection {
    /// Not JSON at all.
    Unparseable(String),
    /// JSON, but not a player event envelope. Other integrations share the
    /// channel, so this is expected traffic.
    Foreign,
    /// A player event envelope whose payload failed validation.
    Invalid(String),
}

pub(crate) fn decode_message(raw: &str) -> Result<PlayerEvent, Rejection> {
    let message: Value =
        serde_json::from_str(raw).map_err(|err| Rejection::Unparseable(err.to_string()))?;
    if message.get("type").and_then(Value::as_str) != Some(PLAYER_EVENT_TYPE) {
        return Err(Rejection::Foreign);
    }
    let Some(data) = message.get("data").filter(|data| data.is_object()) else {
        return Err(Rejection::Invalid("missing data object".to_string()));
    };
    let payload = RawPlayerEvent::deserialize(data)
        .map_err(|err| Rejection::Invalid(err.to_string()))?;
    validate(payload, now_millis()).map_err(Rejection::Invalid)
}

fn validate(raw: RawPlayerEvent, received_at: i64) -> Result<PlayerEvent, String> {
    let kind = raw.event.parse::<PlayerEventKind>()?;
    if !raw.current_time.is_finite() || raw.current_time < 0.0 {
        return Err(format!("invalid currentTime {}", raw.current_time));
    }
    if !raw.duration.is_finite() || raw.duration <= 0.0 {
        return Err(format!("invalid duration {}", raw.duration));
    }

    let tmdb_id = match raw.id {
        RawExternalId::Number(id) => id,
        RawExternalId::Text(text) => text
            .trim()
            .parse::<u64>()
            .map_err(|_| format!("non-numeric content id `{text}`"))?,
    };

    let declared = raw
        .media_type
        .as_deref()
        .map(str::parse::<MediaKind>)
        .transpose()?;
    let media = match (declared, raw.season, raw.episode) {
        (Some(MediaKind::Tv) | None, Some(season), Some(episode)) => MediaRef::Episode {
            tmdb_id,
            season,
            episode,
        },
        (Some(MediaKind::Movie) | None, None, None) => MediaRef::Movie { tmdb_id },
        (Some(MediaKind::Tv), _, _) => {
            return Err("tv event without both season and episode".to_string());
        }
        (Some(MediaKind::Movie), _, _) => {
            return Err("movie event carrying season/episode".to_string());
        }
        (None, _, _) => return Err("season and episode must be given together".to_string()),
    };

    let progress = match raw.progress {
        Some(progress) if progress.is_finite() => progress,
        Some(progress) => return Err(format!("invalid progress {progress}")),
        None => raw.current_time / raw.duration * 100.0,
    };

    let timestamp = raw
        .timestamp
        .filter(|ts| ts.is_finite())
        .map(|ts| ts as i64)
        .unwrap_or(received_at);

    Ok(PlayerEvent {
        kind,
        current_time: raw.current_time,
        duration: raw.duration,
        progress,
        media,
        timestamp,
    })
}

/// Receives every accepted event before per-kind handlers run.
pub(crate) trait PlayerEventSink {
    fn on_player_event(&mut self, event: &PlayerEvent);
}

type Handler = Box<dyn FnMut(&PlayerEvent)>;

/// Callbacks for one subscription; at most one per event kind.
#[derive(Default)]
pub(crate) struct EventHandlers {
    on_play: Option<Handler>,
    on_pause: Option<Handler>,
    on_time_update: Option<Handler>,
    on_ended: Option<Handler>,
    on_seeked: Option<Handler>,
}

impl EventHandlers {
    pub(crate) fn on_play(mut self, handler: impl FnMut(&PlayerEvent) + 'static) -> Self {
        self.on_play = Some(Box::new(handler));
        self
    }

    pub(crate) fn on_pause(mut self, handler: impl FnMut(&PlayerEvent) + 'static) -> Self {
        self.on_pause = Some(Box::new(handler));
        self
    }

    #[cfg(test)]
    pub(crate) fn on_time_update(mut self, handler: impl FnMut(&PlayerEvent) + 'static) -> Self {
        self.on_time_update = Some(Box::new(handler));
        self
    }

    pub(crate) fn on_ended(mut self, handler: impl FnMut(&PlayerEvent) + 'static) -> Self {
        self.on_ended = Some(Box::new(handler));
        self
    }

    pub(crate) fn on_seeked(mut self, handler: impl FnMut(&PlayerEvent) + 'static) -> Self {
        self.on_seeked = Some(Box::new(handler));
        self
    }

    fn dispatch(&mut self, event: &PlayerEvent) {
        let slot = match event.kind {
            PlayerEventKind::Play => &mut self.on_play,
            PlayerEventKind::Pause => &mut self.on_pause,
            PlayerEventKind::TimeUpdate => &mut self.on_time_update,
            PlayerEventKind::Ended => &mut self.on_ended,
            PlayerEventKind::Seeked => &mut self.on_seeked,
        };
        if let Some(handler) = slot.as_mut() {
            handler(event);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SubscriptionId(u64);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct IngestStats {
    pub(crate) received: usize,
    pub(crate) accepted: usize,
    pub(crate) ignored: usize,
    pub(crate) invalid: usize,
}

/// Turns raw channel messages into [`PlayerEvent`]s, one at a time and in
/// arrival order, and fans them out to the sink and subscribers.
pub(crate) struct PlayerEventIngestor<S> {
    sink: S,
    subscriptions: Vec<(SubscriptionId, EventHandlers)>,
    next_subscription: u64,
    stats: IngestStats,
}

impl<S: PlayerEventSink> PlayerEventIngestor<S> {
    pub(crate) fn new(sink: S) -> Self {
        Self {
            sink,
            subscriptions: Vec::new(),
            next_subscription: 1,
            stats: IngestStats::default(),
        }
    }

    pub(crate) fn subscribe(&mut self, handlers: EventHandlers) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.subscriptions.push((id, handlers));
        id
    }

    pub(crate) fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|(existing, _)| *existing != id);
        self.subscriptions.len() != before
    }

    #[cfg(test)]
    pub(crate) fn sink(&self) -> &S {
        &self.sink
    }

    pub(crate) fn into_sink(self) -> S {
        self.sink
    }

    /// Never fails: anything that is not a valid player event is logged and
    /// dropped.
    pub(crate) fn handle_message(&mut self, raw: &str) -> Option<PlayerEvent> {
        self.stats.received += 1;
        let event = match decode_message(raw) {
            Ok(event) => event,
            Err(Rejection::Unparseable(err)) => {
                self.stats.invalid += 1;
                warn!("failed to parse player message: {err}");
                return None;
            }
            Err(Rejection::Foreign) => {
                self.stats.ignored += 1;
                debug!("ignoring non-player message");
                return None;
            }
            Err(Rejection::Invalid(reason)) => {
                self.stats.invalid += 1;
                warn!("invalid player event data: {reason}");
                return None;
            }
        };

        self.stats.accepted += 1;
        self.sink.on_player_event(&event);
        for (_, handlers) in &mut self.subscriptions {
            handlers.dispatch(&event);
        }
        Some(event)
    }

    /// Reads one message per line until the reader is exhausted. Lines that
    /// are not UTF-8 count as invalid; only read errors end the loop.
    pub(crate) fn pump<R: BufRead>(&mut self, reader: R) -> std::io::Result<IngestStats> {
        for bytes in reader.split(b'\n') {
            let mut bytes = bytes?;
            if bytes.last() == Some(&b'\r') {
                bytes.pop();
            }
            let line = match String::from_utf8(bytes) {
                Ok(line) => line,
                Err(err) => {
                    self.stats.received += 1;
                    self.stats.invalid += 1;
                    warn!("dropping player message that is not UTF-8: {err}");
                    continue;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            self.handle_message(&line);
        }
        Ok(self.stats)
    }
}
