mod content_id;
mod ingest;
mod query;
mod store;
mod tracker;

pub(crate) use content_id::*;
pub(crate) use ingest::*;
pub(crate) use query::*;
pub(crate) use store::*;
pub(crate) use tracker::*;

use std::fmt;
use std::str::FromStr;

use chrono::Utc;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum MediaKind {
    Movie,
    Tv,
}

impl MediaKind {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            MediaKind::Movie => "movie",
            MediaKind::Tv => "tv",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaKind {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim() {
            "movie" => Ok(MediaKind::Movie),
            "tv" => Ok(MediaKind::Tv),
            other => Err(format!("unknown media kind `{other}`")),
        }
    }
}

/// Last known playback state for one movie or one TV episode.
///
/// Field names on the wire match the JSON the embedded player integration
/// has always written, so existing stored entries stay readable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ProgressRecord {
    pub(crate) id: ContentId,
    pub(crate) media_type: MediaKind,
    pub(crate) tmdb_id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) season: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) episode: Option<u32>,
    pub(crate) current_time: f64,
    pub(crate) duration: f64,
    pub(crate) progress: f64,
    pub(crate) last_watched: i64,
    pub(crate) completed: bool,
}

pub(crate) fn clamp_percent(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 100.0)
}

pub(crate) fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

#[cfg(test)]
pub(crate) fn sample_record(
    tmdb_id: u64,
    episode: Option<(u32, u32)>,
    progress: f64,
    last_watched: i64,
) -> ProgressRecord {
    let (season, ep) = match episode {
        Some((season, ep)) => (Some(season), Some(ep)),
        None => (None, None),
    };
    let duration = 3600.0;
    ProgressRecord {
        id: ContentId::generate(tmdb_id, season, ep),
        media_type: if episode.is_some() {
            MediaKind::Tv
        } else {
            MediaKind::Movie
        },
        tmdb_id,
        title: None,
        season,
        episode: ep,
        current_time: duration * progress / 100.0,
        duration,
        progress,
        last_watched,
        completed: false,
    }
}
