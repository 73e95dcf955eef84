use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::MediaKind;

/// Stable storage key for a movie (`movie_{id}`) or a single TV episode
/// (`tv_{id}_s{season}e{episode}`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub(crate) struct ContentId(String);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ParsedContentId {
    pub(crate) media_kind: MediaKind,
    pub(crate) external_id: u64,
    pub(crate) season: Option<u32>,
    pub(crate) episode: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub(crate) enum ContentIdError {
    #[error("content id `{0}` has no media kind prefix")]
    MissingKind(String),
    #[error("content id `{0}` has an unknown media kind")]
    UnknownKind(String),
    #[error("content id `{0}` has a non-numeric external id")]
    BadExternalId(String),
    #[error("content id `{0}` does not carry a valid s<N>e<N> segment")]
    BadEpisodeSegment(String),
    #[error("content id `{0}` has unexpected trailing segments")]
    TrailingSegments(String),
}

impl ContentId {
    /// A season and episode both present yield a TV key; anything else is a
    /// movie key.
    pub(crate) fn generate(external_id: u64, season: Option<u32>, episode: Option<u32>) -> Self {
        match (season, episode) {
            (Some(season), Some(episode)) => {
                Self(format!("tv_{external_id}_s{season}e{episode}"))
            }
            _ => Self(format!("movie_{external_id}")),
        }
    }

    pub(crate) fn parse(raw: &str) -> Result<ParsedContentId, ContentIdError> {
        let trimmed = raw.trim();
        let mut parts = trimmed.split('_');
        let kind = parts
            .next()
            .filter(|kind| !kind.is_empty())
            .ok_or_else(|| ContentIdError::MissingKind(trimmed.to_string()))?;
        let media_kind = kind
            .parse::<MediaKind>()
            .map_err(|_| ContentIdError::UnknownKind(trimmed.to_string()))?;
        let external_id = parts
            .next()
            .and_then(|id| id.parse::<u64>().ok())
            .ok_or_else(|| ContentIdError::BadExternalId(trimmed.to_string()))?;

        let (season, episode) = match media_kind {
            MediaKind::Movie => (None, None),
            MediaKind::Tv => {
                let segment = parts
                    .next()
                    .ok_or_else(|| ContentIdError::BadEpisodeSegment(trimmed.to_string()))?;
                let (season, episode) = parse_episode_segment(segment)
                    .ok_or_else(|| ContentIdError::BadEpisodeSegment(trimmed.to_string()))?;
                (Some(season), Some(episode))
            }
        };

        if parts.next().is_some() {
            return Err(ContentIdError::TrailingSegments(trimmed.to_string()));
        }

        Ok(ParsedContentId {
            media_kind,
            external_id,
            season,
            episode,
        })
    }

    pub(crate) fn as_str(&self) -> &str {
        &self.0
    }
}

fn parse_episode_segment(segment: &str) -> Option<(u32, u32)> {
    let rest = segment.strip_prefix('s')?;
    let (season, episode) = rest.split_once('e')?;
    if season.is_empty() || episode.is_empty() {
        return None;
    }
    if !season.bytes().all(|b| b.is_ascii_digit()) || !episode.bytes().all(|b| b.is_ascii_digit())
    {
        return None;
    }
    Some((season.parse().ok()?, episode.parse().ok()?))
}

impl ParsedContentId {
    pub(crate) fn to_content_id(self) -> ContentId {
        ContentId::generate(self.external_id, self.season, self.episode)
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ContentId {
    type Err = ContentIdError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(raw)?.to_content_id())
    }
}

impl TryFrom<String> for ContentId {
    type Error = ContentIdError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        raw.parse()
    }
}

impl From<ContentId> for String {
    fn from(id: ContentId) -> Self {
        id.0
    }
}
