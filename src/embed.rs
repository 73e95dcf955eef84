use anyhow::{Result, bail};
use url::Url;

use crate::progress::{ContentId, ProgressRecord, ProgressStore};

const EMBED_BASE: &str = "https://www.vidking.net/embed";
const DEFAULT_COLOR: &str = "e50914";

/// Positions at or below this many seconds are not worth resuming from.
const MIN_RESUME_SECONDS: f64 = 30.0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum EmbedTarget {
    Movie {
        tmdb_id: u64,
    },
    Episode {
        tmdb_id: u64,
        season: u32,
        episode: u32,
    },
}

impl EmbedTarget {
    pub(crate) fn new(tmdb_id: u64, season: Option<u32>, episode: Option<u32>) -> Result<Self> {
        match (season, episode) {
            (None, None) => Ok(EmbedTarget::Movie { tmdb_id }),
            (Some(season), Some(episode)) => Ok(EmbedTarget::Episode {
                tmdb_id,
                season,
                episode,
            }),
            _ => bail!("TV shows require both season and episode numbers"),
        }
    }

    fn season_episode(&self) -> (Option<u32>, Option<u32>) {
        match self {
            EmbedTarget::Movie { .. } => (None, None),
            EmbedTarget::Episode {
                season, episode, ..
            } => (Some(*season), Some(*episode)),
        }
    }

    fn tmdb_id(&self) -> u64 {
        match self {
            EmbedTarget::Movie { tmdb_id } | EmbedTarget::Episode { tmdb_id, .. } => *tmdb_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct EmbedOptions {
    pub(crate) color: Option<String>,
    pub(crate) auto_play: bool,
    pub(crate) next_episode: bool,
    pub(crate) episode_selector: bool,
    pub(crate) start_time: Option<f64>,
}

impl Default for EmbedOptions {
    fn default() -> Self {
        Self {
            color: Some(DEFAULT_COLOR.to_string()),
            auto_play: true,
            next_episode: true,
            episode_selector: true,
            start_time: None,
        }
    }
}

pub(crate) fn embed_url(target: &EmbedTarget, options: &EmbedOptions) -> Result<Url> {
    let mut url = Url::parse(EMBED_BASE)?;
    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|_| anyhow::anyhow!("embed base cannot carry a path"))?;
        match target {
            EmbedTarget::Movie { tmdb_id } => {
                segments.push("movie").push(&tmdb_id.to_string());
            }
            EmbedTarget::Episode {
                tmdb_id,
                season,
                episode,
            } => {
                segments
                    .push("tv")
                    .push(&tmdb_id.to_string())
                    .push(&season.to_string())
                    .push(&episode.to_string());
            }
        }
    }

    let is_tv = matches!(target, EmbedTarget::Episode { .. });
    let mut params = Vec::new();
    if let Some(color) = options.color.as_deref().map(|c| c.trim_start_matches('#'))
        && !color.is_empty()
    {
        params.push(("color", color.to_string()));
    }
    if options.auto_play {
        params.push(("autoPlay", "true".to_string()));
    }
    if is_tv && options.next_episode {
        params.push(("nextEpisode", "true".to_string()));
    }
    if is_tv && options.episode_selector {
        params.push(("episodeSelector", "true".to_string()));
    }
    if let Some(start) = options.start_time.filter(|start| *start > 0.0) {
        params.push(("progress", format!("{}", start.floor() as u64)));
    }

    if !params.is_empty() {
        url.query_pairs_mut().extend_pairs(params);
    }
    Ok(url)
}

/// Start position for the player when stored progress is worth resuming.
pub(crate) fn resume_start_time(record: Option<&ProgressRecord>) -> Option<f64> {
    record
        .filter(|record| !record.completed && record.current_time > MIN_RESUME_SECONDS)
        .map(|record| record.current_time)
}

/// Builds the embed URL, resuming from stored progress when there is some.
pub(crate) fn resuming_embed_url(
    store: &ProgressStore,
    target: &EmbedTarget,
    mut options: EmbedOptions,
) -> Result<Url> {
    if options.start_time.is_none() {
        let (season, episode) = target.season_episode();
        let id = ContentId::generate(target.tmdb_id(), season, episode);
        options.start_time = resume_start_time(store.load(&id).as_ref());
    }
    embed_url(target, &options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::memory::MemoryStorage;
    use crate::progress::{DEFAULT_NAMESPACE, sample_record};

    fn bare() -> EmbedOptions {
        EmbedOptions {
            color: None,
            auto_play: false,
            next_episode: false,
            episode_selector: false,
            start_time: None,
        }
    }

    #[test]
    fn movie_url_without_options_has_no_query() {
        let url = embed_url(&EmbedTarget::Movie { tmdb_id: 1078605 }, &bare()).expect("url");
        assert_eq!(url.as_str(), "https://www.vidking.net/embed/movie/1078605");
    }

    #[test]
    fn tv_url_carries_all_features() {
        let target = EmbedTarget::new(119051, Some(1), Some(8)).expect("target");
        let url = embed_url(
            &target,
            &EmbedOptions {
                color: Some("#e50914".to_string()),
                ..EmbedOptions::default()
            },
        )
        .expect("url");
        assert_eq!(
            url.as_str(),
            "https://www.vidking.net/embed/tv/119051/1/8?color=e50914&autoPlay=true&nextEpisode=true&episodeSelector=true"
        );
    }

    #[test]
    fn episode_flags_are_ignored_for_movies() {
        let options = EmbedOptions {
            color: Some("9146ff".to_string()),
            start_time: Some(120.7),
            ..EmbedOptions::default()
        };
        let url = embed_url(&EmbedTarget::Movie { tmdb_id: 1078605 }, &options).expect("url");
        assert_eq!(
            url.as_str(),
            "https://www.vidking.net/embed/movie/1078605?color=9146ff&autoPlay=true&progress=120"
        );
    }

    #[test]
    fn tv_target_requires_season_and_episode() {
        assert!(EmbedTarget::new(1, Some(1), None).is_err());
        assert!(EmbedTarget::new(1, None, Some(1)).is_err());
    }

    #[test]
    fn resume_only_past_thirty_seconds_and_incomplete() {
        let mut record = sample_record(1, None, 50.0, 1);
        assert_eq!(resume_start_time(Some(&record)), Some(1800.0));

        record.current_time = 30.0;
        assert_eq!(resume_start_time(Some(&record)), None);

        record.current_time = 500.0;
        record.completed = true;
        assert_eq!(resume_start_time(Some(&record)), None);
        assert_eq!(resume_start_time(None), None);
    }

    #[test]
    fn resuming_url_uses_stored_position() {
        let store = ProgressStore::new(Box::new(MemoryStorage::default()), DEFAULT_NAMESPACE);
        store.save(&sample_record(42, Some((2, 3)), 25.0, 1));

        let target = EmbedTarget::new(42, Some(2), Some(3)).expect("target");
        let url = resuming_embed_url(&store, &target, bare()).expect("url");

        assert_eq!(
            url.as_str(),
            "https://www.vidking.net/embed/tv/42/2/3?progress=900"
        );
    }
}
