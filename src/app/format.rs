use chrono::{Local, TimeZone};

use crate::progress::{MediaKind, ProgressRecord, RESUME_FLOOR_PERCENT};

pub(crate) fn format_time(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds.floor() as u64
    } else {
        0
    };
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let secs = total % 60;
    if hours > 0 {
        format!("{hours}:{minutes:02}:{secs:02}")
    } else {
        format!("{minutes}:{secs:02}")
    }
}

pub(crate) fn progress_text(record: &ProgressRecord) -> String {
    if record.completed {
        return "Completed".to_string();
    }
    if record.progress < RESUME_FLOOR_PERCENT {
        return "Just started".to_string();
    }
    format!("{:.0}% watched", record.progress)
}

pub(crate) fn time_remaining(record: &ProgressRecord) -> String {
    format_time(record.duration - record.current_time)
}

pub(crate) fn display_title(record: &ProgressRecord) -> String {
    let base = record
        .title
        .clone()
        .unwrap_or_else(|| match record.media_type {
            MediaKind::Movie => format!("Movie {}", record.tmdb_id),
            MediaKind::Tv => format!("Show {}", record.tmdb_id),
        });
    match (record.season, record.episode) {
        (Some(season), Some(episode)) => format!("{base} - S{season}E{episode}"),
        _ => base,
    }
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    let mut out = s.to_string();
    if out.chars().count() > max {
        out = out.chars().take(max.saturating_sub(3)).collect::<String>() + "...";
    }
    out
}

pub(crate) fn format_last_watched(millis: i64) -> String {
    Local
        .timestamp_millis_opt(millis)
        .single()
        .map(|dt| dt.format("%Y-%m-%d %H:%M %:z").to_string())
        .unwrap_or_else(|| millis.to_string())
}
