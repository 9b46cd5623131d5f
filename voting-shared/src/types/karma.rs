use chrono::{DateTime, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::types::DocumentId;

/// How often a user's karma-change digest is assembled.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum UpdateFrequency {
    Disabled,
    Daily,
    Weekly,
    Realtime,
}

/// Per-user digest schedule settings.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct KarmaChangeSettings {
    pub update_frequency: UpdateFrequency,
    /// Hour of the day (GMT, 0..=23) at which a digest window closes.
    pub time_of_day_gmt: u8,
    /// For weekly digests, the weekday (GMT) on which the window closes.
    pub day_of_week_gmt: Weekday,
    /// Whether strictly-negative per-document changes appear in the digest.
    pub show_negative: bool,
}

impl Default for KarmaChangeSettings {
    fn default() -> Self {
        Self {
            update_frequency: UpdateFrequency::Daily,
            time_of_day_gmt: 3,
            day_of_week_gmt: Weekday::Sat,
            show_negative: false,
        }
    }
}

/// A half-open digest window `[start, end)`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Net karma change on a single post within a digest window.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PostKarmaChange {
    pub post_id: DocumentId,
    pub score_change: i64,
    pub title: String,
    pub slug: String,
    /// Reactions received in the window; empty unless a reactions feature is
    /// layered on top of the engine.
    pub added_reacts: Vec<String>,
}

/// Net karma change on a single comment within a digest window.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CommentKarmaChange {
    pub comment_id: DocumentId,
    pub score_change: i64,
    pub post_id: Option<DocumentId>,
    pub post_title: Option<String>,
    pub post_slug: Option<String>,
    /// Plain-text excerpt of the comment body.
    pub description: String,
    pub added_reacts: Vec<String>,
}

/// A user's aggregated karma changes for one digest window, one row per
/// distinct document.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct KarmaChangeReport {
    pub total_change: i64,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub posts: Vec<PostKarmaChange>,
    pub comments: Vec<CommentKarmaChange>,
}
