//! Karma-change digests.
//!
//! Aggregates the votes other users cast on a user's content into a
//! per-document digest, over a window derived from the user's notification
//! schedule. Windows close at a fixed GMT hour (and weekday, for weekly
//! digests); if the user has not opened their digest since before the
//! previous boundary, the window stretches back to when they last did.
use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use voting_repository::{DocumentsRepository, UsersRepository, VotesRepository};
use voting_shared::types::{
    Collection, CommentKarmaChange, DateRange, DocumentId, KarmaChangeReport,
    KarmaChangeSettings, PostKarmaChange, UpdateFrequency, UserId, UserRecord,
};

use crate::config::EngineConfig;
use crate::errors::KarmaChangeError;

fn boundary_on(date: NaiveDate, hour: u8) -> DateTime<Utc> {
    let time = NaiveTime::from_hms_opt(u32::from(hour) % 24, 0, 0).unwrap_or(NaiveTime::MIN);
    NaiveDateTime::new(date, time).and_utc()
}

/// The most recent digest boundary at or before `now`.
fn last_boundary(settings: &KarmaChangeSettings, now: DateTime<Utc>) -> DateTime<Utc> {
    let mut end = boundary_on(now.date_naive(), settings.time_of_day_gmt);
    if end > now {
        end -= Duration::days(1);
    }
    if settings.update_frequency == UpdateFrequency::Weekly {
        let days_back = (end.weekday().num_days_from_sunday() + 7
            - settings.day_of_week_gmt.num_days_from_sunday())
            % 7;
        end -= Duration::days(i64::from(days_back));
    }
    end
}

/// The digest window for a user with `settings` who last opened their digest
/// at `last_opened`, evaluated at `now`. `None` when digests are disabled.
///
/// For scheduled digests the window normally covers the last full cycle; a
/// user who has not opened theirs for longer gets everything since they
/// last did, so no changes are skipped.
pub fn karma_change_date_range(
    settings: &KarmaChangeSettings,
    now: DateTime<Utc>,
    last_opened: Option<DateTime<Utc>>,
) -> Option<DateRange> {
    match settings.update_frequency {
        UpdateFrequency::Disabled => None,
        UpdateFrequency::Realtime => Some(DateRange {
            start: last_opened.unwrap_or(now - Duration::hours(24)),
            end: now,
        }),
        UpdateFrequency::Daily | UpdateFrequency::Weekly => {
            let cycle = if settings.update_frequency == UpdateFrequency::Daily {
                Duration::days(1)
            } else {
                Duration::weeks(1)
            };
            let end = last_boundary(settings, now);
            let default_start = end - cycle;
            let start = match last_opened {
                Some(last_opened) => default_start.min(last_opened),
                None => default_start,
            };
            Some(DateRange { start, end })
        }
    }
}

/// When the next digest window closes, for scheduling the notification
/// batch. `None` for realtime and disabled schedules.
pub fn next_batch_date(
    settings: &KarmaChangeSettings,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    match settings.update_frequency {
        UpdateFrequency::Disabled | UpdateFrequency::Realtime => None,
        UpdateFrequency::Daily => Some(last_boundary(settings, now) + Duration::days(1)),
        UpdateFrequency::Weekly => Some(last_boundary(settings, now) + Duration::weeks(1)),
    }
}

/// Assembles karma-change digests from the vote ledger.
pub struct KarmaChangeNotifier {
    votes: Arc<dyn VotesRepository>,
    documents: Arc<dyn DocumentsRepository>,
    users: Arc<dyn UsersRepository>,
    config: EngineConfig,
}

impl KarmaChangeNotifier {
    pub fn new(
        votes: Arc<dyn VotesRepository>,
        documents: Arc<dyn DocumentsRepository>,
        users: Arc<dyn UsersRepository>,
        config: EngineConfig,
    ) -> Self {
        Self {
            votes,
            documents,
            users,
            config,
        }
    }

    /// The digest for `user` over their current window, or `None` when
    /// digests are disabled for them.
    pub async fn get_karma_changes_for_user(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Option<KarmaChangeReport>, KarmaChangeError> {
        let user = self
            .users
            .get(user_id)
            .await?
            .ok_or(KarmaChangeError::UserNotFound(user_id))?;
        let range = karma_change_date_range(
            &user.karma_change_settings,
            now,
            user.karma_changes_last_opened,
        );
        match range {
            Some(range) => Ok(Some(self.get_karma_changes(&user, range.start, range.end).await?)),
            None => Ok(None),
        }
    }

    /// Aggregates karma changes on `user`'s content over `[start, end)`.
    ///
    /// One row per document, net of retractions within the window. Documents
    /// whose net change is zero or negative are omitted unless the user
    /// opted into seeing negative changes; either way zero-change rows never
    /// appear. Tag revisions are karma-neutral and never appear.
    pub async fn get_karma_changes(
        &self,
        user: &UserRecord,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<KarmaChangeReport, KarmaChangeError> {
        if start > end {
            return Err(KarmaChangeError::Validation(format!(
                "window starts at {start} but ends at {end}"
            )));
        }

        let votes = self
            .votes
            .votes_on_authored_content(user.id, start, end)
            .await?;

        let mut changes: HashMap<(Collection, DocumentId), i64> = HashMap::new();
        for vote in votes {
            if vote.silence_notification || !vote.collection.karma_bearing() {
                continue;
            }
            *changes.entry((vote.collection, vote.document_id)).or_insert(0) += vote.power;
        }

        let show_negative = user.karma_change_settings.show_negative;
        let mut total_change = 0;
        let mut posts = Vec::new();
        let mut comments = Vec::new();
        for ((collection, document_id), score_change) in changes {
            let visible = if show_negative {
                score_change != 0
            } else {
                score_change > 0
            };
            if !visible {
                continue;
            }
            let Some(document) = self.documents.get(collection, document_id).await? else {
                continue;
            };
            total_change += score_change;
            match collection {
                Collection::Posts => posts.push(PostKarmaChange {
                    post_id: document_id,
                    score_change,
                    title: document.title.unwrap_or_default(),
                    slug: document.slug.unwrap_or_default(),
                    added_reacts: Vec::new(),
                }),
                Collection::Comments => comments.push(CommentKarmaChange {
                    comment_id: document_id,
                    score_change,
                    post_id: document.post_id,
                    post_title: document.post_title,
                    post_slug: document.post_slug,
                    description: self.excerpt(document.body.as_deref()),
                    added_reacts: Vec::new(),
                }),
                Collection::TagRevisions => {}
            }
        }

        posts.sort_by(|a, b| {
            b.score_change
                .cmp(&a.score_change)
                .then(a.post_id.cmp(&b.post_id))
        });
        comments.sort_by(|a, b| {
            b.score_change
                .cmp(&a.score_change)
                .then(a.comment_id.cmp(&b.comment_id))
        });

        Ok(KarmaChangeReport {
            total_change,
            start_date: start,
            end_date: end,
            posts,
            comments,
        })
    }

    /// Records that the user opened their digest, resetting the stretch-back
    /// point for future windows.
    pub async fn mark_opened(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<(), KarmaChangeError> {
        let mut user = self
            .users
            .get(user_id)
            .await?
            .ok_or(KarmaChangeError::UserNotFound(user_id))?;
        user.karma_changes_last_opened = Some(now);
        self.users.upsert(user).await?;
        Ok(())
    }

    fn excerpt(&self, body: Option<&str>) -> String {
        match body {
            Some(body) => body
                .chars()
                .take(self.config.comment_description_length)
                .collect(),
            None => String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Weekday};

    use super::*;

    fn daily_at(hour: u8) -> KarmaChangeSettings {
        KarmaChangeSettings {
            update_frequency: UpdateFrequency::Daily,
            time_of_day_gmt: hour,
            ..KarmaChangeSettings::default()
        }
    }

    fn weekly_at(day: Weekday, hour: u8) -> KarmaChangeSettings {
        KarmaChangeSettings {
            update_frequency: UpdateFrequency::Weekly,
            time_of_day_gmt: hour,
            day_of_week_gmt: day,
            ..KarmaChangeSettings::default()
        }
    }

    fn utc(y: i32, mo: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, 0, 0).unwrap()
    }

    #[test]
    fn daily_window_covers_the_last_full_cycle() {
        let range = karma_change_date_range(
            &daily_at(5),
            utc(1980, 3, 3, 8),
            Some(utc(1980, 3, 3, 6)),
        )
        .unwrap();
        assert_eq!(range.start, utc(1980, 3, 2, 5));
        assert_eq!(range.end, utc(1980, 3, 3, 5));
    }

    #[test]
    fn daily_window_stretches_back_to_a_stale_last_opened() {
        let range = karma_change_date_range(
            &daily_at(5),
            utc(1980, 3, 3, 8),
            Some(utc(1980, 2, 2, 8)),
        )
        .unwrap();
        assert_eq!(range.start, utc(1980, 2, 2, 8));
        assert_eq!(range.end, utc(1980, 3, 3, 5));
    }

    #[test]
    fn daily_window_before_todays_boundary_ends_yesterday() {
        let range = karma_change_date_range(
            &daily_at(5),
            utc(1980, 3, 3, 3),
            Some(utc(1980, 3, 3, 2)),
        )
        .unwrap();
        assert_eq!(range.start, utc(1980, 3, 1, 5));
        assert_eq!(range.end, utc(1980, 3, 2, 5));
    }

    #[test]
    fn weekly_window_on_the_boundary_day() {
        // 1980-05-03 is a Saturday.
        let range = karma_change_date_range(
            &weekly_at(Weekday::Sat, 5),
            utc(1980, 5, 3, 8),
            None,
        )
        .unwrap();
        assert_eq!(range.start, utc(1980, 4, 26, 5));
        assert_eq!(range.end, utc(1980, 5, 3, 5));
    }

    #[test]
    fn weekly_window_mid_week_walks_back_to_the_boundary() {
        // 1980-05-07 is a Wednesday.
        let range = karma_change_date_range(
            &weekly_at(Weekday::Sat, 5),
            utc(1980, 5, 7, 8),
            None,
        )
        .unwrap();
        assert_eq!(range.start, utc(1980, 4, 26, 5));
        assert_eq!(range.end, utc(1980, 5, 3, 5));
    }

    #[test]
    fn realtime_window_runs_from_last_opened_to_now() {
        let settings = KarmaChangeSettings {
            update_frequency: UpdateFrequency::Realtime,
            ..KarmaChangeSettings::default()
        };
        let now = utc(1980, 3, 3, 8);

        let opened = karma_change_date_range(&settings, now, Some(utc(1980, 3, 1, 12))).unwrap();
        assert_eq!(opened.start, utc(1980, 3, 1, 12));
        assert_eq!(opened.end, now);

        let never_opened = karma_change_date_range(&settings, now, None).unwrap();
        assert_eq!(never_opened.start, now - Duration::hours(24));
        assert_eq!(never_opened.end, now);
    }

    #[test]
    fn disabled_schedule_has_no_window() {
        let settings = KarmaChangeSettings {
            update_frequency: UpdateFrequency::Disabled,
            ..KarmaChangeSettings::default()
        };
        assert!(karma_change_date_range(&settings, utc(1980, 3, 3, 8), None).is_none());
    }

    #[test]
    fn next_batch_is_one_cycle_after_the_last_boundary() {
        assert_eq!(
            next_batch_date(&daily_at(5), utc(1980, 3, 3, 8)),
            Some(utc(1980, 3, 4, 5))
        );
        assert_eq!(
            next_batch_date(&weekly_at(Weekday::Sat, 5), utc(1980, 5, 7, 8)),
            Some(utc(1980, 5, 10, 5))
        );
        let realtime = KarmaChangeSettings {
            update_frequency: UpdateFrequency::Realtime,
            ..KarmaChangeSettings::default()
        };
        assert_eq!(next_batch_date(&realtime, utc(1980, 3, 3, 8)), None);
    }
}
