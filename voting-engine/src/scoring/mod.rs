//! Score and vote-power computation.
//!
//! The ranking score divides a document's effective score (base score plus
//! promotion bonuses) by a power of its age in hours, so fresh content
//! outranks old content at equal karma. Vote power maps a voter's karma to
//! the weight of their vote; established users cast heavier votes.
use chrono::{DateTime, Utc};
use voting_shared::types::{VoteKind, VoteableDocument};

use crate::config::ScoreParams;

/// Exponent of the age term in the ranking score.
pub const TIME_DECAY_FACTOR: f64 = 1.15;
/// Hours added to the age before decay is applied.
pub const SCORE_BIAS: f64 = 2.0;
/// Score bonus for frontpage promotion.
pub const FRONTPAGE_BONUS: i64 = 10;
/// Score bonus for curation, on top of the frontpage bonus.
pub const CURATED_BONUS: i64 = 10;

/// Karma thresholds for the strong-vote ladder, paired with the power a
/// voter at or above each threshold wields.
const BIG_VOTE_LADDER: &[(i64, i64)] = &[
    (1, 2),
    (10, 3),
    (100, 4),
    (250, 5),
    (1_000, 6),
    (2_500, 7),
    (5_000, 8),
    (10_000, 9),
    (25_000, 10),
    (50_000, 11),
    (75_000, 12),
    (100_000, 13),
    (175_000, 14),
    (250_000, 15),
    (500_000, 16),
];

/// Unsigned power of a small vote for a voter with the given karma.
fn small_vote_power(karma: i64) -> i64 {
    if karma >= 25_000 {
        3
    } else if karma >= 1_000 {
        2
    } else {
        1
    }
}

/// Unsigned power of a big vote for a voter with the given karma.
fn big_vote_power(karma: i64) -> i64 {
    let mut power = 1;
    for (threshold, ladder_power) in BIG_VOTE_LADDER {
        if karma >= *threshold {
            power = *ladder_power;
        }
    }
    power
}

/// Signed power a voter with `karma` contributes when casting `kind`.
///
/// Neutral votes carry no power: they exist so a voter can cast
/// extended-axis selections without moving the primary axis.
pub fn vote_power(karma: i64, kind: VoteKind) -> i64 {
    let magnitude = match kind {
        VoteKind::Neutral => 0,
        VoteKind::SmallUpvote | VoteKind::SmallDownvote => small_vote_power(karma),
        VoteKind::BigUpvote | VoteKind::BigDownvote => big_vote_power(karma),
    };
    kind.sign() * magnitude
}

fn round_to_micro(value: f64) -> f64 {
    (value * 1_000_000.0).round() / 1_000_000.0
}

/// Recomputes the time-decayed ranking score of `document` as of `now`.
///
/// `score = (base_score + bonuses) / (age_hours + bias) ^ decay`, rounded
/// to six decimal places so repeated recomputation of an unchanged document
/// is a stable no-op.
pub fn recalculate_score_at(
    document: &VoteableDocument,
    params: &ScoreParams,
    now: DateTime<Utc>,
) -> f64 {
    let age_hours = (now - document.posted_at).num_milliseconds() as f64 / 3_600_000.0;
    let age_hours = age_hours.max(0.0);

    let mut effective = document.base_score as f64;
    if document.frontpage_date.is_some() {
        effective += params.frontpage_bonus as f64;
    }
    if document.curated_date.is_some() {
        effective += params.curated_bonus as f64;
    }

    round_to_micro(effective / (age_hours + params.score_bias).powf(params.time_decay_factor))
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};
    use uuid::Uuid;
    use voting_shared::types::Collection;

    use super::*;

    fn document_posted_at(posted_at: DateTime<Utc>, base_score: i64) -> VoteableDocument {
        let mut document =
            VoteableDocument::new(Uuid::new_v4(), Collection::Posts, Uuid::new_v4(), posted_at);
        document.base_score = base_score;
        document
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn small_vote_power_follows_karma_tiers() {
        assert_eq!(vote_power(0, VoteKind::SmallUpvote), 1);
        assert_eq!(vote_power(999, VoteKind::SmallUpvote), 1);
        assert_eq!(vote_power(1_000, VoteKind::SmallUpvote), 2);
        assert_eq!(vote_power(25_000, VoteKind::SmallUpvote), 3);
        assert_eq!(vote_power(25_000, VoteKind::SmallDownvote), -3);
    }

    #[test]
    fn big_vote_power_follows_the_ladder() {
        assert_eq!(vote_power(0, VoteKind::BigUpvote), 1);
        assert_eq!(vote_power(1, VoteKind::BigUpvote), 2);
        assert_eq!(vote_power(9, VoteKind::BigUpvote), 2);
        assert_eq!(vote_power(10, VoteKind::BigUpvote), 3);
        assert_eq!(vote_power(100, VoteKind::BigUpvote), 4);
        assert_eq!(vote_power(250, VoteKind::BigUpvote), 5);
        assert_eq!(vote_power(1_000, VoteKind::BigUpvote), 6);
        assert_eq!(vote_power(499_999, VoteKind::BigDownvote), -15);
        assert_eq!(vote_power(500_000, VoteKind::BigUpvote), 16);
    }

    #[test]
    fn neutral_votes_carry_no_power() {
        assert_eq!(vote_power(500_000, VoteKind::Neutral), 0);
    }

    #[test]
    fn score_decays_with_age() {
        let params = ScoreParams::default();
        let young = document_posted_at(now() - Duration::hours(1), 10);
        let old = document_posted_at(now() - Duration::hours(48), 10);
        let young_score = recalculate_score_at(&young, &params, now());
        let old_score = recalculate_score_at(&old, &params, now());
        assert!(young_score > old_score);
        assert!(old_score > 0.0);
    }

    #[test]
    fn frontpage_and_curated_bonuses_stack() {
        let params = ScoreParams::default();
        let posted = now() - Duration::hours(1);

        let plain = document_posted_at(posted, 10);
        let mut frontpage = document_posted_at(posted, 10);
        frontpage.frontpage_date = Some(posted);
        let mut curated = document_posted_at(posted, 10);
        curated.frontpage_date = Some(posted);
        curated.curated_date = Some(posted);

        let plain_score = recalculate_score_at(&plain, &params, now());
        let frontpage_score = recalculate_score_at(&frontpage, &params, now());
        let curated_score = recalculate_score_at(&curated, &params, now());

        // At one hour of age each promotion is worth well over a point of
        // ranking score.
        assert!(frontpage_score - plain_score > 1.0);
        assert!(curated_score - frontpage_score > 1.0);
    }

    #[test]
    fn score_is_rounded_to_six_decimals() {
        let params = ScoreParams::default();
        let document = document_posted_at(now() - Duration::hours(7), 13);
        let score = recalculate_score_at(&document, &params, now());
        assert_eq!(score, (score * 1_000_000.0).round() / 1_000_000.0);
    }

    #[test]
    fn future_posted_at_is_treated_as_age_zero() {
        let params = ScoreParams::default();
        let future = document_posted_at(now() + Duration::hours(5), 10);
        let fresh = document_posted_at(now(), 10);
        assert_eq!(
            recalculate_score_at(&future, &params, now()),
            recalculate_score_at(&fresh, &params, now())
        );
    }
}
