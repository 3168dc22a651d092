//! Reputation interpretation for display and ranking.
//!
//! The ledger program is the only writer of scores. This module reproduces
//! how a score is read: its label, the trusted badge and the star rating.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::profile::UserProfile;

/// A reputation score in basis points, always within [0, 10000].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "u64", into = "u64")]
pub struct Score(u64);

impl Score {
    /// Perfect reputation.
    pub const MAX: Self = Self(10_000);

    /// Worst reputation.
    pub const ZERO: Self = Self(0);

    /// Score assigned at profile creation.
    pub const BASE: Self = Self(5_000);

    /// Creates a score, clamping to [0, 10000].
    #[must_use]
    pub const fn clamped(value: u64) -> Self {
        if value > Self::MAX.0 {
            Self::MAX
        } else {
            Self(value)
        }
    }

    /// Applies a signed delta, clamping the result.
    #[must_use]
    pub const fn adjusted(self, delta: i64) -> Self {
        let next = (self.0 as i64).saturating_add(delta);
        if next < 0 {
            Self::ZERO
        } else {
            Self::clamped(next as u64)
        }
    }

    /// Raw basis-point value.
    #[must_use]
    pub const fn bps(self) -> u64 {
        self.0
    }

    /// Score as a fraction in [0, 1].
    #[must_use]
    pub fn fraction(self) -> f64 {
        self.0 as f64 / Self::MAX.0 as f64
    }

    /// Display label for this score.
    #[must_use]
    pub const fn label(self) -> TrustLabel {
        TrustLabel::for_score(self)
    }
}

impl Default for Score {
    fn default() -> Self {
        Self::BASE
    }
}

impl From<u64> for Score {
    fn from(value: u64) -> Self {
        Self::clamped(value)
    }
}

impl From<Score> for u64 {
    fn from(score: Score) -> Self {
        score.0
    }
}

/// Minimum score for the trusted badge.
pub const TRUSTED_MIN_SCORE: Score = Score(8_000);

/// Display label derived from a score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrustLabel {
    /// 8000 and above.
    Excellent,
    /// 7000..8000.
    VeryGood,
    /// 6000..7000.
    Good,
    /// 5000..6000.
    Fair,
    /// 4000..5000.
    BelowAverage,
    /// Below 4000.
    Poor,
}

impl TrustLabel {
    /// Map a score onto its label.
    #[must_use]
    pub const fn for_score(score: Score) -> Self {
        match score.0 {
            8_000.. => Self::Excellent,
            7_000..=7_999 => Self::VeryGood,
            6_000..=6_999 => Self::Good,
            5_000..=5_999 => Self::Fair,
            4_000..=4_999 => Self::BelowAverage,
            _ => Self::Poor,
        }
    }

    /// Human-readable text.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Excellent => "Excellent",
            Self::VeryGood => "Very Good",
            Self::Good => "Good",
            Self::Fair => "Fair",
            Self::BelowAverage => "Below Average",
            Self::Poor => "Poor",
        }
    }
}

impl fmt::Display for TrustLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trusted badge: high score *and* a clean dispute record.
#[must_use]
pub const fn is_trusted(score: Score, dispute_count: u64) -> bool {
    score.0 >= TRUSTED_MIN_SCORE.0 && dispute_count == 0
}

/// A star rating in half-star steps between 1 and 5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StarRating(u8);

impl StarRating {
    /// Derive stars from the rating accumulator.
    ///
    /// Ratings are stored in basis points (10000 = five stars), so the
    /// average divided by 2000 gives stars; the result is rounded to the
    /// nearest half star. Returns `None` when nothing has been rated.
    #[must_use]
    pub const fn from_accumulator(rating_sum: u64, rating_count: u64) -> Option<Self> {
        if rating_count == 0 {
            return None;
        }
        // Half stars = round(avg / 1000), done in integers on the raw sum.
        let denom = rating_count as u128 * 1_000;
        let half = (rating_sum as u128 * 2 + denom) / (denom * 2);
        let clamped = if half < 2 {
            2
        } else if half > 10 {
            10
        } else {
            half
        };
        Some(Self(clamped as u8))
    }

    /// Number of half stars (2..=10).
    #[must_use]
    pub const fn half_stars(self) -> u8 {
        self.0
    }

    /// Stars as a decimal (1.0..=5.0 in 0.5 steps).
    #[must_use]
    pub fn stars(self) -> f64 {
        f64::from(self.0) / 2.0
    }
}

impl Serialize for StarRating {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.stars())
    }
}

/// Everything a caller needs to render a user's reputation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReputationSummary {
    /// Score in basis points.
    pub score: Score,
    /// Label for the score.
    pub label: TrustLabel,
    /// Whether the trusted badge applies.
    pub trusted: bool,
    /// Star rating, absent when never rated.
    pub stars: Option<StarRating>,
    /// Ratings received.
    pub rating_count: u64,
    /// Disputes on either side.
    pub dispute_count: u64,
}

impl ReputationSummary {
    /// Interpret a profile.
    #[must_use]
    pub const fn from_profile(profile: &UserProfile) -> Self {
        let dispute_count = profile.dispute_count();
        Self {
            score: profile.score,
            label: TrustLabel::for_score(profile.score),
            trusted: is_trusted(profile.score, dispute_count),
            stars: StarRating::from_accumulator(profile.rating_sum, profile.rating_count),
            rating_count: profile.rating_count,
            dispute_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{Address, ObjectId};
    use proptest::prelude::*;
    use test_case::test_case;

    #[test_case(10_000, TrustLabel::Excellent)]
    #[test_case(8_000, TrustLabel::Excellent)]
    #[test_case(7_999, TrustLabel::VeryGood)]
    #[test_case(7_000, TrustLabel::VeryGood)]
    #[test_case(6_000, TrustLabel::Good)]
    #[test_case(5_000, TrustLabel::Fair)]
    #[test_case(4_999, TrustLabel::BelowAverage)]
    #[test_case(4_000, TrustLabel::BelowAverage)]
    #[test_case(3_999, TrustLabel::Poor)]
    #[test_case(0, TrustLabel::Poor)]
    fn test_label_thresholds(bps: u64, expected: TrustLabel) {
        assert_eq!(Score::clamped(bps).label(), expected);
    }

    #[test]
    fn test_clamping() {
        assert_eq!(Score::clamped(12_000), Score::MAX);
        assert_eq!(Score::BASE.adjusted(-9_000), Score::ZERO);
        assert_eq!(Score::BASE.adjusted(6_000), Score::MAX);
        assert_eq!(Score::BASE.adjusted(100).bps(), 5_100);
    }

    #[test]
    fn test_deserialize_clamps() {
        let score: Score = serde_json::from_str("15000").unwrap();
        assert_eq!(score, Score::MAX);
    }

    #[test]
    fn test_trusted_requires_both_conditions() {
        assert!(is_trusted(Score::clamped(8_000), 0));
        assert!(!is_trusted(Score::clamped(8_000), 1));
        assert!(!is_trusted(Score::clamped(7_999), 0));
    }

    #[test_case(10_000, 1, 10 ; "five stars")]
    #[test_case(2_000, 1, 2 ; "one star")]
    #[test_case(7_000, 1, 7 ; "three and a half")]
    #[test_case(7_400, 1, 7 ; "rounds down")]
    #[test_case(7_500, 1, 8 ; "rounds half up")]
    #[test_case(500, 1, 2 ; "clamped to one star")]
    #[test_case(17_000, 2, 9 ; "averaged")]
    fn test_star_rating(sum: u64, count: u64, half_stars: u8) {
        let rating = StarRating::from_accumulator(sum, count).unwrap();
        assert_eq!(rating.half_stars(), half_stars);
    }

    #[test]
    fn test_no_ratings_means_no_stars() {
        assert_eq!(StarRating::from_accumulator(0, 0), None);
    }

    #[test]
    fn test_summary_from_profile() {
        let mut profile = UserProfile::new(
            ObjectId::parse("0x1").unwrap(),
            Address::parse("0x2").unwrap(),
            0,
        );
        profile.score = Score::clamped(8_000);
        let summary = ReputationSummary::from_profile(&profile);
        assert_eq!(summary.label, TrustLabel::Excellent);
        assert!(summary.trusted);
        assert!(summary.stars.is_none());

        profile.disputes_received = 1;
        let summary = ReputationSummary::from_profile(&profile);
        assert_eq!(summary.label, TrustLabel::Excellent);
        assert!(!summary.trusted);
    }

    #[test]
    fn test_summary_serializes_stars_as_decimal() {
        let mut profile = UserProfile::new(
            ObjectId::parse("0x1").unwrap(),
            Address::parse("0x2").unwrap(),
            0,
        );
        profile.rating_count = 2;
        profile.rating_sum = 18_000;
        let json = serde_json::to_value(ReputationSummary::from_profile(&profile)).unwrap();
        assert_eq!(json["stars"], 4.5);
        assert_eq!(json["label"], "Fair");
    }

    proptest! {
        #[test]
        fn prop_every_score_has_exactly_one_label(bps in 0u64..=10_000) {
            let label = Score::clamped(bps).label();
            let matches = [
                bps >= 8_000,
                (7_000..8_000).contains(&bps),
                (6_000..7_000).contains(&bps),
                (5_000..6_000).contains(&bps),
                (4_000..5_000).contains(&bps),
                bps < 4_000,
            ];
            prop_assert_eq!(matches.iter().filter(|m| **m).count(), 1);
            let index = matches.iter().position(|m| *m).unwrap();
            let expected = [
                TrustLabel::Excellent,
                TrustLabel::VeryGood,
                TrustLabel::Good,
                TrustLabel::Fair,
                TrustLabel::BelowAverage,
                TrustLabel::Poor,
            ][index];
            prop_assert_eq!(label, expected);
        }
    }
}
