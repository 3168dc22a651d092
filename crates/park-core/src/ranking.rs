//! Deterministic ranking of candidate slots.
//!
//! Candidates are scored in [0, 1]. `Balanced` mixes proximity, total price
//! and the owner's reputation; `Closest` and `Cheapest` order strictly by
//! one criterion. Ties always fall back to the slot id so results are stable.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::ids::ObjectId;
use crate::reputation::Score;

/// Default number of recommended slots.
pub const DEFAULT_RECOMMENDATIONS: usize = 3;

const DISTANCE_WEIGHT: f64 = 0.5;
const PRICE_WEIGHT: f64 = 0.35;
const TRUST_WEIGHT: f64 = 0.15;

/// How candidates are ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankMode {
    /// Weighted mix of distance, price and owner trust.
    #[default]
    Balanced,
    /// Nearest first.
    Closest,
    /// Lowest total price first.
    Cheapest,
}

impl FromStr for RankMode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "balanced" | "best" => Ok(Self::Balanced),
            "closest" | "nearest" => Ok(Self::Closest),
            "cheapest" => Ok(Self::Cheapest),
            _ => Err(CoreError::unknown_variant("rank mode", s)),
        }
    }
}

impl fmt::Display for RankMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Balanced => write!(f, "balanced"),
            Self::Closest => write!(f, "closest"),
            Self::Cheapest => write!(f, "cheapest"),
        }
    }
}

/// Ranking parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankingCriteria {
    /// Ordering mode.
    pub mode: RankMode,
    /// Drop candidates whose total price exceeds this.
    pub max_price: Option<u64>,
    /// Number of recommendations to return.
    pub limit: usize,
}

impl Default for RankingCriteria {
    fn default() -> Self {
        Self {
            mode: RankMode::Balanced,
            max_price: None,
            limit: DEFAULT_RECOMMENDATIONS,
        }
    }
}

impl RankingCriteria {
    /// Criteria for a mode with default limit and no price cap.
    #[must_use]
    pub fn new(mode: RankMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    /// Set a maximum total price.
    #[must_use]
    pub const fn with_max_price(mut self, max_price: u64) -> Self {
        self.max_price = Some(max_price);
        self
    }

    /// Set the number of recommendations.
    #[must_use]
    pub const fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}

/// One slot to be ranked.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    /// Slot identifier.
    pub slot_id: ObjectId,
    /// Distance from the search origin in meters.
    pub distance_m: f64,
    /// Total price for the requested duration.
    pub price: u64,
    /// Owner reputation, if it could be looked up.
    pub owner_score: Option<Score>,
}

/// A ranked slot with its score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedSlot {
    /// Slot identifier.
    pub slot_id: ObjectId,
    /// Score in [0, 1]; higher is better.
    pub score: f64,
    /// Distance from the search origin in meters.
    pub distance_m: f64,
    /// Total price.
    pub price: u64,
}

/// Result of ranking.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Ranking {
    /// All surviving candidates, best first.
    pub ranked: Vec<RankedSlot>,
    /// The top `limit` slot ids.
    pub recommended: Vec<ObjectId>,
    /// Whether more candidates exist beyond the recommendations.
    pub has_more: bool,
    /// Candidates removed by the price cap.
    pub over_budget: usize,
}

impl Ranking {
    /// The single best slot, if any.
    #[must_use]
    pub fn best(&self) -> Option<&RankedSlot> {
        self.ranked.first()
    }
}

fn closeness(value: f64, max: f64) -> f64 {
    if max <= 0.0 {
        1.0
    } else {
        (1.0 - value / max).clamp(0.0, 1.0)
    }
}

/// Rank candidates according to `criteria`.
#[must_use]
pub fn rank(candidates: Vec<Candidate>, criteria: &RankingCriteria) -> Ranking {
    let total = candidates.len();
    let kept: Vec<Candidate> = candidates
        .into_iter()
        .filter(|c| criteria.max_price.is_none_or(|max| c.price <= max))
        .collect();
    let over_budget = total - kept.len();

    let max_distance = kept.iter().map(|c| c.distance_m).fold(0.0_f64, f64::max);
    let max_price = kept.iter().map(|c| c.price).max().unwrap_or(0) as f64;

    let mut ranked: Vec<RankedSlot> = kept
        .into_iter()
        .map(|c| {
            let near = closeness(c.distance_m, max_distance);
            let cheap = closeness(c.price as f64, max_price);
            let score = match criteria.mode {
                RankMode::Closest => near,
                RankMode::Cheapest => cheap,
                RankMode::Balanced => {
                    let trust = c.owner_score.unwrap_or(Score::BASE).fraction();
                    DISTANCE_WEIGHT * near + PRICE_WEIGHT * cheap + TRUST_WEIGHT * trust
                }
            };
            RankedSlot {
                slot_id: c.slot_id,
                score: score.clamp(0.0, 1.0),
                distance_m: c.distance_m,
                price: c.price,
            }
        })
        .collect();

    ranked.sort_by(|a, b| {
        let primary = match criteria.mode {
            RankMode::Closest => a.distance_m.total_cmp(&b.distance_m),
            RankMode::Cheapest => a.price.cmp(&b.price),
            RankMode::Balanced => b.score.total_cmp(&a.score),
        };
        match primary {
            Ordering::Equal => a.slot_id.cmp(&b.slot_id),
            other => other,
        }
    });

    let recommended: Vec<ObjectId> = ranked
        .iter()
        .take(criteria.limit)
        .map(|r| r.slot_id.clone())
        .collect();
    let has_more = ranked.len() > recommended.len();

    Ranking {
        ranked,
        recommended,
        has_more,
        over_budget,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: &str, distance_m: f64, price: u64, score: Option<u64>) -> Candidate {
        Candidate {
            slot_id: ObjectId::parse(id).unwrap(),
            distance_m,
            price,
            owner_score: score.map(Score::clamped),
        }
    }

    fn sample() -> Vec<Candidate> {
        vec![
            candidate("0x1", 900.0, 100, Some(9_000)),
            candidate("0x2", 100.0, 400, Some(5_000)),
            candidate("0x3", 500.0, 50, None),
            candidate("0x4", 300.0, 200, Some(2_000)),
        ]
    }

    #[test]
    fn test_closest_orders_by_distance() {
        let ranking = rank(sample(), &RankingCriteria::new(RankMode::Closest));
        let order: Vec<_> = ranking.ranked.iter().map(|r| r.distance_m as u64).collect();
        assert_eq!(order, vec![100, 300, 500, 900]);
        assert_eq!(ranking.recommended.len(), 3);
        assert!(ranking.has_more);
    }

    #[test]
    fn test_cheapest_orders_by_price() {
        let ranking = rank(sample(), &RankingCriteria::new(RankMode::Cheapest));
        assert_eq!(ranking.best().unwrap().price, 50);
        let prices: Vec<_> = ranking.ranked.iter().map(|r| r.price).collect();
        assert_eq!(prices, vec![50, 100, 200, 400]);
    }

    #[test]
    fn test_max_price_filters() {
        let criteria = RankingCriteria::new(RankMode::Balanced).with_max_price(150);
        let ranking = rank(sample(), &criteria);
        assert_eq!(ranking.ranked.len(), 2);
        assert_eq!(ranking.over_budget, 2);
        assert!(!ranking.has_more);
    }

    #[test]
    fn test_balanced_scores_in_unit_range_and_sorted() {
        let ranking = rank(sample(), &RankingCriteria::default());
        for pair in ranking.ranked.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
        assert!(ranking.ranked.iter().all(|r| (0.0..=1.0).contains(&r.score)));
    }

    #[test]
    fn test_trust_breaks_otherwise_equal_candidates() {
        let candidates = vec![
            candidate("0x1", 200.0, 100, Some(3_000)),
            candidate("0x2", 200.0, 100, Some(9_500)),
        ];
        let ranking = rank(candidates, &RankingCriteria::default());
        assert_eq!(ranking.best().unwrap().slot_id, ObjectId::parse("0x2").unwrap());
    }

    #[test]
    fn test_ties_fall_back_to_id() {
        let candidates = vec![
            candidate("0x9", 100.0, 10, None),
            candidate("0x3", 100.0, 10, None),
        ];
        let ranking = rank(candidates, &RankingCriteria::new(RankMode::Closest));
        assert_eq!(ranking.recommended[0], ObjectId::parse("0x3").unwrap());
    }

    #[test]
    fn test_empty_input() {
        let ranking = rank(Vec::new(), &RankingCriteria::default());
        assert!(ranking.best().is_none());
        assert!(!ranking.has_more);
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("closest".parse::<RankMode>().unwrap(), RankMode::Closest);
        assert_eq!("CHEAPEST".parse::<RankMode>().unwrap(), RankMode::Cheapest);
        assert!("random".parse::<RankMode>().is_err());
    }
}
