//! Utility scoring engine
//!
//! Pure, deterministic scoring of flight and hotel candidates against a
//! [`GoalProfile`]. Both the chat flow and the CLI `score` command consume
//! this module, so the thresholds and weights live in exactly one place.
//!
//! Scoring never fails: a candidate missing a field behind an enabled weight
//! contributes a zero component score instead of aborting the batch.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use tracing::debug;

use crate::domain::{Candidate, Criterion, FlightCandidate, GoalProfile, HotelCandidate, Ranked, ScoreBreakdown, Tier};

/// Budget headroom factor: a price at budget scores 1 - 1/1.5 ~= 0.33,
/// and only a price of zero scores 1.0
const BUDGET_HEADROOM: f64 = 1.5;

/// Distance at which a hotel's location score reaches zero
const MAX_CENTER_DISTANCE_KM: f64 = 10.0;

/// Normalized ranks of a candidate within its result set, used as the price
/// and duration fallbacks when the profile states no explicit preference.
/// 0.0 is best in set, 1.0 is worst; `None` means the candidate is missing
/// the underlying field.
#[derive(Debug, Clone, Copy, Default)]
struct RankNorm {
    price: Option<f64>,
    duration: Option<f64>,
}

impl RankNorm {
    /// Neutral ranks for scoring a lone candidate outside any batch
    fn neutral() -> Self {
        Self {
            price: Some(0.5),
            duration: Some(0.5),
        }
    }
}

/// Score a single candidate against a profile
///
/// For the rank-based fallbacks (no budget, no duration preference) a lone
/// candidate has no result set to rank within, so it is treated as mid-pack.
/// Use [`rank`] to score a whole result set with real ranks.
pub fn score(candidate: &Candidate, profile: &GoalProfile) -> ScoreBreakdown {
    score_with_ranks(candidate, profile, RankNorm::neutral())
}

/// Score and sort a result set
///
/// Sort order: total utility descending, ties by ascending price, remaining
/// ties keep the collaborator-assigned order (the sort is stable).
pub fn rank(candidates: Vec<Candidate>, profile: &GoalProfile) -> Vec<Ranked> {
    let ranks = compute_ranks(&candidates);

    let mut ranked: Vec<Ranked> = candidates
        .into_iter()
        .zip(ranks)
        .map(|(candidate, rank)| {
            let breakdown = score_with_ranks(&candidate, profile, rank);
            Ranked { candidate, breakdown }
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.breakdown
            .total_utility
            .partial_cmp(&a.breakdown.total_utility)
            .unwrap_or(Ordering::Equal)
            .then_with(|| compare_prices(a.candidate.price(), b.candidate.price()))
    });

    debug!(count = ranked.len(), "rank: scored and sorted result set");
    ranked
}

/// Ascending by price; candidates with no price sort last
fn compare_prices(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Compute normalized price/duration ranks, separately per candidate kind
fn compute_ranks(candidates: &[Candidate]) -> Vec<RankNorm> {
    let price_ranks = normalized_ranks(candidates, |c| c.price());
    let duration_ranks = normalized_ranks(candidates, |c| match c {
        Candidate::Flight(f) => f.duration_minutes.map(f64::from),
        Candidate::Hotel(_) => None,
    });

    price_ranks
        .into_iter()
        .zip(duration_ranks)
        .map(|(price, duration)| RankNorm { price, duration })
        .collect()
}

/// Rank candidates of the same kind by a key, normalized to [0,1]
///
/// A single candidate with a known key ranks 0.0 (best). Candidates missing
/// the key get `None`.
fn normalized_ranks(candidates: &[Candidate], key: impl Fn(&Candidate) -> Option<f64>) -> Vec<Option<f64>> {
    let is_flight = |c: &Candidate| matches!(c, Candidate::Flight(_));

    let mut ranks = vec![None; candidates.len()];
    for kind_flight in [true, false] {
        let mut keyed: Vec<(usize, f64)> = candidates
            .iter()
            .enumerate()
            .filter(|(_, c)| is_flight(c) == kind_flight)
            .filter_map(|(i, c)| key(c).map(|k| (i, k)))
            .collect();
        keyed.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));

        let denominator = (keyed.len().saturating_sub(1)).max(1) as f64;
        for (position, (index, _)) in keyed.iter().enumerate() {
            ranks[*index] = Some(position as f64 / denominator);
        }
    }
    ranks
}

fn score_with_ranks(candidate: &Candidate, profile: &GoalProfile, ranks: RankNorm) -> ScoreBreakdown {
    match candidate {
        Candidate::Flight(flight) => score_flight(flight, profile, ranks),
        Candidate::Hotel(hotel) => score_hotel(hotel, profile, ranks),
    }
}

fn score_flight(flight: &FlightCandidate, profile: &GoalProfile, ranks: RankNorm) -> ScoreBreakdown {
    let mut components = BTreeMap::new();

    for (criterion, _) in profile.flight_weights.iter() {
        let component = match criterion {
            Criterion::Price => price_score(flight.price, profile.budget_max, ranks.price),
            Criterion::Duration => duration_score(
                flight.duration_minutes,
                profile.preferred_duration_minutes,
                ranks.duration,
            ),
            Criterion::Stops => match flight.stops {
                Some(stops) => 1.0 / (1.0 + f64::from(stops)),
                None => 0.0,
            },
            // Hotel-only criteria behind a custom flight weight have no
            // backing field, so they score zero
            _ => 0.0,
        };
        components.insert(criterion, component);
    }

    finish(components, &profile.flight_weights, flight.price, profile.budget_max)
}

fn score_hotel(hotel: &HotelCandidate, profile: &GoalProfile, ranks: RankNorm) -> ScoreBreakdown {
    let mut components = BTreeMap::new();

    for (criterion, _) in profile.hotel_weights.iter() {
        let component = match criterion {
            Criterion::Price => price_score(hotel.price_per_night, profile.budget_max, ranks.price),
            Criterion::Location => match hotel.distance_from_center_km {
                Some(km) => clamp01(1.0 - km / MAX_CENTER_DISTANCE_KM),
                None => 0.0,
            },
            Criterion::Rating => match hotel.rating {
                Some(rating) => clamp01(rating / 5.0),
                None => 0.0,
            },
            Criterion::Amenities => {
                let desired = &profile.desired_amenities;
                let overlap = desired.intersection(&hotel.amenities).count();
                overlap as f64 / desired.len().max(1) as f64
            }
            _ => 0.0,
        };
        components.insert(criterion, component);
    }

    finish(
        components,
        &profile.hotel_weights,
        hotel.price_per_night,
        profile.budget_max,
    )
}

/// Price component: explicit-budget formula when a budget is set, otherwise
/// rank within the result set
fn price_score(price: Option<f64>, budget_max: Option<f64>, price_rank: Option<f64>) -> f64 {
    match (budget_max, price) {
        (Some(budget), Some(price)) if budget > 0.0 => clamp01(1.0 - price / (budget * BUDGET_HEADROOM)),
        (Some(_), _) => 0.0,
        (None, _) => match price_rank {
            Some(rank) => clamp01(1.0 - rank),
            None => 0.0,
        },
    }
}

fn duration_score(duration: Option<u32>, preferred: Option<u32>, duration_rank: Option<f64>) -> f64 {
    match (preferred, duration) {
        (Some(preferred), Some(duration)) if preferred > 0 => {
            let diff = (f64::from(duration) - f64::from(preferred)).abs();
            clamp01(1.0 - diff / f64::from(preferred))
        }
        (Some(_), _) => 0.0,
        (None, _) => match duration_rank {
            Some(rank) => clamp01(1.0 - rank),
            None => 0.0,
        },
    }
}

fn finish(
    components: BTreeMap<Criterion, f64>,
    weights: &crate::domain::Weights,
    price: Option<f64>,
    budget_max: Option<f64>,
) -> ScoreBreakdown {
    let total_utility: f64 = weights
        .iter()
        .map(|(criterion, weight)| weight * components.get(&criterion).copied().unwrap_or(0.0))
        .sum();
    let total_utility = clamp01(total_utility);

    // A candidate with no price cannot be shown to violate the budget; its
    // zero price component already drags the utility down
    let budget_constraint_met = match (budget_max, price) {
        (Some(budget), Some(price)) => price <= budget,
        _ => true,
    };

    ScoreBreakdown {
        recommendation: Tier::assign(total_utility, budget_constraint_met),
        component_scores: components,
        total_utility,
        budget_constraint_met,
    }
}

fn clamp01(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}
