//! Plan and scoring result types

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::candidate::Candidate;
use super::goal::Criterion;

/// Discrete recommendation bucket, totally ordered worst to best
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Poor,
    Fair,
    Good,
    Excellent,
}

impl Tier {
    /// Assign a tier from total utility and the hard budget constraint
    ///
    /// First match wins: a busted budget is Poor no matter how well the
    /// other components score.
    pub fn assign(total_utility: f64, budget_constraint_met: bool) -> Self {
        if !budget_constraint_met {
            Tier::Poor
        } else if total_utility >= 0.8 {
            Tier::Excellent
        } else if total_utility >= 0.6 {
            Tier::Good
        } else if total_utility >= 0.4 {
            Tier::Fair
        } else {
            Tier::Poor
        }
    }
}

/// Per-candidate scoring result, computed fresh per (candidate, profile) pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    /// Normalized [0,1] score per enabled criterion
    pub component_scores: BTreeMap<Criterion, f64>,

    /// Weighted sum of component scores, in [0,1]
    pub total_utility: f64,

    /// False when a budget is set and the candidate's price exceeds it
    pub budget_constraint_met: bool,

    pub recommendation: Tier,
}

/// A candidate paired with its score, in ranked order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ranked {
    pub candidate: Candidate,
    pub breakdown: ScoreBreakdown,
}

/// The combined, ranked output of a confirmed search
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Plan {
    pub flights: Vec<Ranked>,
    pub hotels: Vec<Ranked>,

    /// Non-empty when one search modality failed and results are degraded
    pub warnings: Vec<String>,
}

impl Plan {
    pub fn is_degraded(&self) -> bool {
        !self.warnings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_thresholds() {
        assert_eq!(Tier::assign(0.85, true), Tier::Excellent);
        assert_eq!(Tier::assign(0.8, true), Tier::Excellent);
        assert_eq!(Tier::assign(0.7, true), Tier::Good);
        assert_eq!(Tier::assign(0.5, true), Tier::Fair);
        assert_eq!(Tier::assign(0.39, true), Tier::Poor);
    }

    #[test]
    fn test_busted_budget_is_poor_regardless_of_utility() {
        assert_eq!(Tier::assign(0.95, false), Tier::Poor);
        assert_eq!(Tier::assign(0.0, false), Tier::Poor);
    }

    #[test]
    fn test_tier_ordering() {
        assert!(Tier::Excellent > Tier::Good);
        assert!(Tier::Good > Tier::Fair);
        assert!(Tier::Fair > Tier::Poor);
    }
}
