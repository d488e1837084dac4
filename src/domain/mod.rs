//! Domain types shared across the dialogue, scoring, and planning modules

mod candidate;
mod goal;
mod plan;

pub use candidate::{Candidate, FlightCandidate, HotelCandidate};
pub use goal::{
    Criterion, ExtractedFields, FieldUpdate, GoalProfile, PartialGoalFields, ProfileError, WEIGHT_SUM_EPSILON, Weights,
};
pub use plan::{Plan, Ranked, ScoreBreakdown, Tier};
