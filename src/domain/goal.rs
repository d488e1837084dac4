//! Goal types - the traveler's stated trip constraints
//!
//! `ExtractedFields` accumulates slot-filled fields across conversation turns.
//! `GoalProfile` is the frozen form created when a search is confirmed; it is
//! never mutated afterward.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// Tolerance when checking that criterion weights sum to 1.0
pub const WEIGHT_SUM_EPSILON: f64 = 1e-6;

/// Scoring criterion identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Criterion {
    Price,
    Duration,
    Stops,
    Location,
    Rating,
    Amenities,
}

/// Errors constructing or validating a [`GoalProfile`]
#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("{kind} weights sum to {sum:.6}, expected 1.0")]
    WeightSum { kind: &'static str, sum: f64 },

    #[error("negative weight {weight} for {criterion:?}")]
    NegativeWeight { criterion: Criterion, weight: f64 },

    #[error("missing required field: {0}")]
    MissingField(&'static str),
}

/// A validated criterion -> weight table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Weights(BTreeMap<Criterion, f64>);

impl Weights {
    /// Validate that entries are non-negative and sum to 1.0
    pub fn new(kind: &'static str, entries: BTreeMap<Criterion, f64>) -> Result<Self, ProfileError> {
        for (criterion, weight) in &entries {
            if *weight < 0.0 {
                return Err(ProfileError::NegativeWeight {
                    criterion: *criterion,
                    weight: *weight,
                });
            }
        }

        let sum: f64 = entries.values().sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_EPSILON {
            return Err(ProfileError::WeightSum { kind, sum });
        }

        Ok(Self(entries))
    }

    /// Default flight weights: price 0.5, duration 0.2, stops 0.3
    pub fn default_flight() -> Self {
        Self(BTreeMap::from([
            (Criterion::Price, 0.5),
            (Criterion::Duration, 0.2),
            (Criterion::Stops, 0.3),
        ]))
    }

    /// Default hotel weights: price 0.3, location 0.25, rating 0.25, amenities 0.2
    pub fn default_hotel() -> Self {
        Self(BTreeMap::from([
            (Criterion::Price, 0.3),
            (Criterion::Location, 0.25),
            (Criterion::Rating, 0.25),
            (Criterion::Amenities, 0.2),
        ]))
    }

    /// Weight for a criterion, 0.0 when the criterion is not enabled
    pub fn get(&self, criterion: Criterion) -> f64 {
        self.0.get(&criterion).copied().unwrap_or(0.0)
    }

    /// Iterate enabled (criterion, weight) pairs
    pub fn iter(&self) -> impl Iterator<Item = (Criterion, f64)> + '_ {
        self.0.iter().map(|(c, w)| (*c, *w))
    }
}

/// Frozen trip constraints driving search and scoring
///
/// Constructed from [`ExtractedFields`] at confirmation time and immutable
/// from then on. Goal mutation is modeled as building a new profile, which
/// invalidates all previously computed scores.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoalProfile {
    pub origin: String,
    pub destination: String,
    pub departure_date: NaiveDate,
    pub return_date: Option<NaiveDate>,
    pub passenger_count: u32,
    pub budget_max: Option<f64>,
    pub max_stops: Option<u32>,
    pub preferred_duration_minutes: Option<u32>,
    pub min_rating: Option<f64>,
    pub desired_amenities: BTreeSet<String>,
    pub flight_weights: Weights,
    pub hotel_weights: Weights,
}

/// Fields accumulated from conversation turns; all optional until confirmed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractedFields {
    pub origin: Option<String>,
    pub destination: Option<String>,
    pub departure_date: Option<NaiveDate>,
    pub return_date: Option<NaiveDate>,
    pub passenger_count: Option<u32>,
    pub budget_max: Option<f64>,
    pub max_stops: Option<u32>,
    pub preferred_duration_minutes: Option<u32>,
    pub min_rating: Option<f64>,
    pub desired_amenities: Option<BTreeSet<String>>,
}

/// Required fields for a searchable request
const REQUIRED_FIELDS: [&str; 4] = ["origin", "destination", "departure-date", "passenger-count"];

impl ExtractedFields {
    /// True when every required field is present
    pub fn is_complete(&self) -> bool {
        self.missing_fields().is_empty()
    }

    /// Names of required fields still missing
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let present = [
            self.origin.is_some(),
            self.destination.is_some(),
            self.departure_date.is_some(),
            self.passenger_count.is_some(),
        ];
        REQUIRED_FIELDS
            .iter()
            .zip(present)
            .filter_map(|(name, ok)| if ok { None } else { Some(*name) })
            .collect()
    }

    /// Merge one turn's extraction at field granularity
    ///
    /// Fields the turn did not mention persist; fields it supplied overwrite;
    /// fields it explicitly nulled are cleared. Never a deep merge.
    pub fn merge(&mut self, update: PartialGoalFields) {
        merge_field(&mut self.origin, update.origin);
        merge_field(&mut self.destination, update.destination);
        merge_field(&mut self.departure_date, update.departure_date);
        merge_field(&mut self.return_date, update.return_date);
        merge_field(&mut self.passenger_count, update.passenger_count);
        merge_field(&mut self.budget_max, update.budget_max);
        merge_field(&mut self.max_stops, update.max_stops);
        merge_field(&mut self.preferred_duration_minutes, update.preferred_duration_minutes);
        merge_field(&mut self.min_rating, update.min_rating);
        merge_field(&mut self.desired_amenities, update.desired_amenities);
    }

    /// Freeze into a [`GoalProfile`] with default weights
    pub fn into_profile(self) -> Result<GoalProfile, ProfileError> {
        Ok(GoalProfile {
            origin: self.origin.ok_or(ProfileError::MissingField("origin"))?,
            destination: self.destination.ok_or(ProfileError::MissingField("destination"))?,
            departure_date: self
                .departure_date
                .ok_or(ProfileError::MissingField("departure-date"))?,
            return_date: self.return_date,
            passenger_count: self
                .passenger_count
                .ok_or(ProfileError::MissingField("passenger-count"))?,
            budget_max: self.budget_max,
            max_stops: self.max_stops,
            preferred_duration_minutes: self.preferred_duration_minutes,
            min_rating: self.min_rating,
            desired_amenities: self.desired_amenities.unwrap_or_default(),
            flight_weights: Weights::default_flight(),
            hotel_weights: Weights::default_hotel(),
        })
    }
}

fn merge_field<T>(slot: &mut Option<T>, update: FieldUpdate<T>) {
    match update {
        FieldUpdate::Unchanged => {}
        FieldUpdate::Clear => *slot = None,
        FieldUpdate::Set(value) => *slot = Some(value),
    }
}

/// One turn's worth of extraction from the NLP collaborator
///
/// Absent keys leave the accumulated field untouched; explicit JSON nulls
/// clear it. The distinction is what lets a later utterance invalidate a
/// previously filled required field.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PartialGoalFields {
    pub origin: FieldUpdate<String>,
    pub destination: FieldUpdate<String>,
    pub departure_date: FieldUpdate<NaiveDate>,
    pub return_date: FieldUpdate<NaiveDate>,
    pub passenger_count: FieldUpdate<u32>,
    pub budget_max: FieldUpdate<f64>,
    pub max_stops: FieldUpdate<u32>,
    pub preferred_duration_minutes: FieldUpdate<u32>,
    pub min_rating: FieldUpdate<f64>,
    pub desired_amenities: FieldUpdate<BTreeSet<String>>,
}

/// Tri-state field update: key absent, key null, or key set
#[derive(Debug, Clone, Default, PartialEq)]
pub enum FieldUpdate<T> {
    #[default]
    Unchanged,
    Clear,
    Set(T),
}

impl<T> FieldUpdate<T> {
    pub fn set(value: T) -> Self {
        FieldUpdate::Set(value)
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for FieldUpdate<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // Only reached when the key is present; absent keys fall back to
        // Default::default() == Unchanged via #[serde(default)].
        Ok(match Option::<T>::deserialize(deserializer)? {
            None => FieldUpdate::Clear,
            Some(value) => FieldUpdate::Set(value),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_fields() -> ExtractedFields {
        ExtractedFields {
            origin: Some("SFO".to_string()),
            destination: Some("NYC".to_string()),
            departure_date: NaiveDate::from_ymd_opt(2026, 3, 14),
            passenger_count: Some(2),
            ..Default::default()
        }
    }

    #[test]
    fn test_default_flight_weights_sum_to_one() {
        let weights = Weights::default_flight();
        let sum: f64 = weights.iter().map(|(_, w)| w).sum();
        assert!((sum - 1.0).abs() < WEIGHT_SUM_EPSILON);
    }

    #[test]
    fn test_default_hotel_weights_sum_to_one() {
        let weights = Weights::default_hotel();
        let sum: f64 = weights.iter().map(|(_, w)| w).sum();
        assert!((sum - 1.0).abs() < WEIGHT_SUM_EPSILON);
    }

    #[test]
    fn test_weights_rejects_bad_sum() {
        let entries = BTreeMap::from([(Criterion::Price, 0.5), (Criterion::Stops, 0.3)]);
        let err = Weights::new("flight", entries).unwrap_err();
        assert!(matches!(err, ProfileError::WeightSum { kind: "flight", .. }));
    }

    #[test]
    fn test_weights_rejects_negative() {
        let entries = BTreeMap::from([(Criterion::Price, 1.2), (Criterion::Stops, -0.2)]);
        let err = Weights::new("flight", entries).unwrap_err();
        assert!(matches!(err, ProfileError::NegativeWeight { .. }));
    }

    #[test]
    fn test_completeness_requires_all_four_fields() {
        let mut fields = full_fields();
        assert!(fields.is_complete());

        fields.passenger_count = None;
        assert!(!fields.is_complete());
        assert_eq!(fields.missing_fields(), vec!["passenger-count"]);
    }

    #[test]
    fn test_merge_overwrites_only_supplied_fields() {
        let mut fields = full_fields();
        fields.merge(PartialGoalFields {
            destination: FieldUpdate::set("LAX".to_string()),
            budget_max: FieldUpdate::set(500.0),
            ..Default::default()
        });

        assert_eq!(fields.destination.as_deref(), Some("LAX"));
        assert_eq!(fields.budget_max, Some(500.0));
        // Unmentioned fields persist from prior turns
        assert_eq!(fields.origin.as_deref(), Some("SFO"));
        assert_eq!(fields.passenger_count, Some(2));
    }

    #[test]
    fn test_merge_clear_removes_field() {
        let mut fields = full_fields();
        fields.merge(PartialGoalFields {
            departure_date: FieldUpdate::Clear,
            ..Default::default()
        });

        assert_eq!(fields.departure_date, None);
        assert!(!fields.is_complete());
    }

    #[test]
    fn test_partial_fields_null_vs_absent() {
        let json = r#"{"origin": null, "destination": "NYC"}"#;
        let partial: PartialGoalFields = serde_json::from_str(json).unwrap();

        assert_eq!(partial.origin, FieldUpdate::Clear);
        assert_eq!(partial.destination, FieldUpdate::set("NYC".to_string()));
        assert_eq!(partial.departure_date, FieldUpdate::Unchanged);
    }

    #[test]
    fn test_into_profile_requires_completeness() {
        let err = ExtractedFields::default().into_profile().unwrap_err();
        assert!(matches!(err, ProfileError::MissingField("origin")));

        let profile = full_fields().into_profile().unwrap();
        assert_eq!(profile.origin, "SFO");
        assert_eq!(profile.passenger_count, 2);
        assert!(profile.budget_max.is_none());
    }
}
