//! Candidate types - searchable flight and hotel options
//!
//! Candidates come from the external search collaborators and are immutable.
//! Every field that scoring reads is optional: a malformed candidate scores
//! zero on the affected component instead of aborting the batch.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// One searchable option, flight or hotel
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Candidate {
    Flight(FlightCandidate),
    Hotel(HotelCandidate),
}

impl Candidate {
    /// Price used for tie-breaking and the budget constraint
    ///
    /// Flights use the total fare, hotels the per-night rate.
    pub fn price(&self) -> Option<f64> {
        match self {
            Candidate::Flight(f) => f.price,
            Candidate::Hotel(h) => h.price_per_night,
        }
    }

    /// Short label for logs and CLI output
    pub fn label(&self) -> &str {
        match self {
            Candidate::Flight(f) => f.airline.as_deref().unwrap_or("(unknown airline)"),
            Candidate::Hotel(h) => h.name.as_deref().unwrap_or("(unknown hotel)"),
        }
    }
}

/// A flight search result
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FlightCandidate {
    pub airline: Option<String>,
    pub flight_number: Option<String>,
    pub price: Option<f64>,
    pub duration_minutes: Option<u32>,
    pub stops: Option<u32>,
    pub available_seats: Option<u32>,
}

/// A hotel search result
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HotelCandidate {
    pub name: Option<String>,
    pub price_per_night: Option<f64>,
    pub rating: Option<f64>,
    pub distance_from_center_km: Option<f64>,
    pub amenities: BTreeSet<String>,
}
