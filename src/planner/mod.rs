//! Planning orchestrator
//!
//! Runs the flight and hotel searches concurrently for a frozen goal
//! profile, scores and ranks whatever comes back, and assembles the plan.
//! One failed modality degrades the plan with a warning; both failing, or a
//! dead session, fails the whole attempt.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::SearchConfig;
use crate::domain::{Candidate, GoalProfile, Plan};
use crate::gateway::{GatewayError, RequestGateway};
use crate::scoring;

/// Errors from one search modality
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("search request failed: {0}")]
    Gateway(#[from] GatewayError),

    #[error("search timed out after {0:?}")]
    Timeout(Duration),

    #[error("invalid search response: {0}")]
    InvalidResponse(String),
}

impl SearchError {
    pub fn is_session_expired(&self) -> bool {
        matches!(self, SearchError::Gateway(g) if g.is_session_expired())
    }
}

/// Errors from a whole planning attempt
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("no search results available: flights: {flights}; hotels: {hotels}")]
    SearchUnavailable { flights: SearchError, hotels: SearchError },

    #[error("session expired; log in again to retry the search")]
    SessionExpired,
}

/// Flight inventory lookup
#[async_trait]
pub trait FlightSearch: Send + Sync {
    async fn search(&self, profile: &GoalProfile, page: u32) -> Result<Vec<Candidate>, SearchError>;
}

/// Hotel inventory lookup
#[async_trait]
pub trait HotelSearch: Send + Sync {
    async fn search(&self, profile: &GoalProfile, page: u32) -> Result<Vec<Candidate>, SearchError>;
}

/// Flight search against the backend inventory API
pub struct HttpFlightSearch {
    gateway: Arc<RequestGateway>,
    url: String,
    page_size: u32,
}

impl HttpFlightSearch {
    pub fn from_config(config: &SearchConfig, gateway: Arc<RequestGateway>) -> Self {
        Self {
            gateway,
            url: format!("{}/api/flights/search/", config.base_url),
            page_size: config.page_size,
        }
    }
}

#[async_trait]
impl FlightSearch for HttpFlightSearch {
    async fn search(&self, profile: &GoalProfile, page: u32) -> Result<Vec<Candidate>, SearchError> {
        let query = [
            ("origin", profile.origin.clone()),
            ("destination", profile.destination.clone()),
            ("departure_date", profile.departure_date.to_string()),
            ("passengers", profile.passenger_count.to_string()),
            ("page", page.to_string()),
            ("pageSize", self.page_size.to_string()),
        ];
        let response = self.gateway.get_json(&self.url, &query).await?;
        parse_candidates(response, tag_flight)
    }
}

/// Hotel search against the backend inventory API
pub struct HttpHotelSearch {
    gateway: Arc<RequestGateway>,
    url: String,
    page_size: u32,
}

impl HttpHotelSearch {
    pub fn from_config(config: &SearchConfig, gateway: Arc<RequestGateway>) -> Self {
        Self {
            gateway,
            url: format!("{}/api/hotels/search/", config.base_url),
            page_size: config.page_size,
        }
    }
}

#[async_trait]
impl HotelSearch for HttpHotelSearch {
    async fn search(&self, profile: &GoalProfile, page: u32) -> Result<Vec<Candidate>, SearchError> {
        let mut query = vec![
            ("destination", profile.destination.clone()),
            ("check_in", profile.departure_date.to_string()),
            ("page", page.to_string()),
            ("pageSize", self.page_size.to_string()),
        ];
        if let Some(check_out) = profile.return_date {
            query.push(("check_out", check_out.to_string()));
        }
        let response = self.gateway.get_json(&self.url, &query).await?;
        parse_candidates(response, tag_hotel)
    }
}

fn tag_flight(item: serde_json::Value) -> serde_json::Value {
    tag_candidate(item, "flight")
}

fn tag_hotel(item: serde_json::Value) -> serde_json::Value {
    tag_candidate(item, "hotel")
}

/// The inventory API returns untagged objects; stamp the modality on each
fn tag_candidate(mut item: serde_json::Value, kind: &str) -> serde_json::Value {
    if let Some(object) = item.as_object_mut() {
        object.insert("type".to_string(), serde_json::Value::String(kind.to_string()));
    }
    item
}

/// Unwrap the paginated `results` envelope, tolerating a bare array
fn parse_candidates(
    response: serde_json::Value,
    tag: fn(serde_json::Value) -> serde_json::Value,
) -> Result<Vec<Candidate>, SearchError> {
    let items = match response.get("results") {
        Some(results) => results.clone(),
        None => response,
    };
    let items = items
        .as_array()
        .cloned()
        .ok_or_else(|| SearchError::InvalidResponse("expected a results array".to_string()))?;

    items
        .into_iter()
        .map(|item| serde_json::from_value(tag(item)).map_err(|e| SearchError::InvalidResponse(e.to_string())))
        .collect()
}

/// Runs both searches, scores the results, and assembles the plan
pub struct PlanningOrchestrator {
    flights: Arc<dyn FlightSearch>,
    hotels: Arc<dyn HotelSearch>,
    search_timeout: Duration,
}

impl PlanningOrchestrator {
    pub fn new(flights: Arc<dyn FlightSearch>, hotels: Arc<dyn HotelSearch>, search_timeout: Duration) -> Self {
        Self {
            flights,
            hotels,
            search_timeout,
        }
    }

    /// Search, score, and rank for a frozen profile
    ///
    /// The profile is immutable, so a failed attempt can be replayed as-is
    /// after the caller recovers (for instance by logging in again).
    pub async fn plan(&self, profile: &GoalProfile) -> Result<Plan, PlanError> {
        debug!(
            origin = %profile.origin,
            destination = %profile.destination,
            departure = %profile.departure_date,
            "plan: searching"
        );

        let (flight_result, hotel_result) = tokio::join!(
            self.search_one("flights", self.flights.search(profile, 1)),
            self.search_one("hotels", self.hotels.search(profile, 1)),
        );

        if let Err(e) = &flight_result
            && e.is_session_expired()
        {
            return Err(PlanError::SessionExpired);
        }
        if let Err(e) = &hotel_result
            && e.is_session_expired()
        {
            return Err(PlanError::SessionExpired);
        }

        let mut warnings = Vec::new();
        let (flights, hotels) = match (flight_result, hotel_result) {
            (Err(flights), Err(hotels)) => {
                return Err(PlanError::SearchUnavailable { flights, hotels });
            }
            (Ok(flights), Err(e)) => {
                warnings.push(format!("Hotel search unavailable: {e}"));
                (flights, Vec::new())
            }
            (Err(e), Ok(hotels)) => {
                warnings.push(format!("Flight search unavailable: {e}"));
                (Vec::new(), hotels)
            }
            (Ok(flights), Ok(hotels)) => (flights, hotels),
        };

        let flights = scoring::rank(flights, profile);
        let hotels = scoring::rank(hotels, profile);

        info!(
            flights = flights.len(),
            hotels = hotels.len(),
            degraded = !warnings.is_empty(),
            "plan: assembled"
        );

        Ok(Plan {
            flights,
            hotels,
            warnings,
        })
    }

    async fn search_one(
        &self,
        modality: &str,
        search: impl Future<Output = Result<Vec<Candidate>, SearchError>>,
    ) -> Result<Vec<Candidate>, SearchError> {
        match tokio::time::timeout(self.search_timeout, search).await {
            Ok(Ok(candidates)) => {
                debug!(modality, count = candidates.len(), "search_one: results received");
                Ok(candidates)
            }
            Ok(Err(e)) => {
                warn!(modality, error = %e, "search_one: search failed");
                Err(e)
            }
            Err(_) => {
                warn!(modality, timeout = ?self.search_timeout, "search_one: search timed out");
                Err(SearchError::Timeout(self.search_timeout))
            }
        }
    }
}
