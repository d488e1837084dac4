//! Tripagent - conversational flight and hotel planner
//!
//! Tripagent turns a free-form chat about a trip into a validated search
//! request, runs the flight and hotel searches concurrently, and ranks the
//! results with a weighted multi-criteria utility score.
//!
//! # Core Concepts
//!
//! - **Slot filling**: the dialogue machine accumulates trip fields across
//!   turns and only unlocks planning once the request is complete
//! - **Frozen goals**: confirming a search freezes the goal profile; scores
//!   are always computed against an immutable profile
//! - **Single refresh**: any number of requests can hit an expired token,
//!   exactly one refresh call reaches the auth service
//! - **Graceful degradation**: one failed search modality yields a partial
//!   plan with a warning, not a failure
//!
//! # Modules
//!
//! - [`dialogue`] - Conversational state machine and NLP extraction client
//! - [`scoring`] - Multi-criteria utility scoring and ranking
//! - [`session`] - Credential storage and token refresh coordination
//! - [`gateway`] - Authenticated HTTP with retry and refresh-on-401
//! - [`planner`] - Concurrent search orchestration
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod cli;
pub mod config;
pub mod dialogue;
pub mod domain;
pub mod gateway;
pub mod planner;
pub mod scoring;
pub mod session;

// Re-export commonly used types
pub use config::Config;
pub use dialogue::{
    DialogueError, DialogueEvent, DialogueState, DialogueStateMachine, ExtractError, HttpNlpExtractor, NlpExtractor,
    Role, Turn, TurnOutcome,
};
pub use domain::{
    Candidate, Criterion, ExtractedFields, FieldUpdate, FlightCandidate, GoalProfile, HotelCandidate,
    PartialGoalFields, Plan, ProfileError, Ranked, ScoreBreakdown, Tier, Weights,
};
pub use gateway::{GatewayError, RequestGateway};
pub use planner::{
    FlightSearch, HotelSearch, HttpFlightSearch, HttpHotelSearch, PlanError, PlanningOrchestrator, SearchError,
};
pub use session::{
    AuthClient, AuthError, CredentialStore, Credentials, FileCredentialStore, HttpAuthClient, MemoryCredentialStore,
    SessionError, SessionTokenCoordinator, StoreError,
};
