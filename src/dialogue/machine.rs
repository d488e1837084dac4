//! Dialogue state machine
//!
//! Turns free-form chat into a validated trip-search request. The machine
//! owns the conversation turns and the accumulated fields, decides when the
//! request is complete, and gates planning behind an explicit confirmation.
//!
//! State changes are all-or-nothing: nothing is mutated until the extraction
//! collaborator has answered, so a failed or canceled turn leaves the
//! conversation exactly where it was and the same text can be resubmitted.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::extractor::{ExtractError, NlpExtractor, Turn};
use crate::domain::{ExtractedFields, GoalProfile, Plan, ProfileError};
use crate::planner::{PlanError, PlanningOrchestrator};

/// Capacity of the event channel; slow UI subscribers lag rather than block
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Conversation lifecycle states
///
/// `Confirmed` onward is one-way; a new conversation is required to search
/// again after planning completes or fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogueState {
    /// Gathering required fields from utterances
    Collecting,
    /// All required fields present; awaiting confirmation
    Complete,
    /// User confirmed; goal profile frozen
    Confirmed,
    /// Planning in progress
    Planning,
    /// Plan delivered
    Done,
    /// Planning failed
    Failed,
}

/// Errors from dialogue operations
#[derive(Debug, Error)]
pub enum DialogueError {
    #[error("utterance is empty")]
    EmptyInput,

    #[error("{operation} is not allowed in state {state:?}")]
    InvalidTransition {
        operation: &'static str,
        state: DialogueState,
    },

    #[error("another operation is already in progress")]
    OperationInProgress,

    #[error(transparent)]
    ExtractionUnavailable(#[from] ExtractError),

    #[error(transparent)]
    Planning(#[from] PlanError),

    #[error("invalid goal profile: {0}")]
    Profile(#[from] ProfileError),
}

/// Change notifications for UI subscribers
#[derive(Debug, Clone)]
pub enum DialogueEvent {
    StateChanged { from: DialogueState, to: DialogueState },
    ExtractedChanged(ExtractedFields),
}

/// Result of a processed utterance
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub state: DialogueState,
    pub extracted: ExtractedFields,
    /// Required fields still missing; empty when the request is complete
    pub missing: Vec<&'static str>,
}

struct Conversation {
    turns: Vec<Turn>,
    extracted: ExtractedFields,
    state: DialogueState,
    /// Frozen at confirmation; preserved across planning failures so the
    /// plan can be replayed after re-authentication
    profile: Option<GoalProfile>,
    /// Bumped by reset() so an extraction that raced a reset is discarded
    generation: u64,
    last_activity_at: DateTime<Utc>,
}

impl Conversation {
    fn new() -> Self {
        Self {
            turns: Vec::new(),
            extracted: ExtractedFields::default(),
            state: DialogueState::Collecting,
            profile: None,
            generation: 0,
            last_activity_at: Utc::now(),
        }
    }
}

/// One chat session's state machine
pub struct DialogueStateMachine {
    session_id: String,
    started_at: DateTime<Utc>,
    extractor: Arc<dyn NlpExtractor>,
    planner: Arc<PlanningOrchestrator>,
    inner: Mutex<Conversation>,
    /// Rejects overlapping submit/confirm calls with OperationInProgress
    in_flight: AtomicBool,
    events: broadcast::Sender<DialogueEvent>,
}

impl DialogueStateMachine {
    pub fn new(extractor: Arc<dyn NlpExtractor>, planner: Arc<PlanningOrchestrator>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let session_id = format!("session_{}", &Uuid::now_v7().simple().to_string()[..16]);
        info!(%session_id, "new: conversation started");

        Self {
            session_id,
            started_at: Utc::now(),
            extractor,
            planner,
            inner: Mutex::new(Conversation::new()),
            in_flight: AtomicBool::new(false),
            events,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn last_activity_at(&self) -> DateTime<Utc> {
        self.lock().last_activity_at
    }

    pub fn state(&self) -> DialogueState {
        self.lock().state
    }

    pub fn extracted(&self) -> ExtractedFields {
        self.lock().extracted.clone()
    }

    pub fn turn_count(&self) -> usize {
        self.lock().turns.len()
    }

    /// The profile frozen at confirmation, if any
    ///
    /// Survives a planning failure so the caller can replay the plan after
    /// re-authenticating.
    pub fn frozen_profile(&self) -> Option<GoalProfile> {
        self.lock().profile.clone()
    }

    /// Subscribe to state and extraction change events
    pub fn subscribe(&self) -> broadcast::Receiver<DialogueEvent> {
        self.events.subscribe()
    }

    /// Process one user utterance
    ///
    /// Valid in `Collecting` and `Complete`. Sends the whole turn history
    /// plus accumulated fields to the extractor, merges the returned partial
    /// fields at field granularity, and recomputes completeness.
    pub async fn submit_utterance(&self, text: &str) -> Result<TurnOutcome, DialogueError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(DialogueError::EmptyInput);
        }

        let _guard = self.begin_operation()?;

        let (turns, prior, generation) = {
            let conversation = self.lock();
            match conversation.state {
                DialogueState::Collecting | DialogueState::Complete => {}
                state => {
                    return Err(DialogueError::InvalidTransition {
                        operation: "submit_utterance",
                        state,
                    });
                }
            }
            let mut turns = conversation.turns.clone();
            turns.push(Turn::user(text));
            (turns, conversation.extracted.clone(), conversation.generation)
        };

        // No conversation state is touched until extraction succeeds
        let partial = self.extractor.extract(&turns, &prior).await?;

        let (outcome, from) = {
            let mut conversation = self.lock();
            if conversation.generation != generation {
                warn!("submit_utterance: conversation was reset mid-extraction, discarding result");
                return Err(DialogueError::InvalidTransition {
                    operation: "submit_utterance",
                    state: conversation.state,
                });
            }

            conversation.turns.push(Turn::user(text));
            conversation.extracted.merge(partial);
            conversation.last_activity_at = Utc::now();

            let from = conversation.state;
            let to = if conversation.extracted.is_complete() {
                DialogueState::Complete
            } else {
                DialogueState::Collecting
            };
            conversation.state = to;

            let extracted = conversation.extracted.clone();
            let missing = extracted.missing_fields();
            (
                TurnOutcome {
                    state: to,
                    extracted,
                    missing,
                },
                from,
            )
        };

        self.emit(DialogueEvent::ExtractedChanged(outcome.extracted.clone()));
        if from != outcome.state {
            debug!(session_id = %self.session_id, ?from, to = ?outcome.state, "submit_utterance: state changed");
            self.emit(DialogueEvent::StateChanged { from, to: outcome.state });
        }

        Ok(outcome)
    }

    /// Record an assistant prompt so the extractor sees it on later turns
    pub fn push_assistant_turn(&self, text: impl Into<String>) {
        let mut conversation = self.lock();
        if matches!(conversation.state, DialogueState::Collecting | DialogueState::Complete) {
            conversation.turns.push(Turn::assistant(text));
        }
    }

    /// Confirm the completed request and run planning
    ///
    /// Valid only in `Complete`; any other state is an `InvalidTransition`,
    /// which is what defuses a double-tap from the UI - the orchestrator can
    /// never be invoked twice for one conversation.
    pub async fn confirm(&self) -> Result<Plan, DialogueError> {
        let _guard = self.begin_operation()?;

        let profile = {
            let mut conversation = self.lock();
            if conversation.state != DialogueState::Complete {
                return Err(DialogueError::InvalidTransition {
                    operation: "confirm",
                    state: conversation.state,
                });
            }

            let profile = conversation.extracted.clone().into_profile()?;
            conversation.profile = Some(profile.clone());
            conversation.last_activity_at = Utc::now();
            conversation.state = DialogueState::Planning;
            profile
        };

        self.emit(DialogueEvent::StateChanged {
            from: DialogueState::Complete,
            to: DialogueState::Confirmed,
        });
        self.emit(DialogueEvent::StateChanged {
            from: DialogueState::Confirmed,
            to: DialogueState::Planning,
        });
        info!(session_id = %self.session_id, "confirm: goal frozen, planning");

        // If this future is dropped mid-plan, the guard moves the session to
        // Failed instead of leaving it stuck in Planning
        let mut abandon_guard = AbandonGuard { machine: self, armed: true };
        let result = self.planner.plan(&profile).await;
        abandon_guard.armed = false;
        drop(abandon_guard);

        let to = match &result {
            Ok(_) => DialogueState::Done,
            Err(_) => DialogueState::Failed,
        };
        self.lock().state = to;
        self.emit(DialogueEvent::StateChanged {
            from: DialogueState::Planning,
            to,
        });

        result.map_err(DialogueError::from)
    }

    /// Return to `Collecting`, clearing turns, fields, and the frozen profile
    ///
    /// Allowed from any state except `Planning`.
    pub fn reset(&self) -> Result<(), DialogueError> {
        let from = {
            let mut conversation = self.lock();
            if conversation.state == DialogueState::Planning {
                return Err(DialogueError::InvalidTransition {
                    operation: "reset",
                    state: conversation.state,
                });
            }
            let from = conversation.state;
            let generation = conversation.generation + 1;
            *conversation = Conversation::new();
            conversation.generation = generation;
            from
        };

        info!(session_id = %self.session_id, ?from, "reset: back to collecting");
        if from != DialogueState::Collecting {
            self.emit(DialogueEvent::StateChanged {
                from,
                to: DialogueState::Collecting,
            });
        }
        self.emit(DialogueEvent::ExtractedChanged(ExtractedFields::default()));
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Conversation> {
        // Never held across an await
        self.inner.lock().expect("conversation lock poisoned")
    }

    fn begin_operation(&self) -> Result<OpGuard<'_>, DialogueError> {
        if self.in_flight.swap(true, Ordering::AcqRel) {
            return Err(DialogueError::OperationInProgress);
        }
        Ok(OpGuard { flag: &self.in_flight })
    }

    fn emit(&self, event: DialogueEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

/// Clears the in-flight flag even when the operation's future is dropped
struct OpGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for OpGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Marks the session failed if a confirm() future is dropped mid-planning
struct AbandonGuard<'a> {
    machine: &'a DialogueStateMachine,
    armed: bool,
}

impl Drop for AbandonGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut conversation = self.machine.lock();
        if conversation.state == DialogueState::Planning {
            warn!(session_id = %self.machine.session_id, "confirm was abandoned mid-planning");
            conversation.state = DialogueState::Failed;
            drop(conversation);
            self.machine.emit(DialogueEvent::StateChanged {
                from: DialogueState::Planning,
                to: DialogueState::Failed,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::domain::{Candidate, FieldUpdate, FlightCandidate, PartialGoalFields};
    use crate::planner::{FlightSearch, HotelSearch, SearchError};

    /// Extractor double fed from a script of responses
    struct ScriptedExtractor {
        script: Mutex<VecDeque<Result<PartialGoalFields, ExtractError>>>,
        delay: Duration,
    }

    impl ScriptedExtractor {
        fn new(script: Vec<Result<PartialGoalFields, ExtractError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                delay: Duration::ZERO,
            }
        }
    }

    #[async_trait]
    impl NlpExtractor for ScriptedExtractor {
        async fn extract(&self, _turns: &[Turn], _prior: &ExtractedFields) -> Result<PartialGoalFields, ExtractError> {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(PartialGoalFields::default()))
        }
    }

    struct FakeFlights {
        calls: std::sync::atomic::AtomicU32,
    }

    #[async_trait]
    impl FlightSearch for FakeFlights {
        async fn search(&self, _profile: &GoalProfile, _page: u32) -> Result<Vec<Candidate>, SearchError> {
            self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(vec![Candidate::Flight(FlightCandidate {
                price: Some(450.0),
                duration_minutes: Some(300),
                stops: Some(0),
                ..Default::default()
            })])
        }
    }

    struct FakeHotels;

    #[async_trait]
    impl HotelSearch for FakeHotels {
        async fn search(&self, _profile: &GoalProfile, _page: u32) -> Result<Vec<Candidate>, SearchError> {
            Ok(Vec::new())
        }
    }

    fn all_fields() -> PartialGoalFields {
        PartialGoalFields {
            origin: FieldUpdate::set("SFO".to_string()),
            destination: FieldUpdate::set("NYC".to_string()),
            departure_date: FieldUpdate::set(chrono::NaiveDate::from_ymd_opt(2026, 3, 14).unwrap()),
            passenger_count: FieldUpdate::set(2),
            ..Default::default()
        }
    }

    fn machine_with(
        script: Vec<Result<PartialGoalFields, ExtractError>>,
    ) -> (Arc<DialogueStateMachine>, Arc<FakeFlights>) {
        let flights = Arc::new(FakeFlights {
            calls: std::sync::atomic::AtomicU32::new(0),
        });
        let planner = Arc::new(PlanningOrchestrator::new(
            flights.clone(),
            Arc::new(FakeHotels),
            Duration::from_secs(5),
        ));
        let machine = Arc::new(DialogueStateMachine::new(
            Arc::new(ScriptedExtractor::new(script)),
            planner,
        ));
        (machine, flights)
    }

    #[tokio::test]
    async fn test_empty_utterance_rejected_before_extraction() {
        let (machine, _) = machine_with(vec![]);
        assert!(matches!(
            machine.submit_utterance("   ").await,
            Err(DialogueError::EmptyInput)
        ));
        assert_eq!(machine.turn_count(), 0);
    }

    #[tokio::test]
    async fn test_single_utterance_with_all_fields_completes() {
        let (machine, _) = machine_with(vec![Ok(all_fields())]);

        let outcome = machine.submit_utterance("SFO to NYC on March 14, 2 of us").await.unwrap();

        assert_eq!(outcome.state, DialogueState::Complete);
        assert!(outcome.missing.is_empty());
        assert_eq!(machine.state(), DialogueState::Complete);
    }

    #[tokio::test]
    async fn test_missing_field_stays_collecting() {
        let mut partial = all_fields();
        partial.passenger_count = FieldUpdate::Unchanged;
        let (machine, _) = machine_with(vec![Ok(partial)]);

        let outcome = machine.submit_utterance("SFO to NYC on March 14").await.unwrap();

        assert_eq!(outcome.state, DialogueState::Collecting);
        assert_eq!(outcome.missing, vec!["passenger-count"]);
    }

    #[tokio::test]
    async fn test_nulled_required_field_reverts_to_collecting() {
        let clear_date = PartialGoalFields {
            departure_date: FieldUpdate::Clear,
            ..Default::default()
        };
        let (machine, _) = machine_with(vec![Ok(all_fields()), Ok(clear_date)]);

        machine.submit_utterance("full request").await.unwrap();
        assert_eq!(machine.state(), DialogueState::Complete);

        let outcome = machine.submit_utterance("actually drop the date").await.unwrap();
        assert_eq!(outcome.state, DialogueState::Collecting);
        assert_eq!(outcome.missing, vec!["departure-date"]);
    }

    #[tokio::test]
    async fn test_extraction_failure_leaves_state_untouched() {
        let err = ExtractError::InvalidResponse("bad json".to_string());
        let (machine, _) = machine_with(vec![Err(err), Ok(all_fields())]);

        let before = machine.extracted();
        assert!(machine.submit_utterance("hello").await.is_err());

        assert_eq!(machine.state(), DialogueState::Collecting);
        assert_eq!(machine.extracted(), before);
        assert_eq!(machine.turn_count(), 0);

        // Retrying the same text works
        let outcome = machine.submit_utterance("hello").await.unwrap();
        assert_eq!(outcome.state, DialogueState::Complete);
    }

    #[tokio::test]
    async fn test_confirm_requires_complete() {
        let (machine, flights) = machine_with(vec![]);

        let err = machine.confirm().await.unwrap_err();
        assert!(matches!(
            err,
            DialogueError::InvalidTransition {
                operation: "confirm",
                state: DialogueState::Collecting,
            }
        ));
        assert_eq!(flights.calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_double_confirm_invokes_planner_once() {
        let (machine, flights) = machine_with(vec![Ok(all_fields())]);
        machine.submit_utterance("full request").await.unwrap();

        let plan = machine.confirm().await.unwrap();
        assert_eq!(plan.flights.len(), 1);
        assert_eq!(machine.state(), DialogueState::Done);

        let err = machine.confirm().await.unwrap_err();
        assert!(matches!(err, DialogueError::InvalidTransition { .. }));
        assert_eq!(flights.calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_confirm_freezes_profile() {
        let (machine, _) = machine_with(vec![Ok(all_fields())]);
        machine.submit_utterance("full request").await.unwrap();
        assert!(machine.frozen_profile().is_none());

        machine.confirm().await.unwrap();

        let profile = machine.frozen_profile().expect("profile should be frozen");
        assert_eq!(profile.origin, "SFO");
        assert_eq!(profile.destination, "NYC");
    }

    #[tokio::test]
    async fn test_reset_clears_everything() {
        let (machine, _) = machine_with(vec![Ok(all_fields())]);
        machine.submit_utterance("full request").await.unwrap();

        machine.reset().unwrap();

        assert_eq!(machine.state(), DialogueState::Collecting);
        assert_eq!(machine.extracted(), ExtractedFields::default());
        assert_eq!(machine.turn_count(), 0);
    }

    #[tokio::test]
    async fn test_overlapping_submits_rejected() {
        let mut extractor = ScriptedExtractor::new(vec![Ok(all_fields())]);
        extractor.delay = Duration::from_millis(100);

        let flights = Arc::new(FakeFlights {
            calls: std::sync::atomic::AtomicU32::new(0),
        });
        let planner = Arc::new(PlanningOrchestrator::new(
            flights,
            Arc::new(FakeHotels),
            Duration::from_secs(5),
        ));
        let machine = Arc::new(DialogueStateMachine::new(Arc::new(extractor), planner));

        let slow = {
            let machine = Arc::clone(&machine);
            tokio::spawn(async move { machine.submit_utterance("first").await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let err = machine.submit_utterance("second").await.unwrap_err();
        assert!(matches!(err, DialogueError::OperationInProgress));

        assert!(slow.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_events_emitted_on_completion() {
        let (machine, _) = machine_with(vec![Ok(all_fields())]);
        let mut events = machine.subscribe();

        machine.submit_utterance("full request").await.unwrap();

        let first = events.recv().await.unwrap();
        assert!(matches!(first, DialogueEvent::ExtractedChanged(_)));
        let second = events.recv().await.unwrap();
        assert!(matches!(
            second,
            DialogueEvent::StateChanged {
                from: DialogueState::Collecting,
                to: DialogueState::Complete,
            }
        ));
    }

    #[tokio::test]
    async fn test_session_id_format() {
        let (machine, _) = machine_with(vec![]);
        assert!(machine.session_id().starts_with("session_"));
        assert_eq!(machine.session_id().len(), "session_".len() + 16);
    }
}
