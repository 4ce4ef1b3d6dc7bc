//! Attendance session state machine.
//!
//! One [`SessionState`] lives for one run. The frame loop calls
//! [`SessionState::advance`] once per processed frame with that frame's
//! recognition result and the sampled confirmation answer, and carries out the
//! returned [`Action`]. The state machine itself does no I/O.
//!
//! ```text
//! Active ──identity──▶ PendingConfirmation ──Yes──▶ Marked ──10s──▶ AlreadyMarked ──5s──▶ Terminated
//!    ▲                          │
//!    └──────── 30s without ─────┘
//!              re-recognition
//! ```

use crate::prompt::{ConfirmationResponse, PromptKey};
use crate::types::{Person, PersonId, RecognitionEvent};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

/// Session mode. Moves strictly forward, except PendingConfirmation → Active on timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Active,
    PendingConfirmation,
    Marked,
    AlreadyMarked,
    Terminated,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Mode::Active => "Active",
            Mode::PendingConfirmation => "Pending Confirmation",
            Mode::Marked => "Marked",
            Mode::AlreadyMarked => "Already Marked",
            Mode::Terminated => "Terminated",
        };
        f.write_str(s)
    }
}

/// What to do when the user answers "No" to a confirmation prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeclinePolicy {
    /// Mint a fresh prompt key and ask again. The recognition deadline is kept.
    #[default]
    Rearm,
    /// Withdraw the prompt and do not ask that person again until the candidate is abandoned.
    HoldUntilTimeout,
}

/// Stage timeouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTimeouts {
    /// Candidate is abandoned when not re-recognized within this window.
    pub recognition_window: Duration,
    /// Time spent in Marked before moving to AlreadyMarked.
    pub marked_hold: Duration,
    /// Time spent in AlreadyMarked before the session terminates.
    pub already_marked_hold: Duration,
}

impl Default for SessionTimeouts {
    fn default() -> Self {
        Self {
            recognition_window: Duration::from_secs(30),
            marked_hold: Duration::from_secs(10),
            already_marked_hold: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionConfig {
    pub timeouts: SessionTimeouts,
    pub decline_policy: DeclinePolicy,
}

/// Timing report emitted when the session terminates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    /// From session start to the confirmed commit.
    pub time_taken_to_mark: Duration,
    /// From session start to termination.
    pub total_time: Duration,
}

/// The single control action for one frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Nothing beyond the frame's face overlays.
    Idle,
    /// Show (or keep showing) the confirmation prompt identified by `key`.
    ShowPrompt { key: PromptKey, question: String },
    /// Append the attendance record for `person` and tell the user.
    CommitAndNotify { person: Person },
    /// The candidate was not re-recognized in time and has been dropped.
    ReportTimeoutMessage { abandoned: PersonId },
    /// Session is over; stop processing frames.
    Terminate(SessionSummary),
}

/// The person currently awaiting confirmation.
#[derive(Debug, Clone)]
struct Candidate {
    person: Person,
    /// `None` once the prompt has been withdrawn under [`DeclinePolicy::HoldUntilTimeout`].
    prompt: Option<PromptKey>,
    deadline: Instant,
}

/// Mutable state of one attendance session.
#[derive(Debug, Clone)]
pub struct SessionState {
    config: SessionConfig,
    mode: Mode,
    candidate: Option<Candidate>,
    session_start: Instant,
    marked_at: Option<Instant>,
    already_marked_at: Option<Instant>,
    /// Answers given in the current confirmation cycle. A record for status
    /// and logs only; transitions read `Candidate::prompt`, never this map.
    answered_for: HashMap<PersonId, ConfirmationResponse>,
    prompt_seq: u32,
}

impl SessionState {
    pub fn new(config: SessionConfig, session_start: Instant) -> Self {
        Self {
            config,
            mode: Mode::Active,
            candidate: None,
            session_start,
            marked_at: None,
            already_marked_at: None,
            answered_for: HashMap::new(),
            prompt_seq: 0,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn candidate(&self) -> Option<&Person> {
        self.candidate.as_ref().map(|c| &c.person)
    }

    /// Key of the prompt currently shown, if any.
    pub fn active_prompt(&self) -> Option<&PromptKey> {
        self.candidate.as_ref().and_then(|c| c.prompt.as_ref())
    }

    pub fn recognition_deadline(&self) -> Option<Instant> {
        self.candidate.as_ref().map(|c| c.deadline)
    }

    pub fn session_start(&self) -> Instant {
        self.session_start
    }

    pub fn marked_at(&self) -> Option<Instant> {
        self.marked_at
    }

    pub fn already_marked_at(&self) -> Option<Instant> {
        self.already_marked_at
    }

    /// Last answer given for `person` in the current confirmation cycle.
    ///
    /// Informational: withdrawal under [`DeclinePolicy::HoldUntilTimeout`] is
    /// carried by the candidate's prompt, and the record is cleared on abandonment.
    pub fn answered_for(&self, person: &PersonId) -> Option<ConfirmationResponse> {
        self.answered_for.get(person).copied()
    }

    pub fn is_terminated(&self) -> bool {
        self.mode == Mode::Terminated
    }

    /// Advance the session by one frame.
    pub fn advance(
        mut self,
        recognition: &RecognitionEvent,
        confirmation: ConfirmationResponse,
        now: Instant,
    ) -> (SessionState, Action) {
        let action = match self.mode {
            Mode::Active => self.on_active(recognition, now),
            Mode::PendingConfirmation => self.on_pending(recognition, confirmation, now),
            Mode::Marked => self.on_marked(now),
            Mode::AlreadyMarked => self.on_already_marked(now),
            Mode::Terminated => Action::Idle,
        };
        (self, action)
    }

    fn on_active(&mut self, recognition: &RecognitionEvent, now: Instant) -> Action {
        let Some(person) = recognition.identity.clone() else {
            return Action::Idle;
        };

        let key = self.mint_prompt(&person.id);
        let question = question_for(&person);
        tracing::info!(
            person = %person.id,
            prompt = %key,
            confidence = recognition.confidence,
            "candidate recognized; awaiting confirmation"
        );

        self.candidate = Some(Candidate {
            person,
            prompt: Some(key.clone()),
            deadline: now + self.config.timeouts.recognition_window,
        });
        self.mode = Mode::PendingConfirmation;
        Action::ShowPrompt { key, question }
    }

    fn on_pending(
        &mut self,
        recognition: &RecognitionEvent,
        confirmation: ConfirmationResponse,
        now: Instant,
    ) -> Action {
        let Some(mut candidate) = self.candidate.take() else {
            // Unreachable while the candidate invariant holds; recover to Active.
            tracing::warn!("pending confirmation without a candidate; resetting to active");
            self.mode = Mode::Active;
            return Action::Idle;
        };

        let re_recognized = recognition
            .identity
            .as_ref()
            .is_some_and(|p| p.id == candidate.person.id);
        if re_recognized {
            candidate.deadline = now + self.config.timeouts.recognition_window;
        }

        // Answers only count while a prompt is actually shown.
        let answer = if candidate.prompt.is_some() {
            confirmation
        } else {
            ConfirmationResponse::Pending
        };

        if answer == ConfirmationResponse::Yes {
            return self.commit(candidate.person, now);
        }

        if now > candidate.deadline {
            tracing::info!(person = %candidate.person.id, "candidate not re-recognized in time; abandoning");
            self.answered_for.clear();
            self.mode = Mode::Active;
            return Action::ReportTimeoutMessage {
                abandoned: candidate.person.id,
            };
        }

        if answer == ConfirmationResponse::No {
            self.answered_for
                .insert(candidate.person.id.clone(), ConfirmationResponse::No);
            match self.config.decline_policy {
                DeclinePolicy::Rearm => {
                    let key = self.mint_prompt(&candidate.person.id);
                    tracing::info!(person = %candidate.person.id, prompt = %key, "declined; re-arming prompt");
                    candidate.prompt = Some(key);
                }
                DeclinePolicy::HoldUntilTimeout => {
                    tracing::info!(person = %candidate.person.id, "declined; prompt withdrawn until timeout");
                    candidate.prompt = None;
                }
            }
        }

        let action = match &candidate.prompt {
            Some(key) => Action::ShowPrompt {
                key: key.clone(),
                question: question_for(&candidate.person),
            },
            None => Action::Idle,
        };
        self.candidate = Some(candidate);
        action
    }

    fn commit(&mut self, person: Person, now: Instant) -> Action {
        tracing::info!(person = %person.id, "attendance confirmed");
        self.answered_for
            .insert(person.id.clone(), ConfirmationResponse::Yes);
        self.marked_at = Some(now);
        self.mode = Mode::Marked;
        Action::CommitAndNotify { person }
    }

    fn on_marked(&mut self, now: Instant) -> Action {
        let Some(marked_at) = self.marked_at else {
            return Action::Idle;
        };
        if now.saturating_duration_since(marked_at) >= self.config.timeouts.marked_hold {
            tracing::info!("mode: already marked");
            self.already_marked_at = Some(now);
            self.mode = Mode::AlreadyMarked;
        }
        Action::Idle
    }

    fn on_already_marked(&mut self, now: Instant) -> Action {
        let (Some(marked_at), Some(already_marked_at)) = (self.marked_at, self.already_marked_at)
        else {
            return Action::Idle;
        };
        if now.saturating_duration_since(already_marked_at)
            < self.config.timeouts.already_marked_hold
        {
            return Action::Idle;
        }

        let summary = SessionSummary {
            time_taken_to_mark: marked_at.saturating_duration_since(self.session_start),
            total_time: now.saturating_duration_since(self.session_start),
        };
        tracing::info!(
            time_taken_to_mark = ?summary.time_taken_to_mark,
            total_time = ?summary.total_time,
            "session terminated"
        );
        self.mode = Mode::Terminated;
        Action::Terminate(summary)
    }

    fn mint_prompt(&mut self, person: &PersonId) -> PromptKey {
        self.prompt_seq += 1;
        PromptKey {
            person: person.clone(),
            seq: self.prompt_seq,
        }
    }
}

fn question_for(person: &Person) -> String {
    format!("Are you {}?", person.full_name())
}
