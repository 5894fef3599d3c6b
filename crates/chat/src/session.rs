use std::fmt;
use std::sync::Arc;

use applyx_llm::{Responder, ResponderFuture, ResponderRequest, ResponderResult};

use crate::composer::Submission;
use crate::error::{SessionError, SessionResult, StaleDispatchSnafu};
use crate::turn::{Turn, TurnId};

/// Identifier for one submit → reply round trip.
///
/// Changes on every submit so outcomes of an older dispatch can be rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DispatchId(pub u64);

impl DispatchId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for DispatchId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "#{}", self.0)
    }
}

/// Whether a reply is outstanding. At most one dispatch is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Awaiting(DispatchId),
}

/// State transition input for the dispatch lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchTransition {
    Start(DispatchId),
    /// The dispatch resolved, successfully or not.
    Settle(DispatchId),
}

/// Rejection reason for illegal dispatch transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchTransitionRejection {
    Busy {
        active: DispatchId,
        attempted: DispatchId,
    },
    NoActiveDispatch {
        attempted: DispatchId,
    },
    DispatchMismatch {
        active: DispatchId,
        attempted: DispatchId,
    },
}

impl SessionState {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn active_dispatch(&self) -> Option<DispatchId> {
        match self {
            Self::Idle => None,
            Self::Awaiting(active) => Some(*active),
        }
    }

    /// Applies one transition deterministically.
    ///
    /// Only an idle session may start a dispatch, and only the awaited
    /// dispatch may settle it.
    pub fn apply(
        &self,
        transition: DispatchTransition,
    ) -> Result<SessionState, DispatchTransitionRejection> {
        match (self, transition) {
            (Self::Idle, DispatchTransition::Start(attempted)) => Ok(Self::Awaiting(attempted)),
            (Self::Awaiting(active), DispatchTransition::Start(attempted)) => {
                Err(DispatchTransitionRejection::Busy {
                    active: *active,
                    attempted,
                })
            }
            (Self::Awaiting(active), DispatchTransition::Settle(attempted))
                if *active == attempted =>
            {
                Ok(Self::Idle)
            }
            (Self::Awaiting(active), DispatchTransition::Settle(attempted)) => {
                Err(DispatchTransitionRejection::DispatchMismatch {
                    active: *active,
                    attempted,
                })
            }
            (Self::Idle, DispatchTransition::Settle(attempted)) => {
                Err(DispatchTransitionRejection::NoActiveDispatch { attempted })
            }
        }
    }
}

/// Routing data tying a responder outcome back to the turn that caused it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DispatchTicket {
    pub dispatch_id: DispatchId,
    pub user_turn_id: TurnId,
}

/// An issued dispatch whose reply has not been awaited yet.
///
/// Holding this does not borrow the session, so the caller stays free to
/// edit the next draft while the responder works.
pub struct PendingDispatch {
    ticket: DispatchTicket,
    reply: ResponderFuture,
}

impl PendingDispatch {
    pub fn ticket(&self) -> DispatchTicket {
        self.ticket
    }

    /// Waits for the responder. No timeout is applied.
    pub async fn resolve(self) -> DispatchOutcome {
        DispatchOutcome {
            ticket: self.ticket,
            result: self.reply.await,
        }
    }
}

impl fmt::Debug for PendingDispatch {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("PendingDispatch")
            .field("ticket", &self.ticket)
            .finish_non_exhaustive()
    }
}

/// The resolved result of a dispatch, to be applied with [`Session::settle`].
#[derive(Debug)]
pub struct DispatchOutcome {
    pub ticket: DispatchTicket,
    pub result: ResponderResult<String>,
}

/// Conversation aggregate: ordered transcript plus the single in-flight gate.
pub struct Session {
    responder: Arc<dyn Responder>,
    transcript: Vec<Turn>,
    state: SessionState,
    next_turn_id: u64,
    next_dispatch_id: u64,
}

impl Session {
    pub fn new(responder: Arc<dyn Responder>) -> Self {
        Self {
            responder,
            transcript: Vec::new(),
            state: SessionState::Idle,
            next_turn_id: 1,
            next_dispatch_id: 1,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_awaiting(&self) -> bool {
        !self.state.is_idle()
    }

    pub fn transcript(&self) -> &[Turn] {
        &self.transcript
    }

    pub fn responder(&self) -> &Arc<dyn Responder> {
        &self.responder
    }

    /// Records the user turn and issues the dispatch.
    ///
    /// The user turn is in the transcript before the responder is called.
    /// While a reply is pending this fails with `Busy` and hands the
    /// submission back untouched.
    pub fn submit(&mut self, submission: Submission) -> SessionResult<PendingDispatch> {
        let dispatch_id = DispatchId::new(self.next_dispatch_id);
        self.state = match self.state.apply(DispatchTransition::Start(dispatch_id)) {
            Ok(next) => next,
            Err(rejection) => {
                tracing::debug!(?rejection, "submit rejected while awaiting a reply");
                return Err(SessionError::Busy {
                    stage: "session-submit",
                    active: self.state.active_dispatch().unwrap_or(dispatch_id),
                    submission: Box::new(submission),
                });
            }
        };
        // Reserve immediately so a later submit never reuses this id.
        self.next_dispatch_id = self.next_dispatch_id.saturating_add(1);

        let attachment_names = submission.attachment_names();
        let (text, attachments) = submission.into_parts();
        let user_turn_id = self.alloc_turn_id();
        self.transcript
            .push(Turn::user(user_turn_id, text.clone(), attachment_names));

        tracing::info!(
            %dispatch_id,
            turn_id = %user_turn_id,
            attachment_count = attachments.len(),
            responder = self.responder.name(),
            "dispatching submission"
        );

        let request = ResponderRequest::new(
            text,
            attachments
                .into_iter()
                .map(|attachment| attachment.into_request())
                .collect(),
        );
        let reply = self.responder.respond(request);

        Ok(PendingDispatch {
            ticket: DispatchTicket {
                dispatch_id,
                user_turn_id,
            },
            reply,
        })
    }

    /// Applies a resolved dispatch.
    ///
    /// Success appends the agent turn. Failure appends nothing and reports
    /// `DispatchFailed`. Either way the session is idle again afterwards.
    pub fn settle(&mut self, outcome: DispatchOutcome) -> SessionResult<&Turn> {
        let DispatchOutcome { ticket, result } = outcome;
        let dispatch_id = ticket.dispatch_id;

        match self.state.apply(DispatchTransition::Settle(dispatch_id)) {
            Ok(next) => self.state = next,
            Err(rejection) => {
                tracing::warn!(?rejection, "ignoring outcome for a dispatch that is not awaited");
                return StaleDispatchSnafu {
                    stage: "session-settle",
                    expected: self.state.active_dispatch(),
                    received: dispatch_id,
                }
                .fail();
            }
        }

        match result {
            Ok(content) => {
                let turn_id = self.alloc_turn_id();
                self.transcript.push(Turn::agent(turn_id, content));
                tracing::info!(
                    %dispatch_id,
                    turn_id = %turn_id,
                    reply_to = %ticket.user_turn_id,
                    "agent reply appended"
                );
                Ok(&self.transcript[self.transcript.len() - 1])
            }
            Err(error) => {
                tracing::warn!(
                    %dispatch_id,
                    reply_to = %ticket.user_turn_id,
                    error = %error,
                    "dispatch failed"
                );
                Err(SessionError::DispatchFailed {
                    stage: "session-settle",
                    dispatch_id,
                    message: error.to_string(),
                    source: error,
                })
            }
        }
    }

    /// Submits and awaits the reply in one step.
    pub async fn submit_and_settle(&mut self, submission: Submission) -> SessionResult<&Turn> {
        let pending = self.submit(submission)?;
        let outcome = pending.resolve().await;
        self.settle(outcome)
    }

    fn alloc_turn_id(&mut self) -> TurnId {
        let id = TurnId::new(self.next_turn_id);
        self.next_turn_id = self.next_turn_id.saturating_add(1);
        id
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Session")
            .field("responder", &self.responder.name())
            .field("state", &self.state)
            .field("turns", &self.transcript.len())
            .finish()
    }
}
