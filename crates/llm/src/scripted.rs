use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use snafu::Snafu;
use tokio::sync::oneshot;

use super::responder::{
    Responder, ResponderError, ResponderFuture, ResponderKind, ResponderRequest, ResponderResult,
};

/// One queued outcome for [`ScriptedResponder`].
pub enum ScriptStep {
    Reply(String),
    Fail(String),
    /// Resolves only when the paired sender fires, letting tests hold a
    /// dispatch open for as long as they need.
    Gated(oneshot::Receiver<ResponderResult<String>>),
}

/// Failures produced by [`ScriptedResponder`].
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ScriptError {
    #[snafu(display("{message}"))]
    Failed { message: String },
    #[snafu(display("responder script exhausted after {calls} call(s)"))]
    Exhausted { calls: usize },
}

impl ScriptError {
    /// Recovers the script error carried by a responder failure.
    pub fn from_responder(error: &ResponderError) -> Option<&ScriptError> {
        error.custom_source()?.downcast_ref::<ScriptError>()
    }
}

/// Pre-scripted responder for tests.
///
/// Each call to `respond` pops the next step from the front of the queue and
/// records the request it was given.
#[derive(Clone, Default)]
pub struct ScriptedResponder {
    steps: Arc<Mutex<VecDeque<ScriptStep>>>,
    requests: Arc<Mutex<Vec<ResponderRequest>>>,
}

impl ScriptedResponder {
    pub fn new(steps: impl IntoIterator<Item = ScriptStep>) -> Self {
        Self {
            steps: Arc::new(Mutex::new(steps.into_iter().collect())),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn replying(replies: impl IntoIterator<Item = &'static str>) -> Self {
        Self::new(
            replies
                .into_iter()
                .map(|reply| ScriptStep::Reply(reply.to_string())),
        )
    }

    /// Queues a gated step and returns the sender that resolves it.
    pub fn push_gated(&self) -> oneshot::Sender<ResponderResult<String>> {
        let (tx, rx) = oneshot::channel();
        self.push(ScriptStep::Gated(rx));
        tx
    }

    pub fn push(&self, step: ScriptStep) {
        self.steps
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push_back(step);
    }

    pub fn requests(&self) -> Vec<ResponderRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn failure(message: impl Into<String>) -> ResponderError {
        ResponderError::custom(
            "scripted-failure",
            ScriptError::Failed {
                message: message.into(),
            },
        )
    }
}

impl Responder for ScriptedResponder {
    fn kind(&self) -> ResponderKind {
        ResponderKind::Echo
    }

    fn name(&self) -> &str {
        "Scripted"
    }

    fn respond(&self, request: ResponderRequest) -> ResponderFuture {
        let calls = {
            let mut requests = self
                .requests
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            requests.push(request);
            requests.len()
        };
        let step = self
            .steps
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop_front();

        Box::pin(async move {
            match step {
                Some(ScriptStep::Reply(content)) => Ok(content),
                Some(ScriptStep::Fail(message)) => Err(Self::failure(message)),
                Some(ScriptStep::Gated(gate)) => match gate.await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(Self::failure("gate dropped before resolving")),
                },
                None => Err(ResponderError::custom(
                    "scripted-respond",
                    ScriptError::Exhausted { calls },
                )),
            }
        })
    }
}
