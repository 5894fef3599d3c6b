use applyx_llm::ResponderError;
use snafu::Snafu;

use crate::attachment::AttachmentId;
use crate::composer::Submission;
use crate::session::DispatchId;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ComposerError {
    #[snafu(display("'{name}' is not a PDF document"))]
    UnsupportedType {
        stage: &'static str,
        name: String,
        declared_type: Option<String>,
    },
    #[snafu(display("'{name}' is {size_bytes} bytes, files must be smaller than {limit_bytes} bytes"))]
    TooLarge {
        stage: &'static str,
        name: String,
        size_bytes: u64,
        limit_bytes: u64,
    },
    #[snafu(display("attachment {id} is not pending"))]
    NotFound {
        stage: &'static str,
        id: AttachmentId,
    },
    #[snafu(display("draft cannot be submitted: {reason}"))]
    NotSubmittable {
        stage: &'static str,
        reason: &'static str,
    },
}

pub type ComposerResult<T> = Result<T, ComposerError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SessionError {
    #[snafu(display("still awaiting the reply to dispatch {active}"))]
    Busy {
        stage: &'static str,
        active: DispatchId,
        submission: Box<Submission>,
    },
    #[snafu(display("dispatch {dispatch_id} failed: {message}"))]
    DispatchFailed {
        stage: &'static str,
        dispatch_id: DispatchId,
        message: String,
        source: ResponderError,
    },
    #[snafu(display("outcome for dispatch {received} does not match the awaited dispatch"))]
    StaleDispatch {
        stage: &'static str,
        expected: Option<DispatchId>,
        received: DispatchId,
    },
}

impl SessionError {
    /// Returns the submission a `Busy` rejection handed back, so the caller
    /// can restore it into the draft.
    pub fn into_submission(self) -> Option<Submission> {
        match self {
            Self::Busy { submission, .. } => Some(*submission),
            Self::DispatchFailed { .. } | Self::StaleDispatch { .. } => None,
        }
    }
}

pub type SessionResult<T> = Result<T, SessionError>;
