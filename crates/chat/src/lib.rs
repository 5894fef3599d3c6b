#![deny(unsafe_code)]

//! Draft composition and the single-in-flight conversation session.
//!
//! A [`Composer`] owns the mutable draft and gates what may be sent. Committing
//! it yields a frozen [`Submission`] that a [`Session`] turns into an
//! append-only [`Turn`] before dispatching it to a responder.

/// Attachment identity and acceptance policy.
pub mod attachment;
pub mod composer;
pub mod error;
/// Transcript ownership and the Idle/Awaiting dispatch lifecycle.
pub mod session;
pub mod turn;

pub use attachment::{
    Attachment, AttachmentId, AttachmentPolicy, AttachmentRejection, AttachmentVerdict,
    DEFAULT_MAX_ATTACHMENT_BYTES, FileCandidate, PDF_EXTENSION,
};
pub use composer::{Composer, Submission};
pub use error::{ComposerError, ComposerResult, SessionError, SessionResult};
pub use session::{
    DispatchId, DispatchOutcome, DispatchTicket, DispatchTransition,
    DispatchTransitionRejection, PendingDispatch, Session, SessionState,
};
pub use turn::{Role, Turn, TurnId};
