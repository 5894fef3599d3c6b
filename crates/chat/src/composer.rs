use snafu::ensure;

use crate::attachment::{
    Attachment, AttachmentId, AttachmentPolicy, AttachmentRejection, AttachmentVerdict,
    FileCandidate,
};
use crate::error::{
    ComposerError, ComposerResult, NotFoundSnafu, NotSubmittableSnafu, TooLargeSnafu,
    UnsupportedTypeSnafu,
};
use crate::session::SessionState;

/// Frozen snapshot of a draft, produced by [`Composer::commit`].
///
/// Owns the attachment content it was committed with; the composer keeps no
/// reference to it afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    text: String,
    attachments: Vec<Attachment>,
}

impl Submission {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }

    pub fn attachment_names(&self) -> Vec<String> {
        self.attachments
            .iter()
            .map(|attachment| attachment.name().to_string())
            .collect()
    }

    pub fn into_parts(self) -> (String, Vec<Attachment>) {
        (self.text, self.attachments)
    }
}

/// Mutable draft: text buffer plus pending attachments.
#[derive(Debug, Default)]
pub struct Composer {
    text: String,
    pending: Vec<Attachment>,
    policy: AttachmentPolicy,
    next_attachment_id: u64,
}

impl Composer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(policy: AttachmentPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    pub fn policy(&self) -> &AttachmentPolicy {
        &self.policy
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }

    pub fn pending(&self) -> &[Attachment] {
        &self.pending
    }

    pub fn add_attachment(&mut self, candidate: FileCandidate) -> ComposerResult<AttachmentId> {
        match self.policy.verdict(&candidate) {
            AttachmentVerdict::Accepted => {}
            AttachmentVerdict::Rejected(rejection) => {
                tracing::debug!(
                    name = %candidate.name,
                    size_bytes = candidate.size_bytes,
                    ?rejection,
                    "attachment rejected"
                );
                return Err(self.rejection_error(rejection, candidate));
            }
        }

        let id = AttachmentId::new(self.next_attachment_id);
        self.next_attachment_id = self.next_attachment_id.saturating_add(1);
        self.pending.push(Attachment::accept(id, candidate));
        Ok(id)
    }

    fn rejection_error(
        &self,
        rejection: AttachmentRejection,
        candidate: FileCandidate,
    ) -> ComposerError {
        match rejection {
            AttachmentRejection::UnsupportedType => UnsupportedTypeSnafu {
                stage: "add-attachment-type",
                name: candidate.name,
                declared_type: candidate.declared_type,
            }
            .build(),
            AttachmentRejection::TooLarge => TooLargeSnafu {
                stage: "add-attachment-size",
                name: candidate.name,
                size_bytes: candidate.size_bytes,
                limit_bytes: self.policy.max_size_bytes,
            }
            .build(),
        }
    }

    pub fn remove_attachment(&mut self, id: AttachmentId) -> ComposerResult<Attachment> {
        let Some(index) = self
            .pending
            .iter()
            .position(|attachment| attachment.id() == id)
        else {
            return NotFoundSnafu {
                stage: "remove-attachment",
                id,
            }
            .fail();
        };

        Ok(self.pending.remove(index))
    }

    /// True when the draft has non-blank text or at least one attachment.
    pub fn has_content(&self) -> bool {
        !self.text.trim().is_empty() || !self.pending.is_empty()
    }

    pub fn can_submit(&self, state: &SessionState) -> bool {
        self.has_content() && state.is_idle()
    }

    /// Freezes the draft into a submission and clears it.
    pub fn commit(&mut self, state: &SessionState) -> ComposerResult<Submission> {
        ensure!(
            self.has_content(),
            NotSubmittableSnafu {
                stage: "commit-draft",
                reason: "draft has no text and no attachments",
            }
        );
        ensure!(
            state.is_idle(),
            NotSubmittableSnafu {
                stage: "commit-draft",
                reason: "a reply is still pending",
            }
        );

        Ok(Submission {
            text: std::mem::take(&mut self.text),
            attachments: std::mem::take(&mut self.pending),
        })
    }

    /// Puts a submission that could not be dispatched back into the draft.
    ///
    /// Restored content goes first, ahead of anything added since. When both
    /// the submission and the current draft have text, the two are joined by
    /// a blank line so neither is lost.
    pub fn restore(&mut self, submission: Submission) {
        let (text, mut attachments) = submission.into_parts();
        if self.text.trim().is_empty() {
            self.text = text;
        } else if !text.trim().is_empty() {
            self.text = format!("{text}\n\n{}", self.text);
        }
        attachments.append(&mut self.pending);
        self.pending = attachments;
    }
}
