use std::fmt;
use std::sync::Arc;

use applyx_llm::{PDF_MIME_TYPE, RequestAttachment};

/// Uploads must stay strictly below this size.
pub const DEFAULT_MAX_ATTACHMENT_BYTES: u64 = 10 * 1024 * 1024;
pub const PDF_EXTENSION: &str = ".pdf";

/// Identity of one pending attachment, unique per add call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttachmentId(pub u64);

impl AttachmentId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for AttachmentId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// A file offered to the composer, not yet validated.
#[derive(Clone)]
pub struct FileCandidate {
    pub name: String,
    pub size_bytes: u64,
    pub declared_type: Option<String>,
    pub content: Arc<[u8]>,
}

impl FileCandidate {
    pub fn new(name: impl Into<String>, size_bytes: u64, content: impl Into<Arc<[u8]>>) -> Self {
        Self {
            name: name.into(),
            size_bytes,
            declared_type: None,
            content: content.into(),
        }
    }

    /// Builds a candidate whose size is the length of `content`.
    pub fn from_bytes(name: impl Into<String>, content: impl Into<Arc<[u8]>>) -> Self {
        let content = content.into();
        Self::new(name, content.len() as u64, content)
    }

    pub fn with_declared_type(mut self, declared_type: impl Into<String>) -> Self {
        self.declared_type = Some(declared_type.into());
        self
    }
}

impl fmt::Debug for FileCandidate {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("FileCandidate")
            .field("name", &self.name)
            .field("size_bytes", &self.size_bytes)
            .field("declared_type", &self.declared_type)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttachmentRejection {
    UnsupportedType,
    TooLarge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttachmentVerdict {
    Accepted,
    Rejected(AttachmentRejection),
}

impl AttachmentVerdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }
}

/// Acceptance rules applied when a file is added to the draft.
///
/// Checks run in order and the first failure wins: document type first, then
/// size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentPolicy {
    pub max_size_bytes: u64,
}

impl Default for AttachmentPolicy {
    fn default() -> Self {
        Self {
            max_size_bytes: DEFAULT_MAX_ATTACHMENT_BYTES,
        }
    }
}

impl AttachmentPolicy {
    pub fn new(max_size_bytes: u64) -> Self {
        Self { max_size_bytes }
    }

    pub fn verdict(&self, candidate: &FileCandidate) -> AttachmentVerdict {
        if !Self::is_pdf(candidate) {
            return AttachmentVerdict::Rejected(AttachmentRejection::UnsupportedType);
        }

        if candidate.size_bytes >= self.max_size_bytes {
            return AttachmentVerdict::Rejected(AttachmentRejection::TooLarge);
        }

        AttachmentVerdict::Accepted
    }

    fn is_pdf(candidate: &FileCandidate) -> bool {
        let declared_pdf = candidate
            .declared_type
            .as_deref()
            .is_some_and(|declared| declared.trim().eq_ignore_ascii_case(PDF_MIME_TYPE));

        declared_pdf || has_pdf_extension(&candidate.name)
    }
}

fn has_pdf_extension(name: &str) -> bool {
    name.len() >= PDF_EXTENSION.len()
        && name
            .get(name.len() - PDF_EXTENSION.len()..)
            .is_some_and(|suffix| suffix.eq_ignore_ascii_case(PDF_EXTENSION))
}

/// An accepted file waiting in the draft, later moved into a submission.
#[derive(Clone, PartialEq, Eq)]
pub struct Attachment {
    id: AttachmentId,
    name: String,
    size_bytes: u64,
    content: Arc<[u8]>,
}

impl Attachment {
    pub(crate) fn accept(id: AttachmentId, candidate: FileCandidate) -> Self {
        Self {
            id,
            name: candidate.name,
            size_bytes: candidate.size_bytes,
            content: candidate.content,
        }
    }

    pub fn id(&self) -> AttachmentId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    /// Hands the content over for dispatch; only the PDF type ever gets this far.
    pub fn into_request(self) -> RequestAttachment {
        RequestAttachment::new(self.name, PDF_MIME_TYPE, self.content)
    }
}

impl fmt::Debug for Attachment {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Attachment")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("size_bytes", &self.size_bytes)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIB: u64 = 1024 * 1024;

    fn candidate(name: &str, size_bytes: u64) -> FileCandidate {
        FileCandidate::new(name, size_bytes, Vec::<u8>::new())
    }

    #[test]
    fn accepts_pdf_by_extension_or_declared_type() {
        let policy = AttachmentPolicy::default();

        assert!(policy.verdict(&candidate("resume.pdf", 1024)).is_accepted());
        assert!(policy.verdict(&candidate("RESUME.PDF", 1024)).is_accepted());
        assert!(
            policy
                .verdict(&candidate("scan", 1024).with_declared_type("application/pdf"))
                .is_accepted()
        );
        assert!(
            policy
                .verdict(
                    &candidate("resume.pdf", 1024).with_declared_type("application/octet-stream")
                )
                .is_accepted()
        );
    }

    #[test]
    fn rejects_other_document_types() {
        let policy = AttachmentPolicy::default();

        for name in ["resume.docx", "resume.pdf.txt", "pdf", "notes"] {
            assert_eq!(
                policy.verdict(&candidate(name, 10)),
                AttachmentVerdict::Rejected(AttachmentRejection::UnsupportedType),
                "{name} should be rejected"
            );
        }
        assert_eq!(
            policy.verdict(&candidate("resume.docx", 10).with_declared_type("application/msword")),
            AttachmentVerdict::Rejected(AttachmentRejection::UnsupportedType)
        );
    }

    #[test]
    fn size_limit_is_exclusive() {
        let policy = AttachmentPolicy::default();

        assert!(policy.verdict(&candidate("a.pdf", 10 * MIB - 1)).is_accepted());
        assert_eq!(
            policy.verdict(&candidate("a.pdf", 10 * MIB)),
            AttachmentVerdict::Rejected(AttachmentRejection::TooLarge)
        );
        assert_eq!(
            policy.verdict(&candidate("resume.pdf", 12 * MIB)),
            AttachmentVerdict::Rejected(AttachmentRejection::TooLarge)
        );
    }

    #[test]
    fn type_check_wins_over_size_check() {
        let policy = AttachmentPolicy::default();

        assert_eq!(
            policy.verdict(&candidate("huge.docx", 50 * MIB)),
            AttachmentVerdict::Rejected(AttachmentRejection::UnsupportedType)
        );
    }

    #[test]
    fn request_attachment_shares_content() {
        let content: Arc<[u8]> = Arc::from(b"%PDF-1.4".as_slice());
        let attachment = Attachment::accept(
            AttachmentId::new(7),
            FileCandidate::new("cv.pdf", 8, content.clone()),
        );

        let request = attachment.into_request();
        assert_eq!(request.name, "cv.pdf");
        assert_eq!(request.mime_type, PDF_MIME_TYPE);
        assert!(Arc::ptr_eq(&request.content, &content));
    }
}
