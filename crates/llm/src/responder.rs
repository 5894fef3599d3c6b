use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use snafu::Snafu;

pub const PDF_MIME_TYPE: &str = "application/pdf";

/// Backend family used to answer submitted turns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponderKind {
    /// Local simulated backend.
    #[default]
    Echo,
    /// Multipart `POST /apply` endpoint.
    Http,
    /// OpenAI-compatible chat model through rig.
    Openai,
}

impl ResponderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Echo => "echo",
            Self::Http => "http",
            Self::Openai => "openai",
        }
    }
}

impl fmt::Display for ResponderKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl FromStr for ResponderKind {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "echo" => Ok(Self::Echo),
            "http" => Ok(Self::Http),
            "openai" | "rig-openai" => Ok(Self::Openai),
            other => Err(format!(
                "unknown responder '{other}', expected one of: echo, http, openai"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponderConfig {
    pub kind: ResponderKind,
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    pub preamble: Option<String>,
    pub echo_delay_ms: u64,
}

impl ResponderConfig {
    pub fn new(kind: ResponderKind, endpoint: impl Into<String>) -> Self {
        Self {
            kind,
            endpoint: endpoint.into().trim().to_string(),
            api_key: String::new(),
            model: String::new(),
            preamble: None,
            echo_delay_ms: 0,
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = api_key.into().trim().to_string();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into().trim().to_string();
        self
    }

    pub fn with_preamble(mut self, preamble: impl Into<String>) -> Self {
        self.preamble = Some(preamble.into());
        self
    }

    pub fn with_echo_delay_ms(mut self, delay_ms: u64) -> Self {
        self.echo_delay_ms = delay_ms;
        self
    }
}

/// One binary attachment handed over to a responder.
///
/// The content handle is shared, so cloning a request never copies file bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct RequestAttachment {
    pub name: String,
    pub mime_type: String,
    pub content: Arc<[u8]>,
}

impl RequestAttachment {
    pub fn new(
        name: impl Into<String>,
        mime_type: impl Into<String>,
        content: impl Into<Arc<[u8]>>,
    ) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            content: content.into(),
        }
    }

    pub fn size_bytes(&self) -> usize {
        self.content.len()
    }
}

impl fmt::Debug for RequestAttachment {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("RequestAttachment")
            .field("name", &self.name)
            .field("mime_type", &self.mime_type)
            .field("size_bytes", &self.content.len())
            .finish()
    }
}

/// Text plus attachments for a single dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResponderRequest {
    pub text: String,
    pub attachments: Vec<RequestAttachment>,
}

impl ResponderRequest {
    pub fn new(text: impl Into<String>, attachments: Vec<RequestAttachment>) -> Self {
        Self {
            text: text.into(),
            attachments,
        }
    }

    pub fn has_text(&self) -> bool {
        !self.text.trim().is_empty()
    }
}

pub type ResponderResult<T> = Result<T, ResponderError>;
pub type ResponderFuture = Pin<Box<dyn Future<Output = ResponderResult<String>> + Send + 'static>>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ResponderError {
    #[snafu(display("missing API key for responder '{kind}'"))]
    MissingApiKey {
        stage: &'static str,
        kind: ResponderKind,
    },
    #[snafu(display("responder endpoint '{endpoint}' is invalid on `{stage}`"))]
    InvalidEndpoint {
        stage: &'static str,
        endpoint: String,
    },
    #[snafu(display("request has neither text nor attachments"))]
    EmptyPrompt { stage: &'static str },
    #[snafu(display("transport failed on `{stage}`, {source}"))]
    Transport {
        stage: &'static str,
        source: reqwest::Error,
    },
    #[snafu(display("responder returned status {status}: {detail}"))]
    Status {
        stage: &'static str,
        status: u16,
        detail: String,
    },
    #[snafu(display("failed to decode responder payload on `{stage}`: {source}"))]
    Decode {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("http client failed on `{stage}`, {source}"))]
    HttpClient {
        stage: &'static str,
        source: rig::http_client::Error,
    },
    #[snafu(display("completions failed on `{stage}`, {source}"))]
    CompletionsFailed {
        stage: &'static str,
        source: rig::completion::CompletionError,
    },
    #[snafu(display("apply endpoint needs one resume attachment, got none"))]
    MissingResume { stage: &'static str },
    #[snafu(display("apply endpoint takes a single resume, got {count} attachments"))]
    MultipleResumes { stage: &'static str, count: usize },
    /// Failure raised by a responder implemented outside this crate.
    #[snafu(display("{source}"))]
    Custom {
        stage: &'static str,
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },
}

impl ResponderError {
    pub fn custom(
        stage: &'static str,
        source: impl Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
    ) -> Self {
        Self::Custom {
            stage,
            source: source.into(),
        }
    }

    /// The wrapped error of a `Custom` failure.
    pub fn custom_source(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        match self {
            Self::Custom { source, .. } => Some(&**source),
            _ => None,
        }
    }
}

/// Asynchronous service producing agent content for a submitted turn.
///
/// The returned future owns everything it needs, so callers may hold it while
/// continuing to mutate their own state.
pub trait Responder: Send + Sync {
    fn kind(&self) -> ResponderKind;
    fn name(&self) -> &str;
    fn respond(&self, request: ResponderRequest) -> ResponderFuture;
}
