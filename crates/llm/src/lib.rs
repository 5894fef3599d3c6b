use std::sync::Arc;
use std::time::Duration;

mod echo;
mod http;
mod responder;
mod rig_adapter;
#[cfg(any(test, feature = "test-util"))]
mod scripted;

pub use echo::{DEFAULT_ECHO_DELAY, ECHO_RESPONDER_NAME, EchoResponder};
pub use http::{
    APPLY_PATH, DEFAULT_HTTP_ENDPOINT, HTTP_RESPONDER_NAME, HttpResponder, PROMPT_FIELD,
    RESUME_FIELD,
};
pub use responder::{
    PDF_MIME_TYPE, RequestAttachment, Responder, ResponderConfig, ResponderError,
    ResponderFuture, ResponderKind, ResponderRequest, ResponderResult,
};
pub use rig_adapter::{
    DEFAULT_OPENAI_ENDPOINT, DEFAULT_OPENAI_MODEL, RIG_OPENAI_RESPONDER_NAME, RigResponder,
};
#[cfg(any(test, feature = "test-util"))]
pub use scripted::{ScriptError, ScriptStep, ScriptedResponder};

pub fn create_responder(config: ResponderConfig) -> ResponderResult<Arc<dyn Responder>> {
    let responder: Arc<dyn Responder> = match config.kind {
        ResponderKind::Echo => Arc::new(EchoResponder::new(Duration::from_millis(
            config.echo_delay_ms,
        ))),
        ResponderKind::Http => {
            let endpoint = if config.endpoint.is_empty() {
                DEFAULT_HTTP_ENDPOINT
            } else {
                config.endpoint.as_str()
            };
            Arc::new(HttpResponder::new(endpoint)?)
        }
        ResponderKind::Openai => Arc::new(RigResponder::new(config)?),
    };

    tracing::info!(
        kind = %responder.kind(),
        name = responder.name(),
        "responder ready"
    );
    Ok(responder)
}
