use std::time::Duration;

use super::responder::{Responder, ResponderFuture, ResponderKind, ResponderRequest};

pub const ECHO_RESPONDER_NAME: &str = "Echo";
pub const DEFAULT_ECHO_DELAY: Duration = Duration::from_millis(1000);

const ASSISTANT_INTRODUCTION: &str = "As the AutoApplyX assistant I can help you polish your resume, \
     match it against job postings and apply on your behalf. What would you like to do next?";

/// Offline responder that acknowledges every request after a fixed delay.
#[derive(Debug, Clone)]
pub struct EchoResponder {
    delay: Duration,
}

impl Default for EchoResponder {
    fn default() -> Self {
        Self::new(DEFAULT_ECHO_DELAY)
    }
}

impl EchoResponder {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn acknowledgement(request: &ResponderRequest) -> String {
        let mut reply = String::from("Received your request");

        if request.has_text() {
            reply.push_str(": ");
            reply.push_str(&request.text);
        }

        match request.attachments.len() {
            0 => reply.push('.'),
            1 => reply.push_str(", along with 1 file."),
            count => reply.push_str(&format!(", along with {count} files.")),
        }

        reply.push(' ');
        reply.push_str(ASSISTANT_INTRODUCTION);
        reply
    }
}

impl Responder for EchoResponder {
    fn kind(&self) -> ResponderKind {
        ResponderKind::Echo
    }

    fn name(&self) -> &str {
        ECHO_RESPONDER_NAME
    }

    fn respond(&self, request: ResponderRequest) -> ResponderFuture {
        let delay = self.delay;
        Box::pin(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            Ok(Self::acknowledgement(&request))
        })
    }
}
