use futures::StreamExt;
use rig::completion::{CompletionModel, Message as RigMessage};
use rig::prelude::CompletionClient;
use rig::providers::openai;
use rig::streaming::StreamedAssistantContent;
use snafu::{ResultExt, ensure};

use super::responder::{
    CompletionsFailedSnafu, EmptyPromptSnafu, HttpClientSnafu, MissingApiKeySnafu, Responder,
    ResponderConfig, ResponderFuture, ResponderKind, ResponderRequest, ResponderResult,
};

pub const RIG_OPENAI_RESPONDER_NAME: &str = "Rig OpenAI";
pub const DEFAULT_OPENAI_ENDPOINT: &str = "https://api.openai.com/v1";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";

/// Answers submissions with an OpenAI-compatible chat model.
///
/// PDF bytes are not forwarded to the model; attachments are listed in the
/// prompt by name and size instead.
pub struct RigResponder {
    config: ResponderConfig,
}

impl RigResponder {
    pub fn new(mut config: ResponderConfig) -> ResponderResult<Self> {
        ensure!(
            !config.api_key.is_empty(),
            MissingApiKeySnafu {
                stage: "rig-responder-new",
                kind: config.kind,
            }
        );

        if config.model.is_empty() {
            config.model = DEFAULT_OPENAI_MODEL.to_string();
        }

        Ok(Self { config })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn build_client(config: &ResponderConfig) -> ResponderResult<openai::Client> {
        let mut builder = openai::Client::builder().api_key(config.api_key.as_str());
        if !config.endpoint.is_empty() {
            builder = builder.base_url(config.endpoint.as_str());
        }
        builder.build().context(HttpClientSnafu {
            stage: "build-client",
        })
    }

    fn prompt_text(request: &ResponderRequest) -> String {
        let mut prompt = request.text.trim().to_string();

        if !request.attachments.is_empty() {
            if !prompt.is_empty() {
                prompt.push_str("\n\n");
            }
            prompt.push_str("Attached files:");
            for attachment in &request.attachments {
                prompt.push_str(&format!(
                    "\n- {} ({}, {} bytes)",
                    attachment.name,
                    attachment.mime_type,
                    attachment.size_bytes()
                ));
            }
        }

        prompt
    }

    async fn complete(
        config: ResponderConfig,
        request: ResponderRequest,
    ) -> ResponderResult<String> {
        let prompt = Self::prompt_text(&request);
        ensure!(
            !prompt.is_empty(),
            EmptyPromptSnafu {
                stage: "rig-build-prompt",
            }
        );

        let client = Self::build_client(&config)?;
        let model = client.completion_model(config.model.clone());
        let mut builder = model.completion_request(RigMessage::user(prompt));

        if let Some(preamble) = config
            .preamble
            .as_ref()
            .filter(|preamble| !preamble.trim().is_empty())
        {
            builder = builder.preamble(preamble.clone());
        }

        let mut stream = builder.stream().await.context(CompletionsFailedSnafu {
            stage: "open-stream",
        })?;

        let mut content = String::new();
        while let Some(item) = stream.next().await {
            // Reasoning and tool traffic never reaches the transcript.
            if let StreamedAssistantContent::Text(text) = item.context(CompletionsFailedSnafu {
                stage: "stream-chunk",
            })? {
                content.push_str(&text.text);
            }
        }

        tracing::debug!(
            model_id = %config.model,
            content_len = content.len(),
            "rig completion finished"
        );
        Ok(content)
    }
}

impl Responder for RigResponder {
    fn kind(&self) -> ResponderKind {
        ResponderKind::Openai
    }

    fn name(&self) -> &str {
        RIG_OPENAI_RESPONDER_NAME
    }

    fn respond(&self, request: ResponderRequest) -> ResponderFuture {
        Box::pin(Self::complete(self.config.clone(), request))
    }
}
