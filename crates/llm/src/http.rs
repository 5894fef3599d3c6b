use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use snafu::{ResultExt, ensure};

use super::responder::{
    DecodeSnafu, EmptyPromptSnafu, InvalidEndpointSnafu, MissingResumeSnafu,
    MultipleResumesSnafu, RequestAttachment, Responder, ResponderFuture, ResponderKind,
    ResponderRequest, ResponderResult, StatusSnafu, TransportSnafu,
};

pub const HTTP_RESPONDER_NAME: &str = "Apply endpoint";
pub const DEFAULT_HTTP_ENDPOINT: &str = "http://127.0.0.1:8000";
pub const APPLY_PATH: &str = "/apply";
pub const PROMPT_FIELD: &str = "prompt";
pub const RESUME_FIELD: &str = "resume";

#[derive(Debug, Deserialize)]
struct ApplyResponse {
    result: String,
}

#[derive(Debug, Deserialize)]
struct ApplyErrorBody {
    detail: serde_json::Value,
}

/// Posts each submission as multipart form data to an `/apply` endpoint.
///
/// The endpoint takes exactly one `resume` file next to the `prompt` field,
/// so a submission must carry a single attachment.
#[derive(Debug, Clone)]
pub struct HttpResponder {
    client: reqwest::Client,
    apply_url: String,
}

impl HttpResponder {
    pub fn new(endpoint: &str) -> ResponderResult<Self> {
        let endpoint = endpoint.trim().trim_end_matches('/');
        ensure!(
            endpoint.starts_with("http://") || endpoint.starts_with("https://"),
            InvalidEndpointSnafu {
                stage: "http-responder-new",
                endpoint: endpoint.to_string(),
            }
        );

        Ok(Self {
            client: reqwest::Client::new(),
            apply_url: format!("{endpoint}{APPLY_PATH}"),
        })
    }

    pub fn apply_url(&self) -> &str {
        &self.apply_url
    }

    fn resume(request: &ResponderRequest) -> ResponderResult<&RequestAttachment> {
        match request.attachments.as_slice() {
            [resume] => Ok(resume),
            [] => MissingResumeSnafu {
                stage: "http-select-resume",
            }
            .fail(),
            attachments => MultipleResumesSnafu {
                stage: "http-select-resume",
                count: attachments.len(),
            }
            .fail(),
        }
    }

    fn build_form(request: &ResponderRequest) -> ResponderResult<Form> {
        let resume = Self::resume(request)?;
        let part = Part::bytes(resume.content.to_vec())
            .file_name(resume.name.clone())
            .mime_str(&resume.mime_type)
            .context(TransportSnafu {
                stage: "build-resume-part",
            })?;

        Ok(Form::new()
            .text(PROMPT_FIELD, request.text.clone())
            .part(RESUME_FIELD, part))
    }

    /// Prefers the endpoint's `detail` field and falls back to the raw body.
    fn error_detail(body: &str) -> String {
        match serde_json::from_str::<ApplyErrorBody>(body) {
            Ok(ApplyErrorBody {
                detail: serde_json::Value::String(detail),
            }) => detail,
            Ok(ApplyErrorBody { detail }) => detail.to_string(),
            Err(_) => body.trim().to_string(),
        }
    }

    async fn post(
        client: reqwest::Client,
        apply_url: String,
        request: ResponderRequest,
    ) -> ResponderResult<String> {
        ensure!(
            request.has_text() || !request.attachments.is_empty(),
            EmptyPromptSnafu {
                stage: "http-validate-request",
            }
        );

        let form = Self::build_form(&request)?;
        let response = client
            .post(&apply_url)
            .multipart(form)
            .send()
            .await
            .context(TransportSnafu {
                stage: "send-apply-request",
            })?;

        let status = response.status();
        let body = response.text().await.context(TransportSnafu {
            stage: "read-apply-response",
        })?;

        if !status.is_success() {
            tracing::warn!(
                url = %apply_url,
                status = status.as_u16(),
                "apply endpoint rejected the request"
            );
            return StatusSnafu {
                stage: "apply-http-status",
                status: status.as_u16(),
                detail: Self::error_detail(&body),
            }
            .fail();
        }

        let payload: ApplyResponse = serde_json::from_str(&body).context(DecodeSnafu {
            stage: "decode-apply-response",
        })?;
        Ok(payload.result)
    }
}

impl Responder for HttpResponder {
    fn kind(&self) -> ResponderKind {
        ResponderKind::Http
    }

    fn name(&self) -> &str {
        HTTP_RESPONDER_NAME
    }

    fn respond(&self, request: ResponderRequest) -> ResponderFuture {
        Box::pin(Self::post(
            self.client.clone(),
            self.apply_url.clone(),
            request,
        ))
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    use super::*;
    use crate::{RequestAttachment, ResponderError};

    /// Serves exactly one request and returns the raw request bytes.
    async fn serve_once(
        status_line: &'static str,
        body: &'static str,
    ) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = format!("http://{}", listener.local_addr().unwrap());

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut received = Vec::new();
            let mut buffer = [0u8; 4096];

            loop {
                let read = socket.read(&mut buffer).await.unwrap();
                if read == 0 {
                    break;
                }
                received.extend_from_slice(&buffer[..read]);
                if request_complete(&received) {
                    break;
                }
            }

            let response = format!(
                "{status_line}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            String::from_utf8_lossy(&received).into_owned()
        });

        (endpoint, handle)
    }

    fn request_complete(received: &[u8]) -> bool {
        let text = String::from_utf8_lossy(received);
        let Some(header_end) = text.find("\r\n\r\n") else {
            return false;
        };
        let headers = text[..header_end].to_ascii_lowercase();
        if headers.contains("transfer-encoding: chunked") {
            return text.ends_with("0\r\n\r\n");
        }
        let content_length = text[..header_end]
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                name.eq_ignore_ascii_case("content-length")
                    .then(|| value.trim().parse::<usize>().ok())
                    .flatten()
            })
            .unwrap_or(0);
        received.len() >= header_end + 4 + content_length
    }

    fn resume_request(text: &str) -> ResponderRequest {
        ResponderRequest::new(
            text,
            vec![RequestAttachment::new(
                "resume.pdf",
                "application/pdf",
                b"%PDF-1.7".to_vec(),
            )],
        )
    }

    #[test]
    fn rejects_endpoint_without_scheme() {
        let error = HttpResponder::new("localhost:8000").unwrap_err();
        assert!(matches!(error, ResponderError::InvalidEndpoint { .. }));
    }

    #[test]
    fn strips_trailing_slash_from_endpoint() {
        let responder = HttpResponder::new("http://localhost:8000/").unwrap();
        assert_eq!(responder.apply_url(), "http://localhost:8000/apply");
    }

    #[test]
    fn error_detail_prefers_detail_field() {
        assert_eq!(
            HttpResponder::error_detail(r#"{"detail":"Resume file not found"}"#),
            "Resume file not found"
        );
        assert_eq!(HttpResponder::error_detail("gateway down\n"), "gateway down");
    }

    #[tokio::test]
    async fn posts_prompt_and_resume_and_returns_result() {
        let (endpoint, server) =
            serve_once("HTTP/1.1 200 OK", r##"{"result":"# Job Application Summary"}"##).await;
        let responder = HttpResponder::new(&endpoint).unwrap();

        let reply = responder
            .respond(resume_request("apply to job X"))
            .await
            .unwrap();
        let raw_request = server.await.unwrap();

        assert_eq!(reply, "# Job Application Summary");
        assert!(raw_request.starts_with("POST /apply "));
        assert!(raw_request.contains("name=\"prompt\""));
        assert!(raw_request.contains("apply to job X"));
        assert!(raw_request.contains("name=\"resume\"; filename=\"resume.pdf\""));
        assert!(
            raw_request
                .to_ascii_lowercase()
                .contains("content-type: application/pdf")
        );
        assert!(raw_request.contains("%PDF-1.7"));
        assert!(!raw_request.contains("name=\"files\""));
    }

    #[tokio::test]
    async fn text_only_request_fails_without_network() {
        let responder = HttpResponder::new("http://127.0.0.1:9").unwrap();
        let error = responder
            .respond(ResponderRequest::new("apply to job X", Vec::new()))
            .await
            .unwrap_err();

        assert!(matches!(error, ResponderError::MissingResume { .. }));
    }

    #[tokio::test]
    async fn several_attachments_fail_without_network() {
        let responder = HttpResponder::new("http://127.0.0.1:9").unwrap();
        let mut request = resume_request("apply to job X");
        request.attachments.push(RequestAttachment::new(
            "cover.pdf",
            "application/pdf",
            b"%PDF-1.4".to_vec(),
        ));

        let error = responder.respond(request).await.unwrap_err();

        assert!(matches!(
            error,
            ResponderError::MultipleResumes { count: 2, .. }
        ));
    }

    #[tokio::test]
    async fn maps_error_status_to_status_error() {
        let (endpoint, server) = serve_once(
            "HTTP/1.1 500 Internal Server Error",
            r#"{"detail":"Agent flow error: boom"}"#,
        )
        .await;
        let responder = HttpResponder::new(&endpoint).unwrap();

        let error = responder
            .respond(resume_request("hi"))
            .await
            .unwrap_err();
        server.await.unwrap();

        match error {
            ResponderError::Status { status, detail, .. } => {
                assert_eq!(status, 500);
                assert_eq!(detail, "Agent flow error: boom");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn maps_unexpected_payload_to_decode_error() {
        let (endpoint, server) = serve_once("HTTP/1.1 200 OK", r#"{"answer":"nope"}"#).await;
        let responder = HttpResponder::new(&endpoint).unwrap();

        let error = responder
            .respond(resume_request("hi"))
            .await
            .unwrap_err();
        server.await.unwrap();

        assert!(matches!(error, ResponderError::Decode { .. }));
    }

    #[tokio::test]
    async fn refuses_empty_request_without_network() {
        let responder = HttpResponder::new("http://127.0.0.1:9").unwrap();
        let error = responder
            .respond(ResponderRequest::new("  ", Vec::new()))
            .await
            .unwrap_err();

        assert!(matches!(error, ResponderError::EmptyPrompt { .. }));
    }
}
