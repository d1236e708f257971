//! Telegram Bot API adapter (reqwest).
//!
//! Implements the `tgn-core` [`BotApi`] port over plain HTTPS POSTs to
//! `https://api.telegram.org/bot<token>/<method>`.
//!
//! Certificate verification is disabled on every call. Hosts behind
//! intercepting proxies depend on it; the token is still only sent to the
//! configured base URL.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};

use tgn_core::{
    errors::Error,
    ports::{ApiMethod, ApiResponse, BotApi, DocumentFile, Payload},
    Result,
};

pub const DEFAULT_BASE_URL: &str = "https://api.telegram.org";

#[derive(Clone)]
pub struct HttpBotApi {
    token: String,
    base_url: String,
    http: reqwest::Client,
}

impl std::fmt::Debug for HttpBotApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print the token.
        f.debug_struct("HttpBotApi")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl HttpBotApi {
    pub fn new(token: impl Into<String>) -> Result<Self> {
        Self::with_base_url(token, DEFAULT_BASE_URL)
    }

    /// Point the client at another Bot API server (local bot API, tests).
    pub fn with_base_url(token: impl Into<String>, base_url: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|e| Error::External(format!("telegram client build error: {e}")))?;

        Ok(Self {
            token: token.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    fn method_url(&self, method: ApiMethod) -> String {
        format!("{}/bot{}/{}", self.base_url, self.token, method.as_str())
    }
}

fn document_form(chat_id: String, caption: String, file: DocumentFile) -> Result<Form> {
    let part = Part::bytes(file.bytes)
        .file_name(file.file_name)
        .mime_str(&file.content_type)
        .map_err(|e| Error::External(format!("telegram multipart error: {e}")))?;

    Ok(Form::new()
        .text("chat_id", chat_id)
        .text("caption", caption)
        .part("document", part))
}

/// Parse a Bot API envelope. Telegram answers errors with 4xx + JSON, so the
/// body is decoded whatever the status.
fn parse_envelope(status: reqwest::StatusCode, body: &str) -> Result<ApiResponse> {
    serde_json::from_str::<ApiResponse>(body).map_err(|_| {
        Error::External(format!(
            "telegram returned non-json response: {status} {}",
            body.chars().take(200).collect::<String>()
        ))
    })
}

#[async_trait]
impl BotApi for HttpBotApi {
    async fn request(&self, method: ApiMethod, payload: Payload) -> Result<ApiResponse> {
        let req = self.http.post(self.method_url(method));
        let req = match payload {
            Payload::None => req,
            Payload::Form(fields) => req.form(&fields),
            Payload::Document {
                chat_id,
                caption,
                file,
            } => req.multipart(document_form(chat_id.to_string(), caption, file)?),
        };

        let resp = req.send().await.map_err(|e| {
            Error::External(format!("telegram request error: {}", e.without_url()))
        })?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| {
            Error::External(format!("telegram body error: {}", e.without_url()))
        })?;

        let envelope = parse_envelope(status, &body)?;
        tracing::debug!(method = method.as_str(), ok = envelope.ok, "telegram call");
        Ok(envelope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpListener,
    };

    #[test]
    fn builds_method_urls() {
        let api = HttpBotApi::with_base_url("1:abc", "http://localhost:8081/").unwrap();
        assert_eq!(
            api.method_url(ApiMethod::SendDocument),
            "http://localhost:8081/bot1:abc/sendDocument"
        );
        let api = HttpBotApi::new("1:abc").unwrap();
        assert_eq!(
            api.method_url(ApiMethod::GetMe),
            "https://api.telegram.org/bot1:abc/getMe"
        );
    }

    #[test]
    fn debug_output_hides_token() {
        let api = HttpBotApi::new("123:secret").unwrap();
        assert!(!format!("{api:?}").contains("secret"));
    }

    #[test]
    fn parses_error_envelope_from_4xx() {
        let resp = parse_envelope(
            reqwest::StatusCode::BAD_REQUEST,
            r#"{"ok":false,"error_code":400,"description":"Bad Request: message is too long"}"#,
        )
        .unwrap();
        assert!(!resp.ok);
        assert_eq!(resp.error_code, Some(400));
    }

    #[test]
    fn rejects_non_json_body() {
        let err = parse_envelope(reqwest::StatusCode::BAD_GATEWAY, "<html>bad gateway</html>")
            .unwrap_err();
        assert!(err.to_string().contains("non-json"));
    }

    /// One-shot HTTP server answering any request with `body`.
    async fn serve_once(body: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 1024];
            while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = sock.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
            }
            let resp = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            sock.write_all(resp.as_bytes()).await.unwrap();
            sock.shutdown().await.unwrap();
            String::from_utf8_lossy(&buf).to_string()
        });
        (format!("http://{addr}"), handle)
    }

    #[tokio::test]
    async fn get_me_posts_to_token_path() {
        let (base, server) = serve_once(r#"{"ok":true,"result":{"id":1,"is_bot":true}}"#).await;
        let api = HttpBotApi::with_base_url("42:tok", base).unwrap();

        let resp = api.request(ApiMethod::GetMe, Payload::None).await.unwrap();
        assert!(resp.ok);

        let head = server.await.unwrap();
        assert!(head.starts_with("POST /bot42:tok/getMe HTTP/1.1"));
    }
}
