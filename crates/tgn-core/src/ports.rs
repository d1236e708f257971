use async_trait::async_trait;
use serde::Deserialize;

use crate::{domain::ChatId, Result};

/// Bot API methods the sender uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ApiMethod {
    GetMe,
    SendMessage,
    SendDocument,
}

impl ApiMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            ApiMethod::GetMe => "getMe",
            ApiMethod::SendMessage => "sendMessage",
            ApiMethod::SendDocument => "sendDocument",
        }
    }
}

/// File attached to a `sendDocument` call.
#[derive(Clone, Debug)]
pub struct DocumentFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Clone, Debug)]
pub enum Payload {
    None,
    /// Url-encoded form fields.
    Form(Vec<(String, String)>),
    /// Multipart upload.
    Document {
        chat_id: ChatId,
        caption: String,
        file: DocumentFile,
    },
}

impl Payload {
    pub fn message(chat_id: &ChatId, text: &str) -> Self {
        Payload::Form(vec![
            ("chat_id".to_string(), chat_id.to_string()),
            ("text".to_string(), text.to_string()),
        ])
    }
}

/// Telegram response envelope.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ApiResponse {
    #[serde(default)]
    pub ok: bool,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub error_code: Option<i64>,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
}

impl ApiResponse {
    /// Short reason for a rejected call.
    pub fn failure_reason(&self) -> String {
        match (self.error_code, self.description.as_deref()) {
            (Some(code), Some(desc)) => format!("{code}: {desc}"),
            (None, Some(desc)) => desc.to_string(),
            (Some(code), None) => format!("error code {code}"),
            (None, None) => "request rejected".to_string(),
        }
    }
}

/// Single request helper every Bot API call goes through.
#[async_trait]
pub trait BotApi: Send + Sync {
    async fn request(&self, method: ApiMethod, payload: Payload) -> Result<ApiResponse>;
}
