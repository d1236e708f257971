use std::{collections::BTreeMap, env, path::PathBuf, time::Duration};

use crate::{domain::ChatId, errors::ConfigError, Result};

/// Notification sender configuration.
///
/// Built by the embedding application and handed to
/// [`NotificationSender::connect`](crate::sender::NotificationSender::connect),
/// which validates it once.
#[derive(Clone, Debug, Default)]
pub struct Config {
    /// Bot token, `<digits>:<word chars>`.
    pub token: String,
    /// Subscriber name -> chat id.
    pub chats_ids: BTreeMap<String, ChatId>,
    /// Repeat suppression window in seconds; `0` disables it.
    pub ttl_seconds: u64,
    /// Empty, or `[start_hour, end_hour]` in local time.
    pub working_hours_range: Vec<u32>,
    /// Directory for the cross-process dedup store. Only the CLI reads this.
    pub dedup_dir: Option<PathBuf>,
}

impl Config {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            ..Default::default()
        }
    }

    pub fn subscriber(mut self, name: impl Into<String>, chat_id: impl Into<ChatId>) -> Self {
        self.chats_ids.insert(name.into(), chat_id.into());
        self
    }

    pub fn ttl_seconds(mut self, ttl: u64) -> Self {
        self.ttl_seconds = ttl;
        self
    }

    pub fn working_hours(mut self, start: u32, end: u32) -> Self {
        self.working_hours_range = vec![start, end];
        self
    }

    pub fn ttl(&self) -> Option<Duration> {
        (self.ttl_seconds > 0).then(|| Duration::from_secs(self.ttl_seconds))
    }

    /// Read the configuration from `TGN_*` environment variables.
    ///
    /// Only shape is checked here; the sender runs the real validation.
    pub fn from_env() -> Result<Self> {
        let token = env_str("TGN_BOT_TOKEN").unwrap_or_default();
        if token.trim().is_empty() {
            return Err(env_error("TGN_BOT_TOKEN", "environment variable is required"));
        }

        let chats_ids = parse_chats(env_str("TGN_CHATS").as_deref())
            .map_err(|reason| env_error("TGN_CHATS", &reason))?;

        let ttl_seconds = match env_str("TGN_TTL_SECONDS").and_then(non_empty) {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .map_err(|_| env_error("TGN_TTL_SECONDS", "expected a non-negative integer"))?,
            None => 0,
        };

        let working_hours_range = parse_hours(env_str("TGN_WORKING_HOURS").as_deref())
            .map_err(|reason| env_error("TGN_WORKING_HOURS", &reason))?;

        let dedup_dir = env_str("TGN_DEDUP_DIR").and_then(non_empty).map(PathBuf::from);

        Ok(Self {
            token: token.trim().to_string(),
            chats_ids,
            ttl_seconds,
            working_hours_range,
            dedup_dir,
        })
    }
}

fn env_error(key: &str, reason: &str) -> crate::Error {
    ConfigError::Env {
        key: key.to_string(),
        reason: reason.to_string(),
    }
    .into()
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

/// `alice=123,ops=@ops_channel`
fn parse_chats(raw: Option<&str>) -> std::result::Result<BTreeMap<String, ChatId>, String> {
    let mut out = BTreeMap::new();
    for pair in raw
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        let Some((name, chat)) = pair.split_once('=') else {
            return Err(format!("expected name=chat_id, got {pair:?}"));
        };
        let (name, chat) = (name.trim(), chat.trim());
        if name.is_empty() || chat.is_empty() {
            return Err(format!("expected name=chat_id, got {pair:?}"));
        }
        out.insert(name.to_string(), ChatId::from(chat));
    }
    Ok(out)
}

/// `9-18`, or empty for "always".
fn parse_hours(raw: Option<&str>) -> std::result::Result<Vec<u32>, String> {
    let raw = raw.unwrap_or_default().trim();
    if raw.is_empty() {
        return Ok(Vec::new());
    }
    raw.split('-')
        .map(|h| {
            h.trim()
                .parse::<u32>()
                .map_err(|_| format!("expected start-end hours, got {raw:?}"))
        })
        .collect()
}
