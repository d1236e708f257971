use std::fmt;

use serde::{Deserialize, Serialize};

/// Telegram chat id: numeric, or a public `@username` for channels.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChatId {
    Id(i64),
    Username(String),
}

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatId::Id(id) => write!(f, "{id}"),
            ChatId::Username(name) => f.write_str(name),
        }
    }
}

impl From<i64> for ChatId {
    fn from(id: i64) -> Self {
        ChatId::Id(id)
    }
}

impl From<&str> for ChatId {
    /// Numeric strings become [`ChatId::Id`]; anything else is kept verbatim.
    fn from(raw: &str) -> Self {
        let raw = raw.trim();
        match raw.parse::<i64>() {
            Ok(id) => ChatId::Id(id),
            Err(_) => ChatId::Username(raw.to_string()),
        }
    }
}

impl From<String> for ChatId {
    fn from(raw: String) -> Self {
        ChatId::from(raw.as_str())
    }
}

/// One or more subscriber names, in the order given.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Subscribers(Vec<String>);

impl Subscribers {
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl From<&str> for Subscribers {
    fn from(name: &str) -> Self {
        Self(vec![name.to_string()])
    }
}

impl From<String> for Subscribers {
    fn from(name: String) -> Self {
        Self(vec![name])
    }
}

impl From<Vec<String>> for Subscribers {
    fn from(names: Vec<String>) -> Self {
        Self(names)
    }
}

impl From<&[&str]> for Subscribers {
    fn from(names: &[&str]) -> Self {
        Self(names.iter().map(|s| s.to_string()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for Subscribers {
    fn from(names: [&str; N]) -> Self {
        Self(names.iter().map(|s| s.to_string()).collect())
    }
}
