/// Core error type.
///
/// Adapter crates map their transport failures into [`Error::External`] so the
/// sender can treat every delivery failure the same way.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("external error: {0}")]
    External(String),
}

/// Which startup check rejected the configuration.
///
/// `Clone` so a failed lazy initialization can hand the same error to every
/// later caller.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("incorrect telegram token format")]
    TokenFormat,

    #[error("invalid telegram token: {0}")]
    TokenRejected(String),

    #[error("list of subscribers is empty")]
    NoSubscribers,

    #[error("malformed working hours range: {0}")]
    WorkingHours(String),

    #[error("dedup cache is not available")]
    DedupUnavailable,

    #[error("{key}: {reason}")]
    Env { key: String, reason: String },
}

pub type Result<T> = std::result::Result<T, Error>;
