//! Notification sender.
//!
//! Validates the configuration once in [`NotificationSender::connect`], then
//! forwards texts and files to the configured chats. Delivery is best-effort:
//! failures are logged and reported in the returned [`SendOutcome`], never
//! raised or retried.

use std::{
    path::Path,
    sync::{Arc, OnceLock},
};

use regex::Regex;

use crate::{
    config::Config,
    dedup::{message_key, DedupStore},
    domain::{ChatId, Subscribers},
    errors::ConfigError,
    hours::{Clock, LocalClock, WorkingHours},
    ports::{ApiMethod, BotApi, DocumentFile, Payload},
    Result,
};

/// Telegram rejects message texts longer than this (in characters).
pub const MESSAGE_MAX_CHARS: usize = 4096;
/// Telegram caption ceiling.
pub const CAPTION_MAX_CHARS: usize = 1024;

fn token_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d+:\w+$").expect("static regex"))
}

// ============== Outcome ==============

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    OutsideWorkingHours,
    Duplicate,
    MissingFile,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeliveryStatus {
    Delivered,
    Failed(String),
}

#[derive(Clone, Debug)]
pub struct Delivery {
    pub subscriber: String,
    pub chat_id: ChatId,
    pub status: DeliveryStatus,
}

#[derive(Clone, Debug, Default)]
pub struct Report {
    pub deliveries: Vec<Delivery>,
    /// Names with no configured chat; skipped without error.
    pub unknown_subscribers: Vec<String>,
    /// The text was too long and went out as a file.
    pub sent_as_document: bool,
}

/// What a send call did. Ignoring it gives fire-and-forget semantics.
#[derive(Clone, Debug)]
pub enum SendOutcome {
    Skipped(SkipReason),
    Attempted(Report),
}

impl SendOutcome {
    pub fn skip_reason(&self) -> Option<SkipReason> {
        match self {
            SendOutcome::Skipped(reason) => Some(*reason),
            SendOutcome::Attempted(_) => None,
        }
    }

    pub fn report(&self) -> Option<&Report> {
        match self {
            SendOutcome::Skipped(_) => None,
            SendOutcome::Attempted(report) => Some(report),
        }
    }

    pub fn delivered_count(&self) -> usize {
        self.report().map_or(0, |r| {
            r.deliveries
                .iter()
                .filter(|d| d.status == DeliveryStatus::Delivered)
                .count()
        })
    }
}

// ============== Sender ==============

pub struct NotificationSender {
    cfg: Config,
    hours: Option<WorkingHours>,
    api: Arc<dyn BotApi>,
    dedup: Option<Arc<dyn DedupStore>>,
    clock: Arc<dyn Clock>,
}

impl NotificationSender {
    /// Validate `cfg` and build a ready sender.
    ///
    /// `dedup` is required when `cfg.ttl_seconds > 0` and ignored otherwise.
    pub async fn connect(
        cfg: Config,
        api: Arc<dyn BotApi>,
        dedup: Option<Arc<dyn DedupStore>>,
    ) -> Result<Self> {
        Ok(Self::try_connect(cfg, api, dedup, Arc::new(LocalClock)).await?)
    }

    /// Like [`connect`](Self::connect) with an explicit clock for the working-hours check.
    pub async fn connect_with_clock(
        cfg: Config,
        api: Arc<dyn BotApi>,
        dedup: Option<Arc<dyn DedupStore>>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        Ok(Self::try_connect(cfg, api, dedup, clock).await?)
    }

    pub(crate) async fn try_connect(
        cfg: Config,
        api: Arc<dyn BotApi>,
        dedup: Option<Arc<dyn DedupStore>>,
        clock: Arc<dyn Clock>,
    ) -> std::result::Result<Self, ConfigError> {
        // Offline checks first: a broken local config never reaches the network.
        if !token_regex().is_match(&cfg.token) {
            return Err(ConfigError::TokenFormat);
        }
        if cfg.chats_ids.is_empty() {
            return Err(ConfigError::NoSubscribers);
        }
        let hours = WorkingHours::parse(&cfg.working_hours_range)?;

        let dedup = if cfg.ttl().is_some() {
            match dedup {
                Some(store) if store.is_available().await => Some(store),
                _ => return Err(ConfigError::DedupUnavailable),
            }
        } else {
            None
        };

        match api.request(ApiMethod::GetMe, Payload::None).await {
            Ok(resp) if resp.ok => {}
            Ok(resp) => return Err(ConfigError::TokenRejected(resp.failure_reason())),
            Err(e) => return Err(ConfigError::TokenRejected(e.to_string())),
        }

        tracing::info!(
            subscribers = cfg.chats_ids.len(),
            ttl_seconds = cfg.ttl_seconds,
            working_hours = ?hours,
            "notification sender ready"
        );

        Ok(Self {
            cfg,
            hours,
            api,
            dedup,
            clock,
        })
    }

    /// Send `text` to every known subscriber.
    ///
    /// Texts over [`MESSAGE_MAX_CHARS`] are sent as a `.txt` document instead.
    pub async fn send_message(
        &self,
        subscribers: impl Into<Subscribers>,
        text: &str,
    ) -> SendOutcome {
        let subscribers = subscribers.into();

        if !self.within_working_hours() {
            tracing::debug!("outside working hours, message dropped");
            return SendOutcome::Skipped(SkipReason::OutsideWorkingHours);
        }

        let key = message_key(text);
        if self.is_duplicate(&key).await {
            tracing::debug!(key = %key, "same message already sent, dropped");
            return SendOutcome::Skipped(SkipReason::Duplicate);
        }

        let report = if text.chars().count() > MESSAGE_MAX_CHARS {
            self.send_text_as_document(&subscribers, text).await
        } else {
            let (targets, unknown_subscribers) = self.resolve(&subscribers);
            let mut deliveries = Vec::with_capacity(targets.len());
            for (subscriber, chat_id) in targets {
                let status = self
                    .deliver(ApiMethod::SendMessage, Payload::message(&chat_id, text))
                    .await;
                deliveries.push(Delivery {
                    subscriber,
                    chat_id,
                    status,
                });
            }
            Report {
                deliveries,
                unknown_subscribers,
                sent_as_document: false,
            }
        };

        self.mark_sent(&key).await;

        SendOutcome::Attempted(report)
    }

    /// Upload the file at `path` to every known subscriber.
    ///
    /// A missing file is a silent no-op. With `delete_after_send` the file is
    /// removed once every subscriber was attempted, whatever the results.
    pub async fn send_document(
        &self,
        subscribers: impl Into<Subscribers>,
        path: impl AsRef<Path>,
        delete_after_send: bool,
    ) -> SendOutcome {
        let subscribers = subscribers.into();
        let path = path.as_ref();

        if !self.within_working_hours() {
            tracing::debug!(path = %path.display(), "outside working hours, document dropped");
            return SendOutcome::Skipped(SkipReason::OutsideWorkingHours);
        }

        if !is_regular_file(path).await {
            tracing::debug!(path = %path.display(), "document not found, skipped");
            return SendOutcome::Skipped(SkipReason::MissingFile);
        }

        let caption = file_name_of(path);
        let report = self.deliver_document(&subscribers, path, &caption).await;

        if delete_after_send {
            if let Err(e) = tokio::fs::remove_file(path).await {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to delete sent document"
                );
            }
        }

        SendOutcome::Attempted(report)
    }

    fn within_working_hours(&self) -> bool {
        match self.hours {
            Some(window) => window.contains(self.clock.current_hour()),
            None => true,
        }
    }

    async fn is_duplicate(&self, key: &str) -> bool {
        let Some(store) = &self.dedup else {
            return false;
        };
        match store.exists(key).await {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(error = %e, "dedup lookup failed, sending anyway");
                false
            }
        }
    }

    async fn mark_sent(&self, key: &str) {
        let (Some(store), Some(ttl)) = (&self.dedup, self.cfg.ttl()) else {
            return;
        };
        if let Err(e) = store.add(key, ttl).await {
            tracing::warn!(error = %e, "failed to record sent message");
        }
    }

    fn resolve(&self, subscribers: &Subscribers) -> (Vec<(String, ChatId)>, Vec<String>) {
        let mut targets = Vec::new();
        let mut unknown = Vec::new();
        for name in subscribers.iter() {
            match self.cfg.chats_ids.get(name) {
                Some(chat_id) => targets.push((name.to_string(), chat_id.clone())),
                None => {
                    tracing::debug!(subscriber = name, "unknown subscriber, skipped");
                    unknown.push(name.to_string());
                }
            }
        }
        (targets, unknown)
    }

    async fn deliver(&self, method: ApiMethod, payload: Payload) -> DeliveryStatus {
        match self.api.request(method, payload).await {
            Ok(resp) if resp.ok => DeliveryStatus::Delivered,
            Ok(resp) => {
                let reason = resp.failure_reason();
                tracing::warn!(
                    method = method.as_str(),
                    reason = %reason,
                    "telegram rejected request"
                );
                DeliveryStatus::Failed(reason)
            }
            Err(e) => {
                tracing::warn!(method = method.as_str(), error = %e, "telegram request failed");
                DeliveryStatus::Failed(e.to_string())
            }
        }
    }

    async fn send_text_as_document(&self, subscribers: &Subscribers, text: &str) -> Report {
        let mut report = match write_temp_text(text) {
            Ok(tmp) => {
                let caption = preview(text, CAPTION_MAX_CHARS);
                let report = self
                    .deliver_document(subscribers, tmp.path(), &caption)
                    .await;
                if let Err(e) = tmp.close() {
                    tracing::warn!(error = %e, "failed to remove temporary message file");
                }
                report
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to write temporary message file");
                self.fail_all(subscribers, &format!("temporary file: {e}"))
            }
        };
        report.sent_as_document = true;
        report
    }

    async fn deliver_document(
        &self,
        subscribers: &Subscribers,
        path: &Path,
        caption: &str,
    ) -> Report {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to read document");
                return self.fail_all(subscribers, &format!("read {}: {e}", path.display()));
            }
        };

        let file = DocumentFile {
            file_name: file_name_of(path),
            content_type: content_type_for(path).to_string(),
            bytes,
        };

        let (targets, unknown_subscribers) = self.resolve(subscribers);
        let mut deliveries = Vec::with_capacity(targets.len());
        for (subscriber, chat_id) in targets {
            let payload = Payload::Document {
                chat_id: chat_id.clone(),
                caption: caption.to_string(),
                file: file.clone(),
            };
            let status = self.deliver(ApiMethod::SendDocument, payload).await;
            deliveries.push(Delivery {
                subscriber,
                chat_id,
                status,
            });
        }

        Report {
            deliveries,
            unknown_subscribers,
            sent_as_document: false,
        }
    }

    fn fail_all(&self, subscribers: &Subscribers, reason: &str) -> Report {
        let (targets, unknown_subscribers) = self.resolve(subscribers);
        Report {
            deliveries: targets
                .into_iter()
                .map(|(subscriber, chat_id)| Delivery {
                    subscriber,
                    chat_id,
                    status: DeliveryStatus::Failed(reason.to_string()),
                })
                .collect(),
            unknown_subscribers,
            sent_as_document: false,
        }
    }
}

// ============== Helpers ==============

fn write_temp_text(text: &str) -> std::io::Result<tempfile::NamedTempFile> {
    use std::io::Write;

    let mut tmp = tempfile::Builder::new()
        .prefix("tgn-message-")
        .suffix(".txt")
        .tempfile()?;
    tmp.write_all(text.as_bytes())?;
    tmp.flush()?;
    Ok(tmp)
}

async fn is_regular_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("document")
        .to_string()
}

fn preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    out.push_str("...");
    out
}

/// Content type from the file extension.
pub fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "txt" | "log" => "text/plain",
        "md" => "text/markdown",
        "csv" => "text/csv",
        "html" | "htm" => "text/html",
        "json" => "application/json",
        "xml" => "application/xml",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "gz" => "application/gzip",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        _ => "application/octet-stream",
    }
}
