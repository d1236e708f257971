use std::{path::Path, sync::Arc};

use tokio::sync::OnceCell;

use crate::{
    config::Config,
    dedup::DedupStore,
    domain::Subscribers,
    errors::ConfigError,
    hours::{Clock, LocalClock},
    ports::BotApi,
    sender::{NotificationSender, SendOutcome},
    Result,
};

type InitResult = std::result::Result<NotificationSender, ConfigError>;

/// Sender that validates its configuration on first use.
///
/// Initialization runs at most once. If it fails, the failure is kept and
/// every later call returns the same [`ConfigError`]; there is no second
/// attempt within the same value.
pub struct LazySender {
    cfg: Config,
    api: Arc<dyn BotApi>,
    dedup: Option<Arc<dyn DedupStore>>,
    clock: Arc<dyn Clock>,
    state: OnceCell<InitResult>,
}

impl LazySender {
    pub fn new(cfg: Config, api: Arc<dyn BotApi>, dedup: Option<Arc<dyn DedupStore>>) -> Self {
        Self {
            cfg,
            api,
            dedup,
            clock: Arc::new(LocalClock),
            state: OnceCell::new(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// False until the first send call.
    pub fn is_initialized(&self) -> bool {
        self.state.initialized()
    }

    async fn ready(&self) -> Result<&NotificationSender> {
        let state = self
            .state
            .get_or_init(|| {
                NotificationSender::try_connect(
                    self.cfg.clone(),
                    self.api.clone(),
                    self.dedup.clone(),
                    self.clock.clone(),
                )
            })
            .await;

        match state {
            Ok(sender) => Ok(sender),
            Err(e) => Err(e.clone().into()),
        }
    }

    pub async fn send_message(
        &self,
        subscribers: impl Into<Subscribers>,
        text: &str,
    ) -> Result<SendOutcome> {
        let sender = self.ready().await?;
        Ok(sender.send_message(subscribers, text).await)
    }

    pub async fn send_document(
        &self,
        subscribers: impl Into<Subscribers>,
        path: impl AsRef<Path>,
        delete_after_send: bool,
    ) -> Result<SendOutcome> {
        let sender = self.ready().await?;
        Ok(sender.send_document(subscribers, path, delete_after_send).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ports::{ApiMethod, ApiResponse, Payload},
        Error,
    };
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingApi {
        get_me_ok: bool,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl BotApi for CountingApi {
        async fn request(&self, method: ApiMethod, _payload: Payload) -> Result<ApiResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(ApiResponse {
                ok: method != ApiMethod::GetMe || self.get_me_ok,
                ..Default::default()
            })
        }
    }

    #[tokio::test]
    async fn initializes_once_on_first_send() {
        let api = Arc::new(CountingApi {
            get_me_ok: true,
            calls: AtomicUsize::new(0),
        });
        let cfg = Config::new("42:token").subscriber("ops", 1i64);
        let lazy = LazySender::new(cfg, api.clone(), None);
        assert!(!lazy.is_initialized());
        assert_eq!(api.calls.load(Ordering::SeqCst), 0);

        lazy.send_message("ops", "one").await.unwrap();
        lazy.send_message("ops", "two").await.unwrap();

        assert!(lazy.is_initialized());
        // getMe once, then two sendMessage calls.
        assert_eq!(api.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn failed_init_is_reraised_without_retry() {
        let api = Arc::new(CountingApi {
            get_me_ok: false,
            calls: AtomicUsize::new(0),
        });
        let cfg = Config::new("42:token").subscriber("ops", 1i64);
        let lazy = LazySender::new(cfg, api.clone(), None);

        for _ in 0..3 {
            let err = lazy.send_message("ops", "hello").await.err().unwrap();
            assert!(matches!(err, Error::Config(ConfigError::TokenRejected(_))));
        }
        let err = lazy
            .send_document("ops", "/tmp/whatever", false)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::Config(ConfigError::TokenRejected(_))));

        assert_eq!(api.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_mapping_fails_every_call() {
        let api = Arc::new(CountingApi {
            get_me_ok: true,
            calls: AtomicUsize::new(0),
        });
        let lazy = LazySender::new(Config::new("42:token"), api.clone(), None);

        for _ in 0..2 {
            let err = lazy.send_message("ops", "x").await.err().unwrap();
            assert!(matches!(err, Error::Config(ConfigError::NoSubscribers)));
        }
        assert_eq!(api.calls.load(Ordering::SeqCst), 0);
    }
}
