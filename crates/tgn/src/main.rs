use std::{path::PathBuf, sync::Arc};

use anyhow::Context;
use clap::{Parser, Subcommand};

use tgn_core::{
    config::Config,
    dedup::{DedupStore, FileDedupStore},
    sender::{DeliveryStatus, NotificationSender, SendOutcome},
};
use tgn_telegram::HttpBotApi;

const DEFAULT_DEDUP_DIR: &str = "tgn-dedup";

/// Send notifications to configured Telegram chats.
///
/// Configuration comes from `TGN_BOT_TOKEN`, `TGN_CHATS` (`name=chat_id,...`),
/// `TGN_TTL_SECONDS`, `TGN_WORKING_HOURS` (`start-end`) and `TGN_DEDUP_DIR`.
#[derive(Debug, Parser)]
#[command(name = "tgn", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Send a text message.
    Message {
        /// Subscriber name (repeatable).
        #[arg(long = "to", required = true)]
        to: Vec<String>,
        text: String,
    },
    /// Upload a file.
    Document {
        /// Subscriber name (repeatable).
        #[arg(long = "to", required = true)]
        to: Vec<String>,
        path: PathBuf,
        /// Remove the file once every subscriber was attempted.
        #[arg(long)]
        delete: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tgn_core::logging::init("tgn")?;

    let cli = Cli::parse();
    let cfg = Config::from_env().context("loading configuration")?;

    let api = Arc::new(HttpBotApi::new(cfg.token.clone())?);
    let dedup = dedup_store(&cfg);

    let sender = NotificationSender::connect(cfg, api, dedup)
        .await
        .context("starting notification sender")?;

    let outcome = match cli.command {
        Command::Message { to, text } => sender.send_message(to, &text).await,
        Command::Document { to, path, delete } => sender.send_document(to, &path, delete).await,
    };

    print_outcome(&outcome);
    Ok(())
}

/// Every CLI run is a fresh process, so suppression has to live on disk.
fn dedup_store(cfg: &Config) -> Option<Arc<dyn DedupStore>> {
    cfg.ttl()?;
    let dir = cfg
        .dedup_dir
        .clone()
        .unwrap_or_else(|| std::env::temp_dir().join(DEFAULT_DEDUP_DIR));
    Some(Arc::new(FileDedupStore::new(dir)))
}

fn print_outcome(outcome: &SendOutcome) {
    let report = match outcome {
        SendOutcome::Skipped(reason) => {
            println!("skipped: {reason:?}");
            return;
        }
        SendOutcome::Attempted(report) => report,
    };

    if report.sent_as_document {
        println!("message too long, sent as document");
    }
    for d in &report.deliveries {
        match &d.status {
            DeliveryStatus::Delivered => println!("{} ({}): delivered", d.subscriber, d.chat_id),
            DeliveryStatus::Failed(reason) => {
                println!("{} ({}): failed: {reason}", d.subscriber, d.chat_id)
            }
        }
    }
    for name in &report.unknown_subscribers {
        println!("{name}: unknown subscriber");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use std::time::Duration;
    use tgn_core::dedup::message_key;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_document_command() {
        let cli = Cli::try_parse_from([
            "tgn", "document", "--to", "ops", "--to", "dev", "/tmp/x.log", "--delete",
        ])
        .unwrap();
        match cli.command {
            Command::Document { to, path, delete } => {
                assert_eq!(to, vec!["ops".to_string(), "dev".to_string()]);
                assert_eq!(path, PathBuf::from("/tmp/x.log"));
                assert!(delete);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn dedup_store_only_with_ttl() {
        let cfg = Config::new("1:abc").subscriber("ops", 1i64);
        assert!(dedup_store(&cfg).is_none());
        assert!(dedup_store(&cfg.ttl_seconds(60)).is_some());
    }

    /// Two separate runs (fresh sender, fresh store handle) must share state.
    #[tokio::test]
    async fn dedup_survives_across_runs() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = Config::new("1:abc").subscriber("ops", 1i64).ttl_seconds(3600);
        cfg.dedup_dir = Some(dir.path().to_path_buf());

        let first = dedup_store(&cfg).unwrap();
        let second = dedup_store(&cfg).unwrap();
        let key = message_key("disk full");

        assert!(first.is_available().await);
        first.add(&key, Duration::from_secs(3600)).await.unwrap();
        assert!(second.exists(&key).await.unwrap());
    }

    #[test]
    fn message_requires_a_recipient() {
        assert!(Cli::try_parse_from(["tgn", "message", "hello"]).is_err());
    }
}
