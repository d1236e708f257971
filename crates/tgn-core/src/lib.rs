//! Core of the Telegram notification sender.
//!
//! Transport-agnostic: the Bot API lives behind the [`ports::BotApi`] trait and
//! the repeat-suppression cache behind [`dedup::DedupStore`]. The HTTP adapter
//! is in `tgn-telegram`.

pub mod config;
pub mod dedup;
pub mod domain;
pub mod errors;
pub mod hours;
pub mod lazy;
pub mod logging;
pub mod ports;
pub mod sender;

pub use errors::{ConfigError, Error, Result};
