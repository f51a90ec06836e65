// MIT License - Copyright (c) 2026 Peter Wright
// SIA DC09 transmitter library
//
//! # dc09-spt
//!
//! Client side (SPT, the alarm transmitter) of the SIA DC09 alarm reporting
//! protocol over TCP.
//!
//! Events are queued and delivered over up to four transmission paths: a
//! primary and a secondary receiver on each of a main and a back-up network.
//! Delivery prefers paths known to be healthy and falls back to every
//! configured path, retrying until a receiver acknowledges. An optional
//! scheduler polls the paths, reports path failures and restores as events,
//! and sends recurring routine messages such as daily test reports.
//!
//! ## Quick Start
//!
//! ```no_run
//! use dc09_spt::{Dialer, DialerConfig, EventParams, Network, PathOptions, PollSettings, Slot};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = DialerConfig::builder().account("1234").build();
//!     let dialer = Dialer::new(config);
//!
//!     dialer
//!         .set_path(Network::Main, Slot::Primary, PathOptions::new("receiver.example", 12128))
//!         .await?;
//!     dialer
//!         .set_path(Network::Backup, Slot::Primary, PathOptions::new("10.8.0.1", 12128))
//!         .await?;
//!
//!     let poll = PollSettings {
//!         main_interval: Some(180),
//!         backup_interval: Some(3600),
//!         ok_message: Some(EventParams::new().with("code", "YK")),
//!         fail_message: Some(EventParams::new().with("code", "YS")),
//!     };
//!     dialer.start_poll(poll, Duration::from_secs(5)).await?;
//!
//!     dialer
//!         .send_message("SIA", &EventParams::new().with("code", "BA").with("zone", 3))
//!         .await?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     dialer.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod config;
pub mod constants;
pub mod dialer;
pub mod dispatch;
pub mod error;
pub mod message;
pub mod path;
pub mod queue;
pub mod scheduler;
pub mod sender;
pub mod table;

// Re-exports for convenience
pub use codec::{
    AckOutcome, Answer, Dc09Codec, Dc09CodecFactory, FrameCodec, FrameCodecFactory,
    PayloadEncoder, StandardPayloadEncoder,
};
pub use config::{DialerConfig, DialerConfigBuilder, PathIdentity, PathOptions};
pub use dialer::{Dialer, DialerState, PollState};
pub use error::{Dc09Error, Result};
pub use message::{EventParams, MessageType};
pub use scheduler::{PollSettings, SchedulerActivity};
pub use table::{CellHealth, CellId, Network, Slot};
