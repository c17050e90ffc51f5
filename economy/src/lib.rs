//! Capo Cash economy service
//!
//! The single entry point presentation layers talk to. Player intents come
//! in as [`PlayerAction`]s and leave as [`ActionReply`]s; in between sit the
//! ledger, the games, external award crediting and robbery.

pub mod action;
pub mod config;
pub mod economy;
pub mod event_processor;
pub mod metrics;
pub mod robbery;
pub mod rumble;
pub mod state;

pub use action::{ActionReply, PlayerAction};
pub use config::EconomyConfig;
pub use economy::Economy;
pub use event_processor::{CreditOutcome, EventProcessor};
pub use metrics::{Metrics, MetricsSnapshot, SharedMetrics};
pub use robbery::{RobOutcome, Robbery};
pub use rumble::IncomingMessage;
pub use state::EconomyState;
