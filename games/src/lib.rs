//! Capo Cash games
//!
//! Wagering games that stake and pay through the ledger.
//!
//! # Features
//!
//! - Blackjack with doubling and a single split, dealer hits soft 17
//! - Three-by-three slots with eight paylines and jackpot tiers
//! - Coin flip and die roll
//! - TTL-bounded session store for multi-step games

pub mod blackjack;
pub mod cards;
pub mod rng;
pub mod session;
pub mod slots;
mod stake;
pub mod table;
pub mod wagers;

pub use blackjack::{BlackjackAction, BlackjackGame, HandResult, HandSet, Settlement};
pub use cards::{Card, RandomShoe, Rank, ScriptedShoe, Shoe, Suit};
pub use rng::GameRng;
pub use session::{SessionStore, SessionStoreConfig};
pub use slots::{SlotMachine, SlotSelection, SlotTier, SpinOutcome};
pub use table::{BlackjackTable, BlackjackView};
pub use wagers::{CoinSide, QuickGames, WagerOutcome};
