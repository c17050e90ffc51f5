//! Capo Cash Common Types
//!
//! Shared types used across the economy engine: identifiers, currency
//! amounts, transaction records, guild settings, errors and time.

pub mod identifiers;
pub mod monetary;
pub mod transaction;
pub mod guild;
pub mod error;
pub mod time;

pub use identifiers::*;
pub use monetary::*;
pub use transaction::*;
pub use guild::*;
pub use error::*;
pub use time::*;
