//! Task prioritization for Cadence.
//!
//! Orders a batch of schedulable tasks before they are handed to host
//! allocation. History-derived signals are fetched once per batch into a
//! [`SignalCache`]; sorting then reads only the cache.

pub mod error;
pub mod prioritizer;
pub mod ranking;
pub mod signals;

pub use error::{PrioritizeError, PrioritizeResult};
pub use prioritizer::{Prioritizer, PrioritizerState};
pub use ranking::TaskRanker;
pub use signals::SignalCache;
