#[macro_use]
extern crate itertools;

#[macro_use]
extern crate serde_derive;

#[cfg(test)]
#[macro_use]
extern crate maplit;

#[macro_use]
extern crate log;

/// Error types shared by the partitioner and the score ledgers.
pub mod error;

/// Data representations and processing.
pub mod data;

/// Entity-to-partition assignment for random-effect datasets.
pub mod partition;

/// Per-sample score ledgers and their combination algebra.
pub mod score;

pub mod metrics;

pub mod util;

pub use crate::error::{Error, Result};
