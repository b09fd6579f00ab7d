//! mpi-linker library interface
//!
//! Master-record deduplication for patient records arriving from source
//! facilities. For one changed remote record the linker finds candidate
//! central records, scores each pair, adds or retracts `seealso` link
//! annotations, creates a new master record when nothing links, and writes
//! the resulting batch back to the store.

pub mod error;
pub mod logging;
pub mod organization;
pub mod services;
pub mod similarity;
pub mod store;

pub use crate::error::{LinkerError, LinkerResult};
pub use crate::services::{EventKind, ReconciliationOrchestrator, RunReport};
