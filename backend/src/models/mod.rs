//! Domain models for the FIFO ledger
//!
//! Re-exports models, common types and validation from the shared crate

pub use shared::fifo::{simulate, Demand, FifoMatcher, Lot, LotState, Seed, Settlement};
pub use shared::models::*;
pub use shared::types::*;
pub use shared::validation::*;
