//! Domain models for the FIFO sales ledger

mod report;
mod sale;
mod supply;

pub use report::*;
pub use sale::*;
pub use supply::*;
