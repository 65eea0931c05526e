//! Business logic services for the FIFO ledger

pub mod anchor;
pub mod ledger;
pub mod locks;
pub mod matching;
pub mod reporting;
pub mod stream;

pub use anchor::Anchor;
pub use ledger::LedgerService;
pub use locks::SkuLocks;
pub use matching::{recompute, BatchWriter, PassSummary};
pub use reporting::ReportingService;
pub use stream::{OrderedStream, SaleStream, SupplyStream};
