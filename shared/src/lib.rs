//! Shared types and models for the FIFO sales ledger
//!
//! This crate contains types shared between the backend, the browser
//! preview (via WASM), and the matching state machine both of them drive.

pub mod fifo;
pub mod models;
pub mod types;
pub mod validation;

pub use models::*;
pub use types::*;
pub use validation::*;
