//! `selrs-core`: ledger domain building blocks.
//!
//! This crate contains **pure domain** primitives (no storage or network).

pub mod date;
pub mod error;
pub mod id;
pub mod ledger;

pub use error::{DomainError, DomainResult};
pub use id::RecordId;
pub use ledger::{
    BaitInput, BaitRecord, InstaPayInput, InstaPayRecord, KhazinaInput, KhazinaRecord, LedgerKind,
    LedgerRecord, QardInput, QardRecord, SulfInput, SulfRecord,
};
