//! Inventory domain module: drugs, stock mutation and the stock ledger.
//!
//! This crate contains business rules for pharmacy stock, implemented purely as
//! deterministic domain logic (no IO, no storage).

pub mod drug;
pub mod ledger;
pub mod mutator;
pub mod policy;

pub use drug::{Drug, DrugId, NewDrug};
pub use ledger::{LedgerEntryId, StockDirection, StockLedgerEntry};
pub use mutator::{StockMutation, apply_delta, set_stock};
pub use policy::StockPolicy;
