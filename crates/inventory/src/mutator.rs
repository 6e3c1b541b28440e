//! Inventory mutator: the only place drug stock changes.

use serde::{Deserialize, Serialize};

use clinic_core::{DomainError, DomainResult};

use crate::drug::{Drug, DrugId};
use crate::policy::StockPolicy;

/// Before/after snapshot of one applied stock change.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMutation {
    pub drug_id: DrugId,
    pub delta: i64,
    pub stock_before: i64,
    pub stock_after: i64,
}

/// Apply a signed delta to the drug's available stock.
///
/// The drug is updated in place; persisting it (guarded by its version) is the
/// caller's job. Under [`StockPolicy::RejectNegative`] a withdrawal that would
/// take stock below zero fails with `InsufficientStock` and leaves the drug
/// untouched. Returns are never refused.
pub fn apply_delta(drug: &mut Drug, delta: i64, policy: StockPolicy) -> DomainResult<StockMutation> {
    if delta == 0 {
        return Err(DomainError::validation("delta cannot be zero"));
    }

    let before = drug.stock;
    let after = before
        .checked_add(delta)
        .ok_or_else(|| DomainError::validation("stock overflow"))?;

    if delta < 0 && after < 0 && policy == StockPolicy::RejectNegative {
        return Err(DomainError::InsufficientStock {
            drug: drug.name.clone(),
            available: before,
            requested: -delta,
        });
    }

    drug.stock = after;
    Ok(StockMutation {
        drug_id: drug.id,
        delta,
        stock_before: before,
        stock_after: after,
    })
}

/// Set stock to a physically counted value (stock take).
pub fn set_stock(drug: &mut Drug, counted: i64, policy: StockPolicy) -> DomainResult<StockMutation> {
    if counted < 0 {
        return Err(DomainError::validation("counted stock cannot be negative"));
    }
    if counted == drug.stock {
        return Err(DomainError::validation("counted stock matches current stock"));
    }
    let delta = counted
        .checked_sub(drug.stock)
        .ok_or_else(|| DomainError::validation("stock overflow"))?;
    apply_delta(drug, delta, policy)
}
