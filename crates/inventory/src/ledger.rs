//! Append-only stock ledger.

use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use clinic_core::{DomainError, DomainResult, Entity, RecordRef, UserId, uuid_newtype};

use crate::drug::DrugId;
use crate::mutator::StockMutation;

uuid_newtype!(
    /// Stock ledger entry identifier.
    LedgerEntryId,
    "LedgerEntryId"
);

/// Which way stock moved.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StockDirection {
    In,
    Out,
    Adjustment,
}

impl StockDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            StockDirection::In => "in",
            StockDirection::Out => "out",
            StockDirection::Adjustment => "adjustment",
        }
    }

    fn accepts(self, delta: i64) -> bool {
        match self {
            StockDirection::In => delta > 0,
            StockDirection::Out => delta < 0,
            StockDirection::Adjustment => delta != 0,
        }
    }
}

impl FromStr for StockDirection {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in" => Ok(StockDirection::In),
            "out" => Ok(StockDirection::Out),
            "adjustment" => Ok(StockDirection::Adjustment),
            other => Err(DomainError::validation(format!("unknown stock direction '{other}'"))),
        }
    }
}

/// One immutable stock ledger entry.
///
/// There are no setters: entries are built once from a [`StockMutation`] and
/// only ever appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLedgerEntry {
    id: LedgerEntryId,
    drug_id: DrugId,
    direction: StockDirection,
    /// Always positive; the sign lives in `direction` and the snapshots.
    quantity: i64,
    stock_before: i64,
    stock_after: i64,
    reason: String,
    reference: Option<RecordRef>,
    recorded_by: UserId,
    recorded_at: DateTime<Utc>,
}

impl StockLedgerEntry {
    /// Build the ledger entry for an already-applied mutation.
    pub fn record(
        id: LedgerEntryId,
        mutation: &StockMutation,
        direction: StockDirection,
        reason: impl Into<String>,
        reference: Option<RecordRef>,
        recorded_by: UserId,
        recorded_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let reason = reason.into();
        if reason.trim().is_empty() {
            return Err(DomainError::validation("ledger reason cannot be empty"));
        }
        if !direction.accepts(mutation.delta) {
            return Err(DomainError::invariant(format!(
                "direction '{}' does not match stock delta {}",
                direction.as_str(),
                mutation.delta
            )));
        }
        if mutation.stock_before.checked_add(mutation.delta) != Some(mutation.stock_after) {
            return Err(DomainError::invariant("stock snapshot does not add up"));
        }

        Ok(Self {
            id,
            drug_id: mutation.drug_id,
            direction,
            quantity: mutation.delta.abs(),
            stock_before: mutation.stock_before,
            stock_after: mutation.stock_after,
            reason,
            reference,
            recorded_by,
            recorded_at,
        })
    }

    /// Rebuild an entry from persisted columns.
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        id: LedgerEntryId,
        drug_id: DrugId,
        direction: StockDirection,
        quantity: i64,
        stock_before: i64,
        stock_after: i64,
        reason: String,
        reference: Option<RecordRef>,
        recorded_by: UserId,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            drug_id,
            direction,
            quantity,
            stock_before,
            stock_after,
            reason,
            reference,
            recorded_by,
            recorded_at,
        }
    }

    pub fn id_typed(&self) -> LedgerEntryId {
        self.id
    }

    pub fn drug_id(&self) -> DrugId {
        self.drug_id
    }

    pub fn direction(&self) -> StockDirection {
        self.direction
    }

    pub fn quantity(&self) -> i64 {
        self.quantity
    }

    pub fn stock_before(&self) -> i64 {
        self.stock_before
    }

    pub fn stock_after(&self) -> i64 {
        self.stock_after
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn reference(&self) -> Option<&RecordRef> {
        self.reference.as_ref()
    }

    pub fn recorded_by(&self) -> UserId {
        self.recorded_by
    }

    pub fn recorded_at(&self) -> DateTime<Utc> {
        self.recorded_at
    }
}

impl Entity for StockLedgerEntry {
    const KIND: &'static str = "stock_ledger_entry";

    type Id = LedgerEntryId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
