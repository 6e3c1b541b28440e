use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use clinic_core::{AggregateRoot, DomainError, DomainResult, Money, uuid_newtype};

uuid_newtype!(
    /// Drug identifier.
    DrugId,
    "DrugId"
);

/// Aggregate root: Drug.
///
/// `stock` is only ever changed through [`crate::apply_delta`] /
/// [`crate::set_stock`], which return the before/after snapshot the ledger
/// needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Drug {
    pub(crate) id: DrugId,
    pub(crate) name: String,
    pub(crate) unit_price: Money,
    pub(crate) stock: i64,
    pub(crate) minimum_stock: i64,
    pub(crate) expires_on: Option<NaiveDate>,
    pub(crate) version: u64,
}

/// Input for registering a drug.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDrug {
    pub name: String,
    pub unit_price: i64,
    pub initial_stock: i64,
    pub minimum_stock: i64,
    pub expires_on: Option<NaiveDate>,
}

impl Drug {
    /// Validate a registration request and build the drug at version 0.
    pub fn register(id: DrugId, new: NewDrug) -> DomainResult<Self> {
        if new.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        if new.initial_stock < 0 {
            return Err(DomainError::validation("initial stock cannot be negative"));
        }
        if new.minimum_stock < 0 {
            return Err(DomainError::validation("minimum stock cannot be negative"));
        }
        Ok(Self {
            id,
            name: new.name.trim().to_string(),
            unit_price: Money::non_negative(new.unit_price)?,
            stock: new.initial_stock,
            minimum_stock: new.minimum_stock,
            expires_on: new.expires_on,
            version: 0,
        })
    }

    /// Rebuild a drug from persisted columns.
    pub fn from_parts(
        id: DrugId,
        name: String,
        unit_price: Money,
        stock: i64,
        minimum_stock: i64,
        expires_on: Option<NaiveDate>,
        version: u64,
    ) -> Self {
        Self {
            id,
            name,
            unit_price,
            stock,
            minimum_stock,
            expires_on,
            version,
        }
    }

    /// The same drug as persisted at `version` (stores call this after a write).
    pub fn at_version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    pub fn id_typed(&self) -> DrugId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn unit_price(&self) -> Money {
        self.unit_price
    }

    pub fn stock(&self) -> i64 {
        self.stock
    }

    pub fn minimum_stock(&self) -> i64 {
        self.minimum_stock
    }

    pub fn expires_on(&self) -> Option<NaiveDate> {
        self.expires_on
    }

    /// At or below the reorder threshold.
    pub fn is_low_stock(&self) -> bool {
        self.stock <= self.minimum_stock
    }

    pub fn is_expired(&self, on: NaiveDate) -> bool {
        self.expires_on.is_some_and(|d| d < on)
    }
}

impl AggregateRoot for Drug {
    type Id = DrugId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paracetamol() -> NewDrug {
        NewDrug {
            name: "  Paracetamol 500mg ".to_string(),
            unit_price: 500,
            initial_stock: 100,
            minimum_stock: 10,
            expires_on: NaiveDate::from_ymd_opt(2027, 1, 31),
        }
    }

    #[test]
    fn register_trims_name_and_starts_at_version_zero() {
        let drug = Drug::register(DrugId::new(), paracetamol()).unwrap();
        assert_eq!(drug.name(), "Paracetamol 500mg");
        assert_eq!(drug.stock(), 100);
        assert_eq!(drug.version(), 0);
    }

    #[test]
    fn register_rejects_invalid_input() {
        let mut blank = paracetamol();
        blank.name = "   ".to_string();
        assert!(matches!(
            Drug::register(DrugId::new(), blank),
            Err(DomainError::Validation(_))
        ));

        let mut negative = paracetamol();
        negative.initial_stock = -1;
        assert!(Drug::register(DrugId::new(), negative).is_err());

        let mut free_money = paracetamol();
        free_money.unit_price = -5;
        assert!(Drug::register(DrugId::new(), free_money).is_err());
    }

    #[test]
    fn low_stock_and_expiry() {
        let mut drug = Drug::register(DrugId::new(), paracetamol()).unwrap();
        assert!(!drug.is_low_stock());
        drug.stock = 10;
        assert!(drug.is_low_stock());

        let jan_31 = NaiveDate::from_ymd_opt(2027, 1, 31).unwrap();
        assert!(!drug.is_expired(jan_31));
        assert!(drug.is_expired(jan_31.succ_opt().unwrap()));
    }
}
