use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use clinic_core::{DomainError, DomainResult, Entity, Money, UserId, uuid_newtype};
use clinic_inventory::{Drug, DrugId};

use crate::code::DailyCode;
use crate::doctor::DoctorId;
use crate::medical_record::MedicalRecordId;

uuid_newtype!(
    /// Prescription identifier.
    PrescriptionId,
    "PrescriptionId"
);

uuid_newtype!(
    /// Prescription line identifier.
    PrescriptionLineId,
    "PrescriptionLineId"
);

/// A prescription written against a medical record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prescription {
    pub id: PrescriptionId,
    pub code: DailyCode,
    pub medical_record_id: MedicalRecordId,
    pub doctor_id: DoctorId,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
}

impl Entity for Prescription {
    const KIND: &'static str = "prescription";

    type Id = PrescriptionId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// One drug-and-quantity entry within a prescription.
///
/// The unit price is captured from the drug when the line is written and never
/// follows later price changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrescriptionLine {
    id: PrescriptionLineId,
    prescription_id: PrescriptionId,
    drug_id: DrugId,
    quantity: i64,
    unit_price: Money,
    created_by: UserId,
    created_at: DateTime<Utc>,
}

impl PrescriptionLine {
    /// `prescribed_on` is the visit day the prescription is written for; the
    /// drug must not have expired before it.
    pub fn new(
        id: PrescriptionLineId,
        prescription_id: PrescriptionId,
        drug: &Drug,
        quantity: i64,
        prescribed_on: NaiveDate,
        created_by: UserId,
        created_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if quantity <= 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }
        if drug.is_expired(prescribed_on) {
            return Err(DomainError::validation(format!(
                "{} expired and cannot be prescribed",
                drug.name()
            )));
        }
        Ok(Self {
            id,
            prescription_id,
            drug_id: drug.id_typed(),
            quantity,
            unit_price: drug.unit_price(),
            created_by,
            created_at,
        })
    }

    /// Rebuild a line from persisted columns.
    pub fn from_parts(
        id: PrescriptionLineId,
        prescription_id: PrescriptionId,
        drug_id: DrugId,
        quantity: i64,
        unit_price: Money,
        created_by: UserId,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            prescription_id,
            drug_id,
            quantity,
            unit_price,
            created_by,
            created_at,
        }
    }

    pub fn id_typed(&self) -> PrescriptionLineId {
        self.id
    }

    pub fn prescription_id(&self) -> PrescriptionId {
        self.prescription_id
    }

    pub fn drug_id(&self) -> DrugId {
        self.drug_id
    }

    pub fn quantity(&self) -> i64 {
        self.quantity
    }

    pub fn unit_price(&self) -> Money {
        self.unit_price
    }

    pub fn created_by(&self) -> UserId {
        self.created_by
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// quantity × captured unit price.
    pub fn cost(&self) -> DomainResult<Money> {
        self.unit_price.times(self.quantity)
    }
}

impl Entity for PrescriptionLine {
    const KIND: &'static str = "prescription_line";

    type Id = PrescriptionLineId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
