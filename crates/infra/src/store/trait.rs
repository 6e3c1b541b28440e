use std::sync::Arc;

use chrono::NaiveDate;
use thiserror::Error;

use clinic_core::{AggregateRoot, ExpectedVersion};
use clinic_inventory::{Drug, DrugId, StockLedgerEntry};
use clinic_records::{
    DailyCode, Doctor, DoctorId, MedicalRecord, MedicalRecordId, Prescription, PrescriptionId,
    PrescriptionLine, PrescriptionLineId,
};

/// Storage operation error.
///
/// These are **infrastructure errors** as opposed to domain errors
/// (validation, invariants).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A row the change set writes to or removes does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A version check or uniqueness constraint failed; nothing was written.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The backend failed (connection, serialization, unexpected row shape).
    #[error("storage backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// An update guarded by the version the value was read at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedWrite<T> {
    pub value: T,
    pub expected: ExpectedVersion,
}

impl<T: AggregateRoot> VersionedWrite<T> {
    /// Write `value` back, expecting the stored row to still be at the version
    /// it carries.
    pub fn of(value: T) -> Self {
        let expected = ExpectedVersion::of(&value);
        Self { value, expected }
    }
}

/// Everything one operation writes, committed as a single unit.
///
/// Commit validates every expected version, every referenced row and every
/// uniqueness rule before applying anything. Either all of it lands or none
/// of it does.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub new_doctors: Vec<Doctor>,
    pub new_drugs: Vec<Drug>,
    pub new_records: Vec<MedicalRecord>,
    pub new_prescriptions: Vec<Prescription>,
    pub new_lines: Vec<PrescriptionLine>,
    pub removed_lines: Vec<PrescriptionLineId>,
    pub removed_prescriptions: Vec<PrescriptionId>,
    /// Stock writes. Stored version becomes current + 1.
    pub drug_writes: Vec<VersionedWrite<Drug>>,
    /// Derived-cost writes. Stored version becomes current + 1.
    pub record_writes: Vec<VersionedWrite<MedicalRecord>>,
    /// Append-only.
    pub ledger: Vec<StockLedgerEntry>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.new_doctors.is_empty()
            && self.new_drugs.is_empty()
            && self.new_records.is_empty()
            && self.new_prescriptions.is_empty()
            && self.new_lines.is_empty()
            && self.removed_lines.is_empty()
            && self.removed_prescriptions.is_empty()
            && self.drug_writes.is_empty()
            && self.record_writes.is_empty()
            && self.ledger.is_empty()
    }
}

/// Persistence boundary for drugs, the stock ledger, prescriptions and medical
/// records.
///
/// Reads are plain lookups; all writes go through [`ClinicStore::commit`].
/// Implementations must:
/// - apply a change set atomically (all or nothing)
/// - reject stale `VersionedWrite`s with `StoreError::Conflict`
/// - reject duplicate codes with `StoreError::Conflict`
/// - never update or delete ledger entries
#[async_trait::async_trait]
pub trait ClinicStore: Send + Sync {
    async fn get_drug(&self, id: DrugId) -> StoreResult<Option<Drug>>;

    async fn list_drugs(&self) -> StoreResult<Vec<Drug>>;

    /// Delete a drug row outside the ledger flow (administrative cleanup).
    async fn remove_drug(&self, id: DrugId) -> StoreResult<()>;

    async fn get_doctor(&self, id: DoctorId) -> StoreResult<Option<Doctor>>;

    async fn get_medical_record(&self, id: MedicalRecordId) -> StoreResult<Option<MedicalRecord>>;

    async fn get_prescription(&self, id: PrescriptionId) -> StoreResult<Option<Prescription>>;

    async fn list_prescriptions(&self, record: MedicalRecordId) -> StoreResult<Vec<Prescription>>;

    async fn get_line(&self, id: PrescriptionLineId) -> StoreResult<Option<PrescriptionLine>>;

    async fn list_lines(&self, prescription: PrescriptionId) -> StoreResult<Vec<PrescriptionLine>>;

    /// Every line of every prescription linked to the record.
    async fn list_lines_for_record(&self, record: MedicalRecordId) -> StoreResult<Vec<PrescriptionLine>>;

    /// Highest code issued for `prefix` on `date`, across prescriptions and records.
    async fn latest_code(&self, prefix: &str, date: NaiveDate) -> StoreResult<Option<DailyCode>>;

    /// Ledger entries for a drug in the order they were appended.
    async fn ledger_for_drug(&self, id: DrugId) -> StoreResult<Vec<StockLedgerEntry>>;

    async fn commit(&self, changes: ChangeSet) -> StoreResult<()>;
}

#[async_trait::async_trait]
impl<S> ClinicStore for Arc<S>
where
    S: ClinicStore + ?Sized,
{
    async fn get_drug(&self, id: DrugId) -> StoreResult<Option<Drug>> {
        (**self).get_drug(id).await
    }

    async fn list_drugs(&self) -> StoreResult<Vec<Drug>> {
        (**self).list_drugs().await
    }

    async fn remove_drug(&self, id: DrugId) -> StoreResult<()> {
        (**self).remove_drug(id).await
    }

    async fn get_doctor(&self, id: DoctorId) -> StoreResult<Option<Doctor>> {
        (**self).get_doctor(id).await
    }

    async fn get_medical_record(&self, id: MedicalRecordId) -> StoreResult<Option<MedicalRecord>> {
        (**self).get_medical_record(id).await
    }

    async fn get_prescription(&self, id: PrescriptionId) -> StoreResult<Option<Prescription>> {
        (**self).get_prescription(id).await
    }

    async fn list_prescriptions(&self, record: MedicalRecordId) -> StoreResult<Vec<Prescription>> {
        (**self).list_prescriptions(record).await
    }

    async fn get_line(&self, id: PrescriptionLineId) -> StoreResult<Option<PrescriptionLine>> {
        (**self).get_line(id).await
    }

    async fn list_lines(&self, prescription: PrescriptionId) -> StoreResult<Vec<PrescriptionLine>> {
        (**self).list_lines(prescription).await
    }

    async fn list_lines_for_record(&self, record: MedicalRecordId) -> StoreResult<Vec<PrescriptionLine>> {
        (**self).list_lines_for_record(record).await
    }

    async fn latest_code(&self, prefix: &str, date: NaiveDate) -> StoreResult<Option<DailyCode>> {
        (**self).latest_code(prefix, date).await
    }

    async fn ledger_for_drug(&self, id: DrugId) -> StoreResult<Vec<StockLedgerEntry>> {
        (**self).ledger_for_drug(id).await
    }

    async fn commit(&self, changes: ChangeSet) -> StoreResult<()> {
        (**self).commit(changes).await
    }
}
