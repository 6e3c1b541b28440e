//! Application service: the explicit call sequences behind every ledger
//! operation.
//!
//! ## Execution Flow
//!
//! ```text
//! Operation
//!   ↓
//! 1. Read drugs, prescriptions, lines and the medical record from the store
//!   ↓
//! 2. Mutate stock (inventory mutator), write ledger entries, recompute costs
//!   ↓
//! 3. Commit everything as one ChangeSet (versions checked, all or nothing)
//!   ↓
//! 4. On Conflict: re-read and rebuild, up to `conflict_retries` times
//! ```
//!
//! Every line or prescription operation also writes the owning medical record,
//! so two operations on the same record never both commit from the same read.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, instrument, warn};

use clinic_core::{DomainError, Entity, RecordRef, UserId};
use clinic_inventory::{
    Drug, DrugId, LedgerEntryId, NewDrug, StockDirection, StockLedgerEntry, StockMutation,
    apply_delta, set_stock,
};
use clinic_records::{
    CostBreakdown, DailyCode, DailySequence, Doctor, DoctorId, MedicalRecord, MedicalRecordId,
    NewDoctor, PatientId, Prescription, PrescriptionId, PrescriptionLine, PrescriptionLineId,
};

use crate::config::LedgerConfig;
use crate::store::{ChangeSet, ClinicStore, StoreError, VersionedWrite, open_store};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// A referenced drug, doctor, prescription, line or record does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Lost a version race more times than the configured retries allow.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("insufficient stock for {drug}: available {available}, requested {requested}")]
    InsufficientStock {
        drug: String,
        available: i64,
        requested: i64,
    },

    /// Storage is unavailable or returned something unreadable.
    #[error(transparent)]
    Store(StoreError),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

impl From<DomainError> for ServiceError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => ServiceError::Validation(msg),
            DomainError::InvariantViolation(msg) => ServiceError::InvariantViolation(msg),
            DomainError::InvalidId(msg) => ServiceError::Validation(msg),
            DomainError::NotFound(msg) => ServiceError::NotFound(msg),
            DomainError::Conflict(msg) => ServiceError::Conflict(msg),
            DomainError::InsufficientStock {
                drug,
                available,
                requested,
            } => ServiceError::InsufficientStock {
                drug,
                available,
                requested,
            },
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound(msg) => ServiceError::NotFound(msg),
            StoreError::Conflict(msg) => ServiceError::Conflict(msg),
            other @ StoreError::Backend(_) => ServiceError::Store(other),
        }
    }
}

/// One requested line of a new prescription.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRequest {
    pub drug_id: DrugId,
    pub quantity: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenPrescription {
    pub prescription: Prescription,
    pub lines: Vec<PrescriptionLine>,
    pub ledger: Vec<StockLedgerEntry>,
    /// The record's costs after the prescription landed.
    pub costs: CostBreakdown,
    /// Drugs left at or below their minimum.
    pub low_stock: Vec<DrugId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineOutcome {
    pub line: PrescriptionLine,
    pub entry: StockLedgerEntry,
    pub costs: CostBreakdown,
    pub low_stock: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovalOutcome {
    pub line: PrescriptionLine,
    pub entry: StockLedgerEntry,
    pub costs: CostBreakdown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelOutcome {
    pub prescription: Prescription,
    pub ledger: Vec<StockLedgerEntry>,
    pub costs: CostBreakdown,
}

/// Runs the ledger operations against a [`ClinicStore`].
#[derive(Debug)]
pub struct ClinicService<S> {
    store: S,
    config: LedgerConfig,
}

impl<S> ClinicService<S> {
    pub fn new(store: S, config: LedgerConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }
}

impl ClinicService<Arc<dyn ClinicStore>> {
    /// Service over whichever backend `config` selects.
    pub async fn from_config(config: LedgerConfig) -> ServiceResult<Self> {
        let store = open_store(&config).await?;
        Ok(Self::new(store, config))
    }
}

impl<S: ClinicStore> ClinicService<S> {
    #[instrument(skip(self, new), fields(name = %new.name), err)]
    pub async fn register_drug(&self, new: NewDrug, actor: UserId) -> ServiceResult<Drug> {
        let opening = new.initial_stock;
        if opening < 0 {
            return Err(ServiceError::Validation(
                "initial stock cannot be negative".to_string(),
            ));
        }

        let mut drug = Drug::register(
            DrugId::new(),
            NewDrug {
                initial_stock: 0,
                ..new
            },
        )?;

        // Opening stock goes through the mutator so it shows up in the ledger.
        let mut changes = ChangeSet::new();
        if opening > 0 {
            let mutation = apply_delta(&mut drug, opening, self.config.stock_policy)?;
            changes.ledger.push(ledger_entry(
                &mutation,
                StockDirection::In,
                "opening stock",
                None,
                actor,
            )?);
        }
        changes.new_drugs.push(drug.clone());
        self.store.commit(changes).await?;

        info!(drug_id = %drug.id_typed(), stock = drug.stock(), "drug registered");
        Ok(drug)
    }

    #[instrument(skip(self, new), fields(name = %new.name), err)]
    pub async fn register_doctor(&self, new: NewDoctor) -> ServiceResult<Doctor> {
        let doctor = Doctor::register(DoctorId::new(), new)?;
        self.store
            .commit(ChangeSet {
                new_doctors: vec![doctor.clone()],
                ..ChangeSet::new()
            })
            .await?;

        info!(doctor_id = %doctor.id_typed(), fee = %doctor.consultation_fee(), "doctor registered");
        Ok(doctor)
    }

    /// Open a record for a visit on `date`; costs start at fee / 0 / fee.
    #[instrument(skip(self), err)]
    pub async fn open_medical_record(
        &self,
        patient: PatientId,
        doctor: DoctorId,
        date: NaiveDate,
        actor: UserId,
    ) -> ServiceResult<MedicalRecord> {
        self.with_retries("open_medical_record", move || {
            self.try_open_medical_record(patient, doctor, date, actor)
        })
        .await
    }

    async fn try_open_medical_record(
        &self,
        patient: PatientId,
        doctor: DoctorId,
        date: NaiveDate,
        actor: UserId,
    ) -> ServiceResult<MedicalRecord> {
        let doctor = self.load_doctor(doctor).await?;
        let code = self.next_code(&self.config.record_codes, date).await?;
        let record = MedicalRecord::open(
            MedicalRecordId::new(),
            code,
            patient,
            &doctor,
            actor,
            Utc::now(),
        );

        self.store
            .commit(ChangeSet {
                new_records: vec![record.clone()],
                ..ChangeSet::new()
            })
            .await?;

        info!(code = %record.code(), total = %record.costs().total, "medical record opened");
        Ok(record)
    }

    /// Write a prescription with its lines against a medical record.
    ///
    /// Each line dispenses stock (`out` entry referencing the prescription
    /// code) and the record's costs are recomputed, all in one commit.
    #[instrument(skip(self, lines), fields(lines = lines.len()), err)]
    pub async fn write_prescription(
        &self,
        record: MedicalRecordId,
        doctor: DoctorId,
        date: NaiveDate,
        lines: &[LineRequest],
        actor: UserId,
    ) -> ServiceResult<WrittenPrescription> {
        if lines.is_empty() {
            return Err(ServiceError::Validation(
                "a prescription needs at least one line".to_string(),
            ));
        }

        let written = self
            .with_retries("write_prescription", move || {
                self.try_write_prescription(record, doctor, date, lines, actor)
            })
            .await?;

        info!(
            code = %written.prescription.code,
            lines = written.lines.len(),
            total = %written.costs.total,
            "prescription written"
        );
        Ok(written)
    }

    async fn try_write_prescription(
        &self,
        record: MedicalRecordId,
        doctor: DoctorId,
        date: NaiveDate,
        requests: &[LineRequest],
        actor: UserId,
    ) -> ServiceResult<WrittenPrescription> {
        let mut record = self.load_record(record).await?;
        let doctor = self.load_doctor(doctor).await?;
        let code = self.next_code(&self.config.prescription_codes, date).await?;
        let now = Utc::now();

        let prescription = Prescription {
            id: PrescriptionId::new(),
            code,
            medical_record_id: record.id_typed(),
            doctor_id: doctor.id_typed(),
            created_by: actor,
            created_at: now,
        };

        // Several lines may draw on the same drug; they share one copy.
        let mut drugs: BTreeMap<DrugId, Drug> = BTreeMap::new();
        let mut lines = Vec::with_capacity(requests.len());
        let mut ledger = Vec::with_capacity(requests.len());
        for request in requests {
            if !drugs.contains_key(&request.drug_id) {
                let drug = self.load_drug(request.drug_id).await?;
                drugs.insert(request.drug_id, drug);
            }
            let drug = drugs
                .get_mut(&request.drug_id)
                .ok_or_else(|| ServiceError::NotFound(format!("drug {}", request.drug_id)))?;

            let line = PrescriptionLine::new(
                PrescriptionLineId::new(),
                prescription.id,
                drug,
                request.quantity,
                date,
                actor,
                now,
            )?;
            ledger.push(self.dispense(drug, &line, &prescription.code, actor)?);
            lines.push(line);
        }

        let costs = self.costs_after(&record, &[], &lines).await?;
        record.apply_costs(costs);

        let low_stock: Vec<DrugId> = drugs
            .values()
            .filter(|d| d.is_low_stock())
            .map(Drug::id_typed)
            .collect();
        let touched: Vec<Drug> = drugs.into_values().collect();
        self.store
            .commit(ChangeSet {
                new_prescriptions: vec![prescription.clone()],
                new_lines: lines.clone(),
                drug_writes: touched.iter().cloned().map(VersionedWrite::of).collect(),
                record_writes: vec![VersionedWrite::of(record)],
                ledger: ledger.clone(),
                ..ChangeSet::new()
            })
            .await?;
        touched.iter().for_each(warn_if_low);

        Ok(WrittenPrescription {
            prescription,
            lines,
            ledger,
            costs,
            low_stock,
        })
    }

    /// Add a line to an existing prescription (creation transition).
    #[instrument(skip(self), err)]
    pub async fn add_line(
        &self,
        prescription: PrescriptionId,
        drug: DrugId,
        quantity: i64,
        actor: UserId,
    ) -> ServiceResult<LineOutcome> {
        let outcome = self
            .with_retries("add_line", move || self.try_add_line(prescription, drug, quantity, actor))
            .await?;

        info!(
            line_id = %outcome.line.id_typed(),
            stock_after = outcome.entry.stock_after(),
            total = %outcome.costs.total,
            "line added"
        );
        Ok(outcome)
    }

    async fn try_add_line(
        &self,
        prescription: PrescriptionId,
        drug: DrugId,
        quantity: i64,
        actor: UserId,
    ) -> ServiceResult<LineOutcome> {
        let prescription = self.load_prescription(prescription).await?;
        let mut record = self.load_record(prescription.medical_record_id).await?;
        let mut drug = self.load_drug(drug).await?;

        let line = PrescriptionLine::new(
            PrescriptionLineId::new(),
            prescription.id,
            &drug,
            quantity,
            prescription.code.date(),
            actor,
            Utc::now(),
        )?;
        let entry = self.dispense(&mut drug, &line, &prescription.code, actor)?;

        let costs = self.costs_after(&record, &[], std::slice::from_ref(&line)).await?;
        record.apply_costs(costs);

        let low_stock = drug.is_low_stock();
        self.store
            .commit(ChangeSet {
                new_lines: vec![line.clone()],
                drug_writes: vec![VersionedWrite::of(drug.clone())],
                record_writes: vec![VersionedWrite::of(record)],
                ledger: vec![entry.clone()],
                ..ChangeSet::new()
            })
            .await?;
        warn_if_low(&drug);

        Ok(LineOutcome {
            line,
            entry,
            costs,
            low_stock,
        })
    }

    /// Delete a line (deletion transition): stock comes back with an `in`
    /// entry and the record's costs are recomputed.
    ///
    /// Fails with `NotFound` and writes nothing if the line's drug no longer
    /// exists.
    #[instrument(skip(self), err)]
    pub async fn remove_line(
        &self,
        line: PrescriptionLineId,
        actor: UserId,
    ) -> ServiceResult<RemovalOutcome> {
        let outcome = self
            .with_retries("remove_line", move || self.try_remove_line(line, actor))
            .await?;

        info!(
            line_id = %outcome.line.id_typed(),
            stock_after = outcome.entry.stock_after(),
            total = %outcome.costs.total,
            "line removed"
        );
        Ok(outcome)
    }

    async fn try_remove_line(
        &self,
        line: PrescriptionLineId,
        actor: UserId,
    ) -> ServiceResult<RemovalOutcome> {
        let line = self.load_line(line).await?;
        let prescription = self.load_prescription(line.prescription_id()).await?;
        let mut drug = self.load_drug(line.drug_id()).await?;
        let mut record = self.load_record(prescription.medical_record_id).await?;

        let entry = self.restock(
            &mut drug,
            &line,
            format!("line cancelled on prescription {}", prescription.code),
            actor,
        )?;

        let costs = self.costs_after(&record, &[line.id_typed()], &[]).await?;
        record.apply_costs(costs);

        self.store
            .commit(ChangeSet {
                removed_lines: vec![line.id_typed()],
                drug_writes: vec![VersionedWrite::of(drug.clone())],
                record_writes: vec![VersionedWrite::of(record)],
                ledger: vec![entry.clone()],
                ..ChangeSet::new()
            })
            .await?;
        warn_if_low(&drug);

        Ok(RemovalOutcome { line, entry, costs })
    }

    /// Cancel a whole prescription: every line runs the deletion transition,
    /// the prescription is deleted and the record's costs are recomputed.
    #[instrument(skip(self), err)]
    pub async fn cancel_prescription(
        &self,
        prescription: PrescriptionId,
        actor: UserId,
    ) -> ServiceResult<CancelOutcome> {
        let outcome = self
            .with_retries("cancel_prescription", move || {
                self.try_cancel_prescription(prescription, actor)
            })
            .await?;

        info!(
            code = %outcome.prescription.code,
            returned = outcome.ledger.len(),
            total = %outcome.costs.total,
            "prescription cancelled"
        );
        Ok(outcome)
    }

    async fn try_cancel_prescription(
        &self,
        prescription: PrescriptionId,
        actor: UserId,
    ) -> ServiceResult<CancelOutcome> {
        let prescription = self.load_prescription(prescription).await?;
        let mut record = self.load_record(prescription.medical_record_id).await?;
        let lines = self.store.list_lines(prescription.id).await?;

        let mut drugs: BTreeMap<DrugId, Drug> = BTreeMap::new();
        let mut ledger = Vec::with_capacity(lines.len());
        for line in &lines {
            if !drugs.contains_key(&line.drug_id()) {
                let drug = self.load_drug(line.drug_id()).await?;
                drugs.insert(line.drug_id(), drug);
            }
            let drug = drugs
                .get_mut(&line.drug_id())
                .ok_or_else(|| ServiceError::NotFound(format!("drug {}", line.drug_id())))?;
            ledger.push(self.restock(
                drug,
                line,
                format!("prescription {} cancelled", prescription.code),
                actor,
            )?);
        }

        let removed: Vec<PrescriptionLineId> = lines.iter().map(|l| l.id_typed()).collect();
        let costs = self.costs_after(&record, &removed, &[]).await?;
        record.apply_costs(costs);

        let touched: Vec<Drug> = drugs.into_values().collect();
        self.store
            .commit(ChangeSet {
                removed_lines: removed,
                removed_prescriptions: vec![prescription.id],
                drug_writes: touched.iter().cloned().map(VersionedWrite::of).collect(),
                record_writes: vec![VersionedWrite::of(record)],
                ledger: ledger.clone(),
                ..ChangeSet::new()
            })
            .await?;
        touched.iter().for_each(warn_if_low);

        Ok(CancelOutcome {
            prescription,
            ledger,
            costs,
        })
    }

    /// Book incoming stock (`in` entry).
    #[instrument(skip(self, reason), err)]
    pub async fn receive_stock(
        &self,
        drug: DrugId,
        quantity: i64,
        reason: &str,
        actor: UserId,
    ) -> ServiceResult<StockLedgerEntry> {
        if quantity <= 0 {
            return Err(ServiceError::Validation(
                "received quantity must be positive".to_string(),
            ));
        }

        let entry = self
            .with_retries("receive_stock", move || async move {
                let mut drug = self.load_drug(drug).await?;
                let mutation = apply_delta(&mut drug, quantity, self.config.stock_policy)?;
                let entry = ledger_entry(&mutation, StockDirection::In, reason, None, actor)?;
                self.commit_stock(&drug, entry.clone()).await?;
                warn_if_low(&drug);
                Ok(entry)
            })
            .await?;

        info!(drug_id = %drug, stock_after = entry.stock_after(), "stock received");
        Ok(entry)
    }

    /// Set stock to a physically counted value (`adjustment` entry).
    #[instrument(skip(self, reason), err)]
    pub async fn adjust_stock(
        &self,
        drug: DrugId,
        counted: i64,
        reason: &str,
        actor: UserId,
    ) -> ServiceResult<StockLedgerEntry> {
        let entry = self
            .with_retries("adjust_stock", move || async move {
                let mut drug = self.load_drug(drug).await?;
                let mutation = set_stock(&mut drug, counted, self.config.stock_policy)?;
                let entry =
                    ledger_entry(&mutation, StockDirection::Adjustment, reason, None, actor)?;
                self.commit_stock(&drug, entry.clone()).await?;
                warn_if_low(&drug);
                Ok(entry)
            })
            .await?;

        info!(
            drug_id = %drug,
            stock_before = entry.stock_before(),
            stock_after = entry.stock_after(),
            "stock adjusted"
        );
        Ok(entry)
    }

    /// Recompute a record's costs from its current lines.
    ///
    /// Idempotent: writes only when the stored breakdown is out of date.
    #[instrument(skip(self), err)]
    pub async fn recompute_costs(&self, record: MedicalRecordId) -> ServiceResult<CostBreakdown> {
        self.with_retries("recompute_costs", move || async move {
            let mut record = self.load_record(record).await?;
            let costs = self.costs_after(&record, &[], &[]).await?;
            if record.apply_costs(costs) {
                self.store
                    .commit(ChangeSet {
                        record_writes: vec![VersionedWrite::of(record)],
                        ..ChangeSet::new()
                    })
                    .await?;
                info!(total = %costs.total, "record costs corrected");
            }
            Ok(costs)
        })
        .await
    }

    /// Ledger entries for a drug, oldest first.
    pub async fn ledger_for_drug(&self, drug: DrugId) -> ServiceResult<Vec<StockLedgerEntry>> {
        Ok(self.store.ledger_for_drug(drug).await?)
    }

    /// Drugs at or below their minimum stock, by name.
    pub async fn low_stock_drugs(&self) -> ServiceResult<Vec<Drug>> {
        let drugs = self.store.list_drugs().await?;
        Ok(drugs.into_iter().filter(Drug::is_low_stock).collect())
    }

    pub async fn drug(&self, id: DrugId) -> ServiceResult<Drug> {
        self.load_drug(id).await
    }

    pub async fn medical_record(&self, id: MedicalRecordId) -> ServiceResult<MedicalRecord> {
        self.load_record(id).await
    }

    /// Prescriptions written against a record, oldest first.
    pub async fn prescriptions_for_record(
        &self,
        record: MedicalRecordId,
    ) -> ServiceResult<Vec<Prescription>> {
        self.load_record(record).await?;
        Ok(self.store.list_prescriptions(record).await?)
    }

    pub async fn prescription_lines(
        &self,
        prescription: PrescriptionId,
    ) -> ServiceResult<Vec<PrescriptionLine>> {
        self.load_prescription(prescription).await?;
        Ok(self.store.list_lines(prescription).await?)
    }

    /// Run `attempt`, rebuilding it from fresh reads whenever it loses a
    /// version race, until it succeeds or the retries are used up.
    async fn with_retries<T, F, Fut>(&self, operation: &'static str, mut attempt: F) -> ServiceResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ServiceResult<T>>,
    {
        let mut retries = 0u32;
        loop {
            match attempt().await {
                Err(ServiceError::Conflict(reason)) if retries < self.config.conflict_retries => {
                    retries += 1;
                    warn!(operation, retry = retries, %reason, "change set lost a version race; retrying");
                }
                other => return other,
            }
        }
    }

    async fn commit_stock(&self, drug: &Drug, entry: StockLedgerEntry) -> ServiceResult<()> {
        self.store
            .commit(ChangeSet {
                drug_writes: vec![VersionedWrite::of(drug.clone())],
                ledger: vec![entry],
                ..ChangeSet::new()
            })
            .await?;
        Ok(())
    }

    /// Creation transition: take the line's quantity out of stock.
    fn dispense(
        &self,
        drug: &mut Drug,
        line: &PrescriptionLine,
        code: &DailyCode,
        actor: UserId,
    ) -> ServiceResult<StockLedgerEntry> {
        let mutation = apply_delta(drug, -line.quantity(), self.config.stock_policy)?;
        ledger_entry(
            &mutation,
            StockDirection::Out,
            format!("dispensed for prescription {code}"),
            Some(line.record_ref()),
            actor,
        )
    }

    /// Deletion transition: put the line's quantity back.
    fn restock(
        &self,
        drug: &mut Drug,
        line: &PrescriptionLine,
        reason: String,
        actor: UserId,
    ) -> ServiceResult<StockLedgerEntry> {
        let mutation = apply_delta(drug, line.quantity(), self.config.stock_policy)?;
        ledger_entry(
            &mutation,
            StockDirection::In,
            reason,
            Some(line.record_ref()),
            actor,
        )
    }

    /// Costs of `record` once `removed` lines are gone and `added` lines exist.
    async fn costs_after(
        &self,
        record: &MedicalRecord,
        removed: &[PrescriptionLineId],
        added: &[PrescriptionLine],
    ) -> ServiceResult<CostBreakdown> {
        let doctor = self.load_doctor(record.doctor_id()).await?;
        let existing = self.store.list_lines_for_record(record.id_typed()).await?;
        let lines = existing
            .iter()
            .filter(|l| !removed.contains(&l.id_typed()))
            .chain(added.iter());
        Ok(CostBreakdown::compute(doctor.consultation_fee(), lines)?)
    }

    async fn next_code(
        &self,
        sequence: &DailySequence,
        date: NaiveDate,
    ) -> ServiceResult<DailyCode> {
        let latest = self.store.latest_code(sequence.prefix(), date).await?;
        Ok(sequence.next(date, latest.as_ref())?)
    }

    async fn load_drug(&self, id: DrugId) -> ServiceResult<Drug> {
        self.store
            .get_drug(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("drug {id}")))
    }

    async fn load_doctor(&self, id: DoctorId) -> ServiceResult<Doctor> {
        self.store
            .get_doctor(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("doctor {id}")))
    }

    async fn load_record(&self, id: MedicalRecordId) -> ServiceResult<MedicalRecord> {
        self.store
            .get_medical_record(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("medical record {id}")))
    }

    async fn load_prescription(&self, id: PrescriptionId) -> ServiceResult<Prescription> {
        self.store
            .get_prescription(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("prescription {id}")))
    }

    async fn load_line(&self, id: PrescriptionLineId) -> ServiceResult<PrescriptionLine> {
        self.store
            .get_line(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("prescription line {id}")))
    }
}

fn ledger_entry(
    mutation: &StockMutation,
    direction: StockDirection,
    reason: impl Into<String>,
    reference: Option<RecordRef>,
    actor: UserId,
) -> ServiceResult<StockLedgerEntry> {
    Ok(StockLedgerEntry::record(
        LedgerEntryId::new(),
        mutation,
        direction,
        reason,
        reference,
        actor,
        Utc::now(),
    )?)
}

fn warn_if_low(drug: &Drug) {
    if drug.is_low_stock() {
        warn!(
            drug_id = %drug.id_typed(),
            drug = drug.name(),
            stock = drug.stock(),
            minimum = drug.minimum_stock(),
            "stock at or below minimum"
        );
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::store::{InMemoryClinicStore, StoreResult};

    /// Fails the first `conflicts` commits as if another writer got there first.
    struct RacyStore {
        inner: InMemoryClinicStore,
        conflicts: AtomicU32,
    }

    impl RacyStore {
        fn new(conflicts: u32) -> Self {
            Self {
                inner: InMemoryClinicStore::new(),
                conflicts: AtomicU32::new(conflicts),
            }
        }

        fn lose_next(&self, n: u32) {
            self.conflicts.store(n, Ordering::SeqCst);
        }
    }

    #[async_trait::async_trait]
    impl ClinicStore for RacyStore {
        async fn get_drug(&self, id: DrugId) -> StoreResult<Option<Drug>> {
            self.inner.get_drug(id).await
        }
        async fn list_drugs(&self) -> StoreResult<Vec<Drug>> {
            self.inner.list_drugs().await
        }
        async fn remove_drug(&self, id: DrugId) -> StoreResult<()> {
            self.inner.remove_drug(id).await
        }
        async fn get_doctor(&self, id: DoctorId) -> StoreResult<Option<Doctor>> {
            self.inner.get_doctor(id).await
        }
        async fn get_medical_record(&self, id: MedicalRecordId) -> StoreResult<Option<MedicalRecord>> {
            self.inner.get_medical_record(id).await
        }
        async fn get_prescription(&self, id: PrescriptionId) -> StoreResult<Option<Prescription>> {
            self.inner.get_prescription(id).await
        }
        async fn list_prescriptions(&self, record: MedicalRecordId) -> StoreResult<Vec<Prescription>> {
            self.inner.list_prescriptions(record).await
        }
        async fn get_line(&self, id: PrescriptionLineId) -> StoreResult<Option<PrescriptionLine>> {
            self.inner.get_line(id).await
        }
        async fn list_lines(&self, prescription: PrescriptionId) -> StoreResult<Vec<PrescriptionLine>> {
            self.inner.list_lines(prescription).await
        }
        async fn list_lines_for_record(&self, record: MedicalRecordId) -> StoreResult<Vec<PrescriptionLine>> {
            self.inner.list_lines_for_record(record).await
        }
        async fn latest_code(&self, prefix: &str, date: NaiveDate) -> StoreResult<Option<DailyCode>> {
            self.inner.latest_code(prefix, date).await
        }
        async fn ledger_for_drug(&self, id: DrugId) -> StoreResult<Vec<StockLedgerEntry>> {
            self.inner.ledger_for_drug(id).await
        }
        async fn commit(&self, changes: ChangeSet) -> StoreResult<()> {
            let left = self.conflicts.load(Ordering::SeqCst);
            if left > 0 {
                self.conflicts.store(left - 1, Ordering::SeqCst);
                return Err(StoreError::Conflict("simulated concurrent writer".to_string()));
            }
            self.inner.commit(changes).await
        }
    }

    fn amoxicillin(stock: i64) -> NewDrug {
        NewDrug {
            name: "Amoxicillin 500mg".to_string(),
            unit_price: 800,
            initial_stock: stock,
            minimum_stock: 5,
            expires_on: None,
        }
    }

    fn config(retries: u32) -> LedgerConfig {
        LedgerConfig {
            conflict_retries: retries,
            ..LedgerConfig::default()
        }
    }

    #[tokio::test]
    async fn conflicts_are_retried_up_to_the_limit() {
        let actor = UserId::new();
        let service = ClinicService::new(Arc::new(RacyStore::new(0)), config(2));
        let drug = service.register_drug(amoxicillin(20), actor).await.unwrap();

        service.store().lose_next(2);
        let entry = service
            .receive_stock(drug.id_typed(), 5, "delivery", actor)
            .await
            .unwrap();
        assert_eq!(entry.stock_after(), 25);

        service.store().lose_next(3);
        let err = service
            .receive_stock(drug.id_typed(), 5, "delivery", actor)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
        assert_eq!(service.drug(drug.id_typed()).await.unwrap().stock(), 25);
    }

    #[tokio::test]
    async fn opening_stock_is_booked_in_the_ledger() {
        let service = ClinicService::new(InMemoryClinicStore::new(), LedgerConfig::default());
        let drug = service.register_drug(amoxicillin(40), UserId::new()).await.unwrap();

        let ledger = service.ledger_for_drug(drug.id_typed()).await.unwrap();
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger[0].direction(), StockDirection::In);
        assert_eq!((ledger[0].stock_before(), ledger[0].stock_after()), (0, 40));

        let empty = service.register_drug(amoxicillin(0), UserId::new()).await.unwrap();
        assert!(service.ledger_for_drug(empty.id_typed()).await.unwrap().is_empty());
        assert!(service.register_drug(amoxicillin(-1), UserId::new()).await.is_err());
    }

    #[tokio::test]
    async fn adjust_stock_records_the_counted_difference() {
        let service = ClinicService::new(InMemoryClinicStore::new(), LedgerConfig::default());
        let actor = UserId::new();
        let drug = service.register_drug(amoxicillin(30), actor).await.unwrap();

        let entry = service
            .adjust_stock(drug.id_typed(), 27, "stock take", actor)
            .await
            .unwrap();
        assert_eq!(entry.direction(), StockDirection::Adjustment);
        assert_eq!(entry.quantity(), 3);
        assert_eq!((entry.stock_before(), entry.stock_after()), (30, 27));

        let err = service
            .adjust_stock(drug.id_typed(), 27, "stock take", actor)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
        assert!(matches!(
            service.adjust_stock(drug.id_typed(), 20, "  ", actor).await,
            Err(ServiceError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn low_stock_drugs_lists_only_drugs_at_or_below_minimum() {
        let service = ClinicService::new(InMemoryClinicStore::new(), LedgerConfig::default());
        let actor = UserId::new();
        let plenty = service.register_drug(amoxicillin(50), actor).await.unwrap();
        let mut low = amoxicillin(5);
        low.name = "Cetirizine 10mg".to_string();
        let low = service.register_drug(low, actor).await.unwrap();

        let flagged = service.low_stock_drugs().await.unwrap();
        assert_eq!(flagged.len(), 1);
        assert_eq!(flagged[0].id_typed(), low.id_typed());
        assert_ne!(flagged[0].id_typed(), plenty.id_typed());
    }

    /// Collects formatted log output for the current thread.
    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl CapturedLogs {
        fn count(&self, needle: &str) -> usize {
            String::from_utf8_lossy(&self.0.lock().unwrap()).matches(needle).count()
        }
    }

    #[tokio::test]
    async fn from_config_runs_on_the_configured_in_memory_store() {
        let service = ClinicService::from_config(config(1)).await.unwrap();
        assert_eq!(service.config().conflict_retries, 1);

        let drug = service.register_drug(amoxicillin(12), UserId::new()).await.unwrap();
        assert_eq!(service.drug(drug.id_typed()).await.unwrap().stock(), 12);
    }

    #[tokio::test]
    async fn every_stock_change_warns_when_it_leaves_the_drug_low() {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let _guard = tracing::subscriber::set_default(
            tracing_subscriber::fmt()
                .with_writer(move || writer.clone())
                .with_ansi(false)
                .finish(),
        );
        let low = "stock at or below minimum";

        let service = ClinicService::new(InMemoryClinicStore::new(), LedgerConfig::default());
        let actor = UserId::new();
        let drug = service.register_drug(amoxicillin(3), actor).await.unwrap();
        assert_eq!(logs.count(low), 0);

        service.receive_stock(drug.id_typed(), 1, "delivery", actor).await.unwrap();
        assert_eq!(logs.count(low), 1);

        service.adjust_stock(drug.id_typed(), 50, "stock take", actor).await.unwrap();
        assert_eq!(logs.count(low), 1);

        service.adjust_stock(drug.id_typed(), 2, "stock take", actor).await.unwrap();
        assert_eq!(logs.count(low), 2);
    }

    #[tokio::test]
    async fn prescriptions_for_record_lists_what_was_written() {
        let service = ClinicService::new(InMemoryClinicStore::new(), LedgerConfig::default());
        let actor = UserId::new();
        let doctor = service
            .register_doctor(NewDoctor {
                name: "dr. Lim".to_string(),
                consultation_fee: 50_000,
            })
            .await
            .unwrap();
        let day = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();
        let record = service
            .open_medical_record(PatientId::new(), doctor.id_typed(), day, actor)
            .await
            .unwrap();
        assert!(service.prescriptions_for_record(record.id_typed()).await.unwrap().is_empty());

        let drug = service.register_drug(amoxicillin(20), actor).await.unwrap();
        let written = service
            .write_prescription(
                record.id_typed(),
                doctor.id_typed(),
                day,
                &[LineRequest {
                    drug_id: drug.id_typed(),
                    quantity: 2,
                }],
                actor,
            )
            .await
            .unwrap();

        let listed = service.prescriptions_for_record(record.id_typed()).await.unwrap();
        assert_eq!(listed, vec![written.prescription]);
        assert!(matches!(
            service.prescriptions_for_record(MedicalRecordId::new()).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[test]
    fn store_errors_keep_their_kind() {
        assert_eq!(
            ServiceError::from(StoreError::Conflict("x".into())),
            ServiceError::Conflict("x".into())
        );
        assert!(matches!(
            ServiceError::from(StoreError::Backend("down".into())),
            ServiceError::Store(StoreError::Backend(_))
        ));
        assert!(matches!(
            ServiceError::from(DomainError::InsufficientStock {
                drug: "x".into(),
                available: 1,
                requested: 2
            }),
            ServiceError::InsufficientStock { available: 1, requested: 2, .. }
        ));
    }
}
