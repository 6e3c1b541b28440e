use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::RwLock;

use chrono::NaiveDate;

use clinic_core::AggregateRoot;
use clinic_inventory::{Drug, DrugId, StockLedgerEntry};
use clinic_records::{
    DailyCode, Doctor, DoctorId, MedicalRecord, MedicalRecordId, Prescription, PrescriptionId,
    PrescriptionLine, PrescriptionLineId,
};

use super::r#trait::{ChangeSet, ClinicStore, StoreError, StoreResult};

#[derive(Debug, Clone, Default)]
struct State {
    drugs: HashMap<DrugId, Drug>,
    doctors: HashMap<DoctorId, Doctor>,
    records: HashMap<MedicalRecordId, MedicalRecord>,
    // Keyed by UUIDv7 ids, so iteration follows creation order.
    prescriptions: BTreeMap<PrescriptionId, Prescription>,
    lines: BTreeMap<PrescriptionLineId, PrescriptionLine>,
    ledger: Vec<StockLedgerEntry>,
}

impl State {
    fn apply(&mut self, changes: ChangeSet) -> StoreResult<()> {
        for doctor in changes.new_doctors {
            let id = doctor.id_typed();
            if self.doctors.insert(id, doctor).is_some() {
                return Err(StoreError::Conflict(format!("doctor {id} already exists")));
            }
        }

        for drug in changes.new_drugs {
            let id = drug.id_typed();
            if self.drugs.insert(id, drug).is_some() {
                return Err(StoreError::Conflict(format!("drug {id} already exists")));
            }
        }

        for record in changes.new_records {
            let id = record.id_typed();
            if self.records.values().any(|r| r.code() == record.code()) {
                return Err(StoreError::Conflict(format!("code {} already issued", record.code())));
            }
            if self.records.insert(id, record).is_some() {
                return Err(StoreError::Conflict(format!("medical record {id} already exists")));
            }
        }

        for prescription in changes.new_prescriptions {
            let id = prescription.id;
            if self.prescriptions.values().any(|p| p.code == prescription.code) {
                return Err(StoreError::Conflict(format!(
                    "code {} already issued",
                    prescription.code
                )));
            }
            if !self.records.contains_key(&prescription.medical_record_id) {
                return Err(StoreError::NotFound(format!(
                    "medical record {}",
                    prescription.medical_record_id
                )));
            }
            if self.prescriptions.insert(id, prescription).is_some() {
                return Err(StoreError::Conflict(format!("prescription {id} already exists")));
            }
        }

        for id in &changes.removed_lines {
            if self.lines.remove(id).is_none() {
                return Err(StoreError::NotFound(format!("prescription line {id}")));
            }
        }

        let removed: HashSet<PrescriptionId> = changes.removed_prescriptions.iter().copied().collect();
        for id in &changes.removed_prescriptions {
            if self.prescriptions.remove(id).is_none() {
                return Err(StoreError::NotFound(format!("prescription {id}")));
            }
            if self.lines.values().any(|l| l.prescription_id() == *id) {
                return Err(StoreError::Conflict(format!(
                    "prescription {id} still has lines"
                )));
            }
        }

        for line in changes.new_lines {
            let id = line.id_typed();
            let parent = line.prescription_id();
            if removed.contains(&parent) || !self.prescriptions.contains_key(&parent) {
                return Err(StoreError::NotFound(format!("prescription {parent}")));
            }
            if self.lines.insert(id, line).is_some() {
                return Err(StoreError::Conflict(format!("prescription line {id} already exists")));
            }
        }

        for write in changes.drug_writes {
            let id = write.value.id_typed();
            let current = self
                .drugs
                .get(&id)
                .ok_or_else(|| StoreError::NotFound(format!("drug {id}")))?
                .version();
            if !write.expected.matches(current) {
                return Err(StoreError::Conflict(format!(
                    "drug {id}: expected {:?}, found {current}",
                    write.expected
                )));
            }
            self.drugs.insert(id, write.value.at_version(current + 1));
        }

        for write in changes.record_writes {
            let id = write.value.id_typed();
            let current = self
                .records
                .get(&id)
                .ok_or_else(|| StoreError::NotFound(format!("medical record {id}")))?
                .version();
            if !write.expected.matches(current) {
                return Err(StoreError::Conflict(format!(
                    "medical record {id}: expected {:?}, found {current}",
                    write.expected
                )));
            }
            self.records.insert(id, write.value.at_version(current + 1));
        }

        self.ledger.extend(changes.ledger);
        Ok(())
    }
}

/// In-memory clinic store.
///
/// Intended for tests/dev. Commits are serialized behind one lock and applied
/// to a copy of the state that only replaces the live state if every check
/// passes. Not optimized for performance.
#[derive(Debug, Default)]
pub struct InMemoryClinicStore {
    state: RwLock<State>,
}

impl InMemoryClinicStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read<T>(&self, f: impl FnOnce(&State) -> T) -> StoreResult<T> {
        let state = self
            .state
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;
        Ok(f(&state))
    }
}

#[async_trait::async_trait]
impl ClinicStore for InMemoryClinicStore {
    async fn get_drug(&self, id: DrugId) -> StoreResult<Option<Drug>> {
        self.read(|s| s.drugs.get(&id).cloned())
    }

    async fn list_drugs(&self) -> StoreResult<Vec<Drug>> {
        self.read(|s| {
            let mut drugs: Vec<_> = s.drugs.values().cloned().collect();
            drugs.sort_by(|a, b| a.name().cmp(b.name()));
            drugs
        })
    }

    async fn remove_drug(&self, id: DrugId) -> StoreResult<()> {
        let mut state = self
            .state
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;
        state
            .drugs
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(format!("drug {id}")))
    }

    async fn get_doctor(&self, id: DoctorId) -> StoreResult<Option<Doctor>> {
        self.read(|s| s.doctors.get(&id).cloned())
    }

    async fn get_medical_record(&self, id: MedicalRecordId) -> StoreResult<Option<MedicalRecord>> {
        self.read(|s| s.records.get(&id).cloned())
    }

    async fn get_prescription(&self, id: PrescriptionId) -> StoreResult<Option<Prescription>> {
        self.read(|s| s.prescriptions.get(&id).cloned())
    }

    async fn list_prescriptions(&self, record: MedicalRecordId) -> StoreResult<Vec<Prescription>> {
        self.read(|s| {
            s.prescriptions
                .values()
                .filter(|p| p.medical_record_id == record)
                .cloned()
                .collect()
        })
    }

    async fn get_line(&self, id: PrescriptionLineId) -> StoreResult<Option<PrescriptionLine>> {
        self.read(|s| s.lines.get(&id).cloned())
    }

    async fn list_lines(&self, prescription: PrescriptionId) -> StoreResult<Vec<PrescriptionLine>> {
        self.read(|s| {
            s.lines
                .values()
                .filter(|l| l.prescription_id() == prescription)
                .cloned()
                .collect()
        })
    }

    async fn list_lines_for_record(&self, record: MedicalRecordId) -> StoreResult<Vec<PrescriptionLine>> {
        self.read(|s| {
            s.lines
                .values()
                .filter(|l| {
                    s.prescriptions
                        .get(&l.prescription_id())
                        .is_some_and(|p| p.medical_record_id == record)
                })
                .cloned()
                .collect()
        })
    }

    async fn latest_code(&self, prefix: &str, date: NaiveDate) -> StoreResult<Option<DailyCode>> {
        self.read(|s| {
            s.prescriptions
                .values()
                .map(|p| &p.code)
                .chain(s.records.values().map(|r| r.code()))
                .filter(|c| c.prefix() == prefix && c.date() == date)
                .max_by_key(|c| c.seq())
                .cloned()
        })
    }

    async fn ledger_for_drug(&self, id: DrugId) -> StoreResult<Vec<StockLedgerEntry>> {
        self.read(|s| {
            s.ledger
                .iter()
                .filter(|e| e.drug_id() == id)
                .cloned()
                .collect()
        })
    }

    async fn commit(&self, changes: ChangeSet) -> StoreResult<()> {
        if changes.is_empty() {
            return Ok(());
        }
        let mut state = self
            .state
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;

        let mut next = state.clone();
        next.apply(changes)?;
        *state = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::VersionedWrite;
    use clinic_core::ExpectedVersion;
    use clinic_inventory::NewDrug;

    fn drug(stock: i64) -> Drug {
        Drug::register(
            DrugId::new(),
            NewDrug {
                name: "Salbutamol".to_string(),
                unit_price: 1_200,
                initial_stock: stock,
                minimum_stock: 0,
                expires_on: None,
            },
        )
        .unwrap()
    }

    #[tokio::test]
    async fn stale_write_is_rejected_and_nothing_lands() {
        let store = InMemoryClinicStore::new();
        let d = drug(10);
        store
            .commit(ChangeSet {
                new_drugs: vec![d.clone()],
                ..ChangeSet::new()
            })
            .await
            .unwrap();

        // First writer bumps the version to 1.
        store
            .commit(ChangeSet {
                drug_writes: vec![VersionedWrite::of(d.clone())],
                ..ChangeSet::new()
            })
            .await
            .unwrap();

        // Second writer still holds version 0; its other writes must not land either.
        let other = drug(5);
        let err = store
            .commit(ChangeSet {
                new_drugs: vec![other.clone()],
                drug_writes: vec![VersionedWrite::of(d.clone())],
                ..ChangeSet::new()
            })
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::Conflict(_)));
        assert!(store.get_drug(other.id_typed()).await.unwrap().is_none());
        assert_eq!(store.get_drug(d.id_typed()).await.unwrap().unwrap().version(), 1);
    }

    #[tokio::test]
    async fn any_version_always_applies() {
        let store = InMemoryClinicStore::new();
        let d = drug(1);
        store
            .commit(ChangeSet {
                new_drugs: vec![d.clone()],
                ..ChangeSet::new()
            })
            .await
            .unwrap();

        for _ in 0..2 {
            store
                .commit(ChangeSet {
                    drug_writes: vec![VersionedWrite {
                        value: d.clone(),
                        expected: ExpectedVersion::Any,
                    }],
                    ..ChangeSet::new()
                })
                .await
                .unwrap();
        }
        assert_eq!(store.get_drug(d.id_typed()).await.unwrap().unwrap().version(), 2);
    }

    #[tokio::test]
    async fn writes_to_missing_rows_are_not_found() {
        let store = InMemoryClinicStore::new();
        let err = store
            .commit(ChangeSet {
                drug_writes: vec![VersionedWrite::of(drug(1))],
                ..ChangeSet::new()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));

        let err = store
            .commit(ChangeSet {
                removed_lines: vec![PrescriptionLineId::new()],
                ..ChangeSet::new()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
        assert!(store.remove_drug(DrugId::new()).await.is_err());
    }

    #[tokio::test]
    async fn empty_change_set_commits_nothing() {
        let store = InMemoryClinicStore::new();
        let d = drug(4);
        assert!(ChangeSet::new().is_empty());
        store.commit(ChangeSet::new()).await.unwrap();
        assert!(store.list_drugs().await.unwrap().is_empty());

        let registered = ChangeSet {
            new_drugs: vec![d.clone()],
            ..ChangeSet::new()
        };
        assert!(!registered.is_empty());
        store.commit(registered).await.unwrap();
        store.commit(ChangeSet::new()).await.unwrap();
        assert_eq!(store.get_drug(d.id_typed()).await.unwrap(), Some(d));
    }
}
