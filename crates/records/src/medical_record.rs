use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use clinic_core::{AggregateRoot, UserId, uuid_newtype};

use crate::code::DailyCode;
use crate::cost::CostBreakdown;
use crate::doctor::{Doctor, DoctorId};

uuid_newtype!(
    /// Medical record identifier.
    MedicalRecordId,
    "MedicalRecordId"
);

uuid_newtype!(
    /// Patient identifier (patients themselves are managed elsewhere).
    PatientId,
    "PatientId"
);

/// Aggregate root: MedicalRecord.
///
/// The cost fields are derived. The only way to change them is
/// [`MedicalRecord::apply_costs`] with a freshly computed [`CostBreakdown`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MedicalRecord {
    id: MedicalRecordId,
    code: DailyCode,
    patient_id: PatientId,
    doctor_id: DoctorId,
    costs: CostBreakdown,
    created_by: UserId,
    created_at: DateTime<Utc>,
    version: u64,
}

impl MedicalRecord {
    /// Open a record for a visit; no prescriptions yet, so the total is the fee.
    pub fn open(
        id: MedicalRecordId,
        code: DailyCode,
        patient_id: PatientId,
        doctor: &Doctor,
        created_by: UserId,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            code,
            patient_id,
            doctor_id: doctor.id_typed(),
            costs: CostBreakdown::consultation_only(doctor.consultation_fee()),
            created_by,
            created_at,
            version: 0,
        }
    }

    /// Rebuild a record from persisted columns.
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        id: MedicalRecordId,
        code: DailyCode,
        patient_id: PatientId,
        doctor_id: DoctorId,
        costs: CostBreakdown,
        created_by: UserId,
        created_at: DateTime<Utc>,
        version: u64,
    ) -> Self {
        Self {
            id,
            code,
            patient_id,
            doctor_id,
            costs,
            created_by,
            created_at,
            version,
        }
    }

    /// The same record as persisted at `version` (stores call this after a write).
    pub fn at_version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    pub fn id_typed(&self) -> MedicalRecordId {
        self.id
    }

    pub fn code(&self) -> &DailyCode {
        &self.code
    }

    pub fn patient_id(&self) -> PatientId {
        self.patient_id
    }

    pub fn doctor_id(&self) -> DoctorId {
        self.doctor_id
    }

    pub fn costs(&self) -> CostBreakdown {
        self.costs
    }

    pub fn created_by(&self) -> UserId {
        self.created_by
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Replace the derived costs. Returns whether anything changed.
    pub fn apply_costs(&mut self, costs: CostBreakdown) -> bool {
        if self.costs == costs {
            return false;
        }
        self.costs = costs;
        true
    }
}

impl AggregateRoot for MedicalRecord {
    type Id = MedicalRecordId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}
