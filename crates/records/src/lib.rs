//! Medical records module: doctors, prescriptions and derived record costs.
//!
//! Pure domain logic only: no IO, no persistence concerns.

pub mod code;
pub mod cost;
pub mod doctor;
pub mod medical_record;
pub mod prescription;

pub use code::{DailyCode, DailySequence};
pub use cost::CostBreakdown;
pub use doctor::{Doctor, DoctorId, NewDoctor};
pub use medical_record::{MedicalRecord, MedicalRecordId, PatientId};
pub use prescription::{Prescription, PrescriptionId, PrescriptionLine, PrescriptionLineId};
