use serde::{Deserialize, Serialize};

use clinic_core::{DomainError, DomainResult, Entity, Money, uuid_newtype};

uuid_newtype!(
    /// Doctor (attending practitioner) identifier.
    DoctorId,
    "DoctorId"
);

/// A practitioner and the consultation fee they charge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Doctor {
    id: DoctorId,
    name: String,
    consultation_fee: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDoctor {
    pub name: String,
    pub consultation_fee: i64,
}

impl Doctor {
    pub fn register(id: DoctorId, new: NewDoctor) -> DomainResult<Self> {
        if new.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        Ok(Self {
            id,
            name: new.name.trim().to_string(),
            consultation_fee: Money::non_negative(new.consultation_fee)?,
        })
    }

    pub fn from_parts(id: DoctorId, name: String, consultation_fee: Money) -> Self {
        Self {
            id,
            name,
            consultation_fee,
        }
    }

    pub fn id_typed(&self) -> DoctorId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn consultation_fee(&self) -> Money {
        self.consultation_fee
    }
}

impl Entity for Doctor {
    const KIND: &'static str = "doctor";

    type Id = DoctorId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
