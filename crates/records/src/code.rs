//! Human-readable daily sequence codes (`RX-20261019-0001`).

use core::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use clinic_core::{DomainError, DomainResult};

const DATE_FORMAT: &str = "%Y%m%d";

/// A code made of a prefix, the calendar day and a per-day counter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DailyCode {
    prefix: String,
    date: NaiveDate,
    seq: u32,
}

impl DailyCode {
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn seq(&self) -> u32 {
        self.seq
    }
}

impl core::fmt::Display for DailyCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}-{}-{:04}", self.prefix, self.date.format(DATE_FORMAT), self.seq)
    }
}

impl FromStr for DailyCode {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.rsplitn(3, '-');
        let (Some(seq), Some(date), Some(prefix)) = (parts.next(), parts.next(), parts.next()) else {
            return Err(DomainError::validation(format!("malformed code '{s}'")));
        };

        validate_prefix(prefix)?;
        let date = NaiveDate::parse_from_str(date, DATE_FORMAT)
            .map_err(|e| DomainError::validation(format!("malformed code date in '{s}': {e}")))?;
        let seq: u32 = seq
            .parse()
            .map_err(|_| DomainError::validation(format!("malformed code counter in '{s}'")))?;
        if seq == 0 {
            return Err(DomainError::validation("code counter starts at 1"));
        }

        Ok(Self {
            prefix: prefix.to_string(),
            date,
            seq,
        })
    }
}

impl TryFrom<String> for DailyCode {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DailyCode> for String {
    fn from(value: DailyCode) -> Self {
        value.to_string()
    }
}

fn validate_prefix(prefix: &str) -> DomainResult<()> {
    if prefix.is_empty() || !prefix.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(DomainError::validation(format!(
            "code prefix must be non-empty ASCII alphanumerics (got '{prefix}')"
        )));
    }
    Ok(())
}

/// Allocates [`DailyCode`]s for one prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailySequence {
    prefix: String,
}

impl DailySequence {
    pub fn new(prefix: impl Into<String>) -> DomainResult<Self> {
        let prefix = prefix.into();
        validate_prefix(&prefix)?;
        Ok(Self { prefix })
    }

    /// Default prescription codes (`RX-...`).
    pub fn prescriptions() -> Self {
        Self {
            prefix: "RX".to_string(),
        }
    }

    /// Default medical record codes (`MR-...`).
    pub fn medical_records() -> Self {
        Self {
            prefix: "MR".to_string(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Next code for `date`, given the highest code already issued that day.
    ///
    /// A `latest` code from another day or prefix restarts the counter at 1.
    pub fn next(&self, date: NaiveDate, latest: Option<&DailyCode>) -> DomainResult<DailyCode> {
        let seq = match latest {
            Some(code) if code.prefix == self.prefix && code.date == date => code
                .seq
                .checked_add(1)
                .ok_or_else(|| DomainError::invariant("daily code counter exhausted"))?,
            _ => 1,
        };
        Ok(DailyCode {
            prefix: self.prefix.clone(),
            date,
            seq,
        })
    }
}
