use core::str::FromStr;

use serde::{Deserialize, Serialize};

use clinic_core::DomainError;

/// What to do when a stock mutation would take available stock below zero.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StockPolicy {
    /// Let stock go negative (backorder semantics).
    AllowNegative,
    /// Fail the mutation with `InsufficientStock`.
    #[default]
    RejectNegative,
}

impl StockPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            StockPolicy::AllowNegative => "allow-negative",
            StockPolicy::RejectNegative => "reject-negative",
        }
    }
}

impl FromStr for StockPolicy {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "allow-negative" | "allow" | "backorder" => Ok(StockPolicy::AllowNegative),
            "reject-negative" | "reject" => Ok(StockPolicy::RejectNegative),
            other => Err(DomainError::validation(format!("unknown stock policy '{other}'"))),
        }
    }
}

impl core::fmt::Display for StockPolicy {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}
