//! Cost aggregation for medical records.

use serde::{Deserialize, Serialize};

use clinic_core::{DomainResult, Money, ValueObject};

use crate::prescription::PrescriptionLine;

/// Derived costs of a medical record.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub consultation_fee: Money,
    pub drug_cost: Money,
    pub total: Money,
}

impl ValueObject for CostBreakdown {}

impl CostBreakdown {
    pub fn consultation_only(fee: Money) -> Self {
        Self {
            consultation_fee: fee,
            drug_cost: Money::ZERO,
            total: fee,
        }
    }

    /// fee + Σ(quantity × captured unit price) over every line of every
    /// prescription on the record.
    ///
    /// Pure: the same fee and lines always give the same breakdown.
    pub fn compute<'a>(
        consultation_fee: Money,
        lines: impl IntoIterator<Item = &'a PrescriptionLine>,
    ) -> DomainResult<Self> {
        let drug_cost = lines
            .into_iter()
            .try_fold(Money::ZERO, |acc, line| acc.checked_add(line.cost()?))?;

        Ok(Self {
            consultation_fee,
            drug_cost,
            total: consultation_fee.checked_add(drug_cost)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use clinic_core::UserId;
    use clinic_inventory::{Drug, DrugId, NewDrug};
    use proptest::prelude::*;

    use crate::prescription::{PrescriptionId, PrescriptionLineId};

    fn line(quantity: i64, unit_price: i64) -> PrescriptionLine {
        let drug = Drug::register(
            DrugId::new(),
            NewDrug {
                name: "Cetirizine".to_string(),
                unit_price,
                initial_stock: 1_000,
                minimum_stock: 0,
                expires_on: None,
            },
        )
        .unwrap();
        PrescriptionLine::new(
            PrescriptionLineId::new(),
            PrescriptionId::new(),
            &drug,
            quantity,
            chrono::NaiveDate::from_ymd_opt(2026, 10, 19).unwrap(),
            UserId::new(),
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn two_prescriptions_scenario() {
        // One line on each of two prescriptions.
        let lines = [line(2, 500), line(1, 750)];
        let costs = CostBreakdown::compute(Money::new(150_000), &lines).unwrap();
        assert_eq!(costs.drug_cost, Money::new(1_750));
        assert_eq!(costs.total, Money::new(151_750));
    }

    #[test]
    fn no_lines_is_consultation_only() {
        let costs = CostBreakdown::compute(Money::new(90_000), []).unwrap();
        assert_eq!(costs, CostBreakdown::consultation_only(Money::new(90_000)));
    }

    proptest! {
        #[test]
        fn total_is_fee_plus_line_costs(
            fee in 0i64..10_000_000,
            items in prop::collection::vec((1i64..100, 0i64..100_000), 0..12)
        ) {
            let lines: Vec<_> = items.iter().map(|(q, p)| line(*q, *p)).collect();
            let costs = CostBreakdown::compute(Money::new(fee), &lines).unwrap();
            let expected: i64 = items.iter().map(|(q, p)| q * p).sum();

            prop_assert_eq!(costs.drug_cost.amount(), expected);
            prop_assert_eq!(costs.total.amount(), fee + expected);
            // Recomputing gives the same answer.
            prop_assert_eq!(CostBreakdown::compute(Money::new(fee), &lines).unwrap(), costs);
        }
    }
}
