//! Price aggregation.
//!
//! [`aggregate`] reduces evaluated cost lines into a [`PriceSummary`].
//! It is a pure function of its inputs: the same lines and
//! configuration always produce the same summary, down to the
//! serialized bytes.  The overhead rate and GST settings are supplied
//! by configuration; the engine has no built-in institutional defaults.

use crate::catalog::CostCategory;
use crate::engine::{in_range, EvaluatedLine};
use crate::error::{CostingError, Result};
use crate::models::{Money, PriceSummary};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Institutional pricing inputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricingConfig {
    /// Fraction of direct cost charged as overheads.
    pub overhead_rate: Decimal,
    pub gst_rate: Decimal,
    /// Whether GST applies to the sponsor price.
    pub gst_liable: bool,
}

impl PricingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.overhead_rate.is_sign_negative() {
            return Err(CostingError::validation("overheadRate", "must not be negative"));
        }
        if self.gst_rate.is_sign_negative() {
            return Err(CostingError::validation("gstRate", "must not be negative"));
        }
        Ok(())
    }
}

fn sum<'a>(lines: impl IntoIterator<Item = &'a EvaluatedLine>, field: &str) -> Result<Decimal> {
    let total = lines
        .into_iter()
        .map(EvaluatedLine::total)
        .try_fold(Decimal::ZERO, Decimal::checked_add);
    in_range(total, field)
}

/// Reduce evaluated lines into a price summary.
///
/// In-kind lines are part of every direct and total figure and are taken
/// back out of the sponsor price.  All amounts are in `currency`; lines
/// in another currency must be rejected before this point.  A figure
/// outside the decimal range is a validation error naming that figure.
pub fn aggregate(
    staff: &[EvaluatedLine],
    non_staff: &[EvaluatedLine],
    config: &PricingConfig,
    currency: &str,
) -> Result<PriceSummary> {
    let direct_staff = sum(staff, "directStaffCost")?;
    let direct_non_staff = sum(non_staff, "directNonStaffCost")?;
    let direct = in_range(direct_staff.checked_add(direct_non_staff), "totalCost")?;
    let indirect = in_range(config.overhead_rate.checked_mul(direct), "indirectCost")?;
    let total = in_range(direct.checked_add(indirect), "totalCost")?;
    let in_kind = sum(
        staff.iter().chain(non_staff).filter(|line| line.in_kind),
        "sponsorPrice",
    )?;
    let sponsor_price = in_range(total.checked_sub(in_kind), "sponsorPrice")?;
    let gst = if config.gst_liable {
        in_range(sponsor_price.checked_mul(config.gst_rate), "gst")?
    } else {
        Decimal::ZERO
    };
    let total_incl_gst = in_range(sponsor_price.checked_add(gst), "totalPriceInclGst")?;

    let money = |amount: Decimal| Money::new(amount.normalize(), currency);
    Ok(PriceSummary {
        direct_staff_cost: money(direct_staff),
        direct_non_staff_cost: money(direct_non_staff),
        indirect_cost: money(indirect),
        total_cost: money(total),
        sponsor_price: money(sponsor_price),
        gst: money(gst),
        total_price_incl_gst: money(total_incl_gst),
    })
}

/// Reporting view of the evaluated lines, grouped by year and category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CostBreakdown {
    pub currency: String,
    /// Direct cost per project year.
    pub per_year: BTreeMap<u8, Decimal>,
    /// Direct cost not tied to a year.
    pub unallocated: Decimal,
    pub staff_total: Decimal,
    /// Non-staff direct cost per cost category.
    pub by_category: BTreeMap<CostCategory, Decimal>,
    pub in_kind_total: Decimal,
}

fn accumulate(slot: &mut Decimal, amount: Decimal, field: &str) -> Result<()> {
    *slot = in_range(slot.checked_add(amount), field)?;
    Ok(())
}

pub fn breakdown(
    staff: &[EvaluatedLine],
    non_staff: &[EvaluatedLine],
    currency: &str,
) -> Result<CostBreakdown> {
    let mut report = CostBreakdown {
        currency: currency.to_string(),
        per_year: BTreeMap::new(),
        unallocated: Decimal::ZERO,
        staff_total: sum(staff, "staffTotal")?,
        by_category: BTreeMap::new(),
        in_kind_total: Decimal::ZERO,
    };
    for line in staff.iter().chain(non_staff) {
        for (year, amount) in &line.amounts.by_year {
            accumulate(report.per_year.entry(*year).or_default(), *amount, "perYear")?;
        }
        accumulate(&mut report.unallocated, line.amounts.unallocated, "unallocated")?;
        if let Some(category) = line.category {
            accumulate(report.by_category.entry(category).or_default(), line.total(), "byCategory")?;
        }
        if line.in_kind {
            accumulate(&mut report.in_kind_total, line.total(), "inKindTotal")?;
        }
    }
    Ok(report)
}
