//! Cost line evaluation.
//!
//! The `engine` module turns individual cost lines into per-year
//! amounts.  Staff lines are priced from the rate tables through a
//! [`RateLookup`]; non-staff lines are priced from their own unit cost.
//! [`evaluate_project`] uses [`rayon`] to evaluate all lines of a
//! project in parallel while preserving line order.
//!
//! Evaluation is all-or-nothing: the first failing line (in line order)
//! fails the whole project and no partial result escapes.
//!
//! All money arithmetic is checked.  A result outside the `Decimal`
//! range is a validation error on the input that produced it.

use crate::catalog::CostCategory;
use crate::error::{CostingError, Result};
use crate::models::{NonStaffCost, Project, StaffCost, YearAllocation};
use crate::rates::{RateLookup, SALARY_RATE};
use rayon::prelude::*;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Amounts attributed to project years, plus any amount that is not
/// tied to a year (non-staff lines priced from a flat unit count).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerYearAmounts {
    pub by_year: BTreeMap<u8, Decimal>,
    pub unallocated: Decimal,
}

impl PerYearAmounts {
    /// Sum of every amount; `None` if it leaves the decimal range.
    pub fn checked_total(&self) -> Option<Decimal> {
        self.by_year
            .values()
            .copied()
            .try_fold(self.unallocated, Decimal::checked_add)
    }
}

pub(crate) fn overflow(field: &str) -> CostingError {
    CostingError::validation(field, "amount exceeds the supported decimal range")
}

/// Unwrap a checked result, reporting overflow against `field`.
pub(crate) fn in_range(value: Option<Decimal>, field: &str) -> Result<Decimal> {
    value.ok_or_else(|| overflow(field))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum LineKind {
    Staff,
    NonStaff,
}

/// The priced form of one cost line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluatedLine {
    pub kind: LineKind,
    /// Position of the line in its project list.
    pub index: usize,
    pub amounts: PerYearAmounts,
    /// In-kind lines count toward total cost but not the sponsor price.
    pub in_kind: bool,
    /// Reporting group; only set for non-staff lines.
    pub category: Option<CostCategory>,
    total: Decimal,
}

impl EvaluatedLine {
    pub fn new(
        kind: LineKind,
        index: usize,
        amounts: PerYearAmounts,
        in_kind: bool,
        category: Option<CostCategory>,
    ) -> Result<Self> {
        let field = match kind {
            LineKind::Staff => "perYearAllocation",
            LineKind::NonStaff => "units",
        };
        let total = in_range(amounts.checked_total(), field)?;
        Ok(Self {
            kind,
            index,
            amounts,
            in_kind,
            category,
            total,
        })
    }

    pub fn total(&self) -> Decimal {
        self.total
    }
}

/// All evaluated lines of a project, in line order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectEvaluation {
    pub staff: Vec<EvaluatedLine>,
    pub non_staff: Vec<EvaluatedLine>,
}

fn check_allocations(allocations: &[YearAllocation], duration_years: u8) -> Result<()> {
    let mut seen = BTreeSet::new();
    for allocation in allocations {
        if allocation.year == 0 || allocation.year > duration_years {
            return Err(CostingError::validation(
                "year",
                format!(
                    "year {} is outside the project duration of {} years",
                    allocation.year, duration_years
                ),
            ));
        }
        if !seen.insert(allocation.year) {
            return Err(CostingError::validation(
                "year",
                format!("year {} is allocated more than once", allocation.year),
            ));
        }
        if allocation.value.is_sign_negative() {
            return Err(CostingError::validation("value", "allocation must not be negative"));
        }
    }
    Ok(())
}

pub fn validate_staff_line(line: &StaffCost, duration_years: u8) -> Result<()> {
    if line.role_code.trim().is_empty() {
        return Err(CostingError::validation("roleCode", "must not be blank"));
    }
    check_allocations(&line.per_year_allocation, duration_years)
}

/// Validate a non-staff line, including that its amounts stay in range.
pub fn validate_non_staff_line(line: &NonStaffCost, duration_years: u8, currency: &str) -> Result<()> {
    check_non_staff_shape(line, duration_years, currency)?;
    non_staff_amounts(line).map(drop)
}

fn check_non_staff_shape(line: &NonStaffCost, duration_years: u8, currency: &str) -> Result<()> {
    if !line.expense_type_code.belongs_to(line.category_code) {
        return Err(CostingError::validation(
            "expenseTypeCode",
            format!(
                "{} belongs to category {}, not {}",
                line.expense_type_code.code(),
                line.expense_type_code.category().code(),
                line.category_code.code()
            ),
        ));
    }
    if line.unit_cost.currency != currency {
        return Err(CostingError::validation(
            "unitCost.currency",
            format!(
                "line currency {} differs from project currency {}",
                line.unit_cost.currency, currency
            ),
        ));
    }
    if line.unit_cost.amount.is_sign_negative() {
        return Err(CostingError::validation("unitCost.amount", "must not be negative"));
    }
    match (&line.per_year_units, line.units) {
        (Some(per_year), _) => check_allocations(per_year, duration_years),
        (None, Some(units)) if units.is_sign_negative() => {
            Err(CostingError::validation("units", "must not be negative"))
        }
        (None, Some(_)) => Ok(()),
        (None, None) => Err(CostingError::validation(
            "units",
            "either units or perYearUnits is required",
        )),
    }
}

/// Price one staff line.
///
/// For every year allocation the amount is
/// `rate × allocation × EBA(year) × unit multiplier × (1 + on-costs)`,
/// where the rate column is picked by the line's time basis and the
/// on-costs are the staff category's benefit fractions.
pub fn evaluate_staff_line(
    index: usize,
    line: &StaffCost,
    duration_years: u8,
    lookup: &RateLookup<'_>,
) -> Result<EvaluatedLine> {
    validate_staff_line(line, duration_years)?;

    let salary = lookup.resolve_salary_rate(&line.role_code)?;
    let unit = line.time_basis.unit();
    let rate = salary.rate_for(line.time_basis).ok_or_else(|| {
        CostingError::rate_not_found(SALARY_RATE, format!("{}/{}", line.role_code, unit))
    })?;
    let multiplier = lookup.resolve_multiplier(unit)?.multiplier;
    let on_cost = lookup
        .resolve_benefits(line.staff_category.code())?
        .on_cost_rate()
        .and_then(|rate| rate.checked_add(Decimal::ONE));
    let on_cost = in_range(on_cost, "staffCategory")?;

    let mut amounts = PerYearAmounts::default();
    for allocation in &line.per_year_allocation {
        let eba = lookup.resolve_eba(u32::from(allocation.year))?.multiplier;
        let amount = [allocation.value, eba, multiplier, on_cost]
            .into_iter()
            .try_fold(rate, Decimal::checked_mul);
        amounts
            .by_year
            .insert(allocation.year, in_range(amount, "perYearAllocation.value")?);
    }

    EvaluatedLine::new(LineKind::Staff, index, amounts, line.in_kind, None)
}

fn non_staff_amounts(line: &NonStaffCost) -> Result<PerYearAmounts> {
    let unit_cost = line.unit_cost.amount;
    let mut amounts = PerYearAmounts::default();
    match (&line.per_year_units, line.units) {
        (Some(per_year), _) => {
            for allocation in per_year {
                let amount = unit_cost.checked_mul(allocation.value);
                amounts
                    .by_year
                    .insert(allocation.year, in_range(amount, "perYearUnits.value")?);
            }
        }
        (None, Some(units)) => {
            amounts.unallocated = in_range(unit_cost.checked_mul(units), "units")?;
        }
        // Rejected by the shape check.
        (None, None) => {}
    }
    in_range(amounts.checked_total(), "perYearUnits")?;
    Ok(amounts)
}

/// Price one non-staff line: unit cost times units, per year when a
/// per-year breakdown is given.  The catalog codes only set the
/// reporting group.
pub fn evaluate_non_staff_line(
    index: usize,
    line: &NonStaffCost,
    duration_years: u8,
    currency: &str,
) -> Result<EvaluatedLine> {
    check_non_staff_shape(line, duration_years, currency)?;
    let amounts = non_staff_amounts(line)?;
    EvaluatedLine::new(
        LineKind::NonStaff,
        index,
        amounts,
        line.in_kind,
        Some(line.category_code),
    )
}

/// Evaluate every line of `project` against one rate lookup.
pub fn evaluate_project(project: &Project, lookup: &RateLookup<'_>) -> Result<ProjectEvaluation> {
    let duration = project.duration_years();
    let currency = project.currency();

    let staff: Vec<Result<EvaluatedLine>> = project
        .staff_costs
        .par_iter()
        .enumerate()
        .map(|(index, line)| evaluate_staff_line(index, line, duration, lookup))
        .collect();
    let non_staff: Vec<Result<EvaluatedLine>> = project
        .non_staff_costs
        .par_iter()
        .enumerate()
        .map(|(index, line)| evaluate_non_staff_line(index, line, duration, currency))
        .collect();

    // Sequential collect so the reported error is the first in line order.
    Ok(ProjectEvaluation {
        staff: staff.into_iter().collect::<Result<_>>()?,
        non_staff: non_staff.into_iter().collect::<Result<_>>()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ExpenseType;
    use crate::models::fixtures as model;
    use crate::models::{Money, TimeBasis};
    use crate::rates::fixtures as rates;
    use crate::rates::{RateRows, RateTables, StaffBenefits};
    use rust_decimal_macros::dec;

    #[test]
    fn staff_line_matches_worked_example() {
        let tables = rates::scenario_tables();
        let lookup = RateLookup::new(&tables, rates::today());
        let line = evaluate_staff_line(0, &model::ra6_half_fte(), 3, &lookup).unwrap();
        assert_eq!(line.total(), dec!(51500));
        assert_eq!(line.amounts.by_year.get(&1), Some(&dec!(51500)));
        assert!(!line.in_kind);
    }

    #[test]
    fn staff_line_applies_eba_per_year_and_on_costs() {
        let mut rows = rates::scenario_rows();
        rows.staff_benefits = vec![StaffBenefits {
            superannuation: dec!(0.17),
            leave_loading: dec!(0.01),
            work_cover: dec!(0.005),
            parental_leave: dec!(0.005),
            long_service_leave: dec!(0.02),
            annual_leave: dec!(0.04),
            ..rates::zero_benefits("Academic")
        }];
        let tables = RateTables::from_rows(rows).unwrap();
        let lookup = RateLookup::new(&tables, rates::today());

        let mut staff = model::ra6_half_fte();
        staff.per_year_allocation = vec![
            YearAllocation::new(1, dec!(1)),
            YearAllocation::new(2, dec!(0.5)),
        ];
        let line = evaluate_staff_line(0, &staff, 3, &lookup).unwrap();
        // on-costs sum to 0.25
        assert_eq!(line.amounts.by_year[&1], dec!(128750));
        assert_eq!(line.amounts.by_year[&2], dec!(66306.25));
        assert_eq!(line.total(), dec!(195056.25));
    }

    #[test]
    fn missing_rate_column_names_role_and_basis() {
        let tables = rates::scenario_tables();
        let lookup = RateLookup::new(&tables, rates::today());
        let mut staff = model::ra6_half_fte();
        staff.time_basis = TimeBasis::Hourly;
        assert_eq!(
            evaluate_staff_line(0, &staff, 3, &lookup).unwrap_err(),
            CostingError::rate_not_found("SalaryRate", "RA6/Hourly")
        );
    }

    #[test]
    fn unknown_role_propagates_rate_not_found() {
        let tables = rates::scenario_tables();
        let lookup = RateLookup::new(&tables, rates::today());
        let mut staff = model::ra6_half_fte();
        staff.role_code = "XYZ".into();
        assert_eq!(
            evaluate_staff_line(0, &staff, 3, &lookup).unwrap_err(),
            CostingError::rate_not_found("SalaryRate", "XYZ")
        );
    }

    #[test]
    fn missing_eba_year_propagates() {
        let mut rows = rates::scenario_rows();
        rows.eba.retain(|e| e.year == 1);
        let tables = RateTables::from_rows(rows).unwrap();
        let lookup = RateLookup::new(&tables, rates::today());
        let mut staff = model::ra6_half_fte();
        staff.per_year_allocation.push(YearAllocation::new(2, dec!(0.5)));
        assert_eq!(
            evaluate_staff_line(0, &staff, 3, &lookup).unwrap_err(),
            CostingError::rate_not_found("EBA", "2")
        );
    }

    #[test]
    fn year_outside_duration_is_a_validation_error() {
        let tables = RateTables::from_rows(RateRows::default()).unwrap();
        let lookup = RateLookup::new(&tables, rates::today());
        let mut staff = model::ra6_half_fte();
        staff.per_year_allocation = vec![YearAllocation::new(4, dec!(0.5))];
        assert!(matches!(
            evaluate_staff_line(0, &staff, 3, &lookup),
            Err(CostingError::Validation { field, .. }) if field == "year"
        ));
    }

    #[test]
    fn duplicate_year_is_rejected() {
        let mut staff = model::ra6_half_fte();
        staff.per_year_allocation.push(YearAllocation::new(1, dec!(0.2)));
        assert!(matches!(
            validate_staff_line(&staff, 3),
            Err(CostingError::Validation { field, .. }) if field == "year"
        ));
    }

    #[test]
    fn non_staff_line_prices_units_or_per_year_units() {
        let flat = evaluate_non_staff_line(0, &model::consumables(dec!(10), false), 3, "AUD").unwrap();
        assert_eq!(flat.total(), dec!(2000));
        assert_eq!(flat.amounts.unallocated, dec!(2000));
        assert_eq!(flat.category, Some(CostCategory::Cons));

        let mut line = model::consumables(dec!(10), true);
        line.per_year_units = Some(vec![
            YearAllocation::new(1, dec!(3)),
            YearAllocation::new(3, dec!(4)),
        ]);
        let split = evaluate_non_staff_line(1, &line, 3, "AUD").unwrap();
        assert_eq!(split.total(), dec!(1400));
        assert_eq!(split.amounts.unallocated, Decimal::ZERO);
        assert!(split.in_kind);
    }

    #[test]
    fn non_staff_line_rejects_foreign_expense_type() {
        let mut line = model::consumables(dec!(1), false);
        line.expense_type_code = ExpenseType::TravelStaffConf;
        assert!(matches!(
            evaluate_non_staff_line(0, &line, 3, "AUD"),
            Err(CostingError::Validation { field, .. }) if field == "expenseTypeCode"
        ));
    }

    #[test]
    fn non_staff_line_rejects_other_currency() {
        let mut line = model::consumables(dec!(1), false);
        line.unit_cost = Money::new(dec!(200), "USD");
        assert!(matches!(
            evaluate_non_staff_line(0, &line, 3, "AUD"),
            Err(CostingError::Validation { field, .. }) if field == "unitCost.currency"
        ));
    }

    #[test]
    fn non_staff_line_requires_some_units() {
        let mut line = model::consumables(dec!(1), false);
        line.units = None;
        assert!(matches!(
            validate_non_staff_line(&line, 3, "AUD"),
            Err(CostingError::Validation { field, .. }) if field == "units"
        ));
    }

    #[test]
    fn oversized_non_staff_line_is_rejected_not_panicking() {
        let mut line = model::consumables(Decimal::MAX, false);
        line.unit_cost = Money::new(dec!(1000000), "AUD");
        assert!(matches!(
            validate_non_staff_line(&line, 3, "AUD"),
            Err(CostingError::Validation { field, .. }) if field == "units"
        ));

        line.units = None;
        line.per_year_units = Some(vec![
            YearAllocation::new(1, Decimal::MAX),
            YearAllocation::new(2, Decimal::MAX),
        ]);
        line.unit_cost = Money::new(Decimal::ONE, "AUD");
        assert!(matches!(
            evaluate_non_staff_line(0, &line, 3, "AUD"),
            Err(CostingError::Validation { field, .. }) if field == "perYearUnits"
        ));
    }

    #[test]
    fn oversized_staff_allocation_is_a_validation_error() {
        let tables = rates::scenario_tables();
        let lookup = RateLookup::new(&tables, rates::today());
        let mut staff = model::ra6_half_fte();
        staff.per_year_allocation = vec![YearAllocation::new(1, Decimal::MAX)];
        validate_staff_line(&staff, 3).unwrap();
        assert!(matches!(
            evaluate_staff_line(0, &staff, 3, &lookup),
            Err(CostingError::Validation { field, .. }) if field == "perYearAllocation.value"
        ));
    }

    #[test]
    fn project_evaluation_keeps_order_and_reports_first_failure() {
        let tables = rates::scenario_tables();
        let lookup = RateLookup::new(&tables, rates::today());
        let mut project = crate::models::Project::new(model::details(), "owner");
        let mut second = model::ra6_half_fte();
        second.per_year_allocation = vec![YearAllocation::new(2, dec!(1))];
        project.staff_costs = vec![model::ra6_half_fte(), second];
        project.non_staff_costs = vec![model::consumables(dec!(10), false)];

        let evaluation = evaluate_project(&project, &lookup).unwrap();
        assert_eq!(evaluation.staff.len(), 2);
        assert_eq!(evaluation.staff[0].index, 0);
        assert_eq!(evaluation.staff[1].index, 1);
        assert_eq!(evaluation.staff[1].total(), dec!(106090));
        assert_eq!(evaluation.non_staff[0].total(), dec!(2000));

        let mut bad_a = model::ra6_half_fte();
        bad_a.role_code = "AAA".into();
        let mut bad_b = model::ra6_half_fte();
        bad_b.role_code = "BBB".into();
        project.staff_costs = vec![model::ra6_half_fte(), bad_a, bad_b];
        assert_eq!(
            evaluate_project(&project, &lookup).unwrap_err(),
            CostingError::rate_not_found("SalaryRate", "AAA")
        );
    }
}
