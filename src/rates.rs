//! Institutional rate tables and the read-only lookup over them.
//!
//! The rate tables are external, read-mostly data (salary rates, time
//! unit multipliers, EBA schedules, payroll tax, staff benefits).  The
//! [`RateStore`] trait is the storage contract: absence is reported as
//! `None`.  [`RateLookup`] is what the pricing engine consumes; it turns
//! absence into [`CostingError::RateNotFound`] so that a price summary is
//! never computed on a partial rate set.
//!
//! [`RateCatalog`] holds the live tables behind an `Arc`.  A recompute
//! takes one [`RateCatalog::snapshot`] and resolves every rate against
//! it, so replacing the tables mid-computation cannot mix two versions.

use crate::error::{CostingError, Result};
use crate::models::TimeBasis;
use anyhow::Context;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;
use tracing::{debug, info};

pub const SALARY_RATE: &str = "SalaryRate";
pub const MULTIPLIER: &str = "SalaryRateMultiplier";
pub const EBA: &str = "EBA";
pub const PAYROLL_TAX: &str = "PayrollTax";
pub const STAFF_BENEFITS: &str = "StaffBenefits";

/// Salary for one role code.  Any of the three rate columns may be absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SalaryRate {
    pub code: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub payroll_type: String,
    #[serde(default)]
    pub category: String,
    /// Annual rate for one full-time equivalent.
    #[serde(default)]
    pub fte_rate: Option<Decimal>,
    #[serde(default)]
    pub daily_rate: Option<Decimal>,
    #[serde(default)]
    pub hourly_rate: Option<Decimal>,
    /// Inclusive lower bound; open when absent.
    #[serde(default)]
    pub effective_from: Option<NaiveDate>,
    /// Inclusive upper bound; open when absent.
    #[serde(default)]
    pub effective_to: Option<NaiveDate>,
}

impl SalaryRate {
    pub fn rate_for(&self, basis: TimeBasis) -> Option<Decimal> {
        match basis {
            TimeBasis::Fte => self.fte_rate,
            TimeBasis::Daily => self.daily_rate,
            TimeBasis::Hourly => self.hourly_rate,
        }
    }

    pub fn is_active_on(&self, date: NaiveDate) -> bool {
        self.effective_from.map_or(true, |from| from <= date)
            && self.effective_to.map_or(true, |to| date <= to)
    }

    fn overlaps(&self, other: &SalaryRate) -> bool {
        let starts_before_other_ends = match (self.effective_from, other.effective_to) {
            (Some(from), Some(to)) => from <= to,
            _ => true,
        };
        let other_starts_before_self_ends = match (other.effective_from, self.effective_to) {
            (Some(from), Some(to)) => from <= to,
            _ => true,
        };
        starts_before_other_ends && other_starts_before_self_ends
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalaryRateMultiplier {
    /// Time unit, matching [`TimeBasis::unit`].
    pub unit: String,
    pub multiplier: Decimal,
}

/// Enterprise bargaining increase for one project year.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Eba {
    pub year: u32,
    #[serde(default)]
    pub increase: Decimal,
    /// Compounded multiplier applied to base salary in this year.
    pub multiplier: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayrollTax {
    pub year: u32,
    pub rate: Decimal,
}

/// Employer on-cost percentages for a staff type, as fractions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaffBenefits {
    pub staff_type: String,
    pub superannuation: Decimal,
    pub leave_loading: Decimal,
    pub work_cover: Decimal,
    pub parental_leave: Decimal,
    pub long_service_leave: Decimal,
    pub annual_leave: Decimal,
}

impl StaffBenefits {
    /// Sum of all on-cost fractions; `None` if the sum leaves the
    /// decimal range.
    pub fn on_cost_rate(&self) -> Option<Decimal> {
        [
            self.leave_loading,
            self.work_cover,
            self.parental_leave,
            self.long_service_leave,
            self.annual_leave,
        ]
        .into_iter()
        .try_fold(self.superannuation, Decimal::checked_add)
    }
}

/// The storage contract for rate tables.  Lookups of absent keys return
/// `None`; turning that into an error is [`RateLookup`]'s job.
pub trait RateStore: Send + Sync {
    /// The salary rate for `code` active on `on`.
    fn salary_rate(&self, code: &str, on: NaiveDate) -> Option<SalaryRate>;
    fn multiplier(&self, unit: &str) -> Option<SalaryRateMultiplier>;
    fn eba(&self, year: u32) -> Option<Eba>;
    fn payroll_tax(&self, year: u32) -> Option<PayrollTax>;
    fn staff_benefits(&self, staff_type: &str) -> Option<StaffBenefits>;
}

/// Errors raised while assembling rate tables.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RateTableError {
    #[error("duplicate {kind} row for key `{key}`")]
    DuplicateKey { kind: &'static str, key: String },
    #[error("salary rate `{code}` has overlapping effective windows")]
    OverlappingWindow { code: String },
}

/// Immutable in-memory rate tables with at most one active row per key.
#[derive(Debug, Clone, Default)]
pub struct RateTables {
    salary_rates: HashMap<String, Vec<SalaryRate>>,
    multipliers: HashMap<String, SalaryRateMultiplier>,
    eba: HashMap<u32, Eba>,
    payroll_tax: HashMap<u32, PayrollTax>,
    benefits: HashMap<String, StaffBenefits>,
}

/// Rows for a [`RateTables`], as read from the rate files.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RateRows {
    pub salary_rates: Vec<SalaryRate>,
    pub multipliers: Vec<SalaryRateMultiplier>,
    pub eba: Vec<Eba>,
    pub payroll_tax: Vec<PayrollTax>,
    pub staff_benefits: Vec<StaffBenefits>,
}

fn index_unique<K, V>(
    kind: &'static str,
    rows: Vec<V>,
    key: impl Fn(&V) -> K,
) -> std::result::Result<HashMap<K, V>, RateTableError>
where
    K: std::hash::Hash + Eq + ToString,
{
    let mut map = HashMap::with_capacity(rows.len());
    for row in rows {
        let k = key(&row);
        if map.contains_key(&k) {
            return Err(RateTableError::DuplicateKey {
                kind,
                key: k.to_string(),
            });
        }
        map.insert(k, row);
    }
    Ok(map)
}

impl RateTables {
    pub fn from_rows(rows: RateRows) -> std::result::Result<Self, RateTableError> {
        let mut salary_rates: HashMap<String, Vec<SalaryRate>> = HashMap::new();
        for rate in rows.salary_rates {
            let versions = salary_rates.entry(rate.code.clone()).or_default();
            if versions.iter().any(|existing| existing.overlaps(&rate)) {
                return Err(RateTableError::OverlappingWindow { code: rate.code });
            }
            versions.push(rate);
        }
        Ok(Self {
            salary_rates,
            multipliers: index_unique(MULTIPLIER, rows.multipliers, |m| m.unit.clone())?,
            eba: index_unique(EBA, rows.eba, |e| e.year)?,
            payroll_tax: index_unique(PAYROLL_TAX, rows.payroll_tax, |p| p.year)?,
            benefits: index_unique(STAFF_BENEFITS, rows.staff_benefits, |b| {
                b.staff_type.clone()
            })?,
        })
    }

    /// Load rate tables from a directory of JSON files.
    ///
    /// Recognised files are `salary_rates.json`, `multipliers.json`,
    /// `eba.json`, `payroll_tax.json` and `staff_benefits.json`, each a
    /// JSON array of rows.  A missing file yields an empty table; a file
    /// that fails to parse aborts the whole load.
    pub fn load_from_dir(path: &Path) -> anyhow::Result<Self> {
        fn read_rows<T: DeserializeOwned>(dir: &Path, file: &str) -> anyhow::Result<Vec<T>> {
            let path = dir.join(file);
            if !path.is_file() {
                debug!(path = %path.display(), "rate file absent, using empty table");
                return Ok(Vec::new());
            }
            let data = std::fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str(&data).with_context(|| format!("parsing {}", path.display()))
        }

        let rows = RateRows {
            salary_rates: read_rows(path, "salary_rates.json")?,
            multipliers: read_rows(path, "multipliers.json")?,
            eba: read_rows(path, "eba.json")?,
            payroll_tax: read_rows(path, "payroll_tax.json")?,
            staff_benefits: read_rows(path, "staff_benefits.json")?,
        };
        info!(
            dir = %path.display(),
            salary_rates = rows.salary_rates.len(),
            multipliers = rows.multipliers.len(),
            eba = rows.eba.len(),
            payroll_tax = rows.payroll_tax.len(),
            staff_benefits = rows.staff_benefits.len(),
            "loaded rate tables"
        );
        Ok(Self::from_rows(rows)?)
    }
}

impl RateStore for RateTables {
    fn salary_rate(&self, code: &str, on: NaiveDate) -> Option<SalaryRate> {
        self.salary_rates
            .get(code)?
            .iter()
            .find(|rate| rate.is_active_on(on))
            .cloned()
    }

    fn multiplier(&self, unit: &str) -> Option<SalaryRateMultiplier> {
        self.multipliers.get(unit).cloned()
    }

    fn eba(&self, year: u32) -> Option<Eba> {
        self.eba.get(&year).cloned()
    }

    fn payroll_tax(&self, year: u32) -> Option<PayrollTax> {
        self.payroll_tax.get(&year).cloned()
    }

    fn staff_benefits(&self, staff_type: &str) -> Option<StaffBenefits> {
        self.benefits.get(staff_type).cloned()
    }
}

/// Read-only accessor the pricing engine resolves rates through.  Every
/// miss is a [`CostingError::RateNotFound`]; nothing defaults.
#[derive(Clone, Copy)]
pub struct RateLookup<'a> {
    store: &'a dyn RateStore,
    as_of: NaiveDate,
}

impl<'a> RateLookup<'a> {
    /// Salary rates are selected by their effective window on `as_of`.
    pub fn new(store: &'a dyn RateStore, as_of: NaiveDate) -> Self {
        Self { store, as_of }
    }

    pub fn resolve_salary_rate(&self, code: &str) -> Result<SalaryRate> {
        self.store
            .salary_rate(code, self.as_of)
            .ok_or_else(|| CostingError::rate_not_found(SALARY_RATE, code))
    }

    pub fn resolve_multiplier(&self, unit: &str) -> Result<SalaryRateMultiplier> {
        self.store
            .multiplier(unit)
            .ok_or_else(|| CostingError::rate_not_found(MULTIPLIER, unit))
    }

    pub fn resolve_eba(&self, year: u32) -> Result<Eba> {
        self.store
            .eba(year)
            .ok_or_else(|| CostingError::rate_not_found(EBA, year))
    }

    pub fn resolve_payroll_tax(&self, year: u32) -> Result<PayrollTax> {
        self.store
            .payroll_tax(year)
            .ok_or_else(|| CostingError::rate_not_found(PAYROLL_TAX, year))
    }

    pub fn resolve_benefits(&self, staff_type: &str) -> Result<StaffBenefits> {
        self.store
            .staff_benefits(staff_type)
            .ok_or_else(|| CostingError::rate_not_found(STAFF_BENEFITS, staff_type))
    }
}

/// Holder of the live rate tables.  Readers take an `Arc` snapshot and
/// never hold the lock while computing.
#[derive(Debug, Default)]
pub struct RateCatalog {
    current: RwLock<Arc<RateTables>>,
}

impl RateCatalog {
    pub fn new(tables: RateTables) -> Self {
        Self {
            current: RwLock::new(Arc::new(tables)),
        }
    }

    pub fn snapshot(&self) -> Arc<RateTables> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Swap in new tables.  Snapshots already handed out are unaffected.
    pub fn replace(&self, tables: RateTables) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(tables);
        info!("rate tables replaced");
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn lookup_resolves_every_table() {
        let tables = scenario_tables();
        let lookup = RateLookup::new(&tables, today());
        assert_eq!(lookup.resolve_salary_rate("RA6").unwrap().fte_rate, Some(dec!(100000)));
        assert_eq!(lookup.resolve_multiplier("FTE").unwrap().multiplier, dec!(1.0));
        assert_eq!(lookup.resolve_eba(1).unwrap().multiplier, dec!(1.03));
        assert_eq!(lookup.resolve_payroll_tax(1).unwrap().rate, dec!(0.0485));
        assert_eq!(
            lookup.resolve_benefits("Academic").unwrap().on_cost_rate(),
            Some(Decimal::ZERO)
        );
    }

    #[test]
    fn missing_keys_fail_with_kind_and_key() {
        let tables = scenario_tables();
        let lookup = RateLookup::new(&tables, today());
        assert_eq!(
            lookup.resolve_salary_rate("XYZ"),
            Err(CostingError::rate_not_found("SalaryRate", "XYZ"))
        );
        assert_eq!(
            lookup.resolve_eba(9),
            Err(CostingError::rate_not_found("EBA", "9"))
        );
        assert_eq!(
            lookup.resolve_payroll_tax(4),
            Err(CostingError::rate_not_found("PayrollTax", "4"))
        );
        assert_eq!(
            lookup.resolve_multiplier("Hourly"),
            Err(CostingError::rate_not_found("SalaryRateMultiplier", "Hourly"))
        );
        assert_eq!(
            lookup.resolve_benefits("Casual"),
            Err(CostingError::rate_not_found("StaffBenefits", "Casual"))
        );
    }

    #[test]
    fn salary_rate_follows_effective_window() {
        let mut old = ra6();
        old.effective_to = NaiveDate::from_ymd_opt(2024, 12, 31);
        let mut new = ra6();
        new.effective_from = NaiveDate::from_ymd_opt(2025, 1, 1);
        new.fte_rate = Some(dec!(104000));
        let tables = RateTables::from_rows(RateRows {
            salary_rates: vec![old, new],
            ..RateRows::default()
        })
        .unwrap();

        let in_2024 = RateLookup::new(&tables, NaiveDate::from_ymd_opt(2024, 6, 1).unwrap());
        let in_2025 = RateLookup::new(&tables, today());
        assert_eq!(in_2024.resolve_salary_rate("RA6").unwrap().fte_rate, Some(dec!(100000)));
        assert_eq!(in_2025.resolve_salary_rate("RA6").unwrap().fte_rate, Some(dec!(104000)));
    }

    #[test]
    fn overlapping_salary_windows_are_rejected() {
        let err = RateTables::from_rows(RateRows {
            salary_rates: vec![ra6(), ra6()],
            ..RateRows::default()
        })
        .unwrap_err();
        assert_eq!(err, RateTableError::OverlappingWindow { code: "RA6".into() });
    }

    #[test]
    fn duplicate_keys_are_rejected() {
        let mut rows = scenario_rows();
        rows.eba.push(Eba {
            year: 1,
            increase: dec!(0.02),
            multiplier: dec!(1.02),
        });
        assert_eq!(
            RateTables::from_rows(rows).unwrap_err(),
            RateTableError::DuplicateKey {
                kind: "EBA",
                key: "1".into()
            }
        );
    }

    #[test]
    fn snapshot_is_isolated_from_replacement() {
        let catalog = RateCatalog::new(scenario_tables());
        let before = catalog.snapshot();
        catalog.replace(RateTables::default());

        let old = RateLookup::new(before.as_ref(), today());
        assert!(old.resolve_salary_rate("RA6").is_ok());
        let after = catalog.snapshot();
        let new = RateLookup::new(after.as_ref(), today());
        assert!(new.resolve_salary_rate("RA6").is_err());
    }

    #[test]
    fn loads_tables_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        let rows = scenario_rows();
        std::fs::write(
            dir.path().join("salary_rates.json"),
            serde_json::to_string(&rows.salary_rates).unwrap(),
        )
        .unwrap();
        std::fs::write(
            dir.path().join("eba.json"),
            r#"[{"year": 1, "increase": 0.03, "multiplier": 1.03}]"#,
        )
        .unwrap();

        let tables = RateTables::load_from_dir(dir.path()).unwrap();
        let lookup = RateLookup::new(&tables, today());
        assert!(lookup.resolve_salary_rate("RA6").is_ok());
        assert_eq!(lookup.resolve_eba(1).unwrap().multiplier, dec!(1.03));
        assert!(lookup.resolve_multiplier("FTE").is_err());
    }

    #[test]
    fn bundled_rate_tables_load() {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("rates");
        let tables = RateTables::load_from_dir(&dir).unwrap();
        let lookup = RateLookup::new(&tables, today());
        assert_eq!(lookup.resolve_salary_rate("HEW5").unwrap().category, "Professional");
        assert_eq!(
            lookup.resolve_benefits("Academic").unwrap().on_cost_rate(),
            Some(dec!(0.208))
        );
    }

    #[test]
    fn unparsable_rate_file_aborts_load() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("payroll_tax.json"), "{not json").unwrap();
        assert!(RateTables::load_from_dir(dir.path()).is_err());
    }
}
