//! Data models for the Costing Engine.
//!
//! The `models` module defines the project aggregate and everything it
//! owns: cost lines, the derived price summary and the approval trail.
//! All types derive `Serialize` and `Deserialize` so that they can be
//! persisted or transmitted over a network; wire names are camelCase.

use crate::catalog::{CostCategory, ExpenseType};
use crate::error::{CostingError, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Longest project the costing tool prices, in years.
pub const MAX_PROJECT_YEARS: u8 = 10;

/// A decimal amount in an ISO-4217 currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    pub amount: Decimal,
    /// Three-letter currency code, e.g. `"AUD"`.
    pub currency: String,
}

impl Money {
    pub fn new(amount: Decimal, currency: impl Into<String>) -> Self {
        Self {
            amount,
            currency: currency.into(),
        }
    }

    pub fn zero(currency: impl Into<String>) -> Self {
        Self::new(Decimal::ZERO, currency)
    }
}

/// A quantity (FTE fraction or unit count) attributed to one project year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearAllocation {
    /// Project year, starting at 1.
    pub year: u8,
    pub value: Decimal,
}

impl YearAllocation {
    pub fn new(year: u8, value: Decimal) -> Self {
        Self { year, value }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EmploymentType {
    Continuing,
    FixedTerm,
    Casual,
}

/// Staff category; also the key into the staff benefits table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StaffCategory {
    Academic,
    Professional,
}

impl StaffCategory {
    pub const fn code(self) -> &'static str {
        match self {
            StaffCategory::Academic => "Academic",
            StaffCategory::Professional => "Professional",
        }
    }
}

/// How a staff line's allocation is measured.  Selects the salary rate
/// column and the time-unit multiplier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeBasis {
    #[serde(rename = "FTE")]
    Fte,
    Daily,
    Hourly,
}

impl TimeBasis {
    /// Key into the salary rate multiplier table.
    pub const fn unit(self) -> &'static str {
        match self {
            TimeBasis::Fte => "FTE",
            TimeBasis::Daily => "Daily",
            TimeBasis::Hourly => "Hourly",
        }
    }
}

/// A staff cost line.  Owned by exactly one project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaffCost {
    /// Salary rate code, e.g. `"RA6"`.
    pub role_code: String,
    pub employment_type: EmploymentType,
    pub staff_category: StaffCategory,
    pub time_basis: TimeBasis,
    #[serde(default)]
    pub per_year_allocation: Vec<YearAllocation>,
    #[serde(default)]
    pub in_kind: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// A non-staff cost line (equipment, travel, consumables ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NonStaffCost {
    pub category_code: CostCategory,
    pub expense_type_code: ExpenseType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub unit_cost: Money,
    /// Total units, used when no per-year breakdown is given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub units: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub per_year_units: Option<Vec<YearAllocation>>,
    #[serde(default)]
    pub in_kind: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Derived project totals.  Recomputed wholesale, never edited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceSummary {
    pub direct_staff_cost: Money,
    pub direct_non_staff_cost: Money,
    /// Overheads.
    pub indirect_cost: Money,
    /// Includes in-kind contributions.
    pub total_cost: Money,
    /// Excludes in-kind contributions.
    pub sponsor_price: Money,
    pub gst: Money,
    pub total_price_incl_gst: Money,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProjectStatus {
    Draft,
    Submitted,
    Approved,
    Archived,
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ProjectStatus::Draft => "DRAFT",
            ProjectStatus::Submitted => "SUBMITTED",
            ProjectStatus::Approved => "APPROVED",
            ProjectStatus::Archived => "ARCHIVED",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalAction {
    Submit,
    Approve,
    Reject,
    Comment,
}

impl fmt::Display for ApprovalAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ApprovalAction::Submit => "SUBMIT",
            ApprovalAction::Approve => "APPROVE",
            ApprovalAction::Reject => "REJECT",
            ApprovalAction::Comment => "COMMENT",
        })
    }
}

/// One audit-trail record.  Fields are read-only once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalEntry {
    action: ApprovalAction,
    actor_user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    comment: Option<String>,
    at: DateTime<Utc>,
}

impl ApprovalEntry {
    pub(crate) fn new(
        action: ApprovalAction,
        actor_user_id: String,
        comment: Option<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            action,
            actor_user_id,
            comment,
            at,
        }
    }

    pub fn action(&self) -> ApprovalAction {
        self.action
    }

    pub fn actor_user_id(&self) -> &str {
        &self.actor_user_id
    }

    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    pub fn at(&self) -> DateTime<Utc> {
        self.at
    }
}

/// Append-only approval history.  Insertion order is the audit order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalTracker {
    #[serde(default)]
    history: Vec<ApprovalEntry>,
}

impl ApprovalTracker {
    pub fn entries(&self) -> &[ApprovalEntry] {
        &self.history
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn last(&self) -> Option<&ApprovalEntry> {
        self.history.last()
    }

    pub(crate) fn append(&mut self, entry: ApprovalEntry) {
        self.history.push(entry);
    }
}

/// Project identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(pub Uuid);

impl ProjectId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ProjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Descriptive project metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectDetails {
    pub title: String,
    pub funder: String,
    pub department: String,
    /// Base currency for every cost line and the summary.
    pub currency: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    /// Declared duration; year allocations must fall in `1..=duration_years`.
    pub duration_years: u8,
}

impl ProjectDetails {
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("title", &self.title),
            ("funder", &self.funder),
            ("department", &self.department),
        ] {
            if value.trim().is_empty() {
                return Err(CostingError::validation(field, "must not be blank"));
            }
        }
        if self.currency.len() != 3 || !self.currency.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(CostingError::validation(
                "currency",
                format!("`{}` is not an ISO-4217 code", self.currency),
            ));
        }
        if self.duration_years == 0 || self.duration_years > MAX_PROJECT_YEARS {
            return Err(CostingError::validation(
                "durationYears",
                format!("must be between 1 and {MAX_PROJECT_YEARS}"),
            ));
        }
        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            if end < start {
                return Err(CostingError::validation(
                    "endDate",
                    "must not be before startDate",
                ));
            }
        }
        Ok(())
    }
}

/// The project aggregate root.  It exclusively owns its cost lines, the
/// latest price summary and the approval trail, and it is the unit of
/// optimistic concurrency control through `version`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: ProjectId,
    pub details: ProjectDetails,
    #[serde(default)]
    pub staff_costs: Vec<StaffCost>,
    #[serde(default)]
    pub non_staff_costs: Vec<NonStaffCost>,
    #[serde(default)]
    pub price_summary: Option<PriceSummary>,
    /// When `price_summary` was last computed.
    #[serde(default)]
    pub price_computed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub approvals: ApprovalTracker,
    pub status: ProjectStatus,
    pub owner_user_id: String,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    /// A fresh project in `DRAFT`, owned by `owner_user_id`, at version 0.
    pub fn new(details: ProjectDetails, owner_user_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: ProjectId::new(),
            details,
            staff_costs: Vec::new(),
            non_staff_costs: Vec::new(),
            price_summary: None,
            price_computed_at: None,
            approvals: ApprovalTracker::default(),
            status: ProjectStatus::Draft,
            owner_user_id: owner_user_id.into(),
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn currency(&self) -> &str {
        &self.details.currency
    }

    pub fn duration_years(&self) -> u8 {
        self.details.duration_years
    }
}
