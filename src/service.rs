//! Project costing service.
//!
//! [`CostingService`] is the entry point the CLI/HTTP layers call.  Every
//! mutation follows the same optimistic cycle: load the project (which
//! captures its version), change it in memory, and save it with a
//! compare-and-swap.  A concurrent writer makes the save fail with
//! [`CostingError::OptimisticLockConflict`]; the caller re-reads and
//! retries.  No lock is held across the read-compute-write sequence.

use crate::approval;
use crate::engine::{evaluate_project, validate_non_staff_line, validate_staff_line};
use crate::error::{CostingError, Result};
use crate::models::{
    ApprovalAction, ApprovalEntry, NonStaffCost, PriceSummary, Project, ProjectDetails, ProjectId,
    ProjectStatus, StaffCost,
};
use crate::pricing::{aggregate, breakdown, CostBreakdown, PricingConfig};
use crate::rates::{RateCatalog, RateLookup};
use crate::store::{Page, PageRequest, ProjectStore, StoreError};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct CostingService {
    projects: Arc<dyn ProjectStore>,
    rates: Arc<RateCatalog>,
    pricing: PricingConfig,
    recompute_on_submit: bool,
}

fn store_error(id: &ProjectId, err: StoreError) -> CostingError {
    match err {
        StoreError::NotFound => CostingError::project_not_found(id),
        StoreError::AlreadyExists => {
            CostingError::validation("id", format!("project {id} already exists"))
        }
        StoreError::VersionConflict { expected, actual } => {
            warn!(project = %id, expected, actual, "optimistic lock conflict");
            CostingError::OptimisticLockConflict {
                id: id.to_string(),
                expected,
                actual,
            }
        }
    }
}

impl CostingService {
    pub fn new(
        projects: Arc<dyn ProjectStore>,
        rates: Arc<RateCatalog>,
        pricing: PricingConfig,
    ) -> Self {
        Self {
            projects,
            rates,
            pricing,
            recompute_on_submit: true,
        }
    }

    pub fn with_recompute_on_submit(mut self, enabled: bool) -> Self {
        self.recompute_on_submit = enabled;
        self
    }

    pub fn rates(&self) -> &RateCatalog {
        &self.rates
    }

    fn load(&self, id: &ProjectId) -> Result<Project> {
        self.projects.load(id).map_err(|e| store_error(id, e))
    }

    fn save(&self, mut project: Project) -> Result<Project> {
        project.updated_at = Utc::now();
        let id = project.id;
        self.projects.save(project).map_err(|e| store_error(&id, e))
    }

    /// Load, apply `change`, and save with a version check.  Nothing is
    /// written if `change` fails.
    fn mutate(&self, id: &ProjectId, change: impl FnOnce(&mut Project) -> Result<()>) -> Result<Project> {
        let mut project = self.load(id)?;
        change(&mut project)?;
        self.save(project)
    }

    /// Price `project` against one snapshot of the rate tables.
    fn price(&self, project: &Project) -> Result<PriceSummary> {
        let rates = self.rates.snapshot();
        let lookup = RateLookup::new(rates.as_ref(), Utc::now().date_naive());
        let evaluation = evaluate_project(project, &lookup)?;
        aggregate(
            &evaluation.staff,
            &evaluation.non_staff,
            &self.pricing,
            project.currency(),
        )
    }

    fn set_summary(project: &mut Project, summary: PriceSummary) {
        project.price_summary = Some(summary);
        project.price_computed_at = Some(Utc::now());
    }

    /// Create a project in `DRAFT` owned by `owner_user_id`.
    pub fn create_project(&self, details: ProjectDetails, owner_user_id: &str) -> Result<Project> {
        let owner = owner_user_id.trim();
        if owner.is_empty() {
            return Err(CostingError::validation("ownerUserId", "owner is required"));
        }
        details.validate()?;
        let project = Project::new(details, owner);
        let id = project.id;
        let project = self
            .projects
            .insert(project)
            .map_err(|e| store_error(&id, e))?;
        info!(project = %project.id, owner = %project.owner_user_id, "project created");
        Ok(project)
    }

    pub fn get_project(&self, id: &ProjectId) -> Result<Project> {
        self.load(id)
    }

    /// Replace the project details.  Existing lines must still fit the
    /// new duration and currency.
    pub fn update_details(&self, id: &ProjectId, details: ProjectDetails) -> Result<Project> {
        details.validate()?;
        self.mutate(id, |project| {
            for line in &project.staff_costs {
                validate_staff_line(line, details.duration_years)?;
            }
            for line in &project.non_staff_costs {
                validate_non_staff_line(line, details.duration_years, &details.currency)?;
            }
            project.details = details;
            Ok(())
        })
    }

    pub fn list_all(&self, page: PageRequest) -> Page<Project> {
        self.projects.find_all(page)
    }

    pub fn list_by_owner(&self, owner_user_id: &str, page: PageRequest) -> Page<Project> {
        self.projects.find_by_owner(owner_user_id, page)
    }

    pub fn list_by_status(&self, status: ProjectStatus, page: PageRequest) -> Page<Project> {
        self.projects.find_by_status(status, page)
    }

    pub fn replace_staff_costs(&self, id: &ProjectId, lines: Vec<StaffCost>) -> Result<Project> {
        self.mutate(id, |project| {
            for line in &lines {
                validate_staff_line(line, project.duration_years())?;
            }
            project.staff_costs = lines;
            Ok(())
        })
    }

    pub fn add_staff_cost(&self, id: &ProjectId, line: StaffCost) -> Result<Project> {
        self.mutate(id, |project| {
            validate_staff_line(&line, project.duration_years())?;
            project.staff_costs.push(line);
            Ok(())
        })
    }

    pub fn remove_staff_cost(&self, id: &ProjectId, index: usize) -> Result<Project> {
        self.mutate(id, |project| {
            if index >= project.staff_costs.len() {
                return Err(CostingError::NotFound {
                    entity: "staff cost",
                    id: index.to_string(),
                });
            }
            project.staff_costs.remove(index);
            Ok(())
        })
    }

    pub fn clear_staff_costs(&self, id: &ProjectId) -> Result<Project> {
        self.replace_staff_costs(id, Vec::new())
    }

    pub fn replace_non_staff_costs(&self, id: &ProjectId, lines: Vec<NonStaffCost>) -> Result<Project> {
        self.mutate(id, |project| {
            for line in &lines {
                validate_non_staff_line(line, project.duration_years(), project.currency())?;
            }
            project.non_staff_costs = lines;
            Ok(())
        })
    }

    pub fn add_non_staff_cost(&self, id: &ProjectId, line: NonStaffCost) -> Result<Project> {
        self.mutate(id, |project| {
            validate_non_staff_line(&line, project.duration_years(), project.currency())?;
            project.non_staff_costs.push(line);
            Ok(())
        })
    }

    pub fn remove_non_staff_cost(&self, id: &ProjectId, index: usize) -> Result<Project> {
        self.mutate(id, |project| {
            if index >= project.non_staff_costs.len() {
                return Err(CostingError::NotFound {
                    entity: "non-staff cost",
                    id: index.to_string(),
                });
            }
            project.non_staff_costs.remove(index);
            Ok(())
        })
    }

    pub fn clear_non_staff_costs(&self, id: &ProjectId) -> Result<Project> {
        self.replace_non_staff_costs(id, Vec::new())
    }

    /// Re-price the project and persist the new summary.  On any error
    /// the stored summary is left as it was.
    pub fn recompute(&self, id: &ProjectId) -> Result<PriceSummary> {
        debug!(project = %id, "recompute requested");
        let project = self.mutate(id, |project| {
            let summary = self.price(project)?;
            Self::set_summary(project, summary);
            Ok(())
        })?;
        let summary = project
            .price_summary
            .ok_or_else(|| CostingError::project_not_found(id))?;
        info!(
            project = %id,
            version = project.version,
            total_cost = %summary.total_cost.amount,
            sponsor_price = %summary.sponsor_price.amount,
            "price summary recomputed"
        );
        Ok(summary)
    }

    /// The last persisted summary.
    pub fn get_summary(&self, id: &ProjectId) -> Result<PriceSummary> {
        self.load(id)?.price_summary.ok_or_else(|| CostingError::NotFound {
            entity: "price summary",
            id: id.to_string(),
        })
    }

    /// Per-year and per-category view of the current lines, priced
    /// against the current rates.  Nothing is persisted.
    pub fn cost_breakdown(&self, id: &ProjectId) -> Result<CostBreakdown> {
        let project = self.load(id)?;
        let rates = self.rates.snapshot();
        let lookup = RateLookup::new(rates.as_ref(), Utc::now().date_naive());
        let evaluation = evaluate_project(&project, &lookup)?;
        breakdown(&evaluation.staff, &evaluation.non_staff, project.currency())
    }

    fn transition(
        &self,
        id: &ProjectId,
        action: ApprovalAction,
        actor_user_id: Option<&str>,
        comment: Option<&str>,
    ) -> Result<Project> {
        let actor = approval::require_actor(actor_user_id)?;
        let project = self.mutate(id, |project| {
            let from = project.status;
            approval::apply(project, action, Some(actor.as_str()), comment, Utc::now())?;
            if action == ApprovalAction::Submit && self.recompute_on_submit {
                let summary = self.price(project)?;
                Self::set_summary(project, summary);
            }
            debug!(project = %id, %action, %from, to = %project.status, "transition applied");
            Ok(())
        })?;
        info!(
            project = %id,
            %action,
            actor = %actor,
            status = %project.status,
            version = project.version,
            "approval action recorded"
        );
        Ok(project)
    }

    /// DRAFT → SUBMITTED; also re-prices the project unless disabled.
    pub fn submit(&self, id: &ProjectId, actor_user_id: Option<&str>, comment: Option<&str>) -> Result<Project> {
        self.transition(id, ApprovalAction::Submit, actor_user_id, comment)
    }

    /// SUBMITTED → APPROVED.
    pub fn approve(&self, id: &ProjectId, actor_user_id: Option<&str>, comment: Option<&str>) -> Result<Project> {
        self.transition(id, ApprovalAction::Approve, actor_user_id, comment)
    }

    /// SUBMITTED → DRAFT, so the owner can edit and resubmit.
    pub fn reject(&self, id: &ProjectId, actor_user_id: Option<&str>, comment: Option<&str>) -> Result<Project> {
        self.transition(id, ApprovalAction::Reject, actor_user_id, comment)
    }

    /// Record a note without changing status.
    pub fn comment(&self, id: &ProjectId, actor_user_id: Option<&str>, comment: Option<&str>) -> Result<Project> {
        self.transition(id, ApprovalAction::Comment, actor_user_id, comment)
    }

    pub fn approval_history(&self, id: &ProjectId) -> Result<Vec<ApprovalEntry>> {
        Ok(self.load(id)?.approvals.entries().to_vec())
    }
}
