//! Project persistence.
//!
//! [`ProjectStore`] is the storage contract the service depends on.
//! Writes are compare-and-swap on the project's `version`: a save
//! succeeds only if the stored version still equals the version the
//! caller read, and the stored copy then carries `version + 1`.
//!
//! [`InMemoryProjectStore`] keeps projects in a sharded map, so writes to
//! different projects never contend on a shared lock.

use crate::models::{Project, ProjectId, ProjectStatus};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("not found")]
    NotFound,
    #[error("already exists")]
    AlreadyExists,
    #[error("version conflict (expected {expected}, stored {actual})")]
    VersionConflict { expected: u64, actual: u64 },
}

/// Zero-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: usize,
    pub size: usize,
}

impl PageRequest {
    pub const MAX_SIZE: usize = 100;

    pub fn new(page: usize, size: usize) -> Self {
        Self {
            page,
            size: size.clamp(1, Self::MAX_SIZE),
        }
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(0, 20)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub size: usize,
    pub total: usize,
}

pub trait ProjectStore: Send + Sync {
    fn load(&self, id: &ProjectId) -> Result<Project, StoreError>;

    /// Store a new project as given.
    fn insert(&self, project: Project) -> Result<Project, StoreError>;

    /// Compare-and-swap write.  `project.version` is the version that was
    /// read; the stored copy is returned with the incremented version.
    fn save(&self, project: Project) -> Result<Project, StoreError>;

    fn find_all(&self, page: PageRequest) -> Page<Project>;

    fn find_by_owner(&self, owner_user_id: &str, page: PageRequest) -> Page<Project>;

    fn find_by_status(&self, status: ProjectStatus, page: PageRequest) -> Page<Project>;
}

#[derive(Debug, Default)]
pub struct InMemoryProjectStore {
    projects: DashMap<ProjectId, Project>,
}

impl InMemoryProjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn page_where(&self, page: PageRequest, keep: impl Fn(&Project) -> bool) -> Page<Project> {
        let mut matching: Vec<Project> = self
            .projects
            .iter()
            .filter(|entry| keep(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        // Stable order so pages do not shift between calls.
        matching.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.0.cmp(&b.id.0))
        });
        let total = matching.len();
        let items = matching
            .into_iter()
            .skip(page.page.saturating_mul(page.size))
            .take(page.size)
            .collect();
        Page {
            items,
            page: page.page,
            size: page.size,
            total,
        }
    }
}

impl ProjectStore for InMemoryProjectStore {
    fn load(&self, id: &ProjectId) -> Result<Project, StoreError> {
        self.projects
            .get(id)
            .map(|p| p.value().clone())
            .ok_or(StoreError::NotFound)
    }

    fn insert(&self, project: Project) -> Result<Project, StoreError> {
        match self.projects.entry(project.id) {
            Entry::Occupied(_) => Err(StoreError::AlreadyExists),
            Entry::Vacant(slot) => {
                slot.insert(project.clone());
                Ok(project)
            }
        }
    }

    fn save(&self, mut project: Project) -> Result<Project, StoreError> {
        // The shard write lock is held from the version check to the write.
        let mut stored = self.projects.get_mut(&project.id).ok_or(StoreError::NotFound)?;
        if stored.version != project.version {
            return Err(StoreError::VersionConflict {
                expected: project.version,
                actual: stored.version,
            });
        }
        project.version += 1;
        *stored = project.clone();
        Ok(project)
    }

    fn find_all(&self, page: PageRequest) -> Page<Project> {
        self.page_where(page, |_| true)
    }

    fn find_by_owner(&self, owner_user_id: &str, page: PageRequest) -> Page<Project> {
        self.page_where(page, |p| p.owner_user_id == owner_user_id)
    }

    fn find_by_status(&self, status: ProjectStatus, page: PageRequest) -> Page<Project> {
        self.page_where(page, |p| p.status == status)
    }
}
