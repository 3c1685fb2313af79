//! Execution phase tree
//!
//! Phases form a tree rooted at the job; only leaf phases are attribution
//! targets. Phases are interned in an [`ExecutionModel`] and referred to by
//! their stable [`PhaseId`], which is also what the result-set codec writes.

use crate::error::{AttributionError, Result};
use crate::timeslice::{TimesliceId, TimesliceRange};
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Stable identity of a phase within one [`ExecutionModel`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PhaseId(pub u32);

impl fmt::Display for PhaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "phase#{}", self.0)
    }
}

/// A node in the execution tree
#[derive(Debug)]
pub struct Phase {
    id: PhaseId,
    path: String,
    span: TimesliceRange,
    parent: Option<PhaseId>,
    children: Vec<PhaseId>,
}

impl Phase {
    pub fn id(&self) -> PhaseId {
        self.id
    }

    /// Slash-separated path, e.g. `/job/stage-1/task-3`
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn span(&self) -> TimesliceRange {
        self.span
    }

    pub fn first_timeslice(&self) -> TimesliceId {
        self.span.first()
    }

    pub fn last_timeslice(&self) -> TimesliceId {
        self.span.last()
    }

    pub fn parent(&self) -> Option<PhaseId> {
        self.parent
    }

    pub fn children(&self) -> &[PhaseId] {
        &self.children
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

impl PartialEq for Phase {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Phase {}

impl Hash for Phase {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Immutable arena of all phases of one execution
#[derive(Debug, Default)]
pub struct ExecutionModel {
    phases: Vec<Arc<Phase>>,
    by_path: HashMap<String, PhaseId>,
}

impl ExecutionModel {
    pub fn builder() -> ExecutionModelBuilder {
        ExecutionModelBuilder::default()
    }

    pub fn phase(&self, id: PhaseId) -> Option<&Arc<Phase>> {
        self.phases.get(id.0 as usize)
    }

    pub fn phase_by_path(&self, path: &str) -> Option<&Arc<Phase>> {
        self.by_path.get(path).and_then(|id| self.phase(*id))
    }

    pub fn phases(&self) -> impl Iterator<Item = &Arc<Phase>> {
        self.phases.iter()
    }

    /// All phases without children, in id order
    pub fn leaf_phases(&self) -> impl Iterator<Item = &Arc<Phase>> {
        self.phases.iter().filter(|p| p.is_leaf())
    }

    pub fn len(&self) -> usize {
        self.phases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }
}

/// Builder for [`ExecutionModel`]
///
/// Phases must be added parent-first. Paths must be unique and a child's
/// span must lie within its parent's span.
#[derive(Debug, Default)]
pub struct ExecutionModelBuilder {
    phases: Vec<Phase>,
    by_path: HashMap<String, PhaseId>,
}

impl ExecutionModelBuilder {
    /// Add a phase and return its id
    pub fn add_phase(
        &mut self,
        path: impl Into<String>,
        span: TimesliceRange,
        parent: Option<PhaseId>,
    ) -> Result<PhaseId> {
        let path = path.into();
        if self.by_path.contains_key(&path) {
            return Err(AttributionError::InvalidModel(format!(
                "duplicate phase path \"{}\"",
                path
            )));
        }

        let id = PhaseId(u32::try_from(self.phases.len()).map_err(|_| {
            AttributionError::InvalidModel("too many phases".to_string())
        })?);

        if let Some(parent_id) = parent {
            let parent = self.phases.get_mut(parent_id.0 as usize).ok_or_else(|| {
                AttributionError::InvalidModel(format!(
                    "parent {} of \"{}\" does not exist",
                    parent_id, path
                ))
            })?;
            if !parent.span.encloses(&span) {
                return Err(AttributionError::InvalidModel(format!(
                    "span {} of \"{}\" exceeds parent span {}",
                    span, path, parent.span
                )));
            }
            parent.children.push(id);
        }

        self.by_path.insert(path.clone(), id);
        self.phases.push(Phase {
            id,
            path,
            span,
            parent,
            children: Vec::new(),
        });
        Ok(id)
    }

    pub fn build(self) -> ExecutionModel {
        ExecutionModel {
            phases: self.phases.into_iter().map(Arc::new).collect(),
            by_path: self.by_path,
        }
    }
}
