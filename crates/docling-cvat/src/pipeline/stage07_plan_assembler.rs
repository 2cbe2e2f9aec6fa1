// Stage 07: Plan assembly

use super::stage01_containment_tree::ContainmentTree;
use super::stage03_logical_elements::LogicalElements;
use super::stage04_reading_order::ReadingOrderPlan;
use super::stage05_links::Link;
use super::stage06_groups::GroupAssociation;
use crate::diagnostics::{max_severity, Diagnostic, Diagnostics, Severity};
use serde::{Deserialize, Serialize};

/// Everything the materializer needs, resolved and frozen.
///
/// Built once by [`Stage07PlanAssembler`]; fields are read-only by
/// convention and nothing downstream mutates them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionPlan {
    pub tree: ContainmentTree,
    pub logical: LogicalElements,
    pub reading_order: ReadingOrderPlan,
    pub groups: Vec<GroupAssociation>,
    pub links: Vec<Link>,
    pub diagnostics: Vec<Diagnostic>,
}

impl ConversionPlan {
    /// Highest diagnostic severity, if any diagnostic was raised
    #[inline]
    #[must_use = "returns the overall severity"]
    pub fn severity(&self) -> Option<Severity> {
        max_severity(&self.diagnostics)
    }

    #[inline]
    #[must_use = "returns whether the plan may be materialized"]
    pub fn is_materializable(&self) -> bool {
        self.severity() != Some(Severity::Fatal)
    }
}

/// Stage 07: Plan Assembler
///
/// Pure aggregation of stages 01-06; no decisions of its own.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stage07PlanAssembler;

impl Stage07PlanAssembler {
    #[inline]
    #[must_use = "plan assembler is created but not used"]
    pub const fn new() -> Self {
        Self
    }

    #[must_use = "returns the conversion plan"]
    pub fn process(
        &self,
        tree: ContainmentTree,
        logical: LogicalElements,
        reading_order: ReadingOrderPlan,
        groups: Vec<GroupAssociation>,
        links: Vec<Link>,
        diagnostics: Diagnostics,
    ) -> ConversionPlan {
        let plan = ConversionPlan {
            tree,
            logical,
            reading_order,
            groups,
            links,
            diagnostics: diagnostics.into_vec(),
        };
        log::debug!(
            "Stage07: plan with {} groups, {} links, {} diagnostics (severity {:?})",
            plan.groups.len(),
            plan.links.len(),
            plan.diagnostics.len(),
            plan.severity()
        );
        plan
    }
}
