// Stage 06: Group association

use super::stage01_containment_tree::ContainmentTree;
use super::stage02_path_mapper::PathMapping;
use super::stage03_logical_elements::{LogicalElements, LogicalId};
use crate::diagnostics::{Diagnostic, DiagnosticKind, Diagnostics};
use crate::labels::DocItemLabel;
use crate::model::{PathId, PathKind};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Label of a group node (docling `GroupLabel`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupLabel {
    Unspecified,
    List,
    PictureArea,
    FormArea,
    KeyValueArea,
}

impl GroupLabel {
    /// Derive the label from member labels
    #[must_use = "returns the derived group label"]
    pub fn derive(labels: &[DocItemLabel]) -> Self {
        if labels.is_empty() {
            return Self::Unspecified;
        }
        if labels.iter().all(|&l| l == DocItemLabel::Picture) {
            Self::PictureArea
        } else if labels.iter().all(|&l| l == DocItemLabel::ListItem) {
            Self::List
        } else if labels.iter().any(|l| l.is_checkbox()) {
            Self::FormArea
        } else {
            Self::Unspecified
        }
    }

    /// docling group name
    #[must_use = "returns the group name"]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Unspecified => "group",
            Self::List => "list",
            Self::PictureArea => "picture-area",
            Self::FormArea => "form-area",
            Self::KeyValueArea => "key-value-area",
        }
    }
}

/// Members of one group path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupAssociation {
    /// Dense index among materialized groups
    pub id: usize,
    pub path_id: PathId,
    /// Members in draw order
    pub members: Vec<LogicalId>,
    pub label: GroupLabel,
}

/// Stage 06: Group Association
///
/// Each group path becomes one group over its touched logical elements.
/// Groups are decided here: an empty group is never produced, a group mixing
/// content layers or enclosing containers is rejected with an ERROR, and an
/// element claimed by two groups stays with the first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stage06Groups;

impl Stage06Groups {
    #[inline]
    #[must_use = "group stage is created but not used"]
    pub const fn new() -> Self {
        Self
    }

    #[must_use = "returns the groups and their diagnostics"]
    pub fn process(
        &self,
        mapping: &PathMapping,
        tree: &ContainmentTree,
        logical: &LogicalElements,
    ) -> (Vec<GroupAssociation>, Diagnostics) {
        let mut diagnostics = Diagnostics::new();
        let mut groups: Vec<GroupAssociation> = Vec::new();
        let mut owner_of: FxHashMap<LogicalId, PathId> = FxHashMap::default();

        for path in mapping.of_kind(PathKind::Group) {
            let touched = logical.resolve(&path.elements);
            if touched.is_empty() {
                continue;
            }

            let first = touched[0].primary();
            let layer = tree.layer(first);
            let scope = tree.nearest_container(first);
            if let Some(odd) = touched.iter().find(|id| {
                tree.layer(id.primary()) != layer || tree.nearest_container(id.primary()) != scope
            }) {
                diagnostics.push(
                    Diagnostic::error(
                        DiagnosticKind::InvalidGroup,
                        format!(
                            "group {} mixes content layers or containers ({} vs {})",
                            path.path_id,
                            first,
                            odd.primary()
                        ),
                    )
                    .with_path(path.path_id)
                    .with_elements(path.elements.iter().copied()),
                );
                continue;
            }

            let mut members = Vec::with_capacity(touched.len());
            for id in touched {
                if let Some(&earlier) = owner_of.get(&id) {
                    diagnostics.push(
                        Diagnostic::warning(
                            DiagnosticKind::DuplicateGroupMember,
                            format!(
                                "{} already belongs to group {}; dropped from {}",
                                id.primary(),
                                earlier,
                                path.path_id
                            ),
                        )
                        .with_paths([earlier, path.path_id])
                        .with_element(id.primary()),
                    );
                    continue;
                }
                owner_of.insert(id, path.path_id);
                members.push(id);
            }
            if members.is_empty() {
                continue;
            }

            let labels: Vec<DocItemLabel> = members
                .iter()
                .filter_map(|id| tree.label(id.primary()).content())
                .collect();
            groups.push(GroupAssociation {
                id: groups.len(),
                path_id: path.path_id,
                label: GroupLabel::derive(&labels),
                members,
            });
        }

        log::debug!("Stage06: {} groups", groups.len());
        (groups, diagnostics)
    }
}
