// Stage 05: Caption / footnote / key-value link resolution

use super::stage01_containment_tree::ContainmentTree;
use super::stage02_path_mapper::{MappedPath, PathMapping};
use super::stage03_logical_elements::{LogicalElements, LogicalId};
use crate::diagnostics::{Diagnostic, DiagnosticKind, Diagnostics};
use crate::labels::CellRoleLabel;
use crate::model::{PathId, PathKind};
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkKind {
    Caption,
    Footnote,
    ToValue,
}

/// Directed link with normalized orientation: container -> caption/footnote,
/// key -> value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub kind: LinkKind,
    pub source: LogicalId,
    pub target: LogicalId,
    pub path_id: PathId,
}

/// Stage 05: Link Resolver
///
/// - to_caption / to_footnote: exactly two logical elements, exactly one of
///   them a container; drawn the wrong way round is corrected with a WARNING
/// - to_value: touched elements resolve through merge groups to exactly one
///   key and one value; value -> key is corrected with a WARNING
///
/// A target already linked by an earlier path of the same kind keeps its
/// first link.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stage05Links;

impl Stage05Links {
    #[inline]
    #[must_use = "link stage is created but not used"]
    pub const fn new() -> Self {
        Self
    }

    #[must_use = "returns the links and their diagnostics"]
    pub fn process(
        &self,
        mapping: &PathMapping,
        tree: &ContainmentTree,
        logical: &LogicalElements,
    ) -> (Vec<Link>, Diagnostics) {
        let mut diagnostics = Diagnostics::new();
        let mut links: Vec<Link> = Vec::new();
        let mut linked_targets: FxHashSet<(LinkKind, LogicalId)> = FxHashSet::default();

        for path in &mapping.paths {
            if path.is_empty() {
                continue;
            }
            let resolved = match path.kind {
                PathKind::ToCaption => resolve_attachment(path, LinkKind::Caption, tree, logical),
                PathKind::ToFootnote => resolve_attachment(path, LinkKind::Footnote, tree, logical),
                PathKind::ToValue => resolve_value(path, tree, logical),
                _ => continue,
            };

            let link = match resolved {
                Ok((link, corrected)) => {
                    if let Some(diagnostic) = corrected {
                        diagnostics.push(diagnostic);
                    }
                    link
                }
                Err(diagnostic) => {
                    diagnostics.push(diagnostic);
                    continue;
                }
            };

            if !linked_targets.insert((link.kind, link.target)) {
                diagnostics.push(
                    Diagnostic::warning(
                        DiagnosticKind::DuplicateLink,
                        format!(
                            "{} already has a {:?} link; {} ignored",
                            link.target.primary(),
                            link.kind,
                            path.path_id
                        ),
                    )
                    .with_path(path.path_id)
                    .with_element(link.target.primary()),
                );
                continue;
            }
            links.push(link);
        }

        log::debug!("Stage05: {} links", links.len());
        (links, diagnostics)
    }
}

type Resolution = Result<(Link, Option<Diagnostic>), Diagnostic>;

fn resolve_attachment(
    path: &MappedPath,
    kind: LinkKind,
    tree: &ContainmentTree,
    logical: &LogicalElements,
) -> Resolution {
    let ends = logical.resolve(&path.elements);
    let invalid = |reason: String| {
        Diagnostic::error(
            DiagnosticKind::InvalidLink,
            format!("{} {} rejected: {reason}", path.kind, path.path_id),
        )
        .with_path(path.path_id)
        .with_elements(path.elements.iter().copied())
    };

    let [first, second] = ends.as_slice() else {
        return Err(invalid(format!(
            "expected 2 elements, touched {}",
            ends.len()
        )));
    };
    let first_container = tree.is_container(first.primary());
    let second_container = tree.is_container(second.primary());

    let (source, target, corrected) = match (first_container, second_container) {
        (true, false) => (*first, *second, None),
        (false, true) => {
            let warning = Diagnostic::warning(
                DiagnosticKind::LinkDirectionCorrected,
                format!(
                    "{} {} drawn towards its container; reversed",
                    path.kind, path.path_id
                ),
            )
            .with_path(path.path_id);
            (*second, *first, Some(warning))
        }
        (true, true) => return Err(invalid("both ends are containers".to_string())),
        (false, false) => return Err(invalid("neither end is a container".to_string())),
    };

    let link = Link {
        kind,
        source,
        target,
        path_id: path.path_id,
    };
    Ok((link, corrected))
}

fn resolve_value(path: &MappedPath, tree: &ContainmentTree, logical: &LogicalElements) -> Resolution {
    let ends = logical.resolve(&path.elements);
    let invalid = |reason: String| {
        Diagnostic::error(
            DiagnosticKind::InvalidValueLink,
            format!("to_value {} rejected: {reason}", path.path_id),
        )
        .with_path(path.path_id)
        .with_elements(path.elements.iter().copied())
    };

    let [first, second] = ends.as_slice() else {
        return Err(invalid(format!(
            "expected a key and a value, resolved {} elements",
            ends.len()
        )));
    };
    let roles = (
        tree.label(first.primary()).cell_role(),
        tree.label(second.primary()).cell_role(),
    );

    let (source, target, corrected) = match roles {
        (Some(CellRoleLabel::Key), Some(CellRoleLabel::Value)) => (*first, *second, None),
        (Some(CellRoleLabel::Value), Some(CellRoleLabel::Key)) => {
            let warning = Diagnostic::warning(
                DiagnosticKind::LinkDirectionCorrected,
                format!("to_value {} drawn from value to key; reversed", path.path_id),
            )
            .with_path(path.path_id);
            (*second, *first, Some(warning))
        }
        _ => {
            return Err(invalid(format!(
                "ends are {} and {}",
                tree.label(first.primary()),
                tree.label(second.primary())
            )))
        }
    };

    let link = Link {
        kind: LinkKind::ToValue,
        source,
        target,
        path_id: path.path_id,
    };
    Ok((link, corrected))
}
