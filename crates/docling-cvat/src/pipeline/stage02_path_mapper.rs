// Stage 02: Path-to-element mapping

use super::stage01_containment_tree::{ContainmentTree, ElementIndex};
use crate::config::ConversionConfig;
use crate::diagnostics::{Diagnostic, DiagnosticKind, Diagnostics};
use crate::geometry::Point;
use crate::labels::DocItemLabel;
use crate::model::{AnnotationPath, Element, ElementId, PathId, PathKind};
use ordered_float::OrderedFloat;
use rayon::prelude::*;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

/// A path resolved to the elements its control points touch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappedPath {
    pub path_id: PathId,
    pub kind: PathKind,
    /// Effective reading-order level (1 for non reading-order paths)
    pub level: u32,
    /// Touched elements, deduplicated, in first-occurrence order
    pub elements: Vec<ElementId>,
    /// Per control point: the element it resolved to
    pub point_hits: Vec<Option<ElementId>>,
    pub points: Vec<Point>,
}

impl MappedPath {
    #[inline]
    #[must_use = "returns whether the path touched nothing"]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

/// Mapping results for every path, in input order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PathMapping {
    pub paths: Vec<MappedPath>,
}

impl PathMapping {
    /// Mapped paths of one kind, in input order
    pub fn of_kind(&self, kind: PathKind) -> impl Iterator<Item = &MappedPath> + '_ {
        self.paths.iter().filter(move |p| p.kind == kind)
    }
}

/// Stage 02: Path Mapper
///
/// For every control point, finds the deepest (smallest-area) element whose
/// box contains the point within `point_tolerance`, restricted to the label
/// family the path kind accepts:
///
/// | kind                      | eligible                                          |
/// |---------------------------|---------------------------------------------------|
/// | reading_order, group      | content labels                                    |
/// | merge                     | content / key-value, no containers, first hit's container only |
/// | to_caption                | containers, caption-eligible labels               |
/// | to_footnote               | containers, footnote-eligible labels              |
/// | to_value                  | key / value                                       |
///
/// Table-structure boxes are never eligible; hitting one is reported and
/// the point falls through to the next candidate.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Stage02PathMapper {
    config: ConversionConfig,
}

impl Stage02PathMapper {
    #[inline]
    #[must_use = "path mapping stage is created but not used"]
    pub fn new() -> Self {
        Self {
            config: ConversionConfig::default(),
        }
    }

    #[inline]
    #[must_use = "path mapping stage is created but not used"]
    pub const fn with_config(config: ConversionConfig) -> Self {
        Self { config }
    }

    /// Map every path to its touched elements
    #[must_use = "returns the path mapping and its diagnostics"]
    pub fn process(
        &self,
        elements: &[Element],
        paths: &[AnnotationPath],
        tree: &ContainmentTree,
    ) -> (PathMapping, Diagnostics) {
        let index = ElementIndex::new(elements);

        let map_one = |path: &AnnotationPath| self.map_path(path, elements, tree, &index);
        let results: Vec<(MappedPath, Vec<Diagnostic>)> = if self.config.parallel {
            paths.par_iter().map(map_one).collect()
        } else {
            paths.iter().map(map_one).collect()
        };

        let mut diagnostics = Diagnostics::new();
        let mut mapped = Vec::with_capacity(results.len());
        for (path, path_diagnostics) in results {
            for diagnostic in path_diagnostics {
                diagnostics.push(diagnostic);
            }
            mapped.push(path);
        }

        log::debug!(
            "Stage02: mapped {} paths ({} empty), {} diagnostics",
            mapped.len(),
            mapped.iter().filter(|p| p.is_empty()).count(),
            diagnostics.len()
        );

        (PathMapping { paths: mapped }, diagnostics)
    }

    fn map_path(
        &self,
        path: &AnnotationPath,
        elements: &[Element],
        tree: &ContainmentTree,
        index: &ElementIndex,
    ) -> (MappedPath, Vec<Diagnostic>) {
        let tolerance = self.config.point_tolerance;
        let mut diagnostics = Vec::new();
        let mut reported_structure: FxHashSet<ElementId> = FxHashSet::default();
        let mut point_hits = Vec::with_capacity(path.points.len());
        let mut touched: Vec<ElementId> = Vec::new();
        let mut seen: FxHashSet<ElementId> = FxHashSet::default();
        // Merge scope: the container enclosing the first merge hit (None = page)
        let mut merge_scope: Option<Option<ElementId>> = None;

        for (point_idx, &point) in path.points.iter().enumerate() {
            let mut candidates: Vec<&Element> = index
                .intersecting(
                    point.x - tolerance,
                    point.y - tolerance,
                    point.x + tolerance,
                    point.y + tolerance,
                )
                .into_iter()
                .map(|i| &elements[i])
                .filter(|e| e.bbox.contains_point(point, tolerance))
                .collect();
            candidates.sort_by_key(|e| (OrderedFloat(e.area()), e.id));

            let mut hit = None;
            for candidate in candidates {
                if candidate.label.is_table_structure() {
                    if reported_structure.insert(candidate.id) {
                        diagnostics.push(table_structure_diagnostic(path, candidate, tree));
                    }
                    continue;
                }
                if !is_eligible(path.kind, candidate, tree, merge_scope) {
                    continue;
                }
                hit = Some(candidate.id);
                break;
            }

            match hit {
                Some(id) => {
                    if path.kind == PathKind::Merge && merge_scope.is_none() {
                        merge_scope = Some(tree.nearest_container(id));
                    }
                    if seen.insert(id) {
                        touched.push(id);
                    }
                }
                None => diagnostics.push(
                    Diagnostic::warning(
                        DiagnosticKind::UnmatchedPoint,
                        format!(
                            "{} {} point {} ({:.1}, {:.1}) matches no eligible element",
                            path.kind, path.id, point_idx, point.x, point.y
                        ),
                    )
                    .with_path(path.id),
                ),
            }
            point_hits.push(hit);
        }

        if touched.is_empty() {
            diagnostics.push(
                Diagnostic::error(
                    DiagnosticKind::EmptyPath,
                    format!("{} {} touches no eligible element", path.kind, path.id),
                )
                .with_path(path.id),
            );
        } else if path.kind == PathKind::Merge && touched.len() == 1 {
            diagnostics.push(
                Diagnostic::warning(
                    DiagnosticKind::SingleElementMerge,
                    format!("merge {} touches a single element", path.id),
                )
                .with_path(path.id)
                .with_elements(touched.iter().copied()),
            );
        }

        log::trace!("{} {} -> {:?}", path.kind, path.id, touched);

        let mapped = MappedPath {
            path_id: path.id,
            kind: path.kind,
            level: if path.kind == PathKind::ReadingOrder {
                path.effective_level()
            } else {
                1
            },
            elements: touched,
            point_hits,
            points: path.points.clone(),
        };
        (mapped, diagnostics)
    }
}

fn is_eligible(
    kind: PathKind,
    element: &Element,
    tree: &ContainmentTree,
    merge_scope: Option<Option<ElementId>>,
) -> bool {
    let label = element.label;
    match kind {
        PathKind::ReadingOrder | PathKind::Group => label.is_content(),
        PathKind::Merge => {
            let family_ok = (label.is_content() || label.is_cell_role()) && !label.is_container();
            let in_scope = match merge_scope {
                None => true,
                Some(None) => tree.nearest_container(element.id).is_none(),
                Some(Some(scope)) => tree.is_ancestor(scope, element.id),
            };
            family_ok && in_scope
        }
        PathKind::ToCaption => label
            .content()
            .is_some_and(|l| l.is_container() || l.is_caption_eligible()),
        PathKind::ToFootnote => label
            .content()
            .is_some_and(|l| l.is_container() || l.is_footnote_eligible()),
        PathKind::ToValue => label.is_cell_role(),
    }
}

fn table_structure_diagnostic(
    path: &AnnotationPath,
    element: &Element,
    tree: &ContainmentTree,
) -> Diagnostic {
    let inside_table = tree.is_inside(element.id, DocItemLabel::Table);
    let diagnostic = if inside_table {
        Diagnostic::warning(
            DiagnosticKind::TableStructureHit,
            format!(
                "{} {} touches table structure {} ({}); ignored",
                path.kind, path.id, element.id, element.label
            ),
        )
    } else {
        Diagnostic::error(
            DiagnosticKind::TableStructureOutsideTable,
            format!(
                "{} {} touches {} ({}) which lies outside any table",
                path.kind, path.id, element.id, element.label
            ),
        )
    };
    diagnostic.with_path(path.id).with_element(element.id)
}
