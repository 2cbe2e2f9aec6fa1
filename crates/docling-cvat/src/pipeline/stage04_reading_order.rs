// Stage 04: Multi-level reading order resolution

use super::stage01_containment_tree::{ContainmentRole, ContainmentTree};
use super::stage02_path_mapper::{MappedPath, PathMapping};
use super::stage03_logical_elements::{LogicalElements, LogicalId};
use crate::config::ConversionConfig;
use crate::diagnostics::{Diagnostic, DiagnosticKind, Diagnostics};
use crate::labels::DocItemLabel;
use crate::model::{ContentLayer, Element, ElementId, PathId, PathKind};
use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One position in a reading-order sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum PlanEntry {
    /// An ordinary (possibly merged) item
    Item(LogicalId),
    /// A container; its interior comes from its nested plan, if any
    Container(ElementId),
}

impl PlanEntry {
    #[inline]
    #[must_use = "returns the logical element of this entry"]
    pub const fn logical(self) -> LogicalId {
        match self {
            Self::Item(id) => id,
            Self::Container(id) => LogicalId(id),
        }
    }
}

/// What a sequence did after losing a run of elements to a deeper sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "container", rename_all = "snake_case")]
pub enum CompensationOutcome {
    /// The enclosing container already had a position in the sequence
    AlreadyPresent(ElementId),
    /// The enclosing container was inserted where the run used to be
    Inserted(ElementId),
    /// The lost elements share no single usable container
    Unresolved,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Compensation {
    /// Owner of the sequence that lost the run (`None` = document root)
    pub owner: Option<ElementId>,
    /// Position of the run in the resolved sequence
    pub position: usize,
    pub removed: Vec<LogicalId>,
    pub outcome: CompensationOutcome,
}

/// Resolved, non-overlapping reading order for the root and every container
/// that owns a nested order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReadingOrderPlan {
    pub root: Vec<PlanEntry>,
    pub nested: BTreeMap<ElementId, Vec<PlanEntry>>,
    pub compensations: Vec<Compensation>,
    /// The root order was synthesized for a single top-level container
    pub synthesized: bool,
}

impl ReadingOrderPlan {
    /// Sequence owned by `owner` (`None` = document root)
    #[must_use = "returns the sequence, if any"]
    pub fn sequence(&self, owner: Option<ElementId>) -> Option<&[PlanEntry]> {
        match owner {
            None => Some(&self.root),
            Some(id) => self.nested.get(&id).map(Vec::as_slice),
        }
    }

    /// Every entry of every sequence, root first
    pub fn entries(&self) -> impl Iterator<Item = PlanEntry> + '_ {
        self.root
            .iter()
            .chain(self.nested.values().flatten())
            .copied()
    }

    #[must_use = "returns whether the logical element has a position"]
    pub fn contains(&self, id: LogicalId) -> bool {
        self.entries().any(|entry| entry.logical() == id)
    }

    /// Set of logical elements placed by the plan
    #[must_use = "returns the ordered logical elements"]
    pub fn ordered_set(&self) -> FxHashSet<LogicalId> {
        self.entries().map(PlanEntry::logical).collect()
    }
}

/// Candidate sequence before conflict resolution
#[derive(Debug, Clone)]
struct Sequence {
    owner: Option<ElementId>,
    level: u32,
    path_ids: Vec<PathId>,
    touched: Vec<ElementId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Removal {
    /// Claimed by a deeper sequence; eligible for compensation
    Deeper,
    /// Claimed by an earlier sequence of the same level
    SameLevel,
}

/// Stage 04: Reading-Order Resolver
///
/// Algorithm:
/// 1. Exactly one level-1 path is required (FATAL otherwise), except that a
///    page whose only orderable top-level element is a container gets the
///    synthesized order `[container]`
/// 2. Every level-N (N >= 2) path is owned by the deepest container enclosing
///    all its touched elements; paths sharing an owner are concatenated in
///    (level, input) order
/// 3. Cross-boundary promotion: a container whose box is entered or left by
///    a path's control points is inserted where the boundary is first crossed
/// 4. Ancestor expansion: unvisited container ancestors go before an element
///    (outermost first), ancestors it precedes go after it (innermost first)
/// 5. Conflict resolution: an element claimed at several levels stays only in
///    the deepest sequence; shallower sequences compensate with the smallest
///    container enclosing each lost run
/// 6. Untouched check: every non-exempt logical element must have a position
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Stage04ReadingOrder {
    config: ConversionConfig,
}

impl Stage04ReadingOrder {
    #[inline]
    #[must_use = "reading order stage is created but not used"]
    pub fn new() -> Self {
        Self {
            config: ConversionConfig::default(),
        }
    }

    #[inline]
    #[must_use = "reading order stage is created but not used"]
    pub const fn with_config(config: ConversionConfig) -> Self {
        Self { config }
    }

    /// Resolve the reading-order plan.
    ///
    /// Returns `None` together with a FATAL diagnostic when the global order
    /// is missing or duplicated.
    #[must_use = "returns the reading order plan and its diagnostics"]
    pub fn process(
        &self,
        elements: &[Element],
        mapping: &PathMapping,
        tree: &ContainmentTree,
        logical: &LogicalElements,
    ) -> (Option<ReadingOrderPlan>, Diagnostics) {
        let mut diagnostics = Diagnostics::new();

        let Some((sequences, synthesized)) =
            self.collect_sequences(elements, mapping, tree, &mut diagnostics)
        else {
            return (None, diagnostics);
        };

        let expand_one = |sequence: &Sequence| expand(sequence, tree, logical);
        let expanded: Vec<Vec<PlanEntry>> = if self.config.parallel {
            sequences.par_iter().map(expand_one).collect()
        } else {
            sequences.iter().map(expand_one).collect()
        };

        let (resolved, compensations) =
            resolve_conflicts(&sequences, expanded, tree, &mut diagnostics);

        let mut plan = ReadingOrderPlan {
            synthesized,
            compensations,
            ..ReadingOrderPlan::default()
        };
        for (sequence, entries) in sequences.iter().zip(resolved) {
            match sequence.owner {
                None => plan.root = entries,
                Some(owner) => {
                    plan.nested.insert(owner, entries);
                }
            }
        }

        check_untouched(&plan, tree, logical, &mut diagnostics);
        check_orphaned_nested(&plan, tree, logical, &mut diagnostics);

        log::debug!(
            "Stage04: root order of {} entries, {} nested orders, {} compensations",
            plan.root.len(),
            plan.nested.len(),
            plan.compensations.len()
        );
        (Some(plan), diagnostics)
    }

    /// Validate the level-1 count and build candidate sequences (with
    /// cross-boundary promotion applied), root first.
    fn collect_sequences(
        &self,
        elements: &[Element],
        mapping: &PathMapping,
        tree: &ContainmentTree,
        diagnostics: &mut Diagnostics,
    ) -> Option<(Vec<Sequence>, bool)> {
        let reading_order: Vec<&MappedPath> = mapping.of_kind(PathKind::ReadingOrder).collect();
        let global: Vec<&MappedPath> = reading_order.iter().copied().filter(|p| p.level <= 1).collect();

        let mut sequences = Vec::new();
        let mut synthesized = false;
        match global.as_slice() {
            [path] => sequences.push(Sequence {
                owner: None,
                level: 1,
                path_ids: vec![path.path_id],
                touched: self.promote(path, None, elements, tree),
            }),
            [] => {
                let orderable: Vec<ElementId> = tree
                    .root_children()
                    .iter()
                    .copied()
                    .filter(|&id| !tree.is_exempt(id))
                    .collect();
                match orderable.as_slice() {
                    [] => {}
                    [single] if tree.is_container(*single) => {
                        log::debug!("Stage04: synthesizing root order for {single}");
                        synthesized = true;
                        sequences.push(Sequence {
                            owner: None,
                            level: 1,
                            path_ids: Vec::new(),
                            touched: vec![*single],
                        });
                    }
                    _ => {
                        diagnostics.push(Diagnostic::fatal(
                            DiagnosticKind::MissingGlobalOrder,
                            format!(
                                "no level-1 reading order for {} top-level elements",
                                orderable.len()
                            ),
                        ));
                        return None;
                    }
                }
            }
            many => {
                diagnostics.push(
                    Diagnostic::fatal(
                        DiagnosticKind::DuplicateGlobalOrder,
                        format!("{} level-1 reading orders; exactly one is allowed", many.len()),
                    )
                    .with_paths(many.iter().map(|p| p.path_id)),
                );
                return None;
            }
        }

        let mut deeper: Vec<&MappedPath> = reading_order
            .iter()
            .copied()
            .filter(|p| p.level > 1 && !p.is_empty())
            .collect();
        deeper.sort_by_key(|p| p.level);

        for path in deeper {
            let Some(owner) = tree.common_container(&path.elements) else {
                diagnostics.push(
                    Diagnostic::error(
                        DiagnosticKind::NoOwningContainer,
                        format!(
                            "level-{} reading order {} is not enclosed by a single container",
                            path.level, path.path_id
                        ),
                    )
                    .with_path(path.path_id)
                    .with_elements(path.elements.iter().copied()),
                );
                continue;
            };

            let touched = self.promote(path, Some(owner), elements, tree);
            match sequences.iter_mut().find(|s| s.owner == Some(owner)) {
                Some(sequence) => {
                    sequence.level = sequence.level.max(path.level);
                    sequence.path_ids.push(path.path_id);
                    for id in touched {
                        if !sequence.touched.contains(&id) {
                            sequence.touched.push(id);
                        }
                    }
                }
                None => sequences.push(Sequence {
                    owner: Some(owner),
                    level: path.level,
                    path_ids: vec![path.path_id],
                    touched,
                }),
            }
        }

        Some((sequences, synthesized))
    }

    /// Insert containers whose boundary the path crosses.
    ///
    /// The container goes in front of the first element touched after the
    /// first crossing; candidates are the container ancestors (below `owner`)
    /// of touched elements.
    fn promote(
        &self,
        path: &MappedPath,
        owner: Option<ElementId>,
        elements: &[Element],
        tree: &ContainmentTree,
    ) -> Vec<ElementId> {
        let mut candidates: Vec<ElementId> = Vec::new();
        for &id in &path.elements {
            for container in tree
                .container_ancestors(id)
                .take_while(|&c| Some(c) != owner)
            {
                if !candidates.contains(&container) && !path.elements.contains(&container) {
                    candidates.push(container);
                }
            }
        }

        let mut promotions: Vec<(usize, usize, ElementId)> = Vec::new();
        for container in candidates {
            let bbox = elements[container.0].bbox;
            let inside: Vec<bool> = path
                .points
                .iter()
                .map(|&p| bbox.contains_point(p, self.config.point_tolerance))
                .collect();
            let Some(crossing) = (1..inside.len()).find(|&k| inside[k] != inside[k - 1]) else {
                continue;
            };

            let mut before: Vec<ElementId> = Vec::new();
            for hit in path.point_hits[..crossing].iter().flatten() {
                if !before.contains(hit) {
                    before.push(*hit);
                }
            }
            log::trace!(
                "{} crosses {} at point {}; promoted to position {}",
                path.path_id,
                container,
                crossing,
                before.len()
            );
            promotions.push((before.len(), tree.depth(container), container));
        }

        if promotions.is_empty() {
            return path.elements.clone();
        }
        promotions.sort_unstable();

        let mut out = Vec::with_capacity(path.elements.len() + promotions.len());
        let mut pending = promotions.into_iter().peekable();
        for (position, &id) in path.elements.iter().enumerate() {
            while let Some(&(_, _, container)) = pending.peek().filter(|(at, _, _)| *at <= position)
            {
                out.push(container);
                pending.next();
            }
            out.push(id);
        }
        out.extend(pending.map(|(_, _, container)| container));
        out
    }
}

/// Ancestor expansion of one candidate sequence
fn expand(sequence: &Sequence, tree: &ContainmentTree, logical: &LogicalElements) -> Vec<PlanEntry> {
    let owner = sequence.owner;
    let mut visited: FxHashSet<LogicalId> = FxHashSet::default();
    let mut out = Vec::with_capacity(sequence.touched.len());

    let entry_for = |id: ElementId| {
        if tree.is_container(id) {
            PlanEntry::Container(id)
        } else {
            PlanEntry::Item(logical.logical_of(id))
        }
    };

    for &id in &sequence.touched {
        let mut outer: Vec<ElementId> = tree
            .container_ancestors(id)
            .take_while(|&c| Some(c) != owner)
            .collect();
        outer.reverse();
        for container in outer {
            if visited.insert(LogicalId(container)) {
                out.push(PlanEntry::Container(container));
            }
        }

        let entry = entry_for(id);
        if visited.insert(entry.logical()) {
            out.push(entry);
        }

        // Owners this element precedes, up to the enclosing container
        let mut current = id;
        while let Some(parent) = tree.parent(current) {
            if Some(parent) == owner
                || tree.is_container(parent)
                || tree.is_exempt(parent)
                || tree.role(current) != Some(ContainmentRole::PrecedesOwner)
            {
                break;
            }
            let entry = entry_for(parent);
            if visited.insert(entry.logical()) {
                out.push(entry);
            }
            current = parent;
        }
    }
    out
}

/// Keep each claimed element only in its deepest sequence and compensate the
/// shallower ones.
fn resolve_conflicts(
    sequences: &[Sequence],
    expanded: Vec<Vec<PlanEntry>>,
    tree: &ContainmentTree,
    diagnostics: &mut Diagnostics,
) -> (Vec<Vec<PlanEntry>>, Vec<Compensation>) {
    let mut claims: FxHashMap<LogicalId, Vec<usize>> = FxHashMap::default();
    let mut claim_order: Vec<LogicalId> = Vec::new();
    for (s, entries) in expanded.iter().enumerate() {
        for entry in entries {
            let claimants = claims.entry(entry.logical()).or_default();
            if claimants.is_empty() {
                claim_order.push(entry.logical());
            }
            claimants.push(s);
        }
    }

    let mut removals: Vec<FxHashMap<LogicalId, Removal>> = vec![FxHashMap::default(); sequences.len()];
    for id in &claim_order {
        let claimants = &claims[id];
        if claimants.len() < 2 {
            continue;
        }
        let deepest = claimants
            .iter()
            .map(|&s| sequences[s].level)
            .max()
            .unwrap_or(1);
        let mut winner: Option<usize> = None;
        for &s in claimants {
            if sequences[s].level < deepest {
                log::trace!("{id} moves out of level-{} order", sequences[s].level);
                removals[s].insert(*id, Removal::Deeper);
            } else if let Some(kept) = winner {
                removals[s].insert(*id, Removal::SameLevel);
                diagnostics.push(
                    Diagnostic::error(
                        DiagnosticKind::ConflictingClaim,
                        format!(
                            "{} is claimed by two level-{} orders; kept in the first",
                            id.primary(),
                            deepest
                        ),
                    )
                    .with_paths(sequences[kept].path_ids.iter().copied())
                    .with_paths(sequences[s].path_ids.iter().copied())
                    .with_element(id.primary()),
                );
            } else {
                winner = Some(s);
            }
        }
    }

    let claimed_deeper = |container: ElementId, level: u32| {
        claims
            .get(&LogicalId(container))
            .is_some_and(|cs| cs.iter().any(|&s| sequences[s].level > level))
    };

    let mut resolved = Vec::with_capacity(sequences.len());
    let mut compensations = Vec::new();
    for (s, entries) in expanded.into_iter().enumerate() {
        let sequence = &sequences[s];
        let removed = &removals[s];
        if removed.is_empty() {
            resolved.push(entries);
            continue;
        }

        let mut present: FxHashSet<LogicalId> = entries
            .iter()
            .map(|e| e.logical())
            .filter(|id| !removed.contains_key(id))
            .collect();

        let mut out = Vec::with_capacity(entries.len());
        let mut run: Vec<LogicalId> = Vec::new();
        for entry in entries {
            match removed.get(&entry.logical()) {
                Some(Removal::Deeper) => run.push(entry.logical()),
                Some(Removal::SameLevel) => {
                    flush_run(
                        &mut run,
                        sequence,
                        tree,
                        &claimed_deeper,
                        &mut present,
                        &mut out,
                        &mut compensations,
                        diagnostics,
                    );
                }
                None => {
                    flush_run(
                        &mut run,
                        sequence,
                        tree,
                        &claimed_deeper,
                        &mut present,
                        &mut out,
                        &mut compensations,
                        diagnostics,
                    );
                    out.push(entry);
                }
            }
        }
        flush_run(
            &mut run,
            sequence,
            tree,
            &claimed_deeper,
            &mut present,
            &mut out,
            &mut compensations,
            diagnostics,
        );
        resolved.push(out);
    }

    (resolved, compensations)
}

/// Compensate one run of elements lost to deeper sequences
#[allow(clippy::too_many_arguments)]
fn flush_run(
    run: &mut Vec<LogicalId>,
    sequence: &Sequence,
    tree: &ContainmentTree,
    claimed_deeper: &impl Fn(ElementId, u32) -> bool,
    present: &mut FxHashSet<LogicalId>,
    out: &mut Vec<PlanEntry>,
    compensations: &mut Vec<Compensation>,
    diagnostics: &mut Diagnostics,
) {
    if run.is_empty() {
        return;
    }
    let removed = std::mem::take(run);
    let primaries: Vec<ElementId> = removed.iter().map(|id| id.primary()).collect();

    let mut container = tree.common_container(&primaries);
    while let Some(c) = container {
        if Some(c) == sequence.owner {
            container = None;
            break;
        }
        if !claimed_deeper(c, sequence.level) {
            break;
        }
        container = tree.container_ancestors(c).next();
    }
    // Must lie strictly inside the sequence owner
    if let (Some(c), Some(owner)) = (container, sequence.owner) {
        if !tree.is_ancestor(owner, c) {
            container = None;
        }
    }

    let outcome = match container {
        Some(c) if present.contains(&LogicalId(c)) => CompensationOutcome::AlreadyPresent(c),
        Some(c) => {
            present.insert(LogicalId(c));
            out.push(PlanEntry::Container(c));
            CompensationOutcome::Inserted(c)
        }
        None => {
            diagnostics.push(
                Diagnostic::error(
                    DiagnosticKind::UnresolvedCompensation,
                    format!(
                        "elements moved to deeper orders share no single container; \
                         level-{} order left without a placeholder",
                        sequence.level
                    ),
                )
                .with_paths(sequence.path_ids.iter().copied())
                .with_elements(primaries.iter().copied()),
            );
            CompensationOutcome::Unresolved
        }
    };

    let position = match outcome {
        CompensationOutcome::Inserted(_) => out.len() - 1,
        _ => out.len(),
    };
    compensations.push(Compensation {
        owner: sequence.owner,
        position,
        removed,
        outcome,
    });
}

/// Report every non-exempt logical element the plan never places
fn check_untouched(
    plan: &ReadingOrderPlan,
    tree: &ContainmentTree,
    logical: &LogicalElements,
    diagnostics: &mut Diagnostics,
) {
    let ordered = plan.ordered_set();
    for id in logical.iter() {
        let primary = id.primary();
        if ordered.contains(&id) || tree.is_exempt(primary) {
            continue;
        }
        let in_table = tree
            .nearest_container(primary)
            .is_some_and(|c| tree.label(c).is(DocItemLabel::Table));
        let diagnostic = if in_table {
            Diagnostic::error(
                DiagnosticKind::TableChildNotOrdered,
                format!("{primary} ({}) inside a table has no reading-order position", tree.label(primary)),
            )
        } else {
            Diagnostic::error(
                DiagnosticKind::UntouchedElement,
                format!("{primary} ({}) is not touched by any reading order", tree.label(primary)),
            )
        };
        diagnostics.push(diagnostic.with_elements(logical.members(id).iter().copied()));
    }
}

/// Report nested orders whose container is never reached from the root
/// order, directly or through an enclosing container's unordered fallback.
/// Their members count as ordered, so `check_untouched` stays silent on them.
fn check_orphaned_nested(
    plan: &ReadingOrderPlan,
    tree: &ContainmentTree,
    logical: &LogicalElements,
    diagnostics: &mut Diagnostics,
) {
    if plan.nested.is_empty() {
        return;
    }
    let ordered = plan.ordered_set();
    let containers_of = |entries: &[PlanEntry]| -> Vec<ElementId> {
        entries
            .iter()
            .filter_map(|entry| match entry {
                PlanEntry::Container(c) => Some(*c),
                PlanEntry::Item(_) => None,
            })
            .collect()
    };

    let mut reached = FxHashSet::default();
    let mut stack = containers_of(&plan.root);
    while let Some(container) = stack.pop() {
        if !reached.insert(container) {
            continue;
        }
        if let Some(nested) = plan.nested.get(&container) {
            stack.extend(containers_of(nested));
        }
        fallback_containers(container, tree, logical, &ordered, &mut stack);
    }

    for (&owner, entries) in &plan.nested {
        if reached.contains(&owner) {
            continue;
        }
        let dropped: Vec<ElementId> = entries
            .iter()
            .flat_map(|entry| logical.members(entry.logical()).iter().copied())
            .collect();
        diagnostics.push(
            Diagnostic::error(
                DiagnosticKind::OrphanedNestedOrder,
                format!(
                    "{owner} ({}) has a nested reading order but no position of its own; {} ordered elements are dropped",
                    tree.label(owner),
                    dropped.len()
                ),
            )
            .with_element(owner)
            .with_elements(dropped),
        );
    }
}

/// Unordered containers placed under `element` when its content is filled
/// in by position
fn fallback_containers(
    element: ElementId,
    tree: &ContainmentTree,
    logical: &LogicalElements,
    ordered: &FxHashSet<LogicalId>,
    out: &mut Vec<ElementId>,
) {
    for &child in tree.children(element) {
        let label = tree.label(child);
        if label.is_cell_role() || tree.layer(child) == ContentLayer::Background {
            continue;
        }
        if label.is_table_structure() {
            fallback_containers(child, tree, logical, ordered, out);
            continue;
        }
        if ordered.contains(&logical.logical_of(child)) {
            continue;
        }
        if tree.is_container(child) {
            out.push(child);
        } else {
            fallback_containers(child, tree, logical, ordered, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Severity;
    use crate::geometry::{BBox, Point};
    use crate::labels::ElementLabel;
    use crate::model::AnnotatedPage;
    use crate::pipeline::{Stage01ContainmentTree, Stage02PathMapper, Stage03LogicalElements};

    fn content(label: DocItemLabel) -> ElementLabel {
        ElementLabel::Content(label)
    }

    fn item(id: ElementId) -> PlanEntry {
        PlanEntry::Item(LogicalId(id))
    }

    fn resolve(page: &AnnotatedPage) -> (Option<ReadingOrderPlan>, Diagnostics) {
        let tree = Stage01ContainmentTree::new().process(&page.elements);
        let (mapping, _) = Stage02PathMapper::new().process(&page.elements, &page.paths, &tree);
        let (logical, _) = Stage03LogicalElements::new().process(&page.elements, &mapping, &tree);
        Stage04ReadingOrder::new().process(&page.elements, &mapping, &tree, &logical)
    }

    fn center(b: BBox) -> Point {
        Point::new((b.l + b.r) / 2.0, (b.t + b.b) / 2.0)
    }

    #[test]
    fn test_duplicate_global_order_is_fatal() {
        let mut page = AnnotatedPage::new("p", 100.0, 100.0);
        let bbox = BBox::new(10.0, 10.0, 50.0, 50.0);
        page.add_element(content(DocItemLabel::Text), bbox);
        page.add_reading_order(1, vec![center(bbox)]);
        page.add_reading_order(1, vec![center(bbox)]);

        let (plan, diagnostics) = resolve(&page);
        assert!(plan.is_none());
        assert!(diagnostics.has_fatal());
        assert_eq!(diagnostics.as_slice()[0].path_ids, vec![PathId(0), PathId(1)]);
    }

    #[test]
    fn test_missing_global_order_is_fatal() {
        let mut page = AnnotatedPage::new("p", 100.0, 100.0);
        page.add_element(content(DocItemLabel::Text), BBox::new(10.0, 10.0, 50.0, 20.0));
        page.add_element(content(DocItemLabel::Text), BBox::new(10.0, 30.0, 50.0, 40.0));

        let (plan, diagnostics) = resolve(&page);
        assert!(plan.is_none());
        assert_eq!(diagnostics.as_slice()[0].kind, DiagnosticKind::MissingGlobalOrder);
    }

    #[test]
    fn test_single_container_synthesizes_root() {
        let mut page = AnnotatedPage::new("p", 100.0, 100.0);
        let table = page.add_element(content(DocItemLabel::Table), BBox::new(0.0, 0.0, 100.0, 100.0));
        let a = page.add_element(content(DocItemLabel::Text), BBox::new(10.0, 10.0, 40.0, 20.0));
        let b = page.add_element(content(DocItemLabel::Text), BBox::new(10.0, 30.0, 40.0, 40.0));
        page.add_reading_order(2, vec![Point::new(20.0, 35.0), Point::new(20.0, 15.0)]);

        let (plan, diagnostics) = resolve(&page);
        let plan = plan.unwrap();
        assert!(plan.synthesized);
        assert_eq!(plan.root, vec![PlanEntry::Container(table)]);
        assert_eq!(plan.nested[&table], vec![item(b), item(a)]);
        assert_eq!(diagnostics.max_severity(), None);
    }

    #[test]
    fn test_cross_boundary_promotion() {
        let mut page = AnnotatedPage::new("p", 200.0, 200.0);
        let table = page.add_element(content(DocItemLabel::Table), BBox::new(0.0, 0.0, 100.0, 100.0));
        let cell = page.add_element(content(DocItemLabel::Text), BBox::new(40.0, 40.0, 60.0, 60.0));
        page.add_reading_order(1, vec![Point::new(50.0, -10.0), Point::new(50.0, 50.0)]);

        let (plan, _) = resolve(&page);
        assert_eq!(plan.unwrap().root, vec![PlanEntry::Container(table), item(cell)]);
    }

    #[test]
    fn test_path_inside_container_is_unchanged_by_promotion() {
        let mut page = AnnotatedPage::new("p", 200.0, 200.0);
        page.add_element(content(DocItemLabel::Table), BBox::new(0.0, 0.0, 100.0, 100.0));
        let cell = page.add_element(content(DocItemLabel::Text), BBox::new(40.0, 40.0, 60.0, 60.0));
        let path = MappedPath {
            path_id: PathId(0),
            kind: PathKind::ReadingOrder,
            level: 1,
            elements: vec![cell],
            point_hits: vec![None, Some(cell)],
            points: vec![Point::new(20.0, 20.0), Point::new(50.0, 50.0)],
        };
        let tree = Stage01ContainmentTree::new().process(&page.elements);
        let promoted = Stage04ReadingOrder::new().promote(&path, None, &page.elements, &tree);
        assert_eq!(promoted, vec![cell]);
    }

    #[test]
    fn test_deeper_level_wins_with_compensation() {
        let mut page = AnnotatedPage::new("p", 200.0, 300.0);
        let table = page.add_element(content(DocItemLabel::Table), BBox::new(0.0, 0.0, 100.0, 100.0));
        let cell = page.add_element(content(DocItemLabel::Text), BBox::new(40.0, 40.0, 60.0, 60.0));
        let below = page.add_element(content(DocItemLabel::Text), BBox::new(0.0, 150.0, 100.0, 200.0));
        page.add_reading_order(1, vec![Point::new(50.0, 50.0), Point::new(50.0, 175.0)]);
        page.add_reading_order(2, vec![Point::new(50.0, 50.0)]);

        let (plan, diagnostics) = resolve(&page);
        let plan = plan.unwrap();
        assert_eq!(plan.root, vec![PlanEntry::Container(table), item(below)]);
        assert_eq!(plan.nested[&table], vec![item(cell)]);
        assert_eq!(
            plan.compensations[0].outcome,
            CompensationOutcome::AlreadyPresent(table)
        );
        assert_eq!(diagnostics.max_severity(), None);
    }

    #[test]
    fn test_preceding_heading_pulls_owner_after_it() {
        let mut page = AnnotatedPage::new("p", 200.0, 300.0);
        let outer = page.add_element(content(DocItemLabel::Text), BBox::new(0.0, 0.0, 100.0, 100.0));
        let heading =
            page.add_element(content(DocItemLabel::SectionHeader), BBox::new(10.0, 10.0, 90.0, 20.0));
        let following = page.add_element(content(DocItemLabel::Text), BBox::new(0.0, 150.0, 100.0, 200.0));
        page.add_reading_order(1, vec![Point::new(50.0, 15.0), Point::new(50.0, 175.0)]);

        let (plan, diagnostics) = resolve(&page);
        assert_eq!(plan.unwrap().root, vec![item(heading), item(outer), item(following)]);
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_untouched_elements_reported() {
        let mut page = AnnotatedPage::new("p", 300.0, 300.0);
        let a = page.add_element(content(DocItemLabel::Text), BBox::new(0.0, 0.0, 100.0, 20.0));
        let lonely = page.add_element(content(DocItemLabel::Text), BBox::new(0.0, 50.0, 100.0, 70.0));
        let table = page.add_element(content(DocItemLabel::Table), BBox::new(0.0, 100.0, 200.0, 200.0));
        let cell = page.add_element(content(DocItemLabel::Text), BBox::new(10.0, 110.0, 50.0, 130.0));
        page.add_reading_order(1, vec![Point::new(50.0, 10.0), Point::new(150.0, 180.0)]);

        let (plan, diagnostics) = resolve(&page);
        let plan = plan.unwrap();
        assert_eq!(plan.root, vec![item(a), PlanEntry::Container(table)]);
        let errors: Vec<_> = diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .map(|d| (d.kind, d.element_ids.clone()))
            .collect();
        assert_eq!(
            errors,
            vec![
                (DiagnosticKind::UntouchedElement, vec![lonely]),
                (DiagnosticKind::TableChildNotOrdered, vec![cell]),
            ]
        );
    }

    #[test]
    fn test_nested_order_of_unplaced_container_is_reported() {
        let mut page = AnnotatedPage::new("p", 300.0, 300.0);
        let a = page.add_element(content(DocItemLabel::Text), BBox::new(0.0, 0.0, 100.0, 20.0));
        let table = page.add_element(content(DocItemLabel::Table), BBox::new(0.0, 100.0, 200.0, 200.0));
        let c1 = page.add_element(content(DocItemLabel::Text), BBox::new(10.0, 110.0, 50.0, 130.0));
        let c2 = page.add_element(content(DocItemLabel::Text), BBox::new(60.0, 110.0, 100.0, 130.0));
        page.add_reading_order(1, vec![Point::new(50.0, 10.0)]);
        page.add_reading_order(2, vec![Point::new(30.0, 120.0), Point::new(80.0, 120.0)]);

        let (plan, diagnostics) = resolve(&page);
        let plan = plan.unwrap();
        assert_eq!(plan.root, vec![item(a)]);
        assert_eq!(plan.nested[&table], vec![item(c1), item(c2)]);

        let errors: Vec<_> = diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .map(|d| (d.kind, d.element_ids.clone()))
            .collect();
        assert_eq!(
            errors,
            vec![
                (DiagnosticKind::UntouchedElement, vec![table]),
                (DiagnosticKind::OrphanedNestedOrder, vec![table, c1, c2]),
            ]
        );
    }

    #[test]
    fn test_nested_order_reached_through_fallback_is_not_reported() {
        let mut page = AnnotatedPage::new("p", 400.0, 400.0);
        let form = page.add_element(content(DocItemLabel::Form), BBox::new(0.0, 0.0, 400.0, 400.0));
        let table = page.add_element(content(DocItemLabel::Table), BBox::new(10.0, 10.0, 200.0, 200.0));
        page.add_element(content(DocItemLabel::Text), BBox::new(20.0, 20.0, 60.0, 40.0));
        page.add_element(content(DocItemLabel::Text), BBox::new(80.0, 20.0, 120.0, 40.0));
        page.add_reading_order(1, vec![Point::new(300.0, 300.0)]);
        page.add_reading_order(2, vec![Point::new(40.0, 30.0), Point::new(100.0, 30.0)]);

        let (plan, diagnostics) = resolve(&page);
        let plan = plan.unwrap();
        assert_eq!(plan.root, vec![PlanEntry::Container(form)]);
        assert!(plan.nested.contains_key(&table));
        assert!(!diagnostics.iter().any(|d| d.kind == DiagnosticKind::OrphanedNestedOrder));
    }

    #[test]
    fn test_three_level_nesting() {
        let mut page = AnnotatedPage::new("p", 400.0, 200.0);
        let form = page.add_element(content(DocItemLabel::Form), BBox::new(0.0, 0.0, 400.0, 200.0));
        let t1 = page.add_element(content(DocItemLabel::Table), BBox::new(10.0, 10.0, 150.0, 150.0));
        let c1 = page.add_element(content(DocItemLabel::Text), BBox::new(20.0, 20.0, 40.0, 40.0));
        let t2 = page.add_element(content(DocItemLabel::Table), BBox::new(200.0, 10.0, 350.0, 150.0));
        let c2 = page.add_element(content(DocItemLabel::Text), BBox::new(210.0, 20.0, 230.0, 40.0));
        page.add_reading_order(1, vec![Point::new(5.0, 190.0)]);
        page.add_reading_order(2, vec![Point::new(30.0, 30.0), Point::new(220.0, 30.0)]);
        page.add_reading_order(3, vec![Point::new(30.0, 30.0)]);
        page.add_reading_order(3, vec![Point::new(220.0, 30.0)]);

        let (plan, _) = resolve(&page);
        let plan = plan.unwrap();
        assert_eq!(plan.root, vec![PlanEntry::Container(form)]);
        assert_eq!(
            plan.nested[&form],
            vec![PlanEntry::Container(t1), PlanEntry::Container(t2)]
        );
        assert_eq!(plan.nested[&t1], vec![item(c1)]);
        assert_eq!(plan.nested[&t2], vec![item(c2)]);
    }

    #[test]
    fn test_run_without_common_container_is_unresolved() {
        let mut page = AnnotatedPage::new("p", 400.0, 200.0);
        let t1 = page.add_element(content(DocItemLabel::Table), BBox::new(0.0, 0.0, 150.0, 150.0));
        let a = page.add_element(content(DocItemLabel::Text), BBox::new(10.0, 10.0, 40.0, 40.0));
        let t2 = page.add_element(content(DocItemLabel::Table), BBox::new(200.0, 0.0, 350.0, 150.0));
        let b = page.add_element(content(DocItemLabel::Text), BBox::new(210.0, 10.0, 240.0, 40.0));
        let tree = Stage01ContainmentTree::new().process(&page.elements);

        let sequences = vec![
            Sequence {
                owner: None,
                level: 1,
                path_ids: vec![PathId(0)],
                touched: vec![a, b],
            },
            Sequence {
                owner: Some(t1),
                level: 2,
                path_ids: vec![PathId(1)],
                touched: vec![a],
            },
            Sequence {
                owner: Some(t2),
                level: 2,
                path_ids: vec![PathId(2)],
                touched: vec![b],
            },
        ];
        let expanded = vec![vec![item(a), item(b)], vec![item(a)], vec![item(b)]];

        let mut diagnostics = Diagnostics::new();
        let (resolved, compensations) =
            resolve_conflicts(&sequences, expanded, &tree, &mut diagnostics);

        assert!(resolved[0].is_empty());
        assert_eq!(compensations.len(), 1);
        assert_eq!(compensations[0].outcome, CompensationOutcome::Unresolved);
        assert_eq!(
            diagnostics.as_slice()[0].kind,
            DiagnosticKind::UnresolvedCompensation
        );
    }
}
