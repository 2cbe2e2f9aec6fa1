// Stage 03: Logical element resolution (merge groups)

use super::stage01_containment_tree::ContainmentTree;
use super::stage02_path_mapper::{MappedPath, PathMapping};
use crate::diagnostics::{Diagnostic, DiagnosticKind, Diagnostics};
use crate::labels::ElementLabel;
use crate::model::{ContentLayer, Element, ElementId, PathId, PathKind};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Identifier of a logical element: the lowest element id among its members
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct LogicalId(pub ElementId);

impl LogicalId {
    /// The member whose id names this logical element
    #[inline]
    #[must_use = "returns the primary element"]
    pub const fn primary(self) -> ElementId {
        self.0
    }
}

impl std::fmt::Display for LogicalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "logical {}", self.0 .0)
    }
}

/// Several boxes that together form one document item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeGroup {
    pub id: LogicalId,
    /// Members in provenance order
    pub members: Vec<ElementId>,
    pub label: ElementLabel,
    pub content_layer: ContentLayer,
    /// Merge paths that contributed edges
    pub path_ids: Vec<PathId>,
}

/// Logical-element view over all elements of a page
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogicalElements {
    groups: Vec<MergeGroup>,
    /// Element index -> owning logical element
    owners: Vec<LogicalId>,
    /// Element index -> identity id (backing store for singleton member slices)
    identities: Vec<ElementId>,
    /// Logical id -> index into `groups`
    group_index: FxHashMap<LogicalId, usize>,
}

impl LogicalElements {
    /// Every element is its own logical element
    #[must_use = "returns the logical element view"]
    pub fn singletons(count: usize) -> Self {
        Self::from_groups(count, Vec::new())
    }

    fn from_groups(count: usize, groups: Vec<MergeGroup>) -> Self {
        let identities: Vec<ElementId> = (0..count).map(ElementId).collect();
        let mut owners: Vec<LogicalId> = identities.iter().map(|&id| LogicalId(id)).collect();
        let mut group_index = FxHashMap::default();
        for (i, group) in groups.iter().enumerate() {
            group_index.insert(group.id, i);
            for member in &group.members {
                owners[member.0] = group.id;
            }
        }
        Self {
            groups,
            owners,
            identities,
            group_index,
        }
    }

    /// Logical element owning `element`
    #[inline]
    #[must_use = "returns the owning logical element"]
    pub fn logical_of(&self, element: ElementId) -> LogicalId {
        self.owners
            .get(element.0)
            .copied()
            .unwrap_or(LogicalId(element))
    }

    /// Member elements of `id`, in provenance order
    #[must_use = "returns the member elements"]
    pub fn members(&self, id: LogicalId) -> &[ElementId] {
        match self.group_index.get(&id) {
            Some(&i) => &self.groups[i].members,
            None => self
                .identities
                .get(id.0 .0)
                .map(std::slice::from_ref)
                .unwrap_or(&[]),
        }
    }

    #[inline]
    #[must_use = "returns the merge group, if any"]
    pub fn group(&self, id: LogicalId) -> Option<&MergeGroup> {
        self.group_index.get(&id).map(|&i| &self.groups[i])
    }

    #[inline]
    #[must_use = "returns the merge groups"]
    pub fn groups(&self) -> &[MergeGroup] {
        &self.groups
    }

    /// All logical elements in id order
    pub fn iter(&self) -> impl Iterator<Item = LogicalId> + '_ {
        self.owners
            .iter()
            .enumerate()
            .filter(|(i, owner)| owner.0 .0 == *i)
            .map(|(_, &owner)| owner)
    }

    /// Map touched elements to logical elements, deduplicated in order
    #[must_use = "returns the logical elements"]
    pub fn resolve(&self, elements: &[ElementId]) -> Vec<LogicalId> {
        let mut out: Vec<LogicalId> = Vec::with_capacity(elements.len());
        for &element in elements {
            let id = self.logical_of(element);
            if !out.contains(&id) {
                out.push(id);
            }
        }
        out
    }
}

/// Union-Find over element indices
struct UnionFind {
    parent: FxHashMap<usize, usize>,
    rank: FxHashMap<usize, usize>,
}

impl UnionFind {
    fn new() -> Self {
        Self {
            parent: FxHashMap::default(),
            rank: FxHashMap::default(),
        }
    }

    /// Find root of element with path compression
    fn find(&mut self, x: usize) -> usize {
        let parent = *self.parent.entry(x).or_insert(x);
        if parent != x {
            let root = self.find(parent);
            self.parent.insert(x, root);
            return root;
        }
        x
    }

    /// Union two elements by rank
    fn union(&mut self, x: usize, y: usize) {
        let root_x = self.find(x);
        let root_y = self.find(y);
        if root_x == root_y {
            return;
        }

        let rank_x = self.rank.get(&root_x).copied().unwrap_or(0);
        let rank_y = self.rank.get(&root_y).copied().unwrap_or(0);
        match rank_x.cmp(&rank_y) {
            std::cmp::Ordering::Greater => {
                self.parent.insert(root_y, root_x);
            }
            std::cmp::Ordering::Less => {
                self.parent.insert(root_x, root_y);
            }
            std::cmp::Ordering::Equal => {
                self.parent.insert(root_y, root_x);
                self.rank.insert(root_x, rank_x + 1);
            }
        }
    }

    /// Groups as sorted member lists, ordered by their smallest member
    fn groups(&mut self) -> Vec<Vec<usize>> {
        let mut keys: Vec<usize> = self.parent.keys().copied().collect();
        keys.sort_unstable();
        let mut by_root: FxHashMap<usize, Vec<usize>> = FxHashMap::default();
        for key in keys {
            let root = self.find(key);
            by_root.entry(root).or_default().push(key);
        }
        let mut groups: Vec<Vec<usize>> = by_root.into_values().collect();
        groups.sort_unstable_by_key(|members| members[0]);
        groups
    }
}

/// Stage 03: Logical Element Resolver
///
/// Merge paths act as union constraints; their transitive closure (via
/// Union-Find) forms merge groups. A merge path whose members disagree on
/// label, content layer or enclosing container, or that touches a container
/// or table-structure box, contributes no edges.
///
/// Member order follows a reading-order path that touches every member,
/// when one exists; otherwise the merge paths' draw order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stage03LogicalElements;

impl Stage03LogicalElements {
    #[inline]
    #[must_use = "logical element stage is created but not used"]
    pub const fn new() -> Self {
        Self
    }

    #[must_use = "returns the logical elements and their diagnostics"]
    pub fn process(
        &self,
        elements: &[Element],
        mapping: &PathMapping,
        tree: &ContainmentTree,
    ) -> (LogicalElements, Diagnostics) {
        let mut diagnostics = Diagnostics::new();
        let mut union_find = UnionFind::new();
        // Draw order: first position of each element across valid merge paths
        let mut draw_order: FxHashMap<ElementId, usize> = FxHashMap::default();
        let mut contributing: FxHashMap<ElementId, Vec<PathId>> = FxHashMap::default();

        for path in mapping.of_kind(PathKind::Merge) {
            if path.elements.len() < 2 {
                continue;
            }
            if let Err(reason) = validate_merge(path, elements, tree) {
                diagnostics.push(
                    Diagnostic::error(
                        DiagnosticKind::InvalidMerge,
                        format!("merge {} rejected: {reason}", path.path_id),
                    )
                    .with_path(path.path_id)
                    .with_elements(path.elements.iter().copied()),
                );
                continue;
            }

            for pair in path.elements.windows(2) {
                union_find.union(pair[0].0, pair[1].0);
            }
            for &element in &path.elements {
                let next = draw_order.len();
                draw_order.entry(element).or_insert(next);
                contributing.entry(element).or_default().push(path.path_id);
            }
        }

        let mut groups = Vec::new();
        for members in union_find.groups() {
            let member_ids: Vec<ElementId> = members.into_iter().map(ElementId).collect();
            let primary = member_ids[0];
            let element = &elements[primary.0];

            let mut drawn = member_ids.clone();
            drawn.sort_by_key(|id| draw_order.get(id).copied().unwrap_or(usize::MAX));

            let ordered = match reading_order_evidence(&member_ids, mapping) {
                Some(evidence) if evidence != drawn => {
                    diagnostics.push(
                        Diagnostic::warning(
                            DiagnosticKind::MergeOrderCorrected,
                            format!(
                                "merge of {} drawn against reading order; member order corrected",
                                primary
                            ),
                        )
                        .with_elements(evidence.iter().copied()),
                    );
                    evidence
                }
                Some(evidence) => evidence,
                None => drawn,
            };

            let mut path_ids: Vec<PathId> = member_ids
                .iter()
                .filter_map(|id| contributing.get(id))
                .flatten()
                .copied()
                .collect();
            path_ids.sort_unstable();
            path_ids.dedup();

            groups.push(MergeGroup {
                id: LogicalId(primary),
                members: ordered,
                label: element.label,
                content_layer: element.content_layer,
                path_ids,
            });
        }

        log::debug!(
            "Stage03: {} merge groups over {} elements",
            groups.len(),
            groups.iter().map(|g| g.members.len()).sum::<usize>()
        );

        (LogicalElements::from_groups(elements.len(), groups), diagnostics)
    }
}

fn validate_merge(
    path: &MappedPath,
    elements: &[Element],
    tree: &ContainmentTree,
) -> Result<(), String> {
    let first = &elements[path.elements[0].0];
    let scope = tree.nearest_container(first.id);

    for &id in &path.elements {
        let element = &elements[id.0];
        if element.label.is_container() || element.label.is_table_structure() {
            return Err(format!("{} ({}) cannot be merged", id, element.label));
        }
        if !element.label.merges_with(first.label) {
            return Err(format!(
                "mixed labels {} and {}",
                first.label, element.label
            ));
        }
        if element.content_layer != first.content_layer {
            return Err(format!(
                "mixed content layers {:?} and {:?}",
                first.content_layer, element.content_layer
            ));
        }
        if tree.nearest_container(id) != scope {
            return Err(format!(
                "{} and {} lie in different containers",
                first.id, id
            ));
        }
    }
    Ok(())
}

/// Member order taken from the first reading-order path touching every member
fn reading_order_evidence(members: &[ElementId], mapping: &PathMapping) -> Option<Vec<ElementId>> {
    mapping
        .of_kind(PathKind::ReadingOrder)
        .find(|path| members.iter().all(|m| path.elements.contains(m)))
        .map(|path| {
            path.elements
                .iter()
                .filter(|e| members.contains(e))
                .copied()
                .collect()
        })
}
