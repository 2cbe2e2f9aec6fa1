// Stage 01: Containment tree construction
// Intentional conversions: element indices <-> rtree envelopes
#![allow(clippy::cast_precision_loss)]

use crate::config::ConversionConfig;
use crate::labels::{DocItemLabel, ElementLabel};
use crate::model::{ContentLayer, Element, ElementId};
use ordered_float::OrderedFloat;
use rayon::prelude::*;
use rstar::{RTree, AABB};
use serde::{Deserialize, Serialize};

/// Stage 01: Containment Tree Builder
///
/// Builds the spatial hierarchy of annotation boxes.
///
/// Algorithm:
/// 1. Index every element box in an R-tree
/// 2. For each element E, query boxes intersecting E
/// 3. Keep candidates P with the same content layer, strictly larger area,
///    and more than `containment_threshold` of E's area inside P
/// 4. Parent = smallest qualifying P (ties: lowest input index); none = root
///
/// Strictly increasing area along every parent chain rules out cycles.
///
/// Input: elements
/// Output: `ContainmentTree`
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Stage01ContainmentTree {
    config: ConversionConfig,
}

/// How a non-container parent relates to one of its children
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainmentRole {
    /// The child is read before its owner (a heading inlined in a paragraph).
    /// Ordering the child also places the owner right after it.
    PrecedesOwner,
    /// The child belongs to its owner's item (key/value cells) and is never
    /// ordered on its own.
    OwnedInline,
    /// The child is unrelated to its parent's ordering
    Exempt,
}

/// Immutable spatial hierarchy over all elements of a page.
///
/// Node `n` wraps element `n`; the synthetic page root is implicit and its
/// children are listed in [`ContainmentTree::root_children`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainmentTree {
    parents: Vec<Option<ElementId>>,
    children: Vec<Vec<ElementId>>,
    root_children: Vec<ElementId>,
    depths: Vec<usize>,
    labels: Vec<ElementLabel>,
    layers: Vec<ContentLayer>,
}

#[derive(Debug, Clone, Copy)]
struct ElementEnvelope {
    aabb: AABB<[f64; 2]>,
    index: usize,
}

impl rstar::RTreeObject for ElementEnvelope {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.aabb
    }
}

/// R-tree over element boxes, shared by the stages that do spatial lookups
pub(crate) struct ElementIndex {
    tree: RTree<ElementEnvelope>,
}

impl ElementIndex {
    pub(crate) fn new(elements: &[Element]) -> Self {
        let envelopes: Vec<ElementEnvelope> = elements
            .iter()
            .enumerate()
            .map(|(index, e)| ElementEnvelope {
                aabb: AABB::from_corners([e.bbox.l, e.bbox.t], [e.bbox.r, e.bbox.b]),
                index,
            })
            .collect();
        Self {
            tree: RTree::bulk_load(envelopes),
        }
    }

    /// Indices of elements whose box intersects `[l, t, r, b]`, ascending
    pub(crate) fn intersecting(&self, l: f64, t: f64, r: f64, b: f64) -> Vec<usize> {
        let query = AABB::from_corners([l, t], [r, b]);
        let mut hits: Vec<usize> = self
            .tree
            .locate_in_envelope_intersecting(&query)
            .map(|env| env.index)
            .collect();
        hits.sort_unstable();
        hits
    }
}

impl Stage01ContainmentTree {
    #[inline]
    #[must_use = "containment stage is created but not used"]
    pub fn new() -> Self {
        Self {
            config: ConversionConfig::default(),
        }
    }

    #[inline]
    #[must_use = "containment stage is created but not used"]
    pub const fn with_config(config: ConversionConfig) -> Self {
        Self { config }
    }

    /// Build the containment tree.
    ///
    /// Never fails: an element with no qualifying parent hangs off the root.
    #[must_use = "returns the containment tree"]
    pub fn process(&self, elements: &[Element]) -> ContainmentTree {
        let index = ElementIndex::new(elements);

        let find_parent = |child: &Element| self.find_parent(child, elements, &index);
        let parents: Vec<Option<ElementId>> = if self.config.parallel {
            elements.par_iter().map(find_parent).collect()
        } else {
            elements.iter().map(find_parent).collect()
        };

        let tree = ContainmentTree::from_parents(
            parents,
            elements.iter().map(|e| e.label).collect(),
            elements.iter().map(|e| e.content_layer).collect(),
        );

        log::debug!(
            "Stage01: {} elements, {} root children, max depth {}",
            tree.len(),
            tree.root_children.len(),
            tree.depths.iter().max().copied().unwrap_or(0)
        );
        tree
    }

    fn find_parent(
        &self,
        child: &Element,
        elements: &[Element],
        index: &ElementIndex,
    ) -> Option<ElementId> {
        let child_area = child.area();
        if child_area <= 0.0 {
            return None;
        }

        let bbox = child.bbox;
        index
            .intersecting(bbox.l, bbox.t, bbox.r, bbox.b)
            .into_iter()
            .map(|i| &elements[i])
            .filter(|candidate| {
                candidate.id != child.id
                    && candidate.content_layer == child.content_layer
                    && candidate.area() > child_area
                    && bbox.fraction_inside(&candidate.bbox) > self.config.containment_threshold
            })
            .min_by_key(|candidate| (OrderedFloat(candidate.area()), candidate.id))
            .map(|parent| {
                log::trace!("{} -> parent {}", child.id, parent.id);
                parent.id
            })
    }
}

impl ContainmentTree {
    /// Assemble the tree from a parent assignment.
    ///
    /// Children lists keep input order.
    #[must_use = "returns the containment tree"]
    pub fn from_parents(
        parents: Vec<Option<ElementId>>,
        labels: Vec<ElementLabel>,
        layers: Vec<ContentLayer>,
    ) -> Self {
        let n = parents.len();
        let mut children = vec![Vec::new(); n];
        let mut root_children = Vec::new();
        for (i, parent) in parents.iter().enumerate() {
            match parent {
                Some(p) => children[p.0].push(ElementId(i)),
                None => root_children.push(ElementId(i)),
            }
        }

        let mut depths = vec![0usize; n];
        let mut stack: Vec<(ElementId, usize)> =
            root_children.iter().rev().map(|&id| (id, 0)).collect();
        while let Some((id, depth)) = stack.pop() {
            depths[id.0] = depth;
            stack.extend(children[id.0].iter().rev().map(|&c| (c, depth + 1)));
        }

        Self {
            parents,
            children,
            root_children,
            depths,
            labels,
            layers,
        }
    }

    #[inline]
    #[must_use = "returns the number of nodes"]
    pub fn len(&self) -> usize {
        self.parents.len()
    }

    #[inline]
    #[must_use = "returns whether the tree has no nodes"]
    pub fn is_empty(&self) -> bool {
        self.parents.is_empty()
    }

    #[inline]
    #[must_use = "returns the parent element"]
    pub fn parent(&self, id: ElementId) -> Option<ElementId> {
        self.parents.get(id.0).copied().flatten()
    }

    #[inline]
    #[must_use = "returns the child elements"]
    pub fn children(&self, id: ElementId) -> &[ElementId] {
        self.children.get(id.0).map(Vec::as_slice).unwrap_or(&[])
    }

    #[inline]
    #[must_use = "returns the children of the page root"]
    pub fn root_children(&self) -> &[ElementId] {
        &self.root_children
    }

    /// Distance from the page root (root children have depth 0)
    #[inline]
    #[must_use = "returns the node depth"]
    pub fn depth(&self, id: ElementId) -> usize {
        self.depths.get(id.0).copied().unwrap_or(0)
    }

    #[inline]
    #[must_use = "returns the element label"]
    pub fn label(&self, id: ElementId) -> ElementLabel {
        self.labels[id.0]
    }

    #[inline]
    #[must_use = "returns the element content layer"]
    pub fn layer(&self, id: ElementId) -> ContentLayer {
        self.layers[id.0]
    }

    #[inline]
    #[must_use = "returns whether the element is a container"]
    pub fn is_container(&self, id: ElementId) -> bool {
        self.label(id).is_container()
    }

    /// Strict ancestors, innermost first
    pub fn ancestors(&self, id: ElementId) -> impl Iterator<Item = ElementId> + '_ {
        std::iter::successors(self.parent(id), move |&p| self.parent(p))
    }

    /// Whether `ancestor` is a strict ancestor of `id`
    #[must_use = "returns whether the element is an ancestor"]
    pub fn is_ancestor(&self, ancestor: ElementId, id: ElementId) -> bool {
        self.ancestors(id).any(|a| a == ancestor)
    }

    /// Strict container ancestors, innermost first
    pub fn container_ancestors(&self, id: ElementId) -> impl Iterator<Item = ElementId> + '_ {
        self.ancestors(id).filter(move |&a| self.is_container(a))
    }

    /// Innermost strict container ancestor
    #[must_use = "returns the nearest container ancestor"]
    pub fn nearest_container(&self, id: ElementId) -> Option<ElementId> {
        self.container_ancestors(id).next()
    }

    /// Whether the element lies (at any depth) inside a container of `label`
    #[must_use = "returns whether a container of that label encloses the element"]
    pub fn is_inside(&self, id: ElementId, label: DocItemLabel) -> bool {
        self.container_ancestors(id).any(|a| self.label(a).is(label))
    }

    /// Deepest container that strictly encloses every element of `ids`
    #[must_use = "returns the deepest common container ancestor"]
    pub fn common_container(&self, ids: &[ElementId]) -> Option<ElementId> {
        let (first, rest) = ids.split_first()?;
        self.container_ancestors(*first)
            .find(|&c| rest.iter().all(|&id| self.is_ancestor(c, id)))
    }

    /// All descendants in pre-order (children in input order)
    #[must_use = "returns the descendants"]
    pub fn descendants(&self, id: ElementId) -> Vec<ElementId> {
        let mut out = Vec::new();
        let mut stack: Vec<ElementId> = self.children(id).iter().rev().copied().collect();
        while let Some(node) = stack.pop() {
            out.push(node);
            stack.extend(self.children(node).iter().rev().copied());
        }
        out
    }

    /// Role of `child` with respect to its parent.
    ///
    /// Returns `None` for root children and for children of containers (those
    /// are governed by the container's own reading order). Content inside an
    /// exempt parent (a table row, a key/value cell) is itself exempt: the
    /// parent never takes an ordered position of its own.
    #[must_use = "returns the containment role"]
    pub fn role(&self, child: ElementId) -> Option<ContainmentRole> {
        let parent = self.parent(child)?;
        if self.is_container(parent) {
            return None;
        }
        let label = self.label(child);
        let role = if label.is_cell_role() {
            ContainmentRole::OwnedInline
        } else if self.is_exempt(child) || self.is_exempt(parent) {
            ContainmentRole::Exempt
        } else {
            ContainmentRole::PrecedesOwner
        };
        Some(role)
    }

    /// Elements that never need a reading-order position.
    ///
    /// Table structure, background layer, key/value cells and anything whose
    /// nearest container is a picture.
    #[must_use = "returns whether the element is exempt from ordering"]
    pub fn is_exempt(&self, id: ElementId) -> bool {
        let label = self.label(id);
        label.is_table_structure()
            || label.is_cell_role()
            || self.layer(id) == ContentLayer::Background
            || self
                .nearest_container(id)
                .is_some_and(|c| self.label(c).is(DocItemLabel::Picture))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::BBox;
    use crate::labels::{CellRoleLabel, TableStructLabel};

    fn element(id: usize, label: ElementLabel, bbox: BBox) -> Element {
        Element::new(ElementId(id), label, bbox)
    }

    fn content(label: DocItemLabel) -> ElementLabel {
        ElementLabel::Content(label)
    }

    #[test]
    fn test_smallest_qualifying_parent_wins() {
        let elements = vec![
            element(0, content(DocItemLabel::Table), BBox::new(0.0, 0.0, 200.0, 200.0)),
            element(1, content(DocItemLabel::Text), BBox::new(10.0, 10.0, 150.0, 150.0)),
            element(2, content(DocItemLabel::Text), BBox::new(20.0, 20.0, 40.0, 40.0)),
        ];
        let tree = Stage01ContainmentTree::new().process(&elements);

        assert_eq!(tree.parent(ElementId(1)), Some(ElementId(0)));
        assert_eq!(tree.parent(ElementId(2)), Some(ElementId(1)));
        assert_eq!(tree.root_children(), &[ElementId(0)]);
        assert_eq!(tree.depth(ElementId(2)), 2);
        assert_eq!(tree.nearest_container(ElementId(2)), Some(ElementId(0)));
    }

    #[test]
    fn test_threshold_is_strict() {
        // Exactly 70% inside does not qualify
        let elements = vec![
            element(0, content(DocItemLabel::Text), BBox::new(0.0, 0.0, 100.0, 100.0)),
            element(1, content(DocItemLabel::Text), BBox::new(30.0, 0.0, 130.0, 10.0)),
            element(2, content(DocItemLabel::Text), BBox::new(31.0, 20.0, 131.0, 30.0)),
        ];
        let tree = Stage01ContainmentTree::new().process(&elements);
        assert_eq!(tree.parent(ElementId(1)), None);
        assert_eq!(tree.parent(ElementId(2)), None);

        let lenient = Stage01ContainmentTree::with_config(
            ConversionConfig::default().with_containment_threshold(0.2),
        )
        .process(&elements);
        assert_eq!(lenient.parent(ElementId(1)), Some(ElementId(0)));
    }

    #[test]
    fn test_layers_never_nest() {
        let elements = vec![
            element(0, content(DocItemLabel::Picture), BBox::new(0.0, 0.0, 100.0, 100.0))
                .with_layer(ContentLayer::Background),
            element(1, content(DocItemLabel::Text), BBox::new(10.0, 10.0, 20.0, 20.0)),
        ];
        let tree = Stage01ContainmentTree::new().process(&elements);
        assert_eq!(tree.parent(ElementId(1)), None);
        assert_eq!(tree.root_children().len(), 2);
    }

    #[test]
    fn test_equal_area_tie_goes_to_input_order() {
        let elements = vec![
            element(0, content(DocItemLabel::Text), BBox::new(0.0, 0.0, 100.0, 100.0)),
            element(1, content(DocItemLabel::Text), BBox::new(0.0, 0.0, 100.0, 100.0)),
            element(2, content(DocItemLabel::Text), BBox::new(10.0, 10.0, 20.0, 20.0)),
        ];
        let tree = Stage01ContainmentTree::new().process(&elements);
        assert_eq!(tree.parent(ElementId(2)), Some(ElementId(0)));
        // Equal areas never contain each other
        assert_eq!(tree.parent(ElementId(1)), None);
    }

    #[test]
    fn test_roles_and_exemptions() {
        let elements = vec![
            element(0, content(DocItemLabel::Text), BBox::new(0.0, 0.0, 100.0, 100.0)),
            element(1, content(DocItemLabel::SectionHeader), BBox::new(5.0, 5.0, 50.0, 15.0)),
            element(2, ElementLabel::CellRole(CellRoleLabel::Key), BBox::new(5.0, 20.0, 50.0, 30.0)),
            element(3, content(DocItemLabel::Picture), BBox::new(200.0, 0.0, 300.0, 100.0)),
            element(4, content(DocItemLabel::Text), BBox::new(210.0, 10.0, 250.0, 20.0)),
            element(
                5,
                ElementLabel::TableStructure(TableStructLabel::TableRow),
                BBox::new(0.0, 200.0, 100.0, 210.0),
            ),
        ];
        let tree = Stage01ContainmentTree::new().process(&elements);

        assert_eq!(tree.role(ElementId(1)), Some(ContainmentRole::PrecedesOwner));
        assert_eq!(tree.role(ElementId(2)), Some(ContainmentRole::OwnedInline));
        assert_eq!(tree.role(ElementId(4)), None);
        assert!(tree.is_exempt(ElementId(4)));
        assert!(tree.is_exempt(ElementId(5)));
        assert!(!tree.is_exempt(ElementId(1)));
    }

    #[test]
    fn test_content_inside_exempt_parent_is_exempt() {
        let elements = vec![
            element(0, content(DocItemLabel::Table), BBox::new(0.0, 0.0, 300.0, 300.0)),
            element(
                1,
                ElementLabel::TableStructure(TableStructLabel::TableRow),
                BBox::new(5.0, 5.0, 295.0, 70.0),
            ),
            element(2, content(DocItemLabel::Text), BBox::new(10.0, 10.0, 140.0, 60.0)),
            element(3, ElementLabel::CellRole(CellRoleLabel::Value), BBox::new(400.0, 0.0, 600.0, 100.0)),
            element(4, content(DocItemLabel::Text), BBox::new(410.0, 10.0, 590.0, 50.0)),
        ];
        let tree = Stage01ContainmentTree::new().process(&elements);

        assert_eq!(tree.parent(ElementId(2)), Some(ElementId(1)));
        assert_eq!(tree.role(ElementId(2)), Some(ContainmentRole::Exempt));
        assert_eq!(tree.parent(ElementId(4)), Some(ElementId(3)));
        assert_eq!(tree.role(ElementId(4)), Some(ContainmentRole::Exempt));
        // The text itself still needs an order position
        assert!(!tree.is_exempt(ElementId(4)));
    }

    #[test]
    fn test_sequential_and_parallel_agree() {
        let elements: Vec<Element> = (0..40)
            .map(|i| {
                let f = i as f64;
                element(
                    i,
                    content(DocItemLabel::Text),
                    BBox::new(f, f, 200.0 - f, 200.0 - f),
                )
            })
            .collect();
        let parallel = Stage01ContainmentTree::new().process(&elements);
        let sequential =
            Stage01ContainmentTree::with_config(ConversionConfig::default().with_parallel(false))
                .process(&elements);
        assert_eq!(parallel, sequential);
        assert_eq!(parallel.depth(ElementId(39)), 39);
    }
}
