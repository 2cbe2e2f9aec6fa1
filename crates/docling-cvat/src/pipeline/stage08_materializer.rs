// Stage 08: Structure materialization

use super::stage03_logical_elements::LogicalId;
use super::stage04_reading_order::PlanEntry;
use super::stage05_links::LinkKind;
use super::stage06_groups::GroupLabel;
use super::stage07_plan_assembler::ConversionPlan;
use crate::labels::{DocItemLabel, ElementLabel};
use crate::model::{AnnotatedPage, ContentLayer, ElementId};
use crate::output::{CvatDocument, DocItem, GroupItem, ItemRef, PageItem, ProvenanceItem, Size};
use ordered_float::OrderedFloat;
use rustc_hash::{FxHashMap, FxHashSet};

/// Arena index of the `body` node
const BODY: usize = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeKind {
    Body,
    Group {
        label: GroupLabel,
        layer: ContentLayer,
    },
    Item(LogicalId),
}

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    parent: Option<usize>,
    children: Vec<usize>,
}

/// Final shape of the document: every node, its parent and its children
#[derive(Debug, Clone)]
struct Schedule {
    nodes: Vec<Node>,
    placed: FxHashMap<LogicalId, usize>,
}

#[derive(Debug, Clone, Copy)]
struct ListFrame {
    level: u32,
    list: usize,
    last_item: Option<usize>,
}

/// Open implicit list of one sequence walk
#[derive(Debug, Default)]
struct ListContext {
    parent: Option<usize>,
    frames: Vec<ListFrame>,
}

impl ListContext {
    fn close(&mut self) {
        self.parent = None;
        self.frames.clear();
    }
}

/// Stage 08: Structure Materializer
///
/// Turns a non-FATAL [`ConversionPlan`] into the output document in two
/// passes over the frozen plan.
///
/// Schedule pass: walks the root order depth-first. Every logical element is
/// placed exactly once and attached to its parent in one step that records
/// both directions. Parent choice, first match wins:
/// 1. caption/footnote target whose container is already placed: that container
/// 2. member of an explicit group: the group node (opened at its first member)
/// 3. an open container placeholder of the same sequence enclosing it
/// 4. the sequence owner
///
/// List items outside explicit groups are wrapped in implicit `list` groups,
/// nested by `level`. A container placeholder expands into its nested order,
/// then into its unordered descendants sorted top-to-bottom, left-to-right.
/// Key/value cells follow the item that contains them.
///
/// Build pass: assigns `self_ref`s in placement order and creates every item
/// fully formed (provenance, caption/footnote/value references).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stage08Materializer;

impl Stage08Materializer {
    #[inline]
    #[must_use = "materializer is created but not used"]
    pub const fn new() -> Self {
        Self
    }

    /// Materialize the document for `page`.
    ///
    /// The plan must come from the same page; callers check that it is not
    /// FATAL.
    #[must_use = "returns the materialized document"]
    pub fn process(&self, page: &AnnotatedPage, plan: &ConversionPlan) -> CvatDocument {
        let schedule = Scheduler::new(page, plan).run();
        let document = build(page, plan, &schedule);
        log::debug!(
            "Stage08: {} texts, {} tables, {} pictures, {} form items, {} key/value items, {} groups",
            document.texts.len(),
            document.tables.len(),
            document.pictures.len(),
            document.form_items.len(),
            document.key_value_items.len(),
            document.groups.len()
        );
        document
    }
}

struct Scheduler<'a> {
    page: &'a AnnotatedPage,
    plan: &'a ConversionPlan,
    ordered: FxHashSet<LogicalId>,
    /// Logical element -> index of its explicit group
    group_of: FxHashMap<LogicalId, usize>,
    group_nodes: FxHashMap<usize, usize>,
    /// Caption/footnote target -> the container it belongs to
    attached_to: FxHashMap<LogicalId, LogicalId>,
    /// Owner -> key/value cells it contains, looking through table structure
    inline_cells: FxHashMap<ElementId, Vec<ElementId>>,
    placed: FxHashMap<LogicalId, usize>,
    nodes: Vec<Node>,
}

impl<'a> Scheduler<'a> {
    fn new(page: &'a AnnotatedPage, plan: &'a ConversionPlan) -> Self {
        let mut group_of = FxHashMap::default();
        for (index, group) in plan.groups.iter().enumerate() {
            for &member in &group.members {
                group_of.entry(member).or_insert(index);
            }
        }

        let mut attached_to = FxHashMap::default();
        for link in &plan.links {
            if matches!(link.kind, LinkKind::Caption | LinkKind::Footnote) {
                attached_to.entry(link.target).or_insert(link.source);
            }
        }

        let mut inline_cells: FxHashMap<ElementId, Vec<ElementId>> = FxHashMap::default();
        for element in &page.elements {
            if !element.label.is_cell_role() {
                continue;
            }
            let owner = plan
                .tree
                .ancestors(element.id)
                .find(|&a| !plan.tree.label(a).is_table_structure());
            if let Some(owner) = owner {
                inline_cells.entry(owner).or_default().push(element.id);
            }
        }

        Self {
            page,
            plan,
            ordered: plan.reading_order.ordered_set(),
            group_of,
            group_nodes: FxHashMap::default(),
            attached_to,
            inline_cells,
            placed: FxHashMap::default(),
            nodes: vec![Node {
                kind: NodeKind::Body,
                parent: None,
                children: Vec::new(),
            }],
        }
    }

    fn run(mut self) -> Schedule {
        let plan = self.plan;
        self.walk(&plan.reading_order.root, BODY);
        self.place_orphan_cells();
        Schedule {
            nodes: self.nodes,
            placed: self.placed,
        }
    }

    fn add_node(&mut self, kind: NodeKind) -> usize {
        self.nodes.push(Node {
            kind,
            parent: None,
            children: Vec::new(),
        });
        self.nodes.len() - 1
    }

    /// The only way a node enters the tree: both directions at once
    fn attach(&mut self, parent: usize, child: usize) {
        debug_assert!(self.nodes[child].parent.is_none(), "node attached twice");
        self.nodes[child].parent = Some(parent);
        self.nodes[parent].children.push(child);
    }

    fn open_group(&mut self, label: GroupLabel, layer: ContentLayer, parent: usize) -> usize {
        let node = self.add_node(NodeKind::Group { label, layer });
        self.attach(parent, node);
        node
    }

    /// Place one logical element and the key/value cells it contains
    fn emit(&mut self, id: LogicalId, parent: usize) -> usize {
        let node = self.add_node(NodeKind::Item(id));
        self.attach(parent, node);
        self.placed.insert(id, node);
        log::trace!("placed {id} as node {node} under node {parent}");

        let plan = self.plan;
        for &member in plan.logical.members(id) {
            let cells = self.inline_cells.get(&member).cloned().unwrap_or_default();
            for child in cells {
                let cell = plan.logical.logical_of(child);
                if !self.placed.contains_key(&cell) {
                    self.emit(cell, node);
                }
            }
        }
        node
    }

    fn walk(&mut self, entries: &'a [PlanEntry], owner: usize) {
        let mut open: Vec<(ElementId, usize)> = Vec::new();
        let mut lists = ListContext::default();

        for &entry in entries {
            let id = entry.logical();
            if self.placed.contains_key(&id) {
                continue;
            }
            let default_parent = self.default_parent(id, owner, &open);

            match entry {
                PlanEntry::Container(container) => {
                    lists.close();
                    let parent = self.parent_for(id, default_parent);
                    let node = self.emit(id, parent);
                    open.push((container, node));
                    self.expand_container(container, node);
                }
                PlanEntry::Item(_) if self.is_implicit_list_item(id) => {
                    self.place_list_item(&mut lists, id, default_parent);
                }
                PlanEntry::Item(_) => {
                    lists.close();
                    let parent = self.parent_for(id, default_parent);
                    self.emit(id, parent);
                }
            }
        }
    }

    /// Innermost open placeholder enclosing the element, else the owner
    fn default_parent(&self, id: LogicalId, owner: usize, open: &[(ElementId, usize)]) -> usize {
        let tree = &self.plan.tree;
        open.iter()
            .rev()
            .find(|(container, _)| tree.is_ancestor(*container, id.primary()))
            .map_or(owner, |&(_, node)| node)
    }

    fn parent_for(&mut self, id: LogicalId, default_parent: usize) -> usize {
        if let Some(&node) = self
            .attached_to
            .get(&id)
            .and_then(|source| self.placed.get(source))
        {
            return node;
        }

        let Some(&group) = self.group_of.get(&id) else {
            return default_parent;
        };
        if let Some(&node) = self.group_nodes.get(&group) {
            return node;
        }
        let plan = self.plan;
        let label = plan
            .groups
            .get(group)
            .map_or(GroupLabel::Unspecified, |g| g.label);
        let node = self.open_group(label, plan.tree.layer(id.primary()), default_parent);
        self.group_nodes.insert(group, node);
        node
    }

    fn is_implicit_list_item(&self, id: LogicalId) -> bool {
        self.plan.tree.label(id.primary()).is(DocItemLabel::ListItem)
            && !self.group_of.contains_key(&id)
    }

    fn place_list_item(&mut self, lists: &mut ListContext, id: LogicalId, parent: usize) -> usize {
        if lists.parent != Some(parent) {
            lists.close();
            lists.parent = Some(parent);
        }
        let primary = id.primary();
        let level = self.page.elements[primary.0].level.unwrap_or(1);
        let layer = self.plan.tree.layer(primary);

        if lists.frames.is_empty() {
            let list = self.open_group(GroupLabel::List, layer, parent);
            lists.frames.push(ListFrame {
                level,
                list,
                last_item: None,
            });
        }
        while lists.frames.len() > 1 && lists.frames.last().is_some_and(|f| level < f.level) {
            lists.frames.pop();
        }
        if let Some(&ListFrame {
            level: top_level,
            last_item: Some(previous),
            ..
        }) = lists.frames.last()
        {
            if level > top_level {
                let list = self.open_group(GroupLabel::List, layer, previous);
                lists.frames.push(ListFrame {
                    level,
                    list,
                    last_item: None,
                });
            }
        }

        let Some(frame) = lists.frames.last_mut() else {
            return self.emit(id, parent);
        };
        frame.level = frame.level.min(level);
        let node = self.emit(id, frame.list);
        frame.last_item = Some(node);
        node
    }

    fn expand_container(&mut self, container: ElementId, node: usize) {
        let plan = self.plan;
        if let Some(nested) = plan.reading_order.nested.get(&container) {
            self.walk(nested, node);
        }
        self.place_unordered(container, node);
    }

    /// Descendants no order placed, top-to-bottom then left-to-right
    fn place_unordered(&mut self, element: ElementId, parent: usize) {
        let plan = self.plan;
        let elements = &self.page.elements;
        let mut children = plan.tree.children(element).to_vec();
        children.sort_by_key(|&c| {
            let bbox = elements[c.0].bbox;
            (OrderedFloat(bbox.t), OrderedFloat(bbox.l), c)
        });

        for child in children {
            let label = plan.tree.label(child);
            if label.is_cell_role() || plan.tree.layer(child) == ContentLayer::Background {
                continue;
            }
            if label.is_table_structure() {
                // Rows and cells are never items; their content still is
                self.place_unordered(child, parent);
                continue;
            }
            let id = plan.logical.logical_of(child);
            if self.ordered.contains(&id) || self.placed.contains_key(&id) {
                continue;
            }
            let node = self.emit(id, parent);
            if plan.tree.is_container(child) {
                self.expand_container(child, node);
            } else {
                self.place_unordered(child, parent);
            }
        }
    }

    /// Key/value cells that no placed item contains go into one area group
    fn place_orphan_cells(&mut self) {
        let plan = self.plan;
        let orphans: Vec<LogicalId> = plan
            .logical
            .iter()
            .filter(|&id| {
                plan.tree.label(id.primary()).is_cell_role()
                    && plan.tree.layer(id.primary()) != ContentLayer::Background
                    && !self.placed.contains_key(&id)
            })
            .collect();
        if orphans.is_empty() {
            return;
        }

        let area = self.open_group(GroupLabel::KeyValueArea, ContentLayer::Body, BODY);
        for id in orphans {
            if !self.placed.contains_key(&id) {
                self.emit(id, area);
            }
        }
    }
}

/// Output array an item lands in
fn category(label: ElementLabel) -> &'static str {
    match label {
        ElementLabel::Content(DocItemLabel::Table) => "tables",
        ElementLabel::Content(DocItemLabel::Picture) => "pictures",
        ElementLabel::Content(DocItemLabel::Form) => "form_items",
        ElementLabel::CellRole(_) => "key_value_items",
        _ => "texts",
    }
}

fn build(page: &AnnotatedPage, plan: &ConversionPlan, schedule: &Schedule) -> CvatDocument {
    let refs = assign_refs(plan, schedule);
    let ref_to = |node: usize| ItemRef::new(refs[node].as_str());

    let mut document = CvatDocument::new(page.name.clone());
    let scale = page.coordinate_scale;
    for info in &page.pages {
        document.pages.insert(
            info.page_no.to_string(),
            PageItem {
                page_no: info.page_no,
                size: Size {
                    width: info.width / scale,
                    height: info.height / scale,
                },
            },
        );
    }

    for (index, node) in schedule.nodes.iter().enumerate() {
        let parent = node.parent.map(ref_to);
        let children: Vec<ItemRef> = node.children.iter().map(|&c| ref_to(c)).collect();
        match node.kind {
            NodeKind::Body => document.body.children = children,
            NodeKind::Group { label, layer } => document.groups.push(GroupItem {
                self_ref: refs[index].clone(),
                parent,
                children,
                content_layer: layer,
                name: label.name().to_string(),
                label,
            }),
            NodeKind::Item(id) => {
                let linked = |kind: LinkKind| -> Vec<ItemRef> {
                    plan.links
                        .iter()
                        .filter(|link| link.kind == kind && link.source == id)
                        .filter_map(|link| schedule.placed.get(&link.target))
                        .map(|&target| ref_to(target))
                        .collect()
                };

                let primary = &page.elements[id.primary().0];
                let label = plan.tree.label(id.primary());
                let prov = plan
                    .logical
                    .members(id)
                    .iter()
                    .map(|&member| {
                        let element = &page.elements[member.0];
                        ProvenanceItem {
                            page_no: element.page_no,
                            bbox: element
                                .bbox
                                .shifted_x(-element.x_offset)
                                .scaled_down(scale)
                                .into(),
                            charspan: [0, 0],
                        }
                    })
                    .collect();

                let item = DocItem {
                    self_ref: refs[index].clone(),
                    parent,
                    children,
                    content_layer: plan.tree.layer(id.primary()),
                    label,
                    prov,
                    level: primary.level,
                    picture_type: if label.is(DocItemLabel::Picture) {
                        primary.type_tag.clone()
                    } else {
                        None
                    },
                    captions: linked(LinkKind::Caption),
                    footnotes: linked(LinkKind::Footnote),
                    values: linked(LinkKind::ToValue),
                };
                match category(label) {
                    "tables" => document.tables.push(item),
                    "pictures" => document.pictures.push(item),
                    "form_items" => document.form_items.push(item),
                    "key_value_items" => document.key_value_items.push(item),
                    _ => document.texts.push(item),
                }
            }
        }
    }
    document
}

/// `self_ref` of every node, numbered per output array in placement order
fn assign_refs(plan: &ConversionPlan, schedule: &Schedule) -> Vec<String> {
    let mut counters: FxHashMap<&'static str, usize> = FxHashMap::default();
    schedule
        .nodes
        .iter()
        .map(|node| {
            let array = match node.kind {
                NodeKind::Body => return "#/body".to_string(),
                NodeKind::Group { .. } => "groups",
                NodeKind::Item(id) => category(plan.tree.label(id.primary())),
            };
            let counter = counters.entry(array).or_insert(0);
            let self_ref = format!("#/{array}/{counter}");
            *counter += 1;
            self_ref
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::{Diagnostics, Severity};
    use crate::geometry::{BBox, Point};
    use crate::labels::{CellRoleLabel, TableStructLabel};
    use crate::model::{Element, PathKind};
    use crate::output::NodeRef;
    use crate::pipeline::{
        Stage01ContainmentTree, Stage02PathMapper, Stage03LogicalElements, Stage04ReadingOrder,
        Stage05Links, Stage06Groups, Stage07PlanAssembler,
    };

    fn content(label: DocItemLabel) -> ElementLabel {
        ElementLabel::Content(label)
    }

    fn plan(page: &AnnotatedPage) -> ConversionPlan {
        let mut diagnostics = Diagnostics::new();
        let tree = Stage01ContainmentTree::new().process(&page.elements);
        let (mapping, d) = Stage02PathMapper::new().process(&page.elements, &page.paths, &tree);
        diagnostics.append(d);
        let (logical, d) = Stage03LogicalElements::new().process(&page.elements, &mapping, &tree);
        diagnostics.append(d);
        let (order, d) = Stage04ReadingOrder::new().process(&page.elements, &mapping, &tree, &logical);
        diagnostics.append(d);
        let (links, d) = Stage05Links::new().process(&mapping, &tree, &logical);
        diagnostics.append(d);
        let (groups, d) = Stage06Groups::new().process(&mapping, &tree, &logical);
        diagnostics.append(d);
        Stage07PlanAssembler::new().process(
            tree,
            logical,
            order.expect("plan is not fatal"),
            groups,
            links,
            diagnostics,
        )
    }

    fn materialize(page: &AnnotatedPage) -> CvatDocument {
        let plan = plan(page);
        assert!(plan.is_materializable());
        Stage08Materializer::new().process(page, &plan)
    }

    fn children_of<'d>(document: &'d CvatDocument, ref_path: &str) -> Vec<&'d str> {
        document
            .resolve(ref_path)
            .expect("reference resolves")
            .children()
            .iter()
            .map(|r| r.ref_path.as_str())
            .collect()
    }

    fn assert_links_are_symmetric(document: &CvatDocument) {
        let mut nodes = vec![NodeRef::Group(&document.body)];
        nodes.extend(document.groups.iter().map(NodeRef::Group));
        nodes.extend(document.items().map(NodeRef::Item));
        for node in nodes {
            let self_ref = match node {
                NodeRef::Group(g) => &g.self_ref,
                NodeRef::Item(i) => &i.self_ref,
            };
            for child in node.children() {
                let child_node = document.resolve(&child.ref_path).expect("child resolves");
                assert_eq!(
                    child_node.parent().map(|p| p.ref_path.as_str()),
                    Some(self_ref.as_str())
                );
            }
        }
    }

    #[test]
    fn test_table_with_nested_order() {
        let mut page = AnnotatedPage::new("p", 400.0, 400.0);
        page.add_element(content(DocItemLabel::Table), BBox::new(0.0, 0.0, 300.0, 300.0));
        for i in 0..3 {
            let t = 10.0 + 90.0 * f64::from(i);
            page.add_element(content(DocItemLabel::Text), BBox::new(10.0, t, 290.0, t + 50.0));
        }
        page.add_reading_order(1, vec![Point::new(5.0, 295.0)]);
        page.add_reading_order(
            2,
            vec![Point::new(100.0, 30.0), Point::new(100.0, 120.0), Point::new(100.0, 210.0)],
        );

        let document = materialize(&page);
        assert_eq!(children_of(&document, "#/body"), vec!["#/tables/0"]);
        assert_eq!(
            children_of(&document, "#/tables/0"),
            vec!["#/texts/0", "#/texts/1", "#/texts/2"]
        );
        assert_eq!(document.texts[1].prov[0].bbox.t, 100.0);
        assert_links_are_symmetric(&document);
    }

    #[test]
    fn test_merged_element_carries_every_box() {
        let mut page = AnnotatedPage::new("p", 400.0, 400.0);
        page.add_element(content(DocItemLabel::Text), BBox::new(0.0, 0.0, 100.0, 20.0));
        page.add_element(content(DocItemLabel::Text), BBox::new(0.0, 200.0, 100.0, 220.0));
        page.add_path(PathKind::Merge, vec![Point::new(50.0, 10.0), Point::new(50.0, 210.0)]);
        page.add_reading_order(1, vec![Point::new(50.0, 10.0), Point::new(50.0, 210.0)]);

        let document = materialize(&page);
        assert_eq!(document.texts.len(), 1);
        assert_eq!(document.texts[0].prov.len(), 2);
        assert_eq!(document.texts[0].prov[1].bbox.t, 200.0);
    }

    #[test]
    fn test_caption_goes_under_its_picture() {
        let mut page = AnnotatedPage::new("p", 400.0, 400.0);
        page.add_element(content(DocItemLabel::Picture), BBox::new(0.0, 0.0, 200.0, 200.0));
        page.add_element(content(DocItemLabel::Caption), BBox::new(0.0, 210.0, 200.0, 230.0));
        page.add_reading_order(1, vec![Point::new(100.0, 100.0), Point::new(100.0, 220.0)]);
        page.add_path(PathKind::ToCaption, vec![Point::new(100.0, 100.0), Point::new(100.0, 220.0)]);

        let document = materialize(&page);
        assert_eq!(children_of(&document, "#/body"), vec!["#/pictures/0"]);
        assert_eq!(children_of(&document, "#/pictures/0"), vec!["#/texts/0"]);
        assert_eq!(document.pictures[0].captions, vec![ItemRef::new("#/texts/0")]);
    }

    #[test]
    fn test_nested_implicit_lists() {
        let mut page = AnnotatedPage::new("p", 400.0, 400.0);
        for (t, level) in [(10.0, 1), (50.0, 2), (90.0, 1)] {
            page.push_element(
                Element::new(
                    ElementId(0),
                    content(DocItemLabel::ListItem),
                    BBox::new(0.0, t, 200.0, t + 30.0),
                )
                .with_level(level),
            );
        }
        page.add_reading_order(
            1,
            vec![Point::new(100.0, 20.0), Point::new(100.0, 60.0), Point::new(100.0, 100.0)],
        );

        let document = materialize(&page);
        assert_eq!(children_of(&document, "#/body"), vec!["#/groups/0"]);
        assert_eq!(document.groups[0].label, GroupLabel::List);
        assert_eq!(children_of(&document, "#/groups/0"), vec!["#/texts/0", "#/texts/2"]);
        assert_eq!(children_of(&document, "#/texts/0"), vec!["#/groups/1"]);
        assert_eq!(children_of(&document, "#/groups/1"), vec!["#/texts/1"]);
        assert_links_are_symmetric(&document);
    }

    #[test]
    fn test_list_closes_on_other_content() {
        let mut page = AnnotatedPage::new("p", 400.0, 400.0);
        page.add_element(content(DocItemLabel::ListItem), BBox::new(0.0, 0.0, 200.0, 30.0));
        page.add_element(content(DocItemLabel::Text), BBox::new(0.0, 40.0, 200.0, 70.0));
        page.add_element(content(DocItemLabel::ListItem), BBox::new(0.0, 80.0, 200.0, 110.0));
        page.add_reading_order(
            1,
            vec![Point::new(100.0, 15.0), Point::new(100.0, 55.0), Point::new(100.0, 95.0)],
        );

        let document = materialize(&page);
        assert_eq!(
            children_of(&document, "#/body"),
            vec!["#/groups/0", "#/texts/1", "#/groups/1"]
        );
    }

    #[test]
    fn test_key_value_cells_follow_their_owner() {
        let mut page = AnnotatedPage::new("p", 400.0, 400.0);
        page.add_element(content(DocItemLabel::Text), BBox::new(0.0, 0.0, 300.0, 50.0));
        page.add_element(
            ElementLabel::CellRole(CellRoleLabel::Key),
            BBox::new(10.0, 10.0, 100.0, 40.0),
        );
        page.add_element(
            ElementLabel::CellRole(CellRoleLabel::Value),
            BBox::new(150.0, 10.0, 290.0, 40.0),
        );
        page.add_reading_order(1, vec![Point::new(120.0, 25.0)]);
        page.add_path(PathKind::ToValue, vec![Point::new(50.0, 25.0), Point::new(200.0, 25.0)]);

        let plan = plan(&page);
        assert_eq!(max_error(&plan), None);
        let document = Stage08Materializer::new().process(&page, &plan);
        assert_eq!(
            children_of(&document, "#/texts/0"),
            vec!["#/key_value_items/0", "#/key_value_items/1"]
        );
        assert_eq!(
            document.key_value_items[0].values,
            vec![ItemRef::new("#/key_value_items/1")]
        );
    }

    #[test]
    fn test_key_inside_table_row_stays_with_its_table() {
        let mut page = AnnotatedPage::new("p", 400.0, 400.0);
        page.add_element(content(DocItemLabel::Table), BBox::new(0.0, 0.0, 300.0, 300.0));
        page.add_element(
            ElementLabel::TableStructure(TableStructLabel::TableRow),
            BBox::new(5.0, 5.0, 295.0, 70.0),
        );
        page.add_element(
            ElementLabel::CellRole(CellRoleLabel::Key),
            BBox::new(10.0, 10.0, 140.0, 60.0),
        );
        page.add_reading_order(1, vec![Point::new(150.0, 200.0)]);

        let plan = plan(&page);
        assert_eq!(max_error(&plan), None);
        let document = Stage08Materializer::new().process(&page, &plan);
        assert_eq!(children_of(&document, "#/body"), vec!["#/tables/0"]);
        assert_eq!(children_of(&document, "#/tables/0"), vec!["#/key_value_items/0"]);
        assert!(document.groups.is_empty());
        assert!(document.texts.is_empty());
    }

    fn max_error(plan: &ConversionPlan) -> Option<Severity> {
        plan.severity().filter(|&s| s >= Severity::Error)
    }

    #[test]
    fn test_orphan_cells_collected_in_area_group() {
        let mut page = AnnotatedPage::new("p", 400.0, 400.0);
        page.add_element(content(DocItemLabel::Text), BBox::new(0.0, 0.0, 100.0, 20.0));
        page.add_element(
            ElementLabel::CellRole(CellRoleLabel::Key),
            BBox::new(0.0, 300.0, 100.0, 320.0),
        );
        page.add_reading_order(1, vec![Point::new(50.0, 10.0)]);

        let document = materialize(&page);
        assert_eq!(children_of(&document, "#/body"), vec!["#/texts/0", "#/groups/0"]);
        assert_eq!(document.groups[0].label, GroupLabel::KeyValueArea);
        assert_eq!(document.groups[0].name, "key-value-area");
        assert_eq!(children_of(&document, "#/groups/0"), vec!["#/key_value_items/0"]);
    }

    #[test]
    fn test_explicit_group_opens_at_first_member() {
        let mut page = AnnotatedPage::new("p", 400.0, 400.0);
        page.add_element(content(DocItemLabel::Title), BBox::new(0.0, 0.0, 200.0, 20.0));
        page.add_element(content(DocItemLabel::Text), BBox::new(0.0, 30.0, 200.0, 50.0));
        page.add_element(content(DocItemLabel::Text), BBox::new(0.0, 60.0, 200.0, 80.0));
        page.add_reading_order(
            1,
            vec![Point::new(100.0, 10.0), Point::new(100.0, 40.0), Point::new(100.0, 70.0)],
        );
        page.add_path(PathKind::Group, vec![Point::new(100.0, 40.0), Point::new(100.0, 70.0)]);

        let document = materialize(&page);
        assert_eq!(children_of(&document, "#/body"), vec!["#/texts/0", "#/groups/0"]);
        assert_eq!(children_of(&document, "#/groups/0"), vec!["#/texts/1", "#/texts/2"]);
        assert_eq!(document.groups[0].label, GroupLabel::Unspecified);
    }

    #[test]
    fn test_unordered_picture_children_sorted_by_position() {
        let mut page = AnnotatedPage::new("p", 400.0, 400.0);
        page.push_element(
            Element::new(
                ElementId(0),
                content(DocItemLabel::Picture),
                BBox::new(0.0, 0.0, 300.0, 300.0),
            )
            .with_type_tag("chart"),
        );
        page.add_element(content(DocItemLabel::Text), BBox::new(150.0, 100.0, 250.0, 120.0));
        page.add_element(content(DocItemLabel::Text), BBox::new(10.0, 100.0, 100.0, 120.0));
        page.add_element(content(DocItemLabel::Text), BBox::new(10.0, 10.0, 100.0, 30.0));
        page.add_reading_order(1, vec![Point::new(290.0, 290.0)]);

        let plan = plan(&page);
        assert_eq!(max_error(&plan), None);
        let document = Stage08Materializer::new().process(&page, &plan);
        assert_eq!(document.pictures[0].picture_type.as_deref(), Some("chart"));
        let placed: Vec<f64> = document.texts.iter().map(|t| t.prov[0].bbox.l).collect();
        assert_eq!(placed, vec![10.0, 10.0, 150.0]);
        assert_eq!(document.texts[0].prov[0].bbox.t, 10.0);
        assert_links_are_symmetric(&document);
    }

    #[test]
    fn test_provenance_is_page_local_and_scaled() {
        let mut page = AnnotatedPage::new("p", 800.0, 400.0);
        page.coordinate_scale = 2.0;
        page.push_element(
            Element::new(
                ElementId(0),
                content(DocItemLabel::Text),
                BBox::new(420.0, 20.0, 600.0, 60.0),
            )
            .on_page(2, 400.0),
        );
        page.add_reading_order(1, vec![Point::new(500.0, 40.0)]);

        let document = materialize(&page);
        let prov = &document.texts[0].prov[0];
        assert_eq!(prov.page_no, 2);
        assert_eq!((prov.bbox.l, prov.bbox.t, prov.bbox.r, prov.bbox.b), (10.0, 10.0, 100.0, 30.0));
        assert_eq!(document.pages["1"].size.width, 400.0);
    }
}
