//! Reading-order resolution through the full pipeline
//!
//! Cross-boundary promotion, conflict compensation and heading/owner
//! placement, checked on the resolved plan.

mod common;

use common::{add, convert, convert_with, errors, points};
use docling_cvat::labels::DocItemLabel;
use docling_cvat::pipeline::{CompensationOutcome, LogicalId, PlanEntry};
use docling_cvat::{AnnotatedPage, ConversionConfig, ElementId};

fn item(id: ElementId) -> PlanEntry {
    PlanEntry::Item(LogicalId(id))
}

#[test]
fn test_path_entering_table_places_table_before_its_cell() {
    let mut page = AnnotatedPage::new("promote", 200.0, 200.0);
    let table = add(&mut page, DocItemLabel::Table, [0.0, 0.0, 100.0, 100.0]);
    let cell = add(&mut page, DocItemLabel::ListItem, [10.0, 10.0, 90.0, 40.0]);
    page.add_reading_order(1, points(&[(50.0, -10.0), (50.0, 25.0)]));

    let result = convert_with(&page, ConversionConfig::default().with_point_tolerance(0.0));
    let plan = result.plan.expect("plan");
    assert_eq!(
        plan.reading_order.root,
        vec![PlanEntry::Container(table), item(cell)]
    );
}

#[test]
fn test_path_fully_inside_table_is_not_promoted() {
    let mut page = AnnotatedPage::new("inside", 200.0, 200.0);
    let table = add(&mut page, DocItemLabel::Table, [0.0, 0.0, 100.0, 100.0]);
    let cell = add(&mut page, DocItemLabel::ListItem, [10.0, 10.0, 90.0, 40.0]);
    page.add_reading_order(1, points(&[(50.0, 80.0)]));
    page.add_reading_order(2, points(&[(20.0, 20.0), (80.0, 30.0)]));

    let result = convert_with(&page, ConversionConfig::default().with_point_tolerance(0.0));
    assert_eq!(errors(&result), 0, "{:?}", result.diagnostics);
    let plan = result.plan.expect("plan");
    assert_eq!(plan.reading_order.root, vec![PlanEntry::Container(table)]);
    assert_eq!(plan.reading_order.nested[&table], vec![item(cell)]);
}

#[test]
fn test_conflict_keeps_container_at_original_position() {
    let mut page = AnnotatedPage::new("conflict", 200.0, 200.0);
    let table = add(&mut page, DocItemLabel::Table, [0.0, 0.0, 100.0, 100.0]);
    let cell = add(&mut page, DocItemLabel::ListItem, [10.0, 10.0, 40.0, 40.0]);
    let later = add(&mut page, DocItemLabel::Text, [0.0, 150.0, 100.0, 180.0]);
    page.add_reading_order(1, points(&[(20.0, 20.0), (20.0, 160.0)]));
    page.add_reading_order(2, points(&[(20.0, 20.0), (30.0, 25.0)]));

    let result = convert(&page);
    assert_eq!(errors(&result), 0, "{:?}", result.diagnostics);
    let plan = result.plan.expect("plan");
    assert_eq!(
        plan.reading_order.root,
        vec![PlanEntry::Container(table), item(later)]
    );
    assert_eq!(plan.reading_order.nested[&table], vec![item(cell)]);

    let compensation = &plan.reading_order.compensations[0];
    assert_eq!(compensation.owner, None);
    assert_eq!(compensation.removed, vec![LogicalId(cell)]);
    assert_eq!(compensation.outcome, CompensationOutcome::AlreadyPresent(table));
}

#[test]
fn test_heading_drawn_before_its_paragraph() {
    let mut page = AnnotatedPage::new("heading", 200.0, 200.0);
    let text = add(&mut page, DocItemLabel::Text, [0.0, 0.0, 100.0, 40.0]);
    let heading = add(&mut page, DocItemLabel::SectionHeader, [10.0, 5.0, 90.0, 20.0]);
    page.add_reading_order(1, points(&[(15.0, 10.0), (15.0, 30.0)]));

    let result = convert(&page);
    assert_eq!(errors(&result), 0, "{:?}", result.diagnostics);
    let plan = result.plan.expect("plan");
    assert_eq!(plan.reading_order.root, vec![item(heading), item(text)]);
}

#[test]
fn test_paragraph_follows_heading_when_path_skips_it() {
    let mut page = AnnotatedPage::new("owner", 200.0, 200.0);
    let outer = add(&mut page, DocItemLabel::Text, [0.0, 0.0, 200.0, 80.0]);
    let heading = add(&mut page, DocItemLabel::SectionHeader, [10.0, 10.0, 150.0, 40.0]);
    let following = add(&mut page, DocItemLabel::Text, [0.0, 100.0, 200.0, 180.0]);
    page.add_reading_order(1, points(&[(20.0, 20.0), (20.0, 140.0)]));

    let result = convert(&page);
    assert_eq!(errors(&result), 0, "{:?}", result.diagnostics);
    let plan = result.plan.expect("plan");
    assert_eq!(
        plan.reading_order.root,
        vec![item(heading), item(outer), item(following)]
    );

    // The paragraph is materialized right after its heading, not inside it
    let document = result.document.expect("document");
    let order: Vec<&str> = document
        .items_in_order()
        .iter()
        .map(|i| i.label.as_str())
        .collect();
    assert_eq!(order, vec!["section_header", "text", "text"]);
}

#[test]
fn test_key_value_cells_are_never_required_in_order() {
    let mut page = AnnotatedPage::new("kv", 300.0, 100.0);
    add(&mut page, DocItemLabel::Text, [0.0, 0.0, 300.0, 60.0]);
    page.add_element(
        docling_cvat::labels::ElementLabel::CellRole(docling_cvat::labels::CellRoleLabel::Key),
        docling_cvat::geometry::BBox::new(10.0, 10.0, 100.0, 40.0),
    );
    page.add_reading_order(1, points(&[(200.0, 30.0)]));

    let result = convert(&page);
    assert_eq!(errors(&result), 0, "{:?}", result.diagnostics);
}

#[test]
fn test_table_child_outside_every_order_is_reported() {
    let mut page = AnnotatedPage::new("table-child", 200.0, 200.0);
    add(&mut page, DocItemLabel::Table, [0.0, 0.0, 100.0, 100.0]);
    add(&mut page, DocItemLabel::Text, [10.0, 10.0, 90.0, 40.0]);
    add(&mut page, DocItemLabel::Text, [10.0, 50.0, 90.0, 80.0]);
    page.add_reading_order(1, points(&[(50.0, 95.0)]));
    page.add_reading_order(2, points(&[(50.0, 25.0)]));

    let result = convert(&page);
    assert_eq!(
        common::kinds(&result),
        vec![docling_cvat::DiagnosticKind::TableChildNotOrdered]
    );
    // Still materialized under the table, below the ordered child
    let document = result.document.expect("document");
    assert_eq!(document.tables[0].children.len(), 2);
}

#[test]
fn test_cells_inside_table_rows_order_without_the_rows() {
    use docling_cvat::geometry::BBox;
    use docling_cvat::labels::{ElementLabel, TableStructLabel};

    let mut page = AnnotatedPage::new("rows", 400.0, 400.0);
    let table = add(&mut page, DocItemLabel::Table, [0.0, 0.0, 300.0, 300.0]);
    page.add_element(
        ElementLabel::TableStructure(TableStructLabel::TableRow),
        BBox::new(5.0, 5.0, 295.0, 70.0),
    );
    page.add_element(
        ElementLabel::TableStructure(TableStructLabel::TableColumn),
        BBox::new(5.0, 5.0, 150.0, 295.0),
    );
    let left = add(&mut page, DocItemLabel::Text, [10.0, 10.0, 140.0, 60.0]);
    let right = add(&mut page, DocItemLabel::Text, [160.0, 10.0, 290.0, 60.0]);
    page.add_reading_order(1, points(&[(250.0, 200.0)]));
    page.add_reading_order(2, points(&[(75.0, 35.0), (225.0, 35.0)]));

    let result = convert(&page);
    assert_eq!(errors(&result), 0, "{:?}", result.diagnostics);
    let plan = result.plan.as_ref().expect("plan");
    assert_eq!(plan.reading_order.root, vec![PlanEntry::Container(table)]);
    assert_eq!(plan.reading_order.nested[&table], vec![item(left), item(right)]);

    let document = result.document.expect("document");
    assert_eq!(document.texts.len(), 2);
    assert!(document.texts.iter().all(|t| !t.label.is_table_structure()));
    assert_eq!(document.tables[0].children.len(), 2);
}

#[test]
fn test_text_inside_value_box_orders_alone() {
    use docling_cvat::geometry::BBox;
    use docling_cvat::labels::{CellRoleLabel, ElementLabel};

    let mut page = AnnotatedPage::new("value", 300.0, 200.0);
    page.add_element(
        ElementLabel::CellRole(CellRoleLabel::Value),
        BBox::new(0.0, 0.0, 200.0, 100.0),
    );
    let text = add(&mut page, DocItemLabel::Text, [10.0, 10.0, 190.0, 50.0]);
    page.add_reading_order(1, points(&[(100.0, 30.0)]));

    let result = convert(&page);
    assert_eq!(errors(&result), 0, "{:?}", result.diagnostics);
    let plan = result.plan.as_ref().expect("plan");
    assert_eq!(plan.reading_order.root, vec![item(text)]);

    // The value is not pulled into the order; it lands in the key/value area
    let document = result.document.expect("document");
    assert_eq!(document.texts.len(), 1);
    assert_eq!(document.key_value_items.len(), 1);
    let parent = document.key_value_items[0].parent.as_ref().expect("parent");
    assert_eq!(parent.ref_path, "#/groups/0");
}
