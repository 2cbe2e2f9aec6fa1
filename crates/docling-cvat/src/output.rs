//! Output document model.
//!
//! A flat, docling-style layout: items live in per-kind arrays (`texts`,
//! `tables`, `pictures`, ...) and point at each other through JSON pointer
//! references (`{"$ref": "#/texts/0"}`). The hierarchy starts at `body`.

use crate::geometry::BBox;
use crate::labels::ElementLabel;
use crate::model::ContentLayer;
use crate::pipeline::GroupLabel;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Schema name written into every document
pub const SCHEMA_NAME: &str = "DoclingDocument";
/// Schema version written into every document
pub const SCHEMA_VERSION: &str = "1.3.0";

/// Coordinate system origin
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CoordOrigin {
    /// Origin at bottom-left (PDF coordinate system)
    #[serde(rename = "BOTTOMLEFT")]
    BottomLeft,
    /// Origin at top-left (image coordinate system)
    #[default]
    #[serde(rename = "TOPLEFT")]
    TopLeft,
}

/// Page-local bounding box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub l: f64,
    pub t: f64,
    pub r: f64,
    pub b: f64,
    pub coord_origin: CoordOrigin,
}

impl From<BBox> for BoundingBox {
    #[inline]
    fn from(bbox: BBox) -> Self {
        Self {
            l: bbox.l,
            t: bbox.t,
            r: bbox.r,
            b: bbox.b,
            coord_origin: CoordOrigin::TopLeft,
        }
    }
}

/// JSON pointer reference (e.g., {"$ref": "#/texts/0"})
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemRef {
    #[serde(rename = "$ref")]
    pub ref_path: String,
}

impl ItemRef {
    #[inline]
    #[must_use = "creates a new ItemRef"]
    pub fn new(ref_path: impl Into<String>) -> Self {
        Self {
            ref_path: ref_path.into(),
        }
    }
}

/// Where an item came from on the page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvenanceItem {
    pub page_no: u32,
    pub bbox: BoundingBox,
    /// Character span [start, end]; always empty, text is not extracted here
    pub charspan: [usize; 2],
}

/// A content item (text, table, picture, form, key or value)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocItem {
    pub self_ref: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub parent: Option<ItemRef>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub children: Vec<ItemRef>,
    pub content_layer: ContentLayer,
    pub label: ElementLabel,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub prov: Vec<ProvenanceItem>,
    /// List nesting or section depth
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub level: Option<u32>,
    /// Picture classification tag (`chart`, `logo`, ...)
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub picture_type: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub captions: Vec<ItemRef>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub footnotes: Vec<ItemRef>,
    /// Values linked from this key
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub values: Vec<ItemRef>,
}

/// Structural grouping node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupItem {
    pub self_ref: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub parent: Option<ItemRef>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub children: Vec<ItemRef>,
    pub content_layer: ContentLayer,
    pub name: String,
    pub label: GroupLabel,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageItem {
    pub page_no: u32,
    pub size: Size,
}

/// The materialized document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CvatDocument {
    pub schema_name: String,
    pub version: String,
    pub name: String,
    pub body: GroupItem,
    pub groups: Vec<GroupItem>,
    pub texts: Vec<DocItem>,
    pub pictures: Vec<DocItem>,
    pub tables: Vec<DocItem>,
    pub form_items: Vec<DocItem>,
    pub key_value_items: Vec<DocItem>,
    /// Pages keyed by page number
    pub pages: BTreeMap<String, PageItem>,
}

/// A resolved reference
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NodeRef<'a> {
    Group(&'a GroupItem),
    Item(&'a DocItem),
}

impl<'a> NodeRef<'a> {
    #[must_use = "returns the node's children"]
    pub fn children(&self) -> &'a [ItemRef] {
        match *self {
            Self::Group(group) => &group.children,
            Self::Item(item) => &item.children,
        }
    }

    #[must_use = "returns the node's parent"]
    pub fn parent(&self) -> Option<&'a ItemRef> {
        match *self {
            Self::Group(group) => group.parent.as_ref(),
            Self::Item(item) => item.parent.as_ref(),
        }
    }
}

impl CvatDocument {
    /// Empty document with a `body` root
    #[must_use = "returns a new document"]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            schema_name: SCHEMA_NAME.to_string(),
            version: SCHEMA_VERSION.to_string(),
            name: name.into(),
            body: GroupItem {
                self_ref: "#/body".to_string(),
                parent: None,
                children: Vec::new(),
                content_layer: ContentLayer::Body,
                name: "_root_".to_string(),
                label: GroupLabel::Unspecified,
            },
            groups: Vec::new(),
            texts: Vec::new(),
            pictures: Vec::new(),
            tables: Vec::new(),
            form_items: Vec::new(),
            key_value_items: Vec::new(),
            pages: BTreeMap::new(),
        }
    }

    /// Resolve a JSON pointer such as `#/texts/3`
    #[must_use = "returns the referenced node, if any"]
    pub fn resolve(&self, ref_path: &str) -> Option<NodeRef<'_>> {
        if ref_path == "#/body" {
            return Some(NodeRef::Group(&self.body));
        }
        let rest = ref_path.strip_prefix("#/")?;
        let (array, index) = rest.split_once('/')?;
        let index: usize = index.parse().ok()?;
        let items = match array {
            "groups" => return self.groups.get(index).map(NodeRef::Group),
            "texts" => &self.texts,
            "pictures" => &self.pictures,
            "tables" => &self.tables,
            "form_items" => &self.form_items,
            "key_value_items" => &self.key_value_items,
            _ => return None,
        };
        items.get(index).map(NodeRef::Item)
    }

    /// Every content item, in array order
    pub fn items(&self) -> impl Iterator<Item = &DocItem> + '_ {
        self.texts
            .iter()
            .chain(&self.pictures)
            .chain(&self.tables)
            .chain(&self.form_items)
            .chain(&self.key_value_items)
    }

    /// Content items reachable from `body`, depth-first in children order
    #[must_use = "returns the items in reading order"]
    pub fn items_in_order(&self) -> Vec<&DocItem> {
        let mut out = Vec::new();
        let mut stack: Vec<&ItemRef> = self.body.children.iter().rev().collect();
        while let Some(item_ref) = stack.pop() {
            let Some(node) = self.resolve(&item_ref.ref_path) else {
                continue;
            };
            if let NodeRef::Item(item) = node {
                out.push(item);
            }
            stack.extend(node.children().iter().rev());
        }
        out
    }
}
