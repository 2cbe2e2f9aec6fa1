//! Input data model: annotated elements and paths of one page (or one
//! horizontally concatenated page set).
//!
//! Everything here is immutable once handed to the pipeline.

use crate::diagnostics::Diagnostic;
use crate::geometry::{BBox, Point};
use crate::labels::ElementLabel;
use serde::{Deserialize, Serialize};

/// Identifier of an annotation box.
///
/// Ids are dense: the element with id `n` is stored at index `n` of
/// [`AnnotatedPage::elements`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ElementId(pub usize);

impl ElementId {
    #[inline]
    #[must_use = "returns the element index"]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl std::fmt::Display for ElementId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "element {}", self.0)
    }
}

/// Identifier of an annotation path
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct PathId(pub usize);

impl std::fmt::Display for PathId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "path {}", self.0)
    }
}

/// Content layer of an element (docling `ContentLayer`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentLayer {
    #[default]
    Body,
    Furniture,
    Background,
}

impl std::str::FromStr for ContentLayer {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "body" => Ok(Self::Body),
            "furniture" => Ok(Self::Furniture),
            "background" => Ok(Self::Background),
            _ => Err(format!("unknown content layer: '{s}'")),
        }
    }
}

/// An annotation box
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    pub id: ElementId,
    pub label: ElementLabel,
    /// Axis-aligned box used by every geometric test. For rotated
    /// annotations this is the enclosure of the rotated rectangle.
    pub bbox: BBox,
    /// The box as drawn, before rotation
    pub bbox_unrotated: BBox,
    /// Clockwise rotation in degrees (0 for ordinary boxes)
    pub rotation_deg: f64,
    pub content_layer: ContentLayer,
    /// List nesting / section depth
    pub level: Option<u32>,
    /// Free-form type tag (`chart`, `logo`, ...), content labels only
    pub type_tag: Option<String>,
    /// 1-based page number
    pub page_no: u32,
    /// Horizontal offset of this element's page inside a concatenated canvas
    pub x_offset: f64,
}

impl Element {
    /// Create a body-layer element on page 1 with no rotation
    #[must_use = "returns a new Element"]
    pub fn new(id: ElementId, label: ElementLabel, bbox: BBox) -> Self {
        Self {
            id,
            label,
            bbox,
            bbox_unrotated: bbox,
            rotation_deg: 0.0,
            content_layer: ContentLayer::Body,
            level: None,
            type_tag: None,
            page_no: 1,
            x_offset: 0.0,
        }
    }

    #[must_use = "returns the updated element"]
    pub fn with_layer(mut self, layer: ContentLayer) -> Self {
        self.content_layer = layer;
        self
    }

    #[must_use = "returns the updated element"]
    pub fn with_level(mut self, level: u32) -> Self {
        self.level = Some(level);
        self
    }

    #[must_use = "returns the updated element"]
    pub fn with_type_tag(mut self, tag: impl Into<String>) -> Self {
        self.type_tag = Some(tag.into());
        self
    }

    /// Rotate the drawn box; `bbox` becomes the axis-aligned enclosure.
    #[must_use = "returns the updated element"]
    pub fn with_rotation(mut self, rotation_deg: f64) -> Self {
        self.rotation_deg = rotation_deg;
        self.bbox = self.bbox_unrotated.enclosing_rotated(rotation_deg);
        self
    }

    #[must_use = "returns the updated element"]
    pub fn on_page(mut self, page_no: u32, x_offset: f64) -> Self {
        self.page_no = page_no;
        self.x_offset = x_offset;
        self
    }

    #[inline]
    #[must_use = "returns the bbox area"]
    pub fn area(&self) -> f64 {
        self.bbox.area()
    }
}

/// Relationship kind of an annotation path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathKind {
    ReadingOrder,
    Merge,
    Group,
    ToCaption,
    ToFootnote,
    ToValue,
}

impl PathKind {
    #[must_use = "returns the path kind name"]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ReadingOrder => "reading_order",
            Self::Merge => "merge",
            Self::Group => "group",
            Self::ToCaption => "to_caption",
            Self::ToFootnote => "to_footnote",
            Self::ToValue => "to_value",
        }
    }
}

impl std::fmt::Display for PathKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PathKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace(['-', ' '], "_").as_str() {
            "reading_order" => Ok(Self::ReadingOrder),
            "merge" => Ok(Self::Merge),
            "group" => Ok(Self::Group),
            "to_caption" => Ok(Self::ToCaption),
            "to_footnote" => Ok(Self::ToFootnote),
            "to_value" => Ok(Self::ToValue),
            _ => Err(format!("unknown path kind: '{s}'")),
        }
    }
}

/// A polyline annotation relating the elements its control points touch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationPath {
    pub id: PathId,
    pub kind: PathKind,
    /// Reading-order level (1 = global). Ignored for other kinds.
    pub level: Option<u32>,
    pub points: Vec<Point>,
}

impl AnnotationPath {
    #[must_use = "returns a new AnnotationPath"]
    pub fn new(id: PathId, kind: PathKind, points: Vec<Point>) -> Self {
        Self {
            id,
            kind,
            level: None,
            points,
        }
    }

    #[must_use = "returns the updated path"]
    pub fn with_level(mut self, level: u32) -> Self {
        self.level = Some(level);
        self
    }

    /// Effective reading-order level (missing level means global)
    #[inline]
    #[must_use = "returns the effective level"]
    pub fn effective_level(&self) -> u32 {
        self.level.unwrap_or(1)
    }
}

/// Geometry of one page in the (possibly concatenated) canvas
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageInfo {
    pub page_no: u32,
    pub width: f64,
    pub height: f64,
    pub x_offset: f64,
}

/// Everything the pipeline needs to convert one annotated image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedPage {
    /// Image/document name
    pub name: String,
    pub pages: Vec<PageInfo>,
    pub elements: Vec<Element>,
    pub paths: Vec<AnnotationPath>,
    /// Annotation pixels per output unit
    pub coordinate_scale: f64,
    /// Findings of the annotation reader (unknown labels, missing attributes)
    #[serde(default)]
    pub input_diagnostics: Vec<Diagnostic>,
}

impl AnnotatedPage {
    /// Create an empty single-page canvas
    #[must_use = "returns a new AnnotatedPage"]
    pub fn new(name: impl Into<String>, width: f64, height: f64) -> Self {
        Self {
            name: name.into(),
            pages: vec![PageInfo {
                page_no: 1,
                width,
                height,
                x_offset: 0.0,
            }],
            elements: Vec::new(),
            paths: Vec::new(),
            coordinate_scale: 1.0,
            input_diagnostics: Vec::new(),
        }
    }

    /// Append a body-layer element and return its id
    pub fn add_element(&mut self, label: ElementLabel, bbox: BBox) -> ElementId {
        let id = ElementId(self.elements.len());
        self.elements.push(Element::new(id, label, bbox));
        id
    }

    /// Append a prepared element, renumbering it to keep ids dense
    pub fn push_element(&mut self, mut element: Element) -> ElementId {
        let id = ElementId(self.elements.len());
        element.id = id;
        self.elements.push(element);
        id
    }

    /// Append a path and return its id
    pub fn add_path(&mut self, kind: PathKind, points: Vec<Point>) -> PathId {
        let id = PathId(self.paths.len());
        self.paths.push(AnnotationPath::new(id, kind, points));
        id
    }

    /// Append a reading-order path at `level`
    pub fn add_reading_order(&mut self, level: u32, points: Vec<Point>) -> PathId {
        let id = PathId(self.paths.len());
        self.paths
            .push(AnnotationPath::new(id, PathKind::ReadingOrder, points).with_level(level));
        id
    }

    #[inline]
    #[must_use = "returns the element, if present"]
    pub fn element(&self, id: ElementId) -> Option<&Element> {
        self.elements.get(id.0)
    }

    /// Whether every element id equals its index
    #[must_use = "returns whether ids are dense"]
    pub fn has_dense_ids(&self) -> bool {
        self.elements.iter().enumerate().all(|(i, e)| e.id.0 == i)
    }
}
