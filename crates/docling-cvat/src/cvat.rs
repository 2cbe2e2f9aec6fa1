//! CVAT "for images 1.1" XML reader.
//!
//! One `<image>` becomes one [`AnnotatedPage`]: `<box>`es become elements
//! (ids in document order, skipped boxes take no id) and `<polyline>`s become
//! relationship paths. Recoverable problems (unknown labels, missing or
//! unexpected attributes) are recorded as WARNINGs in
//! [`AnnotatedPage::input_diagnostics`]; only XML that cannot describe a page
//! at all is an error.

use crate::diagnostics::{Diagnostic, DiagnosticKind};
use crate::error::{CvatError, Result};
use crate::geometry::{BBox, Point};
use crate::labels::ElementLabel;
use crate::model::{AnnotatedPage, AnnotationPath, ContentLayer, Element, ElementId, PathId, PathKind};
use std::path::Path;

const CONTENT_LAYER: &str = "content_layer";
const LEVEL: &str = "level";
const TYPE: &str = "type";

/// Every image of one CVAT export
#[derive(Debug, Clone, PartialEq)]
pub struct CvatAnnotations {
    pub images: Vec<AnnotatedPage>,
}

impl CvatAnnotations {
    /// Parse an annotation document held in memory
    ///
    /// # Errors
    ///
    /// Returns [`CvatError::Xml`] for malformed XML and
    /// [`CvatError::InvalidAnnotation`] for images or shapes missing required
    /// geometry.
    pub fn parse(xml: &str) -> Result<Self> {
        let doc = roxmltree::Document::parse(xml)?;
        let images = doc
            .descendants()
            .filter(|n| n.is_element() && n.tag_name().name() == "image")
            .map(|image| parse_image(&image))
            .collect::<Result<Vec<_>>>()?;
        log::debug!("Parsed {} annotated images", images.len());
        Ok(Self { images })
    }

    /// Read and parse an annotation file
    ///
    /// # Errors
    ///
    /// Returns [`CvatError::IoError`] if the file cannot be read, otherwise
    /// the errors of [`CvatAnnotations::parse`].
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let xml = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&xml)
    }

    /// Look up an image by name
    ///
    /// # Errors
    ///
    /// Returns [`CvatError::ImageNotFound`] if no image has that name.
    pub fn image(&self, name: &str) -> Result<&AnnotatedPage> {
        self.images
            .iter()
            .find(|page| page.name == name)
            .ok_or_else(|| CvatError::ImageNotFound(name.to_string()))
    }

    #[inline]
    #[must_use = "returns the image names"]
    pub fn image_names(&self) -> Vec<&str> {
        self.images.iter().map(|page| page.name.as_str()).collect()
    }

    #[inline]
    #[must_use = "returns the parsed pages"]
    pub fn into_pages(self) -> Vec<AnnotatedPage> {
        self.images
    }
}

fn parse_image(image: &roxmltree::Node) -> Result<AnnotatedPage> {
    let name = image.attribute("name").unwrap_or_default().to_string();
    let width = required_f64(image, "width", &name)?;
    let height = required_f64(image, "height", &name)?;
    let mut page = AnnotatedPage::new(name, width, height);

    for (index, shape) in image.children().filter(roxmltree::Node::is_element).enumerate() {
        match shape.tag_name().name() {
            "box" => {
                if let Some(element) = parse_box(&shape, index, &mut page)? {
                    page.push_element(element);
                }
            }
            "polyline" => {
                if let Some(path) = parse_polyline(&shape, index, &mut page)? {
                    page.paths.push(path);
                }
            }
            other => log::debug!("{}: ignoring <{other}> shape {index}", page.name),
        }
    }

    log::debug!(
        "{}: {} elements, {} paths, {} reader diagnostics",
        page.name,
        page.elements.len(),
        page.paths.len(),
        page.input_diagnostics.len()
    );
    Ok(page)
}

/// `<attribute name="...">value</attribute>` children, empty values dropped
fn attributes<'a, 'input: 'a>(shape: &roxmltree::Node<'a, 'input>) -> Vec<(&'a str, &'a str)> {
    shape
        .children()
        .filter(|n| n.is_element() && n.tag_name().name() == "attribute")
        .filter_map(|n| {
            let name = n.attribute("name")?;
            let value = n.text().map(str::trim).unwrap_or_default();
            Some((name, value))
        })
        .collect()
}

fn parse_box(
    shape: &roxmltree::Node,
    index: usize,
    page: &mut AnnotatedPage,
) -> Result<Option<Element>> {
    let raw_label = shape.attribute("label").unwrap_or_default();
    let Ok(label) = raw_label.parse::<ElementLabel>() else {
        page.input_diagnostics.push(Diagnostic::warning(
            DiagnosticKind::UnknownLabel,
            format!("{}: box {index} has unknown label '{raw_label}'; skipped", page.name),
        ));
        return Ok(None);
    };

    let bbox = BBox::new(
        required_f64(shape, "xtl", &page.name)?,
        required_f64(shape, "ytl", &page.name)?,
        required_f64(shape, "xbr", &page.name)?,
        required_f64(shape, "ybr", &page.name)?,
    );
    let id = ElementId(page.elements.len());
    let mut element = Element::new(id, label, bbox);

    let rotation = optional_f64(shape, "rotation", &page.name)?.unwrap_or(0.0);
    if rotation != 0.0 {
        element = element.with_rotation(rotation);
    }

    let mut layer_seen = false;
    for (name, value) in attributes(shape) {
        match name {
            CONTENT_LAYER if value.is_empty() => {}
            CONTENT_LAYER => {
                layer_seen = true;
                match value.parse::<ContentLayer>() {
                    Ok(layer) => element.content_layer = layer,
                    Err(reason) => page.input_diagnostics.push(
                        Diagnostic::warning(
                            DiagnosticKind::InvalidAttributeValue,
                            format!("{}: {id} {reason}; using BODY", page.name),
                        )
                        .with_element(id),
                    ),
                }
            }
            LEVEL if value.is_empty() => {}
            LEVEL => match value.parse::<u32>() {
                Ok(level) => element.level = Some(level),
                Err(_) => page.input_diagnostics.push(
                    Diagnostic::warning(
                        DiagnosticKind::InvalidAttributeValue,
                        format!("{}: {id} has non-integer level '{value}'", page.name),
                    )
                    .with_element(id),
                ),
            },
            TYPE if value.is_empty() || !label.is_content() => {}
            TYPE => element.type_tag = Some(value.to_lowercase()),
            other => page.input_diagnostics.push(
                Diagnostic::warning(
                    DiagnosticKind::UnrecognizedAttribute,
                    format!("{}: {id} has unrecognized attribute '{other}'", page.name),
                )
                .with_element(id),
            ),
        }
    }
    if !layer_seen {
        page.input_diagnostics.push(
            Diagnostic::warning(
                DiagnosticKind::MissingContentLayer,
                format!("{}: {id} ({label}) has no content_layer; using BODY", page.name),
            )
            .with_element(id),
        );
    }

    Ok(Some(element))
}

fn parse_polyline(
    shape: &roxmltree::Node,
    index: usize,
    page: &mut AnnotatedPage,
) -> Result<Option<AnnotationPath>> {
    let raw_kind = shape.attribute("label").unwrap_or_default();
    let Ok(kind) = raw_kind.parse::<PathKind>() else {
        page.input_diagnostics.push(Diagnostic::warning(
            DiagnosticKind::UnknownPathKind,
            format!("{}: polyline {index} has unknown label '{raw_kind}'; skipped", page.name),
        ));
        return Ok(None);
    };

    let raw_points = shape.attribute("points").unwrap_or_default();
    let points = parse_points(raw_points).ok_or_else(|| {
        CvatError::InvalidAnnotation(format!(
            "{}: polyline {index} has malformed points '{raw_points}'",
            page.name
        ))
    })?;
    let id = PathId(page.paths.len());
    let mut path = AnnotationPath::new(id, kind, points);

    for (name, value) in attributes(shape) {
        match name {
            LEVEL if kind != PathKind::ReadingOrder || value.is_empty() => {}
            LEVEL => match value.parse::<u32>() {
                Ok(level) => path.level = Some(level),
                Err(_) => page.input_diagnostics.push(
                    Diagnostic::warning(
                        DiagnosticKind::InvalidAttributeValue,
                        format!("{}: {id} has non-integer level '{value}'", page.name),
                    )
                    .with_path(id),
                ),
            },
            other => page.input_diagnostics.push(
                Diagnostic::warning(
                    DiagnosticKind::UnrecognizedAttribute,
                    format!("{}: {id} has unrecognized attribute '{other}'", page.name),
                )
                .with_path(id),
            ),
        }
    }
    if kind == PathKind::ReadingOrder && path.level.is_none() {
        page.input_diagnostics.push(
            Diagnostic::warning(
                DiagnosticKind::MissingLevel,
                format!("{}: reading order {id} has no level; using 1", page.name),
            )
            .with_path(id),
        );
        path.level = Some(1);
    }

    Ok(Some(path))
}

/// `x1,y1;x2,y2;...`
fn parse_points(raw: &str) -> Option<Vec<Point>> {
    raw.split(';')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (x, y) = pair.split_once(',')?;
            Some(Point::new(x.trim().parse().ok()?, y.trim().parse().ok()?))
        })
        .collect()
}

fn optional_f64(node: &roxmltree::Node, name: &str, image: &str) -> Result<Option<f64>> {
    node.attribute(name)
        .map(|raw| {
            raw.trim()
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| {
                    CvatError::InvalidAnnotation(format!(
                        "{image}: attribute {name}='{raw}' is not a number"
                    ))
                })
        })
        .transpose()
}

fn required_f64(node: &roxmltree::Node, name: &str, image: &str) -> Result<f64> {
    optional_f64(node, name, image)?.ok_or_else(|| {
        CvatError::InvalidAnnotation(format!(
            "{image}: <{}> is missing attribute {name}",
            node.tag_name().name()
        ))
    })
}
