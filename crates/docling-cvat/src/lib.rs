//! # Docling CVAT - Layout Annotations to Structured Documents
//!
//! Converts document-layout annotations drawn in CVAT (boxes plus
//! relationship polylines) into a docling-style structured document with a
//! resolved multi-level reading order.
//!
//! ## Quick Start
//!
//! ```rust
//! use docling_cvat::geometry::{BBox, Point};
//! use docling_cvat::labels::{DocItemLabel, ElementLabel};
//! use docling_cvat::{AnnotatedPage, ModularPipeline};
//!
//! # fn main() -> docling_cvat::Result<()> {
//! let mut page = AnnotatedPage::new("page.png", 200.0, 100.0);
//! page.add_element(
//!     ElementLabel::Content(DocItemLabel::Title),
//!     BBox::new(10.0, 10.0, 190.0, 40.0),
//! );
//! page.add_reading_order(1, vec![Point::new(100.0, 25.0)]);
//!
//! let result = ModularPipeline::new().convert(&page)?;
//! assert!(result.diagnostics.is_empty());
//! assert_eq!(result.document.map(|d| d.texts.len()), Some(1));
//! # Ok(())
//! # }
//! ```
//!
//! Reading a CVAT export instead:
//!
//! ```rust,ignore
//! use docling_cvat::{CvatAnnotations, ModularPipeline};
//!
//! let annotations = CvatAnnotations::from_file("annotations.xml")?;
//! let pipeline = ModularPipeline::new();
//! for page in &annotations.images {
//!     let result = pipeline.convert(page)?;
//!     println!("{}: {:?}", page.name, result.severity());
//! }
//! ```
//!
//! ## Annotation Model
//!
//! - **Boxes** carry a label from one of three families: content labels
//!   (text, table, picture, ...), key/value cell roles and table-structure
//!   labels. Table, picture, form and code boxes are *containers* and may own
//!   a nested reading order.
//! - **Polylines** relate the boxes their control points touch:
//!   `reading_order` (with a level), `merge`, `group`, `to_caption`,
//!   `to_footnote` and `to_value`.
//!
//! ## Diagnostics
//!
//! Annotation problems never fail a conversion. Each is a [`Diagnostic`]
//! with a [`Severity`]:
//! - **WARNING:** corrected automatically (reversed link, missing attribute)
//! - **ERROR:** recorded, output still produced (untouched element, invalid
//!   merge)
//! - **FATAL:** no output (missing or duplicated level-1 reading order)
//!
//! [`CvatError`] is reserved for inputs that cannot be processed at all.
//!
//! ## Modules
//!
//! - [`pipeline`]: stages 01-08 and the [`ModularPipeline`] orchestrator
//! - [`cvat`]: CVAT XML reader
//! - [`output`]: the materialized document model
//! - [`model`], [`labels`], [`geometry`]: annotation input types

pub mod config;
pub mod cvat;
pub mod diagnostics;
pub mod error;
pub mod geometry;
pub mod labels;
pub mod model;
pub mod output;
pub mod pipeline;

pub use config::ConversionConfig;
pub use cvat::CvatAnnotations;
pub use diagnostics::{Diagnostic, DiagnosticKind, Diagnostics, Severity};
pub use error::{CvatError, Result};
pub use model::{AnnotatedPage, AnnotationPath, ContentLayer, Element, ElementId, PathId, PathKind};
pub use output::CvatDocument;
pub use pipeline::{ConversionPlan, ConversionResult, ModularPipeline};
