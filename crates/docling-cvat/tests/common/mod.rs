//! Common test utilities and fixtures
#![allow(dead_code)]

use docling_cvat::geometry::{BBox, Point};
use docling_cvat::labels::{DocItemLabel, ElementLabel};
use docling_cvat::{
    AnnotatedPage, ConversionConfig, ConversionResult, DiagnosticKind, ElementId, ModularPipeline,
    Severity,
};

/// Route `log` output through the test harness
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn content(label: DocItemLabel) -> ElementLabel {
    ElementLabel::Content(label)
}

/// Add a body-layer content box `[l, t, r, b]`
pub fn add(page: &mut AnnotatedPage, label: DocItemLabel, [l, t, r, b]: [f64; 4]) -> ElementId {
    page.add_element(content(label), BBox::new(l, t, r, b))
}

pub fn points(coords: &[(f64, f64)]) -> Vec<Point> {
    coords.iter().map(|&(x, y)| Point::new(x, y)).collect()
}

/// Convert with the default tunables, single-threaded
pub fn convert(page: &AnnotatedPage) -> ConversionResult {
    convert_with(page, ConversionConfig::default())
}

pub fn convert_with(page: &AnnotatedPage, config: ConversionConfig) -> ConversionResult {
    init_logging();
    ModularPipeline::with_config(config.with_parallel(false))
        .expect("valid config")
        .convert(page)
        .expect("page converts")
}

pub fn kinds(result: &ConversionResult) -> Vec<DiagnosticKind> {
    result.diagnostics.iter().map(|d| d.kind).collect()
}

pub fn errors(result: &ConversionResult) -> usize {
    result.count(Severity::Error) + result.count(Severity::Fatal)
}
