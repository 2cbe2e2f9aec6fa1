//! Annotation-quality findings.
//!
//! Every stage returns its result together with the diagnostics it raised.
//! Diagnostics are never swallowed: the orchestrator concatenates them in
//! stage order and the overall severity is the maximum over the list.

use crate::model::{ElementId, PathId};
use serde::{Deserialize, Serialize};

/// Diagnostic severity, ordered `Warning < Error < Fatal`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    /// Recorded and fully recovered from
    Warning,
    /// Recorded; output is produced but may be incomplete
    Error,
    /// Blocks all output
    Fatal,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
            Self::Fatal => "FATAL",
        };
        f.write_str(name)
    }
}

/// Machine-readable diagnostic category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    // Annotation reader
    UnknownLabel,
    UnknownPathKind,
    MissingContentLayer,
    MissingLevel,
    UnrecognizedAttribute,
    InvalidAttributeValue,

    // Path mapping
    UnmatchedPoint,
    TableStructureHit,
    TableStructureOutsideTable,
    EmptyPath,
    SingleElementMerge,

    // Merges
    InvalidMerge,
    MergeOrderCorrected,

    // Reading order
    MissingGlobalOrder,
    DuplicateGlobalOrder,
    NoOwningContainer,
    ConflictingClaim,
    UnresolvedCompensation,
    TableChildNotOrdered,
    UntouchedElement,
    OrphanedNestedOrder,

    // Links
    LinkDirectionCorrected,
    InvalidLink,
    InvalidValueLink,
    DuplicateLink,

    // Groups
    InvalidGroup,
    DuplicateGroupMember,
}

/// One finding about the annotations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub kind: DiagnosticKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub path_ids: Vec<PathId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub element_ids: Vec<ElementId>,
}

impl Diagnostic {
    #[must_use = "returns a new Diagnostic"]
    pub fn new(severity: Severity, kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            severity,
            kind,
            message: message.into(),
            path_ids: Vec::new(),
            element_ids: Vec::new(),
        }
    }

    #[must_use = "returns a new Diagnostic"]
    pub fn warning(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, kind, message)
    }

    #[must_use = "returns a new Diagnostic"]
    pub fn error(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self::new(Severity::Error, kind, message)
    }

    #[must_use = "returns a new Diagnostic"]
    pub fn fatal(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self::new(Severity::Fatal, kind, message)
    }

    #[must_use = "returns the updated Diagnostic"]
    pub fn with_path(mut self, id: PathId) -> Self {
        self.path_ids.push(id);
        self
    }

    #[must_use = "returns the updated Diagnostic"]
    pub fn with_paths(mut self, ids: impl IntoIterator<Item = PathId>) -> Self {
        self.path_ids.extend(ids);
        self
    }

    #[must_use = "returns the updated Diagnostic"]
    pub fn with_element(mut self, id: ElementId) -> Self {
        self.element_ids.push(id);
        self
    }

    #[must_use = "returns the updated Diagnostic"]
    pub fn with_elements(mut self, ids: impl IntoIterator<Item = ElementId>) -> Self {
        self.element_ids.extend(ids);
        self
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.severity, self.message)
    }
}

/// Ordered diagnostic collector.
///
/// Pushing logs the finding: `warn!` for ERROR and FATAL, `debug!` for
/// warnings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Diagnostics(Vec<Diagnostic>);

impl Diagnostics {
    #[inline]
    #[must_use = "returns a new collector"]
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        if diagnostic.severity >= Severity::Error {
            log::warn!("{diagnostic}");
        } else {
            log::debug!("{diagnostic}");
        }
        self.0.push(diagnostic);
    }

    /// Append already-logged diagnostics
    pub fn append(&mut self, other: Self) {
        self.0.extend(other.0);
    }

    #[inline]
    #[must_use = "returns the highest severity, if any"]
    pub fn max_severity(&self) -> Option<Severity> {
        max_severity(&self.0)
    }

    #[inline]
    #[must_use = "returns whether a FATAL diagnostic was recorded"]
    pub fn has_fatal(&self) -> bool {
        self.0.iter().any(|d| d.severity == Severity::Fatal)
    }

    #[must_use = "returns the number of diagnostics of that severity"]
    pub fn count(&self, severity: Severity) -> usize {
        self.0.iter().filter(|d| d.severity == severity).count()
    }

    #[inline]
    #[must_use = "returns the number of diagnostics"]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    #[must_use = "returns whether no diagnostics were recorded"]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Diagnostic> {
        self.0.iter()
    }

    #[must_use = "returns the diagnostics"]
    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.0
    }

    #[must_use = "returns the diagnostics"]
    pub fn as_slice(&self) -> &[Diagnostic] {
        &self.0
    }
}

impl From<Vec<Diagnostic>> for Diagnostics {
    fn from(diagnostics: Vec<Diagnostic>) -> Self {
        Self(diagnostics)
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Highest severity in `diagnostics`
#[must_use = "returns the highest severity, if any"]
pub fn max_severity(diagnostics: &[Diagnostic]) -> Option<Severity> {
    diagnostics.iter().map(|d| d.severity).max()
}
