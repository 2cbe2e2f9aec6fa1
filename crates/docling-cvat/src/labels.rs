//! Annotation label families.
//!
//! Every annotation box carries exactly one label from one of three disjoint
//! families:
//!
//! - [`DocItemLabel`]: ordinary document items (text, title, table, ...)
//! - [`CellRoleLabel`]: key/value roles, always owned by an enclosing element
//! - [`TableStructLabel`]: table grid structure, never ordered, grouped or linked

use serde::{Deserialize, Serialize};

/// Label for content items, matching docling's `DocItemLabel` enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocItemLabel {
    Caption,
    Footnote,
    Formula,
    ListItem,
    PageFooter,
    PageHeader,
    Picture,
    SectionHeader,
    Table,
    Text,
    Title,
    DocumentIndex,
    Code,
    CheckboxSelected,
    CheckboxUnselected,
    Form,
    KeyValueRegion,
    Reference,
    HandwrittenText,
    EmptyValue,
}

impl DocItemLabel {
    /// Labels that own a nested reading order
    #[inline]
    #[must_use = "returns whether the label is a container"]
    pub const fn is_container(self) -> bool {
        matches!(self, Self::Table | Self::Picture | Self::Form | Self::Code)
    }

    #[inline]
    #[must_use = "returns whether the label is a checkbox"]
    pub const fn is_checkbox(self) -> bool {
        matches!(self, Self::CheckboxSelected | Self::CheckboxUnselected)
    }

    /// Labels allowed at the non-container end of a `to_caption` path
    #[inline]
    #[must_use = "returns whether the label can be a caption"]
    pub const fn is_caption_eligible(self) -> bool {
        matches!(self, Self::Caption | Self::Text)
    }

    /// Labels allowed at the non-container end of a `to_footnote` path
    #[inline]
    #[must_use = "returns whether the label can be a footnote"]
    pub const fn is_footnote_eligible(self) -> bool {
        matches!(self, Self::Footnote | Self::Text)
    }

    /// Whether two labels may be merged into one logical element.
    ///
    /// Identical labels always merge; the two checkbox states are
    /// interchangeable renderings of the same item.
    #[inline]
    #[must_use = "returns whether the labels are merge-compatible"]
    pub fn merges_with(self, other: Self) -> bool {
        self == other || (self.is_checkbox() && other.is_checkbox())
    }

    /// Canonical snake_case name
    #[must_use = "returns the label name"]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Caption => "caption",
            Self::Footnote => "footnote",
            Self::Formula => "formula",
            Self::ListItem => "list_item",
            Self::PageFooter => "page_footer",
            Self::PageHeader => "page_header",
            Self::Picture => "picture",
            Self::SectionHeader => "section_header",
            Self::Table => "table",
            Self::Text => "text",
            Self::Title => "title",
            Self::DocumentIndex => "document_index",
            Self::Code => "code",
            Self::CheckboxSelected => "checkbox_selected",
            Self::CheckboxUnselected => "checkbox_unselected",
            Self::Form => "form",
            Self::KeyValueRegion => "key_value_region",
            Self::Reference => "reference",
            Self::HandwrittenText => "handwritten_text",
            Self::EmptyValue => "empty_value",
        }
    }
}

/// Key/value role of a form cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellRoleLabel {
    Key,
    Value,
}

impl CellRoleLabel {
    #[must_use = "returns the label name"]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Key => "key",
            Self::Value => "value",
        }
    }
}

/// Table grid structure labels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableStructLabel {
    TableRow,
    TableColumn,
    TableMergedCell,
    ColHeader,
    RowHeader,
    RowSection,
}

impl TableStructLabel {
    #[must_use = "returns the label name"]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TableRow => "table_row",
            Self::TableColumn => "table_column",
            Self::TableMergedCell => "table_merged_cell",
            Self::ColHeader => "col_header",
            Self::RowHeader => "row_header",
            Self::RowSection => "row_section",
        }
    }
}

/// Label of an annotation box: one of the three disjoint families.
///
/// Serializes as its bare snake_case name (`"section_header"`, `"key"`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum ElementLabel {
    Content(DocItemLabel),
    CellRole(CellRoleLabel),
    TableStructure(TableStructLabel),
}

impl ElementLabel {
    #[inline]
    #[must_use = "returns the content label, if any"]
    pub const fn content(self) -> Option<DocItemLabel> {
        match self {
            Self::Content(label) => Some(label),
            _ => None,
        }
    }

    #[inline]
    #[must_use = "returns the cell role, if any"]
    pub const fn cell_role(self) -> Option<CellRoleLabel> {
        match self {
            Self::CellRole(role) => Some(role),
            _ => None,
        }
    }

    #[inline]
    #[must_use = "returns whether this is a container label"]
    pub const fn is_container(self) -> bool {
        match self {
            Self::Content(label) => label.is_container(),
            _ => false,
        }
    }

    #[inline]
    #[must_use = "returns whether this is a content label"]
    pub const fn is_content(self) -> bool {
        matches!(self, Self::Content(_))
    }

    #[inline]
    #[must_use = "returns whether this is a key/value label"]
    pub const fn is_cell_role(self) -> bool {
        matches!(self, Self::CellRole(_))
    }

    #[inline]
    #[must_use = "returns whether this is a table-structure label"]
    pub const fn is_table_structure(self) -> bool {
        matches!(self, Self::TableStructure(_))
    }

    #[inline]
    #[must_use = "returns whether this is the given content label"]
    pub fn is(self, label: DocItemLabel) -> bool {
        self.content() == Some(label)
    }

    /// Whether two labels may be merged into one logical element
    #[must_use = "returns whether the labels are merge-compatible"]
    pub fn merges_with(self, other: Self) -> bool {
        match (self, other) {
            (Self::Content(a), Self::Content(b)) => a.merges_with(b),
            (a, b) => a == b,
        }
    }

    #[must_use = "returns the label name"]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Content(label) => label.as_str(),
            Self::CellRole(role) => role.as_str(),
            Self::TableStructure(label) => label.as_str(),
        }
    }
}

impl std::fmt::Display for ElementLabel {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ElementLabel {
    type Err = String;

    /// Accepts the snake_case names as well as the spellings CVAT projects
    /// commonly use (`Section-header`, `list item`, ...).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace(['-', ' '], "_");
        let label = match normalized.as_str() {
            "caption" => Self::Content(DocItemLabel::Caption),
            "footnote" => Self::Content(DocItemLabel::Footnote),
            "formula" => Self::Content(DocItemLabel::Formula),
            "list_item" | "listitem" => Self::Content(DocItemLabel::ListItem),
            "page_footer" | "pagefooter" => Self::Content(DocItemLabel::PageFooter),
            "page_header" | "pageheader" => Self::Content(DocItemLabel::PageHeader),
            "picture" | "figure" => Self::Content(DocItemLabel::Picture),
            "section_header" | "sectionheader" => Self::Content(DocItemLabel::SectionHeader),
            "table" => Self::Content(DocItemLabel::Table),
            "text" | "paragraph" => Self::Content(DocItemLabel::Text),
            "title" => Self::Content(DocItemLabel::Title),
            "document_index" => Self::Content(DocItemLabel::DocumentIndex),
            "code" => Self::Content(DocItemLabel::Code),
            "checkbox_selected" => Self::Content(DocItemLabel::CheckboxSelected),
            "checkbox_unselected" => Self::Content(DocItemLabel::CheckboxUnselected),
            "form" => Self::Content(DocItemLabel::Form),
            "key_value_region" => Self::Content(DocItemLabel::KeyValueRegion),
            "reference" => Self::Content(DocItemLabel::Reference),
            "handwritten_text" => Self::Content(DocItemLabel::HandwrittenText),
            "empty_value" => Self::Content(DocItemLabel::EmptyValue),
            "key" => Self::CellRole(CellRoleLabel::Key),
            "value" => Self::CellRole(CellRoleLabel::Value),
            "table_row" => Self::TableStructure(TableStructLabel::TableRow),
            "table_column" => Self::TableStructure(TableStructLabel::TableColumn),
            "table_merged_cell" => Self::TableStructure(TableStructLabel::TableMergedCell),
            "col_header" | "column_header" => Self::TableStructure(TableStructLabel::ColHeader),
            "row_header" => Self::TableStructure(TableStructLabel::RowHeader),
            "row_section" => Self::TableStructure(TableStructLabel::RowSection),
            _ => return Err(format!("unknown element label: '{s}'")),
        };
        Ok(label)
    }
}

impl From<ElementLabel> for String {
    #[inline]
    fn from(label: ElementLabel) -> Self {
        label.as_str().to_string()
    }
}

impl TryFrom<String> for ElementLabel {
    type Error = String;

    #[inline]
    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}
