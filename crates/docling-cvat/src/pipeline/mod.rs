//! # Modular Pipeline - Annotation Conversion Stages (Stages 01-08)
//!
//! Turns one [`AnnotatedPage`](crate::model::AnnotatedPage) (boxes plus
//! relationship polylines) into a structured document. Driven end to end by
//! [`ModularPipeline`].
//!
//! ## Design Philosophy
//!
//! - **Clear boundaries:** each stage has well-defined input/output types
//! - **Immutable hand-off:** no stage mutates what an earlier stage produced
//! - **Diagnostics, not errors:** every stage returns its output together
//!   with the annotation problems it found; only FATAL ones stop the run
//! - **Independent testing:** each stage can be validated in isolation
//!
//! ## Pipeline Stages
//!
//! ### Stage 01: Containment Tree ([`Stage01ContainmentTree`])
//! - **Input:** Elements
//! - **Process:** Parent = smallest same-layer box holding more than the
//!   containment threshold of the element's area (R-tree candidates)
//! - **Output:** [`ContainmentTree`]
//!
//! ### Stage 02: Path Mapping ([`Stage02PathMapper`])
//! - **Input:** Elements, paths, containment tree
//! - **Process:** Each control point hits the deepest eligible box within
//!   the point tolerance; table structure is skipped
//! - **Output:** [`PathMapping`]
//!
//! ### Stage 03: Logical Elements ([`Stage03LogicalElements`])
//! - **Input:** Merge paths
//! - **Process:** Union-Find over merge edges, validated per group
//! - **Output:** [`LogicalElements`]
//!
//! ### Stage 04: Reading Order ([`Stage04ReadingOrder`])
//! - **Input:** Reading-order paths, containment tree, logical elements
//! - **Process:** Level-1 check, owner assignment, cross-boundary promotion,
//!   ancestor expansion, conflict resolution, untouched check
//! - **Output:** [`ReadingOrderPlan`] (or FATAL)
//!
//! ### Stage 05: Links ([`Stage05Links`])
//! - **Input:** to_caption / to_footnote / to_value paths
//! - **Output:** Normalized [`Link`]s
//!
//! ### Stage 06: Groups ([`Stage06Groups`])
//! - **Input:** Group paths
//! - **Output:** [`GroupAssociation`]s
//!
//! ### Stage 07: Plan Assembly ([`Stage07PlanAssembler`])
//! - **Process:** Pure aggregation of stages 01-06 and their diagnostics
//! - **Output:** [`ConversionPlan`]
//!
//! ### Stage 08: Materialization ([`Stage08Materializer`])
//! - **Input:** A non-FATAL plan
//! - **Process:** Schedule pass (placement, parents, refs), then build pass
//! - **Output:** [`CvatDocument`](crate::output::CvatDocument)

pub mod orchestrator;
pub mod stage01_containment_tree;
pub mod stage02_path_mapper;
pub mod stage03_logical_elements;
pub mod stage04_reading_order;
pub mod stage05_links;
pub mod stage06_groups;
pub mod stage07_plan_assembler;
pub mod stage08_materializer;

pub use orchestrator::{ConversionResult, ModularPipeline};
pub use stage01_containment_tree::{ContainmentRole, ContainmentTree, Stage01ContainmentTree};
pub use stage02_path_mapper::{MappedPath, PathMapping, Stage02PathMapper};
pub use stage03_logical_elements::{LogicalElements, LogicalId, MergeGroup, Stage03LogicalElements};
pub use stage04_reading_order::{
    Compensation, CompensationOutcome, PlanEntry, ReadingOrderPlan, Stage04ReadingOrder,
};
pub use stage05_links::{Link, LinkKind, Stage05Links};
pub use stage06_groups::{GroupAssociation, GroupLabel, Stage06Groups};
pub use stage07_plan_assembler::{ConversionPlan, Stage07PlanAssembler};
pub use stage08_materializer::Stage08Materializer;
