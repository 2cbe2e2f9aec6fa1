/// Modular Pipeline Orchestrator
///
/// Runs stages 01-08 on one annotated page.
///
/// Every stage returns its output together with its diagnostics; the
/// orchestrator concatenates the diagnostics in stage order behind the
/// reader's own findings. A FATAL diagnostic (only Stage 04 raises one)
/// stops the run before plan assembly: the result then carries diagnostics
/// and nothing else.
use crate::config::ConversionConfig;
use crate::diagnostics::{max_severity, Diagnostic, Diagnostics, Severity};
use crate::error::{CvatError, Result};
use crate::model::AnnotatedPage;
use crate::output::CvatDocument;
use crate::pipeline::{
    ConversionPlan, Stage01ContainmentTree, Stage02PathMapper, Stage03LogicalElements,
    Stage04ReadingOrder, Stage05Links, Stage06Groups, Stage07PlanAssembler, Stage08Materializer,
};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Outcome of converting one page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionResult {
    /// `None` when a FATAL diagnostic stopped the run
    pub plan: Option<ConversionPlan>,
    /// `None` when a FATAL diagnostic stopped the run
    pub document: Option<CvatDocument>,
    /// Reader findings first, then every stage in order
    pub diagnostics: Vec<Diagnostic>,
}

impl ConversionResult {
    #[inline]
    #[must_use = "returns the overall severity"]
    pub fn severity(&self) -> Option<Severity> {
        max_severity(&self.diagnostics)
    }

    #[inline]
    #[must_use = "returns whether the conversion was blocked"]
    pub fn is_fatal(&self) -> bool {
        self.severity() == Some(Severity::Fatal)
    }

    #[must_use = "returns the number of diagnostics at that severity"]
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }
}

/// Modular pipeline orchestrator that coordinates stages 01-08
#[derive(Debug, Clone)]
pub struct ModularPipeline {
    config: ConversionConfig,
    stage01: Stage01ContainmentTree,
    stage02: Stage02PathMapper,
    stage03: Stage03LogicalElements,
    stage04: Stage04ReadingOrder,
    stage05: Stage05Links,
    stage06: Stage06Groups,
    stage07: Stage07PlanAssembler,
    stage08: Stage08Materializer,
    /// Debug output directory for saving plans and diagnostics
    debug_output_dir: Option<PathBuf>,
}

impl ModularPipeline {
    /// Create a new pipeline with the default configuration
    #[inline]
    #[must_use = "pipeline is created but not used"]
    pub fn new() -> Self {
        Self::build(ConversionConfig::default())
    }

    /// Create a new pipeline with a custom configuration
    ///
    /// # Errors
    ///
    /// Returns [`CvatError::InvalidConfig`] if a tunable is out of range.
    pub fn with_config(config: ConversionConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    /// Save every plan and diagnostic list under `debug_dir`
    #[must_use = "pipeline is created but not used"]
    pub fn with_debug_output(mut self, debug_dir: PathBuf) -> Self {
        self.debug_output_dir = Some(debug_dir);
        self
    }

    fn build(config: ConversionConfig) -> Self {
        Self {
            config,
            stage01: Stage01ContainmentTree::with_config(config),
            stage02: Stage02PathMapper::with_config(config),
            stage03: Stage03LogicalElements::new(),
            stage04: Stage04ReadingOrder::with_config(config),
            stage05: Stage05Links::new(),
            stage06: Stage06Groups::new(),
            stage07: Stage07PlanAssembler::new(),
            stage08: Stage08Materializer::new(),
            debug_output_dir: None,
        }
    }

    #[inline]
    #[must_use = "returns the pipeline configuration"]
    pub const fn config(&self) -> &ConversionConfig {
        &self.config
    }

    /// Run stages 01-07 and return the plan (if not FATAL) with every
    /// diagnostic collected so far.
    ///
    /// # Errors
    ///
    /// Returns [`CvatError::InvalidAnnotation`] if element ids are not dense
    /// or the coordinate scale is not a positive number.
    pub fn plan(&self, page: &AnnotatedPage) -> Result<(Option<ConversionPlan>, Vec<Diagnostic>)> {
        check_page(page)?;
        let elements = &page.elements;
        let mut diagnostics = Diagnostics::from(page.input_diagnostics.clone());

        // Stage 01: containment tree
        let tree = self.stage01.process(elements);

        // Stage 02: path -> element mapping
        let (mapping, stage_diagnostics) = self.stage02.process(elements, &page.paths, &tree);
        diagnostics.append(stage_diagnostics);

        // Stage 03: merge groups
        let (logical, stage_diagnostics) = self.stage03.process(elements, &mapping, &tree);
        diagnostics.append(stage_diagnostics);

        // Stage 04: reading order (may be FATAL)
        let (reading_order, stage_diagnostics) =
            self.stage04.process(elements, &mapping, &tree, &logical);
        diagnostics.append(stage_diagnostics);
        let Some(reading_order) = reading_order.filter(|_| !diagnostics.has_fatal()) else {
            log::warn!("{}: FATAL reading-order diagnostics, no output", page.name);
            return Ok((None, diagnostics.into_vec()));
        };

        // Stage 05: caption / footnote / value links
        let (links, stage_diagnostics) = self.stage05.process(&mapping, &tree, &logical);
        diagnostics.append(stage_diagnostics);

        // Stage 06: groups
        let (groups, stage_diagnostics) = self.stage06.process(&mapping, &tree, &logical);
        diagnostics.append(stage_diagnostics);

        // Stage 07: freeze
        let plan = self
            .stage07
            .process(tree, logical, reading_order, groups, links, diagnostics);
        let diagnostics = plan.diagnostics.clone();
        Ok((Some(plan), diagnostics))
    }

    /// Convert one page
    ///
    /// # Errors
    ///
    /// Same as [`ModularPipeline::plan`].
    pub fn convert(&self, page: &AnnotatedPage) -> Result<ConversionResult> {
        let (plan, diagnostics) = self.plan(page)?;

        // Stage 08: materialize (skipped on FATAL)
        let document = plan
            .as_ref()
            .filter(|plan| plan.is_materializable())
            .map(|plan| self.stage08.process(page, plan));

        let result = ConversionResult {
            plan,
            document,
            diagnostics,
        };
        log::debug!(
            "{}: {} diagnostics, severity {:?}",
            page.name,
            result.diagnostics.len(),
            result.severity()
        );

        if let Some(ref debug_dir) = self.debug_output_dir {
            Self::save_result(debug_dir, &page.name, &result);
        }
        Ok(result)
    }

    /// Convert independent pages, in parallel when configured
    ///
    /// # Errors
    ///
    /// Returns the first page error in input order.
    pub fn convert_all(&self, pages: &[AnnotatedPage]) -> Result<Vec<ConversionResult>> {
        if self.config.parallel {
            pages.par_iter().map(|page| self.convert(page)).collect()
        } else {
            pages.iter().map(|page| self.convert(page)).collect()
        }
    }

    /// Save the plan and diagnostics of one page as JSON
    fn save_result(debug_dir: &Path, name: &str, result: &ConversionResult) {
        use std::fs;

        if let Err(e) = fs::create_dir_all(debug_dir) {
            log::warn!("Failed to create debug directory {}: {e}", debug_dir.display());
            return;
        }
        let stem: String = name
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();

        let outputs = [
            ("plan", serde_json::to_string_pretty(&result.plan)),
            ("diagnostics", serde_json::to_string_pretty(&result.diagnostics)),
        ];
        for (kind, json) in outputs {
            let output_path = debug_dir.join(format!("{stem}_{kind}.json"));
            match json {
                Ok(json) => {
                    if let Err(e) = fs::write(&output_path, json) {
                        log::warn!("Failed to write {}: {e}", output_path.display());
                    } else {
                        log::debug!("Saved {kind} to {}", output_path.display());
                    }
                }
                Err(e) => log::warn!("Failed to serialize {kind} for {name}: {e}"),
            }
        }
    }
}

impl Default for ModularPipeline {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

fn check_page(page: &AnnotatedPage) -> Result<()> {
    if !page.has_dense_ids() {
        return Err(CvatError::InvalidAnnotation(format!(
            "{}: element ids must equal their position",
            page.name
        )));
    }
    if !(page.coordinate_scale.is_finite() && page.coordinate_scale > 0.0) {
        return Err(CvatError::InvalidAnnotation(format!(
            "{}: coordinate scale must be positive, got {}",
            page.name, page.coordinate_scale
        )));
    }
    Ok(())
}
