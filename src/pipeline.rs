use std::time::Instant;

use tracing::{info, warn};

use crate::construct::Resolution;
use crate::error::Result;
use crate::persist::{Persistor, ReportArtifact};
use crate::resolve::Resolver;
use crate::sanity::{SanityReport, apply_non_company_filter};
use crate::settings::Settings;
use crate::validate::{Validation, Validator};

#[derive(Debug)]
pub struct PipelineOutcome {
    pub resolution: Resolution,
    pub sanity: SanityReport,
    pub artifact: ReportArtifact,
    pub validation: Validation,
}

impl PipelineOutcome {
    pub fn passed(&self) -> bool {
        self.validation.passed()
    }
    /// Consumes the outcome, turning a failed validation into
    /// [`crate::error::ChatterError::BaselineRegression`].
    pub fn into_result(self) -> Result<Resolution> {
        self.validation.into_result()?;
        Ok(self.resolution)
    }
}

/// One full run: every input is loaded before resolution starts, artifacts
/// are written atomically once it completes, and the baseline decides the
/// verdict. Rule and baseline problems abort before anything is written.
pub fn run_pipeline(settings: &Settings) -> Result<PipelineOutcome> {
    let started = Instant::now();
    let persistor = Persistor::new(settings);

    let rules = persistor.restore_rule_set()?;
    let non_company = persistor.restore_non_company_rules()?;
    let baseline = persistor.restore_baseline()?;
    let store = persistor.restore_mentions()?;

    let (store, sanity) = apply_non_company_filter(&store, &non_company);
    let resolution = Resolver::new(&rules).resolve(&store);

    persistor.persist_companies(&resolution.companies)?;
    let artifact = persistor.persist_report(&resolution, &sanity)?;

    let validation = Validator::new(&baseline)
        .with_non_company_rules(&non_company)
        .validate(&resolution.report, &resolution.companies);
    for violation in &validation.violations {
        warn!(%violation, "baseline violation");
    }
    info!(
        ms = started.elapsed().as_secs_f64() * 1000.0,
        counts = %resolution.report.counts,
        passed = validation.passed(),
        "pipeline complete"
    );
    Ok(PipelineOutcome {
        resolution,
        sanity,
        artifact,
        validation,
    })
}
