//! The orchestration command. It takes no flags: everything comes from the
//! settings, and the exit status is the validator's verdict.

use std::process::ExitCode;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use chatter::pipeline::run_pipeline;
use chatter::settings::Settings;

fn main() -> ExitCode {
    let settings = Settings::load();
    let fallback_filter = settings
        .as_ref()
        .map(|s| s.log_filter.clone())
        .unwrap_or_else(|_| String::from("info"));
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let outcome = settings.and_then(|settings| {
        info!(data_dir = %settings.data_dir.display(), "starting entity resolution");
        run_pipeline(&settings)
    });
    match outcome.and_then(|outcome| outcome.into_result()) {
        Ok(resolution) => {
            info!(companies = resolution.companies.len(), "baseline satisfied");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "entity resolution failed");
            ExitCode::FAILURE
        }
    }
}
