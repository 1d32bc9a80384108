use std::path::{Path, PathBuf};

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Where the orchestration command finds its inputs and writes its artifacts.
///
/// Assembled from built-in defaults, then an optional `chatter.*` file in the
/// working directory, then `CHATTER_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub mentions_file: PathBuf,
    pub alias_rules_file: PathBuf,
    pub block_rules_file: PathBuf,
    pub non_company_rules_file: PathBuf,
    pub baseline_file: PathBuf,
    pub companies_output: PathBuf,
    pub report_output: PathBuf,
    pub log_filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self::in_dir("data")
    }
}

impl Settings {
    pub fn load() -> Result<Self> {
        // defaults come from `Settings::default`, the one place they are spelled out
        let settings = Config::builder()
            .add_source(Config::try_from(&Settings::default())?)
            .add_source(File::with_name("chatter").required(false))
            .add_source(Environment::with_prefix("CHATTER"))
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }

    /// Default file names rooted at `data_dir`.
    pub fn in_dir(data_dir: impl AsRef<Path>) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            mentions_file: PathBuf::from("company_mentions.json"),
            alias_rules_file: PathBuf::from("alias_rules.json"),
            block_rules_file: PathBuf::from("block_rules.json"),
            non_company_rules_file: PathBuf::from("non_company_rules.json"),
            baseline_file: PathBuf::from("entity_resolution_baseline.json"),
            companies_output: PathBuf::from("companies.json"),
            report_output: PathBuf::from("entity_resolution_report.json"),
            log_filter: String::from("info"),
        }
    }

    /// Relative paths are taken relative to `data_dir`.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.data_dir.join(path)
        }
    }
    pub fn mentions_path(&self) -> PathBuf {
        self.resolve(&self.mentions_file)
    }
    pub fn alias_rules_path(&self) -> PathBuf {
        self.resolve(&self.alias_rules_file)
    }
    pub fn block_rules_path(&self) -> PathBuf {
        self.resolve(&self.block_rules_file)
    }
    pub fn non_company_rules_path(&self) -> PathBuf {
        self.resolve(&self.non_company_rules_file)
    }
    pub fn baseline_path(&self) -> PathBuf {
        self.resolve(&self.baseline_file)
    }
    pub fn companies_path(&self) -> PathBuf {
        self.resolve(&self.companies_output)
    }
    pub fn report_path(&self) -> PathBuf {
        self.resolve(&self.report_output)
    }
}
