// JSON inputs are read fully into memory before resolution begins, and the
// artifacts are written only after it completes.
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::construct::{CanonicalCompany, ConflictRecord, MentionStore, MergedGroup, ReportCounts, Resolution};
use crate::error::{ChatterError, Result};
use crate::rules::RuleSet;
use crate::sanity::{NonCompanyRules, SanityReport};
use crate::settings::Settings;
use crate::validate::Baseline;

/// The report as written to disk. The timestamp lives only here so that
/// the resolution itself stays reproducible.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportArtifact {
    pub generated_at: String,
    pub counts: ReportCounts,
    pub conflicts: Vec<ConflictRecord>,
    pub merged_groups: Vec<MergedGroup>,
    pub sanity: SanityReport,
}

pub fn read_json(path: &Path) -> Result<Value> {
    let text = fs::read_to_string(path).map_err(|e| ChatterError::io(path, e))?;
    serde_json::from_str(&text)
        .map_err(|e| ChatterError::Serialization(format!("{}: {e}", path.display())))
}

/// Like [`read_json`], but a missing file is `None` instead of an error.
pub fn read_optional_json(path: &Path) -> Result<Option<Value>> {
    match fs::read_to_string(path) {
        Ok(text) => serde_json::from_str(&text)
            .map(Some)
            .map_err(|e| ChatterError::Serialization(format!("{}: {e}", path.display()))),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(ChatterError::io(path, e)),
    }
}

fn temporary_sibling(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| String::from("artifact"));
    path.with_file_name(format!(".{file_name}.tmp"))
}

/// Serializes `value` next to `path` and renames it into place, so readers
/// see either the previous artifact or the complete new one.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|e| ChatterError::io(parent, e))?;
    }
    let payload = serde_json::to_vec_pretty(value)?;
    let temporary = temporary_sibling(path);
    let mut file = fs::File::create(&temporary).map_err(|e| ChatterError::io(&temporary, e))?;
    let written = file
        .write_all(&payload)
        .and_then(|_| file.write_all(b"\n"))
        .and_then(|_| file.sync_all());
    drop(file);
    // a failed write or rename must not leave the temporary behind
    if let Err(e) = written {
        let _ = fs::remove_file(&temporary);
        return Err(ChatterError::io(&temporary, e));
    }
    if let Err(e) = fs::rename(&temporary, path) {
        let _ = fs::remove_file(&temporary);
        return Err(ChatterError::io(path, e));
    }
    debug!(path = %path.display(), bytes = payload.len(), "artifact written");
    Ok(())
}

// ------------- Persistence -------------
pub struct Persistor<'s> {
    settings: &'s Settings,
}

impl<'s> Persistor<'s> {
    pub fn new(settings: &'s Settings) -> Self {
        Self { settings }
    }

    pub fn restore_mentions(&self) -> Result<MentionStore> {
        let path = self.settings.mentions_path();
        let payload = read_json(&path)?;
        let records = payload.as_array().ok_or_else(|| {
            ChatterError::Serialization(format!("{} must contain a JSON list of mentions", path.display()))
        })?;
        let store = MentionStore::from_records(records);
        info!(
            path = %path.display(),
            mentions = store.len(),
            dropped_mention_rows = store.dropped_mention_rows(),
            dropped_quote_rows = store.dropped_quote_rows(),
            "mentions restored"
        );
        Ok(store)
    }

    pub fn restore_rule_set(&self) -> Result<RuleSet> {
        let empty = Value::Array(Vec::new());
        let aliases = read_optional_json(&self.settings.alias_rules_path())?.unwrap_or_else(|| empty.clone());
        let blocks = read_optional_json(&self.settings.block_rules_path())?.unwrap_or(empty);
        RuleSet::from_json(&aliases, &blocks)
    }

    pub fn restore_non_company_rules(&self) -> Result<NonCompanyRules> {
        match read_optional_json(&self.settings.non_company_rules_path())? {
            Some(payload) => NonCompanyRules::from_json(&payload),
            None => Ok(NonCompanyRules::empty()),
        }
    }

    pub fn restore_baseline(&self) -> Result<Baseline> {
        let path = self.settings.baseline_path();
        let payload = read_json(&path)?;
        serde_json::from_value(payload)
            .map_err(|e| ChatterError::Serialization(format!("{}: {e}", path.display())))
    }

    pub fn persist_companies(&self, companies: &[CanonicalCompany]) -> Result<()> {
        write_json_atomic(&self.settings.companies_path(), companies)
    }

    pub fn persist_report(&self, resolution: &Resolution, sanity: &SanityReport) -> Result<ReportArtifact> {
        let artifact = ReportArtifact {
            generated_at: Utc::now().to_rfc3339(),
            counts: resolution.report.counts,
            conflicts: resolution.report.conflicts.clone(),
            merged_groups: resolution.merged_groups(),
            sanity: sanity.clone(),
        };
        write_json_atomic(&self.settings.report_path(), &artifact)?;
        Ok(artifact)
    }
}
