//! Regression gate over a finished resolution run.
//!
//! The [`Baseline`] is a committed, reviewed file: the report counts of an
//! accepted run, the slack allowed on each metric, and a list of invariants
//! (pairs that must merge, pairs that must stay apart, companies that must
//! carry mentions from given editions). A passing run never rewrites it.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::construct::{CanonicalCompany, Lookup, NameHasher, ReportCounts, ResolutionReport};
use crate::error::{ChatterError, Result};
use crate::key::loose_name_key;
use crate::sanity::{NonCompanyRules, looks_like_topic_or_sentence};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Thresholds {
    pub max_market_conflicts: Option<usize>,
    pub max_quarantined_companies: Option<usize>,
    pub max_repeat_name_keys: Option<usize>,
    // dropped rows must be zero whatever these say
    pub max_dropped_quote_rows: Option<usize>,
    pub max_dropped_mention_rows: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompanyExpectation {
    pub company_name: Option<String>,
    pub company_id: Option<String>,
    pub min_edition_count: usize,
    pub required_edition_ids: Vec<String>,
}

impl CompanyExpectation {
    fn label(&self) -> String {
        self.company_id
            .clone()
            .or_else(|| self.company_name.clone())
            .unwrap_or_default()
    }
    fn find<'c>(&self, companies: &'c [CanonicalCompany]) -> Option<&'c CanonicalCompany> {
        if let Some(id) = self.company_id.as_deref() {
            return companies.iter().find(|c| c.id == id);
        }
        let name = self.company_name.as_deref()?.trim();
        companies
            .iter()
            .find(|c| c.display_name == name)
            .or_else(|| companies.iter().find(|c| c.contains_member(name)))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Baseline {
    pub report: Option<ReportCounts>,
    pub allowed_deltas: BTreeMap<String, usize>,
    pub thresholds: Thresholds,
    pub must_keep_alias_pairs_merged: Vec<(String, String)>,
    pub must_keep_blocked_pairs_separate: Vec<(String, String)>,
    pub must_not_coexist_in_index: Vec<(String, String)>,
    pub must_exclude_company_names: Vec<String>,
    #[serde(alias = "allowed_suspicious_null_url_names")]
    pub allowed_suspicious_names: Vec<String>,
    pub critical_company_expectations: Vec<CompanyExpectation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Violation {
    AliasPairNotMerged { a: String, b: String },
    BlockedPairMerged { a: String, b: String, company_id: String },
    VisiblePairCoexists { a: String, b: String },
    ExcludedNameVisible { name: String },
    NonCompanyLabel { name: String },
    SuspiciousLabel { name: String },
    MissingCompany { company: String },
    EditionCountRegressed { company: String, actual: usize, required: usize },
    MissingEdition { company: String, edition_id: String },
    MemberLeakage { raw_name: String, company_ids: Vec<String> },
    DroppedRows { metric: String, count: usize },
    ThresholdExceeded { metric: String, actual: usize, limit: usize },
    MetricRegressed { metric: String, baseline: usize, actual: usize, allowed_delta: usize },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Violation::AliasPairNotMerged { a, b } => write!(f, "alias pair not merged: {a} + {b}"),
            Violation::BlockedPairMerged { a, b, company_id } => {
                write!(f, "blocked pair merged unexpectedly: {a} + {b} in {company_id}")
            }
            Violation::VisiblePairCoexists { a, b } => {
                write!(f, "duplicate visible pair detected: {a} + {b}")
            }
            Violation::ExcludedNameVisible { name } => {
                write!(f, "excluded non-company label visible: {name}")
            }
            Violation::NonCompanyLabel { name } => {
                write!(f, "non-company rule label present in canonical companies: {name}")
            }
            Violation::SuspiciousLabel { name } => {
                write!(f, "suspicious company label without market key: {name}")
            }
            Violation::MissingCompany { company } => {
                write!(f, "missing critical company in canonical output: {company}")
            }
            Violation::EditionCountRegressed { company, actual, required } => {
                write!(f, "{company} edition_count regressed: {actual} < required {required}")
            }
            Violation::MissingEdition { company, edition_id } => {
                write!(f, "{company} missing required edition: {edition_id}")
            }
            Violation::MemberLeakage { raw_name, company_ids } => write!(
                f,
                "raw name {raw_name} attributed to several companies: {}",
                company_ids.join(", ")
            ),
            Violation::DroppedRows { metric, count } => {
                write!(f, "{metric} must be zero, found {count}")
            }
            Violation::ThresholdExceeded { metric, actual, limit } => {
                write!(f, "{metric} regressed: {actual} > allowed {limit}")
            }
            Violation::MetricRegressed { metric, baseline, actual, allowed_delta } => write!(
                f,
                "{metric} moved from baseline {baseline} to {actual} (allowed delta {allowed_delta})"
            ),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validation {
    pub violations: Vec<Violation>,
}

impl Validation {
    pub fn passed(&self) -> bool {
        self.violations.is_empty()
    }
    pub fn into_result(self) -> Result<()> {
        if self.passed() {
            Ok(())
        } else {
            Err(ChatterError::BaselineRegression {
                violations: self.violations,
            })
        }
    }
}

// metrics where a larger value is always worse
const WORSE_WHEN_HIGHER: [&str; 5] = [
    "market_conflicts",
    "quarantined_companies",
    "repeat_name_keys",
    "dropped_quote_rows",
    "dropped_mention_rows",
];

pub struct Validator<'b> {
    baseline: &'b Baseline,
    non_company: Option<&'b NonCompanyRules>,
}

impl<'b> Validator<'b> {
    pub fn new(baseline: &'b Baseline) -> Self {
        Self {
            baseline,
            non_company: None,
        }
    }
    pub fn with_non_company_rules(mut self, rules: &'b NonCompanyRules) -> Self {
        self.non_company = Some(rules);
        self
    }

    pub fn validate(&self, report: &ResolutionReport, companies: &[CanonicalCompany]) -> Validation {
        let mut violations = Vec::new();
        self.check_dropped_rows(&report.counts, &mut violations);
        self.check_thresholds(&report.counts, &mut violations);
        self.check_metric_regressions(&report.counts, &mut violations);
        self.check_pairs(companies, &mut violations);
        self.check_labels(companies, &mut violations);
        self.check_expectations(companies, &mut violations);
        check_member_leakage(companies, &mut violations);
        info!(violations = violations.len(), "validation complete");
        Validation { violations }
    }

    fn check_dropped_rows(&self, counts: &ReportCounts, violations: &mut Vec<Violation>) {
        for (metric, count) in [
            ("dropped_quote_rows", counts.dropped_quote_rows),
            ("dropped_mention_rows", counts.dropped_mention_rows),
        ] {
            if count > 0 {
                violations.push(Violation::DroppedRows {
                    metric: metric.to_string(),
                    count,
                });
            }
        }
    }

    fn check_thresholds(&self, counts: &ReportCounts, violations: &mut Vec<Violation>) {
        let thresholds = &self.baseline.thresholds;
        for (metric, limit, actual) in [
            ("market_conflicts", thresholds.max_market_conflicts, counts.market_conflicts),
            ("quarantined_companies", thresholds.max_quarantined_companies, counts.quarantined_companies),
            ("repeat_name_keys", thresholds.max_repeat_name_keys, counts.repeat_name_keys),
        ] {
            if let Some(limit) = limit
                && actual > limit
            {
                violations.push(Violation::ThresholdExceeded {
                    metric: metric.to_string(),
                    actual,
                    limit,
                });
            }
        }
    }

    fn check_metric_regressions(&self, counts: &ReportCounts, violations: &mut Vec<Violation>) {
        let Some(committed) = &self.baseline.report else {
            return;
        };
        let committed = committed.metrics();
        for (index, (metric, actual)) in counts.metrics().into_iter().enumerate() {
            let baseline = committed[index].1;
            let delta = self.baseline.allowed_deltas.get(metric).copied();
            let regressed = if WORSE_WHEN_HIGHER.contains(&metric) {
                actual > baseline + delta.unwrap_or(0)
            } else {
                // size metrics only drift-checked when a slack is recorded
                delta.is_some_and(|d| actual.abs_diff(baseline) > d)
            };
            if regressed {
                violations.push(Violation::MetricRegressed {
                    metric: metric.to_string(),
                    baseline,
                    actual,
                    allowed_delta: delta.unwrap_or(0),
                });
            }
        }
    }

    fn check_pairs(&self, companies: &[CanonicalCompany], violations: &mut Vec<Violation>) {
        let present = |name: &str| companies.iter().any(|c| c.answers_to(name));
        let together = |a: &str, b: &str| companies.iter().find(|c| c.answers_to(a) && c.answers_to(b));

        for (a, b) in &self.baseline.must_keep_alias_pairs_merged {
            if !(present(a.as_str()) && present(b.as_str())) {
                debug!(a = %a, b = %b, "alias pair not present in this run; skipped");
                continue;
            }
            if together(a.as_str(), b.as_str()).is_none() {
                violations.push(Violation::AliasPairNotMerged {
                    a: a.clone(),
                    b: b.clone(),
                });
            }
        }
        for (a, b) in &self.baseline.must_keep_blocked_pairs_separate {
            if let Some(company) = together(a.as_str(), b.as_str()) {
                violations.push(Violation::BlockedPairMerged {
                    a: a.clone(),
                    b: b.clone(),
                    company_id: company.id.clone(),
                });
            }
        }
        let visible: HashSet<&str, NameHasher> =
            companies.iter().map(|c| c.display_name.as_str()).collect();
        for (a, b) in &self.baseline.must_not_coexist_in_index {
            if visible.contains(a.as_str()) && visible.contains(b.as_str()) {
                violations.push(Violation::VisiblePairCoexists {
                    a: a.clone(),
                    b: b.clone(),
                });
            }
        }
    }

    fn check_labels(&self, companies: &[CanonicalCompany], violations: &mut Vec<Violation>) {
        let excluded: HashSet<String, NameHasher> = self
            .baseline
            .must_exclude_company_names
            .iter()
            .filter(|n| !n.trim().is_empty())
            .map(|n| loose_name_key(n))
            .collect();
        let allowed: HashSet<String, NameHasher> = self
            .baseline
            .allowed_suspicious_names
            .iter()
            .filter(|n| !n.trim().is_empty())
            .map(|n| loose_name_key(n))
            .collect();

        for company in companies {
            let name = &company.display_name;
            let name_key = loose_name_key(name);
            if excluded.contains(&name_key) {
                violations.push(Violation::ExcludedNameVisible { name: name.clone() });
            }
            if allowed.contains(&name_key) {
                continue;
            }
            if self.non_company.is_some_and(|rules| rules.matches(name)) {
                violations.push(Violation::NonCompanyLabel { name: name.clone() });
            } else if company.market_key.is_none() && looks_like_topic_or_sentence(name) {
                violations.push(Violation::SuspiciousLabel { name: name.clone() });
            }
        }
    }

    fn check_expectations(&self, companies: &[CanonicalCompany], violations: &mut Vec<Violation>) {
        for expectation in &self.baseline.critical_company_expectations {
            let label = expectation.label();
            if label.trim().is_empty() {
                continue;
            }
            let Some(company) = expectation.find(companies) else {
                violations.push(Violation::MissingCompany { company: label });
                continue;
            };
            let editions: BTreeSet<&str> = company.edition_ids().into_iter().collect();
            if editions.len() < expectation.min_edition_count {
                violations.push(Violation::EditionCountRegressed {
                    company: label.clone(),
                    actual: editions.len(),
                    required: expectation.min_edition_count,
                });
            }
            for edition_id in &expectation.required_edition_ids {
                let edition_id = edition_id.trim();
                if !edition_id.is_empty() && !editions.contains(edition_id) {
                    violations.push(Violation::MissingEdition {
                        company: label.clone(),
                        edition_id: edition_id.to_string(),
                    });
                }
            }
        }
    }
}

fn check_member_leakage(companies: &[CanonicalCompany], violations: &mut Vec<Violation>) {
    let mut owners: Lookup<&str, &str> = Lookup::new();
    for company in companies {
        for raw_name in &company.member_raw_names {
            owners.insert(raw_name.as_str(), company.id.as_str());
        }
    }
    let mut leaks: Vec<Violation> = owners
        .iter()
        .filter(|(_, ids)| ids.len() > 1)
        .map(|(raw_name, ids)| Violation::MemberLeakage {
            raw_name: raw_name.to_string(),
            company_ids: ids.iter().map(|id| id.to_string()).collect(),
        })
        .collect();
    leaks.sort_by(|a, b| a.to_string().cmp(&b.to_string()));
    violations.extend(leaks);
}

pub fn validate(report: &ResolutionReport, companies: &[CanonicalCompany], baseline: &Baseline) -> Validation {
    Validator::new(baseline).validate(report, companies)
}
