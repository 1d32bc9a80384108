//! Non-company label rules.
//!
//! Extraction occasionally promotes section headings, commentary lines or
//! people to company names. Before resolution the pipeline removes raw names
//! that a curated rule file (or the topic/sentence heuristic) marks as
//! non-company labels. Removals are counted and reported, never silent. The
//! validator applies the same rules to the canonical output as a guardrail.

use std::collections::{BTreeSet, HashSet};

use lazy_static::lazy_static;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::construct::{MentionStore, NameHasher};
use crate::error::{ChatterError, Result};
use crate::key::loose_name_key;

lazy_static! {
    static ref LABEL_WORD: Regex = Regex::new(r"[A-Za-z0-9&'.-]+").unwrap();
    static ref COMMENTS_ON: Regex = Regex::new(r"\bcomments?\s+on\b").unwrap();
}

const COMPANY_HINT_TOKENS: [&str; 37] = [
    "bank",
    "bancorp",
    "bancshares",
    "beverages",
    "bio",
    "biosciences",
    "capital",
    "chemicals",
    "company",
    "communications",
    "corp",
    "corporation",
    "energy",
    "engineering",
    "financial",
    "foods",
    "group",
    "holding",
    "holdings",
    "inc",
    "industries",
    "insurance",
    "international",
    "labs",
    "limited",
    "ltd",
    "motors",
    "pharma",
    "pharmaceuticals",
    "plc",
    "private",
    "pvt",
    "retail",
    "sa",
    "systems",
    "technologies",
    "technology",
];

const SENTENCE_START_TOKENS: [&str; 14] = [
    "we",
    "we've",
    "our",
    "this",
    "that",
    "these",
    "those",
    "broader",
    "sectoral",
    "check",
    "have",
    "introducing",
    "given",
    "are",
];

/// True for labels that read like a topic heading or a sentence rather
/// than a company name ("Finance Minister on the budget", "We think that ...").
pub fn looks_like_topic_or_sentence(name: &str) -> bool {
    let words: Vec<String> = LABEL_WORD
        .find_iter(name)
        .map(|m| m.as_str().to_lowercase())
        .collect();
    let Some(first_word) = words.first() else {
        return false;
    };
    if SENTENCE_START_TOKENS.contains(&first_word.as_str()) && words.len() > 4 {
        return true;
    }
    if COMMENTS_ON.is_match(&words.join(" ")) {
        return true;
    }
    let has_on = words.iter().any(|w| w == "on");
    let has_hint = words.iter().any(|w| COMPANY_HINT_TOKENS.contains(&w.as_str()));
    if has_on && words.len() >= 4 && !has_hint {
        return true;
    }
    has_on && words.iter().any(|w| w == "minister" || w == "secretary")
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct NonCompanyFile {
    #[serde(default)]
    exact_names: Vec<String>,
    #[serde(default)]
    allow_names: Vec<String>,
    #[serde(default)]
    name_patterns: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct NonCompanyRules {
    exact_name_keys: HashSet<String, NameHasher>,
    allow_name_keys: HashSet<String, NameHasher>,
    name_patterns: Vec<Regex>,
}

impl NonCompanyRules {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(exact_names: &[String], allow_names: &[String], name_patterns: &[String]) -> Result<Self> {
        let keys = |names: &[String]| -> HashSet<String, NameHasher> {
            names
                .iter()
                .filter(|n| !n.trim().is_empty())
                .map(|n| loose_name_key(n))
                .collect()
        };
        let mut compiled = Vec::new();
        for (index, pattern) in name_patterns.iter().enumerate() {
            let pattern = pattern.trim();
            if pattern.is_empty() {
                continue;
            }
            let regex = RegexBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .map_err(|e| ChatterError::MalformedRule {
                    source_name: String::from("non-company name_patterns"),
                    index,
                    message: e.to_string(),
                })?;
            compiled.push(regex);
        }
        Ok(Self {
            exact_name_keys: keys(exact_names),
            allow_name_keys: keys(allow_names),
            name_patterns: compiled,
        })
    }

    pub fn from_json(payload: &Value) -> Result<Self> {
        let file: NonCompanyFile =
            serde_json::from_value(payload.clone()).map_err(|e| ChatterError::MalformedRule {
                source_name: String::from("non-company rules"),
                index: 0,
                message: e.to_string(),
            })?;
        Self::new(&file.exact_names, &file.allow_names, &file.name_patterns)
    }

    pub fn is_allowed(&self, name: &str) -> bool {
        self.allow_name_keys.contains(&loose_name_key(name))
    }

    /// Rule-file match only; allow-listed names never match.
    pub fn matches(&self, name: &str) -> bool {
        let name_key = loose_name_key(name);
        if self.allow_name_keys.contains(&name_key) {
            return false;
        }
        self.exact_name_keys.contains(&name_key) || self.name_patterns.iter().any(|p| p.is_match(name))
    }

    /// Rule-file match or the topic/sentence heuristic, unless allow-listed.
    pub fn rejects(&self, name: &str) -> bool {
        !self.is_allowed(name) && (self.matches(name) || looks_like_topic_or_sentence(name))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SanityReport {
    pub removed_company_names: Vec<String>,
    pub removed_companies: usize,
    pub removed_mention_rows: usize,
    pub removed_quote_rows: usize,
}

/// Drops every mention whose raw name is rejected by `rules`.
pub fn apply_non_company_filter(store: &MentionStore, rules: &NonCompanyRules) -> (MentionStore, SanityReport) {
    let mut removed = BTreeSet::new();
    let mut report = SanityReport::default();
    let kept = store.retain(|mention| {
        if !rules.rejects(mention.raw_name()) {
            return true;
        }
        removed.insert(mention.raw_name().to_string());
        report.removed_mention_rows += 1;
        if mention.has_quote() {
            report.removed_quote_rows += 1;
        }
        false
    });
    report.removed_companies = removed.len();
    report.removed_company_names = removed.into_iter().collect();
    if report.removed_companies > 0 {
        warn!(
            companies = report.removed_companies,
            mentions = report.removed_mention_rows,
            quotes = report.removed_quote_rows,
            "removed non-company labels"
        );
    }
    (kept, report)
}
