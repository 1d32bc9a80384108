// Fundamental constructs of a resolution run: the raw mentions going in and
// the canonical companies, conflict records and report coming out.

// other lookups use HashSet or HashMap keyed by names, hashed with seahash
use core::hash::{BuildHasher, BuildHasherDefault};
use seahash::SeaHasher;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::hash::Hash;

// used to print out readable forms of a construct
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::key::CanonicalKey;

pub type NameHasher = BuildHasherDefault<SeaHasher>;

// ------------- Mention -------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mention {
    #[serde(alias = "name")]
    raw_name: String,
    edition_id: String,
    #[serde(default)]
    market_key: Option<String>,
    #[serde(default)]
    has_quote: bool,
    #[serde(default)]
    has_context: bool,
}

impl Mention {
    pub fn new(raw_name: &str, edition_id: &str) -> Self {
        Self {
            raw_name: raw_name.trim().to_string(),
            edition_id: edition_id.trim().to_string(),
            market_key: None,
            has_quote: false,
            has_context: false,
        }
    }
    pub fn with_market_key(mut self, market_key: &str) -> Self {
        let market_key = market_key.trim();
        self.market_key = (!market_key.is_empty()).then(|| market_key.to_string());
        self
    }
    pub fn with_quote(mut self) -> Self {
        self.has_quote = true;
        self
    }
    pub fn with_context(mut self) -> Self {
        self.has_context = true;
        self
    }
    /// Strictly types one extracted record. The error names what was wrong
    /// with the record so the caller can log it.
    pub fn from_record(record: &Value) -> Result<Self, String> {
        if !record.is_object() {
            return Err(String::from("record is not an object"));
        }
        let parsed: Mention = serde_json::from_value(record.clone()).map_err(|e| e.to_string())?;
        if parsed.raw_name.trim().is_empty() {
            return Err(String::from("blank raw_name"));
        }
        if parsed.edition_id.trim().is_empty() {
            return Err(String::from("blank edition_id"));
        }
        let mut mention = Mention::new(&parsed.raw_name, &parsed.edition_id);
        if let Some(market_key) = parsed.market_key.as_deref() {
            mention = mention.with_market_key(market_key);
        }
        mention.has_quote = parsed.has_quote;
        mention.has_context = parsed.has_context;
        Ok(mention)
    }
    // It's intentional to keep the fields private and only expose
    // getters, since a mention is immutable once extracted.
    pub fn raw_name(&self) -> &str {
        &self.raw_name
    }
    pub fn edition_id(&self) -> &str {
        &self.edition_id
    }
    pub fn market_key(&self) -> Option<&str> {
        self.market_key.as_deref()
    }
    pub fn has_quote(&self) -> bool {
        self.has_quote
    }
    pub fn has_context(&self) -> bool {
        self.has_context
    }
}

impl fmt::Display for Mention {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}@{}", self.raw_name, self.edition_id)
    }
}

// ------------- MentionStore -------------
/// The ordered mention collection handed over by extraction, together with
/// the number of records that could not be typed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MentionStore {
    mentions: Vec<Mention>,
    dropped_mention_rows: usize,
    dropped_quote_rows: usize,
}

impl MentionStore {
    pub fn new(mentions: Vec<Mention>) -> Self {
        Self {
            mentions,
            dropped_mention_rows: 0,
            dropped_quote_rows: 0,
        }
    }
    /// Types every record; each malformed record is counted exactly once,
    /// as a quote row when it claims to carry a quote, else as a mention row.
    pub fn from_records(records: &[Value]) -> Self {
        let mut store = Self::default();
        for (index, record) in records.iter().enumerate() {
            match Mention::from_record(record) {
                Ok(mention) => store.mentions.push(mention),
                Err(reason) => {
                    let quote_row = record
                        .get("has_quote")
                        .and_then(Value::as_bool)
                        .unwrap_or(false);
                    if quote_row {
                        store.dropped_quote_rows += 1;
                    } else {
                        store.dropped_mention_rows += 1;
                    }
                    tracing::warn!(index, quote_row, %reason, "malformed mention record dropped");
                }
            }
        }
        store
    }
    pub fn mentions(&self) -> &[Mention] {
        &self.mentions
    }
    pub fn len(&self) -> usize {
        self.mentions.len()
    }
    pub fn is_empty(&self) -> bool {
        self.mentions.is_empty()
    }
    pub fn dropped_mention_rows(&self) -> usize {
        self.dropped_mention_rows
    }
    pub fn dropped_quote_rows(&self) -> usize {
        self.dropped_quote_rows
    }
    /// Keeps only the mentions accepted by `keep`, carrying the malformed
    /// counters over unchanged.
    pub fn retain<F: FnMut(&Mention) -> bool>(&self, mut keep: F) -> Self {
        Self {
            mentions: self.mentions.iter().filter(|&m| keep(m)).cloned().collect(),
            dropped_mention_rows: self.dropped_mention_rows,
            dropped_quote_rows: self.dropped_quote_rows,
        }
    }
}

// ------------- CanonicalCompany -------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalCompany {
    pub id: String,
    pub display_name: String,
    pub key: CanonicalKey,
    pub member_raw_names: BTreeSet<String>,
    pub mentions: Vec<Mention>,
    pub market_key: Option<String>,
    #[serde(default)]
    pub quarantined: bool,
}

impl CanonicalCompany {
    pub fn contains_member(&self, raw_name: &str) -> bool {
        self.member_raw_names.contains(raw_name)
    }
    /// A company answers to its display name as well as its members.
    pub fn answers_to(&self, name: &str) -> bool {
        self.display_name == name || self.contains_member(name)
    }
    /// Edition ids in order of first appearance, which for an archive read
    /// oldest to newest is also chronological.
    pub fn edition_ids(&self) -> Vec<&str> {
        let mut seen = HashSet::<&str, NameHasher>::default();
        self.mentions
            .iter()
            .map(Mention::edition_id)
            .filter(|e| seen.insert(*e))
            .collect()
    }
    pub fn quote_count(&self) -> usize {
        self.mentions.iter().filter(|m| m.has_quote()).count()
    }
    pub fn has_quotes(&self) -> bool {
        self.quote_count() > 0
    }
}

impl fmt::Display for CanonicalCompany {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let members: Vec<&str> = self.member_raw_names.iter().map(String::as_str).collect();
        write!(f, "{} \"{}\" {{{}}}", self.id, self.display_name, members.join(", "))
    }
}

// ------------- ConflictRecord -------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictReason {
    BlockViolation,
    MarketKeyMismatch,
    AmbiguousAcronym,
}

impl fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            ConflictReason::BlockViolation => "block_violation",
            ConflictReason::MarketKeyMismatch => "market_key_mismatch",
            ConflictReason::AmbiguousAcronym => "ambiguous_acronym",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictRecord {
    pub candidate_names: BTreeSet<String>,
    pub reason: ConflictReason,
    pub involved_mentions: Vec<Mention>,
}

// ------------- Report -------------
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportCounts {
    pub input_companies: usize,
    pub canonical_companies: usize,
    pub market_conflicts: usize,
    pub quarantined_companies: usize,
    pub repeat_name_keys: usize,
    pub dropped_quote_rows: usize,
    pub dropped_mention_rows: usize,
}

impl ReportCounts {
    pub fn metrics(&self) -> [(&'static str, usize); 7] {
        [
            ("input_companies", self.input_companies),
            ("canonical_companies", self.canonical_companies),
            ("market_conflicts", self.market_conflicts),
            ("quarantined_companies", self.quarantined_companies),
            ("repeat_name_keys", self.repeat_name_keys),
            ("dropped_quote_rows", self.dropped_quote_rows),
            ("dropped_mention_rows", self.dropped_mention_rows),
        ]
    }
}

impl fmt::Display for ReportCounts {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let parts: Vec<String> = self
            .metrics()
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect();
        write!(f, "{}", parts.join(" "))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionReport {
    pub counts: ReportCounts,
    pub conflicts: Vec<ConflictRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergedGroup {
    pub id: String,
    pub display_name: String,
    pub members: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    pub companies: Vec<CanonicalCompany>,
    pub report: ResolutionReport,
}

impl Resolution {
    pub fn company(&self, id: &str) -> Option<&CanonicalCompany> {
        self.companies.iter().find(|c| c.id == id)
    }
    pub fn company_named(&self, display_name: &str) -> Option<&CanonicalCompany> {
        self.companies.iter().find(|c| c.display_name == display_name)
    }
    pub fn company_containing(&self, raw_name: &str) -> Option<&CanonicalCompany> {
        self.companies.iter().find(|c| c.contains_member(raw_name))
    }
    /// Every company that absorbed more than one raw name.
    pub fn merged_groups(&self) -> Vec<MergedGroup> {
        self.companies
            .iter()
            .filter(|c| c.member_raw_names.len() > 1)
            .map(|c| MergedGroup {
                id: c.id.clone(),
                display_name: c.display_name.clone(),
                members: c.member_raw_names.iter().cloned().collect(),
            })
            .collect()
    }
}

// ------------- Lookups -------------
#[derive(Debug)]
pub struct Lookup<K, V, H = NameHasher> {
    index: HashMap<K, BTreeSet<V>, H>,
}
impl<K: Eq + Hash, V: Ord, H: BuildHasher + Default> Lookup<K, V, H> {
    pub fn new() -> Self {
        Self {
            index: HashMap::<K, BTreeSet<V>, H>::default(),
        }
    }
    pub fn insert(&mut self, key: K, value: V) {
        self.index.entry(key).or_default().insert(value);
    }
    pub fn lookup(&self, key: &K) -> Option<&BTreeSet<V>> {
        self.index.get(key)
    }
    pub fn iter(&self) -> impl Iterator<Item = (&K, &BTreeSet<V>)> {
        self.index.iter()
    }
}
impl<K: Eq + Hash, V: Ord, H: BuildHasher + Default> Default for Lookup<K, V, H> {
    fn default() -> Self {
        Self::new()
    }
}
