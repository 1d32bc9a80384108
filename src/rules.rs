//! Declarative alias ("must merge") and block ("must never merge") rules.
//!
//! Rule files are loosely typed JSON lists. Every entry is parsed into a
//! strictly typed rule at load time and a [`RuleSet`] is only handed out once
//! the whole collection is internally consistent:
//!
//! * an alias source may point at exactly one target,
//! * following alias edges never returns to a name already visited
//!   ([`ChatterError::Cycle`]),
//! * no block pair has one side reachable from the other through alias edges,
//!   and no block pair repeats an alias rule between two spellings of one key
//!   ([`ChatterError::RuleConflict`]).
//!
//! Names are matched through their [`CanonicalKey`], so a rule written for
//! `SBI` also applies to `S.B.I.`. A block pair whose two names share a key
//! can only be told apart by their exact raw names and is stored as such.
//!
//! The resulting rule set is immutable and passed explicitly to the resolver.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::construct::NameHasher;
use crate::error::{ChatterError, Result};
use crate::key::{CanonicalKey, canonical_key};

/// Any mention whose name (or key) matches `from` joins the cluster rooted at `to`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AliasRule {
    pub from: String,
    pub to: String,
}

impl AliasRule {
    pub fn new(from: &str, to: &str) -> Self {
        Self {
            from: from.trim().to_string(),
            to: to.trim().to_string(),
        }
    }
}

/// An unordered pair of names that must never share a canonical company.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockRule {
    #[serde(rename = "a")]
    pub name_a: String,
    #[serde(rename = "b")]
    pub name_b: String,
}

impl BlockRule {
    pub fn new(name_a: &str, name_b: &str) -> Self {
        Self {
            name_a: name_a.trim().to_string(),
            name_b: name_b.trim().to_string(),
        }
    }
}

// an alias file entry may declare a whole group: {"from": ["SBI", "S.B.I"], "to": "..."}
#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct AliasEntry {
    from: OneOrMany,
    to: String,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct BlockEntry {
    a: String,
    b: String,
}

fn entries<'v>(payload: &'v Value, source_name: &str) -> Result<&'v Vec<Value>> {
    payload.as_array().ok_or_else(|| {
        ChatterError::Serialization(format!("{source_name} must contain a JSON list of rules"))
    })
}

fn malformed(source_name: &str, index: usize, message: impl ToString) -> ChatterError {
    ChatterError::MalformedRule {
        source_name: source_name.to_string(),
        index,
        message: message.to_string(),
    }
}

pub fn parse_alias_rules(payload: &Value, source_name: &str) -> Result<Vec<AliasRule>> {
    let mut rules = Vec::new();
    for (index, entry) in entries(payload, source_name)?.iter().enumerate() {
        let entry: AliasEntry =
            serde_json::from_value(entry.clone()).map_err(|e| malformed(source_name, index, e))?;
        let sources = match entry.from {
            OneOrMany::One(from) => vec![from],
            OneOrMany::Many(group) => group,
        };
        if sources.is_empty() {
            return Err(malformed(source_name, index, "alias group has no sources"));
        }
        for from in sources {
            if from.trim().is_empty() || entry.to.trim().is_empty() {
                return Err(malformed(source_name, index, "blank alias name"));
            }
            rules.push(AliasRule::new(&from, &entry.to));
        }
    }
    Ok(rules)
}

pub fn parse_block_rules(payload: &Value, source_name: &str) -> Result<Vec<BlockRule>> {
    let mut rules = Vec::new();
    for (index, entry) in entries(payload, source_name)?.iter().enumerate() {
        let entry: BlockEntry =
            serde_json::from_value(entry.clone()).map_err(|e| malformed(source_name, index, e))?;
        if entry.a.trim().is_empty() || entry.b.trim().is_empty() {
            return Err(malformed(source_name, index, "blank block name"));
        }
        rules.push(BlockRule::new(&entry.a, &entry.b));
    }
    Ok(rules)
}

fn ordered<T: Ord>(a: T, b: T) -> (T, T) {
    if a <= b { (a, b) } else { (b, a) }
}

#[derive(Debug, Clone)]
struct AliasTarget {
    key: CanonicalKey,
    name: String,
}

#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    aliases: Vec<AliasRule>,
    blocks: Vec<BlockRule>,
    // direct edges, from key -> to key
    edges: BTreeMap<CanonicalKey, CanonicalKey>,
    // transitively resolved targets
    targets: BTreeMap<CanonicalKey, AliasTarget>,
    // first spelling seen for every key named by a rule, used for display and errors
    labels: BTreeMap<CanonicalKey, String>,
    // keys that are the `to` side of some rule
    canonical_names: BTreeMap<CanonicalKey, String>,
    blocked_keys: HashSet<(CanonicalKey, CanonicalKey), NameHasher>,
    blocked_names: HashSet<(String, String), NameHasher>,
    // raw-name pairs of alias rules whose two sides already share a key
    same_key_aliases: HashSet<(String, String), NameHasher>,
}

impl RuleSet {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(aliases: Vec<AliasRule>, blocks: Vec<BlockRule>) -> Result<Self> {
        let mut rules = Self::default();

        for (index, rule) in aliases.iter().enumerate() {
            if rule.from.trim().is_empty() || rule.to.trim().is_empty() {
                return Err(malformed("alias rules", index, "blank alias name"));
            }
            let from_key = canonical_key(&rule.from);
            let to_key = canonical_key(&rule.to);
            rules.labels.entry(from_key.clone()).or_insert_with(|| rule.from.clone());
            rules.labels.entry(to_key.clone()).or_insert_with(|| rule.to.clone());
            rules
                .canonical_names
                .entry(to_key.clone())
                .or_insert_with(|| rule.to.clone());
            if from_key == to_key {
                debug!(from = %rule.from, to = %rule.to, "alias rule maps a name onto its own key");
                rules
                    .same_key_aliases
                    .insert(ordered(rule.from.trim().to_string(), rule.to.trim().to_string()));
                continue;
            }
            if let Some(existing) = rules.edges.get(&from_key) {
                if *existing != to_key {
                    return Err(ChatterError::DuplicateAlias {
                        from: rule.from.clone(),
                        first: rules.label(existing),
                        second: rule.to.clone(),
                    });
                }
                continue;
            }
            rules.edges.insert(from_key, to_key);
        }

        let mut targets = BTreeMap::new();
        for from_key in rules.edges.keys() {
            let chain = rules.chain(from_key)?;
            // chain always holds the source plus at least one hop
            if let Some(last) = chain.last() {
                let name = rules
                    .canonical_names
                    .get(last)
                    .cloned()
                    .unwrap_or_else(|| last.to_string());
                targets.insert(
                    from_key.clone(),
                    AliasTarget {
                        key: last.clone(),
                        name,
                    },
                );
            }
        }
        rules.targets = targets;

        for (index, rule) in blocks.iter().enumerate() {
            if rule.name_a.trim().is_empty() || rule.name_b.trim().is_empty() {
                return Err(malformed("block rules", index, "blank block name"));
            }
            let key_a = canonical_key(&rule.name_a);
            let key_b = canonical_key(&rule.name_b);
            if key_a == key_b {
                if rule.name_a.trim() == rule.name_b.trim() {
                    return Err(malformed("block rules", index, "block rule pairs a name with itself"));
                }
                let pair = ordered(rule.name_a.trim().to_string(), rule.name_b.trim().to_string());
                if rules.same_key_aliases.contains(&pair) {
                    let alias_chain = aliases
                        .iter()
                        .find(|a| ordered(a.from.trim().to_string(), a.to.trim().to_string()) == pair)
                        .map(|a| vec![a.from.clone(), a.to.clone()])
                        .unwrap_or_else(|| vec![pair.0.clone(), pair.1.clone()]);
                    return Err(ChatterError::RuleConflict {
                        alias_chain,
                        block_a: rule.name_a.clone(),
                        block_b: rule.name_b.clone(),
                    });
                }
                rules.blocked_names.insert(pair);
                continue;
            }
            for (start, end) in [(&key_a, &key_b), (&key_b, &key_a)] {
                let chain = rules.chain(start)?;
                if let Some(position) = chain.iter().position(|k| k == end) {
                    return Err(ChatterError::RuleConflict {
                        alias_chain: chain[..=position].iter().map(|k| rules.label(k)).collect(),
                        block_a: rule.name_a.clone(),
                        block_b: rule.name_b.clone(),
                    });
                }
            }
            rules.blocked_keys.insert(ordered(key_a, key_b));
        }

        let mut aliases = aliases;
        aliases.sort();
        aliases.dedup();
        let mut blocks = blocks;
        blocks.sort();
        blocks.dedup();
        rules.aliases = aliases;
        rules.blocks = blocks;
        debug!(
            aliases = rules.aliases.len(),
            blocks = rules.blocks.len(),
            "rule set loaded"
        );
        Ok(rules)
    }

    pub fn from_json(alias_payload: &Value, block_payload: &Value) -> Result<Self> {
        let aliases = parse_alias_rules(alias_payload, "alias rules")?;
        let blocks = parse_block_rules(block_payload, "block rules")?;
        Self::new(aliases, blocks)
    }

    // Follows alias edges from `start`, failing on a revisit.
    fn chain(&self, start: &CanonicalKey) -> Result<Vec<CanonicalKey>> {
        let mut chain = vec![start.clone()];
        let mut current = start;
        while let Some(next) = self.edges.get(current) {
            if chain.contains(next) {
                let mut cycle: Vec<String> = chain.iter().map(|k| self.label(k)).collect();
                cycle.push(self.label(next));
                return Err(ChatterError::Cycle { chain: cycle });
            }
            chain.push(next.clone());
            current = next;
        }
        Ok(chain)
    }

    fn label(&self, key: &CanonicalKey) -> String {
        self.labels
            .get(key)
            .cloned()
            .unwrap_or_else(|| key.to_string())
    }

    pub fn aliases(&self) -> &[AliasRule] {
        &self.aliases
    }
    pub fn blocks(&self) -> &[BlockRule] {
        &self.blocks
    }

    /// The canonical name a raw name or key is redirected to, if any alias
    /// chain starts at it.
    pub fn alias_target(&self, name_or_key: &str) -> Option<&str> {
        self.targets
            .get(&canonical_key(name_or_key))
            .map(|t| t.name.as_str())
    }
    pub fn alias_target_key(&self, key: &CanonicalKey) -> Option<&CanonicalKey> {
        self.targets.get(key).map(|t| &t.key)
    }
    /// The spelling declared by the rules for a key that is an alias target.
    pub fn canonical_name(&self, key: &CanonicalKey) -> Option<&str> {
        self.canonical_names.get(key).map(String::as_str)
    }

    /// Symmetric: `is_blocked(a, b) == is_blocked(b, a)`.
    pub fn is_blocked(&self, name_a: &str, name_b: &str) -> bool {
        self.is_blocked_keyed(name_a, &canonical_key(name_a), name_b, &canonical_key(name_b))
    }

    /// Same as [`RuleSet::is_blocked`] for callers that already hold the keys.
    pub fn is_blocked_keyed(
        &self,
        name_a: &str,
        key_a: &CanonicalKey,
        name_b: &str,
        key_b: &CanonicalKey,
    ) -> bool {
        let (name_a, name_b) = (name_a.trim(), name_b.trim());
        if name_a == name_b {
            return false;
        }
        if self
            .blocked_names
            .contains(&ordered(name_a.to_string(), name_b.to_string()))
        {
            return true;
        }
        key_a != key_b
            && self
                .blocked_keys
                .contains(&ordered(key_a.clone(), key_b.clone()))
    }
}
