//! The resolver engine.
//!
//! A run recomputes every canonical company from scratch out of the full
//! mention set and an immutable [`RuleSet`]:
//!
//! 1. mentions are grouped by exact raw name into *name groups*, which are
//!    interned to small integer ids in raw-name order,
//! 2. name groups are bucketed by [`CanonicalKey`],
//! 3. alias rules relabel buckets onto their target key, unioning every
//!    bucket that lands on the same target into one candidate cluster,
//! 4. each candidate cluster is partitioned into pairwise compatible
//!    subgroups: two name groups are incompatible when a block rule separates
//!    them or when both carry different non-null market keys,
//! 5. every subgroup becomes a canonical company; subgroups after the first
//!    are quarantined, as is every subgroup holding a side of a market-key
//!    mismatch, and each split is recorded as a [`ConflictRecord`],
//! 6. standalone acronyms that match the initials of several companies are
//!    quarantined as ambiguous,
//! 7. ids are derived from display names and the report is assembled.
//!
//! The partition is greedy over a fixed order (name groups whose key is the
//! cluster target first, then raw names in lexicographic order), so the first
//! subgroup is the lexicographically smallest compatible one and the whole
//! run is deterministic.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use bimap::BiMap;
use roaring::RoaringBitmap;
use tracing::{debug, info, warn};

use crate::construct::{
    CanonicalCompany, ConflictReason, ConflictRecord, Mention, MentionStore, NameHasher,
    ReportCounts, Resolution, ResolutionReport,
};
use crate::key::{CanonicalKey, canonical_key, looks_like_acronym, slugify};
use crate::rules::RuleSet;

#[derive(Debug)]
struct NameGroup {
    key: CanonicalKey,
    // indices into the mention slice, ascending
    mentions: Vec<usize>,
    market_key: Option<String>,
}

#[derive(Debug, Default)]
struct Interned<'m> {
    names: BiMap<&'m str, u32>,
    groups: Vec<NameGroup>,
    dropped_mention_rows: usize,
    dropped_quote_rows: usize,
}

impl<'m> Interned<'m> {
    fn name(&self, id: u32) -> &'m str {
        self.names.get_by_right(&id).copied().unwrap_or_default()
    }
    fn group(&self, id: u32) -> &NameGroup {
        &self.groups[id as usize]
    }
}

fn intern(mentions: &[Mention]) -> Interned<'_> {
    let mut interned = Interned::default();
    let mut by_name: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (index, mention) in mentions.iter().enumerate() {
        if mention.raw_name().is_empty() || mention.edition_id().is_empty() {
            if mention.has_quote() {
                interned.dropped_quote_rows += 1;
            } else {
                interned.dropped_mention_rows += 1;
            }
            warn!(index, "mention without a name or edition dropped");
            continue;
        }
        by_name.entry(mention.raw_name()).or_default().push(index);
    }
    for (id, (raw_name, indices)) in by_name.into_iter().enumerate() {
        interned.names.insert(raw_name, id as u32);
        let market_key = dominant_market_key(raw_name, indices.iter().map(|&i| &mentions[i]));
        interned.groups.push(NameGroup {
            key: canonical_key(raw_name),
            mentions: indices,
            market_key,
        });
    }
    interned
}

// A raw name never splits, so it carries the most frequent of its market
// keys (ties go to the lexicographically smallest).
fn dominant_market_key<'m>(
    raw_name: &str,
    mentions: impl Iterator<Item = &'m Mention>,
) -> Option<String> {
    let mut counts: BTreeMap<&'m str, usize> = BTreeMap::new();
    for mention in mentions {
        if let Some(market_key) = mention.market_key() {
            *counts.entry(market_key).or_default() += 1;
        }
    }
    if counts.len() > 1 {
        warn!(raw_name, keys = counts.len(), "raw name carries several market keys; keeping the most frequent");
    }
    let mut best: Option<(&str, usize)> = None;
    for (market_key, count) in counts {
        if best.is_none_or(|(_, top)| count > top) {
            best = Some((market_key, count));
        }
    }
    best.map(|(market_key, _)| market_key.to_string())
}

pub struct Resolver<'r> {
    rules: &'r RuleSet,
}

impl<'r> Resolver<'r> {
    pub fn new(rules: &'r RuleSet) -> Self {
        Self { rules }
    }

    pub fn resolve(&self, store: &MentionStore) -> Resolution {
        let mentions = store.mentions();
        let interned = intern(mentions);
        let candidates = self.absorb_aliases(&bucket(&interned));

        let mut companies = Vec::with_capacity(interned.groups.len());
        let mut conflicts = Vec::new();
        for (target, members) in &candidates {
            let subgroups = self.partition(&interned, target, members);
            // every side of a market-key mismatch stands alone, the anchor included
            let mut mismatched = RoaringBitmap::new();
            if subgroups.len() > 1 {
                warn!(
                    cluster = %target,
                    subgroups = subgroups.len(),
                    "candidate cluster split"
                );
                let involved = self.incompatible_groups(&interned, members);
                if let Some(ids) = involved.get(&ConflictReason::MarketKeyMismatch) {
                    mismatched |= ids;
                }
                conflicts.extend(conflict_records(&interned, mentions, involved));
            }
            for (position, subgroup) in subgroups.iter().enumerate() {
                let alias_name = if position == 0 {
                    self.rules.canonical_name(target)
                } else {
                    None
                };
                let quarantined = position > 0 || !subgroup.is_disjoint(&mismatched);
                companies.push(materialize(&interned, mentions, subgroup, alias_name, quarantined));
            }
        }
        conflicts.extend(self.flag_ambiguous_acronyms(&mut companies));
        assign_ids(&mut companies);
        conflicts.sort_by(|a, b| {
            (a.reason, &a.candidate_names).cmp(&(b.reason, &b.candidate_names))
        });

        let counts = tally(&interned, &companies, &conflicts, store);
        info!(
            input = counts.input_companies,
            canonical = counts.canonical_companies,
            conflicts = conflicts.len(),
            quarantined = counts.quarantined_companies,
            "resolution complete"
        );
        Resolution {
            companies,
            report: ResolutionReport { counts, conflicts },
        }
    }

    fn absorb_aliases(
        &self,
        buckets: &BTreeMap<CanonicalKey, RoaringBitmap>,
    ) -> BTreeMap<CanonicalKey, RoaringBitmap> {
        let mut candidates = BTreeMap::<CanonicalKey, RoaringBitmap>::new();
        for (key, ids) in buckets {
            let target = self.rules.alias_target_key(key).unwrap_or(key);
            if target != key {
                debug!(from = %key, to = %target, "bucket absorbed by alias");
            }
            *candidates.entry(target.clone()).or_default() |= ids;
        }
        candidates
    }

    fn incompatibility(&self, interned: &Interned, a: u32, b: u32) -> Option<ConflictReason> {
        let (group_a, group_b) = (interned.group(a), interned.group(b));
        if self
            .rules
            .is_blocked_keyed(interned.name(a), &group_a.key, interned.name(b), &group_b.key)
        {
            return Some(ConflictReason::BlockViolation);
        }
        match (&group_a.market_key, &group_b.market_key) {
            (Some(x), Some(y)) if x != y => Some(ConflictReason::MarketKeyMismatch),
            _ => None,
        }
    }

    fn partition(
        &self,
        interned: &Interned,
        target: &CanonicalKey,
        members: &RoaringBitmap,
    ) -> Vec<RoaringBitmap> {
        let (anchors, others): (Vec<u32>, Vec<u32>) = members
            .iter()
            .partition(|&id| interned.group(id).key == *target);
        let mut subgroups: Vec<RoaringBitmap> = Vec::new();
        for id in anchors.into_iter().chain(others) {
            let slot = subgroups.iter_mut().find(|subgroup| {
                subgroup
                    .iter()
                    .all(|other| self.incompatibility(interned, id, other).is_none())
            });
            match slot {
                Some(subgroup) => {
                    subgroup.insert(id);
                }
                None => {
                    let mut subgroup = RoaringBitmap::new();
                    subgroup.insert(id);
                    subgroups.push(subgroup);
                }
            }
        }
        subgroups
    }

    // Every name group that sits in an incompatible pair, per reason.
    fn incompatible_groups(
        &self,
        interned: &Interned,
        members: &RoaringBitmap,
    ) -> BTreeMap<ConflictReason, RoaringBitmap> {
        let ids: Vec<u32> = members.iter().collect();
        let mut involved: BTreeMap<ConflictReason, RoaringBitmap> = BTreeMap::new();
        for (i, &a) in ids.iter().enumerate() {
            for &b in &ids[i + 1..] {
                if let Some(reason) = self.incompatibility(interned, a, b) {
                    let set = involved.entry(reason).or_default();
                    set.insert(a);
                    set.insert(b);
                }
            }
        }
        involved
    }

    // Acronyms are never merged without an alias rule. When one could stand
    // for several companies it is kept apart and recorded.
    fn flag_ambiguous_acronyms(&self, companies: &mut [CanonicalCompany]) -> Vec<ConflictRecord> {
        let mut by_initials: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (index, company) in companies.iter().enumerate() {
            if company.key.tokens().count() >= 2 {
                by_initials.entry(company.key.initials()).or_default().push(index);
            }
        }

        let mut records = Vec::new();
        for index in 0..companies.len() {
            let company = &companies[index];
            if company.quarantined || company.member_raw_names.len() != 1 {
                continue;
            }
            let Some(raw_name) = company.member_raw_names.iter().next() else {
                continue;
            };
            if !looks_like_acronym(raw_name) {
                continue;
            }
            let acronym = canonical_key(raw_name);
            if self.rules.alias_target_key(&acronym).is_some() {
                continue;
            }
            let candidates: Vec<usize> = by_initials
                .get(acronym.as_str())
                .map(|found| found.iter().copied().filter(|&i| i != index).collect())
                .unwrap_or_default();
            match candidates.len() {
                0 => {}
                1 => debug!(
                    acronym = %raw_name,
                    candidate = %companies[candidates[0]].display_name,
                    "acronym matches a single full name; an alias rule would merge them"
                ),
                _ => {
                    let mut candidate_names: BTreeSet<String> = candidates
                        .iter()
                        .map(|&i| companies[i].display_name.clone())
                        .collect();
                    candidate_names.insert(raw_name.clone());
                    warn!(acronym = %raw_name, candidates = candidates.len(), "ambiguous acronym quarantined");
                    records.push(ConflictRecord {
                        candidate_names,
                        reason: ConflictReason::AmbiguousAcronym,
                        involved_mentions: company.mentions.clone(),
                    });
                    companies[index].quarantined = true;
                }
            }
        }
        records
    }
}

// One record per reason for a split cluster.
fn conflict_records(
    interned: &Interned,
    mentions: &[Mention],
    involved: BTreeMap<ConflictReason, RoaringBitmap>,
) -> Vec<ConflictRecord> {
    involved
        .into_iter()
        .map(|(reason, set)| {
            let mut indices: Vec<usize> = set
                .iter()
                .flat_map(|id| interned.group(id).mentions.iter().copied())
                .collect();
            indices.sort_unstable();
            ConflictRecord {
                candidate_names: set.iter().map(|id| interned.name(id).to_string()).collect(),
                reason,
                involved_mentions: indices.into_iter().map(|i| mentions[i].clone()).collect(),
            }
        })
        .collect()
}

fn bucket(interned: &Interned) -> BTreeMap<CanonicalKey, RoaringBitmap> {
    let mut buckets = BTreeMap::<CanonicalKey, RoaringBitmap>::new();
    for (id, group) in interned.groups.iter().enumerate() {
        buckets.entry(group.key.clone()).or_default().insert(id as u32);
    }
    buckets
}

fn materialize(
    interned: &Interned,
    mentions: &[Mention],
    subgroup: &RoaringBitmap,
    alias_name: Option<&str>,
    quarantined: bool,
) -> CanonicalCompany {
    let mut indices = Vec::new();
    let mut member_raw_names = BTreeSet::new();
    let mut market_key = None;
    // (mention count, name length, name); ties keep the earlier, smaller name
    let mut best: Option<(usize, usize, &str)> = None;
    for id in subgroup {
        let group = interned.group(id);
        let name = interned.name(id);
        indices.extend(group.mentions.iter().copied());
        member_raw_names.insert(name.to_string());
        if market_key.is_none() {
            market_key = group.market_key.clone();
        }
        let score = (group.mentions.len(), name.chars().count());
        if best.is_none_or(|(count, length, _)| score > (count, length)) {
            best = Some((score.0, score.1, name));
        }
    }
    indices.sort_unstable();
    let display_name = alias_name
        .or(best.map(|(_, _, name)| name))
        .unwrap_or_default()
        .to_string();
    CanonicalCompany {
        id: String::new(),
        key: canonical_key(&display_name),
        display_name,
        member_raw_names,
        mentions: indices.into_iter().map(|i| mentions[i].clone()).collect(),
        market_key,
        quarantined,
    }
}

// Ids are slugs of display names; a colliding slug gets a short digest of
// the member names so it stays stable across runs.
fn assign_ids(companies: &mut Vec<CanonicalCompany>) {
    companies.sort_by_cached_key(|c| {
        (
            slugify(&c.display_name),
            c.member_raw_names.iter().cloned().collect::<Vec<_>>(),
        )
    });
    let mut taken: HashSet<String, NameHasher> = HashSet::default();
    for company in companies.iter_mut() {
        let slug = slugify(&company.display_name);
        company.id = if taken.contains(&slug) {
            let members: Vec<&str> = company.member_raw_names.iter().map(String::as_str).collect();
            let digest = blake3::hash(members.join("\n").as_bytes()).to_hex();
            format!("{slug}-{}", &digest[..8])
        } else {
            slug
        };
        taken.insert(company.id.clone());
    }
    companies.sort_by(|a, b| a.id.cmp(&b.id));
}

fn tally(
    interned: &Interned,
    companies: &[CanonicalCompany],
    conflicts: &[ConflictRecord],
    store: &MentionStore,
) -> ReportCounts {
    let mut per_key: BTreeMap<&CanonicalKey, usize> = BTreeMap::new();
    for company in companies {
        *per_key.entry(&company.key).or_default() += 1;
    }
    ReportCounts {
        input_companies: interned.groups.len(),
        canonical_companies: companies.len(),
        market_conflicts: conflicts
            .iter()
            .filter(|c| c.reason == ConflictReason::MarketKeyMismatch)
            .count(),
        quarantined_companies: companies.iter().filter(|c| c.quarantined).count(),
        repeat_name_keys: per_key.values().filter(|&&n| n > 1).count(),
        dropped_quote_rows: store.dropped_quote_rows() + interned.dropped_quote_rows,
        dropped_mention_rows: store.dropped_mention_rows() + interned.dropped_mention_rows,
    }
}

pub fn resolve(mentions: &[Mention], rules: &RuleSet) -> Resolution {
    Resolver::new(rules).resolve(&MentionStore::new(mentions.to_vec()))
}
