use chatter::construct::{ConflictReason, Mention, MentionStore};
use chatter::resolve::{Resolver, resolve};
use chatter::rules::{AliasRule, BlockRule, RuleSet};
use serde_json::json;

fn names(company: &chatter::construct::CanonicalCompany) -> Vec<&str> {
    company.member_raw_names.iter().map(String::as_str).collect()
}

fn archive() -> Vec<Mention> {
    vec![
        Mention::new("SBI", "p-the-chatter-between-seasons").with_quote(),
        Mention::new("State Bank of India", "p-monsoon-notes").with_market_key("NSE:SBIN"),
        Mention::new("State Bank of India Ltd", "p-monsoon-notes"),
        Mention::new("Reliance Industries", "p-monsoon-notes").with_quote(),
        Mention::new("Reliance Consumer Products", "p-festive-demand"),
        Mention::new("Adani Ports", "p-festive-demand"),
        Mention::new("Adani Power", "p-festive-demand").with_context(),
        Mention::new("Adani Group", "p-budget-week"),
        Mention::new("Tata Motors", "p-budget-week").with_market_key("NSE:TATAMOTORS"),
        Mention::new("TATA MOTORS", "p-budget-week").with_market_key("NSE:TATASTEEL"),
    ]
}

fn archive_rules() -> RuleSet {
    RuleSet::new(
        vec![
            AliasRule::new("SBI", "State Bank of India"),
            AliasRule::new("Adani Ports", "Adani Group"),
            AliasRule::new("Adani Power", "Adani Group"),
        ],
        vec![BlockRule::new("Adani Ports", "Adani Power")],
    )
    .expect("rules")
}

#[test]
fn acronym_alias_merges_into_the_full_name() {
    let rules = RuleSet::new(vec![AliasRule::new("SBI", "State Bank of India")], vec![]).expect("rules");
    let mentions = vec![
        Mention::new("SBI", "p-one"),
        Mention::new("State Bank of India", "p-two"),
    ];
    let resolution = resolve(&mentions, &rules);
    assert_eq!(resolution.companies.len(), 1);
    let sbi = &resolution.companies[0];
    assert_eq!(sbi.display_name, "State Bank of India");
    assert_eq!(sbi.id, "state-bank-of-india");
    assert_eq!(names(sbi), vec!["SBI", "State Bank of India"]);
    assert_eq!(resolution.report.counts.market_conflicts, 0);
    assert!(resolution.report.conflicts.is_empty());
}

#[test]
fn distinct_keys_without_rules_stay_apart() {
    let mentions = vec![
        Mention::new("Reliance Industries", "p-one"),
        Mention::new("Reliance Consumer Products", "p-one"),
    ];
    let resolution = resolve(&mentions, &RuleSet::empty());
    let ids: Vec<&str> = resolution.companies.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["reliance-consumer-products", "reliance-industries"]);
    assert!(resolution.report.conflicts.is_empty());
    assert_eq!(resolution.report.counts.quarantined_companies, 0);
}

#[test]
fn equal_keys_merge_and_the_busiest_spelling_is_displayed() {
    let mentions = vec![
        Mention::new("Infosys", "p-one"),
        Mention::new("INFOSYS LTD", "p-two"),
        Mention::new("Infosys", "p-three"),
    ];
    let resolution = resolve(&mentions, &RuleSet::empty());
    assert_eq!(resolution.companies.len(), 1);
    let infosys = &resolution.companies[0];
    assert_eq!(infosys.display_name, "Infosys");
    assert_eq!(infosys.edition_ids(), vec!["p-one", "p-two", "p-three"]);
    assert_eq!(resolution.report.counts.input_companies, 2);
    assert_eq!(resolution.report.counts.canonical_companies, 1);
}

#[test]
fn a_block_splits_siblings_of_one_alias_target() {
    let resolution = Resolver::new(&archive_rules()).resolve(&MentionStore::new(archive()));

    let ports = resolution.company_containing("Adani Ports").expect("ports");
    let power = resolution.company_containing("Adani Power").expect("power");
    assert_ne!(ports.id, power.id);
    assert_eq!(names(ports), vec!["Adani Group", "Adani Ports"]);
    assert_eq!(ports.display_name, "Adani Group");
    assert!(!ports.quarantined);
    assert_eq!(names(power), vec!["Adani Power"]);
    assert!(power.quarantined);

    let blocks: Vec<_> = resolution
        .report
        .conflicts
        .iter()
        .filter(|c| c.reason == ConflictReason::BlockViolation)
        .collect();
    assert_eq!(blocks.len(), 1);
    let candidates: Vec<&str> = blocks[0].candidate_names.iter().map(String::as_str).collect();
    assert_eq!(candidates, vec!["Adani Ports", "Adani Power"]);
    assert_eq!(blocks[0].involved_mentions.len(), 2);
}

#[test]
fn blocked_names_never_share_a_company() {
    let rules = archive_rules();
    let resolution = resolve(&archive(), &rules);
    for company in &resolution.companies {
        for a in &company.member_raw_names {
            for b in &company.member_raw_names {
                assert!(!rules.is_blocked(a, b), "{a} and {b} merged in {}", company.id);
            }
        }
    }
}

#[test]
fn differing_market_keys_never_merge() {
    let resolution = resolve(&archive(), &archive_rules());
    let upper = resolution.company_containing("TATA MOTORS").expect("upper");
    let title = resolution.company_containing("Tata Motors").expect("title");
    assert_ne!(upper.id, title.id);
    assert_eq!(upper.id, "tata-motors");
    assert!(title.id.starts_with("tata-motors-"));
    assert_eq!(title.id.len(), "tata-motors-".len() + 8);
    assert!(upper.quarantined);
    assert!(title.quarantined);

    // both sides of the mismatch plus the blocked Adani Power
    let counts = resolution.report.counts;
    assert_eq!(counts.market_conflicts, 1);
    assert_eq!(counts.quarantined_companies, 3);
    assert_eq!(counts.repeat_name_keys, 1);
}

#[test]
fn each_side_of_a_market_key_mismatch_is_quarantined() {
    let mentions = vec![
        Mention::new("Tata Motors", "p-one").with_market_key("NSE:TATAMOTORS"),
        Mention::new("TATA MOTORS", "p-two").with_market_key("NSE:TATASTEEL"),
        Mention::new("Tata Motors Ltd", "p-three"),
    ];
    let resolution = resolve(&mentions, &RuleSet::empty());
    assert_eq!(resolution.companies.len(), 2);
    assert!(resolution.companies.iter().all(|c| c.quarantined));
    let counts = resolution.report.counts;
    assert_eq!(counts.market_conflicts, 1);
    assert_eq!(counts.quarantined_companies, 2);
}

#[test]
fn a_missing_market_key_does_not_block_a_merge() {
    let mentions = vec![
        Mention::new("Tata Motors", "p-one").with_market_key("NSE:TATAMOTORS"),
        Mention::new("Tata Motors Ltd", "p-two"),
    ];
    let resolution = resolve(&mentions, &RuleSet::empty());
    assert_eq!(resolution.companies.len(), 1);
    assert_eq!(resolution.companies[0].market_key.as_deref(), Some("NSE:TATAMOTORS"));
}

#[test]
fn an_acronym_matching_several_companies_is_quarantined() {
    let mentions = vec![
        Mention::new("AB", "p-one"),
        Mention::new("Asian Bank", "p-one"),
        Mention::new("Alpha Brewing", "p-two"),
    ];
    let resolution = resolve(&mentions, &RuleSet::empty());
    assert_eq!(resolution.companies.len(), 3);
    let acronym = resolution.company_containing("AB").expect("acronym");
    assert!(acronym.quarantined);
    let record = &resolution.report.conflicts[0];
    assert_eq!(record.reason, ConflictReason::AmbiguousAcronym);
    assert!(record.candidate_names.contains("Asian Bank"));
    assert!(record.candidate_names.contains("Alpha Brewing"));
}

#[test]
fn an_acronym_with_one_match_is_left_alone() {
    let mentions = vec![
        Mention::new("SBI", "p-one"),
        Mention::new("State Bank of India", "p-one"),
    ];
    let resolution = resolve(&mentions, &RuleSet::empty());
    assert_eq!(resolution.companies.len(), 2);
    assert!(resolution.report.conflicts.is_empty());
    assert!(resolution.companies.iter().all(|c| !c.quarantined));
}

#[test]
fn resolution_is_deterministic() {
    let rules = archive_rules();
    let first = resolve(&archive(), &rules);
    let second = resolve(&archive(), &rules);
    assert_eq!(first, second);
    let ids: Vec<&str> = first.companies.iter().map(|c| c.id.as_str()).collect();
    let mut sorted = ids.clone();
    sorted.sort();
    assert_eq!(ids, sorted);
}

#[test]
fn canonical_companies_never_outnumber_raw_names() {
    let rules = archive_rules();
    for size in 0..=archive().len() {
        let mentions: Vec<Mention> = archive().into_iter().take(size).collect();
        let counts = resolve(&mentions, &rules).report.counts;
        assert!(counts.canonical_companies <= counts.input_companies, "size {size}: {counts}");
    }
}

#[test]
fn every_mention_lands_in_exactly_one_company() {
    let resolution = resolve(&archive(), &archive_rules());
    let attributed: usize = resolution.companies.iter().map(|c| c.mentions.len()).sum();
    assert_eq!(attributed, archive().len());
    assert_eq!(resolution.report.counts.dropped_mention_rows, 0);
    assert_eq!(resolution.report.counts.dropped_quote_rows, 0);
}

#[test]
fn malformed_records_are_counted_once() {
    let records = vec![
        json!({"raw_name": "Wipro", "edition_id": "p-one", "has_quote": true}),
        json!({"raw_name": "", "edition_id": "p-one"}),
        json!("Wipro"),
        json!({"raw_name": "Wipro", "edition_id": "p-two", "has_quote": true, "market_key": 5}),
        json!({"name": "Wipro Ltd", "edition_id": "p-three"}),
    ];
    let store = MentionStore::from_records(&records);
    assert_eq!(store.len(), 2);
    let counts = Resolver::new(&RuleSet::empty()).resolve(&store).report.counts;
    assert_eq!(counts.dropped_mention_rows, 2);
    assert_eq!(counts.dropped_quote_rows, 1);
    assert_eq!(counts.canonical_companies, 1);
}

#[test]
fn a_company_without_quotes_still_resolves() {
    let resolution = resolve(&archive(), &archive_rules());
    let reliance = resolution.company_containing("Reliance Consumer Products").expect("company");
    assert!(!reliance.has_quotes());
    assert_eq!(reliance.mentions.len(), 1);
    let sbi = resolution.company_named("State Bank of India").expect("sbi");
    assert_eq!(sbi.quote_count(), 1);
    assert_eq!(sbi.edition_ids(), vec!["p-the-chatter-between-seasons", "p-monsoon-notes"]);
}
