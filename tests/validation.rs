use std::collections::BTreeSet;

use chatter::construct::{CanonicalCompany, Mention, ReportCounts, Resolution, ResolutionReport};
use chatter::error::ChatterError;
use chatter::key::canonical_key;
use chatter::resolve::resolve;
use chatter::rules::{AliasRule, RuleSet};
use chatter::sanity::NonCompanyRules;
use chatter::validate::{Baseline, Validator, Violation, validate};
use serde_json::json;

fn sbi_rules() -> RuleSet {
    RuleSet::new(vec![AliasRule::new("SBI", "State Bank of India")], vec![]).expect("rules")
}

fn sbi_run(sbi_edition: &str) -> Resolution {
    let mentions = vec![
        Mention::new("SBI", sbi_edition).with_quote(),
        Mention::new("State Bank of India", "p-monsoon-notes"),
        Mention::new("Reliance Industries", "p-monsoon-notes"),
    ];
    resolve(&mentions, &sbi_rules())
}

fn sbi_baseline() -> Baseline {
    serde_json::from_value(json!({
        "report": {
            "input_companies": 3,
            "canonical_companies": 2,
            "market_conflicts": 0,
            "quarantined_companies": 0,
            "repeat_name_keys": 0,
            "dropped_quote_rows": 0,
            "dropped_mention_rows": 0
        },
        "allowed_deltas": {"input_companies": 5, "canonical_companies": 5},
        "thresholds": {"max_market_conflicts": 0, "max_repeat_name_keys": 0},
        "must_keep_alias_pairs_merged": [["SBI", "State Bank of India"]],
        "must_keep_blocked_pairs_separate": [["State Bank of India", "Reliance Industries"]],
        "critical_company_expectations": [{
            "company_name": "SBI",
            "min_edition_count": 2,
            "required_edition_ids": ["p-the-chatter-between-seasons"]
        }]
    }))
    .expect("baseline")
}

fn company(id: &str, display_name: &str, members: &[&str]) -> CanonicalCompany {
    CanonicalCompany {
        id: id.to_string(),
        display_name: display_name.to_string(),
        key: canonical_key(display_name),
        member_raw_names: members.iter().map(|m| m.to_string()).collect::<BTreeSet<_>>(),
        mentions: members.iter().map(|m| Mention::new(m, "p-one")).collect(),
        market_key: None,
        quarantined: false,
    }
}

#[test]
fn an_unchanged_run_passes() {
    let resolution = sbi_run("p-the-chatter-between-seasons");
    let validation = validate(&resolution.report, &resolution.companies, &sbi_baseline());
    assert!(validation.passed(), "{:?}", validation.violations);
    assert!(validation.into_result().is_ok());
}

#[test]
fn a_pinned_mention_missing_from_its_company_is_a_regression() {
    let resolution = sbi_run("p-festive-demand");
    let validation = validate(&resolution.report, &resolution.companies, &sbi_baseline());
    assert_eq!(
        validation.violations,
        vec![Violation::MissingEdition {
            company: String::from("SBI"),
            edition_id: String::from("p-the-chatter-between-seasons"),
        }]
    );
    match validation.into_result() {
        Err(ChatterError::BaselineRegression { violations }) => assert_eq!(violations.len(), 1),
        other => panic!("expected a baseline regression, got {other:?}"),
    }
}

#[test]
fn an_alias_pair_that_no_longer_merges_is_reported() {
    let mentions = vec![
        Mention::new("SBI", "p-the-chatter-between-seasons"),
        Mention::new("State Bank of India", "p-monsoon-notes"),
        Mention::new("Reliance Industries", "p-monsoon-notes"),
    ];
    let resolution = resolve(&mentions, &RuleSet::empty());
    let validation = validate(&resolution.report, &resolution.companies, &sbi_baseline());
    assert!(validation.violations.contains(&Violation::AliasPairNotMerged {
        a: String::from("SBI"),
        b: String::from("State Bank of India"),
    }));
}

#[test]
fn pair_checks_skip_names_absent_from_the_run() {
    let resolution = resolve(&[Mention::new("Wipro", "p-one")], &RuleSet::empty());
    let baseline: Baseline = serde_json::from_value(json!({
        "must_keep_alias_pairs_merged": [["SBI", "State Bank of India"]],
        "must_keep_blocked_pairs_separate": [["SBI", "SBI Life"]]
    }))
    .expect("baseline");
    assert!(validate(&resolution.report, &resolution.companies, &baseline).passed());
}

#[test]
fn a_blocked_pair_merged_together_is_reported() {
    let resolution = sbi_run("p-the-chatter-between-seasons");
    let baseline: Baseline = serde_json::from_value(json!({
        "must_keep_blocked_pairs_separate": [["SBI", "State Bank of India"]]
    }))
    .expect("baseline");
    let validation = validate(&resolution.report, &resolution.companies, &baseline);
    assert_eq!(
        validation.violations,
        vec![Violation::BlockedPairMerged {
            a: String::from("SBI"),
            b: String::from("State Bank of India"),
            company_id: String::from("state-bank-of-india"),
        }]
    );
}

#[test]
fn dropped_rows_always_fail() {
    let report = ResolutionReport {
        counts: ReportCounts {
            dropped_quote_rows: 1,
            ..ReportCounts::default()
        },
        conflicts: vec![],
    };
    let validation = validate(&report, &[], &Baseline::default());
    assert_eq!(
        validation.violations,
        vec![Violation::DroppedRows {
            metric: String::from("dropped_quote_rows"),
            count: 1,
        }]
    );
}

#[test]
fn metrics_may_only_move_within_their_allowed_delta() {
    let committed = ReportCounts {
        input_companies: 10,
        canonical_companies: 8,
        market_conflicts: 1,
        ..ReportCounts::default()
    };
    let current = ResolutionReport {
        counts: ReportCounts {
            input_companies: 40,
            canonical_companies: 9,
            market_conflicts: 2,
            ..ReportCounts::default()
        },
        conflicts: vec![],
    };
    let mut baseline = Baseline {
        report: Some(committed),
        ..Baseline::default()
    };
    baseline.allowed_deltas.insert(String::from("canonical_companies"), 0);

    let metrics: Vec<String> = validate(&current, &[], &baseline)
        .violations
        .into_iter()
        .filter_map(|v| match v {
            Violation::MetricRegressed { metric, .. } => Some(metric),
            _ => None,
        })
        .collect();
    // input_companies has no recorded delta, so its growth is not a regression
    assert_eq!(metrics, vec!["canonical_companies", "market_conflicts"]);

    baseline.allowed_deltas.insert(String::from("canonical_companies"), 1);
    baseline.allowed_deltas.insert(String::from("market_conflicts"), 1);
    assert!(validate(&current, &[], &baseline).passed());
}

#[test]
fn thresholds_cap_conflict_metrics() {
    let report = ResolutionReport {
        counts: ReportCounts {
            quarantined_companies: 3,
            ..ReportCounts::default()
        },
        conflicts: vec![],
    };
    let baseline: Baseline =
        serde_json::from_value(json!({"thresholds": {"max_quarantined_companies": 2}})).expect("baseline");
    assert_eq!(
        validate(&report, &[], &baseline).violations,
        vec![Violation::ThresholdExceeded {
            metric: String::from("quarantined_companies"),
            actual: 3,
            limit: 2,
        }]
    );
}

#[test]
fn non_company_labels_are_caught_in_the_output() {
    let companies = vec![
        company("budget-highlights", "Budget Highlights", &["Budget Highlights"]),
        company("finance-minister-on-the-budget", "Finance Minister on the budget", &["Finance Minister on the budget"]),
        company("outlook-on-rural-demand-recovery", "Outlook on rural demand recovery", &["Outlook on rural demand recovery"]),
        company("wipro", "Wipro", &["Wipro"]),
    ];
    let baseline: Baseline = serde_json::from_value(json!({
        "must_exclude_company_names": ["budget highlights"],
        "allowed_suspicious_names": ["Outlook on rural demand recovery"]
    }))
    .expect("baseline");
    let rules = NonCompanyRules::new(&[String::from("Budget Highlights")], &[], &[]).expect("rules");
    let validation = Validator::new(&baseline)
        .with_non_company_rules(&rules)
        .validate(&ResolutionReport::default(), &companies);
    assert_eq!(
        validation.violations,
        vec![
            Violation::ExcludedNameVisible {
                name: String::from("Budget Highlights")
            },
            Violation::NonCompanyLabel {
                name: String::from("Budget Highlights")
            },
            Violation::SuspiciousLabel {
                name: String::from("Finance Minister on the budget")
            },
        ]
    );
}

#[test]
fn duplicate_visible_names_and_leaked_members_are_reported() {
    let companies = vec![
        company("hdfc", "HDFC", &["HDFC"]),
        company("hdfc-bank", "HDFC Bank", &["HDFC Bank", "HDFC"]),
    ];
    let baseline: Baseline =
        serde_json::from_value(json!({"must_not_coexist_in_index": [["HDFC", "HDFC Bank"]]})).expect("baseline");
    let validation = validate(&ResolutionReport::default(), &companies, &baseline);
    assert_eq!(
        validation.violations,
        vec![
            Violation::VisiblePairCoexists {
                a: String::from("HDFC"),
                b: String::from("HDFC Bank"),
            },
            Violation::MemberLeakage {
                raw_name: String::from("HDFC"),
                company_ids: vec![String::from("hdfc"), String::from("hdfc-bank")],
            },
        ]
    );
}

#[test]
fn critical_companies_must_exist() {
    let baseline: Baseline = serde_json::from_value(json!({
        "critical_company_expectations": [{"company_id": "infosys", "min_edition_count": 1}]
    }))
    .expect("baseline");
    let validation = validate(&ResolutionReport::default(), &[], &baseline);
    assert_eq!(
        validation.violations,
        vec![Violation::MissingCompany {
            company: String::from("infosys")
        }]
    );
}

#[test]
fn unknown_baseline_fields_are_rejected() {
    let parsed = serde_json::from_value::<Baseline>(json!({"must_keep_aliases_merged": []}));
    assert!(parsed.is_err());
}
