// End-to-end scoring against trained fixture artifacts.

mod common;

use chrono::Duration;
use common::{at, ctx, snapshot, snapshot_with, store};
use mailgate::config::{ConfigOverride, ScoringConfig};
use mailgate::engine::experiment::{ExperimentConfig, VariantSplit};
use mailgate::engine::heuristics::{Direction, HeuristicRule};
use mailgate::events::{DomainInfo, ModelSource, Variant};
use mailgate::{score_email, DecisionKind};

fn sequential_rule() -> HeuristicRule {
    HeuristicRule {
        feature:          "sequential_confidence".into(),
        threshold:        0.4,
        direction:        Direction::Gte,
        target_decision:  DecisionKind::Warn,
        reason:           "sequential_pattern".into(),
        min_score_offset: 0.01,
    }
}

fn with_rule() -> ScoringConfig {
    ScoringConfig { heuristics: vec![sequential_rule()], ..Default::default() }
}

// ── Canonical addresses ───────────────────────────────────────────────────────

#[test]
fn ordinary_name_is_allowed() {
    let out = score_email("person.surname@gmail.com", &ctx(), &snapshot(with_rule()));
    let d = &out.decision;
    assert_eq!(d.decision, DecisionKind::Allow);
    assert!(d.score < 0.5, "score {}", d.score);
    assert!(d.applied_heuristics.is_empty());
    assert_eq!(d.source, ModelSource::Forest { version: "3.0.0-forest".into() });
    assert_eq!(out.metrics.features.get("ood_risk"), Some(&0.0));
}

#[test]
fn sequential_address_is_at_least_warned() {
    let out = score_email("user123@gmail.com", &ctx(), &snapshot(with_rule()));
    assert!(out.decision.decision >= DecisionKind::Warn);
    assert!(out.decision.score >= 0.5);
    assert!(out.metrics.features["sequential_confidence"] >= 0.4);
}

#[test]
fn gibberish_is_flagged_by_ood_floor() {
    let out = score_email("xqzjvkwpfg@example.com", &ctx(), &snapshot(with_rule()));
    let d = &out.decision;
    assert_eq!(d.decision, DecisionKind::Warn);
    assert_eq!(d.reason, "ood_abnormal");
    assert!(d.score > 0.5 && d.score < 0.65, "score {}", d.score);
    assert!(out.metrics.features["min_entropy"] > 3.8);
}

#[test]
fn ood_floor_can_be_switched_off() {
    let mut cfg = with_rule();
    cfg.ood.apply_as_floor = false;
    let out = score_email("xqzjvkwpfg@example.com", &ctx(), &snapshot(cfg));
    assert_ne!(out.decision.reason, "ood_abnormal");
    assert_eq!(out.decision.decision, DecisionKind::Allow);
    // Still computed and visible to the model.
    assert!(out.metrics.features["ood_risk"] > 0.5);
}

// ── Model fallback ────────────────────────────────────────────────────────────

#[test]
fn tiers_fall_back_in_order() {
    let models = store();
    models.remove("forest.json");
    let out = score_email("person.surname@gmail.com", &ctx(), &snapshot_with(with_rule(), &models));
    assert_eq!(out.decision.source, ModelSource::Tree { version: "2.0.0".into() });
    assert_eq!(out.decision.score, 0.12);
    assert_eq!(out.decision.reason, "low_digit_share");

    models.remove("tree.json");
    let out = score_email("person.surname@gmail.com", &ctx(), &snapshot_with(with_rule(), &models));
    assert_eq!(out.decision.source, ModelSource::Unavailable);
    assert_eq!(out.decision.reason, "model_unavailable");
    assert_eq!(out.decision.decision, DecisionKind::Allow);
}

#[test]
fn ood_still_applies_without_models() {
    let models = store();
    models.remove("forest.json");
    models.remove("tree.json");
    let out = score_email("xqzjvkwpfg@example.com", &ctx(), &snapshot_with(ScoringConfig::default(), &models));
    assert_eq!(out.decision.reason, "ood_abnormal");
    assert_eq!(out.decision.decision, DecisionKind::Warn);
}

// ── Hard classifiers ──────────────────────────────────────────────────────────

#[test]
fn unparseable_input_is_blocked() {
    let snap = snapshot(with_rule());
    for raw in ["", "no-at-sign", "two@@example.com", "trailing@", "@leading.com"] {
        let out = score_email(raw, &ctx(), &snap);
        assert_eq!(out.decision.reason, "invalid_format", "{:?}", raw);
        assert_eq!(out.decision.score, 0.90);
        assert_eq!(out.decision.decision, DecisionKind::Block);
        assert!(out.decision.applied_heuristics.is_empty());
    }
}

#[test]
fn disposable_domain_bypasses_model() {
    let mut c = ctx();
    c.enrichment.domain = Some(DomainInfo { is_disposable: true, ..Default::default() });
    let out = score_email("person.surname@mailinator.com", &c, &snapshot(with_rule()));
    assert_eq!(out.decision.reason, "disposable_domain");
    assert_eq!(out.decision.score, 0.95);
    assert_eq!(out.decision.source, ModelSource::HardRule);
}

// ── Dated patterns ────────────────────────────────────────────────────────────

#[test]
fn birth_year_and_current_year_differ() {
    let snap = snapshot(with_rule());
    let old = score_email("name1990@example.com", &ctx(), &snap);
    let new = score_email("name2025@example.com", &ctx(), &snap);
    assert!(old.metrics.features["dated_confidence"] < 0.3);
    assert!(new.metrics.features["dated_confidence"] > 0.8);
    assert_eq!(new.metrics.features["has_year"], 1.0);
}

#[test]
fn year_class_follows_request_date() {
    let snap = snapshot(with_rule());
    let mut c = ctx();
    c.received_at = at(2045, 6, 1);
    let out = score_email("name2025@example.com", &c, &snap);
    assert!(out.metrics.features["dated_confidence"] < 0.8);
}

// ── Determinism ───────────────────────────────────────────────────────────────

#[test]
fn repeated_scoring_is_identical() {
    let snap = snapshot(with_rule());
    for raw in ["person.surname@gmail.com", "user123@gmail.com", "xqzjvkwpfg@example.com", "a+b@x.co.uk"] {
        let a = score_email(raw, &ctx(), &snap);
        let b = score_email(raw, &ctx(), &snap);
        assert_eq!(a.decision, b.decision);
        assert_eq!(a.metrics.features, b.metrics.features);
        assert_eq!(a.metrics.to_jsonl(), b.metrics.to_jsonl());
    }
}

#[test]
fn case_and_whitespace_do_not_change_the_score() {
    let snap = snapshot(with_rule());
    let a = score_email("Person.Surname@GMAIL.com", &ctx(), &snap);
    let b = score_email("  person.surname@gmail.com ", &ctx(), &snap);
    assert_eq!(a.decision, b.decision);
}

// ── Experiments ───────────────────────────────────────────────────────────────

fn experiment(control: u8, overrides: ConfigOverride) -> ExperimentConfig {
    let now = at(2025, 6, 1);
    ExperimentConfig {
        id:         "block-everything".into(),
        enabled:    true,
        start_date: now - Duration::days(7),
        end_date:   now + Duration::days(7),
        variants:   VariantSplit { control, treatment: 100 - control, config_overrides: overrides },
    }
}

#[test]
fn treatment_overrides_flow_into_decision() {
    let mut cfg = with_rule();
    cfg.experiments = vec![experiment(0, ConfigOverride {
        action_override: Some(DecisionKind::Block),
        ..Default::default()
    })];
    let out = score_email("person.surname@gmail.com", &ctx(), &snapshot(cfg));
    let d = &out.decision;
    assert_eq!(d.decision, DecisionKind::Block);
    assert_eq!(d.original_decision, DecisionKind::Allow);
    assert!(d.is_overridden());
    let a = d.assignment.as_ref().expect("assigned");
    assert_eq!(a.experiment_id, "block-everything");
    assert_eq!(a.variant, Variant::Treatment);
    assert_eq!(out.metrics.assignment, d.assignment);
}

#[test]
fn control_keeps_base_config() {
    let mut cfg = with_rule();
    cfg.experiments = vec![experiment(100, ConfigOverride {
        action_override: Some(DecisionKind::Block),
        ..Default::default()
    })];
    let out = score_email("person.surname@gmail.com", &ctx(), &snapshot(cfg));
    assert_eq!(out.decision.decision, DecisionKind::Allow);
    assert_eq!(out.decision.assignment.as_ref().map(|a| a.variant), Some(Variant::Control));
}

#[test]
fn inactive_experiment_assigns_nothing() {
    let mut cfg = with_rule();
    cfg.experiments = vec![experiment(50, ConfigOverride::default())];
    let snap = snapshot(cfg);
    let mut c = ctx();
    c.received_at = at(2025, 7, 1);
    let out = score_email("person.surname@gmail.com", &c, &snap);
    assert!(out.decision.assignment.is_none());
}

#[test]
fn assignment_sticks_to_the_fingerprint() {
    let mut cfg = with_rule();
    cfg.experiments = vec![experiment(50, ConfigOverride::default())];
    let snap = snapshot(cfg);
    let mut c = ctx();
    c.fingerprint = Some("device-7f3a".into());
    let first = score_email("person.surname@gmail.com", &c, &snap).decision.assignment;
    for raw in ["user123@gmail.com", "xqzjvkwpfg@example.com", "name1990@example.com"] {
        assert_eq!(score_email(raw, &c, &snap).decision.assignment, first);
    }
}
