// Shared fixtures: small trained character models and a three-stump forest.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use mailgate::collab::{MemoryModelStore, StaticConfigStore};
use mailgate::events::RequestContext;
use mailgate::sequence::CharSequenceModel;
use mailgate::{ArtifactCache, ArtifactSnapshot, ScoringConfig};

pub const LEGIT: &[&str] = &[
    "johnsmith", "maryjones", "davidbrown", "sarahmiller", "michaeldavis", "jenniferwilson",
    "robertmoore", "lindataylor", "williamanderson", "elizabeththomas", "personsurname",
    "jamesjackson", "patriciawhite", "christopherharris", "barbaramartin", "danielthompson",
    "susangarcia", "matthewmartinez", "karenrobinson", "anthonyclark", "nancyrodriguez",
    "marklewis", "lisalee", "stevenwalker", "bettyhall", "paulallen", "sandrayoung",
    "andrewhernandez", "ashleyking", "joshuawright", "kimberlylopez", "kevinhill", "emilyscott",
    "brian.green", "donnaadams", "georgebaker", "michellenelson", "edwardcarter", "carolmitchell",
    "ronaldperez", "amandaroberts", "timothyturner", "melissaphillips", "jasoncampbell",
    "deborahparker", "jeffreyevans", "stephanieedwards", "ryancollins", "rebeccastewart",
    "garysanchez",
];

pub const FRAUD: &[&str] = &[
    "user123", "user1234", "test001", "xk9q2m", "zq8w1v", "qwerty123", "asdf1234", "temp9981",
    "mail2024", "acc77812", "vk7x3p", "bot00123", "abc123456", "hjkl9876", "xyz2025", "a1b2c3d4",
    "zzqx7781", "qqq111", "newuser99", "signup4451",
];

pub const FOREST: &str = r#"{
  "meta": {"version": "3.0.0-forest", "runId": "fixture", "nTrees": 3},
  "forest": [
    {"t":"n","f":"gibberish_risk","v":0.6,"l":{"t":"l","v":0.1},"r":{"t":"l","v":0.85}},
    {"t":"n","f":"sequential_confidence","v":0.5,"l":{"t":"l","v":0.15},"r":{"t":"l","v":0.7}},
    {"t":"n","f":"digit_ratio","v":0.4,"l":{"t":"l","v":0.1},"r":{"t":"l","v":0.8}}
  ]
}"#;

pub const TREE: &str = r#"{
  "meta": {"version": "2.0.0"},
  "tree": {
    "type": "node", "feature": "digit_ratio", "threshold": 0.4, "operator": "<=",
    "left":  {"type": "leaf", "value": 0.12, "reason": "low_digit_share"},
    "right": {"type": "leaf", "value": 0.66, "reason": "digit_heavy"}
  }
}"#;

pub fn char_model(samples: &[&str]) -> String {
    CharSequenceModel::trained(2, samples.iter().copied())
        .expect("order 2 is valid")
        .to_json()
}

pub fn store() -> Arc<MemoryModelStore> {
    let s = Arc::new(MemoryModelStore::new());
    s.insert("forest.json", FOREST);
    s.insert("tree.json", TREE);
    s.insert("legit_model.json", char_model(LEGIT));
    s.insert("fraud_model.json", char_model(FRAUD));
    s
}

pub fn snapshot_with(cfg: ScoringConfig, models: &MemoryModelStore) -> Arc<ArtifactSnapshot> {
    let cache = ArtifactCache::new(ArtifactSnapshot::empty(), Duration::from_secs(3600));
    cache.refresh(models, &StaticConfigStore(cfg));
    cache.snapshot()
}

pub fn snapshot(cfg: ScoringConfig) -> Arc<ArtifactSnapshot> {
    snapshot_with(cfg, &store())
}

pub fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
}

pub fn ctx() -> RequestContext {
    RequestContext {
        received_at: at(2025, 6, 1),
        ip_address: "198.51.100.23".parse().ok(),
        user_agent: Some("Mozilla/5.0 (X11; Linux x86_64)".into()),
        accept_language: Some("en-US,en;q=0.9".into()),
        ip_country: Some("US".into()),
        ..Default::default()
    }
}
