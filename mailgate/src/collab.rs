// mailgate/src/collab.rs
//
// External collaborators behind traits, plus small built-in implementations
// used by the CLI and the tests.
//
//   ModelStore        artifact bytes by name        DirModelStore
//   ConfigStore       scoring config                FileConfigStore, StaticConfigStore
//   DomainReputation  disposable / free / TLD risk  StaticDomainReputation
//   MxLookup          MX records (async, bounded)   StaticMxTable
//   IdentitySignals   display name ↔ local part     NameMatcher
//   GeoSignals        IP country ↔ locale           LocaleMatcher
//
// Production deployments swap in a KV-backed store, a DNS resolver and real
// reputation feeds; the core only sees the traits.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use crate::config::ScoringConfig;
use crate::error::{ArtifactError, ConfigError};
use crate::events::{DomainInfo, GeoMatch, IdentityMatch, MxInfo, RequestContext};

pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

// ── Traits ────────────────────────────────────────────────────────────────────

pub trait ModelStore: Send + Sync {
    fn fetch(&self, name: &str) -> Result<Vec<u8>, ArtifactError>;
}

pub trait ConfigStore: Send + Sync {
    fn load(&self) -> Result<ScoringConfig, ConfigError>;
}

pub trait DomainReputation: Send + Sync {
    fn lookup(&self, domain: &str) -> Option<DomainInfo>;
}

/// Futures are `'static` so a lookup that outlives its request budget can
/// keep running in the background.
pub trait MxLookup: Send + Sync {
    fn resolve(&self, domain: &str) -> BoxFuture<Option<MxInfo>>;
}

pub trait IdentitySignals: Send + Sync {
    fn compare(&self, display_name: &str, local_part: &str) -> Option<IdentityMatch>;
}

pub trait GeoSignals: Send + Sync {
    fn assess(&self, ctx: &RequestContext) -> Option<GeoMatch>;
}

// ── Stores ────────────────────────────────────────────────────────────────────

/// Artifacts as files in one directory.
pub struct DirModelStore {
    dir: PathBuf,
}

impl DirModelStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl ModelStore for DirModelStore {
    fn fetch(&self, name: &str) -> Result<Vec<u8>, ArtifactError> {
        let path = self.dir.join(name);
        std::fs::read(&path).map_err(|e| ArtifactError::NotFound(format!("{}: {}", path.display(), e)))
    }
}

/// In-memory artifacts, keyed by name.
#[derive(Default)]
pub struct MemoryModelStore {
    artifacts: parking_lot::RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryModelStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, name: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.artifacts.write().insert(name.into(), bytes.into());
    }

    pub fn remove(&self, name: &str) {
        self.artifacts.write().remove(name);
    }
}

impl ModelStore for MemoryModelStore {
    fn fetch(&self, name: &str) -> Result<Vec<u8>, ArtifactError> {
        self.artifacts
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| ArtifactError::NotFound(name.to_string()))
    }
}

pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ConfigStore for FileConfigStore {
    fn load(&self) -> Result<ScoringConfig, ConfigError> {
        ScoringConfig::load_from_path(&self.path)
    }
}

pub struct StaticConfigStore(pub ScoringConfig);

impl ConfigStore for StaticConfigStore {
    fn load(&self) -> Result<ScoringConfig, ConfigError> {
        self.0.validate()?;
        Ok(self.0.clone())
    }
}

// ── Domain reputation ─────────────────────────────────────────────────────────

const DISPOSABLE: &[&str] = &[
    "mailinator.com", "guerrillamail.com", "10minutemail.com", "tempmail.com",
    "temp-mail.org", "throwawaymail.com", "yopmail.com", "trashmail.com",
    "sharklasers.com", "getnada.com", "dispostable.com", "maildrop.cc",
    "fakeinbox.com", "mintemail.com", "mohmal.com", "emailondeck.com",
];

const FREE_PROVIDERS: &[&str] = &[
    "gmail.com", "yahoo.com", "outlook.com", "hotmail.com", "live.com", "aol.com",
    "icloud.com", "me.com", "proton.me", "protonmail.com", "gmx.com", "gmx.de",
    "mail.com", "yandex.ru", "zoho.com", "web.de", "qq.com", "163.com",
];

const TLD_RISK: &[(&str, f64)] = &[
    ("tk", 0.8), ("ml", 0.8), ("ga", 0.8), ("cf", 0.8), ("gq", 0.8),
    ("xyz", 0.5), ("top", 0.6), ("click", 0.6), ("buzz", 0.5), ("rest", 0.5),
    ("icu", 0.6), ("work", 0.4), ("online", 0.4), ("site", 0.4),
];

pub struct StaticDomainReputation {
    disposable: HashSet<String>,
    free:       HashSet<String>,
    tld_risk:   HashMap<String, f64>,
    reputation: HashMap<String, f64>,
}

impl Default for StaticDomainReputation {
    fn default() -> Self {
        Self {
            disposable: DISPOSABLE.iter().map(|s| s.to_string()).collect(),
            free:       FREE_PROVIDERS.iter().map(|s| s.to_string()).collect(),
            tld_risk:   TLD_RISK.iter().map(|(t, r)| (t.to_string(), *r)).collect(),
            reputation: HashMap::new(),
        }
    }
}

impl StaticDomainReputation {
    pub fn with_disposable(mut self, domain: &str) -> Self {
        self.disposable.insert(domain.to_ascii_lowercase());
        self
    }

    pub fn with_reputation(mut self, domain: &str, score: f64) -> Self {
        self.reputation.insert(domain.to_ascii_lowercase(), score);
        self
    }

    /// Exact domain or any parent domain (`x.mailinator.com`).
    fn listed(set: &HashSet<String>, domain: &str) -> bool {
        let mut d = domain;
        loop {
            if set.contains(d) {
                return true;
            }
            match d.split_once('.') {
                Some((_, rest)) if rest.contains('.') => d = rest,
                _ => return false,
            }
        }
    }
}

impl DomainReputation for StaticDomainReputation {
    fn lookup(&self, domain: &str) -> Option<DomainInfo> {
        let domain = domain.to_ascii_lowercase();
        let tld = domain.rsplit('.').next().unwrap_or_default();
        let is_disposable = Self::listed(&self.disposable, &domain);
        Some(DomainInfo {
            is_disposable,
            is_free_provider: self.free.contains(&domain),
            reputation_score: self
                .reputation
                .get(&domain)
                .copied()
                .unwrap_or(if is_disposable { 1.0 } else { 0.0 }),
            tld_risk_score: self.tld_risk.get(tld).copied().unwrap_or(0.0),
        })
    }
}

// ── MX ────────────────────────────────────────────────────────────────────────

const KNOWN_MX_PROVIDERS: &[(&str, &str)] = &[
    ("google.com", "google"),
    ("googlemail.com", "google"),
    ("outlook.com", "microsoft"),
    ("yahoodns.net", "yahoo"),
    ("icloud.com", "apple"),
    ("protonmail.ch", "proton"),
    ("zoho.com", "zoho"),
    ("mimecast.com", "mimecast"),
    ("pphosted.com", "proofpoint"),
];

/// Recognised provider behind a set of MX hosts.
pub fn mx_provider(records: &[String]) -> Option<String> {
    records.iter().find_map(|host| {
        let host = host.trim_end_matches('.').to_ascii_lowercase();
        KNOWN_MX_PROVIDERS
            .iter()
            .find(|(suffix, _)| host == *suffix || host.ends_with(&format!(".{}", suffix)))
            .map(|(_, name)| name.to_string())
    })
}

/// Fixed MX answers with an optional artificial latency. Domains absent from
/// the table resolve to "no MX records".
#[derive(Clone, Default)]
pub struct StaticMxTable {
    records: Arc<HashMap<String, Vec<String>>>,
    delay:   Option<Duration>,
}

impl StaticMxTable {
    pub fn new(records: HashMap<String, Vec<String>>) -> Self {
        Self { records: Arc::new(records), delay: None }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

impl MxLookup for StaticMxTable {
    fn resolve(&self, domain: &str) -> BoxFuture<Option<MxInfo>> {
        let records = self.records.clone();
        let delay = self.delay;
        let domain = domain.to_ascii_lowercase();
        Box::pin(async move {
            if let Some(d) = delay {
                tokio::time::sleep(d).await;
            }
            let hosts = records.get(&domain).cloned().unwrap_or_default();
            Some(MxInfo { provider: mx_provider(&hosts), records: hosts })
        })
    }
}

// ── Identity ──────────────────────────────────────────────────────────────────

/// Compares the display name a user typed with their email local part.
#[derive(Debug, Default, Clone, Copy)]
pub struct NameMatcher;

fn letters(s: &str) -> String {
    s.chars().filter(|c| c.is_alphabetic()).flat_map(char::to_lowercase).collect()
}

fn bigrams(s: &str) -> Vec<(char, char)> {
    let c: Vec<char> = s.chars().collect();
    c.windows(2).map(|w| (w[0], w[1])).collect()
}

/// Sørensen–Dice coefficient over character bigrams.
fn dice(a: &str, b: &str) -> f64 {
    let (ba, bb) = (bigrams(a), bigrams(b));
    if ba.is_empty() || bb.is_empty() {
        return 0.0;
    }
    let mut pool = bb.clone();
    let mut shared = 0usize;
    for g in &ba {
        if let Some(pos) = pool.iter().position(|x| x == g) {
            pool.swap_remove(pos);
            shared += 1;
        }
    }
    2.0 * shared as f64 / (ba.len() + bb.len()) as f64
}

impl IdentitySignals for NameMatcher {
    fn compare(&self, display_name: &str, local_part: &str) -> Option<IdentityMatch> {
        let tokens: Vec<String> = display_name
            .split(|c: char| !c.is_alphabetic())
            .map(letters)
            .filter(|t| t.chars().count() >= 2)
            .collect();
        if tokens.is_empty() {
            return None;
        }
        let local = letters(local_part);
        let hits = tokens.iter().filter(|t| local.contains(t.as_str())).count();
        Some(IdentityMatch {
            similarity:    dice(&tokens.concat(), &local),
            token_overlap: hits as f64 / tokens.len() as f64,
            name_in_email: tokens.iter().any(|t| t.chars().count() >= 3 && local.contains(t.as_str())),
        })
    }
}

// ── Geo ───────────────────────────────────────────────────────────────────────

struct Locale {
    languages: &'static [&'static str],
    /// Plausible UTC offsets in minutes, east positive.
    offsets:   (i32, i32),
}

const LOCALES: &[(&str, Locale)] = &[
    ("US", Locale { languages: &["en", "es"], offsets: (-600, -240) }),
    ("CA", Locale { languages: &["en", "fr"], offsets: (-480, -210) }),
    ("MX", Locale { languages: &["es"], offsets: (-480, -300) }),
    ("BR", Locale { languages: &["pt"], offsets: (-300, -120) }),
    ("GB", Locale { languages: &["en"], offsets: (0, 60) }),
    ("IE", Locale { languages: &["en", "ga"], offsets: (0, 60) }),
    ("FR", Locale { languages: &["fr"], offsets: (60, 120) }),
    ("DE", Locale { languages: &["de"], offsets: (60, 120) }),
    ("ES", Locale { languages: &["es", "ca"], offsets: (0, 120) }),
    ("IT", Locale { languages: &["it"], offsets: (60, 120) }),
    ("NL", Locale { languages: &["nl", "en"], offsets: (60, 120) }),
    ("PL", Locale { languages: &["pl"], offsets: (60, 120) }),
    ("RU", Locale { languages: &["ru"], offsets: (120, 720) }),
    ("NG", Locale { languages: &["en"], offsets: (60, 60) }),
    ("IN", Locale { languages: &["en", "hi"], offsets: (330, 330) }),
    ("CN", Locale { languages: &["zh"], offsets: (480, 480) }),
    ("JP", Locale { languages: &["ja"], offsets: (540, 540) }),
    ("KR", Locale { languages: &["ko"], offsets: (540, 540) }),
    ("AU", Locale { languages: &["en"], offsets: (480, 660) }),
];

/// IP country vs. Accept-Language and client timezone.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocaleMatcher;

fn primary_languages(accept_language: &str) -> Vec<String> {
    accept_language
        .split(',')
        .filter_map(|part| part.split(';').next())
        .map(|tag| tag.trim().split('-').next().unwrap_or_default().to_ascii_lowercase())
        .filter(|l| !l.is_empty() && l != "*")
        .collect()
}

impl GeoSignals for LocaleMatcher {
    fn assess(&self, ctx: &RequestContext) -> Option<GeoMatch> {
        let country = ctx.ip_country.as_deref()?.to_ascii_uppercase();
        let (_, locale) = LOCALES.iter().find(|(c, _)| *c == country)?;

        let language_mismatch = ctx
            .accept_language
            .as_deref()
            .map(primary_languages)
            .filter(|langs| !langs.is_empty())
            .map(|langs| !langs.iter().any(|l| locale.languages.contains(&l.as_str())))
            .unwrap_or(false);

        let timezone_mismatch = ctx
            .timezone_offset_minutes
            .map(|off| off < locale.offsets.0 || off > locale.offsets.1)
            .unwrap_or(false);

        let anomaly_score =
            0.5 * f64::from(u8::from(language_mismatch)) + 0.5 * f64::from(u8::from(timezone_mismatch));
        Some(GeoMatch { language_mismatch, timezone_mismatch, anomaly_score })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disposable_matches_parent_domains() {
        let rep = StaticDomainReputation::default();
        assert!(rep.lookup("mailinator.com").unwrap().is_disposable);
        assert!(rep.lookup("abc.mailinator.com").unwrap().is_disposable);
        assert!(!rep.lookup("gmail.com").unwrap().is_disposable);
        assert!(rep.lookup("gmail.com").unwrap().is_free_provider);
        assert_eq!(rep.lookup("shop.tk").unwrap().tld_risk_score, 0.8);
    }

    #[test]
    fn custom_entries() {
        let rep = StaticDomainReputation::default()
            .with_disposable("burner.example")
            .with_reputation("acme.com", 0.3);
        assert!(rep.lookup("burner.example").unwrap().is_disposable);
        assert_eq!(rep.lookup("acme.com").unwrap().reputation_score, 0.3);
    }

    #[test]
    fn mx_provider_detection() {
        let hosts = vec!["alt1.aspmx.l.google.com.".to_string()];
        assert_eq!(mx_provider(&hosts).as_deref(), Some("google"));
        assert_eq!(mx_provider(&["mx.example.org".to_string()]), None);
    }

    #[tokio::test]
    async fn static_mx_table_resolves() {
        let table = StaticMxTable::new(HashMap::from([(
            "example.com".to_string(),
            vec!["aspmx.l.google.com".to_string()],
        )]));
        let mx = table.resolve("Example.com").await.unwrap();
        assert_eq!(mx.records.len(), 1);
        assert_eq!(mx.provider.as_deref(), Some("google"));
        assert!(table.resolve("nowhere.test").await.unwrap().records.is_empty());
    }

    #[test]
    fn name_matcher() {
        let m = NameMatcher;
        let hit = m.compare("John Smith", "john.smith").unwrap();
        assert_eq!(hit.token_overlap, 1.0);
        assert!(hit.name_in_email);
        assert!(hit.similarity > 0.9);

        let miss = m.compare("Maria Garcia", "xk92qz").unwrap();
        assert_eq!(miss.token_overlap, 0.0);
        assert!(!miss.name_in_email);
        assert!(m.compare("  ", "john").is_none());
    }

    #[test]
    fn locale_matcher() {
        let ctx = RequestContext {
            ip_country: Some("DE".into()),
            accept_language: Some("de-DE,de;q=0.9,en;q=0.8".into()),
            timezone_offset_minutes: Some(120),
            ..Default::default()
        };
        let g = LocaleMatcher.assess(&ctx).unwrap();
        assert!(!g.language_mismatch && !g.timezone_mismatch);
        assert_eq!(g.anomaly_score, 0.0);

        let odd = RequestContext {
            accept_language: Some("zh-CN".into()),
            timezone_offset_minutes: Some(480),
            ..ctx
        };
        let g = LocaleMatcher.assess(&odd).unwrap();
        assert!(g.language_mismatch && g.timezone_mismatch);
        assert_eq!(g.anomaly_score, 1.0);

        assert!(LocaleMatcher.assess(&RequestContext::default()).is_none());
    }

    #[test]
    fn dir_model_store_reads_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("tree.json"), b"{}").unwrap();
        let store = DirModelStore::new(dir.path());
        assert_eq!(store.fetch("tree.json").unwrap(), b"{}");
        assert!(matches!(store.fetch("forest.json"), Err(ArtifactError::NotFound(_))));
    }
}
