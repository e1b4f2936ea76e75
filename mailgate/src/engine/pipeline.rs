// mailgate/src/engine/pipeline.rs
//
// Scoring pipeline.
//
//   experiment ─▶ parse ─▶ analyzers + OOD ─▶ feature vector ─▶ model
//              ─▶ heuristics ─▶ decision
//
// `score_email` is pure: no I/O, no clock, no randomness. Whatever enrichment
// the host already has rides in on `RequestContext::enrichment`; missing
// pieces degrade to feature defaults.
//
// `RiskEngine` wraps it for hosts that want the lookups done for them:
// domain reputation, identity and geo matching run inline, MX resolution runs
// under a timeout. A lookup that misses its budget keeps running in the
// background and leaves its answer in the MX cache for the next request.
// MX answers expire (empty answers sooner) and the cache is capped; when
// full, expired entries go first, then the tenth closest to expiry.

use std::borrow::Cow;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Datelike;
use dashmap::DashMap;
use tracing::{debug, warn};

use crate::collab::{ConfigStore, DomainReputation, GeoSignals, IdentitySignals, MxLookup, ModelStore};
use crate::config::ScoringConfig;
use crate::email;
use crate::engine::experiment;
use crate::engine::policy::{Scored, Unscored};
use crate::events::{Decision, MetricsRecord, MxInfo, RequestContext, SignupRequest};
use crate::features::vector::{self, FeatureInputs, FeatureVector};
use crate::state::cache::{ArtifactCache, ArtifactSnapshot};
use crate::workers;

pub const REASON_INVALID_FORMAT: &str = "invalid_format";
pub const REASON_DISPOSABLE: &str = "disposable_domain";
pub const REASON_OOD: &str = "ood_abnormal";

#[derive(Debug, Clone)]
pub struct ScoreOutcome {
    pub decision: Decision,
    pub metrics:  MetricsRecord,
}

/// How the MX enrichment was obtained, for the metrics record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LookupFlags {
    pub mx_from_cache: bool,
    pub mx_timed_out:  bool,
}

/// Score one address against a snapshot. Total: never panics, never errors.
pub fn score_email(email: &str, ctx: &RequestContext, snapshot: &ArtifactSnapshot) -> ScoreOutcome {
    score_with_flags(email, ctx, snapshot, LookupFlags::default())
}

pub fn score_with_flags(
    raw:      &str,
    ctx:      &RequestContext,
    snapshot: &ArtifactSnapshot,
    flags:    LookupFlags,
) -> ScoreOutcome {
    let fingerprint = experiment::fingerprint(ctx);
    let (cfg, assignment) = experiment::resolve(&snapshot.config, &fingerprint, ctx.received_at);

    let (scored, features) = match email::parse(raw) {
        Err(e) => {
            debug!(fingerprint = %fingerprint, "unparseable address: {}", e);
            let scored = Unscored::new().hard(cfg.hard_scores.invalid_format, REASON_INVALID_FORMAT);
            (scored, FeatureVector::defaults())
        }
        Ok(parsed) => score_parsed(&parsed, ctx, snapshot, &cfg),
    };

    let decision = scored.adjust(&cfg, &features).decide(&cfg, assignment);

    debug!(
        fingerprint = %fingerprint,
        score = decision.score,
        decision = %decision.decision,
        source = %decision.source,
        "{}", decision.reason
    );

    let metrics = MetricsRecord {
        timestamp:         ctx.received_at,
        request_id:        ctx.request_id.clone(),
        fingerprint,
        decision:          decision.decision,
        original_decision: decision.original_decision,
        score:             decision.score,
        reason:            decision.reason.clone(),
        source:            decision.source.clone(),
        heuristics:        decision.applied_heuristics.iter().map(|h| h.reason.clone()).collect(),
        features:          features.to_map(),
        assignment:        decision.assignment.clone(),
        mx_from_cache:     flags.mx_from_cache,
        mx_timed_out:      flags.mx_timed_out,
        latency_us:        None,
    };

    ScoreOutcome { decision, metrics }
}

fn score_parsed(
    parsed:   &email::ParsedEmail,
    ctx:      &RequestContext,
    snapshot: &ArtifactSnapshot,
    cfg:      &ScoringConfig,
) -> (Scored, FeatureVector) {
    let e = &ctx.enrichment;
    let signals = workers::run_all(&parsed.normalized_local, ctx.received_at.year());
    let ood = snapshot
        .ood
        .as_ref()
        .filter(|_| cfg.ood.enabled)
        .map(|det| det.assess(&parsed.normalized_local, &cfg.ood));

    let features = vector::build(&FeatureInputs {
        email:    Some(parsed),
        signals:  Some(&signals),
        ood:      ood.as_ref(),
        domain:   e.domain.as_ref(),
        mx:       e.mx.as_ref(),
        identity: e.identity.as_ref(),
        geo:      e.geo.as_ref(),
    });

    if e.domain.as_ref().map(|d| d.is_disposable).unwrap_or(false) {
        let scored = Unscored::new().hard(cfg.hard_scores.disposable_domain, REASON_DISPOSABLE);
        return (scored, features);
    }

    let model = snapshot.models.score(&features);
    let (score, reason) = match ood {
        Some(o) if cfg.ood.apply_as_floor && o.risk > model.score => (o.risk, REASON_OOD.to_string()),
        _ => (model.score, model.reason),
    };

    (Unscored::new().score(score, reason, model.source), features)
}

// ── Async engine ──────────────────────────────────────────────────────────────

pub struct RiskEngine {
    cache:    Arc<ArtifactCache>,
    models:   Arc<dyn ModelStore>,
    config:   Arc<dyn ConfigStore>,
    domains:  Option<Arc<dyn DomainReputation>>,
    mx:       Option<Arc<dyn MxLookup>>,
    identity: Option<Arc<dyn IdentitySignals>>,
    geo:      Option<Arc<dyn GeoSignals>>,
    mx_cache: Arc<MxCache>,
}

impl RiskEngine {
    pub fn new(cache: Arc<ArtifactCache>, models: Arc<dyn ModelStore>, config: Arc<dyn ConfigStore>) -> Self {
        Self {
            cache,
            models,
            config,
            domains:  None,
            mx:       None,
            identity: None,
            geo:      None,
            mx_cache: Arc::new(MxCache::default()),
        }
    }

    pub fn with_mx_cache(mut self, ttl: Duration, negative_ttl: Duration, capacity: usize) -> Self {
        self.mx_cache = Arc::new(MxCache::new(ttl, negative_ttl, capacity));
        self
    }

    pub fn with_domain_reputation(mut self, d: Arc<dyn DomainReputation>) -> Self {
        self.domains = Some(d);
        self
    }

    pub fn with_mx_lookup(mut self, mx: Arc<dyn MxLookup>) -> Self {
        self.mx = Some(mx);
        self
    }

    pub fn with_identity(mut self, i: Arc<dyn IdentitySignals>) -> Self {
        self.identity = Some(i);
        self
    }

    pub fn with_geo(mut self, g: Arc<dyn GeoSignals>) -> Self {
        self.geo = Some(g);
        self
    }

    pub fn cache(&self) -> &ArtifactCache {
        &self.cache
    }

    pub fn mx_cache_len(&self) -> usize {
        self.mx_cache.len()
    }

    pub fn refresh(&self) {
        self.cache.refresh(self.models.as_ref(), self.config.as_ref());
    }

    pub async fn evaluate(&self, req: &SignupRequest) -> ScoreOutcome {
        let started = Instant::now();
        let snapshot = self.cache.get_or_refresh(self.models.as_ref(), self.config.as_ref());

        let mut ctx = req.context.clone();
        let mut flags = LookupFlags::default();

        if let Ok(parsed) = email::parse(&req.email) {
            self.enrich_inline(&mut ctx, &parsed);
            if ctx.enrichment.mx.is_none() {
                let fp = experiment::fingerprint(&ctx);
                let (cfg, _) = experiment::resolve(&snapshot.config, &fp, ctx.received_at);
                let budget = Duration::from_millis(cfg.mx_timeout_ms);
                let (mx, f) = self.lookup_mx(&parsed.domain, budget).await;
                ctx.enrichment.mx = mx;
                flags = f;
            }
        }

        let mut outcome = score_with_flags(&req.email, &ctx, &snapshot, flags);
        outcome.metrics.latency_us = Some(started.elapsed().as_micros() as u64);
        outcome
    }

    /// Host-supplied enrichment always wins over our own lookups.
    fn enrich_inline(&self, ctx: &mut RequestContext, parsed: &email::ParsedEmail) {
        if ctx.enrichment.domain.is_none() {
            ctx.enrichment.domain = self.domains.as_ref().and_then(|d| d.lookup(&parsed.domain));
        }
        if ctx.enrichment.identity.is_none() {
            if let (Some(m), Some(name)) = (&self.identity, ctx.display_name.as_deref()) {
                ctx.enrichment.identity = m.compare(name, &parsed.normalized_local);
            }
        }
        if ctx.enrichment.geo.is_none() {
            ctx.enrichment.geo = self.geo.as_ref().and_then(|g| g.assess(ctx));
        }
    }

    async fn lookup_mx(&self, domain: &str, budget: Duration) -> (Option<MxInfo>, LookupFlags) {
        let mut flags = LookupFlags::default();
        let Some(resolver) = &self.mx else { return (None, flags) };

        if let Some(hit) = self.mx_cache.get(domain) {
            flags.mx_from_cache = true;
            return (Some(hit), flags);
        }

        let fut = resolver.resolve(domain);
        let cache = self.mx_cache.clone();
        let key = domain.to_string();
        // Detached: dropping the handle on timeout does not cancel the lookup.
        let task = tokio::spawn(async move {
            let answer = fut.await;
            if let Some(info) = &answer {
                cache.insert(key, info.clone());
            }
            answer
        });

        match tokio::time::timeout(budget, task).await {
            Ok(Ok(answer)) => (answer, flags),
            Ok(Err(e)) => {
                warn!(domain, "mx lookup task failed: {}", e);
                (None, flags)
            }
            Err(_) => {
                debug!(domain, budget_ms = budget.as_millis() as u64, "mx lookup timed out");
                flags.mx_timed_out = true;
                (None, flags)
            }
        }
    }
}

// ── MX cache ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct MxEntry {
    info:    MxInfo,
    expires: Instant,
}

pub struct MxCache {
    entries:      DashMap<String, MxEntry>,
    ttl:          Duration,
    negative_ttl: Duration,
    capacity:     usize,
}

impl MxCache {
    pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);
    pub const DEFAULT_NEGATIVE_TTL: Duration = Duration::from_secs(300);
    pub const DEFAULT_CAPACITY: usize = 10_000;

    /// `capacity == 0` disables caching.
    pub fn new(ttl: Duration, negative_ttl: Duration, capacity: usize) -> Self {
        Self { entries: DashMap::new(), ttl, negative_ttl, capacity }
    }

    pub fn get(&self, domain: &str) -> Option<MxInfo> {
        let now = Instant::now();
        match self.entries.get(domain) {
            Some(e) if e.expires > now => return Some(e.info.clone()),
            Some(_) => {}
            None => return None,
        }
        self.entries.remove_if(domain, |_, e| e.expires <= now);
        None
    }

    pub fn insert(&self, domain: String, info: MxInfo) {
        if self.capacity == 0 {
            return;
        }
        let now = Instant::now();
        if !self.entries.contains_key(&domain) && self.entries.len() >= self.capacity {
            self.evict(now);
        }
        let ttl = if info.records.is_empty() { self.negative_ttl } else { self.ttl };
        self.entries.insert(domain, MxEntry { info, expires: now + ttl });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn evict(&self, now: Instant) {
        self.entries.retain(|_, e| e.expires > now);
        if self.entries.len() < self.capacity {
            return;
        }
        let mut by_expiry: Vec<(Instant, String)> =
            self.entries.iter().map(|e| (e.expires, e.key().clone())).collect();
        by_expiry.sort_unstable();
        let n = (self.capacity / 10).max(1);
        for (_, key) in by_expiry.into_iter().take(n) {
            self.entries.remove(&key);
        }
        debug!(dropped = n, remaining = self.entries.len(), "mx cache full");
    }
}

impl Default for MxCache {
    fn default() -> Self {
        Self::new(Self::DEFAULT_TTL, Self::DEFAULT_NEGATIVE_TTL, Self::DEFAULT_CAPACITY)
    }
}

/// Effective config for a request, exposed for hosts that log it.
pub fn effective_config<'a>(snapshot: &'a ArtifactSnapshot, ctx: &RequestContext) -> Cow<'a, ScoringConfig> {
    let fp = experiment::fingerprint(ctx);
    experiment::resolve(&snapshot.config, &fp, ctx.received_at).0
}
