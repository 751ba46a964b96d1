//! Language-generation collaborator: provider abstraction + file cache + daily limit.
//!
//! The pipeline treats the model as an opaque `complete(prompt, system) -> text`
//! function that may fail, time out or return garbage; callers always hold a fallback.

use std::fs;
use std::future::Future;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::ai::AiConfig;
use crate::error::LlmError;

pub type LlmFuture<'a> = Pin<Box<dyn Future<Output = Result<String, LlmError>> + Send + 'a>>;

/// Trait object used by the FeedBuilder (and tests).
pub trait LanguageModel: Send + Sync {
    fn complete<'a>(&'a self, prompt: &'a str, system: &'a str) -> LlmFuture<'a>;
    /// Provider name for diagnostics.
    fn provider_name(&self) -> &'static str;
}

pub type DynLanguageModel = Arc<dyn LanguageModel>;

/// Factory: build a client according to config and environment variables.
///
/// * If `AI_TEST_MODE=mock`, returns a deterministic local themer.
/// * Else if `config.enabled==false`, returns a disabled client.
/// * Else builds the real provider wrapped with caching + daily limit.
pub fn build_client_from_config(config: &AiConfig) -> DynLanguageModel {
    if std::env::var("AI_TEST_MODE")
        .map(|v| v == "mock")
        .unwrap_or(false)
    {
        return Arc::new(MockThemer);
    }

    if !config.enabled {
        return Arc::new(DisabledClient);
    }

    match config.provider.as_str() {
        "openai" => match OpenAiProvider::new(config) {
            Ok(provider) => {
                let mut client = CachingClient::new(
                    provider,
                    PathBuf::from(&config.cache_dir),
                    config.daily_limit,
                )
                .with_validator(crate::feed::reply_fits_prompt);
                if config.cache_ttl_hours > 0 {
                    client = client.with_ttl(Duration::from_secs(config.cache_ttl_hours * 3600));
                }
                Arc::new(client)
            }
            Err(e) => {
                tracing::warn!(target: "llm", error = ?e, "provider init failed; disabling");
                Arc::new(DisabledClient)
            }
        },
        other => {
            tracing::warn!(target: "llm", provider = other, "unsupported provider; disabling");
            Arc::new(DisabledClient)
        }
    }
}

// ------------------------------------------------------------
// Provider abstraction + concrete providers
// ------------------------------------------------------------

/// Low-level provider: does a *real* remote call. Separated so the same caching
/// wrapper serves production and tests.
pub trait Provider: Send + Sync + 'static {
    fn fetch<'a>(&'a self, prompt: &'a str, system: &'a str) -> LlmFuture<'a>;
    fn name(&self) -> &'static str;
}

/// OpenAI-compatible chat-completions provider.
pub struct OpenAiProvider {
    http: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
}

impl OpenAiProvider {
    pub fn new(cfg: &AiConfig) -> Result<Self, LlmError> {
        let http = reqwest::Client::builder()
            .user_agent("holdings-feed/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()?;
        let base = cfg
            .base_url
            .clone()
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string());
        Ok(Self {
            http,
            api_key: cfg.api_key.clone(),
            model: cfg.model.clone(),
            endpoint: format!("{}/chat/completions", base.trim_end_matches('/')),
        })
    }
}

impl Provider for OpenAiProvider {
    fn fetch<'a>(&'a self, prompt: &'a str, system: &'a str) -> LlmFuture<'a> {
        Box::pin(async move {
            if self.api_key.is_empty() {
                return Err(LlmError::Disabled);
            }

            #[derive(Serialize)]
            struct Msg<'a> {
                role: &'a str,
                content: &'a str,
            }
            #[derive(Serialize)]
            struct Req<'a> {
                model: &'a str,
                messages: Vec<Msg<'a>>,
                temperature: f32,
                max_tokens: u32,
            }
            #[derive(Deserialize)]
            struct Resp {
                choices: Vec<Choice>,
            }
            #[derive(Deserialize)]
            struct Choice {
                message: ChoiceMsg,
            }
            #[derive(Deserialize)]
            struct ChoiceMsg {
                #[serde(default)]
                content: Option<String>,
            }

            let req = Req {
                model: &self.model,
                messages: vec![
                    Msg {
                        role: "system",
                        content: system,
                    },
                    Msg {
                        role: "user",
                        content: prompt,
                    },
                ],
                temperature: 0.2,
                max_tokens: 1200,
            };

            let resp = self
                .http
                .post(&self.endpoint)
                .bearer_auth(&self.api_key)
                .json(&req)
                .send()
                .await?;

            let status = resp.status();
            if !status.is_success() {
                return Err(LlmError::Status {
                    status: status.as_u16(),
                });
            }
            let body: Resp = resp.json().await?;
            let content = body
                .choices
                .into_iter()
                .next()
                .and_then(|c| c.message.content)
                .unwrap_or_default();
            let trimmed = content.trim();
            if trimmed.is_empty() {
                Err(LlmError::EmptyResponse)
            } else {
                Ok(trimmed.to_string())
            }
        })
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

/// Always fails with `Disabled`; used when generation is switched off.
pub struct DisabledClient;

impl LanguageModel for DisabledClient {
    fn complete<'a>(&'a self, _prompt: &'a str, _system: &'a str) -> LlmFuture<'a> {
        Box::pin(async { Err(LlmError::Disabled) })
    }
    fn provider_name(&self) -> &'static str {
        "disabled"
    }
}

#[derive(Debug, Clone)]
enum Reply {
    Text(String),
    Fail(String),
}

/// Fixed-response model for tests and local runs. Records every prompt it sees.
pub struct StaticModel {
    reply: Reply,
    delay: Option<Duration>,
    calls: AtomicUsize,
    last_prompt: Mutex<Option<String>>,
}

impl StaticModel {
    pub fn reply(text: impl Into<String>) -> Self {
        Self::with(Reply::Text(text.into()))
    }

    pub fn failing(reason: impl Into<String>) -> Self {
        Self::with(Reply::Fail(reason.into()))
    }

    fn with(reply: Reply) -> Self {
        Self {
            reply,
            delay: None,
            calls: AtomicUsize::new(0),
            last_prompt: Mutex::new(None),
        }
    }

    /// Sleep before answering (for timeout paths).
    pub fn delayed(mut self, d: Duration) -> Self {
        self.delay = Some(d);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.last_prompt.lock().ok().and_then(|g| g.clone())
    }

    async fn answer(&self, prompt: &str) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut g) = self.last_prompt.lock() {
            *g = Some(prompt.to_string());
        }
        if let Some(d) = self.delay {
            tokio::time::sleep(d).await;
        }
        match &self.reply {
            Reply::Text(t) => Ok(t.clone()),
            Reply::Fail(r) => Err(LlmError::Other(r.clone())),
        }
    }
}

impl LanguageModel for StaticModel {
    fn complete<'a>(&'a self, prompt: &'a str, _system: &'a str) -> LlmFuture<'a> {
        Box::pin(self.answer(prompt))
    }
    fn provider_name(&self) -> &'static str {
        "static"
    }
}

impl Provider for StaticModel {
    fn fetch<'a>(&'a self, prompt: &'a str, _system: &'a str) -> LlmFuture<'a> {
        Box::pin(self.answer(prompt))
    }
    fn name(&self) -> &'static str {
        "static"
    }
}

static RE_PROMPT_ITEM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\[(\d+)\]").expect("prompt item regex"));
static RE_PROMPT_MAX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^Max themes: (\d+)").expect("prompt max regex"));

/// Deterministic local themer for `AI_TEST_MODE=mock`: reads the numbered items and
/// the theme maximum from the prompt and groups consecutive items.
pub struct MockThemer;

impl MockThemer {
    fn themes_for(prompt: &str) -> Result<String, LlmError> {
        let indices: Vec<usize> = RE_PROMPT_ITEM
            .captures_iter(prompt)
            .filter_map(|c| c.get(1)?.as_str().parse().ok())
            .collect();
        if indices.is_empty() {
            return Err(LlmError::EmptyResponse);
        }
        let max = RE_PROMPT_MAX
            .captures(prompt)
            .and_then(|c| c.get(1)?.as_str().parse::<usize>().ok())
            .unwrap_or(1)
            .max(1);
        let per_theme = indices.len().div_ceil(max);

        let themes: Vec<serde_json::Value> = indices
            .chunks(per_theme)
            .enumerate()
            .map(|(i, chunk)| {
                serde_json::json!({
                    "name": format!("Theme {}", i + 1),
                    "hook": format!("{} related developments", chunk.len()),
                    "explanation": "Grouped locally without a language model.",
                    "why_it_matters": "These stories touch names you follow.",
                    "clusters": chunk,
                })
            })
            .collect();
        serde_json::to_string(&themes).map_err(|e| LlmError::Other(e.to_string()))
    }
}

impl LanguageModel for MockThemer {
    fn complete<'a>(&'a self, prompt: &'a str, _system: &'a str) -> LlmFuture<'a> {
        let out = Self::themes_for(prompt);
        Box::pin(async move { out })
    }
    fn provider_name(&self) -> &'static str {
        "mock"
    }
}

// ------------------------------------------------------------
// Caching client wrapper (file cache + daily limit)
// ------------------------------------------------------------

/// Checks a fresh reply against its prompt before it may be cached.
pub type ReplyValidator = Arc<dyn Fn(&str, &str) -> bool + Send + Sync>;

/// Counter state is guarded by a `Mutex`; cache files are written atomically via rename.
pub struct CachingClient<P: Provider> {
    inner: P,
    cache_dir: PathBuf,
    daily_limit_max: u32,
    counter: Arc<Mutex<DailyCounter>>,
    ttl: Option<Duration>,
    validator: Option<ReplyValidator>,
}

impl<P: Provider> CachingClient<P> {
    pub fn new(inner: P, cache_dir: PathBuf, daily_limit_max: u32) -> Self {
        if let Err(e) = fs::create_dir_all(&cache_dir) {
            tracing::warn!(target: "llm", error = ?e, dir = %cache_dir.display(), "cache dir unavailable");
        }
        let counter = Arc::new(Mutex::new(
            load_daily_counter(&cache_dir).unwrap_or_default(),
        ));
        Self {
            inner,
            cache_dir,
            daily_limit_max,
            counter,
            ttl: None,
            validator: None,
        }
    }

    /// Entries older than `ttl` are misses; expired files are removed right away.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        let removed = prune_expired(&self.cache_dir, ttl, now_secs());
        if removed > 0 {
            tracing::debug!(target: "llm", removed, "pruned expired cache entries");
        }
        self
    }

    /// Only replies accepted by `validator(prompt, reply)` are written to the cache.
    pub fn with_validator(mut self, validator: impl Fn(&str, &str) -> bool + Send + Sync + 'static) -> Self {
        self.validator = Some(Arc::new(validator));
        self
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }

    /// Real provider calls made today.
    pub fn calls_today(&self) -> u32 {
        self.counter.lock().map(|g| g.count).unwrap_or(0)
    }

    async fn complete_impl(&self, prompt: &str, system: &str) -> Result<String, LlmError> {
        let key = cache_key(prompt, system);
        if let Some(hit) = read_cache_file(&self.cache_dir, &key) {
            if self.is_fresh(&hit) {
                tracing::debug!(target: "llm", %key, "cache hit");
                return Ok(hit.text);
            }
            let _ = fs::remove_file(cache_path(&self.cache_dir, &key));
        }

        // Only real calls count against the limit.
        {
            let mut g = self
                .counter
                .lock()
                .map_err(|_| LlmError::Other("daily counter poisoned".into()))?;
            if g.is_expired() {
                g.reset_to_today();
                let _ = save_daily_counter(&self.cache_dir, &g);
            }
            if g.count >= self.daily_limit_max {
                return Err(LlmError::DailyLimit {
                    limit: self.daily_limit_max,
                });
            }
        }

        let fresh = self.inner.fetch(prompt, system).await?;
        if fresh.trim().is_empty() {
            return Err(LlmError::EmptyResponse);
        }
        let entry = CachedCompletion {
            text: fresh,
            created_at: now_secs(),
        };
        let cacheable = self.validator.as_ref().map_or(true, |v| v(prompt, &entry.text));
        if !cacheable {
            tracing::debug!(target: "llm", %key, "reply failed validation; not cached");
        } else if let Err(e) = write_cache_file(&self.cache_dir, &key, &entry) {
            tracing::warn!(target: "llm", error = ?e, "cache write failed");
        }
        if let Ok(mut g) = self.counter.lock() {
            g.count = g.count.saturating_add(1);
            let _ = save_daily_counter(&self.cache_dir, &g);
        }
        Ok(entry.text)
    }
}

impl<P: Provider> CachingClient<P> {
    fn is_fresh(&self, entry: &CachedCompletion) -> bool {
        match self.ttl {
            Some(ttl) => now_secs().saturating_sub(entry.created_at) < ttl.as_secs(),
            None => true,
        }
    }
}

impl<P: Provider> LanguageModel for CachingClient<P> {
    fn complete<'a>(&'a self, prompt: &'a str, system: &'a str) -> LlmFuture<'a> {
        Box::pin(self.complete_impl(prompt, system))
    }
    fn provider_name(&self) -> &'static str {
        self.inner.name()
    }
}

// ------------------------------------------------------------
// File cache helpers
// ------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedCompletion {
    text: String,
    /// Unix seconds; entries written without it count as expired under a TTL.
    #[serde(default)]
    created_at: u64,
}

fn now_secs() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp()).unwrap_or(0)
}

/// Delete cache entries older than `ttl`. Returns how many were removed.
fn prune_expired(dir: &Path, ttl: Duration, now: u64) -> usize {
    let Ok(entries) = fs::read_dir(dir) else {
        return 0;
    };
    let mut removed = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        let is_cache_file = path.extension().is_some_and(|e| e == "json")
            && path.file_name() != Some(std::ffi::OsStr::new("daily_count.json"));
        if !is_cache_file {
            continue;
        }
        let expired = fs::read_to_string(&path)
            .ok()
            .and_then(|s| serde_json::from_str::<CachedCompletion>(&s).ok())
            .is_some_and(|c| now.saturating_sub(c.created_at) >= ttl.as_secs());
        if expired && fs::remove_file(&path).is_ok() {
            removed += 1;
        }
    }
    removed
}

fn cache_key(prompt: &str, system: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(system.as_bytes());
    hasher.update([0u8]);
    hasher.update(prompt.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(32);
    for b in digest.iter().take(16) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

fn cache_path(dir: &Path, key: &str) -> PathBuf {
    dir.join(format!("{key}.json"))
}

fn read_cache_file(dir: &Path, key: &str) -> Option<CachedCompletion> {
    let path = cache_path(dir, key);
    let mut file = fs::File::open(path).ok()?;
    let mut buf = String::new();
    file.read_to_string(&mut buf).ok()?;
    serde_json::from_str(&buf).ok()
}

fn write_cache_file(dir: &Path, key: &str, value: &CachedCompletion) -> io::Result<()> {
    let path = cache_path(dir, key);
    let tmp = path.with_extension("json.tmp");
    let json = serde_json::to_string(value).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let mut f = fs::File::create(&tmp)?;
    f.write_all(json.as_bytes())?;
    fs::rename(tmp, path)?;
    Ok(())
}

// ------------------------------------------------------------
// Daily counter helpers
// ------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DailyCounter {
    date: String,
    count: u32,
}

impl Default for DailyCounter {
    fn default() -> Self {
        Self {
            date: today(),
            count: 0,
        }
    }
}

impl DailyCounter {
    fn is_expired(&self) -> bool {
        self.date != today()
    }
    fn reset_to_today(&mut self) {
        self.date = today();
        self.count = 0;
    }
}

fn today() -> String {
    chrono::Utc::now().date_naive().to_string()
}

fn counter_path(dir: &Path) -> PathBuf {
    dir.join("daily_count.json")
}

fn load_daily_counter(dir: &Path) -> io::Result<DailyCounter> {
    let s = fs::read_to_string(counter_path(dir))?;
    serde_json::from_str(&s).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

fn save_daily_counter(dir: &Path, dc: &DailyCounter) -> io::Result<()> {
    let p = counter_path(dir);
    let tmp = p.with_extension("json.tmp");
    let s = serde_json::to_string(dc).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let mut f = fs::File::create(&tmp)?;
    f.write_all(s.as_bytes())?;
    fs::rename(tmp, p)?;
    Ok(())
}
