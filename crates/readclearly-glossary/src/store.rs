use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use dashmap::DashMap;
use readclearly_types::{Glossary, GlossarySource, normalize_name};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::parse::parse_table;
use crate::provider::GlossaryProvider;

/// File in the glossary directory whose first cell names the default glossary.
pub const GLOSSARY_LIST_FILE: &str = "glossary_list.csv";

const DEFAULT_TTL: Duration = Duration::from_secs(3600);
const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Directory holding `<name>.csv` files and `glossary_list.csv`.
    pub glossary_dir: PathBuf,
    /// Where remotely fetched tables are kept between restarts.
    pub cache_dir: Option<PathBuf>,
    /// Overrides the first entry of `glossary_list.csv`.
    pub default_name: Option<String>,
    pub ttl: Duration,
    pub fetch_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            glossary_dir: PathBuf::from("glossaries"),
            cache_dir: Some(PathBuf::from("glossaries/cache")),
            default_name: None,
            ttl: DEFAULT_TTL,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }
}

#[derive(Debug, Error)]
pub enum GlossaryError {
    #[error("no usable glossary: {0}")]
    Unavailable(String),
}

struct CachedGlossary {
    glossary: Arc<Glossary>,
    loaded_at: Instant,
}

/// Resolves glossary names to parsed glossaries.
///
/// Lookup order for a named glossary is the in-process cache, the local
/// directory, the remote provider, and finally the on-disk copy of an earlier
/// fetch (even if stale). Anything that cannot be resolved falls back to the
/// default glossary, which must exist locally.
pub struct GlossaryStore {
    config: StoreConfig,
    provider: Option<Arc<dyn GlossaryProvider>>,
    default_name: Option<String>,
    cache: DashMap<String, CachedGlossary>,
}

impl GlossaryStore {
    pub fn new(config: StoreConfig, provider: Option<Arc<dyn GlossaryProvider>>) -> Self {
        let default_name = config
            .default_name
            .as_deref()
            .and_then(normalize_name)
            .or_else(|| read_default_from_list(&config.glossary_dir.join(GLOSSARY_LIST_FILE)));
        match &default_name {
            Some(name) => info!("default glossary: {name}"),
            None => warn!(
                "no default glossary configured and {} has no entries",
                config.glossary_dir.join(GLOSSARY_LIST_FILE).display()
            ),
        }
        Self {
            config,
            provider,
            default_name,
            cache: DashMap::new(),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn default_name(&self) -> Option<&str> {
        self.default_name.as_deref()
    }

    /// Normalize a requested name, falling back to the default identifier.
    pub fn resolve(&self, requested: Option<&str>) -> Option<String> {
        requested
            .and_then(normalize_name)
            .or_else(|| self.default_name.clone())
    }

    /// Load the requested glossary, or the default one if it is unusable.
    pub async fn load(&self, requested: Option<&str>) -> Result<Arc<Glossary>, GlossaryError> {
        let Some(name) = self.resolve(requested) else {
            return Err(GlossaryError::Unavailable(
                "no default glossary configured".to_string(),
            ));
        };
        let default = self.default_name.as_deref();
        if default != Some(name.as_str()) {
            if let Some(glossary) = self.load_named(&name, true).await {
                return Ok(glossary);
            }
            warn!(glossary = %name, "glossary unavailable, falling back to default");
        }

        let Some(default) = default else {
            return Err(GlossaryError::Unavailable(format!(
                "glossary {name} not found and no default configured"
            )));
        };
        self.load_named(default, false)
            .await
            .ok_or_else(|| GlossaryError::Unavailable(format!("default glossary {default} not found")))
    }

    /// Drop a cached glossary so the next load goes back to its source.
    pub fn invalidate(&self, name: &str) {
        if let Some(name) = normalize_name(name) {
            self.cache.remove(&name);
        }
    }

    async fn load_named(&self, name: &str, allow_remote: bool) -> Option<Arc<Glossary>> {
        let stale = match self.cache.get(name) {
            Some(cached) if cached.loaded_at.elapsed() < self.config.ttl => {
                debug!(glossary = name, "glossary cache hit");
                return Some(Arc::clone(&cached.glossary));
            }
            Some(cached) => Some(Arc::clone(&cached.glossary)),
            None => None,
        };

        let local = self.config.glossary_dir.join(format!("{name}.csv"));
        let loaded = if let Some(bytes) = read_file(&local).await {
            Some(parse_table(name, GlossarySource::Local, &bytes))
        } else if allow_remote {
            self.load_remote(name).await
        } else {
            None
        };
        let Some(loaded) = loaded else {
            // Entry stays expired, so the next request tries its source again.
            if stale.is_some() {
                warn!(glossary = name, "refresh failed, serving expired in-memory copy");
            }
            return stale;
        };

        info!(
            glossary = name,
            source = %loaded.source(),
            entries = loaded.len(),
            "glossary loaded"
        );
        let glossary = Arc::new(loaded);
        self.cache.insert(
            name.to_string(),
            CachedGlossary {
                glossary: Arc::clone(&glossary),
                loaded_at: Instant::now(),
            },
        );
        Some(glossary)
    }

    async fn load_remote(&self, name: &str) -> Option<Glossary> {
        let cache_path = self
            .config
            .cache_dir
            .as_ref()
            .map(|dir| dir.join(format!("{name}.csv")));

        let fresh_on_disk = match &cache_path {
            Some(path) => self.is_fresh(path).await,
            None => false,
        };

        if !fresh_on_disk {
            if let Some(bytes) = self.fetch(name).await {
                if let Some(path) = &cache_path {
                    write_cache(path, &bytes).await;
                }
                return Some(parse_table(name, GlossarySource::Remote, &bytes));
            }
        }

        let path = cache_path?;
        let bytes = read_file(&path).await?;
        if !fresh_on_disk {
            warn!(glossary = name, "using stale cached copy of glossary");
        }
        Some(parse_table(name, GlossarySource::Cached, &bytes))
    }

    async fn fetch(&self, name: &str) -> Option<Vec<u8>> {
        let provider = self.provider.as_ref()?;
        match tokio::time::timeout(self.config.fetch_timeout, provider.fetch(name)).await {
            Ok(Ok(bytes)) if !bytes.is_empty() => Some(bytes),
            Ok(Ok(_)) => {
                warn!(glossary = name, "remote glossary is empty");
                None
            }
            Ok(Err(err)) => {
                warn!(glossary = name, "remote fetch failed: {err}");
                None
            }
            Err(_) => {
                warn!(
                    glossary = name,
                    "remote fetch timed out after {} ms",
                    self.config.fetch_timeout.as_millis()
                );
                None
            }
        }
    }

    async fn is_fresh(&self, path: &Path) -> bool {
        let Ok(meta) = tokio::fs::metadata(path).await else {
            return false;
        };
        meta.modified()
            .ok()
            .and_then(|modified| SystemTime::now().duration_since(modified).ok())
            .is_some_and(|age| age < self.config.ttl)
    }
}

async fn read_file(path: &Path) -> Option<Vec<u8>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Some(bytes),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => None,
        Err(err) => {
            warn!("failed to read {}: {err}", path.display());
            None
        }
    }
}

async fn write_cache(path: &Path, bytes: &[u8]) {
    if let Some(parent) = path.parent() {
        if let Err(err) = tokio::fs::create_dir_all(parent).await {
            warn!("failed to create {}: {err}", parent.display());
            return;
        }
    }
    if let Err(err) = tokio::fs::write(path, bytes).await {
        warn!("failed to cache glossary at {}: {err}", path.display());
    }
}

fn read_default_from_list(path: &Path) -> Option<String> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .ok()?;
    let record = reader.records().next()?.ok()?;
    record.get(0).and_then(normalize_name)
}
