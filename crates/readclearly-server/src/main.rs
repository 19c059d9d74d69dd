use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use axum::extract::DefaultBodyLimit;
use readclearly_annotate::{ExtractConfig, UnmatchedExtractor};
use readclearly_glossary::{
    DEFAULT_REMOTE_URL, GlossaryProvider, GlossaryStore, HttpGlossaryProvider, StoreConfig,
};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{Level, info, warn};
use tracing_subscriber::EnvFilter;

use readclearly_server::{
    AppState, CounterStore, MemoryCounterStore, MergeStrategy, UsageAggregator, UsageConfig,
    router,
};

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_GLOSSARY_DIR: &str = "glossaries";
const DEFAULT_CACHE_SUBDIR: &str = "cache";
const DEFAULT_TTL_SECS: u64 = 3600;
const DEFAULT_FETCH_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_STORE_TIMEOUT_MS: u64 = 2_000;
const DEFAULT_MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = load_config();
    info!("binding to {}:{}", config.host, config.port);
    info!("using glossaries at {}", config.glossary_dir.display());
    match &config.remote_url {
        Some(url) => info!("remote glossaries from {url}"),
        None => info!("remote glossaries disabled"),
    }
    info!(
        "glossary ttl {}s, fetch timeout {} ms, store timeout {} ms",
        config.ttl.as_secs(),
        config.fetch_timeout.as_millis(),
        config.store_timeout.as_millis()
    );
    info!("merge strategy: {:?}", config.merge_strategy);

    let provider: Option<Arc<dyn GlossaryProvider>> = match &config.remote_url {
        Some(url) => {
            let http = HttpGlossaryProvider::new(url.as_str(), config.fetch_timeout)?;
            Some(Arc::new(http) as Arc<dyn GlossaryProvider>)
        }
        None => None,
    };
    let glossaries = Arc::new(GlossaryStore::new(
        StoreConfig {
            glossary_dir: config.glossary_dir.clone(),
            cache_dir: Some(config.cache_dir.clone()),
            default_name: config.default_glossary.clone(),
            ttl: config.ttl,
            fetch_timeout: config.fetch_timeout,
        },
        provider,
    ));

    let start = Instant::now();
    match glossaries.load(None).await {
        Ok(glossary) => info!(
            "default glossary {} loaded with {} entries in {} ms",
            glossary.source_token(),
            glossary.len(),
            start.elapsed().as_millis()
        ),
        Err(err) => warn!("{err}; annotation requests will fail until it is available"),
    }

    let counters: Arc<dyn CounterStore> = Arc::new(MemoryCounterStore::new());
    let usage = Arc::new(UsageAggregator::new(
        counters,
        UsageConfig {
            strategy: config.merge_strategy,
            store_timeout: config.store_timeout,
        },
    ));
    let extractor = UnmatchedExtractor::new(ExtractConfig {
        min_len: config.candidate_min_len,
        ..ExtractConfig::default()
    });

    let state = AppState::new(glossaries, usage, extractor);
    let app = router(state)
        .layer(DefaultBodyLimit::max(config.max_body_bytes))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("invalid listen address")?;
    let listener = TcpListener::bind(addr).await?;

    axum::serve(listener, app).await?;
    Ok(())
}

#[derive(Debug, Clone)]
struct Config {
    host: String,
    port: u16,
    glossary_dir: PathBuf,
    cache_dir: PathBuf,
    remote_url: Option<String>,
    default_glossary: Option<String>,
    ttl: Duration,
    fetch_timeout: Duration,
    store_timeout: Duration,
    candidate_min_len: usize,
    merge_strategy: MergeStrategy,
    max_body_bytes: usize,
}

fn load_config() -> Config {
    let mut no_remote = false;
    let mut cli_glossary_dir: Option<PathBuf> = None;
    let mut cli_merge_strategy: Option<MergeStrategy> = None;
    let mut args = env::args().skip(1).peekable();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--no-remote" => no_remote = true,
            "--glossary-dir" => {
                if let Some(path) = args.next() {
                    cli_glossary_dir = Some(PathBuf::from(path));
                }
            }
            _ => {
                if let Some(path) = arg.strip_prefix("--glossary-dir=") {
                    cli_glossary_dir = Some(PathBuf::from(path));
                } else if let Some(strategy) = arg.strip_prefix("--merge-strategy=") {
                    cli_merge_strategy = MergeStrategy::parse(strategy);
                }
            }
        }
    }

    let host = env::var("HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string());
    let port = env_parse("PORT").unwrap_or(DEFAULT_PORT);
    let glossary_dir = cli_glossary_dir
        .or_else(|| env::var("GLOSSARY_DIR").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_GLOSSARY_DIR));
    let cache_dir = env::var("GLOSSARY_CACHE_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| glossary_dir.join(DEFAULT_CACHE_SUBDIR));
    let remote_url = if no_remote {
        None
    } else {
        Some(
            env::var("GLOSSARY_REMOTE_URL")
                .ok()
                .filter(|url| !url.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_REMOTE_URL.to_string()),
        )
    };
    let default_glossary = env::var("DEFAULT_GLOSSARY")
        .ok()
        .filter(|name| !name.trim().is_empty());
    let ttl = Duration::from_secs(env_parse("GLOSSARY_TTL_SECS").unwrap_or(DEFAULT_TTL_SECS));
    let fetch_timeout = Duration::from_millis(
        env_parse::<u64>("FETCH_TIMEOUT_MS")
            .filter(|v| *v > 0)
            .unwrap_or(DEFAULT_FETCH_TIMEOUT_MS),
    );
    let store_timeout = Duration::from_millis(
        env_parse::<u64>("STORE_TIMEOUT_MS")
            .filter(|v| *v > 0)
            .unwrap_or(DEFAULT_STORE_TIMEOUT_MS),
    );
    let candidate_min_len = env_parse::<usize>("CANDIDATE_MIN_LEN")
        .filter(|v| *v > 0)
        .unwrap_or_else(|| ExtractConfig::default().min_len);
    let merge_strategy = cli_merge_strategy
        .or_else(|| {
            env::var("MERGE_STRATEGY")
                .ok()
                .as_deref()
                .and_then(MergeStrategy::parse)
        })
        .unwrap_or_default();
    let max_body_bytes = env_parse::<usize>("MAX_BODY_BYTES")
        .filter(|v| *v > 0)
        .unwrap_or(DEFAULT_MAX_BODY_BYTES);

    Config {
        host,
        port,
        glossary_dir,
        cache_dir,
        remote_url,
        default_glossary,
        ttl,
        fetch_timeout,
        store_timeout,
        candidate_min_len,
        merge_strategy,
        max_body_bytes,
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse::<T>().ok())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let max_level = env_filter
        .max_level_hint()
        .and_then(|hint| hint.into_level())
        .unwrap_or(Level::INFO);
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_level(true)
        .with_max_level(max_level)
        .init();
}
