//! Loto Smoke Harness
//!
//! Boots a full session against an in-process site, then walks the offline
//! and persistence paths: install, offline navigation, a rejected and an
//! accepted prediction, and a restart. Prints a JSON verdict on stdout.

use anyhow::{bail, Context};
use async_trait::async_trait;
use http::StatusCode;
use loto_app::{AppConfig, Draw, PredictionError, PredictionService, Session, Tab};
use loto_common::{init_logging, LogConfig, LogFormat};
use loto_sw::{CacheConfig, FetchRequest, FetchResponse, Network, NetworkError};
use serde_json::json;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info};
use url::Url;

const ORIGIN: &str = "http://loto.local/";

/// Performance timing collector for tracking step durations.
#[derive(Default)]
struct PerfTiming {
    timings: HashMap<&'static str, Duration>,
}

impl PerfTiming {
    fn record(&mut self, step: &'static str, duration: Duration) {
        self.timings.insert(step, duration);
    }

    fn summary(&self) -> serde_json::Value {
        let mut summary = serde_json::Map::new();
        for (step, duration) in &self.timings {
            let ms = duration.as_secs_f64() * 1000.0;
            summary.insert(step.to_string(), json!((ms * 100.0).round() / 100.0));
        }
        serde_json::Value::Object(summary)
    }
}

/// Parse command line arguments
struct Args {
    config: Option<PathBuf>,
    storage_dir: Option<PathBuf>,
    query: String,
    perf_output: Option<String>,
    json_logs: bool,
}

impl Args {
    fn parse() -> Self {
        let mut args = std::env::args().skip(1);
        let mut config = None;
        let mut storage_dir = None;
        let mut query = "?tab=istoric".to_string();
        let mut perf_output = None;
        let mut json_logs = false;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" => {
                    config = args.next().map(PathBuf::from);
                }
                "--storage-dir" => {
                    storage_dir = args.next().map(PathBuf::from);
                }
                "--query" => {
                    if let Some(val) = args.next() {
                        query = val;
                    }
                }
                "--perf-output" => {
                    perf_output = args.next();
                }
                "--json-logs" => {
                    json_logs = true;
                }
                _ => {}
            }
        }

        Self {
            config,
            storage_dir,
            query,
            perf_output,
            json_logs,
        }
    }
}

/// In-process site serving the core assets, with a connectivity switch.
struct Site {
    pages: HashMap<&'static str, &'static str>,
    online: AtomicBool,
}

impl Site {
    fn new() -> Self {
        let pages = HashMap::from([
            ("/", "<html>loto generator</html>"),
            ("/offline.html", "<html>you are offline</html>"),
            ("/icons/icon-192.png", "png-192"),
            ("/icons/icon-512.png", "png-512"),
            ("/manifest.webmanifest", "{\"name\":\"Loto\"}"),
        ]);
        Self {
            pages,
            online: AtomicBool::new(true),
        }
    }

    fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }
}

#[async_trait]
impl Network for Site {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, NetworkError> {
        if !self.online.load(Ordering::SeqCst) {
            return Err(NetworkError::Offline(request.url.to_string()));
        }
        let response = match self.pages.get(request.url.path()) {
            Some(body) => FetchResponse::new(request.url.clone(), StatusCode::OK, *body),
            None => FetchResponse::new(request.url.clone(), StatusCode::NOT_FOUND, "not found"),
        };
        Ok(response)
    }
}

/// Prediction backend that always answers with the same numbers.
struct Canned(Vec<u32>);

#[async_trait]
impl PredictionService for Canned {
    async fn predict(&self, _past_draws: &[Draw]) -> Result<Vec<u32>, PredictionError> {
        Ok(self.0.clone())
    }
}

/// Collects failed checks instead of stopping at the first.
#[derive(Default)]
struct Checks {
    failures: Vec<String>,
}

impl Checks {
    fn check(&mut self, ok: bool, what: &str) {
        if ok {
            info!(check = what, "ok");
        } else {
            error!(check = what, "FAILED");
            self.failures.push(what.to_string());
        }
    }
}

fn build_config(args: &Args) -> anyhow::Result<AppConfig> {
    let mut config = match &args.config {
        Some(path) => AppConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => AppConfig::default(),
    };
    let origin = Url::parse(ORIGIN).context("parsing smoke origin")?;
    config.cache = CacheConfig {
        origin,
        ..config.cache
    };
    config.storage_dir = Some(match &args.storage_dir {
        Some(dir) => dir.clone(),
        None => std::env::temp_dir().join(format!("loto-smoke-{}", std::process::id())),
    });
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = build_config(&args)?;

    let log = if args.json_logs {
        config.log_config().with_format(LogFormat::Json)
    } else {
        LogConfig {
            format: LogFormat::Compact,
            ..config.log_config()
        }
    };
    init_logging(log);

    let start = Instant::now();
    let mut perf = PerfTiming::default();
    let mut checks = Checks::default();
    let site = Arc::new(Site::new());
    let origin = config.cache.origin.clone();

    // Boot: install + activate, hydrate state
    let step = Instant::now();
    let mut session = Session::start(&config, site.clone(), Some(&args.query)).await;
    perf.record("boot", step.elapsed());

    checks.check(session.registration().active().is_some(), "worker active");
    checks.check(session.tab() == Tab::resolve(Some(&args.query)), "tab from query");
    {
        let caches = session.registration().scope().caches.read().await;
        let cached = caches
            .get(config.cache.version.as_str())
            .map(|bucket| bucket.len())
            .unwrap_or(0);
        checks.check(cached == config.cache.core_assets.len(), "core assets cached");
        checks.check(caches.keys().len() == 1, "single cache version");
    }
    let history_before = session.state().generated_history().len();

    // Offline navigation
    site.set_online(false);
    let step = Instant::now();
    let page = session
        .fetch(&FetchRequest::navigate(origin.join("/?tab=generator")?))
        .await;
    perf.record("offline_navigation", step.elapsed());
    checks.check(
        page.map(|r| r.from_cache() && r.text().contains("offline"))
            .unwrap_or(false),
        "offline page served",
    );
    site.set_online(true);

    // Malformed prediction
    session.generate(&Canned(vec![1, 2, 3, 4, 5])).await;
    checks.check(session.generator().error().is_some(), "malformed reply surfaced");
    checks.check(
        session.state().generated_history().len() == history_before,
        "malformed reply not recorded",
    );

    // Valid prediction
    let step = Instant::now();
    session.generate(&Canned(vec![9, 3, 7, 1, 5, 2])).await;
    perf.record("generate", step.elapsed());
    let expected = Draw::from_values(&[9, 3, 7, 1, 5, 2])?.sorted();
    checks.check(
        session.state().latest_generated() == Some(&expected),
        "sorted draw prepended",
    );

    // Restart
    let step = Instant::now();
    session.shutdown().await;
    let session = Session::start(&config, site.clone(), None).await;
    perf.record("restart", step.elapsed());
    checks.check(
        session.state().latest_generated() == Some(&expected),
        "history survives restart",
    );
    checks.check(
        session.state().generated_history().len() == history_before + 1,
        "history length after restart",
    );

    if let Some(ref perf_path) = args.perf_output {
        let perf_json = json!({
            "timings": perf.summary(),
            "total_elapsed_ms": start.elapsed().as_millis()
        });
        if let Err(e) = std::fs::write(perf_path, perf_json.to_string()) {
            error!(?e, "Failed to write perf output");
        } else {
            info!(?perf_path, "Perf summary written");
        }
    }

    let failed = checks.failures.len();
    let status = if failed == 0 { "pass" } else { "fail" };
    let result = json!({
        "status": status,
        "failures": checks.failures,
        "elapsed_ms": start.elapsed().as_millis(),
        "storage_dir": config.storage_dir.as_ref().map(|d| d.display().to_string()),
        "perf": perf.summary()
    });
    println!("{}", result);

    if failed > 0 {
        bail!("{failed} smoke check(s) failed");
    }
    Ok(())
}
