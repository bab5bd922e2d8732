use anyhow::{anyhow, Result};
use backend::{BackendError, Client};
use clap::{Parser, Subcommand, ValueEnum};
use history::FileHistory;
use intel::{Category, Pagination};
use orchestrator::{LiveHandle, Orchestrator, RefreshHook, ScanSummary, ScanTrigger, SettingsStore, StatusSink};
use relay_core::{Credentials, TrafficEvent};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

mod config;

use config::Config;

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_else(|_| String::new())
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat { Text, Json }

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Toggle { On, Off }

#[derive(Debug, Parser)]
#[command(name = "jsrelay", version, about = "Relay proxied JavaScript traffic to a JSMon workspace")]
struct Cli {
    /// Config file (YAML). Defaults to ./jsrelay.yaml
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Debug logging on stderr
    #[arg(long, short, global = true, default_value_t = false)]
    verbose: bool,
    /// Output format for results
    #[arg(long, value_enum, global = true, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum ConfigCmd {
    /// Print current settings (API key masked)
    Show,
    /// Update settings and save them
    Set {
        #[arg(long)]
        api_key: Option<String>,
        #[arg(long)]
        workspace: Option<String>,
        /// Comma separated root domains; empty string clears the scope
        #[arg(long)]
        scope: Option<String>,
        #[arg(long, value_enum)]
        automate: Option<Toggle>,
        #[arg(long)]
        base_url: Option<String>,
        /// Submissions per second; 0 disables pacing
        #[arg(long)]
        submit_qps: Option<u32>,
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
}

#[derive(Debug, Subcommand)]
enum WorkspacesCmd {
    List,
    /// Create a workspace and select it
    Create { name: String },
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print version information
    Version,
    Config {
        #[command(subcommand)]
        cmd: ConfigCmd,
    },
    Workspaces {
        #[command(subcommand)]
        cmd: WorkspacesCmd,
    },
    /// Account profile and remaining scan credits
    Profile,
    /// Result totals for the selected workspace
    Counts,
    /// Keys and secrets found in the workspace
    Secrets {
        #[arg(long, default_value_t = 1, conflicts_with = "all")]
        page: u32,
        /// Fetch every page (up to 100)
        #[arg(long)]
        all: bool,
    },
    /// One intelligence category (jsurls, apipaths, urls, domains, ipaddresses, emails, s3domains, invalidnodemodules)
    Intel {
        category: Category,
        #[arg(long, default_value_t = 1, conflicts_with = "all")]
        page: u32,
        /// Fetch every page (up to 100), repeated values dropped
        #[arg(long)]
        all: bool,
    },
    /// Submit every scannable URL of a captured history (JSONL or HAR). Ctrl-C stops.
    Scan {
        #[arg(long, value_name = "FILE")]
        history: PathBuf,
        /// Per-URL outcomes (JSONL, or CSV with --csv)
        #[arg(long, value_name = "FILE")]
        out: Option<PathBuf>,
        #[arg(long, default_value_t = false)]
        csv: bool,
    },
    /// Read live JSONL traffic events from stdin and submit scannable ones as they arrive.
    /// Requires `automate_scan: on` in the config
    Watch {
        /// History to sweep first
        #[arg(long, value_name = "FILE")]
        backlog: Option<PathBuf>,
    },
}

/// Status lines go to stdout, or stderr when stdout carries JSON.
struct PrintSink {
    json: bool,
}

impl StatusSink for PrintSink {
    fn status(&self, line: &str) {
        if self.json { eprintln!("{}", line) } else { println!("{}", line) }
    }
}

/// Logs refreshed credits/counts after submissions.
struct LogRefresh {
    client: Client,
    creds: Credentials,
    rt: tokio::runtime::Handle,
}

impl RefreshHook for LogRefresh {
    fn refresh_profile(&self) {
        let client = self.client.clone();
        let key = self.creds.api_key.clone();
        self.rt.spawn(async move {
            if let Some(remaining) = client.view_profile(&key).await.and_then(|p| p.remaining) {
                info!("remaining scan credits: {}", remaining);
            }
        });
    }

    fn refresh_secrets(&self) {
        let client = self.client.clone();
        let creds = self.creds.clone();
        self.rt.spawn(async move {
            let counts = client.total_counts(&creds).await;
            let secrets = counts.resolve(Category::Secrets.key()).unwrap_or(0);
            info!(secrets, "workspace counts refreshed");
        });
    }
}

fn require_api_key(cfg: &Config) -> Result<String> {
    cfg.api_key.clone().ok_or_else(|| anyhow!("API key not set; run `jsrelay config set --api-key ...`"))
}

fn require_creds(cfg: &Config) -> Result<Credentials> {
    Ok(cfg.credentials().ok_or(BackendError::MissingConfig)?)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

fn build_orchestrator(cfg: &Config, client: &Client, json: bool) -> Orchestrator {
    let settings = Arc::new(SettingsStore::new(cfg.scan_settings()));
    let orch = Orchestrator::new(settings, Arc::new(client.clone()), Arc::new(PrintSink { json }))
        .with_submit_qps(cfg.submit_qps.unwrap_or(0));
    match cfg.credentials() {
        Some(creds) => orch.with_hooks(Arc::new(LogRefresh {
            client: client.clone(),
            creds,
            rt: tokio::runtime::Handle::current(),
        })),
        None => orch,
    }
}

fn write_outcomes(path: &Path, csv: bool, run_id: &Uuid, summary: &ScanSummary) -> Result<()> {
    let finished_at = now_rfc3339();
    if csv {
        let mut wtr = csv::Writer::from_writer(File::create(path)?);
        wtr.write_record(["run_id", "url", "succeeded", "http_status", "error", "finished_at"])?;
        for o in &summary.outcomes {
            wtr.write_record([
                run_id.to_string(),
                o.url.clone(),
                o.succeeded.to_string(),
                o.http_status.map(|v| v.to_string()).unwrap_or_default(),
                o.error_message.clone().unwrap_or_default(),
                finished_at.clone(),
            ])?;
        }
        wtr.flush()?;
    } else {
        let mut w = BufWriter::new(File::create(path)?);
        for o in &summary.outcomes {
            let obj = serde_json::json!({
                "run_id": run_id.to_string(),
                "url": o.url,
                "succeeded": o.succeeded,
                "http_status": o.http_status,
                "error": o.error_message,
                "finished_at": finished_at,
            });
            writeln!(w, "{}", serde_json::to_string(&obj)?)?;
        }
        w.flush()?;
    }
    Ok(())
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "jsrelay=info,orchestrator=info,backend=warn" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let cfg_path = config::config_path(cli.config.as_deref());
    let mut cfg = config::load_config(&cfg_path)?;
    let json = cli.format == OutputFormat::Json;
    debug!("using config {}", cfg_path.display());

    match cli.command {
        Commands::Version => {
            println!("jsrelay {} (core {})", env!("CARGO_PKG_VERSION"), relay_core::version());
        }
        Commands::Config { cmd } => match cmd {
            ConfigCmd::Show => {
                if json {
                    let mut shown = cfg.clone();
                    shown.api_key = cfg.api_key.as_deref().map(config::mask);
                    print_json(&shown)?;
                } else {
                    println!("config:        {}", cfg_path.display());
                    println!("api_key:       {}", cfg.masked_key());
                    println!("workspace_id:  {}", cfg.workspace_id.as_deref().unwrap_or("(not set)"));
                    println!("scoped_domain: {}", cfg.scoped_domain.as_deref().unwrap_or("(all domains)"));
                    println!("automate_scan: {}", if cfg.automate_scan { "on" } else { "off" });
                    println!("base_url:      {}", cfg.client_options().base_url);
                    println!("submit_qps:    {}", cfg.submit_qps.unwrap_or(0));
                }
            }
            ConfigCmd::Set { api_key, workspace, scope, automate, base_url, submit_qps, timeout_ms } => {
                if let Some(v) = api_key { cfg.api_key = Some(v); }
                if let Some(v) = workspace { cfg.workspace_id = Some(v); }
                if let Some(v) = scope { cfg.scoped_domain = Some(v); }
                if let Some(v) = base_url { cfg.base_url = Some(v); }
                if let Some(v) = submit_qps { cfg.submit_qps = Some(v); }
                if let Some(v) = timeout_ms { cfg.timeout_ms = Some(v); }
                if let Some(t) = automate {
                    if t == Toggle::On && cfg.clone().normalized().credentials().is_none() {
                        return Err(anyhow!("automatic scanning requires an API key and workspace ID"));
                    }
                    cfg.automate_scan = t == Toggle::On;
                }
                config::save_config(&cfg_path, &cfg)?;
                println!("saved {}", cfg_path.display());
            }
        },
        Commands::Workspaces { cmd } => {
            let key = require_api_key(&cfg)?;
            let client = Client::new(cfg.client_options())?;
            let rt = tokio::runtime::Runtime::new()?;
            match cmd {
                WorkspacesCmd::List => {
                    let workspaces = rt.block_on(client.list_workspaces(&key));
                    if json {
                        print_json(&workspaces)?;
                    } else if workspaces.is_empty() {
                        println!("no workspaces");
                    } else {
                        for w in workspaces {
                            let marker = if cfg.workspace_id.as_deref() == Some(w.id.as_str()) { "*" } else { " " };
                            println!("{} {}  {}", marker, w.id, w.name);
                        }
                    }
                }
                WorkspacesCmd::Create { name } => {
                    let id = rt
                        .block_on(client.create_workspace(&key, &name))
                        .ok_or_else(|| anyhow!("workspace {:?} was not created", name))?;
                    cfg.workspace_id = Some(id.clone());
                    config::save_config(&cfg_path, &cfg)?;
                    if json {
                        print_json(&serde_json::json!({ "id": id, "name": name }))?;
                    } else {
                        println!("created workspace {} ({}) and selected it", name, id);
                    }
                }
            }
        }
        Commands::Profile => {
            let key = require_api_key(&cfg)?;
            let client = Client::new(cfg.client_options())?;
            let rt = tokio::runtime::Runtime::new()?;
            let profile = rt.block_on(client.view_profile(&key)).ok_or_else(|| anyhow!("could not load profile"))?;
            if json {
                print_json(&profile)?;
            } else {
                println!("name:      {}", profile.name.as_deref().unwrap_or("-"));
                println!("email:     {}", profile.email.as_deref().unwrap_or("-"));
                println!("type:      {}", profile.account_type.as_deref().unwrap_or("-"));
                println!("remaining: {}", profile.remaining.as_deref().unwrap_or("-"));
            }
        }
        Commands::Counts => {
            let creds = require_creds(&cfg)?;
            let client = Client::new(cfg.client_options())?;
            let rt = tokio::runtime::Runtime::new()?;
            let counts = rt.block_on(client.total_counts(&creds));
            let fields = std::iter::once(Category::Secrets).chain(Category::INTELLIGENCE);
            if json {
                let obj: serde_json::Map<String, serde_json::Value> = fields
                    .map(|c| (c.key().to_string(), serde_json::json!(counts.resolve(c.key()).unwrap_or(0))))
                    .collect();
                print_json(&obj)?;
            } else {
                for c in fields {
                    println!("{:<22} {}", c.label(), counts.resolve(c.key()).unwrap_or(0));
                }
            }
        }
        Commands::Secrets { all: true, .. } => {
            let creds = require_creds(&cfg)?;
            let client = Client::new(cfg.client_options())?;
            let rt = tokio::runtime::Runtime::new()?;
            let rows = rt.block_on(async {
                let counts = client.total_counts(&creds).await;
                client.all_secrets(&creds, &counts).await
            });
            let rows = match rows {
                Ok(r) => r,
                Err(BackendError::Unauthorized) => {
                    return Err(anyhow!("unauthorized: check the API key and workspace ID"));
                }
                Err(e) => return Err(e.into()),
            };
            if json {
                print_json(&serde_json::json!({ "total": rows.len(), "rows": rows }))?;
            } else {
                for r in &rows {
                    println!("{:<10} {:<24} {:<19} {}", r.severity, r.module_name, r.created_at, r.matched_word);
                }
                println!("{} secret(s)", rows.len());
            }
        }
        Commands::Secrets { page, all: false } => {
            let creds = require_creds(&cfg)?;
            let client = Client::new(cfg.client_options())?;
            let rt = tokio::runtime::Runtime::new()?;
            let (rows, counts) = rt.block_on(async {
                let rows = client.secrets_page(&creds, page).await;
                (rows, client.total_counts(&creds).await)
            });
            let rows = match rows {
                Ok(r) => r,
                Err(BackendError::Unauthorized) => {
                    return Err(anyhow!("unauthorized: check the API key and workspace ID"));
                }
                Err(e) => return Err(e.into()),
            };
            let pages = Pagination::new(page.max(1), rows.len());
            let total = pages.total_pages(Category::Secrets.key(), &counts);
            if json {
                print_json(&serde_json::json!({ "page": page.max(1), "total_pages": total, "rows": rows }))?;
            } else {
                for r in &rows {
                    println!("{:<10} {:<24} {:<19} {}", r.severity, r.module_name, r.created_at, r.matched_word);
                }
                println!("Page {} of {}", page.max(1), total);
            }
        }
        Commands::Intel { category, .. } if category == Category::Secrets => {
            return Err(anyhow!("use `jsrelay secrets` for secrets"));
        }
        Commands::Intel { category, all: true, .. } => {
            let creds = require_creds(&cfg)?;
            let client = Client::new(cfg.client_options())?;
            let rt = tokio::runtime::Runtime::new()?;
            let entries = rt.block_on(async {
                let counts = client.total_counts(&creds).await;
                client.all_intelligence(&creds, category, &counts).await
            });
            if json {
                print_json(&serde_json::json!({
                    "category": category.key(),
                    "total": entries.len(),
                    "entries": entries,
                }))?;
            } else {
                for e in &entries {
                    println!("{:<19}  {}", e.display_time(), e.value);
                }
                println!("{} {}", entries.len(), category.label());
            }
        }
        Commands::Intel { category, page, all: false } => {
            let creds = require_creds(&cfg)?;
            let client = Client::new(cfg.client_options())?;
            let rt = tokio::runtime::Runtime::new()?;
            let (entries, counts) = rt.block_on(async {
                let entries = client.intelligence_page(&creds, category, page).await;
                (entries, client.total_counts(&creds).await)
            });
            let pages = Pagination::new(page.max(1), entries.len());
            let total = pages.total_pages(category.key(), &counts);
            if json {
                print_json(&serde_json::json!({
                    "category": category.key(),
                    "page": page.max(1),
                    "total_pages": total,
                    "has_next": pages.has_next(category.key(), &counts),
                    "entries": entries,
                }))?;
            } else {
                for e in &entries {
                    println!("{:<19}  {}", e.display_time(), e.value);
                }
                println!("Page {} of {}", page.max(1), total);
            }
        }
        Commands::Scan { history, out, csv } => {
            let client = Client::new(cfg.client_options())?;
            let rt = tokio::runtime::Runtime::new()?;
            let run_id = Uuid::now_v7();
            let started = Instant::now();
            let summary = rt.block_on(async {
                let orch = Arc::new(build_orchestrator(&cfg, &client, json));
                let source = Arc::new(FileHistory::open(history));
                let handle = orch
                    .start_bulk_scan(source, ScanTrigger::Manual)
                    .ok_or_else(|| anyhow!("a scan is already running"))?;
                let canceller = Arc::clone(&orch);
                let ctrl_c = tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        canceller.cancel_scan();
                    }
                });
                let summary = handle.await?;
                ctrl_c.abort();
                Ok::<_, anyhow::Error>(summary)
            })?;
            let duration_ms = started.elapsed().as_millis();
            if let Some(path) = out {
                write_outcomes(&path, csv, &run_id, &summary)?;
            }
            if json {
                print_json(&serde_json::json!({
                    "run_id": run_id.to_string(),
                    "duration_ms": duration_ms,
                    "summary": summary,
                }))?;
            } else {
                println!(
                    "run {}: {} candidate(s), {} succeeded, {} failed, {} skipped ({} ms)",
                    run_id, summary.candidates, summary.succeeded, summary.failed, summary.skipped, duration_ms
                );
            }
            if let Some(e) = summary.error {
                return Err(anyhow!(e));
            }
        }
        Commands::Watch { backlog } => {
            cfg.require_automation()?;
            let client = Client::new(cfg.client_options())?;
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(async {
                let orch = Arc::new(build_orchestrator(&cfg, &client, json));
                // enable through the toggle so the backlog sweep starts a fresh epoch
                orch.settings().update(|s| s.automate_scan = false);
                let sweep = match backlog {
                    Some(path) => orch.set_automate_scan(true, Arc::new(FileHistory::open(path))),
                    None => orch.set_automate_scan(true, Arc::new(Vec::<TrafficEvent>::new())),
                };
                if !orch.settings().snapshot().automate_scan {
                    return Err(anyhow!("automatic scanning requires an API key and workspace ID"));
                }

                let live = LiveHandle::spawn(Arc::clone(&orch));
                let mut lines = BufReader::new(tokio::io::stdin()).lines();
                loop {
                    tokio::select! {
                        line = lines.next_line() => {
                            let Some(line) = line? else { break };
                            match history::parse_jsonl_line(&line) {
                                Ok(Some(event)) => {
                                    let decision = live.on_response(&event);
                                    debug!(url = %event.url, ?decision, "live event");
                                }
                                Ok(None) => {}
                                Err(e) => warn!("skipping malformed event: {:#}", e),
                            }
                        }
                        _ = tokio::signal::ctrl_c() => {
                            orch.cancel_scan();
                            break;
                        }
                    }
                }
                live.shutdown().await;
                if let Some(handle) = sweep {
                    let summary = handle.await?;
                    debug!(succeeded = summary.succeeded, failed = summary.failed, "backlog sweep finished");
                }
                Ok::<_, anyhow::Error>(())
            })?;
        }
    }
    Ok(())
}
