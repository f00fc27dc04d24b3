use clap::{Parser, Subcommand};
use std::error::Error;
use std::path::PathBuf;
use std::time::Duration;

use app_replay::cache::{CacheStore, FileCacheStore};
use app_replay::config;
use app_replay::decision::{DecisionConfig, HttpDecisionClient, check_health};
use app_replay::executor::{FailureMode, PlaybackOptions, StepExecutor};
use app_replay::guardrails::Guardrails;
use app_replay::recording::Recording;
use app_replay::report::PlaybackResult;
use app_replay::session::{Session, cleanup_old_sessions, list_sessions};
use app_replay::{HttpBackend, HttpBackendConfig};

/// App Replay - UI walkthrough playback with model-assisted recovery
#[derive(Parser, Debug)]
#[command(
    name = "app-replay",
    about = "Replay recorded UI walkthroughs against an automation bridge",
    after_help = "ENVIRONMENT VARIABLES:\n\
        APP_REPLAY_BACKEND_ENDPOINT     Automation bridge base URL\n\
        APP_REPLAY_DECISION_ENDPOINT    Decision service endpoint\n\
        APP_REPLAY_DECISION_MODEL       Default decision model\n\
        APP_REPLAY_SESSION_DIR          Base directory for sessions\n\
        APP_REPLAY_CACHE_DIR            Directory for selector caches"
)]
struct Args {
    /// Enable debug logging
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Play a recording against the automation bridge
    Replay {
        /// Path to the recording JSON file
        #[arg(short, long)]
        recording: PathBuf,

        /// Locale(s) to play, one sequential run each
        #[arg(short, long, default_value = "en-US")]
        locale: Vec<String>,

        /// Output directory for artifacts (default: auto-generated session dir)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Keep artifacts after completion (default: cleanup unless --output is specified)
        #[arg(long, short = 'k')]
        keep: bool,

        /// Enable decision-service fallback for unresolvable selectors
        #[arg(long)]
        fallback: bool,

        /// Continue past failed steps instead of aborting
        /// (default when --fallback is set)
        #[arg(long)]
        continue_on_failure: bool,

        /// Maximum steps the recording may contain
        #[arg(long, env = "APP_REPLAY_MAX_STEPS")]
        max_steps: Option<usize>,

        /// Per-step timeout in milliseconds
        #[arg(long, env = "APP_REPLAY_STEP_TIMEOUT_MS")]
        step_timeout: Option<u64>,

        /// Run timeout in milliseconds
        #[arg(long, env = "APP_REPLAY_RUN_TIMEOUT_MS")]
        run_timeout: Option<u64>,

        /// Retries per step for not-found/timeout failures
        #[arg(long, env = "APP_REPLAY_STEP_RETRIES")]
        retries: Option<u32>,

        /// Decision-service cost cap in USD
        #[arg(long, env = "APP_REPLAY_COST_CAP_USD")]
        cost_cap: Option<f64>,

        /// Forbidden action pattern (repeatable, case-insensitive substring)
        #[arg(long = "forbid")]
        forbidden: Vec<String>,

        /// Automation bridge endpoint
        #[arg(long, env = "APP_REPLAY_BACKEND_ENDPOINT")]
        endpoint: Option<String>,

        /// Output results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check that the bridge and decision endpoints are reachable
    Doctor {
        /// Connection timeout in seconds
        #[arg(long, default_value = "5")]
        timeout: u64,
    },

    /// Inspect or clear persisted selector caches
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },

    /// List existing sessions
    Sessions,

    /// Remove sessions older than the given age
    Cleanup {
        /// Maximum session age in hours
        #[arg(long, default_value = "24")]
        max_age_hours: u64,
    },
}

#[derive(Subcommand, Debug)]
enum CacheCommands {
    /// Show the cache for a recording and locale
    Show {
        /// Path to the recording JSON file
        #[arg(short, long)]
        recording: PathBuf,

        /// Locale of the cache
        #[arg(short, long, default_value = "en-US")]
        locale: String,
    },

    /// Remove all caches for a recording id and locale
    Clear {
        /// Recording id
        #[arg(short, long)]
        id: String,

        /// Locale of the caches
        #[arg(short, long, default_value = "en-US")]
        locale: String,
    },
}

fn main() {
    let args = Args::parse();

    let log_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(args.command) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("Error: {}", err);
            std::process::exit(2);
        }
    }
}

fn run(command: Commands) -> Result<i32, Box<dyn Error>> {
    match command {
        Commands::Replay {
            recording,
            locale,
            output,
            keep,
            fallback,
            continue_on_failure,
            max_steps,
            step_timeout,
            run_timeout,
            retries,
            cost_cap,
            forbidden,
            endpoint,
            json,
        } => {
            let recording = Recording::from_json_file(&recording)?;
            let store = FileCacheStore::from_env();

            let mut guardrails = Guardrails::default().forbidden_actions(forbidden);
            if let Some(max_steps) = max_steps {
                guardrails = guardrails.max_steps(max_steps);
            }
            if let Some(ms) = step_timeout {
                guardrails = guardrails.step_timeout(Duration::from_millis(ms));
            }
            if let Some(ms) = run_timeout {
                guardrails = guardrails.run_timeout(Duration::from_millis(ms));
            }
            if let Some(cap) = cost_cap {
                guardrails = guardrails.cost_cap_usd(cap);
            }

            let failure_mode = if continue_on_failure || fallback {
                FailureMode::Continue
            } else {
                FailureMode::Abort
            };

            let mut results: Vec<PlaybackResult> = Vec::new();
            for locale in &locale {
                let mut options = PlaybackOptions::default()
                    .locale(locale.clone())
                    .guardrails(guardrails.clone())
                    .failure_mode(failure_mode);
                if let Some(retries) = retries {
                    options = options.step_retries(retries);
                }

                let session = match &output {
                    Some(dir) => Session::in_dir(dir.join(locale)),
                    None => {
                        Session::for_recording(&format!("{}_{}", recording.id, locale)).keep(keep)
                    }
                }
                .with_locale(locale.clone());
                session.init()?;

                let mut backend = match &endpoint {
                    Some(endpoint) => HttpBackend::new(HttpBackendConfig::new(endpoint.clone())),
                    None => HttpBackend::from_env(),
                };

                let result = if fallback {
                    let mut decision = HttpDecisionClient::from_env();
                    StepExecutor::new(&mut backend, &store, &session, options)
                        .with_fallback(&mut decision)
                        .run(&recording)
                } else {
                    StepExecutor::new(&mut backend, &store, &session, options).run(&recording)
                };

                session.write_result(&result)?;
                if !json {
                    print_summary(&result, &session);
                }
                results.push(result);
            }

            if json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            }

            Ok(if results.iter().all(PlaybackResult::passed) {
                0
            } else {
                1
            })
        }

        Commands::Doctor { timeout } => {
            let bridge = config::backend_endpoint();
            let decision = config::decision_endpoint();
            let mut healthy = true;

            for (name, endpoint) in [("bridge", &bridge), ("decision service", &decision)] {
                match check_health(endpoint, timeout) {
                    Ok(true) => println!("✓ {} reachable at {}", name, endpoint),
                    _ => {
                        println!("✗ {} NOT reachable at {}", name, endpoint);
                        healthy = false;
                    }
                }
            }
            println!(
                "decision models: {} (default), {} (escalated)",
                DecisionConfig::default().default_model,
                DecisionConfig::default().escalation_model
            );
            Ok(if healthy { 0 } else { 1 })
        }

        Commands::Cache { command } => match command {
            CacheCommands::Show { recording, locale } => {
                let recording = Recording::from_json_file(&recording)?;
                let store = FileCacheStore::from_env();
                let hash = recording.template_hash();
                match store.load(&recording.id, &locale, &hash)? {
                    Some(cache) => {
                        println!(
                            "cache for {} [{}] ({} entries, template {})",
                            cache.recording_id,
                            cache.locale,
                            cache.len(),
                            &hash[..16]
                        );
                        for entry in &cache.entries {
                            println!(
                                "  step {:>3}  {}={}  ({})",
                                entry.step_index,
                                entry.strategy,
                                entry.resolved_selector,
                                entry.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
                            );
                        }
                    }
                    None => println!(
                        "no cache for {} [{}] at template {}",
                        recording.id,
                        locale,
                        &hash[..16]
                    ),
                }
                Ok(0)
            }
            CacheCommands::Clear { id, locale } => {
                let store = FileCacheStore::from_env();
                let removed = store.clear(&id, &locale)?;
                println!("removed {} cache file(s) for {} [{}]", removed, id, locale);
                Ok(0)
            }
        },

        Commands::Sessions => {
            let sessions = list_sessions()?;
            if sessions.is_empty() {
                println!("no sessions in {}", config::session_base_dir());
            } else {
                for session in sessions {
                    println!("{}", session.display());
                }
            }
            Ok(0)
        }

        Commands::Cleanup { max_age_hours } => {
            let cleaned =
                cleanup_old_sessions(std::time::Duration::from_secs(max_age_hours * 3600))?;
            println!("removed {} session(s)", cleaned);
            Ok(0)
        }
    }
}

fn print_summary(result: &PlaybackResult, session: &Session) {
    println!(
        "\n{} [{}] -> {} ({} passed, {} failed, {:.1}s)",
        result.recording_id,
        result.locale,
        result.state,
        result.success_count,
        result.failure_count,
        result.duration_ms as f64 / 1000.0
    );
    for step in &result.steps {
        let marker = if step.succeeded() { "✓" } else { "✗" };
        let method = step
            .resolved
            .as_ref()
            .map(|r| format!(" [{}]", r.method))
            .unwrap_or_default();
        let error = step
            .error
            .as_deref()
            .map(|e| format!("  {}", e))
            .unwrap_or_default();
        println!(
            "  {} step {:>2} {}{}{}",
            marker, step.step_index, step.action, method, error
        );
    }
    if let Some(error) = &result.error {
        println!("  run error: {}", error);
    }
    if !result.artifacts.is_empty() {
        println!("  {} artifact(s) in {}", result.artifacts.len(), session.dir.display());
    }
    if result.fallback_calls > 0 {
        println!(
            "  {} decision call(s), ${:.4} spent",
            result.fallback_calls, result.cost_usd
        );
    }
}
