//! Command-line front end for the policy optimization framework (§6).
//!
//! A single binary with subcommands, matching the reference codebase's
//! daemon-binary conventions (`clap`'s derive API, `env`-backed arguments,
//! a `tracing-subscriber` global logger installed once at startup). Unlike
//! the daemon it replaces, this binary drives one experiment run to
//! completion (or to an inspectable, replayable stop) rather than serving
//! requests.

use clap::{Args, Parser, Subcommand};
use policy_optimizer::config::ExperimentConfig;
use policy_optimizer::domain::RunId;
use policy_optimizer::error::Error;
use policy_optimizer::llm::HttpLlmClient;
use policy_optimizer::optimize::OptimizationLoop;
use policy_optimizer::persistence::{live, DatabaseStateProvider, LiveStateProvider, StateProvider};
use policy_optimizer::record::ExperimentRecord;
use policy_optimizer::simulator::ProcessSimulator;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "policy-optimizer")]
#[command(about = "LLM-driven policy optimization experiment framework")]
#[command(version)]
struct Cli {
    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Emit structured JSON logs instead of human-readable text.
    #[arg(long, global = true, env = "JSON_LOGS")]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run an experiment to convergence (or to a cooperative interrupt).
    Run(RunArgs),
    /// Load and validate an experiment YAML without running it.
    Validate {
        /// Path to the experiment YAML file.
        experiment: PathBuf,
    },
    /// Print a summary of an experiment's configuration.
    Info {
        /// Path to the experiment YAML file.
        experiment: PathBuf,
    },
    /// List experiment YAML files found in a directory.
    List {
        /// Directory to scan for `*.yaml` / `*.yml` experiment files.
        directory: PathBuf,
    },
    /// Replay a persisted run's iterations from its database.
    Replay(ReplayArgs),
    /// List persisted experiment runs in a database.
    Results(ResultsArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Path to the experiment YAML file.
    experiment: PathBuf,
    /// Override `llm.model` (e.g. `anthropic:claude-sonnet-4`).
    #[arg(long)]
    model: Option<String>,
    /// Override `master_seed`.
    #[arg(long)]
    seed: Option<u64>,
    /// Override the SQLite database path (default: `{output.directory}/{output.database_filename}`).
    #[arg(long)]
    db: Option<PathBuf>,
    /// Validate configuration and print the run plan without executing it.
    #[arg(long)]
    dry_run: bool,
    /// External simulator executable this run evaluates policies against.
    #[arg(long, env = "SIMULATOR_BIN")]
    simulator_bin: Option<PathBuf>,
    /// Log a line after every iteration.
    #[arg(long = "verbose-iterations")]
    verbose_iterations: bool,
    /// Log bootstrap sample/telemetry counters after every iteration.
    #[arg(long = "verbose-bootstrap")]
    verbose_bootstrap: bool,
    /// Log LLM call counters after every iteration.
    #[arg(long = "verbose-llm")]
    verbose_llm: bool,
    /// Log each agent's current policy shape after every iteration.
    #[arg(long = "verbose-policy")]
    verbose_policy: bool,
}

#[derive(Args, Debug)]
struct ReplayArgs {
    /// Run id to replay, as persisted in the `experiments` table.
    run_id: String,
    /// Path to the SQLite database the run was persisted to.
    #[arg(long)]
    db: PathBuf,
    /// Also print every captured `LLMInteraction` event.
    #[arg(long)]
    audit: bool,
    /// First iteration to print (default: 0).
    #[arg(long)]
    start: Option<u32>,
    /// Last iteration to print, inclusive (default: the run's last iteration).
    #[arg(long)]
    end: Option<u32>,
}

#[derive(Args, Debug)]
struct ResultsArgs {
    /// Path to the SQLite database to query.
    #[arg(long)]
    db: PathBuf,
    /// Restrict to runs with this experiment name.
    #[arg(long)]
    experiment: Option<String>,
    /// Maximum number of runs to print, most recent first.
    #[arg(long)]
    limit: Option<usize>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = init_logging(&cli.log_level, cli.json_logs) {
        eprintln!("failed to initialize logging: {e}");
        std::process::exit(1);
    }

    let is_validate = matches!(cli.command, Command::Validate { .. });

    let result = match cli.command {
        Command::Run(args) => cmd_run(args).await,
        Command::Validate { experiment } => cmd_validate(&experiment),
        Command::Info { experiment } => cmd_info(&experiment),
        Command::List { directory } => cmd_list(&directory),
        Command::Replay(args) => cmd_replay(args).await,
        Command::Results(args) => cmd_results(args).await,
    };

    match result {
        Ok(()) => std::process::exit(0),
        Err(e) if is_validate => {
            eprintln!("validation failed: {e}");
            std::process::exit(2);
        }
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(e.exit_code());
        }
    }
}

fn init_logging(level: &str, json: bool) -> Result<(), String> {
    let filter = tracing_subscriber::EnvFilter::try_new(level)
        .map_err(|e| format!("invalid log level '{level}': {e}"))?;
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let result = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    result.map_err(|e| e.to_string())
}

async fn cmd_run(args: RunArgs) -> policy_optimizer::Result<()> {
    let mut config = ExperimentConfig::load(&args.experiment)?;

    if let Some(model) = args.model {
        config.llm.model = model;
        config.llm.validate_config()?;
    }
    if let Some(seed) = args.seed {
        config.master_seed = seed;
    }

    let constraints = config.get_constraints()?;
    let system_prompt = config.get_system_prompt()?;
    let (provider, _) = config.llm.provider_and_name()?;
    let api_key_var = format!("LLM_{}_API_KEY", provider.to_uppercase());
    let api_key = std::env::var(&api_key_var).map_err(|_| {
        Error::config_field(
            format!("missing required environment variable {api_key_var}"),
            "llm.model",
        )
    })?;

    let db_path = args
        .db
        .unwrap_or_else(|| config.output_directory().join(&config.output.database_filename));

    if args.dry_run {
        info!(
            experiment = %config.name,
            agents = ?config.agents,
            mode = ?config.evaluation.mode,
            max_iterations = config.convergence.max_iterations,
            database = %db_path.display(),
            "dry run: configuration is valid, no iterations will execute"
        );
        return Ok(());
    }

    let simulator_bin = args.simulator_bin.ok_or_else(|| {
        Error::config_field(
            "--simulator-bin (or SIMULATOR_BIN) is required to run an experiment",
            "simulator_bin",
        )
    })?;
    let simulator = ProcessSimulator::new(simulator_bin, &config.scenario);
    let llm_client = HttpLlmClient::new(config.llm.clone(), api_key, system_prompt)?;

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let pool = live::connect(&db_path).await?;

    let run_id = RunId::new();
    let snapshot = config.config_snapshot()?;
    let record = ExperimentRecord::start(run_id, &config.name, snapshot);
    let state = LiveStateProvider::start(pool, &record).await?;

    info!(%run_id, experiment = %config.name, "starting optimization run");

    let mut loop_ = OptimizationLoop::new(&config, constraints, &simulator, llm_client, &state, HashMap::new());

    let mut iteration = 0u32;
    let reason = loop {
        match loop_.run_iteration(iteration).await {
            Ok(Some(reason)) => break Ok(reason),
            Ok(None) => {
                if args.verbose_iterations {
                    info!(iteration, "iteration complete");
                }
                if args.verbose_policy {
                    for (agent, policy) in loop_.policies() {
                        info!(agent = %agent, trees = policy.trees.len(), "current policy");
                    }
                }
                if args.verbose_llm || args.verbose_bootstrap {
                    let snapshot = loop_.telemetry_snapshot();
                    info!(
                        llm_calls = snapshot.llm_calls,
                        llm_errors = snapshot.llm_errors,
                        simulator_calls = snapshot.simulator_calls,
                        accepted = snapshot.proposals_accepted,
                        rejected = snapshot.proposals_rejected,
                        "telemetry"
                    );
                }
                iteration += 1;
            }
            Err(e) => break Err(e),
        }
    };

    match reason {
        Ok(reason) => {
            let snapshot = loop_.telemetry_snapshot();
            info!(
                %run_id,
                %reason,
                num_iterations = iteration + 1,
                llm_calls = snapshot.llm_calls,
                proposals_accepted = snapshot.proposals_accepted,
                proposals_rejected = snapshot.proposals_rejected,
                "run converged"
            );
            Ok(())
        }
        Err(Error::Interrupted) => {
            warn!(%run_id, "run interrupted; iterations committed before the suspension point remain durable");
            Err(Error::Interrupted)
        }
        Err(e) => Err(e),
    }
}

fn cmd_validate(path: &Path) -> policy_optimizer::Result<()> {
    let config = ExperimentConfig::load(path)?;
    println!(
        "valid: {} ({} agent(s), {:?} mode, {} max iterations)",
        config.name,
        config.agents.len(),
        config.evaluation.mode,
        config.convergence.max_iterations
    );
    Ok(())
}

fn cmd_info(path: &Path) -> policy_optimizer::Result<()> {
    let config = ExperimentConfig::load(path)?;
    println!("name:              {}", config.name);
    if !config.description.is_empty() {
        println!("description:       {}", config.description);
    }
    println!("scenario:          {}", config.scenario);
    println!("master_seed:       {}", config.master_seed);
    println!("agents:            {}", config.agents.join(", "));
    println!(
        "evaluation:        mode={:?} ticks={} num_samples={:?}",
        config.evaluation.mode, config.evaluation.ticks, config.evaluation.num_samples
    );
    println!(
        "convergence:       max_iterations={} stability_threshold={} stability_window={} improvement_threshold={}",
        config.convergence.max_iterations,
        config.convergence.stability_threshold,
        config.convergence.stability_window,
        config.convergence.improvement_threshold
    );
    println!("llm model:         {}", config.llm.model);
    println!("database:          {}", config.output_directory().join(&config.output.database_filename).display());
    println!("config hash:       {}", config.config_hash()?);
    Ok(())
}

fn cmd_list(directory: &Path) -> policy_optimizer::Result<()> {
    let entries = std::fs::read_dir(directory)?;
    let mut found = 0;

    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        if !matches!(extension.to_lowercase().as_str(), "yaml" | "yml") {
            continue;
        }

        match ExperimentConfig::load(&path) {
            Ok(config) => {
                println!(
                    "{}  name={} agents={} mode={:?}",
                    path.display(),
                    config.name,
                    config.agents.len(),
                    config.evaluation.mode
                );
                found += 1;
            }
            Err(e) => warn!(path = %path.display(), error = %e, "skipping invalid experiment file"),
        }
    }

    println!("{found} experiment file(s) found");
    Ok(())
}

async fn cmd_replay(args: ReplayArgs) -> policy_optimizer::Result<()> {
    let run_id = RunId::from_str(&args.run_id)
        .map_err(|e| Error::config_field(format!("invalid run id '{}': {e}", args.run_id), "run_id"))?;
    let pool = live::connect(&args.db).await?;
    let replay = DatabaseStateProvider::new(pool, run_id);

    let metadata = replay.get_run_metadata().await?;
    println!(
        "run {} ({}): converged={} iterations={} reason={:?}",
        metadata.run_id, metadata.experiment_name, metadata.converged, metadata.num_iterations, metadata.convergence_reason
    );

    let total = replay.get_total_iterations().await?;
    let start = args.start.unwrap_or(0);
    let end = args.end.unwrap_or(total.saturating_sub(1));

    for iteration in start..=end.min(total.saturating_sub(1)) {
        let costs = replay.get_iteration_costs(iteration).await?;
        let accepted = replay.get_iteration_accepted_changes(iteration).await?;
        println!("iteration {iteration}: costs={costs:?} accepted={accepted}");

        if args.audit {
            for event in replay.get_iteration_events(iteration).await? {
                if event.event_type == "llm_interaction" {
                    println!("  [audit] {}", event.event_data);
                }
            }
        }
    }

    Ok(())
}

async fn cmd_results(args: ResultsArgs) -> policy_optimizer::Result<()> {
    let pool = live::connect(&args.db).await?;

    let rows = sqlx::query_as::<_, (String, String, String, String, Option<String>, i64, i64, Option<String>)>(
        "SELECT run_id, name, config_json, created_at, completed_at, num_iterations, converged, convergence_reason \
         FROM experiments ORDER BY created_at DESC",
    )
    .fetch_all(&pool)
    .await
    .map_err(|e| Error::database(format!("failed to query experiments: {e}")))?;

    let limit = args.limit.unwrap_or(usize::MAX);
    let mut printed = 0;
    for (run_id, name, _config_json, created_at, completed_at, num_iterations, converged, convergence_reason) in rows {
        if let Some(filter) = &args.experiment {
            if &name != filter {
                continue;
            }
        }
        if printed >= limit {
            break;
        }
        println!(
            "{run_id}  {name}  created={created_at} completed={completed_at:?} iterations={num_iterations} converged={} reason={convergence_reason:?}",
            converged != 0
        );
        printed += 1;
    }

    Ok(())
}
