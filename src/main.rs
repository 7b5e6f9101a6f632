//! flowdesk CLI entry point

use anyhow::Result;
use clap::{Parser, Subcommand};
use flowdesk::engine::VERSION;
use flowdesk::{drive, Console, EngineConfig, ProcessDefinition, ProcessEngine, RunLog};
use std::io;
use std::path::{Path, PathBuf};

const DEFAULT_DEFINITION: &str = "processes/second_approve.yml";

#[derive(Parser)]
#[command(name = "flowdesk", version, about = "Run a process definition from the console")]
struct Cli {
    /// Config file (defaults to the platform config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Deploy a definition, start it and work through its tasks
    Run {
        /// Process definition file
        #[arg(default_value = DEFAULT_DEFINITION)]
        definition: PathBuf,

        /// Do not record this run
        #[arg(long)]
        no_history: bool,
    },
    /// Check a definition file without running it
    Validate {
        definition: PathBuf,
    },
    /// List recorded runs, most recent first
    History {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
}

fn main() -> Result<()> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => EngineConfig::load_from(path)?,
        None => EngineConfig::load()?,
    };

    match cli.command {
        None => run(&config, Path::new(DEFAULT_DEFINITION), false),
        Some(Command::Run {
            definition,
            no_history,
        }) => run(&config, &definition, no_history),
        Some(Command::Validate { definition }) => validate(&definition),
        Some(Command::History { limit }) => history(&config, limit),
    }
}

fn run(config: &EngineConfig, definition_path: &Path, no_history: bool) -> Result<()> {
    log::info!("Starting flowdesk");

    let (engine, mut events) = ProcessEngine::with_events(&config.name);
    log::info!("Engine [{}], version [{}]", engine.name(), VERSION);

    log::info!("Loading definition from: {}", definition_path.display());
    let definition = ProcessDefinition::from_file(definition_path)?;
    let key = definition.key.clone();
    let mut run_log = RunLog::new(engine.name());
    engine.deploy(definition)?;

    let deployed = engine
        .latest_definition(&key)
        .ok_or_else(|| anyhow::anyhow!("Definition '{}' missing after deploy", key))?;
    log::info!("Using [{}] version {}", deployed.id, deployed.version);

    let instance = engine.start(&deployed.id)?;
    log::info!("Started process [{}]", instance.definition_id);

    let stdin = io::stdin();
    let mut console = Console::new(stdin.lock(), io::stdout(), &config.date_format);
    let outcome = drive(&engine, &instance.id, &mut console);

    while let Ok(event) = events.try_recv() {
        run_log.record(&event);
    }

    if config.record_history && !no_history {
        match run_log.save(&config.history_dir) {
            Ok(path) => log::info!("Run recorded to {}", path.display()),
            Err(e) => log::warn!("Failed to save run history: {}", e),
        }
    }

    let completed = outcome?;
    log::info!("Finished after {} task(s)", completed);
    Ok(())
}

fn validate(definition_path: &Path) -> Result<()> {
    let definition = ProcessDefinition::from_file(definition_path)?;
    definition.validate()?;

    println!(
        "{} ({}): {} step(s), {} user task(s)",
        definition.name,
        definition.key,
        definition.steps.len(),
        definition.user_task_count()
    );
    for step in &definition.steps {
        println!("  - {} [{}] {}", step.id, step.name, step.step_type());
    }
    Ok(())
}

fn history(config: &EngineConfig, limit: usize) -> Result<()> {
    let runs = RunLog::list_all(&config.history_dir)?;
    if runs.is_empty() {
        println!("No runs recorded in {}", config.history_dir.display());
        return Ok(());
    }

    for id in runs.into_iter().take(limit) {
        match RunLog::load(&config.history_dir, &id) {
            Ok(run) => {
                let status = if run.is_finished() { "ended" } else { "unfinished" };
                println!(
                    "{}  {}  {} task(s)  {}",
                    run.id,
                    run.definition_name.as_deref().unwrap_or("-"),
                    run.tasks.len(),
                    status
                );
            }
            Err(e) => log::warn!("Skipping unreadable run {}: {}", id, e),
        }
    }
    Ok(())
}
