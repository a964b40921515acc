//! Runs workflow definitions against the coordination core.
//!
//! Usage:
//!
//! ```text
//! pipeline run <workflow.json> <data-dir> [manifest-dir]
//! pipeline health <data-dir> [manifest-dir]
//! ```
//!
//! The data directory holds the persisted registry catalog
//! (`catalog.json`), an optional `config.json` (a serialized
//! [`CoreConfig`]), and the state store layout. A manifest directory, when
//! given, is scanned for collaborator-reported agent manifests and merged
//! into the catalog before anything runs.
//!
//! `run` first resumes any workflow the store reports as unfinished, then
//! executes the given definition. The process exits 0 only when every
//! required step of the submitted workflow succeeded.
//!
//! Agent implementations are linked by the embedding application; this
//! binary ships only a built-in `echo` agent (it returns its parameters as
//! its result) so definitions can be exercised end to end.

use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;
use gropius::agent::runner::AgentRunner;
use gropius::agent::{Agent, AgentHealth, TaskOutcome, TaskRequest};
use gropius::bus::services::CommunicationBus;
use gropius::config::{ConfigError, CoreConfig};
use gropius::registry::adapters::fs::{FsCatalogRepository, FsManifestSource};
use gropius::registry::domain::{AgentDescriptor, AgentName, CategoryName};
use gropius::registry::ports::ManifestSource;
use gropius::registry::services::{AgentRegistry, RegistryError};
use gropius::store::adapters::FsStateStore;
use gropius::store::ports::StateRepository;
use gropius::workflow::domain::WorkflowDefinition;
use gropius::workflow::services::{EngineError, WorkflowEngine, WorkflowReport};
use mockable::{Clock, DefaultClock};
use std::io::Write;
use std::process::ExitCode;
use std::sync::Arc;
use thiserror::Error;
use tokio::runtime::Builder;

/// Errors surfaced by the pipeline binary.
#[derive(Debug, Error)]
enum PipelineError {
    #[error("usage: pipeline <run|health> [arguments]; {0}")]
    Usage(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Built-in agent echoing its parameters back as its result.
struct EchoAgent {
    descriptor: AgentDescriptor,
}

impl EchoAgent {
    fn new() -> Result<Self, RegistryError> {
        let name = AgentName::new("echo").map_err(RegistryError::Domain)?;
        let category = CategoryName::new("utility").map_err(RegistryError::Domain)?;
        let descriptor = AgentDescriptor::new(name, category, env!("CARGO_PKG_VERSION"))
            .map_err(RegistryError::Domain)?;
        Ok(Self { descriptor })
    }
}

#[async_trait::async_trait]
impl Agent for EchoAgent {
    async fn execute(&self, task: TaskRequest) -> TaskOutcome {
        TaskOutcome::success(task.parameters)
    }

    async fn health_check(&self) -> AgentHealth {
        AgentHealth::healthy(DefaultClock.utc())
    }

    fn describe(&self) -> AgentDescriptor {
        self.descriptor.clone()
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    match run_cli() {
        Ok(code) => code,
        Err(err) => {
            tracing::error!(error = %err, "pipeline failed");
            ExitCode::from(2)
        }
    }
}

fn run_cli() -> Result<ExitCode, PipelineError> {
    let mut arguments = std::env::args().skip(1);
    let command = arguments
        .next()
        .ok_or_else(|| PipelineError::Usage("missing command".to_owned()))?;

    let runtime = Builder::new_multi_thread().enable_all().build()?;
    match command.as_str() {
        "run" => {
            let definition_path = arguments
                .next()
                .ok_or_else(|| PipelineError::Usage("run needs a workflow file".to_owned()))?;
            let data_dir = arguments
                .next()
                .ok_or_else(|| PipelineError::Usage("run needs a data directory".to_owned()))?;
            runtime.block_on(run_workflow(&definition_path, &data_dir, arguments.next()))
        }
        "health" => {
            let data_dir = arguments
                .next()
                .ok_or_else(|| PipelineError::Usage("health needs a data directory".to_owned()))?;
            runtime.block_on(report_health(&data_dir, arguments.next()))
        }
        other => Err(PipelineError::Usage(format!("unknown command: {other}"))),
    }
}

struct Core {
    registry: Arc<AgentRegistry<DefaultClock>>,
    bus: Arc<CommunicationBus<DefaultClock>>,
    store: Arc<FsStateStore>,
    engine: Arc<WorkflowEngine<FsStateStore, DefaultClock>>,
    echo: Arc<EchoAgent>,
}

async fn assemble_core(data_dir: &str, manifest_dir: Option<String>) -> Result<Core, PipelineError> {
    std::fs::create_dir_all(data_dir)?;
    let root = Dir::open_ambient_dir(data_dir, ambient_authority())?;

    let config = load_config(&root)?;
    let clock = Arc::new(DefaultClock);
    let registry = Arc::new(AgentRegistry::new(Arc::clone(&clock)));

    let catalog_repository = FsCatalogRepository::new(root.try_clone()?);
    registry.restore_from(&catalog_repository).await?;
    if let Some(path) = manifest_dir {
        let manifest_root = Dir::open_ambient_dir(&path, ambient_authority())?;
        let sources: Vec<Arc<dyn ManifestSource>> =
            vec![Arc::new(FsManifestSource::new(manifest_root))];
        registry.discover(&sources).await?;
    }

    let bus = Arc::new(CommunicationBus::new(
        Arc::clone(&registry) as Arc<dyn gropius::bus::ports::AddressBook>,
        config.bus.clone(),
        Arc::clone(&clock),
    ));
    let store = Arc::new(FsStateStore::new(
        root.try_clone()?,
        config.context_retention,
    ));
    let engine = Arc::new(WorkflowEngine::new(
        Arc::clone(&registry),
        Arc::clone(&bus),
        Arc::clone(&store),
        config.engine.clone(),
        Arc::clone(&clock),
    )?);

    let echo = Arc::new(EchoAgent::new()?);
    if !registry.is_registered(echo.describe().name()) {
        registry.register(echo.describe())?;
    }
    registry.persist(&catalog_repository).await?;

    Ok(Core {
        registry,
        bus,
        store,
        engine,
        echo,
    })
}

fn load_config(root: &Dir) -> Result<CoreConfig, ConfigError> {
    match root.read_to_string("config.json") {
        Ok(raw) => CoreConfig::from_json_str(&raw),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(CoreConfig::default()),
        Err(err) => Err(ConfigError::Io(err)),
    }
}

async fn run_workflow(
    definition_path: &str,
    data_dir: &str,
    manifest_dir: Option<String>,
) -> Result<ExitCode, PipelineError> {
    let raw = std::fs::read_to_string(definition_path)?;
    let definition = WorkflowDefinition::from_json_str(&raw)?;

    let core = assemble_core(data_dir, manifest_dir).await?;
    let echo_runner = AgentRunner::new(
        core.echo.describe().name().clone(),
        Arc::clone(&core.echo) as Arc<dyn Agent>,
        Arc::clone(&core.bus),
        Arc::clone(&core.store),
        Arc::new(DefaultClock),
        16,
    )
    .spawn();

    let resumed = core.engine.resume_incomplete().await?;
    for report in &resumed {
        tracing::info!(workflow = %report.workflow_id, status = ?report.status, "resumed workflow settled");
    }

    let report = core.engine.run(definition).await?;
    echo_runner.stop().await;
    emit_report(&report)?;

    if report.is_success() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

async fn report_health(
    data_dir: &str,
    manifest_dir: Option<String>,
) -> Result<ExitCode, PipelineError> {
    let core = assemble_core(data_dir, manifest_dir).await?;
    let agents = core.registry.list_all()?;
    let dead_letters = core
        .bus
        .dead_letters()
        .map(|letters| letters.len())
        .unwrap_or(0);
    let workflows = core.store.list_workflows().await.map_err(EngineError::Store)?;
    let unfinished = workflows
        .iter()
        .filter(|record| !matches!(record.status.as_str(), "completed" | "failed" | "cancelled"))
        .count();

    let summary = serde_json::json!({
        "registry": {
            "agents": agents.len(),
            "enabled": agents.iter().filter(|a| a.is_enabled()).count(),
        },
        "bus": { "dead_letters": dead_letters },
        "engine": { "stored_workflows": workflows.len(), "unfinished": unfinished },
    });
    writeln!(
        std::io::stdout().lock(),
        "{}",
        serde_json::to_string_pretty(&summary).map_err(ConfigError::Malformed)?
    )?;
    Ok(ExitCode::SUCCESS)
}

fn emit_report(report: &WorkflowReport) -> Result<(), PipelineError> {
    let rendered = serde_json::to_string_pretty(report).map_err(ConfigError::Malformed)?;
    writeln!(std::io::stdout().lock(), "{rendered}")?;
    Ok(())
}
