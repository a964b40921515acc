//! End-to-end pipeline tests: registry, bus, engine, and durable state
//! working together over the public API.

use async_trait::async_trait;
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;
use chrono::Utc;
use gropius::agent::runner::{AgentRunner, RunnerHandle};
use gropius::agent::{Agent, AgentHealth, TaskOutcome, TaskRequest};
use gropius::bus::ports::AddressBook;
use gropius::bus::services::{BusConfig, CommunicationBus};
use gropius::registry::domain::{AgentDescriptor, AgentName, CategoryName};
use gropius::registry::services::AgentRegistry;
use gropius::store::adapters::FsStateStore;
use gropius::store::domain::{StepRecord, WorkflowRecord};
use gropius::store::ports::StateRepository;
use gropius::workflow::domain::{StepDefinition, WorkflowDefinition, WorkflowId};
use gropius::workflow::services::{EngineConfig, WorkflowEngine};
use mockable::DefaultClock;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use uuid::Uuid;

fn scratch_path() -> PathBuf {
    std::env::temp_dir().join(format!("gropius_e2e_{}", Uuid::new_v4()))
}

fn open_dir(path: &PathBuf) -> Dir {
    std::fs::create_dir_all(path).expect("create scratch dir");
    Dir::open_ambient_dir(path.to_str().expect("utf8 path"), ambient_authority())
        .expect("open scratch dir")
}

fn name(raw: &str) -> AgentName {
    AgentName::new(raw).expect("valid name")
}

/// Agent that labels artifacts with its own name and counts calls.
struct BuilderAgent {
    descriptor: AgentDescriptor,
    calls: AtomicU32,
}

impl BuilderAgent {
    fn new(agent_name: &str) -> Arc<Self> {
        let descriptor = AgentDescriptor::new(
            name(agent_name),
            CategoryName::new("codegen").expect("valid category"),
            "1.0.0",
        )
        .expect("valid descriptor");
        Arc::new(Self {
            descriptor,
            calls: AtomicU32::new(0),
        })
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Agent for BuilderAgent {
    async fn execute(&self, task: TaskRequest) -> TaskOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        TaskOutcome::success(json!({
            "artifact": format!("{}:{}", self.descriptor.name(), task.task_type),
        }))
    }

    async fn health_check(&self) -> AgentHealth {
        AgentHealth::healthy(Utc::now())
    }

    fn describe(&self) -> AgentDescriptor {
        self.descriptor.clone()
    }
}

struct Stack {
    registry: Arc<AgentRegistry<DefaultClock>>,
    bus: Arc<CommunicationBus<DefaultClock>>,
    store: Arc<FsStateStore>,
    engine: Arc<WorkflowEngine<FsStateStore, DefaultClock>>,
    runners: Vec<RunnerHandle>,
}

impl Stack {
    fn assemble(data_path: &PathBuf) -> Self {
        let clock = Arc::new(DefaultClock);
        let registry = Arc::new(AgentRegistry::new(Arc::clone(&clock)));
        let bus = Arc::new(CommunicationBus::new(
            Arc::clone(&registry) as Arc<dyn AddressBook>,
            BusConfig::default(),
            Arc::clone(&clock),
        ));
        let store = Arc::new(FsStateStore::new(open_dir(data_path), 8));
        let engine = Arc::new(
            WorkflowEngine::new(
                Arc::clone(&registry),
                Arc::clone(&bus),
                Arc::clone(&store),
                EngineConfig::default(),
                clock,
            )
            .expect("valid engine config"),
        );
        Self {
            registry,
            bus,
            store,
            engine,
            runners: Vec::new(),
        }
    }

    fn attach(&mut self, builder: &Arc<BuilderAgent>) {
        self.registry
            .register(builder.describe())
            .expect("registers agent");
        let runner = AgentRunner::new(
            builder.describe().name().clone(),
            Arc::clone(builder) as Arc<dyn Agent>,
            Arc::clone(&self.bus),
            Arc::clone(&self.store),
            Arc::new(DefaultClock),
            8,
        );
        self.runners.push(runner.spawn());
    }

    async fn shutdown(self) {
        for runner in self.runners {
            runner.stop().await;
        }
    }
}

fn two_step_definition() -> WorkflowDefinition {
    WorkflowDefinition {
        name: "token_pipeline".to_owned(),
        steps: vec![
            StepDefinition {
                id: "write".to_owned(),
                agent: "contract_writer".to_owned(),
                task: "write_contract".to_owned(),
                parameters: json!({"standard": "erc20"}),
                depends_on: Vec::new(),
                optional: false,
                max_attempts: 3,
                timeout_secs: 5,
            },
            StepDefinition {
                id: "audit".to_owned(),
                agent: "security_auditor".to_owned(),
                task: "audit_contract".to_owned(),
                parameters: Value::Null,
                depends_on: vec!["write".to_owned()],
                optional: false,
                max_attempts: 3,
                timeout_secs: 5,
            },
        ],
        fragments: BTreeMap::from([(
            "authoring".to_owned(),
            vec!["write".to_owned(), "audit".to_owned()],
        )]),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn workflow_completes_and_persists_durable_state() {
    let data_path = scratch_path();
    let mut stack = Stack::assemble(&data_path);
    let writer = BuilderAgent::new("contract_writer");
    let auditor = BuilderAgent::new("security_auditor");
    stack.attach(&writer);
    stack.attach(&auditor);

    let report = stack
        .engine
        .run(two_step_definition())
        .await
        .expect("run settles");

    assert!(report.is_success());
    assert_eq!(writer.calls(), 1);
    assert_eq!(auditor.calls(), 1);
    let fragment = report.fragments.first().expect("one fragment");
    assert_eq!(fragment.succeeded, 2);

    // Durable layout: agent snapshots and workflow records on disk.
    let progress = stack
        .store
        .load_workflow_progress(report.workflow_id.into_inner())
        .await
        .expect("loads")
        .expect("persisted");
    assert_eq!(progress.workflow.status, "completed");
    assert_eq!(progress.steps.len(), 2);
    let writer_state = stack
        .store
        .load_agent_state(&name("contract_writer"))
        .await
        .expect("snapshot persisted");
    assert_eq!(writer_state.metrics().tasks_succeeded, 1);

    stack.shutdown().await;

    // A fresh stack over the same directory has nothing to resume.
    let reopened = Stack::assemble(&data_path);
    let resumed = reopened
        .engine
        .resume_incomplete()
        .await
        .expect("startup scan succeeds");
    assert!(resumed.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn interrupted_workflow_resumes_from_durable_records() {
    let data_path = scratch_path();
    let mut stack = Stack::assemble(&data_path);
    let writer = BuilderAgent::new("contract_writer");
    let auditor = BuilderAgent::new("security_auditor");
    stack.attach(&writer);
    stack.attach(&auditor);

    // Simulate a crash after the first step: the workflow header says
    // running and only the first step has a terminal record.
    let workflow_id = Uuid::new_v4();
    stack
        .store
        .save_workflow_record(&WorkflowRecord {
            workflow_id,
            name: "token_pipeline".to_owned(),
            status: "running".to_owned(),
            definition: serde_json::to_value(two_step_definition()).expect("serializes"),
            updated_at: Utc::now(),
        })
        .await
        .expect("saves");
    stack
        .store
        .save_step_result(
            workflow_id,
            &StepRecord {
                step_id: "write".to_owned(),
                status: "succeeded".to_owned(),
                attempt_count: 1,
                result: Some(json!({"artifact": "recovered"})),
                error: None,
                recorded_at: Utc::now(),
            },
        )
        .await
        .expect("saves");

    let resumed = stack
        .engine
        .resume_incomplete()
        .await
        .expect("startup scan succeeds");

    let report = resumed.first().expect("one resumed workflow");
    assert!(report.is_success());
    assert_eq!(report.workflow_id, WorkflowId::from_uuid(workflow_id));
    // The recorded step kept its result and was not re-executed.
    assert_eq!(writer.calls(), 0);
    assert_eq!(auditor.calls(), 1);
    let write_step = report
        .steps
        .iter()
        .find(|step| step.step_id.as_str() == "write")
        .expect("step in report");
    assert_eq!(write_step.result, Some(json!({"artifact": "recovered"})));

    stack.shutdown().await;
}
