//! Scenario tests for the workflow engine.

use crate::agent::runner::{AgentRunner, RunnerHandle};
use crate::agent::{Agent, AgentHealth, TaskOutcome, TaskRequest};
use crate::bus::domain::{DeliveryGuarantee, Priority, TopicName};
use crate::bus::services::{BusConfig, CommunicationBus};
use crate::config::BackoffPolicy;
use crate::registry::domain::{AgentDescriptor, AgentName, CategoryName};
use crate::registry::services::AgentRegistry;
use crate::store::adapters::InMemoryStateStore;
use crate::store::domain::{StepRecord, WorkflowRecord};
use crate::store::ports::StateRepository;
use crate::workflow::domain::{
    StepDefinition, StepStatus, WorkflowDefinition, WorkflowId, WorkflowStatus,
};
use crate::workflow::services::{EngineConfig, EngineError, WorkflowEngine};
use async_trait::async_trait;
use chrono::Utc;
use mockable::DefaultClock;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use uuid::Uuid;

fn name(raw: &str) -> AgentName {
    AgentName::new(raw).expect("valid name")
}

fn descriptor(agent: &str) -> AgentDescriptor {
    AgentDescriptor::new(
        name(agent),
        CategoryName::new("codegen").expect("valid category"),
        "1.0.0",
    )
    .expect("valid descriptor")
}

/// Test agent scripted to fail a fixed number of times before succeeding.
struct ScriptedAgent {
    agent_name: &'static str,
    failures_before_success: u32,
    always_fail: bool,
    delay: Duration,
    calls: AtomicU32,
    last_context: std::sync::Mutex<Option<Value>>,
}

impl ScriptedAgent {
    fn reliable(agent_name: &'static str) -> Arc<Self> {
        Self::flaky(agent_name, 0)
    }

    fn flaky(agent_name: &'static str, failures_before_success: u32) -> Arc<Self> {
        Arc::new(Self {
            agent_name,
            failures_before_success,
            always_fail: false,
            delay: Duration::ZERO,
            calls: AtomicU32::new(0),
            last_context: std::sync::Mutex::new(None),
        })
    }

    fn broken(agent_name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            agent_name,
            failures_before_success: 0,
            always_fail: true,
            delay: Duration::ZERO,
            calls: AtomicU32::new(0),
            last_context: std::sync::Mutex::new(None),
        })
    }

    fn slow(agent_name: &'static str, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            agent_name,
            failures_before_success: 0,
            always_fail: false,
            delay,
            calls: AtomicU32::new(0),
            last_context: std::sync::Mutex::new(None),
        })
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn last_context(&self) -> Option<Value> {
        self.last_context.lock().expect("context lock").clone()
    }
}

#[async_trait]
impl Agent for ScriptedAgent {
    async fn execute(&self, task: TaskRequest) -> TaskOutcome {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        *self.last_context.lock().expect("context lock") = Some(task.context.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.always_fail || call <= self.failures_before_success {
            TaskOutcome::failure(format!("scripted failure {call}"))
        } else {
            TaskOutcome::success(json!({"call": call}))
        }
    }

    async fn health_check(&self) -> AgentHealth {
        AgentHealth::healthy(Utc::now())
    }

    fn describe(&self) -> AgentDescriptor {
        descriptor(self.agent_name)
    }
}

type TestEngine = WorkflowEngine<InMemoryStateStore, DefaultClock>;

struct Harness {
    registry: Arc<AgentRegistry<DefaultClock>>,
    bus: Arc<CommunicationBus<DefaultClock>>,
    store: Arc<InMemoryStateStore>,
    engine: Arc<TestEngine>,
    runners: Vec<RunnerHandle>,
}

impl Harness {
    fn new() -> Self {
        let clock = Arc::new(DefaultClock);
        let registry = Arc::new(AgentRegistry::new(Arc::clone(&clock)));
        let bus = Arc::new(CommunicationBus::new(
            Arc::clone(&registry) as Arc<dyn crate::bus::ports::AddressBook>,
            BusConfig::default(),
            Arc::clone(&clock),
        ));
        let store = Arc::new(InMemoryStateStore::new(16));
        let config = EngineConfig {
            retry_backoff: BackoffPolicy::new(
                Duration::from_millis(5),
                2,
                Duration::from_millis(40),
            )
            .expect("valid backoff"),
            ..EngineConfig::default()
        };
        let engine = Arc::new(
            WorkflowEngine::new(
                Arc::clone(&registry),
                Arc::clone(&bus),
                Arc::clone(&store),
                config,
                Arc::clone(&clock),
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

    fn add_agent(&mut self, agent: &Arc<ScriptedAgent>) {
        self.registry
            .register(agent.describe())
            .expect("registers agent");
        let runner = AgentRunner::new(
            name(agent.agent_name),
            Arc::clone(agent) as Arc<dyn Agent>,
            Arc::clone(&self.bus),
            Arc::clone(&self.store),
            Arc::new(DefaultClock),
            16,
        );
        self.runners.push(runner.spawn());
    }

    async fn shutdown(self) {
        for runner in self.runners {
            runner.stop().await;
        }
    }
}

fn step_def(id: &str, agent: &str, depends_on: &[&str]) -> StepDefinition {
    StepDefinition {
        id: id.to_owned(),
        agent: agent.to_owned(),
        task: "build".to_owned(),
        parameters: json!({}),
        depends_on: depends_on.iter().map(|&d| d.to_owned()).collect(),
        optional: false,
        max_attempts: 3,
        timeout_secs: 5,
    }
}

fn definition(steps: Vec<StepDefinition>) -> WorkflowDefinition {
    WorkflowDefinition {
        name: "token_pipeline".to_owned(),
        steps,
        fragments: BTreeMap::new(),
    }
}

fn step_report<'a>(
    report: &'a crate::workflow::services::WorkflowReport,
    id: &str,
) -> &'a crate::workflow::services::StepReport {
    report
        .steps
        .iter()
        .find(|step| step.step_id.as_str() == id)
        .expect("step in report")
}

#[tokio::test(flavor = "multi_thread")]
async fn flaky_step_retries_until_success() {
    let mut harness = Harness::new();
    let writer = ScriptedAgent::reliable("writer");
    let compiler = ScriptedAgent::flaky("compiler", 2);
    let auditor = ScriptedAgent::reliable("auditor");
    harness.add_agent(&writer);
    harness.add_agent(&compiler);
    harness.add_agent(&auditor);

    let def = definition(vec![
        step_def("a", "writer", &[]),
        step_def("b", "compiler", &["a"]),
        step_def("c", "auditor", &["b"]),
    ]);
    let report = harness.engine.run(def).await.expect("run settles");

    assert!(report.is_success());
    assert_eq!(step_report(&report, "b").attempt_count, 3);
    assert_eq!(step_report(&report, "b").status, StepStatus::Succeeded);
    assert_eq!(auditor.calls(), 1);
    // The auditor only ran after both upstream results were in context.
    let context = auditor.last_context().expect("context captured");
    assert!(context.get("a").is_some());
    assert!(context.get("b").is_some());

    harness.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn exhausted_required_step_fails_and_escalates() {
    let mut harness = Harness::new();
    let writer = ScriptedAgent::reliable("writer");
    let compiler = ScriptedAgent::broken("compiler");
    let auditor = ScriptedAgent::reliable("auditor");
    harness.add_agent(&writer);
    harness.add_agent(&compiler);
    harness.add_agent(&auditor);
    harness
        .registry
        .register(descriptor("supervisor"))
        .expect("registers supervisor");
    let topic = TopicName::new("workflow.escalation").expect("valid topic");
    harness
        .bus
        .subscribe(topic, name("supervisor"), DeliveryGuarantee::AtMostOnce)
        .expect("subscribes");

    let mut failing = step_def("b", "compiler", &["a"]);
    failing.max_attempts = 2;
    let def = definition(vec![
        step_def("a", "writer", &[]),
        failing,
        step_def("c", "auditor", &["b"]),
    ]);
    let report = harness.engine.run(def).await.expect("run settles");

    assert_eq!(report.status, WorkflowStatus::Failed);
    assert!(!report.is_success());
    let failed = step_report(&report, "b");
    assert_eq!(failed.status, StepStatus::Failed);
    assert_eq!(failed.attempt_count, 2);
    assert!(failed.error.is_some());
    // No downstream dependent left pending dispatch.
    assert_eq!(step_report(&report, "c").status, StepStatus::Pending);
    assert_eq!(auditor.calls(), 0);
    // Partial results from the succeeded step stay available.
    assert!(step_report(&report, "a").result.is_some());

    let escalation = harness
        .bus
        .try_receive(&name("supervisor"))
        .expect("receive succeeds")
        .expect("escalation queued");
    assert_eq!(escalation.priority(), Priority::Critical);
    assert_eq!(escalation.message_type(), "human_intervention");

    let progress = harness
        .store
        .load_workflow_progress(report.workflow_id.into_inner())
        .await
        .expect("loads")
        .expect("persisted");
    assert_eq!(progress.workflow.status, "failed");

    harness.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn optional_step_failure_is_skipped_over() {
    let mut harness = Harness::new();
    let writer = ScriptedAgent::reliable("writer");
    let linter = ScriptedAgent::broken("linter");
    let auditor = ScriptedAgent::reliable("auditor");
    harness.add_agent(&writer);
    harness.add_agent(&linter);
    harness.add_agent(&auditor);

    let mut optional = step_def("b", "linter", &["a"]);
    optional.optional = true;
    optional.max_attempts = 1;
    let def = definition(vec![
        step_def("a", "writer", &[]),
        optional,
        step_def("c", "auditor", &["b"]),
    ]);
    let report = harness.engine.run(def).await.expect("run settles");

    assert!(report.is_success());
    assert_eq!(step_report(&report, "b").status, StepStatus::Skipped);
    assert_eq!(step_report(&report, "c").status, StepStatus::Succeeded);
    assert_eq!(auditor.calls(), 1);

    harness.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn unresolvable_agent_is_rejected_before_execution() {
    let mut harness = Harness::new();
    let writer = ScriptedAgent::reliable("writer");
    harness.add_agent(&writer);

    let def = definition(vec![
        step_def("a", "writer", &[]),
        step_def("b", "ghost", &["a"]),
    ]);
    let result = harness.engine.run(def).await;

    assert!(matches!(result, Err(EngineError::AgentResolution { .. })));
    assert_eq!(writer.calls(), 0);
    assert!(
        harness
            .store
            .list_workflows()
            .await
            .expect("lists")
            .is_empty()
    );

    harness.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn cyclic_definitions_are_rejected() {
    let mut harness = Harness::new();
    let writer = ScriptedAgent::reliable("writer");
    harness.add_agent(&writer);

    let def = definition(vec![
        step_def("a", "writer", &["b"]),
        step_def("b", "writer", &["a"]),
    ]);
    let result = harness.engine.run(def).await;

    assert!(matches!(result, Err(EngineError::Validation(_))));

    harness.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn resume_reuses_recorded_results() {
    let mut harness = Harness::new();
    let writer = ScriptedAgent::reliable("writer");
    let auditor = ScriptedAgent::reliable("auditor");
    harness.add_agent(&writer);
    harness.add_agent(&auditor);

    let def = definition(vec![
        step_def("a", "writer", &[]),
        step_def("b", "auditor", &["a"]),
    ]);
    let workflow_id = Uuid::new_v4();
    harness
        .store
        .save_workflow_record(&WorkflowRecord {
            workflow_id,
            name: def.name.clone(),
            status: "running".to_owned(),
            definition: serde_json::to_value(&def).expect("serializes"),
            updated_at: Utc::now(),
        })
        .await
        .expect("saves");
    harness
        .store
        .save_step_result(
            workflow_id,
            &StepRecord {
                step_id: "a".to_owned(),
                status: "succeeded".to_owned(),
                attempt_count: 1,
                result: Some(json!({"warm": true})),
                error: None,
                recorded_at: Utc::now(),
            },
        )
        .await
        .expect("saves");

    let report = harness
        .engine
        .resume(WorkflowId::from_uuid(workflow_id))
        .await
        .expect("resume settles");

    assert!(report.is_success());
    // The recorded step was not re-executed and kept its result.
    assert_eq!(writer.calls(), 0);
    assert_eq!(auditor.calls(), 1);
    assert_eq!(
        step_report(&report, "a").result,
        Some(json!({"warm": true}))
    );

    harness.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn cancellation_skips_remaining_steps() {
    let mut harness = Harness::new();
    let writer = ScriptedAgent::slow("writer", Duration::from_millis(300));
    let auditor = ScriptedAgent::reliable("auditor");
    harness.add_agent(&writer);
    harness.add_agent(&auditor);

    let def = definition(vec![
        step_def("a", "writer", &[]),
        step_def("b", "auditor", &["a"]),
    ]);
    let engine = Arc::clone(&harness.engine);
    let run = tokio::spawn(async move { engine.run(def).await });

    // Wait for the workflow to be persisted, then cancel it mid-flight.
    let workflow_id = loop {
        let workflows = harness.store.list_workflows().await.expect("lists");
        if let Some(record) = workflows.first() {
            break WorkflowId::from_uuid(record.workflow_id);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    harness.engine.cancel(workflow_id).expect("cancel accepted");

    let report = run
        .await
        .expect("run task finishes")
        .expect("run settles");

    assert_eq!(report.status, WorkflowStatus::Cancelled);
    assert_eq!(step_report(&report, "a").status, StepStatus::Skipped);
    assert_eq!(step_report(&report, "b").status, StepStatus::Skipped);
    assert_eq!(auditor.calls(), 0);

    harness.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn pause_holds_new_dispatch_until_resumed() {
    let mut harness = Harness::new();
    let writer = ScriptedAgent::slow("writer", Duration::from_millis(150));
    let auditor = ScriptedAgent::reliable("auditor");
    harness.add_agent(&writer);
    harness.add_agent(&auditor);

    let def = definition(vec![
        step_def("a", "writer", &[]),
        step_def("b", "auditor", &["a"]),
    ]);
    let engine = Arc::clone(&harness.engine);
    let run = tokio::spawn(async move { engine.run(def).await });

    let workflow_id = loop {
        let workflows = harness.store.list_workflows().await.expect("lists");
        if let Some(record) = workflows.first() {
            break WorkflowId::from_uuid(record.workflow_id);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    };
    harness.engine.pause(workflow_id).expect("pause accepted");

    // The in-flight step finishes during the pause, but its dependent
    // must not start while paused.
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(auditor.calls(), 0);

    harness
        .engine
        .resume_paused(workflow_id)
        .expect("resume accepted");
    let report = run
        .await
        .expect("run task finishes")
        .expect("run settles");

    assert!(report.is_success());
    assert_eq!(auditor.calls(), 1);

    harness.shutdown().await;
}
