//! Unit tests for the in-memory state repository.

use crate::registry::domain::AgentName;
use crate::store::adapters::InMemoryStateStore;
use crate::store::domain::{AgentState, ContextEntry, StepRecord, WorkflowRecord};
use crate::store::ports::{StateRepository, StateStoreError};
use chrono::Utc;
use mockable::DefaultClock;
use rstest::{fixture, rstest};
use serde_json::json;
use uuid::Uuid;

#[fixture]
fn store() -> InMemoryStateStore {
    InMemoryStateStore::new(3)
}

fn agent() -> AgentName {
    AgentName::new("contract_writer").expect("valid name")
}

fn entry(index: u64) -> ContextEntry {
    ContextEntry {
        recorded_at: Utc::now(),
        entry: json!({"index": index}),
    }
}

fn step_record(step_id: &str, status: &str) -> StepRecord {
    StepRecord {
        step_id: step_id.to_owned(),
        status: status.to_owned(),
        attempt_count: 1,
        result: None,
        error: None,
        recorded_at: Utc::now(),
    }
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn snapshot_supersedes_previous(store: InMemoryStateStore) {
    let mut state = AgentState::new(agent(), &DefaultClock);
    store.save_agent_state(&state).await.expect("saves");
    state.begin_task("compile", &DefaultClock);
    store.save_agent_state(&state).await.expect("saves");

    let loaded = store.load_agent_state(&agent()).await.expect("loads");

    assert_eq!(loaded.current_task(), Some("compile"));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn first_run_reports_not_found(store: InMemoryStateStore) {
    let result = store.load_agent_state(&agent()).await;
    assert!(matches!(
        result,
        Err(StateStoreError::AgentStateNotFound(_))
    ));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn context_history_is_bounded_fifo(store: InMemoryStateStore) {
    for index in 0..5 {
        store
            .append_context(&agent(), entry(index))
            .await
            .expect("appends");
    }

    let history = store.load_context(&agent()).await.expect("loads");

    let indexes: Vec<_> = history.iter().map(|e| e.entry["index"].clone()).collect();
    assert_eq!(indexes, [json!(2), json!(3), json!(4)]);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn step_results_upsert_by_step_id(store: InMemoryStateStore) {
    let workflow_id = Uuid::new_v4();
    let record = WorkflowRecord {
        workflow_id,
        name: "deploy".to_owned(),
        status: "running".to_owned(),
        definition: json!({}),
        updated_at: Utc::now(),
    };
    store.save_workflow_record(&record).await.expect("saves");
    store
        .save_step_result(workflow_id, &step_record("compile", "retrying"))
        .await
        .expect("saves");
    store
        .save_step_result(workflow_id, &step_record("compile", "succeeded"))
        .await
        .expect("saves");

    let progress = store
        .load_workflow_progress(workflow_id)
        .await
        .expect("loads")
        .expect("workflow recorded");

    assert_eq!(progress.steps.len(), 1);
    assert_eq!(
        progress.steps.first().expect("one record").status,
        "succeeded"
    );
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn unknown_workflow_has_no_progress(store: InMemoryStateStore) {
    let progress = store
        .load_workflow_progress(Uuid::new_v4())
        .await
        .expect("loads");
    assert!(progress.is_none());
}
