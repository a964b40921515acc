//! Filesystem persistence integration tests.
//!
//! Covers the state store layout (atomic snapshots, bounded context
//! history, workflow progress records) and the registry's catalog and
//! manifest adapters against a real scratch directory.

use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;
use chrono::Utc;
use gropius::registry::adapters::fs::{FsCatalogRepository, FsManifestSource};
use gropius::registry::domain::{AgentDescriptor, AgentName, CategoryName};
use gropius::registry::ports::ManifestSource;
use gropius::registry::services::AgentRegistry;
use gropius::store::adapters::FsStateStore;
use gropius::store::domain::{AgentState, ContextEntry, StepRecord, WorkflowRecord};
use gropius::store::ports::{StateRepository, StateStoreError};
use mockable::DefaultClock;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

fn scratch_path(label: &str) -> PathBuf {
    std::env::temp_dir().join(format!("gropius_{label}_{}", Uuid::new_v4()))
}

fn scratch_dir(label: &str) -> Dir {
    let path = scratch_path(label);
    std::fs::create_dir_all(&path).expect("create scratch dir");
    Dir::open_ambient_dir(path.to_str().expect("utf8 path"), ambient_authority())
        .expect("open scratch dir")
}

fn agent() -> AgentName {
    AgentName::new("contract_writer").expect("valid name")
}

#[tokio::test(flavor = "multi_thread")]
async fn snapshot_round_trips_and_supersedes() {
    let store = FsStateStore::new(scratch_dir("snapshot"), 8);
    let mut state = AgentState::new(agent(), &DefaultClock);
    store.save_agent_state(&state).await.expect("saves");

    state.begin_task("compile", &DefaultClock);
    store.save_agent_state(&state).await.expect("saves again");

    let loaded = store.load_agent_state(&agent()).await.expect("loads");
    assert_eq!(loaded, state);
    assert_eq!(loaded.current_task(), Some("compile"));
}

#[tokio::test(flavor = "multi_thread")]
async fn first_run_has_no_snapshot() {
    let store = FsStateStore::new(scratch_dir("empty"), 8);
    let result = store.load_agent_state(&agent()).await;
    assert!(matches!(
        result,
        Err(StateStoreError::AgentStateNotFound(_))
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn snapshot_writes_leave_no_temporary_files() {
    let dir = scratch_dir("atomic");
    let store = FsStateStore::new(dir.try_clone().expect("clone handle"), 8);
    let state = AgentState::new(agent(), &DefaultClock);
    store.save_agent_state(&state).await.expect("saves");

    let agent_dir = dir
        .open_dir("agents/contract_writer")
        .expect("agent dir exists");
    let names: Vec<String> = agent_dir
        .entries()
        .expect("listable")
        .map(|entry| entry.expect("entry").file_name().expect("utf8 name"))
        .collect();
    assert!(names.contains(&"state.json".to_owned()));
    assert!(!names.iter().any(|n| n.ends_with(".tmp")));
}

#[tokio::test(flavor = "multi_thread")]
async fn context_history_is_bounded_with_fifo_eviction() {
    let store = FsStateStore::new(scratch_dir("context"), 3);
    for index in 0..5_u64 {
        let entry = ContextEntry {
            recorded_at: Utc::now(),
            entry: json!({"index": index}),
        };
        store.append_context(&agent(), entry).await.expect("appends");
    }

    let history = store.load_context(&agent()).await.expect("loads");

    let indexes: Vec<_> = history.iter().map(|e| e.entry["index"].clone()).collect();
    assert_eq!(indexes, [json!(2), json!(3), json!(4)]);
}

#[tokio::test(flavor = "multi_thread")]
async fn workflow_progress_round_trips() {
    let store = FsStateStore::new(scratch_dir("progress"), 8);
    let workflow_id = Uuid::new_v4();
    let record = WorkflowRecord {
        workflow_id,
        name: "deploy".to_owned(),
        status: "running".to_owned(),
        definition: json!({"name": "deploy", "steps": []}),
        updated_at: Utc::now(),
    };
    store.save_workflow_record(&record).await.expect("saves");
    for (step_id, status) in [("compile", "succeeded"), ("audit", "pending")] {
        store
            .save_step_result(
                workflow_id,
                &StepRecord {
                    step_id: step_id.to_owned(),
                    status: status.to_owned(),
                    attempt_count: 1,
                    result: None,
                    error: None,
                    recorded_at: Utc::now(),
                },
            )
            .await
            .expect("saves step");
    }

    let progress = store
        .load_workflow_progress(workflow_id)
        .await
        .expect("loads")
        .expect("present");

    assert_eq!(progress.workflow.name, "deploy");
    assert_eq!(progress.steps.len(), 2);
    let listed = store.list_workflows().await.expect("lists");
    assert_eq!(listed.len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn catalog_persists_across_registry_instances() {
    let dir = scratch_dir("catalog");
    let repository = FsCatalogRepository::new(dir.try_clone().expect("clone handle"));
    let clock = Arc::new(DefaultClock);

    let registry = AgentRegistry::new(Arc::clone(&clock));
    let descriptor = AgentDescriptor::new(
        agent(),
        CategoryName::new("codegen").expect("valid category"),
        "1.0.0",
    )
    .expect("valid descriptor");
    registry.register(descriptor.clone()).expect("registers");
    registry.persist(&repository).await.expect("persists");

    let reloaded = AgentRegistry::new(clock);
    let found = reloaded.restore_from(&repository).await.expect("restores");

    assert!(found);
    assert_eq!(
        reloaded.resolve("contract_writer").expect("resolves"),
        descriptor
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn manifest_directory_is_scanned_and_merged() {
    let path = scratch_path("manifests");
    std::fs::create_dir_all(&path).expect("create scratch dir");
    std::fs::write(
        path.join("collaborator.json"),
        r#"{"agents": [{"name": "doc_renderer", "category": "docs", "version": "0.3.0"}]}"#,
    )
    .expect("write manifest");
    std::fs::write(path.join("notes.txt"), "ignored").expect("write noise");
    let dir = Dir::open_ambient_dir(path.to_str().expect("utf8 path"), ambient_authority())
        .expect("open scratch dir");

    let source = FsManifestSource::new(dir);
    let manifests = source.load_manifests().await.expect("scans");
    assert_eq!(manifests.len(), 1);

    let registry = AgentRegistry::new(Arc::new(DefaultClock));
    let sources: Vec<Arc<dyn ManifestSource>> = vec![Arc::new(source)];
    let report = registry.discover(&sources).await.expect("discovers");

    assert_eq!(report.imported.len(), 1);
    assert!(registry.resolve("doc_renderer").is_ok());
}
