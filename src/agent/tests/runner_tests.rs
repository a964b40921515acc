//! Unit tests for the agent runner drain loop.

use crate::agent::runner::AgentRunner;
use crate::agent::{MockAgent, TASK_DISPATCH, TaskOutcome, TaskRequest};
use crate::bus::adapters::StaticAddressBook;
use crate::bus::domain::{Message, Priority};
use crate::bus::services::{BusConfig, CommunicationBus};
use crate::registry::domain::AgentName;
use crate::store::adapters::InMemoryStateStore;
use crate::store::ports::StateRepository;
use mockable::DefaultClock;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn name(raw: &str) -> AgentName {
    AgentName::new(raw).expect("valid name")
}

fn dispatch_message(clock: &DefaultClock) -> Message {
    let request = TaskRequest::new("write_contract", json!({"standard": "erc20"}), json!({}));
    Message::new(
        name("engine"),
        name("contract_writer"),
        TASK_DISPATCH,
        Priority::Medium,
        serde_json::to_value(&request).expect("serializes"),
        clock,
    )
    .expect("valid message")
    .with_timeout(Duration::from_secs(5))
    .expect("positive timeout")
}

#[tokio::test(flavor = "multi_thread")]
async fn runner_executes_dispatches_and_replies() {
    let clock = Arc::new(DefaultClock);
    let address_book = Arc::new(StaticAddressBook::new(vec![
        name("engine"),
        name("contract_writer"),
    ]));
    let bus = Arc::new(CommunicationBus::new(
        address_book,
        BusConfig::default(),
        Arc::clone(&clock),
    ));
    let store = Arc::new(InMemoryStateStore::new(8));

    let mut agent = MockAgent::new();
    agent
        .expect_execute()
        .returning(|_| TaskOutcome::success(json!({"artifact": "token.sol"})));
    let runner = AgentRunner::new(
        name("contract_writer"),
        Arc::new(agent),
        Arc::clone(&bus),
        Arc::clone(&store),
        Arc::clone(&clock),
        8,
    );
    let handle = runner.spawn();

    let reply = bus
        .request(dispatch_message(&clock))
        .await
        .expect("reply arrives");
    let outcome: TaskOutcome =
        serde_json::from_value(reply.payload().clone()).expect("parses outcome");
    assert!(outcome.is_success());

    let state = store
        .load_agent_state(&name("contract_writer"))
        .await
        .expect("snapshot persisted");
    assert_eq!(state.metrics().tasks_succeeded, 1);
    assert_eq!(state.current_task(), None);
    let history = store
        .load_context(&name("contract_writer"))
        .await
        .expect("context persisted");
    assert_eq!(history.len(), 1);

    handle.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn runner_reports_failures_to_the_requester() {
    let clock = Arc::new(DefaultClock);
    let address_book = Arc::new(StaticAddressBook::new(vec![
        name("engine"),
        name("contract_writer"),
    ]));
    let bus = Arc::new(CommunicationBus::new(
        address_book,
        BusConfig::default(),
        Arc::clone(&clock),
    ));
    let store = Arc::new(InMemoryStateStore::new(8));

    let mut agent = MockAgent::new();
    agent
        .expect_execute()
        .returning(|_| TaskOutcome::failure("compiler crashed"));
    let runner = AgentRunner::new(
        name("contract_writer"),
        Arc::new(agent),
        Arc::clone(&bus),
        Arc::clone(&store),
        Arc::clone(&clock),
        8,
    );
    let handle = runner.spawn();

    let reply = bus
        .request(dispatch_message(&clock))
        .await
        .expect("reply arrives");
    let outcome: TaskOutcome =
        serde_json::from_value(reply.payload().clone()).expect("parses outcome");

    assert_eq!(outcome, TaskOutcome::failure("compiler crashed"));
    let state = store
        .load_agent_state(&name("contract_writer"))
        .await
        .expect("snapshot persisted");
    assert_eq!(state.metrics().tasks_failed, 1);

    handle.stop().await;
}
