//! Unit tests for the agent registry service.

use crate::registry::adapters::memory::{InMemoryCatalogRepository, StaticManifestSource};
use crate::registry::domain::{AgentDescriptor, AgentName, CategoryName};
use crate::registry::ports::{AgentManifest, ManifestSource};
use crate::registry::services::{AgentRegistry, AgentResolution, RegistryError};
use mockable::DefaultClock;
use rstest::{fixture, rstest};
use std::sync::Arc;

type TestRegistry = AgentRegistry<DefaultClock>;

#[fixture]
fn registry() -> TestRegistry {
    AgentRegistry::new(Arc::new(DefaultClock))
}

fn name(raw: &str) -> AgentName {
    AgentName::new(raw).expect("valid name")
}

fn category(raw: &str) -> CategoryName {
    CategoryName::new(raw).expect("valid category")
}

fn descriptor(agent: &str, group: &str) -> AgentDescriptor {
    AgentDescriptor::new(name(agent), category(group), "1.0.0").expect("valid descriptor")
}

#[rstest]
fn register_and_resolve_by_name(registry: TestRegistry) {
    let writer = descriptor("contract_writer", "codegen");
    registry.register(writer.clone()).expect("registers");

    let resolved = registry.resolve("contract_writer").expect("resolves");

    assert_eq!(resolved, writer);
}

#[rstest]
fn duplicate_registration_is_rejected(registry: TestRegistry) {
    registry
        .register(descriptor("contract_writer", "codegen"))
        .expect("first registration succeeds");

    let duplicate = registry.register(descriptor("contract_writer", "analysis"));

    assert!(matches!(duplicate, Err(RegistryError::DuplicateAgent(_))));
    let all = registry.list_all().expect("lists");
    assert_eq!(all.len(), 1);
    assert_eq!(
        all.first().expect("one entry").category(),
        &category("codegen")
    );
}

#[rstest]
fn overwrite_replaces_existing_entry(registry: TestRegistry) {
    registry
        .register(descriptor("contract_writer", "codegen"))
        .expect("registers");

    let replaced = registry
        .register_overwriting(descriptor("contract_writer", "analysis"))
        .expect("overwrites");

    assert!(replaced.is_some());
    let resolved = registry.resolve("contract_writer").expect("resolves");
    assert_eq!(resolved.category(), &category("analysis"));
}

#[rstest]
fn deregister_removes_entry(registry: TestRegistry) {
    registry
        .register(descriptor("contract_writer", "codegen"))
        .expect("registers");

    registry
        .deregister(&name("contract_writer"))
        .expect("deregisters");

    assert!(matches!(
        registry.resolve("contract_writer"),
        Err(RegistryError::AgentNotFound(_))
    ));
}

#[rstest]
fn resolve_falls_back_to_specialization(registry: TestRegistry) {
    let writer = descriptor("contract_writer", "codegen")
        .with_specializations(vec!["erc20".to_owned()]);
    registry.register(writer.clone()).expect("registers");

    let resolved = registry.resolve("erc20").expect("resolves");

    assert_eq!(resolved, writer);
}

#[rstest]
fn name_match_wins_over_specialization(registry: TestRegistry) {
    let by_spec = descriptor("generalist", "codegen")
        .with_specializations(vec!["auditor".to_owned()]);
    let by_name = descriptor("auditor", "analysis");
    registry.register(by_spec).expect("registers");
    registry.register(by_name.clone()).expect("registers");

    let resolved = registry.resolve("auditor").expect("resolves");

    assert_eq!(resolved, by_name);
}

#[rstest]
fn disabled_agents_do_not_resolve(registry: TestRegistry) {
    registry
        .register(descriptor("contract_writer", "codegen").disabled())
        .expect("registers");

    assert!(matches!(
        registry.resolve("contract_writer"),
        Err(RegistryError::AgentNotFound(_))
    ));
}

#[rstest]
fn unavailable_resolution_names_the_disabled_case(registry: TestRegistry) {
    registry
        .register(descriptor("contract_writer", "codegen").disabled())
        .expect("registers");

    let resolution = registry.resolve_or_unavailable("contract_writer");

    match resolution {
        AgentResolution::Unavailable { reason, .. } => {
            assert!(reason.contains("disabled"), "unexpected reason: {reason}");
        }
        AgentResolution::Registered(_) => panic!("disabled agent should not resolve"),
    }
}

#[rstest]
fn list_by_category_preserves_insertion_order(registry: TestRegistry) {
    registry
        .register(descriptor("writer_b", "codegen"))
        .expect("registers");
    registry
        .register(descriptor("writer_a", "codegen"))
        .expect("registers");
    registry
        .register(descriptor("auditor", "analysis"))
        .expect("registers");

    let codegen = registry
        .list_by_category(&category("codegen"))
        .expect("lists");

    let names: Vec<_> = codegen.iter().map(|d| d.name().to_string()).collect();
    assert_eq!(names, ["writer_b", "writer_a"]);
}

#[rstest]
fn list_by_category_excludes_disabled(registry: TestRegistry) {
    registry
        .register(descriptor("writer_a", "codegen"))
        .expect("registers");
    registry
        .register(descriptor("writer_b", "codegen").disabled())
        .expect("registers");

    let codegen = registry
        .list_by_category(&category("codegen"))
        .expect("lists");

    assert_eq!(codegen.len(), 1);
}

#[rstest]
fn dependencies_resolve_in_topological_order(registry: TestRegistry) {
    let compiler = descriptor("compiler", "build");
    let linker = descriptor("linker", "build").with_dependencies(vec![name("compiler")]);
    let packager = descriptor("packager", "build").with_dependencies(vec![name("linker")]);
    registry.register(compiler).expect("registers");
    registry.register(linker).expect("registers");
    registry.register(packager.clone()).expect("registers");

    let ordered = registry.resolve_dependencies(&packager).expect("orders");

    let names: Vec<_> = ordered.iter().map(|d| d.name().to_string()).collect();
    assert_eq!(names, ["compiler", "linker", "packager"]);
}

#[rstest]
fn dependency_cycles_are_detected(registry: TestRegistry) {
    let first = descriptor("first", "build").with_dependencies(vec![name("second")]);
    let second = descriptor("second", "build").with_dependencies(vec![name("first")]);
    registry.register(first.clone()).expect("registers");
    registry.register(second).expect("registers");

    let result = registry.resolve_dependencies(&first);

    assert!(matches!(result, Err(RegistryError::DependencyCycle(_))));
}

#[rstest]
fn missing_dependency_is_detected(registry: TestRegistry) {
    let dependent = descriptor("dependent", "build").with_dependencies(vec![name("absent")]);
    registry.register(dependent.clone()).expect("registers");

    let result = registry.resolve_dependencies(&dependent);

    assert!(matches!(
        result,
        Err(RegistryError::MissingDependency { .. })
    ));
}

#[rstest]
fn disabled_dependency_counts_as_missing(registry: TestRegistry) {
    registry
        .register(descriptor("compiler", "build").disabled())
        .expect("registers");
    let dependent = descriptor("dependent", "build").with_dependencies(vec![name("compiler")]);
    registry.register(dependent.clone()).expect("registers");

    let result = registry.resolve_dependencies(&dependent);

    assert!(matches!(
        result,
        Err(RegistryError::MissingDependency { .. })
    ));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn discovery_imports_new_and_skips_registered(registry: TestRegistry) {
    registry
        .register(descriptor("contract_writer", "codegen"))
        .expect("registers");
    let manifest = AgentManifest::new(
        "collaborators.json",
        vec![
            descriptor("contract_writer", "analysis"),
            descriptor("doc_renderer", "docs"),
        ],
    );
    let sources: Vec<Arc<dyn ManifestSource>> =
        vec![Arc::new(StaticManifestSource::new(vec![manifest]))];

    let report = registry.discover(&sources).await.expect("discovers");

    assert_eq!(report.imported, [name("doc_renderer")]);
    assert_eq!(report.skipped, [name("contract_writer")]);
    let resolved = registry.resolve("contract_writer").expect("resolves");
    assert_eq!(resolved.category(), &category("codegen"));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn catalog_round_trips_through_repository(registry: TestRegistry) {
    registry
        .register(descriptor("contract_writer", "codegen"))
        .expect("registers");
    registry
        .register(descriptor("auditor", "analysis"))
        .expect("registers");
    let repository = InMemoryCatalogRepository::new();

    registry.persist(&repository).await.expect("persists");

    let restored = AgentRegistry::new(Arc::new(DefaultClock));
    let found = restored.restore_from(&repository).await.expect("restores");
    assert!(found);
    assert_eq!(restored.list_all().expect("lists").len(), 2);
    assert!(restored.resolve("auditor").is_ok());
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn restore_from_empty_repository_reports_absence(registry: TestRegistry) {
    let repository = InMemoryCatalogRepository::new();
    let found = registry.restore_from(&repository).await.expect("loads");
    assert!(!found);
}
