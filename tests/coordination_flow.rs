//! Cluster coordination through the provider seam.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use lifecycle_bridge::coordination::{
    CoordinationError, InMemoryCoordinationManager, SharedCoordinationManager,
    StandaloneProvider, StaticCoordinationProvider,
};
use lifecycle_bridge::runtime::DeploymentStatus;
use lifecycle_bridge::{BridgeError, LaunchState, Launcher, RuntimeHandle};

const WAIT: Duration = Duration::from_secs(5);

#[test]
fn test_nodes_sharing_a_manager_form_one_cluster() {
    let manager = Arc::new(InMemoryCoordinationManager::new());

    let first = Launcher::new(test_config_manager())
        .with_provider(StaticCoordinationProvider::new(manager.clone()))
        .register::<WorkerA>()
        .launch()
        .unwrap();
    let second = Launcher::new(test_config_manager())
        .with_provider(StaticCoordinationProvider::new(manager.clone()))
        .register::<WorkerB>()
        .launch()
        .unwrap();

    assert_eq!(manager.member_count(), 2);
    assert_eq!(first.runtime().members().unwrap().len(), 2);
    assert_ne!(first.runtime().node().node_id, second.runtime().node().node_id);

    first.shutdown(WAIT).unwrap();
    assert_eq!(manager.member_count(), 1);
    assert_eq!(second.runtime().members().unwrap().len(), 1);

    second.shutdown(WAIT).unwrap();
    assert_eq!(manager.member_count(), 0);
}

#[test]
fn test_closure_provider_supplies_manager() {
    let manager = Arc::new(InMemoryCoordinationManager::new());
    let supplied: SharedCoordinationManager = manager.clone();

    let handle = Launcher::new(test_config_manager())
        .with_provider(move || Ok::<_, CoordinationError>(Some(supplied.clone())))
        .register::<WorkerA>()
        .launch()
        .unwrap();

    assert!(handle.is_clustered());
    assert_eq!(manager.member_count(), 1);
    handle.shutdown(WAIT).unwrap();
}

#[test]
fn test_unavailable_backend_aborts_launch() {
    let manager = Arc::new(InMemoryCoordinationManager::new());
    manager.set_unavailable(true);

    let err = Launcher::new(test_config_manager())
        .with_provider(StaticCoordinationProvider::new(manager.clone()))
        .register::<WorkerA>()
        .launch()
        .unwrap_err();

    assert!(matches!(err, BridgeError::CoordinationAcquisition(_)));
    assert_eq!(manager.member_count(), 0);
}

#[test]
fn test_join_is_bounded_by_timeout() {
    let mut config = test_config();
    config.cluster.join_timeout_ms = 50;
    let provider = StaticCoordinationProvider::new(Arc::new(StalledCoordinationManager));

    let err = Launcher::new(config_manager_for(config))
        .with_provider(provider)
        .register::<WorkerA>()
        .launch()
        .unwrap_err();

    assert!(matches!(err, BridgeError::CoordinationAcquisition(_)));
    assert!(err.to_string().contains("timed out after 50ms"));
}

#[test]
fn test_ha_deploy_waits_for_quorum() {
    let manager = Arc::new(InMemoryCoordinationManager::new());
    let mut config = test_config();
    config.cluster.ha_enabled = true;
    config.cluster.quorum_size = 2;

    let mut launcher = Launcher::new(config_manager_for(config.clone()))
        .with_provider(StaticCoordinationProvider::new(manager.clone()));
    launcher = launcher.register::<WorkerA>();
    let err = launcher.launch().unwrap_err();
    assert!(matches!(err, BridgeError::Deployment { .. }));
    assert!(err.to_string().contains("HA quorum not met"));
    assert_eq!(err.exit_code(), 70);
    // The aborted launch left the cluster again
    assert_eq!(manager.member_count(), 0);

    // A peer without HA deployments joins first
    let peer = RuntimeHandle::new(&test_config(), &StaticCoordinationProvider::new(manager.clone()))
        .unwrap();
    assert_eq!(manager.member_count(), 1);

    let handle = Launcher::new(config_manager_for(config))
        .with_provider(StaticCoordinationProvider::new(manager.clone()))
        .register::<WorkerA>()
        .launch()
        .unwrap();
    assert_eq!(handle.state(), LaunchState::Running);
    assert_eq!(handle.deployments().len(), 1);

    handle.shutdown(WAIT).unwrap();
    peer.shutdown(WAIT).unwrap();
    assert_eq!(manager.member_count(), 0);
}

#[test]
fn test_standalone_ha_quorum_of_one_is_met() {
    let mut config = test_config();
    config.cluster.ha_enabled = true;
    config.cluster.quorum_size = 1;

    let handle = Launcher::new(config_manager_for(config))
        .with_provider(StandaloneProvider)
        .register::<WorkerA>()
        .launch()
        .unwrap();

    assert_eq!(handle.deployments().len(), 1);
    handle.shutdown(WAIT).unwrap();
}

#[test]
fn test_clustered_launch_deploys_both_workers() {
    let manager = Arc::new(InMemoryCoordinationManager::new());

    let handle = Launcher::new(test_config_manager())
        .with_provider(StaticCoordinationProvider::new(manager.clone()))
        .register::<WorkerA>()
        .register::<WorkerB>()
        .launch()
        .unwrap();

    assert!(handle.is_clustered());
    assert_eq!(handle.state(), LaunchState::Running);
    assert_eq!(manager.member_count(), 1);

    let runtime = handle.runtime().clone();
    assert!(wait_until(WAIT, || {
        runtime
            .deployments()
            .iter()
            .all(|record| record.status == DeploymentStatus::Running)
    }));
    assert_eq!(runtime.deployments().len(), 2);
    assert_eq!(starts(runtime.shared_data(), 0), 1);
    assert_eq!(starts(runtime.shared_data(), 1), 1);

    handle.shutdown(WAIT).unwrap();
    assert_eq!(manager.member_count(), 0);
}

#[test]
fn test_clustered_join_undeploy_and_shutdown_from_plain_thread() {
    let manager = Arc::new(InMemoryCoordinationManager::new());

    let handle = Launcher::new(test_config_manager())
        .with_provider(StaticCoordinationProvider::new(manager.clone()))
        .register::<WorkerA>()
        .launch()
        .unwrap();
    assert_eq!(manager.member_count(), 1);

    let id = handle.deployments()[0].id.clone();
    let record = handle.undeploy(&id).unwrap();
    assert_eq!(record.status, DeploymentStatus::Stopped);

    handle.shutdown(WAIT).unwrap();
    assert_eq!(manager.member_count(), 0);
}

#[test]
fn test_dropping_runtime_without_shutdown_leaves_cluster() {
    let manager = Arc::new(InMemoryCoordinationManager::new());

    let runtime =
        RuntimeHandle::new(&test_config(), &StaticCoordinationProvider::new(manager.clone()))
            .unwrap();
    assert_eq!(manager.member_count(), 1);

    drop(runtime);
    assert_eq!(manager.member_count(), 0);
}
