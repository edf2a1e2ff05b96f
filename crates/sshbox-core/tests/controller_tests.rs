//! Controller lifecycle tests against the in-memory runtime

use sshbox_config::GlobalConfig;
use sshbox_core::test_support::{CountingProber, MockCall, MockRuntime};
use sshbox_core::{
    CommitPolicy, Controller, ControllerState, CoreError, FileRegistrar, ImageRef, RetrySchedule,
    SshKeys,
};
use sshbox_provider::ContainerRuntime;
use std::net::Ipv4Addr;
use std::path::Path;
use std::sync::Arc;

const IMAGE: &str = "tester:demo";

fn seed_public_key(catalog: &Path) {
    std::fs::create_dir_all(catalog).unwrap();
    std::fs::write(catalog.join(format!("{IMAGE}.pub")), "ssh-rsa AAAATEST root@demo\n").unwrap();
}

fn test_controller(runtime: Arc<MockRuntime>, dir: &Path) -> Controller {
    let catalog = dir.join("ssh");
    seed_public_key(&catalog);
    let config = GlobalConfig::default();
    let image = ImageRef::coerce(IMAGE).unwrap();
    Controller::new(runtime as Arc<dyn ContainerRuntime>, image, &config, None)
        .unwrap()
        .with_keys(SshKeys::with_catalog(catalog))
        .with_registrar(Box::new(FileRegistrar::with_paths(
            dir.join("config"),
            dir.join("config.d"),
        )))
        .with_association_path(dir.join("containers.json"))
        .with_prober(Box::new(CountingProber::always_ready()))
        .with_addresses(|| vec![Ipv4Addr::new(10, 0, 0, 9)])
}

fn merged_ssh_config(dir: &Path) -> String {
    std::fs::read_to_string(dir.join("config")).unwrap_or_default()
}

#[tokio::test]
async fn test_start_bootstraps_fresh_identity() {
    let runtime = Arc::new(MockRuntime::new());
    let tmp = tempfile::tempdir().unwrap();
    let mut controller = test_controller(runtime.clone(), tmp.path());

    controller.start().await.unwrap();

    // The distribution image was pulled and provisioned into the base image.
    assert!(runtime.get_calls().iter().any(|c| matches!(
        c,
        MockCall::Pull { repository, tag } if repository == "ubuntu" && tag == "jammy"
    )));
    assert!(runtime.get_calls().iter().any(|c| matches!(
        c,
        MockCall::Commit { repository, tag, .. } if repository == "sshbox" && tag == "base"
    )));
    assert!(runtime.image_names().contains(&"sshbox:base".to_string()));

    // One create for provisioning, one for the actual container.
    assert_eq!(
        runtime.count_calls(|c| matches!(c, MockCall::Create { .. })),
        2
    );

    // The surviving container was created from the committed base image,
    // addressed by content id.
    assert_eq!(controller.state(), ControllerState::Ready);
    let ids = runtime.container_ids();
    assert_eq!(ids.len(), 1);
    let from = runtime.container_image(&ids[0]).unwrap();
    assert!(from.starts_with("1a"), "created from image id, got {from}");

    // SSH access is registered under the hostname-derived alias.
    let merged = merged_ssh_config(tmp.path());
    assert!(merged.contains("Host demo-container"));
    assert!(merged.contains("Hostname 10.0.0.9"));
}

#[tokio::test]
async fn test_start_uses_existing_custom_image() {
    let runtime = Arc::new(MockRuntime::new());
    let custom_id = runtime.add_image("tester", "demo");
    let tmp = tempfile::tempdir().unwrap();
    let mut controller = test_controller(runtime.clone(), tmp.path());

    controller.start().await.unwrap();

    assert_eq!(runtime.count_calls(|c| matches!(c, MockCall::Pull { .. })), 0);
    assert_eq!(
        runtime.count_calls(|c| matches!(c, MockCall::Commit { .. })),
        0
    );
    let ids = runtime.container_ids();
    assert_eq!(runtime.container_image(&ids[0]).unwrap(), custom_id);
    assert_eq!(controller.state(), ControllerState::Ready);
}

#[tokio::test]
async fn test_start_twice_reuses_the_container() {
    let runtime = Arc::new(MockRuntime::new());
    runtime.add_image("tester", "demo");
    let tmp = tempfile::tempdir().unwrap();
    let mut controller = test_controller(runtime.clone(), tmp.path());

    controller.start().await.unwrap();
    controller.start().await.unwrap();
    assert_eq!(
        runtime.count_calls(|c| matches!(c, MockCall::Create { .. })),
        1
    );
}

#[tokio::test]
async fn test_second_invocation_adopts_via_association() {
    let runtime = Arc::new(MockRuntime::new());
    runtime.add_image("tester", "demo");
    let tmp = tempfile::tempdir().unwrap();

    let mut first = test_controller(runtime.clone(), tmp.path());
    first.start().await.unwrap();
    drop(first);

    let mut second = test_controller(runtime.clone(), tmp.path());
    second.start().await.unwrap();

    assert_eq!(
        runtime.count_calls(|c| matches!(c, MockCall::Create { .. })),
        1
    );
    assert_eq!(second.state(), ControllerState::Ready);
}

#[tokio::test]
async fn test_stale_association_is_cleared_and_container_recreated() {
    let runtime = Arc::new(MockRuntime::new());
    runtime.add_image("tester", "demo");
    let tmp = tempfile::tempdir().unwrap();

    let mut association = sshbox_core::AssociationStore::new();
    association.set(IMAGE, "c0ffeedeadbeef");
    association
        .save_to(&tmp.path().join("containers.json"))
        .unwrap();

    let mut controller = test_controller(runtime.clone(), tmp.path());
    controller.start().await.unwrap();

    assert_eq!(
        runtime.count_calls(|c| matches!(c, MockCall::Create { .. })),
        1
    );
    let store =
        sshbox_core::AssociationStore::load_from(&tmp.path().join("containers.json")).unwrap();
    assert_ne!(store.get(IMAGE), Some("c0ffeedeadbeef"));
}

#[tokio::test(start_paused = true)]
async fn test_readiness_timeout_leaves_container_running() {
    let runtime = Arc::new(MockRuntime::new());
    runtime.add_image("tester", "demo");
    let tmp = tempfile::tempdir().unwrap();
    let mut controller = test_controller(runtime.clone(), tmp.path())
        .with_prober(Box::new(CountingProber::never_ready()))
        .with_schedule(RetrySchedule::with_overall_secs(3));

    let err = controller.start().await.unwrap_err();
    assert!(matches!(err, CoreError::ReadinessTimeout { image } if image == IMAGE));

    // The container is left running for inspection.
    let ids = runtime.container_ids();
    assert!(runtime.is_running(&ids[0]));
    assert_eq!(controller.state(), ControllerState::Located);
}

#[tokio::test]
async fn test_kill_is_idempotent_and_revokes_access() {
    let runtime = Arc::new(MockRuntime::new());
    runtime.add_image("tester", "demo");
    let tmp = tempfile::tempdir().unwrap();
    let mut controller = test_controller(runtime.clone(), tmp.path());

    controller.start().await.unwrap();
    assert!(merged_ssh_config(tmp.path()).contains("Host demo-container"));

    controller.kill().await.unwrap();
    assert!(runtime.container_ids().is_empty());
    assert_eq!(controller.state(), ControllerState::Unbound);
    assert!(!merged_ssh_config(tmp.path()).contains("Host demo-container"));
    let store =
        sshbox_core::AssociationStore::load_from(&tmp.path().join("containers.json")).unwrap();
    assert!(store.get(IMAGE).is_none());

    // A second kill has nothing to do and succeeds.
    controller.kill().await.unwrap();
}

#[tokio::test]
async fn test_commit_without_container_fails() {
    let runtime = Arc::new(MockRuntime::new());
    let tmp = tempfile::tempdir().unwrap();
    let mut controller = test_controller(runtime, tmp.path());

    let err = controller.commit(Some("message"), None).await.unwrap_err();
    assert!(matches!(err, CoreError::NoContainerRunning));
}

#[tokio::test]
async fn test_commit_restarts_from_committed_image() {
    let runtime = Arc::new(MockRuntime::new());
    runtime.add_image("tester", "demo");
    let tmp = tempfile::tempdir().unwrap();
    let mut controller = test_controller(runtime.clone(), tmp.path());

    controller.start().await.unwrap();
    let first_ids = runtime.container_ids();

    controller.commit(Some("checkpoint"), None).await.unwrap();

    // The image id was expanded to the full committed id.
    let committed_id = controller.image().id().unwrap().to_string();
    assert_eq!(committed_id.len(), 64);

    // The old container is gone and its replacement runs the new revision.
    let ids = runtime.container_ids();
    assert_eq!(ids.len(), 1);
    assert_ne!(ids, first_ids);
    assert_eq!(runtime.container_image(&ids[0]).unwrap(), committed_id);
    assert_eq!(controller.state(), ControllerState::Ready);
}

#[tokio::test]
async fn test_commit_keep_running_leaves_container_alone() {
    let runtime = Arc::new(MockRuntime::new());
    runtime.add_image("tester", "demo");
    let tmp = tempfile::tempdir().unwrap();
    let mut controller =
        test_controller(runtime.clone(), tmp.path()).with_commit_policy(CommitPolicy::KeepRunning);

    controller.start().await.unwrap();
    let before = runtime.container_ids();

    controller.commit(None, Some("tester")).await.unwrap();

    assert_eq!(runtime.container_ids(), before);
    assert!(controller.image().id().is_some());
    assert_eq!(controller.state(), ControllerState::Ready);
}

#[tokio::test]
async fn test_delete_removes_container_and_image() {
    let runtime = Arc::new(MockRuntime::new());
    runtime.add_image("tester", "demo");
    let tmp = tempfile::tempdir().unwrap();
    let mut controller = test_controller(runtime.clone(), tmp.path());

    controller.start().await.unwrap();
    controller.delete().await.unwrap();

    assert!(runtime.container_ids().is_empty());
    assert!(!runtime.image_names().contains(&IMAGE.to_string()));
}

#[tokio::test]
async fn test_delete_without_image_succeeds() {
    let runtime = Arc::new(MockRuntime::new());
    let tmp = tempfile::tempdir().unwrap();
    let mut controller = test_controller(runtime.clone(), tmp.path());

    controller.delete().await.unwrap();
    assert_eq!(
        runtime.count_calls(|c| matches!(c, MockCall::RemoveImage { .. })),
        0
    );
}
