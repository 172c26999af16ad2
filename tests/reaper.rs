// ABOUTME: Excess-instance reaper behavior: retries, scope isolation, chains.
// ABOUTME: Exercises the reaper directly over the mock client.

mod support;

use tokio_util::sync::CancellationToken;

use skopia::config::Settings;
use skopia::container::labels;
use skopia::engine::error::EngineErrorKind;
use skopia::engine::reaper::reap_excess_instances;
use skopia::engine::report::ReportBuilder;
use skopia::runtime::mock::{ContainerBuilder, MockClient, Op};
use skopia::types::ContainerId;

use support::updater;

fn fast_settings() -> Settings {
    Settings {
        cleanup_retry_delay: std::time::Duration::from_millis(1),
        ..Default::default()
    }
}

#[tokio::test]
async fn single_instance_without_chain_is_a_no_op() {
    let client = MockClient::new();
    client.add_container(updater("skopia", "self-id", 1_700_000_000));

    let mut report = ReportBuilder::new();
    let summary = reap_excess_instances(
        &client,
        &fast_settings(),
        &ContainerId::new("self-id"),
        &CancellationToken::new(),
        &mut report,
    )
    .await
    .unwrap();

    assert_eq!(summary.reaped, 0);
    assert!(summary.warning.is_none());
    assert!(
        !client
            .ops()
            .iter()
            .any(|op| matches!(op, Op::StopAndRemove(_)))
    );
}

#[tokio::test]
async fn removal_retries_until_it_succeeds() {
    let client = MockClient::new();
    client.add_container(updater("skopia-old", "old-id", 1_700_000_000));
    client.add_container(updater("skopia", "self-id", 1_700_003_600));
    // Fail twice, succeed on the third (and default-final) attempt.
    client.fail_removals("skopia-old", 2);

    let mut report = ReportBuilder::new();
    let summary = reap_excess_instances(
        &client,
        &fast_settings(),
        &ContainerId::new("self-id"),
        &CancellationToken::new(),
        &mut report,
    )
    .await
    .unwrap();

    assert_eq!(summary.reaped, 1);
    assert_eq!(
        client
            .ops()
            .iter()
            .filter(|op| matches!(op, Op::StopAndRemove(n) if n == "skopia-old"))
            .count(),
        3
    );
}

#[tokio::test]
async fn exhausted_retries_on_sole_target_is_a_total_failure() {
    let client = MockClient::new();
    client.add_container(updater("skopia-old", "old-id", 1_700_000_000));
    client.add_container(updater("skopia", "self-id", 1_700_003_600));
    client.fail_removals("skopia-old", u32::MAX);

    let mut report = ReportBuilder::new();
    let err = reap_excess_instances(
        &client,
        &fast_settings(),
        &ContainerId::new("self-id"),
        &CancellationToken::new(),
        &mut report,
    )
    .await
    .unwrap_err();

    assert_eq!(err.kind(), EngineErrorKind::ReaperTotalFailure);
}

#[tokio::test]
async fn partial_failure_returns_success_with_warning() {
    let client = MockClient::new();
    client.add_container(updater("doomed-1", "d1", 1_700_000_000));
    client.add_container(updater("doomed-2", "d2", 1_700_000_100));
    client.add_container(updater("skopia", "self-id", 1_700_003_600));
    client.fail_removals("doomed-2", u32::MAX);

    let mut report = ReportBuilder::new();
    let summary = reap_excess_instances(
        &client,
        &fast_settings(),
        &ContainerId::new("self-id"),
        &CancellationToken::new(),
        &mut report,
    )
    .await
    .unwrap();

    assert_eq!(summary.reaped, 1);
    let warning = summary.warning.expect("partial failure should warn");
    assert_eq!(warning.kind(), EngineErrorKind::ReaperPartialFailure);
}

#[tokio::test]
async fn chained_predecessor_is_reaped_across_scopes() {
    // The predecessor moved out of scope (scope rename) but is chained.
    let client = MockClient::new();
    client.add_container(
        ContainerBuilder::new("skopia_old")
            .id("old-id")
            .label(labels::INSTANCE, "true")
            .label(labels::SCOPE, "legacy")
            .build(),
    );
    client.add_container(
        ContainerBuilder::new("skopia")
            .id("self-id")
            .label(labels::INSTANCE, "true")
            .label(labels::CONTAINER_CHAIN, "old-id")
            .build(),
    );

    let mut report = ReportBuilder::new();
    let summary = reap_excess_instances(
        &client,
        &fast_settings(),
        &ContainerId::new("self-id"),
        &CancellationToken::new(),
        &mut report,
    )
    .await
    .unwrap();

    assert_eq!(summary.reaped, 1);
    assert!(client.container_named("skopia_old").is_none());
}

#[tokio::test]
async fn non_updater_containers_are_never_reaped() {
    let client = MockClient::new();
    client.add_container(ContainerBuilder::new("innocent").build());
    client.add_container(updater("skopia-old", "old-id", 1_700_000_000));
    client.add_container(updater("skopia", "self-id", 1_700_003_600));

    let mut report = ReportBuilder::new();
    reap_excess_instances(
        &client,
        &fast_settings(),
        &ContainerId::new("self-id"),
        &CancellationToken::new(),
        &mut report,
    )
    .await
    .unwrap();

    assert!(client.container_named("innocent").is_some());
    assert!(client.container_named("skopia-old").is_none());
}

#[tokio::test]
async fn scoped_reaper_never_touches_unscoped_instances() {
    let client = MockClient::new();
    client.add_container(updater("unscoped", "u1", 1_700_000_000));
    client.add_container(
        ContainerBuilder::new("prod-old")
            .id("p1")
            .label(labels::INSTANCE, "true")
            .label(labels::SCOPE, "prod")
            .build(),
    );
    client.add_container(
        ContainerBuilder::new("prod-new")
            .id("self-id")
            .label(labels::INSTANCE, "true")
            .label(labels::SCOPE, "prod")
            .build(),
    );

    let settings = Settings {
        scope: "prod".to_string(),
        ..fast_settings()
    };
    let mut report = ReportBuilder::new();
    let summary = reap_excess_instances(
        &client,
        &settings,
        &ContainerId::new("self-id"),
        &CancellationToken::new(),
        &mut report,
    )
    .await
    .unwrap();

    assert_eq!(summary.reaped, 1);
    assert!(client.container_named("unscoped").is_some());
    assert!(client.container_named("prod-old").is_none());
}

#[tokio::test]
async fn reaped_instance_with_distinct_image_queues_cleanup() {
    let client = MockClient::new();
    let mut old = updater("skopia-old", "old-id", 1_700_000_000);
    old.image_id = skopia::types::ImageId::new("sha256:v1");
    let mut new = updater("skopia", "self-id", 1_700_003_600);
    new.image_id = skopia::types::ImageId::new("sha256:v2");
    client.add_container(old);
    client.add_container(new);

    let settings = Settings {
        cleanup: true,
        ..fast_settings()
    };
    let mut report = ReportBuilder::new();
    reap_excess_instances(
        &client,
        &settings,
        &ContainerId::new("self-id"),
        &CancellationToken::new(),
        &mut report,
    )
    .await
    .unwrap();

    let removed = report.removed_images();
    assert_eq!(removed.len(), 1);
    assert_eq!(removed[0].image_id, skopia::types::ImageId::new("sha256:v1"));
}

#[tokio::test]
async fn cleanup_off_queues_no_images() {
    let client = MockClient::new();
    let mut old = updater("skopia-old", "old-id", 1_700_000_000);
    old.image_id = skopia::types::ImageId::new("sha256:v1");
    client.add_container(old);
    client.add_container(updater("skopia", "self-id", 1_700_003_600));

    let mut report = ReportBuilder::new();
    reap_excess_instances(
        &client,
        &fast_settings(),
        &ContainerId::new("self-id"),
        &CancellationToken::new(),
        &mut report,
    )
    .await
    .unwrap();

    assert!(report.removed_images().is_empty());
}

#[tokio::test]
async fn cancellation_aborts_the_reaper() {
    let client = MockClient::new();
    client.add_container(updater("skopia-old", "old-id", 1_700_000_000));
    client.add_container(updater("skopia", "self-id", 1_700_003_600));

    let token = CancellationToken::new();
    token.cancel();

    let mut report = ReportBuilder::new();
    let err = reap_excess_instances(
        &client,
        &fast_settings(),
        &ContainerId::new("self-id"),
        &token,
        &mut report,
    )
    .await
    .unwrap_err();

    assert_eq!(err.kind(), EngineErrorKind::UpdateCancelled);
}
