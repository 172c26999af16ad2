// ABOUTME: Staleness verdict computation for one container.
// ABOUTME: Pinned references short-circuit; self-update pull failures degrade to fresh.

use crate::container::Container;
use crate::engine::error::EngineError;
use crate::runtime::{ImageOps, Staleness};
use crate::types::ImageId;

/// Outcome of the staleness check for one container.
#[derive(Debug)]
pub enum Verdict {
    /// The container's image matches the registry (or is pinned).
    Fresh,
    /// The registry has a newer image, already pulled locally.
    Stale { latest: ImageId },
    /// The container cannot be checked and is skipped this cycle.
    Skip(EngineError),
    /// The check failed; the container is reported failed.
    Failed(EngineError),
    /// Self-update pull failure: report fresh, but the cycle must observe
    /// the configured pull-failure delay before returning.
    FreshAfterPullFailure(EngineError),
}

/// Compute the staleness verdict for `container`.
///
/// `is_self` marks the updater's own container, which converts pull errors
/// into [`Verdict::FreshAfterPullFailure`] to avoid crash-loop restart storms.
pub async fn check<C: ImageOps>(client: &C, container: &Container, is_self: bool) -> Verdict {
    if container.image_ref.is_empty() {
        if container.image_id.is_empty() {
            return Verdict::Skip(EngineError::invalid_reference(format!(
                "container {} has no image reference or image ID",
                container.name
            )));
        }
        // An ID without a reference cannot be re-resolved against a registry.
        tracing::debug!(container = %container.name, "no image reference, treating as pinned");
        return Verdict::Fresh;
    }

    let reference = match container.parsed_ref() {
        Ok(r) => r,
        Err(e) => {
            return Verdict::Skip(EngineError::invalid_reference(format!(
                "{}: {e}",
                container.image_ref
            )));
        }
    };

    if reference.is_pinned() {
        tracing::debug!(container = %container.name, image = %reference, "reference is pinned");
        return Verdict::Fresh;
    }

    match client.is_stale(container).await {
        Ok(Staleness::Fresh) => Verdict::Fresh,
        Ok(Staleness::Stale { latest }) => Verdict::Stale { latest },
        Err(e) if is_self => {
            tracing::warn!(
                container = %container.name,
                error = %e,
                "self-update pull failed, deferring to next cycle"
            );
            Verdict::FreshAfterPullFailure(EngineError::pull_failed(e))
        }
        Err(e) => {
            tracing::warn!(container = %container.name, error = %e, "staleness check failed");
            Verdict::Failed(EngineError::pull_failed(e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::error::EngineErrorKind;
    use crate::runtime::mock::{ContainerBuilder, MockClient, StaleScript};

    #[tokio::test]
    async fn pinned_reference_is_fresh_without_remote_io() {
        let client = MockClient::new();
        let c = ContainerBuilder::new("app")
            .image_ref("app:1.0@sha256:abcd")
            .build();
        // Scripted stale, but the pin must short-circuit before the client.
        client.script_stale("app", StaleScript::Stale(ImageId::new("sha256:new")));

        assert!(matches!(check(&client, &c, false).await, Verdict::Fresh));
        assert!(client.ops().is_empty());
    }

    #[tokio::test]
    async fn invalid_reference_is_skipped() {
        let client = MockClient::new();
        let c = ContainerBuilder::new("app").image_ref("not a ref").build();
        match check(&client, &c, false).await {
            Verdict::Skip(e) => assert_eq!(e.kind(), EngineErrorKind::InvalidReference),
            other => panic!("expected skip, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_reference_and_id_is_skipped() {
        let client = MockClient::new();
        let c = ContainerBuilder::new("app").image_ref("").image_id("").build();
        assert!(matches!(check(&client, &c, false).await, Verdict::Skip(_)));
    }

    #[tokio::test]
    async fn missing_reference_with_id_is_fresh() {
        let client = MockClient::new();
        let c = ContainerBuilder::new("app")
            .image_ref("")
            .image_id("sha256:present")
            .build();
        assert!(matches!(check(&client, &c, false).await, Verdict::Fresh));
    }

    #[tokio::test]
    async fn stale_verdict_carries_latest_image() {
        let client = MockClient::new();
        let c = ContainerBuilder::new("app").build();
        client.script_stale("app", StaleScript::Stale(ImageId::new("sha256:new")));
        match check(&client, &c, false).await {
            Verdict::Stale { latest } => assert_eq!(latest, ImageId::new("sha256:new")),
            other => panic!("expected stale, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn pull_error_fails_non_self_container() {
        let client = MockClient::new();
        let c = ContainerBuilder::new("app").build();
        client.script_stale("app", StaleScript::PullError("registry down".to_string()));
        match check(&client, &c, false).await {
            Verdict::Failed(e) => assert_eq!(e.kind(), EngineErrorKind::PullFailed),
            other => panic!("expected failed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn pull_error_on_self_degrades_to_fresh() {
        let client = MockClient::new();
        let c = ContainerBuilder::new("skopia").build();
        client.script_stale("skopia", StaleScript::PullError("registry down".to_string()));
        match check(&client, &c, true).await {
            Verdict::FreshAfterPullFailure(e) => {
                assert_eq!(e.kind(), EngineErrorKind::PullFailed);
            }
            other => panic!("expected fresh-after-pull-failure, got {other:?}"),
        }
    }
}
