//! The boundary between the search and whatever backs it (git remotes, a
//! hosting API, or a local fixture store).

use async_trait::async_trait;
use carton_core::dependency::{Dependency, DependencyEntry};
use carton_core::version::PinnedVersion;
use carton_util::errors::CartonResult;

/// Supplies candidate versions and transitive requirements on demand.
///
/// The resolver only calls these for dependencies and versions the search
/// actually visits. Failures abort the whole resolution; any retrying
/// belongs in the implementation.
#[async_trait]
pub trait DependencyRetriever: Send + Sync {
    /// Every available version of `dependency`, in no particular order.
    async fn versions(&self, dependency: &Dependency) -> CartonResult<Vec<PinnedVersion>>;

    /// The requirements `dependency` declares at `version`.
    async fn requirements(
        &self,
        dependency: &Dependency,
        version: &PinnedVersion,
    ) -> CartonResult<Vec<DependencyEntry>>;

    /// Resolve a branch, tag or commit-ish to one concrete pinned version.
    async fn resolve_reference(
        &self,
        dependency: &Dependency,
        reference: &str,
    ) -> CartonResult<PinnedVersion>;
}

#[async_trait]
impl<T: DependencyRetriever + ?Sized> DependencyRetriever for &T {
    async fn versions(&self, dependency: &Dependency) -> CartonResult<Vec<PinnedVersion>> {
        (**self).versions(dependency).await
    }

    async fn requirements(
        &self,
        dependency: &Dependency,
        version: &PinnedVersion,
    ) -> CartonResult<Vec<DependencyEntry>> {
        (**self).requirements(dependency, version).await
    }

    async fn resolve_reference(
        &self,
        dependency: &Dependency,
        reference: &str,
    ) -> CartonResult<PinnedVersion> {
        (**self).resolve_reference(dependency, reference).await
    }
}
