//! Resolution session cache for avoiding redundant retriever calls.
//!
//! Backtracking revisits the same dependency and version many times across
//! sibling branches. [`ResolutionCache`] sits between the search and the
//! real retriever so each listing, requirement fetch and reference lookup
//! hits the backend at most once per resolution session.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use carton_core::dependency::{Dependency, DependencyEntry};
use carton_core::version::PinnedVersion;
use carton_util::errors::{CartonError, CartonResult};

use crate::retriever::DependencyRetriever;

/// Memoizing wrapper around a [`DependencyRetriever`].
pub struct ResolutionCache<R> {
    inner: R,
    versions: Mutex<HashMap<Dependency, Vec<PinnedVersion>>>,
    requirements: Mutex<HashMap<(Dependency, PinnedVersion), Vec<DependencyEntry>>>,
    references: Mutex<HashMap<(Dependency, String), PinnedVersion>>,
}

impl<R: DependencyRetriever> ResolutionCache<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            versions: Mutex::new(HashMap::new()),
            requirements: Mutex::new(HashMap::new()),
            references: Mutex::new(HashMap::new()),
        }
    }

    /// Number of distinct `(dependency, version)` requirement lists fetched so far.
    pub fn fetched_requirements(&self) -> usize {
        lock(&self.requirements).len()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Backend failures surface as retrieval failures. Parse failures pass
/// through untouched: they only reject the branch that asked.
fn as_retrieval(dependency: &Dependency, error: CartonError) -> CartonError {
    match error {
        CartonError::Retrieval { .. }
        | CartonError::Cancelled { .. }
        | CartonError::Parse { .. } => error,
        other => CartonError::retrieval(dependency, other.to_string()),
    }
}

#[async_trait]
impl<R: DependencyRetriever> DependencyRetriever for ResolutionCache<R> {
    async fn versions(&self, dependency: &Dependency) -> CartonResult<Vec<PinnedVersion>> {
        let cached = lock(&self.versions).get(dependency).cloned();
        if let Some(hit) = cached {
            tracing::trace!("Cached versions for {dependency}");
            return Ok(hit);
        }
        tracing::debug!("Listing versions of {dependency}");
        let fetched = self
            .inner
            .versions(dependency)
            .await
            .map_err(|e| as_retrieval(dependency, e))?;
        lock(&self.versions).insert(dependency.clone(), fetched.clone());
        Ok(fetched)
    }

    async fn requirements(
        &self,
        dependency: &Dependency,
        version: &PinnedVersion,
    ) -> CartonResult<Vec<DependencyEntry>> {
        let key = (dependency.clone(), version.clone());
        let cached = lock(&self.requirements).get(&key).cloned();
        if let Some(hit) = cached {
            tracing::trace!("Cached requirements for {dependency} @ {version}");
            return Ok(hit);
        }
        tracing::debug!("Fetching requirements of {dependency} @ {version}");
        let fetched = self
            .inner
            .requirements(dependency, version)
            .await
            .map_err(|e| as_retrieval(dependency, e))?;
        lock(&self.requirements).insert(key, fetched.clone());
        Ok(fetched)
    }

    async fn resolve_reference(
        &self,
        dependency: &Dependency,
        reference: &str,
    ) -> CartonResult<PinnedVersion> {
        let key = (dependency.clone(), reference.to_string());
        let cached = lock(&self.references).get(&key).cloned();
        if let Some(hit) = cached {
            return Ok(hit);
        }
        tracing::debug!("Resolving reference \"{reference}\" of {dependency}");
        let resolved = self
            .inner
            .resolve_reference(dependency, reference)
            .await
            .map_err(|e| as_retrieval(dependency, e))?;
        lock(&self.references).insert(key, resolved.clone());
        Ok(resolved)
    }
}
