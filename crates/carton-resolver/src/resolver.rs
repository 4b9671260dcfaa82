//! Depth-first backtracking search over [`DependencySet`] nodes, with
//! partial updates against a previous resolution.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use carton_core::config::ResolverConfig;
use carton_core::dependency::{Dependency, DependencyEntry};
use carton_core::version::{PinnedVersion, VersionSpecifier};
use carton_util::errors::{CartonError, CartonResult};
use tokio_util::sync::CancellationToken;

use crate::cache::ResolutionCache;
use crate::conflict::{CompatibilityInfo, ConflictReport};
use crate::dependency_set::{DependencySet, UpdatePolicy};
use crate::retriever::DependencyRetriever;

/// What visiting a single node decided.
enum Visit {
    Accepted(BTreeMap<Dependency, PinnedVersion>),
    Rejected(Option<CartonError>),
    Branch(DependencySet),
}

/// Resolves requirements to one pinned version per project.
pub struct Resolver<R> {
    retriever: R,
    config: ResolverConfig,
    cancellation: CancellationToken,
}

impl<R: DependencyRetriever> Resolver<R> {
    pub fn new(retriever: R) -> Self {
        Self {
            retriever,
            config: ResolverConfig::default(),
            cancellation: CancellationToken::new(),
        }
    }

    pub fn with_config(mut self, config: ResolverConfig) -> Self {
        self.config = config;
        self
    }

    /// Abandon any running [`Resolver::resolve`] once `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn retriever(&self) -> &R {
        &self.retriever
    }

    /// Find a pinned version for every dependency reachable from
    /// `requirements`.
    ///
    /// With a non-empty `names_to_update`, only those names may move away
    /// from their pin in `last_resolved`, and requirements on names that
    /// are neither targeted nor previously pinned are left out. Without
    /// it, `last_resolved` only decides which candidate is tried first.
    ///
    /// The first complete, acyclic assignment found wins. Retrieval
    /// failures abort the search; everything else only rejects the branch
    /// it happened on and is reported if no branch succeeds.
    pub async fn resolve(
        &self,
        requirements: &BTreeMap<Dependency, VersionSpecifier>,
        last_resolved: Option<&BTreeMap<Dependency, PinnedVersion>>,
        names_to_update: Option<&BTreeSet<String>>,
    ) -> CartonResult<BTreeMap<Dependency, PinnedVersion>> {
        let targets = names_to_update.filter(|names| !names.is_empty());
        let roots = restrict(requirements, last_resolved, targets);
        let root_dependencies: Vec<Dependency> =
            roots.iter().map(|entry| entry.dependency.clone()).collect();
        tracing::debug!(
            "Resolving {} of {} requirement(s)",
            roots.len(),
            requirements.len()
        );

        let policy = Arc::new(UpdatePolicy::new(
            last_resolved,
            targets,
            self.config.prefer_resolved,
        ));
        let cache = ResolutionCache::new(&self.retriever);

        self.check_cancelled()?;
        let mut visited = 0usize;
        self.count_visit(&mut visited)?;
        let root = DependencySet::new(&roots, policy, &cache).await?;
        let mut stack = match evaluate(root, &roots, &root_dependencies) {
            Visit::Accepted(assignment) => return Ok(assignment),
            Visit::Branch(node) => vec![node],
            Visit::Rejected(error) => {
                return Err(self
                    .root_failure(error, requirements, last_resolved, targets, &cache)
                    .await)
            }
        };

        while let Some(top) = stack.last_mut() {
            let child = tokio::select! {
                biased;
                _ = self.cancellation.cancelled() => {
                    return Err(CartonError::Cancelled {
                        reason: "resolution was abandoned".to_string(),
                    });
                }
                child = top.pop_sub_set(&cache) => child?,
            };

            let Some(child) = child else {
                let error = stack.pop().and_then(DependencySet::into_rejection);
                match stack.last_mut() {
                    Some(parent) => {
                        if let Some(error) = error {
                            parent.record_rejection(error);
                        }
                    }
                    None => {
                        return Err(self
                            .root_failure(error, requirements, last_resolved, targets, &cache)
                            .await)
                    }
                }
                continue;
            };

            self.count_visit(&mut visited)?;
            tracing::trace!("Visiting node {visited} at depth {}", stack.len());

            match evaluate(child, &roots, &root_dependencies) {
                Visit::Accepted(assignment) => {
                    tracing::debug!(
                        "Resolved {} dependencies after {visited} nodes ({} requirement lists fetched)",
                        assignment.len(),
                        cache.fetched_requirements()
                    );
                    return Ok(assignment);
                }
                Visit::Rejected(error) => {
                    if let (Some(error), Some(parent)) = (error, stack.last_mut()) {
                        parent.record_rejection(error);
                    }
                }
                Visit::Branch(node) => stack.push(node),
            }
        }

        Err(CartonError::internal(
            "search stack emptied without reaching a verdict",
        ))
    }

    /// Report every requirement that `assignment` fails to satisfy, judged
    /// by what each pinned dependency declares at its pinned version.
    pub async fn validate(
        &self,
        assignment: &BTreeMap<Dependency, PinnedVersion>,
    ) -> CartonResult<ConflictReport> {
        let cache = ResolutionCache::new(&self.retriever);
        conflicts(&cache, assignment).await
    }

    fn check_cancelled(&self) -> CartonResult<()> {
        if self.cancellation.is_cancelled() {
            return Err(CartonError::Cancelled {
                reason: "resolution was abandoned".to_string(),
            });
        }
        Ok(())
    }

    /// Count one more node against `max-nodes`; the root is the first.
    fn count_visit(&self, visited: &mut usize) -> CartonResult<()> {
        *visited += 1;
        match self.config.max_nodes {
            Some(limit) if *visited > limit => Err(CartonError::Cancelled {
                reason: format!("gave up after visiting {limit} search nodes"),
            }),
            _ => Ok(()),
        }
    }

    /// The error for an exhausted root: the most specific rejection seen,
    /// or a generic failure naming what was being resolved.
    async fn root_failure<C>(
        &self,
        retained: Option<CartonError>,
        requirements: &BTreeMap<Dependency, VersionSpecifier>,
        last_resolved: Option<&BTreeMap<Dependency, PinnedVersion>>,
        targets: Option<&BTreeSet<String>>,
        cache: &C,
    ) -> CartonError
    where
        C: DependencyRetriever + ?Sized,
    {
        if let Some(error) = retained {
            return error;
        }
        let names: BTreeSet<String> = match targets {
            Some(names) => names.clone(),
            None => requirements.keys().map(Dependency::name).collect(),
        };
        let details = match last_resolved {
            Some(last) => match conflicts(cache, last).await {
                Ok(report) if !report.is_empty() => Some(report.to_string()),
                Ok(_) => None,
                Err(error) => {
                    tracing::warn!("Could not analyse the previous resolution: {error}");
                    None
                }
            },
            None => None,
        };
        CartonError::Unsatisfiable {
            names: names.into_iter().collect(),
            details,
        }
    }
}

/// The root entries: everything, or with `targets` only names that are
/// targeted or were pinned before.
fn restrict(
    requirements: &BTreeMap<Dependency, VersionSpecifier>,
    last_resolved: Option<&BTreeMap<Dependency, PinnedVersion>>,
    targets: Option<&BTreeSet<String>>,
) -> Vec<DependencyEntry> {
    let pinned: BTreeSet<String> = last_resolved
        .map(|last| last.keys().map(Dependency::name).collect())
        .unwrap_or_default();
    requirements
        .iter()
        .filter(|(dependency, _)| match targets {
            Some(names) => {
                let name = dependency.name();
                names.contains(&name) || pinned.contains(&name)
            }
            None => true,
        })
        .map(|(dependency, specifier)| DependencyEntry::new(dependency.clone(), specifier.clone()))
        .collect()
}

fn evaluate(
    mut node: DependencySet,
    roots: &[DependencyEntry],
    root_dependencies: &[Dependency],
) -> Visit {
    if node.is_rejected() {
        return Visit::Rejected(node.into_rejection());
    }
    if !node.is_complete() {
        return Visit::Branch(node);
    }
    if !node.validate_for_cyclic_dependencies(root_dependencies) {
        return Visit::Rejected(node.into_rejection());
    }
    match node.eliminate_same_named_dependencies(roots) {
        Ok(()) => Visit::Accepted(node.into_assignment()),
        Err(error) => {
            tracing::debug!("Rejecting complete assignment: {error}");
            Visit::Rejected(Some(error))
        }
    }
}

async fn conflicts<C>(
    retriever: &C,
    assignment: &BTreeMap<Dependency, PinnedVersion>,
) -> CartonResult<ConflictReport>
where
    C: DependencyRetriever + ?Sized,
{
    let mut declared = BTreeMap::new();
    for (dependency, version) in assignment {
        let requirements = retriever.requirements(dependency, version).await?;
        declared.insert(dependency.clone(), requirements);
    }
    Ok(ConflictReport::from_infos(CompatibilityInfo::from_assignment(
        assignment, &declared,
    )))
}
