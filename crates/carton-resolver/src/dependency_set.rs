//! One node of the backtracking search: a partial assignment of pinned
//! versions plus the requirements still waiting for one.
//!
//! Nodes are plain owned values. Branching clones the node and applies a
//! single candidate to the clone, so siblings never observe each other.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;

use carton_core::dependency::{Dependency, DependencyEntry};
use carton_core::version::{PinnedVersion, VersionSpecifier};
use carton_util::errors::{CartonError, CartonResult};

use crate::graph::{find_cycle, topological_sort};
use crate::retriever::DependencyRetriever;

/// How a previous resolution constrains the candidates of each name.
#[derive(Debug, Clone, Default)]
pub struct UpdatePolicy {
    last_resolved: BTreeMap<String, PinnedVersion>,
    /// `None` means every name may change.
    updatable: Option<BTreeSet<String>>,
    prefer_resolved: bool,
}

/// Candidate ordering for a single name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preference<'a> {
    /// Newest first.
    Newest,
    /// The previous pin first, then newest first.
    Prefer(&'a PinnedVersion),
    /// The previous pin and nothing else.
    Only(&'a PinnedVersion),
}

impl UpdatePolicy {
    /// An empty `names_to_update` set is the same as none at all.
    pub fn new(
        last_resolved: Option<&BTreeMap<Dependency, PinnedVersion>>,
        names_to_update: Option<&BTreeSet<String>>,
        prefer_resolved: bool,
    ) -> Self {
        let mut pins = BTreeMap::new();
        for (dependency, version) in last_resolved.into_iter().flatten() {
            pins.entry(dependency.name())
                .or_insert_with(|| version.clone());
        }
        Self {
            last_resolved: pins,
            updatable: names_to_update.filter(|names| !names.is_empty()).cloned(),
            prefer_resolved,
        }
    }

    pub fn preference(&self, name: &str) -> Preference<'_> {
        match (&self.updatable, self.last_resolved.get(name)) {
            (Some(names), _) if names.contains(name) => Preference::Newest,
            (Some(_), Some(pin)) => Preference::Only(pin),
            (None, Some(pin)) if self.prefer_resolved => Preference::Prefer(pin),
            _ => Preference::Newest,
        }
    }

    /// Whether `name` must stay at its previous pin.
    pub fn is_locked(&self, name: &str) -> bool {
        matches!(self.preference(name), Preference::Only(_))
    }

    /// Sort eligible versions into the order they should be tried.
    ///
    /// Newest first with ties in reverse lexical order, then adjusted for
    /// the name's [`Preference`].
    pub fn order(&self, name: &str, versions: Vec<PinnedVersion>) -> VecDeque<PinnedVersion> {
        let mut keyed: Vec<_> = versions
            .into_iter()
            .map(|v| (v.semantic_version(), v))
            .collect();
        keyed.sort_unstable_by(|(a_semantic, a), (b_semantic, b)| {
            b_semantic
                .cmp(a_semantic)
                .then_with(|| b.commitish().cmp(a.commitish()))
        });
        let mut versions: Vec<PinnedVersion> = keyed.into_iter().map(|(_, v)| v).collect();
        versions.dedup();
        match self.preference(name) {
            Preference::Newest => versions.into(),
            Preference::Only(pin) => versions.into_iter().filter(|v| v == pin).collect(),
            Preference::Prefer(pin) => {
                let mut ordered: VecDeque<PinnedVersion> = versions.into();
                if let Some(position) = ordered.iter().position(|v| v == pin) {
                    if let Some(preferred) = ordered.remove(position) {
                        ordered.push_front(preferred);
                    }
                }
                ordered
            }
        }
    }
}

/// A name that has been required but not yet pinned.
#[derive(Debug, Clone)]
struct PendingDependency {
    /// The identity it was first required as.
    dependency: Dependency,
    /// Other identities of the same project required since.
    aliases: BTreeSet<Dependency>,
    specifiers: Vec<VersionSpecifier>,
    /// Commit a git reference on this name resolved to.
    reference: Option<PinnedVersion>,
    /// Untried candidates, next first.
    candidates: VecDeque<PinnedVersion>,
}

impl PendingDependency {
    fn describe(&self) -> String {
        self.specifiers
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Rank used to keep the most informative failure of a subtree.
fn specificity(error: &CartonError) -> u8 {
    match error {
        CartonError::CyclicDependencies { .. } | CartonError::DuplicateDependency { .. } => 4,
        CartonError::ConflictingRequirement { .. } => 3,
        CartonError::Parse { .. } => 2,
        CartonError::Unsatisfiable { .. } => 1,
        _ => 0,
    }
}

/// A search-tree node.
#[derive(Debug, Clone)]
pub struct DependencySet {
    /// Every resolved identity, aliases included. Never shrinks within a branch.
    assignment: BTreeMap<Dependency, PinnedVersion>,
    /// Resolved name to the identity it was first required as.
    identities: BTreeMap<String, Dependency>,
    pending: BTreeMap<String, PendingDependency>,
    /// Requirement edges between names: requirer to required.
    edges: BTreeMap<String, BTreeSet<String>>,
    /// The pending name this node branches on once the first child is popped.
    branching: Option<String>,
    policy: Arc<UpdatePolicy>,
    rejected: bool,
    rejection: Option<CartonError>,
}

impl DependencySet {
    /// The root node for `entries`.
    ///
    /// Only retrieval failures are errors; conflicts among the entries
    /// themselves produce a rejected node.
    pub async fn new<R>(
        entries: &[DependencyEntry],
        policy: Arc<UpdatePolicy>,
        retriever: &R,
    ) -> CartonResult<Self>
    where
        R: DependencyRetriever + ?Sized,
    {
        let mut set = Self {
            assignment: BTreeMap::new(),
            identities: BTreeMap::new(),
            pending: BTreeMap::new(),
            edges: BTreeMap::new(),
            branching: None,
            policy,
            rejected: false,
            rejection: None,
        };
        for entry in entries {
            if set.rejected {
                break;
            }
            set.add_requirement(None, entry, retriever).await?;
        }
        Ok(set)
    }

    pub fn is_rejected(&self) -> bool {
        self.rejected
    }

    pub fn is_complete(&self) -> bool {
        self.pending.is_empty()
    }

    /// The most specific failure seen on this node or its explored children.
    pub fn rejection(&self) -> Option<&CartonError> {
        self.rejection.as_ref()
    }

    pub fn into_rejection(self) -> Option<CartonError> {
        self.rejection
    }

    pub fn assignment(&self) -> &BTreeMap<Dependency, PinnedVersion> {
        &self.assignment
    }

    pub fn into_assignment(self) -> BTreeMap<Dependency, PinnedVersion> {
        self.assignment
    }

    /// Names still waiting for a version.
    pub fn pending_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.pending.keys().map(String::as_str)
    }

    /// Keep `error` if it is at least as specific as the one already held.
    pub fn record_rejection(&mut self, error: CartonError) {
        let replace = self
            .rejection
            .as_ref()
            .map_or(true, |current| specificity(&error) >= specificity(current));
        if replace {
            self.rejection = Some(error);
        }
    }

    fn reject(&mut self, error: CartonError) {
        tracing::debug!("Rejecting branch: {error}");
        self.rejected = true;
        self.record_rejection(error);
    }

    /// Unwrap a retriever answer. A parse failure rejects this node and
    /// yields `None`; any other failure aborts the search.
    fn readable<T>(&mut self, answer: CartonResult<T>) -> CartonResult<Option<T>> {
        match answer {
            Ok(value) => Ok(Some(value)),
            Err(error @ CartonError::Parse { .. }) => {
                self.reject(error);
                Ok(None)
            }
            Err(error) => Err(error),
        }
    }

    /// Apply the next untried candidate of the branching name to a copy of
    /// this node and return the copy.
    ///
    /// The branching name is the pending one with the fewest candidates
    /// (smallest name on ties), fixed on the first call. Returns `Ok(None)`
    /// once its candidates are exhausted.
    pub async fn pop_sub_set<R>(&mut self, retriever: &R) -> CartonResult<Option<DependencySet>>
    where
        R: DependencyRetriever + ?Sized,
    {
        if self.rejected {
            return Ok(None);
        }
        let name = match &self.branching {
            Some(name) => name.clone(),
            None => {
                let fewest = self.pending.iter().min_by(|(a_name, a), (b_name, b)| {
                    a.candidates
                        .len()
                        .cmp(&b.candidates.len())
                        .then_with(|| a_name.cmp(b_name))
                });
                match fewest {
                    Some((name, _)) => name.clone(),
                    None => return Ok(None),
                }
            }
        };
        self.branching = Some(name.clone());

        let Some(version) = self
            .pending
            .get_mut(&name)
            .and_then(|pending| pending.candidates.pop_front())
        else {
            return Ok(None);
        };

        let mut child = self.clone();
        child.branching = None;
        child.rejection = None;
        let Some(pending) = child.pending.remove(&name) else {
            return Err(CartonError::internal(format!(
                "branching on {name}, which is not pending"
            )));
        };
        tracing::trace!("Trying {} @ {version}", pending.dependency);
        child.apply(name, pending, version, retriever).await?;
        Ok(Some(child))
    }

    /// Pin `pending` at `version` and fold in what that version requires.
    async fn apply<R>(
        &mut self,
        name: String,
        pending: PendingDependency,
        version: PinnedVersion,
        retriever: &R,
    ) -> CartonResult<()>
    where
        R: DependencyRetriever + ?Sized,
    {
        self.assignment
            .insert(pending.dependency.clone(), version.clone());
        for alias in pending.aliases {
            self.assignment.insert(alias, version.clone());
        }
        self.identities
            .insert(name.clone(), pending.dependency.clone());

        let answer = retriever.requirements(&pending.dependency, &version).await;
        let Some(requirements) = self.readable(answer)? else {
            return Ok(());
        };
        for entry in &requirements {
            if self.rejected {
                break;
            }
            self.add_requirement(Some(name.as_str()), entry, retriever)
                .await?;
        }
        Ok(())
    }

    /// Fold one requirement edge into this node.
    ///
    /// Matching is by project name: an entry for a name that is already
    /// resolved is checked against the pin immediately, and one for a name
    /// that is already pending narrows that name's candidates.
    async fn add_requirement<R>(
        &mut self,
        requirer: Option<&str>,
        entry: &DependencyEntry,
        retriever: &R,
    ) -> CartonResult<()>
    where
        R: DependencyRetriever + ?Sized,
    {
        let name = entry.dependency.name();
        if let Some(requirer) = requirer {
            self.edges
                .entry(requirer.to_string())
                .or_default()
                .insert(name.clone());
        }

        if let Some(primary) = self.identities.get(&name).cloned() {
            let Some(pinned) = self.assignment.get(&primary).cloned() else {
                return Err(CartonError::internal(format!(
                    "{primary} is resolved without a pinned version"
                )));
            };
            let answer = self
                .accepts(&primary, &entry.specifier, &pinned, retriever)
                .await;
            let Some(accepted) = self.readable(answer)? else {
                return Ok(());
            };
            if !accepted {
                self.reject(CartonError::ConflictingRequirement {
                    name,
                    existing: pinned.to_string(),
                    requested: entry.specifier.to_string(),
                });
                return Ok(());
            }
            self.assignment
                .entry(entry.dependency.clone())
                .or_insert(pinned);
            return Ok(());
        }

        if self.pending.contains_key(&name) {
            self.merge_pending(name, entry, retriever).await
        } else {
            self.insert_pending(name, entry, retriever).await
        }
    }

    /// Whether an already pinned `dependency` satisfies `specifier`.
    async fn accepts<R>(
        &self,
        dependency: &Dependency,
        specifier: &VersionSpecifier,
        pinned: &PinnedVersion,
        retriever: &R,
    ) -> CartonResult<bool>
    where
        R: DependencyRetriever + ?Sized,
    {
        match specifier {
            VersionSpecifier::GitReference(reference) => {
                if pinned.commitish() == reference || self.policy.is_locked(&dependency.name()) {
                    return Ok(true);
                }
                let commit = retriever.resolve_reference(dependency, reference).await?;
                Ok(&commit == pinned)
            }
            _ => Ok(specifier.is_satisfied_by(pinned)),
        }
    }

    async fn merge_pending<R>(
        &mut self,
        name: String,
        entry: &DependencyEntry,
        retriever: &R,
    ) -> CartonResult<()>
    where
        R: DependencyRetriever + ?Sized,
    {
        let Some(dependency) = self.pending.get(&name).map(|p| p.dependency.clone()) else {
            return Err(CartonError::internal(format!("{name} is not pending")));
        };
        let resolved_reference = match &entry.specifier {
            VersionSpecifier::GitReference(reference) if !self.policy.is_locked(&name) => {
                let answer = retriever.resolve_reference(&dependency, reference).await;
                match self.readable(answer)? {
                    Some(commit) => Some(commit),
                    None => return Ok(()),
                }
            }
            _ => None,
        };

        let Some(pending) = self.pending.get_mut(&name) else {
            return Err(CartonError::internal(format!("{name} is not pending")));
        };
        let existing = pending.describe();

        let ranges_compatible = pending
            .specifiers
            .iter()
            .chain(std::iter::once(&entry.specifier))
            .filter(|s| !matches!(s, VersionSpecifier::GitReference(_)))
            .try_fold(VersionSpecifier::Any, |narrowed, s| narrowed.intersection(s))
            .is_some();

        pending.specifiers.push(entry.specifier.clone());
        if entry.dependency != pending.dependency {
            pending.aliases.insert(entry.dependency.clone());
        }

        if !ranges_compatible {
            pending.candidates.clear();
        } else if let Some(commit) = resolved_reference {
            let consistent = pending.reference.as_ref().map_or(true, |c| c == &commit)
                && pending.specifiers.iter().all(|s| {
                    matches!(s, VersionSpecifier::GitReference(_)) || s.is_satisfied_by(&commit)
                });
            pending.candidates = if consistent {
                VecDeque::from([commit.clone()])
            } else {
                VecDeque::new()
            };
            pending.reference = Some(commit);
        } else if !matches!(entry.specifier, VersionSpecifier::GitReference(_)) {
            pending
                .candidates
                .retain(|candidate| entry.specifier.is_satisfied_by(candidate));
        }

        if pending.candidates.is_empty() {
            self.reject(CartonError::ConflictingRequirement {
                name,
                existing,
                requested: entry.specifier.to_string(),
            });
        }
        Ok(())
    }

    async fn insert_pending<R>(
        &mut self,
        name: String,
        entry: &DependencyEntry,
        retriever: &R,
    ) -> CartonResult<()>
    where
        R: DependencyRetriever + ?Sized,
    {
        let policy = Arc::clone(&self.policy);
        let dependency = &entry.dependency;
        let specifier = &entry.specifier;
        let mut reference = None;

        let candidates = match (policy.preference(&name), specifier) {
            (Preference::Only(pin), _) => {
                if matches!(specifier, VersionSpecifier::GitReference(_))
                    || specifier.is_satisfied_by(pin)
                {
                    VecDeque::from([pin.clone()])
                } else {
                    self.reject(CartonError::Unsatisfiable {
                        names: vec![name],
                        details: Some(format!(
                            "{dependency} is kept at {pin}, which does not satisfy {specifier}"
                        )),
                    });
                    return Ok(());
                }
            }
            (_, VersionSpecifier::GitReference(r)) => {
                let answer = retriever.resolve_reference(dependency, r).await;
                let Some(commit) = self.readable(answer)? else {
                    return Ok(());
                };
                reference = Some(commit.clone());
                VecDeque::from([commit])
            }
            (_, _) => {
                let answer = retriever.versions(dependency).await;
                let Some(versions) = self.readable(answer)? else {
                    return Ok(());
                };
                // Listings only offer tags that read as semantic versions.
                let eligible = versions
                    .into_iter()
                    .filter(|v| v.semantic_version().is_some() && specifier.is_satisfied_by(v))
                    .collect();
                policy.order(&name, eligible)
            }
        };

        if candidates.is_empty() {
            self.reject(CartonError::Unsatisfiable {
                names: vec![name],
                details: Some(format!("No version of {dependency} satisfies {specifier}")),
            });
            return Ok(());
        }
        tracing::trace!("{dependency} has {} candidate(s)", candidates.len());
        self.pending.insert(
            name,
            PendingDependency {
                dependency: dependency.clone(),
                aliases: BTreeSet::new(),
                specifiers: vec![specifier.clone()],
                reference,
                candidates,
            },
        );
        Ok(())
    }

    /// Check that the resolved names can be ordered and every root was resolved.
    ///
    /// On failure the node is rejected and the reason recorded.
    pub fn validate_for_cyclic_dependencies(&mut self, root_dependencies: &[Dependency]) -> bool {
        let graph: BTreeMap<String, BTreeSet<String>> = self
            .identities
            .keys()
            .map(|name| {
                let required = self.edges.get(name).cloned().unwrap_or_default();
                (name.clone(), required)
            })
            .collect();

        if topological_sort(&graph).is_none() {
            let error = match find_cycle(&graph) {
                Some(members) => CartonError::CyclicDependencies { members },
                None => CartonError::internal(
                    "resolved dependencies cannot be ordered but contain no cycle",
                ),
            };
            self.reject(error);
            return false;
        }

        if let Some(missing) = root_dependencies
            .iter()
            .find(|dependency| !self.identities.contains_key(&dependency.name()))
        {
            let error = CartonError::Unsatisfiable {
                names: vec![missing.name()],
                details: Some(format!("{missing} was never resolved")),
            };
            self.reject(error);
            return false;
        }
        true
    }

    /// Collapse identities that name the same project into one entry.
    ///
    /// The identity listed in `root_entries` wins, then the one the project
    /// was first required as. Identities pinned at different versions
    /// cannot be reconciled.
    pub fn eliminate_same_named_dependencies(
        &mut self,
        root_entries: &[DependencyEntry],
    ) -> CartonResult<()> {
        let mut by_name: BTreeMap<String, Vec<(Dependency, PinnedVersion)>> = BTreeMap::new();
        for (dependency, version) in &self.assignment {
            by_name
                .entry(dependency.name())
                .or_default()
                .push((dependency.clone(), version.clone()));
        }

        for (name, variants) in by_name {
            let [(first, first_version), rest @ ..] = variants.as_slice() else {
                continue;
            };
            if rest.is_empty() {
                continue;
            }
            if let Some((second, second_version)) =
                rest.iter().find(|(_, version)| version != first_version)
            {
                return Err(CartonError::DuplicateDependency {
                    name,
                    first: first.to_string(),
                    first_version: first_version.to_string(),
                    second: second.to_string(),
                    second_version: second_version.to_string(),
                });
            }

            let keep = variants
                .iter()
                .map(|(dependency, _)| dependency)
                .find(|dependency| root_entries.iter().any(|e| &e.dependency == *dependency))
                .or_else(|| {
                    self.identities
                        .get(&name)
                        .filter(|primary| variants.iter().any(|(d, _)| d == *primary))
                })
                .unwrap_or(first)
                .clone();

            tracing::debug!("Collapsing {} identities of {name} into {keep}", variants.len());
            for (dependency, _) in &variants {
                if dependency != &keep {
                    self.assignment.remove(dependency);
                }
            }
            self.identities.insert(name, keep);
        }
        Ok(())
    }

    #[cfg(test)]
    fn with_assignment(assignment: BTreeMap<Dependency, PinnedVersion>) -> Self {
        let identities = assignment
            .keys()
            .map(|dependency| (dependency.name(), dependency.clone()))
            .collect();
        Self {
            assignment,
            identities,
            pending: BTreeMap::new(),
            edges: BTreeMap::new(),
            branching: None,
            policy: Arc::new(UpdatePolicy::default()),
            rejected: false,
            rejection: None,
        }
    }
}
