//! A local, in-memory retriever backed by a fixture description.
//!
//! Fixtures describe projects, the versions they publish, what each version
//! requires, and which symbolic references resolve to which commits:
//!
//! ```toml
//! [[project]]
//! github = "ReactiveCocoa/ReactiveSwift"
//!
//! [project.versions]
//! "6.1.0" = [{ github = "antitypical/Result", version = "~> 4.1" }]
//! "6.2.0" = []
//!
//! [project.references]
//! main = "8a1b2c3"
//!
//! [project.commits]
//! "8a1b2c3" = []
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use carton_core::dependency::{Dependency, DependencyEntry, Repository, Server};
use carton_core::version::{PinnedVersion, VersionSpecifier};
use carton_util::errors::{CartonError, CartonResult};
use serde::Deserialize;

use crate::retriever::DependencyRetriever;

#[derive(Debug, Deserialize)]
struct FixtureFile {
    #[serde(default, rename = "project")]
    projects: Vec<FixtureProject>,
}

#[derive(Debug, Deserialize)]
struct FixtureProject {
    #[serde(flatten)]
    source: FixtureSource,
    #[serde(default)]
    versions: BTreeMap<String, Vec<FixtureRequirement>>,
    #[serde(default)]
    commits: BTreeMap<String, Vec<FixtureRequirement>>,
    #[serde(default)]
    references: BTreeMap<String, String>,
}

/// Exactly one of `github`, `git` or `binary`; `server` selects an enterprise host.
#[derive(Debug, Deserialize)]
struct FixtureSource {
    #[serde(default)]
    github: Option<String>,
    #[serde(default)]
    server: Option<String>,
    #[serde(default)]
    git: Option<String>,
    #[serde(default)]
    binary: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FixtureRequirement {
    #[serde(flatten)]
    source: FixtureSource,
    #[serde(default)]
    version: Option<String>,
}

impl FixtureSource {
    fn to_dependency(&self) -> CartonResult<Dependency> {
        match (&self.github, &self.git, &self.binary) {
            (Some(identifier), None, None) => {
                let repository = Repository::from_identifier(identifier)?;
                let server = match &self.server {
                    Some(url) => Server::Enterprise { url: url.clone() },
                    None => Server::GitHub,
                };
                Ok(Dependency::Hosted { server, repository })
            }
            (None, Some(url), None) => Ok(Dependency::git(url.clone())),
            (None, None, Some(url)) => Ok(Dependency::binary(url.clone())),
            _ => Err(CartonError::Parse {
                input: format!("{self:?}"),
                message: "a fixture source needs exactly one of `github`, `git` or `binary`"
                    .to_string(),
            }),
        }
    }
}

impl FixtureRequirement {
    fn to_entry(&self) -> CartonResult<DependencyEntry> {
        let specifier = match &self.version {
            Some(text) => text.parse::<VersionSpecifier>()?,
            None => VersionSpecifier::Any,
        };
        Ok(DependencyEntry::new(self.source.to_dependency()?, specifier))
    }
}

#[derive(Debug, Default, Clone)]
struct Project {
    /// Published versions; these are the candidates `versions()` lists.
    versions: BTreeMap<PinnedVersion, Vec<DependencyEntry>>,
    /// Commits reachable only through references.
    commits: BTreeMap<PinnedVersion, Vec<DependencyEntry>>,
    references: BTreeMap<String, PinnedVersion>,
}

/// A [`DependencyRetriever`] answering from fixed, in-memory data.
#[derive(Debug, Default)]
pub struct FixtureRetriever {
    projects: BTreeMap<Dependency, Project>,
    requests: AtomicUsize,
}

impl FixtureRetriever {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load fixtures from a TOML file.
    pub fn from_path(path: &Path) -> CartonResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| CartonError::Config {
            message: format!("Failed to read fixtures {}: {e}", path.display()),
        })?;
        Self::parse_toml(&content)
    }

    pub fn parse_toml(content: &str) -> CartonResult<Self> {
        let file: FixtureFile = toml::from_str(content).map_err(|e| CartonError::Config {
            message: format!("Failed to parse fixtures: {e}"),
        })?;

        let mut retriever = Self::new();
        for fixture in &file.projects {
            let dependency = fixture.source.to_dependency()?;
            let project = retriever.projects.entry(dependency).or_default();
            for (version, requirements) in &fixture.versions {
                let entries = requirements
                    .iter()
                    .map(FixtureRequirement::to_entry)
                    .collect::<CartonResult<Vec<_>>>()?;
                project.versions.insert(PinnedVersion::new(version), entries);
            }
            for (commit, requirements) in &fixture.commits {
                let entries = requirements
                    .iter()
                    .map(FixtureRequirement::to_entry)
                    .collect::<CartonResult<Vec<_>>>()?;
                project.commits.insert(PinnedVersion::new(commit), entries);
            }
            for (reference, commit) in &fixture.references {
                let commit = PinnedVersion::new(commit);
                if !project.versions.contains_key(&commit) {
                    project.commits.entry(commit.clone()).or_default();
                }
                project.references.insert(reference.clone(), commit);
            }
        }
        Ok(retriever)
    }

    /// Publish `version` of `dependency` with the given requirements.
    pub fn with_version(
        mut self,
        dependency: &Dependency,
        version: &str,
        requirements: Vec<DependencyEntry>,
    ) -> Self {
        self.projects
            .entry(dependency.clone())
            .or_default()
            .versions
            .insert(PinnedVersion::new(version), requirements);
        self
    }

    /// Make `reference` resolve to `commit`. A commit that is not a published
    /// version gets an empty requirement list unless one is added with
    /// [`FixtureRetriever::with_commit`].
    pub fn with_reference(mut self, dependency: &Dependency, reference: &str, commit: &str) -> Self {
        let project = self.projects.entry(dependency.clone()).or_default();
        let commit = PinnedVersion::new(commit);
        if !project.versions.contains_key(&commit) {
            project.commits.entry(commit.clone()).or_default();
        }
        project.references.insert(reference.to_string(), commit);
        self
    }

    /// Requirements for a commit reachable only through a reference.
    pub fn with_commit(
        mut self,
        dependency: &Dependency,
        commit: &str,
        requirements: Vec<DependencyEntry>,
    ) -> Self {
        self.projects
            .entry(dependency.clone())
            .or_default()
            .commits
            .insert(PinnedVersion::new(commit), requirements);
        self
    }

    /// Total number of retriever calls answered so far.
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    fn project(&self, dependency: &Dependency) -> CartonResult<&Project> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        self.projects
            .get(dependency)
            .ok_or_else(|| CartonError::retrieval(dependency, "no such project in fixtures"))
    }
}

#[async_trait]
impl DependencyRetriever for FixtureRetriever {
    async fn versions(&self, dependency: &Dependency) -> CartonResult<Vec<PinnedVersion>> {
        Ok(self.project(dependency)?.versions.keys().cloned().collect())
    }

    async fn requirements(
        &self,
        dependency: &Dependency,
        version: &PinnedVersion,
    ) -> CartonResult<Vec<DependencyEntry>> {
        let project = self.project(dependency)?;
        project
            .versions
            .get(version)
            .or_else(|| project.commits.get(version))
            .cloned()
            .ok_or_else(|| CartonError::retrieval(dependency, format!("unknown version {version}")))
    }

    async fn resolve_reference(
        &self,
        dependency: &Dependency,
        reference: &str,
    ) -> CartonResult<PinnedVersion> {
        let project = self.project(dependency)?;
        if let Some(commit) = project.references.get(reference) {
            return Ok(commit.clone());
        }
        // A reference naming a published tag resolves to that tag.
        let tag = PinnedVersion::new(reference);
        if project.versions.contains_key(&tag) {
            return Ok(tag);
        }
        Err(CartonError::retrieval(
            dependency,
            format!("unknown reference \"{reference}\""),
        ))
    }
}
