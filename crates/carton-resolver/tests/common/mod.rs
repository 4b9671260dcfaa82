#![allow(dead_code)]

use std::collections::BTreeMap;

use async_trait::async_trait;
use carton_core::dependency::{Dependency, DependencyEntry};
use carton_core::version::{PinnedVersion, VersionSpecifier};
use carton_resolver::fixture::FixtureRetriever;
use carton_resolver::DependencyRetriever;
use carton_util::errors::{CartonError, CartonResult};
use tokio_util::sync::CancellationToken;

/// Route resolver logs to the test harness; `RUST_LOG=carton_resolver=trace` to see them.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

pub fn github(identifier: &str) -> Dependency {
    Dependency::github(identifier).unwrap()
}

pub fn entry(dependency: &Dependency, specifier: &str) -> DependencyEntry {
    DependencyEntry::new(dependency.clone(), specifier.parse().unwrap())
}

pub fn requirements(entries: &[(&Dependency, &str)]) -> BTreeMap<Dependency, VersionSpecifier> {
    entries
        .iter()
        .map(|(dependency, specifier)| ((*dependency).clone(), specifier.parse().unwrap()))
        .collect()
}

pub fn pinned(entries: &[(&Dependency, &str)]) -> BTreeMap<Dependency, PinnedVersion> {
    entries
        .iter()
        .map(|(dependency, version)| ((*dependency).clone(), PinnedVersion::new(*version)))
        .collect()
}

/// Fixture data with scripted misbehaviour layered on top.
pub struct Scripted {
    pub fixtures: FixtureRetriever,
    /// Requirements of this version fail to parse.
    pub unreadable: Option<(Dependency, PinnedVersion)>,
    /// This reference fails to parse.
    pub unreadable_reference: Option<(Dependency, String)>,
    /// Cancelled as soon as any requirement list is fetched.
    pub cancel_on_fetch: Option<CancellationToken>,
}

impl Scripted {
    pub fn new(fixtures: FixtureRetriever) -> Self {
        Self {
            fixtures,
            unreadable: None,
            unreadable_reference: None,
            cancel_on_fetch: None,
        }
    }
}

#[async_trait]
impl DependencyRetriever for Scripted {
    async fn versions(&self, dependency: &Dependency) -> CartonResult<Vec<PinnedVersion>> {
        self.fixtures.versions(dependency).await
    }

    async fn requirements(
        &self,
        dependency: &Dependency,
        version: &PinnedVersion,
    ) -> CartonResult<Vec<DependencyEntry>> {
        if let Some(token) = &self.cancel_on_fetch {
            token.cancel();
        }
        if let Some((broken, at)) = &self.unreadable {
            if broken == dependency && at == version {
                return Err(CartonError::Parse {
                    input: format!("{dependency} @ {version}"),
                    message: "unreadable dependency list".to_string(),
                });
            }
        }
        self.fixtures.requirements(dependency, version).await
    }

    async fn resolve_reference(
        &self,
        dependency: &Dependency,
        reference: &str,
    ) -> CartonResult<PinnedVersion> {
        if let Some((broken, name)) = &self.unreadable_reference {
            if broken == dependency && name == reference {
                return Err(CartonError::Parse {
                    input: reference.to_string(),
                    message: "not a valid reference".to_string(),
                });
            }
        }
        self.fixtures.resolve_reference(dependency, reference).await
    }
}
