//! Compatibility analysis of a pinned assignment against the requirements
//! its members declare, and reporting of the mismatches found.

use std::collections::BTreeMap;
use std::fmt;

use carton_core::dependency::{Dependency, DependencyEntry};
use carton_core::version::{PinnedVersion, VersionSpecifier};

/// A pinned dependency together with every requirement placed on it,
/// keyed by the dependency that declared the requirement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompatibilityInfo {
    pub dependency: Dependency,
    pub pinned_version: PinnedVersion,
    pub requirements: BTreeMap<Dependency, VersionSpecifier>,
}

impl CompatibilityInfo {
    pub fn new(dependency: Dependency, pinned_version: PinnedVersion) -> Self {
        Self {
            dependency,
            pinned_version,
            requirements: BTreeMap::new(),
        }
    }

    /// Requirements whose specifier rejects the pinned version.
    ///
    /// Git references are skipped: whether a commit is what a branch or tag
    /// pointed at can only be answered by a retriever.
    pub fn incompatible_requirements(
        &self,
    ) -> impl Iterator<Item = (&Dependency, &VersionSpecifier)> + '_ {
        self.requirements.iter().filter(|(_, specifier)| {
            !matches!(specifier, VersionSpecifier::GitReference(_))
                && !specifier.is_satisfied_by(&self.pinned_version)
        })
    }

    pub fn is_compatible(&self) -> bool {
        self.incompatible_requirements().next().is_none()
    }

    /// One entry per pinned dependency, collecting the requirements every
    /// other pinned dependency places on it (matched by project name).
    ///
    /// `requirements` maps a requirer to the entries it declares at its
    /// pinned version.
    pub fn from_assignment(
        assignment: &BTreeMap<Dependency, PinnedVersion>,
        requirements: &BTreeMap<Dependency, Vec<DependencyEntry>>,
    ) -> Vec<CompatibilityInfo> {
        assignment
            .iter()
            .map(|(dependency, pinned)| {
                let mut info = CompatibilityInfo::new(dependency.clone(), pinned.clone());
                for (requirer, entries) in requirements {
                    for entry in entries {
                        if entry.dependency.same_project(dependency) {
                            info.requirements
                                .insert(requirer.clone(), entry.specifier.clone());
                        }
                    }
                }
                info
            })
            .collect()
    }
}

impl fmt::Display for CompatibilityInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ {}", self.dependency, self.pinned_version)?;
        for (requirer, specifier) in self.incompatible_requirements() {
            write!(f, "\n    {requirer} requires {specifier}")?;
        }
        Ok(())
    }
}

/// Every pinned dependency with at least one incompatible requirement.
#[derive(Debug, Default)]
pub struct ConflictReport {
    pub infos: Vec<CompatibilityInfo>,
}

impl ConflictReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a report from analysed infos, keeping only the incompatible ones.
    pub fn from_infos(infos: impl IntoIterator<Item = CompatibilityInfo>) -> Self {
        let mut report = Self::new();
        for info in infos {
            report.add(info);
        }
        report
    }

    /// Record `info` if any of its requirements rejects its pin.
    pub fn add(&mut self, info: CompatibilityInfo) {
        if !info.is_compatible() {
            self.infos.push(info);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }

    pub fn len(&self) -> usize {
        self.infos.len()
    }
}

impl fmt::Display for ConflictReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.infos.is_empty() {
            return write!(f, "No incompatible requirements.");
        }
        write!(f, "Incompatible requirements ({}):", self.infos.len())?;
        for info in &self.infos {
            write!(f, "\n  {info}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn github(identifier: &str) -> Dependency {
        Dependency::github(identifier).unwrap()
    }

    fn entry(dependency: Dependency, specifier: &str) -> DependencyEntry {
        DependencyEntry::new(dependency, specifier.parse().unwrap())
    }

    #[test]
    fn empty_report() {
        let report = ConflictReport::new();
        assert!(report.is_empty());
        assert_eq!(report.len(), 0);
        assert_eq!(report.to_string(), "No incompatible requirements.");
    }

    #[test]
    fn incompatible_requirements_are_reported_by_requirer() {
        let core = github("owner/Core");
        let app = github("owner/App");
        let tool = github("owner/Tool");

        let assignment = BTreeMap::from([
            (core.clone(), PinnedVersion::new("1.4.0")),
            (app.clone(), PinnedVersion::new("2.0.0")),
            (tool.clone(), PinnedVersion::new("0.3.0")),
        ]);
        let requirements = BTreeMap::from([
            (app.clone(), vec![entry(core.clone(), "~> 1.2")]),
            (tool.clone(), vec![entry(core.clone(), ">= 2.0")]),
        ]);

        let infos = CompatibilityInfo::from_assignment(&assignment, &requirements);
        let core_info = infos.iter().find(|i| i.dependency == core).unwrap();
        assert_eq!(core_info.requirements.len(), 2);
        let incompatible: Vec<_> = core_info.incompatible_requirements().collect();
        assert_eq!(incompatible.len(), 1);
        assert_eq!(incompatible[0].0, &tool);

        let report = ConflictReport::from_infos(infos);
        assert_eq!(report.len(), 1);
        let text = report.to_string();
        assert!(text.contains("github \"owner/Core\" @ 1.4.0"), "{text}");
        assert!(text.contains("github \"owner/Tool\" requires >= 2.0.0"), "{text}");
    }

    #[test]
    fn requirements_match_by_project_name() {
        let hosted = github("owner/Core");
        let git = Dependency::git("https://example.com/Core.git");
        let app = github("owner/App");

        let assignment = BTreeMap::from([(hosted.clone(), PinnedVersion::new("1.0.0"))]);
        let requirements = BTreeMap::from([(app.clone(), vec![entry(git, "== 2.0")])]);

        let infos = CompatibilityInfo::from_assignment(&assignment, &requirements);
        assert_eq!(infos.len(), 1);
        assert!(!infos[0].is_compatible());
    }

    #[test]
    fn git_references_are_not_judged_locally() {
        let mut info = CompatibilityInfo::new(github("owner/Core"), PinnedVersion::new("abc123"));
        info.requirements.insert(
            github("owner/App"),
            VersionSpecifier::GitReference("main".to_string()),
        );
        assert!(info.is_compatible());
    }
}
