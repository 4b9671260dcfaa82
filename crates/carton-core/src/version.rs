//! Semantic versions, pinned versions and version specifiers.
//!
//! A [`PinnedVersion`] is whatever the retriever hands back (a tag, a branch
//! or a commit). When it can be read as a [`SemanticVersion`] it takes part
//! in range matching and newest-first ordering; otherwise it is treated as
//! an opaque reference that every range specifier accepts.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use carton_util::errors::{CartonError, CartonResult};
use semver::{BuildMetadata, Prerelease};

/// A parsed semantic version.
///
/// Field order matters: the derived ordering compares the numeric core, then
/// the prerelease (where an empty prerelease sorts after any prerelease),
/// then build metadata as a final tie-break.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SemanticVersion {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub pre_release: Prerelease,
    pub build_metadata: BuildMetadata,
}

impl SemanticVersion {
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            pre_release: Prerelease::EMPTY,
            build_metadata: BuildMetadata::EMPTY,
        }
    }

    /// Scan a version out of a tag-like string.
    ///
    /// Accepts an optional leading `v`, requires `major.minor`, and defaults
    /// the patch component to `0`: `v1.2`, `1.2.3-beta.1+exp.sha`.
    pub fn parse(input: &str) -> CartonResult<Self> {
        let trimmed = input.trim();
        let body = trimmed
            .strip_prefix(['v', 'V'])
            .unwrap_or(trimmed);

        let (rest, build) = match body.split_once('+') {
            Some((rest, build)) => (rest, Some(build)),
            None => (body, None),
        };
        let (core, pre) = match rest.split_once('-') {
            Some((core, pre)) => (core, Some(pre)),
            None => (rest, None),
        };

        let mut components = core.split('.');
        let major = parse_component(input, components.next(), "major")?;
        let minor = parse_component(input, components.next(), "minor")?;
        let patch = match components.next() {
            Some(patch) => parse_component(input, Some(patch), "patch")?,
            None => 0,
        };
        if let Some(extra) = components.next() {
            return Err(CartonError::Parse {
                input: extra.to_string(),
                message: format!("unexpected fourth version component in `{input}`"),
            });
        }

        if pre == Some("") || build == Some("") {
            return Err(CartonError::Parse {
                input: input.to_string(),
                message: "empty pre-release or build metadata".to_string(),
            });
        }

        let pre_release = match pre {
            Some(pre) => Prerelease::new(pre).map_err(|e| CartonError::Parse {
                input: pre.to_string(),
                message: format!("invalid pre-release identifiers ({e})"),
            })?,
            None => Prerelease::EMPTY,
        };
        let build_metadata = match build {
            Some(build) => BuildMetadata::new(build).map_err(|e| CartonError::Parse {
                input: build.to_string(),
                message: format!("invalid build metadata ({e})"),
            })?,
            None => BuildMetadata::EMPTY,
        };

        Ok(Self {
            major,
            minor,
            patch,
            pre_release,
            build_metadata,
        })
    }

    pub fn is_pre_release(&self) -> bool {
        !self.pre_release.is_empty()
    }

    /// Semantic-versioning precedence, which ignores build metadata.
    pub fn cmp_precedence(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.patch)
            .cmp(&(other.major, other.minor, other.patch))
            .then_with(|| self.pre_release.cmp(&other.pre_release))
    }
}

fn parse_component(input: &str, component: Option<&str>, kind: &str) -> CartonResult<u64> {
    let component = match component {
        Some(c) if !c.is_empty() => c,
        _ => {
            return Err(CartonError::Parse {
                input: input.to_string(),
                message: format!("expected a {kind} version number"),
            })
        }
    };
    if !component.bytes().all(|b| b.is_ascii_digit()) {
        return Err(CartonError::Parse {
            input: component.to_string(),
            message: format!("{kind} version is not a number"),
        });
    }
    if component.len() > 1 && component.starts_with('0') {
        return Err(CartonError::Parse {
            input: component.to_string(),
            message: format!("{kind} version has a leading zero"),
        });
    }
    component.parse::<u64>().map_err(|e| CartonError::Parse {
        input: component.to_string(),
        message: format!("{kind} version out of range ({e})"),
    })
}

impl FromStr for SemanticVersion {
    type Err = CartonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for SemanticVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if !self.pre_release.is_empty() {
            write!(f, "-{}", self.pre_release)?;
        }
        if !self.build_metadata.is_empty() {
            write!(f, "+{}", self.build_metadata)?;
        }
        Ok(())
    }
}

/// An immutable point in a dependency's history: a tag, branch or commit.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PinnedVersion {
    commitish: String,
}

impl PinnedVersion {
    pub fn new(commitish: impl Into<String>) -> Self {
        Self {
            commitish: commitish.into(),
        }
    }

    pub fn commitish(&self) -> &str {
        &self.commitish
    }

    /// Best-effort semantic reading of this pinned version.
    pub fn semantic_version(&self) -> Option<SemanticVersion> {
        SemanticVersion::parse(&self.commitish).ok()
    }

    /// The key [`Ord`] compares by. Computing it parses the text, so sort
    /// long lists by a key taken once per element.
    pub fn sort_key(&self) -> (Option<SemanticVersion>, &str) {
        (self.semantic_version(), &self.commitish)
    }
}

impl From<&str> for PinnedVersion {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl fmt::Display for PinnedVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.commitish)
    }
}

/// Semantic order when both sides parse, lexical order otherwise.
///
/// A semantic version always sorts above an opaque reference so that the
/// order stays transitive when tags and branch names are mixed.
impl Ord for PinnedVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

impl PartialOrd for PinnedVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A constraint describing which pinned versions are acceptable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VersionSpecifier {
    Any,
    Exactly(SemanticVersion),
    AtLeast(SemanticVersion),
    CompatibleWith(SemanticVersion),
    GitReference(String),
}

impl VersionSpecifier {
    /// Whether `version` satisfies this specifier.
    ///
    /// Pinned versions that are not semantic (branches, commits) satisfy
    /// every range. A git reference only matches its own text here; the
    /// resolver settles references through the retriever instead.
    pub fn is_satisfied_by(&self, version: &PinnedVersion) -> bool {
        match self {
            Self::Any => true,
            Self::GitReference(reference) => version.commitish() == reference,
            _ => match version.semantic_version() {
                Some(semantic) => self.matches(&semantic),
                None => true,
            },
        }
    }

    /// Range matching against an already parsed version.
    pub fn matches(&self, version: &SemanticVersion) -> bool {
        match self {
            Self::Any | Self::GitReference(_) => true,
            Self::Exactly(required) => version.cmp_precedence(required) == Ordering::Equal,
            Self::AtLeast(required) => version.cmp_precedence(required) != Ordering::Less,
            Self::CompatibleWith(required) => {
                version.major == required.major
                    && (required.major != 0 || version.minor == required.minor)
                    && version.cmp_precedence(required) != Ordering::Less
            }
        }
    }

    /// The tightest specifier accepted by both `self` and `other`, or `None`
    /// when no version can satisfy both.
    ///
    /// Git references cannot be compared locally, so they are kept as-is and
    /// checked against the resolved commit later.
    pub fn intersection(&self, other: &Self) -> Option<Self> {
        use VersionSpecifier::*;

        match (self, other) {
            (Any, spec) | (spec, Any) => Some(spec.clone()),
            (GitReference(a), GitReference(b)) => (a == b).then(|| GitReference(a.clone())),
            (GitReference(r), _) | (_, GitReference(r)) => Some(GitReference(r.clone())),
            (Exactly(a), Exactly(b)) => {
                (a.cmp_precedence(b) == Ordering::Equal).then(|| Exactly(a.clone()))
            }
            (Exactly(v), spec) | (spec, Exactly(v)) => spec.matches(v).then(|| Exactly(v.clone())),
            (AtLeast(a), AtLeast(b)) => Some(AtLeast(max_precedence(a, b).clone())),
            (AtLeast(lower), CompatibleWith(base)) | (CompatibleWith(base), AtLeast(lower)) => {
                if lower.cmp_precedence(base) == Ordering::Greater {
                    CompatibleWith(base.clone())
                        .matches(lower)
                        .then(|| CompatibleWith(lower.clone()))
                } else {
                    Some(CompatibleWith(base.clone()))
                }
            }
            (CompatibleWith(a), CompatibleWith(b)) => {
                if a.major != b.major || (a.major == 0 && a.minor != b.minor) {
                    None
                } else {
                    Some(CompatibleWith(max_precedence(a, b).clone()))
                }
            }
        }
    }
}

fn max_precedence<'a>(a: &'a SemanticVersion, b: &'a SemanticVersion) -> &'a SemanticVersion {
    if a.cmp_precedence(b) == Ordering::Less {
        b
    } else {
        a
    }
}

impl fmt::Display for VersionSpecifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("*"),
            Self::Exactly(v) => write!(f, "== {v}"),
            Self::AtLeast(v) => write!(f, ">= {v}"),
            Self::CompatibleWith(v) => write!(f, "~> {v}"),
            Self::GitReference(r) => write!(f, "\"{r}\""),
        }
    }
}

/// Parse `*`, `== 1.0`, `>= 1.0`, `~> 1.0` or `"reference"`.
impl FromStr for VersionSpecifier {
    type Err = CartonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s == "*" {
            return Ok(Self::Any);
        }
        if let Some(v) = s.strip_prefix("==") {
            return Ok(Self::Exactly(SemanticVersion::parse(v)?));
        }
        if let Some(v) = s.strip_prefix(">=") {
            return Ok(Self::AtLeast(SemanticVersion::parse(v)?));
        }
        if let Some(v) = s.strip_prefix("~>") {
            return Ok(Self::CompatibleWith(SemanticVersion::parse(v)?));
        }
        if let Some(reference) = s
            .strip_prefix('"')
            .and_then(|rest| rest.strip_suffix('"'))
        {
            if reference.is_empty() {
                return Err(CartonError::Parse {
                    input: s.to_string(),
                    message: "empty git reference".to_string(),
                });
            }
            return Ok(Self::GitReference(reference.to_string()));
        }
        Err(CartonError::Parse {
            input: s.to_string(),
            message: "unrecognized version specifier".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> SemanticVersion {
        SemanticVersion::parse(s).unwrap()
    }

    fn pinned(s: &str) -> PinnedVersion {
        PinnedVersion::new(s)
    }

    #[test]
    fn parse_full_version() {
        let version = v("1.2.3-beta.1+exp.sha");
        assert_eq!((version.major, version.minor, version.patch), (1, 2, 3));
        assert_eq!(version.pre_release.as_str(), "beta.1");
        assert_eq!(version.build_metadata.as_str(), "exp.sha");
        assert_eq!(version.to_string(), "1.2.3-beta.1+exp.sha");
    }

    #[test]
    fn parse_tag_prefix_and_missing_patch() {
        assert_eq!(v("v1.2"), SemanticVersion::new(1, 2, 0));
        assert_eq!(v("V3.0.1"), SemanticVersion::new(3, 0, 1));
    }

    #[test]
    fn parse_errors_carry_offending_substring() {
        match SemanticVersion::parse("1.x.0") {
            Err(CartonError::Parse { input, .. }) => assert_eq!(input, "x"),
            other => panic!("unexpected: {other:?}"),
        }
        match SemanticVersion::parse("1.2.3.4") {
            Err(CartonError::Parse { input, .. }) => assert_eq!(input, "4"),
            other => panic!("unexpected: {other:?}"),
        }
        assert!(SemanticVersion::parse("1").is_err());
        assert!(SemanticVersion::parse("main").is_err());
        assert!(SemanticVersion::parse("1.0.0-").is_err());
        match SemanticVersion::parse("1.02.0") {
            Err(CartonError::Parse { input, .. }) => assert_eq!(input, "02"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn prerelease_precedence() {
        assert!(v("1.0.0-alpha") < v("1.0.0-alpha.1"));
        assert!(v("1.0.0-alpha.1") < v("1.0.0-beta"));
        assert!(v("1.0.0-beta.2") < v("1.0.0-beta.11"));
        assert!(v("1.0.0-rc.1") < v("1.0.0"));
        assert!(v("1.0.0") < v("1.0.1"));
        assert!(v("1.9.0") < v("1.10.0"));
    }

    #[test]
    fn build_metadata_ignored_for_precedence() {
        assert_eq!(
            v("1.0.0+a").cmp_precedence(&v("1.0.0+b")),
            Ordering::Equal
        );
        assert_ne!(v("1.0.0+a"), v("1.0.0+b"));
    }

    #[test]
    fn pinned_versions_compare_semantically() {
        assert!(pinned("v1.10.0") > pinned("1.9.0"));
        assert!(pinned("2.0") > pinned("1.99.99"));
    }

    #[test]
    fn pinned_versions_fall_back_to_lexical() {
        assert!(pinned("develop") < pinned("main"));
        assert!(pinned("main") < pinned("0.0.1"));
        assert_ne!(pinned("v1.0.0"), pinned("1.0.0"));
    }

    #[test]
    fn any_is_always_satisfied() {
        assert!(VersionSpecifier::Any.is_satisfied_by(&pinned("1.0.0")));
        assert!(VersionSpecifier::Any.is_satisfied_by(&pinned("2.0.0-beta")));
        assert!(VersionSpecifier::Any.is_satisfied_by(&pinned("deadbeef")));
    }

    #[test]
    fn exactly_and_at_least() {
        let exactly = VersionSpecifier::Exactly(v("1.2.0"));
        assert!(exactly.is_satisfied_by(&pinned("v1.2")));
        assert!(!exactly.is_satisfied_by(&pinned("1.2.1")));

        let at_least = VersionSpecifier::AtLeast(v("1.2.0"));
        assert!(at_least.is_satisfied_by(&pinned("1.2.0")));
        assert!(at_least.is_satisfied_by(&pinned("3.0.0")));
        assert!(!at_least.is_satisfied_by(&pinned("1.1.9")));
    }

    #[test]
    fn compatible_with_major_and_zero_major() {
        let compatible = VersionSpecifier::CompatibleWith(v("1.2.0"));
        assert!(compatible.is_satisfied_by(&pinned("1.2.0")));
        assert!(compatible.is_satisfied_by(&pinned("1.9.3")));
        assert!(!compatible.is_satisfied_by(&pinned("2.0.0")));
        assert!(!compatible.is_satisfied_by(&pinned("1.1.0")));

        let zero = VersionSpecifier::CompatibleWith(v("0.3.1"));
        assert!(zero.is_satisfied_by(&pinned("0.3.5")));
        assert!(!zero.is_satisfied_by(&pinned("0.4.0")));
    }

    #[test]
    fn non_semantic_pins_satisfy_ranges() {
        let spec = VersionSpecifier::Exactly(v("1.0.0"));
        assert!(spec.is_satisfied_by(&pinned("a1b2c3d")));
    }

    #[test]
    fn git_reference_matches_own_text_only() {
        let spec = VersionSpecifier::GitReference("main".to_string());
        assert!(spec.is_satisfied_by(&pinned("main")));
        assert!(!spec.is_satisfied_by(&pinned("1.0.0")));
    }

    #[test]
    fn intersection_rules() {
        use VersionSpecifier::*;

        assert_eq!(Any.intersection(&AtLeast(v("1.0"))), Some(AtLeast(v("1.0"))));
        assert_eq!(
            AtLeast(v("1.0")).intersection(&AtLeast(v("1.5"))),
            Some(AtLeast(v("1.5")))
        );
        assert_eq!(
            AtLeast(v("1.5")).intersection(&CompatibleWith(v("1.0"))),
            Some(CompatibleWith(v("1.5")))
        );
        assert_eq!(
            AtLeast(v("2.0")).intersection(&CompatibleWith(v("1.0"))),
            None
        );
        assert_eq!(
            CompatibleWith(v("1.0")).intersection(&CompatibleWith(v("2.0"))),
            None
        );
        assert_eq!(
            CompatibleWith(v("0.1")).intersection(&CompatibleWith(v("0.2"))),
            None
        );
        assert_eq!(
            Exactly(v("1.0.0")).intersection(&Exactly(v("2.0.0"))),
            None
        );
        assert_eq!(
            Exactly(v("1.4.0")).intersection(&CompatibleWith(v("1.2"))),
            Some(Exactly(v("1.4.0")))
        );
        assert_eq!(
            GitReference("main".into()).intersection(&AtLeast(v("1.0"))),
            Some(GitReference("main".into()))
        );
        assert_eq!(
            GitReference("main".into()).intersection(&GitReference("dev".into())),
            None
        );
    }

    #[test]
    fn specifier_parsing_and_display() {
        let cases = [
            ("*", VersionSpecifier::Any),
            ("== 1.0.0", VersionSpecifier::Exactly(v("1.0.0"))),
            (">= 1.1", VersionSpecifier::AtLeast(v("1.1"))),
            ("~> 2.3", VersionSpecifier::CompatibleWith(v("2.3"))),
            ("\"main\"", VersionSpecifier::GitReference("main".into())),
        ];
        for (text, expected) in cases {
            let parsed: VersionSpecifier = text.parse().unwrap();
            assert_eq!(parsed, expected);
        }
        assert_eq!(VersionSpecifier::CompatibleWith(v("2.3")).to_string(), "~> 2.3.0");
        assert!("<= 1.0".parse::<VersionSpecifier>().is_err());
        assert!("\"\"".parse::<VersionSpecifier>().is_err());
        assert!("~> banana".parse::<VersionSpecifier>().is_err());
    }
}
