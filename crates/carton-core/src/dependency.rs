use std::fmt;

use carton_util::errors::{CartonError, CartonResult};

use crate::version::VersionSpecifier;

/// What a project depends upon.
///
/// Two values can differ structurally yet name the same project, e.g. a
/// hosted repository and a plain git URL pointing at the same code. Use `==`
/// for exact identity and [`Dependency::same_project`] for conflict checks.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Dependency {
    /// A repository reachable through a git URL.
    Git(GitUrl),
    /// A repository on a hosting platform such as GitHub.
    Hosted {
        server: Server,
        repository: Repository,
    },
    /// A prebuilt, binary-only artifact described by a URL.
    Binary(BinaryUrl),
}

impl Dependency {
    /// A hosted dependency on github.com, from an `owner/name` identifier.
    pub fn github(identifier: &str) -> CartonResult<Self> {
        Ok(Self::Hosted {
            server: Server::GitHub,
            repository: Repository::from_identifier(identifier)?,
        })
    }

    pub fn git(url: impl Into<String>) -> Self {
        Self::Git(GitUrl(url.into()))
    }

    pub fn binary(url: impl Into<String>) -> Self {
        Self::Binary(BinaryUrl(url.into()))
    }

    /// The project name used as the deduplication key across variants.
    pub fn name(&self) -> String {
        match self {
            Self::Git(url) => url.name(),
            Self::Hosted { repository, .. } => repository.name.clone(),
            Self::Binary(url) => url.name(),
        }
    }

    /// Whether both values denote the same project, regardless of variant.
    pub fn same_project(&self, other: &Dependency) -> bool {
        self.name() == other.name()
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Git(url) => write!(f, "git \"{}\"", url.0),
            Self::Hosted {
                server: Server::GitHub,
                repository,
            } => write!(f, "github \"{repository}\""),
            Self::Hosted {
                server: Server::Enterprise { url },
                repository,
            } => write!(f, "github \"{}/{repository}\"", url.trim_end_matches('/')),
            Self::Binary(url) => write!(f, "binary \"{}\"", url.0),
        }
    }
}

/// A git remote URL or local path.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GitUrl(pub String);

impl GitUrl {
    /// Last path component with any trailing `/` and `.git` removed.
    pub fn name(&self) -> String {
        let last = last_component(&self.0);
        last.strip_suffix(".git").unwrap_or(last).to_string()
    }
}

/// URL of a binary artifact specification.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BinaryUrl(pub String);

impl BinaryUrl {
    /// Last path component without its extension.
    pub fn name(&self) -> String {
        let last = last_component(&self.0);
        match last.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem.to_string(),
            _ => last.to_string(),
        }
    }
}

fn last_component(url: &str) -> &str {
    let trimmed = url.trim_end_matches('/');
    trimmed.rsplit(|c: char| c == '/' || c == ':').next().unwrap_or(trimmed)
}

/// The hosting platform a [`Repository`] lives on.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Server {
    GitHub,
    Enterprise { url: String },
}

/// An `owner/name` repository on a hosting platform.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Repository {
    pub owner: String,
    pub name: String,
}

impl Repository {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }

    /// Parse `"owner/name"`; a trailing `.git` on the name is dropped.
    pub fn from_identifier(identifier: &str) -> CartonResult<Self> {
        let parts: Vec<&str> = identifier.trim().split('/').collect();
        match parts.as_slice() {
            &[owner, name] if !owner.is_empty() && !name.is_empty() => Ok(Self::new(
                owner,
                name.strip_suffix(".git").unwrap_or(name),
            )),
            _ => Err(CartonError::Parse {
                input: identifier.to_string(),
                message: "expected a repository identifier of the form `owner/name`".to_string(),
            }),
        }
    }
}

impl fmt::Display for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// One constraint edge: `dependency` must satisfy `specifier`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DependencyEntry {
    pub dependency: Dependency,
    pub specifier: VersionSpecifier,
}

impl DependencyEntry {
    pub fn new(dependency: Dependency, specifier: VersionSpecifier) -> Self {
        Self {
            dependency,
            specifier,
        }
    }
}

impl fmt::Display for DependencyEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.dependency, self.specifier)
    }
}
