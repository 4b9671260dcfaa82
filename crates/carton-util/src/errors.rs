use miette::Diagnostic;
use thiserror::Error;

/// Unified error type for all Carton operations.
///
/// Errors are `Clone` so a search-tree node can retain the last rejection it
/// observed while its siblings keep exploring.
#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
pub enum CartonError {
    /// A version string or version specifier could not be parsed.
    #[error("Parse error: {message} in `{input}`")]
    #[diagnostic(help("Versions look like `1.2.3`; specifiers like `~> 1.2`, `>= 1.0`, `== 2.0.1` or `\"branch\"`"))]
    Parse { input: String, message: String },

    /// The search was exhausted without finding an assignment.
    #[error("Unable to satisfy the dependency list for: {}", .names.join(", "))]
    Unsatisfiable {
        names: Vec<String>,
        #[help]
        details: Option<String>,
    },

    /// Two requirements on the same project cannot both hold.
    #[error("Conflicting requirements for {name}: {existing} is incompatible with {requested}")]
    #[diagnostic(help("Relax one of the version specifiers for {name}"))]
    ConflictingRequirement {
        name: String,
        existing: String,
        requested: String,
    },

    /// The resolved dependency graph contains a cycle.
    #[error("Dependency cycle detected: {}", .members.join(" -> "))]
    CyclicDependencies { members: Vec<String> },

    /// The same project was resolved under two identities at different versions.
    #[error(
        "{name} is required as both {first} ({first_version}) and {second} ({second_version})"
    )]
    #[diagnostic(help("Refer to {name} the same way everywhere it is required"))]
    DuplicateDependency {
        name: String,
        first: String,
        first_version: String,
        second: String,
        second_version: String,
    },

    /// The retriever failed to list versions, requirements or resolve a reference.
    #[error("Failed to retrieve {dependency}: {message}")]
    Retrieval { dependency: String, message: String },

    /// An invariant of the resolver was violated.
    #[error("Internal resolver error: {message}")]
    Internal { message: String },

    /// The caller abandoned the resolution, or the visit budget ran out.
    #[error("Resolution cancelled: {reason}")]
    Cancelled { reason: String },

    /// Configuration could not be read or parsed.
    #[error("Configuration error: {message}")]
    #[diagnostic(help("Check ~/.carton/config.toml for syntax errors"))]
    Config { message: String },
}

impl CartonError {
    /// Shorthand for a [`CartonError::Retrieval`] failure.
    pub fn retrieval(dependency: impl ToString, message: impl Into<String>) -> Self {
        Self::Retrieval {
            dependency: dependency.to_string(),
            message: message.into(),
        }
    }

    /// Shorthand for a [`CartonError::Internal`] failure.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

/// Convenience alias for results carrying a [`CartonError`].
pub type CartonResult<T> = Result<T, CartonError>;
