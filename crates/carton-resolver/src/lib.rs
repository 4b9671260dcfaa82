//! Dependency resolution engine: a depth-first backtracking search over
//! pinned versions whose dependency graph is discovered lazily through a
//! [`retriever::DependencyRetriever`], with partial updates, cycle detection
//! and same-name deduplication.

pub mod cache;
pub mod conflict;
pub mod dependency_set;
pub mod fixture;
pub mod graph;
pub mod resolver;
pub mod retriever;

pub use resolver::Resolver;
pub use retriever::DependencyRetriever;
