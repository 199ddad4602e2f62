//! Error types for type cache operations.
//!
//! Reading a cache never fails hard: every problem on the read side is an
//! [`Invalidation`], a value describing why the persisted document cannot be
//! trusted. Writing a cache can fail, and those failures are [`CacheError`]s
//! propagated to the caller.

use std::path::PathBuf;

use trellis_common::BuildId;

/// Errors that can occur while persisting a type cache.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// An I/O error occurred while writing or replacing the cache file.
    #[error("cache I/O error at {path}: {source}")]
    Io {
        /// The path that caused the error.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The output stream rejected the serialized document.
    #[error("failed to write type cache document: {0}")]
    Write(#[source] std::io::Error),

    /// A type's declaring module has no build identifier in the current process.
    #[error("no build identifier for module '{module}' of assembly '{assembly}'")]
    UnknownModule {
        /// The declaring assembly name.
        assembly: String,
        /// The module name.
        module: String,
    },
}

/// The reason a persisted type cache was rejected.
///
/// Every variant means the same thing to the caller: treat the cache as a
/// miss and enumerate types again. The variants exist for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Invalidation {
    /// No cache file exists yet.
    #[error("no type cache at {path}")]
    Missing {
        /// The expected cache file path.
        path: PathBuf,
    },

    /// The document could not be read or does not have the expected shape.
    #[error("malformed type cache document: {reason}")]
    Malformed {
        /// Description of the problem.
        reason: String,
    },

    /// The document was written by a different build of the cache owner.
    #[error("type cache was written by owner {found}, current owner is {expected}")]
    StaleFormat {
        /// The running owner identifier.
        expected: BuildId,
        /// The identifier recorded in the document.
        found: BuildId,
    },

    /// A recorded assembly is no longer loaded.
    #[error("assembly '{assembly}' is not loaded")]
    AssemblyNotFound {
        /// The recorded assembly name.
        assembly: String,
    },

    /// A recorded module identifier matches none of the assembly's current modules.
    #[error("module {version_id} of assembly '{assembly}' has changed")]
    ModuleChanged {
        /// The recorded assembly name.
        assembly: String,
        /// The recorded module identifier.
        version_id: BuildId,
    },

    /// A recorded type no longer resolves in its assembly.
    #[error("type '{type_name}' not found in assembly '{assembly}'")]
    UnresolvedType {
        /// The recorded assembly name.
        assembly: String,
        /// The fully-qualified type name.
        type_name: String,
    },

    /// A recorded type now resolves to a module other than the recorded one.
    #[error("type '{type_name}' moved out of module {version_id}")]
    TypeMoved {
        /// The fully-qualified type name.
        type_name: String,
        /// The recorded module identifier.
        version_id: BuildId,
    },

    /// A recorded type no longer satisfies the cache's type filter.
    #[error("type '{type_name}' no longer matches the cache filter")]
    FilterMismatch {
        /// The fully-qualified type name.
        type_name: String,
    },

    /// The document was written under a different type filter, or the
    /// filter was added or removed since.
    #[error("type cache was written with a different type filter")]
    FilterChanged {
        /// Identity of the cache's current filter.
        expected: Option<BuildId>,
        /// Identity recorded in the document.
        found: Option<BuildId>,
    },
}

/// Coarse category of an [`Invalidation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InvalidationKind {
    /// No document to read.
    Missing,
    /// Structural or parse error.
    Malformed,
    /// Owner identifier mismatch; the document format may be incompatible.
    StaleFormat,
    /// Source modules changed since the document was written.
    StaleContent,
    /// A listed type cannot be resolved.
    UnresolvedType,
    /// The document was selected with a different filter, or a listed type
    /// is rejected by the current one.
    FilterMismatch,
}

impl Invalidation {
    /// Builds a [`Invalidation::Malformed`] from anything displayable.
    pub fn malformed(reason: impl std::fmt::Display) -> Self {
        Self::Malformed {
            reason: reason.to_string(),
        }
    }

    /// Returns the category of this invalidation.
    pub fn kind(&self) -> InvalidationKind {
        match self {
            Self::Missing { .. } => InvalidationKind::Missing,
            Self::Malformed { .. } => InvalidationKind::Malformed,
            Self::StaleFormat { .. } => InvalidationKind::StaleFormat,
            Self::AssemblyNotFound { .. } | Self::ModuleChanged { .. } | Self::TypeMoved { .. } => {
                InvalidationKind::StaleContent
            }
            Self::UnresolvedType { .. } => InvalidationKind::UnresolvedType,
            Self::FilterMismatch { .. } | Self::FilterChanged { .. } => {
                InvalidationKind::FilterMismatch
            }
        }
    }
}

impl InvalidationKind {
    /// Stable kebab-case name, used in machine-readable reports.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Missing => "missing",
            Self::Malformed => "malformed",
            Self::StaleFormat => "stale-format",
            Self::StaleContent => "stale-content",
            Self::UnresolvedType => "unresolved-type",
            Self::FilterMismatch => "filter-mismatch",
        }
    }
}
