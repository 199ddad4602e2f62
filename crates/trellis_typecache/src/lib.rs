//! Persistent cache of the types discovered in loaded assemblies.
//!
//! Enumerating every type through reflection is expensive, so the result is
//! persisted as a small XML document keyed by build identifiers. On the next
//! start the document is trusted only if the cache owner's identifier and
//! every recorded module identifier still match the running build; any
//! mismatch, unresolvable type or malformed document is a cache miss and the
//! types are enumerated again.

#![warn(missing_docs)]

pub mod cache;
pub mod clock;
pub mod document;
pub mod error;
pub mod serializer;
pub mod type_system;
pub mod types;

pub use cache::{CacheSource, TypeCache, DEFAULT_CACHE_NAME};
pub use clock::{format_timestamp, Clock, FixedClock, SystemClock};
pub use document::{AssemblyGroup, ModuleGroup, TypeCacheDocument};
pub use error::{CacheError, Invalidation, InvalidationKind};
pub use serializer::{current_owner_id, TypeCacheSerializer};
pub use type_system::{InventoryTypeSystem, TypeSystem};
pub use types::{ModuleRef, TypeEntry};
