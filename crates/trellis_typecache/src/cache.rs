//! Process-scoped, lazily populated type cache.
//!
//! `TypeCache` ties a [`TypeSystem`], a [`TypeCacheSerializer`] and a cache
//! file together. The first call to [`TypeCache::types`] either trusts the
//! persisted document or enumerates types and persists them; later calls
//! return the same list. Population runs at most once even when several
//! threads ask at the same time.

use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;
use tracing::{debug, info};
use trellis_common::BuildId;

use crate::document::TypeCacheDocument;
use crate::error::{CacheError, Invalidation};
use crate::serializer::TypeCacheSerializer;
use crate::type_system::TypeSystem;
use crate::types::TypeEntry;

/// Cache name used when none is configured.
pub const DEFAULT_CACHE_NAME: &str = "TypeCache";

/// File extension of persisted type cache documents.
const CACHE_FILE_EXT: &str = "xml";

type TypeFilter = Box<dyn Fn(&TypeEntry) -> bool + Send + Sync>;

/// Where the populated type list came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
    /// The persisted document was valid and trusted.
    Document,
    /// The document was missing or invalid; types were enumerated and saved.
    Enumerated,
}

struct Populated {
    types: Vec<TypeEntry>,
    source: CacheSource,
}

/// A named, file-backed cache of the types a [`TypeSystem`] exposes.
///
/// The document lives at `<cache_dir>/<name>.xml`. An optional filter narrows
/// the cached types (for example, only controller types). The filter's key is
/// recorded in the document, so a document written under another filter, or
/// without one, is treated as a miss.
pub struct TypeCache<S> {
    cache_dir: PathBuf,
    path: PathBuf,
    type_system: S,
    serializer: TypeCacheSerializer,
    filter: Option<TypeFilter>,
    filter_id: Option<BuildId>,
    state: OnceCell<Populated>,
}

impl<S: TypeSystem> TypeCache<S> {
    /// Creates a cache named `name` stored under `cache_dir`.
    pub fn new(cache_dir: &Path, name: &str, type_system: S) -> Self {
        Self {
            cache_dir: cache_dir.to_path_buf(),
            path: cache_dir.join(format!("{name}.{CACHE_FILE_EXT}")),
            type_system,
            serializer: TypeCacheSerializer::new(),
            filter: None,
            filter_id: None,
            state: OnceCell::new(),
        }
    }

    /// Restricts the cache to types accepted by `filter`.
    ///
    /// `key` identifies the filter's behavior and must change whenever the
    /// predicate does; documents written under a different key are misses.
    pub fn with_filter(
        mut self,
        key: &str,
        filter: impl Fn(&TypeEntry) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.filter = Some(Box::new(filter));
        self.filter_id = Some(BuildId::from_bytes(key.as_bytes()));
        self
    }

    /// Replaces the serializer (owner identifier, clock).
    pub fn with_serializer(mut self, serializer: TypeCacheSerializer) -> Self {
        self.serializer = serializer;
        self
    }

    /// Path of the persisted document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The underlying type system.
    pub fn type_system(&self) -> &S {
        &self.type_system
    }

    /// The serializer used to read and write the document.
    pub fn serializer(&self) -> &TypeCacheSerializer {
        &self.serializer
    }

    /// Returns the cached types, loading or populating them on first use.
    ///
    /// A valid document is trusted as is. Otherwise types are enumerated,
    /// filtered and saved before being returned. A failed save is returned as
    /// an error and leaves the cache unpopulated, so a later call retries.
    pub fn types(&self) -> Result<&[TypeEntry], CacheError> {
        self.state
            .get_or_try_init(|| self.populate())
            .map(|p| p.types.as_slice())
    }

    /// Where the populated list came from, or `None` before population.
    pub fn source(&self) -> Option<CacheSource> {
        self.state.get().map(|p| p.source)
    }

    /// Reads and validates the persisted document without populating.
    pub fn read_document(&self) -> Result<Vec<TypeEntry>, Invalidation> {
        let xml = match std::fs::read_to_string(&self.path) {
            Ok(xml) => xml,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(Invalidation::Missing {
                    path: self.path.clone(),
                })
            }
            Err(e) => return Err(Invalidation::malformed(e)),
        };

        let document = TypeCacheDocument::parse(&xml)?;
        let types = self.serializer.validate(&self.type_system, &document)?;

        if document.filter_id != self.filter_id {
            return Err(Invalidation::FilterChanged {
                expected: self.filter_id,
                found: document.filter_id,
            });
        }

        if let Some(rejected) = types.iter().find(|ty| !self.accepts(ty)) {
            return Err(Invalidation::FilterMismatch {
                type_name: rejected.full_name.clone(),
            });
        }
        Ok(types)
    }

    /// Enumerates the types this cache holds, ignoring the document.
    pub fn enumerate(&self) -> Vec<TypeEntry> {
        let mut types = self.type_system.enumerate_types();
        types.retain(|ty| self.accepts(ty));
        types
    }

    /// Persists `types`, replacing any existing document.
    ///
    /// The document is written to a temporary file next to the target and
    /// renamed over it, so readers never observe a partial document.
    pub fn save(&self, types: &[TypeEntry]) -> Result<(), CacheError> {
        std::fs::create_dir_all(&self.cache_dir).map_err(|e| CacheError::Io {
            path: self.cache_dir.clone(),
            source: e,
        })?;

        let mut tmp = tempfile::NamedTempFile::new_in(&self.cache_dir).map_err(|e| {
            CacheError::Io {
                path: self.cache_dir.clone(),
                source: e,
            }
        })?;
        let mut document = self.serializer.to_document(&self.type_system, types)?;
        document.filter_id = self.filter_id;
        tmp.as_file_mut()
            .write_all(document.to_xml().as_bytes())
            .map_err(CacheError::Write)?;
        tmp.as_file_mut().sync_all().map_err(|e| CacheError::Io {
            path: tmp.path().to_path_buf(),
            source: e,
        })?;
        tmp.persist(&self.path).map_err(|e| CacheError::Io {
            path: self.path.clone(),
            source: e.error,
        })?;

        debug!(path = %self.path.display(), count = types.len(), "type cache saved");
        Ok(())
    }

    /// Enumerates and saves unconditionally, ignoring any existing document.
    ///
    /// Does not affect the list returned by [`TypeCache::types`] once populated.
    pub fn regenerate(&self) -> Result<Vec<TypeEntry>, CacheError> {
        let types = self.enumerate();
        self.save(&types)?;
        Ok(types)
    }

    fn accepts(&self, ty: &TypeEntry) -> bool {
        self.filter.as_ref().map_or(true, |f| f(ty))
    }

    fn populate(&self) -> Result<Populated, CacheError> {
        match self.read_document() {
            Ok(types) => {
                debug!(path = %self.path.display(), count = types.len(), "type cache hit");
                Ok(Populated {
                    types,
                    source: CacheSource::Document,
                })
            }
            Err(reason) => {
                info!(
                    path = %self.path.display(),
                    kind = reason.kind().as_str(),
                    %reason,
                    "type cache miss, enumerating types"
                );
                let types = self.regenerate()?;
                Ok(Populated {
                    types,
                    source: CacheSource::Enumerated,
                })
            }
        }
    }
}

impl<S> std::fmt::Debug for TypeCache<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeCache")
            .field("path", &self.path)
            .field("filtered", &self.filter.is_some())
            .field("populated", &self.state.get().is_some())
            .finish_non_exhaustive()
    }
}
