//! Serialization and validation of the type cache document.
//!
//! [`TypeCacheSerializer`] is stateless apart from its owner identifier and
//! clock, so one instance can be shared across threads. Reading never fails
//! hard: [`TypeCacheSerializer::try_deserialize`] reports why a document was
//! rejected and [`TypeCacheSerializer::deserialize`] collapses that to `None`.

use std::collections::{HashMap, HashSet};
use std::io::{Read, Write};

use tracing::debug;
use trellis_common::BuildId;

use crate::clock::{format_timestamp, Clock, SystemClock};
use crate::document::{AssemblyGroup, ModuleGroup, TypeCacheDocument};
use crate::error::{CacheError, Invalidation};
use crate::type_system::TypeSystem;
use crate::types::TypeEntry;

/// Revision of the document layout. Bump when the XML shape changes so that
/// documents written by older builds are rejected as stale.
pub const CACHE_FORMAT_REVISION: u32 = 1;

/// Hash of this crate's sources, computed by the build script.
const SOURCE_HASH: &str = env!("TRELLIS_TYPECACHE_SOURCE_HASH");

/// Build identifier of this crate, used as the cache owner identifier.
///
/// Changes with the crate version, the format revision, and any edit to the
/// crate's source files.
pub fn current_owner_id() -> BuildId {
    let stamp = format!(
        "{}@{}#{}+{}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        CACHE_FORMAT_REVISION,
        SOURCE_HASH
    );
    BuildId::from_bytes(stamp.as_bytes())
}

/// Reads and writes type cache documents for one cache owner.
pub struct TypeCacheSerializer {
    owner_id: BuildId,
    clock: Box<dyn Clock>,
}

impl Default for TypeCacheSerializer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TypeCacheSerializer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeCacheSerializer")
            .field("owner_id", &self.owner_id)
            .finish_non_exhaustive()
    }
}

impl TypeCacheSerializer {
    /// Creates a serializer using [`current_owner_id`] and the system clock.
    pub fn new() -> Self {
        Self {
            owner_id: current_owner_id(),
            clock: Box::new(SystemClock),
        }
    }

    /// Overrides the owner identifier written to and expected in documents.
    pub fn with_owner_id(mut self, owner_id: BuildId) -> Self {
        self.owner_id = owner_id;
        self
    }

    /// Overrides the clock used for the `lastModified` stamp.
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// The owner identifier this serializer writes and accepts.
    pub fn owner_id(&self) -> BuildId {
        self.owner_id
    }

    /// Groups types into a document stamped with the current time.
    ///
    /// Assemblies keep first-seen order, modules keep first-seen order within
    /// their assembly, and types keep first-seen order within their module.
    /// A type listed more than once is recorded once.
    pub fn to_document<S: TypeSystem + ?Sized>(
        &self,
        type_system: &S,
        types: &[TypeEntry],
    ) -> Result<TypeCacheDocument, CacheError> {
        let mut document =
            TypeCacheDocument::new(self.owner_id, Some(format_timestamp(self.clock.now())));
        let mut assembly_index: HashMap<&str, usize> = HashMap::new();
        let mut module_index: HashMap<(&str, &str), usize> = HashMap::new();
        let mut recorded: HashSet<(usize, usize, &str)> = HashSet::new();

        for ty in types {
            let assembly = ty.module.assembly.as_str();
            let asm_idx = *assembly_index.entry(assembly).or_insert_with(|| {
                document.assemblies.push(AssemblyGroup {
                    name: assembly.to_string(),
                    modules: Vec::new(),
                });
                document.assemblies.len() - 1
            });

            let modules = &mut document.assemblies[asm_idx].modules;
            let key = (assembly, ty.module.name.as_str());
            let module_idx = match module_index.get(&key) {
                Some(&idx) => idx,
                None => {
                    let version_id = type_system.build_id_of(&ty.module).ok_or_else(|| {
                        CacheError::UnknownModule {
                            assembly: ty.module.assembly.clone(),
                            module: ty.module.name.clone(),
                        }
                    })?;
                    modules.push(ModuleGroup {
                        version_id,
                        types: Vec::new(),
                    });
                    module_index.insert(key, modules.len() - 1);
                    modules.len() - 1
                }
            };

            if recorded.insert((asm_idx, module_idx, ty.full_name.as_str())) {
                modules[module_idx].types.push(ty.full_name.clone());
            }
        }

        Ok(document)
    }

    /// Writes `types` as a complete document to `output`.
    pub fn serialize<S, W>(
        &self,
        type_system: &S,
        types: &[TypeEntry],
        output: &mut W,
    ) -> Result<(), CacheError>
    where
        S: TypeSystem + ?Sized,
        W: Write + ?Sized,
    {
        let xml = self.to_document(type_system, types)?.to_xml();
        output.write_all(xml.as_bytes()).map_err(CacheError::Write)?;
        output.flush().map_err(CacheError::Write)
    }

    /// Renders `types` as a document string.
    pub fn serialize_to_string<S: TypeSystem + ?Sized>(
        &self,
        type_system: &S,
        types: &[TypeEntry],
    ) -> Result<String, CacheError> {
        Ok(self.to_document(type_system, types)?.to_xml())
    }

    /// Reads a document and resolves its types, or explains why it cannot be trusted.
    pub fn try_deserialize<S, R>(
        &self,
        type_system: &S,
        mut input: R,
    ) -> Result<Vec<TypeEntry>, Invalidation>
    where
        S: TypeSystem + ?Sized,
        R: Read,
    {
        let mut xml = String::new();
        input
            .read_to_string(&mut xml)
            .map_err(Invalidation::malformed)?;
        self.try_deserialize_str(type_system, &xml)
    }

    /// String variant of [`TypeCacheSerializer::try_deserialize`].
    pub fn try_deserialize_str<S: TypeSystem + ?Sized>(
        &self,
        type_system: &S,
        xml: &str,
    ) -> Result<Vec<TypeEntry>, Invalidation> {
        let document = TypeCacheDocument::parse(xml)?;
        self.validate(type_system, &document)
    }

    /// Reads a document and resolves its types; `None` means cache miss.
    pub fn deserialize<S, R>(&self, type_system: &S, input: R) -> Option<Vec<TypeEntry>>
    where
        S: TypeSystem + ?Sized,
        R: Read,
    {
        match self.try_deserialize(type_system, input) {
            Ok(types) => Some(types),
            Err(reason) => {
                debug!(kind = reason.kind().as_str(), %reason, "type cache rejected");
                None
            }
        }
    }

    /// Checks a parsed document against the running build.
    ///
    /// Checks run in order and stop at the first failure:
    /// 1. the owner identifier must equal this serializer's;
    /// 2. every assembly must be loaded and every recorded module identifier
    ///    must belong to one of its modules;
    /// 3. every type must resolve, and resolve into the recorded module.
    ///
    /// On success the resolved types are returned in document order.
    pub fn validate<S: TypeSystem + ?Sized>(
        &self,
        type_system: &S,
        document: &TypeCacheDocument,
    ) -> Result<Vec<TypeEntry>, Invalidation> {
        if document.owner_id != self.owner_id {
            return Err(Invalidation::StaleFormat {
                expected: self.owner_id,
                found: document.owner_id,
            });
        }

        for asm in &document.assemblies {
            let current = type_system.module_build_ids(&asm.name).ok_or_else(|| {
                Invalidation::AssemblyNotFound {
                    assembly: asm.name.clone(),
                }
            })?;
            if let Some(changed) = asm
                .modules
                .iter()
                .find(|m| !current.contains(&m.version_id))
            {
                return Err(Invalidation::ModuleChanged {
                    assembly: asm.name.clone(),
                    version_id: changed.version_id,
                });
            }
        }

        let mut resolved = Vec::with_capacity(document.type_count());
        for asm in &document.assemblies {
            for module in &asm.modules {
                for name in &module.types {
                    let ty = type_system.resolve_type(&asm.name, name).ok_or_else(|| {
                        Invalidation::UnresolvedType {
                            assembly: asm.name.clone(),
                            type_name: name.clone(),
                        }
                    })?;
                    if type_system.build_id_of(&ty.module) != Some(module.version_id) {
                        return Err(Invalidation::TypeMoved {
                            type_name: name.clone(),
                            version_id: module.version_id,
                        });
                    }
                    resolved.push(ty);
                }
            }
        }

        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::error::InvalidationKind;
    use crate::type_system::InventoryTypeSystem;
    use crate::types::ModuleRef;
    use chrono::{TimeZone, Utc};

    const CORLIB: &str = "mscorlib, Version=4.0.0.0, Culture=neutral, PublicKeyToken=b77a5c561934e089";

    fn id(seed: &str) -> BuildId {
        BuildId::from_bytes(seed.as_bytes())
    }

    fn corlib(module_seed: &str) -> InventoryTypeSystem {
        InventoryTypeSystem::new().with_module(
            CORLIB,
            "mscorlib.dll",
            Some(id(module_seed)),
            ["System.String", "System.Object", "System.Int32"],
        )
    }

    fn serializer() -> TypeCacheSerializer {
        TypeCacheSerializer::new()
            .with_owner_id(id("O1"))
            .with_clock(FixedClock(Utc.with_ymd_and_hms(2001, 1, 1, 0, 0, 0).unwrap()))
    }

    fn corlib_type(name: &str) -> TypeEntry {
        TypeEntry::new(name, ModuleRef::new(CORLIB, "mscorlib.dll"))
    }

    fn string_and_object() -> Vec<TypeEntry> {
        vec![corlib_type("System.String"), corlib_type("System.Object")]
    }

    fn document(owner: BuildId, module: BuildId, types: &[&str]) -> String {
        let body: String = types
            .iter()
            .map(|t| format!("      <type>{t}</type>\n"))
            .collect();
        format!(
            "<?xml version=\"1.0\" encoding=\"utf-16\"?>\n\
             <!--This file is automatically generated. Please do not modify the contents of this file.-->\n\
             <typeCache lastModified=\"__IGNORED__\" mvcVersionId=\"{owner}\">\n\
             \x20 <assembly name=\"{CORLIB}\">\n\
             \x20   <module versionId=\"{module}\">\n\
             {body}\
             \x20   </module>\n\
             \x20 </assembly>\n\
             </typeCache>"
        )
    }

    #[test]
    fn serialize_types() {
        let mut output = Vec::new();
        serializer()
            .serialize(&corlib("V1"), &string_and_object(), &mut output)
            .unwrap();

        let expected = format!(
            r#"<?xml version="1.0" encoding="utf-16"?>
<!--This file is automatically generated. Please do not modify the contents of this file.-->
<typeCache lastModified="2001-01-01 00:00:00Z" mvcVersionId="{}">
  <assembly name="{CORLIB}">
    <module versionId="{}">
      <type>System.String</type>
      <type>System.Object</type>
    </module>
  </assembly>
</typeCache>"#,
            id("O1"),
            id("V1")
        );
        assert_eq!(String::from_utf8(output).unwrap(), expected);
    }

    #[test]
    fn serialize_is_idempotent_with_fixed_clock() {
        let s = serializer();
        let ts = corlib("V1");
        let first = s.serialize_to_string(&ts, &string_and_object()).unwrap();
        let second = s.serialize_to_string(&ts, &string_and_object()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn serialize_groups_by_first_seen_assembly_and_module() {
        let ts = InventoryTypeSystem::new()
            .with_module("B", "b1.dll", Some(id("b1")), ["B.One"])
            .with_module("A", "a.dll", Some(id("a")), ["A.One", "A.Two"])
            .with_module("B", "b2.dll", Some(id("b2")), ["B.Two"]);
        let types = vec![
            TypeEntry::new("B.Two", ModuleRef::new("B", "b2.dll")),
            TypeEntry::new("A.Two", ModuleRef::new("A", "a.dll")),
            TypeEntry::new("B.One", ModuleRef::new("B", "b1.dll")),
            TypeEntry::new("A.One", ModuleRef::new("A", "a.dll")),
            TypeEntry::new("A.Two", ModuleRef::new("A", "a.dll")),
        ];
        let doc = serializer().to_document(&ts, &types).unwrap();

        let names: Vec<&str> = doc.assemblies.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["B", "A"]);
        let b_ids: Vec<BuildId> = doc.assemblies[0].modules.iter().map(|m| m.version_id).collect();
        assert_eq!(b_ids, vec![id("b2"), id("b1")]);
        assert_eq!(doc.assemblies[1].modules[0].types, vec!["A.Two", "A.One"]);
        assert_eq!(doc.type_count(), 4);
    }

    #[test]
    fn serialize_unknown_module_errors() {
        let types = vec![TypeEntry::new("X.Y", ModuleRef::new(CORLIB, "missing.dll"))];
        let err = serializer()
            .serialize_to_string(&corlib("V1"), &types)
            .unwrap_err();
        assert!(matches!(err, CacheError::UnknownModule { .. }));
    }

    #[test]
    fn serialize_propagates_write_failure() {
        struct Broken;
        impl Write for Broken {
            fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
                Err(std::io::Error::new(std::io::ErrorKind::Other, "disk full"))
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }
        let err = serializer()
            .serialize(&corlib("V1"), &string_and_object(), &mut Broken)
            .unwrap_err();
        assert!(matches!(err, CacheError::Write(_)));
    }

    #[test]
    fn serialize_empty_type_list() {
        let xml = serializer().serialize_to_string(&corlib("V1"), &[]).unwrap();
        assert!(xml.ends_with(" />"));
        assert_eq!(
            serializer().try_deserialize_str(&corlib("V1"), &xml).unwrap(),
            Vec::<TypeEntry>::new()
        );
    }

    #[test]
    fn deserialize_success() {
        let input = document(id("O1"), id("V1"), &["System.String", "System.Object"]);
        let types = serializer()
            .deserialize(&corlib("V1"), input.as_bytes())
            .unwrap();
        assert_eq!(types, string_and_object());
    }

    #[test]
    fn deserialize_returns_none_if_owner_id_does_not_match() {
        let input = document(BuildId::nil(), id("V1"), &["System.String", "System.Object"]);
        let s = serializer();
        assert!(s.deserialize(&corlib("V1"), input.as_bytes()).is_none());
        let err = s.try_deserialize_str(&corlib("V1"), &input).unwrap_err();
        assert_eq!(err.kind(), InvalidationKind::StaleFormat);
    }

    #[test]
    fn owner_mismatch_wins_over_other_problems() {
        let input = document(id("other owner"), id("V9"), &["This.Type.Does.Not.Exist"]);
        let err = serializer()
            .try_deserialize_str(&corlib("V1"), &input)
            .unwrap_err();
        assert_eq!(err.kind(), InvalidationKind::StaleFormat);
    }

    #[test]
    fn deserialize_returns_none_if_module_id_does_not_match() {
        let input = document(id("O1"), BuildId::nil(), &["System.String", "System.Object"]);
        let s = serializer();
        assert!(s.deserialize(&corlib("V1"), input.as_bytes()).is_none());
        let err = s.try_deserialize_str(&corlib("V1"), &input).unwrap_err();
        assert_eq!(
            err,
            Invalidation::ModuleChanged {
                assembly: CORLIB.to_string(),
                version_id: BuildId::nil(),
            }
        );
    }

    #[test]
    fn module_mismatch_wins_over_unresolved_type() {
        let input = document(id("O1"), id("V1"), &["This.Type.Does.Not.Exist"]);
        let err = serializer()
            .try_deserialize_str(&corlib("V2"), &input)
            .unwrap_err();
        assert_eq!(err.kind(), InvalidationKind::StaleContent);
    }

    #[test]
    fn deserialize_returns_none_if_assembly_not_loaded() {
        let input = document(id("O1"), id("V1"), &["System.String"]);
        let ts = InventoryTypeSystem::new().with_module("Other", "o.dll", Some(id("V1")), ["O.T"]);
        let err = serializer().try_deserialize_str(&ts, &input).unwrap_err();
        assert_eq!(
            err,
            Invalidation::AssemblyNotFound {
                assembly: CORLIB.to_string()
            }
        );
    }

    #[test]
    fn deserialize_returns_none_if_type_not_found() {
        let input = document(id("O1"), id("V1"), &["System.String", "This.Type.Does.Not.Exist"]);
        let s = serializer();
        assert!(s.deserialize(&corlib("V1"), input.as_bytes()).is_none());
        let err = s.try_deserialize_str(&corlib("V1"), &input).unwrap_err();
        assert_eq!(
            err,
            Invalidation::UnresolvedType {
                assembly: CORLIB.to_string(),
                type_name: "This.Type.Does.Not.Exist".to_string(),
            }
        );
    }

    #[test]
    fn deserialize_rejects_type_that_moved_modules() {
        // Both module ids are still current, but Shared now lives in two.dll.
        let ts = InventoryTypeSystem::new()
            .with_module("A", "two.dll", Some(id("two")), ["A.Shared"])
            .with_module("A", "one.dll", Some(id("one")), ["A.Only"]);
        let xml = format!(
            "<typeCache mvcVersionId=\"{}\"><assembly name=\"A\"><module versionId=\"{}\"><type>A.Shared</type></module></assembly></typeCache>",
            id("O1"),
            id("one")
        );
        let err = serializer().try_deserialize_str(&ts, &xml).unwrap_err();
        assert!(matches!(err, Invalidation::TypeMoved { .. }));
    }

    #[test]
    fn deserialize_malformed_is_a_miss() {
        let s = serializer();
        let ts = corlib("V1");
        assert!(s.deserialize(&ts, "garbage".as_bytes()).is_none());
        assert!(s.deserialize(&ts, &[0xffu8, 0xfe, 0x00][..]).is_none());
        let err = s.try_deserialize_str(&ts, "<typeCache/>").unwrap_err();
        assert_eq!(err.kind(), InvalidationKind::Malformed);
    }

    #[test]
    fn roundtrip_preserves_type_set() {
        let s = serializer();
        let ts = InventoryTypeSystem::new()
            .with_module(CORLIB, "mscorlib.dll", Some(id("V1")), ["System.String", "System.Object"])
            .with_module("Shop.Web", "Shop.Web.dll", None, ["Shop.Web.HomeController", "Shop.Web.Order"]);
        let types = ts.enumerate_types();

        let xml = s.serialize_to_string(&ts, &types).unwrap();
        let back = s.deserialize(&ts, xml.as_bytes()).unwrap();

        let expected: HashSet<TypeEntry> = types.into_iter().collect();
        let actual: HashSet<TypeEntry> = back.into_iter().collect();
        assert_eq!(expected, actual);
    }

    #[test]
    fn roundtrip_with_changed_module_is_a_miss() {
        let s = serializer();
        let xml = s
            .serialize_to_string(&corlib("V1"), &string_and_object())
            .unwrap();
        assert!(s.deserialize(&corlib("V1"), xml.as_bytes()).is_some());
        assert!(s.deserialize(&corlib("V2"), xml.as_bytes()).is_none());
    }

    #[test]
    fn to_document_groups_large_inventories() {
        let names: Vec<String> = (0..20_000).map(|i| format!("Gen.T{i}")).collect();
        let ts = InventoryTypeSystem::new()
            .with_module("Gen", "a.dll", Some(id("a")), names[..10_000].iter().cloned())
            .with_module("Gen", "b.dll", Some(id("b")), names[10_000..].iter().cloned());
        // Every type listed twice.
        let mut types = ts.enumerate_types();
        types.extend(ts.enumerate_types());

        let doc = serializer().to_document(&ts, &types).unwrap();
        assert_eq!(doc.assemblies.len(), 1);
        assert_eq!(doc.assemblies[0].modules.len(), 2);
        assert_eq!(doc.type_count(), 20_000);
        assert_eq!(doc.assemblies[0].modules[0].types[0], "Gen.T0");
        assert_eq!(doc.assemblies[0].modules[1].types[0], "Gen.T10000");
    }

    /// Inventories of varied shape: empty, several assemblies, several
    /// modules including an empty one, and names that need escaping.
    fn inventories() -> Vec<(&'static str, InventoryTypeSystem)> {
        let mut generated = InventoryTypeSystem::new();
        for a in 0..4 {
            let assembly = format!("Gen{a}, Version={a}.0.0.0");
            for m in 0..3 {
                let types: Vec<String> = (0..a * m).map(|t| format!("Gen{a}.M{m}.T{t}")).collect();
                generated.add_module(&assembly, &format!("gen{a}_{m}.dll"), None, types);
            }
        }

        vec![
            ("empty", InventoryTypeSystem::new()),
            ("single module", corlib("V1")),
            (
                "several assemblies",
                InventoryTypeSystem::new()
                    .with_module(CORLIB, "mscorlib.dll", Some(id("V1")), ["System.String"])
                    .with_module("Shop.Web", "Shop.Web.dll", None, ["Shop.Web.HomeController"])
                    .with_module("Shop.Data", "Shop.Data.dll", None, ["Shop.Data.Repository"]),
            ),
            (
                "several modules with an empty one",
                InventoryTypeSystem::new()
                    .with_module("A", "a1.dll", None, ["A.One", "A.Two"])
                    .with_module("A", "a2.dll", None, Vec::<String>::new())
                    .with_module("A", "a3.dll", None, ["A.Three"]),
            ),
            (
                "names that need escaping",
                InventoryTypeSystem::new()
                    .with_module(
                        "Odd & \"Quoted\" <Name>, Culture='x'",
                        "odd.dll",
                        None,
                        ["Generic`1<T>", "Outer+Inner&More", "It's"],
                    )
                    .with_module("Tab\tand\nnewline", "ws.dll", None, ["Ws.T"]),
            ),
            ("generated", generated),
        ]
    }

    #[test]
    fn properties_hold_across_inventories() {
        let s = serializer();
        let other_owner = serializer().with_owner_id(id("O2"));
        for (label, ts) in inventories() {
            let types = ts.enumerate_types();
            let xml = s.serialize_to_string(&ts, &types).unwrap();

            assert_eq!(
                s.serialize_to_string(&ts, &types).unwrap(),
                xml,
                "{label}: serialize is not idempotent"
            );
            assert_eq!(
                s.try_deserialize_str(&ts, &xml),
                Ok(types),
                "{label}: round trip lost types"
            );
            assert_eq!(
                other_owner
                    .try_deserialize_str(&ts, &xml)
                    .map_err(|e| e.kind()),
                Err(InvalidationKind::StaleFormat),
                "{label}: foreign owner was trusted"
            );
        }
    }

    #[test]
    fn default_owner_id_is_stable() {
        assert_eq!(current_owner_id(), current_owner_id());
        assert_eq!(TypeCacheSerializer::default().owner_id(), current_owner_id());
        assert!(!current_owner_id().is_nil());
    }

    #[test]
    fn owner_id_covers_source_hash() {
        assert_eq!(SOURCE_HASH.len(), 32);
        assert!(SOURCE_HASH.chars().all(|c| c.is_ascii_hexdigit()));
        let without_sources = BuildId::from_bytes(
            format!(
                "{}@{}#{}",
                env!("CARGO_PKG_NAME"),
                env!("CARGO_PKG_VERSION"),
                CACHE_FORMAT_REVISION
            )
            .as_bytes(),
        );
        assert_ne!(current_owner_id(), without_sources);
    }
}
