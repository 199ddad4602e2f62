//! The persisted type cache document and its XML form.
//!
//! ```text
//! <?xml version="1.0" encoding="utf-16"?>
//! <!--This file is automatically generated. Please do not modify the contents of this file.-->
//! <typeCache lastModified="2001-01-01 00:00:00Z" mvcVersionId="{owner id}">
//!   <assembly name="{assembly full name}">
//!     <module versionId="{module id}">
//!       <type>{fully-qualified type name}</type>
//!     </module>
//!   </assembly>
//! </typeCache>
//! ```
//!
//! Parsing checks shape only. Whether the recorded identifiers still match
//! the running build is decided by the serializer.

use std::collections::HashSet;
use std::fmt::Write as _;

use roxmltree::Node;
use trellis_common::BuildId;

use crate::error::Invalidation;

const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="utf-16"?>"#;
const DO_NOT_EDIT_COMMENT: &str =
    "<!--This file is automatically generated. Please do not modify the contents of this file.-->";

const ROOT_ELEMENT: &str = "typeCache";
const ASSEMBLY_ELEMENT: &str = "assembly";
const MODULE_ELEMENT: &str = "module";
const TYPE_ELEMENT: &str = "type";

const LAST_MODIFIED_ATTR: &str = "lastModified";
const OWNER_ID_ATTR: &str = "mvcVersionId";
const FILTER_ID_ATTR: &str = "filterId";
const NAME_ATTR: &str = "name";
const VERSION_ID_ATTR: &str = "versionId";

/// A parsed or about-to-be-written type cache document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeCacheDocument {
    /// Informational write timestamp. Never used for validity.
    pub last_modified: Option<String>,
    /// Build identifier of the cache owner that wrote the document.
    pub owner_id: BuildId,
    /// Identity of the type filter the listed types were selected with.
    /// Absent for unfiltered caches.
    pub filter_id: Option<BuildId>,
    /// Assembly groups in document order. Names are unique.
    pub assemblies: Vec<AssemblyGroup>,
}

/// The types recorded for one assembly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblyGroup {
    /// Assembly full name.
    pub name: String,
    /// Module groups in document order.
    pub modules: Vec<ModuleGroup>,
}

/// The types recorded for one module of an assembly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleGroup {
    /// Build identifier of the module when the document was written.
    pub version_id: BuildId,
    /// Fully-qualified type names. Unique within the group.
    pub types: Vec<String>,
}

impl TypeCacheDocument {
    /// Creates a document with no assemblies.
    pub fn new(owner_id: BuildId, last_modified: Option<String>) -> Self {
        Self {
            last_modified,
            owner_id,
            filter_id: None,
            assemblies: Vec::new(),
        }
    }

    /// Total number of recorded types.
    pub fn type_count(&self) -> usize {
        self.assemblies
            .iter()
            .flat_map(|a| &a.modules)
            .map(|m| m.types.len())
            .sum()
    }

    /// Parses a document, checking its shape.
    ///
    /// Any deviation from the expected structure is reported as
    /// [`Invalidation::Malformed`]: wrong root element, missing attributes,
    /// identifiers that are not GUIDs, unexpected child elements, empty type
    /// names, and duplicate assembly groups or duplicate types within a
    /// module group.
    pub fn parse(xml: &str) -> Result<Self, Invalidation> {
        let doc = roxmltree::Document::parse(xml).map_err(Invalidation::malformed)?;
        let root = doc.root_element();
        expect_element(root, ROOT_ELEMENT)?;

        let owner_id = build_id_attribute(root, OWNER_ID_ATTR)?;
        let last_modified = root.attribute(LAST_MODIFIED_ATTR).map(str::to_string);
        let filter_id = match root.attribute(FILTER_ID_ATTR) {
            Some(raw) => Some(raw.parse().map_err(Invalidation::malformed)?),
            None => None,
        };

        let mut seen_assemblies = HashSet::new();
        let mut assemblies = Vec::new();
        for asm_node in root.children().filter(Node::is_element) {
            expect_element(asm_node, ASSEMBLY_ELEMENT)?;
            let name = required_attribute(asm_node, NAME_ATTR)?;
            if !seen_assemblies.insert(name) {
                return Err(Invalidation::malformed(format!(
                    "duplicate assembly group '{name}'"
                )));
            }

            let mut modules = Vec::new();
            for module_node in asm_node.children().filter(Node::is_element) {
                expect_element(module_node, MODULE_ELEMENT)?;
                let version_id = build_id_attribute(module_node, VERSION_ID_ATTR)?;

                let mut seen_types = HashSet::new();
                let mut types = Vec::new();
                for type_node in module_node.children().filter(Node::is_element) {
                    expect_element(type_node, TYPE_ELEMENT)?;
                    let type_name = type_node.text().map(str::trim).unwrap_or_default();
                    if type_name.is_empty() {
                        return Err(Invalidation::malformed(format!(
                            "empty type name in assembly '{name}'"
                        )));
                    }
                    if !seen_types.insert(type_name) {
                        return Err(Invalidation::malformed(format!(
                            "duplicate type '{type_name}' in assembly '{name}'"
                        )));
                    }
                    types.push(type_name.to_string());
                }
                modules.push(ModuleGroup { version_id, types });
            }

            assemblies.push(AssemblyGroup {
                name: name.to_string(),
                modules,
            });
        }

        Ok(Self {
            last_modified,
            owner_id,
            filter_id,
            assemblies,
        })
    }

    /// Renders the document as XML.
    ///
    /// Output is deterministic: two-space indentation, `\n` line endings, no
    /// trailing newline. A document without assemblies renders its root as an
    /// empty element.
    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        out.push_str(XML_DECLARATION);
        out.push('\n');
        out.push_str(DO_NOT_EDIT_COMMENT);
        out.push('\n');

        let _ = write!(out, "<{ROOT_ELEMENT}");
        if let Some(last_modified) = &self.last_modified {
            let _ = write!(out, " {LAST_MODIFIED_ATTR}=\"{}\"", escape(last_modified));
        }
        let _ = write!(out, " {OWNER_ID_ATTR}=\"{}\"", self.owner_id);
        if let Some(filter_id) = self.filter_id {
            let _ = write!(out, " {FILTER_ID_ATTR}=\"{filter_id}\"");
        }

        if self.assemblies.is_empty() {
            out.push_str(" />");
            return out;
        }
        out.push_str(">\n");

        for asm in &self.assemblies {
            let _ = writeln!(
                out,
                "  <{ASSEMBLY_ELEMENT} {NAME_ATTR}=\"{}\">",
                escape(&asm.name)
            );
            for module in &asm.modules {
                let _ = writeln!(
                    out,
                    "    <{MODULE_ELEMENT} {VERSION_ID_ATTR}=\"{}\">",
                    module.version_id
                );
                for ty in &module.types {
                    let _ = writeln!(out, "      <{TYPE_ELEMENT}>{}</{TYPE_ELEMENT}>", escape(ty));
                }
                let _ = writeln!(out, "    </{MODULE_ELEMENT}>");
            }
            let _ = writeln!(out, "  </{ASSEMBLY_ELEMENT}>");
        }
        let _ = write!(out, "</{ROOT_ELEMENT}>");
        out
    }
}

fn expect_element(node: Node<'_, '_>, name: &str) -> Result<(), Invalidation> {
    let found = node.tag_name().name();
    if found == name && node.tag_name().namespace().is_none() {
        Ok(())
    } else {
        Err(Invalidation::malformed(format!(
            "expected <{name}>, found <{found}>"
        )))
    }
}

fn required_attribute<'a>(node: Node<'a, '_>, attr: &str) -> Result<&'a str, Invalidation> {
    node.attribute(attr).ok_or_else(|| {
        Invalidation::malformed(format!(
            "<{}> is missing attribute '{attr}'",
            node.tag_name().name()
        ))
    })
}

fn build_id_attribute(node: Node<'_, '_>, attr: &str) -> Result<BuildId, Invalidation> {
    required_attribute(node, attr)?
        .parse()
        .map_err(Invalidation::malformed)
}

/// Escapes text for use in both attribute values and element content.
///
/// Line breaks and tabs become character references, since attribute value
/// normalization would otherwise read them back as spaces.
fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            '\n' => out.push_str("&#10;"),
            '\r' => out.push_str("&#13;"),
            '\t' => out.push_str("&#9;"),
            _ => out.push(c),
        }
    }
    out
}
