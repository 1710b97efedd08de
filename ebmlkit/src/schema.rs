// ebmlkit
// Copyright (c) 2026 The ebmlkit Developers.
//
// This Source Code Form is subject to the terms of the MIT License. If a copy
// of the MIT License was not distributed with this file, you can obtain one at
// https://opensource.org/license/mit/.

//! The `schema` module loads XML schema descriptions into a registry of
//! element types keyed by ID and by name.
//!
//! Two dialects are accepted. The modern dialect nests element declarations
//! under a `<Schema>` root, with the XML nesting defining the element
//! hierarchy:
//!
//! ```xml
//! <Schema>
//!     <MasterElement name="EBML" id="0x1A45DFA3" mandatory="1">
//!         <StringElement name="DocType" id="0x4282" mandatory="1"/>
//!     </MasterElement>
//! </Schema>
//! ```
//!
//! The legacy dialect is a flat list of `<element>` declarations under a
//! `<table>` root, with the hierarchy left unspecified; every declared
//! element is accepted under every master.

use std::collections::{HashMap, HashSet};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use lazy_static::lazy_static;

use ebmlkit_core::codec;
use ebmlkit_core::errors::{Error, Result, SchemaError};
use ebmlkit_core::vint;

use crate::element::Dump;

/// Search-path token naming the built-in schema set.
pub const BUILTIN_TOKEN: &str = "{builtin}";

/// Environment variable holding extra schema search paths, separated the way
/// the host separates `PATH` entries.
pub const SCHEMA_PATH_VAR: &str = "EBMLKIT_SCHEMA_PATH";

lazy_static! {
    static ref BUILTIN_SCHEMATA: HashMap<&'static str, &'static str> = {
        let mut schemata = HashMap::new();
        schemata.insert("matroska.xml", include_str!("../schemata/matroska.xml"));
        schemata
    };
}

/// The payload data kind of an element type.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ElementKind {
    Int,
    Uint,
    Float,
    Ascii,
    Utf8,
    Date,
    Binary,
    Master,
    Void,
    /// Synthesized for IDs absent from the schema.
    Unknown,
}

impl ElementKind {
    /// Numeric kinds are read and retained at parse time by default, saving a
    /// seek when the value is used later.
    pub fn default_precache(self) -> bool {
        matches!(
            self,
            ElementKind::Int | ElementKind::Uint | ElementKind::Float | ElementKind::Date
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            ElementKind::Int => "int",
            ElementKind::Uint => "uint",
            ElementKind::Float => "float",
            ElementKind::Ascii => "ascii",
            ElementKind::Utf8 => "utf8",
            ElementKind::Date => "date",
            ElementKind::Binary => "binary",
            ElementKind::Master => "master",
            ElementKind::Void => "void",
            ElementKind::Unknown => "unknown",
        }
    }

    /// Maps a modern-dialect declaration tag to a kind.
    fn from_modern_tag(tag: &str) -> Option<ElementKind> {
        match tag {
            "MasterElement" => Some(ElementKind::Master),
            "UIntegerElement" => Some(ElementKind::Uint),
            "IntegerElement" => Some(ElementKind::Int),
            "FloatElement" => Some(ElementKind::Float),
            "StringElement" => Some(ElementKind::Ascii),
            "UnicodeElement" => Some(ElementKind::Utf8),
            "DateElement" => Some(ElementKind::Date),
            "BinaryElement" => Some(ElementKind::Binary),
            "VoidElement" => Some(ElementKind::Void),
            _ => None,
        }
    }

    /// Maps a legacy-dialect `type` attribute to a kind.
    fn from_legacy_type(ty: &str) -> Option<ElementKind> {
        match ty {
            "uinteger" => Some(ElementKind::Uint),
            "integer" => Some(ElementKind::Int),
            "float" => Some(ElementKind::Float),
            "string" => Some(ElementKind::Ascii),
            "utf-8" => Some(ElementKind::Utf8),
            "date" => Some(ElementKind::Date),
            "binary" => Some(ElementKind::Binary),
            "master" => Some(ElementKind::Master),
            _ => None,
        }
    }
}

/// A schema entry: one element type. Immutable after schema load.
#[derive(Debug)]
pub struct ElementType {
    pub id: u32,
    pub name: String,
    pub kind: ElementKind,
    /// Read and cache the value at parse time.
    pub precache: bool,
    /// Advisory; multiplicity is not enforced.
    pub mandatory: bool,
    /// Advisory; multiplicity is not enforced.
    pub multiple: bool,
    /// Permitted beneath any master.
    pub global: bool,
    /// Fixed encoded payload length, when declared.
    pub length: Option<u64>,
    /// IDs of element types permitted directly beneath (masters only).
    children: HashSet<u32>,
}

impl ElementType {
    /// Synthesizes the element type for an ID the schema does not know.
    pub fn unknown(id: u32) -> Arc<ElementType> {
        Arc::new(ElementType {
            id,
            name: format!("UnknownElement_0x{:X}", id),
            kind: ElementKind::Unknown,
            precache: false,
            mandatory: false,
            multiple: true,
            global: false,
            length: None,
            children: HashSet::new(),
        })
    }

    pub fn children(&self) -> &HashSet<u32> {
        &self.children
    }
}

/// In-flight declaration state used during load. Duplicate declarations are
/// merged here; conflicting ones are rejected.
struct ProtoType {
    id: u32,
    name: String,
    kind: ElementKind,
    precache: bool,
    mandatory: bool,
    multiple: bool,
    global: bool,
    length: Option<u64>,
    children: HashSet<u32>,
}

impl ProtoType {
    fn attrs_match(&self, other: &ProtoType) -> bool {
        self.id == other.id
            && self.name == other.name
            && self.kind == other.kind
            && self.precache == other.precache
            && self.mandatory == other.mandatory
            && self.multiple == other.multiple
            && self.global == other.global
            && self.length == other.length
    }
}

/// A loaded schema: element types by ID and by name, the set of global IDs,
/// and the set of IDs permitted at document root. Immutable and freely
/// shareable across threads.
pub struct Schema {
    name: String,
    types_by_id: HashMap<u32, Arc<ElementType>>,
    types_by_name: HashMap<String, Arc<ElementType>>,
    globals: HashSet<u32>,
    root_children: HashSet<u32>,
    /// Legacy flat schemata leave the hierarchy unspecified; every declared
    /// ID is then a valid child of every master.
    flat: bool,
}

impl Schema {
    /// Parses a schema from XML text. `name` identifies the source in
    /// diagnostics.
    pub fn parse(xml: &str, name: &str) -> Result<Schema> {
        let doc = roxmltree::Document::parse(xml)
            .map_err(|err| SchemaError::Malformed(format!("{}: {}", name, err)))?;
        let root = doc.root_element();

        let mut loader = Loader { types: HashMap::new(), root_children: HashSet::new() };

        let flat = match root.tag_name().name() {
            "Schema" => {
                loader.load_modern(root)?;
                false
            }
            "table" => {
                loader.load_legacy(root)?;
                true
            }
            other => {
                return Err(Error::Schema(SchemaError::Malformed(format!(
                    "{}: unrecognized root element <{}>",
                    name, other
                ))));
            }
        };

        let mut types_by_id = HashMap::new();
        let mut types_by_name = HashMap::new();
        let mut globals = HashSet::new();

        for (id, proto) in loader.types {
            if proto.global {
                globals.insert(id);
            }
            let etype = Arc::new(ElementType {
                id: proto.id,
                name: proto.name.clone(),
                kind: proto.kind,
                precache: proto.precache,
                mandatory: proto.mandatory,
                multiple: proto.multiple,
                global: proto.global,
                length: proto.length,
                children: proto.children,
            });
            types_by_name.insert(proto.name, Arc::clone(&etype));
            types_by_id.insert(id, etype);
        }

        Ok(Schema {
            name: name.to_string(),
            types_by_id,
            types_by_name,
            globals,
            root_children: loader.root_children,
            flat,
        })
    }

    /// The source identifier this schema was loaded from.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Looks up an element type by ID.
    pub fn get_id(&self, id: u32) -> Option<&Arc<ElementType>> {
        self.types_by_id.get(&id)
    }

    /// Looks up an element type by name.
    pub fn get_name(&self, name: &str) -> Option<&Arc<ElementType>> {
        self.types_by_name.get(name)
    }

    /// IDs permitted beneath any master.
    pub fn globals(&self) -> &HashSet<u32> {
        &self.globals
    }

    /// IDs permitted at document root.
    pub fn root_children(&self) -> &HashSet<u32> {
        &self.root_children
    }

    /// Is `id` a valid direct child of `parent`? Used to terminate masters
    /// of unknown size.
    pub fn is_valid_child(&self, parent: &ElementType, id: u32) -> bool {
        if self.globals.contains(&id) {
            return true;
        }
        if self.flat {
            return self.types_by_id.contains_key(&id);
        }
        parent.children.contains(&id)
    }

    /// Encodes a sequence of named root elements into EBML bytes.
    ///
    /// Master payloads are buffered fully before their size is written;
    /// streaming encode of master elements is out of scope.
    pub fn encode(&self, roots: &[(String, Dump)]) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        for (name, value) in roots {
            out.extend(self.encode_element(name, value)?);
        }
        Ok(out)
    }

    /// Encodes one named element and its payload into EBML bytes.
    pub fn encode_element(&self, name: &str, value: &Dump) -> Result<Vec<u8>> {
        let etype = self.get_name(name).ok_or_else(|| {
            Error::Schema(SchemaError::Malformed(format!("element not in schema: {}", name)))
        })?;

        let length = etype.length.map(|l| l as u32);
        let payload = match (etype.kind, value) {
            (ElementKind::Master, Dump::Master(children)) => {
                let mut buf = Vec::new();
                for (child_name, child_value) in children {
                    buf.extend(self.encode_element(child_name, child_value)?);
                }
                buf
            }
            (ElementKind::Uint, Dump::Uint(v)) => codec::encode_uint(*v, length)?,
            (ElementKind::Int, Dump::Int(v)) => codec::encode_int(*v, length)?,
            (ElementKind::Float, Dump::Float(v)) => codec::encode_float(*v, length)?,
            (ElementKind::Ascii, Dump::Ascii(v)) => codec::encode_ascii(v, length)?,
            (ElementKind::Utf8, Dump::Utf8(v)) => codec::encode_utf8(v, length)?,
            (ElementKind::Date, Dump::Date(v)) => codec::encode_date(*v, length)?,
            (ElementKind::Binary, Dump::Binary(v)) | (ElementKind::Void, Dump::Binary(v)) => {
                codec::encode_binary(v, length)?
            }
            _ => {
                return Err(Error::DecodeError("value does not match the element's kind"));
            }
        };

        let mut out = vint::encode_id(etype.id, None)?;
        out.extend(vint::encode_size(Some(payload.len() as u64), None)?);
        out.extend(payload);
        Ok(out)
    }
}

/// Collects declarations from either dialect.
struct Loader {
    types: HashMap<u32, ProtoType>,
    root_children: HashSet<u32>,
}

impl Loader {
    fn load_modern(&mut self, root: roxmltree::Node<'_, '_>) -> Result<()> {
        for node in root.children().filter(|n| n.is_element()) {
            let id = self.declare_modern(node)?;
            self.root_children.insert(id);
        }
        Ok(())
    }

    /// Declares one modern-dialect element and, recursively, its children.
    /// Returns the declared ID.
    fn declare_modern(&mut self, node: roxmltree::Node<'_, '_>) -> Result<u32> {
        let tag = node.tag_name().name();
        let kind = ElementKind::from_modern_tag(tag)
            .ok_or_else(|| SchemaError::UnknownKind(tag.to_string()))?;

        let mut proto = parse_attributes(node, kind)?;

        let mut children = HashSet::new();
        for child in node.children().filter(|n| n.is_element()) {
            children.insert(self.declare_modern(child)?);
        }
        proto.children = children;

        self.insert(proto)
    }

    fn load_legacy(&mut self, root: roxmltree::Node<'_, '_>) -> Result<()> {
        for node in root.children().filter(|n| n.is_element()) {
            if node.tag_name().name() != "element" {
                continue;
            }
            let ty = node.attribute("type").unwrap_or("");
            let kind = ElementKind::from_legacy_type(ty)
                .ok_or_else(|| SchemaError::UnknownKind(ty.to_string()))?;

            let proto = parse_attributes(node, kind)?;
            let id = self.insert(proto)?;
            self.root_children.insert(id);
        }
        Ok(())
    }

    /// Inserts a declaration, merging an exact re-declaration (the mechanism
    /// that lets one element appear under several masters) and rejecting a
    /// conflicting one.
    fn insert(&mut self, proto: ProtoType) -> Result<u32> {
        let id = proto.id;

        if let Some(prior) = self.types.get_mut(&id) {
            if !prior.attrs_match(&proto) {
                return Err(Error::Schema(SchemaError::DuplicateWithDifferentAttributes(
                    proto.name,
                )));
            }
            prior.children.extend(proto.children);
            return Ok(id);
        }

        // A different ID reusing an existing name is also a conflict.
        if self.types.values().any(|t| t.name == proto.name) {
            return Err(Error::Schema(SchemaError::DuplicateWithDifferentAttributes(proto.name)));
        }

        self.types.insert(id, proto);
        Ok(id)
    }
}

fn parse_flag(node: roxmltree::Node<'_, '_>, name: &str, default: bool) -> bool {
    match node.attribute(name) {
        Some(v) => matches!(v.trim(), "1" | "true" | "True"),
        None => default,
    }
}

fn parse_attributes(node: roxmltree::Node<'_, '_>, mut kind: ElementKind) -> Result<ProtoType> {
    let context = || {
        format!(
            "<{} name={:?} id={:?}>",
            node.tag_name().name(),
            node.attribute("name").unwrap_or(""),
            node.attribute("id").unwrap_or("")
        )
    };

    let name = match node.attribute("name") {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => return Err(Error::Schema(SchemaError::MissingIdOrName(context()))),
    };

    let first = name.chars().next().unwrap_or('0');
    if !(first.is_ascii_alphabetic() || first == '_') {
        return Err(Error::Schema(SchemaError::Malformed(format!(
            "element name must begin with a letter or underscore: {}",
            name
        ))));
    }

    let id = match node.attribute("id") {
        Some(id) => parse_id(id)
            .ok_or_else(|| SchemaError::Malformed(format!("unparseable id: {}", context())))?,
        None => return Err(Error::Schema(SchemaError::MissingIdOrName(context()))),
    };

    // Void is bound to the void kind no matter how the source declares it.
    if name == "Void" {
        kind = ElementKind::Void;
    }

    // `global` in the modern dialect, `level="-1"` in the legacy one.
    let global =
        parse_flag(node, "global", false) || node.attribute("level").map_or(false, |l| l == "-1");

    let length = match node.attribute("length") {
        Some(l) => Some(l.trim().parse::<u64>().map_err(|_| {
            SchemaError::Malformed(format!("unparseable length attribute: {}", context()))
        })?),
        None => None,
    };

    Ok(ProtoType {
        id,
        name,
        kind,
        precache: parse_flag(node, "precache", kind.default_precache()),
        mandatory: parse_flag(node, "mandatory", false),
        multiple: parse_flag(node, "multiple", false),
        global,
        length,
        children: HashSet::new(),
    })
}

/// Parses an `id` attribute: hex with an `0x` prefix, or plain decimal.
fn parse_id(text: &str) -> Option<u32> {
    let text = text.trim();
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).ok()
    }
    else {
        text.parse::<u32>().ok()
    }
}

/// An explicit, caller-owned schema cache with an ordered search path.
///
/// Resolution order for a schema name: an absolute (or directly readable)
/// path wins; otherwise each search path is tried in order, with the
/// `{builtin}` token standing for the built-in schema set.
pub struct SchemaRegistry {
    search_paths: Vec<PathBuf>,
    cache: HashMap<String, Arc<Schema>>,
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        SchemaRegistry::new()
    }
}

impl SchemaRegistry {
    /// Creates a registry with the default search path: entries from the
    /// `EBMLKIT_SCHEMA_PATH` environment variable followed by the built-in
    /// schema set.
    pub fn new() -> SchemaRegistry {
        let mut search_paths = Vec::new();
        if let Some(paths) = env::var_os(SCHEMA_PATH_VAR) {
            search_paths.extend(env::split_paths(&paths));
        }
        search_paths.push(PathBuf::from("."));
        search_paths.push(PathBuf::from(BUILTIN_TOKEN));
        SchemaRegistry { search_paths, cache: HashMap::new() }
    }

    /// Creates a registry searching `paths` before the defaults.
    pub fn with_paths<I, P>(paths: I) -> SchemaRegistry
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let mut registry = SchemaRegistry::new();
        let mut search_paths: Vec<PathBuf> = paths.into_iter().map(Into::into).collect();
        search_paths.append(&mut registry.search_paths);
        registry.search_paths = search_paths;
        registry
    }

    /// Loads (or returns the cached copy of) the named schema.
    pub fn load(&mut self, name: &str) -> Result<Arc<Schema>> {
        if let Some(schema) = self.cache.get(name) {
            return Ok(Arc::clone(schema));
        }

        let schema = Arc::new(self.resolve(name)?);
        self.cache.insert(name.to_string(), Arc::clone(&schema));
        Ok(schema)
    }

    fn resolve(&self, name: &str) -> Result<Schema> {
        let direct = Path::new(name);
        if direct.is_absolute() && direct.is_file() {
            let xml = fs::read_to_string(direct)?;
            return Schema::parse(&xml, name);
        }

        for path in &self.search_paths {
            if path.as_os_str() == BUILTIN_TOKEN {
                if let Some(xml) = BUILTIN_SCHEMATA.get(name) {
                    return Schema::parse(xml, name);
                }
                continue;
            }
            let candidate = path.join(name);
            if candidate.is_file() {
                let xml = fs::read_to_string(&candidate)?;
                return Schema::parse(&xml, &candidate.to_string_lossy());
            }
        }

        Err(Error::Schema(SchemaError::Malformed(format!("no schema found for {:?}", name))))
    }

    /// Names of every schema reachable through the search path, built-ins
    /// included.
    pub fn list(&self) -> Vec<String> {
        let mut names = Vec::new();
        for path in &self.search_paths {
            if path.as_os_str() == BUILTIN_TOKEN {
                names.extend(BUILTIN_SCHEMATA.keys().map(|k| k.to_string()));
                continue;
            }
            if let Ok(entries) = fs::read_dir(path) {
                for entry in entries.flatten() {
                    let p = entry.path();
                    if p.extension().map_or(false, |e| e == "xml") {
                        if let Some(stem) = p.file_name() {
                            names.push(stem.to_string_lossy().into_owned());
                        }
                    }
                }
            }
        }
        names.sort();
        names.dedup();
        names
    }
}

/// Loads a schema by name using a fresh default registry. Callers loading
/// more than one schema, or the same schema repeatedly, should hold a
/// [`SchemaRegistry`] instead.
pub fn load_schema(name: &str) -> Result<Arc<Schema>> {
    SchemaRegistry::new().load(name)
}

/// Names of every schema a default registry can see.
pub fn list_schemata() -> Vec<String> {
    SchemaRegistry::new().list()
}
