// ebmlkit
// Copyright (c) 2026 The ebmlkit Developers.
//
// This Source Code Form is subject to the terms of the MIT License. If a copy
// of the MIT License was not distributed with this file, you can obtain one at
// https://opensource.org/license/mit/.

//! The `element` module materializes a tree of EBML elements over a seekable
//! byte source, lazy-loading payloads on demand.
//!
//! An element records where its header and payload live in the source and
//! decodes the payload only when the value is first used, memoizing the
//! result. Master elements value to their list of direct children, each
//! itself lazy. A master of unknown size is terminated by child-ID validity:
//! iteration stops at the first ID that is neither a declared child of the
//! master nor a schema global.

use std::cell::RefCell;
use std::io::{Seek, SeekFrom};
use std::rc::Rc;
use std::sync::Arc;

use time::OffsetDateTime;

use ebmlkit_core::codec;
use ebmlkit_core::errors::{decode_error, Error, Result};
use ebmlkit_core::io::MediaSource;
use ebmlkit_core::vint;

use crate::schema::{ElementKind, ElementType, Schema};

/// A byte source shared by every element of one document. Elements borrow a
/// read cursor; they never own the source.
pub type SharedSource = Rc<RefCell<Box<dyn MediaSource>>>;

/// A decoded element payload.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Uint(u64),
    Int(i64),
    Float(f64),
    Ascii(String),
    Utf8(String),
    Date(OffsetDateTime),
    Binary(Box<[u8]>),
    /// A master element's value is its list of direct children.
    Master(Vec<Element>),
}

impl Value {
    pub fn as_uint(&self) -> Option<u64> {
        match self {
            Value::Uint(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Ascii(s) | Value::Utf8(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Binary(b) => Some(b),
            _ => None,
        }
    }
}

/// A fully materialized value tree: the output of [`Element::dump`] and the
/// input of [`Schema::encode`](crate::schema::Schema::encode).
#[derive(Clone, Debug, PartialEq)]
pub enum Dump {
    Uint(u64),
    Int(i64),
    Float(f64),
    Ascii(String),
    Utf8(String),
    Date(OffsetDateTime),
    Binary(Vec<u8>),
    /// Child name/value pairs in document order. Names repeat for elements
    /// declared `multiple`.
    Master(Vec<(String, Dump)>),
}

impl Dump {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Dump::Ascii(s) | Dump::Utf8(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_uint(&self) -> Option<u64> {
        match self {
            Dump::Uint(v) => Some(*v),
            _ => None,
        }
    }
}

/// Resolved extent of a master whose declared size was unknown.
#[derive(Copy, Clone, Debug)]
struct Extent {
    size: u64,
    children: u64,
}

#[derive(Default)]
struct ElementState {
    cached: Option<Value>,
    resolved: Option<Extent>,
}

/// One node of the parsed element tree.
///
/// Cloning an element is cheap and shares the memoized value; the clone is a
/// second handle onto the same node, not a reparse.
#[derive(Clone)]
pub struct Element {
    etype: Arc<ElementType>,
    schema: Arc<Schema>,
    source: SharedSource,
    offset: u64,
    payload_offset: u64,
    size: Option<u64>,
    state: Rc<RefCell<ElementState>>,
}

impl Element {
    /// Parses a single element at `offset`, returning it and the offset of
    /// the next sibling when the payload size is known.
    ///
    /// An ID missing from the schema produces a synthetic unknown element,
    /// never an error. When the element type asks for precaching and the
    /// caller did not pass `nocache`, the payload is read immediately,
    /// avoiding a seek later.
    pub(crate) fn parse_at(
        schema: &Arc<Schema>,
        source: &SharedSource,
        offset: u64,
        nocache: bool,
    ) -> Result<(Element, Option<u64>)> {
        let (id, size, header_len) = {
            let mut src = source.borrow_mut();
            src.seek(SeekFrom::Start(offset))?;
            let (id, id_len) = vint::read_id(&mut *src)?;
            let (size, size_len) = vint::read_size(&mut *src)?;
            (id, size, u64::from(id_len + size_len))
        };

        let etype = match schema.get_id(id) {
            Some(etype) => Arc::clone(etype),
            None => ElementType::unknown(id),
        };

        if size.is_none() && etype.kind != ElementKind::Master {
            return decode_error("unknown size on a non-master element");
        }

        let element = Element {
            etype,
            schema: Arc::clone(schema),
            source: Rc::clone(source),
            offset,
            payload_offset: offset + header_len,
            size,
            state: Rc::new(RefCell::new(ElementState::default())),
        };

        if element.etype.precache && !nocache {
            element.value()?;
        }

        let next = size.map(|size| element.payload_offset + size);
        Ok((element, next))
    }

    pub fn id(&self) -> u32 {
        self.etype.id
    }

    pub fn name(&self) -> &str {
        &self.etype.name
    }

    pub fn kind(&self) -> ElementKind {
        self.etype.kind
    }

    pub fn element_type(&self) -> &Arc<ElementType> {
        &self.etype
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Offset of the element header in the source.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Offset of the payload, immediately after the ID and size fields.
    pub fn payload_offset(&self) -> u64 {
        self.payload_offset
    }

    /// The declared payload size; `None` means unknown (all-ones size field).
    pub fn declared_size(&self) -> Option<u64> {
        self.size
    }

    pub fn is_unknown_size(&self) -> bool {
        self.size.is_none()
    }

    /// The payload size in bytes. For a master of unknown size this walks
    /// the children once to find where the master ends, and remembers the
    /// answer.
    pub fn size(&self) -> Result<u64> {
        if let Some(size) = self.size {
            return Ok(size);
        }
        Ok(self.resolve_extent()?.size)
    }

    /// The number of direct children of a master element, counted without
    /// caching payload values.
    pub fn child_count(&self) -> Result<u64> {
        if self.etype.kind != ElementKind::Master {
            return decode_error("child count of a non-master element");
        }
        if self.size.is_none() {
            return Ok(self.resolve_extent()?.children);
        }
        let mut count = 0u64;
        for child in self.iter_nocache() {
            child?;
            count += 1;
        }
        Ok(count)
    }

    /// The decoded payload. The first call seeks and decodes; later calls
    /// return the memoized value. Master elements value to their direct
    /// children.
    pub fn value(&self) -> Result<Value> {
        if let Some(value) = &self.state.borrow().cached {
            return Ok(value.clone());
        }
        let value = self.read_value()?;
        self.state.borrow_mut().cached = Some(value.clone());
        Ok(value)
    }

    fn read_value(&self) -> Result<Value> {
        match self.etype.kind {
            ElementKind::Master => {
                let mut children = Vec::new();
                for child in self.iter() {
                    children.push(child?);
                }
                return Ok(Value::Master(children));
            }
            // The payload of a void element is never read; its value is the
            // declared number of 0xFF bytes.
            ElementKind::Void => {
                return Ok(Value::Binary(codec::void_value(self.size.unwrap_or(0))));
            }
            _ => (),
        }

        let size = match self.size {
            Some(size) => size,
            None => return decode_error("unknown size on a non-master element"),
        };

        let mut src = self.source.borrow_mut();
        src.seek(SeekFrom::Start(self.payload_offset))?;
        let reader = &mut *src;

        let value = match self.etype.kind {
            ElementKind::Uint => Value::Uint(codec::read_uint(reader, size)?),
            ElementKind::Int => Value::Int(codec::read_int(reader, size)?),
            ElementKind::Float => Value::Float(codec::read_float(reader, size)?),
            ElementKind::Ascii => Value::Ascii(codec::read_ascii(reader, size)?),
            ElementKind::Utf8 => Value::Utf8(codec::read_utf8(reader, size)?),
            ElementKind::Date => Value::Date(codec::read_date(reader, size)?),
            ElementKind::Binary | ElementKind::Unknown => {
                Value::Binary(codec::read_binary(reader, size)?)
            }
            ElementKind::Master | ElementKind::Void => unreachable!(),
        };
        Ok(value)
    }

    /// Iterates the direct children of a master element in file order.
    pub fn iter(&self) -> Children {
        Children::new(self, false)
    }

    /// Like [`iter`](Element::iter), but parsed children skip precaching.
    pub fn iter_nocache(&self) -> Children {
        Children::new(self, true)
    }

    /// Materializes the direct children of a master element.
    pub fn children(&self) -> Result<Vec<Element>> {
        match self.value()? {
            Value::Master(children) => Ok(children),
            _ => decode_error("children of a non-master element"),
        }
    }

    /// Materializes the element into a value tree, decoding every payload
    /// beneath it.
    pub fn dump(&self) -> Result<Dump> {
        let dump = match self.value()? {
            Value::Uint(v) => Dump::Uint(v),
            Value::Int(v) => Dump::Int(v),
            Value::Float(v) => Dump::Float(v),
            Value::Ascii(v) => Dump::Ascii(v),
            Value::Utf8(v) => Dump::Utf8(v),
            Value::Date(v) => Dump::Date(v),
            Value::Binary(v) => Dump::Binary(v.into_vec()),
            Value::Master(children) => {
                let mut dumped = Vec::with_capacity(children.len());
                for child in children {
                    dumped.push((child.name().to_string(), child.dump()?));
                }
                Dump::Master(dumped)
            }
        };
        Ok(dump)
    }

    /// Drops memoized values to cap resident memory on long-lived documents.
    /// Recursive mode descends into cached master children first.
    pub fn gc(&self, recursive: bool) {
        let mut state = self.state.borrow_mut();
        if recursive {
            if let Some(Value::Master(children)) = &state.cached {
                for child in children {
                    child.gc(true);
                }
            }
        }
        state.cached = None;
    }

    /// Walks the children of an unknown-size master to find its end, caching
    /// the resulting extent.
    fn resolve_extent(&self) -> Result<Extent> {
        if let Some(extent) = self.state.borrow().resolved {
            return Ok(extent);
        }
        // Children::next records the extent when the walk terminates.
        let mut count = 0u64;
        for child in self.iter_nocache() {
            child?;
            count += 1;
        }
        let extent = self
            .state
            .borrow()
            .resolved
            .unwrap_or(Extent { size: 0, children: count });
        Ok(extent)
    }

    /// The offset one past the last payload byte, resolving unknown-size
    /// masters on demand.
    pub(crate) fn end_offset(&self) -> Result<u64> {
        Ok(self.payload_offset + self.size()?)
    }
}

impl std::fmt::Debug for Element {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Element")
            .field("name", &self.etype.name)
            .field("id", &format_args!("0x{:X}", self.etype.id))
            .field("kind", &self.etype.kind)
            .field("offset", &self.offset)
            .field("payload_offset", &self.payload_offset)
            .field("size", &self.size)
            .finish()
    }
}

/// Two elements are equal when they describe the same region of the same
/// document: same kind, ID, offset, size, and schema. Payload equality is
/// not implied; compare values when that matters. Unknown elements carry no
/// schema identity, so they compare by ID and payload.
impl PartialEq for Element {
    fn eq(&self, other: &Self) -> bool {
        if self.kind() == ElementKind::Unknown || other.kind() == ElementKind::Unknown {
            return self.kind() == other.kind()
                && self.id() == other.id()
                && match (self.value(), other.value()) {
                    (Ok(a), Ok(b)) => a == b,
                    _ => false,
                };
        }
        self.kind() == other.kind()
            && self.id() == other.id()
            && self.offset == other.offset
            && self.size == other.size
            && Arc::ptr_eq(&self.schema, &other.schema)
    }
}

/// Iterator over the direct children of a master element.
pub struct Children {
    parent: Element,
    next_offset: u64,
    /// One past the last payload byte, when the parent size is known or was
    /// previously resolved.
    end: Option<u64>,
    nocache: bool,
    yielded: u64,
    done: bool,
}

impl Children {
    fn new(parent: &Element, nocache: bool) -> Children {
        let end = match parent.size {
            Some(size) => Some(parent.payload_offset + size),
            None => {
                parent.state.borrow().resolved.map(|extent| parent.payload_offset + extent.size)
            }
        };
        Children {
            parent: parent.clone(),
            next_offset: parent.payload_offset,
            end,
            nocache,
            yielded: 0,
            done: false,
        }
    }

    /// Records the resolved extent of an unknown-size parent once the walk
    /// stops.
    fn finish(&mut self) {
        self.done = true;
        if self.parent.size.is_none() {
            let mut state = self.parent.state.borrow_mut();
            if state.resolved.is_none() {
                state.resolved = Some(Extent {
                    size: self.next_offset - self.parent.payload_offset,
                    children: self.yielded,
                });
            }
        }
    }
}

impl Iterator for Children {
    type Item = Result<Element>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.parent.etype.kind != ElementKind::Master {
            return None;
        }

        if let Some(end) = self.end {
            if self.next_offset >= end {
                self.finish();
                return None;
            }
        }

        let parsed =
            Element::parse_at(&self.parent.schema, &self.parent.source, self.next_offset, self.nocache);

        let (child, next) = match parsed {
            Ok(parsed) => parsed,
            // Running out of bytes while looking for the next child simply
            // ends the master; any other failure propagates.
            Err(Error::EndOfSource) => {
                self.finish();
                return None;
            }
            Err(err) => {
                self.done = true;
                return Some(Err(err));
            }
        };

        // A master of unknown size ends at the first ID that is not a valid
        // child. Streams whose stray bytes happen to spell a valid child ID
        // will terminate late, not early; that is inherent to the format.
        if self.end.is_none()
            && !self.parent.schema.is_valid_child(&self.parent.etype, child.id())
        {
            self.finish();
            return None;
        }

        let next = match next {
            Some(next) => next,
            // The child itself has unknown size; walk it to find its end.
            None => match child.end_offset() {
                Ok(end) => end,
                Err(err) => {
                    self.done = true;
                    return Some(Err(err));
                }
            },
        };

        self.next_offset = next;
        self.yielded += 1;
        Some(Ok(child))
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::io::{Cursor, Seek, SeekFrom};
    use std::rc::Rc;
    use std::sync::Arc;

    use super::{Element, SharedSource, Value};
    use crate::schema::{ElementKind, Schema};
    use ebmlkit_core::io::MediaSource;

    const SCHEMA: &str = r#"
        <Schema>
            <MasterElement name="Doc" id="0x1A45DFA3">
                <UIntegerElement name="Count" id="0x4286"/>
                <UnicodeElement name="Label" id="0x4282" precache="0"/>
                <VoidElement name="Void" id="0xEC" global="1"/>
            </MasterElement>
        </Schema>
    "#;

    fn source_of(bytes: &[u8]) -> SharedSource {
        Rc::new(RefCell::new(Box::new(Cursor::new(bytes.to_vec())) as Box<dyn MediaSource>))
    }

    fn schema() -> Arc<Schema> {
        Arc::new(Schema::parse(SCHEMA, "element-test").unwrap())
    }

    #[test]
    fn parse_and_lazy_value() {
        // Doc { Count: 7, Label: "hi" }
        let bytes = [
            0x1A, 0x45, 0xDF, 0xA3, 0x87, // Doc, size 7
            0x42, 0x86, 0x81, 0x07, // Count = 7
            0x42, 0x82, 0x82, b'h', b'i', // Label = "hi"
        ];
        let schema = schema();
        let source = source_of(&bytes);

        let (doc, next) = Element::parse_at(&schema, &source, 0, false).unwrap();
        assert_eq!(doc.name(), "Doc");
        assert_eq!(doc.payload_offset(), 5);
        assert_eq!(next, Some(12));

        let children = doc.children().unwrap();
        assert_eq!(children.len(), 2);
        assert_eq!(children[0].value().unwrap(), Value::Uint(7));
        assert_eq!(children[1].value().unwrap(), Value::Utf8("hi".into()));

        // Memoized: a second read returns the identical value even after the
        // cursor moved elsewhere.
        source.borrow_mut().seek(SeekFrom::Start(0)).unwrap();
        assert_eq!(children[1].value().unwrap(), Value::Utf8("hi".into()));
    }

    #[test]
    fn unknown_id_synthesizes_element() {
        let bytes = [0x65, 0x42, 0x81, 0xAA]; // id 0x6542 absent from schema
        let schema = schema();
        let source = source_of(&bytes);

        let (el, _) = Element::parse_at(&schema, &source, 0, false).unwrap();
        assert_eq!(el.kind(), ElementKind::Unknown);
        assert_eq!(el.id(), 0x6542);
        assert_eq!(el.value().unwrap(), Value::Binary(vec![0xAA].into_boxed_slice()));
    }

    #[test]
    fn unknown_size_master_terminates_on_invalid_child() {
        // Doc with unknown size, two valid children, then a stray invalid id.
        let bytes = [
            0x1A, 0x45, 0xDF, 0xA3, 0xFF, // Doc, unknown size
            0x42, 0x86, 0x81, 0x01, // Count = 1
            0x42, 0x86, 0x81, 0x02, // Count = 2
            0x65, 0x42, 0x81, 0xAA, // not a Doc child: terminates the master
        ];
        let schema = schema();
        let source = source_of(&bytes);

        let (doc, next) = Element::parse_at(&schema, &source, 0, false).unwrap();
        assert_eq!(next, None);
        assert!(doc.is_unknown_size());

        let children = doc.children().unwrap();
        assert_eq!(children.len(), 2);
        assert_eq!(children[1].value().unwrap(), Value::Uint(2));

        // The resolved size spans exactly the two valid children.
        assert_eq!(doc.size().unwrap(), 8);
        assert_eq!(doc.child_count().unwrap(), 2);
    }

    #[test]
    fn unknown_size_master_terminates_at_end_of_source() {
        let bytes = [
            0x1A, 0x45, 0xDF, 0xA3, 0xFF, // Doc, unknown size
            0x42, 0x86, 0x81, 0x05, // Count = 5
        ];
        let schema = schema();
        let source = source_of(&bytes);

        let (doc, _) = Element::parse_at(&schema, &source, 0, false).unwrap();
        assert_eq!(doc.size().unwrap(), 4);
        assert_eq!(doc.child_count().unwrap(), 1);
    }

    /// A source that fails the test if anything reads through it.
    struct PanickingSource;

    impl std::io::Read for PanickingSource {
        fn read(&mut self, _: &mut [u8]) -> std::io::Result<usize> {
            panic!("void element read through the source");
        }
    }

    impl std::io::Seek for PanickingSource {
        fn seek(&mut self, _: std::io::SeekFrom) -> std::io::Result<u64> {
            Ok(0)
        }
    }

    impl MediaSource for PanickingSource {
        fn is_seekable(&self) -> bool {
            true
        }
        fn byte_len(&self) -> Option<u64> {
            None
        }
    }

    #[test]
    fn void_value_never_touches_the_source() {
        // Parse a void element from a real buffer, then swap in a source
        // that panics on read before asking for the value.
        let bytes = [0xEC, 0x83, 0x00, 0x00, 0x00];
        let schema = schema();
        let source = source_of(&bytes);

        let (void, _) = Element::parse_at(&schema, &source, 0, false).unwrap();
        assert_eq!(void.kind(), ElementKind::Void);

        *source.borrow_mut() = Box::new(PanickingSource);
        assert_eq!(void.value().unwrap(), Value::Binary(vec![0xFF; 3].into_boxed_slice()));
        assert_eq!(void.declared_size(), Some(3));
    }

    #[test]
    fn equality_is_positional() {
        let bytes = [
            0x42, 0x86, 0x81, 0x07, // Count = 7
            0x42, 0x86, 0x81, 0x07, // Count = 7, again
        ];
        let schema = schema();
        let source = source_of(&bytes);

        let (a, _) = Element::parse_at(&schema, &source, 0, false).unwrap();
        let (a2, _) = Element::parse_at(&schema, &source, 0, false).unwrap();
        let (b, _) = Element::parse_at(&schema, &source, 4, false).unwrap();

        assert_eq!(a, a2);
        // Same payload, different offset: not the same element.
        assert_ne!(a, b);
        assert_eq!(a.value().unwrap(), b.value().unwrap());
    }

    #[test]
    fn gc_clears_memoized_values() {
        let bytes = [
            0x1A, 0x45, 0xDF, 0xA3, 0x84, // Doc, size 4
            0x42, 0x86, 0x81, 0x07, // Count = 7
        ];
        let schema = schema();
        let source = source_of(&bytes);

        let (doc, _) = Element::parse_at(&schema, &source, 0, false).unwrap();
        let children = doc.children().unwrap();
        assert_eq!(children[0].value().unwrap(), Value::Uint(7));

        doc.gc(true);
        assert!(doc.state.borrow().cached.is_none());
        assert!(children[0].state.borrow().cached.is_none());
    }
}
