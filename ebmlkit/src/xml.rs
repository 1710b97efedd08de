// ebmlkit
// Copyright (c) 2026 The ebmlkit Developers.
//
// This Source Code Form is subject to the terms of the MIT License. If a copy
// of the MIT License was not distributed with this file, you can obtain one at
// https://opensource.org/license/mit/.

//! The `xml` module renders EBML documents as XML and encodes XML back into
//! EBML bytes.
//!
//! One XML element is emitted per EBML element, tagged with the element name.
//! The `offset`, `size`, `type`, and `id` attributes are selectable. Binary
//! payloads are rendered through one of three symmetric body codecs: base64
//! (76-column wrapped), hex (rows of 16 two-byte words behind a decimal
//! offset column), or ignore (payload suppressed). Every decoder accepts its
//! encoder's output regardless of column formatting.

use std::io;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use time::format_description::well_known::Iso8601;
use time::OffsetDateTime;

use ebmlkit_core::codec;
use ebmlkit_core::errors::{decode_error, Error, Result, SchemaError};

use crate::document::Document;
use crate::element::{Dump, Element, Value};
use crate::schema::{ElementKind, Schema};

/// A codec for rendering binary payloads as XML text.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum BinaryCodec {
    #[default]
    Base64,
    Hex,
    /// Suppress the payload entirely.
    Ignore,
}

/// Bytes per hex row: 16 two-byte words.
const HEX_ROW_BYTES: usize = 32;
/// Wrap base64 output at the customary 76 columns.
const BASE64_COLUMNS: usize = 76;

impl BinaryCodec {
    pub fn name(self) -> &'static str {
        match self {
            BinaryCodec::Base64 => "base64",
            BinaryCodec::Hex => "hex",
            BinaryCodec::Ignore => "ignore",
        }
    }

    pub fn from_name(name: &str) -> Option<BinaryCodec> {
        match name {
            "base64" => Some(BinaryCodec::Base64),
            "hex" => Some(BinaryCodec::Hex),
            "ignore" => Some(BinaryCodec::Ignore),
            _ => None,
        }
    }

    pub fn encode(self, data: &[u8]) -> String {
        match self {
            BinaryCodec::Base64 => {
                let encoded = BASE64.encode(data);
                let mut wrapped = String::with_capacity(encoded.len() + encoded.len() / 64);
                for (i, ch) in encoded.chars().enumerate() {
                    if i > 0 && i % BASE64_COLUMNS == 0 {
                        wrapped.push('\n');
                    }
                    wrapped.push(ch);
                }
                wrapped
            }
            BinaryCodec::Hex => {
                let mut out = String::new();
                for (row, chunk) in data.chunks(HEX_ROW_BYTES).enumerate() {
                    if row > 0 {
                        out.push('\n');
                    }
                    out.push_str(&format!("{:8}:", row * HEX_ROW_BYTES));
                    for word in chunk.chunks(2) {
                        out.push(' ');
                        for byte in word {
                            out.push_str(&format!("{:02x}", byte));
                        }
                    }
                }
                out
            }
            BinaryCodec::Ignore => String::new(),
        }
    }

    /// Decodes encoder output. Offset columns, whitespace, and line wrapping
    /// are all tolerated, so any formatting variant of the same codec
    /// decodes identically.
    pub fn decode(self, text: &str) -> Result<Vec<u8>> {
        match self {
            BinaryCodec::Base64 => {
                let stripped: String = text.chars().filter(|c| !c.is_whitespace()).collect();
                BASE64
                    .decode(stripped.as_bytes())
                    .map_err(|_| Error::DecodeError("invalid base64 payload text"))
            }
            BinaryCodec::Hex => {
                let mut digits = String::new();
                for token in text.split_whitespace() {
                    if token.ends_with(':') {
                        continue;
                    }
                    digits.push_str(token);
                }
                if digits.len() % 2 != 0 {
                    return decode_error("odd number of hex digits in payload text");
                }
                let mut bytes = Vec::with_capacity(digits.len() / 2);
                for pair in digits.as_bytes().chunks(2) {
                    let pair = std::str::from_utf8(pair).unwrap_or("");
                    let byte = u8::from_str_radix(pair, 16)
                        .map_err(|_| Error::DecodeError("invalid hex payload text"))?;
                    bytes.push(byte);
                }
                Ok(bytes)
            }
            BinaryCodec::Ignore => Ok(Vec::new()),
        }
    }
}

/// Attribute and codec selection for [`to_xml`].
#[derive(Copy, Clone, Debug)]
pub struct XmlOptions {
    pub offsets: bool,
    pub sizes: bool,
    pub types: bool,
    pub ids: bool,
    pub binary_codec: BinaryCodec,
}

impl Default for XmlOptions {
    fn default() -> Self {
        XmlOptions {
            offsets: true,
            sizes: true,
            types: true,
            ids: true,
            binary_codec: BinaryCodec::default(),
        }
    }
}

fn write_error<E: std::fmt::Display>(err: E) -> Error {
    Error::IoError(io::Error::new(io::ErrorKind::Other, err.to_string()))
}

/// Renders a document as XML, one XML element per EBML element.
pub fn to_xml(doc: &Document, options: &XmlOptions) -> Result<String> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);

    let mut root = BytesStart::new("Document");
    root.push_attribute(("schema", doc.schema().name()));
    if let Some(name) = doc.name() {
        root.push_attribute(("source", name));
    }
    writer.write_event(Event::Start(root)).map_err(write_error)?;

    for element in doc.iter() {
        write_element(&mut writer, &element?, options)?;
    }

    writer.write_event(Event::End(BytesEnd::new("Document"))).map_err(write_error)?;

    let bytes = writer.into_inner();
    String::from_utf8(bytes).map_err(|_| Error::DecodeError("xml output was not utf-8"))
}

fn write_element(
    writer: &mut Writer<Vec<u8>>,
    element: &Element,
    options: &XmlOptions,
) -> Result<()> {
    let name = element.name().to_string();
    let mut start = BytesStart::new(name.as_str());

    if options.ids {
        start.push_attribute(("id", format!("0x{:X}", element.id()).as_str()));
    }
    if options.offsets {
        start.push_attribute(("offset", element.offset().to_string().as_str()));
    }
    if options.sizes {
        start.push_attribute(("size", element.size()?.to_string().as_str()));
    }
    if options.types {
        start.push_attribute(("type", element.kind().name()));
    }

    match element.kind() {
        ElementKind::Master => {
            writer.write_event(Event::Start(start)).map_err(write_error)?;
            for child in element.iter() {
                write_element(writer, &child?, options)?;
            }
            writer.write_event(Event::End(BytesEnd::new(name.as_str()))).map_err(write_error)?;
        }
        ElementKind::Void => {
            // The declared size says everything about a void element.
            writer.write_event(Event::Empty(start)).map_err(write_error)?;
        }
        ElementKind::Binary | ElementKind::Unknown => {
            start.push_attribute(("encoding", options.binary_codec.name()));
            if options.binary_codec == BinaryCodec::Ignore {
                writer.write_event(Event::Empty(start)).map_err(write_error)?;
            }
            else {
                let data = match element.value()? {
                    Value::Binary(data) => data,
                    _ => return decode_error("binary element with non-binary value"),
                };
                writer.write_event(Event::Start(start)).map_err(write_error)?;
                let text = options.binary_codec.encode(&data);
                writer.write_event(Event::Text(BytesText::new(&text))).map_err(write_error)?;
                writer
                    .write_event(Event::End(BytesEnd::new(name.as_str())))
                    .map_err(write_error)?;
            }
        }
        _ => {
            let text = scalar_text(element)?;
            writer.write_event(Event::Start(start)).map_err(write_error)?;
            writer.write_event(Event::Text(BytesText::new(&text))).map_err(write_error)?;
            writer.write_event(Event::End(BytesEnd::new(name.as_str()))).map_err(write_error)?;
        }
    }
    Ok(())
}

fn scalar_text(element: &Element) -> Result<String> {
    let text = match element.value()? {
        Value::Uint(v) => v.to_string(),
        Value::Int(v) => v.to_string(),
        Value::Float(v) => v.to_string(),
        Value::Ascii(v) | Value::Utf8(v) => v,
        Value::Date(v) => v
            .format(&Iso8601::DEFAULT)
            .map_err(|_| Error::DecodeError("unformattable date value"))?,
        Value::Binary(_) | Value::Master(_) => {
            return decode_error("scalar rendering of a non-scalar value");
        }
    };
    Ok(text)
}

/// Encodes an XML rendering back into EBML bytes against `schema`.
///
/// A `<Document>` root wraps the EBML roots; any other root tag is treated
/// as a single root element. Informational attributes (`offset`, `size`,
/// `type`, `id`) on input are ignored; the `encoding` attribute selects the
/// binary body codec per element.
pub fn xml_to_ebml(xml: &str, schema: &Schema) -> Result<Vec<u8>> {
    let doc = roxmltree::Document::parse(xml)
        .map_err(|err| SchemaError::Malformed(format!("xml input: {}", err)))?;
    let root = doc.root_element();

    let mut out = Vec::new();
    if root.tag_name().name() == "Document" {
        for node in root.children().filter(|n| n.is_element()) {
            let (name, dump) = node_to_dump(node, schema)?;
            out.extend(schema.encode_element(&name, &dump)?);
        }
    }
    else {
        let (name, dump) = node_to_dump(root, schema)?;
        out.extend(schema.encode_element(&name, &dump)?);
    }
    Ok(out)
}

fn node_to_dump(node: roxmltree::Node<'_, '_>, schema: &Schema) -> Result<(String, Dump)> {
    let name = node.tag_name().name().to_string();
    let etype = schema.get_name(&name).ok_or_else(|| {
        Error::Schema(SchemaError::Malformed(format!("element not in schema: {}", name)))
    })?;

    let text = node.text().unwrap_or("").trim();

    let dump = match etype.kind {
        ElementKind::Master => {
            let mut children = Vec::new();
            for child in node.children().filter(|n| n.is_element()) {
                children.push(node_to_dump(child, schema)?);
            }
            Dump::Master(children)
        }
        ElementKind::Uint => Dump::Uint(parse_number(text, 0u64)?),
        ElementKind::Int => Dump::Int(parse_number(text, 0i64)?),
        ElementKind::Float => Dump::Float(parse_number(text, 0f64)?),
        ElementKind::Ascii => Dump::Ascii(text.to_string()),
        ElementKind::Utf8 => Dump::Utf8(text.to_string()),
        ElementKind::Date => {
            if text.is_empty() {
                Dump::Date(codec::DATE_EPOCH)
            }
            else {
                let date = OffsetDateTime::parse(text, &Iso8601::DEFAULT)
                    .map_err(|_| Error::DecodeError("unparseable date text"))?;
                Dump::Date(date)
            }
        }
        ElementKind::Binary | ElementKind::Unknown => {
            let binary_codec = match node.attribute("encoding") {
                Some(name) => BinaryCodec::from_name(name)
                    .ok_or(Error::DecodeError("unknown binary encoding name"))?,
                None => BinaryCodec::default(),
            };
            Dump::Binary(binary_codec.decode(text)?)
        }
        ElementKind::Void => {
            // A void payload is reconstructed from its size attribute.
            let size = match node.attribute("size") {
                Some(size) => size
                    .trim()
                    .parse::<usize>()
                    .map_err(|_| Error::DecodeError("unparseable void size attribute"))?,
                None => 0,
            };
            Dump::Binary(vec![0xFF; size])
        }
    };

    Ok((name, dump))
}

fn parse_number<T: std::str::FromStr>(text: &str, zero: T) -> Result<T> {
    if text.is_empty() {
        return Ok(zero);
    }
    text.parse::<T>().map_err(|_| Error::DecodeError("unparseable numeric payload text"))
}
