// ebmlkit
// Copyright (c) 2026 The ebmlkit Developers.
//
// This Source Code Form is subject to the terms of the MIT License. If a copy
// of the MIT License was not distributed with this file, you can obtain one at
// https://opensource.org/license/mit/.

//! Small utilities over parsed documents: a tree pretty-printer and a full
//! verification walk.

use std::io::Write;

use ebmlkit_core::errors::{Error, Result};

use crate::document::Document;
use crate::element::{Element, Value};
use crate::schema::ElementKind;

/// Pretty-prints the element tree of a document.
pub fn pprint<W: Write>(doc: &Document, out: &mut W) -> Result<()> {
    writeln!(out, "Document (schema {})", doc.schema().name())?;
    for root in doc.iter() {
        pprint_element(&root?, 1, out)?;
    }
    Ok(())
}

fn pprint_element<W: Write>(element: &Element, depth: usize, out: &mut W) -> Result<()> {
    let indent = "    ".repeat(depth);
    match element.value()? {
        Value::Master(children) => {
            writeln!(
                out,
                "{}{} (ID 0x{:X}): {} subelements",
                indent,
                element.name(),
                element.id(),
                children.len()
            )?;
            for child in &children {
                pprint_element(child, depth + 1, out)?;
            }
        }
        Value::Binary(data) => {
            writeln!(
                out,
                "{}{} (ID 0x{:X}): {} bytes",
                indent,
                element.name(),
                element.id(),
                data.len()
            )?;
        }
        Value::Uint(v) => print_scalar(element, &indent, v, out)?,
        Value::Int(v) => print_scalar(element, &indent, v, out)?,
        Value::Float(v) => print_scalar(element, &indent, v, out)?,
        Value::Date(v) => print_scalar(element, &indent, v, out)?,
        Value::Ascii(v) | Value::Utf8(v) => {
            writeln!(out, "{}{} (ID 0x{:X}): {:?}", indent, element.name(), element.id(), v)?;
        }
    }
    Ok(())
}

fn print_scalar<W: Write, V: std::fmt::Display>(
    element: &Element,
    indent: &str,
    value: V,
    out: &mut W,
) -> Result<()> {
    writeln!(out, "{}{} (ID 0x{:X}): {}", indent, element.name(), element.id(), value)?;
    Ok(())
}

/// Walks the whole document, decoding every payload. Any element absent from
/// the schema, or any payload that fails to decode, fails verification.
pub fn verify(doc: &Document) -> Result<()> {
    for root in doc.iter_nocache() {
        let root = root.map_err(verification_error)?;
        verify_element(&root)?;
    }
    Ok(())
}

fn verify_element(element: &Element) -> Result<()> {
    if element.kind() == ElementKind::Unknown {
        return Err(Error::VerificationFailed(format!(
            "unknown element id 0x{:X} at offset {}",
            element.id(),
            element.offset()
        )));
    }

    if element.kind() == ElementKind::Master {
        for child in element.iter_nocache() {
            let child = child.map_err(verification_error)?;
            verify_element(&child)?;
        }
        return Ok(());
    }

    element.value().map_err(verification_error)?;
    Ok(())
}

fn verification_error(err: Error) -> Error {
    match err {
        Error::VerificationFailed(_) => err,
        other => Error::VerificationFailed(other.to_string()),
    }
}
