// ebmlkit
// Copyright (c) 2026 The ebmlkit Developers.
//
// This Source Code Form is subject to the terms of the MIT License. If a copy
// of the MIT License was not distributed with this file, you can obtain one at
// https://opensource.org/license/mit/.

pub mod document;
pub mod element;
pub mod schema;
pub mod util;
pub mod xml;

pub use crate::document::{Document, DocumentOptions};
pub use crate::element::{Dump, Element, Value};
pub use crate::schema::{list_schemata, load_schema, ElementKind, Schema, SchemaRegistry};
pub use crate::util::{pprint, verify};
pub use crate::xml::{to_xml, xml_to_ebml, BinaryCodec, XmlOptions};
