// ebmlkit
// Copyright (c) 2026 The ebmlkit Developers.
//
// This Source Code Form is subject to the terms of the MIT License. If a copy
// of the MIT License was not distributed with this file, you can obtain one at
// https://opensource.org/license/mit/.

//! The `fragment` module post-processes a delivered MKV fragment DOM:
//! tag extraction, SimpleBlock enumeration, and raw audio-track access.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;

use ebmlkit::{pprint, Document, Element, Value};
use ebmlkit_core::errors::{decode_error, unsupported_error, Result};

const SEGMENT_ID: u32 = 0x18538067;
const CLUSTER_ID: u32 = 0x1F43B675;
const SIMPLE_BLOCK_ID: u32 = 0xA3;
const TAGS_ID: u32 = 0x1254C367;
const TAG_ID: u32 = 0x7373;
const SIMPLE_TAG_ID: u32 = 0x67C8;
const TAG_NAME_ID: u32 = 0x45A3;
const TAG_STRING_ID: u32 = 0x4487;
const TAG_BINARY_ID: u32 = 0x4485;
const TRACKS_ID: u32 = 0x1654AE6B;
const TRACK_ENTRY_ID: u32 = 0xAE;
const TRACK_NAME_ID: u32 = 0x536E;
const TRACK_NUMBER_ID: u32 = 0xD7;

/// A SimpleBlock payload leads with a one-octet track-number VINT, two bytes
/// of timecode, and one byte of flags; codec data follows.
const SIMPLE_BLOCK_HEADER_LEN: usize = 4;

/// The value of one SimpleTag.
#[derive(Clone, Debug, PartialEq)]
pub enum TagValue {
    String(String),
    Binary(Vec<u8>),
}

/// The `Segment` root element of a fragment, required by every helper here.
fn segment_of(doc: &Document) -> Result<Element> {
    for root in doc.iter_nocache() {
        let root = root?;
        if root.id() == SEGMENT_ID {
            return Ok(root);
        }
    }
    decode_error("fragment has no segment element")
}

/// Children of `parent` with the given ID.
fn children_with_id(parent: &Element, id: u32) -> Result<Vec<Element>> {
    let mut found = Vec::new();
    for child in parent.iter() {
        let child = child?;
        if child.id() == id {
            found.push(child);
        }
    }
    Ok(found)
}

/// Extracts the SimpleTag mapping of a fragment:
/// `Segment → Tags → Tag → SimpleTag`, each contributing
/// `TagName → TagString | TagBinary`.
pub fn fragment_tags(doc: &Document) -> Result<HashMap<String, TagValue>> {
    let segment = segment_of(doc)?;

    let mut tags = HashMap::new();
    for tags_element in children_with_id(&segment, TAGS_ID)? {
        for tag in children_with_id(&tags_element, TAG_ID)? {
            for simple_tag in children_with_id(&tag, SIMPLE_TAG_ID)? {
                let mut name = None;
                let mut value = None;
                for field in simple_tag.iter() {
                    let field = field?;
                    match field.id() {
                        TAG_NAME_ID => {
                            if let Some(text) = field.value()?.as_str() {
                                name = Some(text.to_string());
                            }
                        }
                        TAG_STRING_ID => {
                            if let Some(text) = field.value()?.as_str() {
                                value = Some(TagValue::String(text.to_string()));
                            }
                        }
                        TAG_BINARY_ID => {
                            if let Value::Binary(data) = field.value()? {
                                value = Some(TagValue::Binary(data.into_vec()));
                            }
                        }
                        _ => (),
                    }
                }
                if let (Some(name), Some(value)) = (name, value) {
                    tags.insert(name, value);
                }
            }
        }
    }
    Ok(tags)
}

/// Enumerates `Segment → Cluster → SimpleBlock` elements in file order.
pub fn simple_blocks(doc: &Document) -> Result<Vec<Element>> {
    let segment = segment_of(doc)?;
    let mut blocks = Vec::new();
    for cluster in children_with_id(&segment, CLUSTER_ID)? {
        blocks.extend(children_with_id(&cluster, SIMPLE_BLOCK_ID)?);
    }
    Ok(blocks)
}

/// The track number of a SimpleBlock.
///
/// Only a one-octet track-number VINT (marker bit set) is supported; a
/// multi-octet track number surfaces an explicit error rather than a silent
/// miscount.
pub fn simple_block_track(block: &Element) -> Result<u64> {
    let payload = match block.value()? {
        Value::Binary(payload) => payload,
        _ => return decode_error("simple block without a binary payload"),
    };
    let lead = match payload.first() {
        Some(lead) => *lead,
        None => return decode_error("empty simple block payload"),
    };
    if lead & 0x80 == 0 {
        return unsupported_error("kvs: multi-octet simple block track number");
    }
    // Clear the VINT marker.
    Ok(u64::from(lead & 0x7F))
}

/// The codec data of a SimpleBlock: everything past the track number,
/// timecode, and flags.
pub fn simple_block_payload(block: &Element) -> Result<Vec<u8>> {
    let payload = match block.value()? {
        Value::Binary(payload) => payload,
        _ => return decode_error("simple block without a binary payload"),
    };
    if payload.len() < SIMPLE_BLOCK_HEADER_LEN {
        return decode_error("simple block shorter than its header");
    }
    Ok(payload[SIMPLE_BLOCK_HEADER_LEN..].to_vec())
}

/// Looks up a track number by the track's `Name` element:
/// `Segment → Tracks → TrackEntry → (Name, TrackNumber)`.
pub fn track_number_by_name(doc: &Document, track_name: &str) -> Result<Option<u64>> {
    let segment = segment_of(doc)?;
    for tracks in children_with_id(&segment, TRACKS_ID)? {
        for entry in children_with_id(&tracks, TRACK_ENTRY_ID)? {
            let mut name = None;
            let mut number = None;
            for field in entry.iter() {
                let field = field?;
                match field.id() {
                    TRACK_NAME_ID => {
                        if let Some(text) = field.value()?.as_str() {
                            name = Some(text.to_string());
                        }
                    }
                    TRACK_NUMBER_ID => {
                        number = field.value()?.as_uint();
                    }
                    _ => (),
                }
            }
            if name.as_deref() == Some(track_name) {
                return Ok(number);
            }
        }
    }
    Ok(None)
}

/// Concatenates the raw codec data of every SimpleBlock belonging to
/// `track_number`, in file order.
pub fn track_bytes(doc: &Document, track_number: u64) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    for block in simple_blocks(doc)? {
        if simple_block_track(&block)? == track_number {
            bytes.extend(simple_block_payload(&block)?);
        }
    }
    Ok(bytes)
}

/// Saves fragment bytes as a stand-alone MKV file. Fragment bytes are
/// already a complete MKV document, so they go to disk verbatim.
pub fn save_fragment_as_mkv<P: AsRef<Path>>(bytes: &[u8], path: P) -> io::Result<()> {
    fs::write(path, bytes)
}

/// The pretty-printed element tree of a fragment DOM.
pub fn dom_pretty_string(doc: &Document) -> Result<String> {
    let mut out = Vec::new();
    pprint(doc, &mut out)?;
    Ok(String::from_utf8_lossy(&out).into_owned())
}
