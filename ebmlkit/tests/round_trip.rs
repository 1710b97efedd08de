// ebmlkit
// Copyright (c) 2026 The ebmlkit Developers.
//
// This Source Code Form is subject to the terms of the MIT License. If a copy
// of the MIT License was not distributed with this file, you can obtain one at
// https://opensource.org/license/mit/.

//! End-to-end scenarios over the public API: encode and reparse, XML in and
//! out, legacy schema loading, and verification of foreign documents.

use std::sync::Arc;

use ebmlkit::{
    load_schema, pprint, to_xml, verify, xml_to_ebml, BinaryCodec, Document, Dump, ElementKind,
    Schema, XmlOptions,
};
use ebmlkit_core::errors::Error;

#[test]
fn encode_then_reparse_yields_the_same_header() {
    let schema = load_schema("matroska.xml").unwrap();

    let header = Dump::Master(vec![
        ("DocType".to_string(), Dump::Ascii("matroska".to_string())),
        ("DocTypeVersion".to_string(), Dump::Uint(4)),
    ]);
    let bytes = schema.encode(&[("EBML".to_string(), header)]).unwrap();

    let doc = Document::loads(Arc::clone(&schema), &bytes).unwrap();
    assert_eq!(doc.info()["DocType"], Dump::Ascii("matroska".to_string()));
    assert_eq!(doc.info()["DocTypeVersion"], Dump::Uint(4));
}

#[test]
fn xml_round_trip() {
    let schema = load_schema("matroska.xml").unwrap();

    let header = Dump::Master(vec![
        ("DocType".to_string(), Dump::Ascii("webm".to_string())),
        ("DocTypeVersion".to_string(), Dump::Uint(2)),
    ]);
    let segment = Dump::Master(vec![(
        "Info".to_string(),
        Dump::Master(vec![
            ("TimecodeScale".to_string(), Dump::Uint(1_000_000)),
            ("MuxingApp".to_string(), Dump::Utf8("ebmlkit".to_string())),
        ]),
    )]);
    let bytes = schema
        .encode(&[("EBML".to_string(), header), ("Segment".to_string(), segment)])
        .unwrap();

    let doc = Document::loads(Arc::clone(&schema), &bytes).unwrap();
    let xml = to_xml(&doc, &XmlOptions::default()).unwrap();
    assert!(xml.contains("<DocType"));
    assert!(xml.contains("webm"));

    // Back to EBML: byte-identical, because every payload re-encodes at the
    // minimum length it was written with.
    let rebuilt = xml_to_ebml(&xml, &schema).unwrap();
    assert_eq!(rebuilt, bytes);
}

#[test]
fn xml_hex_codec_round_trip() {
    let schema = load_schema("matroska.xml").unwrap();

    let segment = Dump::Master(vec![(
        "Cluster".to_string(),
        Dump::Master(vec![
            ("Timecode".to_string(), Dump::Uint(0)),
            ("SimpleBlock".to_string(), Dump::Binary((0u8..64).collect())),
        ]),
    )]);
    let bytes = schema.encode(&[("Segment".to_string(), segment)]).unwrap();

    let doc = Document::loads(Arc::clone(&schema), &bytes).unwrap();
    let options = XmlOptions { binary_codec: BinaryCodec::Hex, ..XmlOptions::default() };
    let xml = to_xml(&doc, &options).unwrap();

    let rebuilt = xml_to_ebml(&xml, &schema).unwrap();
    assert_eq!(rebuilt, bytes);
}

#[test]
fn legacy_schema_types_map_to_kinds() {
    let xml = r#"
        <table>
            <element name="Root" id="0x1A45DFA3" type="master" level="0"/>
            <element name="Counter" id="0x4286" type="uinteger" level="1"/>
            <element name="Offset" id="0x4287" type="integer" level="1"/>
            <element name="Ratio" id="0x4288" type="float" level="1"/>
            <element name="Note" id="0x4289" type="utf-8" level="1"/>
            <element name="Blob" id="0x428A" type="binary" level="1"/>
        </table>
    "#;
    let schema = Schema::parse(xml, "legacy").unwrap();

    assert_eq!(schema.get_name("Counter").unwrap().kind, ElementKind::Uint);
    assert_eq!(schema.get_name("Offset").unwrap().kind, ElementKind::Int);
    assert_eq!(schema.get_name("Ratio").unwrap().kind, ElementKind::Float);
    assert_eq!(schema.get_name("Note").unwrap().kind, ElementKind::Utf8);
    assert_eq!(schema.get_name("Blob").unwrap().kind, ElementKind::Binary);
    assert_eq!(schema.get_name("Root").unwrap().kind, ElementKind::Master);
}

#[test]
fn unknown_element_fails_verification() {
    let schema = load_schema("matroska.xml").unwrap();

    // A root element whose id (0x6542) the schema does not know.
    let mut bytes = schema
        .encode(&[(
            "EBML".to_string(),
            Dump::Master(vec![("DocType".to_string(), Dump::Ascii("matroska".into()))]),
        )])
        .unwrap();
    bytes.extend_from_slice(&[0x65, 0x42, 0x81, 0xAA]);

    let doc = Document::loads(Arc::clone(&schema), &bytes).unwrap();

    // Parsing is tolerant: the unknown element is synthesized, not refused.
    let roots: Vec<_> = doc.iter().map(|el| el.unwrap()).collect();
    assert_eq!(roots.len(), 2);
    assert_eq!(roots[1].kind(), ElementKind::Unknown);
    assert_eq!(roots[1].id(), 0x6542);

    // Verification is not.
    match verify(&doc) {
        Err(Error::VerificationFailed(msg)) => assert!(msg.contains("0x6542")),
        other => panic!("expected verification failure, got {:?}", other),
    }
}

#[test]
fn verify_accepts_a_clean_document() {
    let schema = load_schema("matroska.xml").unwrap();
    let bytes = schema
        .encode(&[(
            "EBML".to_string(),
            Dump::Master(vec![("DocType".to_string(), Dump::Ascii("matroska".into()))]),
        )])
        .unwrap();
    let doc = Document::loads(schema, &bytes).unwrap();
    verify(&doc).unwrap();
}

#[test]
fn pprint_renders_the_tree() {
    let schema = load_schema("matroska.xml").unwrap();
    let bytes = schema
        .encode(&[(
            "EBML".to_string(),
            Dump::Master(vec![
                ("DocType".to_string(), Dump::Ascii("matroska".into())),
                ("DocTypeVersion".to_string(), Dump::Uint(4)),
            ]),
        )])
        .unwrap();
    let doc = Document::loads(schema, &bytes).unwrap();

    let mut out = Vec::new();
    pprint(&doc, &mut out).unwrap();
    let text = String::from_utf8(out).unwrap();
    assert!(text.contains("EBML (ID 0x1A45DFA3): 2 subelements"));
    assert!(text.contains("DocType (ID 0x4282): \"matroska\""));
}

#[test]
fn nested_simple_tags_parse() {
    let schema = load_schema("matroska.xml").unwrap();

    // SimpleTag is declared inside itself; a nested tag must parse as a
    // child of its parent tag.
    let inner = Dump::Master(vec![("TagName".to_string(), Dump::Utf8("INNER".into()))]);
    let outer = Dump::Master(vec![
        ("TagName".to_string(), Dump::Utf8("OUTER".into())),
        ("SimpleTag".to_string(), inner),
    ]);
    let tags = Dump::Master(vec![(
        "Tag".to_string(),
        Dump::Master(vec![("SimpleTag".to_string(), outer)]),
    )]);
    let segment = Dump::Master(vec![("Tags".to_string(), tags)]);
    let bytes = schema.encode(&[("Segment".to_string(), segment)]).unwrap();

    let doc = Document::loads(Arc::clone(&schema), &bytes).unwrap();
    let segment = doc.get(0).unwrap().unwrap();
    let dump = segment.dump().unwrap();

    let Dump::Master(children) = &dump else { panic!("segment should be a master") };
    let (_, tags) = &children[0];
    let Dump::Master(tags) = tags else { panic!() };
    let (_, tag) = &tags[0];
    let Dump::Master(tag) = tag else { panic!() };
    let (_, simple_tag) = &tag[0];
    let Dump::Master(simple_tag) = simple_tag else { panic!() };
    assert_eq!(simple_tag[0].1, Dump::Utf8("OUTER".into()));
    assert_eq!(simple_tag[1].0, "SimpleTag");
}
