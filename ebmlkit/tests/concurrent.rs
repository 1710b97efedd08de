// ebmlkit
// Copyright (c) 2026 The ebmlkit Developers.
//
// This Source Code Form is subject to the terms of the MIT License. If a copy
// of the MIT License was not distributed with this file, you can obtain one at
// https://opensource.org/license/mit/.

//! Concurrent read-only traversal: one shared file, one document per
//! thread, each over its own cursor.

use std::sync::Arc;
use std::thread;

use ebmlkit::{load_schema, Document, Dump, Schema};
use ebmlkit_core::io::SharedFile;

fn fixture(schema: &Schema) -> std::path::PathBuf {
    let segment = |timecode: u64| {
        Dump::Master(vec![(
            "Cluster".to_string(),
            Dump::Master(vec![("Timecode".to_string(), Dump::Uint(timecode))]),
        )])
    };
    let mut bytes = schema
        .encode(&[(
            "EBML".to_string(),
            Dump::Master(vec![("DocType".to_string(), Dump::Ascii("matroska".into()))]),
        )])
        .unwrap();
    for timecode in [11, 22, 33] {
        bytes.extend(schema.encode(&[("Segment".to_string(), segment(timecode))]).unwrap());
    }

    let mut path = std::env::temp_dir();
    path.push("ebmlkit-concurrent-fixture.mkv");
    std::fs::write(&path, bytes).unwrap();
    path
}

/// Collects every Cluster timecode in the document, by walking it from the
/// start.
fn timecodes(doc: &Document) -> Vec<u64> {
    let mut found = Vec::new();
    for root in doc.iter() {
        let root = root.unwrap();
        if root.id() != 0x18538067 {
            continue;
        }
        for cluster in root.iter() {
            for field in cluster.unwrap().iter() {
                let field = field.unwrap();
                if field.id() == 0xE7 {
                    found.push(field.value().unwrap().as_uint().unwrap());
                }
            }
        }
    }
    found
}

#[test]
fn interleaved_readers_do_not_disturb_each_other() {
    let schema = load_schema("matroska.xml").unwrap();
    let path = fixture(&schema);
    let shared = Arc::new(SharedFile::open(&path).unwrap());

    let mut workers = Vec::new();
    for _ in 0..4 {
        let shared = Arc::clone(&shared);
        let schema = Arc::clone(&schema);
        workers.push(thread::spawn(move || {
            // Each worker gets its own document over its own cursor, and
            // walks it several times; any cross-thread cursor interference
            // would scramble the observed offsets and values.
            let doc =
                Document::from_source(schema, Box::new(shared.reader()), None).unwrap();
            for _ in 0..8 {
                assert_eq!(timecodes(&doc), [11, 22, 33]);
            }
            shared.close();
        }));
    }

    for worker in workers {
        worker.join().unwrap();
    }

    // The workers closed their own cursors; the cursor opened by this
    // thread at `open` is untouched until closed here.
    assert!(!shared.is_closed());
    shared.close();
    assert!(shared.is_closed());

    // A fresh document reopens a cursor for this thread.
    let doc = Document::from_source(
        load_schema("matroska.xml").unwrap(),
        Box::new(shared.reader()),
        None,
    )
    .unwrap();
    assert_eq!(timecodes(&doc), [11, 22, 33]);
}
