// ebmlkit
// Copyright (c) 2026 The ebmlkit Developers.
//
// This Source Code Form is subject to the terms of the MIT License. If a copy
// of the MIT License was not distributed with this file, you can obtain one at
// https://opensource.org/license/mit/.

//! The `document` module implements the root container over a byte source.
//!
//! On construction the document sniffs the first element: when it is the
//! `EBML` header its contents are dumped into [`Document::info`]. The header
//! stays visible as a root element by default; an option hides it so
//! iteration starts at the first body element. A bad first element does not
//! fail construction; the failure is deferred to actual traversal.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::io::{Seek, SeekFrom};
use std::path::Path;
use std::rc::Rc;
use std::sync::Arc;

use ebmlkit_core::errors::{Error, Result};
use ebmlkit_core::io::MediaSource;

use crate::element::{Dump, Element, SharedSource};
use crate::schema::Schema;

/// Construction options for a [`Document`].
#[derive(Copy, Clone, Debug, Default)]
pub struct DocumentOptions {
    /// Hide the EBML header: iteration starts past it instead of yielding it
    /// as the first root element.
    pub hide_headers: bool,
}

/// An EBML document: the root container over a seekable byte source.
///
/// The document shares one read cursor among its elements; it is
/// single-threaded by design. Concurrent traversal of the same file is done
/// by giving each thread its own `Document` over a
/// [`SharedFile`](ebmlkit_core::io::SharedFile). The source is dropped with
/// the document only when the document opened it (the path constructor);
/// sources handed in by the caller are shared and outlive it.
pub struct Document {
    schema: Arc<Schema>,
    source: SharedSource,
    name: Option<String>,
    offset: u64,
    payload_offset: u64,
    info: HashMap<String, Dump>,
}

impl Document {
    /// Opens the file at `path` and parses it against `schema`.
    pub fn open<P: AsRef<Path>>(schema: Arc<Schema>, path: P) -> Result<Document> {
        Document::open_with(schema, path, DocumentOptions::default())
    }

    pub fn open_with<P: AsRef<Path>>(
        schema: Arc<Schema>,
        path: P,
        options: DocumentOptions,
    ) -> Result<Document> {
        let name = path.as_ref().to_string_lossy().into_owned();
        let file = fs::File::open(path)?;
        Document::from_source_with(schema, Box::new(file), Some(name), options)
    }

    /// Parses an in-memory buffer against `schema`.
    pub fn loads(schema: Arc<Schema>, bytes: &[u8]) -> Result<Document> {
        Document::loads_with(schema, bytes, DocumentOptions::default())
    }

    pub fn loads_with(
        schema: Arc<Schema>,
        bytes: &[u8],
        options: DocumentOptions,
    ) -> Result<Document> {
        let cursor = std::io::Cursor::new(bytes.to_vec());
        Document::from_source_with(schema, Box::new(cursor), None, options)
    }

    /// Parses an existing byte source against `schema`. The document begins
    /// at the source's current position.
    pub fn from_source(
        schema: Arc<Schema>,
        source: Box<dyn MediaSource>,
        name: Option<String>,
    ) -> Result<Document> {
        Document::from_source_with(schema, source, name, DocumentOptions::default())
    }

    pub fn from_source_with(
        schema: Arc<Schema>,
        mut source: Box<dyn MediaSource>,
        name: Option<String>,
        options: DocumentOptions,
    ) -> Result<Document> {
        let offset = source.stream_position()?;
        let source: SharedSource = Rc::new(RefCell::new(source));

        let mut doc = Document {
            schema,
            source,
            name,
            offset,
            payload_offset: offset,
            info: HashMap::new(),
        };

        // Sniff the first element. When it is the EBML header, decode it into
        // `info`; when asked, advance the payload offset past it so iteration
        // starts at the next root element. A bad first element is not an
        // error here; traversal will surface it.
        match Element::parse_at(&doc.schema, &doc.source, offset, true) {
            Ok((first, next)) => {
                if first.name() == "EBML" {
                    if let Ok(Dump::Master(fields)) = first.dump() {
                        doc.info.extend(fields);
                    }
                    if options.hide_headers {
                        match next {
                            Some(next) => doc.payload_offset = next,
                            None => {
                                if let Ok(end) = first.end_offset() {
                                    doc.payload_offset = end;
                                }
                            }
                        }
                    }
                }
            }
            Err(err) => {
                log::debug!("deferring bad first element: {}", err);
            }
        }

        Ok(doc)
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// The file name this document was opened from, if any.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The decoded EBML header fields (DocType, DocTypeVersion, ...), empty
    /// when the document does not begin with an EBML header.
    pub fn info(&self) -> &HashMap<String, Dump> {
        &self.info
    }

    /// Offset of the document start in the source.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Offset where root-element iteration begins.
    pub fn payload_offset(&self) -> u64 {
        self.payload_offset
    }

    pub(crate) fn source(&self) -> &SharedSource {
        &self.source
    }

    /// Iterates the root elements in file order.
    pub fn iter(&self) -> Roots {
        Roots { doc: self, next_offset: self.payload_offset, nocache: false, done: false }
    }

    /// Like [`iter`](Document::iter), but parsed elements skip precaching.
    pub fn iter_nocache(&self) -> Roots {
        Roots { doc: self, next_offset: self.payload_offset, nocache: true, done: false }
    }

    /// The root element at `index`, walking from the start. Slicing is not
    /// supported; walk the iterator for ranges.
    pub fn get(&self, index: usize) -> Result<Option<Element>> {
        for (i, root) in self.iter().enumerate() {
            let root = root?;
            if i == index {
                return Ok(Some(root));
            }
        }
        Ok(None)
    }

    /// Counts the root elements without caching payload values.
    pub fn len(&self) -> Result<usize> {
        let mut count = 0;
        for root in self.iter_nocache() {
            root?;
            count += 1;
        }
        Ok(count)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Rewinds the shared cursor to the document start.
    pub fn rewind(&self) -> Result<()> {
        self.source.borrow_mut().seek(SeekFrom::Start(self.offset))?;
        Ok(())
    }
}

impl<'a> IntoIterator for &'a Document {
    type Item = Result<Element>;
    type IntoIter = Roots<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over the root elements of a document.
pub struct Roots<'a> {
    doc: &'a Document,
    next_offset: u64,
    nocache: bool,
    done: bool,
}

impl Iterator for Roots<'_> {
    type Item = Result<Element>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let parsed =
            Element::parse_at(&self.doc.schema, &self.doc.source, self.next_offset, self.nocache);

        let (root, next) = match parsed {
            Ok(parsed) => parsed,
            // Running out of bytes between root elements is the normal end
            // of the document.
            Err(Error::EndOfSource) => {
                self.done = true;
                return None;
            }
            Err(err) => {
                self.done = true;
                return Some(Err(err));
            }
        };

        self.next_offset = match next {
            Some(next) => next,
            None => match root.end_offset() {
                Ok(end) => end,
                Err(err) => {
                    self.done = true;
                    return Some(Err(err));
                }
            },
        };

        Some(Ok(root))
    }
}
