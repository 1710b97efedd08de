// ebmlkit
// Copyright (c) 2026 The ebmlkit Developers.
//
// This Source Code Form is subject to the terms of the MIT License. If a copy
// of the MIT License was not distributed with this file, you can obtain one at
// https://opensource.org/license/mit/.

//! The `consumer` module segments an unframed byte stream into whole MKV
//! fragments.
//!
//! Chunks arrive with no particular alignment. They accumulate in a buffer
//! that is reparsed on every arrival; a fragment begins at an `EBML` master
//! element, so the arrival of a *second* `EBML` header at the top level of
//! the buffer proves the first fragment is complete between the two header
//! offsets. Completed fragments are sliced out, reparsed standalone, and
//! delivered to the sink in strict stream order. When the upstream iterator
//! runs dry, whatever is still buffered past the last boundary is flushed as
//! the final fragment.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use ebmlkit::Document;
use ebmlkit::Schema;
use ebmlkit_core::errors::{Error, Result};

/// ID of the `EBML` master element that begins every MKV fragment.
const EBML_HEADER_ID: u32 = 0x1A45DFA3;

/// A completed MKV fragment.
pub struct Fragment {
    /// Name of the stream the fragment was read from.
    pub stream_name: String,
    /// The fragment's bytes: a standalone, playable MKV document.
    pub bytes: Vec<u8>,
    /// The fragment parsed as a DOM over its own bytes.
    pub dom: Document,
    /// Wall-clock time spent receiving the fragment.
    pub duration: Duration,
}

/// Last-known-good progress, handed to the error sink so a caller can decide
/// whether to resume from a continuation token.
#[derive(Clone, Debug)]
pub struct FragmentContext {
    pub stream_name: String,
    /// Fragments delivered before the failure.
    pub fragments_delivered: u64,
    /// Bytes accumulated but not yet delivered.
    pub buffered_bytes: usize,
}

/// Receives segmenter events. Callbacks run on the segmenter's worker; a
/// sink that blocks indefinitely throttles ingestion.
pub trait FragmentSink: Send {
    /// A whole fragment arrived.
    fn on_fragment(&mut self, fragment: Fragment);

    /// The upstream iterator is exhausted. Not called after cancellation.
    fn on_complete(&mut self, stream_name: &str);

    /// Reading or parsing failed. Delivery stops after this call.
    fn on_error(&mut self, error: Error, context: &FragmentContext);
}

/// Cooperative cancellation handle for a running consumer.
///
/// The flag is checked at chunk boundaries: the chunk in flight finishes
/// parsing, then the worker exits without pulling further chunks and without
/// calling the completion sink.
#[derive(Clone)]
pub struct StopHandle {
    flag: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_stopped(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// Consumes an unframed chunk iterator and emits whole MKV fragments.
///
/// One consumer serves one stream. It owns its buffer; fragments are
/// delivered in order, and no fragment is delivered before all its bytes
/// are buffered.
pub struct FragmentConsumer<I, S> {
    stream_name: String,
    chunks: I,
    schema: Arc<Schema>,
    sink: S,
    cancel: Arc<AtomicBool>,
}

impl<I, S> FragmentConsumer<I, S>
where
    I: Iterator<Item = io::Result<Vec<u8>>>,
    S: FragmentSink,
{
    pub fn new(stream_name: &str, chunks: I, schema: Arc<Schema>, sink: S) -> Self {
        FragmentConsumer {
            stream_name: stream_name.to_string(),
            chunks,
            schema,
            sink,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A handle that requests a graceful exit at the next chunk boundary.
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle { flag: Arc::clone(&self.cancel) }
    }

    /// Runs the consume loop to completion on the calling thread.
    pub fn run(mut self) {
        let mut buffer: Vec<u8> = Vec::new();
        let mut read_start = Instant::now();
        let mut delivered = 0u64;

        loop {
            if self.cancel.load(Ordering::Relaxed) {
                log::info!("{}: consumer stopped", self.stream_name);
                return;
            }

            let chunk = match self.chunks.next() {
                None => break,
                Some(Ok(chunk)) => chunk,
                Some(Err(err)) => {
                    let context = self.context(delivered, buffer.len());
                    self.sink.on_error(Error::IoError(err), &context);
                    return;
                }
            };
            buffer.extend_from_slice(&chunk);

            // Deliver every fragment already whole in the buffer.
            loop {
                let offsets = match self.header_offsets(&buffer) {
                    Ok(offsets) => offsets,
                    Err(err) => {
                        let context = self.context(delivered, buffer.len());
                        self.sink.on_error(err, &context);
                        return;
                    }
                };
                if offsets.len() < 2 {
                    break;
                }

                let (first, second) = (offsets[0] as usize, offsets[1] as usize);
                if first != 0 {
                    // A well-aligned stream starts each buffer on a fragment
                    // boundary. Discard the leading stray bytes once and
                    // rescan.
                    log::warn!(
                        "{}: fragment boundary out of sync, discarding {} leading bytes",
                        self.stream_name,
                        first
                    );
                    buffer.drain(..first);
                    continue;
                }

                let bytes = buffer[..second].to_vec();
                let dom = match Document::loads(Arc::clone(&self.schema), &bytes) {
                    Ok(dom) => dom,
                    Err(err) => {
                        let context = self.context(delivered, buffer.len());
                        self.sink.on_error(err, &context);
                        return;
                    }
                };

                self.sink.on_fragment(Fragment {
                    stream_name: self.stream_name.clone(),
                    bytes,
                    dom,
                    duration: read_start.elapsed(),
                });
                delivered += 1;

                buffer.drain(..second);
                read_start = Instant::now();
            }
        }

        // Exhaustion: everything still buffered past the last boundary is
        // the final fragment. There is no second header left to prove it
        // complete, so it is flushed as-is.
        if !buffer.is_empty() {
            let offsets = match self.header_offsets(&buffer) {
                Ok(offsets) => offsets,
                Err(err) => {
                    let context = self.context(delivered, buffer.len());
                    self.sink.on_error(err, &context);
                    return;
                }
            };
            if let Some(&first) = offsets.first() {
                let first = first as usize;
                if first != 0 {
                    log::warn!(
                        "{}: final fragment out of sync, discarding {} leading bytes",
                        self.stream_name,
                        first
                    );
                    buffer.drain(..first);
                }
                match Document::loads(Arc::clone(&self.schema), &buffer) {
                    Ok(dom) => {
                        self.sink.on_fragment(Fragment {
                            stream_name: self.stream_name.clone(),
                            bytes: buffer,
                            dom,
                            duration: read_start.elapsed(),
                        });
                    }
                    Err(err) => {
                        let context = self.context(delivered, buffer.len());
                        self.sink.on_error(err, &context);
                        return;
                    }
                }
            }
        }

        self.sink.on_complete(&self.stream_name);
    }

    /// Offsets of top-level `EBML` header elements in the buffer, in order.
    ///
    /// The buffer tail is usually an incomplete element; running out of
    /// bytes there just ends the scan.
    fn header_offsets(&self, buffer: &[u8]) -> Result<Vec<u64>> {
        let doc = Document::loads(Arc::clone(&self.schema), buffer)?;
        let mut offsets = Vec::new();
        for root in doc.iter_nocache() {
            let root = root?;
            if root.id() == EBML_HEADER_ID {
                offsets.push(root.offset());
            }
        }
        Ok(offsets)
    }

    fn context(&self, delivered: u64, buffered: usize) -> FragmentContext {
        FragmentContext {
            stream_name: self.stream_name.clone(),
            fragments_delivered: delivered,
            buffered_bytes: buffered,
        }
    }
}

impl<I, S> FragmentConsumer<I, S>
where
    I: Iterator<Item = io::Result<Vec<u8>>> + Send + 'static,
    S: FragmentSink + 'static,
{
    /// Runs the consume loop on a worker thread.
    pub fn spawn(self) -> Result<thread::JoinHandle<()>> {
        let name = format!("kvs-consumer-{}", self.stream_name);
        thread::Builder::new().name(name).spawn(move || self.run()).map_err(Error::IoError)
    }
}
