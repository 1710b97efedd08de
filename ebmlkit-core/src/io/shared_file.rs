// ebmlkit
// Copyright (c) 2026 The ebmlkit Developers.
//
// This Source Code Form is subject to the terms of the MIT License. If a copy
// of the MIT License was not distributed with this file, you can obtain one at
// https://opensource.org/license/mit/.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, ThreadId};
use std::time::Duration;

use crate::io::MediaSource;

/// Default bound on housekeeping waits.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// A manual-reset event. Housekeeping operations clear it for their critical
/// section; everything else waits on it with a bounded timeout.
struct Event {
    state: Mutex<bool>,
    cond: Condvar,
}

impl Event {
    fn new() -> Self {
        Event { state: Mutex::new(true), cond: Condvar::new() }
    }

    fn set(&self) {
        *self.state.lock().unwrap() = true;
        self.cond.notify_all();
    }

    fn clear(&self) {
        *self.state.lock().unwrap() = false;
    }

    /// Waits until the event is set or the timeout elapses. Returns false on
    /// timeout.
    fn wait(&self, timeout: Duration) -> bool {
        let mut set = self.state.lock().unwrap();
        while !*set {
            let (guard, result) = self.cond.wait_timeout(set, timeout).unwrap();
            set = guard;
            if result.timed_out() {
                return *set;
            }
        }
        true
    }
}

/// Per-thread slot. A `None` file means the cursor was closed.
struct Cursor {
    file: Option<fs::File>,
}

/// A read-only file that hands each thread its own independent cursor.
///
/// Every thread touching the file gets a private handle to the underlying
/// path, opened on first access, so it can seek without affecting other
/// threads reading the same file. Reads and seeks never contend with each
/// other; a housekeeping event guards only [`close_all`](SharedFile::close_all)
/// and [`cleanup`](SharedFile::cleanup). Waiting on that event is bounded by
/// the configured timeout; exceeding the bound is logged and operation
/// continues.
pub struct SharedFile {
    path: PathBuf,
    timeout: Duration,
    ready: Event,
    cursors: Mutex<HashMap<ThreadId, Arc<Mutex<Cursor>>>>,
}

impl SharedFile {
    /// Opens `path` read-only for shared use. The calling thread's cursor is
    /// opened eagerly so open errors surface here rather than at first read.
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<SharedFile> {
        SharedFile::with_timeout(path, DEFAULT_TIMEOUT)
    }

    /// Like [`open`](SharedFile::open), with a custom housekeeping timeout.
    pub fn with_timeout<P: AsRef<Path>>(path: P, timeout: Duration) -> io::Result<SharedFile> {
        let shared = SharedFile {
            path: path.as_ref().to_path_buf(),
            timeout,
            ready: Event::new(),
            cursors: Mutex::new(HashMap::new()),
        };
        shared.cursor()?;
        Ok(shared)
    }

    /// The path this file was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Gets (or opens) the cursor for the current thread.
    fn cursor(&self) -> io::Result<Arc<Mutex<Cursor>>> {
        if !self.ready.wait(self.timeout) {
            log::warn!("shared file: housekeeping event wait timed out; continuing");
        }

        let mut cursors = self.cursors.lock().unwrap();
        let ident = thread::current().id();
        if let Some(cursor) = cursors.get(&ident) {
            return Ok(Arc::clone(cursor));
        }

        // First access from this thread. Open the file.
        let file = fs::File::open(&self.path)?;
        let cursor = Arc::new(Mutex::new(Cursor { file: Some(file) }));
        cursors.insert(ident, Arc::clone(&cursor));
        Ok(cursor)
    }

    /// Is the file closed for the current thread? A thread that never
    /// accessed the file sees `true`.
    pub fn is_closed(&self) -> bool {
        let cursors = self.cursors.lock().unwrap();
        match cursors.get(&thread::current().id()) {
            Some(cursor) => cursor.lock().unwrap().file.is_none(),
            None => true,
        }
    }

    /// Closes the file for the current thread and sweeps cursors other
    /// threads have already closed. The file remains open for other threads.
    pub fn close(&self) {
        if let Some(cursor) = {
            let cursors = self.cursors.lock().unwrap();
            cursors.get(&thread::current().id()).cloned()
        } {
            cursor.lock().unwrap().file = None;
        }
        self.cleanup();
    }

    /// Closes every open cursor.
    pub fn close_all(&self) {
        if !self.ready.wait(self.timeout) {
            log::warn!("shared file: close_all timed out waiting for housekeeping; continuing");
        }
        self.ready.clear();
        {
            let cursors = self.cursors.lock().unwrap();
            for cursor in cursors.values() {
                cursor.lock().unwrap().file = None;
            }
        }
        self.ready.set();
    }

    /// Drops the slots of cursors that have been closed. A swept thread that
    /// touches the file again simply reopens it.
    pub fn cleanup(&self) {
        if !self.ready.wait(self.timeout) {
            log::warn!("shared file: cleanup timed out waiting for housekeeping; continuing");
        }
        self.ready.clear();
        {
            let mut cursors = self.cursors.lock().unwrap();
            cursors.retain(|_, cursor| cursor.lock().unwrap().file.is_some());
        }
        self.ready.set();
    }

    /// Returns a reader over the calling thread's cursor.
    pub fn reader(self: &Arc<Self>) -> SharedFileReader {
        SharedFileReader { shared: Arc::clone(self) }
    }
}

fn closed_error() -> io::Error {
    io::Error::new(io::ErrorKind::Other, "shared file is closed for this thread")
}

/// A [`MediaSource`] view of a [`SharedFile`] bound to whichever thread is
/// performing the call.
pub struct SharedFileReader {
    shared: Arc<SharedFile>,
}

impl SharedFileReader {
    fn with_file<T>(&self, op: impl FnOnce(&mut fs::File) -> io::Result<T>) -> io::Result<T> {
        let cursor = self.shared.cursor()?;
        let mut cursor = cursor.lock().unwrap();
        match cursor.file.as_mut() {
            Some(file) => op(file),
            None => Err(closed_error()),
        }
    }
}

impl io::Read for SharedFileReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.with_file(|file| file.read(buf))
    }
}

impl io::Seek for SharedFileReader {
    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
        self.with_file(|file| file.seek(pos))
    }
}

impl MediaSource for SharedFileReader {
    fn is_seekable(&self) -> bool {
        true
    }

    fn byte_len(&self) -> Option<u64> {
        match fs::metadata(&self.shared.path) {
            Ok(metadata) => Some(metadata.len()),
            _ => None,
        }
    }
}
