// ebmlkit
// Copyright (c) 2026 The ebmlkit Developers.
//
// This Source Code Form is subject to the terms of the MIT License. If a copy
// of the MIT License was not distributed with this file, you can obtain one at
// https://opensource.org/license/mit/.

//! The `errors` module defines the common error type.

use std::error::Error as StdError;
use std::fmt;
use std::io;
use std::result;

/// Failure modes of schema loading. These carry owned strings because the
/// offending identifiers come out of caller-supplied XML.
#[derive(Debug)]
pub enum SchemaError {
    /// The schema XML could not be parsed, or its structure is not one of the
    /// accepted dialects.
    Malformed(String),
    /// An element declaration used a kind the loader does not know.
    UnknownKind(String),
    /// An element was re-declared with attributes differing from its first
    /// declaration.
    DuplicateWithDifferentAttributes(String),
    /// An element declaration is missing its `id` or `name` attribute.
    MissingIdOrName(String),
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaError::Malformed(msg) => {
                write!(f, "malformed schema: {}", msg)
            }
            SchemaError::UnknownKind(kind) => {
                write!(f, "unknown element kind: {}", kind)
            }
            SchemaError::DuplicateWithDifferentAttributes(name) => {
                write!(f, "conflicting re-declaration of element: {}", name)
            }
            SchemaError::MissingIdOrName(ctx) => {
                write!(f, "element declaration missing id or name: {}", ctx)
            }
        }
    }
}

/// `Error` provides an enumeration of all possible errors reported by ebmlkit.
#[derive(Debug)]
pub enum Error {
    /// The end of the byte source was reached. Benign when attempting to parse
    /// the next top-level element, fatal in the middle of a payload; the
    /// distinction is made by the caller, not the type.
    EndOfSource,
    /// An IO error occurred while reading or seeking the byte source.
    IoError(io::Error),
    /// An element ID VarInt declared a length outside 1..=4 octets.
    InvalidId(&'static str),
    /// A VarInt could not be decoded.
    MalformedVarInt(&'static str),
    /// A float payload had a size other than 0, 4, or 8 bytes.
    InvalidFloatSize(u64),
    /// A caller-supplied fixed encoding length is out of range for the codec.
    InvalidLength(&'static str),
    /// A caller-supplied fixed encoding length cannot hold the minimum
    /// encoding of the value.
    LengthTooSmall(&'static str),
    /// The payload contained malformed data and could not be decoded.
    DecodeError(&'static str),
    /// An unsupported stream feature was encountered.
    Unsupported(&'static str),
    /// The schema could not be loaded.
    Schema(SchemaError),
    /// A verification pass found an unknown element or an undecodable payload.
    VerificationFailed(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::EndOfSource => {
                write!(f, "end of source")
            }
            Error::IoError(err) => {
                write!(f, "io error: {}", err)
            }
            Error::InvalidId(msg) => {
                write!(f, "invalid element id: {}", msg)
            }
            Error::MalformedVarInt(msg) => {
                write!(f, "malformed varint: {}", msg)
            }
            Error::InvalidFloatSize(size) => {
                write!(f, "invalid float payload size: {}", size)
            }
            Error::InvalidLength(msg) => {
                write!(f, "invalid encoding length: {}", msg)
            }
            Error::LengthTooSmall(msg) => {
                write!(f, "encoding length too small: {}", msg)
            }
            Error::DecodeError(msg) => {
                write!(f, "malformed payload: {}", msg)
            }
            Error::Unsupported(feature) => {
                write!(f, "unsupported feature: {}", feature)
            }
            Error::Schema(err) => {
                write!(f, "schema error: {}", err)
            }
            Error::VerificationFailed(msg) => {
                write!(f, "verification failed: {}", msg)
            }
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::IoError(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        match err.kind() {
            io::ErrorKind::UnexpectedEof => Error::EndOfSource,
            _ => Error::IoError(err),
        }
    }
}

impl From<SchemaError> for Error {
    fn from(err: SchemaError) -> Error {
        Error::Schema(err)
    }
}

pub type Result<T> = result::Result<T, Error>;

/// Convenience function to create a decode error.
pub fn decode_error<T>(desc: &'static str) -> Result<T> {
    Err(Error::DecodeError(desc))
}

/// Convenience function to create an end-of-source error.
pub fn end_of_source_error<T>() -> Result<T> {
    Err(Error::EndOfSource)
}

/// Convenience function to create an unsupported feature error.
pub fn unsupported_error<T>(feature: &'static str) -> Result<T> {
    Err(Error::Unsupported(feature))
}

/// Convenience function to create a schema error.
pub fn schema_error<T>(err: SchemaError) -> Result<T> {
    Err(Error::Schema(err))
}
