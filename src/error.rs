//! The crate's single public error type.
//!
//! Mirrors the hand-written `Display`/`std::error::Error` enums used throughout the teacher
//! crates (`expandms::error::DecompressionError`, `dllexports::data_mgmt::Error`) rather than
//! reaching for a derive-macro error crate.

use std::fmt;
use std::io;

/// Where in the image a [`Error::MalformedIso`] was detected, when known.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ImageLocation {
    pub block: Option<u32>,
    pub offset: Option<usize>,
}
impl ImageLocation {
    pub const UNKNOWN: Self = Self { block: None, offset: None };

    pub fn at_block(block: u32) -> Self {
        Self { block: Some(block), offset: None }
    }

    pub fn at(block: u32, offset: usize) -> Self {
        Self { block: Some(block), offset: Some(offset) }
    }
}
impl fmt::Display for ImageLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.block, self.offset) {
            (Some(b), Some(o)) => write!(f, "block {}, offset {}", b, o),
            (Some(b), None) => write!(f, "block {}", b),
            (None, _) => write!(f, "unknown location"),
        }
    }
}

/// Every error this crate can produce.
#[derive(Debug)]
pub enum Error {
    /// The caller passed something contradictory or forbidden.
    InvalidInput(String),

    /// The image violates the relevant standard in a way the parser refuses to tolerate.
    MalformedIso { message: String, location: ImageLocation },

    /// An invariant check failed during reconcile/write. Indicates a library bug.
    Internal(String),

    /// Propagated I/O failure from the underlying source or sink.
    Io(io::Error),
}
impl Error {
    pub fn invalid_input<S: Into<String>>(message: S) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn malformed<S: Into<String>>(message: S, location: ImageLocation) -> Self {
        Self::MalformedIso { message: message.into(), location }
    }

    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal(message.into())
    }

    pub fn is_invalid_input(&self) -> bool {
        matches!(self, Self::InvalidInput(_))
    }

    pub fn is_malformed_iso(&self) -> bool {
        matches!(self, Self::MalformedIso { .. })
    }

    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Internal(_))
    }
}
impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidInput(message)
                => write!(f, "invalid input: {}", message),
            Self::MalformedIso { message, location }
                => write!(f, "malformed ISO image at {}: {}", location, message),
            Self::Internal(message)
                => write!(f, "internal error: {}", message),
            Self::Io(e)
                => write!(f, "I/O error: {}", e),
        }
    }
}
impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::InvalidInput(_) | Self::MalformedIso { .. } | Self::Internal(_) => None,
        }
    }
}
impl From<io::Error> for Error {
    fn from(value: io::Error) -> Self { Self::Io(value) }
}

pub type Result<T> = std::result::Result<T, Error>;
