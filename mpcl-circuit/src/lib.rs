//! Boolean circuit representation for the MPCL compiler and the
//! garbling runtime: typed IO descriptors, a flat gate array, level
//! assignment, plaintext evaluation, and the `mpclc` binary and
//! Bristol-style textual serialization formats.

pub mod bristol;
mod circuit;
pub mod mpclc;
mod types;

pub use circuit::{format_result, Circuit, Gate, Io, IoArg, Levels, Op, Stats};
pub use types::{Kind, StructField, TypeInfo};

use std::fmt;

/// Errors produced when building, parsing, or evaluating circuits.
#[derive(Debug)]
pub enum Error {
    /// An I/O error occurred.
    Io(std::io::Error),
    /// A circuit file could not be parsed.
    Parse(String),
    /// A type name could not be parsed.
    UnknownType(String),
    /// An input literal did not match its declared type.
    InvalidInput(String),
    /// The wrong number of input literals was supplied.
    InputArity { got: usize, needed: usize },
    /// A gate referenced a wire out of range.
    InvalidWire(u32),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "io error: {}", e),
            Error::Parse(s) => write!(f, "unable to parse circuit: {}", s),
            Error::UnknownType(s) => write!(f, "unknown type: {}", s),
            Error::InvalidInput(s) => write!(f, "invalid input: {}", s),
            Error::InputArity { got, needed } => {
                write!(f, "invalid amount of input values {}, expected {}", got, needed)
            }
            Error::InvalidWire(w) => write!(f, "wire {} out of range", w),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Error {
        Error::Io(e)
    }
}

impl From<std::num::ParseIntError> for Error {
    fn from(e: std::num::ParseIntError) -> Error {
        Error::Parse(format!("unable to parse integer: {}", e))
    }
}
