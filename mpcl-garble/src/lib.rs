//! Yao garbled-circuit engine with Free-XOR and point-and-permute.
//!
//! The [`Garbler`] assigns wire labels under a session-global offset
//! `R` and encrypts truth-table rows for non-free gates; the
//! [`Evaluator`] holds one label per wire and decrypts exactly one row
//! per garbled gate. [`protocol`] drives a complete two-party session
//! over a [`mpcl_core::Channel`], including the oblivious transfer of
//! the evaluator's input labels and an optional streaming pipeline.

mod evaluator;
mod garbler;
pub mod protocol;

pub use evaluator::Evaluator;
pub use garbler::Garbler;

use std::fmt;

/// The protocol phase in which an error occurred.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Setup,
    Ot,
    Labels,
    Gates,
    Decode,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Phase::Setup => "setup",
            Phase::Ot => "ot",
            Phase::Labels => "labels",
            Phase::Gates => "gate-stream",
            Phase::Decode => "decode",
        };
        s.fmt(f)
    }
}

/// Errors that abort a garble/evaluate session.
#[derive(Debug)]
pub enum Error {
    /// A transport error occurred.
    Io(std::io::Error),
    /// The oblivious transfer sub-protocol failed.
    Ot(mpcl_ot::Error),
    /// The peer violated the protocol.
    Protocol { phase: Phase, message: String },
}

impl Error {
    pub(crate) fn protocol(phase: Phase, message: impl Into<String>) -> Error {
        Error::Protocol {
            phase,
            message: message.into(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "io error: {}", e),
            Error::Ot(e) => write!(f, "oblivious transfer error: {}", e),
            Error::Protocol { phase, message } => {
                write!(f, "protocol error ({}): {}", phase, message)
            }
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Error {
        Error::Io(e)
    }
}

impl From<mpcl_ot::Error> for Error {
    fn from(e: mpcl_ot::Error) -> Error {
        Error::Ot(e)
    }
}
