//! Oblivious transfer for garbled wire labels.
//!
//! Provides traits for 1-out-of-2 oblivious transfer and the
//! Chou-Orlandi instantiation over the Ristretto group. Messages are
//! fixed-width wire labels; the receiver obtains exactly the label
//! selected by its choice bit and the sender learns nothing.

pub mod chou_orlandi;

use mpcl_core::{Channel, Label};
use rand::{CryptoRng, RngCore};
use std::fmt;

/// Errors produced by the OT protocols.
#[derive(Debug)]
pub enum Error {
    /// A communication error occurred.
    Io(std::io::Error),
    /// The peer sent an invalid group element.
    InvalidPoint,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "io error: {}", e),
            Error::InvalidPoint => "invalid group element received".fmt(f),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Error {
        Error::Io(e)
    }
}

/// 1-out-of-2 oblivious transfer, sender side. The sender holds a pair
/// of labels per instance.
pub trait Sender
where
    Self: Sized,
{
    /// One-time setup for a batch of transfers.
    fn init<C: Channel, RNG: CryptoRng + RngCore>(
        channel: &mut C,
        rng: &mut RNG,
    ) -> Result<Self, Error>;

    /// Send one label pair per instance.
    fn send<C: Channel, RNG: CryptoRng + RngCore>(
        &mut self,
        channel: &mut C,
        inputs: &[(Label, Label)],
        rng: &mut RNG,
    ) -> Result<(), Error>;
}

/// 1-out-of-2 oblivious transfer, receiver side. The receiver holds one
/// choice bit per instance and learns exactly the chosen label.
pub trait Receiver
where
    Self: Sized,
{
    /// One-time setup for a batch of transfers.
    fn init<C: Channel, RNG: CryptoRng + RngCore>(
        channel: &mut C,
        rng: &mut RNG,
    ) -> Result<Self, Error>;

    /// Receive the labels selected by `choices`.
    fn receive<C: Channel, RNG: CryptoRng + RngCore>(
        &mut self,
        channel: &mut C,
        choices: &[bool],
        rng: &mut RNG,
    ) -> Result<Vec<Label>, Error>;
}
