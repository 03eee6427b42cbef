//! Core primitives shared by the MPCL garbling stack: 128-bit wire
//! labels, the fixed-key dual-key cipher used for garbled-table rows,
//! and the framed transport between the two parties.

mod channel;
mod cipher;
mod label;

pub use channel::{Channel, SyncChannel, TcpChannel};
#[cfg(unix)]
pub use channel::{unix_channel_pair, UnixChannel};
pub use cipher::GarbleCipher;
pub use label::{tweak, Label};
