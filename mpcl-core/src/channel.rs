//! Framed transport between the two parties.
//!
//! All sends from one side are observed in order on the other; `flush`
//! marks the boundary after which the sender may block on a read.

use curve25519_dalek::ristretto::{CompressedRistretto, RistrettoPoint};
use std::io::{BufReader, BufWriter, Read, Result, Write};
use std::net::TcpStream;
#[cfg(unix)]
use std::os::unix::net::UnixStream;

use crate::label::Label;

/// A bidirectional stream of integers, byte blobs, labels, and group
/// elements. Implementors provide raw byte I/O and flushing; everything
/// else is derived.
pub trait Channel {
    /// Read exactly `bytes.len()` bytes from the peer.
    fn read_bytes(&mut self, bytes: &mut [u8]) -> Result<()>;
    /// Write a slice of bytes to the peer.
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()>;
    /// Flush buffered writes. Required before blocking on a read.
    fn flush(&mut self) -> Result<()>;

    fn write_bool(&mut self, b: bool) -> Result<()> {
        self.write_bytes(&[b as u8])
    }

    fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    fn write_u8(&mut self, x: u8) -> Result<()> {
        self.write_bytes(&[x])
    }

    fn read_u8(&mut self) -> Result<u8> {
        let mut data = [0u8; 1];
        self.read_bytes(&mut data)?;
        Ok(data[0])
    }

    fn write_u32(&mut self, x: u32) -> Result<()> {
        self.write_bytes(&x.to_le_bytes())
    }

    fn read_u32(&mut self) -> Result<u32> {
        let mut data = [0u8; 4];
        self.read_bytes(&mut data)?;
        Ok(u32::from_le_bytes(data))
    }

    fn write_u64(&mut self, x: u64) -> Result<()> {
        self.write_bytes(&x.to_le_bytes())
    }

    fn read_u64(&mut self) -> Result<u64> {
        let mut data = [0u8; 8];
        self.read_bytes(&mut data)?;
        Ok(u64::from_le_bytes(data))
    }

    /// Write a byte blob with a `u32` length prefix.
    fn write_data(&mut self, data: &[u8]) -> Result<()> {
        self.write_u32(data.len() as u32)?;
        self.write_bytes(data)
    }

    /// Read a length-prefixed byte blob.
    fn read_data(&mut self) -> Result<Vec<u8>> {
        let len = self.read_u32()? as usize;
        let mut data = vec![0u8; len];
        self.read_bytes(&mut data)?;
        Ok(data)
    }

    fn write_label(&mut self, label: &Label) -> Result<()> {
        self.write_bytes(&label.to_bytes())
    }

    fn read_label(&mut self) -> Result<Label> {
        let mut bytes = [0u8; Label::BYTES];
        self.read_bytes(&mut bytes)?;
        Ok(Label::from_bytes(bytes))
    }

    fn read_labels(&mut self, n: usize) -> Result<Vec<Label>> {
        (0..n).map(|_| self.read_label()).collect()
    }

    fn write_pt(&mut self, pt: &RistrettoPoint) -> Result<()> {
        self.write_bytes(pt.compress().as_bytes())
    }

    fn read_pt(&mut self) -> Result<RistrettoPoint> {
        let mut data = [0u8; 32];
        self.read_bytes(&mut data)?;
        CompressedRistretto::from_slice(&data)
            .ok()
            .and_then(|pt| pt.decompress())
            .ok_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "unable to decompress ristretto point",
                )
            })
    }
}

/// A channel over any reader/writer pair.
pub struct SyncChannel<R, W> {
    reader: R,
    writer: W,
}

impl<R: Read, W: Write> SyncChannel<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        SyncChannel { reader, writer }
    }
}

impl<R: Read, W: Write> Channel for SyncChannel<R, W> {
    fn read_bytes(&mut self, bytes: &mut [u8]) -> Result<()> {
        self.reader.read_exact(bytes)
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.writer.write_all(bytes)
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush()
    }
}

/// A buffered channel over a TCP stream.
pub type TcpChannel = SyncChannel<BufReader<TcpStream>, BufWriter<TcpStream>>;

impl TcpChannel {
    pub fn from_stream(stream: TcpStream) -> Result<TcpChannel> {
        let reader = BufReader::new(stream.try_clone()?);
        Ok(SyncChannel::new(reader, BufWriter::new(stream)))
    }
}

/// A buffered channel over a Unix socket, for in-process two-party tests.
#[cfg(unix)]
pub type UnixChannel = SyncChannel<BufReader<UnixStream>, BufWriter<UnixStream>>;

/// Connect two channels through a Unix socket pair.
#[cfg(unix)]
pub fn unix_channel_pair() -> (UnixChannel, UnixChannel) {
    let (a, b) = UnixStream::pair().unwrap();
    let left = SyncChannel::new(BufReader::new(a.try_clone().unwrap()), BufWriter::new(a));
    let right = SyncChannel::new(BufReader::new(b.try_clone().unwrap()), BufWriter::new(b));
    (left, right)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitives_round_trip() {
        let (mut left, mut right) = unix_channel_pair();
        let handle = std::thread::spawn(move || {
            left.write_u32(0xdead_beef).unwrap();
            left.write_data(b"framed payload").unwrap();
            left.write_label(&Label::from_bytes([7u8; 16])).unwrap();
            left.flush().unwrap();
            left.read_bool().unwrap()
        });
        assert_eq!(right.read_u32().unwrap(), 0xdead_beef);
        assert_eq!(right.read_data().unwrap(), b"framed payload");
        assert_eq!(right.read_label().unwrap(), Label::from_bytes([7u8; 16]));
        right.write_bool(true).unwrap();
        right.flush().unwrap();
        assert!(handle.join().unwrap());
    }
}
