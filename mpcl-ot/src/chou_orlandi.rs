//! Chou-Orlandi oblivious transfer (cf. <https://eprint.iacr.org/2015/267>)
//! over the Ristretto prime-order group.
//!
//! The per-instance counter is hashed into the key derivation so that
//! transfers within a batch cannot be replayed against each other.

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockEncrypt, KeyInit};
use aes::Aes256;
use curve25519_dalek::constants::RISTRETTO_BASEPOINT_TABLE;
use curve25519_dalek::ristretto::{RistrettoBasepointTable, RistrettoPoint};
use curve25519_dalek::scalar::Scalar;
use mpcl_core::{Channel, Label};
use rand::{CryptoRng, RngCore};

use crate::{Error, Receiver as OtReceiver, Sender as OtSender};

/// Key derivation: AES-256 keyed by the compressed point, encrypting the
/// instance counter.
fn hash_pt(i: u128, pt: &RistrettoPoint) -> Label {
    let key = pt.compress();
    let aes = Aes256::new(GenericArray::from_slice(key.as_bytes()));
    let mut block = GenericArray::clone_from_slice(&i.to_le_bytes());
    aes.encrypt_block(&mut block);
    let mut bytes = [0u8; Label::BYTES];
    bytes.copy_from_slice(&block);
    Label::from_bytes(bytes)
}

/// Oblivious transfer sender.
pub struct Sender {
    y: Scalar,
    s: RistrettoPoint,
    counter: u128,
}

impl OtSender for Sender {
    fn init<C: Channel, RNG: CryptoRng + RngCore>(
        channel: &mut C,
        rng: &mut RNG,
    ) -> Result<Self, Error> {
        let y = Scalar::random(rng);
        let s = &y * RISTRETTO_BASEPOINT_TABLE;
        channel.write_pt(&s)?;
        channel.flush()?;
        Ok(Sender { y, s, counter: 0 })
    }

    fn send<C: Channel, RNG: CryptoRng + RngCore>(
        &mut self,
        channel: &mut C,
        inputs: &[(Label, Label)],
        _: &mut RNG,
    ) -> Result<(), Error> {
        let ys = self.y * self.s;
        let ks = (0..inputs.len())
            .map(|i| {
                let r = channel.read_pt()?;
                let yr = self.y * r;
                let k0 = hash_pt(self.counter + i as u128, &yr);
                let k1 = hash_pt(self.counter + i as u128, &(yr - ys));
                Ok((k0, k1))
            })
            .collect::<Result<Vec<(Label, Label)>, Error>>()?;
        self.counter += inputs.len() as u128;
        for (input, k) in inputs.iter().zip(ks.into_iter()) {
            channel.write_label(&(k.0 ^ input.0))?;
            channel.write_label(&(k.1 ^ input.1))?;
        }
        channel.flush()?;
        Ok(())
    }
}

/// Oblivious transfer receiver.
pub struct Receiver {
    s: RistrettoBasepointTable,
    counter: u128,
}

impl OtReceiver for Receiver {
    fn init<C: Channel, RNG: CryptoRng + RngCore>(
        channel: &mut C,
        _: &mut RNG,
    ) -> Result<Self, Error> {
        let s = channel.read_pt()?;
        Ok(Receiver {
            s: RistrettoBasepointTable::create(&s),
            counter: 0,
        })
    }

    fn receive<C: Channel, RNG: CryptoRng + RngCore>(
        &mut self,
        channel: &mut C,
        choices: &[bool],
        rng: &mut RNG,
    ) -> Result<Vec<Label>, Error> {
        let zero = &Scalar::ZERO * &self.s;
        let one = &Scalar::ONE * &self.s;
        let ks = choices
            .iter()
            .enumerate()
            .map(|(i, b)| {
                let x = Scalar::random(rng);
                let c = if *b { one } else { zero };
                let r = c + &x * RISTRETTO_BASEPOINT_TABLE;
                channel.write_pt(&r)?;
                Ok(hash_pt(self.counter + i as u128, &(&x * &self.s)))
            })
            .collect::<Result<Vec<Label>, Error>>()?;
        channel.flush()?;
        self.counter += choices.len() as u128;
        choices
            .iter()
            .zip(ks.into_iter())
            .map(|(b, k)| {
                let c0 = channel.read_label()?;
                let c1 = channel.read_label()?;
                Ok(k ^ if *b { c1 } else { c0 })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mpcl_core::unix_channel_pair;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn transfer(pairs: Vec<(Label, Label)>, choices: Vec<bool>) -> Vec<Label> {
        let (mut sender_channel, mut receiver_channel) = unix_channel_pair();
        let handle = std::thread::spawn(move || {
            let mut rng = StdRng::seed_from_u64(11);
            let mut sender = Sender::init(&mut sender_channel, &mut rng).unwrap();
            sender.send(&mut sender_channel, &pairs, &mut rng).unwrap();
        });
        let mut rng = StdRng::seed_from_u64(12);
        let mut receiver = Receiver::init(&mut receiver_channel, &mut rng).unwrap();
        let out = receiver
            .receive(&mut receiver_channel, &choices, &mut rng)
            .unwrap();
        handle.join().unwrap();
        out
    }

    #[test]
    fn receiver_gets_chosen_labels() {
        let mut rng = StdRng::seed_from_u64(13);
        let pairs: Vec<(Label, Label)> = (0..128)
            .map(|_| (Label::random(&mut rng), Label::random(&mut rng)))
            .collect();
        let choices: Vec<bool> = (0..128).map(|i| i % 2 == 1).collect();
        let expected: Vec<Label> = pairs
            .iter()
            .zip(choices.iter())
            .map(|(p, c)| if *c { p.1 } else { p.0 })
            .collect();
        assert_eq!(transfer(pairs, choices), expected);
    }

    #[test]
    fn unchosen_label_stays_hidden() {
        let mut rng = StdRng::seed_from_u64(14);
        let pairs = vec![(Label::random(&mut rng), Label::random(&mut rng))];
        let other = pairs[0].1;
        let got = transfer(pairs, vec![false]);
        assert_ne!(got[0], other);
    }
}
