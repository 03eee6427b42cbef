//! Batched oblivious-transfer round trips.

use mpcl_core::{unix_channel_pair, Label};
use mpcl_ot::{chou_orlandi, Receiver, Sender};
use rand::rngs::StdRng;
use rand::SeedableRng;

#[test]
fn thousand_transfers_alternating_choices() {
    const N: usize = 1024;
    let mut rng = StdRng::seed_from_u64(0x0107);
    let pairs: Vec<(Label, Label)> = (0..N)
        .map(|_| (Label::random(&mut rng), Label::random(&mut rng)))
        .collect();
    let choices: Vec<bool> = (0..N).map(|i| i % 2 == 1).collect();
    let expected: Vec<Label> = pairs
        .iter()
        .zip(choices.iter())
        .map(|(pair, c)| if *c { pair.1 } else { pair.0 })
        .collect();

    let (mut sender_channel, mut receiver_channel) = unix_channel_pair();
    let handle = std::thread::spawn(move || {
        let mut rng = StdRng::from_entropy();
        let mut sender = chou_orlandi::Sender::init(&mut sender_channel, &mut rng).unwrap();
        sender
            .send(&mut sender_channel, &pairs, &mut rng)
            .unwrap();
    });
    let mut rng = StdRng::from_entropy();
    let mut receiver = chou_orlandi::Receiver::init(&mut receiver_channel, &mut rng).unwrap();
    let received = receiver
        .receive(&mut receiver_channel, &choices, &mut rng)
        .unwrap();
    handle.join().unwrap();

    assert_eq!(received, expected);
}

#[test]
fn batches_reuse_one_setup() {
    let mut rng = StdRng::seed_from_u64(0x0108);
    let first: Vec<(Label, Label)> = (0..32)
        .map(|_| (Label::random(&mut rng), Label::random(&mut rng)))
        .collect();
    let second: Vec<(Label, Label)> = (0..32)
        .map(|_| (Label::random(&mut rng), Label::random(&mut rng)))
        .collect();
    let choices = vec![true; 32];

    let expected_first: Vec<Label> = first.iter().map(|p| p.1).collect();
    let expected_second: Vec<Label> = second.iter().map(|p| p.1).collect();

    let (mut sender_channel, mut receiver_channel) = unix_channel_pair();
    let handle = std::thread::spawn(move || {
        let mut rng = StdRng::from_entropy();
        let mut sender = chou_orlandi::Sender::init(&mut sender_channel, &mut rng).unwrap();
        sender.send(&mut sender_channel, &first, &mut rng).unwrap();
        sender.send(&mut sender_channel, &second, &mut rng).unwrap();
    });
    let mut rng = StdRng::from_entropy();
    let mut receiver = chou_orlandi::Receiver::init(&mut receiver_channel, &mut rng).unwrap();
    let choices_ref = choices.clone();
    let got_first = receiver
        .receive(&mut receiver_channel, &choices_ref, &mut rng)
        .unwrap();
    let got_second = receiver
        .receive(&mut receiver_channel, &choices, &mut rng)
        .unwrap();
    handle.join().unwrap();

    assert_eq!(got_first, expected_first);
    assert_eq!(got_second, expected_second);
}
