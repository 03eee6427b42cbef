//! End-to-end two-party sessions over an in-process socket pair.

use mpcl_circuit::Circuit;
use mpcl_compiler::{Compiler, Params};
use mpcl_core::unix_channel_pair;
use mpcl_garble::protocol;
use mpcl_ot::chou_orlandi;
use num_bigint::BigUint;
use rand::rngs::StdRng;
use rand::SeedableRng;

fn compile(source: &str) -> Circuit {
    Compiler::new(Params::default())
        .compile("test.mpcl", source)
        .map(|(circuit, _)| circuit)
        .unwrap()
}

/// Run one garble/evaluate session and check both parties agree with
/// the plaintext evaluation of the circuit.
fn run_session(circuit: &Circuit, garbler_input: BigUint, evaluator_input: BigUint) -> Vec<BigUint> {
    let (mut garbler_channel, mut evaluator_channel) = unix_channel_pair();
    let garbler_circuit = circuit.clone();
    let g_in = garbler_input.clone();
    let handle = std::thread::spawn(move || {
        let mut rng = StdRng::from_entropy();
        protocol::garble::<_, chou_orlandi::Sender, _>(
            &garbler_circuit,
            &g_in,
            &mut garbler_channel,
            &mut rng,
        )
        .unwrap()
    });
    let mut rng = StdRng::from_entropy();
    let results = protocol::evaluate::<_, chou_orlandi::Receiver, _>(
        circuit,
        &evaluator_input,
        &mut evaluator_channel,
        &mut rng,
    )
    .unwrap();
    let garbler_results = handle.join().unwrap();
    assert_eq!(results, garbler_results);

    let g_bits = circuit.inputs[0].total_bits();
    let packed = garbler_input | (evaluator_input << g_bits);
    let expected = circuit.outputs.split(&circuit.eval(&packed).unwrap());
    assert_eq!(results, expected);
    results
}

#[test]
fn addition_mod_8() {
    let circuit = compile(
        "package main\n\
         func main(a, b uint3) uint3 {\n\
         \treturn a + b\n\
         }\n",
    );
    for a in 0u64..8 {
        for b in 0u64..8 {
            let out = run_session(&circuit, BigUint::from(a), BigUint::from(b));
            assert_eq!(out[0], BigUint::from((a + b) % 8), "a={} b={}", a, b);
        }
    }
}

#[test]
fn multiplication_mod_64() {
    let circuit = compile(
        "package main\n\
         func main(a, b uint6) uint6 {\n\
         \treturn a * b\n\
         }\n",
    );
    for (a, b) in [(0u64, 0u64), (1, 63), (7, 9), (31, 33), (63, 63)] {
        let out = run_session(&circuit, BigUint::from(a), BigUint::from(b));
        assert_eq!(out[0], BigUint::from((a * b) % 64), "a={} b={}", a, b);
    }
}

#[test]
fn min_max_sum() {
    let circuit = compile(
        "package main\n\
         func MinMax(a, b int) (int, int) {\n\
         \tif a > b {\n\
         \t\treturn b, a\n\
         \t}\n\
         \treturn a, b\n\
         }\n\
         func Sum2(a, b int) int {\n\
         \treturn a + b\n\
         }\n\
         func main(a, b int) int {\n\
         \treturn Sum2(MinMax(a, b))\n\
         }\n",
    );
    let out = run_session(&circuit, BigUint::from(5u8), BigUint::from(3u8));
    assert_eq!(out[0], BigUint::from(8u8));
}

#[test]
fn division_and_remainder() {
    let circuit = compile(
        "package main\n\
         func main(a, b uint8) (uint8, uint8) {\n\
         \treturn a / b, a % b\n\
         }\n",
    );
    for (a, b) in [(0u64, 1u64), (17, 5), (255, 254), (200, 1), (7, 255)] {
        let out = run_session(&circuit, BigUint::from(a), BigUint::from(b));
        assert_eq!(out[0], BigUint::from(a / b), "a={} b={}", a, b);
        assert_eq!(out[1], BigUint::from(a % b), "a={} b={}", a, b);
    }
}

#[test]
fn xor_share_reconstruction() {
    let circuit = compile(
        "package main\n\
         func main(g, e [64]byte) [64]byte {\n\
         \tvar key [64]byte\n\
         \tfor i := 0; i < len(g); i++ {\n\
         \t\tkey[i] = g[i] ^ e[i]\n\
         \t}\n\
         \treturn key\n\
         }\n",
    );
    let share_g: Vec<u8> = (0..64).map(|i| (i as u8).wrapping_mul(0x7e) ^ 0x1d).collect();
    let share_e: Vec<u8> = (0..64).map(|i| (i as u8).wrapping_mul(0xb2) ^ 0x14).collect();
    let secret: Vec<u8> = share_g
        .iter()
        .zip(share_e.iter())
        .map(|(g, e)| g ^ e)
        .collect();
    let out = run_session(
        &circuit,
        BigUint::from_bytes_le(&share_g),
        BigUint::from_bytes_le(&share_e),
    );
    assert_eq!(out[0], BigUint::from_bytes_le(&secret));
}

#[test]
fn streaming_session() {
    let circuit = compile(
        "package main\n\
         func main(a, b uint8) (uint8, bool) {\n\
         \tif a > b {\n\
         \t\treturn a - b, true\n\
         \t}\n\
         \treturn b - a, false\n\
         }\n",
    );
    for (a, b) in [(200u64, 13u64), (13, 200), (77, 77)] {
        let (mut garbler_channel, mut evaluator_channel) = unix_channel_pair();
        let garbler_circuit = circuit.clone();
        let g_in = BigUint::from(a);
        let handle = std::thread::spawn(move || {
            let mut rng = StdRng::from_entropy();
            protocol::garble_stream::<_, chou_orlandi::Sender, _>(
                &garbler_circuit,
                &g_in,
                &mut garbler_channel,
                &mut rng,
            )
            .unwrap()
        });
        let mut rng = StdRng::from_entropy();
        let (results, widths) = protocol::evaluate_stream::<_, chou_orlandi::Receiver, _>(
            &BigUint::from(b),
            &mut evaluator_channel,
            &mut rng,
        )
        .unwrap();
        let garbler_results = handle.join().unwrap();
        assert_eq!(results, garbler_results);
        assert_eq!(widths, vec![8, 1]);
        let expected_diff = if a > b { a - b } else { b - a };
        assert_eq!(results[0], BigUint::from(expected_diff), "a={} b={}", a, b);
        assert_eq!(results[1], BigUint::from((a > b) as u8));
    }
}

#[test]
fn schema_mismatch_aborts() {
    let add = compile(
        "package main\n\
         func main(a, b uint3) uint3 {\n\
         \treturn a + b\n\
         }\n",
    );
    let wide = compile(
        "package main\n\
         func main(a, b uint8) uint8 {\n\
         \treturn a + b\n\
         }\n",
    );
    let (mut garbler_channel, mut evaluator_channel) = unix_channel_pair();
    let handle = std::thread::spawn(move || {
        let mut rng = StdRng::from_entropy();
        protocol::garble::<_, chou_orlandi::Sender, _>(
            &add,
            &BigUint::from(1u8),
            &mut garbler_channel,
            &mut rng,
        )
    });
    let mut rng = StdRng::from_entropy();
    let evaluator = protocol::evaluate::<_, chou_orlandi::Receiver, _>(
        &wide,
        &BigUint::from(1u8),
        &mut evaluator_channel,
        &mut rng,
    );
    assert!(evaluator.is_err());
    assert!(handle.join().unwrap().is_err());
}
