//! The MPCL compiler: lexer, parser, constant evaluator, SSA generator
//! with full control-flow unrolling, and the Boolean circuit builder.
//!
//! The pipeline is `compile(source) -> Circuit`: MPCL source is parsed
//! into an AST, lowered to SSA (loops unrolled, calls inlined, joins
//! phi-merged), and each SSA instruction is expanded into Boolean gates
//! through the sub-circuit templates. Each `main` parameter is one
//! party's input; the return values are the circuit outputs.

pub mod ast;
mod builtins;
mod circuitgen;
pub mod circuits;
mod error;
mod eval;
mod lexer;
mod parser;
mod ssa;
mod ssagen;

pub use error::{CompileError, ErrorKind, Point};
pub use ssa::{ConstValue, Instr, Program, Value};

use mpcl_circuit::{Circuit, Io, IoArg};

/// Compilation parameters.
#[derive(Clone, Debug)]
pub struct Params {
    pub verbose: bool,
    pub diagnostics: bool,
    /// Dead-gate pruning; enabled at optimization level >= 1.
    pub opt_prune_gates: bool,
    /// Upper bound on loop unrolling; exceeding it is a compile error.
    pub max_loop_unroll: u32,
}

impl Default for Params {
    fn default() -> Self {
        Params {
            verbose: false,
            diagnostics: false,
            opt_prune_gates: true,
            max_loop_unroll: 0x20000,
        }
    }
}

/// The MPCL compiler front end.
pub struct Compiler {
    params: Params,
}

impl Compiler {
    pub fn new(params: Params) -> Self {
        Compiler { params }
    }

    /// Compile an MPCL source file.
    pub fn compile_file(&self, path: &str) -> Result<(Circuit, Program), CompileError> {
        let source = std::fs::read_to_string(path).map_err(|e| {
            CompileError::semantic(path, Point::default(), format!("cannot read file: {}", e))
        })?;
        self.compile(path, &source)
    }

    /// Compile MPCL source text into a circuit and its SSA program.
    pub fn compile(
        &self,
        source_name: &str,
        source: &str,
    ) -> Result<(Circuit, Program), CompileError> {
        let program = self.compile_ssa(source_name, source)?;
        let (inputs, outputs) = Self::io_spec(&program);
        let circuit =
            circuitgen::build(&program, &self.params, source_name, inputs, outputs)?;
        log::info!(
            "{}: {} gates, {} wires",
            source_name,
            circuit.num_gates(),
            circuit.num_wires
        );
        Ok((circuit, program))
    }

    /// Front half of the pipeline only: parse and lower to SSA.
    pub fn compile_ssa(
        &self,
        source_name: &str,
        source: &str,
    ) -> Result<Program, CompileError> {
        let unit = parser::parse(source_name, source)?;
        ssagen::generate(source_name, &unit, &self.params)
    }

    /// The circuit IO schema: one input descriptor per `main`
    /// parameter (party), one output descriptor over the return values.
    fn io_spec(program: &Program) -> (Vec<Io>, Io) {
        let inputs = program
            .inputs
            .iter()
            .map(|value| {
                Io(vec![IoArg {
                    name: value.name.clone(),
                    type_info: value.type_info.clone(),
                }])
            })
            .collect();
        let outputs = Io(program
            .output_types
            .iter()
            .map(|type_info| IoArg {
                name: String::new(),
                type_info: type_info.clone(),
            })
            .collect());
        (inputs, outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mpcl_circuit::mpclc;
    use num_bigint::BigUint;

    fn compile(source: &str) -> Circuit {
        Compiler::new(Params::default())
            .compile("test.mpcl", source)
            .map(|(c, _)| c)
            .unwrap()
    }

    fn run2(circuit: &Circuit, a: u64, b: u64) -> Vec<BigUint> {
        let a_bits = circuit.inputs[0].total_bits();
        let packed = BigUint::from(a) | (BigUint::from(b) << a_bits);
        let out = circuit.eval(&packed).unwrap();
        circuit.outputs.split(&out)
    }

    #[test]
    fn addition() {
        let circuit = compile(
            "package main\n\
             func main(a, b uint3) uint3 {\n\
             \treturn a + b\n\
             }\n",
        );
        for a in 0u64..8 {
            for b in 0u64..8 {
                assert_eq!(run2(&circuit, a, b)[0], BigUint::from((a + b) % 8));
            }
        }
    }

    #[test]
    fn multiplication() {
        let circuit = compile(
            "package main\n\
             func main(a, b uint6) uint6 {\n\
             \treturn a * b\n\
             }\n",
        );
        for a in (0u64..64).step_by(3) {
            for b in 0u64..64 {
                assert_eq!(run2(&circuit, a, b)[0], BigUint::from((a * b) % 64));
            }
        }
    }

    #[test]
    fn division_and_modulo() {
        let circuit = compile(
            "package main\n\
             func main(a, b uint8) (uint8, uint8) {\n\
             \treturn a / b, a % b\n\
             }\n",
        );
        for a in (0u64..256).step_by(11) {
            for b in 1u64..256 {
                let out = run2(&circuit, a, b);
                assert_eq!(out[0], BigUint::from(a / b), "a={} b={}", a, b);
                assert_eq!(out[1], BigUint::from(a % b), "a={} b={}", a, b);
            }
        }
    }

    #[test]
    fn min_max_tuple() {
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
        let out = run2(&circuit, 5, 3);
        assert_eq!(out[0], BigUint::from(8u8));
    }

    #[test]
    fn early_return_phi() {
        let circuit = compile(
            "package main\n\
             func pick(a, b uint8) uint8 {\n\
             \tif a > b {\n\
             \t\treturn a\n\
             \t}\n\
             \treturn b\n\
             }\n\
             func main(a, b uint8) uint8 {\n\
             \treturn pick(a, b)\n\
             }\n",
        );
        assert_eq!(run2(&circuit, 7, 200)[0], BigUint::from(200u8));
        assert_eq!(run2(&circuit, 201, 200)[0], BigUint::from(201u8));
    }

    #[test]
    fn unrolled_loop() {
        let circuit = compile(
            "package main\n\
             func main(a, b uint8) uint8 {\n\
             \tsum := a\n\
             \tfor i := 0; i < 4; i++ {\n\
             \t\tsum = sum + b\n\
             \t}\n\
             \treturn sum\n\
             }\n",
        );
        for a in [0u64, 10, 200] {
            for b in [0u64, 1, 63] {
                assert_eq!(
                    run2(&circuit, a, b)[0],
                    BigUint::from((a + 4 * b) % 256),
                    "a={} b={}",
                    a,
                    b
                );
            }
        }
    }

    #[test]
    fn xor_share_reconstruction() {
        let circuit = compile(
            "package main\n\
             func main(g, e [8]byte) [8]byte {\n\
             \tvar key [8]byte\n\
             \tfor i := 0; i < len(g); i++ {\n\
             \t\tkey[i] = g[i] ^ e[i]\n\
             \t}\n\
             \treturn key\n\
             }\n",
        );
        let g = 0x7e1d_2b11_a5c9_0043u64;
        let e = 0xb214_9ccf_02e5_66d1u64;
        assert_eq!(run2(&circuit, g, e)[0], BigUint::from(g ^ e));
    }

    #[test]
    fn shifts_and_bitwise() {
        let circuit = compile(
            "package main\n\
             func main(a, b uint8) uint8 {\n\
             \treturn ((a << 1) | (b >> 2)) &^ (a & b)\n\
             }\n",
        );
        for a in (0u64..256).step_by(13) {
            for b in (0u64..256).step_by(17) {
                let expect = (((a << 1) & 0xff) | (b >> 2)) & !(a & b);
                assert_eq!(run2(&circuit, a, b)[0], BigUint::from(expect));
            }
        }
    }

    #[test]
    fn variable_shift_count() {
        let circuit = compile(
            "package main\n\
             func main(a, b uint8) uint8 {\n\
             \treturn a << b\n\
             }\n",
        );
        for b in 0u64..10 {
            let expect = if b >= 8 { 0 } else { (0x81u64 << b) & 0xff };
            assert_eq!(run2(&circuit, 0x81, b)[0], BigUint::from(expect));
        }
    }

    #[test]
    fn structs_and_fields() {
        let circuit = compile(
            "package main\n\
             type Pair struct {\n\
             \tlo uint8\n\
             \thi uint8\n\
             }\n\
             func main(a, b uint8) uint8 {\n\
             \tp := Pair{lo: a, hi: b}\n\
             \tp.lo = p.lo + 1\n\
             \treturn p.lo ^ p.hi\n\
             }\n",
        );
        assert_eq!(run2(&circuit, 0x0f, 0xf0)[0], BigUint::from(0xe0u8 ^ 0x0u8));
    }

    #[test]
    fn signed_comparison() {
        let circuit = compile(
            "package main\n\
             func main(a, b int8) bool {\n\
             \treturn a < b\n\
             }\n",
        );
        assert_eq!(run2(&circuit, 0xff, 1)[0], BigUint::from(1u8)); // -1 < 1
        assert_eq!(run2(&circuit, 1, 0xff)[0], BigUint::from(0u8));
    }

    #[test]
    fn mixed_signedness_is_rejected() {
        let err = Compiler::new(Params::default())
            .compile(
                "test.mpcl",
                "package main\n\
                 func main(a int8, b uint8) bool {\n\
                 \treturn a < b\n\
                 }\n",
            )
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Semantic);
        assert!(err.message.contains("invalid types"));
    }

    #[test]
    fn untyped_literals_meet_either_signedness() {
        let unsigned = compile(
            "package main\n\
             func main(a, b uint8) bool {\n\
             \treturn a < 7\n\
             }\n",
        );
        assert_eq!(run2(&unsigned, 3, 0)[0], BigUint::from(1u8));
        let signed = compile(
            "package main\n\
             func main(a, b int8) int8 {\n\
             \treturn a + 1\n\
             }\n",
        );
        assert_eq!(run2(&signed, 0xff, 0)[0], BigUint::from(0u8)); // -1 + 1
    }

    #[test]
    fn loop_cap_is_enforced() {
        let err = Compiler::new(Params {
            max_loop_unroll: 16,
            ..Params::default()
        })
        .compile(
            "test.mpcl",
            "package main\n\
             func main(a, b uint8) uint8 {\n\
             \tsum := a\n\
             \tfor i := 0; i < 1000; i++ {\n\
             \t\tsum = sum + b\n\
             \t}\n\
             \treturn sum\n\
             }\n",
        )
        .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Capacity);
    }

    #[test]
    fn recursion_is_rejected() {
        let err = Compiler::new(Params::default())
            .compile(
                "test.mpcl",
                "package main\n\
                 func f(a uint8) uint8 {\n\
                 \treturn f(a)\n\
                 }\n\
                 func main(a, b uint8) uint8 {\n\
                 \treturn f(a)\n\
                 }\n",
            )
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Semantic);
        assert!(err.message.contains("recursive"));
    }

    #[test]
    fn non_constant_loop_is_rejected() {
        let err = Compiler::new(Params::default())
            .compile(
                "test.mpcl",
                "package main\n\
                 func main(a, b uint8) uint8 {\n\
                 \tsum := a\n\
                 \tfor i := 0; i < b; i++ {\n\
                 \t\tsum = sum + 1\n\
                 \t}\n\
                 \treturn sum\n\
                 }\n",
            )
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotConstant);
    }

    #[test]
    fn constant_division_by_zero() {
        let err = Compiler::new(Params::default())
            .compile(
                "test.mpcl",
                "package main\n\
                 func main(a, b uint8) uint8 {\n\
                 \treturn a + 1/0\n\
                 }\n",
            )
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotConstant);
    }

    #[test]
    fn compile_is_deterministic() {
        let source = "package main\n\
                      func main(a, b uint8) (uint8, uint8) {\n\
                      \tif a > b {\n\
                      \t\treturn a / b, a % b\n\
                      \t}\n\
                      \treturn b / a, b % a\n\
                      }\n";
        let first = compile(source);
        let second = compile(source);
        let mut buf_a = Vec::new();
        let mut buf_b = Vec::new();
        mpclc::write(&first, &mut buf_a).unwrap();
        mpclc::write(&second, &mut buf_b).unwrap();
        assert_eq!(buf_a, buf_b);
    }

    #[test]
    fn width_closure_holds() {
        let circuit = compile(
            "package main\n\
             func main(a, b uint8) uint8 {\n\
             \treturn (a + b) * (a - b)\n\
             }\n",
        );
        circuit.verify().unwrap();
    }

    #[test]
    fn string_constants_fold() {
        let circuit = compile(
            "package main\n\
             const Greeting = \"hi\"\n\
             func main(a, b uint8) uint8 {\n\
             \treturn a + len(Greeting)\n\
             }\n",
        );
        assert_eq!(run2(&circuit, 5, 0)[0], BigUint::from(7u8));
    }

    #[test]
    fn conversions_widen_and_truncate() {
        let circuit = compile(
            "package main\n\
             func main(a, b uint8) uint16 {\n\
             \treturn uint16(a) * uint16(b)\n\
             }\n",
        );
        assert_eq!(run2(&circuit, 200, 200)[0], BigUint::from(40000u32));
    }
}
