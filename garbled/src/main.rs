//! Reference driver for the MPCL garbled-circuit stack.
//!
//! Compiles MPCL sources to circuits, dumps SSA or DOT, and runs
//! two-party sessions over TCP: the evaluator listens, the garbler
//! connects.

use clap::{Parser, ValueEnum};
use eyre::{bail, eyre, Result, WrapErr};
use mpcl_circuit::{bristol, format_result, mpclc, Circuit};
use mpcl_compiler::{Compiler, Params};
use mpcl_core::TcpChannel;
use mpcl_garble::protocol;
use mpcl_ot::chou_orlandi;
use num_bigint::BigUint;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::net::{TcpListener, TcpStream};
use std::path::Path;

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Format {
    Mpclc,
    Bristol,
}

#[derive(Parser)]
#[clap(name = "garbled", about = "Secure two-party computation over garbled circuits")]
struct Cli {
    /// Act as the evaluator (the default is garbler)
    #[clap(short = 'e')]
    evaluator: bool,

    /// Enable the streaming pipeline
    #[clap(long)]
    stream: bool,

    /// Compile MPCL to a circuit file without executing
    #[clap(long)]
    circ: bool,

    /// Circuit output format
    #[clap(long, value_enum, default_value_t = Format::Mpclc)]
    format: Format,

    /// Dump the SSA assembly
    #[clap(long)]
    ssa: bool,

    /// Write a Graphviz DOT rendering of the circuit to stdout
    #[clap(long)]
    dot: bool,

    /// Render the circuit as SVG (requires an external renderer)
    #[clap(long)]
    svg: bool,

    /// Optimization level; >= 1 enables dead-gate pruning
    #[clap(short = 'O', default_value_t = 1)]
    optimize: u32,

    /// Comma-separated inputs for this party
    #[clap(short = 'i', value_delimiter = ',')]
    inputs: Vec<String>,

    /// Run the BMR multi-party protocol as the given player
    #[clap(long)]
    bmr: Option<u32>,

    /// Verbose output
    #[clap(short = 'v')]
    verbose: bool,

    /// Diagnostics output
    #[clap(short = 'd')]
    diagnostics: bool,

    /// Evaluator listen address / garbler connect address
    #[clap(long, default_value = "127.0.0.1:8080")]
    addr: String,

    /// MPCL source files or a precompiled circuit
    files: Vec<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.diagnostics {
        log::LevelFilter::Debug
    } else if cli.verbose {
        log::LevelFilter::Info
    } else {
        log::LevelFilter::Warn
    };
    pretty_env_logger::formatted_builder()
        .filter_level(level)
        .init();

    if cli.bmr.is_some() {
        bail!("the BMR multi-party protocol is not part of this build");
    }
    if cli.svg {
        bail!("SVG rendering requires an external renderer; use --dot");
    }

    let params = Params {
        verbose: cli.verbose,
        diagnostics: cli.diagnostics,
        opt_prune_gates: cli.optimize >= 1,
        ..Params::default()
    };

    if cli.circ || cli.ssa || cli.dot {
        if cli.files.is_empty() {
            bail!("no input files");
        }
        for file in &cli.files {
            compile_file(file, &cli, &params)?;
        }
        return Ok(());
    }

    if cli.evaluator && cli.stream {
        return evaluator_stream_mode(&cli);
    }

    if cli.files.len() != 1 {
        bail!("expected one input file, got {}", cli.files.len());
    }
    let circuit = load_circuit(&cli.files[0], &params)?;
    log::info!("circuit: {}", circuit);

    if circuit.inputs.len() != 2 {
        bail!(
            "invalid circuit for 2-party computation: {} parties",
            circuit.inputs.len()
        );
    }
    let party = cli.evaluator as usize;
    for (idx, io) in circuit.inputs.iter().enumerate() {
        let marker = if idx == party { '+' } else { '-' };
        println!(" {} In{}: {}", marker, idx + 1, io);
    }
    println!(" - Out: {}", circuit.outputs);

    let input = circuit.inputs[party]
        .parse(&cli.inputs)
        .wrap_err("invalid inputs")?;

    let results = if cli.evaluator {
        evaluator_mode(&cli, &circuit, &input)?
    } else {
        garbler_mode(&cli, &circuit, &input)?
    };
    for (idx, (value, arg)) in results.iter().zip(circuit.outputs.0.iter()).enumerate() {
        println!("Result[{}]: {}", idx, format_result(value, &arg.type_info));
    }
    Ok(())
}

fn compile_file(file: &str, cli: &Cli, params: &Params) -> Result<()> {
    let compiler = Compiler::new(params.clone());
    if cli.ssa {
        let source = std::fs::read_to_string(file)?;
        let program = compiler
            .compile_ssa(file, &source)
            .map_err(|e| eyre!("{}", e))?;
        print!("{}", program.dump());
        if !cli.circ && !cli.dot {
            return Ok(());
        }
    }
    let (circuit, _) = compiler.compile_file(file).map_err(|e| eyre!("{}", e))?;
    if cli.dot {
        write_dot(&circuit, &mut std::io::stdout())?;
    }
    if cli.circ {
        let stem = Path::new(file)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("circuit");
        let out_name = match cli.format {
            Format::Mpclc => format!("{}.circ", stem),
            Format::Bristol => format!("{}.bristol", stem),
        };
        let mut out = BufWriter::new(File::create(&out_name)?);
        match cli.format {
            Format::Mpclc => mpclc::write(&circuit, &mut out).map_err(|e| eyre!("{}", e))?,
            Format::Bristol => bristol::write(&circuit, &mut out).map_err(|e| eyre!("{}", e))?,
        }
        out.flush()?;
        println!("{}: {}", out_name, circuit);
    }
    Ok(())
}

fn load_circuit(file: &str, params: &Params) -> Result<Circuit> {
    if file.ends_with(".mpcl") {
        let (circuit, _) = Compiler::new(params.clone())
            .compile_file(file)
            .map_err(|e| eyre!("{}", e))?;
        Ok(circuit)
    } else if file.ends_with(".circ") || file.ends_with(".mpclc") {
        let mut reader = BufReader::new(File::open(file)?);
        mpclc::read(&mut reader)
            .map_err(|e| eyre!("failed to parse circuit file '{}': {}", file, e))
    } else if file.ends_with(".bristol") || file.ends_with(".txt") {
        let mut reader = BufReader::new(File::open(file)?);
        bristol::read(&mut reader)
            .map_err(|e| eyre!("failed to parse circuit file '{}': {}", file, e))
    } else {
        bail!("unknown file type '{}'", file)
    }
}

fn garbler_mode(cli: &Cli, circuit: &Circuit, input: &BigUint) -> Result<Vec<BigUint>> {
    let stream = TcpStream::connect(&cli.addr)
        .wrap_err_with(|| format!("cannot connect to evaluator at {}", cli.addr))?;
    stream.set_nodelay(true)?;
    let mut channel = TcpChannel::from_stream(stream)?;
    let mut rng = StdRng::from_entropy();
    let results = if cli.stream {
        protocol::garble_stream::<_, chou_orlandi::Sender, _>(
            circuit,
            input,
            &mut channel,
            &mut rng,
        )
    } else {
        protocol::garble::<_, chou_orlandi::Sender, _>(circuit, input, &mut channel, &mut rng)
    };
    results.map_err(|e| eyre!("{}", e))
}

fn evaluator_mode(cli: &Cli, circuit: &Circuit, input: &BigUint) -> Result<Vec<BigUint>> {
    let listener = TcpListener::bind(&cli.addr)?;
    println!("Listening for connections at {}", cli.addr);
    let (stream, peer) = listener.accept()?;
    println!("New connection from {}", peer);
    stream.set_nodelay(true)?;
    let mut channel = TcpChannel::from_stream(stream)?;
    let mut rng = StdRng::from_entropy();
    protocol::evaluate::<_, chou_orlandi::Receiver, _>(circuit, input, &mut channel, &mut rng)
        .map_err(|e| eyre!("{}", e))
}

/// Streaming evaluator: the circuit arrives over the wire, so inputs
/// are parsed as plain integers against the transmitted schema.
fn evaluator_stream_mode(cli: &Cli) -> Result<()> {
    let listener = TcpListener::bind(&cli.addr)?;
    println!("Listening for connections at {}", cli.addr);
    let (stream, peer) = listener.accept()?;
    println!("New connection from {}", peer);
    stream.set_nodelay(true)?;
    let mut channel = TcpChannel::from_stream(stream)?;
    let mut rng = StdRng::from_entropy();

    // The schema arrives over the wire, so only a single integer input
    // can be packed without knowing the field layout up front.
    if cli.inputs.len() != 1 {
        bail!("streaming evaluator takes exactly one input value");
    }
    let input = parse_integer(&cli.inputs[0])?;
    let (results, _widths) = protocol::evaluate_stream::<_, chou_orlandi::Receiver, _>(
        &input,
        &mut channel,
        &mut rng,
    )
    .map_err(|e| eyre!("{}", e))?;
    for (idx, value) in results.iter().enumerate() {
        println!("Result[{}]: 0x{:x}\t{}", idx, value, value);
    }
    Ok(())
}

fn parse_integer(literal: &str) -> Result<BigUint> {
    let parsed = if let Some(hex) = literal.strip_prefix("0x") {
        BigUint::parse_bytes(hex.as_bytes(), 16)
    } else {
        BigUint::parse_bytes(literal.as_bytes(), 10)
    };
    parsed.ok_or_else(|| eyre!("malformed input literal '{}'", literal))
}

/// Graphviz DOT rendering: gates as nodes, wires as edges.
fn write_dot<W: Write>(circuit: &Circuit, w: &mut W) -> Result<()> {
    writeln!(w, "digraph circuit {{")?;
    writeln!(w, "\trankdir=LR;")?;
    let inputs = circuit.input_bits();
    let mut producer: Vec<String> = (0..inputs).map(|i| format!("i{}", i)).collect();
    producer.resize(circuit.num_wires, String::new());
    for i in 0..inputs {
        writeln!(w, "\ti{} [shape=plaintext, label=\"w{}\"];", i, i)?;
    }
    for (idx, gate) in circuit.gates.iter().enumerate() {
        writeln!(w, "\tg{} [shape=box, label=\"{}\"];", idx, gate.op)?;
        producer[gate.z as usize] = format!("g{}", idx);
    }
    for (idx, gate) in circuit.gates.iter().enumerate() {
        writeln!(w, "\t{} -> g{};", producer[gate.x as usize], idx)?;
        if let Some(y) = gate.input1() {
            writeln!(w, "\t{} -> g{};", producer[y as usize], idx)?;
        }
    }
    let out_base = circuit.num_wires - circuit.output_bits() as usize;
    for i in 0..circuit.output_bits() as usize {
        writeln!(w, "\to{} [shape=plaintext, label=\"out{}\"];", i, i)?;
        writeln!(w, "\t{} -> o{};", producer[out_base + i], i)?;
    }
    writeln!(w, "}}")?;
    Ok(())
}
