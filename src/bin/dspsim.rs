use std::error::Error;
use std::fs::{self, File};
use std::io::{self, LineWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_num::maybe_hex;
use itertools::Itertools;

use dspsim::asm::assemble;
use dspsim::bus::{Bus, CharConsole};
use dspsim::cycle::CycleCore;
use dspsim::disasm::disassemble;
use dspsim::functional::{CoreError, FunctionalCore, DEFAULT_ENTRY};
use dspsim::registers::RegFile;
use dspsim::trace::{JsonLines, TraceSink};

/// Address the character console device is mapped at (--console)
const CONSOLE_BASE: u32 = 0xffff_0000;

/// Educational DSP simulator and tools
///
/// Assembles, disassembles and runs programs for a small 32-bit
/// DSP-flavoured instruction set, on either a functional (fast)
/// engine or a cycle-accurate engine with modelled functional-unit
/// latencies.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Assemble a text program into binary words
    Asm {
        /// Path to input assembly file
        asm_file: PathBuf,

        /// Output binary file; if omitted, hex words are printed
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Disassemble a binary of little-endian 32-bit words
    Disasm {
        /// Path to input binary file
        bin_file: PathBuf,

        /// Listing base address (use 0x prefix for hexadecimal)
        #[arg(long, value_parser = maybe_hex::<u32>, default_value_t = DEFAULT_ENTRY)]
        base: u32,
    },

    /// Run a program on one of the execution engines
    Run(RunArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Assemble and run this assembly file
    #[arg(long = "asm")]
    asm_file: Option<PathBuf>,

    /// Load and run this raw binary of 32-bit words
    #[arg(long = "bin", conflicts_with = "asm_file")]
    bin_file: Option<PathBuf>,

    /// Base load address (use 0x prefix for hexadecimal)
    #[arg(long, value_parser = maybe_hex::<u32>, default_value_t = DEFAULT_ENTRY)]
    base: u32,

    /// Entry PC address (default: base)
    #[arg(long, value_parser = maybe_hex::<u32>)]
    entry: Option<u32>,

    /// Execution engine: functional fast model or cycle/timing model
    #[arg(long, value_enum, default_value_t = EngineKind::Fast)]
    engine: EngineKind,

    /// Emit one JSON trace record per committed instruction
    #[arg(long)]
    trace: bool,

    /// Write the trace to this file instead of stdout
    #[arg(long)]
    trace_out: Option<PathBuf>,

    /// Stop with an error after this many cycles
    #[arg(long)]
    max_cycles: Option<u64>,

    /// Single step through each instruction and print state
    #[arg(short, long)]
    debug: bool,

    /// Map the character console device and print its output
    #[arg(long)]
    console: bool,

    /// Print the final registers as an aligned table
    #[arg(long)]
    pretty: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum EngineKind {
    Fast,
    Cycle,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run_command(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run_command(command: Command) -> Result<(), Box<dyn Error>> {
    match command {
        Command::Asm { asm_file, output } => cmd_asm(&asm_file, output.as_deref()),
        Command::Disasm { bin_file, base } => cmd_disasm(&bin_file, base),
        Command::Run(args) => cmd_run(args),
    }
}

fn cmd_asm(asm_file: &Path, output: Option<&Path>) -> Result<(), Box<dyn Error>> {
    let source = fs::read_to_string(asm_file)?;
    let words = assemble(&source)?;
    match output {
        Some(path) => {
            let mut file = File::create(path)?;
            for w in &words {
                file.write_all(&w.to_le_bytes())?;
            }
            println!("Wrote {} words to {}", words.len(), path.display());
        }
        None => {
            for w in &words {
                println!("0x{w:08X}");
            }
        }
    }
    Ok(())
}

fn cmd_disasm(bin_file: &Path, base: u32) -> Result<(), Box<dyn Error>> {
    let words = read_bin(bin_file)?;
    for line in disassemble(&words, base) {
        println!("{line}");
    }
    Ok(())
}

fn cmd_run(args: RunArgs) -> Result<(), Box<dyn Error>> {
    let words = match (&args.asm_file, &args.bin_file) {
        (Some(path), None) => assemble(&fs::read_to_string(path)?)?,
        (None, Some(path)) => read_bin(path)?,
        _ => return Err("provide exactly one of --asm or --bin".into()),
    };
    let entry = args.entry.unwrap_or(args.base);
    let console = args.console.then(CharConsole::new);

    let mut bus = Bus::default();
    if let Some(c) = &console {
        bus.map_device(CONSOLE_BASE, 4, Box::new(c.clone()))?;
    }
    bus.load_words(args.base, &words)?;

    let result = match args.engine {
        EngineKind::Fast => {
            let mut core = FunctionalCore::with_bus(bus);
            core.pc = entry;
            if let Some(sink) = make_sink(&args)? {
                core.set_trace(sink);
            }
            let result = if args.debug {
                debug_loop_fast(&mut core)
            } else {
                core.run(None, args.max_cycles)
            };
            print_final_registers(&core.regs, args.pretty);
            result
        }
        EngineKind::Cycle => {
            let mut core = CycleCore::with_bus(bus);
            core.pc = entry;
            if let Some(sink) = make_sink(&args)? {
                core.set_trace(sink);
            }
            let result = if args.debug {
                debug_loop_cycle(&mut core)
            } else {
                core.run(None, args.max_cycles)
            };
            print_final_registers(&core.regs, args.pretty);
            result
        }
    };

    if let Some(c) = &console {
        let out = c.flush();
        if !out.is_empty() {
            println!("Console output:");
            print!("{out}");
        }
    }

    result.map_err(Into::into)
}

fn read_bin(path: &Path) -> Result<Vec<u32>, Box<dyn Error>> {
    let data = fs::read(path)?;
    if data.len() % 4 != 0 {
        return Err("binary size is not a multiple of 4 bytes".into());
    }
    Ok(data
        .chunks_exact(4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

fn make_sink(args: &RunArgs) -> Result<Option<Box<dyn TraceSink>>, io::Error> {
    if let Some(path) = &args.trace_out {
        let file = LineWriter::new(File::create(path)?);
        Ok(Some(Box::new(JsonLines::new(file))))
    } else if args.trace {
        Ok(Some(Box::new(JsonLines::new(io::stdout()))))
    } else {
        Ok(None)
    }
}

fn print_final_registers(regs: &RegFile, pretty: bool) {
    println!("Final Registers:");
    if pretty {
        println!("Register File (R0..R31)");
        for chunk in &(0u8..32).chunks(4) {
            let row = chunk
                .map(|n| format!("R{n:02}={:08X}", regs.read(n)))
                .join("  ");
            println!("  {row}");
        }
    } else {
        print!("{regs}");
    }
}

fn press_enter_to_continue() {
    let mut stdin = io::stdin();
    let mut stdout = io::stdout();

    write!(stdout, "Press enter to continue...").unwrap();
    stdout.flush().unwrap();

    // Read a single byte and discard
    let _ = stdin.read(&mut [0u8]).unwrap();
}

fn debug_loop_fast(core: &mut FunctionalCore) -> Result<(), CoreError> {
    while core.step()? {
        println!("pc=0x{:08x} cycle={}", core.pc, core.cycle_count);
        print!("{}", core.regs);
        press_enter_to_continue();
    }
    Ok(())
}

fn debug_loop_cycle(core: &mut CycleCore) -> Result<(), CoreError> {
    while core.step()? {
        println!("pc=0x{:08x} cycle={}", core.pc, core.cycle);
        print!("{}", core.regs);
        press_enter_to_continue();
    }
    Ok(())
}
