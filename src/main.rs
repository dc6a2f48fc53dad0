use std::{fs, path::PathBuf, process};

use anyhow::Context;
use clap::Parser;
use ngs::{compile, Vm, VmConfig};

#[derive(Parser)]
#[command(version, about = "Compile and run an NGS script")]
struct Cli {
    /// script
    script: PathBuf,

    /// Print the compiled bytecode before running it
    #[arg(short, long)]
    disassemble: bool,

    /// Print both stacks once the program stops
    #[arg(long)]
    dump_stacks: bool,

    /// Print every executed instruction to stderr
    #[arg(long)]
    trace: bool,

    /// Capacity of the operand stack
    #[arg(long, default_value_t = VmConfig::default().operand_stack_capacity)]
    stack_size: usize,

    /// Capacity of the call stack
    #[arg(long, default_value_t = VmConfig::default().call_stack_capacity)]
    call_stack_size: usize,
}

fn main() {
    let cli = Cli::parse();
    if let Err(err) = run(&cli) {
        eprintln!("{:#}", err);
        process::exit(1);
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let program = fs::read_to_string(&cli.script)
        .with_context(|| format!("cannot read {}", cli.script.display()))?;

    let bytecode = compile(&program)?;
    if cli.disassemble {
        println!("{}", bytecode);
    }

    let config = VmConfig {
        operand_stack_capacity: cli.stack_size,
        call_stack_capacity: cli.call_stack_size,
        trace: cli.trace,
    };
    let mut vm = Vm::new(bytecode, config);
    let outcome = vm.run();

    if cli.dump_stacks {
        print!("{}", vm.stack_dump());
    }

    if let Some(value) = outcome? {
        println!("Process is finished with result: {}", value);
    }
    Ok(())
}
