//! irkit command line tool.
//!
//! Provides the `irkit` binary with subcommands for working with textual
//! IR files: `check` parses and verifies, `print` re-emits the canonical
//! form, and `opt` runs the pass pipeline and prints the result.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

use irkit_core::{parse_module, pretty_module, verify::verify_module, Module};
use irkit_passes::{fresh_env, run_pipeline, EnvValue};

/// irkit IR tools.
#[derive(Parser)]
#[command(name = "irkit", about = "irkit IR tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Parse a textual IR file and verify its invariants.
    Check {
        /// Path to the IR file.
        file: PathBuf,
    },

    /// Parse a textual IR file and print its canonical form.
    Print {
        /// Path to the IR file.
        file: PathBuf,
    },

    /// Run the pass pipeline over an IR file and print the result.
    Opt {
        /// Path to the IR file.
        file: PathBuf,

        /// Pass names for the optimize stage (e.g. passes.dce); the
        /// analyze stage keeps its default SSA construction.
        #[arg(short, long)]
        passes: Vec<String>,

        /// Verify before and after every pass.
        #[arg(long)]
        paranoid: bool,
    },
}

fn main() {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let code = match cli.command {
        Commands::Check { file } => run_check(&file),
        Commands::Print { file } => run_print(&file),
        Commands::Opt {
            file,
            passes,
            paranoid,
        } => run_opt(&file, passes, paranoid),
    };
    process::exit(code);
}

fn load(file: &PathBuf) -> Result<Module, String> {
    let source =
        std::fs::read_to_string(file).map_err(|e| format!("cannot read {}: {}", file.display(), e))?;
    parse_module(&source).map_err(|e| e.to_string())
}

fn run_check(file: &PathBuf) -> i32 {
    match load(file).and_then(|module| verify_module(&module).map_err(|e| e.to_string())) {
        Ok(()) => {
            println!("{}: ok", file.display());
            0
        }
        Err(message) => {
            eprintln!("error: {}", message);
            1
        }
    }
}

fn run_print(file: &PathBuf) -> i32 {
    match load(file) {
        Ok(module) => {
            print!("{}", pretty_module(&module));
            0
        }
        Err(message) => {
            eprintln!("error: {}", message);
            1
        }
    }
}

fn run_opt(file: &PathBuf, passes: Vec<String>, paranoid: bool) -> i32 {
    let mut module = match load(file) {
        Ok(module) => module,
        Err(message) => {
            eprintln!("error: {}", message);
            return 1;
        }
    };
    let mut env = fresh_env();
    if !passes.is_empty() {
        env.set("pipeline.optimize", EnvValue::Names(passes));
    }
    if paranoid {
        env.set("verify.paranoid", EnvValue::Bool(true));
    }
    match run_pipeline(&mut module, &mut env) {
        Ok(()) => {
            print!("{}", pretty_module(&module));
            0
        }
        Err(e) => {
            eprintln!("error: {}", e);
            1
        }
    }
}
