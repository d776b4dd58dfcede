//! Lona Compiler
//!
//! Command-line driver: parse, compile to Lona IR and write the textual module.

use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;

use lona::codegen::{compile, CompiledModule};
use lona::frontend::parser::parse_source;
use lona::middle::ir_printer::print_ir;

/// Lona Compiler
#[derive(Parser, Debug)]
#[command(name = "lonac")]
#[command(version = "0.1.0")]
#[command(about = "Lona compiler - structs, functions and a typed IR")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Input source file (.lona)
    #[arg(value_name = "FILE")]
    input: Option<PathBuf>,

    /// Output file for the IR (defaults to FILE with an .ir extension)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Print the syntax tree as JSON and stop
    #[arg(long)]
    emit_ast: bool,

    /// Write one Graphviz .dot file per compiled function into DIR
    #[arg(long, value_name = "DIR")]
    emit_cfg: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Compile a source file
    Build {
        /// Input source file
        input: PathBuf,

        /// Output file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Check a source file for errors
    Check {
        /// Input source file
        input: PathBuf,
    },
    /// Print version information
    Version,
}

/// A compile failure already rendered as `path:line:col: error: message`
#[derive(Debug)]
struct Reported(String);

impl std::fmt::Display for Reported {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for Reported {}

fn main() {
    env_logger::init();

    let cli = Cli::parse();

    let result = match &cli.command {
        Some(Commands::Build { input, output }) => build_file(input, output.clone(), &cli),
        Some(Commands::Check { input }) => check_file(input),
        Some(Commands::Version) => {
            println!("lonac 0.1.0");
            println!("Lona Compiler");
            println!("License: Apache-2.0");
            Ok(())
        }
        None => match cli.input {
            Some(ref input) => build_file(input, cli.output.clone(), &cli),
            None => {
                eprintln!("Error: No input file specified");
                eprintln!("Usage: lonac <FILE> or lonac build <FILE>");
                process::exit(1);
            }
        },
    };

    if let Err(err) = result {
        match err.downcast_ref::<Reported>() {
            Some(reported) => eprintln!("{}", reported),
            None => eprintln!("error: {:#}", err),
        }
        process::exit(1);
    }
}

/// Module name used for symbol prefixes: the file stem
fn module_name(input: &Path) -> &str {
    input.file_stem().and_then(|s| s.to_str()).unwrap_or("module")
}

fn read_source(input: &Path) -> Result<String> {
    fs::read_to_string(input).with_context(|| format!("failed to read {}", input.display()))
}

fn report(input: &Path, source: &str, err: lona::Error) -> Reported {
    let (line, col) = err.span().line_col(source);
    Reported(format!("{}:{}:{}: error: {}", input.display(), line, col, err))
}

/// Parse and compile, rendering compiler errors with their source position
fn compile_file(input: &Path) -> Result<CompiledModule> {
    let source = read_source(input)?;
    let ast = parse_source(&source, 0).map_err(|e| report(input, &source, e))?;
    let compiled = compile(&ast, module_name(input)).map_err(|e| report(input, &source, e))?;
    Ok(compiled)
}

fn build_file(input: &Path, output: Option<PathBuf>, cli: &Cli) -> Result<()> {
    info!("compiling {}", input.display());

    if cli.emit_ast {
        let source = read_source(input)?;
        let ast = parse_source(&source, 0).map_err(|e| report(input, &source, e))?;
        println!("{}", serde_json::to_string_pretty(&ast)?);
        return Ok(());
    }

    let compiled = compile_file(input)?;

    if let Some(dir) = &cli.emit_cfg {
        fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
        for (name, dot) in &compiled.cfg_graphs {
            let path = dir.join(format!("{}.dot", name));
            fs::write(&path, dot).with_context(|| format!("failed to write {}", path.display()))?;
        }
        info!("wrote {} CFG graph(s) to {}", compiled.cfg_graphs.len(), dir.display());
    }

    let ir_text = print_ir(&compiled.module);
    let ir_path = output.unwrap_or_else(|| input.with_extension("ir"));
    fs::write(&ir_path, &ir_text).with_context(|| format!("failed to write {}", ir_path.display()))?;
    println!("Generated IR ({} functions): {}", compiled.module.functions.len(), ir_path.display());
    Ok(())
}

/// Check a source file for errors without writing anything
fn check_file(input: &Path) -> Result<()> {
    compile_file(input)?;
    println!("No errors found in {}", input.display());
    Ok(())
}
