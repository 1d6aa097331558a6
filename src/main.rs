//! `xcc` — the command-line driver for the c89c library.
//!
//! Compiles one `.c` file to an assembly listing. Best-effort only past
//! that: if `as`/`cc` are on `$PATH` it also assembles and links an
//! executable next to the output, but a missing toolchain there is logged
//! and not treated as failure — the documented contract is "produces
//! assembly", everything past it is a convenience.

use c89c::{
    dump, format_diagnostics, lower, parse, ColorPolicy, CompileOptions, Diagnostics, OptLevel,
    WarningSet,
};
use clap::Parser as ClapParser;
use std::fs;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::{self, Command};

#[derive(ClapParser)]
#[command(name = "xcc")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Ahead-of-time compiler for a subset of C89, emitting x86-64 assembly", long_about = None)]
struct Cli {
    /// C source file to compile.
    input: PathBuf,

    /// Output assembly path.
    #[arg(short = 'o', default_value = "a.out.s")]
    output: PathBuf,

    /// Optimization level: 0, 1 (default), or 2.
    #[arg(short = 'O', default_value = "1")]
    opt_level: String,

    /// Print the token stream as JSON and exit.
    #[arg(long)]
    dump_tokens: bool,

    /// Print the parsed (and type-checked) AST as JSON and exit.
    #[arg(long)]
    dump_ast: bool,

    /// Print the optimized IR as JSON and exit.
    #[arg(long)]
    dump_ir: bool,

    /// Enable or disable a warning category: `unused`, `conversion`,
    /// `sign-compare`, or `no-<category>` to disable it.
    #[arg(short = 'W', value_name = "WARNING")]
    warnings: Vec<String>,

    /// Disable colored diagnostic output.
    #[arg(long)]
    no_color: bool,
}

fn parse_opt_level(s: &str) -> Result<OptLevel, String> {
    match s {
        "0" => Ok(OptLevel::O0),
        "1" => Ok(OptLevel::O1),
        "2" => Ok(OptLevel::O2),
        other => Err(format!("invalid optimization level '-O{other}', expected 0, 1, or 2")),
    }
}

fn parse_warnings(flags: &[String]) -> Result<WarningSet, String> {
    let mut set = WarningSet::all();
    for flag in flags {
        let (enable, name) = match flag.strip_prefix("no-") {
            Some(rest) => (false, rest),
            None => (true, flag.as_str()),
        };
        if !enable {
            if !set.disable(name) {
                return Err(format!("unknown warning category '{name}'"));
            }
        } else if !["unused-variable", "narrowing", "shadow", "sign-compare"].contains(&name) {
            return Err(format!("unknown warning category '{name}'"));
        }
    }
    Ok(set)
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    let opt_level = match parse_opt_level(&cli.opt_level) {
        Ok(level) => level,
        Err(msg) => {
            eprintln!("xcc: error: {msg}");
            process::exit(2);
        }
    };
    let warnings = match parse_warnings(&cli.warnings) {
        Ok(w) => w,
        Err(msg) => {
            eprintln!("xcc: error: {msg}");
            process::exit(2);
        }
    };

    let source = match fs::read_to_string(&cli.input) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("xcc: error: couldn't read '{}': {e}", cli.input.display());
            process::exit(3);
        }
    };
    let filename = cli.input.to_string_lossy().into_owned();

    let color_policy = if cli.no_color { ColorPolicy::Never } else { ColorPolicy::Auto };
    let color = color_policy.resolve(std::io::stderr().is_terminal());

    let opts = CompileOptions::default()
        .with_opt_level(opt_level)
        .with_warnings(warnings)
        .with_color(color_policy);

    if cli.dump_tokens || cli.dump_ast || cli.dump_ir {
        run_dump(&cli, &source, &filename, &opts);
        return;
    }

    match c89c::compile_source(&source, &filename, &opts) {
        Ok(outcome) => {
            let rendered = format_diagnostics(&outcome.diagnostics, Some(&source), color);
            eprint!("{rendered}");
            match outcome.assembly {
                Some(asm) => {
                    if let Err(e) = fs::write(&cli.output, asm) {
                        eprintln!("xcc: error: couldn't write '{}': {e}", cli.output.display());
                        process::exit(3);
                    }
                    try_assemble_and_link(&cli.output);
                    process::exit(0);
                }
                None => process::exit(1),
            }
        }
        Err(e) => {
            eprintln!("xcc: internal error: {e}");
            process::exit(3);
        }
    }
}

fn run_dump(cli: &Cli, source: &str, filename: &str, opts: &CompileOptions) {
    let mut diags = Diagnostics::new(opts.error_cap);
    let tokens = c89c::lex(source, filename, &mut diags);

    if cli.dump_tokens {
        println!("{}", dump::dump_tokens(&tokens));
        process::exit(0);
    }

    let mut tu = parse(tokens, &mut diags);
    if cli.dump_ast {
        let _ = c89c::analyze_with_warnings(&mut tu, &mut diags, opts.warnings);
        println!("{}", dump::dump_ast(&tu));
        process::exit(0);
    }

    // dump_ir
    let structs = c89c::analyze_with_warnings(&mut tu, &mut diags, opts.warnings);
    let mut module = lower(&tu, &structs);
    c89c::optimize(&mut module, opts.opt_level, &mut diags);
    println!("{}", dump::dump_ir(&module));
    process::exit(0);
}

/// Best-effort: if `cc` is available, assemble and link `asm_path` into an
/// executable alongside it. Not part of the documented contract — a missing
/// toolchain is logged, not fatal.
fn try_assemble_and_link(asm_path: &PathBuf) {
    let exe_path = asm_path.with_extension("");
    let exe_path = if exe_path == *asm_path { asm_path.with_extension("out") } else { exe_path };
    match Command::new("cc").arg(asm_path).arg("-o").arg(&exe_path).status() {
        Ok(status) if status.success() => {
            log::debug!("xcc: linked {}", exe_path.display());
        }
        Ok(status) => {
            log::warn!("xcc: `cc` exited with {status}, executable not produced");
        }
        Err(e) => {
            log::warn!("xcc: couldn't run `cc` ({e}), leaving only the assembly output");
        }
    }
}
