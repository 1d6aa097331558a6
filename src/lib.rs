//! An ahead-of-time compiler for a subset of C89, emitting x86-64 System V
//! assembly.
//!
//! The pipeline is six synchronous stages — [`lex`], [`parse`], [`analyze`],
//! [`lower`], [`optimize`], [`emit`] — each consuming the previous stage's
//! output outright rather than sharing it. [`compile_source`] runs all six
//! and is the entry point most callers want.
//!
//! # Example
//!
//! ```
//! use c89c::{compile_source, CompileOptions};
//!
//! let outcome = compile_source(
//!     "int main(void) { return 42; }",
//!     "example.c",
//!     &CompileOptions::default(),
//! ).expect("well-formed IR should never fail codegen");
//!
//! assert!(!outcome.diagnostics.has_errors());
//! assert!(outcome.assembly.is_some());
//! ```

pub mod ast;
pub mod codegen;
pub mod config;
pub mod diagnostics;
pub mod dump;
pub mod error;
pub mod ir;
pub mod ir_gen;
pub mod lexer;
pub mod optimizer;
pub mod parser;
pub mod semantic;
pub mod symbol;
pub mod types;

pub use config::{ColorPolicy, CompileOptions, OptLevel, WarningSet};
pub use diagnostics::{format_diagnostics, Diagnostic, Diagnostics, Severity};
pub use error::CompileError;
pub use ir::Module;

/// The result of [`compile_source`]: the emitted assembly (`None` if a
/// semantic error prevented codegen from running) plus every diagnostic
/// produced along the way.
#[derive(Debug, Clone)]
pub struct CompileOutcome {
    pub assembly: Option<String>,
    pub diagnostics: Diagnostics,
}

/// Runs the lexer over `source`, attributing every token to `filename`.
pub fn lex(source: &str, filename: &str, diags: &mut Diagnostics) -> Vec<lexer::Token> {
    lexer::Lexer::new(source, filename).lex_all(diags)
}

/// Parses a token stream into a translation unit. Never fails outright: a
/// malformed program still yields a (possibly empty) [`ast::TranslationUnit`]
/// alongside the diagnostics explaining why.
pub fn parse(tokens: Vec<lexer::Token>, diags: &mut Diagnostics) -> ast::TranslationUnit {
    parser::Parser::new(tokens, diags).parse()
}

/// Runs name resolution and type checking in place over `tu`, returning the
/// struct layout table IR generation and codegen both need for `sizeof` and
/// member-offset computations. Every warning category is enabled; use
/// [`analyze_with_warnings`] to honor a [`WarningSet`].
pub fn analyze(tu: &mut ast::TranslationUnit, diags: &mut Diagnostics) -> types::StructTable {
    analyze_with_warnings(tu, diags, WarningSet::all())
}

/// Like [`analyze`], but suppresses whichever warning categories `warnings`
/// disables.
pub fn analyze_with_warnings(
    tu: &mut ast::TranslationUnit,
    diags: &mut Diagnostics,
    warnings: WarningSet,
) -> types::StructTable {
    let mut analyzer = semantic::Analyzer::with_warnings(diags, warnings);
    analyzer.analyze(tu);
    analyzer.into_struct_table()
}

/// Lowers a type-checked translation unit into the three-address IR.
pub fn lower(tu: &ast::TranslationUnit, structs: &types::StructTable) -> Module {
    ir_gen::IrGen::new(structs).generate(tu)
}

/// Runs the enabled optimization passes over `module` in place.
pub fn optimize(module: &mut Module, level: OptLevel, diags: &mut Diagnostics) {
    optimizer::optimize(module, level, diags)
}

/// Emits x86-64 System V assembly for a verified IR module.
///
/// Fails with [`CompileError`] only for an internal invariant violation
/// (e.g. a block with no terminator reaching codegen) — never for a problem
/// in the source program, which would already have been reported as a
/// [`Diagnostic`] by an earlier stage.
pub fn emit(module: &Module, structs: &types::StructTable, level: OptLevel) -> Result<String, CompileError> {
    codegen::CodeGen::new(structs, level).generate(module)
}

/// Compiles a single translation unit end to end.
///
/// Semantic analysis is skipped (and no assembly produced) when the parser
/// found no top-level declarations at all and already reported errors —
/// there is nothing a type checker could usefully walk. Codegen is skipped
/// whenever analysis reported an error, since the IR generator assumes a
/// well-typed AST.
pub fn compile_source(source: &str, filename: &str, opts: &CompileOptions) -> Result<CompileOutcome, CompileError> {
    let mut diags = Diagnostics::new(opts.error_cap);
    log::debug!("compile_source({filename}): {} byte(s), opt={:?}", source.len(), opts.opt_level);

    let tokens = lex(source, filename, &mut diags);
    let mut tu = parse(tokens, &mut diags);

    if tu.declarations.is_empty() && diags.has_errors() {
        log::debug!("compile_source({filename}): no declarations parsed, skipping analysis");
        return Ok(CompileOutcome { assembly: None, diagnostics: diags });
    }

    let structs = analyze_with_warnings(&mut tu, &mut diags, opts.warnings);
    if diags.has_errors() {
        log::debug!("compile_source({filename}): semantic errors, skipping codegen");
        return Ok(CompileOutcome { assembly: None, diagnostics: diags });
    }

    let mut module = lower(&tu, &structs);
    optimize(&mut module, opts.opt_level, &mut diags);
    let assembly = emit(&module, &structs, opts.opt_level)?;

    Ok(CompileOutcome { assembly: Some(assembly), diagnostics: diags })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiles_simple_program_to_assembly() {
        let outcome = compile_source("int main(void) { int x = 10; int y = 20; return x + y; }", "t.c", &CompileOptions::default()).unwrap();
        assert!(!outcome.diagnostics.has_errors());
        let asm = outcome.assembly.unwrap();
        assert!(asm.contains("main:"));
    }

    #[test]
    fn undeclared_identifier_stops_before_codegen() {
        let outcome = compile_source("int main(void) { return x; }", "t.c", &CompileOptions::default()).unwrap();
        assert!(outcome.diagnostics.has_errors());
        assert_eq!(outcome.diagnostics.error_count(), 1);
        assert!(outcome.assembly.is_none());
    }

    #[test]
    fn per_stage_entry_points_compose_like_compile_source() {
        let mut diags = Diagnostics::default();
        let tokens = lex("int main(void) { return 1; }", "t.c", &mut diags);
        let mut tu = parse(tokens, &mut diags);
        let structs = analyze(&mut tu, &mut diags);
        let module = lower(&tu, &structs);
        assert!(!diags.has_errors());
        assert!(module.function("main").is_some());
    }
}
