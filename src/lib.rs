//! treec: tree-IR back end for a Java-like language.
//!
//! The crate takes one parsed member body at a time through the three
//! back-end passes:
//!
//! - **check**: type selection, implicit conversion insertion, name
//!   resolution, and flow-sensitive definite-assignment analysis
//! - **fold**: compile-time constant evaluation, algebraic and dead-branch
//!   simplification, and budgeted method-body inlining
//! - **codegen**: lowering to a symbolic stack-machine instruction stream
//!   with labels and exception-table markers
//!
//! ```text
//! Parsed tree → check (annotate/rewrite) → fold (simplify) → codegen → Code
//! ```
//!
//! The lexer/parser, symbol resolution proper, class-file writing, and
//! byte-level instruction encoding are external collaborators; `syms`,
//! `diag`, and `codegen::Code` are the seams they plug into. Each
//! compilation owns its tree, scope state, and flow sets outright, so
//! independent member bodies can be compiled from different threads
//! against a shared read-only class table.

pub mod check;
pub mod codegen;
pub mod diag;
pub mod error;
pub mod fold;
pub mod span;
pub mod syms;
pub mod tree;
pub mod types;

pub use check::{check_method, CheckOutcome, FlowBits, MethodSig};
pub use codegen::{gen_method, Code};
pub use diag::{Diagnostic, Diagnostics};
pub use error::{Error, Result};
pub use fold::fold_method;
pub use syms::Symtab;
pub use types::{ClassId, Constant, Type};

use crate::tree::Stmt;

/// Per-compilation options.
#[derive(Debug, Clone)]
pub struct Options {
    /// Whether the folding pass may expand small method bodies.
    pub inline: bool,
    /// Cost ceiling for an inlined body.
    pub inline_budget: u32,
}

impl Default for Options {
    fn default() -> Self {
        Options { inline: true, inline_budget: 30 }
    }
}

/// The result of compiling one member body.
#[derive(Debug)]
pub struct CompiledMethod {
    pub code: Code,
    /// Local slots used, temporaries included.
    pub max_slots: u32,
    /// Captured-variable descriptors for uplevel references.
    pub captures: check::CaptureSet,
    /// Warnings (and nothing else; errors abort with `Error::Semantic`).
    pub diagnostics: Vec<Diagnostic>,
}

/// Compile one member body: check, fold, then emit.
///
/// Checking reports all source errors it can find before giving up;
/// folding and emission run only on a clean tree, so any failure they
/// report is `Error::Internal`, a checker bug rather than bad input.
pub fn compile_method(
    syms: &mut Symtab,
    opts: &Options,
    class: ClassId,
    sig: &MethodSig,
    body: Stmt,
) -> Result<CompiledMethod> {
    let mut diags = Diagnostics::new();
    let mut body = body;
    let outcome = check::check_method(syms, &mut diags, class, sig, &mut body);
    if diags.has_errors() {
        return Err(Error::Semantic { diagnostics: diags.take() });
    }

    let (folded, max_slots) = fold::fold_method(syms, opts, class, outcome.max_slots, body);
    let body = folded.unwrap_or_else(|| Stmt::empty(span::Span::default()));

    let code = codegen::gen_method(syms, &outcome.captures, &sig.ret, sig.is_ctor, max_slots, &body)?;
    let max_slots = code.max_slots();
    log::debug!(
        "compiled member of class#{}: {} instructions, {} slots, stack {}",
        class.0,
        code.instrs().len(),
        max_slots,
        code.max_stack()
    );
    Ok(CompiledMethod { code, max_slots, captures: outcome.captures, diagnostics: diags.take() })
}
