//! Uplevel-reference emission: constructor-argument copies vs synthetic
//! fields, driven by the capture descriptor table.

mod common;

use common::*;
use treec::check::capture::CaptureSet;
use treec::check::context::VarDef;
use treec::codegen::{gen_method, Instr, OpType};
use treec::syms::Modifiers;
use treec::tree::{Expr, ExprKind, Stmt};
use treec::types::Type;
use treec::Symtab;

fn captured_var(name: &str, slot: u32) -> VarDef {
    VarDef {
        name: name.to_string(),
        ty: Type::Int,
        flags: Modifiers::FINAL,
        slot,
        frame_number: 1,
        scope_number: 1,
        span: sp(),
    }
}

/// `return k;` where `k` is a captured enclosing-scope variable; the tree
/// is built pre-annotated the way the checking pass leaves it.
fn uplevel_return() -> Stmt {
    let mut value = Expr::new(ExprKind::Uplevel { index: 0, name: "k".into() }, sp());
    value.ty = Type::Int;
    ret(value)
}

#[test]
fn constructor_context_reads_the_synthetic_argument() {
    let syms = Symtab::new();
    let mut captures = CaptureSet::new();
    captures.intern(&captured_var("k", 2), false);
    captures.finalize(5);

    let code = gen_method(&syms, &captures, &Type::Int, true, 7, &uplevel_return())
        .expect("expected ok");
    // The copy travels as a constructor argument, still in scope here.
    assert!(code
        .instrs()
        .iter()
        .any(|i| matches!(i, Instr::Load { ty: OpType::Int, slot: 5 })));
    assert!(!code
        .instrs()
        .iter()
        .any(|i| matches!(i, Instr::GetCaptureField { .. })));
}

#[test]
fn non_constructor_context_reads_the_synthetic_field() {
    let syms = Symtab::new();
    let mut captures = CaptureSet::new();
    let index = captures.intern(&captured_var("k", 2), true);
    captures.finalize(5);
    // The out-of-constructor reference forced the field.
    assert!(captures.get(index).field.is_some());

    let code = gen_method(&syms, &captures, &Type::Int, false, 7, &uplevel_return())
        .expect("expected ok");
    let instrs = code.instrs();
    let this_load = instrs
        .iter()
        .position(|i| matches!(i, Instr::Load { ty: OpType::Ref, slot: 0 }))
        .expect("receiver load");
    let field_load = instrs
        .iter()
        .position(|i| matches!(i, Instr::GetCaptureField { index: 0 }))
        .expect("capture field load");
    assert!(this_load < field_load);
}
