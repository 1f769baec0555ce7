//! Emission checks over the symbolic instruction stream: cleanup
//! subroutines, non-local exit threading, switch tables, short-circuit
//! branches, and the lvalue dup protocol.

mod common;

use common::*;
use treec::codegen::{ArithOp, Instr, OpType};
use treec::tree::{BinOp, Expr, ExprKind, IncOp, Stmt, StmtKind};
use treec::types::{Constant, Type};
use treec::{compile_method, CompiledMethod, Options};

fn compile(fx: &mut Fixture, sig: &treec::check::MethodSig, body: Stmt) -> CompiledMethod {
    compile_method(&mut fx.syms, &Options::default(), fx.class, sig, body)
        .expect("expected successful compilation")
}

fn count(code: &treec::Code, pred: impl Fn(&Instr) -> bool) -> usize {
    code.instrs().iter().filter(|i| pred(i)).count()
}

#[test]
fn return_through_finally_threads_value_and_subroutine() {
    let mut fx = fixture();
    fx.add_touch();
    // try { return 1; } finally { touch(); }
    let body = try_finally(ret(int(1)), call_touch());
    let sig = static_sig(vec![], Type::Int);
    let out = compile(&mut fx, &sig, body);
    let code = &out.code;

    // The pending value is saved, the cleanup called, the value re-pushed.
    assert!(count(code, |i| matches!(i, Instr::Jsr(_))) >= 2); // return path + exception path
    assert_eq!(count(code, |i| matches!(i, Instr::Ret { .. })), 1);
    assert!(count(code, |i| matches!(i, Instr::Store { ty: OpType::Int, .. })) >= 1);
    assert!(count(code, |i| matches!(i, Instr::Load { ty: OpType::Int, .. })) >= 1);
    assert_eq!(count(code, |i| matches!(i, Instr::Return { ty: Some(OpType::Int) })), 1);
    // Exceptional path: catch-all range that rethrows after cleanup.
    assert_eq!(code.handlers().len(), 1);
    assert!(code.handlers()[0].class.is_none());
    assert_eq!(count(code, |i| matches!(i, Instr::Throw)), 1);
}

#[test]
fn finally_that_returns_suppresses_pending_exit() {
    let mut fx = fixture();
    // try { return 1; } finally { return 2; }
    let body = try_finally(ret(int(1)), ret(int(2)));
    let sig = static_sig(vec![], Type::Int);
    let out = compile(&mut fx, &sig, body);
    let code = &out.code;

    // No subroutine call/return: the cleanup never resumes its caller.
    assert_eq!(count(code, |i| matches!(i, Instr::Jsr(_))), 0);
    assert_eq!(count(code, |i| matches!(i, Instr::Ret { .. })), 0);
    // The thrown reference is discarded, not rethrown.
    assert_eq!(count(code, |i| matches!(i, Instr::Pop { words: 1 })), 1);
    assert_eq!(count(code, |i| matches!(i, Instr::Throw)), 0);
    // Only the cleanup's own return survives as an actual return.
    assert_eq!(count(code, |i| matches!(i, Instr::Return { .. })), 1);
}

#[test]
fn break_crossing_finally_runs_cleanup() {
    let mut fx = fixture();
    fx.add_touch();
    // while (c) { try { break; } finally { touch(); } }
    let body = while_loop(name("c"), try_finally(brk(), call_touch()));
    let sig = static_sig(vec![("c", Type::Boolean)], Type::Void);
    let out = compile(&mut fx, &sig, body);
    // The break performs the cleanup call before leaving the loop.
    assert!(count(&out.code, |i| matches!(i, Instr::Jsr(_))) >= 2);
}

#[test]
fn synchronized_brackets_body_with_monitor_pair() {
    let mut fx = fixture();
    fx.add_touch();
    let body = Stmt::new(
        StmtKind::Synchronized { lock: name("o"), body: Box::new(call_touch()) },
        sp(),
    );
    let object = fx.syms.predefined.object;
    let sig = static_sig(vec![("o", Type::Class(object))], Type::Void);
    let out = compile(&mut fx, &sig, body);
    let code = &out.code;
    assert_eq!(count(code, |i| matches!(i, Instr::MonitorEnter)), 1);
    // One exit shared by the normal and exceptional paths.
    assert_eq!(count(code, |i| matches!(i, Instr::MonitorExit)), 1);
    assert!(count(code, |i| matches!(i, Instr::Jsr(_))) >= 2);
    assert_eq!(count(code, |i| matches!(i, Instr::Ret { .. })), 1);
    assert_eq!(code.handlers().len(), 1);
    assert!(code.handlers()[0].class.is_none());
}

#[test]
fn switch_lowers_to_dense_table() {
    let mut fx = fixture();
    fx.add_touch();
    // case 2, case 5, no default: the table spans 2..=5 padded with the
    // break label.
    let body = switch(
        name("x"),
        vec![case(2, vec![call_touch(), brk()]), case(5, vec![brk()])],
    );
    let sig = static_sig(vec![("x", Type::Int)], Type::Void);
    let out = compile(&mut fx, &sig, body);
    let table = out
        .code
        .instrs()
        .iter()
        .find_map(|i| match i {
            Instr::TableSwitch { low, targets, default } => Some((*low, targets.clone(), *default)),
            _ => None,
        })
        .expect("no switch table emitted");
    let (low, targets, default) = table;
    assert_eq!(low, 2);
    assert_eq!(targets.len(), 4);
    // Gap entries fall through to the default (the break label here).
    assert_eq!(targets[1], default);
    assert_eq!(targets[2], default);
    assert_ne!(targets[0], default);
    assert_ne!(targets[3], default);
}

#[test]
fn short_circuit_and_emits_no_boolean_arithmetic() {
    let mut fx = fixture();
    fx.add_touch();
    let body = if_stmt(Expr::and(name("a"), name("b"), sp()), call_touch());
    let sig = static_sig(vec![("a", Type::Boolean), ("b", Type::Boolean)], Type::Void);
    let out = compile(&mut fx, &sig, body);
    let code = &out.code;
    // Two conditional branches, zero arithmetic: the right operand is
    // only reached when the left was true.
    assert_eq!(count(code, |i| matches!(i, Instr::Branch { .. })), 2);
    assert_eq!(count(code, |i| matches!(i, Instr::Arith { .. })), 0);
}

#[test]
fn comparison_as_value_pushes_one_and_zero() {
    let mut fx = fixture();
    let body = ret(bin(BinOp::Lt, name("a"), name("b")));
    let sig = static_sig(vec![("a", Type::Int), ("b", Type::Int)], Type::Boolean);
    let out = compile(&mut fx, &sig, body);
    let code = &out.code;
    assert!(count(code, |i| matches!(i, Instr::Const(Constant::Bool(true)))) >= 1);
    assert!(count(code, |i| matches!(i, Instr::Const(Constant::Bool(false)))) >= 1);
    assert_eq!(count(code, |i| matches!(i, Instr::Branch { .. })), 1);
}

#[test]
fn long_comparison_goes_through_cmp() {
    let mut fx = fixture();
    fx.add_touch();
    let body = if_stmt(bin(BinOp::Lt, name("a"), name("b")), call_touch());
    let sig = static_sig(vec![("a", Type::Long), ("b", Type::Long)], Type::Void);
    let out = compile(&mut fx, &sig, body);
    assert_eq!(count(&out.code, |i| matches!(i, Instr::Cmp { ty: OpType::Long, .. })), 1);
}

#[test]
fn array_compound_assignment_duplicates_base_operands() {
    let mut fx = fixture();
    // a[i] += 2;
    let target = Expr::new(
        ExprKind::Index { array: Box::new(name("a")), index: Box::new(name("i")) },
        sp(),
    );
    let body = Stmt::expr(Expr::new(
        ExprKind::AssignOp { op: BinOp::Add, target: Box::new(target), value: Box::new(int(2)) },
        sp(),
    ));
    let sig = static_sig(vec![("a", Type::array(Type::Int)), ("i", Type::Int)], Type::Void);
    let out = compile(&mut fx, &sig, body);
    let code = &out.code;
    // arrayref+index duplicated once for the read, consumed by the write.
    assert_eq!(count(code, |i| matches!(i, Instr::Dup { words: 2, depth: 0 })), 1);
    assert_eq!(count(code, |i| matches!(i, Instr::ArrayLoad { ty: OpType::Int })), 1);
    assert_eq!(count(code, |i| matches!(i, Instr::ArrayStore { ty: OpType::Int })), 1);
    assert_eq!(count(code, |i| matches!(i, Instr::Arith { op: ArithOp::Add, ty: OpType::Int })), 1);
}

#[test]
fn postfix_increment_keeps_original_value() {
    let mut fx = fixture();
    let class = fx.class;
    fx.syms.add_field(
        class,
        treec::syms::FieldInfo {
            name: "n".into(),
            ty: Type::Int,
            flags: treec::syms::Modifiers::PUBLIC,
            value: None,
        },
    );
    // return this.n++;
    let target = Expr::new(
        ExprKind::Field {
            base: None,
            name: "n".into(),
            field: None,
            access: treec::syms::FieldAccess::Direct,
        },
        sp(),
    );
    let body = ret(Expr::new(
        ExprKind::IncDec { op: IncOp::PostInc, target: Box::new(target) },
        sp(),
    ));
    let sig = treec::check::MethodSig {
        ret: Type::Int,
        throws: vec![],
        params: vec![],
        is_static: false,
        is_ctor: false,
    };
    let out = compile(&mut fx, &sig, body);
    let code = &out.code;
    // The receiver is duplicated for the read, and the pre-increment
    // value is tucked below it as the expression result.
    assert_eq!(count(code, |i| matches!(i, Instr::Dup { words: 1, depth: 0 })), 1);
    assert_eq!(count(code, |i| matches!(i, Instr::Dup { words: 1, depth: 1 })), 1);
    assert_eq!(count(code, |i| matches!(i, Instr::GetField(_))), 1);
    assert_eq!(count(code, |i| matches!(i, Instr::PutField(_))), 1);
}

#[test]
fn string_concatenation_stringifies_operands() {
    let mut fx = fixture();
    let string = fx.syms.predefined.string;
    let body = ret(bin(
        BinOp::Add,
        Expr::literal(Constant::Str("n = ".into()), sp()),
        name("x"),
    ));
    let sig = static_sig(vec![("x", Type::Int)], Type::Class(string));
    let out = compile(&mut fx, &sig, body);
    let code = &out.code;
    assert_eq!(count(code, |i| matches!(i, Instr::Stringify { ty: OpType::Int })), 1);
    assert_eq!(count(code, |i| matches!(i, Instr::Invoke { .. })), 1);
}

#[test]
fn implicit_widening_emits_conversion() {
    let mut fx = fixture();
    // return x + 1L;
    let body = ret(bin(BinOp::Add, name("x"), Expr::literal(Constant::Long(1), sp())));
    let sig = static_sig(vec![("x", Type::Int)], Type::Long);
    let out = compile(&mut fx, &sig, body);
    assert_eq!(
        count(&out.code, |i| matches!(i, Instr::Convert { from: OpType::Int, to: OpType::Long })),
        1
    );
}

#[test]
fn void_call_statement_pops_nothing() {
    let mut fx = fixture();
    fx.add_touch();
    let body = call_touch();
    let sig = static_sig(vec![], Type::Void);
    let out = compile(&mut fx, &sig, body);
    assert_eq!(count(&out.code, |i| matches!(i, Instr::Pop { .. })), 0);
    // Implicit return at the end of a void body.
    assert_eq!(count(&out.code, |i| matches!(i, Instr::Return { ty: None })), 1);
}

#[test]
fn discarded_wide_value_pops_two_words() {
    let mut fx = fixture();
    let class = fx.class;
    fx.syms.add_method(
        class,
        treec::syms::MethodInfo {
            name: "wide".into(),
            flags: treec::syms::Modifiers::PUBLIC | treec::syms::Modifiers::STATIC,
            params: vec![],
            ret: Type::Long,
            throws: vec![],
            body: None,
        },
    );
    let body = Stmt::expr(Expr::new(
        ExprKind::Call { base: None, name: "wide".into(), method: None, args: vec![] },
        sp(),
    ));
    let sig = static_sig(vec![], Type::Void);
    let out = compile(&mut fx, &sig, body);
    assert_eq!(count(&out.code, |i| matches!(i, Instr::Pop { words: 2 })), 1);
}
