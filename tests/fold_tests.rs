//! Constant folding and tree simplification over checked bodies.

mod common;

use common::*;
use treec::check::check_method;
use treec::fold::fold_method;
use treec::tree::{BinOp, Expr, ExprKind, Stmt, StmtKind, UnOp};
use treec::types::{Constant, Type};
use treec::{Diagnostics, Options};

/// Check then fold a body, asserting the program is well-formed.
fn checked_fold(fx: &mut Fixture, sig: &treec::check::MethodSig, mut body: Stmt) -> Option<Stmt> {
    let mut diags = Diagnostics::new();
    let outcome = check_method(&mut fx.syms, &mut diags, fx.class, sig, &mut body);
    assert!(!diags.has_errors(), "unexpected diagnostics: {:?}", diags.take());
    let (folded, _) = fold_method(&fx.syms, &Options::default(), fx.class, outcome.max_slots, body);
    folded
}

fn return_value(body: &Stmt) -> &Expr {
    fn find(s: &Stmt) -> Option<&Expr> {
        match &s.kind {
            StmtKind::Return { value } => value.as_ref(),
            StmtKind::Block(stmts) => stmts.iter().find_map(find),
            _ => None,
        }
    }
    find(body).expect("no return value in folded body")
}

#[test]
fn int_addition_folds_with_type_preserved() {
    let mut fx = fixture();
    let body = ret(bin(BinOp::Add, int(3), int(4)));
    let sig = static_sig(vec![], Type::Int);
    let folded = checked_fold(&mut fx, &sig, body).expect("body survives");
    let value = return_value(&folded);
    assert_eq!(value.constant(), Some(&Constant::Int(7)));
    assert_eq!(value.ty, Type::Int);
}

#[test]
fn integer_division_by_zero_survives_folding() {
    let mut fx = fixture();
    let body = ret(bin(BinOp::Div, int(1), int(0)));
    let sig = static_sig(vec![], Type::Int);
    let folded = checked_fold(&mut fx, &sig, body).expect("body survives");
    // The division stays live so the runtime exception still happens.
    let value = return_value(&folded);
    assert!(matches!(&value.kind, ExprKind::Binary { op: BinOp::Div, .. }));
}

#[test]
fn float_division_by_zero_folds_to_infinity() {
    let mut fx = fixture();
    let body = ret(bin(
        BinOp::Div,
        Expr::literal(Constant::Double(1.0), sp()),
        Expr::literal(Constant::Double(0.0), sp()),
    ));
    let sig = static_sig(vec![], Type::Double);
    let folded = checked_fold(&mut fx, &sig, body).expect("body survives");
    assert_eq!(return_value(&folded).constant(), Some(&Constant::Double(f64::INFINITY)));
}

#[test]
fn if_true_keeps_only_then_branch() {
    let mut fx = fixture();
    let body = block(vec![
        if_else(boolean(true), ret(int(1)), ret(int(2))),
    ]);
    let sig = static_sig(vec![], Type::Int);
    let folded = checked_fold(&mut fx, &sig, body).expect("body survives");
    assert_eq!(return_value(&folded).constant(), Some(&Constant::Int(1)));
    // The dead branch is gone entirely.
    fn count_returns(s: &Stmt) -> usize {
        match &s.kind {
            StmtKind::Return { .. } => 1,
            StmtKind::Block(stmts) => stmts.iter().map(count_returns).sum(),
            StmtKind::If { then_branch, else_branch, .. } => {
                count_returns(then_branch)
                    + else_branch.as_ref().map_or(0, |e| count_returns(e))
            }
            _ => 0,
        }
    }
    assert_eq!(count_returns(&folded), 1);
}

#[test]
fn if_false_keeps_only_else_branch() {
    let mut fx = fixture();
    let body = block(vec![
        if_else(boolean(false), ret(int(1)), ret(int(2))),
    ]);
    let sig = static_sig(vec![], Type::Int);
    let folded = checked_fold(&mut fx, &sig, body).expect("body survives");
    assert_eq!(return_value(&folded).constant(), Some(&Constant::Int(2)));
}

#[test]
fn negated_comparison_inverts_operator() {
    let mut fx = fixture();
    // return !(a < b);
    let body = ret(Expr::not(bin(BinOp::Lt, name("a"), name("b")), sp()));
    let sig = static_sig(vec![("a", Type::Int), ("b", Type::Int)], Type::Boolean);
    let folded = checked_fold(&mut fx, &sig, body).expect("body survives");
    assert!(matches!(
        &return_value(&folded).kind,
        ExprKind::Binary { op: BinOp::Ge, .. }
    ));
}

// NaN makes `!(a < b)` and `a >= b` differ, so floats keep the negation
#[test]
fn negated_float_comparison_stays_negated() {
    let mut fx = fixture();
    let body = ret(Expr::not(bin(BinOp::Lt, name("a"), name("b")), sp()));
    let sig = static_sig(vec![("a", Type::Double), ("b", Type::Double)], Type::Boolean);
    let folded = checked_fold(&mut fx, &sig, body).expect("body survives");
    assert!(matches!(
        &return_value(&folded).kind,
        ExprKind::Unary { op: UnOp::Not, .. }
    ));
}

#[test]
fn double_negation_cancels() {
    let mut fx = fixture();
    let body = ret(Expr::not(Expr::not(name("a"), sp()), sp()));
    let sig = static_sig(vec![("a", Type::Boolean)], Type::Boolean);
    let folded = checked_fold(&mut fx, &sig, body).expect("body survives");
    assert!(matches!(&return_value(&folded).kind, ExprKind::Local { .. }));
}

#[test]
fn multiplicative_identity_eliminated() {
    let mut fx = fixture();
    let body = ret(bin(BinOp::Mul, name("a"), int(1)));
    let sig = static_sig(vec![("a", Type::Int)], Type::Int);
    let folded = checked_fold(&mut fx, &sig, body).expect("body survives");
    assert!(matches!(&return_value(&folded).kind, ExprKind::Local { .. }));
}

#[test]
fn and_with_constant_true_collapses() {
    let mut fx = fixture();
    let body = ret(Expr::and(name("a"), boolean(true), sp()));
    let sig = static_sig(vec![("a", Type::Boolean)], Type::Boolean);
    let folded = checked_fold(&mut fx, &sig, body).expect("body survives");
    assert!(matches!(&return_value(&folded).kind, ExprKind::Local { .. }));
}

// `false && f()` never evaluates f(), so the whole thing is `false`
#[test]
fn short_circuit_collapse_drops_unevaluated_side() {
    let mut fx = fixture();
    fx.syms.add_method(
        fx.class,
        treec::syms::MethodInfo {
            name: "f".into(),
            flags: treec::syms::Modifiers::PUBLIC | treec::syms::Modifiers::STATIC,
            params: vec![],
            ret: Type::Boolean,
            throws: vec![],
            body: None,
        },
    );
    let call = Expr::new(
        ExprKind::Call { base: None, name: "f".into(), method: None, args: vec![] },
        sp(),
    );
    let body = ret(Expr::and(boolean(false), call, sp()));
    let sig = static_sig(vec![], Type::Boolean);
    let folded = checked_fold(&mut fx, &sig, body).expect("body survives");
    assert_eq!(return_value(&folded).constant(), Some(&Constant::Bool(false)));
}

// `f() && false` must keep f() for its effects
#[test]
fn side_effecting_left_survives_constant_false() {
    let mut fx = fixture();
    fx.syms.add_method(
        fx.class,
        treec::syms::MethodInfo {
            name: "f".into(),
            flags: treec::syms::Modifiers::PUBLIC | treec::syms::Modifiers::STATIC,
            params: vec![],
            ret: Type::Boolean,
            throws: vec![],
            body: None,
        },
    );
    let call = Expr::new(
        ExprKind::Call { base: None, name: "f".into(), method: None, args: vec![] },
        sp(),
    );
    let body = ret(Expr::and(call, boolean(false), sp()));
    let sig = static_sig(vec![], Type::Boolean);
    let folded = checked_fold(&mut fx, &sig, body).expect("body survives");
    match &return_value(&folded).kind {
        ExprKind::Comma { effect, value } => {
            assert!(matches!(&effect.kind, ExprKind::Call { .. }));
            assert_eq!(value.constant(), Some(&Constant::Bool(false)));
        }
        other => panic!("expected comma residual, got {other:?}"),
    }
}

#[test]
fn pure_discarded_statement_elided() {
    let mut fx = fixture();
    // { a + 1; return 0; }  the first statement computes nothing used
    let body = block(vec![
        Stmt::expr(bin(BinOp::Add, name("a"), int(1))),
        ret(int(0)),
    ]);
    let sig = static_sig(vec![("a", Type::Int)], Type::Int);
    let folded = checked_fold(&mut fx, &sig, body).expect("body survives");
    match &folded.kind {
        StmtKind::Block(stmts) => assert_eq!(stmts.len(), 1),
        other => panic!("expected block, got {other:?}"),
    }
}

#[test]
fn string_concat_folds() {
    let mut fx = fixture();
    let string = fx.syms.predefined.string;
    let body = ret(bin(
        BinOp::Add,
        Expr::literal(Constant::Str("n = ".into()), sp()),
        int(42),
    ));
    let sig = static_sig(vec![], Type::Class(string));
    let folded = checked_fold(&mut fx, &sig, body).expect("body survives");
    assert_eq!(return_value(&folded).constant(), Some(&Constant::Str("n = 42".into())));
}

#[test]
fn constant_static_final_field_reads_as_literal() {
    let mut fx = fixture();
    let class = fx.class;
    fx.syms.add_field(
        class,
        treec::syms::FieldInfo {
            name: "LIMIT".into(),
            ty: Type::Int,
            flags: treec::syms::Modifiers::PUBLIC
                | treec::syms::Modifiers::STATIC
                | treec::syms::Modifiers::FINAL,
            value: Some(Constant::Int(64)),
        },
    );
    let body = ret(name("LIMIT"));
    let sig = static_sig(vec![], Type::Int);
    let folded = checked_fold(&mut fx, &sig, body).expect("body survives");
    assert_eq!(return_value(&folded).constant(), Some(&Constant::Int(64)));
}

// folding is a fixed point: a second pass changes nothing
#[test]
fn folding_is_idempotent() {
    let mut fx = fixture();
    let body = block(vec![
        Stmt::var_decl(
            "v",
            Type::Int,
            Some(bin(BinOp::Mul, bin(BinOp::Add, int(3), int(4)), name("a"))),
            sp(),
        ),
        if_else(boolean(true), ret(name("v")), ret(int(0))),
    ]);
    let sig = static_sig(vec![("a", Type::Int)], Type::Int);
    let mut diags = Diagnostics::new();
    let mut body = body;
    let outcome = check_method(&mut fx.syms, &mut diags, fx.class, &sig, &mut body);
    assert!(!diags.has_errors());
    let opts = Options::default();
    let (once, slots) = fold_method(&fx.syms, &opts, fx.class, outcome.max_slots, body);
    let once = once.expect("body survives");
    let (twice, _) = fold_method(&fx.syms, &opts, fx.class, slots, once.clone());
    let twice = twice.expect("body survives");
    assert_eq!(format!("{once:?}"), format!("{twice:?}"));
}
