//! Definite-assignment and reachability checking over hand-built bodies.

mod common;

use common::*;
use treec::diag::keys;
use treec::tree::{BinOp, Expr, Stmt, StmtKind};
use treec::types::Type;
use treec::{compile_method, Options};

fn opts() -> Options {
    Options::default()
}

// all paths assign before use: the default case completes the cover
#[test]
fn switch_with_default_establishes_da() {
    let mut fx = fixture();
    let body = block(vec![
        Stmt::var_decl("v", Type::Int, None, sp()),
        switch(
            name("x"),
            vec![
                case(0, vec![assign_stmt("v", int(1)), brk()]),
                default_case(vec![assign_stmt("v", int(2)), brk()]),
            ],
        ),
        Stmt::var_decl("y", Type::Int, Some(name("v")), sp()),
    ]);
    let sig = static_sig(vec![("x", Type::Int)], Type::Void);
    compile_method(&mut fx.syms, &opts(), fx.class, &sig, body).expect("expected ok");
}

// no default: some path skips every case, so v may be unassigned after
#[test]
fn switch_without_default_does_not_establish_da() {
    let mut fx = fixture();
    let body = block(vec![
        Stmt::var_decl("v", Type::Int, None, sp()),
        switch(
            name("x"),
            vec![
                case(0, vec![assign_stmt("v", int(1)), brk()]),
                case(1, vec![assign_stmt("v", int(2)), brk()]),
            ],
        ),
        Stmt::var_decl("y", Type::Int, Some(name("v")), sp()),
    ]);
    let sig = static_sig(vec![("x", Type::Int)], Type::Void);
    let err = compile_method(&mut fx.syms, &opts(), fx.class, &sig, body).unwrap_err();
    assert!(error_keys(&err).contains(&keys::VAR_UNASSIGNED));
}

#[test]
fn duplicate_case_labels_rejected() {
    let mut fx = fixture();
    let body = switch(
        name("x"),
        vec![case(3, vec![brk()]), case(3, vec![brk()])],
    );
    let sig = static_sig(vec![("x", Type::Int)], Type::Void);
    let err = compile_method(&mut fx.syms, &opts(), fx.class, &sig, body).unwrap_err();
    assert!(error_keys(&err).contains(&keys::DUPLICATE_CASE));
}

// switch on byte: a label outside the byte range can never match
#[test]
fn case_label_out_of_switch_type_range() {
    let mut fx = fixture();
    let body = switch(name("x"), vec![case(200, vec![brk()])]);
    let sig = static_sig(vec![("x", Type::Byte)], Type::Void);
    let err = compile_method(&mut fx.syms, &opts(), fx.class, &sig, body).unwrap_err();
    assert!(error_keys(&err).contains(&keys::CASE_OUT_OF_RANGE));
}

#[test]
fn use_before_assignment_rejected() {
    let mut fx = fixture();
    let body = block(vec![
        Stmt::var_decl("v", Type::Int, None, sp()),
        ret(name("v")),
    ]);
    let sig = static_sig(vec![], Type::Int);
    let err = compile_method(&mut fx.syms, &opts(), fx.class, &sig, body).unwrap_err();
    assert!(error_keys(&err).contains(&keys::VAR_UNASSIGNED));
}

// assignment on only one branch of an if leaves the join unassigned
#[test]
fn conditional_assignment_is_not_definite() {
    let mut fx = fixture();
    let body = block(vec![
        Stmt::var_decl("v", Type::Int, None, sp()),
        if_stmt(name("c"), assign_stmt("v", int(1))),
        ret(name("v")),
    ]);
    let sig = static_sig(vec![("c", Type::Boolean)], Type::Int);
    let err = compile_method(&mut fx.syms, &opts(), fx.class, &sig, body).unwrap_err();
    assert!(error_keys(&err).contains(&keys::VAR_UNASSIGNED));
}

#[test]
fn both_branches_assigning_is_definite() {
    let mut fx = fixture();
    let body = block(vec![
        Stmt::var_decl("v", Type::Int, None, sp()),
        if_else(name("c"), assign_stmt("v", int(1)), assign_stmt("v", int(2))),
        ret(name("v")),
    ]);
    let sig = static_sig(vec![("c", Type::Boolean)], Type::Int);
    compile_method(&mut fx.syms, &opts(), fx.class, &sig, body).expect("expected ok");
}

// short-circuit &&: the right operand's assignments hold only when the
// whole condition was true
#[test]
fn and_condition_splits_flow() {
    let mut fx = fixture();
    // if (c && (v = 1) > 0) return v;  return 0;
    let cond = Expr::and(
        name("c"),
        bin(BinOp::Gt, Expr::assign(name("v"), int(1), sp()), int(0)),
        sp(),
    );
    let body = block(vec![
        Stmt::var_decl("v", Type::Int, None, sp()),
        if_stmt(cond, ret(name("v"))),
        ret(int(0)),
    ]);
    let sig = static_sig(vec![("c", Type::Boolean)], Type::Int);
    compile_method(&mut fx.syms, &opts(), fx.class, &sig, body).expect("expected ok");
}

// symmetric case: after `c || (v = 1) > 0` the false branch saw the
// assignment but the true branch may not have
#[test]
fn or_condition_false_branch_sees_assignment() {
    let mut fx = fixture();
    let cond = Expr::or(
        name("c"),
        bin(BinOp::Gt, Expr::assign(name("v"), int(1), sp()), int(0)),
        sp(),
    );
    let body = block(vec![
        Stmt::var_decl("v", Type::Int, None, sp()),
        if_else(cond, ret(int(0)), ret(name("v"))),
    ]);
    let sig = static_sig(vec![("c", Type::Boolean)], Type::Int);
    compile_method(&mut fx.syms, &opts(), fx.class, &sig, body).expect("expected ok");

    // And using it on the true branch must fail.
    let mut fx = fixture();
    let cond = Expr::or(
        name("c"),
        bin(BinOp::Gt, Expr::assign(name("v"), int(1), sp()), int(0)),
        sp(),
    );
    let body = block(vec![
        Stmt::var_decl("v", Type::Int, None, sp()),
        if_else(cond, ret(name("v")), ret(int(0))),
    ]);
    let sig = static_sig(vec![("c", Type::Boolean)], Type::Int);
    let err = compile_method(&mut fx.syms, &opts(), fx.class, &sig, body).unwrap_err();
    assert!(error_keys(&err).contains(&keys::VAR_UNASSIGNED));
}

// a blank final assigned before the loop and conditionally re-assigned
// inside it is a definite-unassignment violation
#[test]
fn blank_final_reassigned_in_loop() {
    let mut fx = fixture();
    let body = block(vec![
        Stmt::final_var_decl("f", Type::Int, None, sp()),
        assign_stmt("f", int(1)),
        while_loop(name("c"), if_stmt(name("c"), assign_stmt("f", int(2)))),
    ]);
    let sig = static_sig(vec![("c", Type::Boolean)], Type::Void);
    let err = compile_method(&mut fx.syms, &opts(), fx.class, &sig, body).unwrap_err();
    assert!(error_keys(&err).contains(&keys::FINAL_REASSIGNED));
}

// assigned only inside the loop body: legal per iteration, but the back
// edge could run the assignment twice
#[test]
fn blank_final_assigned_on_back_edge() {
    let mut fx = fixture();
    let body = block(vec![
        Stmt::final_var_decl("f", Type::Int, None, sp()),
        while_loop(name("c"), assign_stmt("f", int(1))),
    ]);
    let sig = static_sig(vec![("c", Type::Boolean)], Type::Void);
    let err = compile_method(&mut fx.syms, &opts(), fx.class, &sig, body).unwrap_err();
    assert!(error_keys(&err).contains(&keys::FINAL_ASSIGNED_IN_LOOP));
}

#[test]
fn blank_final_single_assignment_ok() {
    let mut fx = fixture();
    let body = block(vec![
        Stmt::final_var_decl("f", Type::Int, None, sp()),
        if_else(name("c"), assign_stmt("f", int(1)), assign_stmt("f", int(2))),
        ret(name("f")),
    ]);
    let sig = static_sig(vec![("c", Type::Boolean)], Type::Int);
    compile_method(&mut fx.syms, &opts(), fx.class, &sig, body).expect("expected ok");
}

// statements after a loop that never exits are unreachable
#[test]
fn statement_after_infinite_loop_unreachable() {
    let mut fx = fixture();
    fx.add_touch();
    let body = block(vec![
        while_loop(boolean(true), call_touch()),
        call_touch(),
    ]);
    let sig = static_sig(vec![], Type::Void);
    let err = compile_method(&mut fx.syms, &opts(), fx.class, &sig, body).unwrap_err();
    assert!(error_keys(&err).contains(&keys::UNREACHABLE_STMT));
}

#[test]
fn statement_after_return_unreachable() {
    let mut fx = fixture();
    fx.add_touch();
    let body = block(vec![Stmt::ret(None, sp()), call_touch()]);
    let sig = static_sig(vec![], Type::Void);
    let err = compile_method(&mut fx.syms, &opts(), fx.class, &sig, body).unwrap_err();
    assert!(error_keys(&err).contains(&keys::UNREACHABLE_STMT));
}

// a value-returning method must not fall off the end
#[test]
fn missing_return_detected() {
    let mut fx = fixture();
    let body = block(vec![if_stmt(name("c"), ret(int(1)))]);
    let sig = static_sig(vec![("c", Type::Boolean)], Type::Int);
    let err = compile_method(&mut fx.syms, &opts(), fx.class, &sig, body).unwrap_err();
    assert!(error_keys(&err).contains(&keys::MISSING_RETURN));
}

// catch entry weakens flow: an assignment inside the try may not have
// happened when the handler runs
#[test]
fn catch_entry_does_not_trust_try_assignments() {
    let mut fx = fixture();
    fx.add_touch();
    let throwable = fx.syms.predefined.throwable;
    let body = block(vec![
        Stmt::var_decl("v", Type::Int, None, sp()),
        Stmt::new(
            StmtKind::Try {
                body: Box::new(block(vec![
                    call_touch(),
                    assign_stmt("v", int(1)),
                    call_touch(),
                ])),
                catches: vec![treec::tree::Catch {
                    param: "e".into(),
                    ty: Type::Class(throwable),
                    slot: 0,
                    body: ret(name("v")),
                    span: sp(),
                }],
            },
            sp(),
        ),
        ret(int(0)),
    ]);
    let sig = static_sig(vec![], Type::Int);
    let err = compile_method(&mut fx.syms, &opts(), fx.class, &sig, body).unwrap_err();
    assert!(error_keys(&err).contains(&keys::VAR_UNASSIGNED));
}

// ... but an assignment made before the try is definite in the handler
#[test]
fn catch_entry_keeps_pre_try_assignments() {
    let mut fx = fixture();
    fx.add_touch();
    let throwable = fx.syms.predefined.throwable;
    let body = block(vec![
        Stmt::var_decl("v", Type::Int, Some(int(5)), sp()),
        Stmt::new(
            StmtKind::Try {
                body: Box::new(block(vec![call_touch()])),
                catches: vec![treec::tree::Catch {
                    param: "e".into(),
                    ty: Type::Class(throwable),
                    slot: 0,
                    body: ret(name("v")),
                    span: sp(),
                }],
            },
            sp(),
        ),
        ret(name("v")),
    ]);
    let sig = static_sig(vec![], Type::Int);
    compile_method(&mut fx.syms, &opts(), fx.class, &sig, body).expect("expected ok");
}

// a finally that returns supersedes the guarded body's pending return:
// the method checks out even though the try body also returns
#[test]
fn finally_return_supersedes_body() {
    let mut fx = fixture();
    let body = try_finally(ret(int(1)), ret(int(2)));
    let sig = static_sig(vec![], Type::Int);
    compile_method(&mut fx.syms, &opts(), fx.class, &sig, body).expect("expected ok");
}

#[test]
fn break_outside_loop_rejected() {
    let mut fx = fixture();
    let body = block(vec![brk()]);
    let sig = static_sig(vec![], Type::Void);
    let err = compile_method(&mut fx.syms, &opts(), fx.class, &sig, body).unwrap_err();
    assert!(error_keys(&err).contains(&keys::BREAK_OUTSIDE));
}

#[test]
fn duplicate_label_rejected() {
    let mut fx = fixture();
    fx.add_touch();
    let inner = Stmt::labeled(
        StmtKind::While { cond: name("c"), body: Box::new(call_touch()) },
        sp(),
        vec!["again".into()],
    );
    let outer = Stmt::labeled(
        StmtKind::While { cond: name("c"), body: Box::new(inner) },
        sp(),
        vec!["again".into()],
    );
    let sig = static_sig(vec![("c", Type::Boolean)], Type::Void);
    let err = compile_method(&mut fx.syms, &opts(), fx.class, &sig, outer).unwrap_err();
    assert!(error_keys(&err).contains(&keys::DUPLICATE_LABEL));
}

#[test]
fn labeled_break_targets_outer_loop() {
    let mut fx = fixture();
    fx.add_touch();
    let inner = while_loop(
        name("c"),
        Stmt::new(StmtKind::Break { label: Some("outer".into()) }, sp()),
    );
    let outer = Stmt::labeled(
        StmtKind::While { cond: name("c"), body: Box::new(inner) },
        sp(),
        vec!["outer".into()],
    );
    let sig = static_sig(vec![("c", Type::Boolean)], Type::Void);
    compile_method(&mut fx.syms, &opts(), fx.class, &sig, outer).expect("expected ok");
}

// checked exceptions must be caught or declared
#[test]
fn unreported_checked_exception() {
    let mut fx = fixture();
    let exception = fx.syms.predefined.exception;
    let body = Stmt::new(
        StmtKind::Throw {
            value: Expr::new(
                treec::tree::ExprKind::New { class: exception, ctor: None, args: vec![] },
                sp(),
            ),
        },
        sp(),
    );
    let sig = static_sig(vec![], Type::Void);
    let err = compile_method(&mut fx.syms, &opts(), fx.class, &sig, body).unwrap_err();
    assert!(error_keys(&err).contains(&keys::UNCAUGHT_EXCEPTION));
}

#[test]
fn runtime_exceptions_need_no_declaration() {
    let mut fx = fixture();
    let runtime = fx.syms.predefined.runtime_exception;
    let body = Stmt::new(
        StmtKind::Throw {
            value: Expr::new(
                treec::tree::ExprKind::New { class: runtime, ctor: None, args: vec![] },
                sp(),
            ),
        },
        sp(),
    );
    let sig = static_sig(vec![], Type::Void);
    compile_method(&mut fx.syms, &opts(), fx.class, &sig, body).expect("expected ok");
}
