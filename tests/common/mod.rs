//! Shared helpers for building member bodies by hand, standing in for the
//! parser collaborator.

// Each integration binary pulls in the subset it needs.
#![allow(dead_code)]

use treec::check::MethodSig;
use treec::span::Span;
use treec::syms::Modifiers;
use treec::tree::{BinOp, Case, Expr, Stmt, StmtKind};
use treec::types::{ClassId, Constant, Type};
use treec::{Diagnostic, Error, Symtab};

pub fn sp() -> Span {
    Span::default()
}

pub fn int(v: i32) -> Expr {
    Expr::literal(Constant::Int(v), sp())
}

pub fn boolean(v: bool) -> Expr {
    Expr::literal(Constant::Bool(v), sp())
}

pub fn name(n: &str) -> Expr {
    Expr::ident(n, sp())
}

pub fn bin(op: BinOp, l: Expr, r: Expr) -> Expr {
    Expr::binary(op, l, r, sp())
}

pub fn assign_stmt(target: &str, value: Expr) -> Stmt {
    Stmt::expr(Expr::assign(name(target), value, sp()))
}

pub fn block(stmts: Vec<Stmt>) -> Stmt {
    Stmt::block(stmts, sp())
}

pub fn ret(value: Expr) -> Stmt {
    Stmt::ret(Some(value), sp())
}

pub fn brk() -> Stmt {
    Stmt::new(StmtKind::Break { label: None }, sp())
}

pub fn case(value: i32, body: Vec<Stmt>) -> Case {
    Case { label: Some(int(value)), span: sp(), body }
}

pub fn default_case(body: Vec<Stmt>) -> Case {
    Case { label: None, span: sp(), body }
}

pub fn switch(value: Expr, cases: Vec<Case>) -> Stmt {
    Stmt::new(StmtKind::Switch { value, cases }, sp())
}

pub fn while_loop(cond: Expr, body: Stmt) -> Stmt {
    Stmt::new(StmtKind::While { cond, body: Box::new(body) }, sp())
}

pub fn if_stmt(cond: Expr, then_branch: Stmt) -> Stmt {
    Stmt::new(
        StmtKind::If { cond, then_branch: Box::new(then_branch), else_branch: None },
        sp(),
    )
}

pub fn if_else(cond: Expr, then_branch: Stmt, else_branch: Stmt) -> Stmt {
    Stmt::new(
        StmtKind::If {
            cond,
            then_branch: Box::new(then_branch),
            else_branch: Some(Box::new(else_branch)),
        },
        sp(),
    )
}

pub fn try_finally(body: Stmt, cleanup: Stmt) -> Stmt {
    Stmt::new(StmtKind::Finally { body: Box::new(body), cleanup: Box::new(cleanup) }, sp())
}

/// A test fixture: one class with an int parameterization-friendly shape.
pub struct Fixture {
    pub syms: Symtab,
    pub class: ClassId,
}

pub fn fixture() -> Fixture {
    // RUST_LOG=debug surfaces the per-pass tracing during test runs.
    let _ = env_logger::builder().is_test(true).try_init();
    let mut syms = Symtab::new();
    let object = syms.predefined.object;
    let class = syms.define_class("T", Some(object), Modifiers::PUBLIC);
    Fixture { syms, class }
}

impl Fixture {
    /// Add `static void touch()` with no inlinable body; calls to it
    /// survive folding, which keeps cleanup blocks alive in tests.
    pub fn add_touch(&mut self) -> treec::syms::MethodRef {
        self.syms.add_method(
            self.class,
            treec::syms::MethodInfo {
                name: "touch".into(),
                flags: Modifiers::PUBLIC | Modifiers::STATIC,
                params: vec![],
                ret: Type::Void,
                throws: vec![],
                body: None,
            },
        )
    }
}

pub fn call_touch() -> Stmt {
    Stmt::expr(Expr::new(
        treec::tree::ExprKind::Call { base: None, name: "touch".into(), method: None, args: vec![] },
        sp(),
    ))
}

pub fn static_sig(params: Vec<(&str, Type)>, ret: Type) -> MethodSig {
    MethodSig {
        ret,
        throws: vec![],
        params: params.into_iter().map(|(n, t)| (n.to_string(), t)).collect(),
        is_static: true,
        is_ctor: false,
    }
}

/// Diagnostic keys from a semantic failure.
pub fn error_keys(err: &Error) -> Vec<&'static str> {
    match err {
        Error::Semantic { diagnostics } => diagnostics.iter().map(|d| d.key).collect(),
        Error::Internal { message } => panic!("internal error: {message}"),
    }
}

pub fn assert_has_key(diags: &[Diagnostic], key: &str) {
    assert!(
        diags.iter().any(|d| d.key == key),
        "expected diagnostic `{key}`, got: {:?}",
        diags.iter().map(|d| d.key).collect::<Vec<_>>()
    );
}
