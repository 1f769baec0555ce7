//! Constant folding and inlining pass.
//!
//! Runs bottom-up over the checked tree with explicit ownership transfer:
//! every function consumes a node and returns its replacement, and the
//! parent relinks the result. Statement folding may return `None` (the
//! statement is elided entirely) while value folding always returns a
//! node, since the value must still be produced.
//!
//! Simplification is conservative about effects: a discarded operand with
//! potential runtime side effects (invocation, allocation, a dereference
//! that can fault, a division that can trap) survives as a comma residual.

pub mod const_fold;
mod inline;

use crate::syms::{Modifiers, Symtab};
use crate::tree::{BinOp, Case, Expr, ExprKind, Stmt, StmtKind, UnOp};
use crate::types::{ClassId, Constant, Type};
use crate::Options;

/// Fold one member body. Returns the rewritten body (`None` if the whole
/// body folded away) and the updated slot high-water mark, which grows
/// when method inlining introduces fresh locals.
pub fn fold_method(
    syms: &Symtab,
    opts: &Options,
    class: ClassId,
    max_slots: u32,
    body: Stmt,
) -> (Option<Stmt>, u32) {
    let mut folder = Folder { syms, opts, class, next_slot: max_slots, inlining: Vec::new() };
    let folded = folder.fold_stmt(body);
    (folded, folder.next_slot)
}

pub(crate) struct Folder<'a> {
    pub syms: &'a Symtab,
    pub opts: &'a Options,
    /// Class whose member is being compiled; inlined bodies must only
    /// reference members visible from here.
    pub class: ClassId,
    pub next_slot: u32,
    /// Methods currently being expanded, to refuse recursive inlining.
    pub inlining: Vec<crate::syms::MethodRef>,
}

impl Folder<'_> {
    /// Fold a statement. `None` means it can be elided entirely.
    pub fn fold_stmt(&mut self, s: Stmt) -> Option<Stmt> {
        let Stmt { kind, span, labels } = s;
        let kind = match kind {
            StmtKind::Empty => return None,

            StmtKind::Block(stmts) => {
                let folded: Vec<Stmt> = stmts.into_iter().filter_map(|s| self.fold_stmt(s)).collect();
                if folded.is_empty() && labels.is_empty() {
                    return None;
                }
                StmtKind::Block(folded)
            }

            StmtKind::Expr(e) => {
                let e = self.fold_expr(e);
                match self.discard(e) {
                    Some(residual) => StmtKind::Expr(residual),
                    None => return None,
                }
            }

            StmtKind::VarDecl { name, ty, flags, slot, init } => {
                StmtKind::VarDecl { name, ty, flags, slot, init: init.map(|e| self.fold_expr(e)) }
            }

            StmtKind::If { cond, then_branch, else_branch } => {
                let cond = self.fold_expr(cond);
                // The unreachable branch is still folded before being
                // dropped, matching the pass contract.
                let then_branch = self.fold_stmt(*then_branch);
                let else_branch = else_branch.and_then(|e| self.fold_stmt(*e));
                if let Some(Constant::Bool(b)) = cond.constant() {
                    log::trace!("if at {span}: condition is constant {b}, eliminating dead branch");
                    // Labels move onto the surviving branch so breaks
                    // targeting them keep a home.
                    return match if *b { then_branch } else { else_branch } {
                        Some(mut taken) => {
                            taken.labels.extend(labels);
                            Some(taken)
                        }
                        None => None,
                    };
                }
                match (then_branch, else_branch) {
                    (None, None) => {
                        // Only the condition's effects remain.
                        return self.discard(cond).map(|e| {
                            let mut stmt = Stmt::expr(e);
                            stmt.span = span;
                            stmt
                        });
                    }
                    (t, e) => StmtKind::If {
                        cond,
                        then_branch: Box::new(t.unwrap_or_else(|| Stmt::empty(span))),
                        else_branch: e.map(Box::new),
                    },
                }
            }

            StmtKind::While { cond, body } => {
                let cond = self.fold_expr(cond);
                let body = self.fold_stmt(*body);
                if matches!(cond.constant(), Some(Constant::Bool(false))) {
                    return None;
                }
                StmtKind::While {
                    cond,
                    body: Box::new(body.unwrap_or_else(|| Stmt::empty(span))),
                }
            }

            StmtKind::Do { body, cond } => {
                let body = self.fold_stmt(*body).unwrap_or_else(|| Stmt::empty(span));
                let cond = self.fold_expr(cond);
                StmtKind::Do { body: Box::new(body), cond }
            }

            StmtKind::For { init, cond, update, body } => {
                let init = init.and_then(|s| self.fold_stmt(*s));
                let cond = cond.map(|c| self.fold_expr(c));
                let update = update.map(|u| self.fold_expr(u));
                let body = self.fold_stmt(*body);
                if matches!(cond.as_ref().and_then(Expr::constant), Some(Constant::Bool(false))) {
                    // The loop never runs; only the init remains.
                    return init;
                }
                StmtKind::For {
                    init: init.map(Box::new),
                    cond,
                    update,
                    body: Box::new(body.unwrap_or_else(|| Stmt::empty(span))),
                }
            }

            StmtKind::Switch { value, cases } => {
                let value = self.fold_expr(value);
                let cases = cases
                    .into_iter()
                    .map(|c| Case {
                        label: c.label.map(|l| self.fold_expr(l)),
                        span: c.span,
                        body: c.body.into_iter().filter_map(|s| self.fold_stmt(s)).collect(),
                    })
                    .collect();
                StmtKind::Switch { value, cases }
            }

            StmtKind::Break { label } => StmtKind::Break { label },
            StmtKind::Continue { label } => StmtKind::Continue { label },

            StmtKind::Return { value } => StmtKind::Return { value: value.map(|e| self.fold_expr(e)) },
            StmtKind::InlineReturn { value } => {
                StmtKind::InlineReturn { value: value.map(|e| self.fold_expr(e)) }
            }

            StmtKind::Throw { value } => StmtKind::Throw { value: self.fold_expr(value) },

            StmtKind::Try { body, catches } => {
                let body = self.fold_stmt(*body);
                let Some(body) = body else {
                    // An empty protected region throws nothing.
                    return None;
                };
                let catches = catches
                    .into_iter()
                    .map(|mut c| {
                        c.body = self
                            .fold_stmt(c.body)
                            .unwrap_or_else(|| Stmt::empty(c.span));
                        c
                    })
                    .collect();
                StmtKind::Try { body: Box::new(body), catches }
            }

            StmtKind::Finally { body, cleanup } => {
                let body = self.fold_stmt(*body);
                let cleanup = self.fold_stmt(*cleanup);
                match (body, cleanup) {
                    (Some(body), Some(cleanup)) => {
                        StmtKind::Finally { body: Box::new(body), cleanup: Box::new(cleanup) }
                    }
                    // With no cleanup the guard is gone; with no guarded
                    // body the cleanup just runs once. Labels ride along.
                    (Some(mut only), None) | (None, Some(mut only)) => {
                        only.labels.extend(labels);
                        return Some(only);
                    }
                    (None, None) => return None,
                }
            }

            StmtKind::Synchronized { lock, body } => {
                let lock = self.fold_expr(lock);
                // The monitor acquire/release stays even for an empty body.
                let body = self.fold_stmt(*body).unwrap_or_else(|| Stmt::empty(span));
                StmtKind::Synchronized { lock, body: Box::new(body) }
            }
        };
        Some(Stmt { kind, span, labels })
    }

    /// Fold an expression in value context. Never elides: the value must
    /// still be produced.
    pub fn fold_expr(&mut self, e: Expr) -> Expr {
        let Expr { kind, span, ty } = e;
        let kind = match kind {
            ExprKind::Literal(_)
            | ExprKind::Ident(_)
            | ExprKind::Local { .. }
            | ExprKind::This
            | ExprKind::Super
            | ExprKind::Uplevel { .. } => kind,

            ExprKind::Field { base, name, field, access } => {
                let base = base.map(|b| Box::new(self.fold_expr(*b)));
                // A static final with a compile-time constant value reads
                // as its constant; no class initialization is triggered.
                if let Some(fref) = field {
                    let info = self.syms.field(fref);
                    if info.flags.contains(Modifiers::STATIC | Modifiers::FINAL) {
                        if let Some(value) = info.value.clone() {
                            let lit = Expr::typed_literal(value, ty.clone(), span);
                            match base.and_then(|b| self.discard(*b)) {
                                Some(effect) => {
                                    return Expr::comma(effect, lit, span);
                                }
                                None => return lit,
                            }
                        }
                    }
                }
                ExprKind::Field { base, name, field, access }
            }

            ExprKind::ArrayLength { array } => {
                ExprKind::ArrayLength { array: Box::new(self.fold_expr(*array)) }
            }

            ExprKind::Index { array, index } => ExprKind::Index {
                array: Box::new(self.fold_expr(*array)),
                index: Box::new(self.fold_expr(*index)),
            },

            ExprKind::Call { base, name, method, args } => {
                let base = base.map(|b| Box::new(self.fold_expr(*b)));
                let args: Vec<Expr> = args.into_iter().map(|a| self.fold_expr(a)).collect();
                let call = Expr { kind: ExprKind::Call { base, name, method, args }, span, ty };
                return self.try_inline_call(call);
            }

            ExprKind::New { class, ctor, args } => ExprKind::New {
                class,
                ctor,
                args: args.into_iter().map(|a| self.fold_expr(a)).collect(),
            },

            ExprKind::NewArray { elem, dims } => ExprKind::NewArray {
                elem,
                dims: dims.into_iter().map(|d| self.fold_expr(d)).collect(),
            },

            ExprKind::Unary { op, arg } => {
                let arg = self.fold_expr(*arg);
                if let Some(c) = arg.constant() {
                    if let Some(folded) = const_fold::fold_unary(op, c) {
                        return Expr::typed_literal(folded, ty, span);
                    }
                }
                match (op, arg) {
                    // Double negation cancels.
                    (UnOp::Neg, Expr { kind: ExprKind::Unary { op: UnOp::Neg, arg: inner }, .. })
                    | (UnOp::Not, Expr { kind: ExprKind::Unary { op: UnOp::Not, arg: inner }, .. })
                    | (UnOp::BitNot, Expr { kind: ExprKind::Unary { op: UnOp::BitNot, arg: inner }, .. }) => {
                        return *inner;
                    }
                    // !(a < b) becomes a >= b, except for floating
                    // operands where NaN makes the negation invalid.
                    (
                        UnOp::Not,
                        Expr { kind: ExprKind::Binary { op: cmp, left, right }, span: cspan, ty: cty },
                    ) if cmp.is_comparison()
                        && !left.ty.is_floating()
                        && !right.ty.is_floating()
                        && cmp.negate().is_some() =>
                    {
                        return Expr {
                            kind: ExprKind::Binary { op: cmp.negate().expect("comparison"), left, right },
                            span: cspan,
                            ty: cty,
                        };
                    }
                    (op, arg) => ExprKind::Unary { op, arg: Box::new(arg) },
                }
            }

            ExprKind::Binary { op, left, right } => {
                let left = self.fold_expr(*left);
                let right = self.fold_expr(*right);
                if let (Some(l), Some(r)) = (left.constant(), right.constant()) {
                    if let Some(folded) = const_fold::fold_binary(op, l, r) {
                        return Expr::typed_literal(folded, ty, span);
                    }
                }
                match self.simplify_binary(op, left, right, &ty) {
                    Ok(simplified) => return simplified,
                    Err((left, right)) => ExprKind::Binary {
                        op,
                        left: Box::new(left),
                        right: Box::new(right),
                    },
                }
            }

            ExprKind::And { left, right } => {
                let left = self.fold_expr(*left);
                let right = self.fold_expr(*right);
                match left.constant() {
                    // true && x  =>  x;  false && x  =>  false, x never runs
                    Some(Constant::Bool(true)) => return right,
                    Some(Constant::Bool(false)) => {
                        return Expr::typed_literal(Constant::Bool(false), ty, span)
                    }
                    _ => {}
                }
                match right.constant() {
                    // x && true  =>  x;  x && false keeps x for effects
                    Some(Constant::Bool(true)) => return left,
                    Some(Constant::Bool(false)) => {
                        return match self.discard(left) {
                            Some(effect) => {
                                Expr::comma(effect, Expr::typed_literal(Constant::Bool(false), ty, span), span)
                            }
                            None => Expr::typed_literal(Constant::Bool(false), ty, span),
                        };
                    }
                    _ => {}
                }
                ExprKind::And { left: Box::new(left), right: Box::new(right) }
            }

            ExprKind::Or { left, right } => {
                let left = self.fold_expr(*left);
                let right = self.fold_expr(*right);
                match left.constant() {
                    Some(Constant::Bool(false)) => return right,
                    Some(Constant::Bool(true)) => {
                        return Expr::typed_literal(Constant::Bool(true), ty, span)
                    }
                    _ => {}
                }
                match right.constant() {
                    Some(Constant::Bool(false)) => return left,
                    Some(Constant::Bool(true)) => {
                        return match self.discard(left) {
                            Some(effect) => {
                                Expr::comma(effect, Expr::typed_literal(Constant::Bool(true), ty, span), span)
                            }
                            None => Expr::typed_literal(Constant::Bool(true), ty, span),
                        };
                    }
                    _ => {}
                }
                ExprKind::Or { left: Box::new(left), right: Box::new(right) }
            }

            ExprKind::Conditional { cond, when_true, when_false } => {
                let cond = self.fold_expr(*cond);
                let when_true = self.fold_expr(*when_true);
                let when_false = self.fold_expr(*when_false);
                if let Some(Constant::Bool(b)) = cond.constant() {
                    return if *b { when_true } else { when_false };
                }
                ExprKind::Conditional {
                    cond: Box::new(cond),
                    when_true: Box::new(when_true),
                    when_false: Box::new(when_false),
                }
            }

            ExprKind::InstanceOf { value, target } => {
                let value = self.fold_expr(*value);
                // null is an instance of nothing.
                if matches!(value.constant(), Some(Constant::Null)) {
                    return Expr::typed_literal(Constant::Bool(false), ty, span);
                }
                ExprKind::InstanceOf { value: Box::new(value), target }
            }

            ExprKind::Cast { target, value } => {
                let value = self.fold_expr(*value);
                if let Some(c) = value.constant() {
                    if target.is_numeric() {
                        if let Some(folded) = const_fold::coerce(c, &target) {
                            return Expr::typed_literal(folded, ty, span);
                        }
                    }
                }
                ExprKind::Cast { target, value: Box::new(value) }
            }

            ExprKind::Convert { value } => {
                let value = self.fold_expr(*value);
                if let Some(c) = value.constant() {
                    if let Some(folded) = const_fold::coerce(c, &ty) {
                        return Expr::typed_literal(folded, ty, span);
                    }
                }
                ExprKind::Convert { value: Box::new(value) }
            }

            ExprKind::Assign { target, value } => ExprKind::Assign {
                target: Box::new(self.fold_expr(*target)),
                value: Box::new(self.fold_expr(*value)),
            },

            ExprKind::AssignOp { op, target, value } => ExprKind::AssignOp {
                op,
                target: Box::new(self.fold_expr(*target)),
                value: Box::new(self.fold_expr(*value)),
            },

            ExprKind::IncDec { op, target } => {
                ExprKind::IncDec { op, target: Box::new(self.fold_expr(*target)) }
            }

            ExprKind::Comma { effect, value } => {
                let effect = self.fold_expr(*effect);
                let value = self.fold_expr(*value);
                match self.discard(effect) {
                    Some(effect) => ExprKind::Comma { effect: Box::new(effect), value: Box::new(value) },
                    None => return value,
                }
            }

            ExprKind::InlineCall { method, body } => {
                let body = self
                    .fold_stmt(*body)
                    .unwrap_or_else(|| Stmt::empty(span));
                ExprKind::InlineCall { method, body: Box::new(body) }
            }
        };
        Expr { kind, span, ty }
    }

    /// Algebraic identities over one constant operand. `Ok` is the
    /// simplified node, `Err` returns the operands for rebuilding.
    fn simplify_binary(
        &self,
        op: BinOp,
        left: Expr,
        right: Expr,
        ty: &Type,
    ) -> Result<Expr, (Expr, Expr)> {
        fn int_const(e: &Expr) -> Option<i64> {
            match e.constant() {
                Some(Constant::Int(v)) => Some(*v as i64),
                Some(Constant::Long(v)) => Some(*v),
                _ => None,
            }
        }
        let integral = ty.is_integral();
        match op {
            // x + 0, x - 0, 0 + x (integral only; -0.0 breaks the float case)
            BinOp::Add if integral && int_const(&right) == Some(0) => Ok(left),
            BinOp::Add if integral && int_const(&left) == Some(0) => Ok(right),
            BinOp::Sub if integral && int_const(&right) == Some(0) => Ok(left),
            // x * 1, 1 * x, x / 1
            BinOp::Mul if integral && int_const(&right) == Some(1) => Ok(left),
            BinOp::Mul if integral && int_const(&left) == Some(1) => Ok(right),
            BinOp::Div if integral && int_const(&right) == Some(1) => Ok(left),
            // shifts by zero
            BinOp::Shl | BinOp::Shr | BinOp::Ushr if int_const(&right) == Some(0) => Ok(left),
            // boolean &, |, ^ with a constant side (non-short-circuit: both
            // sides always evaluate, so the variable side survives)
            BinOp::BitAnd if ty.is_boolean() => match (left.constant(), right.constant()) {
                (Some(Constant::Bool(true)), _) => Ok(right),
                (_, Some(Constant::Bool(true))) => Ok(left),
                _ => Err((left, right)),
            },
            BinOp::BitOr | BinOp::BitXor if ty.is_boolean() => {
                match (left.constant(), right.constant()) {
                    (Some(Constant::Bool(false)), _) => Ok(right),
                    (_, Some(Constant::Bool(false))) => Ok(left),
                    _ => Err((left, right)),
                }
            }
            _ => Err((left, right)),
        }
    }

    /// Reduce a discarded value to its side effects. `None` when nothing
    /// needs to run at all.
    pub(crate) fn discard(&mut self, e: Expr) -> Option<Expr> {
        if !e.has_side_effects() {
            return None;
        }
        let Expr { kind, span, ty } = e;
        match kind {
            ExprKind::Unary { arg, .. } => self.discard(*arg),
            ExprKind::Convert { value } => self.discard(*value),
            ExprKind::InstanceOf { value, .. } => self.discard(*value),
            ExprKind::Cast { target, value } => {
                if target.is_reference() {
                    // The cast itself can fail and must stay.
                    Some(Expr { kind: ExprKind::Cast { target, value }, span, ty })
                } else {
                    self.discard(*value)
                }
            }
            ExprKind::Binary { op, left, right } => {
                // A division that can trap is itself the side effect and
                // must stay whole.
                let may_trap = matches!(op, BinOp::Div | BinOp::Rem)
                    && ty.is_integral()
                    && !matches!(right.constant(), Some(c) if c.as_i64().is_some_and(|v| v != 0));
                if may_trap {
                    return Some(Expr { kind: ExprKind::Binary { op, left, right }, span, ty });
                }
                match (self.discard(*left), self.discard(*right)) {
                    (None, None) => None,
                    (Some(one), None) | (None, Some(one)) => Some(one),
                    (Some(l), Some(r)) => Some(Expr::comma(l, r, span)),
                }
            }
            ExprKind::Comma { effect, value } => match (self.discard(*effect), self.discard(*value)) {
                (None, None) => None,
                (Some(one), None) | (None, Some(one)) => Some(one),
                (Some(l), Some(r)) => Some(Expr::comma(l, r, span)),
            },
            kind => Some(Expr { kind, span, ty }),
        }
    }
}
