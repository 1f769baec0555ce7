//! Condition emission.
//!
//! Boolean expressions are emitted as jumps, not values: `gen_cond(e,
//! target, when)` produces code that transfers to `target` exactly when
//! `e` evaluates to `when` and falls through otherwise. Short-circuit
//! operators chain recursively, negation flips the sense without emitting
//! anything, and constant conditions emit either an unconditional jump or
//! nothing at all. Value-producing uses go through `gen_bool`, which
//! pushes 1/0 around the same jump scheme.

use crate::codegen::code::{Instr, Label, OpType, Test};
use crate::codegen::gen::Gen;
use crate::error::{bug, Result};
use crate::tree::{BinOp, Expr, ExprKind, UnOp};
use crate::types::Constant;

/// Branch test for an int-family comparison.
fn int_test(op: BinOp) -> Test {
    match op {
        BinOp::Lt => Test::IntLt,
        BinOp::Le => Test::IntLe,
        BinOp::Gt => Test::IntGt,
        BinOp::Ge => Test::IntGe,
        BinOp::Eq => Test::IntEq,
        BinOp::Ne => Test::IntNe,
        _ => unreachable!("not a comparison"),
    }
}

/// Branch test against zero, for comparisons routed through `Cmp`.
fn zero_test(op: BinOp) -> Test {
    match op {
        BinOp::Lt => Test::ZeroLt,
        BinOp::Le => Test::ZeroLe,
        BinOp::Gt => Test::ZeroGt,
        BinOp::Ge => Test::ZeroGe,
        BinOp::Eq => Test::ZeroEq,
        BinOp::Ne => Test::ZeroNe,
        _ => unreachable!("not a comparison"),
    }
}

impl Gen<'_> {
    /// Emit code that jumps to `target` when `e` evaluates to `when`.
    pub(crate) fn gen_cond(&mut self, e: &Expr, target: Label, when: bool) -> Result<()> {
        match &e.kind {
            ExprKind::Literal(Constant::Bool(b)) => {
                if *b == when {
                    self.code.emit(Instr::Goto(target));
                }
                Ok(())
            }

            ExprKind::Unary { op: UnOp::Not, arg } => self.gen_cond(arg, target, !when),

            ExprKind::And { left, right } => {
                if when {
                    // Both must hold; the left failing skips the right.
                    let fall = self.code.new_label();
                    self.gen_cond(left, fall, false)?;
                    self.gen_cond(right, target, true)?;
                    self.code.bind(fall);
                } else {
                    self.gen_cond(left, target, false)?;
                    self.gen_cond(right, target, false)?;
                }
                Ok(())
            }

            ExprKind::Or { left, right } => {
                if when {
                    self.gen_cond(left, target, true)?;
                    self.gen_cond(right, target, true)?;
                } else {
                    let fall = self.code.new_label();
                    self.gen_cond(left, fall, true)?;
                    self.gen_cond(right, target, false)?;
                    self.code.bind(fall);
                }
                Ok(())
            }

            ExprKind::Binary { op, left, right } if op.is_comparison() => {
                self.gen_cond_cmp(*op, left, right, target, when)
            }

            ExprKind::Comma { effect, value } => {
                self.gen_discard(effect)?;
                self.gen_cond(value, target, when)
            }

            ExprKind::Conditional { cond, when_true, when_false } => {
                let other = self.code.new_label();
                let done = self.code.new_label();
                self.gen_cond(cond, other, false)?;
                self.gen_cond(when_true, target, when)?;
                self.code.emit(Instr::Goto(done));
                self.code.bind(other);
                self.gen_cond(when_false, target, when)?;
                self.code.bind(done);
                Ok(())
            }

            // Any other boolean-valued expression: materialize and test.
            _ => {
                self.gen_expr(e)?;
                let test = if when { Test::ZeroNe } else { Test::ZeroEq };
                self.code.emit(Instr::Branch { test, target });
                Ok(())
            }
        }
    }

    fn gen_cond_cmp(
        &mut self,
        op: BinOp,
        left: &Expr,
        right: &Expr,
        target: Label,
        when: bool,
    ) -> Result<()> {
        let operand = OpType::of(&left.ty);
        match operand {
            OpType::Int => {
                self.gen_expr(left)?;
                self.gen_expr(right)?;
                let test = if when { int_test(op) } else { int_test(op).negate() };
                self.code.emit(Instr::Branch { test, target });
            }
            OpType::Ref => {
                if !op.is_equality() {
                    bug!("reference comparison with operator {op}");
                }
                // Comparing against the null literal uses the one-operand
                // null tests.
                let (null_form, other) = match (left.constant(), right.constant()) {
                    (Some(Constant::Null), _) => (true, right),
                    (_, Some(Constant::Null)) => (true, left),
                    _ => (false, left),
                };
                if null_form {
                    self.gen_expr(other)?;
                    let test = match (op, when) {
                        (BinOp::Eq, true) | (BinOp::Ne, false) => Test::Null,
                        _ => Test::NonNull,
                    };
                    self.code.emit(Instr::Branch { test, target });
                } else {
                    self.gen_expr(left)?;
                    self.gen_expr(right)?;
                    let test = match (op, when) {
                        (BinOp::Eq, true) | (BinOp::Ne, false) => Test::RefEq,
                        _ => Test::RefNe,
                    };
                    self.code.emit(Instr::Branch { test, target });
                }
            }
            OpType::Long | OpType::Float | OpType::Double => {
                self.gen_expr(left)?;
                self.gen_expr(right)?;
                // NaN direction: `<`/`<=` must see NaN as greater so the
                // comparison comes out false; `>`/`>=` the reverse.
                let nan_is_less = matches!(op, BinOp::Gt | BinOp::Ge);
                self.code.emit(Instr::Cmp { ty: operand, nan_is_less });
                let test = if when { zero_test(op) } else { zero_test(op).negate() };
                self.code.emit(Instr::Branch { test, target });
            }
        }
        Ok(())
    }

    /// Materialize a boolean expression as a 1/0 value on the stack.
    pub(crate) fn gen_bool(&mut self, e: &Expr) -> Result<()> {
        let base = self.code.stack();
        let false_l = self.code.new_label();
        let end = self.code.new_label();
        self.gen_cond(e, false_l, false)?;
        self.code.emit(Instr::Const(Constant::Bool(true)));
        self.code.emit(Instr::Goto(end));
        self.code.set_stack(base);
        self.code.bind(false_l);
        self.code.emit(Instr::Const(Constant::Bool(false)));
        self.code.bind(end);
        Ok(())
    }
}
