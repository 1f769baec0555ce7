//! Statement checking: reachability, definite assignment through control
//! flow, loop back-branch rules, switch label validation, and the
//! try/catch/finally flow weakening.

use std::collections::HashSet;

use crate::check::expr::CondBits;
use crate::check::flowbits::FlowBits;
use crate::check::context::FrameKind;
use crate::check::Checker;
use crate::diag::keys;
use crate::fold::const_fold;
use crate::span::Span;
use crate::syms::Modifiers;
use crate::tree::{Stmt, StmtKind};
use crate::types::Type;

impl Checker<'_> {
    /// Check one statement. The returned flow reflects the state after it,
    /// accounting for early exits; the dead-end sentinel means it cannot
    /// complete normally.
    pub(crate) fn check_stmt(&mut self, s: &mut Stmt, flow: FlowBits) -> FlowBits {
        // Any labeled statement is a break target. Loops and switches fold
        // their labels into their own frame; everything else gets a
        // dedicated one.
        let needs_label_frame = !s.labels.is_empty()
            && !matches!(
                s.kind,
                StmtKind::While { .. } | StmtKind::Do { .. } | StmtKind::For { .. } | StmtKind::Switch { .. }
            );
        if needs_label_frame {
            self.ctx.push_scope(FrameKind::Labeled, s.labels.clone(), s.span, self.diags);
        }
        let mut out = self.check_stmt_kind(s, flow);
        if needs_label_frame {
            let frame = self.ctx.pop_scope(&mut out);
            out = out.join(&frame.flow_at_break);
        }
        // A handler of the innermost protected region can take over at any
        // statement boundary.
        self.ctx.record_try_boundary(&out);
        out
    }

    fn check_stmt_kind(&mut self, s: &mut Stmt, flow: FlowBits) -> FlowBits {
        let span = s.span;
        match &mut s.kind {
            StmtKind::Empty => flow,

            StmtKind::Block(stmts) => {
                self.ctx.push_scope(FrameKind::Block, vec![], span, self.diags);
                let entered_dead = flow.is_dead_end();
                let mut flow = flow;
                let mut reported = false;
                for stmt in stmts.iter_mut() {
                    if flow.is_dead_end() && !entered_dead && !reported {
                        self.diags.error(stmt.span, keys::UNREACHABLE_STMT, vec![]);
                        reported = true;
                    }
                    flow = self.check_stmt(stmt, flow);
                }
                self.ctx.pop_scope(&mut flow);
                flow
            }

            StmtKind::Expr(e) => self.check_expr(e, flow),

            StmtKind::VarDecl { name, ty, flags, slot, init } => {
                let declared = self.ctx.declare(name, ty.clone(), *flags, span, self.diags);
                *slot = declared;
                let mut flow = flow;
                if let Some(init) = init {
                    flow = self.check_expr(init, flow);
                    self.require_value(init);
                    self.coerce(init, ty);
                    flow.assign(declared);
                }
                flow
            }

            StmtKind::If { cond, then_branch, else_branch } => {
                let cv = self.check_cond(cond, flow);
                let t = self.check_stmt(then_branch, cv.when_true);
                let f = match else_branch {
                    Some(e) => self.check_stmt(e, cv.when_false),
                    None => cv.when_false,
                };
                t.join(&f)
            }

            StmtKind::While { cond, body } => {
                let entry = flow.clone();
                self.ctx.push_scope(FrameKind::Loop, s.labels.clone(), span, self.diags);
                let cv = self.check_cond(cond, flow);
                let body_out = self.check_stmt(body, cv.when_true);
                let mut exit = cv.when_false;
                let frame = self.ctx.pop_scope(&mut exit);
                let back = body_out.join(&frame.flow_at_continue);
                self.check_back_branch(&entry, &back, span);
                exit.join(&frame.flow_at_break)
            }

            StmtKind::Do { body, cond } => {
                let entry = flow.clone();
                self.ctx.push_scope(FrameKind::Loop, s.labels.clone(), span, self.diags);
                let body_out = self.check_stmt(body, flow);
                // The condition re-runs after the body or after a continue.
                let cont = self.ctx.top().flow_at_continue.clone();
                let cv = self.check_cond(cond, body_out.join(&cont));
                let mut exit = cv.when_false;
                let frame = self.ctx.pop_scope(&mut exit);
                self.check_back_branch(&entry, &cv.when_true, span);
                exit.join(&frame.flow_at_break)
            }

            StmtKind::For { init, cond, update, body } => {
                // The init declaration scope covers the whole loop.
                self.ctx.push_scope(FrameKind::Block, vec![], span, self.diags);
                let mut flow = flow;
                if let Some(init) = init {
                    flow = self.check_stmt(init, flow);
                }
                let entry = flow.clone();
                self.ctx.push_scope(FrameKind::Loop, s.labels.clone(), span, self.diags);
                let cv = match cond {
                    Some(c) => self.check_cond(c, flow),
                    // No condition reads as `true`: the loop can only be
                    // left through a break.
                    None => CondBits { when_true: flow, when_false: FlowBits::dead_end() },
                };
                let body_out = self.check_stmt(body, cv.when_true);
                let cont = self.ctx.top().flow_at_continue.clone();
                let mut back = body_out.join(&cont);
                if let Some(u) = update {
                    back = self.check_expr(u, back);
                }
                let mut exit = cv.when_false;
                let frame = self.ctx.pop_scope(&mut exit);
                self.check_back_branch(&entry, &back, span);
                let mut out = exit.join(&frame.flow_at_break);
                self.ctx.pop_scope(&mut out);
                out
            }

            StmtKind::Switch { .. } => self.check_switch(s, flow),

            StmtKind::Break { label } => {
                match self.ctx.break_target(label.as_deref()) {
                    Some(target) => {
                        self.ctx.record_exit_through(target, &flow);
                        let frame = self.ctx.frame_at(target);
                        let acc = std::mem::replace(&mut frame.flow_at_break, FlowBits::dead_end());
                        frame.flow_at_break = acc.join(&flow);
                    }
                    None => {
                        let key = if label.is_some() { keys::UNDEFINED_LABEL } else { keys::BREAK_OUTSIDE };
                        self.diags.error(span, key, label.iter().cloned().collect());
                    }
                }
                FlowBits::dead_end()
            }

            StmtKind::Continue { label } => {
                match self.ctx.continue_target(label.as_deref()) {
                    Some(target) => {
                        self.ctx.record_exit_through(target, &flow);
                        let frame = self.ctx.frame_at(target);
                        let acc = std::mem::replace(&mut frame.flow_at_continue, FlowBits::dead_end());
                        frame.flow_at_continue = acc.join(&flow);
                    }
                    None => {
                        let key = if label.is_some() { keys::UNDEFINED_LABEL } else { keys::CONTINUE_OUTSIDE };
                        self.diags.error(span, key, label.iter().cloned().collect());
                    }
                }
                FlowBits::dead_end()
            }

            StmtKind::Return { value } | StmtKind::InlineReturn { value } => {
                let ret = self.ctx.method_return();
                let mut flow = flow;
                match (value.as_mut(), ret.is_void()) {
                    (Some(v), false) => {
                        flow = self.check_expr(v, flow);
                        self.require_value(v);
                        self.coerce(v, &ret);
                    }
                    (Some(v), true) => {
                        flow = self.check_expr(v, flow);
                        self.diags.error(span, keys::RETURN_VALUE_UNEXPECTED, vec![]);
                    }
                    (None, false) => {
                        if !ret.is_error() {
                            self.diags.error(span, keys::RETURN_VALUE_MISSING, vec![]);
                        }
                    }
                    (None, true) => {}
                }
                if let Some(method) = self.ctx.method_frame() {
                    self.ctx.record_exit_through(method, &flow);
                }
                FlowBits::dead_end()
            }

            StmtKind::Throw { value } => {
                let flow = self.check_expr(value, flow);
                match value.ty.clone() {
                    Type::Class(c) if self.syms.is_subclass(c, self.syms.predefined.throwable) => {
                        self.raise_exception(c, span);
                    }
                    Type::Error => {}
                    other => {
                        self.diags.error(value.span, keys::THROW_NOT_THROWABLE, vec![other.to_string()]);
                    }
                }
                if let Some(method) = self.ctx.method_frame() {
                    self.ctx.record_exit_through(method, &flow);
                }
                FlowBits::dead_end()
            }

            StmtKind::Try { .. } => self.check_try(s, flow),
            StmtKind::Finally { .. } => self.check_finally(s, flow),

            StmtKind::Synchronized { lock, body } => {
                let flow = self.check_expr(lock, flow);
                if !lock.ty.is_reference() && !lock.ty.is_error() {
                    self.diags.error(lock.span, keys::MONITOR_NOT_REFERENCE, vec![lock.ty.to_string()]);
                }
                self.ctx.push_scope(FrameKind::Synchronized, vec![], span, self.diags);
                let mut out = self.check_stmt(body, flow);
                self.ctx.pop_scope(&mut out);
                out
            }
        }
    }

    /// After a loop body, a blank final that was definitely unassigned on
    /// entry must still be definitely unassigned on the back edge;
    /// otherwise a second iteration could assign it again. Every variable
    /// in scope is examined, not just the loop's own declarations.
    fn check_back_branch(&mut self, entry: &FlowBits, back: &FlowBits, span: Span) {
        if back.is_dead_end() {
            return;
        }
        for var in self.ctx.visible_vars() {
            if var.is_final() && entry.is_unassigned(var.slot) && !back.is_unassigned(var.slot) {
                self.diags.error(span, keys::FINAL_ASSIGNED_IN_LOOP, vec![var.name.clone()]);
            }
        }
    }

    fn check_switch(&mut self, s: &mut Stmt, flow: FlowBits) -> FlowBits {
        let span = s.span;
        let labels = s.labels.clone();
        let StmtKind::Switch { value, cases } = &mut s.kind else { unreachable!() };
        let mut flow = self.check_expr(value, flow);
        let switch_ty = value.ty.clone();
        let range = switch_ty.int_range();
        if range.is_none() && !switch_ty.is_error() {
            self.diags.error(value.span, keys::SWITCH_TYPE, vec![switch_ty.to_string()]);
        }
        self.ctx.push_scope(FrameKind::Switch, labels, span, self.diags);
        let entry = flow.clone();
        let mut seen = HashSet::new();
        let mut has_default = false;
        let mut fall = FlowBits::dead_end();
        for case in cases.iter_mut() {
            match &mut case.label {
                Some(label) => {
                    let _ = self.check_expr(label, entry.clone());
                    match const_fold::const_value(label).and_then(|c| c.as_i64()) {
                        Some(v) => {
                            if let Some((lo, hi)) = range {
                                // A label outside the switch type's value
                                // range can never match.
                                if v < lo || v > hi {
                                    self.diags.error(label.span, keys::CASE_OUT_OF_RANGE, vec![v.to_string()]);
                                }
                            }
                            if !seen.insert(v) {
                                self.diags.error(label.span, keys::DUPLICATE_CASE, vec![v.to_string()]);
                            }
                        }
                        None => {
                            if !label.ty.is_error() {
                                self.diags.error(label.span, keys::CONSTANT_REQUIRED, vec![]);
                            }
                        }
                    }
                }
                None => {
                    if has_default {
                        self.diags.error(case.span, keys::DUPLICATE_DEFAULT, vec![]);
                    }
                    has_default = true;
                }
            }
            // The dispatch can enter here directly, and the previous case
            // can fall through.
            let mut case_flow = entry.clone().join(&fall);
            for stmt in case.body.iter_mut() {
                case_flow = self.check_stmt(stmt, case_flow);
            }
            fall = case_flow;
        }
        let mut out = fall;
        let frame = self.ctx.pop_scope(&mut out);
        out = out.join(&frame.flow_at_break);
        if !has_default {
            // Without a default, the dispatch itself can fall out past
            // every case.
            out = out.join(&entry);
        }
        out
    }

    fn check_try(&mut self, s: &mut Stmt, flow: FlowBits) -> FlowBits {
        let span = s.span;
        let StmtKind::Try { body, catches } = &mut s.kind else { unreachable!() };
        let catch_tys: Vec<Type> = catches.iter().map(|c| c.ty.clone()).collect();
        self.ctx.push_scope(
            FrameKind::TryBody { catches: catch_tys, thrown: Vec::new() },
            vec![],
            span,
            self.diags,
        );
        // The handler can run before the first statement executes.
        self.ctx.record_try_boundary(&flow);
        let body_out = self.check_stmt(body, flow);
        let mut body_out = body_out;
        let frame = self.ctx.pop_scope(&mut body_out);
        let handler_entry = frame.flow_at_try_exit;
        // Prefix points of this region are prefix points of an enclosing
        // protected region too.
        self.ctx.record_try_boundary(&handler_entry);

        let mut out = body_out;
        for catch in catches.iter_mut() {
            if !matches!(&catch.ty, Type::Class(c) if self.syms.is_subclass(*c, self.syms.predefined.throwable))
                && !catch.ty.is_error()
            {
                self.diags.error(catch.span, keys::THROW_NOT_THROWABLE, vec![catch.ty.to_string()]);
            }
            self.ctx.push_scope(FrameKind::Block, vec![], catch.span, self.diags);
            catch.slot =
                self.ctx.declare(&catch.param, catch.ty.clone(), Modifiers::empty(), catch.span, self.diags);
            let mut catch_entry = handler_entry.clone();
            catch_entry.assign(catch.slot);
            let mut catch_out = self.check_stmt(&mut catch.body, catch_entry);
            self.ctx.pop_scope(&mut catch_out);
            out = out.join(&catch_out);
        }
        out
    }

    fn check_finally(&mut self, s: &mut Stmt, flow: FlowBits) -> FlowBits {
        let span = s.span;
        let StmtKind::Finally { body, cleanup } = &mut s.kind else { unreachable!() };
        self.ctx.push_scope(FrameKind::FinallyGuard { pending: Vec::new() }, vec![], span, self.diags);
        self.ctx.record_try_boundary(&flow);
        let mut body_out = self.check_stmt(body, flow);
        let frame = self.ctx.pop_scope(&mut body_out);
        let handler_entry = frame.flow_at_try_exit;
        let pending = match frame.kind {
            FrameKind::FinallyGuard { pending } => pending,
            _ => unreachable!(),
        };
        self.ctx.record_try_boundary(&handler_entry);

        // The cleanup can run after any prefix of the guarded region, so
        // it is checked against the weakened handler-entry flow.
        let cleanup_out = self.check_stmt(cleanup, handler_entry);
        let can_finish = !cleanup_out.is_dead_end();
        log::trace!("finally at {span}: can_finish={can_finish}");
        if can_finish {
            // Exceptions parked while checking the guarded region resume
            // their search outward now.
            for (class, raise_span) in pending {
                self.raise_exception(class, raise_span);
            }
            if body_out.is_dead_end() {
                FlowBits::dead_end()
            } else {
                // Both regions run in sequence on the normal path.
                body_out.union_assign(&cleanup_out)
            }
        } else {
            // A cleanup that always exits abruptly supersedes whatever the
            // guarded region was about to do, exceptions included.
            cleanup_out
        }
    }
}
