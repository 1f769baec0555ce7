//! Small-method-body inlining.
//!
//! A call site is expanded by binding the receiver and arguments to fresh
//! locals and splicing in a copy of the target's checked body, with every
//! local renumbered so repeated expansions of the same method never alias.
//! `Return` statements become inline-return markers that deliver the value
//! to the enclosing call expression. Candidates that are too costly, not
//! devirtualizable, recursive, or that touch members invisible from the
//! call site are left as ordinary calls.

use std::collections::HashMap;

use crate::fold::Folder;
use crate::syms::{MethodRef, Modifiers};
use crate::tree::{Case, Expr, ExprKind, Stmt, StmtKind};
use crate::types::Type;

/// Per-node cost of an invocation relative to straight-line code.
const CALL_COST: u32 = 3;

impl Folder<'_> {
    /// Inline a folded call expression when the target qualifies,
    /// otherwise return it unchanged.
    pub(crate) fn try_inline_call(&mut self, call: Expr) -> Expr {
        let method = match &call.kind {
            ExprKind::Call { method, .. } => *method,
            _ => None,
        };
        let Some((mref, body, params, is_static)) = self.inline_candidate(method) else {
            return call;
        };
        let Expr { kind, span, ty } = call;
        let ExprKind::Call { base, args, .. } = kind else { unreachable!() };
        log::debug!("inlining {} at {span}", self.syms.method(mref).name);

        let mut prelude: Vec<Stmt> = Vec::new();
        let mut map: HashMap<u32, u32> = HashMap::new();
        // Bind the receiver and arguments to fresh locals; their slots in
        // the target's frame are 0.. (instance: `this` first).
        let mut old_slot = 0u32;
        if !is_static {
            let recv_ty = Type::Class(mref.class);
            let recv = match base {
                Some(b) => *b,
                None => Expr { kind: ExprKind::This, span, ty: recv_ty.clone() },
            };
            let slot = self.alloc_slot(&recv_ty);
            map.insert(0, slot);
            prelude.push(bound_local("this$inl", recv_ty, slot, recv, span));
            old_slot = 1;
        } else if let Some(b) = base {
            // A receiver written before a static call still evaluates.
            if let Some(effect) = self.discard(*b) {
                prelude.push(Stmt::expr(effect));
            }
        }
        for (i, (arg, pty)) in args.into_iter().zip(params.into_iter()).enumerate() {
            let slot = self.alloc_slot(&pty);
            map.insert(old_slot, slot);
            old_slot += pty.words().max(1) as u32;
            prelude.push(bound_local(&format!("arg${i}"), pty, slot, arg, span));
        }

        let mut body = body;
        self.remap_stmt(&mut body, &mut map);

        // Fold the substituted copy, refusing to re-enter the same method.
        self.inlining.push(mref);
        let body = self.fold_stmt(body).unwrap_or_else(|| Stmt::empty(span));
        self.inlining.pop();

        prelude.push(body);
        Expr {
            kind: ExprKind::InlineCall { method: mref, body: Box::new(Stmt::block(prelude, span)) },
            span,
            ty,
        }
    }

    /// Decide whether `method` can be expanded here; returns its body
    /// copy, parameter types, and staticness.
    fn inline_candidate(&self, method: Option<MethodRef>) -> Option<(MethodRef, Stmt, Vec<Type>, bool)> {
        if !self.opts.inline {
            return None;
        }
        let mref = method?;
        if self.inlining.contains(&mref) {
            return None;
        }
        let info = self.syms.method(mref);
        // Only calls with a known single target: private, static, or final.
        let devirtualized = info.flags.intersects(Modifiers::PRIVATE | Modifiers::STATIC | Modifiers::FINAL)
            || self.syms.class(mref.class).flags.contains(Modifiers::FINAL);
        if !devirtualized || info.flags.intersects(Modifiers::SYNCHRONIZED | Modifiers::NATIVE) {
            return None;
        }
        let body = info.body.as_deref()?;
        let cost = self.inline_cost_stmt(body)?;
        if cost > self.opts.inline_budget {
            log::trace!("not inlining {}: cost {} over budget", info.name, cost);
            return None;
        }
        Some((mref, body.clone(), info.params.clone(), info.flags.contains(Modifiers::STATIC)))
    }

    fn alloc_slot(&mut self, ty: &Type) -> u32 {
        let slot = self.next_slot;
        self.next_slot += ty.words().max(1) as u32;
        slot
    }

    /// Cost of a statement, or `None` when it contains something that
    /// cannot be transplanted (an uplevel reference, `super`, or a member
    /// access invisible from the inlining site).
    fn inline_cost_stmt(&self, s: &Stmt) -> Option<u32> {
        let inner = match &s.kind {
            StmtKind::Empty => 0,
            StmtKind::Block(stmts) => stmts.iter().map(|s| self.inline_cost_stmt(s)).sum::<Option<u32>>()?,
            StmtKind::Expr(e) => self.inline_cost_expr(e)?,
            StmtKind::VarDecl { init, .. } => init.as_ref().map_or(Some(0), |e| self.inline_cost_expr(e))?,
            StmtKind::If { cond, then_branch, else_branch } => {
                self.inline_cost_expr(cond)?
                    + self.inline_cost_stmt(then_branch)?
                    + else_branch.as_ref().map_or(Some(0), |e| self.inline_cost_stmt(e))?
            }
            StmtKind::While { cond, body } => self.inline_cost_expr(cond)? + self.inline_cost_stmt(body)?,
            StmtKind::Do { body, cond } => self.inline_cost_stmt(body)? + self.inline_cost_expr(cond)?,
            StmtKind::For { init, cond, update, body } => {
                init.as_ref().map_or(Some(0), |s| self.inline_cost_stmt(s))?
                    + cond.as_ref().map_or(Some(0), |e| self.inline_cost_expr(e))?
                    + update.as_ref().map_or(Some(0), |e| self.inline_cost_expr(e))?
                    + self.inline_cost_stmt(body)?
            }
            StmtKind::Switch { value, cases } => {
                let mut total = self.inline_cost_expr(value)?;
                for case in cases {
                    if let Some(l) = &case.label {
                        total += self.inline_cost_expr(l)?;
                    }
                    for s in &case.body {
                        total += self.inline_cost_stmt(s)?;
                    }
                }
                total
            }
            StmtKind::Break { .. } | StmtKind::Continue { .. } => 0,
            StmtKind::Return { value } | StmtKind::InlineReturn { value } => {
                value.as_ref().map_or(Some(0), |e| self.inline_cost_expr(e))?
            }
            StmtKind::Throw { value } => self.inline_cost_expr(value)?,
            StmtKind::Try { body, catches } => {
                let mut total = self.inline_cost_stmt(body)?;
                for c in catches {
                    total += self.inline_cost_stmt(&c.body)?;
                }
                total
            }
            StmtKind::Finally { body, cleanup } => {
                self.inline_cost_stmt(body)? + self.inline_cost_stmt(cleanup)?
            }
            StmtKind::Synchronized { lock, body } => {
                self.inline_cost_expr(lock)? + self.inline_cost_stmt(body)?
            }
        };
        Some(inner + 1)
    }

    fn inline_cost_expr(&self, e: &Expr) -> Option<u32> {
        let inner = match &e.kind {
            ExprKind::Literal(_) | ExprKind::Local { .. } | ExprKind::This | ExprKind::Ident(_) => 0,
            // These don't survive transplanting into another frame.
            ExprKind::Super | ExprKind::Uplevel { .. } => return None,
            ExprKind::Field { base, field, .. } => {
                let fref = (*field)?;
                let flags = self.syms.field(fref).flags;
                if !self.syms.can_access(self.class, fref.class, flags) {
                    return None;
                }
                base.as_ref().map_or(Some(0), |b| self.inline_cost_expr(b))?
            }
            ExprKind::ArrayLength { array } => self.inline_cost_expr(array)?,
            ExprKind::Index { array, index } => {
                self.inline_cost_expr(array)? + self.inline_cost_expr(index)?
            }
            ExprKind::Call { base, method, args, .. } => {
                let mref = (*method)?;
                let flags = self.syms.method(mref).flags;
                if !self.syms.can_access(self.class, mref.class, flags) {
                    return None;
                }
                let mut total = CALL_COST;
                if let Some(b) = base {
                    total += self.inline_cost_expr(b)?;
                }
                for a in args {
                    total += self.inline_cost_expr(a)?;
                }
                total
            }
            ExprKind::New { args, .. } => {
                let mut total = CALL_COST;
                for a in args {
                    total += self.inline_cost_expr(a)?;
                }
                total
            }
            ExprKind::NewArray { dims, .. } => {
                let mut total = 1;
                for d in dims {
                    total += self.inline_cost_expr(d)?;
                }
                total
            }
            ExprKind::Unary { arg, .. } => self.inline_cost_expr(arg)?,
            ExprKind::Binary { left, right, .. }
            | ExprKind::And { left, right }
            | ExprKind::Or { left, right } => {
                self.inline_cost_expr(left)? + self.inline_cost_expr(right)?
            }
            ExprKind::Conditional { cond, when_true, when_false } => {
                self.inline_cost_expr(cond)?
                    + self.inline_cost_expr(when_true)?
                    + self.inline_cost_expr(when_false)?
            }
            ExprKind::InstanceOf { value, .. }
            | ExprKind::Cast { value, .. }
            | ExprKind::Convert { value } => self.inline_cost_expr(value)?,
            ExprKind::Assign { target, value } | ExprKind::AssignOp { target, value, .. } => {
                self.inline_cost_expr(target)? + self.inline_cost_expr(value)?
            }
            ExprKind::IncDec { target, .. } => self.inline_cost_expr(target)?,
            ExprKind::Comma { effect, value } => {
                self.inline_cost_expr(effect)? + self.inline_cost_expr(value)?
            }
            ExprKind::InlineCall { body, .. } => self.inline_cost_stmt(body)?,
        };
        Some(inner + 1)
    }

    /// Renumber every local slot in the transplanted body and turn its
    /// returns into inline-return markers.
    fn remap_stmt(&mut self, s: &mut Stmt, map: &mut HashMap<u32, u32>) {
        match &mut s.kind {
            StmtKind::Empty | StmtKind::Break { .. } | StmtKind::Continue { .. } => {}
            StmtKind::Block(stmts) => {
                for s in stmts {
                    self.remap_stmt(s, map);
                }
            }
            StmtKind::Expr(e) => self.remap_expr(e, map),
            StmtKind::VarDecl { ty, slot, init, .. } => {
                if let Some(init) = init {
                    self.remap_expr(init, map);
                }
                let fresh = self.alloc_slot(ty);
                map.insert(*slot, fresh);
                *slot = fresh;
            }
            StmtKind::If { cond, then_branch, else_branch } => {
                self.remap_expr(cond, map);
                self.remap_stmt(then_branch, map);
                if let Some(e) = else_branch {
                    self.remap_stmt(e, map);
                }
            }
            StmtKind::While { cond, body } => {
                self.remap_expr(cond, map);
                self.remap_stmt(body, map);
            }
            StmtKind::Do { body, cond } => {
                self.remap_stmt(body, map);
                self.remap_expr(cond, map);
            }
            StmtKind::For { init, cond, update, body } => {
                if let Some(init) = init {
                    self.remap_stmt(init, map);
                }
                if let Some(cond) = cond {
                    self.remap_expr(cond, map);
                }
                if let Some(update) = update {
                    self.remap_expr(update, map);
                }
                self.remap_stmt(body, map);
            }
            StmtKind::Switch { value, cases } => {
                self.remap_expr(value, map);
                for Case { label, body, .. } in cases {
                    if let Some(l) = label {
                        self.remap_expr(l, map);
                    }
                    for s in body {
                        self.remap_stmt(s, map);
                    }
                }
            }
            StmtKind::Return { value } => {
                if let Some(v) = value.as_mut() {
                    self.remap_expr(v, map);
                }
                // Deliver to the inline call instead of the caller frame.
                s.kind = StmtKind::InlineReturn { value: value.take() };
            }
            StmtKind::InlineReturn { value } => {
                if let Some(v) = value {
                    self.remap_expr(v, map);
                }
            }
            StmtKind::Throw { value } => self.remap_expr(value, map),
            StmtKind::Try { body, catches } => {
                self.remap_stmt(body, map);
                for c in catches {
                    let fresh = self.alloc_slot(&c.ty);
                    map.insert(c.slot, fresh);
                    c.slot = fresh;
                    self.remap_stmt(&mut c.body, map);
                }
            }
            StmtKind::Finally { body, cleanup } => {
                self.remap_stmt(body, map);
                self.remap_stmt(cleanup, map);
            }
            StmtKind::Synchronized { lock, body } => {
                self.remap_expr(lock, map);
                self.remap_stmt(body, map);
            }
        }
    }

    fn remap_expr(&mut self, e: &mut Expr, map: &mut HashMap<u32, u32>) {
        match &mut e.kind {
            ExprKind::Literal(_) | ExprKind::Ident(_) | ExprKind::Super | ExprKind::Uplevel { .. } => {}
            ExprKind::This => {
                // The receiver was bound to a fresh local.
                if let Some(&slot) = map.get(&0) {
                    e.kind = ExprKind::Local { name: "this$inl".to_string(), slot };
                }
            }
            ExprKind::Local { slot, .. } => {
                match map.get(slot) {
                    Some(&fresh) => *slot = fresh,
                    None => {
                        // Defensive: a use before its declaration cannot
                        // occur in a checked body, but never alias the
                        // caller's slots.
                        let fresh = self.next_slot;
                        self.next_slot += 1;
                        map.insert(*slot, fresh);
                        *slot = fresh;
                    }
                }
            }
            ExprKind::Field { base, .. } => {
                if let Some(b) = base {
                    self.remap_expr(b, map);
                }
            }
            ExprKind::ArrayLength { array } => self.remap_expr(array, map),
            ExprKind::Index { array, index } => {
                self.remap_expr(array, map);
                self.remap_expr(index, map);
            }
            ExprKind::Call { base, args, .. } => {
                if let Some(b) = base {
                    self.remap_expr(b, map);
                }
                for a in args {
                    self.remap_expr(a, map);
                }
            }
            ExprKind::New { args, .. } => {
                for a in args {
                    self.remap_expr(a, map);
                }
            }
            ExprKind::NewArray { dims, .. } => {
                for d in dims {
                    self.remap_expr(d, map);
                }
            }
            ExprKind::Unary { arg, .. } => self.remap_expr(arg, map),
            ExprKind::Binary { left, right, .. }
            | ExprKind::And { left, right }
            | ExprKind::Or { left, right } => {
                self.remap_expr(left, map);
                self.remap_expr(right, map);
            }
            ExprKind::Conditional { cond, when_true, when_false } => {
                self.remap_expr(cond, map);
                self.remap_expr(when_true, map);
                self.remap_expr(when_false, map);
            }
            ExprKind::InstanceOf { value, .. }
            | ExprKind::Cast { value, .. }
            | ExprKind::Convert { value } => self.remap_expr(value, map),
            ExprKind::Assign { target, value } | ExprKind::AssignOp { target, value, .. } => {
                self.remap_expr(target, map);
                self.remap_expr(value, map);
            }
            ExprKind::IncDec { target, .. } => self.remap_expr(target, map),
            ExprKind::Comma { effect, value } => {
                self.remap_expr(effect, map);
                self.remap_expr(value, map);
            }
            ExprKind::InlineCall { body, .. } => self.remap_stmt(body, map),
        }
    }
}

/// A declaration binding `value` to a fresh slot.
fn bound_local(name: &str, ty: Type, slot: u32, value: Expr, span: crate::span::Span) -> Stmt {
    Stmt::new(
        StmtKind::VarDecl { name: name.to_string(), ty, flags: Modifiers::empty(), slot, init: Some(value) },
        span,
    )
}
