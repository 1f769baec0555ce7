//! Statement and expression emission.
//!
//! Walks the folded tree and emits the symbolic instruction stream. By
//! this point the tree is fully annotated; anything inconsistent found
//! here (an unresolved reference, an invalid lvalue shape) is an internal
//! compiler error, never a user diagnostic; all of those were raised
//! during checking.
//!
//! try/finally and synchronized share the cleanup-subroutine scheme: the
//! cleanup body is emitted once, entered by jsr from every exit path (or
//! by a plain goto when the cleanup itself cannot complete), plus a
//! catch-all handler that runs the cleanup and rethrows.

use crate::check::CaptureSet;
use crate::codegen::code::{ArithOp, Code, Instr, InvokeKind, Label, NarrowKind, OpType};
use crate::codegen::items::Place;
use crate::error::{bug, Result};
use crate::fold::const_fold;
use crate::syms::{FieldAccess, Modifiers, Symtab};
use crate::tree::{BinOp, Expr, ExprKind, Stmt, StmtKind, UnOp};
use crate::types::{Constant, Type};

/// Widest span a dense switch table will be built for.
const MAX_TABLE_SPAN: i64 = 1 << 16;

/// One enclosing construct during emission.
#[derive(Debug)]
pub(crate) enum GenFrame {
    Loop { break_label: Label, continue_label: Label, labels: Vec<String> },
    Switch { break_label: Label, labels: Vec<String> },
    Labeled { break_label: Label, labels: Vec<String> },
    /// A try/finally or synchronized region; non-local exits crossing it
    /// call (or fall into) the cleanup subroutine.
    Cleanup { subroutine: Label, can_finish: bool },
    /// An inlined method body; its inline-returns jump to `end` after
    /// storing into `result`.
    Inline { end: Label, result: Option<(u32, OpType)> },
}

impl GenFrame {
    fn break_label(&self) -> Option<Label> {
        match self {
            GenFrame::Loop { break_label, .. }
            | GenFrame::Switch { break_label, .. }
            | GenFrame::Labeled { break_label, .. } => Some(*break_label),
            _ => None,
        }
    }

    fn labels(&self) -> &[String] {
        match self {
            GenFrame::Loop { labels, .. }
            | GenFrame::Switch { labels, .. }
            | GenFrame::Labeled { labels, .. } => labels,
            _ => &[],
        }
    }
}

pub struct Gen<'a> {
    pub(crate) syms: &'a Symtab,
    pub(crate) captures: &'a CaptureSet,
    pub(crate) code: Code,
    frames: Vec<GenFrame>,
    ret_ty: Type,
    /// Constructor/initializer context: captured variables are read from
    /// their synthetic constructor arguments instead of fields.
    in_ctor: bool,
    /// Temp slot carrying a return value across cleanup subroutines.
    ret_temp: Option<u32>,
}

/// Emit one member body into a fresh instruction stream.
pub fn gen_method(
    syms: &Symtab,
    captures: &CaptureSet,
    ret: &Type,
    is_ctor: bool,
    max_slots: u32,
    body: &Stmt,
) -> Result<Code> {
    log::debug!("emitting member body, {} locals", max_slots);
    let mut gen = Gen {
        syms,
        captures,
        code: Code::new(max_slots),
        frames: Vec::new(),
        ret_ty: ret.clone(),
        in_ctor: is_ctor,
        ret_temp: None,
    };
    gen.gen_stmt(body)?;
    if ret.is_void() && body.can_complete_normally() {
        gen.code.emit(Instr::Return { ty: None });
    }
    Ok(gen.code)
}

impl Gen<'_> {
    fn is_string(&self, ty: &Type) -> bool {
        matches!(ty, Type::Class(c) if *c == self.syms.predefined.string)
    }

    // ----- statements ---------------------------------------------------

    pub(crate) fn gen_stmt(&mut self, s: &Stmt) -> Result<()> {
        let labeled = !s.labels.is_empty()
            && !matches!(
                s.kind,
                StmtKind::While { .. } | StmtKind::Do { .. } | StmtKind::For { .. } | StmtKind::Switch { .. }
            );
        let exit = if labeled {
            let break_label = self.code.new_label();
            self.frames.push(GenFrame::Labeled { break_label, labels: s.labels.clone() });
            Some(break_label)
        } else {
            None
        };
        self.gen_stmt_kind(s)?;
        if let Some(break_label) = exit {
            self.frames.pop();
            self.code.bind(break_label);
        }
        Ok(())
    }

    fn gen_stmt_kind(&mut self, s: &Stmt) -> Result<()> {
        match &s.kind {
            StmtKind::Empty => Ok(()),

            StmtKind::Block(stmts) => {
                for stmt in stmts {
                    self.gen_stmt(stmt)?;
                }
                Ok(())
            }

            StmtKind::Expr(e) => self.gen_discard(e),

            StmtKind::VarDecl { ty, slot, init, .. } => {
                if let Some(init) = init {
                    self.gen_expr(init)?;
                    self.code.emit(Instr::Store { ty: OpType::of(ty), slot: *slot });
                }
                Ok(())
            }

            StmtKind::If { cond, then_branch, else_branch } => {
                let else_label = self.code.new_label();
                self.gen_cond(cond, else_label, false)?;
                self.gen_stmt(then_branch)?;
                match else_branch {
                    Some(else_branch) => {
                        let end = self.code.new_label();
                        self.code.emit(Instr::Goto(end));
                        self.code.bind(else_label);
                        self.gen_stmt(else_branch)?;
                        self.code.bind(end);
                    }
                    None => self.code.bind(else_label),
                }
                Ok(())
            }

            StmtKind::While { cond, body } => {
                let break_label = self.code.new_label();
                let continue_label = self.code.new_label();
                self.frames.push(GenFrame::Loop {
                    break_label,
                    continue_label,
                    labels: s.labels.clone(),
                });
                self.code.bind(continue_label);
                self.gen_cond(cond, break_label, false)?;
                self.gen_stmt(body)?;
                self.code.emit(Instr::Goto(continue_label));
                self.frames.pop();
                self.code.bind(break_label);
                Ok(())
            }

            StmtKind::Do { body, cond } => {
                let break_label = self.code.new_label();
                let continue_label = self.code.new_label();
                let top = self.code.new_label();
                self.frames.push(GenFrame::Loop {
                    break_label,
                    continue_label,
                    labels: s.labels.clone(),
                });
                self.code.bind(top);
                self.gen_stmt(body)?;
                self.code.bind(continue_label);
                self.gen_cond(cond, top, true)?;
                self.frames.pop();
                self.code.bind(break_label);
                Ok(())
            }

            StmtKind::For { init, cond, update, body } => {
                if let Some(init) = init {
                    self.gen_stmt(init)?;
                }
                let break_label = self.code.new_label();
                let continue_label = self.code.new_label();
                let test = self.code.new_label();
                self.frames.push(GenFrame::Loop {
                    break_label,
                    continue_label,
                    labels: s.labels.clone(),
                });
                self.code.bind(test);
                if let Some(cond) = cond {
                    self.gen_cond(cond, break_label, false)?;
                }
                self.gen_stmt(body)?;
                self.code.bind(continue_label);
                if let Some(update) = update {
                    self.gen_discard(update)?;
                }
                self.code.emit(Instr::Goto(test));
                self.frames.pop();
                self.code.bind(break_label);
                Ok(())
            }

            StmtKind::Switch { .. } => self.gen_switch(s),

            StmtKind::Break { label } => {
                let Some(target) = self.find_break_target(label.as_deref()) else {
                    bug!("unresolved break reached code generation");
                };
                let Some(break_label) = self.frames[target].break_label() else {
                    bug!("break target is not a breakable frame");
                };
                if self.unwind_frames(target + 1)? {
                    self.code.emit(Instr::Goto(break_label));
                }
                Ok(())
            }

            StmtKind::Continue { label } => {
                let Some(target) = self.find_continue_target(label.as_deref()) else {
                    bug!("unresolved continue reached code generation");
                };
                let continue_label = match &self.frames[target] {
                    GenFrame::Loop { continue_label, .. } => *continue_label,
                    _ => bug!("continue target is not a loop"),
                };
                if self.unwind_frames(target + 1)? {
                    self.code.emit(Instr::Goto(continue_label));
                }
                Ok(())
            }

            StmtKind::Return { value } => self.gen_return(value.as_ref()),

            StmtKind::InlineReturn { value } => {
                let Some(target) = self
                    .frames
                    .iter()
                    .rposition(|f| matches!(f, GenFrame::Inline { .. }))
                else {
                    bug!("inline return outside an inlined body");
                };
                let (end, result) = match &self.frames[target] {
                    GenFrame::Inline { end, result } => (*end, *result),
                    _ => unreachable!(),
                };
                if let Some(value) = value {
                    self.gen_expr(value)?;
                    if let Some((slot, ty)) = result {
                        self.code.emit(Instr::Store { ty, slot });
                    }
                }
                if self.unwind_frames(target + 1)? {
                    self.code.emit(Instr::Goto(end));
                }
                Ok(())
            }

            StmtKind::Throw { value } => {
                self.gen_expr(value)?;
                self.code.emit(Instr::Throw);
                Ok(())
            }

            StmtKind::Try { .. } => self.gen_try(s),
            StmtKind::Finally { .. } => self.gen_finally(s),
            StmtKind::Synchronized { .. } => self.gen_synchronized(s),
        }
    }

    fn find_break_target(&self, label: Option<&str>) -> Option<usize> {
        match label {
            None => self
                .frames
                .iter()
                .rposition(|f| matches!(f, GenFrame::Loop { .. } | GenFrame::Switch { .. })),
            Some(l) => self.frames.iter().rposition(|f| f.labels().iter().any(|fl| fl == l)),
        }
    }

    fn find_continue_target(&self, label: Option<&str>) -> Option<usize> {
        match label {
            None => self.frames.iter().rposition(|f| matches!(f, GenFrame::Loop { .. })),
            Some(l) => self.frames.iter().rposition(|f| {
                matches!(f, GenFrame::Loop { .. }) && f.labels().iter().any(|fl| fl == l)
            }),
        }
    }

    /// Thread a non-local exit through every cleanup region at frame
    /// index `keep` or above, innermost first. Returns false when a
    /// cleanup that cannot complete swallowed control; the caller's jump
    /// would be unreachable and must not be emitted.
    fn unwind_frames(&mut self, keep: usize) -> Result<bool> {
        let mut jumps = Vec::new();
        for i in (keep..self.frames.len()).rev() {
            if let GenFrame::Cleanup { subroutine, can_finish } = &self.frames[i] {
                if *can_finish {
                    jumps.push(Instr::Jsr(*subroutine));
                } else {
                    jumps.push(Instr::Goto(*subroutine));
                    for j in jumps {
                        self.code.emit(j);
                    }
                    return Ok(false);
                }
            }
        }
        for j in jumps {
            self.code.emit(j);
        }
        Ok(true)
    }

    fn gen_return(&mut self, value: Option<&Expr>) -> Result<()> {
        let has_cleanups = self
            .frames
            .iter()
            .any(|f| matches!(f, GenFrame::Cleanup { .. }));
        match value {
            Some(value) => {
                self.gen_expr(value)?;
                let ty = OpType::of(&self.ret_ty);
                if has_cleanups {
                    // Save the pending value across the cleanup calls and
                    // re-push it before the actual return.
                    let slot = match self.ret_temp {
                        Some(slot) => slot,
                        None => {
                            let slot = self.code.alloc_temp(ty.words());
                            self.ret_temp = Some(slot);
                            slot
                        }
                    };
                    self.code.emit(Instr::Store { ty, slot });
                    if self.unwind_frames(0)? {
                        self.code.emit(Instr::Load { ty, slot });
                        self.code.emit(Instr::Return { ty: Some(ty) });
                    }
                } else {
                    self.code.emit(Instr::Return { ty: Some(ty) });
                }
            }
            None => {
                if self.unwind_frames(0)? {
                    self.code.emit(Instr::Return { ty: None });
                }
            }
        }
        Ok(())
    }

    fn gen_switch(&mut self, s: &Stmt) -> Result<()> {
        let StmtKind::Switch { value, cases } = &s.kind else { unreachable!() };
        self.gen_expr(value)?;
        let break_label = self.code.new_label();

        let case_labels: Vec<Label> = cases.iter().map(|_| self.code.new_label()).collect();
        let mut entries: Vec<(i64, Label)> = Vec::new();
        let mut default_label = None;
        for (case, label) in cases.iter().zip(&case_labels) {
            match &case.label {
                Some(expr) => {
                    let Some(v) = const_fold::const_value(expr).and_then(|c| c.as_i64()) else {
                        bug!("non-constant case label reached code generation");
                    };
                    entries.push((v, *label));
                }
                None => default_label = Some(*label),
            }
        }

        if entries.is_empty() {
            self.code.emit(Instr::Pop { words: 1 });
            if let Some(default) = default_label {
                self.code.emit(Instr::Goto(default));
            } else {
                self.code.emit(Instr::Goto(break_label));
            }
        } else {
            let low = entries.iter().map(|(v, _)| *v).min().expect("nonempty");
            let high = entries.iter().map(|(v, _)| *v).max().expect("nonempty");
            if high - low >= MAX_TABLE_SPAN {
                bug!("case label span {}..{} too wide for a dense table", low, high);
            }
            // Absent a default case, unmatched values fall out at the
            // statement's own break label.
            let default = default_label.unwrap_or(break_label);
            let targets = (low..=high)
                .map(|v| {
                    entries
                        .iter()
                        .find(|(ev, _)| *ev == v)
                        .map(|(_, l)| *l)
                        .unwrap_or(default)
                })
                .collect();
            self.code.emit(Instr::TableSwitch { low: low as i32, targets, default });
        }

        self.frames.push(GenFrame::Switch { break_label, labels: s.labels.clone() });
        for (case, label) in cases.iter().zip(&case_labels) {
            self.code.bind(*label);
            for stmt in &case.body {
                self.gen_stmt(stmt)?;
            }
            // Execution falls through into the next case by design.
        }
        self.frames.pop();
        self.code.bind(break_label);
        Ok(())
    }

    fn gen_try(&mut self, s: &Stmt) -> Result<()> {
        let StmtKind::Try { body, catches } = &s.kind else { unreachable!() };
        let start = self.code.new_label();
        let end = self.code.new_label();
        let after = self.code.new_label();
        self.code.bind(start);
        self.gen_stmt(body)?;
        self.code.bind(end);
        if body.can_complete_normally() {
            self.code.emit(Instr::Goto(after));
        }
        for catch in catches {
            let handler = self.code.new_label();
            self.code.bind(handler);
            // The thrown reference is the only value on the stack here.
            self.code.set_stack(1);
            self.code.emit(Instr::Store { ty: OpType::Ref, slot: catch.slot });
            self.gen_stmt(&catch.body)?;
            if catch.body.can_complete_normally() {
                self.code.emit(Instr::Goto(after));
            }
            let class = match &catch.ty {
                Type::Class(c) => Some(*c),
                _ => None,
            };
            self.code.mark_handler(start, end, handler, class);
        }
        self.code.bind(after);
        Ok(())
    }

    fn gen_finally(&mut self, s: &Stmt) -> Result<()> {
        let StmtKind::Finally { body, cleanup } = &s.kind else { unreachable!() };
        let can_finish = cleanup.can_complete_normally();
        let subroutine = self.code.new_label();
        let after = self.code.new_label();
        let start = self.code.new_label();
        let end = self.code.new_label();
        log::trace!("finally at {}: subroutine form, can_finish={can_finish}", s.span);

        self.frames.push(GenFrame::Cleanup { subroutine, can_finish });
        self.code.bind(start);
        self.gen_stmt(body)?;
        self.code.bind(end);
        self.frames.pop();

        if body.can_complete_normally() {
            if can_finish {
                self.code.emit(Instr::Jsr(subroutine));
                self.code.emit(Instr::Goto(after));
            } else {
                // The cleanup never returns; falling into it is the exit.
                self.code.emit(Instr::Goto(subroutine));
            }
        }

        // Exceptional path: catch everything, run the cleanup, rethrow.
        let handler = self.code.new_label();
        self.code.bind(handler);
        self.code.set_stack(1);
        if can_finish {
            let exc = self.code.alloc_temp(1);
            self.code.emit(Instr::Store { ty: OpType::Ref, slot: exc });
            self.code.emit(Instr::Jsr(subroutine));
            self.code.emit(Instr::Load { ty: OpType::Ref, slot: exc });
            self.code.emit(Instr::Throw);
        } else {
            // A cleanup that itself exits abruptly supersedes the pending
            // exception; it is dropped before the cleanup runs.
            self.code.emit(Instr::Pop { words: 1 });
            self.code.emit(Instr::Goto(subroutine));
        }
        self.code.mark_handler(start, end, handler, None);

        self.code.bind(subroutine);
        if can_finish {
            // jsr entry: the return address is on the stack.
            self.code.set_stack(1);
            let ret_addr = self.code.alloc_temp(1);
            self.code.emit(Instr::Store { ty: OpType::Ref, slot: ret_addr });
            self.gen_stmt(cleanup)?;
            self.code.emit(Instr::Ret { slot: ret_addr });
        } else {
            self.code.set_stack(0);
            self.gen_stmt(cleanup)?;
        }
        self.code.bind(after);
        Ok(())
    }

    fn gen_synchronized(&mut self, s: &Stmt) -> Result<()> {
        let StmtKind::Synchronized { lock, body } = &s.kind else { unreachable!() };
        let subroutine = self.code.new_label();
        let after = self.code.new_label();
        let start = self.code.new_label();
        let end = self.code.new_label();

        // Keep the monitor reference in a temp so the exit matches the
        // entry even if the lock expression has side effects.
        let lock_slot = self.code.alloc_temp(1);
        self.gen_expr(lock)?;
        self.code.emit(Instr::Dup { words: 1, depth: 0 });
        self.code.emit(Instr::Store { ty: OpType::Ref, slot: lock_slot });
        self.code.emit(Instr::MonitorEnter);

        self.frames.push(GenFrame::Cleanup { subroutine, can_finish: true });
        self.code.bind(start);
        self.gen_stmt(body)?;
        self.code.bind(end);
        self.frames.pop();

        if body.can_complete_normally() {
            self.code.emit(Instr::Jsr(subroutine));
            self.code.emit(Instr::Goto(after));
        }

        let handler = self.code.new_label();
        self.code.bind(handler);
        self.code.set_stack(1);
        let exc = self.code.alloc_temp(1);
        self.code.emit(Instr::Store { ty: OpType::Ref, slot: exc });
        self.code.emit(Instr::Jsr(subroutine));
        self.code.emit(Instr::Load { ty: OpType::Ref, slot: exc });
        self.code.emit(Instr::Throw);
        self.code.mark_handler(start, end, handler, None);

        self.code.bind(subroutine);
        self.code.set_stack(1);
        let ret_addr = self.code.alloc_temp(1);
        self.code.emit(Instr::Store { ty: OpType::Ref, slot: ret_addr });
        self.code.emit(Instr::Load { ty: OpType::Ref, slot: lock_slot });
        self.code.emit(Instr::MonitorExit);
        self.code.emit(Instr::Ret { slot: ret_addr });

        self.code.bind(after);
        Ok(())
    }

    // ----- expressions --------------------------------------------------

    /// Emit `e` in value context: exactly one value of its type is left
    /// on the stack.
    pub(crate) fn gen_expr(&mut self, e: &Expr) -> Result<()> {
        match &e.kind {
            ExprKind::Literal(c) => {
                self.code.emit(Instr::Const(c.clone()));
                Ok(())
            }

            ExprKind::Ident(name) => bug!("unresolved identifier `{name}` reached code generation"),

            ExprKind::Local { slot, .. } => {
                self.code.emit(Instr::Load { ty: OpType::of(&e.ty), slot: *slot });
                Ok(())
            }

            ExprKind::This | ExprKind::Super => {
                self.code.emit(Instr::Load { ty: OpType::Ref, slot: 0 });
                Ok(())
            }

            ExprKind::Uplevel { index, .. } => {
                let capture = self.captures.get(*index);
                let ty = OpType::of(&capture.ty);
                if self.in_ctor {
                    // The synthetic constructor argument is still in scope.
                    self.code.emit(Instr::Load { ty, slot: capture.arg_slot });
                } else {
                    self.code.emit(Instr::Load { ty: OpType::Ref, slot: 0 });
                    self.code.emit_get_capture(*index as u32, ty);
                }
                Ok(())
            }

            ExprKind::Field { base, field, access, .. } => {
                let Some(fref) = *field else {
                    bug!("unresolved field reached code generation");
                };
                let info = self.syms.field(fref);
                let ty = OpType::of(&info.ty);
                let is_static = info.flags.contains(Modifiers::STATIC);
                match access {
                    FieldAccess::Direct if is_static => {
                        if let Some(base) = base {
                            self.gen_discard(base)?;
                        }
                        self.code.emit_get_static(fref, ty);
                    }
                    FieldAccess::Direct => {
                        self.gen_receiver(base.as_deref())?;
                        self.code.emit_get_field(fref, ty);
                    }
                    FieldAccess::Accessor { getter, .. } => {
                        if is_static {
                            if let Some(base) = base {
                                self.gen_discard(base)?;
                            }
                            self.code.emit_invoke(*getter, InvokeKind::Static, 0, ty.words());
                        } else {
                            self.gen_receiver(base.as_deref())?;
                            self.code.emit_invoke(*getter, InvokeKind::Static, 1, ty.words());
                        }
                    }
                }
                Ok(())
            }

            ExprKind::ArrayLength { array } => {
                self.gen_expr(array)?;
                self.code.emit(Instr::ArrayLength);
                Ok(())
            }

            ExprKind::Index { array, index } => {
                self.gen_expr(array)?;
                self.gen_expr(index)?;
                self.code.emit(Instr::ArrayLoad { ty: OpType::of(&e.ty) });
                Ok(())
            }

            ExprKind::Call { base, method, args, .. } => {
                let Some(mref) = *method else {
                    bug!("unresolved call reached code generation");
                };
                let info = self.syms.method(mref);
                let is_static = info.flags.contains(Modifiers::STATIC);
                let kind = if is_static {
                    InvokeKind::Static
                } else if info.flags.contains(Modifiers::PRIVATE)
                    || matches!(base.as_deref(), Some(Expr { kind: ExprKind::Super, .. }))
                {
                    InvokeKind::Special
                } else {
                    InvokeKind::Virtual
                };
                let arg_words: u16 = info.params.iter().map(|p| p.words()).sum();
                let ret_words = info.ret.words();
                if is_static {
                    if let Some(base) = base {
                        self.gen_discard(base)?;
                    }
                } else {
                    self.gen_receiver(base.as_deref())?;
                }
                for arg in args {
                    self.gen_expr(arg)?;
                }
                self.code.emit_invoke(mref, kind, arg_words, ret_words);
                Ok(())
            }

            ExprKind::New { class, ctor, args } => {
                self.code.emit(Instr::New(*class));
                if let Some(ctor) = ctor {
                    self.code.emit(Instr::Dup { words: 1, depth: 0 });
                    for arg in args {
                        self.gen_expr(arg)?;
                    }
                    let arg_words: u16 =
                        self.syms.method(*ctor).params.iter().map(|p| p.words()).sum();
                    self.code.emit_invoke(*ctor, InvokeKind::Special, arg_words, 0);
                }
                Ok(())
            }

            ExprKind::NewArray { elem, dims } => {
                for dim in dims {
                    self.gen_expr(dim)?;
                }
                if dims.len() == 1 {
                    self.code.emit(Instr::NewArray { elem: elem.clone() });
                } else {
                    self.code.emit(Instr::MultiNewArray {
                        elem: elem.clone(),
                        dims: dims.len() as u8,
                    });
                }
                Ok(())
            }

            ExprKind::Unary { op, arg } => match op {
                UnOp::Neg => {
                    self.gen_expr(arg)?;
                    self.code.emit(Instr::Arith { op: ArithOp::Neg, ty: OpType::of(&e.ty) });
                    Ok(())
                }
                UnOp::Pos => self.gen_expr(arg),
                UnOp::BitNot => {
                    // x ^ -1, the classic complement encoding.
                    self.gen_expr(arg)?;
                    let ty = OpType::of(&e.ty);
                    let minus_one = match ty {
                        OpType::Long => Constant::Long(-1),
                        _ => Constant::Int(-1),
                    };
                    self.code.emit(Instr::Const(minus_one));
                    self.code.emit(Instr::Arith { op: ArithOp::Xor, ty });
                    Ok(())
                }
                UnOp::Not => self.gen_bool(e),
            },

            ExprKind::Binary { op, left, right } => {
                if self.is_string(&e.ty) && *op == BinOp::Add {
                    return self.gen_concat(left, right);
                }
                if op.is_comparison() {
                    return self.gen_bool(e);
                }
                self.gen_expr(left)?;
                self.gen_expr(right)?;
                let arith = match op {
                    BinOp::Add => ArithOp::Add,
                    BinOp::Sub => ArithOp::Sub,
                    BinOp::Mul => ArithOp::Mul,
                    BinOp::Div => ArithOp::Div,
                    BinOp::Rem => ArithOp::Rem,
                    BinOp::BitAnd => ArithOp::And,
                    BinOp::BitOr => ArithOp::Or,
                    BinOp::BitXor => ArithOp::Xor,
                    BinOp::Shl => ArithOp::Shl,
                    BinOp::Shr => ArithOp::Shr,
                    BinOp::Ushr => ArithOp::Ushr,
                    _ => unreachable!("comparisons handled above"),
                };
                self.code.emit(Instr::Arith { op: arith, ty: OpType::of(&e.ty) });
                Ok(())
            }

            ExprKind::And { .. } | ExprKind::Or { .. } => self.gen_bool(e),

            ExprKind::Conditional { cond, when_true, when_false } => {
                let base = self.code.stack();
                let else_label = self.code.new_label();
                let end = self.code.new_label();
                self.gen_cond(cond, else_label, false)?;
                self.gen_expr(when_true)?;
                self.code.emit(Instr::Goto(end));
                self.code.set_stack(base);
                self.code.bind(else_label);
                self.gen_expr(when_false)?;
                self.code.bind(end);
                Ok(())
            }

            ExprKind::InstanceOf { value, target } => {
                self.gen_expr(value)?;
                self.code.emit(Instr::InstanceOf(target.clone()));
                Ok(())
            }

            ExprKind::Cast { target, value } => {
                self.gen_expr(value)?;
                if target.is_numeric() {
                    self.gen_numeric_conversion(&value.ty, target);
                } else if target.is_reference() && !self.syms.is_assignable(&value.ty, target) {
                    self.code.emit(Instr::CheckCast(target.clone()));
                }
                Ok(())
            }

            ExprKind::Convert { value } => {
                self.gen_expr(value)?;
                self.gen_numeric_conversion(&value.ty, &e.ty);
                Ok(())
            }

            ExprKind::Assign { .. } => self.gen_assign(e, true),
            ExprKind::AssignOp { .. } => self.gen_assign_op(e, true),
            ExprKind::IncDec { .. } => self.gen_inc_dec(e, true),

            ExprKind::Comma { effect, value } => {
                self.gen_discard(effect)?;
                self.gen_expr(value)
            }

            ExprKind::InlineCall { body, .. } => {
                let end = self.code.new_label();
                let result = if e.ty.is_void() {
                    None
                } else {
                    let ty = OpType::of(&e.ty);
                    Some((self.code.alloc_temp(ty.words()), ty))
                };
                self.frames.push(GenFrame::Inline { end, result });
                self.gen_stmt(body)?;
                self.frames.pop();
                self.code.bind(end);
                if let Some((slot, ty)) = result {
                    self.code.emit(Instr::Load { ty, slot });
                }
                Ok(())
            }
        }
    }

    /// Emit `e` for effect only, leaving the stack unchanged. Assignment
    /// forms skip the result duplication instead of popping it.
    pub(crate) fn gen_discard(&mut self, e: &Expr) -> Result<()> {
        match &e.kind {
            ExprKind::Assign { .. } => self.gen_assign(e, false),
            ExprKind::AssignOp { .. } => self.gen_assign_op(e, false),
            ExprKind::IncDec { .. } => self.gen_inc_dec(e, false),
            ExprKind::Comma { effect, value } => {
                self.gen_discard(effect)?;
                self.gen_discard(value)
            }
            _ => {
                self.gen_expr(e)?;
                let words = if e.ty.is_void() { 0 } else { OpType::of(&e.ty).words() };
                if words > 0 {
                    self.code.emit(Instr::Pop { words });
                }
                Ok(())
            }
        }
    }

    /// Push the receiver for an instance access: the written base, or
    /// `this`.
    fn gen_receiver(&mut self, base: Option<&Expr>) -> Result<()> {
        match base {
            Some(base) => self.gen_expr(base),
            None => {
                self.code.emit(Instr::Load { ty: OpType::Ref, slot: 0 });
                Ok(())
            }
        }
    }

    /// Lower an assignable expression to a `Place`, emitting its
    /// addressing operands.
    fn gen_lvalue(&mut self, e: &Expr) -> Result<Place> {
        match &e.kind {
            ExprKind::Local { slot, .. } => Ok(Place::Local { slot: *slot, ty: OpType::of(&e.ty) }),

            ExprKind::Field { base, field, access, .. } => {
                let Some(fref) = *field else {
                    bug!("unresolved field assignment reached code generation");
                };
                let info = self.syms.field(fref);
                let ty = OpType::of(&info.ty);
                let is_static = info.flags.contains(Modifiers::STATIC);
                match access {
                    FieldAccess::Direct if is_static => {
                        if let Some(base) = base {
                            self.gen_discard(base)?;
                        }
                        Ok(Place::Static { field: fref, ty })
                    }
                    FieldAccess::Direct => {
                        self.gen_receiver(base.as_deref())?;
                        Ok(Place::Field { field: fref, ty })
                    }
                    FieldAccess::Accessor { getter, setter } => {
                        let receiver = !is_static;
                        if receiver {
                            self.gen_receiver(base.as_deref())?;
                        } else if let Some(base) = base {
                            self.gen_discard(base)?;
                        }
                        Ok(Place::Accessor { getter: *getter, setter: *setter, ty, receiver })
                    }
                }
            }

            ExprKind::Index { array, index } => {
                self.gen_expr(array)?;
                self.gen_expr(index)?;
                Ok(Place::Element { ty: OpType::of(&e.ty) })
            }

            _ => bug!("invalid assignment target reached code generation"),
        }
    }

    fn gen_assign(&mut self, e: &Expr, want_value: bool) -> Result<()> {
        let ExprKind::Assign { target, value } = &e.kind else { unreachable!() };
        let place = self.gen_lvalue(target)?;
        self.gen_expr(value)?;
        if want_value {
            place.dup_value_below_base(&mut self.code);
        }
        place.store(&mut self.code);
        Ok(())
    }

    fn gen_assign_op(&mut self, e: &Expr, want_value: bool) -> Result<()> {
        let ExprKind::AssignOp { op, target, value } = &e.kind else { unreachable!() };
        let place = self.gen_lvalue(target)?;
        place.dup_base(&mut self.code);
        place.load(&mut self.code);

        if self.is_string(&e.ty) && *op == BinOp::Add {
            // The loaded target is already a string; only the right side
            // may need conversion.
            self.gen_string_value(value)?;
            self.code
                .emit_invoke(self.syms.predefined.string_concat, InvokeKind::Virtual, 1, 1);
        } else {
            // Compute in the promoted type, then narrow silently back to
            // the target's original type.
            let target_ty = &e.ty;
            let compute_ty = if op.is_shift() {
                target_ty.unary_promotion().unwrap_or_else(|| target_ty.clone())
            } else {
                Type::binary_promotion(target_ty, &value.ty).unwrap_or_else(|| target_ty.clone())
            };
            self.gen_numeric_conversion(target_ty, &compute_ty);
            self.gen_expr(value)?;
            if !op.is_shift() {
                self.gen_numeric_conversion(&value.ty, &compute_ty);
            }
            let arith = match op {
                BinOp::Add => ArithOp::Add,
                BinOp::Sub => ArithOp::Sub,
                BinOp::Mul => ArithOp::Mul,
                BinOp::Div => ArithOp::Div,
                BinOp::Rem => ArithOp::Rem,
                BinOp::BitAnd => ArithOp::And,
                BinOp::BitOr => ArithOp::Or,
                BinOp::BitXor => ArithOp::Xor,
                BinOp::Shl => ArithOp::Shl,
                BinOp::Shr => ArithOp::Shr,
                BinOp::Ushr => ArithOp::Ushr,
                _ => bug!("operator {op} is not a compound-assignment operator"),
            };
            self.code.emit(Instr::Arith { op: arith, ty: OpType::of(&compute_ty) });
            self.gen_numeric_conversion(&compute_ty, target_ty);
        }

        if want_value {
            place.dup_value_below_base(&mut self.code);
        }
        place.store(&mut self.code);
        Ok(())
    }

    fn gen_inc_dec(&mut self, e: &Expr, want_value: bool) -> Result<()> {
        let ExprKind::IncDec { op, target } = &e.kind else { unreachable!() };
        let place = self.gen_lvalue(target)?;
        place.dup_base(&mut self.code);
        place.load(&mut self.code);
        if !op.is_prefix() && want_value {
            // Postfix: the original value is the expression result.
            place.dup_value_below_base(&mut self.code);
        }
        let ty = OpType::of(&e.ty);
        let delta = op.delta();
        let one = match ty {
            OpType::Int => Constant::Int(delta),
            OpType::Long => Constant::Long(delta as i64),
            OpType::Float => Constant::Float(delta as f32),
            OpType::Double => Constant::Double(delta as f64),
            OpType::Ref => bug!("increment of a reference reached code generation"),
        };
        self.code.emit(Instr::Const(one));
        self.code.emit(Instr::Arith { op: ArithOp::Add, ty });
        self.narrow_small(&e.ty);
        if op.is_prefix() && want_value {
            place.dup_value_below_base(&mut self.code);
        }
        place.store(&mut self.code);
        Ok(())
    }

    // ----- conversions and concatenation --------------------------------

    /// Emit the instruction sequence converting a numeric value from one
    /// declared type to another: a group conversion when the stack
    /// representation changes, plus the i2b/i2s/i2c truncation for
    /// sub-int targets.
    fn gen_numeric_conversion(&mut self, from: &Type, to: &Type) {
        let fg = OpType::of(from);
        let tg = OpType::of(to);
        if fg != tg {
            self.code.emit(Instr::Convert { from: fg, to: tg });
        }
        if from != to {
            self.narrow_small(to);
        }
    }

    fn narrow_small(&mut self, ty: &Type) {
        let kind = match ty {
            Type::Byte => Some(NarrowKind::Byte),
            Type::Short => Some(NarrowKind::Short),
            Type::Char => Some(NarrowKind::Char),
            _ => None,
        };
        if let Some(to) = kind {
            self.code.emit(Instr::Narrow { to });
        }
    }

    fn gen_concat(&mut self, left: &Expr, right: &Expr) -> Result<()> {
        self.gen_string_value(left)?;
        self.gen_string_value(right)?;
        self.code
            .emit_invoke(self.syms.predefined.string_concat, InvokeKind::Virtual, 1, 1);
        Ok(())
    }

    /// Emit `e` and convert it to its string form if it is not already a
    /// string.
    fn gen_string_value(&mut self, e: &Expr) -> Result<()> {
        self.gen_expr(e)?;
        if !self.is_string(&e.ty) {
            self.code.emit(Instr::Stringify { ty: OpType::of(&e.ty) });
        }
        Ok(())
    }
}
