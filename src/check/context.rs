//! Lexical scope stack for the checking pass.
//!
//! One `Context` tracks everything the traversal of a single member body
//! needs: declared locals with their slots, the stack of enclosing
//! constructs with their break/continue/handler flow accumulators, label
//! resolution, and the frame numbering that detects uplevel (captured)
//! variable references. Lookups are top-to-bottom scans of the stack with
//! a stopping predicate per use; there are no back-pointers.

use crate::check::capture::CaptureSet;
use crate::check::flowbits::FlowBits;
use crate::diag::{keys, Diagnostics};
use crate::span::Span;
use crate::syms::Modifiers;
use crate::types::{ClassId, Type};

/// A declared local variable or parameter.
#[derive(Debug, Clone)]
pub struct VarDef {
    pub name: String,
    pub ty: Type,
    pub flags: Modifiers,
    pub slot: u32,
    /// Which physical invocation frame declares this variable.
    pub frame_number: u32,
    pub scope_number: u32,
    pub span: Span,
}

impl VarDef {
    pub fn is_final(&self) -> bool {
        self.flags.contains(Modifiers::FINAL)
    }
}

/// What kind of construct a scope frame belongs to.
#[derive(Debug)]
pub enum FrameKind {
    /// Bottom frame of a member body. `ctor` distinguishes constructor /
    /// initializer scopes, where captured variables are still reachable as
    /// constructor arguments.
    Method { ret: Type, throws: Vec<ClassId>, ctor: bool },
    Block,
    /// A labeled non-loop statement; a break target only.
    Labeled,
    Loop,
    Switch,
    /// The protected region of a try with catch clauses.
    TryBody { catches: Vec<Type>, thrown: Vec<ClassId> },
    /// The protected region of a try/finally. Checked exceptions escaping
    /// it are parked here until the cleanup's completion is known.
    FinallyGuard { pending: Vec<(ClassId, Span)> },
    Synchronized,
}

#[derive(Debug)]
pub struct Frame {
    pub kind: FrameKind,
    pub labels: Vec<String>,
    pub scope_number: u32,
    pub frame_number: u32,
    vars_base: usize,
    slot_base: u32,
    /// Join of the flow at every `break` targeting this frame.
    pub flow_at_break: FlowBits,
    /// Join of the flow at every `continue` targeting this frame.
    pub flow_at_continue: FlowBits,
    /// Join of the flow at every point inside a protected region from
    /// which a handler could take over.
    pub flow_at_try_exit: FlowBits,
}

impl Frame {
    fn is_break_target(&self) -> bool {
        matches!(self.kind, FrameKind::Loop | FrameKind::Switch | FrameKind::Labeled)
    }

    fn is_protected_region(&self) -> bool {
        matches!(self.kind, FrameKind::TryBody { .. } | FrameKind::FinallyGuard { .. })
    }
}

/// What a simple-name lookup found.
#[derive(Debug)]
pub enum Resolution {
    Local(VarDef),
    /// The variable lives in an enclosing invocation frame; `index` points
    /// into the member's capture descriptor table.
    Uplevel { index: usize, ty: Type },
    Unknown,
}

#[derive(Debug, Default)]
pub struct Context {
    frames: Vec<Frame>,
    vars: Vec<VarDef>,
    next_slot: u32,
    max_slots: u32,
    next_scope: u32,
    next_frame: u32,
    pub captures: CaptureSet,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Highest slot index ever allocated; the code generator starts its
    /// temporaries above this.
    pub fn max_slots(&self) -> u32 {
        self.max_slots
    }

    fn push(&mut self, kind: FrameKind, labels: Vec<String>) {
        self.next_scope += 1;
        let frame_number = match kind {
            FrameKind::Method { .. } => {
                self.next_frame += 1;
                self.next_frame
            }
            _ => self.frames.last().map(|f| f.frame_number).unwrap_or(0),
        };
        self.frames.push(Frame {
            kind,
            labels,
            scope_number: self.next_scope,
            frame_number,
            vars_base: self.vars.len(),
            slot_base: self.next_slot,
            flow_at_break: FlowBits::dead_end(),
            flow_at_continue: FlowBits::dead_end(),
            flow_at_try_exit: FlowBits::dead_end(),
        });
    }

    /// Enter the bottom frame of a member body.
    pub fn push_method(&mut self, ret: Type, throws: Vec<ClassId>, ctor: bool) {
        self.push(FrameKind::Method { ret, throws, ctor }, Vec::new());
    }

    /// Enter a nested scope. Label duplication against enclosing
    /// statements is diagnosed here, before anything is emitted.
    pub fn push_scope(&mut self, kind: FrameKind, labels: Vec<String>, span: Span, diags: &mut Diagnostics) {
        for label in &labels {
            if self.frames.iter().any(|f| f.labels.iter().any(|l| l == label)) {
                diags.error(span, keys::DUPLICATE_LABEL, vec![label.clone()]);
            }
        }
        self.push(kind, labels);
    }

    /// Leave the innermost scope: its variables fall out of scope and
    /// their flow state is dropped from `flow`.
    pub fn pop_scope(&mut self, flow: &mut FlowBits) -> Frame {
        let frame = self.frames.pop().expect("scope stack underflow");
        self.vars.truncate(frame.vars_base);
        self.next_slot = frame.slot_base;
        flow.shrink(frame.slot_base);
        frame
    }

    pub fn top(&mut self) -> &mut Frame {
        self.frames.last_mut().expect("scope stack is empty")
    }

    pub fn frame_at(&mut self, index: usize) -> &mut Frame {
        &mut self.frames[index]
    }

    pub fn current_frame_number(&self) -> u32 {
        self.frames.last().map(|f| f.frame_number).unwrap_or(0)
    }

    /// Declared return type of the enclosing member.
    pub fn method_return(&self) -> Type {
        for f in self.frames.iter().rev() {
            if let FrameKind::Method { ret, .. } = &f.kind {
                return ret.clone();
            }
        }
        Type::Void
    }

    /// Whether the current code is a constructor/initializer context, for
    /// the capture materialization decision.
    pub fn in_ctor_context(&self) -> bool {
        for f in self.frames.iter().rev() {
            if let FrameKind::Method { ctor, .. } = &f.kind {
                return *ctor;
            }
        }
        false
    }

    /// Declare a local in the innermost scope and allocate its slot(s).
    pub fn declare(
        &mut self,
        name: &str,
        ty: Type,
        flags: Modifiers,
        span: Span,
        diags: &mut Diagnostics,
    ) -> u32 {
        let frame_number = self.current_frame_number();
        if self
            .vars
            .iter()
            .any(|v| v.name == name && v.frame_number == frame_number)
        {
            diags.error(span, keys::DUPLICATE_VARIABLE, vec![name.to_string()]);
        }
        let slot = self.next_slot;
        self.next_slot += ty.words().max(1) as u32;
        self.max_slots = self.max_slots.max(self.next_slot);
        self.vars.push(VarDef {
            name: name.to_string(),
            ty,
            flags,
            slot,
            frame_number,
            scope_number: self.frames.last().map(|f| f.scope_number).unwrap_or(0),
            span,
        });
        slot
    }

    /// Resolve a simple name against the visible locals, innermost first.
    /// A hit in an older invocation frame is an uplevel reference and gets
    /// a capture descriptor (value-copy semantics; the reference site
    /// decides whether a synthetic field is needed).
    pub fn resolve(&mut self, name: &str) -> Resolution {
        let current_frame = self.current_frame_number();
        let in_ctor = self.in_ctor_context();
        for i in (0..self.vars.len()).rev() {
            if self.vars[i].name == name {
                let var = self.vars[i].clone();
                if var.frame_number == current_frame {
                    return Resolution::Local(var);
                }
                let ty = var.ty.clone();
                let index = self.captures.intern(&var, !in_ctor);
                return Resolution::Uplevel { index, ty };
            }
        }
        Resolution::Unknown
    }

    /// Every variable currently in scope; the loop back-branch check scans
    /// all of them, not just the loop's own scope.
    pub fn visible_vars(&self) -> &[VarDef] {
        &self.vars
    }

    /// Find the frame a `break` targets. Innermost loop/switch when
    /// unlabeled, innermost frame carrying the label otherwise.
    pub fn break_target(&self, label: Option<&str>) -> Option<usize> {
        match label {
            None => self.frames.iter().rposition(|f| f.is_break_target()),
            Some(l) => self.frames.iter().rposition(|f| f.labels.iter().any(|fl| fl == l)),
        }
    }

    /// Find the loop frame a `continue` targets.
    pub fn continue_target(&self, label: Option<&str>) -> Option<usize> {
        match label {
            None => self.frames.iter().rposition(|f| matches!(f.kind, FrameKind::Loop)),
            Some(l) => self
                .frames
                .iter()
                .rposition(|f| matches!(f.kind, FrameKind::Loop) && f.labels.iter().any(|fl| fl == l)),
        }
    }

    /// Index of the innermost method frame.
    pub fn method_frame(&self) -> Option<usize> {
        self.frames.iter().rposition(|f| matches!(f.kind, FrameKind::Method { .. }))
    }

    /// A non-local exit (break/continue/return/throw) crossing frames
    /// above `target` may hand control to any intervening handler, so its
    /// flow joins every protected region passed on the way out.
    pub fn record_exit_through(&mut self, target: usize, flow: &FlowBits) {
        for i in (target + 1..self.frames.len()).rev() {
            if self.frames[i].is_protected_region() {
                let acc = std::mem::replace(&mut self.frames[i].flow_at_try_exit, FlowBits::dead_end());
                self.frames[i].flow_at_try_exit = acc.join(flow);
            }
        }
    }

    /// Join `flow` into a statement boundary of the innermost protected
    /// region, if any: a handler can take over after any prefix of the
    /// protected block.
    pub fn record_try_boundary(&mut self, flow: &FlowBits) {
        if let Some(i) = self.frames.iter().rposition(|f| f.is_protected_region()) {
            let acc = std::mem::replace(&mut self.frames[i].flow_at_try_exit, FlowBits::dead_end());
            self.frames[i].flow_at_try_exit = acc.join(flow);
        }
    }

    /// Propagate a thrown exception outward from the current point: the
    /// innermost covering catch clause handles it, a pending finally parks
    /// it until the cleanup's completion is known, and otherwise it must
    /// appear in the member's declared throws. Returns `false` when it
    /// escapes undeclared. Frames passed through record the class in their
    /// thrown set for the exception-table interest of the region.
    pub fn raise(&mut self, thrown: ClassId, span: Span, covers: impl Fn(&Type, ClassId) -> bool) -> bool {
        for i in (0..self.frames.len()).rev() {
            match &mut self.frames[i].kind {
                FrameKind::TryBody { catches, thrown: set } => {
                    set.push(thrown);
                    if catches.iter().any(|c| covers(c, thrown)) {
                        return true;
                    }
                }
                FrameKind::FinallyGuard { pending } => {
                    pending.push((thrown, span));
                    return true;
                }
                FrameKind::Method { throws, .. } => {
                    return throws.iter().any(|declared| covers(&Type::Class(*declared), thrown));
                }
                _ => {}
            }
        }
        false
    }
}
