//! Semantic checking pass.
//!
//! Walks a member body top-down, threading a definite-assignment flow set:
//! resolves names against the scope stack, selects expression types and
//! inserts implicit conversions, rewrites ambiguous accesses into resolved
//! member references, and enforces the flow-sensitive rules (definite
//! assignment, blank finals, reachability, switch and try/finally flow).
//!
//! Source errors go to the diagnostic sink and checking keeps going;
//! error-typed subtrees are treated as already diagnosed so one mistake
//! produces one message.

pub mod capture;
pub mod context;
mod expr;
pub mod flowbits;
mod stmt;

pub use capture::{Capture, CaptureSet};
pub use context::{Context, FrameKind, Resolution, VarDef};
pub use expr::CondBits;
pub use flowbits::FlowBits;

use crate::diag::{keys, Diagnostics};
use crate::syms::{Modifiers, Symtab};
use crate::tree::Stmt;
use crate::types::{ClassId, Type};

/// Signature of the member body being checked, as resolved by the
/// enter/resolve collaborator.
#[derive(Debug, Clone)]
pub struct MethodSig {
    pub ret: Type,
    pub throws: Vec<ClassId>,
    pub params: Vec<(String, Type)>,
    pub is_static: bool,
    pub is_ctor: bool,
}

impl MethodSig {
    pub fn void_static() -> Self {
        MethodSig { ret: Type::Void, throws: vec![], params: vec![], is_static: true, is_ctor: false }
    }
}

/// What checking produces besides the annotated tree.
#[derive(Debug)]
pub struct CheckOutcome {
    /// Slots used by declared locals; code generation allocates its
    /// temporaries above this.
    pub max_slots: u32,
    /// Captured-variable descriptors for uplevel references.
    pub captures: CaptureSet,
}

pub(crate) struct Checker<'a> {
    pub syms: &'a mut Symtab,
    pub diags: &'a mut Diagnostics,
    pub class: ClassId,
    pub ctx: Context,
}

impl<'a> Checker<'a> {
    pub fn new(syms: &'a mut Symtab, diags: &'a mut Diagnostics, class: ClassId) -> Self {
        Checker { syms, diags, class, ctx: Context::new() }
    }

    pub(crate) fn is_string(&self, ty: &Type) -> bool {
        matches!(ty, Type::Class(c) if *c == self.syms.predefined.string)
    }
}

/// Check one member body. The tree is annotated and rewritten in place;
/// diagnostics accumulate in `diags`.
pub fn check_method(
    syms: &mut Symtab,
    diags: &mut Diagnostics,
    class: ClassId,
    sig: &MethodSig,
    body: &mut Stmt,
) -> CheckOutcome {
    log::debug!("checking member body of class#{}", class.0);
    let mut checker = Checker::new(syms, diags, class);
    checker.ctx.push_method(sig.ret.clone(), sig.throws.clone(), sig.is_ctor);

    let mut flow = FlowBits::live();
    if !sig.is_static {
        let slot = checker.ctx.declare(
            "this",
            Type::Class(class),
            Modifiers::FINAL,
            body.span,
            checker.diags,
        );
        flow.assign(slot);
    }
    for (name, ty) in &sig.params {
        let slot = checker
            .ctx
            .declare(name, ty.clone(), Modifiers::empty(), body.span, checker.diags);
        flow.assign(slot);
    }

    let out = checker.check_stmt(body, flow);
    if !sig.ret.is_void() && !out.is_dead_end() {
        checker.diags.error(body.span, keys::MISSING_RETURN, vec![]);
    }

    let mut ctx = checker.ctx;
    let first_capture_slot = ctx.max_slots();
    ctx.captures.finalize(first_capture_slot);
    CheckOutcome { max_slots: ctx.max_slots(), captures: ctx.captures }
}
