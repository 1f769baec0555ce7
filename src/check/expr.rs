//! Expression checking: type selection, conversion insertion, name
//! resolution, lvalue validation, and condition splitting.

use crate::check::context::Resolution;
use crate::check::flowbits::FlowBits;
use crate::check::Checker;
use crate::diag::keys;
use crate::span::Span;
use crate::syms::FieldAccess;
use crate::tree::{BinOp, Expr, ExprKind, UnOp};
use crate::types::{Constant, Type};

/// The split flow of a boolean expression: what is definitely assigned
/// given it evaluates true, and given it evaluates false.
#[derive(Debug, Clone)]
pub struct CondBits {
    pub when_true: FlowBits,
    pub when_false: FlowBits,
}

impl CondBits {
    /// Non-short-circuiting expressions do not refine flow: both branches
    /// carry the expression's own output flow.
    pub fn same(flow: FlowBits) -> CondBits {
        CondBits { when_true: flow.clone(), when_false: flow }
    }

    /// Collapse back to straight-line flow.
    pub fn merge(self) -> FlowBits {
        self.when_true.join(&self.when_false)
    }

    pub fn swap(self) -> CondBits {
        CondBits { when_true: self.when_false, when_false: self.when_true }
    }
}

/// Whether changing representation from `from` to `to` needs an actual
/// conversion instruction. Everything int-sized shares one stack
/// representation, and reference widening is free.
fn conversion_needed(from: &Type, to: &Type) -> bool {
    fn group(t: &Type) -> Option<u8> {
        match t {
            Type::Boolean | Type::Byte | Type::Short | Type::Char | Type::Int => Some(0),
            Type::Long => Some(1),
            Type::Float => Some(2),
            Type::Double => Some(3),
            _ => None,
        }
    }
    match (group(from), group(to)) {
        (Some(a), Some(b)) => a != b,
        _ => false,
    }
}

/// Wrap `e` in an implicit conversion node yielding `target`.
fn wrap_convert(e: &mut Expr, target: Type) {
    let span = e.span;
    let inner = std::mem::replace(e, Expr::new(ExprKind::This, span));
    *e = Expr { kind: ExprKind::Convert { value: Box::new(inner) }, span, ty: target };
}

/// Information about a checked assignment target.
pub(crate) struct LvalueInfo {
    pub ty: Type,
    /// Set when the target is a local slot: (slot, is_final, name).
    pub local: Option<(u32, bool, String)>,
}

impl LvalueInfo {
    fn poisoned() -> Self {
        LvalueInfo { ty: Type::Error, local: None }
    }
}

impl Checker<'_> {
    /// Report an error for `e` and poison its type so no enclosing node
    /// re-reports it.
    fn error_expr(&mut self, e: &mut Expr, key: &'static str, args: Vec<String>) {
        self.diags.error(e.span, key, args);
        e.ty = Type::Error;
    }

    /// Insert the assignment conversion from `e` to `target`, allowing
    /// the constant-int narrowing the language permits.
    pub(crate) fn coerce(&mut self, e: &mut Expr, target: &Type) {
        if e.ty.is_error() || target.is_error() {
            return;
        }
        if self.syms.is_assignable(&e.ty, target) {
            if conversion_needed(&e.ty, target) {
                wrap_convert(e, target.clone());
            } else if e.ty.is_numeric() && target.is_numeric() {
                e.ty = target.clone();
            }
            return;
        }
        if let Some(Constant::Int(v)) = e.constant() {
            if let Some((lo, hi)) = target.int_range() {
                if (lo..=hi).contains(&(*v as i64)) {
                    e.ty = target.clone();
                    return;
                }
            }
        }
        let found = e.ty.to_string();
        self.error_expr(e, keys::TYPE_MISMATCH, vec![found, target.to_string()]);
    }

    /// Promote one operand of a binary operation to the selected type.
    fn promote(&mut self, e: &mut Expr, target: &Type) {
        if conversion_needed(&e.ty, target) {
            wrap_convert(e, target.clone());
        }
    }

    /// Require a non-void value.
    pub(crate) fn require_value(&mut self, e: &mut Expr) {
        if e.ty.is_void() {
            self.error_expr(e, keys::VOID_VALUE, vec![]);
        }
    }

    pub(crate) fn raise_exception(&mut self, thrown: crate::types::ClassId, span: Span) {
        let syms = &*self.syms;
        let handled = self.ctx.raise(thrown, span, |catch_ty, class| {
            matches!(catch_ty, Type::Class(cc) if syms.is_subclass(class, *cc))
        });
        if !handled && syms.is_checked_exception(thrown) {
            let name = syms.class(thrown).name.clone();
            self.diags.error(span, keys::UNCAUGHT_EXCEPTION, vec![name]);
        }
    }

    /// Check an expression in value context. Returns the flow after its
    /// evaluation; `e` is annotated (and possibly rewritten) in place.
    pub(crate) fn check_expr(&mut self, e: &mut Expr, flow: FlowBits) -> FlowBits {
        // Boolean connectives are checked through the condition split and
        // their straight-line flow is the join of the two halves.
        if matches!(
            e.kind,
            ExprKind::And { .. } | ExprKind::Or { .. } | ExprKind::Unary { op: UnOp::Not, .. }
        ) {
            return self.check_cond(e, flow).merge();
        }
        match &mut e.kind {
            ExprKind::Literal(c) => {
                e.ty = c.ty(self.syms.predefined.string);
                flow
            }

            ExprKind::Ident(name) => {
                let name = name.clone();
                match self.ctx.resolve(&name) {
                    Resolution::Local(var) => {
                        if !flow.is_assigned(var.slot) {
                            self.diags.error(e.span, keys::VAR_UNASSIGNED, vec![name.clone()]);
                        }
                        e.kind = ExprKind::Local { name, slot: var.slot };
                        e.ty = var.ty;
                        flow
                    }
                    Resolution::Uplevel { index, ty } => {
                        e.kind = ExprKind::Uplevel { index, name };
                        e.ty = ty;
                        flow
                    }
                    Resolution::Unknown => {
                        // Fall back to an implicit-this / static field of
                        // the current class.
                        if self.syms.lookup_field(self.class, &name).is_some() {
                            e.kind = ExprKind::Field {
                                base: None,
                                name,
                                field: None,
                                access: FieldAccess::Direct,
                            };
                            self.check_field(e, flow)
                        } else {
                            self.error_expr(e, keys::UNDEFINED_VAR, vec![name]);
                            flow
                        }
                    }
                }
            }

            ExprKind::Local { name, slot } => {
                let (name, slot) = (name.clone(), *slot);
                if !flow.is_assigned(slot) {
                    self.diags.error(e.span, keys::VAR_UNASSIGNED, vec![name]);
                }
                if e.ty.is_error() {
                    if let Some(var) = self.ctx.visible_vars().iter().rev().find(|v| v.slot == slot) {
                        e.ty = var.ty.clone();
                    }
                }
                flow
            }

            ExprKind::Uplevel { .. } => flow,

            ExprKind::This => {
                e.ty = Type::Class(self.class);
                flow
            }

            ExprKind::Super => {
                let sup = self.syms.class(self.class).superclass.unwrap_or(self.syms.predefined.object);
                e.ty = Type::Class(sup);
                flow
            }

            ExprKind::Field { .. } => self.check_field(e, flow),

            ExprKind::ArrayLength { array } => {
                let flow = self.check_expr(array, flow);
                if !matches!(array.ty, Type::Array(_)) && !array.ty.is_error() {
                    let found = array.ty.to_string();
                    self.error_expr(e, keys::TYPE_MISMATCH, vec![found, "array".into()]);
                } else {
                    e.ty = Type::Int;
                }
                flow
            }

            ExprKind::Index { array, index } => {
                let flow = self.check_expr(array, flow);
                let flow = self.check_expr(index, flow);
                self.coerce(index, &Type::Int);
                match &array.ty {
                    Type::Array(elem) => e.ty = (**elem).clone(),
                    Type::Error => e.ty = Type::Error,
                    other => {
                        let found = other.to_string();
                        self.error_expr(e, keys::TYPE_MISMATCH, vec![found, "array".into()]);
                    }
                }
                flow
            }

            ExprKind::Call { base, name, method, args } => {
                let name = name.clone();
                let mut flow = flow;
                let recv_class = match base {
                    Some(b) => {
                        flow = self.check_expr(b, flow);
                        match &b.ty {
                            Type::Class(c) => Some(*c),
                            Type::Error => None,
                            other => {
                                let found = other.to_string();
                                let span = e.span;
                                self.diags.error(span, keys::TYPE_MISMATCH, vec![found, "object".into()]);
                                None
                            }
                        }
                    }
                    None => Some(self.class),
                };
                if method.is_none() {
                    if let Some(c) = recv_class {
                        *method = self.syms.lookup_method(c, &name, args.len());
                    }
                }
                let Some(mref) = *method else {
                    for a in args.iter_mut() {
                        flow = self.check_expr(a, flow);
                    }
                    if recv_class.is_some() {
                        self.error_expr(e, keys::UNDEFINED_METHOD, vec![name]);
                    } else {
                        e.ty = Type::Error;
                    }
                    return flow;
                };
                let info = self.syms.method(mref);
                let (params, ret, throws, flags) =
                    (info.params.clone(), info.ret.clone(), info.throws.clone(), info.flags);
                if !self.syms.can_access(self.class, mref.class, flags) {
                    self.diags.error(e.span, keys::MEMBER_NOT_ACCESSIBLE, vec![name]);
                }
                for (a, p) in args.iter_mut().zip(&params) {
                    flow = self.check_expr(a, flow);
                    self.require_value(a);
                    self.coerce(a, p);
                }
                let span = e.span;
                for t in throws {
                    self.raise_exception(t, span);
                }
                e.ty = ret;
                flow
            }

            ExprKind::New { class, ctor, args } => {
                let class = *class;
                if ctor.is_none() {
                    *ctor = self.syms.lookup_method(class, "<init>", args.len());
                }
                let params = ctor.map(|c| self.syms.method(c).params.clone()).unwrap_or_default();
                let throws = ctor.map(|c| self.syms.method(c).throws.clone()).unwrap_or_default();
                let mut flow = flow;
                for (i, a) in args.iter_mut().enumerate() {
                    flow = self.check_expr(a, flow);
                    self.require_value(a);
                    if let Some(p) = params.get(i) {
                        self.coerce(a, p);
                    }
                }
                let span = e.span;
                for t in throws {
                    self.raise_exception(t, span);
                }
                e.ty = Type::Class(class);
                flow
            }

            ExprKind::NewArray { elem, dims } => {
                let mut flow = flow;
                for d in dims.iter_mut() {
                    flow = self.check_expr(d, flow);
                    self.coerce(d, &Type::Int);
                }
                let mut ty = elem.clone();
                for _ in 0..dims.len() {
                    ty = Type::array(ty);
                }
                e.ty = ty;
                flow
            }

            ExprKind::Unary { op, arg } => {
                let op = *op;
                let flow = self.check_expr(arg, flow);
                if arg.ty.is_error() {
                    e.ty = Type::Error;
                    return flow;
                }
                let promoted = arg.ty.unary_promotion();
                match (op, promoted) {
                    (UnOp::Neg | UnOp::Pos, Some(ty)) => e.ty = ty,
                    (UnOp::BitNot, Some(ty)) if ty.is_integral() => e.ty = ty,
                    _ => {
                        let found = arg.ty.to_string();
                        self.error_expr(e, keys::INVALID_OPERAND, vec![op.to_string(), found]);
                    }
                }
                flow
            }

            ExprKind::Binary { .. } => self.check_binary(e, flow),

            ExprKind::And { .. } | ExprKind::Or { .. } => {
                unreachable!("boolean connectives dispatch through check_cond")
            }

            ExprKind::Conditional { cond, when_true, when_false } => {
                let cv = self.check_cond(cond, flow);
                let ft = self.check_expr(when_true, cv.when_true);
                let ff = self.check_expr(when_false, cv.when_false);
                self.require_value(when_true);
                self.require_value(when_false);
                let ty = if when_true.ty.is_error() || when_false.ty.is_error() {
                    Type::Error
                } else if when_true.ty == when_false.ty {
                    when_true.ty.clone()
                } else if let Some(p) = Type::binary_promotion(&when_true.ty, &when_false.ty) {
                    self.promote(when_true, &p);
                    self.promote(when_false, &p);
                    p
                } else if self.syms.is_assignable(&when_true.ty, &when_false.ty) {
                    when_false.ty.clone()
                } else if self.syms.is_assignable(&when_false.ty, &when_true.ty) {
                    when_true.ty.clone()
                } else {
                    let a = when_true.ty.to_string();
                    let b = when_false.ty.to_string();
                    self.diags.error(e.span, keys::TYPE_MISMATCH, vec![a, b]);
                    Type::Error
                };
                e.ty = ty;
                ft.join(&ff)
            }

            ExprKind::InstanceOf { value, target } => {
                let target = target.clone();
                let flow = self.check_expr(value, flow);
                if !value.ty.is_error() {
                    if !value.ty.is_reference() || !target.is_reference() {
                        let found = value.ty.to_string();
                        self.error_expr(e, keys::INVALID_CAST, vec![found, target.to_string()]);
                    } else if !self.syms.is_castable(&value.ty, &target) {
                        let found = value.ty.to_string();
                        self.error_expr(e, keys::INCOMPARABLE_TYPES, vec![found, target.to_string()]);
                    } else {
                        e.ty = Type::Boolean;
                    }
                } else {
                    e.ty = Type::Error;
                }
                flow
            }

            ExprKind::Cast { target, value } => {
                let target = target.clone();
                let flow = self.check_expr(value, flow);
                if value.ty.is_error() {
                    e.ty = Type::Error;
                } else if self.syms.is_castable(&value.ty, &target) {
                    e.ty = target;
                } else {
                    let found = value.ty.to_string();
                    self.error_expr(e, keys::INVALID_CAST, vec![found, target.to_string()]);
                }
                flow
            }

            ExprKind::Convert { value } => {
                // Already carries its target type; only the operand needs
                // checking (the folder re-runs over inserted nodes).
                let ty = e.ty.clone();
                let flow = self.check_expr(value, flow);
                e.ty = ty;
                flow
            }

            ExprKind::Assign { .. } => self.check_assign(e, flow),
            ExprKind::AssignOp { .. } => self.check_assign_op(e, flow),
            ExprKind::IncDec { .. } => self.check_inc_dec(e, flow),

            ExprKind::Comma { effect, value } => {
                let flow = self.check_expr(effect, flow);
                let flow = self.check_expr(value, flow);
                e.ty = value.ty.clone();
                flow
            }

            ExprKind::InlineCall { method, .. } => {
                // Produced by the folding pass from an already-checked
                // call; nothing to re-resolve.
                e.ty = self.syms.method(*method).ret.clone();
                flow
            }
        }
    }

    /// Check a boolean expression, producing the when-true/when-false flow
    /// pair. Short-circuit operators refine the split; constant booleans
    /// kill the impossible branch; everything else is the trivial base
    /// case returning its output flow on both branches.
    pub(crate) fn check_cond(&mut self, e: &mut Expr, flow: FlowBits) -> CondBits {
        match &mut e.kind {
            ExprKind::Literal(Constant::Bool(b)) => {
                let b = *b;
                e.ty = Type::Boolean;
                if b {
                    CondBits { when_true: flow, when_false: FlowBits::dead_end() }
                } else {
                    CondBits { when_true: FlowBits::dead_end(), when_false: flow }
                }
            }

            ExprKind::Unary { op: UnOp::Not, arg } => {
                let cv = self.check_cond(arg, flow);
                if !arg.ty.is_boolean() && !arg.ty.is_error() {
                    let found = arg.ty.to_string();
                    self.error_expr(e, keys::INVALID_OPERAND, vec!["!".into(), found]);
                } else {
                    e.ty = Type::Boolean;
                }
                cv.swap()
            }

            ExprKind::And { left, right } => {
                let cl = self.check_cond(left, flow);
                let cr = self.check_cond(right, cl.when_true);
                self.require_boolean_operands(left, right);
                e.ty = if left.ty.is_error() || right.ty.is_error() {
                    Type::Error
                } else {
                    Type::Boolean
                };
                CondBits {
                    when_true: cr.when_true,
                    when_false: cl.when_false.join(&cr.when_false),
                }
            }

            ExprKind::Or { left, right } => {
                let cl = self.check_cond(left, flow);
                let cr = self.check_cond(right, cl.when_false);
                self.require_boolean_operands(left, right);
                e.ty = if left.ty.is_error() || right.ty.is_error() {
                    Type::Error
                } else {
                    Type::Boolean
                };
                CondBits {
                    when_true: cl.when_true.join(&cr.when_true),
                    when_false: cr.when_false,
                }
            }

            _ => {
                let out = self.check_expr(e, flow);
                if !e.ty.is_boolean() && !e.ty.is_error() {
                    let found = e.ty.to_string();
                    self.error_expr(e, keys::TYPE_MISMATCH, vec![found, Type::Boolean.to_string()]);
                }
                CondBits::same(out)
            }
        }
    }

    fn require_boolean_operands(&mut self, left: &mut Expr, right: &mut Expr) {
        for side in [left, right] {
            if !side.ty.is_boolean() && !side.ty.is_error() {
                let found = side.ty.to_string();
                self.error_expr(side, keys::TYPE_MISMATCH, vec![found, Type::Boolean.to_string()]);
            }
        }
    }

    /// Type selection for binary operators, per operator family.
    fn check_binary(&mut self, e: &mut Expr, flow: FlowBits) -> FlowBits {
        let span = e.span;
        let ExprKind::Binary { op, left, right } = &mut e.kind else { unreachable!() };
        let op = *op;
        let flow = self.check_expr(left, flow);
        let flow = self.check_expr(right, flow);
        self.require_value(left);
        self.require_value(right);
        if left.ty.is_error() || right.ty.is_error() {
            e.ty = Type::Error;
            return flow;
        }

        if op == BinOp::Add && (self.is_string(&left.ty) || self.is_string(&right.ty)) {
            // String concatenation: the other operand may be anything
            // non-void; conversion happens during emission.
            e.ty = Type::Class(self.syms.predefined.string);
            return flow;
        }

        if op.is_arithmetic() {
            match Type::binary_promotion(&left.ty, &right.ty) {
                Some(ty) => {
                    self.promote(left, &ty);
                    self.promote(right, &ty);
                    e.ty = ty;
                }
                None => {
                    let args = vec![op.to_string(), left.ty.to_string(), right.ty.to_string()];
                    self.error_expr(e, keys::INVALID_OPERAND, args);
                }
            }
            return flow;
        }

        if op.is_bitwise() {
            if left.ty.is_boolean() && right.ty.is_boolean() {
                e.ty = Type::Boolean;
            } else if left.ty.is_integral() && right.ty.is_integral() {
                let ty = Type::binary_promotion(&left.ty, &right.ty).expect("integral promotion");
                self.promote(left, &ty);
                self.promote(right, &ty);
                e.ty = ty;
            } else {
                let args = vec![op.to_string(), left.ty.to_string(), right.ty.to_string()];
                self.error_expr(e, keys::INVALID_OPERAND, args);
            }
            return flow;
        }

        if op.is_shift() {
            // The left operand alone determines the result type; the right
            // operand is promoted to int independently, so long<<int and
            // int<<long are both legal.
            let left_ok = left.ty.is_integral();
            let right_ok = right.ty.is_integral();
            if !left_ok || !right_ok {
                let args = vec![op.to_string(), left.ty.to_string(), right.ty.to_string()];
                self.error_expr(e, keys::INVALID_OPERAND, args);
                return flow;
            }
            let ty = left.ty.unary_promotion().expect("integral promotion");
            self.promote(left, &ty);
            self.promote(right, &Type::Int);
            e.ty = ty;
            return flow;
        }

        debug_assert!(op.is_comparison());
        if left.ty.is_numeric() && right.ty.is_numeric() {
            let ty = Type::binary_promotion(&left.ty, &right.ty).expect("numeric promotion");
            self.promote(left, &ty);
            self.promote(right, &ty);
            e.ty = Type::Boolean;
        } else if op.is_equality() && left.ty.is_boolean() && right.ty.is_boolean() {
            e.ty = Type::Boolean;
        } else if op.is_equality() && left.ty.is_reference() && right.ty.is_reference() {
            // References compare only when assignable in one direction.
            if self.syms.is_comparable(&left.ty, &right.ty) {
                e.ty = Type::Boolean;
            } else {
                let args = vec![left.ty.to_string(), right.ty.to_string()];
                self.diags.error(span, keys::INCOMPARABLE_TYPES, args);
                e.ty = Type::Error;
            }
        } else {
            let args = vec![left.ty.to_string(), right.ty.to_string()];
            self.diags.error(span, keys::INCOMPARABLE_TYPES, args);
            e.ty = Type::Error;
        }
        flow
    }

    /// Resolve and type a field access, rewriting `array.length` into its
    /// own node kind and selecting the access strategy.
    fn check_field(&mut self, e: &mut Expr, flow: FlowBits) -> FlowBits {
        let span = e.span;
        let ExprKind::Field { base, name, field, access } = &mut e.kind else { unreachable!() };
        let name = name.clone();
        let mut flow = flow;
        let owner = match base {
            Some(b) => {
                flow = self.check_expr(b, flow);
                match &b.ty {
                    Type::Class(c) => Some(*c),
                    Type::Array(_) if name == "length" => {
                        let array = base.take().expect("array base");
                        e.kind = ExprKind::ArrayLength { array };
                        e.ty = Type::Int;
                        return flow;
                    }
                    Type::Error => None,
                    other => {
                        let found = other.to_string();
                        self.diags.error(span, keys::TYPE_MISMATCH, vec![found, "object".into()]);
                        None
                    }
                }
            }
            None => Some(self.class),
        };
        let Some(owner) = owner else {
            e.ty = Type::Error;
            return flow;
        };
        if field.is_none() {
            *field = self.syms.lookup_field(owner, &name);
        }
        let Some(fref) = *field else {
            self.error_expr(e, keys::UNDEFINED_FIELD, vec![name]);
            return flow;
        };
        let ty = self.syms.field(fref).ty.clone();
        match self.syms.field_access(self.class, fref) {
            Some(strategy) => {
                *access = strategy;
                e.ty = ty;
            }
            None => {
                self.error_expr(e, keys::MEMBER_NOT_ACCESSIBLE, vec![name]);
            }
        }
        flow
    }

    /// Check an assignment target without reading it, resolving names the
    /// same way value context does. `for_read` additionally enforces
    /// definite assignment (compound assignment and increment read first).
    fn check_lvalue(&mut self, e: &mut Expr, flow: FlowBits, for_read: bool) -> (FlowBits, LvalueInfo) {
        match &mut e.kind {
            ExprKind::Ident(name) => {
                let name = name.clone();
                match self.ctx.resolve(&name) {
                    Resolution::Local(var) => {
                        if for_read && !flow.is_assigned(var.slot) {
                            self.diags.error(e.span, keys::VAR_UNASSIGNED, vec![name.clone()]);
                        }
                        e.ty = var.ty.clone();
                        e.kind = ExprKind::Local { name: name.clone(), slot: var.slot };
                        let info = LvalueInfo {
                            local: Some((var.slot, var.is_final(), name)),
                            ty: var.ty,
                        };
                        (flow, info)
                    }
                    Resolution::Uplevel { .. } => {
                        // Captured variables are copies; writing through
                        // them cannot be expressed.
                        self.error_expr(e, keys::INVALID_LVALUE, vec![name]);
                        (flow, LvalueInfo::poisoned())
                    }
                    Resolution::Unknown => {
                        if self.syms.lookup_field(self.class, &name).is_some() {
                            e.kind = ExprKind::Field {
                                base: None,
                                name,
                                field: None,
                                access: FieldAccess::Direct,
                            };
                            let flow = self.check_field(e, flow);
                            let ty = e.ty.clone();
                            (flow, LvalueInfo { ty, local: None })
                        } else {
                            self.error_expr(e, keys::UNDEFINED_VAR, vec![name]);
                            (flow, LvalueInfo::poisoned())
                        }
                    }
                }
            }

            ExprKind::Local { name, slot } => {
                let (name, slot) = (name.clone(), *slot);
                if for_read && !flow.is_assigned(slot) {
                    self.diags.error(e.span, keys::VAR_UNASSIGNED, vec![name.clone()]);
                }
                let var = self.ctx.visible_vars().iter().rev().find(|v| v.slot == slot).cloned();
                let (ty, is_final) = match var {
                    Some(v) => (v.ty.clone(), v.is_final()),
                    None => (e.ty.clone(), false),
                };
                e.ty = ty.clone();
                (flow, LvalueInfo { ty, local: Some((slot, is_final, name)) })
            }

            ExprKind::Field { .. } => {
                let flow = self.check_field(e, flow);
                let ty = e.ty.clone();
                match &e.kind {
                    // `array.length` is not assignable.
                    ExprKind::ArrayLength { .. } => {
                        self.error_expr(e, keys::INVALID_LVALUE, vec!["length".into()]);
                        (flow, LvalueInfo::poisoned())
                    }
                    _ => (flow, LvalueInfo { ty, local: None }),
                }
            }

            ExprKind::Index { .. } => {
                let flow = self.check_expr(e, flow);
                let ty = e.ty.clone();
                (flow, LvalueInfo { ty, local: None })
            }

            _ => {
                self.error_expr(e, keys::INVALID_LVALUE, vec![]);
                (flow, LvalueInfo::poisoned())
            }
        }
    }

    fn check_assign(&mut self, e: &mut Expr, flow: FlowBits) -> FlowBits {
        let span = e.span;
        let ExprKind::Assign { target, value } = &mut e.kind else { unreachable!() };
        let (flow, info) = self.check_lvalue(target, flow, false);
        let mut flow = self.check_expr(value, flow);
        self.require_value(value);
        if !info.ty.is_error() {
            self.coerce(value, &info.ty);
        }
        if let Some((slot, is_final, name)) = info.local {
            // A final may be assigned only while definitely unassigned.
            if is_final && !flow.is_unassigned(slot) {
                self.diags.error(span, keys::FINAL_REASSIGNED, vec![name]);
            }
            flow.assign(slot);
        }
        e.ty = info.ty;
        flow
    }

    fn check_assign_op(&mut self, e: &mut Expr, flow: FlowBits) -> FlowBits {
        let span = e.span;
        let ExprKind::AssignOp { op, target, value } = &mut e.kind else { unreachable!() };
        let op = *op;
        let (flow, info) = self.check_lvalue(target, flow, true);
        let mut flow = self.check_expr(value, flow);
        self.require_value(value);

        if !info.ty.is_error() && !value.ty.is_error() {
            if op == BinOp::Add && self.is_string(&info.ty) {
                // String += anything non-void.
            } else if op.is_shift() {
                if !info.ty.is_integral() || !value.ty.is_integral() {
                    let args = vec![op.to_string(), info.ty.to_string(), value.ty.to_string()];
                    self.diags.error(span, keys::INVALID_OPERAND, args);
                } else {
                    self.coerce(value, &Type::Int);
                }
            } else if op.is_bitwise() && info.ty.is_boolean() && value.ty.is_boolean() {
                // boolean &= / |= / ^=
            } else if Type::binary_promotion(&info.ty, &value.ty).is_none() {
                let args = vec![op.to_string(), info.ty.to_string(), value.ty.to_string()];
                self.diags.error(span, keys::INVALID_OPERAND, args);
            }
            // The computation widens, the result silently narrows back:
            // the expression type is always the target's original type.
        }
        if let Some((slot, is_final, name)) = info.local {
            if is_final {
                self.diags.error(span, keys::FINAL_REASSIGNED, vec![name]);
            }
            flow.assign(slot);
        }
        e.ty = info.ty;
        flow
    }

    fn check_inc_dec(&mut self, e: &mut Expr, flow: FlowBits) -> FlowBits {
        let span = e.span;
        let ExprKind::IncDec { op: _, target } = &mut e.kind else { unreachable!() };
        let (mut flow, info) = self.check_lvalue(target, flow, true);
        if !info.ty.is_error() && !info.ty.is_numeric() {
            let args = vec![info.ty.to_string()];
            self.diags.error(span, keys::INVALID_OPERAND, args);
        }
        if let Some((slot, is_final, name)) = info.local {
            if is_final {
                self.diags.error(span, keys::FINAL_REASSIGNED, vec![name]);
            }
            flow.assign(slot);
        }
        e.ty = info.ty;
        flow
    }
}
