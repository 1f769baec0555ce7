use std::fmt;

use crate::span::Span;
use crate::syms::{FieldAccess, FieldRef, MethodRef, Modifiers};
use crate::types::{ClassId, Constant, Type};

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Pos,
    Not,
    BitNot,
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    Ushr,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl BinOp {
    pub fn is_shift(self) -> bool {
        matches!(self, BinOp::Shl | BinOp::Shr | BinOp::Ushr)
    }

    pub fn is_equality(self) -> bool {
        matches!(self, BinOp::Eq | BinOp::Ne)
    }

    pub fn is_relational(self) -> bool {
        matches!(self, BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge)
    }

    pub fn is_comparison(self) -> bool {
        self.is_equality() || self.is_relational()
    }

    pub fn is_arithmetic(self) -> bool {
        matches!(self, BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Rem)
    }

    pub fn is_bitwise(self) -> bool {
        matches!(self, BinOp::BitAnd | BinOp::BitOr | BinOp::BitXor)
    }

    /// Logical complement of a comparison operator, for rewriting
    /// `!(a < b)` into `a >= b`. Only valid on comparisons.
    pub fn negate(self) -> Option<BinOp> {
        Some(match self {
            BinOp::Lt => BinOp::Ge,
            BinOp::Ge => BinOp::Lt,
            BinOp::Gt => BinOp::Le,
            BinOp::Le => BinOp::Gt,
            BinOp::Eq => BinOp::Ne,
            BinOp::Ne => BinOp::Eq,
            _ => return None,
        })
    }
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Rem => "%",
            BinOp::BitAnd => "&",
            BinOp::BitOr => "|",
            BinOp::BitXor => "^",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
            BinOp::Ushr => ">>>",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
        };
        write!(f, "{s}")
    }
}

impl fmt::Display for UnOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UnOp::Neg => "-",
            UnOp::Pos => "+",
            UnOp::Not => "!",
            UnOp::BitNot => "~",
        };
        write!(f, "{s}")
    }
}

/// Increment/decrement operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncOp {
    PreInc,
    PreDec,
    PostInc,
    PostDec,
}

impl IncOp {
    pub fn is_prefix(self) -> bool {
        matches!(self, IncOp::PreInc | IncOp::PreDec)
    }

    /// +1 or -1
    pub fn delta(self) -> i32 {
        match self {
            IncOp::PreInc | IncOp::PostInc => 1,
            IncOp::PreDec | IncOp::PostDec => -1,
        }
    }
}

/// An expression node: operator kind, source span, and the type resolved by
/// the checking pass (`Type::Error` until then, and afterwards exactly when
/// a diagnostic was reported for this node).
#[derive(Debug, Clone)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
    pub ty: Type,
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    Literal(Constant),
    /// Unresolved name; the checking pass rewrites this to `Local`,
    /// `Field`, or `Uplevel`.
    Ident(String),
    /// Resolved local variable or parameter.
    Local { name: String, slot: u32 },
    This,
    Super,
    Field {
        base: Option<Box<Expr>>,
        name: String,
        field: Option<FieldRef>,
        access: FieldAccess,
    },
    ArrayLength { array: Box<Expr> },
    Index { array: Box<Expr>, index: Box<Expr> },
    Call {
        base: Option<Box<Expr>>,
        name: String,
        method: Option<MethodRef>,
        args: Vec<Expr>,
    },
    New { class: ClassId, ctor: Option<MethodRef>, args: Vec<Expr> },
    NewArray { elem: Type, dims: Vec<Expr> },
    Unary { op: UnOp, arg: Box<Expr> },
    Binary { op: BinOp, left: Box<Expr>, right: Box<Expr> },
    /// Short-circuit `&&`
    And { left: Box<Expr>, right: Box<Expr> },
    /// Short-circuit `||`
    Or { left: Box<Expr>, right: Box<Expr> },
    Conditional { cond: Box<Expr>, when_true: Box<Expr>, when_false: Box<Expr> },
    InstanceOf { value: Box<Expr>, target: Type },
    /// Explicit cast written in source.
    Cast { target: Type, value: Box<Expr> },
    /// Implicit conversion inserted by the checking pass; converts the
    /// operand to this node's own type.
    Convert { value: Box<Expr> },
    Assign { target: Box<Expr>, value: Box<Expr> },
    /// Compound assignment (`+=` and friends). The result type is always
    /// the target's original type; the computation silently narrows.
    AssignOp { op: BinOp, target: Box<Expr>, value: Box<Expr> },
    IncDec { op: IncOp, target: Box<Expr> },
    /// Evaluate `effect` for its side effects, discard its value, then
    /// yield `value`. Produced by the folder to preserve side effects of
    /// otherwise-eliminated operands.
    Comma { effect: Box<Expr>, value: Box<Expr> },
    /// Reference to a captured enclosing-scope variable; indexes the
    /// member's capture descriptor table.
    Uplevel { index: usize, name: String },
    /// A call replaced by a copy of the target's body. `InlineReturn`
    /// statements inside the body deliver the value.
    InlineCall { method: MethodRef, body: Box<Stmt> },
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Expr {
        Expr { kind, span, ty: Type::Error }
    }

    pub fn literal(value: Constant, span: Span) -> Expr {
        Expr::new(ExprKind::Literal(value), span)
    }

    /// A literal with its type already resolved; used by the folder when
    /// replacing a computed subtree, preserving the original span.
    pub fn typed_literal(value: Constant, ty: Type, span: Span) -> Expr {
        Expr { kind: ExprKind::Literal(value), span, ty }
    }

    pub fn ident(name: impl Into<String>, span: Span) -> Expr {
        Expr::new(ExprKind::Ident(name.into()), span)
    }

    pub fn unary(op: UnOp, arg: Expr, span: Span) -> Expr {
        Expr::new(ExprKind::Unary { op, arg: Box::new(arg) }, span)
    }

    pub fn binary(op: BinOp, left: Expr, right: Expr, span: Span) -> Expr {
        Expr::new(ExprKind::Binary { op, left: Box::new(left), right: Box::new(right) }, span)
    }

    pub fn and(left: Expr, right: Expr, span: Span) -> Expr {
        Expr::new(ExprKind::And { left: Box::new(left), right: Box::new(right) }, span)
    }

    pub fn or(left: Expr, right: Expr, span: Span) -> Expr {
        Expr::new(ExprKind::Or { left: Box::new(left), right: Box::new(right) }, span)
    }

    pub fn not(arg: Expr, span: Span) -> Expr {
        Expr::unary(UnOp::Not, arg, span)
    }

    pub fn assign(target: Expr, value: Expr, span: Span) -> Expr {
        Expr::new(ExprKind::Assign { target: Box::new(target), value: Box::new(value) }, span)
    }

    pub fn conditional(cond: Expr, when_true: Expr, when_false: Expr, span: Span) -> Expr {
        Expr::new(
            ExprKind::Conditional {
                cond: Box::new(cond),
                when_true: Box::new(when_true),
                when_false: Box::new(when_false),
            },
            span,
        )
    }

    pub fn comma(effect: Expr, value: Expr, span: Span) -> Expr {
        let ty = value.ty.clone();
        Expr { kind: ExprKind::Comma { effect: Box::new(effect), value: Box::new(value) }, span, ty }
    }

    /// The constant value of this node, if it is a literal.
    pub fn constant(&self) -> Option<&Constant> {
        match &self.kind {
            ExprKind::Literal(c) => Some(c),
            _ => None,
        }
    }

    pub fn is_constant(&self) -> bool {
        self.constant().is_some()
    }

    /// Conservative side-effect test, used when deciding whether a
    /// discarded value may be elided. Anything that can allocate, write,
    /// invoke, trigger class initialization, or raise at runtime (null
    /// dereference, bounds, division, failed cast) counts.
    pub fn has_side_effects(&self) -> bool {
        match &self.kind {
            ExprKind::Literal(_)
            | ExprKind::Local { .. }
            | ExprKind::This
            | ExprKind::Super
            | ExprKind::Ident(_)
            | ExprKind::Uplevel { .. } => false,
            ExprKind::Unary { arg, .. } => arg.has_side_effects(),
            ExprKind::Binary { op, left, right } => {
                let divide_may_trap = matches!(op, BinOp::Div | BinOp::Rem)
                    && self.ty.is_integral()
                    && !matches!(
                        right.constant(),
                        Some(c) if c.as_i64().is_some_and(|v| v != 0)
                    );
                divide_may_trap || left.has_side_effects() || right.has_side_effects()
            }
            ExprKind::And { left, right } | ExprKind::Or { left, right } => {
                left.has_side_effects() || right.has_side_effects()
            }
            ExprKind::Conditional { cond, when_true, when_false } => {
                cond.has_side_effects()
                    || when_true.has_side_effects()
                    || when_false.has_side_effects()
            }
            ExprKind::InstanceOf { value, .. } => value.has_side_effects(),
            ExprKind::Convert { value } => value.has_side_effects(),
            ExprKind::Cast { target, value } => target.is_reference() || value.has_side_effects(),
            ExprKind::Comma { effect, value } => {
                effect.has_side_effects() || value.has_side_effects()
            }
            // Field and array dereferences can fault; invocations, stores,
            // and allocations are side effects outright.
            ExprKind::Field { .. }
            | ExprKind::ArrayLength { .. }
            | ExprKind::Index { .. }
            | ExprKind::Call { .. }
            | ExprKind::New { .. }
            | ExprKind::NewArray { .. }
            | ExprKind::Assign { .. }
            | ExprKind::AssignOp { .. }
            | ExprKind::IncDec { .. }
            | ExprKind::InlineCall { .. } => true,
        }
    }
}

/// A statement node. `labels` holds the statement labels attached in
/// source (`outer: while …`); label uniqueness against enclosing
/// statements is checked before code generation.
#[derive(Debug, Clone)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
    pub labels: Vec<String>,
}

#[derive(Debug, Clone)]
pub enum StmtKind {
    Empty,
    Block(Vec<Stmt>),
    Expr(Expr),
    VarDecl {
        name: String,
        ty: Type,
        flags: Modifiers,
        /// Local slot, assigned by the checking pass.
        slot: u32,
        init: Option<Expr>,
    },
    If { cond: Expr, then_branch: Box<Stmt>, else_branch: Option<Box<Stmt>> },
    While { cond: Expr, body: Box<Stmt> },
    Do { body: Box<Stmt>, cond: Expr },
    For {
        init: Option<Box<Stmt>>,
        /// Absent condition means `true`.
        cond: Option<Expr>,
        update: Option<Expr>,
        body: Box<Stmt>,
    },
    Switch { value: Expr, cases: Vec<Case> },
    Break { label: Option<String> },
    Continue { label: Option<String> },
    Return { value: Option<Expr> },
    /// Return marker inside an inlined method body; delivers the value to
    /// the enclosing `InlineCall` expression instead of the caller frame.
    InlineReturn { value: Option<Expr> },
    Throw { value: Expr },
    /// try with catch clauses only. A source-level try/catch/finally is
    /// represented as `Finally { body: Try { … }, … }`.
    Try { body: Box<Stmt>, catches: Vec<Catch> },
    /// try/finally pair.
    Finally { body: Box<Stmt>, cleanup: Box<Stmt> },
    Synchronized { lock: Expr, body: Box<Stmt> },
}

/// One arm of a switch; `label` is `None` for `default`.
#[derive(Debug, Clone)]
pub struct Case {
    pub label: Option<Expr>,
    pub span: Span,
    pub body: Vec<Stmt>,
}

/// A catch clause: the exception parameter and handler body.
#[derive(Debug, Clone)]
pub struct Catch {
    pub param: String,
    pub ty: Type,
    /// Local slot for the parameter, assigned by the checking pass.
    pub slot: u32,
    pub body: Stmt,
    pub span: Span,
}

impl Stmt {
    pub fn new(kind: StmtKind, span: Span) -> Stmt {
        Stmt { kind, span, labels: Vec::new() }
    }

    pub fn labeled(kind: StmtKind, span: Span, labels: Vec<String>) -> Stmt {
        Stmt { kind, span, labels }
    }

    pub fn block(stmts: Vec<Stmt>, span: Span) -> Stmt {
        Stmt::new(StmtKind::Block(stmts), span)
    }

    pub fn expr(expr: Expr) -> Stmt {
        let span = expr.span;
        Stmt::new(StmtKind::Expr(expr), span)
    }

    pub fn empty(span: Span) -> Stmt {
        Stmt::new(StmtKind::Empty, span)
    }

    pub fn var_decl(name: impl Into<String>, ty: Type, init: Option<Expr>, span: Span) -> Stmt {
        Stmt::new(
            StmtKind::VarDecl { name: name.into(), ty, flags: Modifiers::empty(), slot: 0, init },
            span,
        )
    }

    pub fn final_var_decl(name: impl Into<String>, ty: Type, init: Option<Expr>, span: Span) -> Stmt {
        Stmt::new(
            StmtKind::VarDecl { name: name.into(), ty, flags: Modifiers::FINAL, slot: 0, init },
            span,
        )
    }

    pub fn ret(value: Option<Expr>, span: Span) -> Stmt {
        Stmt::new(StmtKind::Return { value }, span)
    }

    /// Whether this statement carries the given label.
    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }

    /// Whether any break statement occurs anywhere inside.
    fn contains_break(&self) -> bool {
        match &self.kind {
            StmtKind::Break { .. } => true,
            StmtKind::Empty
            | StmtKind::Expr(_)
            | StmtKind::VarDecl { .. }
            | StmtKind::Continue { .. }
            | StmtKind::Return { .. }
            | StmtKind::InlineReturn { .. }
            | StmtKind::Throw { .. } => false,
            StmtKind::Block(stmts) => stmts.iter().any(Stmt::contains_break),
            StmtKind::If { then_branch, else_branch, .. } => {
                then_branch.contains_break()
                    || else_branch.as_ref().is_some_and(|e| e.contains_break())
            }
            StmtKind::While { body, .. } | StmtKind::Do { body, .. } => body.contains_break(),
            StmtKind::For { init, body, .. } => {
                body.contains_break() || init.as_ref().is_some_and(|i| i.contains_break())
            }
            StmtKind::Switch { cases, .. } => {
                cases.iter().any(|c| c.body.iter().any(Stmt::contains_break))
            }
            StmtKind::Try { body, catches } => {
                body.contains_break() || catches.iter().any(|c| c.body.contains_break())
            }
            StmtKind::Finally { body, cleanup } => {
                body.contains_break() || cleanup.contains_break()
            }
            StmtKind::Synchronized { body, .. } => body.contains_break(),
        }
    }

    /// Whether control can flow past this statement. This is the emission
    /// side's approximation of the checker's reachability: when uncertain
    /// it answers `true`, which is always safe for the cleanup-subroutine
    /// choice it feeds (an unused return path is dead code; a missing one
    /// would drop an exception).
    pub fn can_complete_normally(&self) -> bool {
        if !self.labels.is_empty() {
            // A labeled statement completes through any break to it.
            return true;
        }
        match &self.kind {
            StmtKind::Return { .. }
            | StmtKind::InlineReturn { .. }
            | StmtKind::Throw { .. }
            | StmtKind::Break { .. }
            | StmtKind::Continue { .. } => false,
            StmtKind::Block(stmts) => stmts.iter().all(Stmt::can_complete_normally),
            StmtKind::If { then_branch, else_branch, .. } => match else_branch {
                None => true,
                Some(e) => then_branch.can_complete_normally() || e.can_complete_normally(),
            },
            StmtKind::While { cond, body } => {
                if matches!(cond.constant(), Some(Constant::Bool(true))) {
                    body.contains_break()
                } else {
                    true
                }
            }
            StmtKind::For { cond, body, .. } => match cond {
                Some(c) if !matches!(c.constant(), Some(Constant::Bool(true))) => true,
                _ => body.contains_break(),
            },
            StmtKind::Do { body, cond } => {
                if matches!(cond.constant(), Some(Constant::Bool(true))) {
                    body.contains_break()
                } else {
                    true
                }
            }
            StmtKind::Try { body, catches } => {
                body.can_complete_normally()
                    || catches.iter().any(|c| c.body.can_complete_normally())
            }
            StmtKind::Finally { body, cleanup } => {
                body.can_complete_normally() && cleanup.can_complete_normally()
            }
            StmtKind::Synchronized { body, .. } => body.can_complete_normally(),
            StmtKind::Empty
            | StmtKind::Expr(_)
            | StmtKind::VarDecl { .. }
            | StmtKind::Switch { .. } => true,
        }
    }
}
