//! Compile-time constant evaluation kernel.
//!
//! Implements the language's arithmetic exactly: wrapping two's-complement
//! integer operations, masked shift counts, IEEE float/double semantics
//! (division by zero yields an infinity, not an error), and string
//! concatenation. Integer division or remainder by a zero constant returns
//! no fold at all: the expression must stay live so the generated code
//! raises the arithmetic exception at runtime.

use crate::tree::{BinOp, Expr, ExprKind, UnOp};
use crate::types::{Constant, Type};

/// Promote an int-sized constant to `Int` for arithmetic. Byte/short
/// literals already travel as `Int`; chars carry their code point.
fn widen_small(c: &Constant) -> Constant {
    match c {
        Constant::Char(v) => Constant::Int(*v as i32),
        other => other.clone(),
    }
}

/// Binary numeric promotion over constants, mirroring the type ladder.
fn promote_pair(left: &Constant, right: &Constant) -> Option<(Constant, Constant)> {
    use Constant::*;
    let l = widen_small(left);
    let r = widen_small(right);
    Some(match (&l, &r) {
        (Double(_), _) | (_, Double(_)) => (Double(to_f64(&l)?), Double(to_f64(&r)?)),
        (Float(_), _) | (_, Float(_)) => (Float(to_f64(&l)? as f32), Float(to_f64(&r)? as f32)),
        (Long(_), _) | (_, Long(_)) => (Long(to_i64(&l)?), Long(to_i64(&r)?)),
        (Int(_), Int(_)) => (l, r),
        (Bool(_), Bool(_)) => (l, r),
        (Str(_), _) | (_, Str(_)) => (l, r),
        _ => return None,
    })
}

fn to_i64(c: &Constant) -> Option<i64> {
    match c {
        Constant::Int(v) => Some(*v as i64),
        Constant::Long(v) => Some(*v),
        Constant::Char(v) => Some(*v as i64),
        _ => None,
    }
}

fn to_f64(c: &Constant) -> Option<f64> {
    match c {
        Constant::Int(v) => Some(*v as f64),
        Constant::Long(v) => Some(*v as f64),
        Constant::Float(v) => Some(*v as f64),
        Constant::Double(v) => Some(*v),
        Constant::Char(v) => Some(*v as f64),
        _ => None,
    }
}

/// Fold a binary operation over two constants. `None` means the operation
/// does not fold (non-constant semantics, or integer division by zero).
pub fn fold_binary(op: BinOp, left: &Constant, right: &Constant) -> Option<Constant> {
    use Constant::*;

    // String concatenation folds with any operand rendered as text.
    if op == BinOp::Add {
        if let (Str(l), r) = (left, right) {
            return Some(Str(format!("{}{}", l, r.to_concat_string())));
        }
        if let (l, Str(r)) = (left, right) {
            return Some(Str(format!("{}{}", l.to_concat_string(), r)));
        }
    }

    // Shifts promote their operands independently: the count is an int
    // regardless of the value's width.
    if op.is_shift() {
        let count = to_i64(&widen_small(right))? as u32;
        return Some(match widen_small(left) {
            Int(v) => Int(match op {
                BinOp::Shl => v.wrapping_shl(count),
                BinOp::Shr => v.wrapping_shr(count),
                BinOp::Ushr => ((v as u32).wrapping_shr(count & 31)) as i32,
                _ => unreachable!(),
            }),
            Long(v) => Long(match op {
                BinOp::Shl => v.wrapping_shl(count),
                BinOp::Shr => v.wrapping_shr(count),
                BinOp::Ushr => ((v as u64).wrapping_shr(count & 63)) as i64,
                _ => unreachable!(),
            }),
            _ => return None,
        });
    }

    let (l, r) = promote_pair(left, right)?;
    match (&l, &r) {
        (Int(a), Int(b)) => {
            let (a, b) = (*a, *b);
            Some(match op {
                BinOp::Add => Int(a.wrapping_add(b)),
                BinOp::Sub => Int(a.wrapping_sub(b)),
                BinOp::Mul => Int(a.wrapping_mul(b)),
                // Left live for the runtime ArithmeticException.
                BinOp::Div if b == 0 => return None,
                BinOp::Rem if b == 0 => return None,
                BinOp::Div => Int(a.wrapping_div(b)),
                BinOp::Rem => Int(a.wrapping_rem(b)),
                BinOp::BitAnd => Int(a & b),
                BinOp::BitOr => Int(a | b),
                BinOp::BitXor => Int(a ^ b),
                BinOp::Lt => Bool(a < b),
                BinOp::Le => Bool(a <= b),
                BinOp::Gt => Bool(a > b),
                BinOp::Ge => Bool(a >= b),
                BinOp::Eq => Bool(a == b),
                BinOp::Ne => Bool(a != b),
                BinOp::Shl | BinOp::Shr | BinOp::Ushr => unreachable!(),
            })
        }
        (Long(a), Long(b)) => {
            let (a, b) = (*a, *b);
            Some(match op {
                BinOp::Add => Long(a.wrapping_add(b)),
                BinOp::Sub => Long(a.wrapping_sub(b)),
                BinOp::Mul => Long(a.wrapping_mul(b)),
                BinOp::Div if b == 0 => return None,
                BinOp::Rem if b == 0 => return None,
                BinOp::Div => Long(a.wrapping_div(b)),
                BinOp::Rem => Long(a.wrapping_rem(b)),
                BinOp::BitAnd => Long(a & b),
                BinOp::BitOr => Long(a | b),
                BinOp::BitXor => Long(a ^ b),
                BinOp::Lt => Bool(a < b),
                BinOp::Le => Bool(a <= b),
                BinOp::Gt => Bool(a > b),
                BinOp::Ge => Bool(a >= b),
                BinOp::Eq => Bool(a == b),
                BinOp::Ne => Bool(a != b),
                BinOp::Shl | BinOp::Shr | BinOp::Ushr => unreachable!(),
            })
        }
        (Float(a), Float(b)) => {
            let (a, b) = (*a, *b);
            Some(match op {
                BinOp::Add => Float(a + b),
                BinOp::Sub => Float(a - b),
                BinOp::Mul => Float(a * b),
                BinOp::Div => Float(a / b),
                BinOp::Rem => Float(a % b),
                BinOp::Lt => Bool(a < b),
                BinOp::Le => Bool(a <= b),
                BinOp::Gt => Bool(a > b),
                BinOp::Ge => Bool(a >= b),
                BinOp::Eq => Bool(a == b),
                BinOp::Ne => Bool(a != b),
                _ => return None,
            })
        }
        (Double(a), Double(b)) => {
            let (a, b) = (*a, *b);
            Some(match op {
                BinOp::Add => Double(a + b),
                BinOp::Sub => Double(a - b),
                BinOp::Mul => Double(a * b),
                // IEEE semantics: folds to an infinity or NaN.
                BinOp::Div => Double(a / b),
                BinOp::Rem => Double(a % b),
                BinOp::Lt => Bool(a < b),
                BinOp::Le => Bool(a <= b),
                BinOp::Gt => Bool(a > b),
                BinOp::Ge => Bool(a >= b),
                BinOp::Eq => Bool(a == b),
                BinOp::Ne => Bool(a != b),
                _ => return None,
            })
        }
        (Bool(a), Bool(b)) => {
            let (a, b) = (*a, *b);
            Some(match op {
                BinOp::BitAnd => Bool(a & b),
                BinOp::BitOr => Bool(a | b),
                BinOp::BitXor => Bool(a ^ b),
                BinOp::Eq => Bool(a == b),
                BinOp::Ne => Bool(a != b),
                _ => return None,
            })
        }
        _ => None,
    }
}

/// Fold a unary operation over a constant.
pub fn fold_unary(op: UnOp, arg: &Constant) -> Option<Constant> {
    use Constant::*;
    match (op, widen_small(arg)) {
        (UnOp::Pos, c) if !matches!(c, Bool(_) | Str(_) | Null) => Some(c),
        (UnOp::Neg, Int(v)) => Some(Int(v.wrapping_neg())),
        (UnOp::Neg, Long(v)) => Some(Long(v.wrapping_neg())),
        (UnOp::Neg, Float(v)) => Some(Float(-v)),
        (UnOp::Neg, Double(v)) => Some(Double(-v)),
        (UnOp::Not, Bool(v)) => Some(Bool(!v)),
        (UnOp::BitNot, Int(v)) => Some(Int(!v)),
        (UnOp::BitNot, Long(v)) => Some(Long(!v)),
        _ => None,
    }
}

/// Convert a constant to a target numeric (or identical) type, following
/// the language's conversion semantics: float-to-int saturates and maps
/// NaN to zero, narrowing integer conversions truncate.
pub fn coerce(value: &Constant, target: &Type) -> Option<Constant> {
    use Constant::*;
    let c = value.clone();
    Some(match (c, target) {
        (Int(v), Type::Int) => Int(v),
        (Int(v), Type::Byte) => Int(v as i8 as i32),
        (Int(v), Type::Short) => Int(v as i16 as i32),
        (Int(v), Type::Char) => Char(v as u16),
        (Int(v), Type::Long) => Long(v as i64),
        (Int(v), Type::Float) => Float(v as f32),
        (Int(v), Type::Double) => Double(v as f64),
        (Char(v), Type::Char) => Char(v),
        (Char(v), Type::Int) => Int(v as i32),
        (Char(v), Type::Byte) => Int(v as i32 as i8 as i32),
        (Char(v), Type::Short) => Int(v as i32 as i16 as i32),
        (Char(v), Type::Long) => Long(v as i64),
        (Char(v), Type::Float) => Float(v as f32),
        (Char(v), Type::Double) => Double(v as f64),
        (Long(v), Type::Long) => Long(v),
        (Long(v), Type::Int) => Int(v as i32),
        (Long(v), Type::Byte) => Int(v as i8 as i32),
        (Long(v), Type::Short) => Int(v as i16 as i32),
        (Long(v), Type::Char) => Char(v as u16),
        (Long(v), Type::Float) => Float(v as f32),
        (Long(v), Type::Double) => Double(v as f64),
        (Float(v), Type::Float) => Float(v),
        (Float(v), Type::Int) => Int(v as i32),
        (Float(v), Type::Long) => Long(v as i64),
        (Float(v), Type::Byte) => Int(v as i32 as i8 as i32),
        (Float(v), Type::Short) => Int(v as i32 as i16 as i32),
        (Float(v), Type::Char) => Char(v as i32 as u16),
        (Float(v), Type::Double) => Double(v as f64),
        (Double(v), Type::Double) => Double(v),
        (Double(v), Type::Int) => Int(v as i32),
        (Double(v), Type::Long) => Long(v as i64),
        (Double(v), Type::Byte) => Int(v as i32 as i8 as i32),
        (Double(v), Type::Short) => Int(v as i32 as i16 as i32),
        (Double(v), Type::Char) => Char(v as i32 as u16),
        (Double(v), Type::Float) => Float(v as f32),
        (Bool(v), Type::Boolean) => Bool(v),
        (Str(s), Type::Class(_)) => Str(s),
        (Null, t) if t.is_reference() => Null,
        _ => return None,
    })
}

/// Evaluate an expression to a constant without rewriting it. Used where a
/// constant is required before the folding pass runs, e.g. switch case
/// labels.
pub fn const_value(e: &Expr) -> Option<Constant> {
    match &e.kind {
        ExprKind::Literal(c) => Some(c.clone()),
        ExprKind::Unary { op, arg } => fold_unary(*op, &const_value(arg)?),
        ExprKind::Binary { op, left, right } => {
            fold_binary(*op, &const_value(left)?, &const_value(right)?)
        }
        ExprKind::Convert { value } => coerce(&const_value(value)?, &e.ty),
        ExprKind::Cast { target, value } => coerce(&const_value(value)?, target),
        _ => None,
    }
}
