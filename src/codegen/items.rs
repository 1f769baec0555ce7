//! Lvalue protocol: addressable places.
//!
//! Every assignable expression lowers to a `Place` describing what sits on
//! the stack to address it (nothing for locals and statics, the object
//! reference for fields, reference plus index for array elements). The
//! three-step contract (address, load, store) lets plain assignment,
//! compound assignment, and increment/decrement share one emission path,
//! with the dup-family shuffles chosen by operand width and insertion
//! depth.

use crate::codegen::code::{Code, Instr, InvokeKind, OpType};
use crate::syms::{FieldRef, MethodRef};

#[derive(Debug, Clone, Copy)]
pub enum Place {
    Local { slot: u32, ty: OpType },
    Static { field: FieldRef, ty: OpType },
    /// Instance field; the object reference is on the stack.
    Field { field: FieldRef, ty: OpType },
    /// Array element; reference and index are on the stack.
    Element { ty: OpType },
    /// Field reachable only through synthesized accessor methods; the
    /// receiver (if any) is on the stack.
    Accessor { getter: MethodRef, setter: MethodRef, ty: OpType, receiver: bool },
}

impl Place {
    /// Stack words occupied by the addressing operands.
    pub fn base_words(&self) -> u16 {
        match self {
            Place::Local { .. } | Place::Static { .. } => 0,
            Place::Field { .. } => 1,
            Place::Element { .. } => 2,
            Place::Accessor { receiver, .. } => u16::from(*receiver),
        }
    }

    pub fn value_ty(&self) -> OpType {
        match self {
            Place::Local { ty, .. }
            | Place::Static { ty, .. }
            | Place::Field { ty, .. }
            | Place::Element { ty }
            | Place::Accessor { ty, .. } => *ty,
        }
    }

    /// Duplicate the addressing operands, for read-modify-write: the
    /// copy feeds the load, the original the store.
    pub fn dup_base(&self, code: &mut Code) {
        let words = self.base_words();
        if words > 0 {
            code.emit(Instr::Dup { words, depth: 0 });
        }
    }

    /// Duplicate the value on top of the stack, inserting the copy below
    /// the addressing operands. This is what leaves the assigned value as
    /// the expression result after the store consumes the original.
    pub fn dup_value_below_base(&self, code: &mut Code) {
        code.emit(Instr::Dup { words: self.value_ty().words(), depth: self.base_words() });
    }

    /// Push the current value, consuming the addressing operands.
    pub fn load(&self, code: &mut Code) {
        match *self {
            Place::Local { slot, ty } => code.emit(Instr::Load { ty, slot }),
            Place::Static { field, ty } => code.emit_get_static(field, ty),
            Place::Field { field, ty } => code.emit_get_field(field, ty),
            Place::Element { ty } => code.emit(Instr::ArrayLoad { ty }),
            Place::Accessor { getter, ty, receiver, .. } => {
                code.emit_invoke(getter, InvokeKind::Static, u16::from(receiver), ty.words());
            }
        }
    }

    /// Pop the value and the addressing operands, writing the location.
    pub fn store(&self, code: &mut Code) {
        match *self {
            Place::Local { slot, ty } => code.emit(Instr::Store { ty, slot }),
            Place::Static { field, ty } => code.emit_put_static(field, ty),
            Place::Field { field, ty } => code.emit_put_field(field, ty),
            Place::Element { ty } => code.emit(Instr::ArrayStore { ty }),
            Place::Accessor { setter, ty, receiver, .. } => {
                code.emit_invoke(setter, InvokeKind::Static, u16::from(receiver) + ty.words(), 0);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ClassId;

    fn field() -> FieldRef {
        FieldRef { class: ClassId(0), index: 0 }
    }

    #[test]
    fn test_base_words_per_shape() {
        assert_eq!(Place::Local { slot: 0, ty: OpType::Int }.base_words(), 0);
        assert_eq!(Place::Static { field: field(), ty: OpType::Int }.base_words(), 0);
        assert_eq!(Place::Field { field: field(), ty: OpType::Long }.base_words(), 1);
        assert_eq!(Place::Element { ty: OpType::Int }.base_words(), 2);
    }

    #[test]
    fn test_element_store_sequence() {
        let mut code = Code::new(0);
        // arrayref, index, value already pushed by the generator.
        code.emit(Instr::Const(crate::types::Constant::Null));
        code.emit(Instr::Const(crate::types::Constant::Int(0)));
        code.emit(Instr::Const(crate::types::Constant::Int(7)));
        let place = Place::Element { ty: OpType::Int };
        place.store(&mut code);
        assert_eq!(code.stack(), 0);
        assert!(matches!(code.instrs().last(), Some(Instr::ArrayStore { ty: OpType::Int })));
    }

    #[test]
    fn test_dup_value_below_base_depth() {
        let mut code = Code::new(0);
        code.emit(Instr::Const(crate::types::Constant::Null)); // array
        code.emit(Instr::Const(crate::types::Constant::Int(0))); // index
        code.emit(Instr::Const(crate::types::Constant::Long(1))); // value
        let place = Place::Element { ty: OpType::Long };
        place.dup_value_below_base(&mut code);
        assert!(matches!(code.instrs().last(), Some(Instr::Dup { words: 2, depth: 2 })));
    }
}
