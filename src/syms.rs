//! Symbol-table facade.
//!
//! Class hierarchy resolution proper is an external collaborator; the
//! checking pass only consumes a pre-resolved table of classes, fields and
//! methods. What does live here is the accessibility logic that the
//! assignment paths depend on: deciding whether a field reference can be
//! emitted directly or must go through synthesized accessor methods.

use bitflags::bitflags;
use once_cell::sync::OnceCell;

use crate::tree::Stmt;
use crate::types::{ClassId, Constant, Type};

bitflags! {
    /// Declaration modifiers, stored as a mask the way class files do.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Modifiers: u16 {
        const PUBLIC       = 0x0001;
        const PRIVATE      = 0x0002;
        const PROTECTED    = 0x0004;
        const STATIC       = 0x0008;
        const FINAL        = 0x0010;
        const SYNCHRONIZED = 0x0020;
        const NATIVE       = 0x0100;
        const ABSTRACT     = 0x0400;
    }
}

/// Reference to a field: owning class + index into its field list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldRef {
    pub class: ClassId,
    pub index: u32,
}

/// Reference to a method: owning class + index into its method list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MethodRef {
    pub class: ClassId,
    pub index: u32,
}

/// How an assignment or read reaches a field.
///
/// `Accessor` is produced when source-level visibility allows the access
/// but the emitted code cannot touch the field directly (a private field
/// referenced from a sibling nested class); the getter/setter pair is
/// synthesized on the owning class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldAccess {
    Direct,
    Accessor { getter: MethodRef, setter: MethodRef },
}

#[derive(Debug, Clone)]
pub struct FieldInfo {
    pub name: String,
    pub ty: Type,
    pub flags: Modifiers,
    /// Compile-time constant value, for static finals initialized with one.
    pub value: Option<Constant>,
}

#[derive(Debug)]
pub struct MethodInfo {
    pub name: String,
    pub flags: Modifiers,
    pub params: Vec<Type>,
    pub ret: Type,
    /// Checked exception classes this method declares.
    pub throws: Vec<ClassId>,
    /// Checked body, when the inliner is allowed to look at it.
    pub body: Option<Box<Stmt>>,
}

#[derive(Debug)]
pub struct ClassInfo {
    pub name: String,
    pub superclass: Option<ClassId>,
    /// Lexically enclosing class for nested classes.
    pub enclosing: Option<ClassId>,
    pub flags: Modifiers,
    pub fields: Vec<FieldInfo>,
    pub methods: Vec<MethodInfo>,
    ancestors: OnceCell<Vec<ClassId>>,
}

/// Well-known classes every compilation needs.
#[derive(Debug, Clone, Copy)]
pub struct Predefined {
    pub object: ClassId,
    pub string: ClassId,
    pub throwable: ClassId,
    pub exception: ClassId,
    pub runtime_exception: ClassId,
    pub error: ClassId,
    /// `String.concat(String) -> String`, used for string `+` lowering.
    pub string_concat: MethodRef,
}

#[derive(Debug)]
pub struct Symtab {
    classes: Vec<ClassInfo>,
    pub predefined: Predefined,
}

impl Symtab {
    pub fn new() -> Self {
        let mut table = Symtab {
            classes: Vec::new(),
            // Placeholder, replaced once the predefined classes exist.
            predefined: Predefined {
                object: ClassId(0),
                string: ClassId(0),
                throwable: ClassId(0),
                exception: ClassId(0),
                runtime_exception: ClassId(0),
                error: ClassId(0),
                string_concat: MethodRef { class: ClassId(0), index: 0 },
            },
        };
        let object = table.define_class("java.lang.Object", None, Modifiers::PUBLIC);
        let string = table.define_class("java.lang.String", Some(object), Modifiers::PUBLIC | Modifiers::FINAL);
        let throwable = table.define_class("java.lang.Throwable", Some(object), Modifiers::PUBLIC);
        let exception = table.define_class("java.lang.Exception", Some(throwable), Modifiers::PUBLIC);
        let runtime_exception =
            table.define_class("java.lang.RuntimeException", Some(exception), Modifiers::PUBLIC);
        let error = table.define_class("java.lang.Error", Some(throwable), Modifiers::PUBLIC);
        let string_concat = table.add_method(
            string,
            MethodInfo {
                name: "concat".into(),
                flags: Modifiers::PUBLIC,
                params: vec![Type::Class(string)],
                ret: Type::Class(string),
                throws: vec![],
                body: None,
            },
        );
        table.predefined = Predefined {
            object,
            string,
            throwable,
            exception,
            runtime_exception,
            error,
            string_concat,
        };
        table
    }

    pub fn define_class(&mut self, name: &str, superclass: Option<ClassId>, flags: Modifiers) -> ClassId {
        self.classes.push(ClassInfo {
            name: name.to_string(),
            superclass,
            enclosing: None,
            flags,
            fields: Vec::new(),
            methods: Vec::new(),
            ancestors: OnceCell::new(),
        });
        ClassId(self.classes.len() as u32 - 1)
    }

    /// Define a class nested inside `enclosing`.
    pub fn define_nested_class(
        &mut self,
        name: &str,
        superclass: Option<ClassId>,
        enclosing: ClassId,
        flags: Modifiers,
    ) -> ClassId {
        let id = self.define_class(name, superclass, flags);
        self.classes[id.0 as usize].enclosing = Some(enclosing);
        id
    }

    pub fn add_field(&mut self, class: ClassId, field: FieldInfo) -> FieldRef {
        let info = &mut self.classes[class.0 as usize];
        info.fields.push(field);
        FieldRef { class, index: info.fields.len() as u32 - 1 }
    }

    pub fn add_method(&mut self, class: ClassId, method: MethodInfo) -> MethodRef {
        let info = &mut self.classes[class.0 as usize];
        info.methods.push(method);
        MethodRef { class, index: info.methods.len() as u32 - 1 }
    }

    pub fn class(&self, id: ClassId) -> &ClassInfo {
        &self.classes[id.0 as usize]
    }

    pub fn field(&self, fref: FieldRef) -> &FieldInfo {
        &self.classes[fref.class.0 as usize].fields[fref.index as usize]
    }

    pub fn method(&self, mref: MethodRef) -> &MethodInfo {
        &self.classes[mref.class.0 as usize].methods[mref.index as usize]
    }

    pub fn method_mut(&mut self, mref: MethodRef) -> &mut MethodInfo {
        &mut self.classes[mref.class.0 as usize].methods[mref.index as usize]
    }

    /// Superclass chain of `id`, nearest first, cached per class.
    pub fn ancestors(&self, id: ClassId) -> &[ClassId] {
        self.classes[id.0 as usize].ancestors.get_or_init(|| {
            let mut chain = Vec::new();
            let mut cur = self.classes[id.0 as usize].superclass;
            while let Some(sup) = cur {
                chain.push(sup);
                cur = self.classes[sup.0 as usize].superclass;
            }
            chain
        })
    }

    /// `a` is `b` or a subclass of `b`.
    pub fn is_subclass(&self, a: ClassId, b: ClassId) -> bool {
        a == b || self.ancestors(a).contains(&b)
    }

    /// Assignment conversion: identity, numeric widening, null-to-reference,
    /// or reference widening along the superclass chain.
    pub fn is_assignable(&self, from: &Type, to: &Type) -> bool {
        if from == to || from.is_error() || to.is_error() {
            return true;
        }
        match (from, to) {
            _ if from.is_numeric() && to.is_numeric() => from.widens_to(to),
            (Type::Null, t) => t.is_reference(),
            (Type::Class(a), Type::Class(b)) => self.is_subclass(*a, *b),
            (Type::Array(_), Type::Class(b)) => *b == self.predefined.object,
            (Type::Array(a), Type::Array(b)) => {
                a == b || (a.is_reference() && b.is_reference() && self.is_assignable(a, b))
            }
            _ => false,
        }
    }

    /// Two types are comparable when either is assignable to the other.
    pub fn is_comparable(&self, a: &Type, b: &Type) -> bool {
        self.is_assignable(a, b) || self.is_assignable(b, a)
    }

    /// Casting conversion: any numeric-to-numeric, plus reference casts
    /// along the hierarchy in either direction.
    pub fn is_castable(&self, from: &Type, to: &Type) -> bool {
        if from.is_error() || to.is_error() {
            return true;
        }
        if from.is_numeric() && to.is_numeric() {
            return true;
        }
        if from.is_reference() && to.is_reference() {
            return self.is_comparable(from, to);
        }
        from == to
    }

    /// An exception class whose throw sites must be declared or caught.
    pub fn is_checked_exception(&self, class: ClassId) -> bool {
        let pre = self.predefined;
        self.is_subclass(class, pre.throwable)
            && !self.is_subclass(class, pre.runtime_exception)
            && !self.is_subclass(class, pre.error)
    }

    /// Find a field by name on `class` or its superclasses.
    pub fn lookup_field(&self, class: ClassId, name: &str) -> Option<FieldRef> {
        let mut cur = Some(class);
        while let Some(id) = cur {
            let info = self.class(id);
            if let Some(i) = info.fields.iter().position(|f| f.name == name) {
                return Some(FieldRef { class: id, index: i as u32 });
            }
            cur = info.superclass;
        }
        None
    }

    /// Find a method by name and arity on `class` or its superclasses.
    /// Overload resolution proper is the resolver collaborator's job; this
    /// facade only disambiguates by parameter count.
    pub fn lookup_method(&self, class: ClassId, name: &str, argc: usize) -> Option<MethodRef> {
        let mut cur = Some(class);
        while let Some(id) = cur {
            let info = self.class(id);
            if let Some(i) = info
                .methods
                .iter()
                .position(|m| m.name == name && m.params.len() == argc)
            {
                return Some(MethodRef { class: id, index: i as u32 });
            }
            cur = info.superclass;
        }
        None
    }

    /// Outermost lexically enclosing class.
    fn top_level(&self, mut id: ClassId) -> ClassId {
        while let Some(outer) = self.class(id).enclosing {
            id = outer;
        }
        id
    }

    /// Source-level visibility of a member of `owner` from code in `from`.
    pub fn can_access(&self, from: ClassId, owner: ClassId, flags: Modifiers) -> bool {
        if flags.contains(Modifiers::PRIVATE) {
            return self.top_level(from) == self.top_level(owner);
        }
        if flags.contains(Modifiers::PROTECTED) {
            return self.is_subclass(from, owner) || self.top_level(from) == self.top_level(owner);
        }
        true
    }

    /// Pick the access strategy for a field reference from `from`.
    ///
    /// Returns `None` when the access is not visible at all. A private
    /// field reached from a different class of the same top-level unit is
    /// visible in source but not to the emitted code, so accessor methods
    /// are synthesized on the owning class (once per field).
    pub fn field_access(&mut self, from: ClassId, fref: FieldRef) -> Option<FieldAccess> {
        let flags = self.field(fref).flags;
        if !self.can_access(from, fref.class, flags) {
            return None;
        }
        if !flags.contains(Modifiers::PRIVATE) || from == fref.class {
            return Some(FieldAccess::Direct);
        }
        Some(self.accessor_pair(fref))
    }

    fn accessor_pair(&mut self, fref: FieldRef) -> FieldAccess {
        let field = self.field(fref).clone();
        let getter_name = format!("access$get${}", field.name);
        let setter_name = format!("access$set${}", field.name);
        // Accessors are static synthetics; an instance field's receiver
        // travels as their first parameter.
        let mut getter_params = Vec::new();
        let mut setter_params = Vec::new();
        if !field.flags.contains(Modifiers::STATIC) {
            getter_params.push(Type::Class(fref.class));
            setter_params.push(Type::Class(fref.class));
        }
        setter_params.push(field.ty.clone());
        let getter = self
            .lookup_method(fref.class, &getter_name, getter_params.len())
            .unwrap_or_else(|| {
                self.add_method(
                    fref.class,
                    MethodInfo {
                        name: getter_name,
                        flags: Modifiers::STATIC,
                        params: getter_params,
                        ret: field.ty.clone(),
                        throws: vec![],
                        body: None,
                    },
                )
            });
        let setter = self
            .lookup_method(fref.class, &setter_name, setter_params.len())
            .unwrap_or_else(|| {
                self.add_method(
                    fref.class,
                    MethodInfo {
                        name: setter_name,
                        flags: Modifiers::STATIC,
                        params: setter_params,
                        ret: Type::Void,
                        throws: vec![],
                        body: None,
                    },
                )
            });
        FieldAccess::Accessor { getter, setter }
    }
}

impl Default for Symtab {
    fn default() -> Self {
        Self::new()
    }
}
