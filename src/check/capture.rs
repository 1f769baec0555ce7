//! Captured-variable descriptors for uplevel references.
//!
//! When code in a nested invocation frame reads a variable of an enclosing
//! frame, the value is captured by copy at closure-creation time: it
//! travels as a synthetic constructor argument and, when some reference
//! occurs outside a constructor/initializer context (where the argument is
//! no longer in scope), additionally as a synthetic field initialized from
//! that argument.
//!
//! Descriptors are collected up front during checking. Their canonical
//! order (the implicit outer-instance reference first, then variable
//! name, then declaring-class name) fixes the synthesized constructor
//! signature, so recompilation is deterministic.

use crate::check::context::VarDef;
use crate::types::Type;

#[derive(Debug, Clone)]
pub struct Capture {
    pub name: String,
    pub ty: Type,
    /// Slot of the captured variable in its declaring frame.
    pub source_slot: u32,
    /// Name of the class declaring the variable, for canonical ordering.
    pub declaring_class: String,
    /// The implicit enclosing-instance reference sorts before all others.
    pub outer_this: bool,
    /// Slot of the synthetic constructor argument carrying the copy;
    /// assigned by `finalize` in canonical order.
    pub arg_slot: u32,
    /// Synthetic field name, materialized only if some reference occurs
    /// where the constructor argument is out of scope.
    pub field: Option<String>,
}

impl Capture {
    fn canonical_key(&self) -> (bool, &str, &str) {
        // outer-this first: false sorts before true, so invert.
        (!self.outer_this, self.name.as_str(), self.declaring_class.as_str())
    }
}

#[derive(Debug, Default)]
pub struct CaptureSet {
    caps: Vec<Capture>,
}

impl CaptureSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.caps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.caps.is_empty()
    }

    pub fn get(&self, index: usize) -> &Capture {
        &self.caps[index]
    }

    /// Record a reference to `var` from a nested frame, reusing the
    /// existing descriptor for repeated references to the same variable.
    /// `needs_field` is true when the reference occurs outside a
    /// constructor/initializer context.
    pub fn intern(&mut self, var: &VarDef, needs_field: bool) -> usize {
        let index = match self
            .caps
            .iter()
            .position(|c| c.source_slot == var.slot && c.name == var.name)
        {
            Some(i) => i,
            None => {
                self.caps.push(Capture {
                    name: var.name.clone(),
                    ty: var.ty.clone(),
                    source_slot: var.slot,
                    declaring_class: String::new(),
                    outer_this: false,
                    arg_slot: 0,
                    field: None,
                });
                self.caps.len() - 1
            }
        };
        if needs_field && self.caps[index].field.is_none() {
            self.caps[index].field = Some(format!("val${}", self.caps[index].name));
        }
        index
    }

    /// Record the implicit enclosing-instance capture.
    pub fn intern_outer_this(&mut self, ty: Type) -> usize {
        if let Some(i) = self.caps.iter().position(|c| c.outer_this) {
            return i;
        }
        self.caps.push(Capture {
            name: "this$0".to_string(),
            ty,
            source_slot: 0,
            declaring_class: String::new(),
            outer_this: true,
            arg_slot: 0,
            field: None,
        });
        self.caps.len() - 1
    }

    /// Assign synthetic constructor-argument slots in canonical order,
    /// starting at `first_slot`. Call once, after checking completes.
    pub fn finalize(&mut self, first_slot: u32) {
        let mut order: Vec<usize> = (0..self.caps.len()).collect();
        order.sort_by(|&a, &b| self.caps[a].canonical_key().cmp(&self.caps[b].canonical_key()));
        let mut slot = first_slot;
        for i in order {
            self.caps[i].arg_slot = slot;
            slot += self.caps[i].ty.words().max(1) as u32;
        }
    }

    /// Descriptors in canonical (constructor signature) order.
    pub fn ordered(&self) -> Vec<&Capture> {
        let mut refs: Vec<&Capture> = self.caps.iter().collect();
        refs.sort_by(|a, b| a.canonical_key().cmp(&b.canonical_key()));
        refs
    }
}
