//! Diagnostic sink for user-facing errors and warnings.
//!
//! The checking pass reports source errors here by location and message key
//! and keeps going, so one compilation surfaces as many independent errors
//! as possible. Rendering/localization of the keys is the caller's concern;
//! this sink only records them.

use std::fmt;

use crate::span::Span;

/// Message keys reported by the checking pass.
///
/// Dotted-key style; substitution arguments are carried separately.
pub mod keys {
    pub const VAR_UNASSIGNED: &str = "var.might.not.have.been.initialized";
    pub const FINAL_REASSIGNED: &str = "var.might.already.be.assigned";
    pub const FINAL_ASSIGNED_IN_LOOP: &str = "final.var.assigned.in.loop";
    pub const UNREACHABLE_STMT: &str = "statement.not.reached";
    pub const INVALID_LVALUE: &str = "invalid.assignment.target";
    pub const INCOMPARABLE_TYPES: &str = "incomparable.types";
    pub const TYPE_MISMATCH: &str = "incompatible.types";
    pub const INVALID_OPERAND: &str = "operator.cant.be.applied";
    pub const INVALID_CAST: &str = "inconvertible.types";
    pub const UNDEFINED_VAR: &str = "cant.resolve.variable";
    pub const UNDEFINED_FIELD: &str = "cant.resolve.field";
    pub const UNDEFINED_METHOD: &str = "cant.resolve.method";
    pub const MEMBER_NOT_ACCESSIBLE: &str = "not.accessible";
    pub const DUPLICATE_LABEL: &str = "label.already.in.use";
    pub const UNDEFINED_LABEL: &str = "undefined.label";
    pub const BREAK_OUTSIDE: &str = "break.outside.switch.or.loop";
    pub const CONTINUE_OUTSIDE: &str = "continue.outside.loop";
    pub const DUPLICATE_CASE: &str = "duplicate.case.label";
    pub const DUPLICATE_DEFAULT: &str = "duplicate.default.label";
    pub const CASE_OUT_OF_RANGE: &str = "case.label.out.of.range";
    pub const CONSTANT_REQUIRED: &str = "constant.expression.required";
    pub const SWITCH_TYPE: &str = "switch.value.not.integral";
    pub const UNCAUGHT_EXCEPTION: &str = "unreported.exception";
    pub const THROW_NOT_THROWABLE: &str = "throw.not.throwable";
    pub const RETURN_VALUE_MISSING: &str = "missing.return.value";
    pub const MISSING_RETURN: &str = "missing.return.statement";
    pub const RETURN_VALUE_UNEXPECTED: &str = "cant.return.value.from.void";
    pub const MONITOR_NOT_REFERENCE: &str = "synchronized.value.not.reference";
    pub const DUPLICATE_VARIABLE: &str = "variable.already.defined";
    pub const VOID_VALUE: &str = "void.value.not.allowed";
}

/// Diagnostic severity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

/// A single reported diagnostic: where, which message key, and the
/// substitution arguments for that key.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub span: Span,
    pub key: &'static str,
    pub args: Vec<String>,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sev = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(f, "{}: {}: {}", self.span, sev, self.key)?;
        if !self.args.is_empty() {
            write!(f, ": {}", self.args.join(", "))?;
        }
        Ok(())
    }
}

/// Collects diagnostics for one compilation.
#[derive(Debug, Default)]
pub struct Diagnostics {
    diags: Vec<Diagnostic>,
    errors: usize,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report a user-facing error and keep going.
    pub fn error(&mut self, span: Span, key: &'static str, args: Vec<String>) {
        log::debug!("diagnostic at {span}: {key} {args:?}");
        self.errors += 1;
        self.diags.push(Diagnostic { severity: Severity::Error, span, key, args });
    }

    /// Report a warning.
    pub fn warn(&mut self, span: Span, key: &'static str, args: Vec<String>) {
        self.diags.push(Diagnostic { severity: Severity::Warning, span, key, args });
    }

    pub fn error_count(&self) -> usize {
        self.errors
    }

    pub fn has_errors(&self) -> bool {
        self.errors > 0
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diags.iter()
    }

    /// Drain the collected diagnostics.
    pub fn take(&mut self) -> Vec<Diagnostic> {
        self.errors = 0;
        std::mem::take(&mut self.diags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_counting() {
        let mut diags = Diagnostics::new();
        assert!(!diags.has_errors());
        diags.warn(Span::default(), keys::UNREACHABLE_STMT, vec![]);
        assert!(!diags.has_errors());
        diags.error(Span::default(), keys::VAR_UNASSIGNED, vec!["v".into()]);
        assert_eq!(diags.error_count(), 1);
        assert!(diags.has_errors());
    }

    #[test]
    fn test_display_includes_key_and_args() {
        let d = Diagnostic {
            severity: Severity::Error,
            span: Span::from_to(3, 5, 3, 6),
            key: keys::VAR_UNASSIGNED,
            args: vec!["count".into()],
        };
        let text = d.to_string();
        assert!(text.contains("var.might.not.have.been.initialized"));
        assert!(text.contains("count"));
        assert!(text.contains("3:5"));
    }
}
