//! Tree intermediate representation.
//!
//! The parser (an external collaborator) produces this tree; the checking
//! pass annotates and rewrites it in place, the folding pass rewrites it by
//! ownership transfer, and code generation consumes it read-only.

mod nodes;

pub use nodes::*;
