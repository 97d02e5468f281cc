//! Value-expression and reference sub-ASTs handed over by the parser.

pub mod expr;
pub mod reference;

pub use expr::{Expr, ExprKind};
pub use reference::{Reference, SubRef};
