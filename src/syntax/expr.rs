//! Value expressions embedded in templates.
//!
//! The template language doubles as an expression sub-language: specific
//! values, range bounds, length-restriction bounds, and decode-match
//! encoding selectors are all value expressions. The parser hands these
//! over fully formed; the core never re-parses text.

use crate::diagnostics::Span;
use crate::syntax::reference::Reference;

/// Value expression with span metadata.
#[derive(Debug, Clone)]
pub struct Expr {
    pub span: Option<Span>,
    pub kind: ExprKind,
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    Int(i64),
    Real(f64),
    /// Signed infinite floating literal, permitted only as a range bound.
    Infinity {
        negative: bool,
    },
    Bool(bool),
    Charstring(String),
    Bitstring(String),
    Hexstring(String),
    Octetstring(String),
    /// Unresolved lower-case identifier; later checking may reinterpret
    /// it as a reference to a definition.
    Name(String),
    Ref(Reference),
    Apply {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
}

impl Expr {
    #[must_use]
    pub fn new(kind: ExprKind) -> Self {
        Self { span: None, kind }
    }

    #[must_use]
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    #[must_use]
    pub fn int(value: i64) -> Self {
        Self::new(ExprKind::Int(value))
    }

    #[must_use]
    pub fn real(value: f64) -> Self {
        Self::new(ExprKind::Real(value))
    }

    #[must_use]
    pub fn infinity(negative: bool) -> Self {
        Self::new(ExprKind::Infinity { negative })
    }

    #[must_use]
    pub fn boolean(value: bool) -> Self {
        Self::new(ExprKind::Bool(value))
    }

    #[must_use]
    pub fn charstring(text: impl Into<String>) -> Self {
        Self::new(ExprKind::Charstring(text.into()))
    }

    #[must_use]
    pub fn name(name: impl Into<String>) -> Self {
        Self::new(ExprKind::Name(name.into()))
    }

    #[must_use]
    pub fn reference(reference: Reference) -> Self {
        Self::new(ExprKind::Ref(reference))
    }

    /// The compile-time integer value, when the expression is a literal.
    #[must_use]
    pub fn as_const_int(&self) -> Option<i64> {
        match &self.kind {
            ExprKind::Int(value) => Some(*value),
            _ => None,
        }
    }

    /// `Some(negative)` when the expression is the infinity literal.
    #[must_use]
    pub fn as_infinity(&self) -> Option<bool> {
        match &self.kind {
            ExprKind::Infinity { negative } => Some(*negative),
            ExprKind::Real(value) if value.is_infinite() => Some(*value < 0.0),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_name(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::Name(name) => Some(name),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_reference(&self) -> Option<&Reference> {
        match &self.kind {
            ExprKind::Ref(reference) => Some(reference),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_call(&self) -> bool {
        matches!(self.kind, ExprKind::Apply { .. })
    }

    /// Render the expression as a target-language rvalue.
    #[must_use]
    pub fn render(&self) -> String {
        match &self.kind {
            ExprKind::Int(value) => value.to_string(),
            ExprKind::Real(value) => {
                if value.is_infinite() {
                    render_infinity(*value < 0.0)
                } else {
                    format!("{value:?}")
                }
            }
            ExprKind::Infinity { negative } => render_infinity(*negative),
            ExprKind::Bool(value) => {
                if *value {
                    "TRUE".into()
                } else {
                    "FALSE".into()
                }
            }
            ExprKind::Charstring(text) => format!("\"{}\"", escape_charstring(text)),
            ExprKind::Bitstring(text) => format!("bitstr(\"{text}\")"),
            ExprKind::Hexstring(text) => format!("hexstr(\"{text}\")"),
            ExprKind::Octetstring(text) => format!("octetstr(\"{text}\")"),
            ExprKind::Name(name) => name.clone(),
            ExprKind::Ref(reference) => reference.render(),
            ExprKind::Apply { callee, args } => {
                let rendered: Vec<String> = args.iter().map(Expr::render).collect();
                format!("{}({})", callee.render(), rendered.join(", "))
            }
        }
    }
}

fn render_infinity(negative: bool) -> String {
    if negative {
        "-INFINITY".into()
    } else {
        "INFINITY".into()
    }
}

fn escape_charstring(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn const_int_extraction() {
        assert_eq!(Expr::int(7).as_const_int(), Some(7));
        assert_eq!(Expr::name("x").as_const_int(), None);
    }

    #[test]
    fn infinity_detected_for_both_spellings() {
        assert_eq!(Expr::infinity(true).as_infinity(), Some(true));
        assert_eq!(Expr::real(f64::INFINITY).as_infinity(), Some(false));
        assert_eq!(Expr::real(1.5).as_infinity(), None);
    }

    #[test]
    fn rendering_escapes_charstrings() {
        assert_eq!(Expr::charstring("a\"b").render(), "\"a\\\"b\"");
        assert_eq!(Expr::int(-3).render(), "-3");
        assert_eq!(Expr::infinity(true).render(), "-INFINITY");
    }
}
