//! Length restrictions declared on individual templates.

use crate::check::codes;
use crate::diagnostics::{DiagnosticSink, Span};
use crate::syntax::expr::Expr;

/// `length(N)` or `length(L .. U)` attached to a template. Bounds are
/// integer-valued expressions; an absent range bound stands for infinity.
#[derive(Debug, Clone)]
pub enum LengthRestriction {
    Single { count: Expr },
    Range { lower: Option<Expr>, upper: Option<Expr> },
}

/// Outcome of matching a known element count against a restriction whose
/// bounds may not be compile-time constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthFit {
    Accepts,
    Rejects,
    Inconclusive,
}

impl LengthRestriction {
    #[must_use]
    pub fn exact(count: i64) -> Self {
        Self::Single {
            count: Expr::int(count),
        }
    }

    #[must_use]
    pub fn between(lower: i64, upper: i64) -> Self {
        Self::Range {
            lower: Some(Expr::int(lower)),
            upper: Some(Expr::int(upper)),
        }
    }

    #[must_use]
    pub fn at_least(lower: i64) -> Self {
        Self::Range {
            lower: Some(Expr::int(lower)),
            upper: None,
        }
    }

    /// Compile-time `(lower, upper)` bounds; `None` when any written bound
    /// is not a constant. Infinity bounds read as absent.
    #[must_use]
    pub fn const_bounds(&self) -> Option<(u64, Option<u64>)> {
        match self {
            Self::Single { count } => {
                let count = u64::try_from(count.as_const_int()?).ok()?;
                Some((count, Some(count)))
            }
            Self::Range { lower, upper } => {
                let lower_bound = match lower {
                    None => 0,
                    Some(expr) if expr.as_infinity().is_some() => 0,
                    Some(expr) => u64::try_from(expr.as_const_int()?).ok()?,
                };
                let upper_bound = match upper {
                    None => None,
                    Some(expr) if expr.as_infinity().is_some() => None,
                    Some(expr) => Some(u64::try_from(expr.as_const_int()?).ok()?),
                };
                Some((lower_bound, upper_bound))
            }
        }
    }

    /// Validate the written bounds: non-negative integers, lower <= upper,
    /// infinity only meaningful as an upper bound.
    pub fn validate(&self, span: Option<Span>, sink: &mut DiagnosticSink) {
        match self {
            Self::Single { count } => {
                if let Some(value) = count.as_const_int() {
                    if value < 0 {
                        sink.report_error(
                            span.or(count.span),
                            format!("length restriction must be non-negative, got {value}"),
                            codes::LENGTH_NEGATIVE,
                        );
                    }
                }
                if count.as_infinity().is_some() {
                    sink.report_error(
                        span.or(count.span),
                        "`infinity` is not a valid exact length",
                        codes::LENGTH_BOUND_INVALID,
                    );
                }
            }
            Self::Range { lower, upper } => {
                if let Some(expr) = lower {
                    if expr.as_infinity().is_some() {
                        sink.report_error(
                            span.or(expr.span),
                            "`infinity` cannot be a lower length bound",
                            codes::LENGTH_BOUND_INVALID,
                        );
                    } else if expr.as_const_int().is_some_and(|value| value < 0) {
                        sink.report_error(
                            span.or(expr.span),
                            "length bounds must be non-negative",
                            codes::LENGTH_NEGATIVE,
                        );
                    }
                }
                if let Some(expr) = upper {
                    if expr.as_const_int().is_some_and(|value| value < 0) {
                        sink.report_error(
                            span.or(expr.span),
                            "length bounds must be non-negative",
                            codes::LENGTH_NEGATIVE,
                        );
                    }
                }
                if let Some((lower_bound, Some(upper_bound))) = self.const_bounds() {
                    if lower_bound > upper_bound {
                        sink.report_error(
                            span,
                            format!(
                                "lower length bound {lower_bound} exceeds upper bound \
                                 {upper_bound}"
                            ),
                            codes::LENGTH_BOUNDS_REVERSED,
                        );
                    }
                }
            }
        }
    }

    /// Does a value with `count` elements satisfy this restriction?
    #[must_use]
    pub fn fit(&self, count: u64) -> LengthFit {
        match self.const_bounds() {
            Some((lower, upper)) => {
                if count >= lower && upper.is_none_or(|upper| count <= upper) {
                    LengthFit::Accepts
                } else {
                    LengthFit::Rejects
                }
            }
            None => LengthFit::Inconclusive,
        }
    }

    /// Can a value with at least `count` elements ever satisfy this
    /// restriction? Used when wildcards make the exact count open-ended.
    #[must_use]
    pub fn fit_at_least(&self, count: u64) -> LengthFit {
        match self.const_bounds() {
            Some((_, Some(upper))) => {
                if count <= upper {
                    LengthFit::Accepts
                } else {
                    LengthFit::Rejects
                }
            }
            Some((_, None)) => LengthFit::Accepts,
            None => LengthFit::Inconclusive,
        }
    }

    /// Statements applying the restriction to an already-built matcher.
    #[must_use]
    pub fn render_setup(&self, lvalue: &str) -> Vec<String> {
        match self {
            Self::Single { count } => {
                vec![format!("{lvalue}.set_single_length({});", count.render())]
            }
            Self::Range { lower, upper } => {
                let lower_text = lower.as_ref().map_or_else(|| "0".into(), Expr::render);
                let upper_text = upper
                    .as_ref()
                    .map_or_else(|| "INFINITY".into(), Expr::render);
                vec![format!(
                    "{lvalue}.set_length_range({lower_text}, {upper_text});"
                )]
            }
        }
    }

    /// Source-level rendering for diagnostics.
    #[must_use]
    pub fn display(&self) -> String {
        match self {
            Self::Single { count } => format!("length({})", count.render()),
            Self::Range { lower, upper } => {
                let lower_text = lower.as_ref().map_or_else(|| "0".into(), Expr::render);
                let upper_text = upper
                    .as_ref()
                    .map_or_else(|| "infinity".into(), Expr::render);
                format!("length({lower_text} .. {upper_text})")
            }
        }
    }
}
