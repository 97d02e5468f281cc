//! Subtype constraints declared on a type, as opposed to restrictions
//! written on an individual template.

use crate::diagnostics::DiagnosticSink;
use crate::template::{TemplateKind, TemplateNode};

/// Length constraint attached to a string or list type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LengthBound {
    pub min: u64,
    pub max: Option<u64>,
}

impl LengthBound {
    #[must_use]
    pub fn exact(count: u64) -> Self {
        Self {
            min: count,
            max: Some(count),
        }
    }

    #[must_use]
    pub fn range(min: u64, max: Option<u64>) -> Self {
        Self { min, max }
    }

    #[must_use]
    pub fn allows(&self, count: u64) -> bool {
        count >= self.min && self.max.is_none_or(|max| count <= max)
    }
}

/// Closed or half-open integer value range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntRange {
    pub lower: Option<i64>,
    pub upper: Option<i64>,
}

impl IntRange {
    #[must_use]
    pub fn new(lower: Option<i64>, upper: Option<i64>) -> Self {
        Self { lower, upper }
    }

    #[must_use]
    pub fn contains(&self, value: i64) -> bool {
        self.lower.is_none_or(|lower| value >= lower)
            && self.upper.is_none_or(|upper| value <= upper)
    }
}

/// The subtype object of a governor type. This drives the second,
/// type-centric restriction pass that runs when a template is checked
/// with `needs_subtype_check`.
#[derive(Debug, Clone, Default)]
pub struct SubtypeSpec {
    pub length: Option<LengthBound>,
    pub int_ranges: Vec<IntRange>,
}

impl SubtypeSpec {
    #[must_use]
    pub fn with_length(length: LengthBound) -> Self {
        Self {
            length: Some(length),
            int_ranges: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_int_ranges(ranges: Vec<IntRange>) -> Self {
        Self {
            length: None,
            int_ranges: ranges,
        }
    }

    #[must_use]
    pub fn allows_length(&self, count: u64) -> bool {
        self.length.is_none_or(|bound| bound.allows(count))
    }

    #[must_use]
    pub fn allows_int(&self, value: i64) -> bool {
        self.int_ranges.is_empty() || self.int_ranges.iter().any(|range| range.contains(value))
    }

    /// Validate a template against the constraints declared on its
    /// governor. Reports user diagnostics; never unwinds.
    pub fn check_template(&self, node: &TemplateNode, type_name: &str, sink: &mut DiagnosticSink) {
        match &node.kind {
            TemplateKind::SpecificValue(expr) => {
                if let Some(value) = expr.as_const_int() {
                    if !self.allows_int(value) {
                        sink.report_error(
                            node.span,
                            format!(
                                "value {value} is outside the subtype of type `{type_name}`"
                            ),
                            crate::check::codes::SUBTYPE_VALUE,
                        );
                    }
                }
            }
            TemplateKind::Pattern(pattern) => {
                if let Some(bound) = self.length {
                    let min = pattern.min_length() as u64;
                    if bound.max.is_some_and(|max| min > max) {
                        sink.report_error(
                            node.span,
                            format!(
                                "pattern needs at least {min} elements, but the subtype of \
                                 `{type_name}` allows at most {}",
                                bound.max.unwrap_or(0)
                            ),
                            crate::check::codes::SUBTYPE_LENGTH,
                        );
                    }
                }
            }
            _ => {}
        }
        if let (Some(bound), Some(restriction)) = (self.length, &node.length_restriction) {
            if let Some((lower, upper)) = restriction.const_bounds() {
                let lower_violates = bound.max.is_some_and(|max| lower > max);
                let upper_violates = upper.is_some_and(|upper| upper < bound.min);
                if lower_violates || upper_violates {
                    sink.report_error(
                        node.span,
                        format!(
                            "length restriction is incompatible with the length subtype of \
                             `{type_name}`"
                        ),
                        crate::check::codes::SUBTYPE_LENGTH,
                    );
                }
            }
        }
    }
}
