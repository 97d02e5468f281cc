//! References to module-level definitions, with field/index projections.

use crate::diagnostics::Span;
use crate::syntax::expr::Expr;
use crate::template::TemplateInstance;

/// Projection applied after the referenced definition is located.
#[derive(Debug, Clone)]
pub enum SubRef {
    Field(String),
    Index(Expr),
}

/// A reference to a template, variable template, module parameter,
/// constant, or function. Actual parameters are present only for
/// parameterized template references.
#[derive(Debug, Clone)]
pub struct Reference {
    pub span: Option<Span>,
    pub module: Option<String>,
    pub name: String,
    pub subrefs: Vec<SubRef>,
    pub actuals: Option<Vec<TemplateInstance>>,
}

impl Reference {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            span: None,
            module: None,
            name: name.into(),
            subrefs: Vec::new(),
            actuals: None,
        }
    }

    #[must_use]
    pub fn in_module(mut self, module: impl Into<String>) -> Self {
        self.module = Some(module.into());
        self
    }

    #[must_use]
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    #[must_use]
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.subrefs.push(SubRef::Field(field.into()));
        self
    }

    #[must_use]
    pub fn with_index(mut self, index: Expr) -> Self {
        self.subrefs.push(SubRef::Index(index));
        self
    }

    #[must_use]
    pub fn with_actuals(mut self, actuals: Vec<TemplateInstance>) -> Self {
        self.actuals = Some(actuals);
        self
    }

    #[must_use]
    pub fn is_parameterized(&self) -> bool {
        self.actuals.is_some()
    }

    /// The reference as written, for diagnostics.
    #[must_use]
    pub fn display_name(&self) -> String {
        let mut out = String::new();
        if let Some(module) = &self.module {
            out.push_str(module);
            out.push('.');
        }
        out.push_str(&self.name);
        for subref in &self.subrefs {
            match subref {
                SubRef::Field(field) => {
                    out.push('.');
                    out.push_str(field);
                }
                SubRef::Index(index) => {
                    out.push('[');
                    out.push_str(&index.render());
                    out.push(']');
                }
            }
        }
        out
    }

    /// Render the reference as a target-language rvalue.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        if let Some(module) = &self.module {
            out.push_str(&sanitize(module));
            out.push('_');
        }
        out.push_str(&sanitize(&self.name));
        for subref in &self.subrefs {
            match subref {
                SubRef::Field(field) => {
                    out.push_str(&format!(".{}()", field_accessor(field)));
                }
                SubRef::Index(index) => {
                    out.push_str(&format!(".elem({})", index.render()));
                }
            }
        }
        out
    }
}

/// Map a definition name to its generated target identifier.
#[must_use]
pub fn sanitize(name: &str) -> String {
    name.chars()
        .map(|ch| if ch.is_ascii_alphanumeric() { ch } else { '_' })
        .collect()
}

/// Generated accessor name for a record/set field.
#[must_use]
pub fn field_accessor(field: &str) -> String {
    format!("f_{}", sanitize(field))
}
