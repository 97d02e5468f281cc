//! The template tree: one tagged union covering every matching construct,
//! plus the mutable annotations (governor, erroneous flag, version stamps)
//! the checker and the lowering pass leave behind.

pub mod length;
pub mod pattern;

pub use length::{LengthFit, LengthRestriction};
pub use pattern::{PatternKind, StringPattern};

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::context::Version;
use crate::diagnostics::{DiagnosticSink, Span};
use crate::syntax::expr::Expr;
use crate::syntax::reference::Reference;
use crate::types::Type;

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

/// Stable identity of a template node, used by cycle-detection chains.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeId(u64);

impl NodeId {
    fn fresh() -> Self {
        NodeId(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// The matching-list constructors that share child handling.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompositeKind {
    ValueList,
    ComplementedList,
    Subset,
    Superset,
    Permutation,
}

impl CompositeKind {
    #[must_use]
    pub fn display_name(self) -> &'static str {
        match self {
            Self::ValueList => "value list match",
            Self::ComplementedList => "complemented list match",
            Self::Subset => "subset match",
            Self::Superset => "superset match",
            Self::Permutation => "permutation match",
        }
    }

    /// Target-language `set_type` selector.
    #[must_use]
    pub fn target_token(self) -> &'static str {
        match self {
            Self::ValueList => "VALUE_LIST",
            Self::ComplementedList => "COMPLEMENTED_LIST",
            Self::Subset => "SUBSET_MATCH",
            Self::Superset => "SUPERSET_MATCH",
            Self::Permutation => "PERMUTATION_MATCH",
        }
    }
}

/// One field of a named template list. Insertion order is irrelevant for
/// lookup but preserved for diagnostics.
#[derive(Debug, Clone)]
pub struct NamedEntry {
    pub name: String,
    pub span: Option<Span>,
    pub node: Rc<TemplateNode>,
}

impl NamedEntry {
    #[must_use]
    pub fn new(name: impl Into<String>, node: Rc<TemplateNode>) -> Self {
        Self {
            name: name.into(),
            span: None,
            node,
        }
    }
}

/// A template body paired with its (optionally explicit) type.
#[derive(Debug, Clone)]
pub struct TemplateInstance {
    pub ty: Option<Rc<Type>>,
    pub template: Rc<TemplateNode>,
}

impl TemplateInstance {
    #[must_use]
    pub fn new(ty: Option<Rc<Type>>, template: Rc<TemplateNode>) -> Self {
        Self { ty, template }
    }
}

/// `(lower .. upper)` with optional exclusive bounds. An absent bound is
/// open (`-infinity` / `infinity`).
#[derive(Debug, Clone)]
pub struct ValueRange {
    pub lower: Option<Expr>,
    pub lower_exclusive: bool,
    pub upper: Option<Expr>,
    pub upper_exclusive: bool,
}

impl ValueRange {
    #[must_use]
    pub fn new(lower: Option<Expr>, upper: Option<Expr>) -> Self {
        Self {
            lower,
            lower_exclusive: false,
            upper,
            upper_exclusive: false,
        }
    }
}

#[derive(Debug, Clone)]
pub enum TemplateKind {
    /// A concrete value; may still turn out to be a reference or a call.
    SpecificValue(Expr),
    /// `?`
    AnyValue,
    /// `*`
    AnyOrOmit,
    /// `omit`
    OmitValue,
    /// `-` in modified templates and value lists.
    NotUsed,
    Pattern(StringPattern),
    ValueRange(ValueRange),
    Composite {
        kind: CompositeKind,
        children: Vec<Rc<TemplateNode>>,
    },
    NamedList(Vec<NamedEntry>),
    /// `all from <inner>`; the inner node must elaborate to a reference
    /// to a list-typed value or template.
    AllFrom(Rc<TemplateNode>),
    Referenced(Reference),
    DecodeMatch {
        encoding: Option<Expr>,
        target: TemplateInstance,
    },
    /// Function application; only produced by rewriting a `SpecificValue`
    /// whose value is a call expression.
    Invoke {
        callee: Expr,
        actuals: Vec<TemplateInstance>,
    },
}

/// Coarse matching classification used by restriction checking, all-from
/// legality, and element counting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MatchKind {
    Specific,
    Any,
    AnyOrOmit,
    Omit,
    NotUsed,
    Complex,
}

/// Central entity of the template sub-language.
///
/// Created once by the parser and never restructured; the only later
/// shape changes go through the `converted` / `rewritten` shadow slots.
#[derive(Debug)]
pub struct TemplateNode {
    id: NodeId,
    pub span: Option<Span>,
    pub kind: TemplateKind,
    pub length_restriction: Option<LengthRestriction>,
    pub if_present: bool,
    pub base_template: Option<Rc<TemplateNode>>,
    governor: RefCell<Option<Rc<Type>>>,
    erroneous: Cell<bool>,
    checked_at: Cell<Option<Version>>,
    lowered_at: Cell<Option<Version>>,
    converted: RefCell<Option<Rc<TemplateNode>>>,
    rewritten: RefCell<Option<Rc<TemplateNode>>>,
}

impl TemplateNode {
    #[must_use]
    pub fn new(kind: TemplateKind) -> Self {
        Self {
            id: NodeId::fresh(),
            span: None,
            kind,
            length_restriction: None,
            if_present: false,
            base_template: None,
            governor: RefCell::new(None),
            erroneous: Cell::new(false),
            checked_at: Cell::new(None),
            lowered_at: Cell::new(None),
            converted: RefCell::new(None),
            rewritten: RefCell::new(None),
        }
    }

    #[must_use]
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    #[must_use]
    pub fn with_length_restriction(mut self, restriction: LengthRestriction) -> Self {
        self.length_restriction = Some(restriction);
        self
    }

    #[must_use]
    pub fn with_if_present(mut self) -> Self {
        self.if_present = true;
        self
    }

    #[must_use]
    pub fn with_base(mut self, base: Rc<TemplateNode>) -> Self {
        self.base_template = Some(base);
        self
    }

    #[must_use]
    pub fn id(&self) -> NodeId {
        self.id
    }

    #[must_use]
    pub fn governor(&self) -> Option<Rc<Type>> {
        self.governor.borrow().clone()
    }

    /// Assign the governor. Idempotent-or-error: assigning a second,
    /// different governor is a broken compiler invariant, reported as an
    /// internal error and ignored.
    pub fn set_governor(&self, ty: Rc<Type>, sink: &mut DiagnosticSink) {
        let mut slot = self.governor.borrow_mut();
        match slot.as_ref() {
            None => *slot = Some(ty),
            Some(existing) => {
                let same = Rc::ptr_eq(existing, &ty)
                    || existing.display_name() == ty.display_name();
                if !same {
                    sink.report_internal_error(
                        format!(
                            "template governor reassigned from `{}` to `{}`",
                            existing.display_name(),
                            ty.display_name()
                        ),
                        crate::check::codes::INTERNAL_GOVERNOR,
                    );
                }
            }
        }
    }

    #[must_use]
    pub fn is_erroneous(&self) -> bool {
        self.erroneous.get()
    }

    /// Monotonic within a check cycle: never cleared by any later check.
    pub fn set_erroneous(&self) {
        self.erroneous.set(true);
    }

    #[must_use]
    pub fn checked_at(&self) -> Option<Version> {
        self.checked_at.get()
    }

    pub fn mark_checked(&self, version: Version) {
        if self.checked_at.get().is_none_or(|seen| seen < version) {
            self.checked_at.set(Some(version));
        }
    }

    #[must_use]
    pub fn lowered_at(&self) -> Option<Version> {
        self.lowered_at.get()
    }

    pub fn mark_lowered(&self, version: Version) {
        if self.lowered_at.get().is_none_or(|seen| seen < version) {
            self.lowered_at.set(Some(version));
        }
    }

    #[must_use]
    pub fn converted(&self) -> Option<Rc<TemplateNode>> {
        self.converted.borrow().clone()
    }

    /// Cache a conversion product (e.g. value list to named list) on the
    /// original node rather than mutating it in place.
    pub fn set_converted(&self, node: Rc<TemplateNode>) {
        *self.converted.borrow_mut() = Some(node);
    }

    #[must_use]
    pub fn rewritten(&self) -> Option<Rc<TemplateNode>> {
        self.rewritten.borrow().clone()
    }

    /// Cache the reinterpretation of a `SpecificValue` as a reference or
    /// an invocation.
    pub fn set_rewritten(&self, node: Rc<TemplateNode>) {
        *self.rewritten.borrow_mut() = Some(node);
    }

    /// The node that later passes should consult: the rewritten form if
    /// present, then the converted shadow, then the node itself. Shadow
    /// nodes may themselves have been converted again, so chase to a
    /// fixpoint.
    #[must_use]
    pub fn effective(self: &Rc<Self>) -> Rc<TemplateNode> {
        let mut current = Rc::clone(self);
        loop {
            let next = if let Some(rewritten) = current.rewritten() {
                rewritten
            } else if let Some(converted) = current.converted() {
                converted
            } else {
                return current;
            };
            current = next;
        }
    }

    /// True when the template is a plain value in disguise: a specific
    /// value, or a brace/named list whose members are all plain values.
    /// Wildcards, ranges, and the other matching mechanisms never are.
    #[must_use]
    pub fn is_value(&self) -> bool {
        if self.length_restriction.is_some() || self.if_present {
            return false;
        }
        match &self.kind {
            TemplateKind::SpecificValue(_) => true,
            TemplateKind::Composite {
                kind: CompositeKind::ValueList,
                children,
            } => children.iter().all(|child| child.is_value()),
            TemplateKind::NamedList(entries) => {
                entries.iter().all(|entry| entry.node.is_value())
            }
            _ => false,
        }
    }

    #[must_use]
    pub fn match_kind(&self) -> MatchKind {
        match &self.kind {
            TemplateKind::SpecificValue(_) => MatchKind::Specific,
            TemplateKind::AnyValue => MatchKind::Any,
            TemplateKind::AnyOrOmit => MatchKind::AnyOrOmit,
            TemplateKind::OmitValue => MatchKind::Omit,
            TemplateKind::NotUsed => MatchKind::NotUsed,
            _ => MatchKind::Complex,
        }
    }

    /// Composite children, when this is a list-shaped template.
    #[must_use]
    pub fn children(&self) -> Option<&[Rc<TemplateNode>]> {
        match &self.kind {
            TemplateKind::Composite { children, .. } => Some(children),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_reference(&self) -> Option<&Reference> {
        match &self.kind {
            TemplateKind::Referenced(reference) => Some(reference),
            _ => None,
        }
    }

    /// Structural eligibility for the single-expression fast path. The
    /// context conditions (no length restriction, no `ifpresent`, scope
    /// reachability) are the lowering pass's concern.
    #[must_use]
    pub fn kind_has_single_expression(&self) -> bool {
        matches!(
            self.kind,
            TemplateKind::SpecificValue(_)
                | TemplateKind::AnyValue
                | TemplateKind::AnyOrOmit
                | TemplateKind::OmitValue
                | TemplateKind::Referenced(_)
                | TemplateKind::Invoke { .. }
        )
    }

    /// Short description for diagnostics.
    #[must_use]
    pub fn describe(&self) -> &'static str {
        match &self.kind {
            TemplateKind::SpecificValue(_) => "specific value",
            TemplateKind::AnyValue => "any value (`?`)",
            TemplateKind::AnyOrOmit => "any or omit (`*`)",
            TemplateKind::OmitValue => "omit value",
            TemplateKind::NotUsed => "not used symbol (`-`)",
            TemplateKind::Pattern(_) => "string pattern",
            TemplateKind::ValueRange(_) => "value range match",
            TemplateKind::Composite { kind, .. } => kind.display_name(),
            TemplateKind::NamedList(_) => "named template list",
            TemplateKind::AllFrom(_) => "all from clause",
            TemplateKind::Referenced(_) => "referenced template",
            TemplateKind::DecodeMatch { .. } => "decoded content match",
            TemplateKind::Invoke { .. } => "function invocation",
        }
    }
}
