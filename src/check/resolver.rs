//! Reference and alias resolution with caller-supplied cycle detection.

use std::rc::Rc;

use tracing::trace;

use crate::check::codes;
use crate::diagnostics::{DiagnosticSink, Span};
use crate::error::ReparseAborted;
use crate::module::{DefId, ModuleId, ModuleRegistry};
use crate::syntax::reference::{Reference, SubRef};
use crate::template::{CompositeKind, NodeId, TemplateKind, TemplateNode};

/// One visited node on the resolution chain.
#[derive(Debug, Clone)]
struct ChainEntry {
    node: NodeId,
    label: String,
}

/// Cycle-detection context for reference resolution.
///
/// The chain is owned by the caller and passed down every resolution, so
/// concurrent independent checks never share state. `mark_state` /
/// `prev_state` bracket sibling branches so one branch's visits do not
/// pollute the next.
#[derive(Debug, Default)]
pub struct ReferenceChain {
    stack: Vec<ChainEntry>,
    marks: Vec<usize>,
}

impl ReferenceChain {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn contains(&self, node: NodeId) -> bool {
        self.stack.iter().any(|entry| entry.node == node)
    }

    /// Push a node; `false` means the node is already on the active chain
    /// and a circular reference has been found.
    #[must_use]
    pub fn add(&mut self, node: NodeId, label: impl Into<String>) -> bool {
        if self.contains(node) {
            return false;
        }
        self.stack.push(ChainEntry {
            node,
            label: label.into(),
        });
        true
    }

    /// Remember the current depth; a later `prev_state` rewinds to it.
    pub fn mark_state(&mut self) {
        self.marks.push(self.stack.len());
    }

    /// Rewind to the most recent mark.
    pub fn prev_state(&mut self) {
        if let Some(depth) = self.marks.pop() {
            self.stack.truncate(depth);
        }
    }

    /// `a -> b -> a` description of the cycle closing at `node`.
    #[must_use]
    pub fn cycle_description(&self, node: NodeId, closing_label: &str) -> String {
        let position = self
            .stack
            .iter()
            .position(|entry| entry.node == node)
            .unwrap_or(0);
        let mut names: Vec<&str> = self.stack[position..]
            .iter()
            .map(|entry| entry.label.as_str())
            .collect();
        names.push(closing_label);
        names.join(" -> ")
    }
}

/// Resolves `Referenced` / `all from` indirections to the template body
/// they stand for.
#[derive(Debug, Clone, Copy)]
pub struct Resolver<'a> {
    registry: &'a ModuleRegistry,
    module: ModuleId,
}

impl<'a> Resolver<'a> {
    #[must_use]
    pub fn new(registry: &'a ModuleRegistry, module: ModuleId) -> Self {
        Self { registry, module }
    }

    pub fn lookup(&self, reference: &Reference) -> Result<Option<DefId>, ReparseAborted> {
        self.registry.lookup(self.module, reference)
    }

    /// Follow a chain of references until something that is not a plain
    /// reference.
    ///
    /// Returned as-is, without following: parameterized references (no
    /// actual parameters to substitute), references into other modules
    /// (lowering ordering respects module boundaries), unresolved symbols,
    /// and projections that need runtime evaluation. None of those is an
    /// error; they defer to runtime. A circular chain is an error: it is
    /// reported, the offending node is marked erroneous, and resolution
    /// stops along that branch only.
    pub fn resolve_last(
        &self,
        node: &Rc<TemplateNode>,
        chain: &mut ReferenceChain,
        sink: &mut DiagnosticSink,
    ) -> Result<Rc<TemplateNode>, ReparseAborted> {
        let effective = node.effective();
        if effective.is_erroneous() {
            // Error containment: a node already diagnosed (e.g. as part
            // of a cycle) is not resolved again.
            return Ok(effective);
        }
        let (reference, span) = match &effective.kind {
            TemplateKind::Referenced(reference) => (reference.clone(), effective.span),
            TemplateKind::AllFrom(inner) => return self.resolve_last(inner, chain, sink),
            _ => return Ok(effective),
        };
        if reference.is_parameterized() {
            return Ok(effective);
        }
        let label = reference.display_name();
        if !chain.add(effective.id(), label.clone()) {
            sink.report_error(
                span,
                format!(
                    "circular template reference: {}",
                    chain.cycle_description(effective.id(), &label)
                ),
                codes::CIRCULAR_REFERENCE,
            );
            effective.set_erroneous();
            return Ok(effective);
        }
        let Some(def_id) = self.lookup(&reference)? else {
            trace!(name = %label, "reference left unresolved, deferring to runtime");
            return Ok(effective);
        };
        if def_id.module != self.module {
            return Ok(effective);
        }
        let definition = self.registry.def(def_id);
        if definition.is_parameterized() {
            return Ok(effective);
        }
        let Some(body) = definition.body() else {
            return Ok(effective);
        };
        let Some(projected) = project(&body, &reference.subrefs) else {
            return Ok(effective);
        };
        self.resolve_last(&projected, chain, sink)
    }

    /// Resolve and report nothing: used by traversals that only need to
    /// know where a reference lands.
    pub fn peek_definition(
        &self,
        reference: &Reference,
    ) -> Result<Option<DefId>, ReparseAborted> {
        self.lookup(reference)
    }

    #[must_use]
    pub fn registry(&self) -> &'a ModuleRegistry {
        self.registry
    }

    #[must_use]
    pub fn module(&self) -> ModuleId {
        self.module
    }
}

/// Apply field/index projections to a resolved body. `None` when a
/// projection cannot be evaluated at compile time.
fn project(body: &Rc<TemplateNode>, subrefs: &[SubRef]) -> Option<Rc<TemplateNode>> {
    let mut current = Rc::clone(body);
    for subref in subrefs {
        current = current.effective();
        let next = match (subref, &current.kind) {
            (SubRef::Field(name), TemplateKind::NamedList(entries)) => entries
                .iter()
                .find(|entry| entry.name == *name)
                .map(|entry| Rc::clone(&entry.node))?,
            (SubRef::Index(index), TemplateKind::Composite { kind, children })
                if *kind == CompositeKind::ValueList =>
            {
                let index = usize::try_from(index.as_const_int()?).ok()?;
                Rc::clone(children.get(index)?)
            }
            _ => return None,
        };
        current = next;
    }
    Some(current)
}

/// Span of a node's reference, for error attribution.
#[must_use]
pub fn reference_span(node: &TemplateNode) -> Option<Span> {
    match &node.kind {
        TemplateKind::Referenced(reference) => reference.span.or(node.span),
        _ => node.span,
    }
}
