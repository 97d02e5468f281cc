//! Shared builders for checker and lowering end-to-end tests.

#![allow(dead_code)]

use std::rc::Rc;

use ttcn3_templates::context::{CompileContext, Version};
use ttcn3_templates::diagnostics::DiagnosticSink;
use ttcn3_templates::module::{
    DefId, Definition, DefinitionKind, ModuleId, ModuleRegistry, TemplateDef,
    TemplateRestriction,
};
use ttcn3_templates::syntax::expr::Expr;
use ttcn3_templates::syntax::reference::Reference;
use ttcn3_templates::template::{
    CompositeKind, NamedEntry, TemplateKind, TemplateNode,
};
use ttcn3_templates::types::Type;
use ttcn3_templates::{GeneratedUnit, check_module, lower_module};

pub fn node(kind: TemplateKind) -> Rc<TemplateNode> {
    Rc::new(TemplateNode::new(kind))
}

/// Unwrapped builder for call sites that still need `with_*` decoration.
pub fn raw_list(kind: CompositeKind, children: Vec<Rc<TemplateNode>>) -> TemplateNode {
    TemplateNode::new(TemplateKind::Composite { kind, children })
}

pub fn int(value: i64) -> Rc<TemplateNode> {
    node(TemplateKind::SpecificValue(Expr::int(value)))
}

pub fn charstring(text: &str) -> Rc<TemplateNode> {
    node(TemplateKind::SpecificValue(Expr::charstring(text)))
}

pub fn any() -> Rc<TemplateNode> {
    node(TemplateKind::AnyValue)
}

pub fn star() -> Rc<TemplateNode> {
    node(TemplateKind::AnyOrOmit)
}

pub fn omit() -> Rc<TemplateNode> {
    node(TemplateKind::OmitValue)
}

pub fn composite(kind: CompositeKind, children: Vec<Rc<TemplateNode>>) -> Rc<TemplateNode> {
    node(TemplateKind::Composite { kind, children })
}

pub fn value_list(children: Vec<Rc<TemplateNode>>) -> Rc<TemplateNode> {
    composite(CompositeKind::ValueList, children)
}

pub fn subset(children: Vec<Rc<TemplateNode>>) -> Rc<TemplateNode> {
    composite(CompositeKind::Subset, children)
}

pub fn superset(children: Vec<Rc<TemplateNode>>) -> Rc<TemplateNode> {
    composite(CompositeKind::Superset, children)
}

pub fn permutation(children: Vec<Rc<TemplateNode>>) -> Rc<TemplateNode> {
    composite(CompositeKind::Permutation, children)
}

pub fn referenced(name: &str) -> Rc<TemplateNode> {
    node(TemplateKind::Referenced(Reference::new(name)))
}

pub fn all_from(name: &str) -> Rc<TemplateNode> {
    node(TemplateKind::AllFrom(referenced(name)))
}

pub fn named_list(entries: Vec<(&str, Rc<TemplateNode>)>) -> Rc<TemplateNode> {
    node(TemplateKind::NamedList(
        entries
            .into_iter()
            .map(|(name, child)| NamedEntry::new(name, child))
            .collect(),
    ))
}

pub fn set_of_int() -> Rc<Type> {
    Type::set_of(Type::integer())
}

pub fn record_of_int() -> Rc<Type> {
    Type::record_of(Type::integer())
}

pub fn define_template(
    registry: &mut ModuleRegistry,
    module: ModuleId,
    name: &str,
    ty: Rc<Type>,
    body: Rc<TemplateNode>,
) -> DefId {
    registry.define(
        module,
        Definition::new(
            name,
            DefinitionKind::Template(TemplateDef {
                ty,
                restriction: None,
                params: None,
                body,
            }),
        ),
    )
}

pub fn define_restricted(
    registry: &mut ModuleRegistry,
    module: ModuleId,
    name: &str,
    ty: Rc<Type>,
    restriction: TemplateRestriction,
    body: Rc<TemplateNode>,
) -> DefId {
    registry.define(
        module,
        Definition::new(
            name,
            DefinitionKind::Template(TemplateDef {
                ty,
                restriction: Some(restriction),
                params: None,
                body,
            }),
        ),
    )
}

/// Check every definition of the module at the initial version.
pub fn run_check(registry: &ModuleRegistry, module: ModuleId) -> DiagnosticSink {
    run_check_at(registry, module, Version::INITIAL)
}

pub fn run_check_at(
    registry: &ModuleRegistry,
    module: ModuleId,
    version: Version,
) -> DiagnosticSink {
    let mut sink = DiagnosticSink::new();
    {
        let mut ctx = CompileContext::new(version, &mut sink);
        check_module(registry, module, &mut ctx).expect("no concurrent re-parse in tests");
    }
    sink
}

/// Check, then lower, sharing one compile context and version stamp.
pub fn run_check_and_lower(
    registry: &ModuleRegistry,
    module: ModuleId,
) -> (DiagnosticSink, GeneratedUnit) {
    let mut sink = DiagnosticSink::new();
    let unit = {
        let mut ctx = CompileContext::new(Version::INITIAL, &mut sink);
        check_module(registry, module, &mut ctx).expect("no concurrent re-parse in tests");
        lower_module(registry, module, &mut ctx).expect("no concurrent re-parse in tests")
    };
    (sink, unit)
}

pub fn codes_of(sink: &DiagnosticSink) -> Vec<String> {
    sink.diagnostics()
        .iter()
        .filter_map(|diag| diag.code.as_ref().map(|code| code.code.clone()))
        .collect()
}
