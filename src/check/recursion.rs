//! Self-reference and recursive-definition analysis.
//!
//! Two distinct properties, computed separately:
//!
//! 1. *Direct self-reference*: does a definition's body reach a reference
//!    whose resolved definition is the definition being defined? This does
//!    not cross into parameter substitution of a parameterized reference,
//!    except to test whether an actual parameter is itself a reference to
//!    the left-hand side.
//! 2. *Recursive-definition cycles*: does following embedded templates
//!    (including actual-parameter templates) revisit a node already on the
//!    active chain?

use std::rc::Rc;

use crate::check::codes;
use crate::check::resolver::{ReferenceChain, Resolver};
use crate::diagnostics::DiagnosticSink;
use crate::error::ReparseAborted;
use crate::module::DefId;
use crate::syntax::expr::{Expr, ExprKind};
use crate::syntax::reference::Reference;
use crate::template::{TemplateInstance, TemplateKind, TemplateNode};

/// Structural recursive OR over all children: true iff some reachable
/// reference resolves to `lhs`.
pub fn check_expression_self_reference(
    resolver: &Resolver<'_>,
    node: &Rc<TemplateNode>,
    lhs: DefId,
) -> Result<bool, ReparseAborted> {
    let node = node.effective();
    match &node.kind {
        TemplateKind::SpecificValue(expr) => expr_references(resolver, expr, lhs),
        TemplateKind::AnyValue
        | TemplateKind::AnyOrOmit
        | TemplateKind::OmitValue
        | TemplateKind::NotUsed
        | TemplateKind::Pattern(_) => Ok(false),
        TemplateKind::ValueRange(range) => {
            for bound in [range.lower.as_ref(), range.upper.as_ref()].into_iter().flatten() {
                if expr_references(resolver, bound, lhs)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        TemplateKind::Composite { children, .. } => {
            for child in children {
                if check_expression_self_reference(resolver, child, lhs)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        TemplateKind::NamedList(entries) => {
            for entry in entries {
                if check_expression_self_reference(resolver, &entry.node, lhs)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        TemplateKind::AllFrom(inner) => check_expression_self_reference(resolver, inner, lhs),
        TemplateKind::Referenced(reference) => {
            check_parameterized_reference(resolver, reference, lhs)
        }
        TemplateKind::DecodeMatch { encoding, target } => {
            if let Some(expr) = encoding {
                if expr_references(resolver, expr, lhs)? {
                    return Ok(true);
                }
            }
            check_expression_self_reference(resolver, &target.template, lhs)
        }
        TemplateKind::Invoke { callee, actuals } => {
            if expr_references(resolver, callee, lhs)? {
                return Ok(true);
            }
            for actual in actuals {
                if instance_is_reference_to(resolver, actual, lhs)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
    }
}

/// A referenced definition is a self-reference when it *is* the left-hand
/// side, or when one of its actual parameters is (one level, no deeper
/// substitution). For referenced functions, default values of their formal
/// parameters are also inspected.
pub fn check_parameterized_reference(
    resolver: &Resolver<'_>,
    reference: &Reference,
    lhs: DefId,
) -> Result<bool, ReparseAborted> {
    if let Some(def_id) = resolver.peek_definition(reference)? {
        if def_id == lhs {
            return Ok(true);
        }
        let definition = resolver.registry().def(def_id);
        if definition.is_function() {
            if let Some(formals) = definition.formal_params() {
                for formal in formals {
                    if let Some(default) = &formal.default {
                        if check_expression_self_reference(resolver, default, lhs)? {
                            return Ok(true);
                        }
                    }
                }
            }
        }
    }
    if let Some(actuals) = &reference.actuals {
        for actual in actuals {
            if instance_is_reference_to(resolver, actual, lhs)? {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

fn instance_is_reference_to(
    resolver: &Resolver<'_>,
    instance: &TemplateInstance,
    lhs: DefId,
) -> Result<bool, ReparseAborted> {
    let node = instance.template.effective();
    match &node.kind {
        TemplateKind::Referenced(reference) => {
            Ok(resolver.peek_definition(reference)? == Some(lhs))
        }
        TemplateKind::SpecificValue(expr) => expr_references(resolver, expr, lhs),
        _ => Ok(false),
    }
}

fn expr_references(
    resolver: &Resolver<'_>,
    expr: &Expr,
    lhs: DefId,
) -> Result<bool, ReparseAborted> {
    match &expr.kind {
        ExprKind::Name(name) => {
            let reference = Reference::new(name.clone());
            Ok(resolver.peek_definition(&reference)? == Some(lhs))
        }
        ExprKind::Ref(reference) => Ok(resolver.peek_definition(reference)? == Some(lhs)),
        ExprKind::Apply { callee, args } => {
            if expr_references(resolver, callee, lhs)? {
                return Ok(true);
            }
            for arg in args {
                if expr_references(resolver, arg, lhs)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        _ => Ok(false),
    }
}

/// Walk embedded templates with the mark/rewind chain protocol, reporting
/// a diagnostic when a node reappears on the active chain.
pub fn check_recursions(
    resolver: &Resolver<'_>,
    node: &Rc<TemplateNode>,
    chain: &mut ReferenceChain,
    sink: &mut DiagnosticSink,
) -> Result<(), ReparseAborted> {
    let node = node.effective();
    match &node.kind {
        TemplateKind::Composite { children, .. } => {
            for child in children {
                chain.mark_state();
                check_recursions(resolver, child, chain, sink)?;
                chain.prev_state();
            }
        }
        TemplateKind::NamedList(entries) => {
            for entry in entries {
                chain.mark_state();
                check_recursions(resolver, &entry.node, chain, sink)?;
                chain.prev_state();
            }
        }
        TemplateKind::AllFrom(inner) => {
            chain.mark_state();
            check_recursions(resolver, inner, chain, sink)?;
            chain.prev_state();
        }
        TemplateKind::DecodeMatch { target, .. } => {
            chain.mark_state();
            check_recursions(resolver, &target.template, chain, sink)?;
            chain.prev_state();
        }
        TemplateKind::Invoke { actuals, .. } => {
            for actual in actuals {
                chain.mark_state();
                check_recursions(resolver, &actual.template, chain, sink)?;
                chain.prev_state();
            }
        }
        TemplateKind::Referenced(reference) => {
            if !node.is_erroneous() {
                follow_reference(resolver, &node, reference, chain, sink)?;
            }
            if let Some(actuals) = &reference.actuals {
                for actual in actuals {
                    chain.mark_state();
                    check_recursions(resolver, &actual.template, chain, sink)?;
                    chain.prev_state();
                }
            }
        }
        _ => {}
    }
    Ok(())
}

fn follow_reference(
    resolver: &Resolver<'_>,
    node: &Rc<TemplateNode>,
    reference: &Reference,
    chain: &mut ReferenceChain,
    sink: &mut DiagnosticSink,
) -> Result<(), ReparseAborted> {
    let label = reference.display_name();
    if !chain.add(node.id(), label.clone()) {
        sink.report_error(
            node.span.or(reference.span),
            format!(
                "recursive template definition: {}",
                chain.cycle_description(node.id(), &label)
            ),
            codes::CIRCULAR_TEMPLATE,
        );
        node.set_erroneous();
        return Ok(());
    }
    let Some(def_id) = resolver.peek_definition(reference)? else {
        return Ok(());
    };
    let definition = resolver.registry().def(def_id);
    if let Some(body) = definition.body() {
        check_recursions(resolver, &body, chain, sink)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::{Definition, DefinitionKind, ModuleRegistry, TemplateDef};
    use crate::types::Type;

    fn define_template(
        registry: &mut ModuleRegistry,
        module: crate::module::ModuleId,
        name: &str,
        body: Rc<TemplateNode>,
    ) -> DefId {
        registry.define(
            module,
            Definition::new(
                name,
                DefinitionKind::Template(TemplateDef {
                    ty: Type::integer(),
                    restriction: None,
                    params: None,
                    body,
                }),
            ),
        )
    }

    #[test]
    fn direct_self_reference_is_detected() {
        let mut registry = ModuleRegistry::new();
        let module = registry.add_module("M");
        let body = Rc::new(TemplateNode::new(TemplateKind::Referenced(
            Reference::new("t_self"),
        )));
        let def = define_template(&mut registry, module, "t_self", Rc::clone(&body));
        let resolver = Resolver::new(&registry, module);
        assert!(check_expression_self_reference(&resolver, &body, def).unwrap());
    }

    #[test]
    fn reference_to_a_sibling_is_not_a_self_reference() {
        let mut registry = ModuleRegistry::new();
        let module = registry.add_module("M");
        let other_body = Rc::new(TemplateNode::new(TemplateKind::AnyValue));
        define_template(&mut registry, module, "t_other", other_body);
        let body = Rc::new(TemplateNode::new(TemplateKind::Referenced(
            Reference::new("t_other"),
        )));
        let def = define_template(&mut registry, module, "t_main", Rc::clone(&body));
        let resolver = Resolver::new(&registry, module);
        assert!(!check_expression_self_reference(&resolver, &body, def).unwrap());
    }

    #[test]
    fn self_reference_via_actual_parameter_is_detected() {
        let mut registry = ModuleRegistry::new();
        let module = registry.add_module("M");
        let param_body = Rc::new(TemplateNode::new(TemplateKind::AnyValue));
        registry.define(
            module,
            Definition::new(
                "t_par",
                DefinitionKind::Template(TemplateDef {
                    ty: Type::integer(),
                    restriction: None,
                    params: Some(vec![crate::module::FormalPar::template(
                        "p",
                        Type::integer(),
                    )]),
                    body: param_body,
                }),
            ),
        );
        let actual = TemplateInstance::new(
            None,
            Rc::new(TemplateNode::new(TemplateKind::Referenced(
                Reference::new("t_main"),
            ))),
        );
        let body = Rc::new(TemplateNode::new(TemplateKind::Referenced(
            Reference::new("t_par").with_actuals(vec![actual]),
        )));
        let def = define_template(&mut registry, module, "t_main", Rc::clone(&body));
        let resolver = Resolver::new(&registry, module);
        assert!(check_expression_self_reference(&resolver, &body, def).unwrap());
    }

    #[test]
    fn recursion_walk_reports_cycles_and_terminates() {
        let mut registry = ModuleRegistry::new();
        let module = registry.add_module("M");
        let body_a = Rc::new(TemplateNode::new(TemplateKind::Referenced(
            Reference::new("t_b"),
        )));
        let body_b = Rc::new(TemplateNode::new(TemplateKind::Referenced(
            Reference::new("t_a"),
        )));
        define_template(&mut registry, module, "t_a", Rc::clone(&body_a));
        define_template(&mut registry, module, "t_b", Rc::clone(&body_b));
        let resolver = Resolver::new(&registry, module);
        let mut chain = ReferenceChain::new();
        let mut sink = DiagnosticSink::new();
        check_recursions(&resolver, &body_a, &mut chain, &mut sink).unwrap();
        assert_eq!(sink.error_count(), 1);
        assert!(sink.diagnostics()[0].message.contains("recursive template"));
    }
}
