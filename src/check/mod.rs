//! Template checking: structural compatibility, reference resolution,
//! and recursion analysis, driven per module definition.

pub mod codes;

mod checker;
mod recursion;
pub mod resolver;

pub use checker::{CheckArgs, TemplateChecker};
pub use recursion::{
    check_expression_self_reference, check_parameterized_reference, check_recursions,
};
pub use resolver::{ReferenceChain, Resolver, reference_span};

use std::rc::Rc;

use tracing::debug;

use crate::context::CompileContext;
use crate::error::ReparseAborted;
use crate::module::{
    DefId, DefinitionKind, FormalPar, FormalParKind, ModuleId, ModuleRegistry,
    TemplateRestriction,
};
use crate::template::{CompositeKind, MatchKind, TemplateKind, TemplateNode};

/// Check every definition of a module, in declaration order.
pub fn check_module(
    registry: &ModuleRegistry,
    module: ModuleId,
    ctx: &mut CompileContext<'_>,
) -> Result<(), ReparseAborted> {
    debug!(module = %registry.module(module).name, "checking module templates");
    for def_id in registry.def_ids(module) {
        check_definition(registry, module, def_id, ctx)?;
    }
    Ok(())
}

/// Check one module-level definition: its formal parameter defaults, its
/// body against its declared type, self-reference, its restriction, and
/// recursive-definition cycles.
pub fn check_definition(
    registry: &ModuleRegistry,
    module: ModuleId,
    def_id: DefId,
    ctx: &mut CompileContext<'_>,
) -> Result<(), ReparseAborted> {
    let checker = TemplateChecker::new(registry, module);
    let resolver = Resolver::new(registry, module);
    let definition = registry.def(def_id);
    if definition
        .checked_at()
        .is_some_and(|version| version >= ctx.version)
    {
        return Ok(());
    }
    definition.mark_checked(ctx.version);
    if let Some(formals) = definition.formal_params() {
        check_formal_defaults(&checker, formals, ctx)?;
    }
    let (ty, restriction, body) = match &definition.kind {
        DefinitionKind::Template(def) => {
            (Rc::clone(&def.ty), def.restriction, Some(Rc::clone(&def.body)))
        }
        DefinitionKind::VarTemplate {
            ty,
            restriction,
            initial,
        } => (Rc::clone(ty), *restriction, initial.clone()),
        DefinitionKind::ModuleParTemplate { ty, default } => {
            (Rc::clone(ty), None, default.clone())
        }
        DefinitionKind::Const { ty, value } => {
            let args = CheckArgs::new(Rc::clone(ty)).with_lhs(def_id).with_subtype_check();
            checker.check(ctx, value, &args)?;
            if !value.effective().is_erroneous()
                && restriction_verdict(TemplateRestriction::Value, value) == Some(false)
            {
                ctx.sink.report_error(
                    definition.span,
                    format!(
                        "matching mechanisms cannot be used in constant `{}`",
                        definition.name
                    ),
                    codes::RESTRICTION_VIOLATION,
                );
                value.effective().set_erroneous();
            }
            return Ok(());
        }
        DefinitionKind::Function(_) | DefinitionKind::ExtFunction(_) => return Ok(()),
    };
    let Some(body) = body else {
        return Ok(());
    };

    let mut args = CheckArgs::new(ty)
        .with_lhs(def_id)
        .allowing_any_or_omit()
        .with_subtype_check();
    if restriction == Some(TemplateRestriction::Omit) {
        args = args.allowing_omit();
    }
    let direct = checker.check(ctx, &body, &args)?;
    if direct || check_expression_self_reference(&resolver, &body, def_id)? {
        ctx.sink.report_error(
            definition.span.or(body.span),
            format!("template `{}` references itself", definition.name),
            codes::SELF_REFERENCE,
        );
        body.effective().set_erroneous();
    }

    if let Some(restriction) = restriction {
        if !body.effective().is_erroneous() {
            match restriction_verdict(restriction, &body) {
                Some(true) => {}
                Some(false) => {
                    ctx.sink.report_error(
                        definition.span,
                        format!(
                            "template body violates its `{}` restriction",
                            restriction.display_name()
                        ),
                        codes::RESTRICTION_VIOLATION,
                    );
                    body.effective().set_erroneous();
                }
                None => {
                    // Statically inconclusive: passes with a generated
                    // runtime guard (emitted by the lowering pass).
                    ctx.sink.report_warning(
                        definition.span,
                        format!(
                            "restriction `{}` on `{}` cannot be verified statically; \
                             a runtime check will be generated",
                            restriction.display_name(),
                            definition.name
                        ),
                        codes::RESTRICTION_RUNTIME,
                    );
                }
            }
        }
    }

    let mut chain = ReferenceChain::new();
    check_recursions(&resolver, &body, &mut chain, ctx.sink)?;
    Ok(())
}

fn check_formal_defaults(
    checker: &TemplateChecker<'_>,
    formals: &[FormalPar],
    ctx: &mut CompileContext<'_>,
) -> Result<(), ReparseAborted> {
    for formal in formals {
        if let Some(default) = &formal.default {
            let mut args = CheckArgs::new(Rc::clone(&formal.ty));
            if formal.kind == FormalParKind::Template {
                args = args.allowing_omit().allowing_any_or_omit();
            }
            checker.check(ctx, default, &args)?;
        }
    }
    Ok(())
}

/// Does the template body satisfy the given restriction? `None` means
/// statically inconclusive (e.g. behind an unresolvable reference), which
/// the caller turns into a warning plus a generated runtime check.
#[must_use]
pub fn restriction_verdict(
    restriction: TemplateRestriction,
    node: &Rc<TemplateNode>,
) -> Option<bool> {
    let node = node.effective();
    if node.is_value() {
        return Some(true);
    }
    if matches!(
        node.kind,
        TemplateKind::Referenced(_) | TemplateKind::Invoke { .. }
    ) {
        return None;
    }
    match restriction {
        TemplateRestriction::Value => Some(matches!(node.match_kind(), MatchKind::NotUsed)),
        TemplateRestriction::Omit => Some(matches!(
            node.match_kind(),
            MatchKind::Omit | MatchKind::NotUsed
        )),
        TemplateRestriction::Present => match node.match_kind() {
            MatchKind::Omit | MatchKind::AnyOrOmit => Some(false),
            MatchKind::Complex => {
                if let TemplateKind::Composite { kind, children } = &node.kind {
                    if *kind != CompositeKind::ComplementedList {
                        let violating = children.iter().any(|child| {
                            matches!(
                                child.effective().match_kind(),
                                MatchKind::Omit | MatchKind::AnyOrOmit
                            )
                        });
                        return Some(!violating);
                    }
                }
                Some(true)
            }
            _ => Some(true),
        },
    }
}
