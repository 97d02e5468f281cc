//! The structural compatibility checker: one exhaustive dispatch over the
//! template tree, assigning governors and validating every variant's
//! legality rules.
//!
//! Rule violations never unwind. Each one reports a diagnostic, marks the
//! offending node erroneous, and checking continues with best-effort
//! defaults so a single pass can surface many diagnostics.

use std::rc::Rc;

use tracing::debug;

use crate::check::codes;
use crate::check::resolver::{ReferenceChain, Resolver, reference_span};
use crate::context::CompileContext;
use crate::error::ReparseAborted;
use crate::module::{DefId, FormalPar, FormalParKind, ModuleId, ModuleRegistry};
use crate::syntax::expr::{Expr, ExprKind};
use crate::syntax::reference::{Reference, SubRef};
use crate::template::{
    CompositeKind, LengthFit, NamedEntry, PatternKind, TemplateInstance, TemplateKind,
    TemplateNode,
};
use crate::types::{CompatibilityInfo, Type, TypeKind};

/// Per-call flags of the `check` operation.
#[derive(Debug, Clone)]
pub struct CheckArgs {
    pub governor: Rc<Type>,
    pub is_modified: bool,
    pub allow_omit: bool,
    pub allow_any_or_omit: bool,
    pub needs_subtype_check: bool,
    pub implicit_omit: bool,
    pub lhs: Option<DefId>,
}

impl CheckArgs {
    #[must_use]
    pub fn new(governor: Rc<Type>) -> Self {
        Self {
            governor,
            is_modified: false,
            allow_omit: false,
            allow_any_or_omit: false,
            needs_subtype_check: false,
            implicit_omit: false,
            lhs: None,
        }
    }

    #[must_use]
    pub fn modified(mut self) -> Self {
        self.is_modified = true;
        self
    }

    #[must_use]
    pub fn allowing_omit(mut self) -> Self {
        self.allow_omit = true;
        self
    }

    #[must_use]
    pub fn allowing_any_or_omit(mut self) -> Self {
        self.allow_any_or_omit = true;
        self
    }

    #[must_use]
    pub fn with_subtype_check(mut self) -> Self {
        self.needs_subtype_check = true;
        self
    }

    #[must_use]
    pub fn with_implicit_omit(mut self) -> Self {
        self.implicit_omit = true;
        self
    }

    #[must_use]
    pub fn with_lhs(mut self, lhs: DefId) -> Self {
        self.lhs = Some(lhs);
        self
    }

    fn for_child(&self, governor: Rc<Type>) -> Self {
        Self {
            governor,
            is_modified: false,
            allow_omit: false,
            allow_any_or_omit: false,
            needs_subtype_check: false,
            implicit_omit: self.implicit_omit,
            lhs: self.lhs,
        }
    }
}

/// Walks a template tree top-down, assigning governors and validating.
#[derive(Debug, Clone, Copy)]
pub struct TemplateChecker<'a> {
    registry: &'a ModuleRegistry,
    module: ModuleId,
}

impl<'a> TemplateChecker<'a> {
    #[must_use]
    pub fn new(registry: &'a ModuleRegistry, module: ModuleId) -> Self {
        Self { registry, module }
    }

    fn resolver(&self) -> Resolver<'a> {
        Resolver::new(self.registry, self.module)
    }

    /// Check one template node against its governor. Returns whether the
    /// node (directly or through a reference) mentions the definition
    /// being defined.
    pub fn check(
        &self,
        ctx: &mut CompileContext<'_>,
        node: &Rc<TemplateNode>,
        args: &CheckArgs,
    ) -> Result<bool, ReparseAborted> {
        let node = node.effective();
        if node.is_erroneous() {
            return Ok(false);
        }
        if node
            .checked_at()
            .is_some_and(|version| version >= ctx.version)
        {
            return Ok(false);
        }
        node.mark_checked(ctx.version);
        debug!(node = node.describe(), governor = %args.governor, "checking template");
        node.set_governor(Rc::clone(&args.governor), ctx.sink);

        if let Some(restriction) = &node.length_restriction {
            restriction.validate(node.span, ctx.sink);
        }

        let self_reference = match &node.kind {
            TemplateKind::SpecificValue(expr) => {
                self.check_specific_value(ctx, &node, expr, args)?
            }
            TemplateKind::AnyValue => {
                self.reject_signature_wildcard(ctx, &node, args);
                false
            }
            TemplateKind::AnyOrOmit => {
                self.reject_signature_wildcard(ctx, &node, args);
                if !args.allow_any_or_omit {
                    report(ctx, &node, codes::ANY_OR_OMIT_NOT_ALLOWED,
                        "`*` is not allowed in this context");
                }
                false
            }
            TemplateKind::OmitValue => {
                if !args.allow_omit {
                    report(ctx, &node, codes::OMIT_NOT_ALLOWED,
                        "`omit` is only allowed for optional fields");
                }
                if node.length_restriction.is_some() {
                    report(ctx, &node, codes::LENGTH_ON_OMIT,
                        "an omitted value has no length; length restriction is not applicable");
                }
                if node.if_present {
                    report(ctx, &node, codes::IFPRESENT_CONTEXT,
                        "`ifpresent` cannot be attached to `omit`");
                }
                false
            }
            TemplateKind::NotUsed => false,
            TemplateKind::Pattern(_) => {
                self.check_pattern(ctx, &node, args);
                false
            }
            TemplateKind::ValueRange(_) => {
                self.check_value_range(ctx, &node, args);
                false
            }
            TemplateKind::Composite { kind, children } => {
                self.check_composite(ctx, &node, *kind, children, args)?
            }
            TemplateKind::NamedList(entries) => {
                self.check_named_list(ctx, &node, entries, args)?
            }
            TemplateKind::AllFrom(_) => {
                report(ctx, &node, codes::ALL_FROM_CONTEXT,
                    "`all from` is only allowed inside a template list");
                false
            }
            TemplateKind::Referenced(reference) => {
                self.check_referenced(ctx, &node, reference, args)?
            }
            TemplateKind::DecodeMatch { encoding, target } => {
                self.check_decode_match(ctx, &node, encoding.as_ref(), target, args)?
            }
            TemplateKind::Invoke { callee, actuals } => {
                self.check_invoke(ctx, &node, callee, actuals, args)?
            }
        };

        if args.needs_subtype_check && !node.is_erroneous() {
            if let Some(subtype) = &args.governor.subtype {
                subtype.check_template(&node, &args.governor.display_name(), ctx.sink);
            }
        }
        Ok(self_reference)
    }

    /// The type a node would present when used inside a value expression,
    /// computed without permanently mutating checker state.
    pub fn expression_governor(
        &self,
        node: &Rc<TemplateNode>,
    ) -> Result<Option<Rc<Type>>, ReparseAborted> {
        let node = node.effective();
        if let Some(governor) = node.governor() {
            return Ok(Some(governor));
        }
        match &node.kind {
            TemplateKind::SpecificValue(expr) => self.expression_type(expr),
            TemplateKind::Pattern(pattern) => Ok(Some(match pattern.kind {
                PatternKind::Bitstring => Type::bitstring(),
                PatternKind::Hexstring => Type::hexstring(),
                PatternKind::Octetstring => Type::octetstring(),
                PatternKind::Charstring => Type::charstring(),
                PatternKind::UniversalCharstring => Type::universal_charstring(),
            })),
            // First non-null governor among the children: list templates
            // built from heterogeneous-looking literals infer bottom-up.
            TemplateKind::Composite { children, .. } => {
                for child in children {
                    if let Some(governor) = self.expression_governor(child)? {
                        return Ok(Some(governor));
                    }
                }
                Ok(None)
            }
            TemplateKind::Referenced(reference) => {
                let Some(def_id) = self.resolver().lookup(reference)? else {
                    return Ok(None);
                };
                let declared = self.registry.def(def_id).declared_type();
                Ok(declared.and_then(|ty| type_through_subrefs(&ty, &reference.subrefs)))
            }
            TemplateKind::Invoke { callee, .. } => self.expression_type(callee),
            _ => Ok(None),
        }
    }

    fn expression_type(&self, expr: &Expr) -> Result<Option<Rc<Type>>, ReparseAborted> {
        if let Some(ty) = literal_type(expr) {
            return Ok(Some(ty));
        }
        match &expr.kind {
            ExprKind::Name(name) => {
                let reference = Reference::new(name.clone());
                match self.resolver().lookup(&reference)? {
                    Some(def_id) => Ok(self.registry.def(def_id).declared_type()),
                    None => Ok(None),
                }
            }
            ExprKind::Ref(reference) => match self.resolver().lookup(reference)? {
                Some(def_id) => {
                    let declared = self.registry.def(def_id).declared_type();
                    Ok(declared.and_then(|ty| type_through_subrefs(&ty, &reference.subrefs)))
                }
                None => Ok(None),
            },
            ExprKind::Apply { callee, .. } => self.expression_type(callee),
            _ => Ok(None),
        }
    }

    fn check_specific_value(
        &self,
        ctx: &mut CompileContext<'_>,
        node: &Rc<TemplateNode>,
        expr: &Expr,
        args: &CheckArgs,
    ) -> Result<bool, ReparseAborted> {
        // A bare lower-case identifier may turn out to be a reference, an
        // enumerated value, or nothing at all. A call expression becomes
        // an invocation. Both rewrites are cached on the original node.
        match &expr.kind {
            ExprKind::Name(name) => {
                if let TypeKind::Enumerated(variants) = &args.governor.kind {
                    if variants.iter().any(|variant| variant == name) {
                        return Ok(false);
                    }
                }
                let reference = Reference::new(name.clone());
                if self.resolver().lookup(&reference)?.is_some() {
                    let mut rewritten =
                        TemplateNode::new(TemplateKind::Referenced(reference));
                    rewritten.span = node.span.or(expr.span);
                    let rewritten = Rc::new(rewritten);
                    node.set_rewritten(Rc::clone(&rewritten));
                    return self.check(ctx, &rewritten, args);
                }
                report(ctx, node, codes::VALUE_UNRESOLVED,
                    format!("`{name}` is not a value of type `{}` and does not name \
                             any definition", args.governor.display_name()));
                Ok(false)
            }
            ExprKind::Ref(reference) => {
                let mut rewritten =
                    TemplateNode::new(TemplateKind::Referenced(reference.clone()));
                rewritten.span = node.span.or(expr.span);
                let rewritten = Rc::new(rewritten);
                node.set_rewritten(Rc::clone(&rewritten));
                self.check(ctx, &rewritten, args)
            }
            ExprKind::Apply { callee, args: call_args } => {
                let actuals = call_args
                    .iter()
                    .map(|arg| {
                        TemplateInstance::new(
                            None,
                            Rc::new(TemplateNode::new(TemplateKind::SpecificValue(
                                arg.clone(),
                            ))),
                        )
                    })
                    .collect();
                let mut rewritten = TemplateNode::new(TemplateKind::Invoke {
                    callee: (**callee).clone(),
                    actuals,
                });
                rewritten.span = node.span.or(expr.span);
                let rewritten = Rc::new(rewritten);
                node.set_rewritten(Rc::clone(&rewritten));
                self.check(ctx, &rewritten, args)
            }
            _ => {
                if let Some(value_ty) = literal_type(expr) {
                    let mut info = CompatibilityInfo::new();
                    if !value_ty.is_compatible(&args.governor, &mut info) {
                        report(ctx, node, codes::TYPE_MISMATCH,
                            format!("{} value is not compatible with type `{}`: {}",
                                value_ty.display_name(),
                                args.governor.display_name(),
                                info.error_message()));
                    }
                }
                Ok(false)
            }
        }
    }

    fn reject_signature_wildcard(
        &self,
        ctx: &mut CompileContext<'_>,
        node: &Rc<TemplateNode>,
        args: &CheckArgs,
    ) {
        if args.governor.is_signature() {
            report(ctx, node, codes::SIGNATURE_WILDCARD,
                format!("{} cannot be used for a signature", node.describe()));
        }
    }

    fn check_pattern(
        &self,
        ctx: &mut CompileContext<'_>,
        node: &Rc<TemplateNode>,
        args: &CheckArgs,
    ) {
        let TemplateKind::Pattern(pattern) = &node.kind else {
            return;
        };
        let expected = match args.governor.kind {
            TypeKind::Bitstring => Some(PatternKind::Bitstring),
            TypeKind::Hexstring => Some(PatternKind::Hexstring),
            TypeKind::Octetstring => Some(PatternKind::Octetstring),
            TypeKind::Charstring => Some(PatternKind::Charstring),
            TypeKind::UniversalCharstring => Some(PatternKind::UniversalCharstring),
            _ => None,
        };
        match expected {
            None => {
                report(ctx, node, codes::PATTERN_KIND_MISMATCH,
                    format!("a {} pattern cannot match values of type `{}`",
                        pattern.kind.display_name(),
                        args.governor.display_name()));
                return;
            }
            Some(expected) if expected == pattern.kind => {}
            // A charstring pattern converts into a universal charstring
            // pattern; the conversion product is cached on the original.
            Some(PatternKind::UniversalCharstring)
                if pattern.kind == PatternKind::Charstring =>
            {
                let mut converted =
                    TemplateNode::new(TemplateKind::Pattern(pattern.into_universal()));
                converted.span = node.span;
                let converted = Rc::new(converted);
                converted.set_governor(Rc::clone(&args.governor), ctx.sink);
                converted.mark_checked(ctx.version);
                node.set_converted(converted);
            }
            Some(_) => {
                report(ctx, node, codes::PATTERN_KIND_MISMATCH,
                    format!("{} pattern used where `{}` is expected",
                        pattern.kind.display_name(),
                        args.governor.display_name()));
                return;
            }
        }
        if !pattern.kind.is_character_kind() && !pattern.embedded_refs().is_empty() {
            report(ctx, node, codes::PATTERN_REFERENCE,
                "only character-string patterns may embed references");
        }
        if let Some(restriction) = &node.length_restriction {
            let min = pattern.min_length() as u64;
            let fit = if pattern.has_wildcard() {
                restriction.fit_at_least(min)
            } else {
                restriction.fit(min)
            };
            if fit == LengthFit::Rejects {
                report(ctx, node, codes::LENGTH_MISMATCH,
                    format!("pattern matches at least {min} elements, which violates {}",
                        restriction.display()));
            }
        }
    }

    fn check_value_range(
        &self,
        ctx: &mut CompileContext<'_>,
        node: &Rc<TemplateNode>,
        args: &CheckArgs,
    ) {
        let TemplateKind::ValueRange(range) = &node.kind else {
            return;
        };
        let governor = &args.governor;
        let range_capable = governor.is_numeric()
            || matches!(
                governor.kind,
                TypeKind::Charstring | TypeKind::UniversalCharstring
            );
        if !range_capable {
            report(ctx, node, codes::TYPE_MISMATCH,
                format!("range matching is not defined for type `{}`",
                    governor.display_name()));
            return;
        }
        for bound in [range.lower.as_ref(), range.upper.as_ref()]
            .into_iter()
            .flatten()
        {
            if bound.as_infinity().is_some() {
                if !governor.is_numeric() {
                    report(ctx, node, codes::RANGE_INFINITY_BOUND,
                        format!("`infinity` bounds are only allowed for numeric ranges, \
                                 not `{}`", governor.display_name()));
                }
                continue;
            }
            if let Some(bound_ty) = literal_type(bound) {
                let mut info = CompatibilityInfo::new();
                if !bound_ty.is_compatible(governor, &mut info) {
                    report(ctx, node, codes::RANGE_BOUND_TYPE,
                        format!("range bound of type {} does not fit type `{}`",
                            bound_ty.display_name(),
                            governor.display_name()));
                }
            }
        }
        if let (Some(lower), Some(upper)) = (
            range.lower.as_ref().and_then(Expr::as_const_int),
            range.upper.as_ref().and_then(Expr::as_const_int),
        ) {
            if lower > upper {
                report(ctx, node, codes::RANGE_BOUNDS_REVERSED,
                    format!("lower bound {lower} is greater than upper bound {upper}"));
            }
        }
    }

    fn check_composite(
        &self,
        ctx: &mut CompileContext<'_>,
        node: &Rc<TemplateNode>,
        kind: CompositeKind,
        children: &[Rc<TemplateNode>],
        args: &CheckArgs,
    ) -> Result<bool, ReparseAborted> {
        if kind == CompositeKind::Permutation {
            report(ctx, node, codes::PERMUTATION_CONTEXT,
                "permutation is only allowed directly inside a value list, subset or \
                 superset");
            return Ok(false);
        }
        // A value list against a record/set governor is really a field
        // list in declaration order; convert and check the shadow.
        if kind == CompositeKind::ValueList
            && matches!(args.governor.kind, TypeKind::Record(_) | TypeKind::Set(_))
        {
            return self.convert_to_named_list(ctx, node, children, args);
        }
        if matches!(kind, CompositeKind::Subset | CompositeKind::Superset)
            && !args.governor.is_set_of()
        {
            report(ctx, node, codes::LIST_GOVERNOR_EXPECTED,
                format!("{} is only defined for `set of` types, not `{}`",
                    kind.display_name(),
                    args.governor.display_name()));
        }
        let element_governor = args
            .governor
            .element_type()
            .unwrap_or_else(|| Rc::clone(&args.governor));
        let is_list_context = args.governor.element_type().is_some();

        let mut self_reference = false;
        for child in children {
            self_reference |=
                self.check_list_child(ctx, child, &element_governor, is_list_context, args)?;
        }

        if is_list_context && node.length_restriction.is_some() {
            self.check_list_length(ctx, node, kind, children)?;
        }
        Ok(self_reference)
    }

    fn check_list_child(
        &self,
        ctx: &mut CompileContext<'_>,
        child: &Rc<TemplateNode>,
        element_governor: &Rc<Type>,
        is_list_context: bool,
        args: &CheckArgs,
    ) -> Result<bool, ReparseAborted> {
        let effective = child.effective();
        match &effective.kind {
            TemplateKind::AllFrom(_) => {
                // Wildcards are never tolerated in an expanded list, even
                // though ordinary children of this composite may use them.
                self.check_all_from(ctx, &effective, element_governor, false)?;
                Ok(false)
            }
            TemplateKind::Composite {
                kind: CompositeKind::Permutation,
                children: permuted,
            } => {
                if !is_list_context {
                    report(ctx, &effective, codes::PERMUTATION_CONTEXT,
                        "permutation elements need a list-typed governor");
                    return Ok(false);
                }
                effective.mark_checked(ctx.version);
                let mut self_reference = false;
                for element in permuted {
                    self_reference |= self.check_list_child(
                        ctx,
                        element,
                        element_governor,
                        is_list_context,
                        args,
                    )?;
                }
                Ok(self_reference)
            }
            _ => {
                // Composite children may use wildcards even when the
                // parent context disallows them.
                let child_args = args
                    .for_child(Rc::clone(element_governor))
                    .allowing_any_or_omit();
                self.check(ctx, child, &child_args)
            }
        }
    }

    fn convert_to_named_list(
        &self,
        ctx: &mut CompileContext<'_>,
        node: &Rc<TemplateNode>,
        children: &[Rc<TemplateNode>],
        args: &CheckArgs,
    ) -> Result<bool, ReparseAborted> {
        let fields = args.governor.fields().unwrap_or_default();
        if children.len() > fields.len() {
            report(ctx, node, codes::TOO_MANY_ELEMENTS,
                format!("too many elements: type `{}` has {} fields, template lists {}",
                    args.governor.display_name(),
                    fields.len(),
                    children.len()));
            return Ok(false);
        }
        let entries: Vec<NamedEntry> = fields
            .iter()
            .zip(children)
            .map(|(field, child)| NamedEntry {
                name: field.name.clone(),
                span: child.span,
                node: Rc::clone(child),
            })
            .collect();
        let mut converted = TemplateNode::new(TemplateKind::NamedList(entries));
        converted.span = node.span;
        converted.length_restriction = node.length_restriction.clone();
        converted.if_present = node.if_present;
        let converted = Rc::new(converted);
        node.set_converted(Rc::clone(&converted));
        self.check(ctx, &converted, args)
    }

    /// The single most important domain legality rule: the referenced
    /// body of an `all from` must be a list, and its elements must not be
    /// wildcards or permutations. The violation is checked (and reported)
    /// on the referenced body, never on the wrapping `all from` node.
    fn check_all_from(
        &self,
        ctx: &mut CompileContext<'_>,
        node: &Rc<TemplateNode>,
        element_governor: &Rc<Type>,
        allow_any_or_omit: bool,
    ) -> Result<(), ReparseAborted> {
        let TemplateKind::AllFrom(inner) = &node.kind else {
            return Ok(());
        };
        node.mark_checked(ctx.version);
        let inner = inner.effective();
        let reference = match &inner.kind {
            TemplateKind::Referenced(reference) => reference.clone(),
            TemplateKind::SpecificValue(expr) => match &expr.kind {
                ExprKind::Name(name) => Reference::new(name.clone()),
                ExprKind::Ref(reference) => reference.clone(),
                _ => {
                    report(ctx, node, codes::ALL_FROM_TARGET,
                        "`all from` must refer to a template or value of list type");
                    return Ok(());
                }
            },
            _ => {
                report(ctx, node, codes::ALL_FROM_TARGET,
                    "`all from` must refer to a template or value of list type");
                return Ok(());
            }
        };
        let Some(def_id) = self.resolver().lookup(&reference)? else {
            // Unresolved: deferred to runtime indexing, not an error.
            return Ok(());
        };
        let definition = self.registry.def(def_id);
        if let Some(declared) = definition.declared_type() {
            let projected = type_through_subrefs(&declared, &reference.subrefs);
            match projected {
                Some(ty) if ty.is_list_kind() => {
                    if let Some(element) = ty.element_type() {
                        let mut info = CompatibilityInfo::new();
                        if !element.is_compatible(element_governor, &mut info) {
                            report(ctx, node, codes::TYPE_MISMATCH,
                                format!("elements of `{}` are not compatible with `{}`: {}",
                                    reference.display_name(),
                                    element_governor.display_name(),
                                    info.error_message()));
                        }
                    }
                }
                Some(ty) => {
                    report(ctx, node, codes::ALL_FROM_TARGET,
                        format!("`all from` needs a list-typed operand, but `{}` has \
                                 type `{}`",
                            reference.display_name(),
                            ty.display_name()));
                    return Ok(());
                }
                None => return Ok(()),
            }
        }
        let Some(body) = definition.body() else {
            return Ok(());
        };
        let mut chain = ReferenceChain::new();
        let resolved = self
            .resolver()
            .resolve_last(&body, &mut chain, ctx.sink)?;
        if allow_any_or_omit {
            return Ok(());
        }
        if let TemplateKind::Composite { children, .. } = &resolved.kind {
            for element in children {
                let element = element.effective();
                let illegal = match &element.kind {
                    TemplateKind::AnyValue | TemplateKind::AnyOrOmit => true,
                    TemplateKind::Composite { kind, .. } => {
                        *kind == CompositeKind::Permutation
                    }
                    _ => false,
                };
                if illegal {
                    ctx.sink.report_error(
                        element.span.or(resolved.span),
                        format!(
                            "wildcard or permutation is not allowed after `all from` \
                             (in the body of `{}`)",
                            reference.display_name()
                        ),
                        codes::ALL_FROM_WILDCARD,
                    );
                    node.set_erroneous();
                }
            }
        }
        Ok(())
    }

    fn check_list_length(
        &self,
        ctx: &mut CompileContext<'_>,
        node: &Rc<TemplateNode>,
        kind: CompositeKind,
        children: &[Rc<TemplateNode>],
    ) -> Result<(), ReparseAborted> {
        let Some(restriction) = &node.length_restriction else {
            return Ok(());
        };
        let count = self.count_non_wildcard_elements(ctx, children)?;
        if !count.known {
            // Somewhere an `all from` could not be resolved statically;
            // the generated code carries the check instead.
            return Ok(());
        }
        let fit = match kind {
            CompositeKind::ValueList if !count.has_any_or_none => restriction.fit(count.count),
            CompositeKind::ValueList | CompositeKind::Superset => {
                restriction.fit_at_least(count.count)
            }
            CompositeKind::Subset => match restriction.const_bounds() {
                Some((lower, _)) if lower > count.count => LengthFit::Rejects,
                Some(_) => LengthFit::Accepts,
                None => LengthFit::Inconclusive,
            },
            _ => LengthFit::Accepts,
        };
        if fit == LengthFit::Rejects {
            report(ctx, node, codes::LENGTH_MISMATCH,
                format!("{} has {} elements, which violates {}",
                    kind.display_name(),
                    count.count,
                    restriction.display()));
        }
        Ok(())
    }

    /// Count list elements, excluding any-or-none wildcards, expanding
    /// permutations, and delegating `all from` contributions to the
    /// referenced list's own count.
    fn count_non_wildcard_elements(
        &self,
        ctx: &mut CompileContext<'_>,
        children: &[Rc<TemplateNode>],
    ) -> Result<ElementCount, ReparseAborted> {
        let mut total = ElementCount::default();
        for child in children {
            let child = child.effective();
            match &child.kind {
                TemplateKind::AnyOrOmit => total.has_any_or_none = true,
                TemplateKind::Composite {
                    kind: CompositeKind::Permutation,
                    children: permuted,
                } => {
                    let inner = self.count_non_wildcard_elements(ctx, permuted)?;
                    total.merge(inner);
                }
                TemplateKind::AllFrom(inner) => {
                    match self.all_from_static_count(ctx, inner)? {
                        Some(count) => total.count += count,
                        None => total.known = false,
                    }
                }
                _ => total.count += 1,
            }
        }
        Ok(total)
    }

    fn all_from_static_count(
        &self,
        ctx: &mut CompileContext<'_>,
        inner: &Rc<TemplateNode>,
    ) -> Result<Option<u64>, ReparseAborted> {
        let mut chain = ReferenceChain::new();
        let resolved = self
            .resolver()
            .resolve_last(inner, &mut chain, ctx.sink)?;
        if let TemplateKind::Composite { children, .. } = &resolved.kind {
            let counted = self.count_non_wildcard_elements(ctx, children)?;
            if counted.known && !counted.has_any_or_none {
                return Ok(Some(counted.count));
            }
        }
        Ok(None)
    }

    fn check_named_list(
        &self,
        ctx: &mut CompileContext<'_>,
        node: &Rc<TemplateNode>,
        entries: &[NamedEntry],
        args: &CheckArgs,
    ) -> Result<bool, ReparseAborted> {
        let governor = &args.governor;
        if governor.fields().is_none() {
            report(ctx, node, codes::TYPE_MISMATCH,
                format!("type `{}` has no fields to assign", governor.display_name()));
            return Ok(false);
        }
        if governor.is_union() && entries.len() != 1 {
            report(ctx, node, codes::UNION_FIELD_COUNT,
                format!("a union template must assign exactly one alternative, found {}",
                    entries.len()));
        }
        let mut self_reference = false;
        for entry in entries {
            let Some(field) = governor.field(&entry.name) else {
                // Unknown field names are a type mismatch, never silently
                // ignored.
                ctx.sink.report_error(
                    entry.span.or(node.span),
                    format!("type `{}` has no field named `{}`",
                        governor.display_name(),
                        entry.name),
                    codes::FIELD_UNKNOWN,
                );
                node.set_erroneous();
                continue;
            };
            if governor.is_signature() {
                let child = entry.node.effective();
                if matches!(
                    child.kind,
                    TemplateKind::AnyValue | TemplateKind::AnyOrOmit | TemplateKind::OmitValue
                ) {
                    ctx.sink.report_error(
                        child.span.or(entry.span),
                        format!("`{}` cannot be used for parameter `{}` of a signature",
                            child.describe(),
                            entry.name),
                        codes::SIGNATURE_WILDCARD,
                    );
                    node.set_erroneous();
                    continue;
                }
            }
            let mut child_args = args.for_child(Rc::clone(&field.ty));
            child_args.needs_subtype_check = args.needs_subtype_check;
            if field.optional && !governor.is_signature() {
                child_args = child_args.allowing_omit().allowing_any_or_omit();
            }
            self_reference |= self.check(ctx, &entry.node, &child_args)?;
        }
        if !args.is_modified && !governor.is_union() && !governor.is_signature() {
            self.check_field_completeness(ctx, node, entries, args)?;
        }
        Ok(self_reference)
    }

    fn check_field_completeness(
        &self,
        ctx: &mut CompileContext<'_>,
        node: &Rc<TemplateNode>,
        entries: &[NamedEntry],
        args: &CheckArgs,
    ) -> Result<(), ReparseAborted> {
        let governor = &args.governor;
        let Some(fields) = governor.fields() else {
            return Ok(());
        };
        let mut implicit: Vec<NamedEntry> = Vec::new();
        for field in fields {
            if entries.iter().any(|entry| entry.name == field.name) {
                continue;
            }
            if field.optional && args.implicit_omit {
                // Unlisted optional fields complete to `omit`.
                let omit = Rc::new(TemplateNode::new(TemplateKind::OmitValue));
                omit.set_governor(Rc::clone(&field.ty), ctx.sink);
                omit.mark_checked(ctx.version);
                implicit.push(NamedEntry::new(field.name.clone(), omit));
            } else {
                report(ctx, node, codes::FIELD_MISSING,
                    format!("field `{}` of type `{}` is not assigned",
                        field.name,
                        governor.display_name()));
            }
        }
        if !implicit.is_empty() {
            let mut completed: Vec<NamedEntry> = entries.to_vec();
            completed.extend(implicit);
            let mut converted = TemplateNode::new(TemplateKind::NamedList(completed));
            converted.span = node.span;
            converted.length_restriction = node.length_restriction.clone();
            converted.if_present = node.if_present;
            let converted = Rc::new(converted);
            converted.set_governor(Rc::clone(governor), ctx.sink);
            converted.mark_checked(ctx.version);
            node.set_converted(converted);
        }
        Ok(())
    }

    fn check_referenced(
        &self,
        ctx: &mut CompileContext<'_>,
        node: &Rc<TemplateNode>,
        reference: &Reference,
        args: &CheckArgs,
    ) -> Result<bool, ReparseAborted> {
        if node.if_present && !args.allow_omit {
            report(ctx, node, codes::IFPRESENT_CONTEXT,
                "`ifpresent` is only allowed where the field may be omitted");
        }
        let Some(def_id) = self.resolver().lookup(reference)? else {
            // Unresolved symbol: deferred to runtime, not an error here.
            debug!(reference = %reference.display_name(), "unresolved template reference");
            return Ok(false);
        };
        let definition = self.registry.def(def_id);
        let self_reference = args.lhs == Some(def_id);

        if let Some(declared) = definition.declared_type() {
            if let Some(static_ty) = type_through_subrefs(&declared, &reference.subrefs) {
                let mut info = CompatibilityInfo::new();
                if !static_ty.is_compatible(&args.governor, &mut info) {
                    ctx.sink.report_error(
                        reference_span(node),
                        format!("`{}` of type `{}` is not compatible with `{}`: {}",
                            reference.display_name(),
                            static_ty.display_name(),
                            args.governor.display_name(),
                            info.error_message()),
                        codes::TYPE_MISMATCH,
                    );
                    node.set_erroneous();
                    return Ok(self_reference);
                }
            }
        }

        if definition.is_parameterized() {
            self.check_actuals(ctx, node, reference, definition.formal_params(), args)?;
            return Ok(self_reference);
        }

        // Delegate to the resolved body; the version gate keeps shared
        // bodies from being re-checked or re-reported.
        if def_id.module == self.module && !self_reference {
            let mut chain = ReferenceChain::new();
            let resolved = self.resolver().resolve_last(node, &mut chain, ctx.sink)?;
            if !Rc::ptr_eq(&resolved, &node.effective()) {
                if let Some(declared) = definition.declared_type() {
                    let body_args = CheckArgs {
                        governor: type_through_subrefs(&declared, &reference.subrefs)
                            .unwrap_or(declared),
                        is_modified: false,
                        allow_omit: args.allow_omit,
                        allow_any_or_omit: args.allow_any_or_omit,
                        needs_subtype_check: false,
                        implicit_omit: false,
                        lhs: args.lhs,
                    };
                    return Ok(self_reference
                        | self.check(ctx, &resolved, &body_args)?);
                }
            }
        }
        Ok(self_reference)
    }

    fn check_actuals(
        &self,
        ctx: &mut CompileContext<'_>,
        node: &Rc<TemplateNode>,
        reference: &Reference,
        formals: Option<&[FormalPar]>,
        args: &CheckArgs,
    ) -> Result<(), ReparseAborted> {
        let formals = formals.unwrap_or_default();
        let actuals = reference.actuals.as_deref().unwrap_or_default();
        if actuals.len() > formals.len() {
            report(ctx, node, codes::PARAM_COUNT_MISMATCH,
                format!("`{}` takes {} parameters, {} given",
                    reference.name,
                    formals.len(),
                    actuals.len()));
            return Ok(());
        }
        for (formal, actual) in formals.iter().zip(actuals) {
            let governor = actual
                .ty
                .clone()
                .unwrap_or_else(|| Rc::clone(&formal.ty));
            let mut child_args = args.for_child(governor);
            if formal.kind == FormalParKind::Template {
                child_args = child_args.allowing_omit().allowing_any_or_omit();
            }
            self.check(ctx, &actual.template, &child_args)?;
        }
        for formal in formals.iter().skip(actuals.len()) {
            if formal.default.is_none() {
                report(ctx, node, codes::PARAM_COUNT_MISMATCH,
                    format!("no actual value given for parameter `{}` of `{}`",
                        formal.name,
                        reference.name));
            }
        }
        Ok(())
    }

    fn check_decode_match(
        &self,
        ctx: &mut CompileContext<'_>,
        node: &Rc<TemplateNode>,
        encoding: Option<&Expr>,
        target: &TemplateInstance,
        args: &CheckArgs,
    ) -> Result<bool, ReparseAborted> {
        if !args.governor.is_string_kind() {
            report(ctx, node, codes::DECMATCH_CARRIER,
                format!("decoded content matching needs a string carrier, not `{}`",
                    args.governor.display_name()));
        }
        if encoding.is_some()
            && !matches!(args.governor.kind, TypeKind::UniversalCharstring)
        {
            report(ctx, node, codes::DECMATCH_ENCODING,
                "an encoding selector is only allowed when decoding a universal \
                 charstring");
        }
        let Some(target_ty) = target.ty.clone() else {
            report(ctx, node, codes::DECMATCH_TARGET_TYPE,
                "cannot determine the type to decode into; an explicit type is required");
            return Ok(false);
        };
        // The target template is checked against the decoded type, not
        // against the carrier governor.
        let target_args = CheckArgs {
            governor: target_ty,
            is_modified: false,
            allow_omit: false,
            allow_any_or_omit: true,
            needs_subtype_check: false,
            implicit_omit: false,
            lhs: args.lhs,
        };
        self.check(ctx, &target.template, &target_args)
    }

    fn check_invoke(
        &self,
        ctx: &mut CompileContext<'_>,
        node: &Rc<TemplateNode>,
        callee: &Expr,
        actuals: &[TemplateInstance],
        args: &CheckArgs,
    ) -> Result<bool, ReparseAborted> {
        let reference = match &callee.kind {
            ExprKind::Name(name) => Reference::new(name.clone()),
            ExprKind::Ref(reference) => reference.clone(),
            _ => {
                report(ctx, node, codes::INVOKE_NOT_FUNCTION,
                    "the invoked expression does not name a function");
                return Ok(false);
            }
        };
        let Some(def_id) = self.resolver().lookup(&reference)? else {
            report(ctx, node, codes::INVOKE_NOT_FUNCTION,
                format!("`{}` does not name a function", reference.display_name()));
            return Ok(false);
        };
        let definition = self.registry.def(def_id);
        if !definition.is_function() {
            report(ctx, node, codes::INVOKE_NOT_FUNCTION,
                format!("`{}` is a {}, not a function",
                    reference.display_name(),
                    definition.describe()));
            return Ok(false);
        }
        let Some(return_ty) = definition.declared_type() else {
            report(ctx, node, codes::INVOKE_NO_RETURN,
                format!("function `{}` does not return a value or template",
                    reference.display_name()));
            return Ok(false);
        };
        let mut info = CompatibilityInfo::new();
        if !return_ty.is_compatible(&args.governor, &mut info) {
            report(ctx, node, codes::TYPE_MISMATCH,
                format!("return type `{}` of `{}` is not compatible with `{}`: {}",
                    return_ty.display_name(),
                    reference.display_name(),
                    args.governor.display_name(),
                    info.error_message()));
        }
        let mut self_reference = false;
        let formals = definition.formal_params().unwrap_or_default();
        if actuals.len() != formals.len()
            && formals
                .iter()
                .skip(actuals.len())
                .any(|formal| formal.default.is_none())
        {
            report(ctx, node, codes::PARAM_COUNT_MISMATCH,
                format!("function `{}` takes {} parameters, {} given",
                    reference.display_name(),
                    formals.len(),
                    actuals.len()));
        }
        for (formal, actual) in formals.iter().zip(actuals) {
            let mut child_args = args.for_child(Rc::clone(&formal.ty));
            if formal.kind == FormalParKind::Template {
                child_args = child_args.allowing_omit().allowing_any_or_omit();
            }
            self_reference |= self.check(ctx, &actual.template, &child_args)?;
        }
        Ok(self_reference)
    }
}

/// Count of non-wildcard elements in a template list.
#[derive(Debug, Clone, Copy)]
struct ElementCount {
    count: u64,
    has_any_or_none: bool,
    known: bool,
}

impl Default for ElementCount {
    fn default() -> Self {
        Self {
            count: 0,
            has_any_or_none: false,
            known: true,
        }
    }
}

impl ElementCount {
    fn merge(&mut self, other: ElementCount) {
        self.count += other.count;
        self.has_any_or_none |= other.has_any_or_none;
        self.known &= other.known;
    }
}

/// Static type of a literal value expression.
fn literal_type(expr: &Expr) -> Option<Rc<Type>> {
    match &expr.kind {
        ExprKind::Int(_) => Some(Type::integer()),
        ExprKind::Real(_) | ExprKind::Infinity { .. } => Some(Type::float()),
        ExprKind::Bool(_) => Some(Type::boolean()),
        ExprKind::Charstring(_) => Some(Type::charstring()),
        ExprKind::Bitstring(_) => Some(Type::bitstring()),
        ExprKind::Hexstring(_) => Some(Type::hexstring()),
        ExprKind::Octetstring(_) => Some(Type::octetstring()),
        _ => None,
    }
}

/// Project a declared type through a reference's field/index suffixes.
fn type_through_subrefs(ty: &Rc<Type>, subrefs: &[SubRef]) -> Option<Rc<Type>> {
    let mut current = Rc::clone(ty);
    for subref in subrefs {
        current = match subref {
            SubRef::Field(name) => current.field_type(name)?,
            SubRef::Index(_) => current.element_type()?,
        };
    }
    Some(current)
}

fn report(
    ctx: &mut CompileContext<'_>,
    node: &Rc<TemplateNode>,
    code: &str,
    message: impl Into<String>,
) {
    ctx.sink.report_error(node.span, message, code);
    node.set_erroneous();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::DiagnosticSink;
    use crate::module::{Definition, DefinitionKind, TemplateDef};
    use crate::types::Field;

    fn empty_registry() -> (ModuleRegistry, ModuleId) {
        let mut registry = ModuleRegistry::new();
        let module = registry.add_module("M");
        (registry, module)
    }

    #[test]
    fn expression_governor_prefers_the_first_typed_child() {
        let (registry, module) = empty_registry();
        let checker = TemplateChecker::new(&registry, module);
        let untyped = Rc::new(TemplateNode::new(TemplateKind::AnyValue));
        let typed = Rc::new(TemplateNode::new(TemplateKind::SpecificValue(
            Expr::charstring("x"),
        )));
        let list = Rc::new(TemplateNode::new(TemplateKind::Composite {
            kind: CompositeKind::ValueList,
            children: vec![untyped, typed],
        }));
        let governor = checker.expression_governor(&list).unwrap();
        assert_eq!(governor.map(|ty| ty.display_name()), Some("charstring".into()));
    }

    #[test]
    fn expression_governor_follows_references_and_projections() {
        let (mut registry, module) = empty_registry();
        let msg = Type::record("Msg", vec![Field::new("id", Type::integer())]);
        registry.define(
            module,
            Definition::new(
                "t_msg",
                DefinitionKind::Template(TemplateDef {
                    ty: msg,
                    restriction: None,
                    params: None,
                    body: Rc::new(TemplateNode::new(TemplateKind::AnyValue)),
                }),
            ),
        );
        let checker = TemplateChecker::new(&registry, module);
        let node = Rc::new(TemplateNode::new(TemplateKind::Referenced(
            Reference::new("t_msg").with_field("id"),
        )));
        let governor = checker.expression_governor(&node).unwrap();
        assert_eq!(governor.map(|ty| ty.display_name()), Some("integer".into()));
    }

    #[test]
    fn memoization_skips_a_second_check_at_the_same_version() {
        let (registry, module) = empty_registry();
        let checker = TemplateChecker::new(&registry, module);
        let node = Rc::new(TemplateNode::new(TemplateKind::SpecificValue(
            Expr::charstring("oops"),
        )));
        let args = CheckArgs::new(Type::integer());
        let mut sink = DiagnosticSink::new();
        {
            let mut ctx = crate::context::CompileContext::new(
                crate::context::Version::INITIAL,
                &mut sink,
            );
            checker.check(&mut ctx, &node, &args).unwrap();
            checker.check(&mut ctx, &node, &args).unwrap();
        }
        assert_eq!(sink.error_count(), 1, "{:?}", sink.diagnostics());
        assert!(node.is_erroneous());
    }

    #[test]
    fn type_projection_walks_fields_and_elements() {
        let inner = Type::record("Inner", vec![Field::new("xs", Type::set_of(Type::integer()))]);
        let ty = Type::record("Outer", vec![Field::new("inner", inner)]);
        let projected = type_through_subrefs(
            &ty,
            &[
                SubRef::Field("inner".into()),
                SubRef::Field("xs".into()),
                SubRef::Index(Expr::int(0)),
            ],
        );
        assert_eq!(projected.map(|ty| ty.display_name()), Some("integer".into()));
    }
}
