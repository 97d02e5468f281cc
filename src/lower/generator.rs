//! Lowering templates into target-language matcher-construction
//! statements.
//!
//! Fixed-size constructs emit one statement per element. Variable-length
//! constructs (`all from`, permutations over them) cannot know their
//! element count statically, so they emit a summed size expression, a
//! running offset variable, and counted copy loops. Lowering an erroneous
//! node emits a clearly marked no-op, never malformed output.

use std::rc::Rc;

use tracing::debug;

use crate::check::codes;
use crate::check::resolver::Resolver;
use crate::check::restriction_verdict;
use crate::context::CompileContext;
use crate::error::ReparseAborted;
use crate::lower::buffer::InstructionBuffer;
use crate::module::{DefId, DefinitionKind, ModuleId, ModuleRegistry};
use crate::syntax::expr::{Expr, ExprKind};
use crate::syntax::reference::{Reference, SubRef};
use crate::template::{CompositeKind, TemplateInstance, TemplateKind, TemplateNode};

/// Lowers checked template trees of one module.
#[derive(Debug, Clone, Copy)]
pub struct Generator<'a> {
    registry: &'a ModuleRegistry,
    module: ModuleId,
}

impl<'a> Generator<'a> {
    #[must_use]
    pub fn new(registry: &'a ModuleRegistry, module: ModuleId) -> Self {
        Self { registry, module }
    }

    fn resolver(&self) -> Resolver<'a> {
        Resolver::new(self.registry, self.module)
    }

    /// Emit the initializer of a module-level definition, exactly once
    /// per compile version. References trigger this for their target
    /// before the referencing statement, so initializers always precede
    /// their first use.
    pub fn ensure_definition_lowered(
        &self,
        ctx: &mut CompileContext<'_>,
        buf: &mut InstructionBuffer,
        def_id: DefId,
    ) -> Result<(), ReparseAborted> {
        let definition = self.registry.def(def_id);
        if definition.is_parameterized() {
            // Parameterized templates lower at their call sites.
            return Ok(());
        }
        let (body, is_const) = match &definition.kind {
            DefinitionKind::Template(def) => (Rc::clone(&def.body), false),
            DefinitionKind::VarTemplate {
                initial: Some(initial),
                ..
            } => (Rc::clone(initial), false),
            DefinitionKind::Const { value, .. } => (Rc::clone(value), true),
            _ => return Ok(()),
        };
        let body = body.effective();
        if body
            .lowered_at()
            .is_some_and(|version| version >= ctx.version)
        {
            return Ok(());
        }
        if body
            .checked_at()
            .is_none_or(|version| version < ctx.version)
        {
            ctx.sink.report_internal_error(
                format!(
                    "definition `{}` reached lowering before checking",
                    definition.name
                ),
                codes::INTERNAL_LOWERING,
            );
            return Ok(());
        }
        // Reserve the stamp up front; a self-referencing (erroneous)
        // definition must not re-enter its own emission.
        body.mark_lowered(ctx.version);
        let name = self.registry.target_name(def_id);
        debug!(definition = %definition.name, target = %name, "lowering template definition");
        let class = definition.declared_type().map_or_else(
            || "Base_template".into(),
            |ty| {
                if is_const {
                    ty.value_class_name()
                } else {
                    ty.template_class_name()
                }
            },
        );
        buf.append(format!("{class} {name};"));
        self.lower(ctx, buf, &body, &name)?;
        if let Some(restriction) = definition.restriction() {
            if restriction_verdict(restriction, &body).is_none() {
                // The checker warned; the generated code carries the check.
                buf.append(format!(
                    "{name}.check_restriction(\"{}\");",
                    restriction.display_name()
                ));
            }
        }
        Ok(())
    }

    /// Emit statements constructing `lvalue` from the template.
    pub fn lower(
        &self,
        ctx: &mut CompileContext<'_>,
        buf: &mut InstructionBuffer,
        node: &Rc<TemplateNode>,
        lvalue: &str,
    ) -> Result<(), ReparseAborted> {
        let node = node.effective();
        if node.is_erroneous() {
            buf.append(format!("/* erroneous template */ {lvalue}.clean_up();"));
            node.mark_lowered(ctx.version);
            return Ok(());
        }
        match &node.kind {
            TemplateKind::SpecificValue(expr) => {
                buf.append(format!("{lvalue} = {};", expr.render()));
            }
            TemplateKind::AnyValue => {
                buf.append(format!("{lvalue} = ANY_VALUE;"));
            }
            TemplateKind::AnyOrOmit => {
                buf.append(format!("{lvalue} = ANY_OR_OMIT;"));
            }
            TemplateKind::OmitValue => {
                buf.append(format!("{lvalue} = OMIT_VALUE;"));
            }
            TemplateKind::NotUsed => {}
            TemplateKind::Pattern(pattern) => {
                buf.append(format!(
                    "{lvalue}.set_pattern({}, \"{}\", {});",
                    pattern.kind.target_token(),
                    pattern.text,
                    if pattern.nocase { "TRUE" } else { "FALSE" }
                ));
            }
            TemplateKind::ValueRange(range) => {
                buf.append(format!("{lvalue}.set_type(VALUE_RANGE);"));
                if let Some(lower) = &range.lower {
                    if lower.as_infinity().is_none() {
                        buf.append(format!("{lvalue}.set_min({});", lower.render()));
                        if range.lower_exclusive {
                            buf.append(format!("{lvalue}.set_min_exclusive(TRUE);"));
                        }
                    }
                }
                if let Some(upper) = &range.upper {
                    if upper.as_infinity().is_none() {
                        buf.append(format!("{lvalue}.set_max({});", upper.render()));
                        if range.upper_exclusive {
                            buf.append(format!("{lvalue}.set_max_exclusive(TRUE);"));
                        }
                    }
                }
            }
            TemplateKind::Composite { kind, children } => {
                self.lower_composite(ctx, buf, *kind, children, lvalue)?;
            }
            TemplateKind::NamedList(entries) => {
                if let Some(base) = &node.base_template {
                    // A modified template starts from its base and
                    // overwrites the listed fields.
                    self.lower(ctx, buf, base, lvalue)?;
                }
                self.lower_named_list(ctx, buf, &node, entries, lvalue)?;
            }
            TemplateKind::AllFrom(_) => {
                ctx.sink.report_internal_error(
                    "`all from` outside a template list reached lowering",
                    codes::INTERNAL_LOWERING,
                );
                buf.append(format!("/* erroneous template */ {lvalue}.clean_up();"));
            }
            TemplateKind::Referenced(reference) => {
                self.lower_referenced(ctx, buf, reference, lvalue)?;
            }
            TemplateKind::DecodeMatch { encoding, target } => {
                self.lower_decode_match(ctx, buf, encoding.as_ref(), target, lvalue)?;
            }
            TemplateKind::Invoke { callee, actuals } => {
                let mut rendered = Vec::with_capacity(actuals.len());
                for actual in actuals {
                    rendered.push(self.instance_expr(ctx, buf, actual)?);
                }
                buf.append(format!(
                    "{lvalue} = {}({});",
                    callee.render(),
                    rendered.join(", ")
                ));
            }
        }
        if let Some(restriction) = &node.length_restriction {
            for stmt in restriction.render_setup(lvalue) {
                buf.append(stmt);
            }
        }
        if node.if_present {
            buf.append(format!("{lvalue}.set_ifpresent();"));
        }
        node.mark_lowered(ctx.version);
        Ok(())
    }

    fn lower_composite(
        &self,
        ctx: &mut CompileContext<'_>,
        buf: &mut InstructionBuffer,
        kind: CompositeKind,
        children: &[Rc<TemplateNode>],
        lvalue: &str,
    ) -> Result<(), ReparseAborted> {
        let size = self.size_expression(ctx, buf, children)?;
        buf.append(format!(
            "{lvalue}.set_type({}, {});",
            kind.target_token(),
            size.render()
        ));
        if size.runtime_terms.is_empty() {
            // Fully static: one construction statement per child, with
            // literal indices.
            let mut offset = 0u64;
            for child in children {
                offset = self.lower_static_child(ctx, buf, child, lvalue, offset)?;
            }
        } else {
            let offset_var = ctx.temps.next_named("idx");
            buf.append(format!("int {offset_var} = 0;"));
            for child in children {
                self.lower_dynamic_child(ctx, buf, child, lvalue, &offset_var)?;
            }
        }
        Ok(())
    }

    /// Static expansion: returns the offset after this child.
    fn lower_static_child(
        &self,
        ctx: &mut CompileContext<'_>,
        buf: &mut InstructionBuffer,
        child: &Rc<TemplateNode>,
        lvalue: &str,
        offset: u64,
    ) -> Result<u64, ReparseAborted> {
        let child = child.effective();
        match &child.kind {
            TemplateKind::Composite {
                kind: CompositeKind::Permutation,
                children: permuted,
            } => {
                let start = offset;
                let mut next = offset;
                for element in permuted {
                    next = self.lower_static_child(ctx, buf, element, lvalue, next)?;
                }
                // The group covers exactly its own elements.
                buf.append(format!(
                    "{lvalue}.add_permutation({start}, {});",
                    next.saturating_sub(1)
                ));
                Ok(next)
            }
            _ => {
                self.lower(ctx, buf, &child, &format!("{lvalue}.list_item({offset})"))?;
                Ok(offset + 1)
            }
        }
    }

    /// Dynamic expansion: every child advances the running offset
    /// variable by its runtime element count.
    fn lower_dynamic_child(
        &self,
        ctx: &mut CompileContext<'_>,
        buf: &mut InstructionBuffer,
        child: &Rc<TemplateNode>,
        lvalue: &str,
        offset_var: &str,
    ) -> Result<(), ReparseAborted> {
        let child = child.effective();
        match &child.kind {
            TemplateKind::AllFrom(inner) => {
                let source = self.all_from_source(ctx, buf, inner)?;
                let loop_var = ctx.temps.next_named("i");
                buf.append(format!(
                    "for (int {loop_var} = 0; {loop_var} < {source}.n_elem(); {loop_var}++) {{"
                ));
                buf.append(format!(
                    "{lvalue}.list_item({offset_var}) = {source}.elem({loop_var});"
                ));
                buf.append(format!("{offset_var}++;"));
                buf.append("}".to_string());
            }
            TemplateKind::Composite {
                kind: CompositeKind::Permutation,
                children: permuted,
            } => {
                // Group bounds are the pre-expansion offset and the
                // post-expansion offset minus one; contributions of
                // preceding siblings never leak into the group.
                let start = ctx.temps.next_named("perm_start");
                buf.append(format!("int {start} = {offset_var};"));
                for element in permuted {
                    self.lower_dynamic_child(ctx, buf, element, lvalue, offset_var)?;
                }
                buf.append(format!(
                    "{lvalue}.add_permutation({start}, {offset_var} - 1);"
                ));
            }
            _ => {
                self.lower(
                    ctx,
                    buf,
                    &child,
                    &format!("{lvalue}.list_item({offset_var})"),
                )?;
                buf.append(format!("{offset_var}++;"));
            }
        }
        Ok(())
    }

    /// Fixed element count plus one runtime term per `all from`.
    fn size_expression(
        &self,
        ctx: &mut CompileContext<'_>,
        buf: &mut InstructionBuffer,
        children: &[Rc<TemplateNode>],
    ) -> Result<SizeExpr, ReparseAborted> {
        let mut size = SizeExpr::default();
        for child in children {
            let child = child.effective();
            match &child.kind {
                TemplateKind::AllFrom(inner) => {
                    let source = self.all_from_source(ctx, buf, inner)?;
                    size.runtime_terms.push(format!("{source}.n_elem()"));
                }
                TemplateKind::Composite {
                    kind: CompositeKind::Permutation,
                    children: permuted,
                } => {
                    let inner = self.size_expression(ctx, buf, permuted)?;
                    size.fixed += inner.fixed;
                    size.runtime_terms.extend(inner.runtime_terms);
                }
                _ => size.fixed += 1,
            }
        }
        Ok(size)
    }

    /// Rendered source list expression of an `all from`, with the target
    /// definition's initializer hoisted in front when it lives in this
    /// unit.
    fn all_from_source(
        &self,
        ctx: &mut CompileContext<'_>,
        buf: &mut InstructionBuffer,
        inner: &Rc<TemplateNode>,
    ) -> Result<String, ReparseAborted> {
        let inner = inner.effective();
        let reference = match &inner.kind {
            TemplateKind::Referenced(reference) => reference.clone(),
            TemplateKind::SpecificValue(expr) => match &expr.kind {
                ExprKind::Name(name) => Reference::new(name.clone()),
                ExprKind::Ref(reference) => reference.clone(),
                _ => return Ok(expr.render()),
            },
            _ => return Ok(String::from("/* missing all-from source */")),
        };
        match self.resolver().lookup(&reference)? {
            Some(def_id) => {
                if def_id.module == self.module {
                    self.ensure_definition_lowered(ctx, buf, def_id)?;
                }
                Ok(self.reference_expr(def_id, &reference))
            }
            None => Ok(reference.render()),
        }
    }

    fn lower_named_list(
        &self,
        ctx: &mut CompileContext<'_>,
        buf: &mut InstructionBuffer,
        node: &Rc<TemplateNode>,
        entries: &[crate::template::NamedEntry],
        lvalue: &str,
    ) -> Result<(), ReparseAborted> {
        let governor = node.governor();
        for entry in entries {
            let field_node = entry.node.effective();
            if matches!(field_node.kind, TemplateKind::NotUsed) {
                // Left to the base template (or unbound by intent).
                continue;
            }
            let accessor = governor
                .as_ref()
                .map_or_else(|| format!("f_{}", entry.name), |ty| ty.field_accessor(&entry.name));
            let field_lvalue = format!("{lvalue}.{accessor}()");
            // A field that needs post-construction mutation is built in a
            // scoped temporary and assigned, not constructed in place.
            if field_node.length_restriction.is_some() || field_node.if_present {
                let class = field_node
                    .governor()
                    .or_else(|| {
                        governor
                            .as_ref()
                            .and_then(|ty| ty.field_type(&entry.name))
                    })
                    .map_or_else(|| "Base_template".into(), |ty| ty.template_class_name());
                let temp = ctx.temps.next_temp();
                buf.append("{".to_string());
                buf.append(format!("{class} {temp};"));
                self.lower(ctx, buf, &entry.node, &temp)?;
                buf.append(format!("{field_lvalue} = {temp};"));
                buf.append("}".to_string());
            } else {
                self.lower(ctx, buf, &entry.node, &field_lvalue)?;
            }
        }
        Ok(())
    }

    fn lower_referenced(
        &self,
        ctx: &mut CompileContext<'_>,
        buf: &mut InstructionBuffer,
        reference: &Reference,
        lvalue: &str,
    ) -> Result<(), ReparseAborted> {
        let Some(def_id) = self.resolver().lookup(reference)? else {
            // Unresolved at compile time; the runtime resolves the name.
            buf.append(format!("{lvalue} = {};", reference.render()));
            return Ok(());
        };
        let definition = self.registry.def(def_id);
        if definition.is_parameterized() {
            let actuals = reference.actuals.as_deref().unwrap_or_default();
            let mut rendered = Vec::with_capacity(actuals.len());
            for actual in actuals {
                rendered.push(self.instance_expr(ctx, buf, actual)?);
            }
            buf.append(format!(
                "{lvalue} = {}({});",
                self.registry.target_name(def_id),
                rendered.join(", ")
            ));
            return Ok(());
        }
        if def_id.module == self.module {
            // Topological pre-pass: the referenced template's own
            // initializer is emitted before the first use.
            self.ensure_definition_lowered(ctx, buf, def_id)?;
        }
        buf.append(format!(
            "{lvalue} = {};",
            self.reference_expr(def_id, reference)
        ));
        Ok(())
    }

    fn reference_expr(&self, def_id: DefId, reference: &Reference) -> String {
        let mut expr = self.registry.target_name(def_id);
        for subref in &reference.subrefs {
            match subref {
                SubRef::Field(name) => {
                    expr.push_str(&format!(".f_{}()", crate::syntax::reference::sanitize(name)));
                }
                SubRef::Index(index) => {
                    expr.push_str(&format!(".elem({})", index.render()));
                }
            }
        }
        expr
    }

    fn lower_decode_match(
        &self,
        ctx: &mut CompileContext<'_>,
        buf: &mut InstructionBuffer,
        encoding: Option<&Expr>,
        target: &TemplateInstance,
        lvalue: &str,
    ) -> Result<(), ReparseAborted> {
        let class = target
            .ty
            .clone()
            .or_else(|| target.template.effective().governor())
            .map_or_else(|| "Base_template".into(), |ty| ty.template_class_name());
        let temp = ctx.temps.next_temp();
        buf.append("{".to_string());
        buf.append(format!("{class} {temp};"));
        self.lower(ctx, buf, &target.template, &temp)?;
        let coding = encoding.map_or_else(|| "CODING_DEFAULT".into(), Expr::render);
        // The runtime invokes decode-then-match through this matcher
        // during actual matching.
        buf.append(format!("{lvalue}.set_decmatch({coding}, {temp});"));
        buf.append("}".to_string());
        Ok(())
    }

    /// Render a template instance as a single target expression,
    /// spilling into a scoped temporary when it has no single-expression
    /// form.
    fn instance_expr(
        &self,
        ctx: &mut CompileContext<'_>,
        buf: &mut InstructionBuffer,
        instance: &TemplateInstance,
    ) -> Result<String, ReparseAborted> {
        let node = instance.template.effective();
        match &node.kind {
            TemplateKind::SpecificValue(expr)
                if node.length_restriction.is_none() && !node.if_present =>
            {
                Ok(expr.render())
            }
            TemplateKind::AnyValue if node.length_restriction.is_none() => {
                Ok("ANY_VALUE".into())
            }
            TemplateKind::AnyOrOmit if node.length_restriction.is_none() => {
                Ok("ANY_OR_OMIT".into())
            }
            TemplateKind::OmitValue => Ok("OMIT_VALUE".into()),
            TemplateKind::Referenced(reference)
                if node.length_restriction.is_none() && !node.if_present =>
            {
                match self.resolver().lookup(reference)? {
                    Some(def_id) => {
                        let definition = self.registry.def(def_id);
                        if !definition.is_parameterized() {
                            if def_id.module == self.module {
                                self.ensure_definition_lowered(ctx, buf, def_id)?;
                            }
                            return Ok(self.reference_expr(def_id, reference));
                        }
                        self.spill_to_temp(ctx, buf, instance)
                    }
                    None => Ok(reference.render()),
                }
            }
            _ => self.spill_to_temp(ctx, buf, instance),
        }
    }

    fn spill_to_temp(
        &self,
        ctx: &mut CompileContext<'_>,
        buf: &mut InstructionBuffer,
        instance: &TemplateInstance,
    ) -> Result<String, ReparseAborted> {
        let class = instance
            .ty
            .clone()
            .or_else(|| instance.template.effective().governor())
            .map_or_else(|| "Base_template".into(), |ty| ty.template_class_name());
        let temp = ctx.temps.next_temp();
        buf.append(format!("{class} {temp};"));
        self.lower(ctx, buf, &instance.template, &temp)?;
        Ok(temp)
    }
}

/// `fixed + term_0 + term_1 + ...` element count of a composite.
#[derive(Debug, Default)]
struct SizeExpr {
    fixed: u64,
    runtime_terms: Vec<String>,
}

impl SizeExpr {
    fn render(&self) -> String {
        if self.runtime_terms.is_empty() {
            return self.fixed.to_string();
        }
        let mut out = self.fixed.to_string();
        for term in &self.runtime_terms {
            out.push_str(" + ");
            out.push_str(term);
        }
        out
    }
}
