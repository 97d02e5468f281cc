//! Module-level definitions the resolver can dereference: templates,
//! variable templates, module parameters, constants, and functions.

use std::cell::Cell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::context::Version;
use crate::diagnostics::Span;
use crate::error::ReparseAborted;
use crate::syntax::reference::{Reference, sanitize};
use crate::template::{MatchKind, TemplateNode};
use crate::types::Type;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ModuleId(usize);

/// Identity of one module-level definition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DefId {
    pub module: ModuleId,
    index: usize,
}

/// `omit` / `value` / `present` restriction declared on a template
/// definition or a template-returning function.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TemplateRestriction {
    Omit,
    Value,
    Present,
}

impl TemplateRestriction {
    #[must_use]
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Omit => "omit",
            Self::Value => "value",
            Self::Present => "present",
        }
    }

    /// Whether a template with the given matching classification satisfies
    /// this restriction. `None` means statically inconclusive (a complex
    /// body needs a runtime check).
    #[must_use]
    pub fn allows(self, kind: MatchKind) -> Option<bool> {
        match self {
            Self::Omit => match kind {
                MatchKind::Specific | MatchKind::Omit => Some(true),
                MatchKind::Any | MatchKind::AnyOrOmit => Some(false),
                MatchKind::NotUsed => Some(true),
                MatchKind::Complex => Some(false),
            },
            Self::Value => match kind {
                MatchKind::Specific | MatchKind::NotUsed => Some(true),
                MatchKind::Omit | MatchKind::Any | MatchKind::AnyOrOmit => Some(false),
                MatchKind::Complex => Some(false),
            },
            Self::Present => match kind {
                MatchKind::Omit | MatchKind::AnyOrOmit => Some(false),
                MatchKind::Complex => None,
                _ => Some(true),
            },
        }
    }

    /// Does a definition restricted to `self` satisfy a use site that
    /// needs `required`?
    #[must_use]
    pub fn subsumes(self, required: TemplateRestriction) -> bool {
        match required {
            Self::Omit => matches!(self, Self::Omit | Self::Value),
            Self::Value => matches!(self, Self::Value),
            Self::Present => matches!(self, Self::Value | Self::Present),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FormalParKind {
    Value,
    Template,
}

/// Formal parameter of a parameterized template or a function.
#[derive(Debug, Clone)]
pub struct FormalPar {
    pub name: String,
    pub ty: Rc<Type>,
    pub kind: FormalParKind,
    pub default: Option<Rc<TemplateNode>>,
}

impl FormalPar {
    #[must_use]
    pub fn value(name: impl Into<String>, ty: Rc<Type>) -> Self {
        Self {
            name: name.into(),
            ty,
            kind: FormalParKind::Value,
            default: None,
        }
    }

    #[must_use]
    pub fn template(name: impl Into<String>, ty: Rc<Type>) -> Self {
        Self {
            name: name.into(),
            ty,
            kind: FormalParKind::Template,
            default: None,
        }
    }

    #[must_use]
    pub fn with_default(mut self, default: Rc<TemplateNode>) -> Self {
        self.default = Some(default);
        self
    }
}

#[derive(Debug, Clone)]
pub struct TemplateDef {
    pub ty: Rc<Type>,
    pub restriction: Option<TemplateRestriction>,
    pub params: Option<Vec<FormalPar>>,
    pub body: Rc<TemplateNode>,
}

#[derive(Debug, Clone)]
pub struct FunctionDef {
    pub params: Vec<FormalPar>,
    pub returns: Option<Rc<Type>>,
    pub returns_template: bool,
    pub return_restriction: Option<TemplateRestriction>,
}

#[derive(Debug, Clone)]
pub enum DefinitionKind {
    Template(TemplateDef),
    VarTemplate {
        ty: Rc<Type>,
        restriction: Option<TemplateRestriction>,
        initial: Option<Rc<TemplateNode>>,
    },
    ModuleParTemplate {
        ty: Rc<Type>,
        default: Option<Rc<TemplateNode>>,
    },
    Const {
        ty: Rc<Type>,
        value: Rc<TemplateNode>,
    },
    Function(FunctionDef),
    ExtFunction(FunctionDef),
}

#[derive(Debug, Clone)]
pub struct Definition {
    pub name: String,
    pub span: Option<Span>,
    pub kind: DefinitionKind,
    checked_at: Cell<Option<Version>>,
}

impl Definition {
    #[must_use]
    pub fn new(name: impl Into<String>, kind: DefinitionKind) -> Self {
        Self {
            name: name.into(),
            span: None,
            kind,
            checked_at: Cell::new(None),
        }
    }

    /// Version of the last completed definition-level check.
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
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    /// Declared (static) type of the definition as seen by a reference.
    #[must_use]
    pub fn declared_type(&self) -> Option<Rc<Type>> {
        match &self.kind {
            DefinitionKind::Template(def) => Some(Rc::clone(&def.ty)),
            DefinitionKind::VarTemplate { ty, .. }
            | DefinitionKind::ModuleParTemplate { ty, .. }
            | DefinitionKind::Const { ty, .. } => Some(Rc::clone(ty)),
            DefinitionKind::Function(def) | DefinitionKind::ExtFunction(def) => {
                def.returns.clone()
            }
        }
    }

    /// The template body a reference elaborates to, when one exists.
    #[must_use]
    pub fn body(&self) -> Option<Rc<TemplateNode>> {
        match &self.kind {
            DefinitionKind::Template(def) => Some(Rc::clone(&def.body)),
            DefinitionKind::VarTemplate { initial, .. } => initial.clone(),
            DefinitionKind::ModuleParTemplate { default, .. } => default.clone(),
            DefinitionKind::Const { value, .. } => Some(Rc::clone(value)),
            DefinitionKind::Function(_) | DefinitionKind::ExtFunction(_) => None,
        }
    }

    #[must_use]
    pub fn restriction(&self) -> Option<TemplateRestriction> {
        match &self.kind {
            DefinitionKind::Template(def) => def.restriction,
            DefinitionKind::VarTemplate { restriction, .. } => *restriction,
            DefinitionKind::Function(def) | DefinitionKind::ExtFunction(def) => {
                def.return_restriction
            }
            _ => None,
        }
    }

    #[must_use]
    pub fn formal_params(&self) -> Option<&[FormalPar]> {
        match &self.kind {
            DefinitionKind::Template(def) => def.params.as_deref(),
            DefinitionKind::Function(def) | DefinitionKind::ExtFunction(def) => {
                Some(&def.params)
            }
            _ => None,
        }
    }

    #[must_use]
    pub fn is_parameterized(&self) -> bool {
        match &self.kind {
            DefinitionKind::Template(def) => def.params.is_some(),
            DefinitionKind::Function(def) | DefinitionKind::ExtFunction(def) => {
                !def.params.is_empty()
            }
            _ => false,
        }
    }

    #[must_use]
    pub fn is_function(&self) -> bool {
        matches!(
            self.kind,
            DefinitionKind::Function(_) | DefinitionKind::ExtFunction(_)
        )
    }

    #[must_use]
    pub fn describe(&self) -> &'static str {
        match &self.kind {
            DefinitionKind::Template(_) => "template",
            DefinitionKind::VarTemplate { .. } => "template variable",
            DefinitionKind::ModuleParTemplate { .. } => "template module parameter",
            DefinitionKind::Const { .. } => "constant",
            DefinitionKind::Function(_) => "function",
            DefinitionKind::ExtFunction(_) => "external function",
        }
    }
}

#[derive(Debug)]
pub struct Module {
    pub name: String,
    defs: Vec<Definition>,
    index: HashMap<String, usize>,
    reparse_pending: Cell<bool>,
}

impl Module {
    fn new(name: String) -> Self {
        Self {
            name,
            defs: Vec::new(),
            index: HashMap::new(),
            reparse_pending: Cell::new(false),
        }
    }

    #[must_use]
    pub fn definitions(&self) -> &[Definition] {
        &self.defs
    }
}

/// All modules visible to the current compile. Cross-module content is
/// read-only once checked; the build orchestrator guarantees ordering.
#[derive(Debug, Default)]
pub struct ModuleRegistry {
    modules: Vec<Module>,
    by_name: HashMap<String, ModuleId>,
}

impl ModuleRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_module(&mut self, name: impl Into<String>) -> ModuleId {
        let name = name.into();
        let id = ModuleId(self.modules.len());
        self.by_name.insert(name.clone(), id);
        self.modules.push(Module::new(name));
        id
    }

    pub fn define(&mut self, module: ModuleId, definition: Definition) -> DefId {
        let entry = &mut self.modules[module.0];
        let index = entry.defs.len();
        entry.index.insert(definition.name.clone(), index);
        entry.defs.push(definition);
        DefId { module, index }
    }

    #[must_use]
    pub fn module(&self, id: ModuleId) -> &Module {
        &self.modules[id.0]
    }

    #[must_use]
    pub fn module_by_name(&self, name: &str) -> Option<ModuleId> {
        self.by_name.get(name).copied()
    }

    #[must_use]
    pub fn def(&self, id: DefId) -> &Definition {
        &self.modules[id.module.0].defs[id.index]
    }

    #[must_use]
    pub fn def_ids(&self, module: ModuleId) -> Vec<DefId> {
        (0..self.modules[module.0].defs.len())
            .map(|index| DefId { module, index })
            .collect()
    }

    /// Flag used by the enclosing project model while a module is being
    /// re-parsed; passes touching it bail out with [`ReparseAborted`].
    pub fn set_reparse_pending(&self, module: ModuleId, pending: bool) {
        self.modules[module.0].reparse_pending.set(pending);
    }

    /// Locate the definition a reference names. `Ok(None)` for unresolved
    /// symbols (deferred to runtime, not an error here).
    pub fn lookup(
        &self,
        current: ModuleId,
        reference: &Reference,
    ) -> Result<Option<DefId>, ReparseAborted> {
        let module_id = match &reference.module {
            Some(name) => match self.module_by_name(name) {
                Some(id) => id,
                None => return Ok(None),
            },
            None => current,
        };
        let module = &self.modules[module_id.0];
        if module.reparse_pending.get() {
            return Err(ReparseAborted);
        }
        Ok(module.index.get(&reference.name).map(|&index| DefId {
            module: module_id,
            index,
        }))
    }

    /// Generated target-language identifier for a definition.
    #[must_use]
    pub fn target_name(&self, id: DefId) -> String {
        let module = &self.modules[id.module.0];
        format!(
            "{}_{}",
            sanitize(&module.name),
            sanitize(&module.defs[id.index].name)
        )
    }
}
