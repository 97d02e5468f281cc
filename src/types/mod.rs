//! The subset of the host type system the template checker queries.
//!
//! Only structural knowledge the checker and the lowering pass actually
//! need is modeled: kind classification, element/field lookup, structural
//! compatibility, and type-attached subtype constraints.

mod subtype;

pub use subtype::{IntRange, LengthBound, SubtypeSpec};

use std::fmt;
use std::rc::Rc;

use crate::syntax::reference::{field_accessor, sanitize};

/// A field of a record/set/union type or a signature parameter.
#[derive(Debug, Clone)]
pub struct Field {
    pub name: String,
    pub ty: Rc<Type>,
    pub optional: bool,
}

impl Field {
    #[must_use]
    pub fn new(name: impl Into<String>, ty: Rc<Type>) -> Self {
        Self {
            name: name.into(),
            ty,
            optional: false,
        }
    }

    #[must_use]
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }
}

#[derive(Debug, Clone)]
pub enum TypeKind {
    Integer,
    Float,
    Boolean,
    Bitstring,
    Hexstring,
    Octetstring,
    Charstring,
    UniversalCharstring,
    Record(Vec<Field>),
    Set(Vec<Field>),
    RecordOf(Rc<Type>),
    SetOf(Rc<Type>),
    Union(Vec<Field>),
    Enumerated(Vec<String>),
    Signature(Vec<Field>),
}

/// A resolved type as seen by the template checker.
#[derive(Debug, Clone)]
pub struct Type {
    pub name: Option<String>,
    pub kind: TypeKind,
    pub subtype: Option<SubtypeSpec>,
}

/// Explanation accumulated while a compatibility query walks two types.
#[derive(Debug, Default)]
pub struct CompatibilityInfo {
    path: Vec<String>,
    reason: Option<String>,
}

impl CompatibilityInfo {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn fail(&mut self, reason: impl Into<String>) -> bool {
        if self.reason.is_none() {
            self.reason = Some(reason.into());
        }
        false
    }

    /// Human-readable mismatch location, innermost first.
    #[must_use]
    pub fn error_message(&self) -> String {
        match (&self.reason, self.path.is_empty()) {
            (Some(reason), true) => reason.clone(),
            (Some(reason), false) => {
                format!("{} (at {})", reason, self.path.join("."))
            }
            (None, _) => "types are incompatible".into(),
        }
    }
}

impl Type {
    #[must_use]
    pub fn new(kind: TypeKind) -> Rc<Self> {
        Rc::new(Self {
            name: None,
            kind,
            subtype: None,
        })
    }

    #[must_use]
    pub fn named(name: impl Into<String>, kind: TypeKind) -> Rc<Self> {
        Rc::new(Self {
            name: Some(name.into()),
            kind,
            subtype: None,
        })
    }

    #[must_use]
    pub fn with_subtype(self: &Rc<Self>, subtype: SubtypeSpec) -> Rc<Self> {
        Rc::new(Self {
            name: self.name.clone(),
            kind: self.kind.clone(),
            subtype: Some(subtype),
        })
    }

    #[must_use]
    pub fn integer() -> Rc<Self> {
        Self::new(TypeKind::Integer)
    }

    #[must_use]
    pub fn float() -> Rc<Self> {
        Self::new(TypeKind::Float)
    }

    #[must_use]
    pub fn boolean() -> Rc<Self> {
        Self::new(TypeKind::Boolean)
    }

    #[must_use]
    pub fn bitstring() -> Rc<Self> {
        Self::new(TypeKind::Bitstring)
    }

    #[must_use]
    pub fn hexstring() -> Rc<Self> {
        Self::new(TypeKind::Hexstring)
    }

    #[must_use]
    pub fn octetstring() -> Rc<Self> {
        Self::new(TypeKind::Octetstring)
    }

    #[must_use]
    pub fn charstring() -> Rc<Self> {
        Self::new(TypeKind::Charstring)
    }

    #[must_use]
    pub fn universal_charstring() -> Rc<Self> {
        Self::new(TypeKind::UniversalCharstring)
    }

    #[must_use]
    pub fn record_of(element: Rc<Type>) -> Rc<Self> {
        Self::new(TypeKind::RecordOf(element))
    }

    #[must_use]
    pub fn set_of(element: Rc<Type>) -> Rc<Self> {
        Self::new(TypeKind::SetOf(element))
    }

    #[must_use]
    pub fn record(name: impl Into<String>, fields: Vec<Field>) -> Rc<Self> {
        Self::named(name, TypeKind::Record(fields))
    }

    #[must_use]
    pub fn set(name: impl Into<String>, fields: Vec<Field>) -> Rc<Self> {
        Self::named(name, TypeKind::Set(fields))
    }

    #[must_use]
    pub fn union(name: impl Into<String>, alternatives: Vec<Field>) -> Rc<Self> {
        Self::named(name, TypeKind::Union(alternatives))
    }

    #[must_use]
    pub fn signature(name: impl Into<String>, params: Vec<Field>) -> Rc<Self> {
        Self::named(name, TypeKind::Signature(params))
    }

    #[must_use]
    pub fn is_string_kind(&self) -> bool {
        matches!(
            self.kind,
            TypeKind::Bitstring
                | TypeKind::Hexstring
                | TypeKind::Octetstring
                | TypeKind::Charstring
                | TypeKind::UniversalCharstring
        )
    }

    #[must_use]
    pub fn is_list_kind(&self) -> bool {
        matches!(self.kind, TypeKind::RecordOf(_) | TypeKind::SetOf(_))
    }

    #[must_use]
    pub fn is_set_of(&self) -> bool {
        matches!(self.kind, TypeKind::SetOf(_))
    }

    #[must_use]
    pub fn is_numeric(&self) -> bool {
        matches!(self.kind, TypeKind::Integer | TypeKind::Float)
    }

    #[must_use]
    pub fn is_signature(&self) -> bool {
        matches!(self.kind, TypeKind::Signature(_))
    }

    /// Element type of a `record of` / `set of`.
    #[must_use]
    pub fn element_type(&self) -> Option<Rc<Type>> {
        match &self.kind {
            TypeKind::RecordOf(element) | TypeKind::SetOf(element) => Some(Rc::clone(element)),
            _ => None,
        }
    }

    /// Fields of a record/set/union/signature governor, in declaration order.
    #[must_use]
    pub fn fields(&self) -> Option<&[Field]> {
        match &self.kind {
            TypeKind::Record(fields)
            | TypeKind::Set(fields)
            | TypeKind::Union(fields)
            | TypeKind::Signature(fields) => Some(fields),
            _ => None,
        }
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields()?.iter().find(|field| field.name == name)
    }

    /// Type of the named field, if the governor has a field-name table.
    #[must_use]
    pub fn field_type(&self, name: &str) -> Option<Rc<Type>> {
        self.field(name).map(|field| Rc::clone(&field.ty))
    }

    /// Generated accessor for the named field on the target-language class.
    #[must_use]
    pub fn field_accessor(&self, name: &str) -> String {
        field_accessor(name)
    }

    #[must_use]
    pub fn is_union(&self) -> bool {
        matches!(self.kind, TypeKind::Union(_))
    }

    /// Structural compatibility between a value/template of `self` and a
    /// governor of `other`. On mismatch, `info` records where and why.
    #[must_use]
    pub fn is_compatible(&self, other: &Type, info: &mut CompatibilityInfo) -> bool {
        if let (Some(a), Some(b)) = (&self.name, &other.name) {
            if a == b {
                return true;
            }
        }
        match (&self.kind, &other.kind) {
            (TypeKind::Integer, TypeKind::Integer)
            | (TypeKind::Float, TypeKind::Float)
            | (TypeKind::Boolean, TypeKind::Boolean)
            | (TypeKind::Bitstring, TypeKind::Bitstring)
            | (TypeKind::Hexstring, TypeKind::Hexstring)
            | (TypeKind::Octetstring, TypeKind::Octetstring)
            | (TypeKind::Charstring, TypeKind::Charstring)
            | (TypeKind::UniversalCharstring, TypeKind::UniversalCharstring) => true,
            // Every charstring is a universal charstring; not vice versa.
            (TypeKind::Charstring, TypeKind::UniversalCharstring) => true,
            (TypeKind::UniversalCharstring, TypeKind::Charstring) => info.fail(
                "universal charstring values cannot be used where charstring is expected",
            ),
            (TypeKind::Record(ours), TypeKind::Record(theirs))
            | (TypeKind::Set(ours), TypeKind::Set(theirs)) => {
                if ours.len() != theirs.len() {
                    return info.fail(format!(
                        "field counts differ ({} vs {})",
                        ours.len(),
                        theirs.len()
                    ));
                }
                for (our_field, their_field) in ours.iter().zip(theirs) {
                    if our_field.optional != their_field.optional {
                        info.path.push(their_field.name.clone());
                        return info.fail("optionality differs");
                    }
                    if !our_field.ty.is_compatible(&their_field.ty, info) {
                        info.path.push(their_field.name.clone());
                        return false;
                    }
                }
                true
            }
            (TypeKind::RecordOf(ours), TypeKind::RecordOf(theirs))
            | (TypeKind::SetOf(ours), TypeKind::SetOf(theirs)) => {
                if ours.is_compatible(theirs, info) {
                    true
                } else {
                    info.path.push("<element>".into());
                    false
                }
            }
            (TypeKind::Union(ours), TypeKind::Union(theirs)) => {
                for their_alt in theirs {
                    let Some(our_alt) = ours.iter().find(|alt| alt.name == their_alt.name) else {
                        info.path.push(their_alt.name.clone());
                        return info.fail("alternative is missing");
                    };
                    if !our_alt.ty.is_compatible(&their_alt.ty, info) {
                        info.path.push(their_alt.name.clone());
                        return false;
                    }
                }
                true
            }
            (TypeKind::Enumerated(ours), TypeKind::Enumerated(theirs)) => {
                if ours == theirs {
                    true
                } else {
                    info.fail("enumerated value sets differ")
                }
            }
            _ => info.fail(format!(
                "`{}` is not compatible with `{}`",
                self.display_name(),
                other.display_name()
            )),
        }
    }

    /// Name used in diagnostics.
    #[must_use]
    pub fn display_name(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        match &self.kind {
            TypeKind::Integer => "integer".into(),
            TypeKind::Float => "float".into(),
            TypeKind::Boolean => "boolean".into(),
            TypeKind::Bitstring => "bitstring".into(),
            TypeKind::Hexstring => "hexstring".into(),
            TypeKind::Octetstring => "octetstring".into(),
            TypeKind::Charstring => "charstring".into(),
            TypeKind::UniversalCharstring => "universal charstring".into(),
            TypeKind::Record(_) => "record".into(),
            TypeKind::Set(_) => "set".into(),
            TypeKind::RecordOf(element) => format!("record of {}", element.display_name()),
            TypeKind::SetOf(element) => format!("set of {}", element.display_name()),
            TypeKind::Union(_) => "union".into(),
            TypeKind::Enumerated(_) => "enumerated".into(),
            TypeKind::Signature(_) => "signature".into(),
        }
    }

    /// Target-language value class of this type.
    #[must_use]
    pub fn value_class_name(&self) -> String {
        match (&self.name, &self.kind) {
            (Some(name), _) => sanitize(name),
            (None, TypeKind::Integer) => "INTEGER".into(),
            (None, TypeKind::Float) => "FLOAT".into(),
            (None, TypeKind::Boolean) => "BOOLEAN".into(),
            (None, TypeKind::Bitstring) => "BITSTRING".into(),
            (None, TypeKind::Hexstring) => "HEXSTRING".into(),
            (None, TypeKind::Octetstring) => "OCTETSTRING".into(),
            (None, TypeKind::Charstring) => "CHARSTRING".into(),
            (None, TypeKind::UniversalCharstring) => "UNIVERSAL_CHARSTRING".into(),
            (None, TypeKind::RecordOf(element) | TypeKind::SetOf(element)) => {
                format!("{}_list", sanitize(&element.display_name()))
            }
            (None, _) => "UNNAMED".into(),
        }
    }

    /// Target-language template class for scoped temporaries.
    #[must_use]
    pub fn template_class_name(&self) -> String {
        format!("{}_template", self.value_class_name())
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_name())
    }
}
