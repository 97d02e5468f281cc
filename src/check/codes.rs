//! Diagnostic codes for the template checker and lowering pass.
//!
//! `TPL0xx` type and structure, `TPL1xx` matching-mechanism legality,
//! `TPL2xx` restrictions, `TPL3xx` circular references, `TPL9xx`
//! internal invariants.

pub const TYPE_MISMATCH: &str = "TPL001";
pub const FIELD_UNKNOWN: &str = "TPL002";
pub const FIELD_MISSING: &str = "TPL003";
pub const UNION_FIELD_COUNT: &str = "TPL004";
pub const PATTERN_KIND_MISMATCH: &str = "TPL005";
pub const RANGE_BOUND_TYPE: &str = "TPL006";
pub const RANGE_BOUNDS_REVERSED: &str = "TPL007";
pub const RANGE_INFINITY_BOUND: &str = "TPL008";
pub const LIST_GOVERNOR_EXPECTED: &str = "TPL009";
pub const INVOKE_NOT_FUNCTION: &str = "TPL010";
pub const INVOKE_NO_RETURN: &str = "TPL011";
pub const PARAM_COUNT_MISMATCH: &str = "TPL012";
pub const DECMATCH_CARRIER: &str = "TPL013";
pub const DECMATCH_ENCODING: &str = "TPL014";
pub const DECMATCH_TARGET_TYPE: &str = "TPL015";
pub const VALUE_UNRESOLVED: &str = "TPL016";
pub const PATTERN_REFERENCE: &str = "TPL017";
pub const TOO_MANY_ELEMENTS: &str = "TPL018";

pub const OMIT_NOT_ALLOWED: &str = "TPL100";
pub const ANY_OR_OMIT_NOT_ALLOWED: &str = "TPL101";
pub const PERMUTATION_CONTEXT: &str = "TPL102";
pub const ALL_FROM_CONTEXT: &str = "TPL103";
pub const ALL_FROM_TARGET: &str = "TPL104";
pub const ALL_FROM_WILDCARD: &str = "TPL105";
pub const SIGNATURE_WILDCARD: &str = "TPL106";
pub const IFPRESENT_CONTEXT: &str = "TPL107";

pub const LENGTH_MISMATCH: &str = "TPL200";
pub const LENGTH_NEGATIVE: &str = "TPL201";
pub const LENGTH_BOUNDS_REVERSED: &str = "TPL202";
pub const LENGTH_BOUND_INVALID: &str = "TPL203";
pub const LENGTH_ON_OMIT: &str = "TPL204";
pub const RESTRICTION_VIOLATION: &str = "TPL210";
pub const RESTRICTION_RUNTIME: &str = "TPL211";
pub const SUBTYPE_VALUE: &str = "TPL220";
pub const SUBTYPE_LENGTH: &str = "TPL221";

pub const CIRCULAR_REFERENCE: &str = "TPL300";
pub const SELF_REFERENCE: &str = "TPL301";
pub const CIRCULAR_TEMPLATE: &str = "TPL302";

pub const INTERNAL_GOVERNOR: &str = "TPL900";
pub const INTERNAL_MISSING_CHILD: &str = "TPL901";
pub const INTERNAL_LOWERING: &str = "TPL902";
