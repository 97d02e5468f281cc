//! End-to-end checking scenarios: governors, matching-mechanism legality,
//! length restrictions, all-from expansion rules, and cycle detection.

mod common;

use std::rc::Rc;

use common::*;
use ttcn3_templates::check::{CheckArgs, TemplateChecker, codes};
use ttcn3_templates::context::{CompileContext, Version};
use ttcn3_templates::diagnostics::{DiagnosticSink, Severity, Span};
use ttcn3_templates::module::{
    Definition, DefinitionKind, FunctionDef, ModuleRegistry, TemplateRestriction,
};
use ttcn3_templates::syntax::expr::Expr;
use ttcn3_templates::template::{CompositeKind, LengthRestriction, TemplateKind, TemplateNode};
use ttcn3_templates::types::{Field, Type};

#[test]
fn checking_is_idempotent_at_one_version() {
    let mut registry = ModuleRegistry::new();
    let module = registry.add_module("M");
    let body = Rc::new(
        raw_list(CompositeKind::ValueList, vec![int(1), int(2)])
            .with_length_restriction(LengthRestriction::exact(3)),
    );
    define_template(&mut registry, module, "t", set_of_int(), Rc::clone(&body));

    let first = run_check(&registry, module);
    assert_eq!(first.error_count(), 1, "{:?}", first.diagnostics());
    assert!(body.is_erroneous());
    let governor_before = body.governor().map(|ty| ty.display_name());

    let second = run_check(&registry, module);
    assert!(second.is_empty(), "re-check at the same version re-reported");
    assert!(body.is_erroneous());
    assert_eq!(body.governor().map(|ty| ty.display_name()), governor_before);
}

#[test]
fn erroneous_flag_is_monotonic_across_versions() {
    let mut registry = ModuleRegistry::new();
    let module = registry.add_module("M");
    let body = charstring("oops");
    define_template(&mut registry, module, "t", Type::integer(), Rc::clone(&body));

    let sink = run_check(&registry, module);
    assert_eq!(sink.error_count(), 1);
    assert!(body.is_erroneous());

    let later = run_check_at(&registry, module, Version::INITIAL.next());
    assert!(body.is_erroneous(), "erroneous flag must never be cleared");
    assert!(later.is_empty(), "erroneous nodes are not re-diagnosed");
}

#[test]
fn length_restriction_round_trip() {
    let mut registry = ModuleRegistry::new();
    let module = registry.add_module("M");
    let exact = Rc::new(
        raw_list(CompositeKind::ValueList, vec![int(1), int(2), int(3)])
            .with_length_restriction(LengthRestriction::exact(3)),
    );
    define_template(&mut registry, module, "t_ok", set_of_int(), exact);
    let sink = run_check(&registry, module);
    assert!(sink.is_empty(), "{:?}", sink.diagnostics());

    let mut registry = ModuleRegistry::new();
    let module = registry.add_module("M");
    let off_by_one = Rc::new(
        raw_list(CompositeKind::ValueList, vec![int(1), int(2), int(3)])
            .with_length_restriction(LengthRestriction::exact(4)),
    );
    define_template(&mut registry, module, "t_bad", set_of_int(), off_by_one);
    let sink = run_check(&registry, module);
    assert_eq!(sink.error_count(), 1);
    assert_eq!(codes_of(&sink), vec![codes::LENGTH_MISMATCH]);
}

#[test]
fn wildcard_after_all_from_is_reported_on_the_referenced_body() {
    let mut registry = ModuleRegistry::new();
    let module = registry.add_module("M");

    let wildcard_span = Span::new(16, 17);
    let wildcard = Rc::new(TemplateNode::new(TemplateKind::AnyValue).with_span(wildcard_span));
    let t_body = Rc::new(
        raw_list(CompositeKind::ValueList, vec![int(1), int(2), wildcard])
            .with_span(Span::new(10, 19)),
    );
    define_template(&mut registry, module, "t", set_of_int(), t_body);

    let s_body = Rc::new(
        raw_list(CompositeKind::Subset, vec![all_from("t")]).with_span(Span::new(40, 60)),
    );
    define_template(&mut registry, module, "s", set_of_int(), s_body);

    let sink = run_check(&registry, module);
    assert_eq!(sink.error_count(), 1, "{:?}", sink.diagnostics());
    let diag = &sink.diagnostics()[0];
    assert_eq!(diag.code.as_ref().map(|c| c.code.as_str()), Some(codes::ALL_FROM_WILDCARD));
    assert_eq!(
        diag.primary_label.as_ref().map(|label| label.span),
        Some(wildcard_span),
        "the diagnostic points into `t`'s body, not at `s`"
    );
}

#[test]
fn direct_self_reference_is_rejected_and_terminates() {
    let mut registry = ModuleRegistry::new();
    let module = registry.add_module("M");
    let body = referenced("t");
    define_template(&mut registry, module, "t", Type::integer(), body);

    let sink = run_check(&registry, module);
    assert_eq!(sink.error_count(), 1, "{:?}", sink.diagnostics());
    assert_eq!(codes_of(&sink), vec![codes::SELF_REFERENCE]);
    assert!(sink.diagnostics()[0].message.contains("references itself"));
}

#[test]
fn alias_chain_resolves_and_back_edge_is_a_cycle() {
    // t_a -> t_b -> t_c -> {1, 2}: fine.
    let mut registry = ModuleRegistry::new();
    let module = registry.add_module("M");
    define_template(&mut registry, module, "t_c", set_of_int(), value_list(vec![int(1), int(2)]));
    define_template(&mut registry, module, "t_b", set_of_int(), referenced("t_c"));
    define_template(&mut registry, module, "t_a", set_of_int(), referenced("t_b"));
    let sink = run_check(&registry, module);
    assert!(sink.is_empty(), "{:?}", sink.diagnostics());

    // t_a -> t_b -> t_c -> t_a: exactly one circular-reference error.
    let mut registry = ModuleRegistry::new();
    let module = registry.add_module("M");
    define_template(&mut registry, module, "t_a", set_of_int(), referenced("t_b"));
    define_template(&mut registry, module, "t_b", set_of_int(), referenced("t_c"));
    define_template(&mut registry, module, "t_c", set_of_int(), referenced("t_a"));
    let sink = run_check(&registry, module);
    assert_eq!(sink.error_count(), 1, "{:?}", sink.diagnostics());
    assert_eq!(codes_of(&sink), vec![codes::CIRCULAR_REFERENCE]);
}

#[test]
fn omit_needs_an_optional_context_and_carries_no_length() {
    let mut registry = ModuleRegistry::new();
    let module = registry.add_module("M");
    let body = Rc::new(
        TemplateNode::new(TemplateKind::OmitValue)
            .with_length_restriction(LengthRestriction::exact(1)),
    );
    define_template(&mut registry, module, "t", Type::integer(), body);
    let sink = run_check(&registry, module);
    let codes = codes_of(&sink);
    assert!(codes.contains(&codes::OMIT_NOT_ALLOWED.to_string()), "{codes:?}");
    assert!(codes.contains(&codes::LENGTH_ON_OMIT.to_string()), "{codes:?}");
}

#[test]
fn omit_restricted_template_may_be_omit() {
    let mut registry = ModuleRegistry::new();
    let module = registry.add_module("M");
    define_restricted(
        &mut registry,
        module,
        "t",
        Type::integer(),
        TemplateRestriction::Omit,
        omit(),
    );
    let sink = run_check(&registry, module);
    assert!(sink.is_empty(), "{:?}", sink.diagnostics());
}

#[test]
fn value_restriction_rejects_wildcards_statically() {
    let mut registry = ModuleRegistry::new();
    let module = registry.add_module("M");
    define_restricted(
        &mut registry,
        module,
        "t",
        Type::integer(),
        TemplateRestriction::Value,
        any(),
    );
    let sink = run_check(&registry, module);
    assert_eq!(codes_of(&sink), vec![codes::RESTRICTION_VIOLATION]);
}

#[test]
fn inconclusive_restriction_downgrades_to_a_runtime_check_warning() {
    let mut registry = ModuleRegistry::new();
    let module = registry.add_module("M");
    define_template(&mut registry, module, "t_any", Type::integer(), any());
    define_restricted(
        &mut registry,
        module,
        "t_guarded",
        Type::integer(),
        TemplateRestriction::Present,
        referenced("t_any"),
    );
    let sink = run_check(&registry, module);
    assert_eq!(sink.error_count(), 0, "{:?}", sink.diagnostics());
    assert_eq!(codes_of(&sink), vec![codes::RESTRICTION_RUNTIME]);
    assert_eq!(sink.diagnostics()[0].severity, Severity::Warning);
}

#[test]
fn named_list_rejects_unknown_and_missing_fields() {
    let msg = Type::record(
        "Msg",
        vec![
            Field::new("id", Type::integer()),
            Field::new("note", Type::charstring()).optional(),
        ],
    );
    let mut registry = ModuleRegistry::new();
    let module = registry.add_module("M");
    define_template(
        &mut registry,
        module,
        "t",
        Rc::clone(&msg),
        named_list(vec![("id", int(1)), ("bogus", int(2))]),
    );
    let sink = run_check(&registry, module);
    let codes = codes_of(&sink);
    assert!(codes.contains(&codes::FIELD_UNKNOWN.to_string()), "{codes:?}");
    assert!(codes.contains(&codes::FIELD_MISSING.to_string()), "{codes:?}");
}

#[test]
fn implicit_omit_completes_unlisted_optional_fields() {
    let msg = Type::record(
        "Msg",
        vec![
            Field::new("id", Type::integer()),
            Field::new("note", Type::charstring()).optional(),
        ],
    );
    let mut registry = ModuleRegistry::new();
    let module = registry.add_module("M");
    let body = named_list(vec![("id", int(1))]);
    define_template(&mut registry, module, "seed", Type::integer(), int(0));

    let checker = TemplateChecker::new(&registry, module);
    let mut sink = DiagnosticSink::new();
    let mut ctx = CompileContext::new(Version::INITIAL, &mut sink);
    let args = CheckArgs::new(Rc::clone(&msg)).with_implicit_omit();
    checker.check(&mut ctx, &body, &args).unwrap();
    drop(ctx);
    assert!(sink.is_empty(), "{:?}", sink.diagnostics());

    let effective = body.effective();
    let TemplateKind::NamedList(entries) = &effective.kind else {
        panic!("expected a named list, got {}", effective.describe());
    };
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[1].name, "note");
    assert!(matches!(
        entries[1].node.effective().kind,
        TemplateKind::OmitValue
    ));
}

#[test]
fn value_list_converts_to_named_list_for_record_governors() {
    let msg = Type::record(
        "Pair",
        vec![
            Field::new("first", Type::integer()),
            Field::new("second", Type::integer()),
        ],
    );
    let mut registry = ModuleRegistry::new();
    let module = registry.add_module("M");
    let body = value_list(vec![int(1), int(2)]);
    define_template(&mut registry, module, "t", msg, Rc::clone(&body));
    let sink = run_check(&registry, module);
    assert!(sink.is_empty(), "{:?}", sink.diagnostics());
    let effective = body.effective();
    assert!(
        matches!(effective.kind, TemplateKind::NamedList(_)),
        "conversion product cached on the original node"
    );
}

#[test]
fn union_templates_assign_exactly_one_alternative() {
    let choice = Type::union(
        "Choice",
        vec![
            Field::new("num", Type::integer()),
            Field::new("text", Type::charstring()),
        ],
    );
    let mut registry = ModuleRegistry::new();
    let module = registry.add_module("M");
    define_template(
        &mut registry,
        module,
        "t",
        choice,
        named_list(vec![("num", int(1)), ("text", charstring("x"))]),
    );
    let sink = run_check(&registry, module);
    assert_eq!(codes_of(&sink), vec![codes::UNION_FIELD_COUNT]);
}

#[test]
fn signature_parameters_reject_wildcards() {
    let sig = Type::signature(
        "S_call",
        vec![
            Field::new("p1", Type::integer()),
            Field::new("p2", Type::integer()),
        ],
    );
    let mut registry = ModuleRegistry::new();
    let module = registry.add_module("M");
    define_template(
        &mut registry,
        module,
        "t",
        sig,
        named_list(vec![("p1", int(1)), ("p2", any())]),
    );
    let sink = run_check(&registry, module);
    assert_eq!(codes_of(&sink), vec![codes::SIGNATURE_WILDCARD]);
}

#[test]
fn decode_match_checks_target_against_decoded_type() {
    use ttcn3_templates::template::TemplateInstance;

    let mut registry = ModuleRegistry::new();
    let module = registry.add_module("M");
    let target = TemplateInstance::new(Some(Type::integer()), charstring("not an int"));
    let body = node(TemplateKind::DecodeMatch {
        encoding: None,
        target,
    });
    define_template(&mut registry, module, "t", Type::octetstring(), body);
    let sink = run_check(&registry, module);
    assert_eq!(codes_of(&sink), vec![codes::TYPE_MISMATCH]);
}

#[test]
fn decode_match_encoding_selector_needs_universal_charstring() {
    use ttcn3_templates::template::TemplateInstance;

    let mut registry = ModuleRegistry::new();
    let module = registry.add_module("M");
    let target = TemplateInstance::new(Some(Type::integer()), int(1));
    let body = node(TemplateKind::DecodeMatch {
        encoding: Some(Expr::charstring("UPER")),
        target,
    });
    define_template(&mut registry, module, "t", Type::octetstring(), body);
    let sink = run_check(&registry, module);
    assert_eq!(codes_of(&sink), vec![codes::DECMATCH_ENCODING]);
}

#[test]
fn specific_value_call_rewrites_into_an_invocation() {
    let mut registry = ModuleRegistry::new();
    let module = registry.add_module("M");
    registry.define(
        module,
        Definition::new(
            "f_make",
            DefinitionKind::Function(FunctionDef {
                params: vec![],
                returns: Some(Type::integer()),
                returns_template: true,
                return_restriction: None,
            }),
        ),
    );
    let call = Expr::new(ttcn3_templates::syntax::expr::ExprKind::Apply {
        callee: Box::new(Expr::name("f_make")),
        args: vec![],
    });
    let body = node(TemplateKind::SpecificValue(call));
    define_template(&mut registry, module, "t", Type::integer(), Rc::clone(&body));
    let sink = run_check(&registry, module);
    assert!(sink.is_empty(), "{:?}", sink.diagnostics());
    assert!(matches!(
        body.effective().kind,
        TemplateKind::Invoke { .. }
    ));
}

#[test]
fn subset_and_superset_need_a_set_of_governor() {
    let mut registry = ModuleRegistry::new();
    let module = registry.add_module("M");
    define_template(
        &mut registry,
        module,
        "t",
        record_of_int(),
        superset(vec![int(1)]),
    );
    let sink = run_check(&registry, module);
    assert_eq!(codes_of(&sink), vec![codes::LIST_GOVERNOR_EXPECTED]);
}

#[test]
fn superset_length_restriction_accounts_for_minimum_elements() {
    let mut registry = ModuleRegistry::new();
    let module = registry.add_module("M");
    let body = Rc::new(
        raw_list(CompositeKind::Superset, vec![int(1), int(2), int(3)])
            .with_length_restriction(LengthRestriction::between(0, 2)),
    );
    define_template(&mut registry, module, "t", set_of_int(), body);
    let sink = run_check(&registry, module);
    assert_eq!(codes_of(&sink), vec![codes::LENGTH_MISMATCH]);
}

#[test]
fn value_range_rejects_reversed_bounds_and_non_numeric_infinity() {
    use ttcn3_templates::template::ValueRange;

    let mut registry = ModuleRegistry::new();
    let module = registry.add_module("M");
    let body = node(TemplateKind::ValueRange(ValueRange::new(
        Some(Expr::int(10)),
        Some(Expr::int(0)),
    )));
    define_template(&mut registry, module, "t", Type::integer(), body);
    let sink = run_check(&registry, module);
    assert_eq!(codes_of(&sink), vec![codes::RANGE_BOUNDS_REVERSED]);

    let mut registry = ModuleRegistry::new();
    let module = registry.add_module("M");
    let body = node(TemplateKind::ValueRange(ValueRange::new(
        Some(Expr::charstring("a")),
        Some(Expr::infinity(false)),
    )));
    define_template(&mut registry, module, "t", Type::charstring(), body);
    let sink = run_check(&registry, module);
    assert_eq!(codes_of(&sink), vec![codes::RANGE_INFINITY_BOUND]);
}
