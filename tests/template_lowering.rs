//! End-to-end lowering scenarios: statement ordering, variable-length
//! expansion, permutation group offsets, and error containment.

mod common;

use std::rc::Rc;

use common::*;
use expect_test::expect;
use ttcn3_templates::module::{ModuleRegistry, TemplateRestriction};
use ttcn3_templates::syntax::expr::Expr;
use ttcn3_templates::template::{
    CompositeKind, LengthRestriction, TemplateInstance, TemplateKind, TemplateNode, ValueRange,
};
use ttcn3_templates::types::{Field, Type};

#[test]
fn fixed_size_lists_use_literal_indices() {
    let mut registry = ModuleRegistry::new();
    let module = registry.add_module("M");
    define_template(
        &mut registry,
        module,
        "t2",
        record_of_int(),
        value_list(vec![int(5), int(6)]),
    );
    let (sink, unit) = run_check_and_lower(&registry, module);
    assert!(sink.is_empty(), "{:?}", sink.diagnostics());
    expect![[r#"
        integer_list_template M_t2;
        M_t2.set_type(VALUE_LIST, 2);
        M_t2.list_item(0) = 5;
        M_t2.list_item(1) = 6;"#]]
    .assert_eq(&unit.render());
}

#[test]
fn permutation_over_all_from_brackets_only_its_own_offsets() {
    let mut registry = ModuleRegistry::new();
    let module = registry.add_module("M");
    define_template(
        &mut registry,
        module,
        "t2",
        record_of_int(),
        value_list(vec![int(5), int(6)]),
    );
    // {1, permutation(all from t2, 3), 4}
    define_template(
        &mut registry,
        module,
        "t3",
        record_of_int(),
        value_list(vec![
            int(1),
            permutation(vec![all_from("t2"), int(3)]),
            int(4),
        ]),
    );
    let (sink, unit) = run_check_and_lower(&registry, module);
    assert!(sink.is_empty(), "{:?}", sink.diagnostics());
    // The group starts at the pre-loop offset (index 1) and ends at the
    // post-loop offset minus one (index L + 1); the trailing fixed
    // element lands at L + 2. The leading fixed element at index 0 never
    // enters the group.
    expect![[r#"
        integer_list_template M_t2;
        M_t2.set_type(VALUE_LIST, 2);
        M_t2.list_item(0) = 5;
        M_t2.list_item(1) = 6;
        integer_list_template M_t3;
        M_t3.set_type(VALUE_LIST, 3 + M_t2.n_elem());
        int idx_0 = 0;
        M_t3.list_item(idx_0) = 1;
        idx_0++;
        int perm_start_1 = idx_0;
        for (int i_2 = 0; i_2 < M_t2.n_elem(); i_2++) {
        M_t3.list_item(idx_0) = M_t2.elem(i_2);
        idx_0++;
        }
        M_t3.list_item(idx_0) = 3;
        idx_0++;
        M_t3.add_permutation(perm_start_1, idx_0 - 1);
        M_t3.list_item(idx_0) = 4;
        idx_0++;"#]]
    .assert_eq(&unit.render());
}

#[test]
fn static_permutation_uses_literal_group_bounds() {
    let mut registry = ModuleRegistry::new();
    let module = registry.add_module("M");
    define_template(
        &mut registry,
        module,
        "t",
        record_of_int(),
        value_list(vec![int(1), permutation(vec![int(2), int(3)]), int(4)]),
    );
    let (sink, unit) = run_check_and_lower(&registry, module);
    assert!(sink.is_empty(), "{:?}", sink.diagnostics());
    expect![[r#"
        integer_list_template M_t;
        M_t.set_type(VALUE_LIST, 4);
        M_t.list_item(0) = 1;
        M_t.list_item(1) = 2;
        M_t.list_item(2) = 3;
        M_t.add_permutation(1, 2);
        M_t.list_item(3) = 4;"#]]
    .assert_eq(&unit.render());
}

#[test]
fn referenced_initializer_is_emitted_before_first_use() {
    let mut registry = ModuleRegistry::new();
    let module = registry.add_module("M");
    // Declared before its target on purpose: lowering must hoist the
    // target's initializer in front of the use.
    define_template(
        &mut registry,
        module,
        "t_ref",
        Type::integer(),
        referenced("t_base"),
    );
    define_template(&mut registry, module, "t_base", Type::integer(), int(42));
    let (sink, unit) = run_check_and_lower(&registry, module);
    assert!(sink.is_empty(), "{:?}", sink.diagnostics());
    expect![[r#"
        INTEGER_template M_t_ref;
        INTEGER_template M_t_base;
        M_t_base = 42;
        M_t_ref = M_t_base;"#]]
    .assert_eq(&unit.render());
}

#[test]
fn unresolved_reference_defers_to_runtime_lookup() {
    let mut registry = ModuleRegistry::new();
    let module = registry.add_module("M");
    define_template(
        &mut registry,
        module,
        "t",
        Type::integer(),
        referenced("vanished"),
    );
    let (_, unit) = run_check_and_lower(&registry, module);
    expect![[r#"
        INTEGER_template M_t;
        M_t = vanished;"#]]
    .assert_eq(&unit.render());
}

#[test]
fn named_list_fields_with_restrictions_build_through_a_temporary() {
    let msg = Type::record(
        "Msg",
        vec![
            Field::new("id", Type::integer()),
            Field::new("tag", Type::charstring()).optional(),
        ],
    );
    let mut registry = ModuleRegistry::new();
    let module = registry.add_module("M");
    let tag = Rc::new(
        TemplateNode::new(TemplateKind::SpecificValue(Expr::charstring("ab")))
            .with_length_restriction(LengthRestriction::exact(2)),
    );
    define_template(
        &mut registry,
        module,
        "t_msg",
        msg,
        named_list(vec![("id", int(1)), ("tag", tag)]),
    );
    let (sink, unit) = run_check_and_lower(&registry, module);
    assert!(sink.is_empty(), "{:?}", sink.diagnostics());
    expect![[r#"
        Msg_template M_t_msg;
        M_t_msg.f_id() = 1;
        {
        CHARSTRING_template tmp_0;
        tmp_0 = "ab";
        tmp_0.set_single_length(2);
        M_t_msg.f_tag() = tmp_0;
        }"#]]
    .assert_eq(&unit.render());
}

#[test]
fn decode_match_captures_target_template_and_coding() {
    let mut registry = ModuleRegistry::new();
    let module = registry.add_module("M");
    let body = node(TemplateKind::DecodeMatch {
        encoding: None,
        target: TemplateInstance::new(Some(Type::integer()), int(5)),
    });
    define_template(&mut registry, module, "t_dec", Type::charstring(), body);
    let (sink, unit) = run_check_and_lower(&registry, module);
    assert!(sink.is_empty(), "{:?}", sink.diagnostics());
    expect![[r#"
        CHARSTRING_template M_t_dec;
        {
        INTEGER_template tmp_0;
        tmp_0 = 5;
        M_t_dec.set_decmatch(CODING_DEFAULT, tmp_0);
        }"#]]
    .assert_eq(&unit.render());
}

#[test]
fn value_range_emits_bound_setters_and_skips_infinity() {
    let mut registry = ModuleRegistry::new();
    let module = registry.add_module("M");
    let body = node(TemplateKind::ValueRange(ValueRange::new(
        Some(Expr::int(0)),
        Some(Expr::infinity(false)),
    )));
    define_template(&mut registry, module, "t_range", Type::integer(), body);
    let (sink, unit) = run_check_and_lower(&registry, module);
    assert!(sink.is_empty(), "{:?}", sink.diagnostics());
    expect![[r#"
        INTEGER_template M_t_range;
        M_t_range.set_type(VALUE_RANGE);
        M_t_range.set_min(0);"#]]
    .assert_eq(&unit.render());
}

#[test]
fn erroneous_template_lowers_to_a_marked_no_op() {
    let mut registry = ModuleRegistry::new();
    let module = registry.add_module("M");
    define_template(
        &mut registry,
        module,
        "t_bad",
        Type::integer(),
        charstring("not an integer"),
    );
    let (sink, unit) = run_check_and_lower(&registry, module);
    assert_eq!(sink.error_count(), 1);
    expect![[r#"
        INTEGER_template M_t_bad;
        /* erroneous template */ M_t_bad.clean_up();"#]]
    .assert_eq(&unit.render());
}

#[test]
fn inconclusive_restriction_emits_a_runtime_guard() {
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
    let (sink, unit) = run_check_and_lower(&registry, module);
    assert_eq!(sink.error_count(), 0, "{:?}", sink.diagnostics());
    expect![[r#"
        INTEGER_template M_t_any;
        M_t_any = ANY_VALUE;
        INTEGER_template M_t_guarded;
        M_t_guarded = M_t_any;
        M_t_guarded.check_restriction("present");"#]]
    .assert_eq(&unit.render());
}

#[test]
fn lowering_is_idempotent_per_version() {
    use ttcn3_templates::context::{CompileContext, Version};
    use ttcn3_templates::diagnostics::DiagnosticSink;
    use ttcn3_templates::{check_module, lower_module};

    let mut registry = ModuleRegistry::new();
    let module = registry.add_module("M");
    define_template(&mut registry, module, "t", Type::integer(), int(7));

    let mut sink = DiagnosticSink::new();
    let mut ctx = CompileContext::new(Version::INITIAL, &mut sink);
    check_module(&registry, module, &mut ctx).unwrap();
    let first = lower_module(&registry, module, &mut ctx).unwrap();
    assert_eq!(first.statements().len(), 2);
    let second = lower_module(&registry, module, &mut ctx).unwrap();
    assert!(
        second.statements().is_empty(),
        "same version, nothing re-lowered: {:?}",
        second.statements()
    );
}

#[test]
fn length_restriction_and_ifpresent_apply_after_construction() {
    let msg = Type::record(
        "Wrap",
        vec![Field::new("items", set_of_int()).optional()],
    );
    let mut registry = ModuleRegistry::new();
    let module = registry.add_module("M");
    let items = Rc::new(
        raw_list(CompositeKind::ValueList, vec![int(1), star()])
            .with_length_restriction(LengthRestriction::between(1, 4))
            .with_if_present(),
    );
    define_template(
        &mut registry,
        module,
        "t_wrap",
        msg,
        named_list(vec![("items", items)]),
    );
    let (sink, unit) = run_check_and_lower(&registry, module);
    assert!(sink.is_empty(), "{:?}", sink.diagnostics());
    expect![[r#"
        Wrap_template M_t_wrap;
        {
        integer_list_template tmp_0;
        tmp_0.set_type(VALUE_LIST, 2);
        tmp_0.list_item(0) = 1;
        tmp_0.list_item(1) = ANY_OR_OMIT;
        tmp_0.set_length_range(1, 4);
        tmp_0.set_ifpresent();
        M_t_wrap.f_items() = tmp_0;
        }"#]]
    .assert_eq(&unit.render());
}
