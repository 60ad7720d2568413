use ul4::{
    ClosureFunction, CompileOptions, EvalError, EvalErrorKind, ParseErrorKind, Registry, Signature,
    Template, Value, Vars,
};

fn render(source: &str) -> String {
    Template::compile(source, CompileOptions::new())
        .unwrap()
        .render_to_string(Vars::new())
        .unwrap()
}

fn render_vars(source: &str, vars: &[(&str, Value)]) -> String {
    let vars: Vars = vars
        .iter()
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect();
    Template::compile(source, CompileOptions::new())
        .unwrap()
        .render_to_string(vars)
        .unwrap()
}

fn make_registry() -> Registry {
    let mut registry = Registry::builtin();
    registry.register_function(ClosureFunction::new(
        Signature::new("shout").required("text"),
        |args| Ok(Value::Str(format!("{}!", args.str(0)?.to_uppercase()))),
    ));
    registry.register_function(ClosureFunction::new(Signature::new("fail"), |_| {
        Err(EvalError::new(EvalErrorKind::HostError, "host refused"))
    }));
    registry
}

// ── Control flow ────────────────────────────────────────────────────────

#[test]
fn test_range_loop() {
    assert_eq!(render("<?for i in range(3)?><?print i?><?end for?>"), "012");
}

#[test]
fn test_if_elif_else_picks_first_true_branch() {
    let source = "<?if x > 2?>big<?elif x > 0?>small<?else?>none<?end if?>";
    assert_eq!(render_vars(source, &[("x", Value::Int(5))]), "big");
    assert_eq!(render_vars(source, &[("x", Value::Int(1))]), "small");
    assert_eq!(render_vars(source, &[("x", Value::Int(0))]), "none");
}

#[test]
fn test_def_called_as_function_discards_output() {
    assert_eq!(
        render("<?def f(n)?>ignored<?return n * 2?><?end def?><?print f(21)?>"),
        "42"
    );
}

#[test]
fn test_def_rendered_inline() {
    let source = "<?def row(x, sep=', ')?><?print x?><?print sep?><?end def?>\
                  <?for i in [1, 2]?><?code row.render(x=i)?><?end for?>";
    assert_eq!(render(source), "1, 2, ");
}

#[test]
fn test_whole_template_call_returns_value() {
    let t = Template::compile("text<?return [1, 2][-1]?>", CompileOptions::new()).unwrap();
    assert_eq!(t.call(Vars::new()).unwrap(), Value::Int(2));
}

// ── Variables and scoping ───────────────────────────────────────────────

#[test]
fn test_undefined_variable_prints_empty() {
    assert_eq!(render("[<?print missing?>]"), "[]");
}

#[test]
fn test_loop_variable_does_not_leak() {
    assert_eq!(render("<?for i in range(2)?><?end for?>[<?print i?>]"), "[]");
}

#[test]
fn test_comprehension_variable_does_not_leak() {
    assert_eq!(
        render("<?code l = [x * x for x in range(4) if x % 2]?><?print l?>[<?print x?>]"),
        "[1, 9][]"
    );
}

#[test]
fn test_loop_target_shadows_outer_variable() {
    assert_eq!(render("<?code x = 5?><?for x in [1]?><?end for?><?print x?>"), "5");
}

#[test]
fn test_assignment_in_loop_body_stays_in_the_loop() {
    let source = "<?code total = 0?><?for x in [1, 2, 3]?><?code total += x?><?end for?><?print total?>";
    assert_eq!(render(source), "0");
}

#[test]
fn test_break_out_of_huge_range() {
    assert_eq!(
        render("<?for i in range(1000000000000)?><?print i?><?break?><?end for?>"),
        "0"
    );
}

#[test]
fn test_host_variables() {
    let source = "<?for (k, v) in d.items()?><?print k?>=<?print v?>;<?end for?>";
    let d = Value::dict([("a", 1), ("b", 2)]);
    assert_eq!(render_vars(source, &[("d", d)]), "a=1;b=2;");
}

// ── Constant folding ────────────────────────────────────────────────────

#[test]
fn test_folded_and_unfolded_expressions_agree() {
    let folded = render("<?print (1 + 2) * 3 // 2?>|<?print 'ab' * 2?>|<?print not 0?>");
    let unfolded = render_vars(
        "<?print (a + b) * c // d?>|<?print s * b?>|<?print not z?>",
        &[
            ("a", Value::Int(1)),
            ("b", Value::Int(2)),
            ("c", Value::Int(3)),
            ("d", Value::Int(2)),
            ("s", Value::from("ab")),
            ("z", Value::Int(0)),
        ],
    );
    assert_eq!(folded, "4|abab|True");
    assert_eq!(folded, unfolded);
}

#[test]
fn test_failing_constant_is_reported_at_render() {
    let t = Template::compile("ok<?print 1 // 0?>", CompileOptions::new()).unwrap();
    let err = t.render_to_string(Vars::new()).unwrap_err();
    assert_eq!(err.kind, EvalErrorKind::ArithmeticError);
}

// ── Whitespace and delimiters ───────────────────────────────────────────

#[test]
fn test_linefeeds_are_stripped_unless_kept() {
    let source = "<?if 1?>\n\ta\n<?end if?>";
    assert_eq!(render(source), "a");
    let kept = Template::compile(source, CompileOptions::new().keepws(true)).unwrap();
    assert_eq!(kept.render_to_string(Vars::new()).unwrap(), "\n\ta\n");
}

#[test]
fn test_custom_delimiters() {
    let t = ul4::compile("{{print 6 * 7}}<?print x?>", None, false, "{{", "}}").unwrap();
    assert_eq!(t.render_to_string(Vars::new()).unwrap(), "42<?print x?>");
}

// ── Errors ──────────────────────────────────────────────────────────────

#[test]
fn test_unclosed_block_is_a_structural_error() {
    let err = Template::compile("<?for x in y?>", CompileOptions::new().name("page")).unwrap_err();
    assert_eq!(err.kind, ParseErrorKind::Structural);
}

#[test]
fn test_huge_repetition_is_an_arithmetic_error() {
    for source in [
        "<?print 'ab' * 9223372036854775807?>",
        "<?code n = 4611686018427387904?><?print len([1, 2, 3, 4] * n)?>",
    ] {
        let t = Template::compile(source, CompileOptions::new()).unwrap();
        let err = t.render_to_string(Vars::new()).unwrap_err();
        assert_eq!(err.kind, EvalErrorKind::ArithmeticError);
        assert_eq!(err.message, "repeat count too large");
    }
}

#[test]
fn test_syntax_error() {
    let err = Template::compile("<?print 1 +?>", CompileOptions::new()).unwrap_err();
    assert_eq!(err.kind, ParseErrorKind::Syntax);
}

// ── Registry ────────────────────────────────────────────────────────────

#[test]
fn test_custom_function() {
    let registry = make_registry();
    let t = Template::compile("<?print shout('hi')?><?print len('abc')?>", CompileOptions::new())
        .unwrap();
    let out: Result<String, _> = t.render_with(&registry, Vars::new()).collect();
    assert_eq!(out.unwrap(), "HI!3");
}

#[test]
fn test_host_error_propagates() {
    let registry = make_registry();
    let t = Template::compile("a<?print fail()?>", CompileOptions::new()).unwrap();
    let err = t.call_with(&registry, Vars::new()).unwrap_err();
    assert_eq!(err.kind, EvalErrorKind::HostError);
    assert_eq!(err.message, "host refused");
}

#[test]
fn test_render_is_lazy() {
    let t = Template::compile("a<?print 1 // x?>", CompileOptions::new()).unwrap();
    let mut vars = Vars::new();
    vars.insert("x".into(), Value::Int(0));
    let mut render = t.render(vars);
    assert_eq!(render.next().unwrap().unwrap(), "a");
    assert!(render.next().unwrap().is_err());
    assert!(render.next().is_none());
}
