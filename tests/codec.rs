use std::sync::Once;

use tracing_subscriber::EnvFilter;
use ul4::codec::{self, VERSION};
use ul4::{CodecError, CompileOptions, Template, Value, Vars};

static INIT: Once = Once::new();

/// Log to the test output, filtered by `RUST_LOG`.
fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_env_filter(EnvFilter::from_default_env())
            .with_target(false)
            .try_init();
    });
}

const PAGE: &str = "\
<?def item(name, n=1)?>
  <li><?printx name?> x<?print n?></li>
<?end def?>
<ul>
<?for (i, name) in enumerate(names)?>
  <?if i >= limit?><?break?><?elif not name?><?continue?><?end if?>
  <?code item.render(name=name, n=i + 1)?>
<?end for?>
</ul>
<?code total = sum?><?code total += len(names)?><?print total?>";

fn vars() -> Vars {
    let mut vars = Vars::new();
    vars.insert("names".into(), Value::from(vec!["a&b", "", "c", "d"]));
    vars.insert("limit".into(), Value::Int(3));
    vars.insert("sum".into(), Value::Int(10));
    vars
}

fn page(options: CompileOptions) -> Template {
    Template::compile(PAGE, options.name("page")).unwrap()
}

// ── Round trips ─────────────────────────────────────────────────────────

#[test]
fn test_loaded_template_is_equal_and_renders_the_same() {
    init_tracing();
    for keepws in [false, true] {
        let template = page(CompileOptions::new().keepws(keepws));
        let loaded = ul4::load(&ul4::save(&template).unwrap()).unwrap();
        assert_eq!(loaded, template);
        assert_eq!(
            loaded.render_to_string(vars()).unwrap(),
            template.render_to_string(vars()).unwrap()
        );
    }
}

#[test]
fn test_rendered_page() {
    let out = page(CompileOptions::new()).render_to_string(vars()).unwrap();
    assert_eq!(out, "<ul><li>a&amp;b x1</li><li>c x3</li></ul>14");
}

#[test]
fn test_stream_round_trip() {
    init_tracing();
    let template = page(CompileOptions::new().delimiters("{%", "%}"));
    let mut buf = Vec::new();
    template.dump(&mut buf).unwrap();
    let loaded = Template::load_from(buf.as_slice()).unwrap();
    assert_eq!(loaded, template);
}

#[test]
fn test_values_survive_template_functions() {
    let t = Template::compile(
        "<?code d = {'a': [1, 2.5, None], 'b': @(2024-02-29T12:30:00), 'c': #f0c8}?>\
         <?print fromul4on(asul4on(d)) == d?>",
        CompileOptions::new(),
    )
    .unwrap();
    assert_eq!(t.render_to_string(Vars::new()).unwrap(), "True");
}

#[test]
fn test_template_value_round_trip() {
    let template = page(CompileOptions::new());
    let value = Value::from(template.clone());
    let Value::Template(closure) = codec::loads(&codec::dumps(&value).unwrap()).unwrap() else {
        panic!("expected a template");
    };
    assert_eq!(*closure.template, template);
}

// ── Errors ──────────────────────────────────────────────────────────────

#[test]
fn test_version_mismatch() {
    let dump = ul4::save(&page(CompileOptions::new())).unwrap();
    let old = dump.replacen(&format!("i{VERSION}"), "i1", 1);
    assert_eq!(
        ul4::load(&old),
        Err(CodecError::Version {
            expected: VERSION,
            found: 1
        })
    );
}

#[test]
fn test_unknown_node_tag() {
    let dump = ul4::save(&Template::compile("<?print x?>", CompileOptions::new()).unwrap()).unwrap();
    let bad = dump.replacen("(print", "(shout", 1);
    assert!(matches!(ul4::load(&bad), Err(CodecError::UnknownTag { tag, .. }) if tag == "shout"));
}

#[test]
fn test_truncated_stream() {
    let dump = ul4::save(&page(CompileOptions::new())).unwrap();
    let cut = dump[..dump.len() / 2].rfind(' ').unwrap();
    let truncated = &dump[..cut];
    assert!(matches!(ul4::load(truncated), Err(CodecError::Malformed { .. })));
}

#[test]
fn test_closures_are_not_serializable() {
    let t = Template::compile(
        "<?code x = 1?><?def f?><?print x?><?end def?><?return f?>",
        CompileOptions::new(),
    )
    .unwrap();
    let closure = t.call(Vars::new()).unwrap();
    assert_eq!(codec::dumps(&closure), Err(CodecError::NotSerializable("closure")));
}
