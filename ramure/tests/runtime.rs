mod common;

use common::{builder_with, config_with, setup};
use ramure::{
    Binding, Config, Context, FilterError, FnOutput, LOOP_VAR, LookupError, Markup, RenderError,
    Session, Template, UndefinedPolicy, Unpacking, Value,
};
use std::ops::ControlFlow;
use std::rc::Rc;
use std::sync::Arc;

fn render(config: &Arc<Config>, template: &Template, context: Context) -> String {
    config.render(template, context).unwrap()
}

#[test]
fn frames_shadow_and_restore() {
    setup();
    let template = Template::builder("frames")
        .root(|rt| {
            rt.assign("x", 42);
            let x = rt.lookup("x");
            rt.emit(&x)?;
            rt.write(";")?;
            rt.with_frame(|rt| {
                rt.assign("x", 23);
                let x = rt.lookup("x");
                rt.emit(&x)
            })?;
            rt.write(";")?;
            let x = rt.lookup("x");
            rt.emit(&x)
        })
        .build();
    let config = Arc::new(Config::default());
    assert_eq!(render(&config, &template, Context::new()), "42;23;42");
}

#[test]
fn cycle_across_loop_iterations() {
    setup();
    let template = Template::builder("rows")
        .root(|rt| {
            let rows = rt.lookup("rows");
            rt.for_loop(&rows, &Binding::name("row"), |rt, _| {
                let class = rt
                    .lookup(LOOP_VAR)
                    .call_method("cycle", &[Value::from("odd"), Value::from("even")])?;
                rt.emit(&class)?;
                rt.write(" ")?;
                Ok(ControlFlow::Continue(()))
            })?;
            Ok(())
        })
        .build();
    let config = Arc::new(Config::default());
    let out = render(
        &config,
        &template,
        Context::new().with("rows", vec![1, 2, 3, 4]),
    );
    assert_eq!(out, "odd even odd even ");
}

#[test]
fn nested_loops_expose_parent() {
    setup();
    let template = Template::builder("grid")
        .root(|rt| {
            let rows = rt.lookup("rows");
            rt.for_loop(&rows, &Binding::name("row"), |rt, _| {
                let row = rt.lookup("row");
                rt.for_loop(&row, &Binding::name("cell"), |rt, ctx| {
                    let outer = rt.lookup(LOOP_VAR).get_attr("parent").get_attr("index");
                    rt.emit(&outer)?;
                    rt.write(".")?;
                    rt.emit(&Value::from(ctx.index()))?;
                    rt.write("=")?;
                    let cell = rt.lookup("cell");
                    rt.emit(&cell)?;
                    rt.write(" ")?;
                    Ok(ControlFlow::Continue(()))
                })?;
                Ok(ControlFlow::Continue(()))
            })?;
            Ok(())
        })
        .build();

    let rows = Value::from(vec![Value::from(vec!["a", "b"]), Value::from(vec!["c"])]);
    let config = Arc::new(Config::default());
    let out = render(&config, &template, Context::new().with("rows", rows));
    assert_eq!(out, "1.1=a 1.2=b 2.1=c ");
}

#[test]
fn loop_else_and_break() {
    setup();
    let template = Template::builder("loops")
        .root(|rt| {
            let items = rt.lookup("items");
            rt.for_loop_else(
                &items,
                &Binding::name("item"),
                |rt, ctx| {
                    let item = rt.lookup("item");
                    rt.emit(&item)?;
                    Ok(if ctx.index() == 2 {
                        ControlFlow::Break(())
                    } else {
                        ControlFlow::Continue(())
                    })
                },
                |rt| rt.write("nothing"),
            )
        })
        .build();
    let config = Arc::new(Config::default());

    let full = Context::new().with("items", vec!["a", "b", "c"]);
    assert_eq!(render(&config, &template, full), "ab");
    let empty = Context::new().with("items", Vec::<Value>::new());
    assert_eq!(render(&config, &template, empty), "nothing");
    // an undefined iterable loops zero times under the lenient policy
    assert_eq!(render(&config, &template, Context::new()), "nothing");
}

#[test]
fn tuple_unpacking_in_loops() {
    setup();
    let template = Template::builder("pairs")
        .root(|rt| {
            let pairs = rt.lookup("pairs");
            rt.for_loop(&pairs, &Binding::tuple(["k", "v"]), |rt, _| {
                let k = rt.lookup("k");
                rt.emit(&k)?;
                rt.write("=")?;
                let v = rt.lookup("v");
                rt.emit(&v)?;
                rt.write(";")?;
                Ok(ControlFlow::Continue(()))
            })?;
            Ok(())
        })
        .build();

    let pairs = Value::from(vec![
        Value::from(vec![Value::from("a"), Value::from(1)]),
        Value::from(vec![Value::from("b")]),
    ]);
    let context = || Context::new().with("pairs", pairs.clone());

    let lenient = Arc::new(Config::default());
    assert_eq!(render(&lenient, &template, context()), "a=1;b=;");

    let strict = Arc::new(
        Config::builder()
            .unpacking(Unpacking {
                strict: true,
                ..Unpacking::default()
            })
            .build(),
    );
    let err = strict.render(&template, context()).unwrap_err();
    insta::assert_snapshot!(err, @"Cannot unpack 1 value(s) into 2 name(s)");
}

#[test]
fn tuple_assignment_exports_each_name() {
    setup();
    let template = Template::builder("assign")
        .root(|rt| {
            rt.assign_binding(
                &Binding::tuple(["a", "b"]),
                Value::from(vec!["x", "y"]),
            )?;
            let a = rt.lookup("a");
            rt.emit(&a)?;
            let b = rt.lookup("b");
            rt.emit(&b)?;
            let exported: Vec<_> = rt.session().exports().keys().cloned().collect();
            assert_eq!(exported, ["a", "b"]);
            Ok(())
        })
        .build();
    let config = Arc::new(Config::default());
    assert_eq!(render(&config, &template, Context::new()), "xy");
}

#[test]
fn strict_undefined_policy() {
    setup();
    let emit_missing = Template::builder("emit")
        .root(|rt| {
            let missing = rt.lookup("missing");
            rt.emit(&missing)
        })
        .build();
    let loop_missing = Template::builder("loop")
        .root(|rt| {
            let missing = rt.lookup("items");
            rt.for_loop(&missing, &Binding::name("x"), |_, _| {
                Ok(ControlFlow::Continue(()))
            })?;
            Ok(())
        })
        .build();

    let lenient = Arc::new(Config::default());
    assert_eq!(render(&lenient, &emit_missing, Context::new()), "");

    let strict = Arc::new(Config::builder().undefined(UndefinedPolicy::Strict).build());
    let err = strict.render(&emit_missing, Context::new()).unwrap_err();
    assert!(matches!(err, RenderError::Undefined(ref e) if e.name == "missing"));
    assert!(!err.is_lookup_failure());

    let err = strict.render(&loop_missing, Context::new()).unwrap_err();
    insta::assert_snapshot!(err, @"Variable `items` is not defined");

    // explicitly testing for undefined is always allowed
    let is_defined = Template::builder("is_defined")
        .root(|rt| {
            let defined = rt.call_test("defined", &rt.lookup("missing"), &[])?;
            rt.emit(&Value::from(defined))
        })
        .build();
    let strict = Arc::new(
        Config::builder()
            .undefined(UndefinedPolicy::Strict)
            .test("defined", |v, _| Ok(!v.is_undefined()))
            .build(),
    );
    assert_eq!(render(&strict, &is_defined, Context::new()), "false");
}

#[test]
fn filters_and_tests_are_looked_up_by_name() {
    setup();
    let template = Template::builder("filters")
        .root(|rt| {
            let word = rt.lookup("word");
            let shouted = rt.call_filter("upper", &word, &[])?;
            let repeated = rt.call_filter("repeat", &shouted, &[Value::from(3)])?;
            rt.emit(&repeated)?;
            if rt.call_test("even", &Value::from(4), &[])? {
                rt.write("!")?;
            }
            Ok(())
        })
        .build();

    let config = Arc::new(
        Config::builder()
            .filter("upper", |v, _| {
                Ok(Value::from(v.render_to_string().to_uppercase()))
            })
            .filter("repeat", |v, args| {
                let times = match args.first() {
                    Some(Value::Int(n)) => usize::try_from(*n)
                        .map_err(|_| FilterError::new("repeat", "count must not be negative"))?,
                    _ => return Err(FilterError::new("repeat", "expected a count").into()),
                };
                Ok(Value::from(v.render_to_string().repeat(times)))
            })
            .test("even", |v, _| Ok(matches!(v, Value::Int(n) if n % 2 == 0)))
            .build(),
    );
    assert_eq!(
        render(&config, &template, Context::new().with("word", "ha")),
        "HAHAHA!"
    );
}

#[test]
fn unknown_filter_is_fatal() {
    setup();
    let template = Template::builder("bad")
        .root(|rt| {
            rt.write("partial output")?;
            let value = rt.call_filter("nope", &Value::None, &[])?;
            rt.emit(&value)
        })
        .build();
    let config = Arc::new(Config::builder().filter("upper", |v, _| Ok(v.clone())).build());
    let err = config.render(&template, Context::new()).unwrap_err();
    assert!(err.is_lookup_failure());
    assert!(matches!(
        &err,
        RenderError::Lookup(LookupError::UnknownFilter { name, known }) if name == "nope" && known == &["upper"]
    ));
}

#[test]
fn filter_blocks_capture_and_pipe_output() {
    setup();
    let template = Template::builder("page.html")
        .root(|rt| {
            rt.filter_block("indent", &[Value::from(2)], |rt| {
                rt.write("<li>")?;
                let item = rt.lookup("item");
                rt.emit(&item)?;
                rt.write("</li>")
            })
        })
        .build();

    let config = Arc::new(
        Config::builder()
            .autoescape(true)
            .filter("indent", |v, args| {
                let width = match args.first() {
                    Some(Value::Int(n)) => usize::try_from(*n).unwrap_or(0),
                    _ => 4,
                };
                let text = format!("{}{}", " ".repeat(width), v.render_to_string());
                Ok(Value::Markup(Markup::from_safe(text)))
            })
            .build(),
    );
    let out = render(&config, &template, Context::new().with("item", "a&b"));
    assert_eq!(out, "  <li>a&amp;b</li>");
}

#[test]
fn markup_and_autoescape_blocks() {
    setup();
    let template = Template::builder("page.html")
        .root(|rt| {
            let raw = rt.lookup("raw");
            rt.emit(&raw)?;
            rt.write("|")?;
            let trusted = rt.mark_safe_if_autoescape(raw.clone());
            rt.emit(&trusted)?;
            rt.write("|")?;
            rt.with_autoescape(false, |rt| rt.emit(&raw))?;
            rt.write("|")?;
            let markup = rt.lookup("markup");
            rt.emit(&markup)
        })
        .build();

    let config = Arc::new(Config::builder().autoescape(true).build());
    let context = Context::new()
        .with("raw", "<i>")
        .with("markup", Markup::from_safe("<em>ok</em>"));
    assert_eq!(
        render(&config, &template, context),
        "&lt;i&gt;|<i>|<i>|<em>ok</em>"
    );

    // without autoescape nothing is escaped and nothing is wrapped
    let plain = Arc::new(Config::default());
    let context = Context::new()
        .with("raw", "<i>")
        .with("markup", Markup::from_safe("<em>ok</em>"));
    assert_eq!(
        render(&plain, &template, context),
        "<i>|<i>|<i>|<em>ok</em>"
    );
}

#[test]
fn output_goes_to_a_callable_sink_in_order() {
    setup();
    let template = Template::builder("chunks")
        .root(|rt| {
            rt.write("a")?;
            rt.emit(&Value::from(1))?;
            rt.write("b")
        })
        .build();
    let config = Arc::new(Config::default());

    let mut chunks = Vec::new();
    let mut sink = FnOutput(|chunk: &str| chunks.push(chunk.to_string()));
    config
        .evaluate_template(&template, Context::new(), &mut sink, None)
        .unwrap();
    assert_eq!(chunks, ["a", "1", "b"]);
}

#[test]
fn caller_provided_session_is_reused() {
    setup();
    let shared = Template::builder("shared.html")
        .root(|rt| rt.write("shared"))
        .build();
    let page = Template::builder("page.html")
        .root(|rt| rt.include_template("shared.html", false))
        .build();
    let config = config_with([shared]);

    let session = Rc::new(Session::new(Arc::clone(&config), Some("page.html")));
    let mut out = String::new();
    config
        .evaluate_template(&page, Context::new(), &mut out, Some(Rc::clone(&session)))
        .unwrap();
    assert_eq!(out, "shared");
    assert!(session.is_cached("shared.html"));
}

#[test]
fn template_not_found_propagates() {
    setup();
    let config = builder_with([]).build();
    let err = Arc::new(config)
        .render_named("missing.html", Context::new())
        .unwrap_err();
    assert!(err.is_template_not_found());
    assert!(err.is_lookup_failure());
}
