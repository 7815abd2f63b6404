use indoc::indoc;
use linaria_sandbox::{ConsoleLevel, Sandbox, SandboxOptions, Throw, Value};
use pretty_assertions::assert_eq;

fn run_in(sandbox: &mut Sandbox, code: &str) -> Result<Value, Throw> {
  let func = sandbox.compile_function(code, "/test.js", &[]).unwrap();
  sandbox.call(&func, Value::Undefined, &[])
}

/// Result of `code` as the string `String(result)` would give
fn eval_string(code: &str) -> String {
  let mut sandbox = Sandbox::new(SandboxOptions::default());
  let value = run_in(&mut sandbox, code).unwrap_or_else(|error| panic!("{error}"));
  sandbox.to_display_string(&value).unwrap()
}

/// What a thrown value looked like. Read before the sandbox, and with it the
/// thrown object, goes away.
struct Caught {
  message: String,
  stack: Option<String>,
  type_of: &'static str,
}

fn eval_error(code: &str) -> Caught {
  let mut sandbox = Sandbox::new(SandboxOptions::default());
  match run_in(&mut sandbox, code) {
    Ok(value) => panic!("expected an exception, got {value:?}"),
    Err(error) => Caught {
      message: error.message(),
      stack: error.stack(),
      type_of: error.value().type_of(),
    },
  }
}

#[test]
fn globals_do_not_leak_between_sandboxes() {
  let mut first = Sandbox::new(SandboxOptions::default());
  let mut second = Sandbox::new(SandboxOptions::default());
  run_in(&mut first, "globalThis.leaked = 1; Array.prototype.extra = 2;").unwrap();

  let value = run_in(
    &mut second,
    "return typeof leaked + ':' + typeof [].extra + ':' + (global === window);",
  )
  .unwrap();
  assert_eq!(second.to_display_string(&value).unwrap(), "undefined:undefined:true");
}

#[test]
fn process_env_is_read_only() {
  let mut sandbox = Sandbox::new(SandboxOptions {
    node_env: Some("production".into()),
    ..Default::default()
  });
  let value = run_in(&mut sandbox, "return process.env.NODE_ENV + ':' + process.env.isVM;").unwrap();
  assert_eq!(sandbox.to_display_string(&value).unwrap(), "production:true");

  let error = run_in(&mut sandbox, "process.env.NODE_ENV = 'development';").unwrap_err();
  assert!(error.message().contains("read only"), "{}", error.message());
}

#[test]
fn process_binding_throws() {
  let error = eval_error("process.binding('fs');");
  assert_eq!(error.message, "No such module. (Possibly not yet loaded)");
  assert_eq!(eval_string("return process.cwd() + process.platform;"), "/browser");
}

#[test]
fn errors_carry_a_stack() {
  let error = eval_error(indoc! {r#"
    function fail() {
      return missing + 1;
    }
    fail();
  "#});
  let stack = error.stack.unwrap();
  assert!(
    stack.starts_with("ReferenceError: missing is not defined\n    at fail (/test.js:2:"),
    "{stack}"
  );
}

#[test]
fn runs_classes_with_inheritance() {
  let result = eval_string(indoc! {r#"
    class Shape {
      static count = 0;
      constructor(sides) {
        this._sides = sides;
        Shape.count++;
      }
      get sides() {
        return this._sides;
      }
      describe() {
        return `${this.constructor.name} with ${this.sides} sides`;
      }
    }
    class Square extends Shape {
      constructor() {
        super(4);
      }
      describe() {
        return 'A ' + super.describe();
      }
    }
    const square = new Square();
    return [square.describe(), Shape.count, square instanceof Shape].join('|');
  "#});
  assert_eq!(result, "A Square with 4 sides|1|true");
}

#[test]
fn supports_destructuring_and_spread() {
  let result = eval_string(indoc! {r#"
    const { a, b: [first, ...others], c = 'fallback', ...rest } = {
      a: 1,
      b: [2, 3, 4],
      d: 5,
      e: 6,
    };
    const merged = { ...rest, a };
    return [a, first, others.length, c, Object.keys(merged).join(), Math.max(...others)].join(' ');
  "#});
  assert_eq!(result, "1 2 2 fallback d,e,a 4");
}

#[test]
fn optional_chaining_and_nullish_coalescing() {
  let result = eval_string(indoc! {r#"
    const theme = { colors: { primary: 'red' } };
    return [theme.colors?.primary, theme.spacing?.small, theme.fonts?.[0] ?? 'serif', null ?? 0].join(',');
  "#});
  assert_eq!(result, "red,,serif,0");
}

#[test]
fn regular_expressions() {
  let result = eval_string(indoc! {r#"
    const color = '#ff00AA';
    const [, r, g, b] = /^#(\w{2})(\w{2})(\w{2})$/.exec(color);
    const kebab = 'backgroundColor'.replace(/[A-Z]/g, (m) => '-' + m.toLowerCase());
    return [r, g, b, kebab, 'a1b22c'.split(/\d+/).join('/')].join(' ');
  "#});
  assert_eq!(result, "ff 00 AA background-color a/b/c");

  let error = eval_error("return /(?<=a)b/.test('ab');");
  assert!(error.message.contains("Invalid regular expression"), "{}", error.message);
}

#[test]
fn json_round_trip() {
  let result = eval_string(indoc! {r#"
    const value = JSON.parse('{"a":[1,2,{"b":null}],"c":"d"}');
    return JSON.stringify(value, null, 2);
  "#});
  assert_eq!(
    result,
    indoc! {r#"
      {
        "a": [
          1,
          2,
          {
            "b": null
          }
        ],
        "c": "d"
      }"#}
  );

  let error = eval_error("const a = {}; a.self = a; JSON.stringify(a);");
  assert!(error.message.starts_with("Converting circular structure to JSON"));
}

#[test]
fn console_output_is_buffered() {
  let mut sandbox = Sandbox::new(SandboxOptions::default());
  run_in(
    &mut sandbox,
    "console.log('size %d', 10, { a: 'b' });\nconsole.warn([1, 'x']);",
  )
  .unwrap();

  let output = sandbox.take_console_output();
  assert_eq!(output.len(), 2);
  assert_eq!(output[0].level, ConsoleLevel::Log);
  assert_eq!(output[0].message, "size 10 { a: 'b' }");
  assert_eq!(output[0].origin.as_deref(), Some("/test.js:1"));
  assert_eq!(output[1].level, ConsoleLevel::Warn);
  assert_eq!(output[1].message, "[ 1, 'x' ]");
  assert!(sandbox.take_console_output().is_empty());
}

#[test]
fn logged_errors_print_their_stack() {
  let mut sandbox = Sandbox::new(SandboxOptions::default());
  run_in(&mut sandbox, "console.error(new RangeError('too big'));").unwrap();

  let output = sandbox.take_console_output();
  assert_eq!(output[0].level, ConsoleLevel::Error);
  assert!(output[0].message.starts_with("RangeError: too big\n    at "), "{}", output[0].message);
}

#[test]
fn functions_print_their_source() {
  let source = eval_string("function add(a, b) { return a + b; } return add.toString();");
  assert!(source.contains("(a, b) { return a + b; }"), "{source}");
  assert_eq!(eval_string("return String(Math.max);"), "function max() { [native code] }");
}

#[test]
fn timers_run_on_demand() {
  let mut sandbox = Sandbox::new(SandboxOptions::default());
  run_in(
    &mut sandbox,
    indoc! {r#"
      globalThis.order = [];
      setTimeout(() => order.push('late'), 20);
      setTimeout(() => order.push('early'), 10);
      process.nextTick(() => order.push('tick'));
      let count = 0;
      const id = setInterval(() => {
        order.push('interval');
        if (++count === 2) clearInterval(id);
      }, 15);
    "#},
  )
  .unwrap();
  let before = run_in(&mut sandbox, "return order.length;").unwrap();
  assert_eq!(before.as_number(), Some(0.0));

  let errors = sandbox.run_pending_timers();
  assert!(errors.is_empty());
  let order = run_in(&mut sandbox, "return order.join();").unwrap();
  assert_eq!(
    sandbox.to_display_string(&order).unwrap(),
    "tick,early,interval,late,interval"
  );
}

#[test]
fn url_and_search_params() {
  let result = eval_string(indoc! {r#"
    const url = new URL('/path/../icons?size=2#top', 'https://example.com');
    url.searchParams.append('ignored', '1');
    const params = new URLSearchParams({ b: '2', a: 'x y' });
    params.sort();
    return [url.href, url.hostname, url.pathname, url.hash, params.toString()].join(' ');
  "#});
  assert_eq!(
    result,
    "https://example.com/icons?size=2#top example.com /icons #top a=x+y&b=2"
  );

  let error = eval_error("new URL('not a url');");
  assert_eq!(error.message, "Invalid URL: not a url");
}

#[test]
fn frozen_objects_reject_writes() {
  let error = eval_error("const o = Object.freeze({ a: 1 }); o.a = 2;");
  assert!(error.message.contains("read only property 'a'"), "{}", error.message);

  let error = eval_error("Object.preventExtensions([]).push(1);");
  assert!(error.message.contains("not extensible"), "{}", error.message);
}

#[test]
fn node_polyfills() {
  let mut sandbox = Sandbox::new(SandboxOptions::default());
  let path = sandbox.node_module("path").unwrap();
  let join = sandbox.get(&path, "join").unwrap();
  let joined = sandbox
    .call(&join, path.clone(), &["/a/b".into(), "../c".into(), "d.css".into()])
    .unwrap();
  assert_eq!(sandbox.to_display_string(&joined).unwrap(), "/a/c/d.css");

  let events = sandbox.node_module("node:events").unwrap();
  let again = sandbox.node_module("events").unwrap();
  assert!(events.strict_equals(&again));

  let emitter = sandbox.construct(&events, &[]).unwrap();
  let func = sandbox
    .compile_function(
      "let total = 0; emitter.on('add', (n) => { total += n; }); emitter.emit('add', 2); emitter.emit('add', 3); return total;",
      "/events.js",
      &["emitter"],
    )
    .unwrap();
  let total = sandbox.call(&func, Value::Undefined, &[emitter]).unwrap();
  assert_eq!(total.as_number(), Some(5.0));
}

#[test]
fn document_shim() {
  let result = eval_string(indoc! {r#"
    const style = document.createElement('style');
    style.setAttribute('id', 'theme');
    style.appendChild(document.createTextNode('.a{}'));
    document.head.appendChild(style);
    return document.getElementById('theme').textContent + style.getAttribute('missing');
  "#});
  assert_eq!(result, ".a{}null");
}

#[test]
fn calling_generators_is_unsupported() {
  let error = eval_error("function* gen() { yield 1; } gen();");
  assert_eq!(error.type_of, "object");
  assert!(error.stack.unwrap().starts_with("TypeError"));
}

#[test]
fn thrown_values_are_emptied_with_their_sandbox() {
  let mut sandbox = Sandbox::new(SandboxOptions::default());
  let error = run_in(&mut sandbox, "throw new TypeError('boom');").unwrap_err();
  assert_eq!(error.message(), "boom");
  assert!(error.stack().is_some());

  drop(sandbox);
  assert_eq!(error.message(), "[object Object]");
  assert_eq!(error.stack(), None);
}
