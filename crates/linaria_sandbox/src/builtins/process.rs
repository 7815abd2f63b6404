//! Frozen `process` shim. Host environment never leaks in beyond `NODE_ENV`
//! and `DEBUG`.

use crate::error::ErrorType;
use crate::object::Integrity;
use crate::sandbox::Sandbox;
use crate::value::Value;

const NOOPS: [&str; 8] = [
  "exit",
  "kill",
  "chdir",
  "umask",
  "dlopen",
  "uptime",
  "memoryUsage",
  "uvCounters",
];

pub(super) fn install(sandbox: &mut Sandbox) {
  let process = sandbox.define_namespace("process");

  let env = sandbox.alloc_object();
  let node_env = optional_string(sandbox.options.node_env.as_deref());
  let debug = optional_string(sandbox.options.debug.as_deref());
  for (name, value) in [
    ("NODE_ENV", node_env),
    ("isVM", Value::Bool(true)),
    ("DEBUG", debug),
  ] {
    sandbox.define_own_data(&env, name, value);
  }
  Sandbox::set_integrity(&env, Integrity::Frozen);

  sandbox.define_own_data(&process, "env", Value::Object(env));
  for name in ["platform", "arch", "execPath", "title"] {
    sandbox.define_own_data(&process, name, Value::from("browser"));
  }
  sandbox.define_own_data(&process, "pid", Value::Number(1.0));
  sandbox.define_own_data(&process, "browser", Value::Bool(true));
  let argv = sandbox.new_array(vec![]);
  sandbox.define_own_data(&process, "argv", argv);
  let features = sandbox.new_object();
  sandbox.define_own_data(&process, "features", features);

  sandbox.define_method(&process, "nextTick", 1, |sandbox, _, args| {
    let callback = sandbox.callback_arg(args, 0)?;
    let rest = args.get(1..).unwrap_or_default().to_vec();
    sandbox.queue_callback(callback, rest, 0.0);
    Ok(Value::Undefined)
  });
  sandbox.define_method(&process, "binding", 1, |sandbox, _, _| {
    Err(sandbox.throw_error(
      ErrorType::Error,
      "No such module. (Possibly not yet loaded)",
    ))
  });
  sandbox.define_method(&process, "cwd", 0, |_, _, _| Ok(Value::from("/")));
  for name in NOOPS {
    sandbox.define_method(&process, name, 0, |_, _, _| Ok(Value::Undefined));
  }

  Sandbox::set_integrity(&process, Integrity::Frozen);
  sandbox
    .node_modules
    .insert("process".into(), Value::Object(process));
}

fn optional_string(value: Option<&str>) -> Value {
  value.map(Value::from).unwrap_or_default()
}
