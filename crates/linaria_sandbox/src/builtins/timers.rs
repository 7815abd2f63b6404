//! Timers on a virtual clock.
//!
//! Callbacks never run while module code executes. The host drains them with
//! [`Sandbox::run_pending_timers`].

use std::collections::BTreeMap;

use crate::builtins::arg;
use crate::error::Throw;
use crate::sandbox::Sandbox;
use crate::value::Value;

/// Callbacks run by one `run_pending_timers` call, so intervals cannot spin
/// forever
const MAX_CALLBACKS_PER_RUN: usize = 10_000;

struct Timer {
  callback: Value,
  args: Vec<Value>,
  /// Repeat delay of `setInterval` timers
  interval: Option<f64>,
}

#[derive(Default)]
pub(crate) struct Timers {
  next_id: u32,
  /// Virtual time in milliseconds
  now: f64,
  /// Timers ordered by due time, then by creation order
  queue: BTreeMap<(u64, u32), Timer>,
  /// Timer whose callback is running, and whether it cleared itself
  running: Option<(u32, bool)>,
}

impl Timers {
  fn schedule(&mut self, timer: Timer, delay: f64) -> u32 {
    self.next_id += 1;
    let due = (self.now + delay.max(0.0)) as u64;
    self.queue.insert((due, self.next_id), timer);
    self.next_id
  }

  fn reschedule(&mut self, id: u32, timer: Timer, delay: f64) {
    let due = (self.now + delay.max(1.0)) as u64;
    self.queue.insert((due, id), timer);
  }

  fn clear(&mut self, id: u32) {
    if let Some((running, cleared)) = &mut self.running {
      if *running == id {
        *cleared = true;
      }
    }
    self.queue.retain(|(_, timer_id), _| *timer_id != id);
  }

  pub fn pending(&self) -> usize {
    self.queue.len()
  }
}

pub(super) fn install(sandbox: &mut Sandbox) {
  let global = sandbox.global.clone();

  sandbox.define_method(&global, "setTimeout", 2, |sandbox, _, args| {
    schedule(sandbox, args, false)
  });
  sandbox.define_method(&global, "setInterval", 2, |sandbox, _, args| {
    schedule(sandbox, args, true)
  });
  sandbox.define_method(&global, "setImmediate", 1, |sandbox, _, args| {
    let callback = sandbox.callback_arg(args, 0)?;
    let rest = args.get(1..).unwrap_or_default().to_vec();
    Ok(Value::from(sandbox.queue_callback(callback, rest, 0.0) as usize))
  });
  for name in ["clearTimeout", "clearInterval", "clearImmediate"] {
    sandbox.define_method(&global, name, 1, |sandbox, _, args| {
      if let Value::Number(id) = arg(args, 0) {
        sandbox.timers.clear(id as u32);
      }
      Ok(Value::Undefined)
    });
  }
}

fn schedule(sandbox: &mut Sandbox, args: &[Value], repeat: bool) -> Result<Value, Throw> {
  let callback = sandbox.callback_arg(args, 0)?;
  let delay = match arg(args, 1) {
    Value::Undefined => 0.0,
    value => sandbox.to_number(&value)?,
  };
  let delay = if delay.is_nan() { 0.0 } else { delay };
  let rest = args.get(2..).unwrap_or_default().to_vec();
  let timer = Timer {
    callback,
    args: rest,
    interval: repeat.then_some(delay),
  };
  Ok(Value::from(sandbox.timers.schedule(timer, delay) as usize))
}

impl Sandbox {
  /// Queue `callback(...args)` to run after `delay` virtual milliseconds
  pub(crate) fn queue_callback(&mut self, callback: Value, args: Vec<Value>, delay: f64) -> u32 {
    let timer = Timer {
      callback,
      args,
      interval: None,
    };
    self.timers.schedule(timer, delay)
  }

  /// Run due timers in order, advancing the virtual clock. Callbacks may
  /// schedule more timers; these run too. Errors thrown by callbacks are
  /// collected and do not stop the remaining timers.
  #[tracing::instrument(level = "trace", skip(self))]
  pub fn run_pending_timers(&mut self) -> Vec<Throw> {
    let mut errors = Vec::new();
    let mut ran = 0;
    while ran < MAX_CALLBACKS_PER_RUN {
      let Some(((due, id), timer)) = self.timers.queue.pop_first() else {
        break;
      };
      self.timers.now = self.timers.now.max(due as f64);
      ran += 1;
      self.timers.running = Some((id, false));
      if let Err(error) = self.call_function(&timer.callback, Value::Undefined, &timer.args) {
        errors.push(error);
      }
      let cleared = matches!(self.timers.running.take(), Some((_, true)));
      if let (Some(interval), false) = (timer.interval, cleared) {
        self.timers.reschedule(id, timer, interval);
      }
    }
    if ran == MAX_CALLBACKS_PER_RUN {
      tracing::warn!(pending = self.timers.pending(), "Stopped running sandbox timers");
    }
    errors
  }
}
