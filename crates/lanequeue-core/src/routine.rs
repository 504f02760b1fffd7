//! The routine abstraction: a resumable computation driven one step at a time.
//!
//! A routine never suspends on its own. Whoever drives it calls [`Routine::step`] and reads the
//! returned [`Step`] to learn whether the routine paused, wants a nested routine run first,
//! marked a transparent suspension, or is exhausted.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::RoutineFault;
use crate::skip::SkipMarker;

/// Owned, type-erased routine.
pub type BoxRoutine = Box<dyn Routine>;

/// A resumable computation.
pub trait Routine {
    /// Advance by one step.
    fn step(&mut self) -> Result<Step, RoutineFault>;

    /// Name used in log fields.
    fn name(&self) -> &str {
        "routine"
    }
}

impl<R: Routine + ?Sized> Routine for Box<R> {
    fn step(&mut self) -> Result<Step, RoutineFault> {
        (**self).step()
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Plain values a routine can pause on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Suspend {
    /// Resume on the next tick.
    NextTick,
    /// Resume after this many ticks. Zero behaves like `NextTick`.
    Ticks(u32),
    /// Opaque value, recorded by the host. Costs one tick.
    Value(serde_json::Value),
}

/// Outcome of a single [`Routine::step`].
pub enum Step {
    /// Paused on a plain value.
    Pending(Suspend),
    /// Paused until the nested routine runs to completion.
    Blocked(BoxRoutine),
    /// Paused on a suspension that split scheduling must not cut at.
    Skip(SkipMarker),
    /// Exhausted.
    Done,
}

impl Step {
    pub fn next_tick() -> Self {
        Step::Pending(Suspend::NextTick)
    }

    pub fn ticks(n: u32) -> Self {
        Step::Pending(Suspend::Ticks(n))
    }

    pub fn value(value: impl Into<serde_json::Value>) -> Self {
        Step::Pending(Suspend::Value(value.into()))
    }

    pub fn nested(routine: impl Routine + 'static) -> Self {
        Step::Blocked(Box::new(routine))
    }

    /// Wrap a plain suspension in a [`SkipMarker`].
    pub fn skip(payload: Suspend) -> Self {
        Step::Skip(SkipMarker::new(payload))
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Step::Done)
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Pending(suspend) => f.debug_tuple("Pending").field(suspend).finish(),
            Step::Blocked(routine) => f.debug_tuple("Blocked").field(&routine.name()).finish(),
            Step::Skip(marker) => f.debug_tuple("Skip").field(marker).finish(),
            Step::Done => f.write_str("Done"),
        }
    }
}

impl From<Suspend> for Step {
    fn from(suspend: Suspend) -> Self {
        Step::Pending(suspend)
    }
}

impl From<SkipMarker> for Step {
    fn from(marker: SkipMarker) -> Self {
        Step::Skip(marker)
    }
}

/// Routine backed by an iterator of steps. Exhaustion of the iterator is `Done`.
pub struct FromIter<I> {
    iter: I,
    name: String,
}

impl<I> FromIter<I> {
    /// Rename the routine for log output.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl<I: Iterator<Item = Step>> Routine for FromIter<I> {
    fn step(&mut self) -> Result<Step, RoutineFault> {
        Ok(self.iter.next().unwrap_or(Step::Done))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Routine backed by a closure that returns one step per call.
pub struct FromFn<F> {
    f: F,
    name: String,
    finished: bool,
}

impl<F> FromFn<F> {
    /// Rename the routine for log output.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl<F> Routine for FromFn<F>
where
    F: FnMut() -> Result<Step, RoutineFault>,
{
    fn step(&mut self) -> Result<Step, RoutineFault> {
        // Once exhausted the closure is never called again
        if self.finished {
            return Ok(Step::Done);
        }
        let step = (self.f)()?;
        if step.is_done() {
            self.finished = true;
        }
        Ok(step)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Build a routine from any iterator of steps.
pub fn from_iter<I>(steps: I) -> FromIter<I::IntoIter>
where
    I: IntoIterator<Item = Step>,
{
    FromIter {
        iter: steps.into_iter(),
        name: "routine".to_string(),
    }
}

/// Build a routine from a closure.
pub fn from_fn<F>(f: F) -> FromFn<F>
where
    F: FnMut() -> Result<Step, RoutineFault>,
{
    FromFn {
        f,
        name: "routine".to_string(),
        finished: false,
    }
}

/// Build a routine that replays a fixed list of steps.
pub fn script(name: impl Into<String>, steps: Vec<Step>) -> FromIter<std::vec::IntoIter<Step>> {
    from_iter(steps).named(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_iter_is_done_after_exhaustion() {
        let mut routine = from_iter(vec![Step::value(1), Step::next_tick()]);
        assert!(matches!(routine.step(), Ok(Step::Pending(Suspend::Value(v))) if v == json!(1)));
        assert!(matches!(routine.step(), Ok(Step::Pending(Suspend::NextTick))));
        assert!(matches!(routine.step(), Ok(Step::Done)));
        assert!(matches!(routine.step(), Ok(Step::Done)));
    }

    #[test]
    fn test_from_fn_propagates_fault() {
        let mut calls = 0;
        let mut routine = from_fn(move || {
            calls += 1;
            if calls == 1 {
                Ok(Step::next_tick())
            } else {
                Err(RoutineFault::from("exploded"))
            }
        });
        assert!(routine.step().is_ok());
        let err = routine.step().unwrap_err();
        assert_eq!(err.message(), "exploded");
    }

    #[test]
    fn test_from_fn_stops_after_done() {
        let mut calls = 0;
        let mut routine = from_fn(move || {
            calls += 1;
            assert!(calls <= 1, "closure called after Done");
            Ok(Step::Done)
        });
        assert!(routine.step().unwrap().is_done());
        assert!(routine.step().unwrap().is_done());
    }

    #[test]
    fn test_script_name() {
        let routine = script("intro", vec![]);
        assert_eq!(routine.name(), "intro");
        let boxed: BoxRoutine = Box::new(routine);
        assert_eq!(boxed.name(), "intro");
    }

    #[test]
    fn test_step_debug_shows_nested_name() {
        let step = Step::nested(script("inner", vec![]));
        assert_eq!(format!("{:?}", step), "Blocked(\"inner\")");
    }

    #[test]
    fn test_suspend_serialization() {
        let json = serde_json::to_value(Suspend::Ticks(3)).unwrap();
        assert_eq!(json, json!({"kind": "ticks", "value": 3}));
        let json = serde_json::to_value(Suspend::NextTick).unwrap();
        assert_eq!(json, json!({"kind": "next_tick"}));
    }
}
