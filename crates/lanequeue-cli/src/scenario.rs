//! Built-in scenarios and the tick loop that runs them.

use std::rc::Rc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tracing::{info, warn};

use lanequeue_core::routine::{from_fn, script};
use lanequeue_core::{CoreError, GameState, RoutineFault, Step, Suspend};
use lanequeue_scheduler::{
    HostConfig, HostError, ModuleContext, Observation, QueueRegistry, SchedulerConfig, TickHost,
};

/// Scenario run errors.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Host(#[from] HostError),
}

/// Built-in scenarios.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Scenario {
    /// Three routines on one lane, run strictly in order
    Fifo,
    /// A split routine interleaving with routines queued after its first pause
    Split,
    /// A split routine whose skip-marked pause keeps the lane
    Skip,
    /// A faulting routine followed by one that still runs
    Fault,
    /// A host state change in the middle of a lane
    Reset,
}

impl Scenario {
    pub fn describe(&self) -> &'static str {
        match self {
            Scenario::Fifo => "three routines on one lane, run strictly in order",
            Scenario::Split => "split routine interleaving with later submissions",
            Scenario::Skip => "split routine with a transparent skip-marked pause",
            Scenario::Fault => "faulting routine does not wedge its lane",
            Scenario::Reset => "state change resets lanes mid-run",
        }
    }

    /// Enqueue the scenario's initial work.
    fn start(&self, module: &ModuleContext) -> Result<(), CoreError> {
        match self {
            Scenario::Fifo => module.queue_on(
                "fifo",
                ["a", "b", "c"].map(|name| {
                    script(
                        name,
                        vec![
                            Step::value(format!("{}1", name)),
                            Step::value(format!("{}2", name)),
                        ],
                    )
                }),
            ),
            Scenario::Split => module.queue_split(
                true,
                [script(
                    "s",
                    vec![Step::value("s1"), Step::value("s2"), Step::value("s3")],
                )],
            ),
            Scenario::Skip => module.queue_split(
                true,
                [script(
                    "s",
                    vec![
                        Step::value(1),
                        Step::skip(Suspend::Value(json!(2))),
                        Step::value(3),
                    ],
                )],
            ),
            Scenario::Fault => {
                let faulty = from_fn(|| Err(RoutineFault::from("scenario fault"))).named("faulty");
                module.queue([faulty])?;
                module.queue([script("after", vec![Step::value("after")])])
            }
            Scenario::Reset => module.queue_on(
                "anim",
                [
                    script("long", vec![Step::value("l1"), Step::ticks(5), Step::value("l2")]),
                    script("dropped", vec![Step::value("never")]),
                ],
            ),
        }
    }

    /// React after a tick has run.
    fn after_tick(
        &self,
        tick: u64,
        module: &ModuleContext,
        host: &TickHost,
    ) -> Result<(), CoreError> {
        match (self, tick) {
            (Scenario::Split, 1) | (Scenario::Skip, 1) => module.queue([
                script("b", vec![Step::value("b")]),
                script("c", vec![Step::value("c")]),
            ]),
            (Scenario::Reset, 2) => {
                module.on_state_change(GameState::Transitioning);
                let stopped = host.stop_all();
                info!(stopped, "Host stopped in-flight routines");
                module.queue_on("anim", [script("fresh", vec![Step::value("fresh")])])
            }
            _ => Ok(()),
        }
    }
}

/// Settings for one scenario run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub scheduler: SchedulerConfig,
    pub host: HostConfig,
}

/// Outcome of one scenario run.
#[derive(Debug, Serialize)]
pub struct Report {
    pub scenario: Scenario,
    pub ticks: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub observations: Vec<Observation>,
}

impl Report {
    /// One line per observation.
    pub fn render_text(&self) -> String {
        let mut out = format!(
            "scenario {:?}: {} ticks, {} observations\n",
            self.scenario,
            self.ticks,
            self.observations.len()
        );
        for o in &self.observations {
            let what = match &o.suspend {
                Suspend::Value(v) => v.to_string(),
                Suspend::NextTick => "next tick".to_string(),
                Suspend::Ticks(n) => format!("wait {} ticks", n),
            };
            out.push_str(&format!(
                "  tick {:>3}  #{:<3} {:<8} {}\n",
                o.tick, o.handle, o.routine, what
            ));
        }
        out
    }
}

/// Run a scenario to completion, ticking the host on a timer.
pub async fn run(scenario: Scenario, config: RunConfig) -> Result<Report, RunError> {
    let host = TickHost::new(config.host.clone());
    let registry = QueueRegistry::new(host.clone(), config.scheduler.clone());
    let module = ModuleContext::new("scenario", Rc::clone(&registry));
    let started_at = Utc::now();

    info!(scenario = ?scenario, owner = %module.owner(), "Starting scenario");
    scenario.start(&module)?;

    let period = Duration::from_millis(config.host.tick_interval_ms.max(1));
    let mut interval = tokio::time::interval(period);
    while !host.is_idle() {
        if host.current_tick() >= config.host.max_ticks {
            warn!(max_ticks = config.host.max_ticks, "Scenario did not settle");
            return Err(HostError::TickBudgetExceeded(config.host.max_ticks).into());
        }
        interval.tick().await;
        host.tick();
        scenario.after_tick(host.current_tick(), &module, &host)?;
    }

    let report = Report {
        scenario,
        ticks: host.current_tick(),
        started_at,
        finished_at: Utc::now(),
        observations: host.take_observed(),
    };
    info!(ticks = report.ticks, lanes = registry.lane_count(), "Scenario finished");
    Ok(report)
}
