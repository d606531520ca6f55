//! Simulated [`Launcher`] for exercising the orchestration without real
//! processes. Timing runs on tokio's clock, so tests pair it with
//! `#[tokio::test(start_paused = true)]`.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

use crate::command::{Invocation, Mode};
use crate::process::{ExitOutcome, Launcher, WorkerProcess};

/// Behaviour of the simulated `prepare` call.
#[derive(Debug, Clone)]
pub struct ProvisionScript {
    pub runtime: Duration,
    pub exit_code: i32,
    /// Raw contents written to `account_file` when the process exits.
    pub file_contents: Option<String>,
    pub account_file: PathBuf,
    pub fail_spawn: bool,
}

impl ProvisionScript {
    /// Succeeds after `runtime`, writing `accounts` as a JSON array.
    pub fn writing(account_file: PathBuf, accounts: &[&str], runtime: Duration) -> Self {
        Self {
            runtime,
            exit_code: 0,
            file_contents: Some(serde_json::to_string(accounts).unwrap()),
            account_file,
            fail_spawn: false,
        }
    }
}

/// Behaviour of one simulated `batch` worker.
#[derive(Debug, Clone, Copy)]
pub struct WorkerScript {
    pub runtime: Duration,
    pub exit_code: i32,
    pub fail_spawn: bool,
}

impl WorkerScript {
    pub fn exits(runtime: Duration, exit_code: i32) -> Self {
        Self {
            runtime,
            exit_code,
            fail_spawn: false,
        }
    }

    pub fn unlaunchable() -> Self {
        Self {
            runtime: Duration::ZERO,
            exit_code: 0,
            fail_spawn: true,
        }
    }
}

#[derive(Debug, Clone)]
pub enum SimEvent {
    Spawned {
        id: u32,
        invocation: Invocation,
        at: Instant,
    },
    SpawnFailed {
        invocation: Invocation,
        at: Instant,
    },
    Exited {
        id: u32,
        mode: Mode,
        at: Instant,
    },
    Killed {
        id: u32,
        at: Instant,
    },
}

#[derive(Default)]
struct SimState {
    provision: Option<ProvisionScript>,
    workers: VecDeque<WorkerScript>,
    default_worker: Option<WorkerScript>,
    next_id: u32,
    events: Vec<SimEvent>,
}

#[derive(Clone, Default)]
pub struct SimulatedLauncher {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedLauncher {
    pub fn new(provision: ProvisionScript) -> Self {
        let launcher = Self::default();
        launcher.state.lock().unwrap().provision = Some(provision);
        launcher
    }

    /// Scripts consumed by batch launches in order; once exhausted, the
    /// default script applies.
    pub fn with_workers(self, scripts: impl IntoIterator<Item = WorkerScript>) -> Self {
        self.state.lock().unwrap().workers.extend(scripts);
        self
    }

    pub fn with_default_worker(self, script: WorkerScript) -> Self {
        self.state.lock().unwrap().default_worker = Some(script);
        self
    }

    pub fn events(&self) -> Vec<SimEvent> {
        self.state.lock().unwrap().events.clone()
    }

    /// Batch invocations that started, with their start time.
    pub fn batch_launches(&self) -> Vec<(Instant, Invocation)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                SimEvent::Spawned { invocation, at, .. } if invocation.mode == Mode::Batch => {
                    Some((at, invocation))
                }
                _ => None,
            })
            .collect()
    }

    pub fn provision_calls(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| {
                matches!(
                    e,
                    SimEvent::Spawned { invocation, .. } if invocation.mode == Mode::Provision
                )
            })
            .count()
    }

    pub fn provision_exit(&self) -> Option<Instant> {
        self.events().into_iter().find_map(|e| match e {
            SimEvent::Exited {
                mode: Mode::Provision,
                at,
                ..
            } => Some(at),
            _ => None,
        })
    }

    pub fn kills(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, SimEvent::Killed { .. }))
            .count()
    }

    pub fn worker_exits(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, SimEvent::Exited { mode: Mode::Batch, .. }))
            .count()
    }
}

impl Launcher for SimulatedLauncher {
    fn spawn(&self, invocation: &Invocation) -> io::Result<Box<dyn WorkerProcess>> {
        let mut state = self.state.lock().unwrap();
        let now = Instant::now();

        let (runtime, exit_code, fail_spawn, write) = match invocation.mode {
            Mode::Provision => {
                let script = state.provision.clone().ok_or_else(|| {
                    io::Error::new(io::ErrorKind::NotFound, "no provision script")
                })?;
                let write = script
                    .file_contents
                    .map(|contents| (script.account_file, contents));
                (script.runtime, script.exit_code, script.fail_spawn, write)
            }
            Mode::Batch => {
                let script = state
                    .workers
                    .pop_front()
                    .or(state.default_worker)
                    .unwrap_or_else(|| WorkerScript::exits(Duration::ZERO, 0));
                (script.runtime, script.exit_code, script.fail_spawn, None)
            }
        };

        if fail_spawn {
            state.events.push(SimEvent::SpawnFailed {
                invocation: invocation.clone(),
                at: now,
            });
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                "simulated spawn failure",
            ));
        }

        state.next_id += 1;
        let id = state.next_id;
        state.events.push(SimEvent::Spawned {
            id,
            invocation: invocation.clone(),
            at: now,
        });

        Ok(Box::new(SimProcess {
            id,
            mode: invocation.mode,
            deadline: now + runtime,
            exit_code,
            write,
            outcome: None,
            state: self.state.clone(),
        }))
    }
}

struct SimProcess {
    id: u32,
    mode: Mode,
    deadline: Instant,
    exit_code: i32,
    write: Option<(PathBuf, String)>,
    outcome: Option<ExitOutcome>,
    state: Arc<Mutex<SimState>>,
}

impl SimProcess {
    fn record(&self, event: SimEvent) {
        self.state.lock().unwrap().events.push(event);
    }
}

#[async_trait]
impl WorkerProcess for SimProcess {
    fn id(&self) -> Option<u32> {
        self.outcome.is_none().then_some(self.id)
    }

    async fn wait(&mut self) -> io::Result<ExitOutcome> {
        if let Some(outcome) = self.outcome {
            return Ok(outcome);
        }
        tokio::time::sleep_until(self.deadline).await;
        if let Some((path, contents)) = self.write.take() {
            std::fs::write(path, contents)?;
        }
        let outcome = ExitOutcome::from_code(self.exit_code);
        self.outcome = Some(outcome);
        self.record(SimEvent::Exited {
            id: self.id,
            mode: self.mode,
            at: Instant::now(),
        });
        Ok(outcome)
    }

    async fn kill(&mut self) -> io::Result<()> {
        if self.outcome.is_none() {
            self.outcome = Some(ExitOutcome::signalled());
            self.record(SimEvent::Killed {
                id: self.id,
                at: Instant::now(),
            });
        }
        Ok(())
    }
}
