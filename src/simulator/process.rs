//! Out-of-process [`Simulator`] adapter (§6 ambient addition).
//!
//! The payment-system simulator itself is an external collaborator, not
//! part of this crate (§6). `ProcessSimulator` is the edge adapter that
//! lets the `run` CLI command drive a real one: it spawns a configured
//! executable once per sample and exchanges a single JSON request/response
//! pair over its stdin/stdout, the same program+args shape the reference
//! codebase's subprocess-backed checks use, but invoked synchronously
//! (`std::process::Command`, not `tokio::process`) because the `Simulator`
//! contract forbids yielding the optimization loop's single task (§5, §7).

use super::{Simulator, SimulationOutcome};
use crate::error::{Error, Result};
use crate::policy::Policy;
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

/// Request payload written to the simulator process's stdin.
#[derive(Serialize)]
struct SimulatorRequest<'a> {
    agent_id: &'a str,
    scenario: &'a str,
    policy: &'a Policy,
    seed: u64,
    ticks: u32,
}

/// A [`Simulator`] that delegates each run to an external executable.
///
/// `executable` is invoked once per `run()` call with no arguments; it must
/// read one [`SimulatorRequest`] as JSON from stdin and write one
/// [`SimulationOutcome`] as JSON to stdout, then exit zero. A non-zero exit
/// or malformed stdout is reported as `Error::Simulator` (fatal for the run,
/// per the error taxonomy).
pub struct ProcessSimulator {
    executable: PathBuf,
    scenario: String,
}

impl ProcessSimulator {
    /// Adapt an external simulator executable evaluating the given scenario.
    pub fn new(executable: impl Into<PathBuf>, scenario: impl Into<String>) -> Self {
        Self {
            executable: executable.into(),
            scenario: scenario.into(),
        }
    }
}

impl Simulator for ProcessSimulator {
    fn run(
        &self,
        agent_id: &str,
        policy: &Policy,
        seed: u64,
        ticks: u32,
    ) -> Result<SimulationOutcome> {
        let request = SimulatorRequest {
            agent_id,
            scenario: &self.scenario,
            policy,
            seed,
            ticks,
        };
        let payload = serde_json::to_vec(&request)?;

        let mut child = Command::new(&self.executable)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                Error::simulator(
                    format!("failed to spawn simulator {}: {e}", self.executable.display()),
                    seed,
                )
            })?;

        child
            .stdin
            .take()
            .expect("piped stdin")
            .write_all(&payload)
            .map_err(|e| Error::simulator(format!("failed to write simulator request: {e}"), seed))?;

        let output = child
            .wait_with_output()
            .map_err(|e| Error::simulator(format!("failed to read simulator output: {e}"), seed))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::simulator(
                format!("simulator exited with {}: {stderr}", output.status),
                seed,
            ));
        }

        serde_json::from_slice(&output.stdout)
            .map_err(|e| Error::simulator(format!("failed to parse simulator output: {e}"), seed))
    }
}
