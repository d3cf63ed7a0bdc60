//! Gates: named checks bound to a task and a status transition.
//!
//! Only the most recent run of a gate counts, so a stale failure never
//! blocks a transition after a fix. Only `required` gates block.

use std::sync::Arc;

use crate::clock::Clock;
use crate::error::{CoordError, Result};
use crate::events::{EventBus, EventKind};
use crate::models::{
    clip_output, new_id, Gate, GateRun, GateState, GateStatusEntry, GateStatusReport, NewGate,
    NewGateRun, TaskStatus,
};
use crate::store::Store;
use crate::validation::Validate;

pub struct GateEvaluator<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    bus: Arc<EventBus>,
}

impl<S: Store> GateEvaluator<S> {
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>, bus: Arc<EventBus>) -> Self {
        Self { store, clock, bus }
    }

    /// Define a gate. The command must pass the allowlist check; nothing
    /// is published for a bare definition.
    pub async fn define(&self, input: NewGate) -> Result<Gate> {
        Validate::gate_command(&input.command)?;
        if self.store.get_task(&input.task_id).await?.is_none() {
            return Err(CoordError::task_not_found(&input.task_id));
        }

        let gate = Gate {
            id: new_id(),
            task_id: input.task_id,
            gate_type: input.gate_type,
            command: input.command,
            trigger_status: input.trigger_status,
            required: input.required,
            created_at: self.clock.now_ms(),
        };
        self.store.insert_gate(&gate).await?;
        tracing::info!(gate_id = %gate.id, task_id = %gate.task_id, "gate defined");
        Ok(gate)
    }

    /// Record one execution of a gate. Output is clipped before storage.
    pub async fn record_run(&self, input: NewGateRun) -> Result<GateRun> {
        Validate::agent_id(&input.agent_id)?;
        let gate = self
            .store
            .get_gate(&input.gate_id)
            .await?
            .ok_or_else(|| CoordError::gate_not_found(&input.gate_id))?;

        let run = GateRun {
            id: new_id(),
            gate_id: gate.id,
            task_id: gate.task_id,
            agent_id: input.agent_id,
            passed: input.passed,
            output: input.output.as_deref().map(clip_output),
            duration_ms: input.duration_ms,
            created_at: self.clock.now_ms(),
        };
        self.store.insert_gate_run(&run).await?;

        tracing::info!(
            gate_id = %run.gate_id,
            task_id = %run.task_id,
            passed = run.passed,
            "gate run recorded"
        );
        self.bus
            .publish(EventKind::GateRunRecorded { run: run.clone() });
        if run.passed {
            self.bus.publish(EventKind::GatePassed { run: run.clone() });
        } else {
            self.bus.publish(EventKind::GateFailed { run: run.clone() });
        }
        Ok(run)
    }

    /// Authorization summary for moving `task_id` into `for_status`:
    /// each bound gate with its last-run state, and the required gates
    /// still in the way.
    pub async fn status(&self, task_id: &str, for_status: TaskStatus) -> Result<GateStatusReport> {
        if self.store.get_task(task_id).await?.is_none() {
            return Err(CoordError::task_not_found(task_id));
        }

        let gates = self.store.gates_for(task_id, for_status).await?;
        let mut entries = Vec::with_capacity(gates.len());
        let mut blocked_by = Vec::new();

        for gate in gates {
            let last_run = self.store.latest_gate_run(&gate.id).await?;
            let state = match &last_run {
                None => GateState::NotRun,
                Some(run) if run.passed => GateState::Passed,
                Some(_) => GateState::Failed,
            };
            if gate.required && state != GateState::Passed {
                blocked_by.push(gate.id.clone());
            }
            entries.push(GateStatusEntry {
                gate,
                state,
                last_run,
            });
        }

        Ok(GateStatusReport {
            all_passed: blocked_by.is_empty(),
            gates: entries,
            blocked_by,
        })
    }
}
