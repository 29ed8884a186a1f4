//! Worker units.
//!
//! A unit is a dedicated OS thread that evaluates one [`TaskEnvelope`] at a
//! time. It shares nothing with its pool except two channels: an inbox of
//! envelopes, and a [`UnitListener`] it reports replies and faults to.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;
use std::sync::{Arc, Weak};
use std::thread;

use stayhub_core::{
    compute, CoreError, TaskEnvelope, TaskFamily, TaskOutput, TaskReply, TaskRequest, UnitId,
    UnitState,
};
use tracing::{debug, trace};

use crate::PoolError;

/// Evaluates task requests inside a unit.
///
/// Production pools use [`ComputeHandler`]; tests inject handlers that hold a
/// unit busy, fail, or panic.
pub trait TaskHandler: Send + Sync + 'static {
    /// Evaluate one request.
    fn handle(&self, request: &TaskRequest) -> Result<TaskOutput, CoreError>;
}

/// Handler backed by [`stayhub_core::compute::run`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ComputeHandler;

impl TaskHandler for ComputeHandler {
    fn handle(&self, request: &TaskRequest) -> Result<TaskOutput, CoreError> {
        compute::run(request)
    }
}

/// Receiver of unit reports, implemented by the owning pool.
pub(crate) trait UnitListener: Send + Sync {
    /// The unit finished a task and is ready for the next one.
    fn on_reply(&self, unit_id: UnitId, reply: TaskReply);

    /// The unit crashed and has exited.
    fn on_fault(&self, unit_id: UnitId, message: String);
}

/// Pool-side handle to a unit thread.
pub(crate) struct WorkerUnit {
    id: UnitId,
    state: UnitState,
    inbox: mpsc::Sender<TaskEnvelope>,
}

impl WorkerUnit {
    /// Start a unit thread for `family`.
    pub(crate) fn spawn(
        id: UnitId,
        family: TaskFamily,
        handler: Arc<dyn TaskHandler>,
        listener: Weak<dyn UnitListener>,
    ) -> Result<Self, PoolError> {
        let (inbox, envelopes) = mpsc::channel();
        thread::Builder::new()
            .name(format!("stayhub-{family}-{}", id.get()))
            .spawn(move || unit_loop(id, family, handler, envelopes, listener))
            .map_err(|e| PoolError::Spawn(e.to_string()))?;

        debug!(family = %family, unit_id = %id, "Worker unit started");
        Ok(Self {
            id,
            state: UnitState::Free,
            inbox,
        })
    }

    /// Handle whose thread has already exited.
    #[cfg(test)]
    pub(crate) fn detached(id: UnitId) -> Self {
        let (inbox, _) = mpsc::channel();
        Self {
            id,
            state: UnitState::Free,
            inbox,
        }
    }

    pub(crate) fn id(&self) -> UnitId {
        self.id
    }

    pub(crate) fn state(&self) -> UnitState {
        self.state
    }

    /// Hand the unit a task. Gives the envelope back if the thread is gone.
    pub(crate) fn dispatch(&mut self, envelope: TaskEnvelope) -> Result<(), TaskEnvelope> {
        self.inbox.send(envelope).map_err(|e| e.0)?;
        self.state = UnitState::Busy;
        Ok(())
    }

    pub(crate) fn release(&mut self) {
        self.state = UnitState::Free;
    }

    pub(crate) fn mark_faulted(&mut self) {
        self.state = UnitState::Faulted;
    }

    /// Close the inbox. The thread exits once its current task, if any,
    /// returns; it is never joined, so a hung task cannot block the caller.
    pub(crate) fn terminate(mut self) {
        self.state = UnitState::Terminated;
        trace!(unit_id = %self.id, state = ?self.state, "Worker unit released");
    }
}

fn unit_loop(
    id: UnitId,
    family: TaskFamily,
    handler: Arc<dyn TaskHandler>,
    envelopes: mpsc::Receiver<TaskEnvelope>,
    listener: Weak<dyn UnitListener>,
) {
    while let Ok(TaskEnvelope { task_id, request }) = envelopes.recv() {
        trace!(unit_id = %id, task_id = %task_id, kind = request.kind(), "Evaluating task");

        let evaluated = panic::catch_unwind(AssertUnwindSafe(|| {
            if request.family() != family {
                return Err(CoreError::UnknownTaskType(request.kind().to_string()));
            }
            handler.handle(&request)
        }));

        let Some(listener) = listener.upgrade() else {
            break;
        };
        match evaluated {
            Ok(outcome) => {
                let reply = TaskReply {
                    task_id,
                    outcome: outcome.map_err(|e| e.to_string()),
                };
                listener.on_reply(id, reply);
            }
            Err(payload) => {
                listener.on_fault(id, panic_message(payload));
                return;
            }
        }
    }
    debug!(family = %family, unit_id = %id, "Worker unit stopped");
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "Worker error".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_message() {
        assert_eq!(panic_message(Box::new("boom")), "boom");
        assert_eq!(panic_message(Box::new("kaboom".to_string())), "kaboom");
        assert_eq!(panic_message(Box::new(42_u8)), "Worker error");
    }
}
