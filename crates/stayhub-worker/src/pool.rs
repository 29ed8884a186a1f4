//! Fixed-capacity worker pool for one task family.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Instant;

use futures_util::future::join_all;
use stayhub_core::{
    FromTaskOutput, PoolStatus, TaskEnvelope, TaskFamily, TaskId, TaskOutput, TaskReply,
    TaskRequest, UnitId,
};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::unit::{TaskHandler, UnitListener, WorkerUnit};
use crate::PoolError;

type Responder = oneshot::Sender<Result<TaskOutput, PoolError>>;

/// Pending result of a task submitted to a [`WorkerPool`].
#[must_use = "a task handle does nothing unless waited on"]
pub struct TaskHandle {
    receiver: oneshot::Receiver<Result<TaskOutput, PoolError>>,
}

impl TaskHandle {
    /// Handle that is already rejected with `error`.
    pub fn rejected(error: PoolError) -> Self {
        let (tx, receiver) = oneshot::channel();
        let _ = tx.send(Err(error));
        Self { receiver }
    }

    /// Wait for the unit's reply.
    pub async fn wait(self) -> Result<TaskOutput, PoolError> {
        self.receiver.await.unwrap_or(Err(PoolError::Terminated))
    }

    /// Wait for the reply and extract a concrete output type.
    pub async fn wait_as<T: FromTaskOutput>(self) -> Result<T, PoolError> {
        let output = self.wait().await?;
        Ok(T::from_output(output)?)
    }
}

/// A task waiting for a free unit.
struct Queued {
    request: TaskRequest,
    responder: Responder,
    queued_at: Instant,
}

/// A task dispatched to a unit.
struct InFlight {
    unit_id: UnitId,
    kind: &'static str,
    responder: Responder,
    dispatched_at: Instant,
}

#[derive(Default)]
struct PoolState {
    free: Vec<WorkerUnit>,
    busy: HashMap<UnitId, WorkerUnit>,
    in_flight: HashMap<TaskId, InFlight>,
    queue: VecDeque<Queued>,
    next_unit: u64,
    terminated: bool,
}

impl PoolState {
    fn status(&self) -> PoolStatus {
        PoolStatus {
            total_workers: self.free.len() + self.busy.len(),
            available_workers: self.free.len(),
            active_tasks: self.in_flight.len(),
            queued_tasks: self.queue.len(),
        }
    }
}

struct Shared {
    family: TaskFamily,
    capacity: usize,
    handler: Arc<dyn TaskHandler>,
    state: Mutex<PoolState>,
    this: Weak<Shared>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn spawn_unit(&self, state: &mut PoolState) -> Result<WorkerUnit, PoolError> {
        let id = UnitId::new(state.next_unit);
        state.next_unit += 1;
        let listener: Weak<dyn UnitListener> = self.this.clone();
        WorkerUnit::spawn(id, self.family, Arc::clone(&self.handler), listener)
    }

    /// Spawn units until the pool is back at capacity.
    ///
    /// A failed spawn leaves the pool short; the deficit is retried on the
    /// next dispatch.
    fn replenish(&self, state: &mut PoolState) {
        while state.free.len() + state.busy.len() < self.capacity {
            match self.spawn_unit(state) {
                Ok(unit) => {
                    info!(family = %self.family, unit_id = %unit.id(), "Worker unit replaced");
                    state.free.push(unit);
                }
                Err(e) => {
                    error!(
                        family = %self.family,
                        error = %e,
                        missing = self.capacity - state.free.len() - state.busy.len(),
                        "Pool below capacity"
                    );
                    return;
                }
            }
        }
    }

    /// Hand queued tasks to free units, oldest first, until one side runs out.
    fn dispatch(&self, state: &mut PoolState) {
        if state.terminated {
            return;
        }
        self.replenish(state);
        while !state.queue.is_empty() {
            let Some(mut unit) = state.free.pop() else {
                break;
            };
            let Some(queued) = state.queue.pop_front() else {
                state.free.push(unit);
                break;
            };

            let task_id = TaskId::generate();
            let kind = queued.request.kind();
            let envelope = TaskEnvelope {
                task_id: task_id.clone(),
                request: queued.request,
            };

            match unit.dispatch(envelope) {
                Ok(()) => {
                    debug!(
                        family = %self.family,
                        task_id = %task_id,
                        unit_id = %unit.id(),
                        kind,
                        waited_ms = queued.queued_at.elapsed().as_millis() as u64,
                        "Task dispatched"
                    );
                    state.in_flight.insert(
                        task_id,
                        InFlight {
                            unit_id: unit.id(),
                            kind,
                            responder: queued.responder,
                            dispatched_at: Instant::now(),
                        },
                    );
                    state.busy.insert(unit.id(), unit);
                }
                Err(envelope) => {
                    // Unit thread is gone; requeue at the head and replace it.
                    warn!(
                        family = %self.family,
                        unit_id = %unit.id(),
                        "Worker unit unreachable, replacing"
                    );
                    state.queue.push_front(Queued {
                        request: envelope.request,
                        responder: queued.responder,
                        queued_at: queued.queued_at,
                    });
                    unit.terminate();
                    self.replenish(state);
                }
            }
        }
    }

    fn terminate(&self) {
        let mut state = self.lock();
        let rejected = state.in_flight.len() + state.queue.len();
        let units = state.free.len() + state.busy.len();
        state.terminated = true;

        for (_, task) in state.in_flight.drain() {
            let _ = task.responder.send(Err(PoolError::Terminated));
        }
        for task in state.queue.drain(..) {
            let _ = task.responder.send(Err(PoolError::Terminated));
        }
        for unit in state.free.drain(..) {
            unit.terminate();
        }
        for (_, unit) in state.busy.drain() {
            unit.terminate();
        }

        if units > 0 || rejected > 0 {
            info!(family = %self.family, units, rejected, "Worker pool terminated");
        }
    }
}

impl UnitListener for Shared {
    fn on_reply(&self, unit_id: UnitId, reply: TaskReply) {
        let mut state = self.lock();

        match state.in_flight.remove(&reply.task_id) {
            Some(task) => {
                let elapsed_ms = task.dispatched_at.elapsed().as_millis() as u64;
                match &reply.outcome {
                    Ok(_) => debug!(
                        family = %self.family,
                        task_id = %reply.task_id,
                        kind = task.kind,
                        elapsed_ms,
                        "Task completed"
                    ),
                    Err(e) => debug!(
                        family = %self.family,
                        task_id = %reply.task_id,
                        kind = task.kind,
                        error = %e,
                        "Task failed"
                    ),
                }
                let _ = task.responder.send(reply.outcome.map_err(PoolError::Task));
            }
            None => debug!(task_id = %reply.task_id, "Reply for unknown task ignored"),
        }

        if let Some(mut unit) = state.busy.remove(&unit_id) {
            unit.release();
            state.free.push(unit);
        }
        self.dispatch(&mut state);
    }

    fn on_fault(&self, unit_id: UnitId, message: String) {
        let mut state = self.lock();
        warn!(
            family = %self.family,
            unit_id = %unit_id,
            error = %message,
            "Worker unit faulted"
        );

        let task_id = state
            .in_flight
            .iter()
            .find(|(_, task)| task.unit_id == unit_id)
            .map(|(task_id, _)| task_id.clone());
        if let Some(task) = task_id.and_then(|id| state.in_flight.remove(&id)) {
            let _ = task.responder.send(Err(PoolError::Fault(message)));
        }

        let Some(mut unit) = state.busy.remove(&unit_id) else {
            // Pool was terminated while the unit was running.
            return;
        };
        unit.mark_faulted();
        debug!(unit_id = %unit.id(), state = ?unit.state(), "Removing worker unit");
        unit.terminate();
        self.dispatch(&mut state);
    }
}

/// A fixed set of worker units serving one task family.
///
/// Requests queue in arrival order and are dispatched as units free up. A
/// unit that faults is replaced, so the pool keeps its capacity. Dropping the
/// pool terminates it.
pub struct WorkerPool {
    family: TaskFamily,
    shared: Arc<Shared>,
}

impl WorkerPool {
    /// Start a pool with `capacity` units running `handler`.
    pub fn new(
        family: TaskFamily,
        capacity: usize,
        handler: Arc<dyn TaskHandler>,
    ) -> Result<Self, PoolError> {
        let capacity = capacity.max(1);
        let shared = Arc::new_cyclic(|this| Shared {
            family,
            capacity,
            handler,
            state: Mutex::new(PoolState::default()),
            this: this.clone(),
        });

        {
            let mut state = shared.lock();
            for _ in 0..capacity {
                let unit = shared.spawn_unit(&mut state)?;
                state.free.push(unit);
            }
        }

        info!(family = %family, capacity, "Worker pool started");
        Ok(Self { family, shared })
    }

    pub fn family(&self) -> TaskFamily {
        self.family
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// Submit a request.
    ///
    /// The request joins the queue immediately, so submission order is
    /// dispatch order. Fails with [`PoolError::Terminated`] once the pool has
    /// been terminated.
    pub fn execute(&self, request: TaskRequest) -> TaskHandle {
        let (responder, receiver) = oneshot::channel();
        let mut state = self.shared.lock();
        if state.terminated {
            let _ = responder.send(Err(PoolError::Terminated));
            return TaskHandle { receiver };
        }

        state.queue.push_back(Queued {
            request,
            responder,
            queued_at: Instant::now(),
        });
        self.shared.dispatch(&mut state);
        TaskHandle { receiver }
    }

    /// Submit a request and wait for its output.
    pub async fn run(&self, request: TaskRequest) -> Result<TaskOutput, PoolError> {
        self.execute(request).wait().await
    }

    /// Run `requests` in batches of `max_concurrent` (default: capacity).
    ///
    /// Every request in a batch settles before the next batch starts.
    /// Failures are logged and left out; the successes come back in
    /// submission order.
    pub async fn execute_parallel(
        &self,
        requests: Vec<TaskRequest>,
        max_concurrent: Option<usize>,
    ) -> Vec<TaskOutput> {
        let batch_size = max_concurrent.unwrap_or(self.shared.capacity).max(1);
        let mut outputs = Vec::with_capacity(requests.len());
        let mut requests = requests.into_iter().peekable();
        let mut batch = 0usize;

        while requests.peek().is_some() {
            let handles: Vec<TaskHandle> = requests
                .by_ref()
                .take(batch_size)
                .map(|request| self.execute(request))
                .collect();
            let submitted = handles.len();

            let mut failed = 0usize;
            for settled in join_all(handles.into_iter().map(TaskHandle::wait)).await {
                match settled {
                    Ok(output) => outputs.push(output),
                    Err(e) => {
                        failed += 1;
                        debug!(family = %self.family, batch, error = %e, "Parallel task failed");
                    }
                }
            }
            if failed > 0 {
                warn!(
                    family = %self.family,
                    batch,
                    failed,
                    submitted,
                    "Some parallel tasks failed"
                );
            }
            batch += 1;
        }

        outputs
    }

    /// Reject every in-flight and queued task and release all units.
    ///
    /// Idempotent. Later submissions are rejected immediately.
    pub fn terminate(&self) {
        self.shared.terminate();
    }

    pub fn is_terminated(&self) -> bool {
        self.shared.lock().terminated
    }

    /// Diagnostic snapshot.
    pub fn status(&self) -> PoolStatus {
        self.shared.lock().status()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shared.terminate();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use serde_json::{json, Value};
    use stayhub_core::{compute, CoreError, SortOrder, SortPayload};

    /// Handler scripted through the sort key of a sort request:
    /// `sleep:<ms>` sleeps first, `panic` panics after a short delay, `fail`
    /// returns an error. Everything else is evaluated normally. Records the
    /// data of every sort it starts and tracks peak concurrency.
    #[derive(Default)]
    pub(crate) struct ScriptedHandler {
        pub(crate) running: AtomicUsize,
        pub(crate) peak: AtomicUsize,
        pub(crate) started: Mutex<Vec<Vec<Value>>>,
    }

    impl TaskHandler for ScriptedHandler {
        fn handle(&self, request: &TaskRequest) -> Result<TaskOutput, CoreError> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            let result = match request {
                TaskRequest::Sort(SortPayload { sort_by, data, .. }) => {
                    self.started.lock().unwrap().push(data.clone());
                    if let Some(ms) = sort_by.strip_prefix("sleep:") {
                        std::thread::sleep(Duration::from_millis(ms.parse().unwrap_or(0)));
                        Ok(TaskOutput::Records(data.clone()))
                    } else if sort_by == "panic" {
                        std::thread::sleep(Duration::from_millis(20));
                        self.running.fetch_sub(1, Ordering::SeqCst);
                        panic!("unit blew up");
                    } else if sort_by == "fail" {
                        Err(CoreError::InvalidInput("scripted failure".to_string()))
                    } else {
                        compute::run(request)
                    }
                }
                other => compute::run(other),
            };
            self.running.fetch_sub(1, Ordering::SeqCst);
            result
        }
    }

    pub(crate) fn scripted(tag: &str, data: Vec<Value>) -> TaskRequest {
        TaskRequest::sort(data, tag, SortOrder::Asc)
    }

    fn pool(capacity: usize) -> (WorkerPool, Arc<ScriptedHandler>) {
        let handler = Arc::new(ScriptedHandler::default());
        let pool = WorkerPool::new(TaskFamily::DataFilter, capacity, handler.clone()).unwrap();
        (pool, handler)
    }

    fn unsorted() -> Vec<Value> {
        vec![json!(5), json!(3), json!(1), json!(4), json!(2)]
    }

    #[tokio::test]
    async fn test_capacity_bounds_concurrency() {
        let (pool, handler) = pool(2);

        let handles: Vec<_> = (0..5)
            .map(|_| pool.execute(TaskRequest::sort(unsorted(), "", SortOrder::Asc)))
            .collect();
        let status = pool.status();
        assert_eq!(status.total_workers, 2);
        assert_eq!(status.available_workers + status.active_tasks, 2);

        for handle in handles {
            let output = handle.wait().await.unwrap();
            assert_eq!(
                output,
                TaskOutput::Records(vec![json!(1), json!(2), json!(3), json!(4), json!(5)])
            );
        }
        assert!(handler.peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(pool.status().total_workers, 2);
    }

    #[tokio::test]
    async fn test_capacity_invariant_while_saturated() {
        let (pool, handler) = pool(2);
        let handles: Vec<_> = (0..6)
            .map(|_| pool.execute(scripted("sleep:30", vec![json!(1)])))
            .collect();

        let status = pool.status();
        assert_eq!(status.total_workers, 2);
        assert_eq!(status.available_workers + status.active_tasks, 2);
        assert_eq!(status.active_tasks + status.queued_tasks, 6);

        for handle in handles {
            handle.wait().await.unwrap();
        }
        assert_eq!(handler.peak.load(Ordering::SeqCst), 2);
        let idle = pool.status();
        assert_eq!(idle.available_workers, 2);
        assert_eq!(idle.queued_tasks, 0);
    }

    #[tokio::test]
    async fn test_queued_tasks_dispatch_in_arrival_order() {
        let (pool, handler) = pool(1);

        let blocker = pool.execute(scripted("sleep:30", vec![]));
        let handles: Vec<_> = (0..4)
            .map(|i| pool.execute(scripted("", vec![json!(i)])))
            .collect();
        blocker.wait().await.unwrap();
        for handle in handles {
            handle.wait().await.unwrap();
        }

        let started = handler.started.lock().unwrap();
        let expected: Vec<Vec<Value>> = std::iter::once(vec![])
            .chain((0..4).map(|i| vec![json!(i)]))
            .collect();
        assert_eq!(*started, expected);
    }

    #[tokio::test]
    async fn test_failure_is_isolated() {
        let (pool, _) = pool(2);
        let failing = pool.execute(scripted("fail", vec![]));
        let slow = pool.execute(scripted("sleep:20", vec![json!("ok")]));

        let err = failing.wait().await.unwrap_err();
        assert_eq!(err, PoolError::Task("Invalid input: scripted failure".to_string()));
        assert_eq!(
            slow.wait().await.unwrap(),
            TaskOutput::Records(vec![json!("ok")])
        );
        assert_eq!(pool.status().available_workers, 2);
    }

    #[tokio::test]
    async fn test_fault_replaces_unit_and_drains_queue() {
        let (pool, _) = pool(1);

        let faulting = pool.execute(scripted("panic", vec![]));
        let queued: Vec<_> = (0..3)
            .map(|i| pool.execute(scripted("", vec![json!(i)])))
            .collect();
        assert_eq!(pool.status().queued_tasks, 3);

        let err = faulting.wait().await.unwrap_err();
        assert_eq!(err, PoolError::Fault("unit blew up".to_string()));

        for (i, handle) in queued.into_iter().enumerate() {
            assert_eq!(
                handle.wait().await.unwrap(),
                TaskOutput::Records(vec![json!(i)])
            );
        }
        assert_eq!(pool.status().total_workers, 1);

        let after = pool.run(TaskRequest::sort(unsorted(), "", SortOrder::Desc)).await;
        assert_eq!(
            after.unwrap(),
            TaskOutput::Records(vec![json!(5), json!(4), json!(3), json!(2), json!(1)])
        );
    }

    #[tokio::test]
    async fn test_unreachable_unit_is_replaced() {
        let (pool, _) = pool(2);
        {
            let mut state = pool.shared.lock();
            for unit in state.free.drain(..) {
                unit.terminate();
            }
            state.free.push(WorkerUnit::detached(UnitId::new(100)));
            state.free.push(WorkerUnit::detached(UnitId::new(101)));
        }

        // The first task still holds its replacement when the second arrives.
        let first = pool.execute(scripted("sleep:20", vec![json!("a")]));
        let second = pool.execute(scripted("", vec![json!("b")]));
        assert_eq!(first.wait().await.unwrap(), TaskOutput::Records(vec![json!("a")]));
        assert_eq!(second.wait().await.unwrap(), TaskOutput::Records(vec![json!("b")]));

        let status = pool.status();
        assert_eq!(status.total_workers, 2);
        assert_eq!(status.available_workers, 2);
        let state = pool.shared.lock();
        assert!(state.free.iter().all(|unit| unit.id().get() < 100));
    }

    #[tokio::test]
    async fn test_missing_unit_respawned_on_next_dispatch() {
        let (pool, _) = pool(2);
        {
            let mut state = pool.shared.lock();
            if let Some(unit) = state.free.pop() {
                unit.terminate();
            }
        }
        assert_eq!(pool.status().total_workers, 1);

        let output = pool.run(scripted("", vec![json!(1)])).await.unwrap();
        assert_eq!(output, TaskOutput::Records(vec![json!(1)]));
        assert_eq!(pool.status().total_workers, 2);
    }

    #[tokio::test]
    async fn test_terminate_rejects_everything() {
        let (pool, _) = pool(1);
        let running = pool.execute(scripted("sleep:50", vec![]));
        let queued = pool.execute(scripted("", vec![]));

        pool.terminate();
        assert_eq!(running.wait().await.unwrap_err(), PoolError::Terminated);
        assert_eq!(queued.wait().await.unwrap_err(), PoolError::Terminated);
        assert_eq!(pool.status(), PoolStatus::default());
        assert!(pool.is_terminated());

        let late = pool.execute(scripted("", vec![]));
        assert_eq!(late.wait().await.unwrap_err().to_string(), "Worker pool terminated");

        // Second terminate is a no-op.
        pool.terminate();
        assert_eq!(pool.status(), PoolStatus::default());
    }

    #[tokio::test]
    async fn test_execute_parallel_keeps_successes() {
        let (pool, _) = pool(2);
        let requests = vec![
            scripted("", vec![json!("a")]),
            scripted("fail", vec![]),
            scripted("", vec![json!("b")]),
            scripted("panic", vec![]),
            scripted("", vec![json!("c")]),
        ];

        let outputs = pool.execute_parallel(requests, Some(0)).await;
        assert_eq!(
            outputs,
            vec![
                TaskOutput::Records(vec![json!("a")]),
                TaskOutput::Records(vec![json!("b")]),
                TaskOutput::Records(vec![json!("c")]),
            ]
        );
        assert_eq!(pool.status().total_workers, 2);
        assert!(pool.execute_parallel(Vec::new(), None).await.is_empty());
    }

    #[tokio::test]
    async fn test_wrong_family_is_task_error() {
        let pool = WorkerPool::new(TaskFamily::Stats, 1, Arc::new(crate::ComputeHandler)).unwrap();
        let err = pool
            .run(TaskRequest::sort(unsorted(), "", SortOrder::Asc))
            .await
            .unwrap_err();
        assert_eq!(err, PoolError::Task("Unknown task type: sort".to_string()));
    }

    #[tokio::test]
    async fn test_wait_as_checks_output_type() {
        let (pool, _) = pool(1);
        let err = pool
            .execute(scripted("", vec![]))
            .wait_as::<f64>()
            .await
            .unwrap_err();
        assert!(matches!(err, PoolError::Core(CoreError::UnexpectedOutput { .. })));
    }
}
