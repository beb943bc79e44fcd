//! PipelineRun runner
//!
//! Advances a run by at most one node per delivery:
//!
//! 1. Load the run under its lease; drop missing runs, ignore terminal ones
//! 2. Select the next node (see [`select`]), skipping gated candidates
//! 3. Resolve the node's params and call the executor for its type
//! 4. Record the outcome, persist the run, then re-queue, park or delay it
//!
//! A run only goes back on the queue when its last node closed without
//! ending the run. Open nodes wait for an external trigger; failed
//! invocations wait in the retarder.

mod queue;
mod select;
mod worker;

pub use queue::{channel, RunQueue, DEFAULT_CAPACITY};
pub use worker::spawn_workers;

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};
use weft_core::domain::pipeline::upsert;
use weft_core::domain::{NodeStatus, PipelineRun, RunState};
use weft_core::dto::node::{NodeRequest, NodeResult};

use crate::error::Result;
use crate::gateway::NodeGateway;
use crate::lease::RunLeases;
use crate::repository::PipelineRunRepository;
use crate::resolver::Scope;
use crate::retarder::Retarder;

/// What one `advance` call did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    /// No run with this id; the delivery is discarded
    Dropped,
    /// Run already finished or killed; nothing changed
    Terminal,
    /// A node finished and more remain; the run is back on the queue
    Requeued,
    /// The node is still open and waits for an external trigger
    Parked,
    /// The executor failed; the run is scheduled in the retarder
    Delayed,
    /// The executor failed and no retry could be scheduled
    Stalled,
    /// Every node was attempted; the run is finished
    Finished,
    /// An executor reported `Kill`; the run is finished for good
    Killed,
}

/// Retarder wiring for failed invocations
#[derive(Clone)]
struct RetryDelay {
    retarder: Arc<Retarder<i64>>,
    seconds: u64,
}

pub struct Runner {
    runs: Arc<dyn PipelineRunRepository>,
    gateway: Arc<NodeGateway>,
    queue: RunQueue,
    leases: RunLeases,
    retry: Option<RetryDelay>,
}

impl Runner {
    pub fn new(
        runs: Arc<dyn PipelineRunRepository>,
        gateway: Arc<NodeGateway>,
        queue: RunQueue,
    ) -> Self {
        Self {
            runs,
            gateway,
            queue,
            leases: RunLeases::new(),
            retry: None,
        }
    }

    /// Failed invocations are handed to `retarder` and re-queued after
    /// `delay` seconds. Without a retarder they stall until triggered.
    pub fn with_retarder(mut self, retarder: Arc<Retarder<i64>>, delay: u64) -> Self {
        self.retry = Some(RetryDelay {
            retarder,
            seconds: delay,
        });
        self
    }

    pub fn queue(&self) -> &RunQueue {
        &self.queue
    }

    /// Advances run `run_id` by one node.
    ///
    /// Repository errors are returned without touching the queue; the run is
    /// picked up again on the next delivery or at recovery.
    pub async fn advance(&self, run_id: i64) -> Result<Advance> {
        let _lease = self.leases.acquire(run_id).await;

        let Some(mut run) = self.runs.get(run_id).await? else {
            warn!(run_id, "Pipeline run not found, dropping delivery");
            return Ok(Advance::Dropped);
        };

        if run.is_terminal() {
            debug!(run_id, state = %run.state, "Pipeline run already terminal");
            return Ok(Advance::Terminal);
        }

        run.status.status = RunState::Running;

        let outcome = match select::select_node(&mut run) {
            Some(index) => self.execute(&mut run, index).await,
            None => {
                finish(&mut run);
                Advance::Finished
            }
        };

        if run.status.status.is_terminal() && !run.state.is_terminal() {
            run.state = run.status.status;
        }

        self.runs.update(&run).await?;

        let outcome = match outcome {
            Advance::Requeued => {
                self.queue.push_detached(run_id);
                outcome
            }
            Advance::Delayed => self.schedule_retry(run_id),
            other => other,
        };

        debug!(run_id, ?outcome, nodes = run.status.node_run.len(), "Pipeline run advanced");
        Ok(outcome)
    }

    /// Runs node `index` and records the result on the last status entry.
    async fn execute(&self, run: &mut PipelineRun, index: usize) -> Advance {
        let node = &run.pipeline.spec.nodes[index];
        let node_type = node.spec.node_type.clone();
        let node_name = node.name.clone();

        let params = Scope::new(run).resolve_all(&node.spec.params);
        let request = NodeRequest::new(run.id, &node_name, params);

        let result = match self.gateway.execute(&node_type, &request).await {
            Ok(result) => result,
            Err(e) => {
                warn!(
                    run_id = run.id,
                    node = %node_name,
                    node_type = %node_type,
                    error = %e,
                    "Node execution failed"
                );
                if let Some(entry) = run.last_node_mut() {
                    entry.message = e.to_string();
                }
                return Advance::Delayed;
            }
        };

        let status = record(run, result);
        info!(run_id = run.id, node = %node_name, %status, "Node executed");

        if status.is_open() {
            return Advance::Parked;
        }

        if status == NodeStatus::Kill {
            run.state = RunState::Kill;
            run.status.status = RunState::Kill;
            run.status.message = run
                .last_node()
                .map(|entry| entry.message.clone())
                .unwrap_or_default();
            return Advance::Killed;
        }

        if index + 1 == run.pipeline.spec.nodes.len() {
            finish(run);
            Advance::Finished
        } else {
            Advance::Requeued
        }
    }

    fn schedule_retry(&self, run_id: i64) -> Advance {
        let Some(retry) = &self.retry else {
            warn!(run_id, "No retarder configured, pipeline run stalls until triggered");
            return Advance::Stalled;
        };
        match retry.retarder.add(run_id, retry.seconds) {
            Ok(()) => {
                debug!(run_id, delay = retry.seconds, "Pipeline run scheduled for retry");
                Advance::Delayed
            }
            Err(e) => {
                warn!(run_id, error = %e, "Failed to schedule retry, pipeline run stalls");
                Advance::Stalled
            }
        }
    }
}

/// Copies an executor result onto the open entry and merges communal
/// updates into the run. Returns the normalized node status.
fn record(run: &mut PipelineRun, result: NodeResult) -> NodeStatus {
    for kv in &result.communal {
        upsert(&mut run.spec.communal, &kv.key, &kv.value);
    }

    let status = NodeStatus::from_reported(&result.status);
    if let Some(entry) = run.last_node_mut() {
        entry.status = status;
        entry.output = result.out;
        entry.message = result.message;
        if !status.is_open() {
            entry.completion_time = Some(Utc::now());
        }
    }
    status
}

fn finish(run: &mut PipelineRun) {
    run.status.status = RunState::Finish;
    run.state = RunState::Finish;
    info!(run_id = run.id, pipeline = %run.pipeline.name, "Pipeline run finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{GatewayError, NodeExecutor};
    use crate::repository::InMemoryPipelineRunRepository;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tokio::sync::mpsc;
    use weft_core::domain::pipeline::{lookup, KeyAndValue};
    use weft_core::domain::{Node, ParamSpec, Pipeline, When};

    /// Replays scripted results, then finishes every further call.
    struct Scripted {
        script: Mutex<VecDeque<std::result::Result<NodeResult, GatewayError>>>,
        seen: Mutex<Vec<NodeRequest>>,
    }

    impl Scripted {
        fn new(
            script: impl IntoIterator<Item = std::result::Result<NodeResult, GatewayError>>,
        ) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into_iter().collect()),
                seen: Mutex::default(),
            })
        }

        fn requests(&self) -> Vec<NodeRequest> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl NodeExecutor for Arc<Scripted> {
        async fn execute(
            &self,
            request: &NodeRequest,
        ) -> std::result::Result<NodeResult, GatewayError> {
            self.seen.lock().unwrap().push(request.clone());
            let next = self.script.lock().unwrap().pop_front();
            next.unwrap_or_else(|| Ok(NodeResult::finished()))
        }
    }

    fn unavailable() -> GatewayError {
        GatewayError::Status {
            status: 503,
            message: "unavailable".to_string(),
        }
    }

    struct Harness {
        runs: Arc<InMemoryPipelineRunRepository>,
        runner: Runner,
        rx: mpsc::Receiver<i64>,
    }

    impl Harness {
        fn new(gateway: NodeGateway) -> Self {
            let runs = Arc::new(InMemoryPipelineRunRepository::new());
            let (queue, rx) = channel(16);
            let runner = Runner::new(runs.clone(), Arc::new(gateway), queue);
            Self { runs, runner, rx }
        }

        fn with_retarder(mut self, buffer_size: usize, delay: u64) -> (Self, Arc<Retarder<i64>>) {
            let queue = self.runner.queue().clone();
            let retarder = Arc::new(Retarder::new(buffer_size, move |id| queue.push_detached(id)));
            self.runner = self.runner.with_retarder(Arc::clone(&retarder), delay);
            (self, retarder)
        }

        async fn create(&self, pipeline: Pipeline, params: Vec<KeyAndValue>) -> i64 {
            self.runs
                .create(PipelineRun::new(pipeline, params))
                .await
                .unwrap()
                .id
        }

        async fn run(&self, id: i64) -> PipelineRun {
            self.runs.get(id).await.unwrap().unwrap()
        }

        fn queued(&mut self) -> Option<i64> {
            self.rx.try_recv().ok()
        }
    }

    fn statuses(run: &PipelineRun) -> Vec<(&str, NodeStatus)> {
        run.status
            .node_run
            .iter()
            .map(|s| (s.name.as_str(), s.status))
            .collect()
    }

    fn assert_order(run: &PipelineRun) {
        for (i, status) in run.status.node_run.iter().enumerate() {
            assert_eq!(status.name, run.pipeline.spec.nodes[i].name);
        }
    }

    #[tokio::test]
    async fn test_linear_success() {
        let mut h = Harness::new(NodeGateway::new());
        let pipeline = Pipeline::new("linear")
            .with_node(Node::new("a", "null"))
            .with_node(Node::new("b", "null"));
        let id = h.create(pipeline, Vec::new()).await;

        assert_eq!(h.runner.advance(id).await.unwrap(), Advance::Requeued);
        assert_eq!(h.queued(), Some(id));

        assert_eq!(h.runner.advance(id).await.unwrap(), Advance::Finished);
        assert_eq!(h.queued(), None);

        let run = h.run(id).await;
        assert_eq!(
            statuses(&run),
            vec![("a", NodeStatus::Finish), ("b", NodeStatus::Finish)]
        );
        assert_eq!(run.state, RunState::Finish);
        assert_eq!(run.status.status, RunState::Finish);
        assert!(run.status.node_run.iter().all(|s| s.completion_time.is_some()));
        assert_order(&run);
    }

    #[tokio::test]
    async fn test_empty_pipeline_finishes() {
        let mut h = Harness::new(NodeGateway::new());
        let id = h.create(Pipeline::new("empty"), Vec::new()).await;

        assert_eq!(h.runner.advance(id).await.unwrap(), Advance::Finished);
        assert_eq!(h.run(id).await.state, RunState::Finish);
        assert_eq!(h.queued(), None);
    }

    #[tokio::test]
    async fn test_conditional_skip() {
        let check = Scripted::new([Ok(NodeResult::finished().with_out("ok", "false"))]);
        let mut h = Harness::new(NodeGateway::new().with_executor("check", check));
        let pipeline = Pipeline::new("cond")
            .with_node(Node::new("a", "check"))
            .with_node(
                Node::new("b", "null").when(When::new("$(task.a.output.ok)", "eq", ["true"])),
            )
            .with_node(Node::new("c", "null"));
        let id = h.create(pipeline, Vec::new()).await;

        assert_eq!(h.runner.advance(id).await.unwrap(), Advance::Requeued);
        assert_eq!(h.queued(), Some(id));
        assert_eq!(h.runner.advance(id).await.unwrap(), Advance::Finished);

        let run = h.run(id).await;
        assert_eq!(
            statuses(&run),
            vec![
                ("a", NodeStatus::Finish),
                ("b", NodeStatus::Skip),
                ("c", NodeStatus::Finish),
            ]
        );
        assert!(run.status.node_run[1].completion_time.is_some());
        assert_order(&run);
    }

    #[tokio::test]
    async fn test_dependency_skip() {
        let h = Harness::new(NodeGateway::new());
        let pipeline = Pipeline::new("deps")
            .with_node(Node::new("a", "null").when(When::new("x", "in", ["y", "z"])))
            .with_node(Node::new("b", "null").depends_on("a"))
            .with_node(Node::new("c", "null"));
        let id = h.create(pipeline, Vec::new()).await;

        assert_eq!(h.runner.advance(id).await.unwrap(), Advance::Finished);
        let run = h.run(id).await;
        assert_eq!(
            statuses(&run),
            vec![
                ("a", NodeStatus::Skip),
                ("b", NodeStatus::Skip),
                ("c", NodeStatus::Finish),
            ]
        );
    }

    #[tokio::test]
    async fn test_trailing_skip_finishes_on_next_cycle() {
        let mut h = Harness::new(NodeGateway::new());
        let pipeline = Pipeline::new("tail")
            .with_node(Node::new("a", "null"))
            .with_node(Node::new("b", "null").when(When::new("x", "eq", ["y"])));
        let id = h.create(pipeline, Vec::new()).await;

        assert_eq!(h.runner.advance(id).await.unwrap(), Advance::Requeued);
        assert_eq!(h.queued(), Some(id));
        assert_eq!(h.runner.advance(id).await.unwrap(), Advance::Finished);
        assert_eq!(
            statuses(&h.run(id).await),
            vec![("a", NodeStatus::Finish), ("b", NodeStatus::Skip)]
        );
    }

    #[tokio::test]
    async fn test_retry_then_success() {
        let flaky = Scripted::new([Err(unavailable())]);
        let (mut h, retarder) =
            Harness::new(NodeGateway::new().with_executor("flaky", flaky.clone()))
                .with_retarder(10, 2);
        let pipeline = Pipeline::new("retry").with_node(Node::new("a", "flaky"));
        let id = h.create(pipeline, Vec::new()).await;

        assert_eq!(h.runner.advance(id).await.unwrap(), Advance::Delayed);
        let run = h.run(id).await;
        assert_eq!(statuses(&run), vec![("a", NodeStatus::Pending)]);
        assert!(run.status.node_run[0].message.contains("unavailable"));
        assert_eq!(run.state, RunState::Running);
        assert_eq!(h.queued(), None);

        for _ in 0..2 {
            assert_eq!(retarder.tick(), 0);
            assert_eq!(h.queued(), None);
        }
        assert_eq!(retarder.tick(), 1);
        assert_eq!(h.queued(), Some(id));

        assert_eq!(h.runner.advance(id).await.unwrap(), Advance::Finished);
        let run = h.run(id).await;
        assert_eq!(statuses(&run), vec![("a", NodeStatus::Finish)]);
        assert!(run.status.node_run[0].message.is_empty());
        assert_eq!(flaky.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_failure_without_retarder_stalls() {
        let mut h = Harness::new(NodeGateway::new());
        let pipeline = Pipeline::new("unknown").with_node(Node::new("a", "email"));
        let id = h.create(pipeline, Vec::new()).await;

        assert_eq!(h.runner.advance(id).await.unwrap(), Advance::Stalled);
        let run = h.run(id).await;
        assert_eq!(statuses(&run), vec![("a", NodeStatus::Pending)]);
        assert!(run.status.node_run[0].message.contains("illegal node type"));
        assert_eq!(h.queued(), None);
    }

    #[tokio::test]
    async fn test_oversized_retry_delay_stalls() {
        let (mut h, retarder) = Harness::new(NodeGateway::new()).with_retarder(3, 5);
        let pipeline = Pipeline::new("unknown").with_node(Node::new("a", "email"));
        let id = h.create(pipeline, Vec::new()).await;

        assert_eq!(h.runner.advance(id).await.unwrap(), Advance::Stalled);
        assert!(retarder.is_empty());
        assert_eq!(h.queued(), None);
    }

    #[tokio::test]
    async fn test_kill_is_terminal() {
        let reject = Scripted::new([Ok(NodeResult::killed("rejected"))]);
        let mut h = Harness::new(NodeGateway::new().with_executor("examine", reject));
        let pipeline = Pipeline::new("approval")
            .with_node(Node::new("a", "examine"))
            .with_node(Node::new("b", "null"));
        let id = h.create(pipeline, Vec::new()).await;

        assert_eq!(h.runner.advance(id).await.unwrap(), Advance::Killed);
        let run = h.run(id).await;
        assert_eq!(run.state, RunState::Kill);
        assert_eq!(run.status.status, RunState::Kill);
        assert_eq!(run.status.message, "rejected");
        assert_eq!(statuses(&run), vec![("a", NodeStatus::Kill)]);
        assert_eq!(h.queued(), None);
    }

    #[tokio::test]
    async fn test_terminal_run_is_never_mutated() {
        let mut h = Harness::new(NodeGateway::new());
        let pipeline = Pipeline::new("one").with_node(Node::new("a", "null"));
        let id = h.create(pipeline, Vec::new()).await;
        assert_eq!(h.runner.advance(id).await.unwrap(), Advance::Finished);
        let before = h.run(id).await;

        for _ in 0..3 {
            assert_eq!(h.runner.advance(id).await.unwrap(), Advance::Terminal);
        }
        assert_eq!(h.run(id).await, before);
        assert_eq!(h.queued(), None);
    }

    #[tokio::test]
    async fn test_open_node_parks_until_triggered() {
        let examine = Scripted::new([
            Ok(NodeResult::pending("awaiting approval")),
            Ok(NodeResult::finished().with_out("agree", "yes")),
        ]);
        let mut h = Harness::new(NodeGateway::new().with_executor("examine", examine.clone()));
        let pipeline = Pipeline::new("approval")
            .with_node(Node::new("approve", "examine"))
            .with_node(Node::new("notify", "null"));
        let id = h.create(pipeline, Vec::new()).await;

        assert_eq!(h.runner.advance(id).await.unwrap(), Advance::Parked);
        assert_eq!(h.queued(), None);
        let run = h.run(id).await;
        assert_eq!(run.status.node_run[0].message, "awaiting approval");
        assert!(run.status.node_run[0].completion_time.is_none());

        // External trigger resumes the same node.
        assert_eq!(h.runner.advance(id).await.unwrap(), Advance::Requeued);
        let run = h.run(id).await;
        assert_eq!(statuses(&run), vec![("approve", NodeStatus::Finish)]);
        assert_eq!(lookup("agree", &run.status.node_run[0].output), Some("yes"));
        assert_eq!(examine.requests().len(), 2);
        assert_eq!(h.queued(), Some(id));
    }

    #[tokio::test]
    async fn test_params_are_resolved_and_communal_merged() {
        let first = Scripted::new([Ok(NodeResult::finished()
            .with_out("ticket", "T-1")
            .with_communal("approved", "yes")
            .with_communal("extra", "1"))]);
        let second = Scripted::new([]);
        let mut h = Harness::new(
            NodeGateway::new()
                .with_executor("first", first)
                .with_executor("second", second.clone()),
        );
        let pipeline = Pipeline::new("data")
            .with_param(ParamSpec::new("days", "1"))
            .with_communal(ParamSpec::new("approved", "no"))
            .with_node(Node::new("a", "first"))
            .with_node(
                Node::new("b", "second")
                    .with_param("days", "$(params.days)")
                    .with_param("approved", "$(communal.approved)")
                    .with_param("ticket", "$(task.a.output.ticket)")
                    .with_param("missing", "$(task.z.output.k)")
                    .with_param("lit", "hello"),
            );
        let id = h
            .create(pipeline, vec![KeyAndValue::new("days", "3")])
            .await;

        h.runner.advance(id).await.unwrap();
        assert_eq!(h.queued(), Some(id));
        h.runner.advance(id).await.unwrap();

        let request = &second.requests()[0];
        assert_eq!(request.run_id(), Some(id));
        assert_eq!(request.node_name(), Some("b"));
        assert_eq!(
            request.params,
            vec![
                KeyAndValue::new("days", "3"),
                KeyAndValue::new("approved", "yes"),
                KeyAndValue::new("ticket", "T-1"),
                KeyAndValue::new("missing", ""),
                KeyAndValue::new("lit", "hello"),
            ]
        );

        let run = h.run(id).await;
        assert_eq!(
            run.spec.communal,
            vec![
                KeyAndValue::new("approved", "yes"),
                KeyAndValue::new("extra", "1"),
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_run_is_dropped() {
        let mut h = Harness::new(NodeGateway::new());
        assert_eq!(h.runner.advance(42).await.unwrap(), Advance::Dropped);
        assert_eq!(h.queued(), None);
    }

    #[tokio::test]
    async fn test_duplicate_deliveries_are_serialized() {
        let h = Harness::new(NodeGateway::new());
        let pipeline = Pipeline::new("dup")
            .with_node(Node::new("a", "null"))
            .with_node(Node::new("b", "null"))
            .with_node(Node::new("c", "null"));
        let id = h.create(pipeline, Vec::new()).await;

        let (first, second) = tokio::join!(h.runner.advance(id), h.runner.advance(id));
        assert_eq!(first.unwrap(), Advance::Requeued);
        assert_eq!(second.unwrap(), Advance::Requeued);

        let run = h.run(id).await;
        assert_eq!(
            statuses(&run),
            vec![("a", NodeStatus::Finish), ("b", NodeStatus::Finish)]
        );
        assert_order(&run);
    }
}
