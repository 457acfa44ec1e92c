// Streaming scheduler
// Pull-ordered single-threaded loop over a validated network

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::types::Value;

use super::algorithm::{Flow, StreamContext};
use super::network::{Connection, Network, NetworkState, Node, NodeId};

/// Scheduler tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Minimum tokens a connection may hold before its producer waits
    pub buffer_capacity: usize,
    /// Abort the run after this many algorithm invocations
    pub max_steps: Option<u64>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            buffer_capacity: 4096,
            max_steps: None,
        }
    }
}

impl SchedulerConfig {
    pub fn from_json(json: &str) -> EngineResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| EngineError::Scheduling(format!("invalid scheduler config: {}", e)))
    }
}

/// Cloneable cancellation flag shared with a running network
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Per-node outcome of a run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeReport {
    pub name: String,
    pub algorithm: String,
    pub invocations: u64,
}

/// Outcome of a completed run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub steps: u64,
    /// Tokens delivered across all connections
    pub tokens: u64,
    pub nodes: Vec<NodeReport>,
}

enum Readiness {
    Process,
    Finish,
    /// Every consumer has finished; the node retires without `finish`
    Detached,
    Blocked,
    Done,
}

impl Network {
    /// Drive the network until every node has reached end-of-stream.
    ///
    /// Nodes are visited sinks first, so downstream buffers drain before
    /// producers refill them. A node fires while its inputs hold a full
    /// acquire window and its outputs have room; once an input reaches
    /// end-of-stream with a short window, the node is finished. Errors and
    /// cancellation release every buffer and reset every algorithm.
    pub fn run(&mut self) -> EngineResult<RunSummary> {
        match self.state {
            NetworkState::Ready => {}
            NetworkState::Cancelled => return Err(EngineError::Cancelled),
            other => {
                return Err(EngineError::Scheduling(format!(
                    "network is {:?} and cannot run again",
                    other
                )))
            }
        }
        if self.cancel.is_cancelled() {
            warn!("Streaming run cancelled before start");
            self.abort(NetworkState::Cancelled);
            return Err(EngineError::Cancelled);
        }

        let order = self.validate()?;
        let pull_order: Vec<NodeId> = order.into_iter().rev().collect();

        match self.drive(&pull_order) {
            Ok(steps) => {
                self.commit();
                self.state = NetworkState::Finished;
                let summary = self.summary(steps);
                info!(
                    "Streaming run finished: {} steps, {} tokens",
                    summary.steps, summary.tokens
                );
                Ok(summary)
            }
            Err(EngineError::Cancelled) => {
                warn!("Streaming run cancelled");
                self.abort(NetworkState::Cancelled);
                Err(EngineError::Cancelled)
            }
            Err(e) => {
                warn!("Streaming run failed: {}", e);
                self.abort(NetworkState::Failed);
                Err(e)
            }
        }
    }

    fn drive(&mut self, pull_order: &[NodeId]) -> EngineResult<u64> {
        let mut steps: u64 = 0;
        loop {
            let mut progressed = false;
            for &id in pull_order {
                loop {
                    if self.cancel.is_cancelled() {
                        return Err(EngineError::Cancelled);
                    }
                    match self.readiness(id) {
                        Readiness::Process => {
                            if self.fire(id)? == Flow::Exhausted {
                                self.complete(id)?;
                            }
                        }
                        Readiness::Finish => self.complete(id)?,
                        Readiness::Detached => self.detach(id),
                        Readiness::Blocked | Readiness::Done => break,
                    }
                    progressed = true;
                    steps += 1;
                    if let Some(limit) = self.config.max_steps {
                        if steps > limit {
                            return Err(EngineError::Scheduling(format!(
                                "step limit of {} exceeded",
                                limit
                            )));
                        }
                    }
                }
            }
            if !progressed {
                break;
            }
        }

        let stalled: Vec<&str> = self
            .graph
            .graph()
            .node_weights()
            .filter(|node| !node.finished)
            .map(|node| node.name.as_str())
            .collect();
        if !stalled.is_empty() {
            return Err(EngineError::Scheduling(format!(
                "deadlock: {} cannot make progress",
                stalled.join(", ")
            )));
        }
        Ok(steps)
    }

    fn readiness(&self, id: NodeId) -> Readiness {
        let Some(node) = self.graph.node_weight(id.0) else {
            return Readiness::Done;
        };
        if node.finished {
            return Readiness::Done;
        }
        let mut targets = node.outputs.iter().flatten().peekable();
        if targets.peek().is_some() && targets.all(|&c| self.connections[c].closed) {
            return Readiness::Detached;
        }

        let outputs_ready = node.outputs.iter().enumerate().all(|(port, targets)| {
            let burst = node.instance.production(port);
            targets.iter().all(|&c| {
                let connection = &self.connections[c];
                connection.closed || connection.buffer.len() + burst <= connection.capacity
            })
        });

        let mut windows_full = true;
        let mut starved = false;
        for (port, input) in node.inputs.iter().enumerate() {
            let Some(c) = input else {
                return Readiness::Blocked;
            };
            let connection = &self.connections[*c];
            if connection.buffer.len() < node.instance.consumption(port).acquire {
                windows_full = false;
                starved |= connection.eos;
            }
        }

        match (windows_full, starved, outputs_ready) {
            (_, _, false) => Readiness::Blocked,
            (true, _, true) => Readiness::Process,
            (false, true, true) => Readiness::Finish,
            (false, false, true) => Readiness::Blocked,
        }
    }

    /// One `process` call: hand out the acquire windows, release the hop,
    /// deliver what was produced
    fn fire(&mut self, id: NodeId) -> EngineResult<Flow> {
        let Network {
            graph, connections, ..
        } = self;
        let node = graph
            .node_weight_mut(id.0)
            .ok_or_else(|| EngineError::Scheduling("node vanished during run".into()))?;

        let rates: Vec<_> = (0..node.inputs.len())
            .map(|port| node.instance.consumption(port))
            .collect();
        let limits: Vec<usize> = (0..node.outputs.len())
            .map(|port| node.instance.production(port))
            .collect();
        for &c in node.inputs.iter().flatten() {
            connections[c].buffer.make_contiguous();
        }

        let descriptor = Arc::clone(&node.instance.descriptor);
        let (flow, produced) = {
            let windows: Vec<&[Value]> = node
                .inputs
                .iter()
                .flatten()
                .zip(&rates)
                .map(|(&c, rate)| &connections[c].buffer.as_slices().0[..rate.acquire])
                .collect();
            let mut ctx = StreamContext::new(
                descriptor.name,
                &descriptor.inputs,
                &descriptor.outputs,
                windows,
                limits,
                false,
            );
            let flow = node.instance.algorithm.process(&mut ctx)?;
            (flow, ctx.into_outputs())
        };

        for (&c, rate) in node.inputs.iter().flatten().zip(&rates) {
            connections[c].buffer.drain(..rate.release);
        }
        deliver(node, connections, produced);
        node.invocations += 1;
        Ok(flow)
    }

    /// The single `finish` call of a node: flush leftovers, then propagate
    /// end-of-stream downstream and close the node's inputs
    fn complete(&mut self, id: NodeId) -> EngineResult<()> {
        let Network {
            graph, connections, ..
        } = self;
        let node = graph
            .node_weight_mut(id.0)
            .ok_or_else(|| EngineError::Scheduling("node vanished during run".into()))?;

        for &c in node.inputs.iter().flatten() {
            connections[c].buffer.make_contiguous();
        }
        let descriptor = Arc::clone(&node.instance.descriptor);
        let produced = {
            let windows: Vec<&[Value]> = node
                .inputs
                .iter()
                .flatten()
                .map(|&c| connections[c].buffer.as_slices().0)
                .collect();
            let limits = vec![usize::MAX; node.outputs.len()];
            let mut ctx = StreamContext::new(
                descriptor.name,
                &descriptor.inputs,
                &descriptor.outputs,
                windows,
                limits,
                true,
            );
            node.instance.algorithm.finish(&mut ctx)?;
            ctx.into_outputs()
        };

        deliver(node, connections, produced);
        node.finished = true;
        for &c in node.inputs.iter().flatten() {
            connections[c].release();
        }
        for &c in node.outputs.iter().flatten() {
            connections[c].eos = true;
        }
        debug!("Node '{}' reached end of stream", node.name);
        Ok(())
    }

    /// Retire a node nobody listens to any more: close its inputs so the
    /// upstream producers can retire in turn
    fn detach(&mut self, id: NodeId) {
        let Network {
            graph, connections, ..
        } = self;
        let Some(node) = graph.node_weight_mut(id.0) else {
            return;
        };
        node.finished = true;
        for &c in node.inputs.iter().flatten() {
            connections[c].release();
        }
        for &c in node.outputs.iter().flatten() {
            connections[c].eos = true;
        }
        debug!("Node '{}' detached: every consumer has finished", node.name);
    }

    /// Publish what the sinks staged during the run
    fn commit(&mut self) {
        let indices: Vec<_> = self.graph.graph().node_indices().collect();
        for index in indices {
            if let Some(node) = self.graph.node_weight_mut(index) {
                node.instance.algorithm.commit();
            }
        }
    }

    fn summary(&self, steps: u64) -> RunSummary {
        let nodes = self
            .graph
            .graph()
            .node_weights()
            .map(|node| NodeReport {
                name: node.name.clone(),
                algorithm: node.instance.name().to_string(),
                invocations: node.invocations,
            })
            .collect();
        RunSummary {
            steps,
            tokens: self.connections.iter().map(|c| c.delivered).sum(),
            nodes,
        }
    }
}

/// Move produced tokens into every open connection of each output port
fn deliver(node: &Node, connections: &mut [Connection], produced: Vec<Vec<Value>>) {
    for (port, tokens) in produced.into_iter().enumerate() {
        if tokens.is_empty() {
            continue;
        }
        let open: Vec<usize> = node.outputs[port]
            .iter()
            .copied()
            .filter(|&c| !connections[c].closed)
            .collect();
        let Some((&last, rest)) = open.split_last() else {
            continue;
        };
        for &c in rest {
            connections[c].delivered += tokens.len() as u64;
            connections[c].buffer.extend(tokens.iter().cloned());
        }
        connections[last].delivered += tokens.len() as u64;
        connections[last].buffer.extend(tokens);
    }
}
