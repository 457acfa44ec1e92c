// Streaming network graph
// Nodes are streaming instances; edges are bounded token connections

use std::collections::{HashMap, VecDeque};

use daggy::petgraph::algo::toposort;
use daggy::{Dag, NodeIndex};
use log::{debug, info};

use crate::error::{EngineError, EngineResult};
use crate::types::Value;

use super::instance::StreamingInstance;
use super::scheduler::{CancelHandle, SchedulerConfig};

/// Identifier of a node inside one network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub(crate) NodeIndex);

impl NodeId {
    pub fn index(&self) -> usize {
        self.0.index()
    }
}

/// Lifecycle of a network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize)]
pub enum NetworkState {
    /// Still being wired; `run` has not completed
    #[default]
    Ready,
    /// Every node reached end-of-stream
    Finished,
    /// A run stopped on an error; buffers were released
    Failed,
    /// A run was cancelled; buffers were released
    Cancelled,
}

pub(crate) struct Node {
    pub(crate) name: String,
    pub(crate) instance: StreamingInstance,
    /// Connection feeding each input port
    pub(crate) inputs: Vec<Option<usize>>,
    /// Connections fed by each output port (fan-out)
    pub(crate) outputs: Vec<Vec<usize>>,
    pub(crate) finished: bool,
    pub(crate) invocations: u64,
}

/// Bounded FIFO between one output port and one input port
pub(crate) struct Connection {
    pub(crate) buffer: VecDeque<Value>,
    pub(crate) capacity: usize,
    /// Producer finished; no token will ever follow the buffered ones
    pub(crate) eos: bool,
    /// Consumer finished; tokens written here are discarded
    pub(crate) closed: bool,
    pub(crate) delivered: u64,
}

impl Connection {
    pub(crate) fn release(&mut self) {
        self.buffer.clear();
        self.buffer.shrink_to_fit();
        self.closed = true;
    }
}

/// A connected graph of streaming instances.
///
/// Build it with [`add`](Network::add) and [`connect`](Network::connect),
/// then drive it to completion with [`run`](Network::run). Connections are
/// bounded; a producer waits while any downstream buffer is full.
pub struct Network {
    pub(crate) graph: Dag<Node, usize>,
    pub(crate) connections: Vec<Connection>,
    names: HashMap<String, NodeId>,
    pub(crate) config: SchedulerConfig,
    pub(crate) state: NetworkState,
    pub(crate) cancel: CancelHandle,
}

impl Default for Network {
    fn default() -> Self {
        Self::new()
    }
}

impl Network {
    pub fn new() -> Self {
        Self::with_config(SchedulerConfig::default())
    }

    pub fn with_config(config: SchedulerConfig) -> Self {
        Network {
            graph: Dag::new(),
            connections: Vec::new(),
            names: HashMap::new(),
            config,
            state: NetworkState::Ready,
            cancel: CancelHandle::default(),
        }
    }

    /// Add an instance under a name unique within this network
    pub fn add(&mut self, name: impl Into<String>, instance: StreamingInstance) -> EngineResult<NodeId> {
        self.ensure_ready()?;
        let name = name.into();
        if self.names.contains_key(&name) {
            return Err(EngineError::Scheduling(format!(
                "node name '{}' is already used",
                name
            )));
        }
        let inputs = vec![None; instance.descriptor.inputs.len()];
        let outputs = vec![Vec::new(); instance.descriptor.outputs.len()];
        let id = NodeId(self.graph.add_node(Node {
            name: name.clone(),
            instance,
            inputs,
            outputs,
            finished: false,
            invocations: 0,
        }));
        debug!("Added streaming node '{}'", name);
        self.names.insert(name, id);
        Ok(id)
    }

    pub fn node(&self, name: &str) -> Option<NodeId> {
        self.names.get(name).copied()
    }

    pub fn node_name(&self, id: NodeId) -> Option<&str> {
        self.graph.node_weight(id.0).map(|node| node.name.as_str())
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn state(&self) -> NetworkState {
        self.state
    }

    /// Tokens currently held in connection buffers
    pub fn buffered(&self) -> usize {
        self.connections.iter().map(|c| c.buffer.len()).sum()
    }

    /// Largest buffer a connection may hold during a run
    pub fn max_capacity(&self) -> usize {
        self.connections.iter().map(|c| c.capacity).max().unwrap_or(0)
    }

    /// Handle that can stop a run from another thread
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Cancel outside of a run: releases buffers and resets every instance.
    /// The network cannot be run afterwards.
    pub fn cancel(&mut self) {
        self.cancel.cancel();
        self.abort(NetworkState::Cancelled);
    }

    fn ensure_ready(&self) -> EngineResult<()> {
        match self.state {
            NetworkState::Ready => Ok(()),
            NetworkState::Cancelled => Err(EngineError::Cancelled),
            other => Err(EngineError::Scheduling(format!(
                "network is {:?} and can no longer change",
                other
            ))),
        }
    }

    /// Connect output port `output` of `producer` to input port `input` of
    /// `consumer`. Port types must match exactly; an input accepts one
    /// connection while an output may fan out to many.
    pub fn connect(
        &mut self,
        producer: NodeId,
        output: &str,
        consumer: NodeId,
        input: &str,
    ) -> EngineResult<()> {
        self.ensure_ready()?;
        let source = self
            .graph
            .node_weight(producer.0)
            .ok_or_else(|| EngineError::Scheduling("producer node not found".into()))?;
        let sink = self
            .graph
            .node_weight(consumer.0)
            .ok_or_else(|| EngineError::Scheduling("consumer node not found".into()))?;

        let out_index = source
            .instance
            .descriptor
            .output_index(output)
            .ok_or_else(|| EngineError::unknown_port(&source.name, output))?;
        let in_index = sink
            .instance
            .descriptor
            .input_index(input)
            .ok_or_else(|| EngineError::unknown_port(&sink.name, input))?;

        let out_type = source.instance.descriptor.outputs[out_index].data_type;
        let in_type = sink.instance.descriptor.inputs[in_index].data_type;
        if out_type != in_type {
            return Err(EngineError::TypeMismatch {
                port: format!("{}.{} -> {}.{}", source.name, output, sink.name, input),
                expected: in_type,
                found: out_type,
            });
        }
        if sink.inputs[in_index].is_some() {
            return Err(EngineError::Scheduling(format!(
                "input '{}.{}' is already connected",
                sink.name, input
            )));
        }

        // Room for one full acquire window plus one production burst
        let needed = sink.instance.consumption(in_index).acquire
            + source.instance.production(out_index).saturating_sub(1);
        let capacity = self.config.buffer_capacity.max(needed);
        let description = format!("{}.{} -> {}.{}", source.name, output, sink.name, input);

        let index = self.connections.len();
        self.graph
            .add_edge(producer.0, consumer.0, index)
            .map_err(|_| {
                EngineError::Scheduling(format!("connecting {} would create a cycle", description))
            })?;
        self.connections.push(Connection {
            buffer: VecDeque::new(),
            capacity,
            eos: false,
            closed: false,
            delivered: 0,
        });
        if let Some(node) = self.graph.node_weight_mut(producer.0) {
            node.outputs[out_index].push(index);
        }
        if let Some(node) = self.graph.node_weight_mut(consumer.0) {
            node.inputs[in_index] = Some(index);
        }
        debug!("Connected {} (capacity {})", description, capacity);
        Ok(())
    }

    /// Connect the first output of each node to the first input of the next
    pub fn chain(&mut self, nodes: &[NodeId]) -> EngineResult<()> {
        for pair in nodes.windows(2) {
            let output = self.first_port(pair[0], false)?;
            let input = self.first_port(pair[1], true)?;
            self.connect(pair[0], output, pair[1], input)?;
        }
        Ok(())
    }

    fn first_port(&self, id: NodeId, input: bool) -> EngineResult<&'static str> {
        let node = self
            .graph
            .node_weight(id.0)
            .ok_or_else(|| EngineError::Scheduling("node not found".into()))?;
        let ports = if input {
            &node.instance.descriptor.inputs
        } else {
            &node.instance.descriptor.outputs
        };
        ports.first().map(|p| p.name).ok_or_else(|| {
            EngineError::Scheduling(format!(
                "'{}' has no {} port",
                node.name,
                if input { "input" } else { "output" }
            ))
        })
    }

    /// Check the graph is runnable and return nodes in topological order
    pub fn validate(&self) -> EngineResult<Vec<NodeId>> {
        if self.graph.node_count() == 0 {
            return Err(EngineError::Scheduling("network is empty".into()));
        }
        for index in self.graph.graph().node_indices() {
            let node = &self.graph.graph()[index];
            for (port, connection) in node.instance.descriptor.inputs.iter().zip(&node.inputs) {
                if connection.is_none() {
                    return Err(EngineError::Scheduling(format!(
                        "input '{}.{}' is not connected",
                        node.name, port.name
                    )));
                }
            }
            for (i, port) in node.instance.descriptor.inputs.iter().enumerate() {
                let consumption = node.instance.consumption(i);
                if !consumption.is_valid() {
                    return Err(EngineError::Scheduling(format!(
                        "'{}.{}' declares invalid consumption {:?}",
                        node.name, port.name, consumption
                    )));
                }
            }
        }
        let order = toposort(self.graph.graph(), None).map_err(|cycle| {
            EngineError::Scheduling(format!(
                "cycle through node '{}'",
                self.graph.graph()[cycle.node_id()].name
            ))
        })?;
        info!(
            "Validated network: {} nodes, {} connections",
            self.graph.node_count(),
            self.connections.len()
        );
        Ok(order.into_iter().map(NodeId).collect())
    }

    /// Drop buffered tokens and reset every algorithm
    pub(crate) fn abort(&mut self, state: NetworkState) {
        for connection in &mut self.connections {
            connection.release();
        }
        let indices: Vec<NodeIndex> = self.graph.graph().node_indices().collect();
        for index in indices {
            if let Some(node) = self.graph.node_weight_mut(index) {
                node.instance.reset();
            }
        }
        self.state = state;
    }
}

impl std::fmt::Debug for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Network")
            .field("nodes", &self.graph.node_count())
            .field("connections", &self.connections.len())
            .field("state", &self.state)
            .finish()
    }
}
