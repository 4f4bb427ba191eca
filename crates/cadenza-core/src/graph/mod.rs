//! Signal routing graph
//!
//! The graph is the control-thread model of the signal flow: named nodes,
//! the directed connections between their ports, the mixer channels and the
//! send buses. It is always live; every structural mutation is applied
//! immediately and announced to the registered listeners.
//!
//! ```text
//!  instrument ──▶ channel "drums" ──┬──────────────▶ channel "master" ──▶ out
//!                 (insert chain)    └─ send tap ─▶ send bus "verb" ──┘
//! ```
//!
//! Channel output routes, send taps and send returns are ordinary
//! [`Connection`]s, so `connections()` describes the complete topology. The
//! render engine compiles this model into a render plan; see
//! [`crate::engine`].

mod cycles;
pub mod error;
pub mod events;
pub mod node;

pub use error::{GraphError, GraphResult};
pub use events::{GraphEvent, ListenerId};
pub use node::{Connection, MixerChannel, Node, NodeKind, SendBus, MASTER_ID};

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

pub(crate) use cycles::Topology;
use events::Listeners;

/// Channel state plus its derived routing, for snapshots
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelState {
    #[serde(flatten)]
    pub channel: MixerChannel,
    pub output: Option<String>,
    pub sends: Vec<SendTap>,
}

/// One channel → send bus tap
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendTap {
    pub bus: String,
    pub amount: f32,
}

/// Serializable snapshot of the whole graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphState {
    pub channels: Vec<ChannelState>,
    pub connections: Vec<Connection>,
    pub send_buses: Vec<SendBus>,
    pub nodes: Vec<Node>,
}

impl GraphState {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// The routing graph model
pub struct RoutingGraph {
    nodes: Vec<Node>,
    connections: Vec<Connection>,
    channels: Vec<MixerChannel>,
    send_buses: Vec<SendBus>,
    listeners: Listeners,
}

impl Default for RoutingGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RoutingGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoutingGraph")
            .field("nodes", &self.nodes.len())
            .field("connections", &self.connections.len())
            .field("channels", &self.channels.len())
            .field("send_buses", &self.send_buses.len())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl RoutingGraph {
    /// Create a graph containing only the master channel
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::new(MASTER_ID, NodeKind::Mixer)],
            connections: Vec::new(),
            channels: vec![MixerChannel::new(MASTER_ID, "Master")],
            send_buses: Vec::new(),
            listeners: Listeners::default(),
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Listeners
    // ─────────────────────────────────────────────────────────────

    /// Register a listener for structural changes
    pub fn on_event<F>(&mut self, listener: F) -> ListenerId
    where
        F: Fn(&GraphEvent) + Send + 'static,
    {
        self.listeners.add(Box::new(listener))
    }

    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    fn emit(&self, event: GraphEvent) {
        log::debug!("Graph event: {:?}", event);
        self.listeners.emit(&event);
    }

    // ─────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    fn node_index(&self, id: &str) -> Option<usize> {
        self.nodes.iter().position(|n| n.id == id)
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    pub fn channels(&self) -> &[MixerChannel] {
        &self.channels
    }

    pub fn channel(&self, id: &str) -> Option<&MixerChannel> {
        self.channels.iter().find(|c| c.id == id)
    }

    fn channel_mut(&mut self, id: &str) -> Option<&mut MixerChannel> {
        self.channels.iter_mut().find(|c| c.id == id)
    }

    pub fn send_buses(&self) -> &[SendBus] {
        &self.send_buses
    }

    pub fn send_bus(&self, id: &str) -> Option<&SendBus> {
        self.send_buses.iter().find(|b| b.id == id)
    }

    /// Whether `id` names a node, a chain effect or a send bus effect
    pub fn contains(&self, id: &str) -> bool {
        self.node(id).is_some()
            || self
                .channels
                .iter()
                .any(|c| c.effects.iter().any(|e| e.id == id))
            || self
                .send_buses
                .iter()
                .any(|b| b.effect.as_ref().is_some_and(|e| e.id == id))
    }

    /// Channel (or node) a channel's output is routed to
    pub fn channel_output(&self, id: &str) -> Option<&str> {
        self.connections
            .iter()
            .find(|c| c.source == id && self.channel(&c.target).is_some())
            .map(|c| c.target.as_str())
    }

    /// Send taps leaving a channel
    pub fn channel_sends(&self, id: &str) -> Vec<SendTap> {
        self.connections
            .iter()
            .filter(|c| c.source == id && self.send_bus(&c.target).is_some())
            .map(|c| SendTap {
                bus: c.target.clone(),
                amount: c.gain,
            })
            .collect()
    }

    // ─────────────────────────────────────────────────────────────
    // Nodes and connections
    // ─────────────────────────────────────────────────────────────

    /// Add a free-standing node
    ///
    /// Mixer and send nodes are created through `create_mixer_channel` and
    /// `create_send_bus`.
    pub fn add_node(&mut self, node: Node) -> GraphResult<()> {
        if matches!(node.kind, NodeKind::Mixer | NodeKind::Send) {
            return Err(GraphError::InvalidNode {
                id: node.id,
                reason: "mixer and send nodes are created with their channel or bus",
            });
        }
        self.insert_node(node)
    }

    fn insert_node(&mut self, node: Node) -> GraphResult<()> {
        if self.contains(&node.id) {
            return Err(GraphError::DuplicateId(node.id));
        }
        let event = GraphEvent::NodeAdded {
            id: node.id.clone(),
            kind: node.kind,
        };
        self.nodes.push(node);
        self.emit(event);
        Ok(())
    }

    /// Remove a node and every connection referencing it
    ///
    /// Channels and send buses are removed with their channel or bus.
    /// The master channel is never removed.
    pub fn remove_node(&mut self, id: &str) -> bool {
        if self.channel(id).is_some() {
            return self.remove_mixer_channel(id);
        }
        if self.send_bus(id).is_some() {
            return self.remove_send_bus(id);
        }
        let Some(index) = self.node_index(id) else {
            return false;
        };
        self.evict_connections(id);
        let node = self.nodes.remove(index);
        self.emit(GraphEvent::NodeRemoved {
            id: node.id,
            kind: node.kind,
        });
        true
    }

    fn evict_connections(&mut self, id: &str) {
        let (evicted, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.connections)
            .into_iter()
            .partition(|c| c.source == id || c.target == id);
        self.connections = kept;
        for connection in evicted {
            self.emit(GraphEvent::Disconnected(connection));
        }
    }

    /// Connect output 0 of `source` to input 0 of `target`
    pub fn connect(&mut self, source: &str, target: &str) -> bool {
        self.connect_ports(Connection::new(source, target))
    }

    /// Add a connection
    ///
    /// Returns `false` when an endpoint or port does not exist, or when the
    /// edge would close a cycle without a delay element.
    pub fn connect_ports(&mut self, connection: Connection) -> bool {
        let (Some(source), Some(target)) =
            (self.node(&connection.source), self.node(&connection.target))
        else {
            log::debug!(
                "connect {} -> {}: missing endpoint",
                connection.source,
                connection.target
            );
            return false;
        };
        if connection.source_output >= source.outputs || connection.target_input >= target.inputs {
            log::debug!(
                "connect {}:{} -> {}:{}: no such port",
                connection.source,
                connection.source_output,
                connection.target,
                connection.target_input
            );
            return false;
        }
        if !connection.gain.is_finite() {
            return false;
        }
        self.try_insert_connection(connection)
    }

    fn try_insert_connection(&mut self, connection: Connection) -> bool {
        self.connections.push(connection);
        if let Some(cycle) = self.undelayed_cycles().into_iter().next() {
            self.connections.pop();
            log::warn!("Refusing connection: cycle without delay through {}", cycle.join(" -> "));
            return false;
        }
        if let Some(connection) = self.connections.last().cloned() {
            self.emit(GraphEvent::Connected(connection));
        }
        true
    }

    /// Remove connections leaving `source`, optionally only those to `target`
    ///
    /// Returns `true` when at least one connection was removed.
    pub fn disconnect(&mut self, source: &str, target: Option<&str>) -> bool {
        let matches = |c: &Connection| c.source == source && target.map_or(true, |t| c.target == t);
        let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.connections)
            .into_iter()
            .partition(matches);
        self.connections = kept;
        let any = !removed.is_empty();
        for connection in removed {
            self.emit(GraphEvent::Disconnected(connection));
        }
        any
    }

    // ─────────────────────────────────────────────────────────────
    // Mixer channels
    // ─────────────────────────────────────────────────────────────

    /// Create a channel wired into master
    pub fn create_mixer_channel(&mut self, id: &str, name: &str) -> GraphResult<()> {
        if self.contains(id) {
            return Err(GraphError::DuplicateId(id.to_string()));
        }
        self.nodes.push(Node::new(id, NodeKind::Mixer));
        self.channels.push(MixerChannel::new(id, name));
        self.emit(GraphEvent::ChannelAdded { id: id.to_string() });
        // A fresh node has no inputs, so its first edge cannot close a cycle
        let wired = self.try_insert_connection(Connection::new(id, MASTER_ID));
        debug_assert!(wired, "new channel {} refused by master", id);
        log::info!("Created mixer channel '{}' ({})", id, name);
        Ok(())
    }

    /// Remove a channel; channels routed into it fall back to master
    ///
    /// Always `false` for master.
    pub fn remove_mixer_channel(&mut self, id: &str) -> bool {
        if id == MASTER_ID {
            log::warn!("The master channel cannot be removed");
            return false;
        }
        let Some(position) = self.channels.iter().position(|c| c.id == id) else {
            return false;
        };

        let children: Vec<String> = self
            .channels
            .iter()
            .filter(|c| self.channel_output(&c.id) == Some(id))
            .map(|c| c.id.clone())
            .collect();

        self.evict_connections(id);
        let channel = self.channels.remove(position);
        if let Some(index) = self.node_index(id) {
            self.nodes.remove(index);
        }
        for effect in channel.effects {
            self.emit(GraphEvent::EffectRemoved {
                owner: id.to_string(),
                effect: effect.id,
            });
        }
        self.emit(GraphEvent::ChannelRemoved { id: id.to_string() });

        for child in children {
            if !self.try_insert_connection(Connection::new(child.clone(), MASTER_ID)) {
                log::warn!("Channel '{}' left unrouted after removing '{}'", child, id);
            }
        }
        log::info!("Removed mixer channel '{}'", id);
        true
    }

    /// Re-parent a channel's output to another channel
    pub fn route_channel(&mut self, source: &str, target: &str) -> bool {
        if source == MASTER_ID || source == target {
            return false;
        }
        if self.channel(source).is_none() || self.channel(target).is_none() {
            return false;
        }
        if self.channel_output(source) == Some(target) {
            return true;
        }

        let is_route = |c: &Connection, graph: &Self| {
            c.source == source && graph.channel(&c.target).is_some()
        };
        let old: Vec<Connection> = self
            .connections
            .iter()
            .filter(|c| is_route(c, self))
            .cloned()
            .collect();
        self.connections.retain(|c| !old.contains(c));

        self.connections.push(Connection::new(source, target));
        if !self.undelayed_cycles().is_empty() {
            self.connections.pop();
            self.connections.extend(old);
            log::warn!("Refusing to route {} -> {}: cycle without delay", source, target);
            return false;
        }
        for connection in old {
            self.emit(GraphEvent::Disconnected(connection));
        }
        self.emit(GraphEvent::Connected(Connection::new(source, target)));
        true
    }

    pub fn set_channel_volume(&mut self, id: &str, volume: f32) -> bool {
        self.update_channel(id, |c| c.volume = volume.clamp(0.0, 2.0))
    }

    pub fn set_channel_pan(&mut self, id: &str, pan: f32) -> bool {
        self.update_channel(id, |c| c.pan = pan.clamp(-1.0, 1.0))
    }

    pub fn set_channel_mute(&mut self, id: &str, mute: bool) -> bool {
        self.update_channel(id, |c| c.mute = mute)
    }

    pub fn set_channel_solo(&mut self, id: &str, solo: bool) -> bool {
        self.update_channel(id, |c| c.solo = solo)
    }

    fn update_channel(&mut self, id: &str, update: impl FnOnce(&mut MixerChannel)) -> bool {
        match self.channel_mut(id) {
            Some(channel) => {
                update(channel);
                true
            }
            None => false,
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Insert chains
    // ─────────────────────────────────────────────────────────────

    /// Insert an effect into a channel chain (`None` appends)
    pub fn add_effect_to_channel(
        &mut self,
        channel_id: &str,
        effect: Node,
        index: Option<usize>,
    ) -> GraphResult<()> {
        if effect.kind != NodeKind::Effect {
            return Err(GraphError::InvalidNode {
                id: effect.id,
                reason: "only effects can join a channel chain",
            });
        }
        if self.contains(&effect.id) {
            return Err(GraphError::DuplicateId(effect.id));
        }
        let effect_id = effect.id.clone();
        let channel = self
            .channel_mut(channel_id)
            .ok_or_else(|| GraphError::ChannelNotFound(channel_id.to_string()))?;
        let at = index.unwrap_or(channel.effects.len()).min(channel.effects.len());
        channel.effects.insert(at, effect);
        let delay = channel.has_delay();
        self.set_node_delay(channel_id, delay);
        self.emit(GraphEvent::EffectAdded {
            owner: channel_id.to_string(),
            effect: effect_id,
        });
        Ok(())
    }

    /// Remove an effect from a channel chain
    ///
    /// Refused when the channel is the only delay on a feedback cycle.
    pub fn remove_effect_from_channel(&mut self, channel_id: &str, effect_id: &str) -> bool {
        let Some(channel) = self.channel(channel_id) else {
            return false;
        };
        let Some(position) = channel.effects.iter().position(|e| e.id == effect_id) else {
            return false;
        };
        let remaining_delay = channel
            .effects
            .iter()
            .enumerate()
            .any(|(i, e)| i != position && e.delay_capable);

        let was_delay = self.node(channel_id).is_some_and(|n| n.delay_capable);
        self.set_node_delay(channel_id, remaining_delay);
        if !self.undelayed_cycles().is_empty() {
            self.set_node_delay(channel_id, was_delay);
            log::warn!(
                "Keeping {} on {}: it is the delay element of a feedback cycle",
                effect_id,
                channel_id
            );
            return false;
        }

        if let Some(channel) = self.channel_mut(channel_id) {
            channel.effects.remove(position);
        }
        self.emit(GraphEvent::EffectRemoved {
            owner: channel_id.to_string(),
            effect: effect_id.to_string(),
        });
        true
    }

    fn set_node_delay(&mut self, id: &str, delay_capable: bool) {
        if let Some(node) = self.nodes.iter_mut().find(|n| n.id == id) {
            node.delay_capable = delay_capable;
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Send buses
    // ─────────────────────────────────────────────────────────────

    /// Create a send bus whose return feeds master
    pub fn create_send_bus(&mut self, id: &str, name: &str, effect: Option<Node>) -> GraphResult<()> {
        if self.contains(id) {
            return Err(GraphError::DuplicateId(id.to_string()));
        }
        if let Some(effect) = &effect {
            if effect.kind != NodeKind::Effect {
                return Err(GraphError::InvalidNode {
                    id: effect.id.clone(),
                    reason: "a send bus can only own an effect",
                });
            }
            if effect.id == id || self.contains(&effect.id) {
                return Err(GraphError::DuplicateId(effect.id.clone()));
            }
        }
        let bus = SendBus::new(id, name, effect);
        let delay = bus.has_delay();
        let effect_id = bus.effect.as_ref().map(|e| e.id.clone());
        self.insert_node(Node::new(id, NodeKind::Send).with_delay(delay))?;
        self.send_buses.push(bus);
        if let Some(effect) = effect_id {
            self.emit(GraphEvent::EffectAdded {
                owner: id.to_string(),
                effect,
            });
        }
        let wired = self.try_insert_connection(Connection::new(id, MASTER_ID));
        debug_assert!(wired, "new send bus {} refused by master", id);
        log::info!("Created send bus '{}' ({})", id, name);
        Ok(())
    }

    pub fn remove_send_bus(&mut self, id: &str) -> bool {
        let Some(position) = self.send_buses.iter().position(|b| b.id == id) else {
            return false;
        };
        self.evict_connections(id);
        let bus = self.send_buses.remove(position);
        if let Some(effect) = bus.effect {
            self.emit(GraphEvent::EffectRemoved {
                owner: id.to_string(),
                effect: effect.id,
            });
        }
        if let Some(index) = self.node_index(id) {
            let node = self.nodes.remove(index);
            self.emit(GraphEvent::NodeRemoved {
                id: node.id,
                kind: node.kind,
            });
        }
        true
    }

    /// Tap a channel into a send bus at `amount`, replacing an existing tap
    pub fn connect_to_send(&mut self, channel_id: &str, send_id: &str, amount: f32) -> bool {
        if self.channel(channel_id).is_none() || self.send_bus(send_id).is_none() {
            return false;
        }
        if !amount.is_finite() {
            return false;
        }
        let existing = self
            .connections
            .iter()
            .position(|c| c.source == channel_id && c.target == send_id);
        if let Some(position) = existing {
            let old = self.connections.remove(position);
            self.emit(GraphEvent::Disconnected(old));
        }
        self.try_insert_connection(Connection::new(channel_id, send_id).with_gain(amount.max(0.0)))
    }

    pub fn set_send_gains(&mut self, id: &str, input_gain: f32, return_gain: f32) -> bool {
        match self.send_buses.iter_mut().find(|b| b.id == id) {
            Some(bus) => {
                bus.input_gain = input_gain.clamp(0.0, 4.0);
                bus.return_gain = return_gain.clamp(0.0, 4.0);
                true
            }
            None => false,
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Instruments
    // ─────────────────────────────────────────────────────────────

    /// Add an instrument node feeding `channel_id`
    pub fn add_instrument(&mut self, id: &str, channel_id: &str) -> GraphResult<()> {
        if self.channel(channel_id).is_none() {
            return Err(GraphError::ChannelNotFound(channel_id.to_string()));
        }
        self.insert_node(Node::instrument(id))?;
        let wired = self.try_insert_connection(Connection::new(id, channel_id));
        debug_assert!(wired, "new instrument {} refused by {}", id, channel_id);
        Ok(())
    }

    pub fn remove_instrument(&mut self, id: &str) -> bool {
        match self.node(id) {
            Some(node) if node.kind == NodeKind::Instrument => self.remove_node(id),
            _ => false,
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Analysis
    // ─────────────────────────────────────────────────────────────

    pub(crate) fn topology(&self) -> Topology {
        let index: HashMap<&str, usize> = self
            .nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.id.as_str(), i))
            .collect();
        let mut topology = Topology::new(self.nodes.len());
        for (i, node) in self.nodes.iter().enumerate() {
            topology.delay_capable[i] = node.delay_capable;
        }
        for c in &self.connections {
            if let (Some(&from), Some(&to)) = (index.get(c.source.as_str()), index.get(c.target.as_str())) {
                topology.add_edge(from, to);
            }
        }
        topology
    }

    /// Every cycle that does not pass through a delay-capable node
    pub fn undelayed_cycles(&self) -> Vec<Vec<String>> {
        self.topology()
            .undelayed_cycles()
            .into_iter()
            .map(|scc| scc.into_iter().map(|i| self.nodes[i].id.clone()).collect())
            .collect()
    }

    /// Check that every cycle passes through a delay element
    pub fn validate(&self) -> GraphResult<()> {
        match self.undelayed_cycles().into_iter().next() {
            Some(cycle) => Err(GraphError::UndelayedCycle(cycle)),
            None => Ok(()),
        }
    }

    /// Node ids in the order the render engine processes them
    pub fn render_order(&self) -> Vec<String> {
        self.topology()
            .render_order()
            .into_iter()
            .map(|i| self.nodes[i].id.clone())
            .collect()
    }

    /// Serializable snapshot of channels, connections and send buses
    pub fn get_state(&self) -> GraphState {
        GraphState {
            channels: self
                .channels
                .iter()
                .map(|c| ChannelState {
                    channel: c.clone(),
                    output: self.channel_output(&c.id).map(str::to_string),
                    sends: self.channel_sends(&c.id),
                })
                .collect(),
            connections: self.connections.clone(),
            send_buses: self.send_buses.clone(),
            nodes: self.nodes.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn recorder(graph: &mut RoutingGraph) -> Arc<Mutex<Vec<GraphEvent>>> {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        graph.on_event(move |e| sink.lock().unwrap().push(e.clone()));
        events
    }

    fn has_connection(graph: &RoutingGraph, source: &str, target: &str) -> bool {
        graph
            .connections()
            .iter()
            .any(|c| c.source == source && c.target == target)
    }

    #[test]
    fn test_routing_scenario() {
        let mut graph = RoutingGraph::new();
        assert!(graph.channel(MASTER_ID).is_some());
        graph.create_mixer_channel("drum", "Drums").unwrap();
        assert!(graph.route_channel("drum", MASTER_ID));
        assert!(has_connection(&graph, "drum", MASTER_ID));
        assert!(!graph.remove_mixer_channel(MASTER_ID));
        assert!(!graph.remove_node(MASTER_ID));
        assert!(graph.channel(MASTER_ID).is_some());
    }

    #[test]
    fn test_new_channel_is_wired_to_master() {
        let mut graph = RoutingGraph::new();
        let events = recorder(&mut graph);
        graph.create_mixer_channel("bass", "Bass").unwrap();
        assert_eq!(graph.channel_output("bass"), Some(MASTER_ID));
        let events = events.lock().unwrap();
        assert_eq!(events[0], GraphEvent::ChannelAdded { id: "bass".into() });
        assert_eq!(events[1], GraphEvent::Connected(Connection::new("bass", MASTER_ID)));
    }

    #[test]
    fn test_duplicate_ids_are_rejected() {
        let mut graph = RoutingGraph::new();
        graph.create_mixer_channel("a", "A").unwrap();
        assert_eq!(
            graph.create_mixer_channel("a", "Again"),
            Err(GraphError::DuplicateId("a".into()))
        );
        assert!(graph.add_node(Node::new("a", NodeKind::Utility)).is_err());
        assert!(graph.add_node(Node::new("m", NodeKind::Mixer)).is_err());
    }

    #[test]
    fn test_route_channel_reparents() {
        let mut graph = RoutingGraph::new();
        graph.create_mixer_channel("kick", "Kick").unwrap();
        graph.create_mixer_channel("drums", "Drum Bus").unwrap();
        assert!(graph.route_channel("kick", "drums"));
        assert_eq!(graph.channel_output("kick"), Some("drums"));
        assert!(!has_connection(&graph, "kick", MASTER_ID));

        assert!(!graph.route_channel("kick", "nowhere"));
        assert!(!graph.route_channel(MASTER_ID, "drums"));
        assert!(!graph.route_channel("kick", "kick"));
        // drums -> kick -> drums has no delay
        assert!(!graph.route_channel("drums", "kick"));
        assert_eq!(graph.channel_output("drums"), Some(MASTER_ID));
    }

    #[test]
    fn test_removing_channel_reroutes_children_to_master() {
        let mut graph = RoutingGraph::new();
        graph.create_mixer_channel("kick", "Kick").unwrap();
        graph.create_mixer_channel("drums", "Drum Bus").unwrap();
        graph.route_channel("kick", "drums");
        assert!(graph.remove_mixer_channel("drums"));
        assert_eq!(graph.channel_output("kick"), Some(MASTER_ID));
        assert!(graph.node("drums").is_none());
        assert!(graph.connections().iter().all(|c| c.source != "drums" && c.target != "drums"));
    }

    #[test]
    fn test_removed_parent_fallback_refuses_undelayed_cycle() {
        let mut graph = RoutingGraph::new();
        graph.create_mixer_channel("kick", "Kick").unwrap();
        graph.create_mixer_channel("drums", "Drum Bus").unwrap();
        graph
            .add_effect_to_channel("drums", Node::new("dly", NodeKind::Effect).with_delay(true), None)
            .unwrap();
        graph.add_node(Node::new("util", NodeKind::Utility)).unwrap();
        assert!(graph.route_channel("kick", "drums"));
        // master -> util -> kick -> drums -> master loops through the drums delay
        assert!(graph.connect(MASTER_ID, "util"));
        assert!(graph.connect("util", "kick"));

        assert!(graph.remove_mixer_channel("drums"));
        assert_eq!(graph.channel_output("kick"), None);
        assert!(graph.validate().is_ok());
    }

    #[test]
    fn test_connect_checks_endpoints_and_ports() {
        let mut graph = RoutingGraph::new();
        graph.add_node(Node::new("fx", NodeKind::Effect).with_ports(2, 1)).unwrap();
        assert!(!graph.connect("fx", "ghost"));
        assert!(!graph.connect("ghost", "fx"));
        assert!(!graph.connect_ports(Connection::new("fx", MASTER_ID).with_ports(1, 0)));
        assert!(graph.connect_ports(Connection::new(MASTER_ID, "fx").with_ports(0, 1)));
        assert!(!graph.connect_ports(Connection::new("fx", MASTER_ID).with_gain(f32::NAN)));
    }

    #[test]
    fn test_multiple_connections_between_same_pair() {
        let mut graph = RoutingGraph::new();
        graph.add_node(Node::instrument("synth")).unwrap();
        assert!(graph.connect("synth", MASTER_ID));
        assert!(graph.connect("synth", MASTER_ID));
        assert_eq!(graph.connections().len(), 2);
        assert!(graph.disconnect("synth", Some(MASTER_ID)));
        assert!(graph.connections().is_empty());
        assert!(!graph.disconnect("synth", None));
    }

    #[test]
    fn test_disconnect_by_source_or_pair() {
        let mut graph = RoutingGraph::new();
        graph.create_mixer_channel("a", "A").unwrap();
        graph.create_mixer_channel("b", "B").unwrap();
        graph.add_node(Node::instrument("osc")).unwrap();
        graph.connect("osc", "a");
        graph.connect("osc", "b");
        assert!(graph.disconnect("osc", Some("b")));
        assert!(has_connection(&graph, "osc", "a"));
        assert!(graph.disconnect("osc", None));
        assert!(!has_connection(&graph, "osc", "a"));
        assert!(!graph.disconnect("missing", None));
    }

    #[test]
    fn test_remove_node_evicts_connections() {
        let mut graph = RoutingGraph::new();
        let events = recorder(&mut graph);
        graph.add_node(Node::new("util", NodeKind::Utility)).unwrap();
        graph.add_node(Node::instrument("osc")).unwrap();
        graph.connect("osc", "util");
        graph.connect("util", MASTER_ID);
        assert!(graph.remove_node("util"));
        assert!(graph.connections().is_empty());
        assert!(!graph.remove_node("util"));

        let events = events.lock().unwrap();
        let disconnects = events
            .iter()
            .filter(|e| matches!(e, GraphEvent::Disconnected(_)))
            .count();
        assert_eq!(disconnects, 2);
        assert!(matches!(events.last(), Some(GraphEvent::NodeRemoved { id, .. }) if id == "util"));
    }

    #[test]
    fn test_cycles_need_a_delay() {
        let mut graph = RoutingGraph::new();
        graph.add_node(Node::new("a", NodeKind::Utility)).unwrap();
        graph.add_node(Node::new("b", NodeKind::Utility)).unwrap();
        graph
            .add_node(Node::new("echo", NodeKind::Effect).with_delay(true))
            .unwrap();
        assert!(graph.connect("a", "b"));
        assert!(!graph.connect("b", "a"));
        assert!(!graph.connect("a", "a"));

        assert!(graph.connect("b", "echo"));
        assert!(graph.connect("echo", "a"));
        assert!(graph.validate().is_ok());

        let order = graph.render_order();
        let pos = |id: &str| order.iter().position(|x| x == id).unwrap();
        assert!(pos("a") < pos("b"));
        assert!(pos("b") < pos("echo"));
    }

    #[test]
    fn test_insert_chain_delay_guards_feedback() {
        let mut graph = RoutingGraph::new();
        graph.create_mixer_channel("loop", "Loop").unwrap();
        graph.add_node(Node::new("util", NodeKind::Utility)).unwrap();
        graph
            .add_effect_to_channel("loop", Node::new("dly", NodeKind::Effect).with_delay(true), None)
            .unwrap();
        graph
            .add_effect_to_channel("loop", Node::new("eq", NodeKind::Effect), Some(0))
            .unwrap();
        assert_eq!(graph.channel("loop").unwrap().effects[0].id, "eq");

        assert!(graph.connect("loop", "util"));
        assert!(graph.connect("util", "loop"));
        assert!(!graph.remove_effect_from_channel("loop", "dly"));
        assert!(graph.remove_effect_from_channel("loop", "eq"));
        assert!(!graph.remove_effect_from_channel("loop", "eq"));

        assert!(graph.disconnect("util", Some("loop")));
        assert!(graph.remove_effect_from_channel("loop", "dly"));
        assert!(graph.channel("loop").unwrap().effects.is_empty());
    }

    #[test]
    fn test_chain_effect_rejects_non_effects() {
        let mut graph = RoutingGraph::new();
        assert!(matches!(
            graph.add_effect_to_channel(MASTER_ID, Node::instrument("osc"), None),
            Err(GraphError::InvalidNode { .. })
        ));
        assert_eq!(
            graph.add_effect_to_channel("nope", Node::new("fx", NodeKind::Effect), None),
            Err(GraphError::ChannelNotFound("nope".into()))
        );
    }

    #[test]
    fn test_send_bus_lifecycle() {
        let mut graph = RoutingGraph::new();
        graph.create_mixer_channel("vox", "Vocals").unwrap();
        graph
            .create_send_bus("verb", "Reverb", Some(Node::new("verb-fx", NodeKind::Effect).with_delay(true)))
            .unwrap();
        assert!(has_connection(&graph, "verb", MASTER_ID));
        assert!(graph.contains("verb-fx"));

        assert!(graph.connect_to_send("vox", "verb", 0.3));
        assert!(graph.connect_to_send("vox", "verb", 0.5));
        assert_eq!(
            graph.channel_sends("vox"),
            vec![SendTap {
                bus: "verb".into(),
                amount: 0.5
            }]
        );
        assert!(!graph.connect_to_send("vox", "nope", 0.5));
        assert!(!graph.connect_to_send("nope", "verb", 0.5));

        assert!(graph.remove_send_bus("verb"));
        assert!(graph.channel_sends("vox").is_empty());
        assert!(!graph.contains("verb-fx"));
        assert!(!graph.remove_send_bus("verb"));
    }

    #[test]
    fn test_instruments() {
        let mut graph = RoutingGraph::new();
        graph.create_mixer_channel("keys", "Keys").unwrap();
        graph.add_instrument("piano", "keys").unwrap();
        assert!(has_connection(&graph, "piano", "keys"));
        assert_eq!(
            graph.add_instrument("organ", "missing"),
            Err(GraphError::ChannelNotFound("missing".into()))
        );
        assert!(!graph.remove_instrument("keys"));
        assert!(graph.remove_instrument("piano"));
        assert!(graph.node("piano").is_none());
    }

    #[test]
    fn test_panicking_listener_does_not_stop_others() {
        let mut graph = RoutingGraph::new();
        graph.on_event(|_| panic!("listener failure"));
        let events = recorder(&mut graph);
        graph.create_mixer_channel("a", "A").unwrap();
        assert_eq!(events.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_remove_listener() {
        let mut graph = RoutingGraph::new();
        let events = Arc::new(Mutex::new(0));
        let sink = Arc::clone(&events);
        let id = graph.on_event(move |_| *sink.lock().unwrap() += 1);
        graph.create_mixer_channel("a", "A").unwrap();
        assert!(graph.remove_listener(id));
        assert!(!graph.remove_listener(id));
        graph.create_mixer_channel("b", "B").unwrap();
        assert_eq!(*events.lock().unwrap(), 2);
    }

    #[test]
    fn test_state_snapshot_serializes() {
        let mut graph = RoutingGraph::new();
        graph.create_mixer_channel("gtr", "Guitar").unwrap();
        graph.set_channel_volume("gtr", 0.8);
        graph.create_send_bus("dly", "Delay", None).unwrap();
        graph.connect_to_send("gtr", "dly", 0.25);

        let state = graph.get_state();
        assert_eq!(state.channels.len(), 2);
        let gtr = state.channels.iter().find(|c| c.channel.id == "gtr").unwrap();
        assert_eq!(gtr.output.as_deref(), Some(MASTER_ID));
        assert_eq!(gtr.sends[0].amount, 0.25);

        let json = state.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert!(value.get("channels").is_some());
        assert!(value.get("connections").is_some());
        assert!(value.get("send_buses").is_some());
        assert_eq!(GraphState::from_json(&json).unwrap(), state);
    }
}
