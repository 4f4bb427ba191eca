//! Control thread side of the engine

use std::collections::HashMap;

use basedrop::{Owned, Shared};

use super::command::{command_channel, EngineCommand};
use super::gc::RenderCollector;
use super::node::{
    shared_channel_controls, shared_send_controls, ChannelControls, ChannelStrip, RenderNode,
    SendControls, SendStrip, SignalSource,
};
use super::plan::RenderPlan;
use super::render::Engine;
use super::{EngineError, EngineResult};
use crate::config::EngineConfig;
use crate::effect::{Effect, EffectFactory, EffectHandle, EffectSettings, Preset};
use crate::graph::{
    Connection, GraphEvent, GraphState, ListenerId, Node, NodeKind, RoutingGraph, MASTER_ID,
};

/// Lowest and highest tempo accepted by [`EngineController::set_bpm`]
pub const MIN_BPM: f64 = 1.0;
pub const MAX_BPM: f64 = 999.0;

/// Owns the routing graph and drives an [`Engine`] on another thread
///
/// Every structural call updates the graph model first, then ships new
/// render nodes and a recompiled [`RenderPlan`] through the command queue.
/// Calls that would not fit (no free slot, queue full) are refused before
/// the model changes. The controller is the only producer, so queue room
/// checked up front is still there when the commands are pushed.
pub struct EngineController {
    graph: RoutingGraph,
    factory: EffectFactory,
    collector: RenderCollector,
    commands: rtrb::Producer<EngineCommand>,
    slots: HashMap<String, usize>,
    free_slots: Vec<usize>,
    capacity: usize,
    handles: HashMap<String, EffectHandle>,
    channel_controls: HashMap<String, Shared<ChannelControls>>,
    send_controls: HashMap<String, Shared<SendControls>>,
    settings: EffectSettings,
    bpm: f64,
}

impl EngineController {
    /// Create a controller and the engine it drives
    ///
    /// The engine starts with the master channel installed and is ready to
    /// be moved to the render thread.
    pub fn new(config: &EngineConfig) -> (Self, Engine) {
        let settings = config.effect_settings();
        let capacity = config.max_nodes.max(1);
        let (producer, consumer) = command_channel(config.command_capacity);
        let mut engine = Engine::new(
            consumer,
            capacity,
            settings.max_block_size,
            settings.sample_rate,
            config.bpm,
        );

        let mut controller = Self {
            graph: RoutingGraph::new(),
            factory: EffectFactory::new(settings),
            collector: RenderCollector::new(),
            commands: producer,
            slots: HashMap::new(),
            free_slots: (0..capacity).rev().collect(),
            capacity,
            handles: HashMap::new(),
            channel_controls: HashMap::new(),
            send_controls: HashMap::new(),
            settings,
            bpm: config.bpm,
        };

        let handle = controller.collector.handle();
        if let Ok(slot) = controller.allocate_slot(MASTER_ID) {
            let controls = shared_channel_controls(&handle);
            let strip = ChannelStrip::new(controls.clone(), true, &controller.settings);
            engine.install(slot, Owned::new(&handle, RenderNode::channel(MASTER_ID, strip)));
            controller.channel_controls.insert(MASTER_ID.to_string(), controls);
        }
        let plan = RenderPlan::compile(&controller.graph, &controller.slots);
        engine.install_plan(Owned::new(&handle, plan));

        log::info!(
            "Engine ready: {} Hz, {} frame blocks, {} node slots",
            controller.settings.sample_rate,
            controller.settings.max_block_size,
            capacity
        );
        (controller, engine)
    }

    pub fn graph(&self) -> &RoutingGraph {
        &self.graph
    }

    pub fn factory(&self) -> &EffectFactory {
        &self.factory
    }

    /// Factory access for registering host effect types
    pub fn factory_mut(&mut self) -> &mut EffectFactory {
        &mut self.factory
    }

    pub fn get_state(&self) -> GraphState {
        self.graph.get_state()
    }

    pub fn on_event<F>(&mut self, listener: F) -> ListenerId
    where
        F: Fn(&GraphEvent) + Send + 'static,
    {
        self.graph.on_event(listener)
    }

    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        self.graph.remove_listener(id)
    }

    /// Free everything the render thread has released
    ///
    /// Called after every removal; hosts may also call it periodically.
    pub fn collect(&mut self) {
        self.collector.collect();
    }

    // ─────────────────────────────────────────────────────────────
    // Slots and commands
    // ─────────────────────────────────────────────────────────────

    /// Check that `nodes` new slots and their commands fit
    fn reserve(&self, nodes: usize) -> EngineResult<()> {
        if self.free_slots.len() < nodes {
            return Err(EngineError::NoFreeSlot {
                capacity: self.capacity,
            });
        }
        // inserts plus one plan swap
        if !self.has_queue_room(nodes + 1) {
            return Err(EngineError::QueueFull);
        }
        Ok(())
    }

    fn has_queue_room(&self, commands: usize) -> bool {
        let room = self.commands.slots() >= commands;
        if !room {
            log::warn!("Engine command queue is full, refusing structural change");
        }
        room
    }

    fn allocate_slot(&mut self, id: &str) -> EngineResult<usize> {
        let slot = self.free_slots.pop().ok_or(EngineError::NoFreeSlot {
            capacity: self.capacity,
        })?;
        self.slots.insert(id.to_string(), slot);
        Ok(slot)
    }

    fn send(&mut self, command: EngineCommand) -> EngineResult<()> {
        self.commands.push(command).map_err(|_| {
            log::warn!("Engine command queue is full");
            EngineError::QueueFull
        })
    }

    fn insert_render_node(&mut self, id: &str, node: RenderNode) -> EngineResult<()> {
        let slot = self.allocate_slot(id)?;
        let node = Owned::new(&self.collector.handle(), node);
        self.send(EngineCommand::InsertNode { slot, node })
    }

    fn publish_plan(&mut self) -> EngineResult<()> {
        let plan = RenderPlan::compile(&self.graph, &self.slots);
        log::debug!("Publishing render plan with {} steps", plan.steps.len());
        let plan = Owned::new(&self.collector.handle(), plan);
        self.send(EngineCommand::SwapPlan(plan))
    }

    /// Swap in a plan without `ids`, then empty and free their slots
    ///
    /// Callers check for `ids.len() + 1` commands of queue room before they
    /// touch the graph. Should the plan swap still not go out, the slots stay
    /// out of the free list: the live plan may reference them.
    fn retire(&mut self, ids: &[String]) {
        let published = match self.publish_plan() {
            Ok(()) => true,
            Err(e) => {
                log::error!("Render plan not updated after removal: {}", e);
                false
            }
        };
        for id in ids {
            self.handles.remove(id);
            if let Some(slot) = self.slots.remove(id) {
                if !published {
                    continue;
                }
                // A missed RemoveNode is harmless once the plan no longer
                // reads the slot: the next InsertNode overwrites it
                let _ = self.send(EngineCommand::RemoveNode { slot });
                self.free_slots.push(slot);
            }
        }
        self.collector.collect();
    }

    // ─────────────────────────────────────────────────────────────
    // Nodes and connections
    // ─────────────────────────────────────────────────────────────

    /// Add a free-standing effect node
    pub fn add_effect(&mut self, effect: Effect) -> EngineResult<EffectHandle> {
        self.reserve(1)?;
        self.graph.add_node(Node::effect(&effect))?;
        let id = effect.id().to_string();
        let handle = effect.handle();
        self.insert_render_node(&id, RenderNode::effect(effect))?;
        self.handles.insert(id, handle.clone());
        self.publish_plan()?;
        Ok(handle)
    }

    /// Create an effect through the factory and add it as a node
    pub fn create_effect(&mut self, type_id: &str, preset: Option<&Preset>) -> EngineResult<EffectHandle> {
        let effect = self.factory.create(type_id, preset)?;
        self.add_effect(effect)
    }

    /// Add a summing node (utility or return)
    pub fn add_node(&mut self, node: Node) -> EngineResult<()> {
        if !matches!(node.kind, NodeKind::Utility | NodeKind::Return) {
            return Err(crate::graph::GraphError::InvalidNode {
                id: node.id,
                reason: "use the dedicated call for this node kind",
            }
            .into());
        }
        self.reserve(1)?;
        let id = node.id.clone();
        self.graph.add_node(node)?;
        self.insert_render_node(&id, RenderNode::passthrough(id.as_str()))?;
        self.publish_plan()
    }

    /// Remove any node; channels and send buses take their effects along
    pub fn remove_node(&mut self, id: &str) -> bool {
        if self.graph.channel(id).is_some() {
            return self.remove_mixer_channel(id);
        }
        if self.graph.send_bus(id).is_some() {
            return self.remove_send_bus(id);
        }
        if self.graph.node(id).is_none() || !self.has_queue_room(2) {
            return false;
        }
        if !self.graph.remove_node(id) {
            return false;
        }
        self.retire(&[id.to_string()]);
        true
    }

    pub fn connect(&mut self, source: &str, target: &str) -> bool {
        self.connect_ports(Connection::new(source, target))
    }

    pub fn connect_ports(&mut self, connection: Connection) -> bool {
        self.has_queue_room(1)
            && self.graph.connect_ports(connection)
            && self.publish_plan().is_ok()
    }

    pub fn disconnect(&mut self, source: &str, target: Option<&str>) -> bool {
        self.has_queue_room(1)
            && self.graph.disconnect(source, target)
            && self.publish_plan().is_ok()
    }

    // ─────────────────────────────────────────────────────────────
    // Instruments
    // ─────────────────────────────────────────────────────────────

    pub fn add_instrument(
        &mut self,
        id: &str,
        source: Box<dyn SignalSource>,
        channel_id: &str,
    ) -> EngineResult<()> {
        self.reserve(1)?;
        self.graph.add_instrument(id, channel_id)?;
        self.insert_render_node(id, RenderNode::source(id, source))?;
        self.publish_plan()
    }

    pub fn remove_instrument(&mut self, id: &str) -> bool {
        if self.graph.node(id).is_none() || !self.has_queue_room(2) {
            return false;
        }
        if !self.graph.remove_instrument(id) {
            return false;
        }
        self.retire(&[id.to_string()]);
        true
    }

    // ─────────────────────────────────────────────────────────────
    // Mixer channels
    // ─────────────────────────────────────────────────────────────

    pub fn create_mixer_channel(&mut self, id: &str, name: &str) -> EngineResult<()> {
        self.reserve(1)?;
        self.graph.create_mixer_channel(id, name)?;
        let controls = shared_channel_controls(&self.collector.handle());
        let strip = ChannelStrip::new(controls.clone(), false, &self.settings);
        self.insert_render_node(id, RenderNode::channel(id, strip))?;
        self.channel_controls.insert(id.to_string(), controls);
        self.publish_plan()
    }

    /// Remove a channel and its insert chain; `false` for master
    pub fn remove_mixer_channel(&mut self, id: &str) -> bool {
        let mut retired: Vec<String> = self
            .graph
            .channel(id)
            .map(|c| c.effects.iter().map(|e| e.id.clone()).collect())
            .unwrap_or_default();
        if self.graph.channel(id).is_none() || !self.has_queue_room(retired.len() + 2) {
            return false;
        }
        if !self.graph.remove_mixer_channel(id) {
            return false;
        }
        self.channel_controls.remove(id);
        retired.push(id.to_string());
        self.retire(&retired);
        true
    }

    pub fn route_channel(&mut self, source: &str, target: &str) -> bool {
        self.has_queue_room(1)
            && self.graph.route_channel(source, target)
            && self.publish_plan().is_ok()
    }

    pub fn set_channel_volume(&mut self, id: &str, volume: f32) -> bool {
        if !self.graph.set_channel_volume(id, volume) {
            return false;
        }
        if let (Some(controls), Some(channel)) = (self.channel_controls.get(id), self.graph.channel(id)) {
            controls.volume.store(channel.volume);
        }
        true
    }

    pub fn set_channel_pan(&mut self, id: &str, pan: f32) -> bool {
        if !self.graph.set_channel_pan(id, pan) {
            return false;
        }
        if let (Some(controls), Some(channel)) = (self.channel_controls.get(id), self.graph.channel(id)) {
            controls.pan.store(channel.pan);
        }
        true
    }

    pub fn set_channel_mute(&mut self, id: &str, mute: bool) -> bool {
        if !self.graph.set_channel_mute(id, mute) {
            return false;
        }
        if let Some(controls) = self.channel_controls.get(id) {
            controls.mute.store(mute);
        }
        true
    }

    pub fn set_channel_solo(&mut self, id: &str, solo: bool) -> bool {
        if !self.graph.set_channel_solo(id, solo) {
            return false;
        }
        if let Some(controls) = self.channel_controls.get(id) {
            controls.solo.store(solo);
        }
        true
    }

    /// Insert an effect into a channel chain (`None` appends)
    pub fn add_effect_to_channel(
        &mut self,
        channel_id: &str,
        effect: Effect,
        index: Option<usize>,
    ) -> EngineResult<EffectHandle> {
        self.reserve(1)?;
        self.graph
            .add_effect_to_channel(channel_id, Node::effect(&effect), index)?;
        let id = effect.id().to_string();
        let handle = effect.handle();
        self.insert_render_node(&id, RenderNode::effect(effect))?;
        self.handles.insert(id, handle.clone());
        self.publish_plan()?;
        Ok(handle)
    }

    pub fn remove_effect_from_channel(&mut self, channel_id: &str, effect_id: &str) -> bool {
        if self.graph.channel(channel_id).is_none() || !self.has_queue_room(2) {
            return false;
        }
        if !self.graph.remove_effect_from_channel(channel_id, effect_id) {
            return false;
        }
        self.retire(&[effect_id.to_string()]);
        true
    }

    // ─────────────────────────────────────────────────────────────
    // Send buses
    // ─────────────────────────────────────────────────────────────

    /// Create a send bus, optionally owning one effect
    pub fn create_send_bus(&mut self, id: &str, name: &str, effect: Option<Effect>) -> EngineResult<()> {
        self.reserve(1 + usize::from(effect.is_some()))?;
        self.graph
            .create_send_bus(id, name, effect.as_ref().map(Node::effect))?;

        let controls = shared_send_controls(&self.collector.handle());
        let strip = SendStrip::new(controls.clone(), &self.settings);
        self.insert_render_node(id, RenderNode::send(id, strip))?;
        self.send_controls.insert(id.to_string(), controls);

        if let Some(effect) = effect {
            let effect_id = effect.id().to_string();
            self.handles.insert(effect_id.clone(), effect.handle());
            self.insert_render_node(&effect_id, RenderNode::effect(effect))?;
        }
        self.publish_plan()
    }

    pub fn remove_send_bus(&mut self, id: &str) -> bool {
        let mut retired: Vec<String> = self
            .graph
            .send_bus(id)
            .and_then(|b| b.effect.as_ref())
            .map(|e| vec![e.id.clone()])
            .unwrap_or_default();
        if self.graph.send_bus(id).is_none() || !self.has_queue_room(retired.len() + 2) {
            return false;
        }
        if !self.graph.remove_send_bus(id) {
            return false;
        }
        self.send_controls.remove(id);
        retired.push(id.to_string());
        self.retire(&retired);
        true
    }

    pub fn connect_to_send(&mut self, channel_id: &str, send_id: &str, amount: f32) -> bool {
        self.has_queue_room(1)
            && self.graph.connect_to_send(channel_id, send_id, amount)
            && self.publish_plan().is_ok()
    }

    pub fn set_send_gains(&mut self, id: &str, input_gain: f32, return_gain: f32) -> bool {
        if !self.graph.set_send_gains(id, input_gain, return_gain) {
            return false;
        }
        if let (Some(controls), Some(bus)) = (self.send_controls.get(id), self.graph.send_bus(id)) {
            controls.input_gain.store(bus.input_gain);
            controls.return_gain.store(bus.return_gain);
        }
        true
    }

    // ─────────────────────────────────────────────────────────────
    // Parameters and transport
    // ─────────────────────────────────────────────────────────────

    pub fn effect_handle(&self, id: &str) -> Option<EffectHandle> {
        self.handles.get(id).cloned()
    }

    /// Write an effect parameter; applied at the start of the next block
    pub fn set_parameter(&self, effect_id: &str, key: &str, value: f32) -> bool {
        self.handles
            .get(effect_id)
            .is_some_and(|h| h.set_parameter(key, value))
    }

    /// Clear the signal state of a node (delay lines, envelopes, voices)
    pub fn reset_node(&mut self, id: &str) -> EngineResult<()> {
        let slot = *self
            .slots
            .get(id)
            .ok_or_else(|| EngineError::NotFound(id.to_string()))?;
        self.send(EngineCommand::ResetNode { slot })
    }

    pub fn set_bpm(&mut self, bpm: f64) -> EngineResult<()> {
        let bpm = bpm.clamp(MIN_BPM, MAX_BPM);
        self.send(EngineCommand::SetBpm(bpm))?;
        self.bpm = bpm;
        Ok(())
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    /// Slots still available for nodes and effects
    pub fn free_slots(&self) -> usize {
        self.free_slots.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::ParamDescriptor;
    use crate::types::{ProcessContext, StereoBuffer, StereoSample};
    use crossbeam::atomic::AtomicCell;
    use std::sync::Arc;

    struct Constant(f32);

    impl SignalSource for Constant {
        fn render(&mut self, block: &mut [StereoSample], _ctx: &ProcessContext) {
            block.fill(StereoSample::mono(self.0));
        }
    }

    struct Impulse {
        fired: bool,
    }

    impl SignalSource for Impulse {
        fn render(&mut self, block: &mut [StereoSample], _ctx: &ProcessContext) {
            if !self.fired && !block.is_empty() {
                block[0] = StereoSample::mono(1.0);
                self.fired = true;
            }
        }

        fn reset(&mut self) {
            self.fired = false;
        }
    }

    fn engine() -> (EngineController, Engine) {
        let _ = env_logger::builder().is_test(true).try_init();
        EngineController::new(&EngineConfig::default())
    }

    fn render(engine: &mut Engine, frames: usize) -> StereoBuffer {
        let mut out = StereoBuffer::silence(frames);
        engine.process(&mut out);
        out
    }

    fn gain_script(controller: &EngineController) -> Effect {
        controller.factory().create_script(
            "gain",
            vec![ParamDescriptor::new("gain", "Gain", 1.0).with_range(0.0, 2.0)],
            Box::new(|block, ctx| {
                let g = ctx.param(0);
                for s in block.iter_mut() {
                    *s *= g;
                }
            }),
            None,
        )
    }

    #[test]
    fn test_engine_moves_to_render_thread() {
        fn assert_send<T: Send>() {}
        assert_send::<Engine>();
    }

    #[test]
    fn test_empty_engine_renders_silence() {
        let (_controller, mut engine) = engine();
        let out = render(&mut engine, 256);
        assert!(out.iter().all(|s| *s == StereoSample::silence()));
        assert_eq!(engine.frame_time(), 256);
    }

    #[test]
    fn test_instrument_reaches_master() {
        let (mut controller, mut engine) = engine();
        controller.create_mixer_channel("synth", "Synth").unwrap();
        controller
            .add_instrument("osc", Box::new(Constant(0.25)), "synth")
            .unwrap();
        let out = render(&mut engine, 256);
        assert!(out.iter().all(|s| s.left == 0.25 && s.right == 0.25));
    }

    #[test]
    fn test_long_requests_are_split_into_blocks() {
        let config = EngineConfig {
            max_block_size: 64,
            ..EngineConfig::default()
        };
        let (mut controller, mut engine) = EngineController::new(&config);
        controller.create_mixer_channel("a", "A").unwrap();
        controller.add_instrument("dc", Box::new(Constant(0.5)), "a").unwrap();
        let out = render(&mut engine, 200);
        assert!(out.iter().all(|s| s.left == 0.5));
        assert_eq!(engine.frame_time(), 200);
    }

    #[test]
    fn test_parameter_write_applies_next_block() {
        let (mut controller, mut engine) = engine();
        controller.create_mixer_channel("fx", "FX").unwrap();
        controller.add_instrument("dc", Box::new(Constant(0.5)), "fx").unwrap();
        let effect = gain_script(&controller);
        let id = effect.id().to_string();
        let handle = controller.add_effect_to_channel("fx", effect, None).unwrap();

        let out = render(&mut engine, 128);
        assert!(out.iter().all(|s| s.left == 0.5));

        assert!(handle.set_parameter("gain", 0.5));
        assert!(controller.set_parameter(&id, "gain", 0.5));
        assert!(!controller.set_parameter(&id, "nope", 0.5));
        let out = render(&mut engine, 128);
        assert!(out.iter().all(|s| s.left == 0.25));
    }

    #[test]
    fn test_send_bus_return_feeds_master() {
        let (mut controller, mut engine) = engine();
        controller.create_mixer_channel("vox", "Vocals").unwrap();
        controller.add_instrument("mic", Box::new(Constant(0.2)), "vox").unwrap();
        controller.create_send_bus("aux", "Aux", None).unwrap();
        assert!(controller.connect_to_send("vox", "aux", 0.5));

        let out = render(&mut engine, 128);
        assert!(out.iter().all(|s| (s.left - 0.3).abs() < 1e-6));

        assert!(controller.remove_send_bus("aux"));
        let out = render(&mut engine, 128);
        assert!(out.iter().all(|s| (s.left - 0.2).abs() < 1e-6));
    }

    #[test]
    fn test_solo_and_mute() {
        let (mut controller, mut engine) = engine();
        controller.create_mixer_channel("a", "A").unwrap();
        controller.create_mixer_channel("b", "B").unwrap();
        controller.add_instrument("a-src", Box::new(Constant(0.1)), "a").unwrap();
        controller.add_instrument("b-src", Box::new(Constant(0.2)), "b").unwrap();

        assert!(controller.set_channel_solo("a", true));
        let out = render(&mut engine, 4800);
        assert!((out[4799].left - 0.1).abs() < 1e-3);

        assert!(controller.set_channel_mute("a", true));
        let out = render(&mut engine, 4800);
        assert!(out[4799].left.abs() < 1e-3);
        assert!(!controller.set_channel_mute("ghost", true));
    }

    #[test]
    fn test_removed_instrument_goes_silent() {
        let (mut controller, mut engine) = engine();
        controller.create_mixer_channel("synth", "Synth").unwrap();
        controller.add_instrument("osc", Box::new(Constant(0.25)), "synth").unwrap();
        let slots_before = controller.free_slots();
        render(&mut engine, 128);

        assert!(controller.remove_instrument("osc"));
        assert!(!controller.remove_instrument("osc"));
        let out = render(&mut engine, 128);
        assert!(out.iter().all(|s| s.left == 0.0));
        controller.collect();
        assert_eq!(controller.free_slots(), slots_before + 1);
    }

    #[test]
    fn test_feedback_through_delay_renders() {
        let (mut controller, mut engine) = engine();
        controller.create_mixer_channel("loop", "Loop").unwrap();
        controller
            .add_instrument("imp", Box::new(Impulse { fired: false }), "loop")
            .unwrap();
        let preset = Preset::new("Short").with("time", 5.0).with("mix", 1.0);
        let handle = controller.create_effect("delay", Some(&preset)).unwrap();
        let delay = handle.id().to_string();

        assert!(controller.connect("loop", &delay));
        assert!(controller.connect_ports(Connection::new(delay.as_str(), "loop").with_gain(0.25)));
        assert!(controller.graph().validate().is_ok());

        let out = render(&mut engine, 4800);
        assert!(out.iter().all(|s| s.left.is_finite() && s.left.abs() < 2.0));
        assert_eq!(out[0].left, 1.0);
        // echoes come back round the loop after the first block
        assert!(out.as_slice()[128..].iter().any(|s| s.left.abs() > 1e-4));
    }

    #[test]
    fn test_undelayed_cycle_is_refused() {
        let (mut controller, _engine) = engine();
        controller.create_mixer_channel("a", "A").unwrap();
        controller.add_node(Node::new("util", NodeKind::Utility)).unwrap();
        assert!(controller.connect("a", "util"));
        assert!(!controller.connect("util", "a"));
    }

    #[test]
    fn test_slot_exhaustion_leaves_graph_untouched() {
        let config = EngineConfig {
            max_nodes: 3,
            ..EngineConfig::default()
        };
        let (mut controller, _engine) = EngineController::new(&config);
        controller.create_mixer_channel("a", "A").unwrap();
        controller.add_instrument("src", Box::new(Constant(0.1)), "a").unwrap();
        assert!(matches!(
            controller.create_mixer_channel("b", "B"),
            Err(EngineError::NoFreeSlot { capacity: 3 })
        ));
        assert!(controller.graph().channel("b").is_none());
    }

    #[test]
    fn test_tempo_reaches_effects() {
        let (mut controller, mut engine) = engine();
        let seen = Arc::new(AtomicCell::new(0.0f64));
        let tempo = Arc::clone(&seen);
        let effect = controller.factory().create_script(
            "tempo reader",
            Vec::new(),
            Box::new(move |_block, ctx| tempo.store(ctx.bpm)),
            None,
        );
        controller.add_effect_to_channel(MASTER_ID, effect, None).unwrap();
        controller.set_bpm(140.0).unwrap();
        render(&mut engine, 64);
        assert_eq!(seen.load(), 140.0);
        assert_eq!(controller.bpm(), 140.0);
    }

    #[test]
    fn test_unknown_effect_type() {
        let (mut controller, _engine) = engine();
        assert!(matches!(
            controller.create_effect("theremin", None),
            Err(EngineError::Effect(_))
        ));
        assert!(matches!(controller.reset_node("nope"), Err(EngineError::NotFound(_))));
    }

    fn fill_queue(controller: &mut EngineController) {
        while controller.set_bpm(120.0).is_ok() {}
    }

    #[test]
    fn test_full_queue_refuses_connection_changes() {
        let (mut controller, mut engine) = engine();
        controller.create_mixer_channel("a", "A").unwrap();
        controller.create_mixer_channel("b", "B").unwrap();
        controller.create_send_bus("aux", "Aux", None).unwrap();
        controller.add_node(Node::new("util", NodeKind::Utility)).unwrap();
        fill_queue(&mut controller);

        assert!(!controller.connect("a", "util"));
        assert!(!controller.route_channel("a", "b"));
        assert!(!controller.connect_to_send("a", "aux", 0.5));
        assert!(!controller.disconnect("a", None));
        assert!(controller.graph().connections().iter().all(|c| c.target != "util"));
        assert_eq!(controller.graph().channel_output("a"), Some(MASTER_ID));
        assert!(controller.graph().channel_sends("a").is_empty());

        render(&mut engine, 64);
        assert!(controller.connect("a", "util"));
        assert!(controller.route_channel("a", "b"));
    }

    #[test]
    fn test_full_queue_refuses_removal_and_keeps_slots() {
        let (mut controller, mut engine) = engine();
        controller.create_mixer_channel("synth", "Synth").unwrap();
        controller.add_instrument("osc", Box::new(Constant(0.25)), "synth").unwrap();
        let slots_before = controller.free_slots();
        fill_queue(&mut controller);

        assert!(!controller.remove_instrument("osc"));
        assert!(!controller.remove_mixer_channel("synth"));
        assert!(controller.graph().node("osc").is_some());
        assert_eq!(controller.free_slots(), slots_before);
        let out = render(&mut engine, 128);
        assert!(out.iter().all(|s| s.left == 0.25));

        assert!(controller.remove_instrument("osc"));
        let out = render(&mut engine, 128);
        assert!(out.iter().all(|s| s.left == 0.0));
        controller.collect();
        assert_eq!(controller.free_slots(), slots_before + 1);
    }
}
