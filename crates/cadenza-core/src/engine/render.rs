//! Render thread side of the engine

use basedrop::Owned;

use super::command::EngineCommand;
use super::node::{NodeProcessor, RenderNode};
use super::plan::{RenderPlan, RenderStep};
use crate::types::{ProcessContext, StereoBuffer, StereoSample};

/// The render engine
///
/// Owns every render node and one output buffer per slot, all allocated
/// up front. [`Engine::process`] drains pending commands, applies parameter
/// writes and renders the current plan. It never blocks, locks or frees.
///
/// A slot's output buffer keeps its contents between blocks. A feedback
/// edge points at a slot that renders later in the plan, so reading it
/// yields the previous block.
pub struct Engine {
    commands: rtrb::Consumer<EngineCommand>,
    nodes: Vec<Option<Owned<RenderNode>>>,
    outputs: Vec<StereoBuffer>,
    plan: Option<Owned<RenderPlan>>,
    input: StereoBuffer,
    sidechain: StereoBuffer,
    max_block_size: usize,
    sample_rate: f32,
    bpm: f64,
    frame_time: u64,
}

impl Engine {
    pub(crate) fn new(
        commands: rtrb::Consumer<EngineCommand>,
        max_nodes: usize,
        max_block_size: usize,
        sample_rate: f32,
        bpm: f64,
    ) -> Self {
        let max_block_size = max_block_size.max(1);
        Self {
            commands,
            nodes: (0..max_nodes).map(|_| None).collect(),
            outputs: (0..max_nodes)
                .map(|_| StereoBuffer::silence(max_block_size))
                .collect(),
            plan: None,
            input: StereoBuffer::silence(max_block_size),
            sidechain: StereoBuffer::silence(max_block_size),
            max_block_size,
            sample_rate,
            bpm,
            frame_time: 0,
        }
    }

    pub(crate) fn install(&mut self, slot: usize, node: Owned<RenderNode>) {
        if let Some(entry) = self.nodes.get_mut(slot) {
            *entry = Some(node);
        }
        if let Some(buffer) = self.outputs.get_mut(slot) {
            buffer.fill_silence();
        }
    }

    pub(crate) fn install_plan(&mut self, plan: Owned<RenderPlan>) {
        self.plan = Some(plan);
    }

    /// Render time in samples of the next block
    pub fn frame_time(&self) -> u64 {
        self.frame_time
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    /// Render `output.len()` frames of the master output
    ///
    /// Requests longer than the configured block size are rendered in
    /// block-sized passes.
    pub fn process(&mut self, output: &mut StereoBuffer) {
        self.drain_commands();
        self.apply_parameter_writes();

        let total = output.len();
        let mut offset = 0;
        while offset < total {
            let frames = self.max_block_size.min(total - offset);
            self.render_block(frames);

            let dst = &mut output.as_mut_slice()[offset..offset + frames];
            let master = self
                .plan
                .as_ref()
                .and_then(|p| p.master)
                .and_then(|slot| self.outputs.get(slot))
                .filter(|buffer| buffer.len() >= frames);
            match master {
                Some(buffer) => dst.copy_from_slice(&buffer.as_slice()[..frames]),
                None => dst.fill(StereoSample::silence()),
            }
            offset += frames;
            self.frame_time += frames as u64;
        }
    }

    /// Render into an interleaved `[L, R, L, R, ...]` buffer
    ///
    /// `scratch` must have been allocated for `output.len() / 2` frames.
    pub fn process_interleaved(&mut self, output: &mut [f32], scratch: &mut StereoBuffer) {
        let frames = output.len() / 2;
        scratch.set_len_from_capacity(frames);
        self.process(scratch);
        scratch.to_interleaved(output);
    }

    fn drain_commands(&mut self) {
        while let Ok(command) = self.commands.pop() {
            match command {
                EngineCommand::InsertNode { slot, node } => self.install(slot, node),
                EngineCommand::RemoveNode { slot } => {
                    if let Some(entry) = self.nodes.get_mut(slot) {
                        *entry = None;
                    }
                    if let Some(buffer) = self.outputs.get_mut(slot) {
                        buffer.fill_silence();
                    }
                }
                EngineCommand::SwapPlan(plan) => self.plan = Some(plan),
                EngineCommand::ResetNode { slot } => {
                    if let Some(node) = self.nodes.get_mut(slot).and_then(|n| n.as_mut()) {
                        node.reset();
                    }
                }
                EngineCommand::SetBpm(bpm) => self.bpm = bpm,
            }
        }
    }

    fn apply_parameter_writes(&mut self) {
        for node in self.nodes.iter_mut().flatten() {
            if let Some(effect) = node.as_effect_mut() {
                effect.apply_pending();
            }
        }
    }

    fn any_solo(&self, plan: &RenderPlan) -> bool {
        plan.steps.iter().any(|step| {
            matches!(
                self.nodes.get(step.slot).and_then(|n| n.as_deref()).map(|n| &n.processor),
                Some(NodeProcessor::Channel(strip)) if strip.is_soloed()
            )
        })
    }

    fn render_block(&mut self, frames: usize) {
        let Some(plan) = self.plan.take() else {
            return;
        };
        let ctx = ProcessContext {
            sample_rate: self.sample_rate,
            bpm: self.bpm,
            frame_time: self.frame_time,
        };
        let any_solo = self.any_solo(&plan);
        for step in &plan.steps {
            self.render_step(step, frames, any_solo, &ctx);
        }
        self.plan = Some(plan);
    }

    fn render_step(&mut self, step: &RenderStep, frames: usize, any_solo: bool, ctx: &ProcessContext) {
        self.input.set_len_from_capacity(frames);
        self.input.fill_silence();
        self.sidechain.set_len_from_capacity(frames);
        self.sidechain.fill_silence();
        let mut has_sidechain = false;
        for input in &step.inputs {
            let Some(source) = self.outputs.get(input.source) else {
                continue;
            };
            if input.port == 0 {
                self.input.add_scaled(source, input.gain);
            } else {
                self.sidechain.add_scaled(source, input.gain);
                has_sidechain = true;
            }
        }

        let Some(node) = self.nodes.get_mut(step.slot).and_then(|n| n.as_mut()) else {
            if let Some(output) = self.outputs.get_mut(step.slot) {
                output.set_len_from_capacity(frames);
                output.fill_silence();
            }
            return;
        };
        match &mut node.processor {
            NodeProcessor::Source(source) => source.render(self.input.as_mut_slice(), ctx),
            NodeProcessor::Effect(effect) => {
                let sidechain = has_sidechain.then_some(&self.sidechain);
                effect.process_with_sidechain(&mut self.input, sidechain, ctx);
            }
            NodeProcessor::Send(strip) => strip.apply_input(self.input.as_mut_slice()),
            NodeProcessor::Channel(_) | NodeProcessor::Passthrough => {}
        }

        for &slot in &step.chain {
            if let Some(effect) = self
                .nodes
                .get_mut(slot)
                .and_then(|n| n.as_mut())
                .and_then(|n| n.as_effect_mut())
            {
                effect.process(&mut self.input, ctx);
            }
        }

        if let Some(node) = self.nodes.get_mut(step.slot).and_then(|n| n.as_mut()) {
            match &mut node.processor {
                NodeProcessor::Channel(strip) => strip.process(self.input.as_mut_slice(), any_solo),
                NodeProcessor::Send(strip) => strip.apply_return(self.input.as_mut_slice()),
                _ => {}
            }
        }

        if let Some(output) = self.outputs.get_mut(step.slot) {
            output.copy_from(&self.input);
        }
    }
}
