//! Render plans
//!
//! A plan is the routing graph flattened into slot indices: the order in
//! which slots render, what each one sums from its inputs and which effect
//! slots run inside a channel or send bus. It is built on the control
//! thread and swapped into the engine whole.

use std::collections::HashMap;

use crate::graph::{RoutingGraph, MASTER_ID};

/// One summed input of a render step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlanInput {
    /// Slot whose output is read
    pub source: usize,
    /// Input port on the reading node (0 = main, 1 = sidechain)
    pub port: usize,
    pub gain: f32,
}

/// Rendering of one slot
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RenderStep {
    pub slot: usize,
    pub inputs: Vec<PlanInput>,
    /// Effect slots processed in place, in order (channel inserts, send effect)
    pub chain: Vec<usize>,
}

/// Compiled topology the render thread executes
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RenderPlan {
    pub steps: Vec<RenderStep>,
    /// Slot copied to the engine output
    pub master: Option<usize>,
}

impl RenderPlan {
    /// Flatten `graph` using the id → slot assignment
    ///
    /// Nodes without a slot are skipped, as are connections touching them.
    pub fn compile(graph: &RoutingGraph, slots: &HashMap<String, usize>) -> Self {
        let mut steps = Vec::with_capacity(graph.nodes().len());
        for id in graph.render_order() {
            let Some(&slot) = slots.get(&id) else {
                log::warn!("Render plan: node {} has no slot", id);
                continue;
            };

            let inputs = graph
                .connections()
                .iter()
                .filter(|c| c.target == id)
                .filter_map(|c| {
                    slots.get(&c.source).map(|&source| PlanInput {
                        source,
                        port: c.target_input,
                        gain: c.gain,
                    })
                })
                .collect();

            let chain_ids: Vec<&str> = if let Some(channel) = graph.channel(&id) {
                channel.effects.iter().map(|e| e.id.as_str()).collect()
            } else if let Some(bus) = graph.send_bus(&id) {
                bus.effect.iter().map(|e| e.id.as_str()).collect()
            } else {
                Vec::new()
            };
            let chain = chain_ids
                .into_iter()
                .filter_map(|effect| slots.get(effect).copied())
                .collect();

            steps.push(RenderStep { slot, inputs, chain });
        }

        Self {
            steps,
            master: slots.get(MASTER_ID).copied(),
        }
    }

    /// Whether any step reads or runs `slot`
    pub fn references(&self, slot: usize) -> bool {
        self.steps.iter().any(|step| {
            step.slot == slot || step.chain.contains(&slot) || step.inputs.iter().any(|i| i.source == slot)
        })
    }
}
