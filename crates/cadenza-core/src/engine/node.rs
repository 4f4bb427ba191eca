//! Render-side nodes
//!
//! A [`RenderNode`] is what lives in a render slot: an instrument, a
//! free-standing effect, a channel strip, a send bus strip or a plain
//! summing point. Channel and send settings are written by the control
//! thread into shared atomic cells and read by the strip once per block.

use basedrop::{Handle, Shared};
use crossbeam::atomic::AtomicCell;

use crate::dsp::SmoothedValue;
use crate::effect::{Effect, EffectSettings};
use crate::types::{ProcessContext, StereoSample};

/// Something that produces audio: the instrument side of the graph
pub trait SignalSource: Send {
    /// Write one block of output into `block` (which arrives silent)
    fn render(&mut self, block: &mut [StereoSample], ctx: &ProcessContext);

    /// Clear voice state
    fn reset(&mut self) {}
}

/// Mixer channel settings shared between control and render threads
#[derive(Debug)]
pub struct ChannelControls {
    pub volume: AtomicCell<f32>,
    pub pan: AtomicCell<f32>,
    pub mute: AtomicCell<bool>,
    pub solo: AtomicCell<bool>,
}

impl Default for ChannelControls {
    fn default() -> Self {
        Self {
            volume: AtomicCell::new(1.0),
            pan: AtomicCell::new(0.0),
            mute: AtomicCell::new(false),
            solo: AtomicCell::new(false),
        }
    }
}

/// Send bus gains shared between control and render threads
#[derive(Debug)]
pub struct SendControls {
    pub input_gain: AtomicCell<f32>,
    pub return_gain: AtomicCell<f32>,
}

impl Default for SendControls {
    fn default() -> Self {
        Self {
            input_gain: AtomicCell::new(1.0),
            return_gain: AtomicCell::new(1.0),
        }
    }
}

/// Fader, balance, mute and solo of one mixer channel
pub struct ChannelStrip {
    controls: Shared<ChannelControls>,
    is_master: bool,
    gain_l: SmoothedValue,
    gain_r: SmoothedValue,
}

impl ChannelStrip {
    pub fn new(controls: Shared<ChannelControls>, is_master: bool, settings: &EffectSettings) -> Self {
        Self {
            controls,
            is_master,
            gain_l: settings.smoother(1.0),
            gain_r: settings.smoother(1.0),
        }
    }

    pub fn is_soloed(&self) -> bool {
        self.controls.solo.load()
    }

    /// Apply the fader to one block
    ///
    /// While any channel is soloed, every other channel except master is
    /// silent.
    pub fn process(&mut self, block: &mut [StereoSample], any_solo: bool) {
        let silenced = self.controls.mute.load()
            || (any_solo && !self.is_master && !self.controls.solo.load());
        let volume = if silenced { 0.0 } else { self.controls.volume.load().clamp(0.0, 2.0) };
        let pan = self.controls.pan.load().clamp(-1.0, 1.0);
        // Balance law: unity at center
        self.gain_l.set_target(volume * (1.0 - pan).min(1.0));
        self.gain_r.set_target(volume * (1.0 + pan).min(1.0));

        if self.gain_l.is_settled() && self.gain_r.is_settled() {
            let (l, r) = (self.gain_l.current(), self.gain_r.current());
            if l == 1.0 && r == 1.0 {
                return;
            }
            for s in block.iter_mut() {
                s.left *= l;
                s.right *= r;
            }
            return;
        }
        for s in block.iter_mut() {
            s.left *= self.gain_l.next();
            s.right *= self.gain_r.next();
        }
    }
}

/// Input and return gain stages of a send bus
pub struct SendStrip {
    controls: Shared<SendControls>,
    input: SmoothedValue,
    output: SmoothedValue,
}

impl SendStrip {
    pub fn new(controls: Shared<SendControls>, settings: &EffectSettings) -> Self {
        let input = settings.smoother(controls.input_gain.load());
        let output = settings.smoother(controls.return_gain.load());
        Self {
            controls,
            input,
            output,
        }
    }

    pub fn apply_input(&mut self, block: &mut [StereoSample]) {
        self.input.set_target(self.controls.input_gain.load());
        for s in block.iter_mut() {
            *s *= self.input.next();
        }
    }

    pub fn apply_return(&mut self, block: &mut [StereoSample]) {
        self.output.set_target(self.controls.return_gain.load());
        for s in block.iter_mut() {
            *s *= self.output.next();
        }
    }
}

/// What a render slot does with its summed input
pub enum NodeProcessor {
    Source(Box<dyn SignalSource>),
    Effect(Effect),
    Channel(ChannelStrip),
    Send(SendStrip),
    /// Summing point (utility and return nodes)
    Passthrough,
}

/// One render slot
pub struct RenderNode {
    pub id: String,
    pub processor: NodeProcessor,
}

impl RenderNode {
    pub fn source(id: impl Into<String>, source: Box<dyn SignalSource>) -> Self {
        Self {
            id: id.into(),
            processor: NodeProcessor::Source(source),
        }
    }

    pub fn effect(effect: Effect) -> Self {
        Self {
            id: effect.id().to_string(),
            processor: NodeProcessor::Effect(effect),
        }
    }

    pub fn channel(id: impl Into<String>, strip: ChannelStrip) -> Self {
        Self {
            id: id.into(),
            processor: NodeProcessor::Channel(strip),
        }
    }

    pub fn send(id: impl Into<String>, strip: SendStrip) -> Self {
        Self {
            id: id.into(),
            processor: NodeProcessor::Send(strip),
        }
    }

    pub fn passthrough(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            processor: NodeProcessor::Passthrough,
        }
    }

    pub fn as_effect_mut(&mut self) -> Option<&mut Effect> {
        match &mut self.processor {
            NodeProcessor::Effect(effect) => Some(effect),
            _ => None,
        }
    }

    pub fn reset(&mut self) {
        match &mut self.processor {
            NodeProcessor::Source(source) => source.reset(),
            NodeProcessor::Effect(effect) => effect.reset(),
            _ => {}
        }
    }
}

/// Allocate channel controls reclaimed by the render collector
pub(crate) fn shared_channel_controls(handle: &Handle) -> Shared<ChannelControls> {
    Shared::new(handle, ChannelControls::default())
}

pub(crate) fn shared_send_controls(handle: &Handle) -> Shared<SendControls> {
    Shared::new(handle, SendControls::default())
}
