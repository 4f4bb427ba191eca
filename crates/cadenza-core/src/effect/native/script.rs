//! Script effect - a user-supplied per-block processing closure
//!
//! The closure sees the block and the current values of the parameters it
//! declared. A script that panics is disabled for good and the effect
//! passes its input through unchanged from then on.

use std::panic::{self, AssertUnwindSafe};

use crate::effect::{EffectProcessor, EffectSettings, ParamDescriptor};
use crate::types::{ProcessContext, StereoSample};

/// What a script can see besides the block it processes
pub struct ScriptContext<'a> {
    /// Parameter values in declaration order
    pub params: &'a [f32],
    pub sample_rate: f32,
    pub bpm: f64,
    /// Render time of the first frame in samples
    pub frame_time: u64,
}

impl ScriptContext<'_> {
    /// Value of parameter `index`, or 0 when out of range
    pub fn param(&self, index: usize) -> f32 {
        self.params.get(index).copied().unwrap_or(0.0)
    }
}

/// Per-block processing closure
pub type ScriptFn = Box<dyn FnMut(&mut [StereoSample], &ScriptContext<'_>) + Send>;

/// Effect wrapping a [`ScriptFn`]
pub struct ScriptEffect {
    name: String,
    descriptors: Vec<ParamDescriptor>,
    values: Vec<f32>,
    script: ScriptFn,
    disabled: bool,
    /// Copy of the input, restored if the script panics mid-block
    scratch: Vec<StereoSample>,
}

impl ScriptEffect {
    pub fn new(
        name: impl Into<String>,
        descriptors: Vec<ParamDescriptor>,
        script: ScriptFn,
        settings: &EffectSettings,
    ) -> Self {
        let values = descriptors.iter().map(|d| d.default).collect();
        Self {
            name: name.into(),
            descriptors,
            values,
            script,
            disabled: false,
            scratch: vec![StereoSample::silence(); settings.max_block_size.max(1)],
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }
}

impl EffectProcessor for ScriptEffect {
    fn descriptors(&self) -> Vec<ParamDescriptor> {
        self.descriptors.clone()
    }

    fn on_parameter_change(&mut self, key: &str, value: f32) {
        if let Some(i) = self.descriptors.iter().position(|d| d.key == key) {
            self.values[i] = self.descriptors[i].clamp(value);
        }
    }

    fn process(
        &mut self,
        block: &mut [StereoSample],
        _sidechain: Option<&[StereoSample]>,
        ctx: &ProcessContext,
    ) {
        if self.disabled {
            return;
        }
        let n = block.len().min(self.scratch.len());
        self.scratch[..n].copy_from_slice(&block[..n]);

        let script_ctx = ScriptContext {
            params: &self.values,
            sample_rate: ctx.sample_rate,
            bpm: ctx.bpm,
            frame_time: ctx.frame_time,
        };
        let script = &mut self.script;
        let result = panic::catch_unwind(AssertUnwindSafe(|| script(block, &script_ctx)));

        if result.is_err() {
            log::warn!("Script '{}' panicked; disabled, passing audio through", self.name);
            self.disabled = true;
            block[..n].copy_from_slice(&self.scratch[..n]);
        }
    }

    fn reset(&mut self) {}
}
