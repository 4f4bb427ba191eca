//! Effect system - the effect record, processing strategies and parameters
//!
//! Every effect is the same [`Effect`] record: identity, the parameter
//! store, presets, the wet gain and the bypass crossfade. What an effect
//! actually does to the signal lives in a boxed [`EffectProcessor`]
//! strategy, so a new effect type is a new processor registered with the
//! [`EffectFactory`], never a new record type.
//!
//! Signal flow inside the record:
//!
//! ```text
//!            ┌──────────── dry tap (none / unity / 1 - mix) ───────────┐
//!  input ────┤                                                        (+)──┬── engage ── output
//!            └── processor ── wet gain (mix, smoothed) ───────────────┘   │
//!            └──────────────────── bypass path ───────────── 1 - engage ──┘
//! ```

pub mod error;
pub mod factory;
pub mod native;
pub mod params;

pub use error::{EffectError, EffectResult};
pub use factory::EffectFactory;
pub use params::{ParamDescriptor, ParamShape, ParamStore, Preset, MIX_KEY};

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::dsp::{LevelMeter, SmoothedValue, DEFAULT_SMOOTHING_MS};
use crate::types::{
    ProcessContext, StereoBuffer, StereoSample, DEFAULT_BLOCK_SIZE, DEFAULT_SAMPLE_RATE,
};

/// Built-in effect type tags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectKind {
    Delay,
    Echo,
    Chorus,
    Flanger,
    Phaser,
    Crossover,
    Equalizer,
    Compressor,
    Stereo,
    Reverb,
    Distortion,
    BitCrusher,
    Script,
    /// Registered at runtime by the host application
    Custom,
}

impl EffectKind {
    /// Kinds the factory can build from a type id alone
    pub const BUILTIN: [EffectKind; 12] = [
        EffectKind::Delay,
        EffectKind::Echo,
        EffectKind::Chorus,
        EffectKind::Flanger,
        EffectKind::Phaser,
        EffectKind::Crossover,
        EffectKind::Equalizer,
        EffectKind::Compressor,
        EffectKind::Stereo,
        EffectKind::Reverb,
        EffectKind::Distortion,
        EffectKind::BitCrusher,
    ];

    /// Type id used with the factory
    pub fn type_id(&self) -> &'static str {
        match self {
            EffectKind::Delay => "delay",
            EffectKind::Echo => "echo",
            EffectKind::Chorus => "chorus",
            EffectKind::Flanger => "flanger",
            EffectKind::Phaser => "phaser",
            EffectKind::Crossover => "crossover",
            EffectKind::Equalizer => "eq",
            EffectKind::Compressor => "compressor",
            EffectKind::Stereo => "stereo",
            EffectKind::Reverb => "reverb",
            EffectKind::Distortion => "distortion",
            EffectKind::BitCrusher => "bitcrusher",
            EffectKind::Script => "script",
            EffectKind::Custom => "custom",
        }
    }

    pub fn from_type_id(id: &str) -> Option<Self> {
        Self::BUILTIN
            .iter()
            .chain([EffectKind::Script].iter())
            .copied()
            .find(|k| k.type_id() == id)
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            EffectKind::Delay => "Stereo Delay",
            EffectKind::Echo => "Multi-Tap Echo",
            EffectKind::Chorus => "Chorus",
            EffectKind::Flanger => "Flanger",
            EffectKind::Phaser => "Phaser",
            EffectKind::Crossover => "Crossover EQ",
            EffectKind::Equalizer => "Parametric EQ",
            EffectKind::Compressor => "Compressor",
            EffectKind::Stereo => "Stereo Imager",
            EffectKind::Reverb => "FDN Reverb",
            EffectKind::Distortion => "Distortion",
            EffectKind::BitCrusher => "Bit Crusher",
            EffectKind::Script => "Script",
            EffectKind::Custom => "Custom",
        }
    }

    /// Category for grouping in a browser
    pub fn category(&self) -> &'static str {
        match self {
            EffectKind::Delay | EffectKind::Echo => "Delay",
            EffectKind::Chorus | EffectKind::Flanger | EffectKind::Phaser => "Modulation",
            EffectKind::Crossover | EffectKind::Equalizer | EffectKind::Compressor => "Dynamics",
            EffectKind::Stereo => "Utility",
            EffectKind::Reverb => "Reverb",
            EffectKind::Distortion | EffectKind::BitCrusher => "Distortion",
            EffectKind::Script | EffectKind::Custom => "User",
        }
    }
}

/// Engine-wide settings every processor is built with
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EffectSettings {
    pub sample_rate: f32,
    /// Largest block the render thread will hand to an effect
    pub max_block_size: usize,
    /// Time constant for parameter smoothing
    pub smoothing_ms: f32,
}

impl Default for EffectSettings {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            max_block_size: DEFAULT_BLOCK_SIZE,
            smoothing_ms: DEFAULT_SMOOTHING_MS,
        }
    }
}

impl EffectSettings {
    /// A smoother at the configured time constant
    pub fn smoother(&self, value: f32) -> SmoothedValue {
        SmoothedValue::new(value, self.sample_rate, self.smoothing_ms)
    }
}

/// Which unprocessed signal an effect forwards next to its wet path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DryTap {
    /// Output is the wet path only; `mix = 0` is silence
    None,
    /// The dry signal passes at unity (time-based effects)
    Unity,
    /// Dry is scaled by `1 - mix` (insert effects)
    Complement,
}

/// Read-only visualization data
#[derive(Debug, Clone, PartialEq)]
pub enum Telemetry {
    None,
    Levels {
        peak: (f32, f32),
        rms: (f32, f32),
    },
    /// Current gain reduction in dB (positive)
    GainReduction(f32),
    /// Per-band output peak levels
    BandLevels(Vec<f32>),
    /// (frequency Hz, magnitude dB) pairs
    FrequencyResponse(Vec<(f32, f32)>),
    /// LFO phase in cycles
    LfoPhase(f32),
}

/// Per-type processing strategy
///
/// All methods except [`descriptors`](Self::descriptors) and
/// [`telemetry`](Self::telemetry) run on the render thread and must not
/// allocate, lock or block.
pub trait EffectProcessor: Send {
    /// Parameters this processor understands (queried once at construction)
    fn descriptors(&self) -> Vec<ParamDescriptor>;

    /// Re-derive the signal-unit settings that depend on `key`
    ///
    /// Values arrive raw; clamp here.
    fn on_parameter_change(&mut self, key: &str, value: f32);

    /// Process one block in place
    ///
    /// `sidechain` carries the signal on input 1 when something is
    /// connected there.
    fn process(
        &mut self,
        block: &mut [StereoSample],
        sidechain: Option<&[StereoSample]>,
        ctx: &ProcessContext,
    );

    /// Clear all signal state and snap smoothed settings onto their targets
    fn reset(&mut self);

    /// Processing latency in samples
    fn latency_samples(&self) -> u32 {
        0
    }

    fn dry_tap(&self) -> DryTap {
        DryTap::None
    }

    /// Whether the processor delays its input by at least one block, which
    /// makes it a legal member of a feedback cycle
    fn is_delay_capable(&self) -> bool {
        false
    }

    fn telemetry(&self) -> Telemetry {
        Telemetry::None
    }
}

/// An effect instance
pub struct Effect {
    id: String,
    name: String,
    kind: EffectKind,
    descriptors: Vec<ParamDescriptor>,
    store: Arc<ParamStore>,
    seen_versions: Vec<u64>,
    seen_generation: u64,
    presets: Vec<Preset>,
    processor: Option<Box<dyn EffectProcessor>>,
    dry_tap: DryTap,
    wet: SmoothedValue,
    engage: SmoothedValue,
    bypassed: bool,
    dry: Vec<StereoSample>,
    max_block_size: usize,
    meter: LevelMeter,
}

impl Effect {
    /// Wrap a processor into an effect
    ///
    /// Descriptor defaults are merged under `preset`, every value is pushed
    /// through the processor once, and all smoothers start settled.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        kind: EffectKind,
        mut processor: Box<dyn EffectProcessor>,
        settings: &EffectSettings,
        preset: Option<&Preset>,
    ) -> Self {
        let id = id.into();
        let mut descriptors = processor.descriptors();
        if !descriptors.iter().any(|d| d.key == MIX_KEY) {
            descriptors.push(ParamDescriptor::new(MIX_KEY, "Mix", 1.0).with_unit("%"));
        }

        let store = Arc::new(ParamStore::new(&descriptors));
        if let Some(preset) = preset {
            for (key, value) in &preset.values {
                match store.index_of(key) {
                    Some(index) => store.store_local(index, *value),
                    None => log::warn!("Effect {}: preset key '{}' is not a parameter", id, key),
                }
            }
        }

        let mut mix = 1.0;
        for (index, descriptor) in descriptors.iter().enumerate() {
            let value = store.get(index);
            if descriptor.key == MIX_KEY {
                mix = value.clamp(0.0, 1.0);
            } else {
                processor.on_parameter_change(&descriptor.key, value);
            }
        }
        processor.reset();

        let max_block_size = settings.max_block_size.max(1);
        let dry_tap = processor.dry_tap();
        let seen_versions = vec![0; descriptors.len()];

        Self {
            id,
            name: name.into(),
            kind,
            descriptors,
            store,
            seen_versions,
            seen_generation: 0,
            presets: Vec::new(),
            processor: Some(processor),
            dry_tap,
            wet: settings.smoother(mix),
            engage: settings.smoother(1.0),
            bypassed: false,
            dry: vec![StereoSample::silence(); max_block_size],
            max_block_size,
            meter: LevelMeter::new(0.9),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> EffectKind {
        self.kind
    }

    pub fn parameter_descriptors(&self) -> &[ParamDescriptor] {
        &self.descriptors
    }

    /// Owned snapshot of every parameter value
    pub fn parameters(&self) -> BTreeMap<String, f32> {
        self.store.snapshot()
    }

    pub fn parameter(&self, key: &str) -> Option<f32> {
        self.store.value(key)
    }

    /// Store `value` and re-derive the dependent settings
    ///
    /// Returns `false` for keys this effect does not describe and after
    /// disposal.
    pub fn set_parameter(&mut self, key: &str, value: f32) -> bool {
        if self.processor.is_none() {
            log::debug!("Effect {}: set_parameter('{}') after dispose", self.id, key);
            return false;
        }
        let Some(index) = self.store.index_of(key) else {
            log::debug!("Effect {}: unknown parameter '{}'", self.id, key);
            return false;
        };
        self.store.store_local(index, value);
        self.apply(index, value);
        true
    }

    fn apply(&mut self, index: usize, value: f32) {
        let key = self.descriptors[index].key.as_str();
        if key == MIX_KEY {
            self.wet.set_target(value.clamp(0.0, 1.0));
        } else if let Some(processor) = self.processor.as_mut() {
            processor.on_parameter_change(key, value);
        }
    }

    /// Apply values written through an [`EffectHandle`] since the last call
    pub fn apply_pending(&mut self) {
        let generation = self.store.generation();
        if generation == self.seen_generation {
            return;
        }
        self.seen_generation = generation;
        for index in 0..self.seen_versions.len() {
            let version = self.store.version(index);
            if version != self.seen_versions[index] {
                self.seen_versions[index] = version;
                let value = self.store.get(index);
                self.apply(index, value);
            }
        }
    }

    /// Set the wet gain (the mix coefficient)
    pub fn set_wet_dry(&mut self, mix: f32) {
        if let Some(index) = self.store.index_of(MIX_KEY) {
            self.store.store_local(index, mix);
        }
        self.wet.set_target(mix.clamp(0.0, 1.0));
    }

    /// Target wet gain
    pub fn wet_dry(&self) -> f32 {
        self.wet.target()
    }

    pub fn set_bypass(&mut self, bypass: bool) {
        self.bypassed = bypass;
        self.engage.set_target(if bypass { 0.0 } else { 1.0 });
    }

    pub fn is_bypassed(&self) -> bool {
        self.bypassed
    }

    pub fn add_preset(&mut self, preset: Preset) {
        self.presets.push(preset);
    }

    pub fn presets(&self) -> &[Preset] {
        &self.presets
    }

    /// Merge preset `index` over the current parameters
    pub fn load_preset(&mut self, index: usize) -> EffectResult<()> {
        let preset = self
            .presets
            .get(index)
            .cloned()
            .ok_or(EffectError::PresetOutOfRange {
                index,
                count: self.presets.len(),
            })?;
        self.apply_preset(&preset)
    }

    /// Call `set_parameter` for every key whose value differs
    pub fn apply_preset(&mut self, preset: &Preset) -> EffectResult<()> {
        if self.processor.is_none() {
            return Err(EffectError::Disposed(self.id.clone()));
        }
        for (key, value) in &preset.values {
            if self.store.value(key) != Some(*value) {
                self.set_parameter(key, *value);
            }
        }
        log::debug!("Effect {}: loaded preset '{}'", self.id, preset.name);
        Ok(())
    }

    /// Lock-free handle for writing parameters from another thread
    pub fn handle(&self) -> EffectHandle {
        EffectHandle {
            id: self.id.clone(),
            store: Arc::clone(&self.store),
        }
    }

    pub fn process(&mut self, buffer: &mut StereoBuffer, ctx: &ProcessContext) {
        self.process_with_sidechain(buffer, None, ctx);
    }

    /// Process a buffer in place, optionally with a sidechain signal
    ///
    /// Buffers longer than the configured block size are processed in
    /// block-sized chunks.
    pub fn process_with_sidechain(
        &mut self,
        buffer: &mut StereoBuffer,
        sidechain: Option<&StereoBuffer>,
        ctx: &ProcessContext,
    ) {
        if self.processor.is_none() {
            buffer.fill_silence();
            return;
        }
        self.apply_pending();

        if self.bypassed && self.engage.is_settled() {
            self.meter.measure(buffer);
            return;
        }

        let len = buffer.len();
        let mut offset = 0;
        while offset < len {
            let n = self.max_block_size.min(len - offset);
            let chunk = &mut buffer.as_mut_slice()[offset..offset + n];
            let side = sidechain.and_then(|s| s.as_slice().get(offset..offset + n));
            let chunk_ctx = ProcessContext {
                frame_time: ctx.frame_time + offset as u64,
                ..*ctx
            };

            self.dry[..n].copy_from_slice(chunk);
            if let Some(processor) = self.processor.as_mut() {
                processor.process(chunk, side, &chunk_ctx);
            }

            for (out, dry) in chunk.iter_mut().zip(&self.dry[..n]) {
                let wet = self.wet.next();
                let engage = self.engage.next();
                let dry_gain = match self.dry_tap {
                    DryTap::None => 0.0,
                    DryTap::Unity => 1.0,
                    DryTap::Complement => 1.0 - wet,
                };
                let effected = *out * wet + *dry * dry_gain;
                *out = effected * engage + *dry * (1.0 - engage);
            }
            offset += n;
        }
        self.meter.measure(buffer);
    }

    /// Clear internal signal state (delay lines, filters, envelopes)
    pub fn reset(&mut self) {
        if let Some(processor) = self.processor.as_mut() {
            processor.reset();
        }
        self.meter.reset();
    }

    pub fn latency_samples(&self) -> u32 {
        self.processor
            .as_ref()
            .map(|p| p.latency_samples())
            .unwrap_or(0)
    }

    pub fn is_delay_capable(&self) -> bool {
        self.processor
            .as_ref()
            .map(|p| p.is_delay_capable())
            .unwrap_or(false)
    }

    /// Processor telemetry, or output levels when the processor has none
    pub fn telemetry(&self) -> Telemetry {
        match self.processor.as_ref().map(|p| p.telemetry()) {
            Some(Telemetry::None) | None => Telemetry::Levels {
                peak: self.meter.peak(),
                rms: self.meter.rms(),
            },
            Some(telemetry) => telemetry,
        }
    }

    /// Release the processor and everything it owns
    ///
    /// Safe to call any number of times; later calls do nothing.
    pub fn dispose(&mut self) {
        if let Some(processor) = self.processor.take() {
            log::debug!("Disposing effect {} ({})", self.id, self.kind.type_id());
            drop(processor);
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.processor.is_none()
    }
}

impl std::fmt::Debug for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("bypassed", &self.bypassed)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Thread-safe parameter access to an effect living on the render thread
#[derive(Clone, Debug)]
pub struct EffectHandle {
    id: String,
    store: Arc<ParamStore>,
}

impl EffectHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Write a value; the effect applies it at the start of its next block
    pub fn set_parameter(&self, key: &str, value: f32) -> bool {
        match self.store.index_of(key) {
            Some(index) => {
                self.store.write(index, value);
                true
            }
            None => {
                log::debug!("Effect {}: unknown parameter '{}'", self.id, key);
                false
            }
        }
    }

    pub fn parameter(&self, key: &str) -> Option<f32> {
        self.store.value(key)
    }

    pub fn parameters(&self) -> BTreeMap<String, f32> {
        self.store.snapshot()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Scales the signal by `gain` and counts parameter callbacks
    pub(crate) struct TestGain {
        pub gain: f32,
        pub changes: usize,
        pub tap: DryTap,
    }

    impl TestGain {
        pub fn boxed(tap: DryTap) -> Box<dyn EffectProcessor> {
            Box::new(TestGain {
                gain: 1.0,
                changes: 0,
                tap,
            })
        }
    }

    impl EffectProcessor for TestGain {
        fn descriptors(&self) -> Vec<ParamDescriptor> {
            vec![ParamDescriptor::new("gain", "Gain", 1.0).with_range(0.0, 2.0)]
        }

        fn on_parameter_change(&mut self, key: &str, value: f32) {
            if key == "gain" {
                self.gain = value.clamp(0.0, 2.0);
                self.changes += 1;
            }
        }

        fn process(
            &mut self,
            block: &mut [StereoSample],
            _sidechain: Option<&[StereoSample]>,
            _ctx: &ProcessContext,
        ) {
            for s in block.iter_mut() {
                *s *= self.gain;
            }
        }

        fn reset(&mut self) {}

        fn dry_tap(&self) -> DryTap {
            self.tap
        }
    }

    fn effect(tap: DryTap) -> Effect {
        Effect::new(
            "fx",
            "Test",
            EffectKind::Custom,
            TestGain::boxed(tap),
            &EffectSettings::default(),
            None,
        )
    }

    fn ones(len: usize) -> StereoBuffer {
        StereoBuffer::from_mono(&vec![1.0; len])
    }

    #[test]
    fn test_mix_descriptor_is_added() {
        let fx = effect(DryTap::None);
        assert!(fx.parameter_descriptors().iter().any(|d| d.key == MIX_KEY));
        assert_eq!(fx.parameter(MIX_KEY), Some(1.0));
    }

    #[test]
    fn test_set_parameter_stores_raw_value() {
        let mut fx = effect(DryTap::None);
        assert!(fx.set_parameter("gain", 7.0));
        // Stored unclamped; the processor clamps when applying
        assert_eq!(fx.parameter("gain"), Some(7.0));
        let mut buffer = ones(16);
        fx.process(&mut buffer, &ProcessContext::default());
        assert!((buffer[15].left - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let mut fx = effect(DryTap::None);
        assert!(!fx.set_parameter("nope", 1.0));
        assert!(fx.parameter("nope").is_none());
    }

    #[test]
    fn test_mix_zero_without_dry_tap_is_silence() {
        let mut fx = effect(DryTap::None);
        fx.set_wet_dry(0.0);
        let mut buffer = ones(4800);
        fx.process(&mut buffer, &ProcessContext::default());
        assert!(buffer[4799].left.abs() < 1e-4);
        assert_eq!(fx.parameter(MIX_KEY), Some(0.0));
    }

    #[test]
    fn test_unity_dry_tap_passes_dry_at_mix_zero() {
        let mut fx = effect(DryTap::Unity);
        assert!(fx.set_parameter(MIX_KEY, 0.0));
        let mut buffer = ones(4800);
        fx.process(&mut buffer, &ProcessContext::default());
        assert!((buffer[4799].left - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_complement_dry_tap_crossfades() {
        let mut fx = effect(DryTap::Complement);
        fx.set_parameter("gain", 0.0);
        fx.set_wet_dry(0.25);
        let mut buffer = ones(4800);
        fx.process(&mut buffer, &ProcessContext::default());
        assert!((buffer[4799].left - 0.75).abs() < 1e-3);
    }

    #[test]
    fn test_mix_change_is_smoothed() {
        let mut fx = effect(DryTap::None);
        fx.set_wet_dry(0.0);
        let mut buffer = ones(8);
        fx.process(&mut buffer, &ProcessContext::default());
        assert!(buffer[0].left > 0.9, "no step expected, got {}", buffer[0].left);
    }

    #[test]
    fn test_bypass_crossfades_to_dry() {
        let mut fx = effect(DryTap::None);
        fx.set_parameter("gain", 0.0);
        fx.set_bypass(true);
        let mut buffer = ones(4800);
        fx.process(&mut buffer, &ProcessContext::default());
        assert!(buffer[0].left < 0.1);
        assert!((buffer[4799].left - 1.0).abs() < 1e-4);
        assert!(fx.is_bypassed());
    }

    #[test]
    fn test_presets_merge_and_load() {
        let mut fx = effect(DryTap::None);
        fx.add_preset(Preset::new("Half").with("gain", 0.5));
        fx.add_preset(Preset::new("Dry").with(MIX_KEY, 0.0));
        fx.load_preset(0).unwrap();
        fx.load_preset(1).unwrap();
        let params = fx.parameters();
        assert_eq!(params["gain"], 0.5);
        assert_eq!(params[MIX_KEY], 0.0);
        assert_eq!(fx.presets().len(), 2);
        assert!(matches!(
            fx.load_preset(5),
            Err(EffectError::PresetOutOfRange { index: 5, count: 2 })
        ));
    }

    #[test]
    fn test_initial_preset_is_merged_over_defaults() {
        let preset = Preset::new("Init").with("gain", 0.25).with("bogus", 3.0);
        let fx = Effect::new(
            "fx",
            "Test",
            EffectKind::Custom,
            TestGain::boxed(DryTap::None),
            &EffectSettings::default(),
            Some(&preset),
        );
        assert_eq!(fx.parameter("gain"), Some(0.25));
        assert!(fx.parameter("bogus").is_none());
    }

    #[test]
    fn test_snapshot_is_owned() {
        let fx = effect(DryTap::None);
        let mut snapshot = fx.parameters();
        snapshot.insert("gain".into(), 99.0);
        assert_eq!(fx.parameter("gain"), Some(1.0));
    }

    #[test]
    fn test_handle_writes_apply_next_block() {
        let mut fx = effect(DryTap::None);
        let handle = fx.handle();
        let writer = handle.clone();
        std::thread::spawn(move || assert!(writer.set_parameter("gain", 0.0)))
            .join()
            .unwrap();
        assert!(!handle.set_parameter("unknown", 1.0));

        let mut buffer = ones(16);
        fx.process(&mut buffer, &ProcessContext::default());
        assert_eq!(buffer[0].left, 0.0);
        assert_eq!(handle.parameter("gain"), Some(0.0));
    }

    #[test]
    fn test_long_buffers_are_chunked() {
        let settings = EffectSettings {
            max_block_size: 32,
            ..Default::default()
        };
        let mut fx = Effect::new(
            "fx",
            "Test",
            EffectKind::Custom,
            TestGain::boxed(DryTap::None),
            &settings,
            None,
        );
        fx.set_parameter("gain", 0.5);
        let mut buffer = ones(100);
        fx.process(&mut buffer, &ProcessContext::default());
        assert!(buffer.iter().all(|s| (s.left - 0.5).abs() < 1e-6));
    }

    #[test]
    fn test_dispose_is_idempotent() {
        let mut fx = effect(DryTap::None);
        fx.dispose();
        fx.dispose();
        assert!(fx.is_disposed());
        assert!(!fx.set_parameter("gain", 1.0));
        assert!(matches!(fx.apply_preset(&Preset::new("x")), Err(EffectError::Disposed(_))));
        let mut buffer = ones(8);
        fx.process(&mut buffer, &ProcessContext::default());
        assert_eq!(buffer.peak(), 0.0);
    }

    #[test]
    fn test_kind_type_ids_round_trip() {
        for kind in EffectKind::BUILTIN {
            assert_eq!(EffectKind::from_type_id(kind.type_id()), Some(kind));
        }
        assert_eq!(EffectKind::from_type_id("script"), Some(EffectKind::Script));
        assert_eq!(EffectKind::from_type_id("nope"), None);
    }
}
