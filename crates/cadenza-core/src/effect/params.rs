//! Parameter descriptors, presets and the lock-free parameter store
//!
//! Descriptors are UI metadata only. The store always holds raw `f32`
//! values; clamping happens where an effect applies a value to its signal
//! units.
//!
//! # Threading
//!
//! [`ParamStore`] is shared (`Arc`) between an [`Effect`](super::Effect),
//! which lives on the render thread, and any number of
//! [`EffectHandle`](super::EffectHandle)s on control threads. Each slot is a
//! `crossbeam` [`AtomicCell<f32>`] plus a version counter, and a store-wide
//! generation counter lets the render thread skip the scan entirely when
//! nothing was written since the last block.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam::atomic::AtomicCell;
use serde::{Deserialize, Serialize};

/// Reserved key routed to the effect's wet gain
pub const MIX_KEY: &str = "mix";

/// How a parameter should be presented to a user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ParamShape {
    #[default]
    Linear,
    Logarithmic,
    Boolean,
    /// Discrete choice; the stored value is the option index
    Enum(Vec<String>),
}

/// Static description of one effect parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamDescriptor {
    /// Key used with `set_parameter`
    pub key: String,
    /// Human-readable label
    pub label: String,
    pub min: f32,
    pub max: f32,
    pub default: f32,
    pub step: Option<f32>,
    /// Display unit ("ms", "dB", "Hz", ...)
    pub unit: String,
    pub shape: ParamShape,
}

impl ParamDescriptor {
    /// Create a linear 0..1 parameter
    pub fn new(key: impl Into<String>, label: impl Into<String>, default: f32) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
            min: 0.0,
            max: 1.0,
            default,
            step: None,
            unit: String::new(),
            shape: ParamShape::Linear,
        }
    }

    pub fn with_range(mut self, min: f32, max: f32) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }

    pub fn with_step(mut self, step: f32) -> Self {
        self.step = Some(step);
        self
    }

    pub fn logarithmic(mut self) -> Self {
        self.shape = ParamShape::Logarithmic;
        self
    }

    /// On/off switch (0 or 1)
    pub fn boolean(mut self) -> Self {
        self.shape = ParamShape::Boolean;
        self.min = 0.0;
        self.max = 1.0;
        self.step = Some(1.0);
        self
    }

    /// Discrete choice between `options`; range becomes 0..options-1
    pub fn with_options(mut self, options: &[&str]) -> Self {
        self.min = 0.0;
        self.max = options.len().saturating_sub(1) as f32;
        self.step = Some(1.0);
        self.shape = ParamShape::Enum(options.iter().map(|s| s.to_string()).collect());
        self
    }

    /// Clamp a value into the descriptor range
    pub fn clamp(&self, value: f32) -> f32 {
        value.clamp(self.min.min(self.max), self.max.max(self.min))
    }
}

/// Named partial parameter snapshot
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Preset {
    pub name: String,
    pub values: BTreeMap<String, f32>,
}

impl Preset {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: f32) -> Self {
        self.values.insert(key.into(), value);
        self
    }

    /// Parse a preset from JSON
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

struct Slot {
    key: String,
    value: AtomicCell<f32>,
    version: AtomicU64,
}

/// Lock-free parameter storage for one effect
pub struct ParamStore {
    slots: Vec<Slot>,
    generation: AtomicU64,
}

impl ParamStore {
    /// Create a store with one slot per descriptor, initialized to defaults
    pub fn new(descriptors: &[ParamDescriptor]) -> Self {
        Self {
            slots: descriptors
                .iter()
                .map(|d| Slot {
                    key: d.key.clone(),
                    value: AtomicCell::new(d.default),
                    version: AtomicU64::new(0),
                })
                .collect(),
            generation: AtomicU64::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn index_of(&self, key: &str) -> Option<usize> {
        self.slots.iter().position(|s| s.key == key)
    }

    pub fn key(&self, index: usize) -> &str {
        &self.slots[index].key
    }

    #[inline]
    pub fn get(&self, index: usize) -> f32 {
        self.slots[index].value.load()
    }

    pub fn value(&self, key: &str) -> Option<f32> {
        self.index_of(key).map(|i| self.get(i))
    }

    /// Store a value written by the owning effect itself (no notification)
    #[inline]
    pub(crate) fn store_local(&self, index: usize, value: f32) {
        self.slots[index].value.store(value);
    }

    /// Store a value from another thread; the owning effect applies it at
    /// the start of its next block
    pub fn write(&self, index: usize, value: f32) {
        let slot = &self.slots[index];
        slot.value.store(value);
        slot.version.fetch_add(1, Ordering::Release);
        self.generation.fetch_add(1, Ordering::Release);
    }

    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    #[inline]
    pub fn version(&self, index: usize) -> u64 {
        self.slots[index].version.load(Ordering::Acquire)
    }

    /// Owned `key → value` snapshot
    pub fn snapshot(&self) -> BTreeMap<String, f32> {
        self.slots
            .iter()
            .map(|s| (s.key.clone(), s.value.load()))
            .collect()
    }
}

impl std::fmt::Debug for ParamStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.slots.iter().map(|s| (&s.key, s.value.load())))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptors() -> Vec<ParamDescriptor> {
        vec![
            ParamDescriptor::new("time", "Time", 250.0)
                .with_range(1.0, 5000.0)
                .with_unit("ms")
                .logarithmic(),
            ParamDescriptor::new("mode", "Mode", 0.0).with_options(&["A", "B", "C"]),
            ParamDescriptor::new("on", "On", 1.0).boolean(),
        ]
    }

    #[test]
    fn test_descriptor_builders() {
        let d = descriptors();
        assert_eq!(d[0].unit, "ms");
        assert_eq!(d[0].shape, ParamShape::Logarithmic);
        assert_eq!(d[1].max, 2.0);
        assert_eq!(d[1].step, Some(1.0));
        assert_eq!(d[2].shape, ParamShape::Boolean);
        assert_eq!(d[0].clamp(9000.0), 5000.0);
    }

    #[test]
    fn test_store_defaults_and_lookup() {
        let store = ParamStore::new(&descriptors());
        assert_eq!(store.len(), 3);
        assert_eq!(store.value("time"), Some(250.0));
        assert_eq!(store.index_of("on"), Some(2));
        assert_eq!(store.value("missing"), None);
    }

    #[test]
    fn test_remote_write_bumps_versions() {
        let store = ParamStore::new(&descriptors());
        let gen = store.generation();
        store.write(1, 2.0);
        assert_eq!(store.get(1), 2.0);
        assert_eq!(store.version(1), 1);
        assert_eq!(store.version(0), 0);
        assert!(store.generation() > gen);
    }

    #[test]
    fn test_local_store_does_not_notify() {
        let store = ParamStore::new(&descriptors());
        store.store_local(0, 10.0);
        assert_eq!(store.get(0), 10.0);
        assert_eq!(store.generation(), 0);
    }

    #[test]
    fn test_preset_json_round_trip() {
        let preset = Preset::new("Slap").with("time", 80.0).with("feedback", 0.1);
        let json = preset.to_json().unwrap();
        let parsed = Preset::from_json(&json).unwrap();
        assert_eq!(parsed, preset);
    }

    #[test]
    fn test_store_is_shared_across_threads() {
        let store = std::sync::Arc::new(ParamStore::new(&descriptors()));
        let writer = store.clone();
        std::thread::spawn(move || writer.write(0, 42.0))
            .join()
            .unwrap();
        assert_eq!(store.get(0), 42.0);
        assert_eq!(store.version(0), 1);
    }
}
