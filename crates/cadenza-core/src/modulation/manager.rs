//! Controller registry and automation fan-out

use std::panic::{self, AssertUnwindSafe};

use serde::{Deserialize, Serialize};

use super::Controller;
use crate::types::ProcessContext;

/// A parameter a controller can be bound to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParamTarget {
    pub effect_id: String,
    pub key: String,
}

impl ParamTarget {
    pub fn new(effect_id: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            effect_id: effect_id.into(),
            key: key.into(),
        }
    }
}

/// Returned by [`ControllerManager::on_value`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AutomationListenerId(u64);

type AutomationListener = Box<dyn Fn(&str, f32) + Send>;

/// Receives bound controller values
pub type AutomationSink = Box<dyn FnMut(&ParamTarget, f32) + Send>;

struct Slot {
    id: String,
    controller: Box<dyn Controller>,
    bindings: Vec<ParamTarget>,
}

/// Runs controllers once per block and hands their values on
///
/// Every value goes to the registered listeners. Values of bound
/// controllers also go to the sink, once per binding; what the sink does
/// with them (write an effect handle, queue a command) is up to the host.
pub struct ControllerManager {
    slots: Vec<Slot>,
    listeners: Vec<(AutomationListenerId, AutomationListener)>,
    next_listener: u64,
    sink: Option<AutomationSink>,
    sample_rate: f32,
    frame_time: u64,
}

impl std::fmt::Debug for ControllerManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerManager")
            .field("controllers", &self.ids())
            .field("listeners", &self.listeners.len())
            .field("has_sink", &self.sink.is_some())
            .field("frame_time", &self.frame_time)
            .finish()
    }
}

impl ControllerManager {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            slots: Vec::new(),
            listeners: Vec::new(),
            next_listener: 0,
            sink: None,
            sample_rate,
            frame_time: 0,
        }
    }

    /// Register a controller; `false` if the id is taken
    pub fn add(&mut self, id: &str, controller: Box<dyn Controller>) -> bool {
        if self.slots.iter().any(|s| s.id == id) {
            log::warn!("Controller {} already exists", id);
            return false;
        }
        self.slots.push(Slot {
            id: id.to_string(),
            controller,
            bindings: Vec::new(),
        });
        true
    }

    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.slots.len();
        self.slots.retain(|s| s.id != id);
        self.slots.len() != before
    }

    pub fn ids(&self) -> Vec<&str> {
        self.slots.iter().map(|s| s.id.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn controller(&self, id: &str) -> Option<&dyn Controller> {
        self.slots
            .iter()
            .find(|s| s.id == id)
            .map(|s| s.controller.as_ref())
    }

    pub fn controller_mut(&mut self, id: &str) -> Option<&mut (dyn Controller + 'static)> {
        self.slots
            .iter_mut()
            .find(|s| s.id == id)
            .map(|s| s.controller.as_mut())
    }

    /// Last value computed for a controller
    pub fn value(&self, id: &str) -> Option<f32> {
        self.controller(id).map(|c| c.value())
    }

    /// Bind a controller to an effect parameter
    ///
    /// Returns `false` for an unknown controller or a duplicate binding.
    pub fn bind(&mut self, controller_id: &str, effect_id: &str, key: &str) -> bool {
        let target = ParamTarget::new(effect_id, key);
        match self.slots.iter_mut().find(|s| s.id == controller_id) {
            Some(slot) if !slot.bindings.contains(&target) => {
                log::debug!("Bound controller {} to {}.{}", controller_id, effect_id, key);
                slot.bindings.push(target);
                true
            }
            _ => false,
        }
    }

    pub fn unbind(&mut self, controller_id: &str, effect_id: &str, key: &str) -> bool {
        let target = ParamTarget::new(effect_id, key);
        self.slots
            .iter_mut()
            .find(|s| s.id == controller_id)
            .is_some_and(|slot| {
                let before = slot.bindings.len();
                slot.bindings.retain(|t| *t != target);
                slot.bindings.len() != before
            })
    }

    /// Drop every binding that targets `effect_id`
    pub fn unbind_effect(&mut self, effect_id: &str) {
        for slot in &mut self.slots {
            slot.bindings.retain(|t| t.effect_id != effect_id);
        }
    }

    pub fn bindings(&self, controller_id: &str) -> &[ParamTarget] {
        self.slots
            .iter()
            .find(|s| s.id == controller_id)
            .map(|s| s.bindings.as_slice())
            .unwrap_or(&[])
    }

    pub fn set_sink(&mut self, sink: AutomationSink) {
        self.sink = Some(sink);
    }

    pub fn clear_sink(&mut self) {
        self.sink = None;
    }

    /// Listen to every controller value as `(controller id, value)`
    pub fn on_value<F>(&mut self, listener: F) -> AutomationListenerId
    where
        F: Fn(&str, f32) + Send + 'static,
    {
        let id = AutomationListenerId(self.next_listener);
        self.next_listener += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    pub fn remove_listener(&mut self, id: AutomationListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(entry, _)| *entry != id);
        self.listeners.len() != before
    }

    /// Advance every controller by `frames` samples at `bpm`
    pub fn process(&mut self, frames: usize, bpm: f64) {
        let ctx = ProcessContext {
            sample_rate: self.sample_rate,
            bpm,
            frame_time: self.frame_time,
        };
        for slot in &mut self.slots {
            let value = slot.controller.process(frames, &ctx);

            for (id, listener) in &self.listeners {
                if panic::catch_unwind(AssertUnwindSafe(|| listener(&slot.id, value))).is_err() {
                    log::warn!("Automation listener {:?} panicked on {}", id, slot.id);
                }
            }

            if let Some(sink) = self.sink.as_mut() {
                for target in &slot.bindings {
                    if panic::catch_unwind(AssertUnwindSafe(|| sink(target, value))).is_err() {
                        log::warn!(
                            "Automation sink panicked on {}.{}",
                            target.effect_id,
                            target.key
                        );
                    }
                }
            }
        }
        self.frame_time += frames as u64;
    }

    pub fn reset(&mut self) {
        for slot in &mut self.slots {
            slot.controller.reset();
        }
        self.frame_time = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::Waveform;
    use crate::effect::{EffectFactory, ParamDescriptor};
    use crate::modulation::{LfoController, LfoRate, PeakController};
    use std::sync::{Arc, Mutex};

    fn square() -> Box<dyn Controller> {
        Box::new(LfoController::new(Waveform::Square, LfoRate::Hz(1.0)))
    }

    #[test]
    fn test_add_and_remove() {
        let mut manager = ControllerManager::new(1024.0);
        assert!(manager.add("lfo", square()));
        assert!(!manager.add("lfo", square()));
        assert!(manager.add("env", Box::new(PeakController::default())));
        assert_eq!(manager.ids(), vec!["lfo", "env"]);
        assert!(manager.remove("lfo"));
        assert!(!manager.remove("lfo"));
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_listeners_see_every_value() {
        let mut manager = ControllerManager::new(1024.0);
        manager.add("lfo", square());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        manager.on_value(move |id, value| log.lock().unwrap().push((id.to_string(), value)));

        manager.process(512, 120.0);
        manager.process(512, 120.0);
        let seen = seen.lock().unwrap();
        assert_eq!(*seen, vec![("lfo".to_string(), 1.0), ("lfo".to_string(), 0.0)]);
        assert_eq!(manager.value("lfo"), Some(0.0));
    }

    #[test]
    fn test_panicking_listener_is_isolated() {
        let mut manager = ControllerManager::new(1024.0);
        manager.add("lfo", square());
        let calls = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&calls);
        manager.on_value(|_, _| panic!("listener failure"));
        manager.on_value(move |_, _| *counter.lock().unwrap() += 1);
        manager.process(64, 120.0);
        manager.process(64, 120.0);
        assert_eq!(*calls.lock().unwrap(), 2);
    }

    #[test]
    fn test_remove_listener() {
        let mut manager = ControllerManager::new(1024.0);
        manager.add("lfo", square());
        let calls = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&calls);
        let id = manager.on_value(move |_, _| *counter.lock().unwrap() += 1);
        manager.process(64, 120.0);
        assert!(manager.remove_listener(id));
        assert!(!manager.remove_listener(id));
        manager.process(64, 120.0);
        assert_eq!(*calls.lock().unwrap(), 1);
    }

    #[test]
    fn test_bindings() {
        let mut manager = ControllerManager::new(1024.0);
        manager.add("lfo", square());
        assert!(manager.bind("lfo", "delay-1", "feedback"));
        assert!(!manager.bind("lfo", "delay-1", "feedback"));
        assert!(!manager.bind("ghost", "delay-1", "feedback"));
        assert!(manager.bind("lfo", "chorus-2", "rate"));
        assert_eq!(manager.bindings("lfo").len(), 2);

        assert!(manager.unbind("lfo", "chorus-2", "rate"));
        assert!(!manager.unbind("lfo", "chorus-2", "rate"));
        manager.unbind_effect("delay-1");
        assert!(manager.bindings("lfo").is_empty());
        assert!(manager.bindings("ghost").is_empty());
    }

    #[test]
    fn test_sink_drives_effect_parameter() {
        let factory = EffectFactory::default();
        let effect = factory.create_script(
            "level",
            vec![ParamDescriptor::new("level", "Level", 0.5)],
            Box::new(|_, _| {}),
            None,
        );
        let handle = effect.handle();
        let id = effect.id().to_string();

        let mut manager = ControllerManager::new(1024.0);
        manager.add(
            "lfo",
            Box::new(
                LfoController::new(Waveform::Square, LfoRate::Hz(1.0))
                    .with_depth(0.25)
                    .with_offset(0.5),
            ),
        );
        manager.bind("lfo", &id, "level");
        let target_handle = handle.clone();
        manager.set_sink(Box::new(move |target, value| {
            if target.effect_id == target_handle.id() {
                target_handle.set_parameter(&target.key, value);
            }
        }));

        manager.process(512, 120.0);
        assert_eq!(handle.parameter("level"), Some(0.75));
        manager.process(512, 120.0);
        assert_eq!(handle.parameter("level"), Some(0.25));
    }

    #[test]
    fn test_panicking_sink_is_isolated() {
        let mut manager = ControllerManager::new(1024.0);
        manager.add("lfo", square());
        manager.bind("lfo", "fx", "amount");
        manager.set_sink(Box::new(|_, _| panic!("sink failure")));
        manager.process(64, 120.0);
        manager.process(64, 120.0);
        assert_eq!(manager.value("lfo"), Some(1.0));
    }

    #[test]
    fn test_reset_rewinds_controllers() {
        let mut manager = ControllerManager::new(1024.0);
        manager.add("lfo", square());
        manager.process(512, 120.0);
        manager.reset();
        manager.process(1, 120.0);
        assert_eq!(manager.value("lfo"), Some(1.0));
    }
}
