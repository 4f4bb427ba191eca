//! Effect factory - registry from type id to processor constructor
//!
//! The factory is an explicit object: the host builds one with the engine
//! settings, registers any extra effect types, and passes it by reference to
//! whatever needs to create effects. Every built-in [`EffectKind`] is
//! registered at construction.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use super::native::{
    BitCrusher, Chorus, Compressor, CrossoverEq, Distortion, FdnReverb, MultiTapEcho,
    ParametricEq, Phaser, ScriptEffect, ScriptFn, StereoDelay, StereoImager,
};
use super::{
    Effect, EffectError, EffectKind, EffectProcessor, EffectResult, EffectSettings,
    ParamDescriptor, Preset,
};

/// Builds a fresh processor for the given settings
pub type Constructor = Box<dyn Fn(&EffectSettings) -> Box<dyn EffectProcessor> + Send + Sync>;

struct Registration {
    kind: EffectKind,
    display_name: String,
    constructor: Constructor,
}

/// Information about a registered effect type
#[derive(Debug, Clone, PartialEq)]
pub struct EffectTypeInfo {
    pub type_id: String,
    pub display_name: String,
    pub kind: EffectKind,
    pub category: &'static str,
}

/// Registry of effect types
pub struct EffectFactory {
    settings: EffectSettings,
    registry: HashMap<String, Registration>,
    next_id: AtomicU64,
}

impl EffectFactory {
    /// Create a factory with every built-in effect registered
    pub fn new(settings: EffectSettings) -> Self {
        let mut factory = Self {
            settings,
            registry: HashMap::new(),
            next_id: AtomicU64::new(1),
        };
        for kind in EffectKind::BUILTIN {
            if let Some(constructor) = builtin_constructor(kind) {
                factory.insert(kind.type_id(), kind, kind.display_name(), constructor);
            }
        }
        log::debug!("Effect factory ready with {} types", factory.registry.len());
        factory
    }

    pub fn settings(&self) -> &EffectSettings {
        &self.settings
    }

    fn insert(&mut self, type_id: &str, kind: EffectKind, display_name: &str, constructor: Constructor) {
        self.registry.insert(
            type_id.to_string(),
            Registration {
                kind,
                display_name: display_name.to_string(),
                constructor,
            },
        );
    }

    /// Register a host-defined effect type
    pub fn register<F>(&mut self, type_id: &str, display_name: &str, constructor: F) -> EffectResult<()>
    where
        F: Fn(&EffectSettings) -> Box<dyn EffectProcessor> + Send + Sync + 'static,
    {
        if self.registry.contains_key(type_id) {
            return Err(EffectError::AlreadyRegistered(type_id.to_string()));
        }
        self.insert(type_id, EffectKind::Custom, display_name, Box::new(constructor));
        log::info!("Registered effect type '{}' ({})", type_id, display_name);
        Ok(())
    }

    pub fn is_registered(&self, type_id: &str) -> bool {
        self.registry.contains_key(type_id)
    }

    /// Registered types, sorted by type id
    pub fn available_types(&self) -> Vec<EffectTypeInfo> {
        let mut types: Vec<EffectTypeInfo> = self
            .registry
            .iter()
            .map(|(type_id, reg)| EffectTypeInfo {
                type_id: type_id.clone(),
                display_name: reg.display_name.clone(),
                kind: reg.kind,
                category: reg.kind.category(),
            })
            .collect();
        types.sort_by(|a, b| a.type_id.cmp(&b.type_id));
        types
    }

    fn allocate_id(&self, type_id: &str) -> String {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed);
        format!("{}-{}", type_id, n)
    }

    /// Create an effect with a generated id, defaults merged under `preset`
    pub fn create(&self, type_id: &str, preset: Option<&Preset>) -> EffectResult<Effect> {
        let id = self.allocate_id(type_id);
        self.create_with_id(id, type_id, preset)
    }

    /// Create an effect with a caller-chosen id
    pub fn create_with_id(
        &self,
        id: impl Into<String>,
        type_id: &str,
        preset: Option<&Preset>,
    ) -> EffectResult<Effect> {
        let reg = self
            .registry
            .get(type_id)
            .ok_or_else(|| EffectError::UnknownType(type_id.to_string()))?;
        let processor = (reg.constructor)(&self.settings);
        let effect = Effect::new(id, reg.display_name.clone(), reg.kind, processor, &self.settings, preset);
        log::debug!("Created effect {} ({})", effect.id(), type_id);
        Ok(effect)
    }

    pub fn create_kind(&self, kind: EffectKind, preset: Option<&Preset>) -> EffectResult<Effect> {
        self.create(kind.type_id(), preset)
    }

    /// Create a script effect around a user closure
    pub fn create_script(
        &self,
        name: &str,
        descriptors: Vec<ParamDescriptor>,
        script: ScriptFn,
        preset: Option<&Preset>,
    ) -> Effect {
        let id = self.allocate_id(EffectKind::Script.type_id());
        let processor = Box::new(ScriptEffect::new(name, descriptors, script, &self.settings));
        Effect::new(id, name, EffectKind::Script, processor, &self.settings, preset)
    }
}

impl Default for EffectFactory {
    fn default() -> Self {
        Self::new(EffectSettings::default())
    }
}

fn boxed<P: EffectProcessor + 'static>(build: fn(&EffectSettings) -> P) -> Constructor {
    Box::new(move |settings: &EffectSettings| -> Box<dyn EffectProcessor> { Box::new(build(settings)) })
}

fn builtin_constructor(kind: EffectKind) -> Option<Constructor> {
    let constructor = match kind {
        EffectKind::Delay => boxed(StereoDelay::new),
        EffectKind::Echo => boxed(MultiTapEcho::new),
        EffectKind::Chorus => boxed(Chorus::new),
        EffectKind::Flanger => boxed(Chorus::flanger),
        EffectKind::Phaser => boxed(Phaser::new),
        EffectKind::Crossover => boxed(CrossoverEq::new),
        EffectKind::Equalizer => boxed(ParametricEq::new),
        EffectKind::Compressor => boxed(Compressor::new),
        EffectKind::Stereo => boxed(StereoImager::new),
        EffectKind::Reverb => boxed(FdnReverb::new),
        EffectKind::Distortion => boxed(Distortion::new),
        EffectKind::BitCrusher => boxed(BitCrusher::new),
        // Not buildable from a type id alone
        EffectKind::Script | EffectKind::Custom => return None,
    };
    Some(constructor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::MIX_KEY;
    use crate::types::{ProcessContext, StereoBuffer};

    #[test]
    fn test_every_builtin_is_creatable() {
        let factory = EffectFactory::default();
        let ctx = ProcessContext::default();
        for kind in EffectKind::BUILTIN {
            let mut fx = factory.create_kind(kind, None).unwrap();
            assert_eq!(fx.kind(), kind);
            assert!(fx.parameter(MIX_KEY).is_some(), "{:?} has no mix", kind);
            let mut buffer = StereoBuffer::from_mono(&[0.5; 256]);
            fx.process(&mut buffer, &ctx);
            assert!(buffer.iter().all(|s| s.left.is_finite() && s.right.is_finite()));
        }
    }

    #[test]
    fn test_unknown_type() {
        let factory = EffectFactory::default();
        assert!(matches!(
            factory.create("theremin", None),
            Err(EffectError::UnknownType(t)) if t == "theremin"
        ));
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let factory = EffectFactory::default();
        let a = factory.create("delay", None).unwrap();
        let b = factory.create("delay", None).unwrap();
        assert_ne!(a.id(), b.id());
        assert!(a.id().starts_with("delay-"));
    }

    #[test]
    fn test_preset_is_merged_at_creation() {
        let factory = EffectFactory::default();
        let preset = Preset::new("Slap").with("time", 90.0).with(MIX_KEY, 0.6);
        let fx = factory.create("delay", Some(&preset)).unwrap();
        assert_eq!(fx.parameter("time"), Some(90.0));
        assert_eq!(fx.wet_dry(), 0.6);
        assert_eq!(fx.parameter("feedback"), Some(0.4));
    }

    #[test]
    fn test_register_custom_type() {
        let mut factory = EffectFactory::default();
        factory
            .register("stereo-2", "Another Imager", |s| Box::new(StereoImager::new(s)))
            .unwrap();
        assert!(matches!(
            factory.register("delay", "Dup", |s| Box::new(StereoDelay::new(s))),
            Err(EffectError::AlreadyRegistered(_))
        ));
        let fx = factory.create("stereo-2", None).unwrap();
        assert_eq!(fx.kind(), EffectKind::Custom);
        assert_eq!(fx.name(), "Another Imager");
        assert!(factory
            .available_types()
            .iter()
            .any(|t| t.type_id == "stereo-2" && t.category == "User"));
    }

    #[test]
    fn test_create_script() {
        let factory = EffectFactory::default();
        let fx = factory.create_script(
            "Halve",
            vec![ParamDescriptor::new("amount", "Amount", 0.5)],
            Box::new(|block, ctx| {
                let g = ctx.param(0);
                for s in block.iter_mut() {
                    *s *= g;
                }
            }),
            None,
        );
        assert_eq!(fx.kind(), EffectKind::Script);
        assert_eq!(fx.parameter("amount"), Some(0.5));
    }
}
