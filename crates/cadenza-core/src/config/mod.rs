//! Engine configuration and YAML persistence
//!
//! ```ignore
//! use cadenza_core::config::{default_config_path, load_config, save_config, EngineConfig};
//!
//! let path = default_config_path("engine.yaml");
//! let config: EngineConfig = load_config(&path)?;
//! save_config(&config, &path)?;
//! ```

mod engine;
mod io;
mod paths;

pub use engine::{EngineConfig, DEFAULT_COMMAND_CAPACITY, DEFAULT_MAX_NODES};
pub use io::{load_config, load_config_or_default, save_config};
pub use paths::{default_config_dir, default_config_path};
