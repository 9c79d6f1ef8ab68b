#![doc = include_str!("../README.md")]

pub mod adapter;
pub mod boxed;
pub mod config;
pub mod configurable;
pub mod context;
pub mod engine;
pub mod error;
pub mod hooks;
pub mod impls;
pub mod tag;
pub mod utils;
pub mod value;

// `submit_config_hooks!` expands to an `inventory` submission.
#[cfg(feature = "auto_register")]
#[doc(hidden)]
pub use inventory;

pub use adapter::{ConstructorArgs, ForeignConfig};
pub use config::{ConfigMap, Configuration};
pub use configurable::{AutoConfigured, Configurable, Property, PropertyTable};
pub use context::Context;
pub use engine::{Driver, Engine, EngineArc, DEFAULT_CONTEXT};
pub use error::ConfigError;
pub use hooks::HookRegistry;
pub use tag::{TagPair, TypeTag};
pub use value::{ConfigValue, Value};
