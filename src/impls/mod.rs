//! Builtin hooks: scalars, datetimes, and the dynamic and typed container
//! families.

pub mod datetime;
pub mod mapping;
pub mod scalar;
pub mod sequence;

use crate::error::ConfigError;
use crate::hooks::HookRegistry;

/// Installs the hooks every [`HookRegistry::with_builtins`] starts with.
pub(crate) fn install_builtins(hooks: &mut HookRegistry) -> Result<(), ConfigError> {
    scalar::install(hooks)?;
    datetime::install(hooks)?;
    sequence::install(hooks)?;
    mapping::install(hooks)?;
    Ok(())
}
