//! Hooks for [`chrono::NaiveDateTime`].
//!
//! Datetimes encode into a `{ "value", "format" }` map carrying both the
//! rendered timestamp and the format string it was rendered with, so a
//! document survives a future change of the default format. The payload is
//! always enveloped: a bare map of two strings would be indistinguishable
//! from ordinary data.

use chrono::NaiveDateTime;

use crate::config::{ConfigMap, Configuration};
use crate::error::ConfigError;
use crate::hooks::HookRegistry;
use crate::impl_type_tag;

/// The format datetimes are rendered with: a compact timestamp with
/// microsecond precision.
pub const DEFAULT_DATETIME_FORMAT: &str = "%Y%m%d%H%M%S%.6f";

const VALUE_KEY: &str = "value";
const FORMAT_KEY: &str = "format";

impl_type_tag!(NaiveDateTime => "chrono", "NaiveDateTime");

pub(crate) fn install(hooks: &mut HookRegistry) -> Result<(), ConfigError> {
    hooks.register_encoder::<NaiveDateTime, _>(
        |value, _| {
            let mut entries = ConfigMap::new();
            entries.insert(
                VALUE_KEY.to_string(),
                Configuration::Str(value.format(DEFAULT_DATETIME_FORMAT).to_string()),
            );
            entries.insert(
                FORMAT_KEY.to_string(),
                Configuration::Str(DEFAULT_DATETIME_FORMAT.to_string()),
            );
            Ok(Configuration::Map(entries))
        },
        true,
        false,
    )?;
    hooks.register_decoder::<NaiveDateTime, _>(
        |config, _, _| {
            let entries = config.expect_map()?;
            let value = entries
                .get(VALUE_KEY)
                .ok_or_else(|| ConfigError::malformed("datetime payload is missing `value`"))?
                .expect_str()?;
            let format = match entries.get(FORMAT_KEY) {
                Some(format) => format.expect_str()?,
                None => DEFAULT_DATETIME_FORMAT,
            };
            NaiveDateTime::parse_from_str(value, format).map_err(|err| {
                ConfigError::malformed(format!(
                    "`{value}` does not parse as a datetime with format `{format}`: {err}"
                ))
            })
        },
        false,
    )?;
    Ok(())
}
