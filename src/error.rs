use std::borrow::Cow;

use core::panic::Location;
use core::{error, fmt};

use crate::tag::TagPair;

// -----------------------------------------------------------------------------
// ConfigError

/// An enumeration of all error outcomes of encoding, decoding and
/// registration.
///
/// Every variant is unrecoverable at the point of detection and propagates to
/// the caller unmodified; nothing is retried internally and there is no
/// partial-success mode.
#[derive(Debug)]
pub enum ConfigError {
    /// A type, hook or `(module, class)` pair already has a distinct,
    /// non-overwritable registration.
    ///
    /// Carries the source location of the original registration.
    NamingConflict {
        subject: Cow<'static, str>,
        previous: &'static Location<'static>,
    },
    /// A type could not be proven reachable for boxing, or a
    /// `(module, class)` pair could not be resolved to a type under the
    /// active access-control policy during unboxing.
    AccessDenied { pair: TagPair, context: String },
    /// A runtime type has neither a [`Configurable`] implementation nor a
    /// hook registry entry.
    ///
    /// [`Configurable`]: crate::configurable::Configurable
    NotConfigurable { type_name: Cow<'static, str> },
    /// A configuration failed a structural assumption, e.g. a mapping
    /// expected to be boxed is missing a required key, or a value expected
    /// to be a sequence is not.
    MalformedConfiguration { reason: Cow<'static, str> },
    /// A named context does not exist and creation was not requested.
    UnknownContext { name: String },
}

impl ConfigError {
    /// Shorthand for a [`MalformedConfiguration`](Self::MalformedConfiguration).
    #[inline]
    pub fn malformed(reason: impl Into<Cow<'static, str>>) -> Self {
        Self::MalformedConfiguration {
            reason: reason.into(),
        }
    }

    /// Shorthand for a [`NamingConflict`](Self::NamingConflict).
    #[inline]
    pub fn conflict(
        subject: impl Into<Cow<'static, str>>,
        previous: &'static Location<'static>,
    ) -> Self {
        Self::NamingConflict {
            subject: subject.into(),
            previous,
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NamingConflict { subject, previous } => {
                write!(
                    f,
                    "a {subject} has already been registered; the previous registration \
                     was made at {previous}; set the overwrite flag to replace it"
                )
            }
            Self::AccessDenied { pair, context } => {
                write!(
                    f,
                    "access denied for class `{}` in module `{}` in the `{context}` context; \
                     consider adjusting access control settings and/or registering the class \
                     with the `{context}` context",
                    pair.class(),
                    pair.module(),
                )
            }
            Self::NotConfigurable { type_name } => {
                write!(f, "type `{type_name}` is not configurable")
            }
            Self::MalformedConfiguration { reason } => {
                write!(f, "malformed configuration: {reason}")
            }
            Self::UnknownContext { name } => {
                write!(f, "no context named `{name}` exists")
            }
        }
    }
}

impl error::Error for ConfigError {}

// -----------------------------------------------------------------------------
// Tests
