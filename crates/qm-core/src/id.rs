// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Project identifiers and the id-generation abstraction.

/// Define a newtype ID wrapper around `String`.
///
/// Generates `new()`, `as_str()`, `Display`, `From<String>`, `From<&str>`,
/// `PartialEq<str>`, `PartialEq<&str>`, and `Borrow<str>` implementations.
///
/// ```ignore
/// define_id! {
///     /// Doc comment for the ID type.
///     pub struct MyId;
/// }
/// ```
#[macro_export]
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        pub struct $name:ident;
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

define_id! {
    /// Unique identifier for a registered project: `proj-` followed by 12
    /// lowercase hex characters.
    pub struct ProjectId;
}

const ID_PREFIX: &str = "proj-";
const ID_HEX_LEN: usize = 12;

/// Generates project ids.
pub trait ProjectIdGen: Send + Sync {
    fn next(&self) -> ProjectId;
}

/// Cryptographically random id generator for production use.
///
/// Uses a v4 UUID's randomness, truncated to 12 hex characters. UUID v4 draws
/// from the OS CSPRNG, satisfying the "cryptographically random" requirement
/// without pulling in a second randomness crate.
#[derive(Clone, Default)]
pub struct RandomProjectIdGen;

impl ProjectIdGen for RandomProjectIdGen {
    fn next(&self) -> ProjectId {
        let raw = uuid::Uuid::new_v4().simple().to_string();
        ProjectId::new(format!("{ID_PREFIX}{}", &raw[..ID_HEX_LEN]))
    }
}

/// Sequential id generator for deterministic tests.
#[derive(Clone, Default)]
pub struct SequentialProjectIdGen {
    counter: std::sync::Arc<std::sync::atomic::AtomicU64>,
}

impl SequentialProjectIdGen {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProjectIdGen for SequentialProjectIdGen {
    fn next(&self) -> ProjectId {
        let n = self
            .counter
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        ProjectId::new(format!("{ID_PREFIX}{n:012x}"))
    }
}

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;
