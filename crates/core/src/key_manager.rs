// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Content key lookup for protected media.
//!
//! The host installs a key manager on the [`Core`](crate::core::Core) as an
//! opaque property named [`KEY_MANAGER_PROPERTY`]. Nodes that decrypt content
//! fetch it with [`Core::key_manager`](crate::core::Core::key_manager).

use crate::error::{Result, TuneKitError};
use std::collections::HashMap;
use std::sync::Arc;

/// Core property under which the key manager is published.
pub const KEY_MANAGER_PROPERTY: &str = "DataProtection.KeyManager";

/// Resolves content keys by name.
pub trait KeyManager: Send + Sync {
    /// Copies the key named `name` into `key` and returns its length.
    ///
    /// # Errors
    ///
    /// `NoMediaKey` if the key is unknown, `InvalidParameters` if `key` is too small.
    fn key_by_name(&self, name: &str, key: &mut [u8]) -> Result<usize>;
}

/// Wrapper stored in the property bag, since trait objects cannot be downcast directly.
#[derive(Clone)]
pub struct KeyManagerHandle(pub Arc<dyn KeyManager>);

impl std::fmt::Debug for KeyManagerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("KeyManagerHandle(..)")
    }
}

/// A fixed table of keys.
#[derive(Debug, Default, Clone)]
pub struct StaticKeyManager {
    keys: HashMap<String, Vec<u8>>,
}

impl StaticKeyManager {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_key(mut self, name: impl Into<String>, key: impl Into<Vec<u8>>) -> Self {
        self.keys.insert(name.into(), key.into());
        self
    }
}

impl KeyManager for StaticKeyManager {
    fn key_by_name(&self, name: &str, key: &mut [u8]) -> Result<usize> {
        let stored = self.keys.get(name).ok_or_else(|| TuneKitError::NoMediaKey(name.to_string()))?;
        if key.len() < stored.len() {
            return Err(TuneKitError::InvalidParameters(format!(
                "key buffer of {} bytes, key needs {}",
                key.len(),
                stored.len()
            )));
        }
        key[..stored.len()].copy_from_slice(stored);
        Ok(stored.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_key_lookup() {
        let manager = StaticKeyManager::new().with_key("track-1", vec![0xAA; 16]);
        let mut key = [0u8; 16];
        assert_eq!(manager.key_by_name("track-1", &mut key).unwrap(), 16);
        assert_eq!(key, [0xAA; 16]);

        assert!(matches!(
            manager.key_by_name("track-2", &mut key),
            Err(TuneKitError::NoMediaKey(_))
        ));
        let mut small = [0u8; 8];
        assert!(matches!(
            manager.key_by_name("track-1", &mut small),
            Err(TuneKitError::InvalidParameters(_))
        ));
    }
}
