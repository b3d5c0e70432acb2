//! Encryption adapter for secret fields.
//!
//! A [`ValueTransformer`] is configured per stored resource type
//! ([`GroupResource`]). [`FieldCipher`] applies it to individual string
//! fields, storing each result as standard base64. With no transformer
//! configured the cipher runs in pass-through mode, which is logged.
//!
//! Every field is processed even if an earlier one fails; all failures are
//! returned together in one [`EncryptionError`]. Callers must not persist a
//! record when any error is returned.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine};
use mcpbroker_core::OAuthError;
use tracing::{debug, warn};

/// API group for resources owned by the broker.
pub const BROKER_GROUP: &str = "mcpbroker.io";

/// Pluggable byte transformer (envelope encryption).
pub trait ValueTransformer: Send + Sync {
    fn transform_to_storage(&self, data: &[u8], context: &str) -> anyhow::Result<Vec<u8>>;
    fn transform_from_storage(&self, data: &[u8], context: &str) -> anyhow::Result<Vec<u8>>;
}

/// Names a stored resource type, e.g. `mcpoauthtokens.mcpbroker.io`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GroupResource {
    pub group: String,
    pub resource: String,
}

impl GroupResource {
    pub fn new(group: impl Into<String>, resource: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            resource: resource.into(),
        }
    }

    pub fn oauth_tokens() -> Self {
        Self::new(BROKER_GROUP, "mcpoauthtokens")
    }

    pub fn pending_states() -> Self {
        Self::new(BROKER_GROUP, "mcpoauthpendingstates")
    }
}

impl fmt::Display for GroupResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.resource, self.group)
    }
}

/// Transformers keyed by resource type.
#[derive(Default, Clone)]
pub struct EncryptionConfig {
    transformers: HashMap<GroupResource, Arc<dyn ValueTransformer>>,
}

impl EncryptionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_transformer(
        mut self,
        resource: GroupResource,
        transformer: Arc<dyn ValueTransformer>,
    ) -> Self {
        self.transformers.insert(resource, transformer);
        self
    }

    pub fn transformer_for(&self, resource: &GroupResource) -> Option<Arc<dyn ValueTransformer>> {
        self.transformers.get(resource).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.transformers.is_empty()
    }
}

impl fmt::Debug for EncryptionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionConfig")
            .field("resources", &self.transformers.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Joined per-field encryption failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptionError {
    pub failures: Vec<String>,
}

impl fmt::Display for EncryptionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.failures.join("; "))
    }
}

impl std::error::Error for EncryptionError {}

impl From<EncryptionError> for OAuthError {
    fn from(err: EncryptionError) -> Self {
        OAuthError::Encryption(err.to_string())
    }
}

/// Applies the configured transformer for one resource type to string fields.
#[derive(Clone)]
pub struct FieldCipher {
    resource: GroupResource,
    transformer: Option<Arc<dyn ValueTransformer>>,
}

impl FieldCipher {
    /// Cipher for `resource`, in pass-through mode if nothing is configured.
    pub fn new(resource: GroupResource, config: &EncryptionConfig) -> Self {
        let transformer = config.transformer_for(&resource);
        Self::build(resource, transformer)
    }

    /// Like [`FieldCipher::new`], falling back to `fallback`'s transformer.
    pub fn with_fallback(
        resource: GroupResource,
        fallback: &GroupResource,
        config: &EncryptionConfig,
    ) -> Self {
        let transformer = config
            .transformer_for(&resource)
            .or_else(|| config.transformer_for(fallback));
        Self::build(resource, transformer)
    }

    fn build(resource: GroupResource, transformer: Option<Arc<dyn ValueTransformer>>) -> Self {
        if transformer.is_none() {
            warn!(
                "[Encryption] No transformer configured for {}; secrets will be stored in plaintext",
                resource
            );
        }
        Self {
            resource,
            transformer,
        }
    }

    pub fn resource(&self) -> &GroupResource {
        &self.resource
    }

    pub fn is_enabled(&self) -> bool {
        self.transformer.is_some()
    }

    /// Context string scoping ciphertext to one record.
    pub fn resource_context(&self, record_key: &str) -> String {
        format!("{}/{}", self.resource, record_key)
    }

    /// Encrypt each named field in place.
    ///
    /// Returns `Ok(true)` when fields now hold ciphertext and `Ok(false)` in
    /// pass-through mode.
    pub fn encrypt_fields(
        &self,
        context: &str,
        fields: &mut [(&str, &mut String)],
    ) -> Result<bool, EncryptionError> {
        let Some(transformer) = &self.transformer else {
            debug!("[Encryption] Pass-through encrypt for {}", self.resource);
            return Ok(false);
        };

        let mut failures = Vec::new();
        for (name, value) in fields.iter_mut() {
            match transformer.transform_to_storage(value.as_bytes(), context) {
                Ok(ciphertext) => **value = STANDARD.encode(ciphertext),
                Err(e) => failures.push(format!("failed to encrypt {}: {}", name, e)),
            }
        }

        if failures.is_empty() {
            Ok(true)
        } else {
            Err(EncryptionError { failures })
        }
    }

    /// Decrypt each named field in place. A no-op when `encrypted` is false.
    pub fn decrypt_fields(
        &self,
        context: &str,
        encrypted: bool,
        fields: &mut [(&str, &mut String)],
    ) -> Result<(), EncryptionError> {
        if !encrypted {
            return Ok(());
        }

        let Some(transformer) = &self.transformer else {
            return Err(EncryptionError {
                failures: vec![format!(
                    "record for {} is encrypted but no transformer is configured",
                    self.resource
                )],
            });
        };

        let mut failures = Vec::new();
        for (name, value) in fields.iter_mut() {
            let decoded = match STANDARD.decode(value.as_bytes()) {
                Ok(decoded) => decoded,
                Err(e) => {
                    failures.push(format!("failed to decode {}: {}", name, e));
                    continue;
                }
            };
            match transformer
                .transform_from_storage(&decoded, context)
                .and_then(|plain| String::from_utf8(plain).map_err(anyhow::Error::from))
            {
                Ok(plaintext) => **value = plaintext,
                Err(e) => failures.push(format!("failed to decrypt {}: {}", name, e)),
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(EncryptionError { failures })
        }
    }
}
