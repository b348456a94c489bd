//! Issuer to key-id inventory.
//!
//! Operations teams can publish which KMS keys belong to which issuer. When a
//! non-empty inventory is attached to a
//! [`VerificationResult`](crate::VerificationResult), a token is only
//! accepted if its `kid` is registered to its issuer.
//!
//! The file is YAML keyed by environment, then issuer:
//!
//! ```yaml
//! production:
//!   sie:
//!     - arn:aws:kms:us-west-2:111122223333:key/aaaa
//!   sic:
//!     - arn:aws:kms:us-west-2:111122223333:key/cccc
//! test:
//!   sie: [arn:A]
//! ```

use std::path::Path;

use serde_yaml::Value;

use crate::{
    error::{Result, SisJwtError},
    runtime::RAILS_ENV,
};

/// Environment used when none is requested and `RAILS_ENV` is unset.
pub const DEFAULT_INVENTORY_ENV: &str = "development";

/// Read-only issuer to key-id lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArnInventory {
    issuers: Vec<(String, Vec<String>)>,
}

impl ArnInventory {
    /// Builds an inventory directly from issuer/key pairs.
    pub fn from_issuers<I, S, K>(issuers: I) -> Self
    where
        I: IntoIterator<Item = (S, Vec<K>)>,
        S: Into<String>,
        K: Into<String>,
    {
        Self {
            issuers: issuers
                .into_iter()
                .map(|(issuer, keys)| (issuer.into(), keys.into_iter().map(Into::into).collect()))
                .collect(),
        }
    }

    /// Loads the `env` section of an inventory file.
    ///
    /// # Errors
    ///
    /// [`SisJwtError::FileNotFound`] if `path` is not a file, otherwise the
    /// errors of [`from_yaml_str`](Self::from_yaml_str).
    pub fn from_path(path: impl AsRef<Path>, env: &str) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(SisJwtError::FileNotFound(path.to_path_buf()));
        }
        let contents = std::fs::read_to_string(path)
            .map_err(|e| SisJwtError::inventory_file(format!("{}: {e}", path.display())))?;
        let inventory = Self::from_yaml_str(&contents, env, &path.display().to_string())?;
        tracing::debug!(
            path = %path.display(),
            env,
            issuers = inventory.issuers.len(),
            "loaded ARN inventory"
        );
        Ok(inventory)
    }

    /// Parses the `env` section of an inventory document.
    ///
    /// `source` names the document in error messages.
    ///
    /// # Errors
    ///
    /// [`SisJwtError::InventoryFile`] when the YAML does not parse, `env` is
    /// missing, or the section is not an issuer to key-list mapping.
    pub fn from_yaml_str(contents: &str, env: &str, source: &str) -> Result<Self> {
        let document: Value = serde_yaml::from_str(contents)
            .map_err(|e| SisJwtError::inventory_file(format!("{source}: {e}")))?;

        let section = document.as_mapping().and_then(|root| lookup(root, env)).ok_or_else(|| {
            SisJwtError::inventory_file(format!(
                "Could not find requested environment ({env}) in inventory file {source}"
            ))
        })?;
        let malformed = || SisJwtError::inventory_file("Inventory file is malformed!");
        let section = section.as_mapping().ok_or_else(malformed)?;

        let mut issuers = Vec::with_capacity(section.len());
        for (issuer, keys) in section {
            let issuer = scalar(issuer).ok_or_else(malformed)?;
            let keys = match keys {
                Value::Sequence(items) => {
                    items.iter().map(scalar).collect::<Option<Vec<_>>>().ok_or_else(malformed)?
                },
                Value::Null => Vec::new(),
                other => vec![scalar(other).ok_or_else(malformed)?],
            };
            issuers.push((issuer, keys));
        }
        Ok(Self { issuers })
    }

    /// The environment to load when the caller names none: `RAILS_ENV` from
    /// `lookup`, or [`DEFAULT_INVENTORY_ENV`].
    #[must_use]
    pub fn default_environment(lookup: impl Fn(&str) -> Option<String>) -> String {
        lookup(RAILS_ENV)
            .map(|env| env.trim().to_owned())
            .filter(|env| !env.is_empty())
            .unwrap_or_else(|| DEFAULT_INVENTORY_ENV.to_owned())
    }

    /// `true` when no issuer is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.issuers.is_empty()
    }

    /// Number of registered issuers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.issuers.len()
    }

    /// Whether `arn` is registered to `issuer`. Issuer names ignore ASCII case.
    #[must_use]
    pub fn is_valid_arn(&self, issuer: &str, arn: &str) -> bool {
        self.issuers
            .iter()
            .any(|(name, keys)| name.eq_ignore_ascii_case(issuer) && keys.iter().any(|k| k == arn))
    }

    /// The first issuer `arn` is registered to.
    #[must_use]
    pub fn find_issuer(&self, arn: &str) -> Option<&str> {
        self.issuers.iter().find(|(_, keys)| keys.iter().any(|k| k == arn)).map(|(name, _)| name.as_str())
    }
}

fn lookup<'a>(mapping: &'a serde_yaml::Mapping, key: &str) -> Option<&'a Value> {
    mapping.iter().find(|(k, _)| scalar(k).as_deref() == Some(key)).map(|(_, v)| v)
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
