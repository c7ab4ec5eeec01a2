//! Extension manifest parsing and validation.
//!
//! The manifest is a TOML document with one table per extension:
//!
//! ```toml
//! [Scrobbler]
//! allow = true
//!
//! [Loves]
//! allow = false
//! ```
//!
//! Section order is preserved. `allow` defaults to `false`.
//!
//! Only a document that is not valid TOML fails as a whole. A section with
//! an invalid name, a non-table value or a non-boolean `allow` is kept as
//! a [`RejectedSection`] so the remaining sections still load.

use std::path::Path;

use serde::Deserialize;

use crate::error::ExtensionError;

/// One manifest section. Immutable after load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionDescriptor {
    pub name: String,
    pub allow: bool,
}

#[derive(Debug, Deserialize)]
struct DescriptorSection {
    #[serde(default)]
    allow: bool,
}

/// A manifest section that could not be turned into a descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedSection {
    pub name: String,
    pub reason: String,
}

/// Parsed extension manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtensionManifest {
    descriptors: Vec<ExtensionDescriptor>,
    rejected: Vec<RejectedSection>,
}

// ─── Validation helpers ─────────────────────────────────────────────────

/// Validate an extension name against `^[A-Za-z][A-Za-z0-9_-]{0,63}$`.
pub fn validate_extension_name(name: &str) -> Result<(), ExtensionError> {
    let len = name.len();
    if !(1..=64).contains(&len) {
        return Err(ExtensionError::InvalidManifest(format!(
            "extension name must be 1-64 characters, got {len}"
        )));
    }

    let mut chars = name.chars();
    if let Some(first) = chars.next() {
        if !first.is_ascii_alphabetic() {
            return Err(ExtensionError::InvalidManifest(format!(
                "extension name must start with a letter, got '{first}'"
            )));
        }
    }

    for ch in chars {
        if !ch.is_ascii_alphanumeric() && ch != '_' && ch != '-' {
            return Err(ExtensionError::InvalidManifest(format!(
                "extension name {name:?} contains invalid character '{ch}'"
            )));
        }
    }

    Ok(())
}

impl ExtensionManifest {
    /// Parse a manifest from a TOML string.
    pub fn parse(source: &str) -> Result<Self, ExtensionError> {
        let table: toml::Table = source.parse()?;

        let mut manifest = Self::default();
        for (name, value) in table {
            match Self::section(&name, value) {
                Ok(allow) => manifest.descriptors.push(ExtensionDescriptor { name, allow }),
                Err(e) => {
                    let reason = match e {
                        ExtensionError::InvalidManifest(reason) => reason,
                        other => other.to_string(),
                    };
                    tracing::warn!(extension = %name, "rejected manifest section: {reason}");
                    manifest.rejected.push(RejectedSection { name, reason });
                }
            }
        }

        Ok(manifest)
    }

    fn section(name: &str, value: toml::Value) -> Result<bool, ExtensionError> {
        validate_extension_name(name)?;
        if !value.is_table() {
            return Err(ExtensionError::InvalidManifest(format!(
                "[{name}] must be a table, got {}",
                value.type_str()
            )));
        }
        let section: DescriptorSection = value
            .try_into()
            .map_err(|e| ExtensionError::InvalidManifest(format!("[{name}]: {e}")))?;
        Ok(section.allow)
    }

    /// Read and parse a manifest file.
    pub fn from_path(path: &Path) -> Result<Self, ExtensionError> {
        let source = std::fs::read_to_string(path).map_err(|e| {
            ExtensionError::Manifest(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::parse(&source)
    }

    /// Valid sections in file order.
    pub fn descriptors(&self) -> &[ExtensionDescriptor] {
        &self.descriptors
    }

    /// Valid sections with `allow = true`, in file order.
    pub fn allowed(&self) -> impl Iterator<Item = &ExtensionDescriptor> {
        self.descriptors.iter().filter(|d| d.allow)
    }

    /// Sections skipped because they were malformed.
    pub fn rejected(&self) -> &[RejectedSection] {
        &self.rejected
    }
}
