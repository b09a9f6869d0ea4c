//! The published App permission manifest and endpoint lookups against it.

use std::collections::HashMap;

use camino::Utf8Path;
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;
use serde::Deserialize;

use super::normalize::{normalize_path, parent_path};
use super::{AccessLevel, Capability, EndpointRequirements, HttpMethod, RequiredCapabilities};
use crate::error::PermissionError;

/// Manifest document shape: `{"paths": {"/path": {"GET": {...}}}}`.
#[derive(Deserialize)]
struct Manifest {
    #[serde(default)]
    paths: HashMap<String, HashMap<String, ManifestOperation>>,
}

#[derive(Deserialize)]
struct ManifestOperation {
    permission: String,
    access: AccessLevel,
    #[serde(default, rename = "additionalPermissions")]
    additional_permissions: Vec<ManifestPermission>,
}

#[derive(Deserialize)]
struct ManifestPermission {
    permission: String,
    access: AccessLevel,
}

/// A successful schema lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityMatch {
    /// The schema path that matched, after normalisation and any parent fallback.
    pub resolved_path: String,
    /// The capabilities that path requires for the looked-up method.
    pub capabilities: RequiredCapabilities,
}

/// Static table of `{path pattern -> {method -> required capabilities}}`.
#[derive(Debug, Clone, Default)]
pub struct CapabilitySchema {
    paths: HashMap<String, HashMap<HttpMethod, RequiredCapabilities>>,
}

impl CapabilitySchema {
    /// A schema with no entries; every lookup misses.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse a manifest document.
    ///
    /// Methods the crate does not model are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`PermissionError::SchemaLoadFailed`] when the JSON is malformed.
    pub fn from_json(json: &str, origin: &str) -> Result<Self, PermissionError> {
        let manifest: Manifest =
            serde_json::from_str(json).map_err(|error| PermissionError::SchemaLoadFailed {
                origin: origin.to_owned(),
                message: error.to_string(),
            })?;

        let mut paths = HashMap::with_capacity(manifest.paths.len());
        for (path, operations) in manifest.paths {
            let methods: HashMap<HttpMethod, RequiredCapabilities> = operations
                .into_iter()
                .filter_map(|(method, operation)| {
                    let parsed = method.parse::<HttpMethod>().ok()?;
                    Some((parsed, operation.into_capabilities()))
                })
                .collect();
            paths.insert(normalize_path(&path), methods);
        }
        Ok(Self { paths })
    }

    /// Read and parse a manifest file.
    ///
    /// # Errors
    ///
    /// Returns [`PermissionError::SchemaLoadFailed`] when the file cannot be
    /// read or parsed.
    pub fn load(path: &Utf8Path) -> Result<Self, PermissionError> {
        let load_error = |message: String| PermissionError::SchemaLoadFailed {
            origin: path.to_string(),
            message,
        };
        let parent = path
            .parent()
            .filter(|p| !p.as_str().is_empty())
            .unwrap_or_else(|| Utf8Path::new("."));
        let file_name = path
            .file_name()
            .ok_or_else(|| load_error(String::from("path does not contain a filename")))?;
        let dir = Dir::open_ambient_dir(parent, ambient_authority())
            .map_err(|error| load_error(format!("failed to open parent directory: {error}")))?;
        let contents = dir
            .read_to_string(file_name)
            .map_err(|error| load_error(format!("failed to read file: {error}")))?;
        Self::from_json(&contents, path.as_str())
    }

    /// Number of path patterns in the schema.
    #[must_use]
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// Returns whether the schema has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    fn entry(&self, method: HttpMethod, path: &str) -> Option<&RequiredCapabilities> {
        self.paths.get(path).and_then(|methods| methods.get(&method))
    }

    /// Look up the capabilities required for `method` on `raw_path`.
    ///
    /// The path is normalised first. On a miss, the last segment is removed
    /// and the lookup retried once, so sub-resource actions inherit their
    /// parent resource's requirement.
    #[must_use]
    pub fn lookup(&self, method: HttpMethod, raw_path: &str) -> Option<CapabilityMatch> {
        let normalised = normalize_path(raw_path);
        if let Some(capabilities) = self.entry(method, &normalised) {
            return Some(CapabilityMatch {
                resolved_path: normalised,
                capabilities: capabilities.clone(),
            });
        }

        let parent = parent_path(&normalised)?;
        let capabilities = self.entry(method, parent)?;
        tracing::debug!(
            method = %method,
            path = %normalised,
            parent,
            "permission lookup fell back to parent resource"
        );
        Some(CapabilityMatch {
            resolved_path: parent.to_owned(),
            capabilities: capabilities.clone(),
        })
    }

    /// Resolve the capabilities a request needs.
    ///
    /// An explicit override short-circuits the lookup. A schema miss yields
    /// `Ok(None)` ("no known requirement") unless the requirements are strict.
    ///
    /// # Errors
    ///
    /// Returns [`PermissionError::PermissionSchemaNotFound`] for a strict miss.
    pub fn resolve(
        &self,
        requirements: &EndpointRequirements,
    ) -> Result<Option<RequiredCapabilities>, PermissionError> {
        if let Some(capabilities) = requirements.capability_override() {
            return Ok(Some(capabilities.clone()));
        }

        match self.lookup(requirements.method(), requirements.path()) {
            Some(found) => Ok(Some(found.capabilities)),
            None if requirements.is_strict() => Err(PermissionError::PermissionSchemaNotFound {
                method: requirements.method().to_string(),
                path: normalize_path(requirements.path()),
            }),
            None => {
                tracing::warn!(
                    method = %requirements.method(),
                    path = requirements.path(),
                    "no permission schema entry; treating endpoint as unrestricted"
                );
                Ok(None)
            }
        }
    }
}

impl ManifestOperation {
    fn into_capabilities(self) -> RequiredCapabilities {
        let primary = Capability::new(self.permission, self.access);
        let extra = self
            .additional_permissions
            .into_iter()
            .map(|permission| Capability::new(permission.permission, permission.access));
        RequiredCapabilities::new(std::iter::once(primary).chain(extra).collect())
    }
}
