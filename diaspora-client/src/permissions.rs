//! Permission registry used to build OAuth scopes and the application manifest
//!
//! A pod grants access per resource type. Applications declare which types they
//! need and whether they need to read or also write them; the registry keeps
//! those declarations in insertion order so the scope string and the manifest
//! always list them the way they were declared.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use utoipa::ToSchema;

/// Errors raised while declaring permissions
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PermissionError {
    #[error("{given} is not an available permission type. Available: {}", ResourceType::available())]
    InvalidResourceType { given: String },
    #[error("{given} is not an available permission access type. Available: {}", AccessLevel::available())]
    InvalidAccessLevel { given: String },
}

/// Resource types a pod can grant access to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Posts,
    AsPhotos,
    Comments,
    Likes,
    Aspects,
    Profile,
    People,
}

impl ResourceType {
    pub const ALL: [ResourceType; 7] = [
        ResourceType::Posts,
        ResourceType::AsPhotos,
        ResourceType::Comments,
        ResourceType::Likes,
        ResourceType::Aspects,
        ResourceType::Profile,
        ResourceType::People,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Posts => "posts",
            ResourceType::AsPhotos => "as_photos",
            ResourceType::Comments => "comments",
            ResourceType::Likes => "likes",
            ResourceType::Aspects => "aspects",
            ResourceType::Profile => "profile",
            ResourceType::People => "people",
        }
    }

    fn available() -> String {
        Self::ALL
            .iter()
            .map(ResourceType::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = PermissionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|resource| resource.as_str() == s)
            .ok_or_else(|| PermissionError::InvalidResourceType {
                given: s.to_string(),
            })
    }
}

/// Access level granted on a resource type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AccessLevel {
    Read,
    Write,
}

impl AccessLevel {
    pub const ALL: [AccessLevel; 2] = [AccessLevel::Read, AccessLevel::Write];

    pub fn as_str(&self) -> &'static str {
        match self {
            AccessLevel::Read => "read",
            AccessLevel::Write => "write",
        }
    }

    fn available() -> String {
        Self::ALL
            .iter()
            .map(AccessLevel::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccessLevel {
    type Err = PermissionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|access| access.as_str() == s)
            .ok_or_else(|| PermissionError::InvalidAccessLevel {
                given: s.to_string(),
            })
    }
}

/// One `{type, access}` pair of the application manifest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ManifestEntry {
    #[serde(rename = "type")]
    pub resource: ResourceType,
    pub access: AccessLevel,
}

/// Ordered set of declared permissions, at most one access level per type
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Permissions {
    entries: Vec<ManifestEntry>,
}

impl Permissions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare `access` on `resource`, validating both names.
    ///
    /// The resource type is checked before the access level, so a call with two
    /// bad values reports the resource type.
    pub fn set(&mut self, resource: &str, access: &str) -> Result<(), PermissionError> {
        let resource = resource.parse::<ResourceType>()?;
        let access = access.parse::<AccessLevel>()?;
        self.grant(resource, access);
        Ok(())
    }

    /// Declare `access` on `resource`. Re-declaring a type keeps its position.
    pub fn grant(&mut self, resource: ResourceType, access: AccessLevel) {
        match self.entries.iter_mut().find(|e| e.resource == resource) {
            Some(entry) => entry.access = access,
            None => self.entries.push(ManifestEntry { resource, access }),
        }
    }

    /// Stored access level for a type name; unknown names yield `None`
    pub fn get(&self, resource: &str) -> Option<AccessLevel> {
        resource
            .parse::<ResourceType>()
            .ok()
            .and_then(|resource| self.access_for(resource))
    }

    pub fn access_for(&self, resource: ResourceType) -> Option<AccessLevel> {
        self.entries
            .iter()
            .find(|e| e.resource == resource)
            .map(|e| e.access)
    }

    pub fn to_manifest(&self) -> Vec<ManifestEntry> {
        self.entries.clone()
    }

    /// Comma-joined type names, as sent in the OAuth `scope` parameter
    pub fn to_scope_string(&self) -> String {
        self.entries
            .iter()
            .map(|e| e.resource.as_str())
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ManifestEntry> {
        self.entries.iter()
    }
}

/// Parses declarations such as `"profile:read, posts:write"`.
/// An entry without `:` has an empty access level and is rejected.
impl FromStr for Permissions {
    type Err = PermissionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut permissions = Permissions::new();
        for entry in s.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (resource, access) = entry.split_once(':').unwrap_or((entry, ""));
            permissions.set(resource.trim(), access.trim())?;
        }
        Ok(permissions)
    }
}
