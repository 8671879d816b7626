//! Vault record types
//!
//! A [`VaultRecord`] is the unit every cache layer stores: the metadata of all
//! secrets, keys, and certificates of one vault, captured at `last_indexed`.
//! These types deliberately have no field for secret material. Values only
//! travel inside a [`SessionVaultRecord`], which the persistent cache never
//! accepts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use super::sensitive::SecretString;

/// Kind of resource held in a vault
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Secret,
    Key,
    Certificate,
}

impl ResourceType {
    pub const ALL: [ResourceType; 3] = [Self::Secret, Self::Key, Self::Certificate];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Secret => "secret",
            Self::Key => "key",
            Self::Certificate => "certificate",
        }
    }
}

impl FromStr for ResourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "secret" => Ok(Self::Secret),
            "key" => Ok(Self::Key),
            "certificate" => Ok(Self::Certificate),
            _ => Err(format!("Unknown resource type: {}", s)),
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Metadata of a secret (never its value)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretMeta {
    pub name: String,
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_on: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

/// Metadata of a cryptographic key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyMeta {
    pub name: String,
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_on: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
    /// Key algorithm family, e.g. `RSA` or `EC`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_type: Option<String>,
}

/// Metadata of a certificate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertMeta {
    pub name: String,
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_on: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
}

macro_rules! simple_meta_ctor {
    ($ty:ident) => {
        impl $ty {
            /// Enabled resource with no dates or tags
            pub fn named(name: impl Into<String>) -> Self {
                Self { name: name.into(), enabled: true, ..Default::default() }
            }

            pub fn with_expiry(mut self, expires_on: DateTime<Utc>) -> Self {
                self.expires_on = Some(expires_on);
                self
            }

            pub fn disabled(mut self) -> Self {
                self.enabled = false;
                self
            }

            pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
                self.tags.insert(key.into(), value.into());
                self
            }
        }
    };
}

impl Default for SecretMeta {
    fn default() -> Self {
        Self {
            name: String::new(),
            enabled: true,
            created: None,
            expires_on: None,
            tags: BTreeMap::new(),
            content_type: None,
        }
    }
}

impl Default for KeyMeta {
    fn default() -> Self {
        Self {
            name: String::new(),
            enabled: true,
            created: None,
            expires_on: None,
            tags: BTreeMap::new(),
            key_type: None,
        }
    }
}

impl Default for CertMeta {
    fn default() -> Self {
        Self {
            name: String::new(),
            enabled: true,
            created: None,
            expires_on: None,
            tags: BTreeMap::new(),
            subject: None,
            issuer: None,
        }
    }
}

simple_meta_ctor!(SecretMeta);
simple_meta_ctor!(KeyMeta);
simple_meta_ctor!(CertMeta);

/// Common read access over the three metadata kinds
pub trait Resource {
    const RESOURCE_TYPE: ResourceType;

    fn name(&self) -> &str;
    fn enabled(&self) -> bool;
    fn expires_on(&self) -> Option<DateTime<Utc>>;
    fn tags(&self) -> &BTreeMap<String, String>;
    fn to_meta(&self) -> ResourceMeta;
}

macro_rules! impl_resource {
    ($ty:ident, $kind:ident) => {
        impl Resource for $ty {
            const RESOURCE_TYPE: ResourceType = ResourceType::$kind;

            fn name(&self) -> &str {
                &self.name
            }

            fn enabled(&self) -> bool {
                self.enabled
            }

            fn expires_on(&self) -> Option<DateTime<Utc>> {
                self.expires_on
            }

            fn tags(&self) -> &BTreeMap<String, String> {
                &self.tags
            }

            fn to_meta(&self) -> ResourceMeta {
                ResourceMeta::$kind(self.clone())
            }
        }
    };
}

impl_resource!(SecretMeta, Secret);
impl_resource!(KeyMeta, Key);
impl_resource!(CertMeta, Certificate);

/// Owned copy of one resource's metadata, tagged by kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "resource_type", rename_all = "snake_case")]
pub enum ResourceMeta {
    Secret(SecretMeta),
    Key(KeyMeta),
    Certificate(CertMeta),
}

impl ResourceMeta {
    pub fn resource_type(&self) -> ResourceType {
        match self {
            Self::Secret(_) => ResourceType::Secret,
            Self::Key(_) => ResourceType::Key,
            Self::Certificate(_) => ResourceType::Certificate,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Secret(m) => &m.name,
            Self::Key(m) => &m.name,
            Self::Certificate(m) => &m.name,
        }
    }

    pub fn enabled(&self) -> bool {
        match self {
            Self::Secret(m) => m.enabled,
            Self::Key(m) => m.enabled,
            Self::Certificate(m) => m.enabled,
        }
    }

    pub fn expires_on(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Secret(m) => m.expires_on,
            Self::Key(m) => m.expires_on,
            Self::Certificate(m) => m.expires_on,
        }
    }
}

/// Metadata snapshot of one vault
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultRecord {
    /// Vault URL or name; unique key across all cache layers
    pub vault_identifier: String,
    #[serde(default)]
    pub secrets: Vec<SecretMeta>,
    #[serde(default)]
    pub keys: Vec<KeyMeta>,
    #[serde(default)]
    pub certificates: Vec<CertMeta>,
    pub last_indexed: DateTime<Utc>,
}

impl VaultRecord {
    /// Create an empty record stamped with the current time
    pub fn new(vault_identifier: impl Into<String>) -> Self {
        Self {
            vault_identifier: vault_identifier.into(),
            secrets: Vec::new(),
            keys: Vec::new(),
            certificates: Vec::new(),
            last_indexed: Utc::now(),
        }
    }

    pub fn with_secrets(mut self, secrets: Vec<SecretMeta>) -> Self {
        self.secrets = secrets;
        self
    }

    pub fn with_keys(mut self, keys: Vec<KeyMeta>) -> Self {
        self.keys = keys;
        self
    }

    pub fn with_certificates(mut self, certificates: Vec<CertMeta>) -> Self {
        self.certificates = certificates;
        self
    }

    /// Total number of resources across the three kinds
    pub fn resource_count(&self) -> usize {
        self.secrets.len() + self.keys.len() + self.certificates.len()
    }

    /// Iterate every resource as (kind, name, meta-producing reference)
    pub fn resources(&self) -> impl Iterator<Item = ResourceRef<'_>> {
        self.secrets
            .iter()
            .map(ResourceRef::Secret)
            .chain(self.keys.iter().map(ResourceRef::Key))
            .chain(self.certificates.iter().map(ResourceRef::Certificate))
    }
}

/// Borrowed view of one resource inside a [`VaultRecord`]
#[derive(Debug, Clone, Copy)]
pub enum ResourceRef<'a> {
    Secret(&'a SecretMeta),
    Key(&'a KeyMeta),
    Certificate(&'a CertMeta),
}

impl<'a> ResourceRef<'a> {
    pub fn resource_type(&self) -> ResourceType {
        match self {
            Self::Secret(_) => ResourceType::Secret,
            Self::Key(_) => ResourceType::Key,
            Self::Certificate(_) => ResourceType::Certificate,
        }
    }

    pub fn name(&self) -> &'a str {
        match self {
            Self::Secret(m) => &m.name,
            Self::Key(m) => &m.name,
            Self::Certificate(m) => &m.name,
        }
    }

    pub fn tags(&self) -> &'a BTreeMap<String, String> {
        match self {
            Self::Secret(m) => &m.tags,
            Self::Key(m) => &m.tags,
            Self::Certificate(m) => &m.tags,
        }
    }

    pub fn to_meta(&self) -> ResourceMeta {
        match self {
            Self::Secret(m) => m.to_meta(),
            Self::Key(m) => m.to_meta(),
            Self::Certificate(m) => m.to_meta(),
        }
    }
}

/// Session-only vault record: metadata plus fetched values.
///
/// Held exclusively by the ephemeral index. The persistent cache takes a
/// [`VaultRecord`], and [`SessionVaultRecord::into_metadata`] is the only
/// conversion between the two, so values cannot reach disk by accident.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionVaultRecord {
    pub record: VaultRecord,
    #[serde(default, with = "exposed_values")]
    pub secret_values: BTreeMap<String, SecretString>,
    #[serde(default, with = "exposed_values")]
    pub certificate_values: BTreeMap<String, SecretString>,
}

impl SessionVaultRecord {
    pub fn new(record: VaultRecord) -> Self {
        Self { record, secret_values: BTreeMap::new(), certificate_values: BTreeMap::new() }
    }

    pub fn vault_identifier(&self) -> &str {
        &self.record.vault_identifier
    }

    /// Value of a resource, if one was fetched this session
    pub fn value_of(&self, resource_type: ResourceType, name: &str) -> Option<&SecretString> {
        match resource_type {
            ResourceType::Secret => self.secret_values.get(name),
            ResourceType::Certificate => self.certificate_values.get(name),
            ResourceType::Key => None,
        }
    }

    pub fn value_count(&self) -> usize {
        self.secret_values.len() + self.certificate_values.len()
    }

    /// Drop every value and keep only what the persistent cache may hold
    pub fn into_metadata(self) -> VaultRecord {
        self.record
    }
}

impl From<VaultRecord> for SessionVaultRecord {
    fn from(record: VaultRecord) -> Self {
        Self::new(record)
    }
}

/// Serializes [`SecretString`] maps with their real contents.
///
/// `SecretString` redacts itself on serialization; the ephemeral index needs
/// the plaintext inside its encrypted envelope, so it opts in explicitly here.
mod exposed_values {
    use super::SecretString;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::collections::BTreeMap;

    pub fn serialize<S>(
        values: &BTreeMap<String, SecretString>,
        serializer: S,
    ) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let exposed: BTreeMap<&str, &str> =
            values.iter().map(|(k, v)| (k.as_str(), v.expose_secret())).collect();
        exposed.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<BTreeMap<String, SecretString>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = BTreeMap::<String, String>::deserialize(deserializer)?;
        Ok(raw.into_iter().map(|(k, v)| (k, SecretString::new(v))).collect())
    }
}

/// Subscription returned by discovery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,
    pub name: String,
}

/// Vault returned by discovery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultInfo {
    pub name: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub resource_group: String,
    /// Vault URL; falls back to the name when discovery does not provide one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
}

impl VaultInfo {
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into(), location: String::new(), resource_group: String::new(), uri: None }
    }

    /// Key used for this vault in every cache layer
    pub fn identifier(&self) -> &str {
        self.uri.as_deref().unwrap_or(&self.name)
    }
}
