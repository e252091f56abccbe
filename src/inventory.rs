// Nornir-style YAML inventory (hosts / groups / defaults).
// Attribute precedence: host > groups (listed order, depth-first) > defaults.

use crate::config::InventoryConfig;
use crate::models::{DEFAULT_HTTP_MGMT_PORT, DEFAULT_SSH_PORT, ExtraValue};
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum InventoryError {
    #[error("reading inventory file {}: {}", .path.display(), .source)]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing inventory file {}: {}", .path.display(), .source)]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("{owner} references undefined group `{group}`")]
    UnknownGroup { owner: String, group: String },
}

/// One host, group or defaults entry as written in YAML.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InventoryEntry {
    pub hostname: Option<String>,
    pub platform: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub groups: Option<Vec<String>>,
    pub data: Option<BTreeMap<String, serde_yaml::Value>>,
    pub connection_options: Option<ConnectionOptions>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConnectionOptions {
    pub netmiko: Option<NetmikoOptions>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NetmikoOptions {
    pub extras: Option<NetmikoExtras>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NetmikoExtras {
    pub secret: Option<String>,
}

impl InventoryEntry {
    fn secret(&self) -> Option<&String> {
        self.connection_options
            .as_ref()?
            .netmiko
            .as_ref()?
            .extras
            .as_ref()?
            .secret
            .as_ref()
    }
}

/// Device descriptor: everything the backup procedures read about one device.
#[derive(Debug, Clone, PartialEq)]
pub struct Device {
    /// Inventory identity; also names the device's file in the stockpile.
    pub name: String,
    /// Management address (IP or DNS name).
    pub hostname: String,
    pub platform: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Enable secret; falls back to the password.
    pub secret: Option<String>,
    pub device_name: Option<String>,
    pub http_management: bool,
    pub http_mgmt_port: Option<u16>,
    pub extra: BTreeMap<String, ExtraValue>,
}

impl Device {
    pub fn new(name: impl Into<String>, hostname: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            hostname: hostname.into(),
            platform: None,
            port: None,
            username: None,
            password: None,
            secret: None,
            device_name: None,
            http_management: false,
            http_mgmt_port: None,
            extra: BTreeMap::new(),
        }
    }

    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = Some(platform.into());
        self
    }

    pub fn ssh_port(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_SSH_PORT)
    }

    pub fn http_port(&self) -> u16 {
        self.http_mgmt_port.unwrap_or(DEFAULT_HTTP_MGMT_PORT)
    }

    /// Reported hostname: `data.device_name`, else the inventory name.
    pub fn display_hostname(&self) -> &str {
        self.device_name.as_deref().unwrap_or(&self.name)
    }

    pub fn enable_secret(&self) -> Option<&str> {
        self.secret.as_deref().or(self.password.as_deref())
    }
}

#[derive(Debug, Default)]
pub struct Inventory {
    hosts: BTreeMap<String, InventoryEntry>,
    groups: BTreeMap<String, InventoryEntry>,
    defaults: InventoryEntry,
}

fn parse_yaml<T: Default + for<'de> Deserialize<'de>>(
    s: &str,
    path: &Path,
) -> Result<T, InventoryError> {
    if s.trim().is_empty() {
        return Ok(T::default());
    }
    serde_yaml::from_str(s).map_err(|source| InventoryError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn read_file(path: &Path) -> Result<String, InventoryError> {
    std::fs::read_to_string(path).map_err(|source| InventoryError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn read_optional(path: &Path) -> Result<Option<String>, InventoryError> {
    if path.as_os_str().is_empty() || !path.is_file() {
        debug!(path = %path.display(), "optional inventory file not present");
        return Ok(None);
    }
    read_file(path).map(Some)
}

impl Inventory {
    pub fn load(config: &InventoryConfig) -> Result<Self, InventoryError> {
        let hosts = read_file(&config.hosts_file)?;
        let groups = read_optional(&config.groups_file)?;
        let defaults = read_optional(&config.defaults_file)?;
        Ok(Self {
            hosts: parse_yaml(&hosts, &config.hosts_file)?,
            groups: match groups {
                Some(s) => parse_yaml(&s, &config.groups_file)?,
                None => BTreeMap::new(),
            },
            defaults: match defaults {
                Some(s) => parse_yaml(&s, &config.defaults_file)?,
                None => InventoryEntry::default(),
            },
        })
    }

    /// Build from YAML strings (e.g. for tests).
    pub fn from_yaml(
        hosts: &str,
        groups: Option<&str>,
        defaults: Option<&str>,
    ) -> Result<Self, InventoryError> {
        Ok(Self {
            hosts: parse_yaml(hosts, Path::new("<hosts>"))?,
            groups: match groups {
                Some(s) => parse_yaml(s, Path::new("<groups>"))?,
                None => BTreeMap::new(),
            },
            defaults: match defaults {
                Some(s) => parse_yaml(s, Path::new("<defaults>"))?,
                None => InventoryEntry::default(),
            },
        })
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    /// Resolve every host into a device descriptor, sorted by inventory name.
    pub fn devices(&self) -> Result<Vec<Device>, InventoryError> {
        self.hosts
            .iter()
            .map(|(name, entry)| self.resolve(name, entry))
            .collect()
    }

    fn collect_groups<'a>(
        &'a self,
        owner: &str,
        entry: &'a InventoryEntry,
        seen: &mut HashSet<&'a str>,
        out: &mut Vec<&'a InventoryEntry>,
    ) -> Result<(), InventoryError> {
        for group in entry.groups.iter().flatten() {
            if !seen.insert(group.as_str()) {
                continue;
            }
            let Some(g) = self.groups.get(group) else {
                return Err(InventoryError::UnknownGroup {
                    owner: owner.to_string(),
                    group: group.clone(),
                });
            };
            out.push(g);
            self.collect_groups(&format!("group {}", group), g, seen, out)?;
        }
        Ok(())
    }

    fn resolve(&self, name: &str, host: &InventoryEntry) -> Result<Device, InventoryError> {
        let mut chain = vec![host];
        self.collect_groups(&format!("host {}", name), host, &mut HashSet::new(), &mut chain)?;
        chain.push(&self.defaults);

        let first = |f: fn(&InventoryEntry) -> Option<&String>| -> Option<String> {
            chain.iter().copied().find_map(f).cloned()
        };

        let mut data: BTreeMap<String, serde_yaml::Value> = BTreeMap::new();
        for entry in chain.iter().rev() {
            if let Some(d) = &entry.data {
                data.extend(d.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
        }

        let hostname = first(|e| e.hostname.as_ref()).unwrap_or_else(|| name.to_string());
        let mut device = Device::new(name, hostname);
        device.platform = first(|e| e.platform.as_ref());
        device.port = chain.iter().find_map(|e| e.port);
        device.username = first(|e| e.username.as_ref());
        device.password = first(|e| e.password.as_ref());
        device.secret = first(InventoryEntry::secret);

        for (key, value) in data {
            match key.as_str() {
                "device_name" => device.device_name = value.as_str().map(str::to_string),
                "http_management" => device.http_management = value.as_bool().unwrap_or(false),
                "http_mgmt_port" => {
                    device.http_mgmt_port = value.as_u64().and_then(|p| u16::try_from(p).ok())
                }
                _ => {
                    if let Some(v) = scalar_extra(&value) {
                        device.extra.insert(key, v);
                    }
                }
            }
        }
        Ok(device)
    }
}

fn scalar_extra(value: &serde_yaml::Value) -> Option<ExtraValue> {
    use serde_yaml::Value;
    match value {
        Value::Bool(b) => Some(ExtraValue::Bool(*b)),
        Value::Number(n) => Some(match n.as_i64() {
            Some(i) => ExtraValue::Int(i),
            None => ExtraValue::Text(n.to_string()),
        }),
        Value::String(s) => Some(ExtraValue::Text(s.clone())),
        _ => None,
    }
}

/// Keep only devices whose management address is listed. An empty list keeps everything.
pub fn filter_by_addresses(devices: Vec<Device>, addresses: &[String]) -> Vec<Device> {
    if addresses.is_empty() {
        return devices;
    }
    devices
        .into_iter()
        .filter(|d| addresses.iter().any(|a| a == &d.hostname))
        .collect()
}
