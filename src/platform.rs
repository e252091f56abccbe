// Platform dispatcher: maps a device's platform identifier to a backup procedure.

use crate::inventory::Device;
use crate::models::BackupOutcome;
use crate::stockpile::{StockpileContext, retrieve_dual_transport, retrieve_generic};
use std::collections::HashMap;

/// Platforms backed up over SSH only.
pub const GENERIC_PLATFORMS: &[&str] = &[
    "a10",
    "accedian",
    "alcatel_aos",
    "alcatel_sros",
    "apresia_aeos",
    "arista_eos",
    "aruba_os",
    "avaya_ers",
    "avaya_vsp",
    "brocade_fastiron",
    "brocade_netiron",
    "brocade_nos",
    "brocade_vdx",
    "brocade_vyos",
    "calix_b6",
    "checkpoint_gaia",
    "ciena_saos",
    "cisco_ios",
    "cisco_nxos",
    "cisco_s300",
    "cisco_tp",
    "cisco_wlc",
    "cisco_xe",
    "cisco_xr",
    "coriant",
    "dell_dnos9",
    "dell_force10",
    "dell_os10",
    "dell_os6",
    "dell_os9",
    "dell_powerconnect",
    "dlink_ds",
    "endace",
    "enterasys",
    "extreme",
    "extreme_ers",
    "extreme_exos",
    "extreme_netiron",
    "extreme_nos",
    "extreme_slx",
    "extreme_vdx",
    "extreme_vsp",
    "extreme_wing",
    "f5_linux",
    "f5_ltm",
    "f5_tmsh",
    "flexvnf",
    "fortinet",
    "generic_termserver",
    "hp_comware",
    "hp_procurve",
    "huawei",
    "huawei_vrpv8",
    "ipinfusion_ocnos",
    "juniper",
    "juniper_junos",
    "linux",
    "mellanox",
    "mrv_optiswitch",
    "netapp_cdot",
    "netscaler",
    "oneaccess_oneos",
    "ovs_linux",
    "paloalto_panos",
    "pluribus",
    "quanta_mesh",
    "rad_etx",
    "ruckus_fastiron",
    "ubiquiti_edge",
    "ubiquiti_edgeswitch",
    "vyatta_vyos",
    "vyos",
];

/// Platforms with an HTTPS management plane, tried before SSH.
pub const DUAL_TRANSPORT_PLATFORMS: &[&str] = &["cisco_asa"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Procedure {
    Generic,
    DualTransport,
}

impl Procedure {
    /// Probe and read the device. Nothing is written locally.
    pub async fn retrieve(self, ctx: &StockpileContext, device: &Device) -> BackupOutcome {
        match self {
            Procedure::Generic => retrieve_generic(ctx, device).await,
            Procedure::DualTransport => retrieve_dual_transport(ctx, device).await,
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("device {device} has no platform configured")]
    MissingPlatform { device: String },
    #[error("unknown platform `{platform}` for device {device}")]
    UnknownPlatform { device: String, platform: String },
}

#[derive(Debug, Clone)]
pub struct PlatformRegistry {
    procedures: HashMap<String, Procedure>,
}

impl Default for PlatformRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        for platform in GENERIC_PLATFORMS {
            registry.register(platform, Procedure::Generic);
        }
        for platform in DUAL_TRANSPORT_PLATFORMS {
            registry.register(platform, Procedure::DualTransport);
        }
        registry
    }
}

impl PlatformRegistry {
    pub fn empty() -> Self {
        Self {
            procedures: HashMap::new(),
        }
    }

    /// Add or replace a mapping; returns the previous procedure for the platform.
    pub fn register(&mut self, platform: &str, procedure: Procedure) -> Option<Procedure> {
        self.procedures.insert(platform.to_string(), procedure)
    }

    pub fn len(&self) -> usize {
        self.procedures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.procedures.is_empty()
    }

    pub fn resolve(&self, device: &Device) -> Result<Procedure, DispatchError> {
        let platform = device
            .platform
            .as_deref()
            .ok_or_else(|| DispatchError::MissingPlatform {
                device: device.name.clone(),
            })?;
        self.procedures
            .get(platform)
            .copied()
            .ok_or_else(|| DispatchError::UnknownPlatform {
                device: device.name.clone(),
                platform: platform.to_string(),
            })
    }
}
