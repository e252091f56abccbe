// Shared test helpers: scripted prober and transports, device and context builders

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use stockpiler::inventory::Device;
use stockpiler::probe::PortProbe;
use stockpiler::stockpile::StockpileContext;
use stockpiler::transport::{Transport, TransportError, TransportFactory, TransportKind};

pub const CONFIG_TEXT: &str = "hostname edge-fw\n!\ninterface Gi0/0\n nameif outside\n!\n";

/// Ports listed as open answer true; everything else is closed. Every probe is recorded.
#[derive(Default)]
pub struct FakeProbe {
    open: HashSet<(String, u16)>,
    pub probed: Mutex<Vec<(String, u16)>>,
}

impl FakeProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(mut self, host: &str, port: u16) -> Self {
        self.open.insert((host.to_string(), port));
        self
    }

    pub fn probed_ports(&self, host: &str) -> Vec<u16> {
        self.probed
            .lock()
            .unwrap()
            .iter()
            .filter(|(h, _)| h == host)
            .map(|(_, p)| *p)
            .collect()
    }
}

#[async_trait]
impl PortProbe for FakeProbe {
    async fn is_open(&self, host: &str, port: u16, _timeout: Duration) -> bool {
        self.probed.lock().unwrap().push((host.to_string(), port));
        self.open.contains(&(host.to_string(), port))
    }
}

/// What a scripted transport answers.
#[derive(Debug, Clone)]
pub enum Reply {
    Text(String),
    Fail(String),
    /// Never answers; used to trip the per-device timeout.
    Hang,
}

impl Reply {
    pub fn text(s: &str) -> Self {
        Reply::Text(s.to_string())
    }

    async fn answer(&self) -> Result<String, TransportError> {
        match self {
            Reply::Text(s) => Ok(s.clone()),
            Reply::Fail(reason) => Err(TransportError::Session(reason.clone())),
            Reply::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(TransportError::Timeout(Duration::from_secs(3600)))
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct Script {
    pub execute: Reply,
    pub save: Reply,
}

impl Script {
    /// Returns `config` for any command and accepts the save.
    pub fn ok(config: &str) -> Self {
        Self {
            execute: Reply::text(config),
            save: Reply::text("Building configuration...\n[OK]\n"),
        }
    }

    pub fn new(execute: Reply, save: Reply) -> Self {
        Self { execute, save }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub device: String,
    pub kind: TransportKind,
    pub command: String,
}

/// Session provider with per-(device, transport) scripts. Opening an unscripted transport fails.
#[derive(Default)]
pub struct FakeTransports {
    scripts: HashMap<(String, TransportKind), Script>,
    pub calls: Arc<Mutex<Vec<Call>>>,
    pub proxies: Mutex<Vec<Option<String>>>,
}

impl FakeTransports {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(mut self, device: &str, kind: TransportKind, script: Script) -> Self {
        self.scripts.insert((device.to_string(), kind), script);
        self
    }

    pub fn calls_for(&self, device: &str) -> Vec<Call> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.device == device)
            .cloned()
            .collect()
    }

    /// Every call for `device` as (transport, command), in call order.
    pub fn sequence(&self, device: &str) -> Vec<(TransportKind, String)> {
        self.calls_for(device).into_iter().map(|c| (c.kind, c.command)).collect()
    }

    pub fn kinds_used(&self, device: &str) -> Vec<TransportKind> {
        let mut kinds: Vec<TransportKind> = self.calls_for(device).iter().map(|c| c.kind).collect();
        kinds.dedup();
        kinds
    }

    fn open(&self, device: &Device, kind: TransportKind) -> Result<Box<dyn Transport>, TransportError> {
        let script = self
            .scripts
            .get(&(device.name.clone(), kind))
            .cloned()
            .ok_or_else(|| TransportError::Connect {
                target: device.hostname.clone(),
                reason: "connection refused".into(),
            })?;
        Ok(Box::new(FakeTransport {
            device: device.name.clone(),
            kind,
            script,
            calls: self.calls.clone(),
        }))
    }
}

impl TransportFactory for FakeTransports {
    fn ssh(&self, device: &Device) -> Result<Box<dyn Transport>, TransportError> {
        self.open(device, TransportKind::Ssh)
    }

    fn http(&self, device: &Device, proxy: Option<&str>) -> Result<Box<dyn Transport>, TransportError> {
        self.proxies.lock().unwrap().push(proxy.map(str::to_string));
        self.open(device, TransportKind::Http)
    }
}

pub struct FakeTransport {
    device: String,
    kind: TransportKind,
    script: Script,
    calls: Arc<Mutex<Vec<Call>>>,
}

impl FakeTransport {
    fn record(&self, command: &str) {
        self.calls.lock().unwrap().push(Call {
            device: self.device.clone(),
            kind: self.kind,
            command: command.to_string(),
        });
    }
}

#[async_trait]
impl Transport for FakeTransport {
    fn kind(&self) -> TransportKind {
        self.kind
    }

    async fn execute(&self, command: &str) -> Result<String, TransportError> {
        self.record(command);
        self.script.execute.answer().await
    }

    async fn save_config(&self) -> Result<String, TransportError> {
        self.record("<save>");
        self.script.save.answer().await
    }

    async fn apply_config(&self, lines: &[String]) -> Result<String, TransportError> {
        for line in lines {
            self.record(line);
        }
        self.script.execute.answer().await
    }
}

/// Device with credentials, as it looks after credential resolution.
pub fn device(name: &str, host: &str, platform: &str) -> Device {
    let mut d = Device::new(name, host).with_platform(platform);
    d.username = Some("admin".into());
    d.password = Some("secret".into());
    d
}

/// ASA-class device with HTTPS management enabled.
pub fn asa(name: &str, host: &str) -> Device {
    let mut d = device(name, host, "cisco_asa");
    d.http_management = true;
    d
}

pub fn context(
    output_dir: &Path,
    probe: Arc<FakeProbe>,
    transports: Arc<FakeTransports>,
) -> StockpileContext {
    StockpileContext {
        output_dir: output_dir.to_path_buf(),
        backup_command: "more system:running-config".into(),
        proxy: None,
        probe_timeout: Duration::from_millis(100),
        prober: probe,
        transports,
    }
}
