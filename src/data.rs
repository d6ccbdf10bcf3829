use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::SystemTime;
use anyhow::{anyhow, Error};
use libc::pid_t;
use serde::Serialize;

#[derive(Copy, Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
}

impl Protocol {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Udp => "udp",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tcp" => Ok(Self::Tcp),
            "udp" => Ok(Self::Udp),
            _     => Err(anyhow!("invalid protocol: {}", s)),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Listener {
    pub pid:               pid_t,
    pub command_name:      String,
    pub user:              Option<String>,
    pub uid:               Option<u32>,
    pub address:           String,
    pub port:              u16,
    pub protocol:          Protocol,
    pub executable_path:   Option<String>,
    pub working_directory: Option<String>,
    pub command_line:      Option<String>,
    pub cpu_percent:       Option<f64>,
    pub memory_bytes:      Option<u64>,
    pub started_at:        Option<String>,
    pub display_name:      Option<String>,
}

#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ListenerKey {
    pub pid:      pid_t,
    pub address:  String,
    pub port:     u16,
    pub protocol: Protocol,
}

impl Listener {
    pub fn key(&self) -> ListenerKey {
        ListenerKey {
            pid:      self.pid,
            address:  self.address.clone(),
            port:     self.port,
            protocol: self.protocol,
        }
    }

    pub fn name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.command_name)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerPortMapping {
    pub host_address:   Option<String>,
    pub host_port:      Option<u16>,
    pub container_port: u16,
    pub protocol:       String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    pub id:          String,
    pub name:        String,
    pub image:       String,
    pub status_text: String,
    pub ports:       Vec<ContainerPortMapping>,
    pub cpu_percent: Option<f64>,
    pub memory_text: Option<String>,
}

/// One completed poll cycle, published as a unit.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub hostname:   Arc<String>,
    pub taken_at:   SystemTime,
    pub listeners:  Arc<Vec<Listener>>,
    pub containers: Arc<Vec<Container>>,
    pub runtime:    Option<String>,
    pub degraded:   Vec<String>,
}

impl Snapshot {
    pub fn empty(hostname: Arc<String>) -> Self {
        Self {
            hostname:   hostname,
            taken_at:   SystemTime::now(),
            listeners:  Arc::new(Vec::new()),
            containers: Arc::new(Vec::new()),
            runtime:    None,
            degraded:   Vec::new(),
        }
    }
}
