use std::collections::HashMap;
use std::time::Duration;
use anyhow::Result;
use log::{debug, info};
use crate::config::Config;
use crate::data::{Container, ContainerPortMapping};
use crate::error::{Failure, Fetch};
use crate::exec::run;

const PS_FORMAT:    &str = "{{.ID}}\t{{.Image}}\t{{.Names}}\t{{.Ports}}\t{{.Status}}";
const STATS_FORMAT: &str = "{{.Name}}\t{{.CPUPerc}}\t{{.MemUsage}}";

/// A container runtime client binary that answered a version probe.
#[derive(Clone, Debug, PartialEq)]
pub struct Runtime {
    pub path: String,
    timeout:  Duration,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Stats {
    pub cpu:    Option<f64>,
    pub memory: String,
}

impl Runtime {
    pub fn new(path: &str, timeout: Duration) -> Self {
        Self { path: path.to_owned(), timeout }
    }

    /// First candidate path that answers `--version` within the probe
    /// timeout.
    pub async fn discover(cfg: &Config) -> Option<Self> {
        for path in &cfg.runtimes {
            match run(path, &["--version"], cfg.probe).await {
                Ok(version) => {
                    debug!("container runtime {}: {}", path, version.trim());
                    return Some(Self::new(path, cfg.timeout));
                }
                Err(e) => debug!("runtime probe: {}", e),
            }
        }
        None
    }

    pub async fn containers(&self) -> Result<Vec<Container>, Failure> {
        let (ps, stats) = tokio::join!(self.ps(), self.stats());

        let mut containers = ps?;
        if let Fetch::Found(stats) = stats {
            merge_stats(&mut containers, &stats);
        }

        Ok(containers)
    }

    pub async fn ps(&self) -> Result<Vec<Container>, Failure> {
        let output = run(&self.path, &["ps", "--format", PS_FORMAT], self.timeout).await?;
        Ok(parse_ps(&output))
    }

    pub async fn stats(&self) -> Fetch<HashMap<String, Stats>> {
        let args = ["stats", "--no-stream", "--format", STATS_FORMAT];
        match run(&self.path, &args, self.timeout).await {
            Ok(output) => Fetch::Found(parse_stats(&output)),
            Err(e)     => {
                debug!("container stats unavailable: {}", e);
                Fetch::Failed(e)
            }
        }
    }

    pub async fn start(&self, id: &str) -> Result<()> {
        self.control("start", id).await
    }

    pub async fn stop(&self, id: &str) -> Result<()> {
        self.control("stop", id).await
    }

    pub async fn restart(&self, id: &str) -> Result<()> {
        self.control("restart", id).await
    }

    async fn control(&self, verb: &str, id: &str) -> Result<()> {
        run(&self.path, &[verb, id], self.timeout).await?;
        info!("{} {}", verb, id);
        Ok(())
    }
}

pub fn parse_ps(output: &str) -> Vec<Container> {
    output.lines().filter_map(|line| {
        let mut fields = line.splitn(5, '\t');
        let id     = fields.next()?.trim();
        let image  = fields.next()?.trim();
        let name   = fields.next()?.trim();
        let ports  = fields.next()?.trim();
        let status = fields.next().unwrap_or("").trim();

        if id.is_empty() {
            return None;
        }

        Some(Container {
            id:          id.to_owned(),
            name:        name.to_owned(),
            image:       image.to_owned(),
            status_text: status.to_owned(),
            ports:       parse_ports(ports),
            cpu_percent: None,
            memory_text: None,
        })
    }).collect()
}

/// Parse a published ports column such as
/// `0.0.0.0:8080->80/tcp, :::8080->80/tcp, 443/tcp`.
pub fn parse_ports(ports: &str) -> Vec<ContainerPortMapping> {
    ports.split(',').map(str::trim).filter(|s| !s.is_empty()).filter_map(parse_port).collect()
}

fn parse_port(entry: &str) -> Option<ContainerPortMapping> {
    let (host, inner) = match entry.find("->") {
        Some(n) => (Some(&entry[..n]), &entry[n + 2..]),
        None    => (None, entry),
    };

    let (port, protocol) = match inner.find('/') {
        Some(n) => (&inner[..n], &inner[n + 1..]),
        None    => (inner, "tcp"),
    };
    let container_port = port.trim().parse::<u16>().ok()?;

    let (host_address, host_port) = match host {
        Some(host) => match host.rfind(':') {
            Some(n) => (host_address(&host[..n]), host[n + 1..].parse().ok()),
            None    => (None, host.parse().ok()),
        },
        None => (None, None),
    };

    let protocol = match protocol.trim() {
        ""    => "tcp".to_owned(),
        proto => proto.to_ascii_lowercase(),
    };

    Some(ContainerPortMapping {
        host_address:   host_address,
        host_port:      host_port,
        container_port: container_port,
        protocol:       protocol,
    })
}

fn host_address(addr: &str) -> Option<String> {
    let addr = addr.trim().trim_start_matches('[').trim_end_matches(']');
    match addr {
        ""  => None,
        "*" => Some("0.0.0.0".to_owned()),
        _   => Some(addr.to_owned()),
    }
}

pub fn parse_stats(output: &str) -> HashMap<String, Stats> {
    output.lines().filter_map(|line| {
        let mut fields = line.splitn(3, '\t');
        let name   = fields.next()?.trim();
        let cpu    = fields.next()?.trim();
        let memory = fields.next().unwrap_or("").trim();

        if name.is_empty() {
            return None;
        }

        let cpu = cpu.trim_end_matches('%').trim().parse::<f64>().ok();
        Some((name.to_owned(), Stats { cpu, memory: memory.to_owned() }))
    }).collect()
}

pub fn merge_stats(containers: &mut [Container], stats: &HashMap<String, Stats>) {
    for container in containers {
        if let Some(stats) = stats.get(&container.name) {
            container.cpu_percent = stats.cpu;
            container.memory_text = match stats.memory.is_empty() {
                true  => None,
                false => Some(stats.memory.clone()),
            };
        }
    }
}
