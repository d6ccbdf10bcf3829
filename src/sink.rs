use std::io::Write;
use std::str::FromStr;
use anyhow::{anyhow, Error, Result};
use serde::Serialize;
use crate::data::{Container, Listener, Snapshot};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Sink {
    Table,
    Json { pretty: bool },
}

impl Sink {
    pub fn listeners<W: Write>(&self, out: &mut W, listeners: &[&Listener]) -> Result<()> {
        match self {
            Self::Table           => listener_table(out, listeners)?,
            Self::Json { pretty } => json(out, listeners, *pretty)?,
        }
        Ok(())
    }

    pub fn containers<W: Write>(&self, out: &mut W, containers: &[Container]) -> Result<()> {
        match self {
            Self::Table           => container_table(out, containers)?,
            Self::Json { pretty } => json(out, containers, *pretty)?,
        }
        Ok(())
    }

    pub fn snapshot<W: Write>(&self, out: &mut W, snapshot: &Snapshot, listeners: &[&Listener]) -> Result<()> {
        match self {
            Self::Table => {
                writeln!(out, "# {} listeners on {}", listeners.len(), snapshot.hostname)?;
                listener_table(out, listeners)?;
                if !snapshot.containers.is_empty() {
                    writeln!(out)?;
                    container_table(out, &snapshot.containers)?;
                }
                if !snapshot.degraded.is_empty() {
                    writeln!(out, "# unknown: {}", snapshot.degraded.join(", "))?;
                }
            }
            Self::Json { pretty } => json(out, snapshot, *pretty)?,
        }
        Ok(())
    }
}

impl Default for Sink {
    fn default() -> Self {
        Self::Table
    }
}

impl FromStr for Sink {
    type Err = Error;

    fn from_str(arg: &str) -> Result<Self, Self::Err> {
        let mut split = arg.split(',');
        let sink = split.next().unwrap_or("");
        let opts = split.collect::<Vec<_>>();

        match (sink, opts.as_slice()) {
            ("table", [])         => Ok(Self::Table),
            ("json",  [])         => Ok(Self::Json { pretty: false }),
            ("json",  ["pretty"]) => Ok(Self::Json { pretty: true }),
            _                     => Err(anyhow!("invalid sink: {}", arg)),
        }
    }
}

fn json<W: Write, T: Serialize + ?Sized>(out: &mut W, value: &T, pretty: bool) -> Result<()> {
    match pretty {
        true  => serde_json::to_writer_pretty(&mut *out, value)?,
        false => serde_json::to_writer(&mut *out, value)?,
    }
    writeln!(out)?;
    Ok(())
}

fn listener_table<W: Write>(out: &mut W, listeners: &[&Listener]) -> Result<()> {
    writeln!(out, "{:<6} {:<5} {:<16} {:>7} {:<10} {:<24} {:>6} {:>9}  {}",
        "PORT", "PROTO", "ADDRESS", "PID", "USER", "NAME", "CPU%", "MEM", "CWD")?;

    for l in listeners {
        let cpu = l.cpu_percent.map(|c| format!("{:.1}", c)).unwrap_or_else(|| "-".into());
        let mem = l.memory_bytes.map(bytes).unwrap_or_else(|| "-".into());
        writeln!(out, "{:<6} {:<5} {:<16} {:>7} {:<10} {:<24} {:>6} {:>9}  {}",
            l.port,
            l.protocol,
            l.address,
            l.pid,
            l.user.as_deref().unwrap_or("-"),
            l.name(),
            cpu,
            mem,
            l.working_directory.as_deref().unwrap_or("-"),
        )?;
    }

    Ok(())
}

fn container_table<W: Write>(out: &mut W, containers: &[Container]) -> Result<()> {
    writeln!(out, "{:<12} {:<20} {:<24} {:>6} {:<20} {}",
        "ID", "NAME", "IMAGE", "CPU%", "STATUS", "PORTS")?;

    for c in containers {
        let ports = c.ports.iter().map(|p| match (&p.host_address, p.host_port) {
            (Some(addr), Some(host)) => format!("{}:{}->{}/{}", addr, host, p.container_port, p.protocol),
            (None, Some(host))       => format!("{}->{}/{}", host, p.container_port, p.protocol),
            _                        => format!("{}/{}", p.container_port, p.protocol),
        }).collect::<Vec<_>>().join(", ");
        let cpu = c.cpu_percent.map(|c| format!("{:.1}", c)).unwrap_or_else(|| "-".into());
        let id  = c.id.get(..12).unwrap_or(&c.id);

        writeln!(out, "{:<12} {:<20} {:<24} {:>6} {:<20} {}",
            id, c.name, c.image, cpu, c.status_text, ports)?;
    }

    Ok(())
}

fn bytes(n: u64) -> String {
    const UNITS: &[&str] = &["B", "K", "M", "G", "T"];
    let mut value = n as f64;
    let mut unit  = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit  += 1;
    }
    match unit {
        0 => format!("{}{}", n, UNITS[0]),
        _ => format!("{:.1}{}", value, UNITS[unit]),
    }
}
