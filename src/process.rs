use libc::pid_t;
use log::debug;
use regex::Regex;
use crate::config::Config;
use crate::error::{Failure, Fetch};
use crate::exec::run;

// ps lstart, e.g. "Mon Oct  7 09:15:02 2024", anchored at end of line.
const LSTART: &str = r"^(.*?)\s+([A-Z][a-z]{2} [A-Z][a-z]{2} +\d{1,2} \d{2}:\d{2}:\d{2} \d{4})\s*$";

#[derive(Clone, Debug, PartialEq)]
pub struct CommandLine {
    pub full:    String,
    pub exe:     String,
    pub args:    String,
    pub started: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Usage {
    pub cpu: f64,
    pub rss: u64,
}

/// Everything known about one process beyond what lsof reported. Each
/// part is fetched independently and may be missing on its own.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Metadata {
    pub cwd:     Fetch<String>,
    pub command: Fetch<CommandLine>,
    pub usage:   Fetch<Usage>,
}

impl Metadata {
    pub async fn fetch(cfg: &Config, pid: pid_t) -> Self {
        let (cwd, command, usage) = tokio::join!(
            cwd(cfg, pid),
            command(cfg, pid),
            usage(cfg, pid),
        );

        for (what, failed) in &[
            ("cwd",     cwd.is_failed()),
            ("command", command.is_failed()),
            ("usage",   usage.is_failed()),
        ] {
            if *failed {
                debug!("pid {}: {} unknown", pid, what);
            }
        }

        Self { cwd, command, usage }
    }
}

pub async fn cwd(cfg: &Config, pid: pid_t) -> Fetch<String> {
    let pid  = pid.to_string();
    let args = ["-a", "-p", pid.as_str(), "-d", "cwd", "-Fn"];
    match run(&cfg.tools.lsof, &args, cfg.timeout).await {
        Ok(output) => parse_cwd(&output).into(),
        Err(e)     => Fetch::Failed(e),
    }
}

pub async fn command(cfg: &Config, pid: pid_t) -> Fetch<CommandLine> {
    let pid  = pid.to_string();
    let args = ["-ww", "-p", pid.as_str(), "-o", "command=", "-o", "lstart="];
    match run(&cfg.tools.ps, &args, cfg.timeout).await {
        Ok(output) => parse_command(&output).into(),
        Err(e)     => Fetch::Failed(e),
    }
}

pub async fn usage(cfg: &Config, pid: pid_t) -> Fetch<Usage> {
    let pid  = pid.to_string();
    let args = ["-p", pid.as_str(), "-o", "%cpu=", "-o", "rss="];
    match run(&cfg.tools.ps, &args, cfg.timeout).await {
        Ok(output) if output.trim().is_empty() => Fetch::NotApplicable,
        Ok(output) => match parse_usage(&output) {
            Some(usage) => Fetch::Found(usage),
            None        => Fetch::Failed(Failure::Parse(output)),
        },
        Err(e) => Fetch::Failed(e),
    }
}

pub fn parse_cwd(output: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let path = line.strip_prefix('n')?;
        match path.is_empty() {
            true  => None,
            false => Some(path.to_owned()),
        }
    })
}

/// Split `ps` output of the form `<exe> <args>  <lstart>` into its parts.
/// Without a recognizable start time the whole line is the command.
pub fn parse_command(output: &str) -> Option<CommandLine> {
    let line = output.lines().map(str::trim).find(|line| !line.is_empty())?;

    let (full, started) = match Regex::new(LSTART).ok().and_then(|re| re.captures(line)) {
        Some(caps) => {
            let full    = caps.get(1).map_or("", |m| m.as_str()).trim();
            let started = caps.get(2).map(|m| m.as_str().to_owned());
            (full, started)
        }
        None => (line, None),
    };

    let mut split = full.splitn(2, char::is_whitespace);
    let exe  = split.next().unwrap_or("").to_owned();
    let args = split.next().unwrap_or("").trim_start().to_owned();

    Some(CommandLine {
        full:    full.to_owned(),
        exe:     exe,
        args:    args,
        started: started,
    })
}

/// `%cpu` and `rss` columns; rss is reported in KiB.
pub fn parse_usage(output: &str) -> Option<Usage> {
    let mut fields = output.split_whitespace();
    let cpu = fields.next()?.replace(',', ".").parse::<f64>().ok()?;
    let rss = fields.next()?.parse::<u64>().ok()?;
    Some(Usage {
        cpu: cpu.max(0.0),
        rss: rss.checked_mul(1024)?,
    })
}
