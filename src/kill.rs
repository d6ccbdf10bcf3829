use std::collections::HashSet;
use std::future::Future;
use std::io;
use std::str::FromStr;
use anyhow::{anyhow, Error, Result};
use libc::pid_t;
use log::{info, warn};
use crate::config::Config;
use crate::data::Protocol;
use crate::error::Failure;
use crate::exec::run;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Signal {
    Term,
    Kill,
}

impl Signal {
    pub fn name(self) -> &'static str {
        match self {
            Self::Term => "TERM",
            Self::Kill => "KILL",
        }
    }
}

impl Default for Signal {
    fn default() -> Self {
        Self::Term
    }
}

impl FromStr for Signal {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.to_ascii_uppercase();
        match name.trim_start_matches("SIG") {
            "TERM" | "15" => Ok(Self::Term),
            "KILL" | "9"  => Ok(Self::Kill),
            _             => Err(anyhow!("unsupported signal: {}", s)),
        }
    }
}

/// Signal every process listening on `port`. Returns how many signals
/// were actually delivered.
pub async fn terminate(cfg: &Config, port: u16, protocol: Protocol, signal: Signal) -> Result<usize> {
    let pids = owners(cfg, port, protocol).await?;

    let sent = signal_each(&pids, |pid| signal_pid(cfg, pid, signal)).await;

    info!("{}/{}: signalled {} of {} owners with {}", port, protocol, sent, pids.len(), signal.name());

    Ok(sent)
}

pub async fn owners(cfg: &Config, port: u16, protocol: Protocol) -> Result<Vec<pid_t>, Failure> {
    let filter = format!("-i{}:{}", protocol.as_str().to_ascii_uppercase(), port);
    let args   = match protocol {
        Protocol::Tcp => vec!["-nP", "-t", filter.as_str(), "-sTCP:LISTEN"],
        Protocol::Udp => vec!["-nP", "-t", filter.as_str()],
    };

    match run(&cfg.tools.lsof, &args, cfg.timeout).await {
        Ok(output)                     => Ok(parse_owners(&output)),
        Err(Failure::Exit(_, Some(1))) => Ok(Vec::new()),
        Err(e)                         => Err(e),
    }
}

/// One pid per line, first occurrence kept.
pub fn parse_owners(output: &str) -> Vec<pid_t> {
    let mut seen = HashSet::new();
    output.lines().filter_map(|line| {
        line.trim().parse::<pid_t>().ok()
    }).filter(|&pid| pid > 0 && seen.insert(pid)).collect()
}

/// Send to each pid in turn. A failed send is logged and skipped.
pub async fn signal_each<F, Fut>(pids: &[pid_t], mut send: F) -> usize
where
    F:   FnMut(pid_t) -> Fut,
    Fut: Future<Output = Result<(), Failure>>,
{
    let mut sent = 0;
    for &pid in pids {
        match send(pid).await {
            Ok(()) => sent += 1,
            Err(e) => warn!("signal {}: {}", pid, e),
        }
    }
    sent
}

/// Send `signal` to one pid. A failed send is only `RaceLost` when the
/// pid is gone; a live process we may not signal keeps the tool's exit.
pub async fn signal_pid(cfg: &Config, pid: pid_t, signal: Signal) -> Result<(), Failure> {
    let pid_s = pid.to_string();
    let args  = ["-s", signal.name(), pid_s.as_str()];
    match run(&cfg.tools.kill, &args, cfg.timeout).await {
        Ok(_)                               => Ok(()),
        Err(Failure::Exit(..)) if gone(pid) => Err(Failure::RaceLost(pid)),
        Err(e)                              => Err(e),
    }
}

// Signal 0 checks existence without delivering anything.
fn gone(pid: pid_t) -> bool {
    if pid <= 0 {
        return false;
    }
    let rc = unsafe { libc::kill(pid, 0) };
    rc == -1 && io::Error::last_os_error().raw_os_error() == Some(libc::ESRCH)
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use super::*;

    #[test]
    fn owners_deduplicated() {
        assert_eq!(parse_owners("123\n456\n123\n\nbogus\n0\n"), vec![123, 456]);
        assert!(parse_owners("").is_empty());
    }

    #[test]
    fn signal_names() {
        assert_eq!("SIGKILL".parse::<Signal>().unwrap(), Signal::Kill);
        assert_eq!("term".parse::<Signal>().unwrap(), Signal::Term);
        assert_eq!("9".parse::<Signal>().unwrap(), Signal::Kill);
        assert!("HUP".parse::<Signal>().is_err());
    }

    #[tokio::test]
    async fn no_owners_no_signals() {
        let calls = RefCell::new(0);
        let sent  = signal_each(&[], |_| {
            *calls.borrow_mut() += 1;
            async { Ok::<(), Failure>(()) }
        }).await;
        assert_eq!(sent, 0);
        assert_eq!(*calls.borrow(), 0);
    }

    #[tokio::test]
    async fn one_lost_race_does_not_stop_others() {
        let calls = RefCell::new(Vec::new());
        let sent  = signal_each(&[10, 20, 30], |pid| {
            calls.borrow_mut().push(pid);
            async move {
                match pid {
                    20 => Err(Failure::RaceLost(pid)),
                    _  => Ok(()),
                }
            }
        }).await;
        assert_eq!(sent, 2);
        assert_eq!(*calls.borrow(), vec![10, 20, 30]);
    }

    #[tokio::test]
    async fn stale_pid_via_kill_tool() {
        let mut cfg = Config::default();
        cfg.tools.kill = "false".to_owned();
        let res = signal_pid(&cfg, 999_999, Signal::Term).await;
        assert_eq!(res, Err(Failure::RaceLost(999_999)));
    }

    #[tokio::test]
    async fn live_pid_is_not_a_lost_race() {
        let mut cfg = Config::default();
        cfg.tools.kill = "false".to_owned();
        let res = signal_pid(&cfg, std::process::id() as pid_t, Signal::Term).await;
        assert_eq!(res, Err(Failure::Exit("false".to_owned(), Some(1))));
    }

    #[tokio::test]
    async fn terminate_without_owners_signals_nothing() {
        let mut cfg = Config::default();
        cfg.tools.kill = "false".to_owned();

        cfg.tools.lsof = "true".to_owned();
        assert_eq!(terminate(&cfg, 3000, Protocol::Tcp, Signal::Term).await.unwrap(), 0);

        cfg.tools.lsof = "false".to_owned();
        assert_eq!(terminate(&cfg, 3000, Protocol::Udp, Signal::Kill).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn missing_lsof_is_an_error() {
        let mut cfg = Config::default();
        cfg.tools.lsof = "/nonexistent/lsof".to_owned();
        assert!(terminate(&cfg, 3000, Protocol::Tcp, Signal::Term).await.is_err());
    }
}
