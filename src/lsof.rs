use std::mem;
use libc::pid_t;
use log::debug;
use crate::addr;
use crate::config::Config;
use crate::data::{Listener, Protocol};
use crate::error::{Failure, Fetch};
use crate::exec::run;

/// Fields of one process as reported by `lsof -F`, before any of its
/// name tokens have been decoded.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawRecord {
    pub pid:     Option<pid_t>,
    pub command: Option<String>,
    pub uid:     Option<u32>,
    pub user:    Option<String>,
    pub names:   Vec<String>,
}

impl RawRecord {
    fn is_empty(&self) -> bool {
        self.pid.is_none() && self.command.is_none()
    }

    /// Listening sockets described by this record. Records without a pid
    /// or command, and name tokens that fail to decode, produce nothing.
    pub fn listeners(&self, protocol: Protocol) -> Vec<Listener> {
        let (pid, command) = match (self.pid, &self.command) {
            (Some(pid), Some(command)) => (pid, command),
            _                          => return Vec::new(),
        };

        self.names.iter().filter_map(|name| {
            let (address, port) = addr::decode(name)?;
            Some(Listener {
                pid:               pid,
                command_name:      command.clone(),
                user:              self.user.clone(),
                uid:               self.uid,
                address:           address,
                port:              port,
                protocol:          protocol,
                executable_path:   None,
                working_directory: None,
                command_line:      None,
                cpu_percent:       None,
                memory_bytes:      None,
                started_at:        None,
                display_name:      None,
            })
        }).collect()
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Tag {
    Pid,
    Command,
    Uid,
    User,
    Name,
}

impl Tag {
    fn from_char(c: char) -> Option<Self> {
        match c {
            'p' => Some(Self::Pid),
            'c' => Some(Self::Command),
            'u' => Some(Self::Uid),
            'L' => Some(Self::User),
            'n' => Some(Self::Name),
            _   => None,
        }
    }
}

/// Group tagged `lsof -F` lines into one record per `p` line.
pub fn parse(output: &str) -> Vec<RawRecord> {
    let mut records = Vec::new();
    let mut current = RawRecord::default();

    for line in output.lines() {
        let mut chars = line.chars();
        let tag = match chars.next().and_then(Tag::from_char) {
            Some(tag) => tag,
            None      => continue,
        };
        let value = chars.as_str();

        match tag {
            Tag::Pid     => {
                let done = mem::take(&mut current);
                if !done.is_empty() {
                    records.push(done);
                }
                current.pid = value.trim().parse().ok();
            }
            Tag::Command => current.command = Some(unescape(value)),
            Tag::Uid     => current.uid     = value.trim().parse().ok(),
            Tag::User    => current.user    = Some(value.to_owned()),
            Tag::Name    => current.names.push(value.to_owned()),
        }
    }

    if !current.is_empty() {
        records.push(current);
    }

    records
}

/// Listening sockets for one protocol. A failed or timed out lsof is
/// reported as such rather than as an empty host. lsof exits 1 without
/// output when nothing matches, which is an empty host.
pub async fn sockets(cfg: &Config, protocol: Protocol) -> Fetch<Vec<Listener>> {
    let args: &[&str] = match protocol {
        Protocol::Tcp => &["-nP", "-iTCP", "-sTCP:LISTEN", "-FpcuLn"],
        Protocol::Udp => &["-nP", "-iUDP", "-FpcuLn"],
    };

    match run(&cfg.tools.lsof, args, cfg.timeout).await {
        Ok(output) => {
            let listeners = parse(&output).iter().flat_map(|record| {
                record.listeners(protocol)
            }).collect::<Vec<_>>();
            debug!("{} {} listeners", listeners.len(), protocol);
            Fetch::Found(listeners)
        }
        Err(Failure::Exit(_, Some(1))) => {
            debug!("no {} listeners", protocol);
            Fetch::Found(Vec::new())
        }
        Err(e) => {
            debug!("{} enumeration failed: {}", protocol, e);
            Fetch::Failed(e)
        }
    }
}

// lsof escapes unprintable bytes in command names as \xNN.
fn unescape(value: &str) -> String {
    let mut out  = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(n) = rest.find("\\x") {
        out.push_str(&rest[..n]);
        let hex = rest.get(n + 2..n + 4);
        match hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
            Some(b) if b.is_ascii() => {
                out.push(b as char);
                rest = &rest[n + 4..];
            }
            _ => {
                out.push_str("\\x");
                rest = &rest[n + 2..];
            }
        }
    }
    out.push_str(rest);

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const TCP: &str = "\
p100
cnode
u501
Lalice
f23
n127.0.0.1:3000
f24
n[::1]:3000
p200
cGoogle\\x20Chrome\\x20H
u501
Lalice
f40
n*:9222
p300
cpostgres
u70
f5
n127.0.0.1:5432->127.0.0.1:50000
";

    #[test]
    fn one_record_per_pid_line() {
        let records = parse(TCP);
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].pid, Some(100));
        assert_eq!(records[0].names, vec!["127.0.0.1:3000", "[::1]:3000"]);
        assert_eq!(records[0].user.as_deref(), Some("alice"));
        assert_eq!(records[0].uid, Some(501));
        assert_eq!(records[1].command.as_deref(), Some("Google Chrome H"));
        assert_eq!(records[2].user, None);
    }

    #[test]
    fn final_flush_does_not_duplicate() {
        let records = parse("p1\ncx\nn*:1\n");
        assert_eq!(records.len(), 1);
        assert!(parse("").is_empty());
        assert!(parse("\n\n").is_empty());
    }

    #[test]
    fn unknown_tags_and_blanks_ignored() {
        let records = parse("\nz??\np9\ncsshd\nftxt\nPTCP\nn*:22\n\n");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].names, vec!["*:22"]);
    }

    #[test]
    fn leading_fields_without_pid_still_flushed() {
        let records = parse("corphan\np5\ncfoo\n");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].pid, None);
        assert_eq!(records[0].command.as_deref(), Some("orphan"));
        assert!(records[0].listeners(Protocol::Tcp).is_empty());
    }

    #[test]
    fn listeners_drop_connected_and_incomplete() {
        let records = parse(TCP);
        let all = records.iter().flat_map(|r| r.listeners(Protocol::Tcp)).collect::<Vec<_>>();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].address, "127.0.0.1");
        assert_eq!(all[1].address, "::1");
        assert_eq!(all[2].port, 9222);
        assert!(all.iter().all(|l| l.pid != 300));

        let nameless = RawRecord { pid: Some(1), ..RawRecord::default() };
        assert!(nameless.listeners(Protocol::Udp).is_empty());
    }

    #[tokio::test]
    async fn nothing_listening_is_not_a_failure() {
        let mut cfg = Config::default();
        cfg.tools.lsof = "false".to_owned();
        assert_eq!(sockets(&cfg, Protocol::Udp).await, Fetch::Found(Vec::new()));
        assert_eq!(sockets(&cfg, Protocol::Tcp).await, Fetch::Found(Vec::new()));
    }

    #[tokio::test]
    async fn missing_lsof_still_fails() {
        let mut cfg = Config::default();
        cfg.tools.lsof = "/nonexistent/lsof".to_owned();
        assert!(sockets(&cfg, Protocol::Tcp).await.is_failed());
    }

    #[test]
    fn unescape_leaves_bad_sequences() {
        assert_eq!(unescape("a\\x20b"), "a b");
        assert_eq!(unescape("a\\xZZ"), "a\\xZZ");
        assert_eq!(unescape("end\\x"), "end\\x");
    }
}
