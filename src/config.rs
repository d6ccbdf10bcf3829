use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;
use anyhow::{Context, Result};
use crate::names::NameTable;

pub const RUNTIMES: &[&str] = &[
    "/usr/local/bin/docker",
    "/opt/homebrew/bin/docker",
    "/usr/bin/docker",
    "/usr/local/bin/podman",
    "/usr/bin/podman",
];

pub const SYSTEM_PREFIXES: &[&str] = &[
    "/System/",
    "/usr/libexec/",
    "/usr/sbin/",
    "/sbin/",
];

/// Everything the pipeline would otherwise read from the ambient
/// environment. Resolved once at startup and shared by reference.
#[derive(Clone, Debug)]
pub struct Config {
    pub user:     User,
    pub tools:    Tools,
    pub timeout:  Duration,
    pub probe:    Duration,
    pub runtimes: Vec<String>,
    pub system:   System,
    pub names:    NameTable,
}

#[derive(Clone, Debug, Default)]
pub struct User {
    pub name: Option<String>,
    pub uid:  u32,
}

#[derive(Clone, Debug)]
pub struct Tools {
    pub lsof: String,
    pub ps:   String,
    pub kill: String,
}

#[derive(Clone, Debug)]
pub struct System {
    pub uid:      u32,
    pub prefixes: Vec<String>,
}

impl Config {
    pub fn resolve() -> Self {
        let uid  = unsafe { libc::getuid() };
        let name = env::var("USER").ok().filter(|name| !name.is_empty());
        Self {
            user: User { name, uid },
            ..Self::default()
        }
    }

    pub fn load_names(&mut self, path: &Path) -> Result<()> {
        let json = fs::read(path).with_context(|| {
            format!("reading name table {}", path.display())
        })?;
        self.names.extend(NameTable::from_json(&json)?);
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            user:     User::default(),
            tools:    Tools::default(),
            timeout:  Duration::from_secs(3),
            probe:    Duration::from_secs(1),
            runtimes: RUNTIMES.iter().map(|s| s.to_string()).collect(),
            system:   System::default(),
            names:    NameTable::default(),
        }
    }
}

impl Default for Tools {
    fn default() -> Self {
        Self {
            lsof: "lsof".to_owned(),
            ps:   "ps".to_owned(),
            kill: "kill".to_owned(),
        }
    }
}

impl Default for System {
    fn default() -> Self {
        Self {
            uid:      500,
            prefixes: SYSTEM_PREFIXES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use super::*;

    #[test]
    fn defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.timeout, Duration::from_secs(3));
        assert_eq!(cfg.runtimes.len(), RUNTIMES.len());
        assert_eq!(cfg.system.uid, 500);
        assert_eq!(cfg.tools.lsof, "lsof");
    }

    #[test]
    fn load_names_overrides_builtin() -> Result<()> {
        let path = env::temp_dir().join(format!("portscope-names-{}.json", std::process::id()));
        let mut file = fs::File::create(&path)?;
        file.write_all(br#"{"node": "Node Runtime", "myd": "My Daemon"}"#)?;
        drop(file);

        let mut cfg = Config::default();
        cfg.load_names(&path)?;
        fs::remove_file(&path)?;

        assert_eq!(cfg.names.get("node"), Some("Node Runtime"));
        assert_eq!(cfg.names.get("myd"), Some("My Daemon"));
        Ok(())
    }

    #[test]
    fn load_names_missing_file() {
        let mut cfg = Config::default();
        assert!(cfg.load_names(Path::new("/nonexistent/names.json")).is_err());
    }
}
