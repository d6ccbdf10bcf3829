use std::collections::HashMap;
use anyhow::Result;

const SHORT: usize = 15;

// lsof and ps truncate command names; these are the forms seen in practice.
const BUILTIN: &[(&str, &str)] = &[
    ("AirPlayXP",       "AirPlay Receiver"),
    ("beam.smp",        "Erlang VM"),
    ("Code",            "Visual Studio Code"),
    ("Code Helper",     "Visual Studio Code"),
    ("com.docke",       "Docker"),
    ("com.docker",      "Docker"),
    ("ControlCe",       "Control Center"),
    ("ControlCenter",   "Control Center"),
    ("docker-pr",       "Docker Proxy"),
    ("docker-proxy",    "Docker Proxy"),
    ("dotnet",          ".NET"),
    ("Dropbox",         "Dropbox"),
    ("figma_age",       "Figma Agent"),
    ("Google",          "Google Chrome"),
    ("Google Chrome H", "Google Chrome"),
    ("httpd",           "Apache HTTP Server"),
    ("identitys",       "Identity Services"),
    ("java",            "Java"),
    ("mongod",          "MongoDB"),
    ("mysqld",          "MySQL"),
    ("nginx",           "Nginx"),
    ("node",            "Node.js"),
    ("postgres",        "PostgreSQL"),
    ("rapportd",        "Rapport Daemon"),
    ("redis-ser",       "Redis"),
    ("redis-server",    "Redis"),
    ("sharingd",        "Sharing Daemon"),
    ("Slack",           "Slack"),
    ("Slack Help",      "Slack"),
    ("Spotify",         "Spotify"),
    ("UserEvent",       "User Event Agent"),
    ("WiFiAgent",       "Wi-Fi Agent"),
];

/// Lookup from truncated command names to product names.
#[derive(Clone, Debug)]
pub struct NameTable {
    table: HashMap<String, String>,
}

impl NameTable {
    pub fn empty() -> Self {
        Self { table: HashMap::new() }
    }

    pub fn from_json(json: &[u8]) -> Result<Self> {
        let table = serde_json::from_slice::<HashMap<String, String>>(json)?;
        Ok(Self { table })
    }

    pub fn extend(&mut self, other: NameTable) {
        self.table.extend(other.table);
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.table.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Pick a friendly name for a process. Prefers the program named by
    /// the full command line, then the executable path, then the raw
    /// command name; short results are looked up in the table.
    pub fn resolve(&self, command: &str, exe: Option<&str>, full: Option<&str>) -> String {
        let name = full.and_then(program)
            .or_else(|| exe.and_then(program))
            .unwrap_or(command);

        if name.chars().count() <= SHORT && !name.contains('/') {
            if let Some(friendly) = self.get(name) {
                return friendly.to_owned();
            }
        }

        name.to_owned()
    }
}

impl Default for NameTable {
    fn default() -> Self {
        let table = BUILTIN.iter().map(|(short, full)| {
            (short.to_string(), full.to_string())
        }).collect();
        Self { table }
    }
}

// Bundle executables live under `<Name>.app/Contents/MacOS/` and may
// contain spaces; anything else ends at the first whitespace. A bundle
// path that only shows up in the arguments does not count.
fn program(line: &str) -> Option<&str> {
    let bundle = line.find(".app/Contents/MacOS/").map(|n| &line[..n]).filter(|path| {
        !path.contains(" /") && !path.contains(" -")
    });
    let path = match bundle {
        Some(path) => path,
        None       => line.split_whitespace().next()?,
    };
    let name = path.rsplit('/').next()?;
    match name.is_empty() {
        true  => None,
        false => Some(name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_name_when_nothing_else_known() {
        let names = NameTable::default();
        assert_eq!(names.resolve("mysqld", None, None), "MySQL");
        assert_eq!(names.resolve("unknownd", None, None), "unknownd");
    }

    #[test]
    fn full_command_beats_exe_and_raw() {
        let names = NameTable::default();
        let full  = "/usr/local/bin/redis-server *:6379";
        assert_eq!(names.resolve("redis-ser", Some("/opt/other"), Some(full)), "Redis");
        assert_eq!(names.resolve("redis-ser", Some("/opt/bin/rustd"), None), "rustd");
    }

    #[test]
    fn app_bundle_name() {
        let names = NameTable::default();
        let full  = "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome --type=renderer";
        assert_eq!(names.resolve("Google", None, Some(full)), "Google Chrome");
    }

    #[test]
    fn bundle_paths_in_arguments_ignored() {
        let names = NameTable::default();
        let full  = "/usr/local/bin/node /Users/alice/my.app/server.js";
        assert_eq!(names.resolve("node", Some("/usr/local/bin/node"), Some(full)), "Node.js");

        let full  = "/usr/local/bin/node --inspect /Users/alice/Tool.app/Contents/MacOS/tool";
        assert_eq!(names.resolve("node", None, Some(full)), "Node.js");

        let full  = "/usr/local/bin/node /Users/alice/Tool.app/Contents/MacOS/tool";
        assert_eq!(names.resolve("node", None, Some(full)), "Node.js");
    }

    #[test]
    fn long_names_skip_table() {
        let mut names = NameTable::empty();
        names.extend(NameTable::from_json(br#"{"a-very-long-daemon-name": "Nope"}"#).unwrap());
        assert_eq!(names.resolve("a-very-long-daemon-name", None, None), "a-very-long-daemon-name");
    }

    #[test]
    fn resolve_is_deterministic() {
        let names = NameTable::default();
        let a = names.resolve("node", Some("/usr/bin/node"), Some("/usr/bin/node app.js"));
        let b = names.resolve("node", Some("/usr/bin/node"), Some("/usr/bin/node app.js"));
        assert_eq!(a, b);
        assert_eq!(a, "Node.js");
    }

    #[test]
    fn bad_json_rejected() {
        assert!(NameTable::from_json(b"[1, 2]").is_err());
    }
}
