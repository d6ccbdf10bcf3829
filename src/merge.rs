use std::collections::HashMap;
use libc::pid_t;
use crate::config::Config;
use crate::data::{Listener, ListenerKey};
use crate::names::NameTable;
use crate::process::Metadata;

/// Attach per-process metadata to each socket, collapse duplicate
/// observations of the same socket and order the result by port.
pub fn merge(base: Vec<Listener>, meta: &HashMap<pid_t, Metadata>, names: &NameTable) -> Vec<Listener> {
    let mut index = HashMap::<ListenerKey, usize>::with_capacity(base.len());
    let mut out   = Vec::<Listener>::with_capacity(base.len());

    for listener in base {
        let found    = meta.get(&listener.pid);
        let listener = enrich(listener, found, names);
        match index.get(&listener.key()) {
            Some(&n) => out[n] = listener,
            None     => {
                index.insert(listener.key(), out.len());
                out.push(listener);
            }
        }
    }

    out.sort_by_key(|l| l.port);
    out
}

pub fn enrich(base: Listener, meta: Option<&Metadata>, names: &NameTable) -> Listener {
    let meta    = meta.cloned().unwrap_or_default();
    let command = meta.command.ok();
    let usage   = meta.usage.ok();

    let exe  = command.as_ref().map(|c| c.exe.as_str()).filter(|s| !s.is_empty());
    let full = command.as_ref().map(|c| c.full.as_str()).filter(|s| !s.is_empty());
    let display_name = names.resolve(&base.command_name, exe, full);

    Listener {
        executable_path:   exe.map(str::to_owned),
        working_directory: meta.cwd.ok(),
        command_line:      full.map(str::to_owned),
        cpu_percent:       usage.as_ref().map(|u| u.cpu),
        memory_bytes:      usage.as_ref().map(|u| u.rss),
        started_at:        command.as_ref().and_then(|c| c.started.clone()),
        display_name:      Some(display_name),
        ..base
    }
}

/// Presentation filter over a published listener list. Never changes the
/// list itself.
#[derive(Clone, Debug, Default)]
pub struct Filter {
    pub hide_system: bool,
    pub query:       Option<String>,
}

impl Filter {
    pub fn apply<'a>(&self, cfg: &Config, listeners: &'a [Listener]) -> Vec<&'a Listener> {
        let query = self.query.as_ref().map(|q| q.to_lowercase());
        listeners.iter().filter(|l| {
            !(self.hide_system && is_system(cfg, l))
        }).filter(|l| match &query {
            Some(q) => matches(l, q),
            None    => true,
        }).collect()
    }
}

pub fn is_system(cfg: &Config, listener: &Listener) -> bool {
    let low_uid = listener.uid.map_or(false, |uid| uid < cfg.system.uid);

    let other_user = match (&listener.user, &cfg.user.name, listener.uid) {
        (Some(user), Some(me), _) => user != me,
        (_, _, Some(uid))         => uid != cfg.user.uid,
        _                         => false,
    };

    let system_path = listener.executable_path.as_ref().map_or(false, |exe| {
        cfg.system.prefixes.iter().any(|prefix| exe.starts_with(prefix.as_str()))
    });

    low_uid || other_user || system_path
}

fn matches(listener: &Listener, query: &str) -> bool {
    listener.port.to_string().contains(query)
        || listener.pid.to_string().contains(query)
        || listener.command_name.to_lowercase().contains(query)
        || listener.name().to_lowercase().contains(query)
}
