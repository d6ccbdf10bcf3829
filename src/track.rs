use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use anyhow::Result;
use libc::pid_t;
use log::{debug, error, info, warn};
use parking_lot::RwLock;
use tokio::sync::{watch, Mutex};
use tokio::time::interval;
use crate::config::Config;
use crate::data::{Container, Listener, Protocol, Snapshot};
use crate::docker::Runtime;
use crate::error::Fetch;
use crate::kill::{self, Signal};
use crate::lsof;
use crate::merge::merge;
use crate::process::Metadata;

/// Headless poller. Each refresh builds a fresh snapshot and publishes
/// it with a single swap; refreshes never overlap.
pub struct Tracker {
    config:   Arc<Config>,
    hostname: Arc<String>,
    current:  RwLock<Arc<Snapshot>>,
    cycle:    Mutex<()>,
    notify:   watch::Sender<Arc<Snapshot>>,
}

impl Tracker {
    pub fn new(config: Arc<Config>) -> Self {
        let hostname = hostname::get().ok().and_then(|h| h.into_string().ok());
        let hostname = Arc::new(hostname.unwrap_or_default());
        let empty    = Arc::new(Snapshot::empty(hostname.clone()));
        let current  = RwLock::new(empty.clone());
        let cycle    = Mutex::new(());
        let notify   = watch::channel(empty).0;
        Self { config, hostname, current, cycle, notify }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn spawn(self: Arc<Self>, period: Duration) {
        spawn(self.poll(period));
    }

    /// Receiver that wakes after every published cycle.
    pub fn subscribe(&self) -> watch::Receiver<Arc<Snapshot>> {
        self.notify.subscribe()
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.current.read().clone()
    }

    pub fn current_listeners(&self) -> Arc<Vec<Listener>> {
        self.current.read().listeners.clone()
    }

    pub fn current_containers(&self) -> Arc<Vec<Container>> {
        self.current.read().containers.clone()
    }

    pub async fn refresh(&self) -> Arc<Snapshot> {
        let _cycle   = self.cycle.lock().await;
        let snapshot = Arc::new(cycle(self.config.clone(), self.hostname.clone()).await);

        info!("{} listeners, {} containers", snapshot.listeners.len(), snapshot.containers.len());

        *self.current.write() = snapshot.clone();
        self.notify.send_replace(snapshot.clone());
        snapshot
    }

    pub async fn terminate(&self, port: u16, protocol: Protocol, signal: Signal) -> Result<usize> {
        kill::terminate(&self.config, port, protocol, signal).await
    }

    pub async fn terminate_pid(&self, pid: pid_t, signal: Signal) -> Result<()> {
        kill::signal_pid(&self.config, pid, signal).await?;
        Ok(())
    }

    pub async fn runtime(&self) -> Option<Runtime> {
        Runtime::discover(&self.config).await
    }

    async fn poll(self: Arc<Self>, period: Duration) -> Result<()> {
        let mut interval = interval(period);

        loop {
            interval.tick().await;
            let snapshot = self.refresh().await;
            if !snapshot.degraded.is_empty() {
                debug!("degraded sources: {:?}", snapshot.degraded);
            }
        }
    }
}

/// Run one complete poll: host listeners and containers side by side.
pub async fn cycle(cfg: Arc<Config>, hostname: Arc<String>) -> Snapshot {
    let ((listeners, mut degraded), (containers, runtime, failed)) = tokio::join!(
        listeners(cfg.clone()),
        containers(&cfg),
    );

    if failed {
        degraded.push("containers".to_owned());
    }

    Snapshot {
        hostname:   hostname,
        taken_at:   SystemTime::now(),
        listeners:  Arc::new(listeners),
        containers: Arc::new(containers),
        runtime:    runtime,
        degraded:   degraded,
    }
}

pub async fn listeners(cfg: Arc<Config>) -> (Vec<Listener>, Vec<String>) {
    let (tcp, udp) = tokio::join!(
        lsof::sockets(&cfg, Protocol::Tcp),
        lsof::sockets(&cfg, Protocol::Udp),
    );

    let mut base     = Vec::new();
    let mut degraded = Vec::new();

    for (protocol, found) in vec![(Protocol::Tcp, tcp), (Protocol::Udp, udp)] {
        match found {
            Fetch::Found(listeners) => base.extend(listeners),
            Fetch::NotApplicable    => (),
            Fetch::Failed(e)        => {
                warn!("{} listeners unknown: {}", protocol, e);
                degraded.push(protocol.to_string());
            }
        }
    }

    let pids = base.iter().map(|l| l.pid).collect::<BTreeSet<_>>();
    let meta = metadata(&cfg, pids).await;

    (merge(base, &meta, &cfg.names), degraded)
}

async fn metadata(cfg: &Arc<Config>, pids: BTreeSet<pid_t>) -> HashMap<pid_t, Metadata> {
    let tasks = pids.into_iter().map(|pid| {
        let cfg = cfg.clone();
        tokio::spawn(async move {
            (pid, Metadata::fetch(&cfg, pid).await)
        })
    }).collect::<Vec<_>>();

    let mut meta = HashMap::with_capacity(tasks.len());
    for task in tasks {
        match task.await {
            Ok((pid, m)) => {
                meta.insert(pid, m);
            }
            Err(e) => error!("metadata task failed: {:?}", e),
        }
    }
    meta
}

async fn containers(cfg: &Config) -> (Vec<Container>, Option<String>, bool) {
    let runtime = match Runtime::discover(cfg).await {
        Some(runtime) => runtime,
        None          => {
            debug!("no container runtime available");
            return (Vec::new(), None, false);
        }
    };

    match runtime.containers().await {
        Ok(containers) => (containers, Some(runtime.path), false),
        Err(e)         => {
            warn!("containers unknown: {}", e);
            (Vec::new(), Some(runtime.path), true)
        }
    }
}

fn spawn<F: Future<Output = Result<()>> + Send + 'static>(task: F) {
    tokio::spawn(async move {
        match task.await {
            Ok(()) => debug!("task finished"),
            Err(e) => error!("task failed: {:?}", e),
        }
    });
}
