use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use anyhow::{anyhow, Result};
use env_logger::Builder;
use gumdrop::Options;
use log::{trace, warn, LevelFilter};
use portscope::config::Config;
use portscope::data::Protocol;
use portscope::kill::Signal;
use portscope::merge::Filter;
use portscope::sink::Sink;
use portscope::track::Tracker;

#[derive(Options)]
pub struct Args {
    #[options(help = "print help message")]
    help: bool,
    #[options(help = "output: table, json or json,pretty")]
    sink: Option<Sink>,
    #[options(help = "JSON file of extra display names")]
    names: Option<String>,
    #[options(help = "per-tool timeout in seconds")]
    timeout: Option<u64>,
    #[options(count, help = "more logging")]
    verbose: u32,
    #[options(command)]
    command: Option<Command>,
}

#[derive(Options)]
enum Command {
    #[options(help = "list listening sockets")]
    List(ListOpts),
    #[options(help = "poll and print every cycle")]
    Watch(WatchOpts),
    #[options(help = "list running containers")]
    Containers(HelpOpts),
    #[options(help = "signal the processes listening on ports")]
    Kill(KillOpts),
    #[options(help = "signal processes by pid")]
    Signal(SignalOpts),
    #[options(help = "start containers")]
    Start(IdOpts),
    #[options(help = "stop containers")]
    Stop(IdOpts),
    #[options(help = "restart containers")]
    Restart(IdOpts),
}

#[derive(Default, Options)]
struct ListOpts {
    #[options(help = "print help message")]
    help: bool,
    #[options(short = "s", help = "hide system and other users' processes")]
    hide_system: bool,
    #[options(free)]
    query: Vec<String>,
}

#[derive(Options)]
struct WatchOpts {
    #[options(help = "print help message")]
    help: bool,
    #[options(short = "s", help = "hide system and other users' processes")]
    hide_system: bool,
    #[options(help = "seconds between cycles")]
    interval: Option<u64>,
    #[options(free)]
    query: Vec<String>,
}

#[derive(Options)]
struct HelpOpts {
    #[options(help = "print help message")]
    help: bool,
}

#[derive(Options)]
struct KillOpts {
    #[options(help = "print help message")]
    help: bool,
    #[options(help = "udp instead of tcp")]
    udp: bool,
    #[options(help = "SIGKILL instead of SIGTERM")]
    force: bool,
    #[options(free)]
    ports: Vec<u16>,
}

#[derive(Options)]
struct SignalOpts {
    #[options(help = "print help message")]
    help: bool,
    #[options(help = "SIGKILL instead of SIGTERM")]
    force: bool,
    #[options(free)]
    pids: Vec<i32>,
}

#[derive(Options)]
struct IdOpts {
    #[options(help = "print help message")]
    help: bool,
    #[options(free)]
    ids: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse_args_default_or_exit();
    let sink = args.sink.unwrap_or_default();

    let mut builder = Builder::from_default_env();
    builder.filter(None, match args.verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    });
    builder.init();

    let mut config = Config::resolve();
    if let Some(path) = &args.names {
        config.load_names(Path::new(path))?;
    }
    if let Some(secs) = args.timeout {
        config.timeout = Duration::from_secs(secs);
    }
    trace!("{:?}", config);

    let tracker = Arc::new(Tracker::new(Arc::new(config)));
    let command = args.command.unwrap_or_else(|| Command::List(ListOpts::default()));

    match command {
        Command::List(opts)    => list(&tracker, sink, opts).await,
        Command::Watch(opts)   => watch(tracker, sink, opts).await,
        Command::Containers(_) => containers(&tracker, sink).await,
        Command::Kill(opts)    => kill(&tracker, opts).await,
        Command::Signal(opts)  => signal(&tracker, opts).await,
        Command::Start(opts)   => control(&tracker, "start", opts).await,
        Command::Stop(opts)    => control(&tracker, "stop", opts).await,
        Command::Restart(opts) => control(&tracker, "restart", opts).await,
    }
}

async fn list(tracker: &Tracker, sink: Sink, opts: ListOpts) -> Result<()> {
    let snapshot = tracker.refresh().await;
    let filter   = filter(opts.hide_system, &opts.query);
    let shown    = filter.apply(tracker.config(), &snapshot.listeners);

    let mut out = io::stdout();
    sink.listeners(&mut out, &shown)?;
    Ok(out.flush()?)
}

async fn watch(tracker: Arc<Tracker>, sink: Sink, opts: WatchOpts) -> Result<()> {
    let period = Duration::from_secs(opts.interval.unwrap_or(5).max(1));
    let filter = filter(opts.hide_system, &opts.query);

    let mut rx = tracker.subscribe();
    tracker.clone().spawn(period);

    while rx.changed().await.is_ok() {
        let snapshot = rx.borrow().clone();
        let shown    = filter.apply(tracker.config(), &snapshot.listeners);

        let mut out = io::stdout();
        sink.snapshot(&mut out, &snapshot, &shown)?;
        out.flush()?;
    }

    Ok(())
}

async fn containers(tracker: &Tracker, sink: Sink) -> Result<()> {
    let containers = match tracker.runtime().await {
        Some(runtime) => runtime.containers().await?,
        None          => {
            warn!("no container runtime available");
            Vec::new()
        }
    };

    let mut out = io::stdout();
    sink.containers(&mut out, &containers)?;
    Ok(out.flush()?)
}

async fn kill(tracker: &Tracker, opts: KillOpts) -> Result<()> {
    if opts.ports.is_empty() {
        return Err(anyhow!("no port given"));
    }

    let protocol = if opts.udp { Protocol::Udp } else { Protocol::Tcp };
    let signal   = if opts.force { Signal::Kill } else { Signal::Term };

    for port in opts.ports {
        let n = tracker.terminate(port, protocol, signal).await?;
        println!("{}/{}: signalled {}", port, protocol, n);
    }

    Ok(())
}

async fn signal(tracker: &Tracker, opts: SignalOpts) -> Result<()> {
    if opts.pids.is_empty() {
        return Err(anyhow!("no pid given"));
    }

    let signal = if opts.force { Signal::Kill } else { Signal::Term };

    for pid in opts.pids {
        tracker.terminate_pid(pid, signal).await?;
        println!("{}: sent SIG{}", pid, signal.name());
    }

    Ok(())
}

async fn control(tracker: &Tracker, verb: &str, opts: IdOpts) -> Result<()> {
    if opts.ids.is_empty() {
        return Err(anyhow!("no container given"));
    }

    let runtime = tracker.runtime().await.ok_or_else(|| {
        anyhow!("no container runtime available")
    })?;

    for id in &opts.ids {
        match verb {
            "start"   => runtime.start(id).await?,
            "stop"    => runtime.stop(id).await?,
            "restart" => runtime.restart(id).await?,
            _         => return Err(anyhow!("invalid action: {}", verb)),
        }
    }

    Ok(())
}

fn filter(hide_system: bool, query: &[String]) -> Filter {
    let query = match query.is_empty() {
        true  => None,
        false => Some(query.join(" ")),
    };
    Filter { hide_system, query }
}
