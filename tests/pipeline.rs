use std::collections::HashMap;
use portscope::config::{Config, User};
use portscope::data::Protocol;
use portscope::docker;
use portscope::error::{Failure, Fetch};
use portscope::lsof;
use portscope::merge::{merge, Filter};
use portscope::names::NameTable;
use portscope::process::{self, Metadata};

const TCP: &str = "\
p100
cnode
u501
Lalice
f21
n*:3000
f22
n127.0.0.1:3000->127.0.0.1:61000
p200
cpostgres
u70
L_postgres
f5
n127.0.0.1:5432
f6
n[::1]:5432
";

const UDP: &str = "\
p100
cnode
u501
Lalice
f30
n*:3000
p300
cmDNSResp
u65
L_mdnsresponder
f4
n*:5353
f5
n*:*
";

fn base() -> Vec<portscope::data::Listener> {
    let tcp = lsof::parse(TCP).iter().flat_map(|r| r.listeners(Protocol::Tcp)).collect::<Vec<_>>();
    let udp = lsof::parse(UDP).iter().flat_map(|r| r.listeners(Protocol::Udp)).collect::<Vec<_>>();
    tcp.into_iter().chain(udp).collect()
}

fn metadata() -> HashMap<i32, Metadata> {
    let mut meta = HashMap::new();
    meta.insert(100, Metadata {
        cwd:     Fetch::Found("/Users/alice/web".to_owned()),
        command: process::parse_command("/opt/homebrew/bin/node dev.js   Tue Jan 14 23:01:59 2025").into(),
        usage:   process::parse_usage("3.2 51200").into(),
    });
    meta.insert(200, Metadata {
        cwd:     Fetch::Failed(Failure::Exit("lsof".to_owned(), Some(1))),
        command: process::parse_command("/usr/local/opt/postgresql/bin/postgres -D /usr/local/var/postgres").into(),
        usage:   Fetch::NotApplicable,
    });
    meta
}

#[test]
fn same_pid_on_tcp_and_udp() {
    let out  = merge(base(), &metadata(), &NameTable::default());
    let node = out.iter().filter(|l| l.pid == 100).collect::<Vec<_>>();

    assert_eq!(node.len(), 2);
    assert_eq!(node[0].port, 3000);
    assert_eq!(node[1].port, 3000);
    assert_ne!(node[0].protocol, node[1].protocol);

    for l in &node {
        assert_eq!(l.address, "*");
        assert_eq!(l.executable_path.as_deref(), Some("/opt/homebrew/bin/node"));
        assert_eq!(l.working_directory.as_deref(), Some("/Users/alice/web"));
        assert_eq!(l.started_at.as_deref(), Some("Tue Jan 14 23:01:59 2025"));
        assert_eq!(l.cpu_percent, Some(3.2));
        assert_eq!(l.memory_bytes, Some(51200 * 1024));
        assert_eq!(l.display_name.as_deref(), Some("Node.js"));
    }
}

#[test]
fn connected_and_unbound_tokens_never_listed() {
    let out = merge(base(), &metadata(), &NameTable::default());

    assert_eq!(out.len(), 5);
    assert!(out.iter().all(|l| l.port != 61000));

    let ports = out.iter().map(|l| l.port).collect::<Vec<_>>();
    let mut sorted = ports.clone();
    sorted.sort_unstable();
    assert_eq!(ports, sorted);
}

#[test]
fn partial_metadata_and_unknown_pids() {
    let out = merge(base(), &metadata(), &NameTable::default());

    let pg = out.iter().find(|l| l.pid == 200 && l.address == "::1").unwrap();
    assert_eq!(pg.working_directory, None);
    assert_eq!(pg.memory_bytes, None);
    assert_eq!(pg.started_at, None);
    assert_eq!(pg.command_line.as_deref(), Some("/usr/local/opt/postgresql/bin/postgres -D /usr/local/var/postgres"));
    assert_eq!(pg.display_name.as_deref(), Some("PostgreSQL"));

    let mdns = out.iter().find(|l| l.pid == 300).unwrap();
    assert_eq!(mdns.executable_path, None);
    assert_eq!(mdns.display_name.as_deref(), Some("mDNSResp"));
}

#[test]
fn hide_system_is_a_view() {
    let cfg = Config {
        user: User { name: Some("alice".to_owned()), uid: 501 },
        ..Config::default()
    };
    let out   = merge(base(), &metadata(), &NameTable::default());
    let shown = Filter { hide_system: true, query: None }.apply(&cfg, &out);

    assert_eq!(shown.len(), 2);
    assert!(shown.iter().all(|l| l.pid == 100));
    assert_eq!(out.len(), 5);
}

#[test]
fn containers_with_stats() {
    let ps = "\
4f2a9c1b7d3e\tpostgres:16\tdb\t0.0.0.0:5432->5432/tcp, :::5432->5432/tcp\tUp 3 hours
9b8e7d6c5a4f\tnginx:alpine\tproxy\t80/tcp, 0.0.0.0:8443->443/tcp\tUp 10 minutes (healthy)
";
    let stats = "db\t1.05%\t48.2MiB / 7.6GiB\nproxy\t0.00%\t3.1MiB / 7.6GiB\n";

    let mut containers = docker::parse_ps(ps);
    docker::merge_stats(&mut containers, &docker::parse_stats(stats));

    assert_eq!(containers.len(), 2);
    assert_eq!(containers[0].ports.len(), 2);
    assert_eq!(containers[0].ports[1].host_address.as_deref(), Some("::"));
    assert_eq!(containers[0].cpu_percent, Some(1.05));
    assert_eq!(containers[1].status_text, "Up 10 minutes (healthy)");
    assert_eq!(containers[1].ports[0].host_port, None);
    assert_eq!(containers[1].ports[1].host_port, Some(8443));
    assert_eq!(containers[1].memory_text.as_deref(), Some("3.1MiB / 7.6GiB"));
}
