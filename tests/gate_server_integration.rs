use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

use iplimit::config::{GateConfig, SharedConfig};
use iplimit::gate::ConnectionGate;
use iplimit::permissions::ConfigPermissions;
use iplimit::registry::SessionRegistry;
use iplimit::server::GateServer;

const LOCAL_KEY: &str = "127.0.0.1";

struct Client {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl Client {
    async fn connect(addr: std::net::SocketAddr) -> Self {
        let (r, w) = TcpStream::connect(addr).await.unwrap().into_split();
        Self {
            lines: BufReader::new(r).lines(),
            writer: w,
        }
    }

    async fn send(&mut self, line: &str) {
        self.writer.write_all(line.as_bytes()).await.unwrap();
        self.writer.write_all(b"\n").await.unwrap();
    }

    async fn recv(&mut self) -> Option<String> {
        tokio::time::timeout(Duration::from_secs(5), self.lines.next_line())
            .await
            .expect("timed out waiting for server")
            .unwrap_or(None)
    }

    /// Connect and wait for the greeting, i.e. until the pre-login check passed.
    async fn greeted(addr: std::net::SocketAddr) -> Self {
        let mut c = Self::connect(addr).await;
        assert_eq!(c.recv().await.as_deref(), Some("HELLO"));
        c
    }

    async fn login(addr: std::net::SocketAddr, name: &str) -> (Self, String) {
        let mut c = Self::connect(addr).await;
        let greeting = c.recv().await.unwrap_or_default();
        if greeting != "HELLO" {
            return (c, greeting);
        }
        c.send(&format!("LOGIN {}", name)).await;
        let reply = c.recv().await.unwrap_or_default();
        (c, reply)
    }
}

async fn start_test_server(config: GateConfig) -> (std::net::SocketAddr, Arc<SessionRegistry>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shared = Arc::new(SharedConfig::new(config));
    let registry = Arc::new(SessionRegistry::new());
    let gate = ConnectionGate::new(
        Arc::clone(&registry),
        Arc::clone(&shared),
        ConfigPermissions::new(shared),
    );
    let state = Arc::new(GateServer::new(gate));

    tokio::spawn(async move {
        let _ = GateServer::serve(state, listener).await;
    });

    (addr, registry)
}

fn test_config(max: u32) -> GateConfig {
    let mut config = GateConfig {
        max_players_per_ip: max,
        kick_message: "limit {max}".to_string(),
        ..GateConfig::default()
    };
    config
        .permissions
        .insert("Vip".into(), vec!["bypass".into()]);
    config
        .permissions
        .insert("Admin".into(), vec!["iplimit.admin".into()]);
    config
}

/// Poll until the registry reaches `expected` sessions at the loopback key.
async fn wait_for_occupancy(registry: &SessionRegistry, expected: usize) {
    for _ in 0..200 {
        if registry.occupancy(LOCAL_KEY) == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!(
        "occupancy stuck at {} (expected {})",
        registry.occupancy(LOCAL_KEY),
        expected
    );
}

#[tokio::test]
async fn test_connect_greeting() {
    let (addr, registry) = start_test_server(test_config(3)).await;
    let _c = Client::greeted(addr).await;
    assert_eq!(registry.occupancy(LOCAL_KEY), 0);
}

#[tokio::test]
async fn test_login_and_ping() {
    let (addr, registry) = start_test_server(test_config(3)).await;
    let (mut c, reply) = Client::login(addr, "Steve").await;
    assert_eq!(reply, "OK");
    assert_eq!(registry.occupancy(LOCAL_KEY), 1);

    c.send("PING").await;
    assert_eq!(c.recv().await.as_deref(), Some("PONG"));
}

#[tokio::test]
async fn test_prelogin_denies_when_full_then_recovers() {
    let (addr, registry) = start_test_server(test_config(2)).await;
    let (_a, ra) = Client::login(addr, "Alpha").await;
    let (b, rb) = Client::login(addr, "Bravo").await;
    assert_eq!((ra.as_str(), rb.as_str()), ("OK", "OK"));

    // Refused on arrival, before sending anything.
    let mut c = Client::connect(addr).await;
    assert_eq!(c.recv().await.as_deref(), Some("DENY limit 2"));
    assert_eq!(c.recv().await, None);
    assert_eq!(registry.occupancy(LOCAL_KEY), 2);

    drop(b);
    wait_for_occupancy(&registry, 1).await;

    let (_c, rc) = Client::login(addr, "Charlie").await;
    assert_eq!(rc, "OK");
    assert_eq!(registry.occupancy(LOCAL_KEY), 2);
}

#[tokio::test]
async fn test_bypass_permission_admitted_over_limit() {
    let (addr, registry) = start_test_server(test_config(1)).await;

    // Vip passes the pre-login check while the address is still empty,
    // but logs in only after it has filled up.
    let mut vip = Client::greeted(addr).await;
    let (_a, ra) = Client::login(addr, "Alpha").await;
    assert_eq!(ra, "OK");

    vip.send("LOGIN Vip").await;
    assert_eq!(vip.recv().await.as_deref(), Some("OK"));
    assert_eq!(registry.occupancy(LOCAL_KEY), 2);
}

#[tokio::test]
async fn test_login_recheck_denies_without_bypass() {
    let (addr, registry) = start_test_server(test_config(1)).await;

    let mut late = Client::greeted(addr).await;
    let (_a, ra) = Client::login(addr, "Alpha").await;
    assert_eq!(ra, "OK");

    late.send("LOGIN Bravo").await;
    assert_eq!(late.recv().await.as_deref(), Some("DENY limit 1"));
    assert_eq!(registry.occupancy(LOCAL_KEY), 1);
    assert!(!registry.sessions_at(LOCAL_KEY).contains("Bravo"));
}

#[tokio::test]
async fn test_quit_and_abort_release_slots() {
    let (addr, registry) = start_test_server(test_config(3)).await;
    let (mut a, _) = Client::login(addr, "Alpha").await;
    let (b, _) = Client::login(addr, "Bravo").await;
    wait_for_occupancy(&registry, 2).await;

    a.send("QUIT").await;
    assert_eq!(a.recv().await.as_deref(), Some("BYE"));
    wait_for_occupancy(&registry, 1).await;

    drop(b);
    wait_for_occupancy(&registry, 0).await;
    assert!(registry.snapshot_counts().is_empty());
}

#[tokio::test]
async fn test_abandoned_login_registers_nothing() {
    let (addr, registry) = start_test_server(test_config(1)).await;

    // Passed the pre-login check, then holds the connection open without
    // logging in while Alpha takes the only slot.
    let pending = Client::greeted(addr).await;
    let (_a, ra) = Client::login(addr, "Alpha").await;
    assert_eq!(ra, "OK");
    assert_eq!(registry.occupancy(LOCAL_KEY), 1);

    drop(pending);
    // Give the server time to see the EOF before checking nothing changed.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(registry.occupancy(LOCAL_KEY), 1);
    assert_eq!(
        registry.sessions_at(LOCAL_KEY).into_iter().collect::<Vec<_>>(),
        ["Alpha"]
    );
}

#[tokio::test]
async fn test_duplicate_name_rejected() {
    let (addr, registry) = start_test_server(test_config(3)).await;
    let (mut a, ra) = Client::login(addr, "Alpha").await;
    let (mut b, rb) = Client::login(addr, "Alpha").await;
    assert_eq!(ra, "OK");
    assert_eq!(rb, "DENY You are already logged in.");
    assert_eq!(b.recv().await, None);
    assert_eq!(registry.occupancy(LOCAL_KEY), 1);

    // The refused duplicate did not release the live session.
    a.send("PING").await;
    assert_eq!(a.recv().await.as_deref(), Some("PONG"));
    assert_eq!(registry.occupancy(LOCAL_KEY), 1);
}

#[tokio::test]
async fn test_invalid_login_line() {
    let (addr, registry) = start_test_server(test_config(3)).await;
    let (_c, reply) = Client::login(addr, "x").await;
    assert_eq!(reply, "ERR expected LOGIN <name>");
    assert_eq!(registry.occupancy(LOCAL_KEY), 0);
}

#[tokio::test]
async fn test_admin_list_over_the_wire() {
    let (addr, _registry) = start_test_server(test_config(3)).await;
    let (_p, _) = Client::login(addr, "Player").await;
    let (mut admin, reply) = Client::login(addr, "Admin").await;
    assert_eq!(reply, "OK");

    admin.send("IPLIMIT list").await;
    assert_eq!(admin.recv().await.as_deref(), Some("===== IP Address List ====="));
    assert_eq!(admin.recv().await.as_deref(), Some("127.0.0.1: 2 player(s)"));
    assert_eq!(admin.recv().await.as_deref(), Some("END"));

    admin.send("IPLIMIT list 127.0.0.1").await;
    assert_eq!(
        admin.recv().await.as_deref(),
        Some("===== Players online from 127.0.0.1 =====")
    );
    assert_eq!(admin.recv().await.as_deref(), Some("Admin"));
    assert_eq!(admin.recv().await.as_deref(), Some("Player"));
    assert_eq!(admin.recv().await.as_deref(), Some("END"));
}

#[tokio::test]
async fn test_admin_requires_permission() {
    let (addr, _registry) = start_test_server(test_config(3)).await;
    let (mut p, _) = Client::login(addr, "Player").await;
    p.send("IPLIMIT status").await;
    assert_eq!(
        p.recv().await.as_deref(),
        Some("ERR You do not have permission to run this command!")
    );

    p.send("SUGGEST li").await;
    assert_eq!(p.recv().await.as_deref(), Some("SUGGEST"));
    p.send("SUGGEST list 127").await;
    assert_eq!(p.recv().await.as_deref(), Some("SUGGEST"));
}

#[tokio::test]
async fn test_admin_suggestions() {
    let (addr, _registry) = start_test_server(test_config(3)).await;
    let (mut admin, reply) = Client::login(addr, "Admin").await;
    assert_eq!(reply, "OK");

    admin.send("SUGGEST li").await;
    assert_eq!(admin.recv().await.as_deref(), Some("SUGGEST list"));
    admin.send("SUGGEST list 127").await;
    assert_eq!(admin.recv().await.as_deref(), Some("SUGGEST 127.0.0.1"));
}
