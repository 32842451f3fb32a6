//! Line-based TCP front door
//!
//! Adapts sockets to the gate's lifecycle:
//!
//! ```text
//! accept              -> arrived(peer)         HELLO | DENY <msg> + close
//! LOGIN <name>        -> authenticated(name)   OK | DENY <msg> + close
//!                                              (full, or name already online)
//! PING                -> PONG
//! IPLIMIT <args..>    -> admin command output, then END
//! SUGGEST <args..>    -> SUGGEST <candidates..>
//! QUIT / EOF / error  -> session dropped, which deregisters it
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};

use crate::admin::{suggest, AdminCommand};
use crate::gate::{ConnectionGate, Denial};
use crate::network::read_request_line;
use crate::permissions::PermissionProvider;

pub fn is_valid_name(s: &str) -> bool {
    (3..=16).contains(&s.len()) && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

pub struct GateServer<P> {
    gate: ConnectionGate<P>,
}

impl<P: PermissionProvider + 'static> GateServer<P> {
    pub fn new(gate: ConnectionGate<P>) -> Self {
        Self { gate }
    }

    pub fn gate(&self) -> &ConnectionGate<P> {
        &self.gate
    }

    pub async fn run(state: Arc<Self>, bind: &str) -> Result<()> {
        let listener = TcpListener::bind(bind)
            .await
            .with_context(|| format!("Cannot bind {}", bind))?;
        Self::serve(state, listener).await
    }

    /// Accept loop on an already bound listener.
    pub async fn serve(state: Arc<Self>, listener: TcpListener) -> Result<()> {
        tracing::info!("[iplimit] [started] listening on {}", listener.local_addr()?);
        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    tracing::warn!("[iplimit] [accept_failed] {}", e);
                    continue;
                }
            };
            let s = Arc::clone(&state);
            tokio::spawn(async move {
                Self::handle_new_connection(s, stream, peer).await;
            });
        }
    }

    pub async fn handle_new_connection(state: Arc<Self>, stream: TcpStream, peer: SocketAddr) {
        if let Err(e) = state.handle_client(stream, peer).await {
            tracing::debug!("[iplimit] [connection_error] peer={} {:#}", peer, e);
        }
    }

    async fn handle_client(&self, stream: TcpStream, peer: SocketAddr) -> Result<()> {
        let (read_half, mut writer) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        let pending = match self.gate.arrived_from(&peer) {
            Ok(p) => p,
            Err(denial) => return send_denial(&mut writer, &denial).await,
        };
        send(&mut writer, "HELLO").await?;

        // EOF before login: nothing was registered.
        let Some(line) = read_request_line(&mut reader).await? else {
            return Ok(());
        };
        let name = match line.split_once(' ') {
            Some(("LOGIN", name)) if is_valid_name(name) => name,
            _ => return send(&mut writer, "ERR expected LOGIN <name>").await,
        };
        // A name already online anywhere is refused by the gate.
        let session = match self.gate.authenticated(pending, name) {
            Ok(s) => s,
            Err(denial) => return send_denial(&mut writer, &denial).await,
        };
        send(&mut writer, "OK").await?;

        loop {
            let line = match read_request_line(&mut reader).await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    tracing::debug!("[iplimit] [read_error] player={} {:#}", name, e);
                    break;
                }
            };
            let mut words = line.split_whitespace();
            let cmd = words.next();
            let args: Vec<&str> = words.collect();
            match cmd {
                Some("PING") => send(&mut writer, "PONG").await?,
                Some("QUIT") => {
                    send(&mut writer, "BYE").await?;
                    break;
                }
                Some("IPLIMIT") => {
                    match AdminCommand::parse(&args).execute(&self.gate, session.session_id()) {
                        Ok(lines) => {
                            for l in lines {
                                send(&mut writer, &l).await?;
                            }
                            send(&mut writer, "END").await?;
                        }
                        Err(e) => send(&mut writer, &format!("ERR {}", e)).await?,
                    }
                }
                Some("SUGGEST") => {
                    let mut reply = String::from("SUGGEST");
                    for candidate in suggest(&self.gate, session.session_id(), &args) {
                        reply.push(' ');
                        reply.push_str(&candidate);
                    }
                    send(&mut writer, &reply).await?;
                }
                _ => send(&mut writer, "ERR unknown command").await?,
            }
        }

        self.gate.disconnected(session);
        Ok(())
    }
}

async fn send(writer: &mut OwnedWriteHalf, line: &str) -> Result<()> {
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    Ok(())
}

async fn send_denial(writer: &mut OwnedWriteHalf, denial: &Denial) -> Result<()> {
    let msg = denial.to_string().replace('\n', " ");
    send(writer, &format!("DENY {}", msg)).await?;
    writer.shutdown().await?;
    Ok(())
}
