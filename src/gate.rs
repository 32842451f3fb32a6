//! Connection gate
//!
//! Drives one connection through the two admission checkpoints:
//!
//! 1. [`ConnectionGate::arrived`] runs before login, with no identity and
//!    therefore no bypass. It only reads occupancy.
//! 2. [`ConnectionGate::authenticated`] re-checks with the identity's
//!    bypass permission and registers the session on admit. An identity
//!    that is already online, from any address, is refused.
//!
//! The admitted session is an owned [`AdmittedSession`]; dropping it (or
//! passing it to [`ConnectionGate::disconnected`]) deregisters it exactly
//! once, whatever ended the connection. A [`PendingConnection`] that never
//! logs in holds nothing in the registry, so dropping it is free.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use crate::config::{GateConfig, SharedConfig};
use crate::network::address::{key_for_ip, normalize};
use crate::permissions::PermissionProvider;
use crate::policy::{decide, Verdict};
use crate::registry::{Registration, SessionRegistry};

/// Admission decisions go to `info` with `debug: true`, otherwise `debug`.
macro_rules! decision {
    ($debug:expr, $($arg:tt)+) => {
        if $debug {
            tracing::info!($($arg)+)
        } else {
            tracing::debug!($($arg)+)
        }
    };
}

/// Where a connection was turned away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Checkpoint {
    PreLogin,
    Login,
}

/// A connection refused by the gate. `Display` is the text for the client.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Denial {
    #[error("{message}")]
    AtCapacity {
        key: String,
        max: u32,
        checkpoint: Checkpoint,
        message: String,
    },

    /// Refused at login: `session_id` is already registered under `online_at`.
    #[error("You are already logged in.")]
    AlreadyOnline { session_id: String, online_at: String },

    /// Refused before login: the host could not resolve an address.
    #[error("Unable to determine your network address.")]
    MissingAddress,
}

impl Denial {
    pub fn checkpoint(&self) -> Checkpoint {
        match self {
            Denial::AtCapacity { checkpoint, .. } => *checkpoint,
            Denial::AlreadyOnline { .. } => Checkpoint::Login,
            Denial::MissingAddress => Checkpoint::PreLogin,
        }
    }
}

/// A connection that passed the pre-login check and is awaiting identity.
#[derive(Debug, PartialEq, Eq)]
pub struct PendingConnection {
    key: String,
}

impl PendingConnection {
    pub fn key(&self) -> &str {
        &self.key
    }
}

/// A registered session. Deregisters itself when dropped.
#[derive(Debug)]
pub struct AdmittedSession {
    key: String,
    session_id: String,
    registry: Arc<SessionRegistry>,
    config: Arc<SharedConfig>,
}

impl AdmittedSession {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

impl Drop for AdmittedSession {
    fn drop(&mut self) {
        self.registry.deregister(&self.key, &self.session_id);
        decision!(
            self.config.current().debug,
            "[iplimit] [disconnect] player={} ip={} online_from_ip={}",
            self.session_id,
            self.key,
            self.registry.occupancy(&self.key)
        );
    }
}

/// Admission control for one proxy instance.
pub struct ConnectionGate<P> {
    registry: Arc<SessionRegistry>,
    config: Arc<SharedConfig>,
    permissions: P,
}

impl<P: PermissionProvider> ConnectionGate<P> {
    pub fn new(registry: Arc<SessionRegistry>, config: Arc<SharedConfig>, permissions: P) -> Self {
        Self {
            registry,
            config,
            permissions,
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &Arc<SharedConfig> {
        &self.config
    }

    pub fn permissions(&self) -> &P {
        &self.permissions
    }

    /// Pre-login checkpoint for a raw textual address.
    ///
    /// `None` means the host could not resolve an address; such
    /// connections are refused since they could not be accounted for.
    pub fn arrived(&self, raw_address: Option<&str>) -> Result<PendingConnection, Denial> {
        let cfg = self.config.current();
        let Some(raw) = raw_address else {
            if cfg.debug {
                tracing::warn!("[iplimit] [missing_address] refusing connection with no address");
            } else {
                tracing::debug!("[iplimit] [missing_address] refusing connection with no address");
            }
            return Err(Denial::MissingAddress);
        };

        self.pre_check(normalize(raw), &cfg)
    }

    /// Pre-login checkpoint for a resolved peer address.
    pub fn arrived_from(&self, peer: &SocketAddr) -> Result<PendingConnection, Denial> {
        self.arrived_ip(peer.ip())
    }

    pub fn arrived_ip(&self, ip: IpAddr) -> Result<PendingConnection, Denial> {
        let cfg = self.config.current();
        self.pre_check(key_for_ip(ip), &cfg)
    }

    fn pre_check(&self, key: String, cfg: &GateConfig) -> Result<PendingConnection, Denial> {
        let max = cfg.max_players_per_ip;
        let occupancy = self.registry.occupancy(&key);

        match decide(occupancy, max, false) {
            Verdict::Admit => Ok(PendingConnection { key }),
            Verdict::Deny => {
                decision!(
                    cfg.debug,
                    "[iplimit] [deny_prelogin] ip={} online={} max={}",
                    key,
                    occupancy,
                    max
                );
                Err(Denial::AtCapacity {
                    message: cfg.kick_message_for(max),
                    key,
                    max,
                    checkpoint: Checkpoint::PreLogin,
                })
            }
        }
    }

    /// Login checkpoint: re-check with `identity`'s bypass permission and
    /// register the session on admit.
    pub fn authenticated(
        &self,
        pending: PendingConnection,
        identity: &str,
    ) -> Result<AdmittedSession, Denial> {
        let cfg = self.config.current();
        let max = cfg.max_players_per_ip;
        let key = pending.key;
        let bypass = self.permissions.has_permission(identity, &cfg.bypass_permission);

        let outcome = if cfg.strict_capacity {
            self.registry.try_register(&key, identity, max, bypass)
        } else if let Some(existing) = self.registry.key_of(identity) {
            Registration::AlreadyOnline(existing)
        } else {
            match decide(self.registry.occupancy(&key), max, bypass) {
                Verdict::Deny => Registration::AtCapacity,
                Verdict::Admit => {
                    if self.registry.register(&key, identity) {
                        Registration::Registered
                    } else {
                        // Lost a race with another login of the same identity.
                        let online_at = self.registry.key_of(identity).unwrap_or_default();
                        Registration::AlreadyOnline(online_at)
                    }
                }
            }
        };

        let occupancy = self.registry.occupancy(&key);
        match outcome {
            Registration::Registered => {}
            Registration::AtCapacity => {
                decision!(
                    cfg.debug,
                    "[iplimit] [deny_login] player={} ip={} online={} max={}",
                    identity,
                    key,
                    occupancy,
                    max
                );
                return Err(Denial::AtCapacity {
                    message: cfg.kick_message_for(max),
                    key,
                    max,
                    checkpoint: Checkpoint::Login,
                });
            }
            Registration::AlreadyOnline(online_at) => {
                decision!(
                    cfg.debug,
                    "[iplimit] [deny_duplicate] player={} ip={} online_at={}",
                    identity,
                    key,
                    online_at
                );
                return Err(Denial::AlreadyOnline {
                    session_id: identity.to_string(),
                    online_at,
                });
            }
        }

        // Occupancy now includes this session.
        if bypass && occupancy > max as usize {
            decision!(
                cfg.debug,
                "[iplimit] [bypass] player={} holds {} ip={}",
                identity,
                cfg.bypass_permission,
                key
            );
        }
        decision!(
            cfg.debug,
            "[iplimit] [connect] player={} ip={} online_from_ip={}",
            identity,
            key,
            occupancy
        );

        Ok(AdmittedSession {
            key,
            session_id: identity.to_string(),
            registry: Arc::clone(&self.registry),
            config: Arc::clone(&self.config),
        })
    }

    /// Disconnect for an admitted session. Equivalent to dropping it.
    pub fn disconnected(&self, session: AdmittedSession) {
        drop(session);
    }
}
