//! Admin commands
//!
//! `iplimit reload | status | list | list <ip>`. Commands return the
//! lines to show the caller; the host decides how to deliver them.

use crate::gate::ConnectionGate;
use crate::network::address::normalize;
use crate::permissions::{PermissionProvider, ADMIN_PERMISSION};

/// Subcommand names offered for completion.
pub const SUBCOMMANDS: [&str; 3] = ["reload", "status", "list"];

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AdminError {
    #[error("You do not have permission to run this command!")]
    PermissionDenied,

    #[error("Failed to reload config: {0}")]
    Reload(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminCommand {
    Help,
    Reload,
    Status,
    List,
    ListAddress(String),
}

impl AdminCommand {
    /// Parse command arguments (without the `iplimit` prefix).
    /// Unknown or missing subcommands fall back to help.
    pub fn parse(args: &[&str]) -> Self {
        let Some(sub) = args.first() else {
            return AdminCommand::Help;
        };
        match sub.to_ascii_lowercase().as_str() {
            "reload" => AdminCommand::Reload,
            "status" => AdminCommand::Status,
            "list" => match args.get(1) {
                Some(addr) => AdminCommand::ListAddress(addr.to_string()),
                None => AdminCommand::List,
            },
            _ => AdminCommand::Help,
        }
    }

    /// Run the command as `caller`.
    pub fn execute<P: PermissionProvider>(
        &self,
        gate: &ConnectionGate<P>,
        caller: &str,
    ) -> Result<Vec<String>, AdminError> {
        if *self == AdminCommand::Help {
            return Ok(help_lines());
        }
        if !gate.permissions().has_permission(caller, ADMIN_PERMISSION) {
            tracing::warn!("[iplimit] [admin_denied] caller={} cmd={:?}", caller, self);
            return Err(AdminError::PermissionDenied);
        }

        match self {
            AdminCommand::Help => Ok(help_lines()),
            AdminCommand::Reload => {
                gate.config()
                    .reload()
                    .map_err(|e| AdminError::Reload(format!("{e:#}")))?;
                tracing::info!("[iplimit] [admin_reload] caller={}", caller);
                Ok(vec!["Configuration reloaded!".to_string()])
            }
            AdminCommand::Status => Ok(status_lines(gate)),
            AdminCommand::List => Ok(list_lines(gate)),
            AdminCommand::ListAddress(addr) => Ok(address_lines(gate, addr)),
        }
    }
}

fn help_lines() -> Vec<String> {
    vec![
        "===== IpLimit Help =====".to_string(),
        "/iplimit reload - reload the configuration".to_string(),
        "/iplimit status - show the current limit settings".to_string(),
        "/iplimit list - show every address and its online player count".to_string(),
        "/iplimit list <ip> - show the players online from one address".to_string(),
    ]
}

fn status_lines<P: PermissionProvider>(gate: &ConnectionGate<P>) -> Vec<String> {
    let cfg = gate.config().current();
    let registry = gate.registry();
    vec![
        "===== IpLimit Status =====".to_string(),
        format!("Max players per IP: {}", cfg.max_players_per_ip),
        format!("Bypass permission: {}", cfg.bypass_permission),
        format!("Debug: {}", if cfg.debug { "on" } else { "off" }),
        format!("Strict capacity: {}", if cfg.strict_capacity { "on" } else { "off" }),
        format!(
            "Tracked: {} address(es), {} player(s)",
            registry.address_count(),
            registry.session_count()
        ),
    ]
}

fn list_lines<P: PermissionProvider>(gate: &ConnectionGate<P>) -> Vec<String> {
    let mut counts: Vec<_> = gate.registry().snapshot_counts().into_iter().collect();
    let mut lines = vec!["===== IP Address List =====".to_string()];
    if counts.is_empty() {
        lines.push("No players online".to_string());
        return lines;
    }
    counts.sort();
    lines.extend(
        counts
            .into_iter()
            .map(|(key, n)| format!("{}: {} player(s)", key, n)),
    );
    lines
}

fn address_lines<P: PermissionProvider>(gate: &ConnectionGate<P>, addr: &str) -> Vec<String> {
    let key = normalize(addr);
    let mut players: Vec<_> = gate.registry().sessions_at(&key).into_iter().collect();
    let mut lines = vec![format!("===== Players online from {} =====", key)];
    if players.is_empty() {
        lines.push("No players online from this address".to_string());
        return lines;
    }
    players.sort();
    lines.extend(players);
    lines
}

/// Completion candidates for partially typed `args`. Callers without the
/// admin permission get none, since `list` completion reveals addresses.
pub fn suggest<P: PermissionProvider>(
    gate: &ConnectionGate<P>,
    caller: &str,
    args: &[&str],
) -> Vec<String> {
    if !gate.permissions().has_permission(caller, ADMIN_PERMISSION) {
        return Vec::new();
    }
    match args {
        [] => SUBCOMMANDS.iter().map(|s| s.to_string()).collect(),
        [partial] => {
            let partial = partial.to_ascii_lowercase();
            SUBCOMMANDS
                .iter()
                .filter(|s| s.starts_with(&partial))
                .map(|s| s.to_string())
                .collect()
        }
        [sub, partial] if sub.eq_ignore_ascii_case("list") => {
            let mut keys: Vec<_> = gate
                .registry()
                .snapshot_counts()
                .into_keys()
                .filter(|k| k.starts_with(partial))
                .collect();
            keys.sort();
            keys
        }
        _ => Vec::new(),
    }
}
