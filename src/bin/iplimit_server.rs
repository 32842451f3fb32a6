use std::sync::Arc;
use anyhow::Result;
use iplimit::config::SharedConfig;
use iplimit::gate::ConnectionGate;
use iplimit::permissions::ConfigPermissions;
use iplimit::registry::SessionRegistry;
use iplimit::server::GateServer;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_ansi(std::io::IsTerminal::is_terminal(&std::io::stderr()))
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut conf_file = "conf/iplimit.yaml".to_string();
    let mut bind = "0.0.0.0:25577".to_string();

    let args: Vec<String> = std::env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "--h" | "--?" | "/?" => {
                println!("Usage: iplimit_server [--conf FILE] [--bind ADDR]");
                return Ok(());
            }
            "--conf" => {
                if i + 1 < args.len() {
                    i += 1;
                    conf_file = args[i].clone();
                } else {
                    eprintln!("Error: --conf requires a FILE argument");
                    return Ok(());
                }
            }
            "--bind" => {
                if i + 1 < args.len() {
                    i += 1;
                    bind = args[i].clone();
                } else {
                    eprintln!("Error: --bind requires an ADDR argument");
                    return Ok(());
                }
            }
            _ => {}
        }
        i += 1;
    }

    let config = Arc::new(SharedConfig::load(&conf_file)?);
    tracing::info!(
        "[iplimit] [loaded] max {} player(s) per IP address",
        config.current().max_players_per_ip
    );

    let permissions = ConfigPermissions::new(Arc::clone(&config));
    let gate = ConnectionGate::new(Arc::new(SessionRegistry::new()), config, permissions);
    let state = Arc::new(GateServer::new(gate));

    GateServer::run(state, &bind).await?;
    Ok(())
}
