//! `ombus serve`: run a bare TCP broadcast server with no attached SHM
//! source. Useful for exercising the accept/slow-client/disconnect policy
//! in isolation; `ombus relay` is what actually forwards records.

use crate::config::CliConfig;
use ombus_net::{Server, ServerConfig};
use std::net::IpAddr;
use std::time::{Duration, Instant};

pub fn run(
    cli_config: &CliConfig,
    bind: Option<String>,
    port: u16,
    max_clients: usize,
) -> anyhow::Result<()> {
    let bind_addr = bind
        .map(|b| b.parse::<IpAddr>())
        .transpose()?
        .or(cli_config.server.bind_addr);

    let config = ServerConfig {
        bind_addr,
        port: if port != 0 { port } else { cli_config.server.port },
        max_clients: if max_clients != ServerConfig::default().max_clients {
            max_clients
        } else {
            cli_config.server.max_clients
        },
        send_buf_size: cli_config.server.send_buf_size,
    };

    let mut server = Server::bind(config)?;
    tracing::info!(addr = %server.local_addr(), "server listening");

    let mut last_report = Instant::now();
    loop {
        server.poll_io();
        if last_report.elapsed() >= Duration::from_secs(10) {
            let stats = server.stats().snapshot();
            tracing::info!(
                clients = server.client_count(),
                records = stats.records_broadcast,
                bytes = stats.bytes_broadcast,
                disconnected = stats.clients_disconnected,
                slow_drops = stats.slow_client_drops,
                "server stats"
            );
            last_report = Instant::now();
        }
        std::thread::sleep(Duration::from_millis(5));
    }
}
