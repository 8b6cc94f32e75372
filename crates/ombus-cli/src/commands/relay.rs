//! `ombus relay`: attach to a SHM stream, bind a TCP server, and forward
//! one into the other until the SHM endpoint reports an unrecoverable
//! error (the relay never attempts recovery; see `ombus_relay::run`).

use crate::config::CliConfig;
use ombus_net::{Server, ServerConfig};
use ombus_relay::RelayStats;
use ombus_shm::Consumer;
use std::net::IpAddr;
use std::sync::atomic::AtomicBool;

pub fn run(
    cli_config: &CliConfig,
    stream: &str,
    consumer_index: u32,
    bind: Option<String>,
    port: u16,
) -> anyhow::Result<()> {
    let mut endpoint = Consumer::open(cli_config.endpoint_config(stream, consumer_index))?;

    let bind_addr = bind
        .map(|b| b.parse::<IpAddr>())
        .transpose()?
        .or(cli_config.server.bind_addr);
    let server_config = ServerConfig {
        bind_addr,
        port: if port != 0 { port } else { cli_config.server.port },
        ..cli_config.server.clone()
    };
    let mut server = Server::bind(server_config)?;
    tracing::info!(stream, addr = %server.local_addr(), "relay started");

    let stop = AtomicBool::new(false);
    let stats = RelayStats::new();

    let result = ombus_relay::run(&mut endpoint, &mut server, &stop, cli_config.relay, Some(&stats));

    let totals = stats.totals();
    tracing::info!(
        loops = totals.total_loops,
        records = totals.total_records,
        p99_nanos = stats.percentile_nanos(99.0),
        "relay stopped"
    );

    result.map_err(anyhow::Error::from)
}
