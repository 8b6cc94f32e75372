//! Batched forwarding loop from one local SHM endpoint to one TCP
//! [`Server`](ombus_net::Server): consume a batch, broadcast it, adapt the
//! batch size to load. Runs as a synchronous foreground loop rather than an
//! async task, since every I/O call on this path is already non-blocking.

mod stats;

pub use stats::{RelayStats, RelayTotals};

use ombus_core::{Delivery, Error, Result};
use ombus_net::Server;
use ombus_shm::Consumer;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{info, warn};

const MIN_BURST: usize = 16;
const MAX_BURST: usize = 256;
const INITIAL_BURST: usize = 64;
const EMPTY_SPIN_THRESHOLD: u32 = 100;

/// Configuration for [`run`].
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RelayConfig {
    /// How long to sleep between polls once the endpoint has been idle for
    /// [`EMPTY_SPIN_THRESHOLD`] consecutive empty polls.
    pub poll_interval_us: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self { poll_interval_us: 10 }
    }
}

/// Runs the relay loop until `stop` is set or the SHM endpoint reports an
/// unrecoverable error (producer restart, CRC failure, or a sequence gap).
/// On stop, drives one final [`Server::poll_io`] to flush pending bytes.
///
/// The relay does not attempt recovery from any of those three conditions:
/// a gap means data already got away from this process and a fresh endpoint
/// (with a fresh producer epoch, if applicable) is the correct response, not
/// a silent skip-ahead.
pub fn run(
    endpoint: &mut Consumer,
    server: &mut Server,
    stop: &AtomicBool,
    config: RelayConfig,
    stats: Option<&RelayStats>,
) -> Result<()> {
    let mut burst_limit = INITIAL_BURST;
    let mut empty_spins: u32 = 0;
    let mut last_forwarded_seq: u64 = 0;

    loop {
        if stop.load(Ordering::Relaxed) {
            server.poll_io();
            info!("relay stopped, final flush complete");
            return Ok(());
        }

        let loop_start = Instant::now();
        let batch = match endpoint.poll_batch(burst_limit) {
            Ok(batch) => batch,
            Err(e) => {
                warn!(error = %e, "relay aborting: unrecoverable SHM error");
                return Err(e);
            }
        };

        if batch.is_empty() {
            if empty_spins == 0 {
                // Drive I/O once on the first empty spin so pending bytes
                // still flush promptly even while the ring has nothing new.
                server.poll_io();
            }
            empty_spins = empty_spins.saturating_add(1);
            if empty_spins > EMPTY_SPIN_THRESHOLD {
                std::thread::sleep(Duration::from_micros(config.poll_interval_us));
            } else {
                std::thread::yield_now();
            }
            if let Some(stats) = stats {
                stats.record_loop(loop_start.elapsed().as_nanos() as u64, 0);
            }
            continue;
        }

        empty_spins = 0;
        let mut gap: Option<Error> = None;
        let records: Vec<_> = batch
            .iter()
            .map(|(delivery, record)| {
                if *delivery == Delivery::Gap && gap.is_none() {
                    gap = Some(Error::GapDetected {
                        expected: last_forwarded_seq + 1,
                        got: record.header.seq,
                    });
                }
                last_forwarded_seq = record.header.seq;
                *record
            })
            .collect();

        let filled = records.len() == burst_limit;
        server.broadcast_batch(&records);
        server.poll_io();

        if filled && burst_limit < MAX_BURST {
            burst_limit = (burst_limit * 2).min(MAX_BURST);
        } else if records.len() < burst_limit / 4 && burst_limit > MIN_BURST {
            burst_limit = (burst_limit / 2).max(MIN_BURST);
        }

        if let Some(stats) = stats {
            stats.record_loop(loop_start.elapsed().as_nanos() as u64, records.len());
        }

        if let Some(e) = gap {
            warn!(error = %e, "relay aborting: sequence gap in forwarded batch");
            return Err(e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ombus_net::ServerConfig;
    use ombus_shm::{EndpointConfig, Producer, StreamConfig};
    use std::sync::atomic::AtomicBool;

    #[test]
    fn forwards_published_records_to_connected_client() {
        let name = format!("/ombus-relay-test-{}", std::process::id());
        let config = StreamConfig {
            stream_name: name.clone(),
            capacity: 64,
            slot_size: 256,
            max_consumers: 2,
            ..StreamConfig::default()
        };
        let mut producer = Producer::create(config).unwrap();
        for seq in 1u64..=5 {
            producer
                .publish(seq, 1, format!("msg-{seq}").as_bytes())
                .unwrap();
        }

        let mut endpoint = Consumer::open(EndpointConfig::new(&name, 0)).unwrap();
        let mut server = Server::bind(ServerConfig::default()).unwrap();
        let addr = server.local_addr();
        let client = std::net::TcpStream::connect(addr).unwrap();
        client.set_nonblocking(true).unwrap();
        server.poll_io();

        let stop = AtomicBool::new(false);
        let stats = RelayStats::new();

        let relay_stop = &stop;
        std::thread::scope(|scope| {
            scope.spawn(|| {
                let _ = run(
                    &mut endpoint,
                    &mut server,
                    relay_stop,
                    RelayConfig { poll_interval_us: 1 },
                    Some(&stats),
                );
            });

            std::thread::sleep(Duration::from_millis(20));
            stop.store(true, Ordering::Relaxed);
        });

        let totals = stats.totals();
        assert!(totals.total_loops > 0);
        assert_eq!(totals.total_records, 5);
        drop(client);
        producer.destroy();
    }
}
