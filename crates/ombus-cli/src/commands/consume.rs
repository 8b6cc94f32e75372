//! `ombus consume`: attach to an existing SHM stream and print every
//! delivered record to stdout as `seq type payload-utf8-lossy`.

use crate::config::CliConfig;
use ombus_core::Error;
use ombus_shm::Consumer;

pub fn run(cli_config: &CliConfig, stream: &str, consumer_index: u32) -> anyhow::Result<()> {
    let mut consumer = Consumer::open(cli_config.endpoint_config(stream, consumer_index))?;
    tracing::info!(stream, consumer_index, "attached, polling");

    let mut empty_spins: u32 = 0;
    loop {
        match consumer.poll() {
            Ok((delivery, record)) => {
                empty_spins = 0;
                println!(
                    "{} {:?} type={} {}",
                    record.header.seq,
                    delivery,
                    record.header.record_type,
                    String::from_utf8_lossy(record.payload)
                );
            }
            Err(Error::Empty) => {
                empty_spins = empty_spins.saturating_add(1);
                if empty_spins > 100 {
                    std::thread::sleep(std::time::Duration::from_micros(50));
                } else {
                    std::thread::yield_now();
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "consume aborting");
                return Err(e.into());
            }
        }
    }
}
