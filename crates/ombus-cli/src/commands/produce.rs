//! `ombus produce`: create a SHM stream and publish one record per line of
//! stdin. Exists purely for manual/integration testing; the seq counter
//! starts at 1 and the record type is fixed at `1`.

use crate::config::CliConfig;
use ombus_shm::{Producer, StreamConfig, StreamFlags};
use std::io::BufRead;

pub struct ProduceArgs {
    pub stream: String,
    pub capacity: u32,
    pub slot_size: u32,
    pub max_consumers: u32,
    pub crc: bool,
    pub reject_reorder: bool,
}

pub fn run(cli_config: &CliConfig, args: ProduceArgs) -> anyhow::Result<()> {
    let mut flags = StreamFlags::empty();
    if args.crc {
        flags = flags | StreamFlags::CRC;
    }
    if args.reject_reorder {
        flags = flags | StreamFlags::REJECT_REORDER;
    }

    let config = StreamConfig {
        stream_name: args.stream.clone(),
        capacity: args.capacity,
        slot_size: args.slot_size,
        max_consumers: args.max_consumers,
        flags,
        staleness_nanos: cli_config.stream.staleness_nanos,
    };

    let mut producer = Producer::create(config)?;
    tracing::info!(stream = %args.stream, "stream created, reading records from stdin");

    let stdin = std::io::stdin();
    let mut seq = 0u64;
    for line in stdin.lock().lines() {
        let line = line?;
        seq += 1;
        producer.publish(seq, 1, line.as_bytes())?;
    }

    tracing::info!(published = seq, "stdin closed, destroying stream");
    producer.destroy();
    Ok(())
}
