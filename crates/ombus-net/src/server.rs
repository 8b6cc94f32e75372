//! Broadcast TCP server: accepts many clients, serializes each published
//! record once into the per-client outbound ring, and flushes them with
//! non-blocking I/O.

use crate::frame::FrameHeader;
use crate::outbound::OutboundRing;
use ombus_core::{Error, Record, Result, FRAME_HEADER_LEN, SLOW_WARNING_TYPE};
use socket2::{Domain, Protocol, Socket, Type};
use std::io::Write;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, warn};

/// Configuration for [`Server::bind`].
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ServerConfig {
    /// Address to bind. `None` binds `0.0.0.0`.
    pub bind_addr: Option<IpAddr>,
    /// Port to bind. `0` selects an ephemeral port.
    pub port: u16,
    /// Maximum simultaneously connected clients.
    pub max_clients: usize,
    /// Per-client outbound ring capacity in bytes.
    pub send_buf_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: None,
            port: 0,
            max_clients: 64,
            send_buf_size: 256 * 1024,
        }
    }
}

/// Monotonic broadcast counters. Cheap to read concurrently with the
/// server's single I/O thread.
#[derive(Debug, Default)]
pub struct ServerStats {
    pub records_broadcast: AtomicU64,
    pub bytes_broadcast: AtomicU64,
    pub clients_accepted: AtomicU64,
    pub clients_disconnected: AtomicU64,
    pub slow_client_drops: AtomicU64,
}

/// A point-in-time, non-atomic copy of [`ServerStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServerStatsSnapshot {
    pub records_broadcast: u64,
    pub bytes_broadcast: u64,
    pub clients_accepted: u64,
    pub clients_disconnected: u64,
    pub slow_client_drops: u64,
}

impl ServerStats {
    #[must_use]
    pub fn snapshot(&self) -> ServerStatsSnapshot {
        ServerStatsSnapshot {
            records_broadcast: self.records_broadcast.load(Ordering::Relaxed),
            bytes_broadcast: self.bytes_broadcast.load(Ordering::Relaxed),
            clients_accepted: self.clients_accepted.load(Ordering::Relaxed),
            clients_disconnected: self.clients_disconnected.load(Ordering::Relaxed),
            slow_client_drops: self.slow_client_drops.load(Ordering::Relaxed),
        }
    }
}

struct ClientSlot {
    stream: TcpStream,
    addr: SocketAddr,
    outbound: OutboundRing,
    pending_disconnect: bool,
    #[allow(dead_code)]
    accepted_at: Instant,
}

/// A broadcast TCP server. Single-threaded: accept, flush and disconnect
/// all happen inside [`Server::poll_io`].
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
    config: ServerConfig,
    clients: Vec<ClientSlot>,
    stats: ServerStats,
}

impl Server {
    /// Binds the configured address/port. Port `0` selects an ephemeral
    /// port; call [`Server::local_addr`] afterward to learn which one.
    pub fn bind(config: ServerConfig) -> Result<Self> {
        let ip = config.bind_addr.unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        let addr = SocketAddr::new(ip, config.port);

        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
            .map_err(|e| Error::TcpBind(e.to_string()))?;
        socket
            .set_reuse_address(true)
            .map_err(|e| Error::TcpBind(e.to_string()))?;
        socket
            .bind(&addr.into())
            .map_err(|e| Error::TcpBind(e.to_string()))?;
        socket
            .listen(128)
            .map_err(|e| Error::TcpBind(e.to_string()))?;
        socket
            .set_nonblocking(true)
            .map_err(|e| Error::TcpBind(e.to_string()))?;

        let listener: TcpListener = socket.into();
        let local_addr = listener
            .local_addr()
            .map_err(|e| Error::TcpBind(e.to_string()))?;

        Ok(Self {
            listener,
            local_addr,
            config,
            clients: Vec::new(),
            stats: ServerStats::default(),
        })
    }

    /// The actually bound address, including the ephemeral port if `port`
    /// was `0`.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    #[must_use]
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    #[must_use]
    pub fn stats(&self) -> &ServerStats {
        &self.stats
    }

    fn encode_frame(buf: &mut Vec<u8>, record_type: u8, wal_seq: u64, payload: &[u8]) {
        let header = FrameHeader {
            record_type,
            payload_len: payload.len() as u16,
            wal_seq,
        };
        let mut hdr_bytes = [0u8; FRAME_HEADER_LEN];
        header.encode_into(&mut hdr_bytes);
        buf.extend_from_slice(&hdr_bytes);
        buf.extend_from_slice(payload);
    }

    /// Broadcasts one record to every connected client. A client whose
    /// outbound ring can't fit the frame gets a best-effort slow-consumer
    /// warning and is marked for disconnection on the next [`Self::poll_io`].
    pub fn broadcast(&mut self, seq: u64, record_type: u8, payload: &[u8]) {
        self.broadcast_batch(&[Record {
            header: ombus_core::RecordHeader {
                seq,
                record_type,
                payload_len: payload.len() as u16,
            },
            payload,
        }]);
    }

    /// Broadcasts a batch of records. Semantically equivalent to broadcasting
    /// each record in turn — a client that can only fit a leading prefix of
    /// the batch gets that prefix (not zero records), then the usual
    /// best-effort warning and disconnect for the record where it fell
    /// behind — but each client receives its prefix through a single
    /// [`OutboundRing::push`] call instead of one push per record.
    pub fn broadcast_batch(&mut self, records: &[Record<'_>]) {
        if records.is_empty() {
            return;
        }
        let mut frames = Vec::new();
        let mut offsets = Vec::with_capacity(records.len() + 1);
        offsets.push(0usize);
        for rec in records {
            Self::encode_frame(&mut frames, rec.header.record_type, rec.header.seq, rec.payload);
            offsets.push(frames.len());
        }

        let mut warn_frame = [0u8; FRAME_HEADER_LEN];
        let last_seq = records.last().unwrap().header.seq;
        FrameHeader {
            record_type: SLOW_WARNING_TYPE,
            payload_len: 0,
            wal_seq: last_seq,
        }
        .encode_into(&mut warn_frame);

        for client in &mut self.clients {
            if client.pending_disconnect {
                continue;
            }
            let free = client.outbound.free();
            // Largest prefix of records whose combined frames still fit.
            let fit_count = offsets.iter().rposition(|&off| off <= free).unwrap_or(0);
            let fit_bytes = offsets[fit_count];
            if fit_bytes > 0 {
                client.outbound.push(&frames[..fit_bytes]);
            }
            if fit_count < records.len() {
                if client.outbound.free() >= warn_frame.len() {
                    client.outbound.push(&warn_frame);
                }
                client.pending_disconnect = true;
                self.stats.slow_client_drops.fetch_add(1, Ordering::Relaxed);
                debug!(addr = %client.addr, "marking slow client for disconnection");
            }
        }

        self.stats
            .records_broadcast
            .fetch_add(records.len() as u64, Ordering::Relaxed);
        let payload_bytes: u64 = records.iter().map(|r| r.payload.len() as u64).sum();
        self.stats
            .bytes_broadcast
            .fetch_add(payload_bytes, Ordering::Relaxed);
    }

    /// One non-blocking pass: accept queued connections, flush outbound
    /// rings, and drop clients that disconnected or went slow.
    pub fn poll_io(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((stream, addr)) => {
                    if self.clients.len() >= self.config.max_clients {
                        drop(stream);
                        continue;
                    }
                    if let Err(e) = stream.set_nonblocking(true) {
                        warn!(%addr, error = %e, "failed to set client non-blocking");
                        continue;
                    }
                    let _ = stream.set_nodelay(true);
                    self.clients.push(ClientSlot {
                        stream,
                        addr,
                        outbound: OutboundRing::new(self.config.send_buf_size),
                        pending_disconnect: false,
                        accepted_at: Instant::now(),
                    });
                    self.stats.clients_accepted.fetch_add(1, Ordering::Relaxed);
                    debug!(%addr, "client accepted");
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    warn!(error = %e, "accept() failed");
                    break;
                }
            }
        }

        for client in &mut self.clients {
            if !client.pending_disconnect {
                let mut probe = [0u8; 1];
                match client.stream.peek(&mut probe) {
                    Ok(0) => client.pending_disconnect = true,
                    Ok(_) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
                    Err(_) => client.pending_disconnect = true,
                }
            }
            // Flush whatever the kernel will take even for a client already
            // marked for disconnection: a slow client still gets its
            // already-queued frames (and the best-effort warning frame)
            // delivered as far as possible before it's dropped in the next
            // pass, not just the survivors.
            match client.outbound.drain_into(&mut client.stream) {
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
                Err(_) => client.pending_disconnect = true,
            }
        }

        let mut i = 0;
        while i < self.clients.len() {
            if self.clients[i].pending_disconnect {
                let client = self.clients.swap_remove(i);
                let _ = client.stream.shutdown(std::net::Shutdown::Both);
                self.stats
                    .clients_disconnected
                    .fetch_add(1, Ordering::Relaxed);
            } else {
                i += 1;
            }
        }
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        for client in &self.clients {
            let _ = client.stream.shutdown(std::net::Shutdown::Both);
        }
    }
}
