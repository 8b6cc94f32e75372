//! Auto-reconnect wrapper around [`Client`], adding exponential backoff.
//! A synchronous, poll-driven deadline check rather than an async sleep,
//! matching this system's non-blocking hot path.

use crate::client::{Client, ClientConfig};
use ombus_core::{Delivery, Error, Record, Result};
use std::time::{Duration, Instant};

/// Configuration for [`AutoReconnectClient::connect`].
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AutoReconnectConfig {
    pub base: ClientConfig,
    /// `0` means unlimited retries.
    pub max_retries: u32,
    pub retry_base_ms: u64,
    pub retry_max_ms: u64,
}

impl Default for AutoReconnectConfig {
    fn default() -> Self {
        Self {
            base: ClientConfig::default(),
            max_retries: 0,
            retry_base_ms: 100,
            retry_max_ms: 5000,
        }
    }
}

/// Wraps [`Client`] with reconnect-with-backoff. Polling during an outage
/// returns `Empty`, not an error — the worker never sees "reconnecting" as
/// a distinct state.
pub struct AutoReconnectClient {
    config: AutoReconnectConfig,
    inner: Option<Client>,
    backoff_ms: u64,
    retries_remaining: Option<u32>,
    next_retry_at: Option<Instant>,
    last_wal_seq: u64,
    permanently_disconnected: bool,
}

impl AutoReconnectClient {
    /// Performs the mandatory initial connect; failure is surfaced
    /// immediately rather than entering the backoff loop.
    pub fn connect(config: AutoReconnectConfig) -> Result<Self> {
        let inner = Client::connect(config.base.clone())?;
        let retries_remaining = if config.max_retries == 0 {
            None
        } else {
            Some(config.max_retries)
        };
        let backoff_ms = config.retry_base_ms;
        Ok(Self {
            config,
            inner: Some(inner),
            backoff_ms,
            retries_remaining,
            next_retry_at: None,
            last_wal_seq: 0,
            permanently_disconnected: false,
        })
    }

    /// Last `wal_seq` observed, persisted across reconnects so the worker
    /// can detect the gap an outage caused.
    #[must_use]
    pub fn last_wal_seq(&self) -> u64 {
        self.last_wal_seq
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.is_some()
    }

    fn attempt_reconnect(&mut self) -> Result<()> {
        match Client::connect(self.config.base.clone()) {
            Ok(mut client) => {
                if self.last_wal_seq > 0 {
                    client.seed_expected_seq(self.last_wal_seq + 1);
                }
                self.inner = Some(client);
                self.backoff_ms = self.config.retry_base_ms;
                self.next_retry_at = None;
                Ok(())
            }
            Err(e) => {
                self.backoff_ms = (self.backoff_ms * 2).min(self.config.retry_max_ms);
                if let Some(remaining) = &mut self.retries_remaining {
                    *remaining -= 1;
                    if *remaining == 0 {
                        self.permanently_disconnected = true;
                        return Err(Error::TcpDisconnected);
                    }
                }
                self.next_retry_at = Some(Instant::now() + Duration::from_millis(self.backoff_ms));
                Err(e)
            }
        }
    }

    /// Non-blocking poll: surfaces the inner client's state while connected,
    /// returns `Empty` during a scheduled reconnect, and only surfaces
    /// `TcpDisconnected` once the retry budget is exhausted.
    pub fn poll(&mut self) -> Result<(Delivery, Record<'_>)> {
        if self.permanently_disconnected {
            return Err(Error::TcpDisconnected);
        }

        if self.inner.is_some() {
            let result = self.inner.as_mut().unwrap().poll();
            return match result {
                Ok((delivery, record)) => {
                    self.last_wal_seq = record.header.seq;
                    Ok((delivery, record))
                }
                Err(Error::TcpDisconnected) | Err(Error::TcpProtocol) => {
                    self.inner = None;
                    self.next_retry_at =
                        Some(Instant::now() + Duration::from_millis(self.backoff_ms));
                    Err(Error::Empty)
                }
                Err(other) => Err(other),
            };
        }

        let deadline = self
            .next_retry_at
            .expect("disconnected state always sets a retry deadline");
        if Instant::now() < deadline {
            return Err(Error::Empty);
        }
        match self.attempt_reconnect() {
            Ok(()) => Err(Error::Empty),
            Err(Error::TcpDisconnected) => Err(Error::TcpDisconnected),
            Err(_) => Err(Error::Empty),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::{Server, ServerConfig};

    #[test]
    fn resumes_after_server_restart() {
        let mut server = Server::bind(ServerConfig::default()).expect("bind");
        let addr = server.local_addr();

        let mut client = AutoReconnectClient::connect(AutoReconnectConfig {
            base: ClientConfig {
                host: addr.ip().to_string(),
                port: addr.port(),
                ..ClientConfig::default()
            },
            retry_base_ms: 10,
            retry_max_ms: 40,
            ..AutoReconnectConfig::default()
        })
        .expect("initial connect");

        server.poll_io();
        for seq in 1u64..=5 {
            server.broadcast(seq, 1, b"x");
        }
        server.poll_io();

        let mut drained = 0;
        for _ in 0..2000 {
            match client.poll() {
                Ok(_) => drained += 1,
                Err(Error::Empty) => {
                    if drained >= 5 {
                        break;
                    }
                    std::thread::yield_now();
                }
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!(drained, 5);
        assert_eq!(client.last_wal_seq(), 5);

        drop(server);
        for _ in 0..50 {
            assert!(matches!(client.poll(), Err(Error::Empty)));
        }

        let mut server2 = Server::bind(ServerConfig {
            port: addr.port(),
            ..ServerConfig::default()
        })
        .expect("rebind same port");

        let deadline = Instant::now() + Duration::from_secs(2);
        let mut broadcasted = false;
        loop {
            server2.poll_io();
            if !broadcasted && server2.client_count() > 0 {
                for seq in 6u64..=10 {
                    server2.broadcast(seq, 1, b"y");
                }
                server2.poll_io();
                broadcasted = true;
            }
            match client.poll() {
                Ok((_, record)) if record.header.seq == 10 => break,
                _ => {}
            }
            assert!(Instant::now() < deadline, "auto-reconnect never resumed");
            std::thread::yield_now();
        }
        assert_eq!(client.last_wal_seq(), 10);
    }
}
