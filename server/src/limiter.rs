// Copyright 2022 CeresDB Project Authors. Licensed under Apache-2.0.

//! Keep-alive governor (`spec.md` §4.E, optional): each client connection
//! is tagged at accept time with an end-of-life instant
//! (`now + max_keep_alive + uniform[0, fuzziness)`); once that instant
//! passes, responses on the connection carry `Connection: close` so the
//! client reconnects, letting a load balancer rebalance long-lived
//! keep-alive connections across backends.
//!
//! `warp`'s `serve()` does not expose a per-accepted-connection hook, so
//! this governor keys its deadline map by the client's remote
//! `SocketAddr` instead: every `SocketAddr` observed by the OS accept
//! loop corresponds to exactly one TCP connection (the ephemeral client
//! port is unique per connection), which gives the same per-connection
//! identity a lower-level `hyper` `make_service_fn` hook would provide,
//! without wiring a custom `tower::Service` around `warp`'s routes.

use std::{net::SocketAddr, time::Duration};

use dashmap::DashMap;
use rand::Rng;
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct KeepAliveConfig {
    pub disabled: bool,
    pub duration: Duration,
    pub fuzziness: Duration,
}

impl Default for KeepAliveConfig {
    fn default() -> Self {
        Self {
            disabled: true,
            duration: Duration::from_secs(600),
            fuzziness: Duration::from_secs(60),
        }
    }
}

pub struct KeepAliveGovernor {
    config: KeepAliveConfig,
    deadlines: DashMap<SocketAddr, Instant>,
}

impl KeepAliveGovernor {
    pub fn new(config: KeepAliveConfig) -> Self {
        Self {
            config,
            deadlines: DashMap::new(),
        }
    }

    /// Whether the connection identified by `remote` has passed its
    /// assigned end-of-life instant. Assigns one on first sight.
    pub fn should_close(&self, remote: SocketAddr) -> bool {
        if self.config.disabled {
            return false;
        }

        let now = Instant::now();
        let deadline = *self
            .deadlines
            .entry(remote)
            .or_insert_with(|| now + self.jittered_duration());

        if now >= deadline {
            self.deadlines.remove(&remote);
            true
        } else {
            false
        }
    }

    fn jittered_duration(&self) -> Duration {
        if self.config.fuzziness.is_zero() {
            return self.config.duration;
        }
        let fuzz_ms = rand::thread_rng().gen_range(0..self.config.fuzziness.as_millis() as u64);
        self.config.duration + Duration::from_millis(fuzz_ms)
    }

    /// Drops every tracked deadline whose connection is most likely gone
    /// (already past end-of-life); called opportunistically so the map
    /// does not grow unbounded under high connection churn.
    pub fn sweep_expired(&self) {
        let now = Instant::now();
        self.deadlines.retain(|_, deadline| *deadline > now);
    }

    pub fn tracked_connections(&self) -> usize {
        self.deadlines.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        format!("127.0.0.1:{port}").parse().unwrap()
    }

    #[test]
    fn disabled_never_closes() {
        let governor = KeepAliveGovernor::new(KeepAliveConfig {
            disabled: true,
            duration: Duration::from_millis(0),
            fuzziness: Duration::from_millis(0),
        });
        assert!(!governor.should_close(addr(1)));
    }

    #[test]
    fn assigns_a_stable_deadline_per_connection() {
        let governor = KeepAliveGovernor::new(KeepAliveConfig {
            disabled: false,
            duration: Duration::from_secs(600),
            fuzziness: Duration::from_secs(60),
        });
        assert!(!governor.should_close(addr(2)));
        assert!(!governor.should_close(addr(2)));
        assert_eq!(governor.tracked_connections(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn closes_once_past_deadline() {
        let governor = KeepAliveGovernor::new(KeepAliveConfig {
            disabled: false,
            duration: Duration::from_millis(10),
            fuzziness: Duration::from_millis(0),
        });
        assert!(!governor.should_close(addr(3)));
        tokio::time::advance(Duration::from_millis(20)).await;
        assert!(governor.should_close(addr(3)));
    }

    #[test]
    fn sweep_drops_expired_entries() {
        let governor = KeepAliveGovernor::new(KeepAliveConfig {
            disabled: false,
            duration: Duration::from_millis(0),
            fuzziness: Duration::from_millis(0),
        });
        governor.should_close(addr(4));
        governor.sweep_expired();
        assert_eq!(governor.tracked_connections(), 0);
    }
}
