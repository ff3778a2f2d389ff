use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Floor for every interval and timeout; a zero period would never tick.
const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Settings for a [`Memberlist`](crate::Memberlist).
///
/// [`Default`] names the node with a freshly generated
/// [`NodeIdentity`](gossip_counter::NodeIdentity).
///
/// [`TransportConfig::new`] gives WAN-friendly defaults with a short
/// push/pull interval so anti-entropy is visible; [`TransportConfig::local`]
/// tightens everything for loopback clusters and tests.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// This node's name. Must be unique in the cluster.
    pub name: String,
    /// Address to bind both the UDP and TCP sockets to.
    pub bind_addr: IpAddr,
    /// Port to bind. `0` picks a free port, shared by UDP and TCP.
    pub bind_port: u16,
    /// Address advertised to peers. Defaults to the bound address, with an
    /// unspecified IP replaced by loopback. Peers rewrite a loopback or
    /// unspecified IP with the address they actually saw.
    pub advertise_addr: Option<SocketAddr>,
    /// How often queued broadcasts are gossiped.
    pub gossip_interval: Duration,
    /// Number of random peers each gossip round targets.
    pub gossip_nodes: usize,
    /// How often a full-state push/pull runs against one random peer.
    pub push_pull_interval: Duration,
    /// Bound on a whole TCP push/pull exchange.
    pub tcp_timeout: Duration,
    /// Retransmissions per broadcast scale as `mult * ceil(log10(n + 1))`.
    pub retransmit_mult: usize,
    /// Broadcasts kept queued before the most-sent ones are pruned.
    pub max_queue_depth: usize,
    /// Largest UDP gossip packet this node sends.
    pub udp_buffer_size: usize,
    /// Largest push/pull frame this node accepts.
    pub max_push_pull_bytes: usize,
}

impl TransportConfig {
    /// Defaults for `name`, bound to every interface on an automatic port.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bind_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            bind_port: 0,
            advertise_addr: None,
            gossip_interval: Duration::from_millis(200),
            gossip_nodes: 4,
            push_pull_interval: Duration::from_secs(5),
            tcp_timeout: Duration::from_secs(10),
            retransmit_mult: 3,
            max_queue_depth: 1024,
            udp_buffer_size: 1400,
            max_push_pull_bytes: 4 * 1024 * 1024,
        }
    }

    /// Loopback-only settings with fast intervals.
    pub fn local(name: impl Into<String>) -> Self {
        Self {
            bind_addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
            gossip_interval: Duration::from_millis(20),
            push_pull_interval: Duration::from_millis(500),
            tcp_timeout: Duration::from_secs(2),
            ..Self::new(name)
        }
    }

    /// Raise zero periods to [`MIN_PERIOD`] and a zero retransmit multiplier to one.
    pub(crate) fn sanitized(mut self) -> Self {
        self.gossip_interval = self.gossip_interval.max(MIN_PERIOD);
        self.push_pull_interval = self.push_pull_interval.max(MIN_PERIOD);
        self.tcp_timeout = self.tcp_timeout.max(MIN_PERIOD);
        self.retransmit_mult = self.retransmit_mult.max(1);
        self
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self::new(gossip_counter::NodeIdentity::generate())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_keeps_defaults_it_does_not_override() {
        let config = TransportConfig::local("a");
        assert_eq!(config.bind_addr, IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(config.retransmit_mult, 3);
        assert!(config.push_pull_interval < TransportConfig::new("a").push_pull_interval);
    }

    #[test]
    fn zero_periods_are_raised() {
        let config = TransportConfig {
            gossip_interval: Duration::ZERO,
            push_pull_interval: Duration::ZERO,
            tcp_timeout: Duration::ZERO,
            retransmit_mult: 0,
            ..TransportConfig::local("a")
        }
        .sanitized();
        assert_eq!(config.gossip_interval, MIN_PERIOD);
        assert_eq!(config.push_pull_interval, MIN_PERIOD);
        assert_eq!(config.tcp_timeout, MIN_PERIOD);
        assert_eq!(config.retransmit_mult, 1);

        let untouched = TransportConfig::local("a").sanitized();
        assert_eq!(untouched.gossip_interval, Duration::from_millis(20));
    }

    #[test]
    fn default_names_are_unique() {
        assert_ne!(TransportConfig::default().name, TransportConfig::default().name);
    }
}
