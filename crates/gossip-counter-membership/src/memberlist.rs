use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use gossip_counter::membership::{Member, Membership};
use gossip_counter::Delegate;
use parking_lot::Mutex;
use tokio::net::{lookup_host, TcpListener, TcpStream, UdpSocket};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use crate::config::TransportConfig;
use crate::members::MemberTable;
use crate::queue::TransmitLimitedQueue;
use crate::wire::{self, Packet, PushPull, StreamMessage, MESSAGE_OVERHEAD};
use crate::MembershipError;

/// Largest UDP datagram accepted from a peer.
const MAX_PACKET_SIZE: usize = 65_536;

/// Bytes of node metadata requested from the delegate.
const META_LIMIT: usize = 512;

struct Shared {
    config: TransportConfig,
    members: Arc<MemberTable>,
    queue: Arc<TransmitLimitedQueue>,
    delegate: Arc<dyn Delegate>,
    udp: UdpSocket,
}

/// A running membership node.
///
/// Owns four background tasks (TCP accept, UDP receive, gossip, periodic
/// push/pull) which stop when the `Memberlist` is shut down or dropped.
pub struct Memberlist {
    shared: Arc<Shared>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Memberlist {
    /// Bind the sockets and start the background tasks.
    ///
    /// TCP is bound first so that `bind_port = 0` picks a port, then UDP is
    /// bound to the same port. Zero intervals and timeouts are raised to a
    /// small minimum.
    pub async fn create(
        config: TransportConfig,
        delegate: Arc<dyn Delegate>,
    ) -> Result<Self, MembershipError> {
        let config = config.sanitized();
        let tcp = TcpListener::bind((config.bind_addr, config.bind_port)).await?;
        let port = tcp.local_addr()?.port();
        let udp = UdpSocket::bind((config.bind_addr, port)).await?;

        let advertise = config.advertise_addr.unwrap_or_else(|| {
            let ip = if config.bind_addr.is_unspecified() {
                IpAddr::V4(Ipv4Addr::LOCALHOST)
            } else {
                config.bind_addr
            };
            SocketAddr::new(ip, port)
        });
        let local = Member {
            name: config.name.clone(),
            addr: advertise,
            meta: delegate.node_meta(META_LIMIT),
        };

        let members = Arc::new(MemberTable::new(local));
        let queue = {
            let members = members.clone();
            Arc::new(TransmitLimitedQueue::new(
                move || members.len(),
                config.retransmit_mult,
                config.max_queue_depth,
            ))
        };

        let shared = Arc::new(Shared {
            config,
            members,
            queue,
            delegate,
            udp,
        });
        let tasks = vec![
            tokio::spawn(accept_loop(shared.clone(), tcp)),
            tokio::spawn(receive_loop(shared.clone())),
            tokio::spawn(gossip_loop(shared.clone())),
            tokio::spawn(push_pull_loop(shared.clone())),
        ];

        info!(name = %shared.config.name, addr = %advertise, "memberlist started");
        Ok(Self {
            shared,
            tasks: Mutex::new(tasks),
        })
    }

    /// Join a cluster through any of `seeds` (`host:port`), performing a
    /// join push/pull with each. Returns how many seeds were reached.
    pub async fn join(&self, seeds: &[String]) -> Result<usize, MembershipError> {
        let mut attempted = 0;
        let mut joined = 0;
        for seed in seeds.iter().map(|s| s.trim()).filter(|s| !s.is_empty()) {
            attempted += 1;
            match self.join_one(seed).await {
                Ok(addr) => {
                    joined += 1;
                    debug!(%seed, %addr, "joined through seed");
                }
                Err(e) => warn!(%seed, error = %e, "failed to join through seed"),
            }
        }
        if attempted > 0 && joined == 0 {
            return Err(MembershipError::JoinFailed { attempted });
        }
        Ok(joined)
    }

    async fn join_one(&self, seed: &str) -> Result<SocketAddr, MembershipError> {
        let addr = lookup_host(seed)
            .await
            .ok()
            .and_then(|mut addrs| addrs.next())
            .ok_or_else(|| MembershipError::Resolve(seed.to_string()))?;
        self.shared.push_pull(addr, true).await?;
        Ok(addr)
    }

    /// The queue delta broadcasts should be published to.
    #[must_use]
    pub fn broadcasts(&self) -> Arc<TransmitLimitedQueue> {
        self.shared.queue.clone()
    }

    /// The address peers reach this node on.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.shared.members.local().addr
    }

    /// Stop all background tasks. Sockets close once in-flight exchanges end.
    pub fn shutdown(&self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }
}

impl Drop for Memberlist {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Membership for Memberlist {
    fn local_member(&self) -> Member {
        self.shared.members.local().clone()
    }

    fn members(&self) -> Vec<Member> {
        self.shared.members.members()
    }

    fn num_members(&self) -> usize {
        self.shared.members.len()
    }
}

impl Shared {
    /// Initiate a push/pull with `addr`.
    async fn push_pull(&self, addr: SocketAddr, join: bool) -> Result<(), MembershipError> {
        let remote = time::timeout(self.config.tcp_timeout, self.exchange(addr, join))
            .await
            .map_err(|_| MembershipError::Timeout(addr))??;
        self.learn(remote.sender, &remote.members, addr.ip());
        self.delegate.on_state_response(&remote.user_state, join);
        Ok(())
    }

    async fn exchange(&self, addr: SocketAddr, join: bool) -> Result<PushPull, MembershipError> {
        let mut stream = TcpStream::connect(addr).await?;
        let local = StreamMessage::PushPull(self.local_push_pull(join));
        wire::write_frame(&mut stream, &local).await?;
        wire::read_frame(&mut stream, self.config.max_push_pull_bytes).await
    }

    /// Deliver a gossip packet over TCP, for broadcasts no datagram can hold.
    async fn send_stream(&self, addr: SocketAddr, packet: Packet) -> Result<(), MembershipError> {
        let send = async {
            let mut stream = TcpStream::connect(addr).await?;
            wire::write_frame(&mut stream, &StreamMessage::Gossip(packet)).await
        };
        time::timeout(self.config.tcp_timeout, send)
            .await
            .map_err(|_| MembershipError::Timeout(addr))?
    }

    /// Handle one inbound TCP connection.
    async fn serve_stream(
        &self,
        mut stream: TcpStream,
        peer: SocketAddr,
    ) -> Result<(), MembershipError> {
        let remote = match wire::read_frame(&mut stream, self.config.max_push_pull_bytes).await? {
            StreamMessage::PushPull(remote) => remote,
            StreamMessage::Gossip(packet) => {
                self.deliver(&packet);
                return Ok(());
            }
        };
        let join = remote.join;
        self.learn(remote.sender, &remote.members, peer.ip());
        wire::write_frame(&mut stream, &self.local_push_pull(join)).await?;
        self.delegate.on_state_response(&remote.user_state, join);
        Ok(())
    }

    fn deliver(&self, packet: &Packet) {
        trace!(from = %packet.from, count = packet.messages.len(), "gossip received");
        for msg in &packet.messages {
            self.delegate.on_message(msg);
        }
    }

    fn local_push_pull(&self, join: bool) -> PushPull {
        PushPull {
            join,
            sender: self.members.local().clone(),
            members: self.members.peers(),
            user_state: self.delegate.on_state_request(join),
        }
    }

    fn learn(&self, sender: Member, others: &[Member], observed: IpAddr) {
        let sender = with_observed_ip(sender, observed);
        for member in std::iter::once(sender).chain(others.iter().cloned()) {
            let (name, addr) = (member.name.clone(), member.addr);
            if self.members.upsert(member) {
                info!(%name, %addr, "member joined");
            }
        }
    }
}

/// Replace an address a peer cannot know better than we do: unspecified,
/// or loopback when the connection clearly came from elsewhere.
fn with_observed_ip(mut member: Member, observed: IpAddr) -> Member {
    let ip = member.addr.ip();
    if ip.is_unspecified() || (ip.is_loopback() && !observed.is_loopback()) {
        member.addr.set_ip(observed);
    }
    member
}

async fn accept_loop(shared: Arc<Shared>, listener: TcpListener) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                let shared = shared.clone();
                tokio::spawn(async move {
                    let limit = shared.config.tcp_timeout;
                    match time::timeout(limit, shared.serve_stream(stream, peer)).await {
                        Ok(Ok(())) => trace!(%peer, "served stream"),
                        Ok(Err(e)) => debug!(%peer, error = %e, "stream from peer failed"),
                        Err(_) => debug!(%peer, "stream from peer timed out"),
                    }
                });
            }
            Err(e) => {
                warn!(error = %e, "accept failed");
                time::sleep(Duration::from_millis(50)).await;
            }
        }
    }
}

async fn receive_loop(shared: Arc<Shared>) {
    let mut buf = vec![0u8; MAX_PACKET_SIZE];
    loop {
        let (len, from) = match shared.udp.recv_from(&mut buf).await {
            Ok(received) => received,
            Err(e) => {
                debug!(error = %e, "udp receive failed");
                continue;
            }
        };
        match wire::decode::<Packet>(&buf[..len]) {
            Ok(packet) => shared.deliver(&packet),
            Err(e) => debug!(%from, error = %e, "dropping malformed gossip packet"),
        }
    }
}

async fn gossip_loop(shared: Arc<Shared>) {
    let mut ticker = time::interval(shared.config.gossip_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let from = shared.config.name.clone();
    let limit = shared
        .config
        .udp_buffer_size
        .saturating_sub(Packet::header_len(&from));

    loop {
        ticker.tick().await;
        for peer in shared.members.random_peers(shared.config.gossip_nodes) {
            let oversized = shared.queue.get_oversized(MESSAGE_OVERHEAD, limit);
            let messages = shared.queue.get_broadcasts(MESSAGE_OVERHEAD, limit);
            if oversized.is_empty() && messages.is_empty() {
                break;
            }
            if !oversized.is_empty() {
                debug!(
                    peer = %peer.name,
                    count = oversized.len(),
                    "broadcast exceeds udp budget, sending over tcp"
                );
                let packet = Packet {
                    from: from.clone(),
                    messages: oversized,
                };
                let (shared, peer) = (shared.clone(), peer.clone());
                tokio::spawn(async move {
                    if let Err(e) = shared.send_stream(peer.addr, packet).await {
                        debug!(peer = %peer.name, error = %e, "stream gossip send failed");
                    }
                });
            }
            if messages.is_empty() {
                continue;
            }
            let packet = Packet {
                from: from.clone(),
                messages,
            };
            match wire::encode(&packet) {
                Ok(bytes) => {
                    if let Err(e) = shared.udp.send_to(&bytes, peer.addr).await {
                        debug!(peer = %peer.name, error = %e, "gossip send failed");
                    }
                }
                Err(e) => warn!(error = %e, "failed to encode gossip packet"),
            }
        }
    }
}

async fn push_pull_loop(shared: Arc<Shared>) {
    let mut ticker = time::interval(shared.config.push_pull_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // the first tick fires immediately; joining already did an exchange
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let Some(peer) = shared.members.random_peers(1).pop() else {
            continue;
        };
        if let Err(e) = shared.push_pull(peer.addr, false).await {
            warn!(peer = %peer.name, addr = %peer.addr, error = %e, "push/pull failed, removing member");
            shared.members.remove(&peer.name);
        }
    }
}
