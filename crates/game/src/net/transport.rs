use std::collections::VecDeque;
use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};

use rand::Rng;

use super::protocol::{MAX_DATAGRAM_SIZE, Packet, PacketHeader, Payload, frame};

/// Address of a remote peer, independent of the socket API underneath.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Endpoint(SocketAddr);

impl Endpoint {
    pub fn new(addr: SocketAddr) -> Self {
        Self(addr)
    }

    pub fn addr(&self) -> SocketAddr {
        self.0
    }
}

impl From<SocketAddr> for Endpoint {
    fn from(addr: SocketAddr) -> Self {
        Self(addr)
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone)]
pub struct Datagram {
    pub header: PacketHeader,
    pub payload: Payload,
    pub sender: Endpoint,
}

#[derive(Debug, Clone, Default)]
pub struct NetworkStats {
    pub packets_sent: u64,
    pub packets_received: u64,
    pub packets_dropped: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub send_errors: u64,
}

#[derive(Debug, Clone, Default)]
pub struct PacketLossSimulation {
    pub enabled: bool,
    pub loss_percent: f32,
}

impl PacketLossSimulation {
    pub fn new(loss_percent: f32) -> Self {
        Self {
            enabled: true,
            loss_percent: loss_percent.clamp(0.0, 100.0),
        }
    }

    pub fn should_drop(&self) -> bool {
        if !self.enabled || self.loss_percent <= 0.0 {
            return false;
        }
        rand::thread_rng().gen_range(0.0..100.0) < self.loss_percent
    }
}

/// Non-blocking UDP socket with a polled inbound queue.
///
/// Sending never fails from the caller's point of view: errors are logged
/// and counted. Datagrams that do not decode are dropped on receive.
pub struct Transport {
    socket: UdpSocket,
    local: Endpoint,
    send_sequence: u32,
    inbound: VecDeque<Datagram>,
    recv_buffer: Vec<u8>,
    stats: NetworkStats,
    loss_sim: PacketLossSimulation,
}

impl Transport {
    pub fn bind<A: ToSocketAddrs>(addr: A) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        socket.set_nonblocking(true)?;

        let local = Endpoint(socket.local_addr()?);

        Ok(Self {
            socket,
            local,
            send_sequence: 0,
            inbound: VecDeque::new(),
            recv_buffer: vec![0u8; MAX_DATAGRAM_SIZE + 1],
            stats: NetworkStats::default(),
            loss_sim: PacketLossSimulation::default(),
        })
    }

    pub fn local_endpoint(&self) -> Endpoint {
        self.local
    }

    pub fn stats(&self) -> &NetworkStats {
        &self.stats
    }

    pub fn set_packet_loss(&mut self, sim: PacketLossSimulation) {
        self.loss_sim = sim;
    }

    fn next_sequence(&mut self) -> u32 {
        let sequence = self.send_sequence;
        self.send_sequence = self.send_sequence.wrapping_add(1);
        sequence
    }

    pub fn send(&mut self, payload: &Payload, to: Endpoint) {
        self.broadcast(payload, std::slice::from_ref(&to));
    }

    pub fn send_packet(&mut self, packet: &Packet, to: Endpoint) {
        match packet.encode() {
            Ok(bytes) => self.send_bytes(&bytes, to),
            Err(e) => {
                self.stats.send_errors += 1;
                log::warn!("dropping {:?} for {}: {}", packet.header.kind, to, e);
            }
        }
    }

    pub fn broadcast(&mut self, payload: &Payload, to: &[Endpoint]) {
        if to.is_empty() {
            return;
        }
        let body = match payload.encode() {
            Ok(body) => body,
            Err(e) => {
                self.stats.send_errors += 1;
                log::warn!("dropping {:?}: {}", payload.kind(), e);
                return;
            }
        };
        // one encode, but every recipient gets its own sequence number
        for &endpoint in to {
            let sequence = self.next_sequence();
            match frame(payload.kind(), sequence, &body) {
                Ok(bytes) => self.send_bytes(&bytes, endpoint),
                Err(e) => {
                    self.stats.send_errors += 1;
                    log::warn!("dropping {:?} for {}: {}", payload.kind(), endpoint, e);
                    return;
                }
            }
        }
    }

    fn send_bytes(&mut self, bytes: &[u8], to: Endpoint) {
        if self.loss_sim.should_drop() {
            // counted as dropped, never as sent
            self.stats.packets_dropped += 1;
            return;
        }
        match self.socket.send_to(bytes, to.0) {
            Ok(sent) => {
                self.stats.packets_sent += 1;
                self.stats.bytes_sent += sent as u64;
            }
            Err(e) => {
                self.stats.send_errors += 1;
                log::warn!("send to {} failed: {}", to, e);
            }
        }
    }

    pub fn poll(&mut self) -> usize {
        let mut queued = 0;
        loop {
            match self.socket.recv_from(&mut self.recv_buffer) {
                Ok((size, addr)) => {
                    self.stats.bytes_received += size as u64;
                    match Packet::decode(&self.recv_buffer[..size]) {
                        Ok(packet) => {
                            self.stats.packets_received += 1;
                            self.inbound.push_back(Datagram {
                                header: packet.header,
                                payload: packet.payload,
                                sender: Endpoint(addr),
                            });
                            queued += 1;
                        }
                        Err(e) => {
                            self.stats.packets_dropped += 1;
                            log::debug!("dropped {} byte datagram from {}: {}", size, addr, e);
                        }
                    }
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                // ICMP port-unreachable surfaces here on some platforms
                Err(ref e) if e.kind() == io::ErrorKind::ConnectionReset => continue,
                Err(e) => {
                    log::warn!("receive failed: {}", e);
                    break;
                }
            }
        }
        queued
    }

    pub fn receive(&mut self) -> Option<Datagram> {
        if self.inbound.is_empty() {
            self.poll();
        }
        self.inbound.pop_front()
    }

    pub fn drain(&mut self) -> impl Iterator<Item = Datagram> + '_ {
        self.poll();
        self.inbound.drain(..)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loss_simulation_bounds() {
        assert!(!PacketLossSimulation::default().should_drop());
        assert!(!PacketLossSimulation::new(0.0).should_drop());
        assert!(PacketLossSimulation::new(100.0).should_drop());
    }

    #[test]
    fn receive_on_idle_socket_is_none() {
        let mut transport = Transport::bind("127.0.0.1:0").unwrap();
        assert!(transport.receive().is_none());
    }
}
