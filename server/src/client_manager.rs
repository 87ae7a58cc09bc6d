//! Client connection management for the match server
//!
//! This module handles the server-side bookkeeping of connected clients:
//! - Client connection lifecycle (connect, disconnect, timeout)
//! - Per-client request sequencing so duplicated or reordered datagrams are
//!   applied at most once
//! - Client capacity management and address tracking
//!
//! Client ids double as player ids in the match, and a player's starting team
//! follows from the id. An address that reconnects therefore gets back the id
//! it had before; fresh addresses get the next unused id.

use log::info;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Silence after which a client is considered gone.
pub const CLIENT_TIMEOUT: Duration = Duration::from_secs(5);

/// A connected client
#[derive(Debug)]
pub struct Client {
    /// Unique client identifier assigned by the server
    pub id: u32,
    /// Network address for sending responses
    pub addr: SocketAddr,
    /// Last time we received any packet from this client
    pub last_seen: Instant,
    /// Highest request sequence accepted so far
    pub last_request_sequence: Option<u32>,
}

impl Client {
    pub fn new(id: u32, addr: SocketAddr) -> Self {
        Self {
            id,
            addr,
            last_seen: Instant::now(),
            last_request_sequence: None,
        }
    }

    /// Accepts `sequence` if it is newer than anything seen before.
    ///
    /// UDP may duplicate or reorder datagrams; a request whose sequence is
    /// not strictly greater than the last accepted one is dropped so that
    /// fire, reload and lobby requests take effect once.
    pub fn accept_sequence(&mut self, sequence: u32) -> bool {
        match self.last_request_sequence {
            Some(last) if sequence <= last => false,
            _ => {
                self.last_request_sequence = Some(sequence);
                true
            }
        }
    }

    /// Returns true if nothing arrived from this client within `timeout`.
    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// Manages all connected clients
///
/// Enforces the server's capacity limit, maps datagram source addresses to
/// client ids, and drops clients that stopped talking.
pub struct ClientManager {
    /// Connected clients indexed by their unique ID
    clients: HashMap<u32, Client>,
    /// Ids already issued, by the address they were issued to
    issued_ids: HashMap<SocketAddr, u32>,
    /// Next available client ID for new connections
    next_client_id: u32,
    /// Maximum number of concurrent clients allowed
    max_clients: usize,
}

impl ClientManager {
    /// Creates an empty manager. Client IDs start from 1.
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: HashMap::new(),
            issued_ids: HashMap::new(),
            next_client_id: 1,
            max_clients,
        }
    }

    /// Attempts to add a new client connection
    ///
    /// An address seen before gets its previous id back, so a player who
    /// drops and reconnects lands on the same starting team. The caller must
    /// remove any live connection from `addr` first.
    ///
    /// Returns Some(client_id) if successful, None if the server is full.
    pub fn add_client(&mut self, addr: SocketAddr) -> Option<u32> {
        if self.clients.len() >= self.max_clients {
            return None;
        }

        let client_id = match self.issued_ids.get(&addr) {
            Some(&id) if !self.clients.contains_key(&id) => id,
            _ => {
                let id = self.next_client_id;
                self.next_client_id += 1;
                self.issued_ids.insert(addr, id);
                id
            }
        };

        info!("Client {} connected from {}", client_id, addr);
        self.clients.insert(client_id, Client::new(client_id, addr));

        Some(client_id)
    }

    /// Removes a client. Returns false if they were already gone.
    pub fn remove_client(&mut self, client_id: &u32) -> bool {
        if let Some(client) = self.clients.remove(client_id) {
            info!("Client {} disconnected", client.id);
            true
        } else {
            false
        }
    }

    /// Finds a client ID by their network address
    pub fn find_client_by_addr(&self, addr: SocketAddr) -> Option<u32> {
        self.clients
            .iter()
            .find(|(_, client)| client.addr == addr)
            .map(|(id, _)| *id)
    }

    pub fn addr_of(&self, client_id: u32) -> Option<SocketAddr> {
        self.clients.get(&client_id).map(|client| client.addr)
    }

    /// Marks the client as alive right now.
    pub fn touch(&mut self, client_id: u32) {
        if let Some(client) = self.clients.get_mut(&client_id) {
            client.last_seen = Instant::now();
        }
    }

    /// Runs the duplicate filter for one request. Unknown clients are
    /// rejected.
    pub fn accept_sequence(&mut self, client_id: u32, sequence: u32) -> bool {
        self.clients
            .get_mut(&client_id)
            .map_or(false, |client| client.accept_sequence(sequence))
    }

    /// Checks for and removes timed-out clients
    ///
    /// Returns the removed client IDs so the match can drop their players.
    pub fn check_timeouts(&mut self) -> Vec<u32> {
        let timed_out: Vec<u32> = self
            .clients
            .iter()
            .filter(|(_, client)| client.is_timed_out(CLIENT_TIMEOUT))
            .map(|(id, _)| *id)
            .collect();

        for client_id in &timed_out {
            self.remove_client(client_id);
        }

        timed_out
    }

    /// Gets all client IDs and their network addresses, for broadcasting.
    pub fn get_client_addrs(&self) -> Vec<(u32, SocketAddr)> {
        self.clients
            .iter()
            .map(|(id, client)| (*id, client.addr))
            .collect()
    }

    pub fn client_ids(&self) -> Vec<u32> {
        self.clients.keys().copied().collect()
    }

    /// Returns the number of currently connected clients
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Returns true if no clients are currently connected
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_addr() -> SocketAddr {
        "127.0.0.1:8080".parse().unwrap()
    }

    fn test_addr2() -> SocketAddr {
        "127.0.0.1:8081".parse().unwrap()
    }

    #[test]
    fn test_client_creation() {
        let addr = test_addr();
        let client = Client::new(1, addr);

        assert_eq!(client.id, 1);
        assert_eq!(client.addr, addr);
        assert_eq!(client.last_request_sequence, None);
    }

    #[test]
    fn test_client_sequence_filter() {
        let mut client = Client::new(1, test_addr());

        assert!(client.accept_sequence(0));
        assert!(client.accept_sequence(3));
        assert!(!client.accept_sequence(3));
        assert!(!client.accept_sequence(2));
        assert!(client.accept_sequence(4));
        assert_eq!(client.last_request_sequence, Some(4));
    }

    #[test]
    fn test_client_timeout() {
        let mut client = Client::new(1, test_addr());

        assert!(!client.is_timed_out(Duration::from_secs(1)));

        client.last_seen = Instant::now() - Duration::from_secs(2);

        assert!(client.is_timed_out(Duration::from_secs(1)));
    }

    #[test]
    fn test_client_manager_creation() {
        let manager = ClientManager::new(5);
        assert_eq!(manager.max_clients, 5);
        assert!(manager.is_empty());
        assert_eq!(manager.len(), 0);
    }

    #[test]
    fn test_add_multiple_clients() {
        let mut manager = ClientManager::new(3);

        let client_id1 = manager.add_client(test_addr()).unwrap();
        let client_id2 = manager.add_client(test_addr2()).unwrap();

        assert_eq!(client_id1, 1);
        assert_eq!(client_id2, 2);
        assert_eq!(manager.len(), 2);
        assert_eq!(manager.addr_of(client_id2), Some(test_addr2()));
    }

    #[test]
    fn test_add_client_max_capacity() {
        let mut manager = ClientManager::new(1);

        assert!(manager.add_client(test_addr()).is_some());
        assert!(manager.add_client(test_addr2()).is_none());
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_reconnect_gets_previous_id() {
        let mut manager = ClientManager::new(3);

        let first = manager.add_client(test_addr()).unwrap();
        let other = manager.add_client(test_addr2()).unwrap();
        assert!(manager.remove_client(&first));
        assert!(!manager.remove_client(&first));

        assert_eq!(manager.add_client(test_addr()), Some(first));

        let fresh: SocketAddr = "127.0.0.1:8082".parse().unwrap();
        let third = manager.add_client(fresh).unwrap();
        assert_ne!(third, first);
        assert_ne!(third, other);
    }

    #[test]
    fn test_find_client_by_addr() {
        let mut manager = ClientManager::new(2);

        let client_id1 = manager.add_client(test_addr()).unwrap();
        manager.add_client(test_addr2()).unwrap();

        assert_eq!(manager.find_client_by_addr(test_addr()), Some(client_id1));

        let unknown_addr: SocketAddr = "192.168.1.1:9999".parse().unwrap();
        assert_eq!(manager.find_client_by_addr(unknown_addr), None);
    }

    #[test]
    fn test_accept_sequence_per_client() {
        let mut manager = ClientManager::new(2);
        let a = manager.add_client(test_addr()).unwrap();
        let b = manager.add_client(test_addr2()).unwrap();

        assert!(manager.accept_sequence(a, 5));
        assert!(manager.accept_sequence(b, 1));
        assert!(!manager.accept_sequence(a, 5));
        assert!(!manager.accept_sequence(99, 1));
    }

    #[test]
    fn test_check_timeouts_removes_silent_clients() {
        let mut manager = ClientManager::new(2);
        let quiet = manager.add_client(test_addr()).unwrap();
        let chatty = manager.add_client(test_addr2()).unwrap();

        if let Some(client) = manager.clients.get_mut(&quiet) {
            client.last_seen = Instant::now() - Duration::from_secs(10);
        }
        manager.touch(chatty);

        assert_eq!(manager.check_timeouts(), vec![quiet]);
        assert_eq!(manager.client_ids(), vec![chatty]);
    }
}
