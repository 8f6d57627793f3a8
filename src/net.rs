//! # Network Abstraction Layer
//!
//! This module defines the trait that abstracts the raw L2 transport the
//! engine drives, enabling different backends.
//!
//! ## Purpose
//!
//! The abstraction allows:
//! - **Production**: a packet-capture or OS-native L2 socket backend,
//!   maintained out of tree
//! - **Testing**: the in-memory [`sim`] hub for deterministic, fast
//!   network simulation
//!
//! The engine never inspects which backend it is running on; it only
//! sends and receives complete Ethernet frames and manages multicast
//! membership.

use std::future::Future;
use std::io;

use bytes::Bytes;

use crate::MacAddress;

pub mod sim;

/// Raw L2 network abstraction.
///
/// A backend delivers each received AVDECC frame (destination MAC equal
/// to the AVDECC multicast or one of the interface's own addresses)
/// exactly once, and sends frames fire-and-forget.
///
/// ## Required Methods
///
/// - `send`: transmit one complete Ethernet frame
/// - `recv`: await the next received frame
/// - `join_multicast` / `leave_multicast`: multicast group management
/// - `local_mac` / `interface_index`: interface identity
pub trait RawNetwork: Send + 'static {
    /// Transmit one complete Ethernet frame.
    fn send(&self, frame: Bytes) -> impl Future<Output = io::Result<()>> + Send;

    /// Await the next received frame.
    fn recv(&mut self) -> impl Future<Output = io::Result<Bytes>> + Send;

    /// Join a link-layer multicast group.
    fn join_multicast(&self, group: MacAddress) -> io::Result<()>;

    /// Leave a link-layer multicast group.
    fn leave_multicast(&self, group: MacAddress) -> io::Result<()>;

    /// The MAC address of the underlying interface.
    fn local_mac(&self) -> MacAddress;

    /// The OS interface index of the underlying interface.
    fn interface_index(&self) -> u16;
}
