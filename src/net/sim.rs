//! In-memory virtual AVB network.
//!
//! A [`VirtualAvbNetwork`] is a hub: every frame sent by one attached
//! port is delivered to every other port whose address matches the
//! frame's destination, and to every tap. Tests attach one port for the
//! engine under test and further ports for simulated peers, then drive
//! traffic with a paused tokio clock.

use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::net::RawNetwork;
use crate::wire::EthernetHeader;
use crate::MacAddress;

#[derive(Default)]
struct HubInner {
    ports: HashMap<MacAddress, mpsc::UnboundedSender<Bytes>>,
    taps: Vec<mpsc::UnboundedSender<Bytes>>,
    next_interface_index: u16,
}

/// The shared hub all virtual ports hang off.
#[derive(Clone, Default)]
pub struct VirtualAvbNetwork {
    inner: Arc<Mutex<HubInner>>,
}

impl VirtualAvbNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a port with the given MAC address.
    pub fn attach(&self, mac: MacAddress) -> VirtualPort {
        let (tx, rx) = mpsc::unbounded_channel();
        let interface_index = {
            let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            inner.next_interface_index += 1;
            inner.ports.insert(mac, tx);
            inner.next_interface_index
        };
        VirtualPort {
            mac,
            interface_index,
            hub: Arc::clone(&self.inner),
            rx,
        }
    }

    /// Receive a copy of every frame on the network, regardless of its
    /// destination. Useful for asserting on emitted traffic.
    pub fn tap(&self) -> mpsc::UnboundedReceiver<Bytes> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .taps
            .push(tx);
        rx
    }
}

/// One attachment point on a [`VirtualAvbNetwork`].
pub struct VirtualPort {
    mac: MacAddress,
    interface_index: u16,
    hub: Arc<Mutex<HubInner>>,
    rx: mpsc::UnboundedReceiver<Bytes>,
}

impl VirtualPort {
    fn deliver(&self, frame: &Bytes) {
        let mut buf = &frame[..];
        let destination = EthernetHeader::parse(&mut buf).map(|header| header.dst);

        let mut inner = self.hub.lock().unwrap_or_else(|e| e.into_inner());
        inner.taps.retain(|tap| tap.send(frame.clone()).is_ok());
        inner.ports.retain(|mac, port| {
            if *mac == self.mac {
                return true; // no loopback to the sender
            }
            let wanted = match destination {
                Some(dst) => dst == *mac || dst.is_multicast(),
                None => false,
            };
            if wanted {
                port.send(frame.clone()).is_ok()
            } else {
                // keep silent ports alive until their receiver goes away
                !port.is_closed()
            }
        });
    }
}

impl RawNetwork for VirtualPort {
    async fn send(&self, frame: Bytes) -> io::Result<()> {
        self.deliver(&frame);
        Ok(())
    }

    async fn recv(&mut self) -> io::Result<Bytes> {
        self.rx
            .recv()
            .await
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "virtual network shut down"))
    }

    fn join_multicast(&self, _group: MacAddress) -> io::Result<()> {
        // The hub already forwards all multicast traffic.
        Ok(())
    }

    fn leave_multicast(&self, _group: MacAddress) -> io::Result<()> {
        Ok(())
    }

    fn local_mac(&self) -> MacAddress {
        self.mac
    }

    fn interface_index(&self) -> u16 {
        self.interface_index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mac(tail: u8) -> MacAddress {
        MacAddress::new([0x02, 0, 0, 0, 0, tail])
    }

    fn frame_to(dst: MacAddress, src: MacAddress) -> Bytes {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&dst.octets());
        bytes.extend_from_slice(&src.octets());
        bytes.extend_from_slice(&crate::wire::AVDECC_ETHERTYPE.to_be_bytes());
        Bytes::from(bytes)
    }

    #[test_log::test(tokio::test)]
    async fn multicast_reaches_all_other_ports() {
        let hub = VirtualAvbNetwork::new();
        let alpha = hub.attach(mac(1));
        let mut beta = hub.attach(mac(2));
        let mut gamma = hub.attach(mac(3));

        alpha
            .send(frame_to(MacAddress::AVDECC_MULTICAST, mac(1)))
            .await
            .unwrap();

        assert!(beta.recv().await.is_ok());
        assert!(gamma.recv().await.is_ok());
    }

    #[test_log::test(tokio::test)]
    async fn unicast_reaches_only_the_addressee() {
        let hub = VirtualAvbNetwork::new();
        let alpha = hub.attach(mac(1));
        let mut beta = hub.attach(mac(2));
        let mut gamma = hub.attach(mac(3));

        alpha.send(frame_to(mac(2), mac(1))).await.unwrap();
        assert!(beta.recv().await.is_ok());

        // gamma saw nothing
        assert!(gamma.rx.try_recv().is_err());
    }

    #[test_log::test(tokio::test)]
    async fn tap_sees_everything() {
        let hub = VirtualAvbNetwork::new();
        let mut tap = hub.tap();
        let alpha = hub.attach(mac(1));
        let _beta = hub.attach(mac(2));

        alpha.send(frame_to(mac(2), mac(1))).await.unwrap();
        alpha
            .send(frame_to(MacAddress::AVDECC_MULTICAST, mac(1)))
            .await
            .unwrap();

        assert!(tap.recv().await.is_some());
        assert!(tap.recv().await.is_some());
    }
}
