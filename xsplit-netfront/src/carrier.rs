//! Carrier learning: a gratuitous ARP announcement sent on transition
//! to Connected, so learning bridges pick up the interface's MAC
//! without the frontend having to understand bridge internals (spec
//! §4.6 "Carrier learning").

const ETHERTYPE_ARP: u16 = 0x0806;
const ARP_HTYPE_ETHERNET: u16 = 1;
const ARP_PTYPE_IPV4: u16 = 0x0800;
const ARP_OPER_REPLY: u16 = 2;
const BROADCAST: [u8; 6] = [0xff; 6];

/// The guest networking stack's injection point for frames the frontend
/// originates itself, as opposed to RX traffic delivered through the
/// ring. Out-of-scope collaborator: whatever owns the netif device
/// queues the frame for delivery to the stack above it.
pub trait PacketSink {
    fn send(&mut self, frame: &[u8]);
}

/// Build and hand off a gratuitous ARP announcement through `sink`
/// (spec §4.6 "Carrier learning", run once on the Connected transition).
pub fn announce_carrier<S: PacketSink>(sink: &mut S, mac: [u8; 6]) {
    sink.send(&build_gratuitous_arp(mac));
}

/// Build a gratuitous ARP announcement frame: an ARP reply whose
/// sender and target hardware addresses are both `mac`, broadcast at
/// the Ethernet layer. IP addresses are left as `0.0.0.0` since the
/// frontend has no IP configuration of its own to announce - bridge
/// learning keys off the Ethernet source address, not the ARP payload.
pub fn build_gratuitous_arp(mac: [u8; 6]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(14 + 28);

    frame.extend_from_slice(&BROADCAST);
    frame.extend_from_slice(&mac);
    frame.extend_from_slice(&ETHERTYPE_ARP.to_be_bytes());

    frame.extend_from_slice(&ARP_HTYPE_ETHERNET.to_be_bytes());
    frame.extend_from_slice(&ARP_PTYPE_IPV4.to_be_bytes());
    frame.push(6); // hardware address length
    frame.push(4); // protocol address length
    frame.extend_from_slice(&ARP_OPER_REPLY.to_be_bytes());
    frame.extend_from_slice(&mac); // sender hardware address
    frame.extend_from_slice(&[0u8; 4]); // sender protocol address
    frame.extend_from_slice(&mac); // target hardware address
    frame.extend_from_slice(&[0u8; 4]); // target protocol address

    frame
}
