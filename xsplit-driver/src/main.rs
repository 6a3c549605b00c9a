//! Network backend soak daemon.
//!
//! Usage: xsplit-driver <interface_id> <domid> [ring_capacity] [credit_bytes] [credit_usec]
//!
//! Owns both halves of a shared TX ring and runs the backend tasklet
//! loop against them, synthesizing guest sends at a fixed rate and
//! completing each delivered packet as soon as the (simulated) host
//! stack would hand it off. There is no real grant-table driver in
//! this workspace, so the hypercall boundary is the same simulated one
//! the crate's own tests use - a production deployment wires
//! `NetBackHypercalls` to the kernel's grant-mapping ioctls instead.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use xsplit_netback::hypervisor::sim::SimNetBackHypervisor;
use xsplit_netback::TxBackend;
use xsplit_netfront::wire::{pack_grant_addr, TxRequest, TxResponse};
use xsplit_ring::{new_ring, FrontRing, NullNotify};

const GRANT_POOL: usize = 64;
const SEND_BATCH: usize = 32;
const STATS_INTERVAL: Duration = Duration::from_secs(5);

fn main() {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 {
        eprintln!("Usage: xsplit-driver <interface_id> <domid> [ring_capacity] [credit_bytes] [credit_usec]");
        std::process::exit(1);
    }
    let interface_id: u32 = args[1].parse().expect("invalid interface_id");
    let domid: u32 = args[2].parse().expect("invalid domid");
    let ring_capacity: usize = args.get(3).map(|s| s.parse().expect("invalid ring_capacity")).unwrap_or(256);
    let credit_bytes: u64 = args.get(4).map(|s| s.parse().expect("invalid credit_bytes")).unwrap_or(1_000_000);
    let credit_usec: u64 = args.get(5).map(|s| s.parse().expect("invalid credit_usec")).unwrap_or(100_000);

    #[cfg(feature = "tracing")]
    tracing_subscriber::fmt::init();

    println!("xsplit-driver interface={interface_id} domid={domid} ring={ring_capacity} credit={credit_bytes}B/{credit_usec}us");

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || r.store(false, Ordering::SeqCst)).ok();

    let hv = SimNetBackHypervisor::new();
    for gref in 0..GRANT_POOL as u16 {
        hv.register_grant(domid, gref, 0x10_000 + gref as u64);
    }

    let (mut guest, back) = new_ring::<TxRequest, TxResponse>(ring_capacity, interface_id).expect("ring setup");
    let mut backend = TxBackend::new(hv);
    backend.register_interface(interface_id, domid, back, credit_bytes, credit_usec, Instant::now());

    run_soak_loop(&mut guest, &mut backend, interface_id, &running);
}

fn run_soak_loop(
    guest: &mut FrontRing<TxRequest, TxResponse>,
    backend: &mut TxBackend<SimNetBackHypervisor>,
    interface_id: u32,
    running: &Arc<AtomicBool>,
) {
    let (mut sent, mut delivered_total, mut completed, mut last) = (0u64, 0u64, 0u64, Instant::now());
    let mut next_gref: u16 = 0;
    let mut next_id: u16 = 0;

    while running.load(Ordering::Relaxed) {
        let mut queued = 0;
        while queued < SEND_BATCH && !guest.is_full() {
            let gref = next_gref;
            next_gref = (next_gref + 1) % GRANT_POOL as u16;
            guest
                .push_request(TxRequest { id: next_id, addr: pack_grant_addr(gref, 0), size: 512, csum_blank: 0 })
                .expect("checked not full");
            next_id = next_id.wrapping_add(1);
            queued += 1;
        }
        if queued > 0 {
            guest.publish_requests(&NullNotify);
            sent += queued as u64;
        }

        backend.kick(interface_id);
        let now = Instant::now();
        let delivered = backend.run_once(now).expect("tasklet pass");
        delivered_total += delivered.len() as u64;
        for packet in delivered {
            // Stand in for the host network stack's send completion.
            backend.completion_sender().send(packet.pending_idx).ok();
        }
        backend.run_once(now).expect("drain completions");

        let mut responses = Vec::new();
        guest.drain_responses(&mut responses).expect("ring intact");
        completed += responses.len() as u64;

        if last.elapsed() > STATS_INTERVAL {
            println!("  sent={sent} delivered={delivered_total} completed={completed}");
            last = Instant::now();
        }
        thread::yield_now();
    }
    println!("done sent={sent} delivered={delivered_total} completed={completed}");
}
