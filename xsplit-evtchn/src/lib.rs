//! Event channel shim (spec §4.3).
//!
//! `bind`/`unbind`/`notify` on a per-interface signalling endpoint.
//! Delivery to a port's handler is single-threaded and edge-triggered;
//! the handler is expected to drain its ring before returning. `notify`
//! is idempotent-coalescing: any number of notifies that arrive between
//! two deliveries fold into a single extra delivery, mirroring the
//! "single tasklet instance per CPU" discipline in spec §5.

pub mod error;

pub use error::{EvtchnError, Result};

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

/// A port's coalescing state machine.
///
/// `Idle` -> `notify()` -> `Scheduled` -> worker wakes, -> `Running` ->
/// handler returns. If another `notify()` landed while `Running`, the
/// worker sees `RunningWithPending` and loops immediately instead of
/// going back to `Idle`; that's the coalescing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PortState {
    Idle,
    Scheduled,
    Running,
    RunningWithPending,
}

struct PortInner {
    state: Mutex<PortState>,
    wake: Condvar,
    stop: AtomicBool,
}

struct Port {
    inner: Arc<PortInner>,
    worker: Option<JoinHandle<()>>,
}

/// The event channel shim: one process-wide registry of bound ports.
#[derive(Default)]
pub struct EventChannel {
    ports: Mutex<HashMap<u32, Port>>,
}

impl EventChannel {
    pub fn new() -> Self {
        Self { ports: Mutex::new(HashMap::new()) }
    }

    /// Bind a handler to `port`. Delivery is edge-triggered: the handler
    /// fires once per coalesced notification batch and must drain its
    /// ring before returning (spec §4.3).
    pub fn bind<F>(&self, port: u32, mut handler: F) -> Result<()>
    where
        F: FnMut() + Send + 'static,
    {
        let mut ports = self.ports.lock().unwrap();
        if ports.contains_key(&port) {
            return Err(EvtchnError::AlreadyBound(port));
        }

        let inner = Arc::new(PortInner {
            state: Mutex::new(PortState::Idle),
            wake: Condvar::new(),
            stop: AtomicBool::new(false),
        });
        let worker_inner = inner.clone();

        let worker = std::thread::Builder::new()
            .name(format!("evtchn-{port}"))
            .spawn(move || {
                loop {
                    let mut state = worker_inner.state.lock().unwrap();
                    while *state == PortState::Idle && !worker_inner.stop.load(Ordering::Acquire) {
                        state = worker_inner.wake.wait(state).unwrap();
                    }
                    if worker_inner.stop.load(Ordering::Acquire) {
                        return;
                    }
                    *state = PortState::Running;
                    drop(state);

                    loop {
                        handler();

                        let mut state = worker_inner.state.lock().unwrap();
                        match *state {
                            PortState::RunningWithPending => {
                                *state = PortState::Running;
                                drop(state);
                                continue; // coalesced notify: run again immediately
                            }
                            _ => {
                                *state = PortState::Idle;
                                break;
                            }
                        }
                    }
                }
            })
            .expect("spawn event channel worker");

        ports.insert(port, Port { inner, worker: Some(worker) });
        Ok(())
    }

    /// Unbind `port`, stopping its worker and joining it.
    pub fn unbind(&self, port: u32) -> Result<()> {
        let mut port_entry = {
            let mut ports = self.ports.lock().unwrap();
            ports.remove(&port).ok_or(EvtchnError::NotBound(port))?
        };
        port_entry.inner.stop.store(true, Ordering::Release);
        port_entry.inner.wake.notify_all();
        if let Some(worker) = port_entry.worker.take() {
            let _ = worker.join();
        }
        Ok(())
    }

    /// Raise the doorbell on `port`. Idempotent-coalescing: if a
    /// delivery is already scheduled or running, this notify folds into
    /// it rather than queuing a second one.
    pub fn notify(&self, port: u32) -> Result<()> {
        let ports = self.ports.lock().unwrap();
        let entry = ports.get(&port).ok_or(EvtchnError::NotBound(port))?;
        let mut state = entry.inner.state.lock().unwrap();
        *state = match *state {
            PortState::Idle => {
                entry.inner.wake.notify_one();
                PortState::Scheduled
            }
            PortState::Scheduled => PortState::Scheduled,
            PortState::Running => PortState::RunningWithPending,
            PortState::RunningWithPending => PortState::RunningWithPending,
        };
        Ok(())
    }

    pub fn is_bound(&self, port: u32) -> bool {
        self.ports.lock().unwrap().contains_key(&port)
    }
}

impl Drop for EventChannel {
    fn drop(&mut self) {
        let ports: Vec<u32> = self.ports.lock().unwrap().keys().copied().collect();
        for port in ports {
            let _ = self.unbind(port);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[test]
    fn single_notify_triggers_one_delivery() {
        let ec = EventChannel::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        ec.bind(1, move || {
            c.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        ec.notify(1).unwrap();
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        ec.unbind(1).unwrap();
    }

    #[test]
    fn rapid_notifies_coalesce() {
        let ec = EventChannel::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        ec.bind(2, move || {
            std::thread::sleep(Duration::from_millis(20));
            c.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        for _ in 0..10 {
            ec.notify(2).unwrap();
        }
        std::thread::sleep(Duration::from_millis(200));
        let fired = count.load(Ordering::SeqCst);
        assert!(fired >= 1 && fired < 10, "expected coalescing, got {fired} deliveries");
        ec.unbind(2).unwrap();
    }

    #[test]
    fn double_bind_fails() {
        let ec = EventChannel::new();
        ec.bind(3, || {}).unwrap();
        assert_eq!(ec.bind(3, || {}), Err(EvtchnError::AlreadyBound(3)));
        ec.unbind(3).unwrap();
    }

    #[test]
    fn notify_unbound_port_fails() {
        let ec = EventChannel::new();
        assert_eq!(ec.notify(42), Err(EvtchnError::NotBound(42)));
    }
}
