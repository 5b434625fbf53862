//! Scanner module: shared per-session state and scan reports

pub mod engine;

use crate::network::packet::PacketBuilder;
use crate::network::{PortProbe, TransportProtocol, Verdict};
use crate::ScanResult;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;

pub use engine::{ScanEngine, ScanSession, SessionOptions, SessionPhase};

/// Addresses and source port shared by every probe of one session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeContext {
    pub source: IpAddr,
    pub destination: IpAddr,
    pub source_port: u16,
}

impl ProbeContext {
    pub fn new(source: IpAddr, destination: IpAddr, source_port: u16) -> Self {
        Self {
            source,
            destination,
            source_port,
        }
    }

    pub fn packet_builder(&self) -> ScanResult<PacketBuilder> {
        PacketBuilder::new(self.source, self.destination, self.source_port)
    }
}

/// Verdict table shared between the sending side and the receive loops.
///
/// Entries only move away from `Pending`; once terminal they are never
/// overwritten. The lock is never held across an await point.
#[derive(Debug)]
pub struct ScanState {
    entries: Mutex<HashMap<PortProbe, Verdict>>,
    outstanding: watch::Sender<usize>,
}

impl Default for ScanState {
    fn default() -> Self {
        Self::new()
    }
}

impl ScanState {
    pub fn new() -> Self {
        let (outstanding, _) = watch::channel(0);
        Self {
            entries: Mutex::new(HashMap::new()),
            outstanding,
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<PortProbe, Verdict>> {
        // A panicking holder cannot leave the map half-updated, so poisoning is ignored.
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn publish_outstanding(&self, entries: &HashMap<PortProbe, Verdict>) {
        let pending = entries.values().filter(|v| **v == Verdict::Pending).count();
        self.outstanding.send_replace(pending);
    }

    /// Register `probe` as Pending before it is sent.
    ///
    /// Returns false when the probe already holds a terminal verdict.
    pub fn mark_pending(&self, probe: PortProbe) -> bool {
        let mut entries = self.entries();
        match entries.get(&probe) {
            Some(verdict) if verdict.is_terminal() => false,
            Some(_) => true,
            None => {
                entries.insert(probe, Verdict::Pending);
                self.publish_outstanding(&entries);
                true
            }
        }
    }

    /// Move a Pending probe to a terminal verdict.
    ///
    /// Returns true only for the call that performed the transition; probes
    /// that are unknown or already terminal are left untouched.
    pub fn resolve(&self, probe: PortProbe, verdict: Verdict) -> bool {
        if !verdict.is_terminal() {
            return false;
        }
        let mut entries = self.entries();
        match entries.get_mut(&probe) {
            Some(current) if *current == Verdict::Pending => {
                *current = verdict;
                self.publish_outstanding(&entries);
                true
            }
            _ => false,
        }
    }

    pub fn verdict(&self, probe: &PortProbe) -> Option<Verdict> {
        self.entries().get(probe).copied()
    }

    /// Pending probes, optionally restricted to one protocol, in port order.
    pub fn pending(&self, protocol: Option<TransportProtocol>) -> Vec<PortProbe> {
        let mut pending: Vec<PortProbe> = self
            .entries()
            .iter()
            .filter(|(probe, verdict)| {
                **verdict == Verdict::Pending && protocol.map_or(true, |p| probe.protocol == p)
            })
            .map(|(probe, _)| *probe)
            .collect();
        pending.sort();
        pending
    }

    pub fn outstanding(&self) -> usize {
        *self.outstanding.borrow()
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// All entries sorted by protocol then port.
    pub fn snapshot(&self) -> Vec<(PortProbe, Verdict)> {
        let mut all: Vec<_> = self.entries().iter().map(|(p, v)| (*p, *v)).collect();
        all.sort_by_key(|(probe, _)| *probe);
        all
    }

    /// Wait until no probe is Pending, for at most `window`.
    ///
    /// Returns true when the table settled before the window closed.
    pub async fn wait_settled(&self, window: Duration) -> bool {
        let mut outstanding = self.outstanding.subscribe();
        tokio::time::timeout(window, outstanding.wait_for(|pending| *pending == 0))
            .await
            .map(|changed| changed.is_ok())
            .unwrap_or(false)
    }
}

/// Final verdict of one probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortReport {
    pub address: IpAddr,
    pub port: u16,
    pub protocol: TransportProtocol,
    pub verdict: Verdict,
}

/// Outcome of one scan session against one destination address
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanReport {
    pub source: IpAddr,
    pub destination: IpAddr,
    pub results: Vec<PortReport>,
    pub duration: Duration,
}

impl ScanReport {
    pub fn new(context: &ProbeContext, entries: Vec<(PortProbe, Verdict)>, duration: Duration) -> Self {
        let results = entries
            .into_iter()
            .map(|(probe, verdict)| PortReport {
                address: context.destination,
                port: probe.port,
                protocol: probe.protocol,
                verdict,
            })
            .collect();
        Self {
            source: context.source,
            destination: context.destination,
            results,
            duration,
        }
    }

    pub fn count(&self, verdict: Verdict) -> usize {
        self.results.iter().filter(|r| r.verdict == verdict).count()
    }

    pub fn verdict_of(&self, probe: PortProbe) -> Option<Verdict> {
        self.results
            .iter()
            .find(|r| r.port == probe.port && r.protocol == probe.protocol)
            .map(|r| r.verdict)
    }

    pub fn ports_with(&self, protocol: TransportProtocol, verdict: Verdict) -> Vec<u16> {
        self.results
            .iter()
            .filter(|r| r.protocol == protocol && r.verdict == verdict)
            .map(|r| r.port)
            .collect()
    }
}
