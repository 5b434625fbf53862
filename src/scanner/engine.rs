//! Scan session state machine and the top-level engine

use crate::config::{ScanConfig, UdpSilencePolicy};
use crate::network::capture::{receive_loop, DatagramSource, ResponseClassifier};
use crate::network::interface::{self, InterfaceAddress};
use crate::network::packet::PacketBuilder;
use crate::network::socket::{self, ProbeSender, RawSender};
use crate::network::{build_probes, AddressFamily, PortProbe, TransportProtocol, Verdict};
use crate::scanner::{ProbeContext, ScanReport, ScanState};
use crate::utils::target::resolve_target;
use crate::{ScanError, ScanResult};
use futures::future::join_all;
use rand::Rng;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

/// Upper bound on TCP retry passes
pub const MAX_RETRIES: u32 = 5;

/// How long a blocking receive call waits before re-checking cancellation
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Timing and policy knobs of one session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    pub timeout: Duration,
    pub retries: u32,
    pub warmup: Duration,
    pub shutdown_grace: Duration,
    pub udp_silence: UdpSilencePolicy,
    pub poll_interval: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(5000),
            retries: 1,
            warmup: Duration::from_millis(100),
            shutdown_grace: Duration::from_millis(3000),
            udp_silence: UdpSilencePolicy::Open,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Phases a session walks through, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Sending,
    AwaitingResponses,
    Retrying,
    Finalizing,
    Done,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionPhase::Idle => "idle",
            SessionPhase::Sending => "sending",
            SessionPhase::AwaitingResponses => "awaiting responses",
            SessionPhase::Retrying => "retrying",
            SessionPhase::Finalizing => "finalizing",
            SessionPhase::Done => "done",
        };
        f.write_str(name)
    }
}

/// Ephemeral source port shared by every probe of a session
pub fn random_source_port() -> u16 {
    let mut rng = rand::thread_rng();
    rng.gen_range(32768..65535)
}

/// One scan of one destination address.
///
/// The session owns its send socket and receive sockets. The receive loops
/// are cancelled when [`ScanSession::run`] returns or its future is dropped,
/// and their sockets close within one poll interval.
pub struct ScanSession {
    context: ProbeContext,
    options: SessionOptions,
    sender: Arc<dyn ProbeSender>,
    sources: Vec<Box<dyn DatagramSource>>,
    phase: SessionPhase,
    history: Vec<SessionPhase>,
}

impl ScanSession {
    pub fn new(
        context: ProbeContext,
        options: SessionOptions,
        sender: Arc<dyn ProbeSender>,
        sources: Vec<Box<dyn DatagramSource>>,
    ) -> Self {
        Self {
            context,
            options,
            sender,
            sources,
            phase: SessionPhase::Idle,
            history: vec![SessionPhase::Idle],
        }
    }

    /// Open raw sockets on `source` for a scan of `destination`.
    pub fn open(source: InterfaceAddress, destination: IpAddr, options: SessionOptions) -> ScanResult<Self> {
        let context = ProbeContext::new(source.ip, destination, random_source_port());
        let sender = RawSender::open(&source)?;
        let sources = socket::open_listeners(&source, options.poll_interval)?;
        Ok(Self::new(context, options, Arc::new(sender), sources))
    }

    pub fn context(&self) -> &ProbeContext {
        &self.context
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Every phase entered so far, starting with Idle
    pub fn history(&self) -> &[SessionPhase] {
        &self.history
    }

    fn enter(&mut self, phase: SessionPhase) {
        log::debug!("{}: {} -> {}", self.context.destination, self.phase, phase);
        self.phase = phase;
        self.history.push(phase);
    }

    /// Probe every entry of `probes` and return the final verdicts.
    ///
    /// A session runs once; its receive sockets are consumed by the run.
    pub async fn run(&mut self, probes: &[PortProbe]) -> ScanResult<ScanReport> {
        if self.phase != SessionPhase::Idle {
            return Err(ScanError::ConfigError(format!(
                "session for {} already ran",
                self.context.destination
            )));
        }
        if probes.is_empty() {
            return Err(ScanError::ConfigError("no ports to scan".to_string()));
        }
        let start_time = Instant::now();
        let builder = self.context.packet_builder()?;
        let state = Arc::new(ScanState::new());
        let classifier = Arc::new(ResponseClassifier::new(
            state.clone(),
            self.context.destination,
            self.context.source_port,
        ));

        log::info!(
            "Scanning {} from {}:{} ({} probes)",
            self.context.destination,
            self.context.source,
            self.context.source_port,
            probes.len()
        );

        let cancel = CancellationToken::new();
        // Receive loops stop on every exit path, including a dropped future.
        let _stop_listeners = cancel.clone().drop_guard();
        let listeners = self.spawn_listeners(&classifier, &cancel);
        tokio::time::sleep(self.options.warmup).await;

        self.enter(SessionPhase::Sending);
        self.send_all(&builder, &state, probes).await;
        self.enter(SessionPhase::AwaitingResponses);
        state.wait_settled(self.options.timeout).await;

        let silence = self.options.udp_silence.verdict();
        for probe in state.pending(Some(TransportProtocol::Udp)) {
            if state.resolve(probe, silence) {
                log::debug!("{} {} {} (no response)", self.context.destination, probe, silence);
            }
        }

        for pass in 1..=self.options.retries.min(MAX_RETRIES) {
            let unanswered = state.pending(Some(TransportProtocol::Tcp));
            if unanswered.is_empty() {
                break;
            }
            self.enter(SessionPhase::Retrying);
            log::info!(
                "Retry pass {} for {} unanswered TCP ports on {}",
                pass,
                unanswered.len(),
                self.context.destination
            );
            self.enter(SessionPhase::Sending);
            self.send_all(&builder, &state, &unanswered).await;
            self.enter(SessionPhase::AwaitingResponses);
            state.wait_settled(self.options.timeout).await;
        }

        self.enter(SessionPhase::Finalizing);
        for probe in state.pending(None) {
            state.resolve(probe, Verdict::Filtered);
        }
        let report = ScanReport::new(&self.context, state.snapshot(), start_time.elapsed());

        // Listeners are joined in the background, bounded by the grace period.
        cancel.cancel();
        tokio::spawn(join_listeners(
            self.context.destination,
            listeners,
            self.options.shutdown_grace,
        ));

        log::info!(
            "{}: {} open, {} closed, {} filtered in {:.2?}",
            report.destination,
            report.count(Verdict::Open),
            report.count(Verdict::Closed),
            report.count(Verdict::Filtered),
            report.duration
        );
        self.enter(SessionPhase::Done);
        Ok(report)
    }

    fn spawn_listeners(
        &mut self,
        classifier: &Arc<ResponseClassifier>,
        cancel: &CancellationToken,
    ) -> Vec<JoinHandle<usize>> {
        self.sources
            .drain(..)
            .map(|mut source| {
                let classifier = classifier.clone();
                let cancel = cancel.clone();
                tokio::task::spawn_blocking(move || receive_loop(source.as_mut(), &classifier, &cancel))
            })
            .collect()
    }

    /// Fan out one send task per probe. Returns the number sent.
    async fn send_all(&self, builder: &PacketBuilder, state: &Arc<ScanState>, probes: &[PortProbe]) -> usize {
        let destination = self.context.destination;
        let handles = probes.iter().map(|&probe| {
            let builder = *builder;
            let sender = self.sender.clone();
            let state = state.clone();
            tokio::spawn(async move {
                state.mark_pending(probe);
                let packet = match builder.build(probe.port, probe.protocol) {
                    Ok(packet) => packet,
                    Err(e) => {
                        log::warn!("Cannot build probe {}: {}", probe, e);
                        return false;
                    }
                };
                match sender.send_probe(&packet, SocketAddr::new(destination, probe.port)) {
                    Ok(_) => true,
                    Err(e) => {
                        log::warn!("Send to {} {} failed: {}", destination, probe, e);
                        false
                    }
                }
            })
        });

        let sent = join_all(handles)
            .await
            .into_iter()
            .filter(|result| matches!(result, Ok(true)))
            .count();
        log::debug!("{}: sent {}/{} probes", destination, sent, probes.len());
        sent
    }
}

/// Wait for cancelled receive loops, abandoning them after `grace`.
async fn join_listeners(destination: IpAddr, listeners: Vec<JoinHandle<usize>>, grace: Duration) {
    match timeout(grace, join_all(listeners)).await {
        Ok(results) => {
            let received: usize = results.into_iter().filter_map(|r| r.ok()).sum();
            log::debug!("{}: listeners read {} datagrams", destination, received);
        }
        Err(_) => log::warn!(
            "Receive loops for {} did not stop within {:?}; abandoning them",
            destination,
            grace
        ),
    }
}

/// Resolves the target, picks source addresses and runs one session per
/// usable destination address.
pub struct ScanEngine {
    config: ScanConfig,
}

impl ScanEngine {
    pub fn new(config: ScanConfig) -> ScanResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Pair each resolved destination with a source address on the interface.
    ///
    /// Destinations of a family the interface has no address for are skipped;
    /// when none remain the first such failure is returned.
    pub fn plan(
        &self,
        destinations: &[IpAddr],
        source_for: impl Fn(AddressFamily) -> ScanResult<InterfaceAddress>,
    ) -> ScanResult<Vec<(InterfaceAddress, IpAddr)>> {
        let mut plans = Vec::new();
        let mut skipped = None;
        for &destination in destinations {
            match source_for(AddressFamily::of(&destination)) {
                Ok(source) => plans.push((source, destination)),
                Err(e) if !e.is_fatal() => {
                    log::warn!("Skipping {}: {}", destination, e);
                    skipped.get_or_insert(e);
                }
                Err(e) => return Err(e),
            }
        }
        match (plans.is_empty(), skipped) {
            (true, Some(e)) => Err(e),
            (true, None) => Err(ScanError::InvalidTarget(format!(
                "{} did not resolve to any address",
                self.config.target
            ))),
            _ => Ok(plans),
        }
    }

    /// Scan every usable address of the target, one session at a time.
    pub async fn scan(&self) -> ScanResult<Vec<ScanReport>> {
        let interface_name = self
            .config
            .interface
            .as_deref()
            .ok_or_else(|| ScanError::ConfigError("no interface selected".to_string()))?;
        let destinations = resolve_target(&self.config.target).await?;
        let plans = self.plan(&destinations, |family| interface::source_address(interface_name, family))?;
        let probes = build_probes(&self.config.tcp_ports, &self.config.udp_ports);
        let options = self.config.session_options();

        let mut reports = Vec::with_capacity(plans.len());
        let mut skipped = None;
        for (source, destination) in plans {
            let outcome = match ScanSession::open(source, destination, options) {
                Ok(mut session) => session.run(&probes).await,
                Err(e) => Err(e),
            };
            match outcome {
                Ok(report) => reports.push(report),
                Err(e) if !e.is_fatal() => {
                    log::warn!("Scan of {} failed: {}", destination, e);
                    skipped.get_or_insert(e);
                }
                Err(e) => return Err(e),
            }
        }
        match (reports.is_empty(), skipped) {
            (true, Some(e)) => Err(e),
            _ => Ok(reports),
        }
    }
}
