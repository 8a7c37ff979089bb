//! The public entry point: owns the graph lock, the pending-edge queue, a
//! dedicated update thread, and the dispatcher that delivers `onEnded`
//! callbacks off the render thread.
//!
//! Three threads meet here (see the concurrency model): whichever thread
//! calls [`Context`]'s methods (the "graph thread"), the update thread
//! spawned by [`Context::new`], and the render thread, which only ever
//! calls [`Context::render_quantum`]. The render thread's lock is the same
//! `Mutex<AudioGraph>` the update thread's drain uses -- see
//! [`crate::graph`] for why one mutex safely plays both roles.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use audiograph_core::atomic_float::AtomicF64;
use audiograph_core::channel_config::ChannelCount;
use audiograph_core::error::GraphEditError;
use audiograph_core::lock::RenderLockGuard;
use audiograph_core::node::AudioNode;
use audiograph_core::sample::Bus;
use audiograph_core::GraphConfig;

use crate::dispatcher::Dispatcher;
use crate::graph::AudioGraph;
use crate::node_id::NodeId;
use crate::pending::{Phase, PendingEdge, PendingQueue};

/// The render clock: readable lock-free from any thread (`current_time`,
/// `current_sample_frame`, `sample_rate`), written only by the render
/// thread once per quantum.
#[derive(Default)]
struct RenderClock {
    seconds: AtomicF64,
    samples: AtomicI64,
    sample_rate: AtomicU32,
}

struct Shared {
    graph: Mutex<AudioGraph>,
    pending: Mutex<PendingQueue>,
    cv: Condvar,
    dispatcher: Dispatcher,
    config: GraphConfig,
    clock: RenderClock,
    shutdown_requested: Mutex<bool>,
    /// Seconds the update thread keeps running past a shutdown request, to
    /// let an in-flight `finishDisconnect` crossfade complete. Refreshed
    /// whenever a `Disconnect`-phase edge begins fading.
    graph_keep_alive: Mutex<f64>,
}

impl Shared {
    fn wake_interval(&self) -> Duration {
        Duration::from_secs_f64(
            self.config.update_thread_wake_quanta as f64 * audiograph_core::sample::BLOCK_FRAMES as f64
                / self.config.sample_rate as f64,
        )
    }
}

/// The engine's single entry point. Construct one per audio session; it
/// owns the graph, starts its update thread immediately, and tears both
/// down on drop.
pub struct Context {
    shared: Arc<Shared>,
    update_thread: Option<JoinHandle<()>>,
}

impl Context {
    pub fn new(config: GraphConfig) -> Self {
        let shared = Arc::new(Shared {
            graph: Mutex::new(AudioGraph::with_config(config.sample_rate, config.disconnect_crossfade_seconds)),
            pending: Mutex::new(PendingQueue::new()),
            cv: Condvar::new(),
            dispatcher: Dispatcher::new(config.dispatcher_queue_capacity),
            clock: RenderClock {
                sample_rate: AtomicU32::new(config.sample_rate),
                ..RenderClock::default()
            },
            config,
            shutdown_requested: Mutex::new(false),
            graph_keep_alive: Mutex::new(0.0),
        });

        let update_thread = {
            let shared = shared.clone();
            std::thread::Builder::new()
                .name("audiograph-update".into())
                .spawn(move || update_loop(&shared))
                .expect("failed to spawn the audiograph update thread")
        };

        Self {
            shared,
            update_thread: Some(update_thread),
        }
    }

    pub fn add_node(
        &self,
        node: Box<dyn AudioNode>,
    ) -> Result<NodeId, Box<dyn std::error::Error + Send + Sync>> {
        let mut graph = self.shared.graph.lock().unwrap();
        graph.add_node(node, self.shared.config.sample_rate)
    }

    pub fn set_destination(&self, node: NodeId) {
        self.shared.graph.lock().unwrap().set_destination(node);
    }

    pub fn register_automatic_pull(&self, node: NodeId) {
        self.shared.graph.lock().unwrap().register_automatic_pull(node);
    }

    pub fn unregister_automatic_pull(&self, node: NodeId) {
        self.shared.graph.lock().unwrap().unregister_automatic_pull(node);
    }

    /// Enqueues a `connect` pending edge. Index-range and cycle-detection
    /// failures are reported synchronously and never reach the queue.
    pub fn connect(
        &self,
        dest: NodeId,
        src: NodeId,
        dest_input: u32,
        src_output: u32,
    ) -> Result<(), GraphEditError> {
        let now = self.current_time();
        self.shared
            .graph
            .lock()
            .unwrap()
            .validate_connect(dest, src, dest_input, src_output)?;

        self.shared.pending.lock().unwrap().push(PendingEdge {
            dest,
            src,
            dest_input,
            src_output,
            phase: Phase::Connect,
            remaining_duration: 0.0,
            horizon_seconds: now + 0.1,
        });
        self.shared.cv.notify_one();
        Ok(())
    }

    /// Enqueues a two-phase disconnect. A no-op (not an error) if the edge
    /// is not currently connected.
    pub fn disconnect(
        &self,
        dest: NodeId,
        src: NodeId,
        dest_input: u32,
        src_output: u32,
    ) -> Result<(), GraphEditError> {
        {
            let graph = self.shared.graph.lock().unwrap();
            let entry = graph.node(dest).ok_or(GraphEditError::InvalidNodeId)?;
            let input = entry
                .inputs
                .get(dest_input as usize)
                .ok_or(GraphEditError::InvalidInputIndex {
                    index: dest_input,
                    max: entry.inputs.len() as u32,
                })?;
            if !input.is_connected(src, src_output) {
                return Ok(());
            }
        }

        self.shared.pending.lock().unwrap().push(PendingEdge {
            dest,
            src,
            dest_input,
            src_output,
            phase: Phase::Disconnect,
            remaining_duration: self.shared.config.disconnect_crossfade_seconds,
            horizon_seconds: 0.0,
        });
        self.shared.cv.notify_one();
        Ok(())
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.shared.dispatcher
    }

    pub fn current_time(&self) -> f64 {
        self.shared.clock.seconds.load(Ordering::Acquire)
    }

    pub fn current_sample_frame(&self) -> i64 {
        self.shared.clock.samples.load(Ordering::Acquire)
    }

    pub fn sample_rate(&self) -> u32 {
        self.shared.clock.sample_rate.load(Ordering::Acquire)
    }

    /// Run one render quantum: refresh dirty summing junctions, tick
    /// automatic pull nodes, then pull the destination. Called by a
    /// backend's device callback, never by client code directly.
    ///
    /// Returns a zeroed stereo bus if no destination has been set yet --
    /// matching the "programmer error degrades to silence" policy rather
    /// than panicking on the render thread.
    pub fn render_quantum(&self, frames: usize) -> Bus {
        let lock = RenderLockGuard::new();
        let mut graph = self.shared.graph.lock().unwrap();

        graph.refresh_dirty_inputs(&lock);
        graph.advance_quantum();

        let sample_rate = self.shared.config.sample_rate;
        let clock_samples = self.shared.clock.samples.load(Ordering::Acquire);
        let clock_seconds = self.shared.clock.seconds.load(Ordering::Acquire);

        let automatic: Vec<NodeId> = graph.automatic_pull_nodes().copied().collect();
        for node in automatic {
            graph.process_if_necessary(node, frames, clock_seconds, clock_samples, &lock);
        }

        let out = match graph.destination() {
            Some(destination) => {
                graph.pull_input(destination, 0, frames, clock_seconds, clock_samples, &lock);
                graph
                    .input_bus(destination, 0)
                    .cloned()
                    .unwrap_or_else(|| Bus::silent(ChannelCount::STEREO, frames, sample_rate))
            }
            None => Bus::silent(ChannelCount::STEREO, frames, sample_rate),
        };

        self.shared
            .clock
            .samples
            .store(clock_samples + frames as i64, Ordering::Release);
        self.shared
            .clock
            .seconds
            .store(clock_seconds + frames as f64 / sample_rate as f64, Ordering::Release);

        for (node, callback) in graph.drain_finished_callbacks() {
            self.shared.dispatcher.enqueue(crate::dispatcher::FinishedEvent { node, callback });
        }

        out
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        *self.shared.shutdown_requested.lock().unwrap() = true;
        self.shared.cv.notify_one();
        if let Some(handle) = self.update_thread.take() {
            if handle.join().is_err() {
                log::warn!("audiograph update thread panicked during shutdown");
            }
        }
    }
}

/// Drains the pending queue once per wake interval, applying `connect`,
/// `disconnect`, and `finishDisconnect` in that phase order.
fn update_loop(shared: &Arc<Shared>) {
    let wake_interval = shared.wake_interval();

    loop {
        let guard = shared.shutdown_requested.lock().unwrap();
        let (guard, _timeout) = shared.cv.wait_timeout(guard, wake_interval).unwrap();
        let shutdown_requested = *guard;
        drop(guard);

        let now = shared.clock.seconds.load(Ordering::Acquire);
        let (mut connected, mut disconnected, mut finished) = (0u32, 0u32, 0u32);

        {
            let mut pending = shared.pending.lock().unwrap();
            let mut graph = shared.graph.lock().unwrap();

            pending.drain_one_pass(|edge| match edge.phase {
                Phase::Connect => {
                    let ready = match graph.node_pending_start_time(edge.src) {
                        Some(start_time) => now + 0.1 >= start_time || now >= edge.horizon_seconds,
                        None => true,
                    };
                    if !ready {
                        return Some(edge);
                    }
                    match graph.connect(edge.dest, edge.src, edge.dest_input, edge.src_output) {
                        Ok(()) => {
                            graph.set_edge_declick_target(edge.src, true);
                            connected += 1;
                        }
                        Err(err) => log::warn!("deferred connect failed: {err}"),
                    }
                    None
                }
                Phase::Disconnect => {
                    graph.disconnect(edge.dest, edge.src, edge.dest_input, edge.src_output);
                    graph.start_disconnect_fade(edge.dest, edge.dest_input, edge.src, edge.src_output);
                    disconnected += 1;
                    Some(PendingEdge {
                        phase: Phase::FinishDisconnect,
                        remaining_duration: shared.config.disconnect_crossfade_seconds,
                        ..edge
                    })
                }
                Phase::FinishDisconnect => {
                    finished += 1;
                    let remaining = edge.remaining_duration - wake_interval.as_secs_f64();
                    if remaining > 0.0 {
                        Some(PendingEdge {
                            remaining_duration: remaining,
                            ..edge
                        })
                    } else {
                        None
                    }
                }
            });
        }

        if connected + disconnected + finished > 0 {
            log::trace!(
                "update pass: {connected} connected, {disconnected} disconnect-started, {finished} fading"
            );
        }

        let mut keep_alive = shared.graph_keep_alive.lock().unwrap();
        if disconnected > 0 {
            *keep_alive = shared.config.disconnect_crossfade_seconds;
        } else {
            *keep_alive = (*keep_alive - wake_interval.as_secs_f64()).max(0.0);
        }
        let still_fading = *keep_alive > 0.0;
        drop(keep_alive);

        if shutdown_requested && !still_fading && shared.pending.lock().unwrap().is_empty() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use audiograph_core::channel_config::{ChannelConfig, ChannelInterpretation};
    use audiograph_core::node::{AudioNodeInfo, AudioNodeProcessor, ProcInfo, ProcessStatus};

    struct PassthroughNode;

    impl AudioNode for PassthroughNode {
        fn debug_name(&self) -> &'static str {
            "passthrough"
        }
        fn info(&self) -> AudioNodeInfo {
            AudioNodeInfo {
                num_min_supported_inputs: ChannelCount::MONO,
                num_max_supported_inputs: ChannelCount::MAX,
                num_min_supported_outputs: ChannelCount::MONO,
                num_max_supported_outputs: ChannelCount::MAX,
                default_channel_config: ChannelConfig {
                    num_inputs: ChannelCount::MONO,
                    num_outputs: ChannelCount::MONO,
                },
                equal_num_ins_and_outs: true,
            }
        }
        fn activate(
            &mut self,
            _sample_rate: u32,
            _channel_config: ChannelConfig,
        ) -> Result<Box<dyn AudioNodeProcessor>, Box<dyn std::error::Error + Send + Sync>> {
            Ok(Box::new(PassthroughProcessor))
        }
    }

    struct PassthroughProcessor;

    impl AudioNodeProcessor for PassthroughProcessor {
        fn process(&mut self, inputs: &[Bus], outputs: &mut [Bus], _proc_info: &ProcInfo) -> ProcessStatus {
            for (out, inp) in outputs.iter_mut().zip(inputs.iter()) {
                out.copy_from(inp, ChannelInterpretation::Speakers);
            }
            ProcessStatus::Bypass
        }
    }

    #[test]
    fn render_quantum_without_destination_is_silent() {
        let ctx = Context::new(GraphConfig::default());
        let bus = ctx.render_quantum(audiograph_core::sample::BLOCK_FRAMES);
        assert!(bus.is_silent());
    }

    #[test]
    fn connect_is_visible_to_the_render_thread_eventually() {
        let ctx = Context::new(GraphConfig {
            update_thread_wake_quanta: 1,
            ..GraphConfig::default()
        });
        let src = ctx.add_node(Box::new(PassthroughNode)).unwrap();
        let dest = ctx.add_node(Box::new(PassthroughNode)).unwrap();
        ctx.set_destination(dest);
        ctx.connect(dest, src, 0, 0).unwrap();

        let mut saw_channel = false;
        for _ in 0..200 {
            let bus = ctx.render_quantum(audiograph_core::sample::BLOCK_FRAMES);
            if bus.num_channels() > 0 {
                saw_channel = true;
                break;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        assert!(saw_channel);
    }

    #[test]
    fn invalid_connect_is_reported_synchronously() {
        let ctx = Context::new(GraphConfig::default());
        let a = ctx.add_node(Box::new(PassthroughNode)).unwrap();
        let err = ctx.connect(a, NodeId::DANGLING, 0, 0).unwrap_err();
        assert_eq!(err, GraphEditError::InvalidNodeId);
    }
}
