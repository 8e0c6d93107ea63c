//! One playback session: everything `play()` starts and `stop()` tears down
//!
//! ```text
//! receive task ──▶ FrameReassembler ──▶ DecodeDispatcher ──▶ decode-* threads
//!                                                                 │
//!                         Synchronizer ◀── decode-pump thread ◀───┘
//!                              │
//!                          tick task
//! ```

use futures_util::StreamExt;
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::Instrument;
use uuid::Uuid;

use crate::codec::dispatcher::DispatchCounters;
use crate::codec::{completion_channel, DecodeDispatcher, DecodeEvent, DecoderSet};
use crate::config::AppConfig;
use crate::error::Result;
use crate::player::controller::PlayerEvent;
use crate::protocol::reassembler::ReassemblerCounters;
use crate::protocol::{EncodedFrame, FrameReassembler};
use crate::sink::{AudioSink, VideoSink};
use crate::sync::Synchronizer;
use crate::transport::Connector;

type SharedDispatcher = Arc<Mutex<Option<DecodeDispatcher>>>;

pub(crate) struct Session {
    id: Uuid,
    synchronizer: Arc<Synchronizer>,
    dispatcher: SharedDispatcher,
    reassembler_counters: Arc<ReassemblerCounters>,
    dispatch_counters: Arc<DispatchCounters>,
    receive_task: tokio::task::JoinHandle<()>,
    tick_task: tokio::task::JoinHandle<()>,
    _pump: JoinHandle<()>,
}

impl Session {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn open(
        runtime: &Handle,
        config: &AppConfig,
        connector: Arc<dyn Connector>,
        decoders: DecoderSet,
        video_sink: Arc<dyn VideoSink>,
        audio_sink: Arc<dyn AudioSink>,
        events: broadcast::Sender<PlayerEvent>,
    ) -> Result<Self> {
        let id = Uuid::new_v4();
        let span = tracing::info_span!("session", id = %id);
        span.in_scope(|| tracing::info!("Opening session to {}", connector.describe()));

        let synchronizer = Arc::new(Synchronizer::new(&config.sync, video_sink, audio_sink));

        let (event_tx, event_rx) = completion_channel(config.decode.completion_queue_capacity);
        let dispatcher = DecodeDispatcher::new(decoders, event_tx)?;
        let dispatch_counters = dispatcher.counters();
        let dispatcher: SharedDispatcher = Arc::new(Mutex::new(Some(dispatcher)));

        let pump = {
            let synchronizer = synchronizer.clone();
            let span = span.clone();
            thread::Builder::new()
                .name("decode-pump".to_string())
                .spawn(move || {
                    let _enter = span.enter();
                    pump_decoded(event_rx, &synchronizer);
                })?
        };

        let reassembler =
            FrameReassembler::with_max_payload(config.transport.framing, config.transport.max_payload_len);
        let reassembler_counters = reassembler.counters();

        let receive_task = runtime.spawn(
            receive_loop(connector, reassembler, dispatcher.clone(), events).instrument(span.clone()),
        );
        let tick_task = runtime.spawn(tick_loop(synchronizer.clone(), config.sync.tick_interval()).instrument(span));

        Ok(Self {
            id,
            synchronizer,
            dispatcher,
            reassembler_counters,
            dispatch_counters,
            receive_task,
            tick_task,
            _pump: pump,
        })
    }

    pub(crate) fn id(&self) -> Uuid {
        self.id
    }

    pub(crate) fn synchronizer(&self) -> &Arc<Synchronizer> {
        &self.synchronizer
    }

    pub(crate) fn reassembler_counters(&self) -> &ReassemblerCounters {
        &self.reassembler_counters
    }

    pub(crate) fn dispatch_counters(&self) -> &DispatchCounters {
        &self.dispatch_counters
    }

    /// Tear the session down without waiting on in-flight decodes
    ///
    /// Workers drain their queues and exit on their own; whatever they still
    /// produce is discarded by the closed synchronizer.
    pub(crate) fn close(self) {
        self.receive_task.abort();
        self.tick_task.abort();
        drop(self.dispatcher.lock().take());
        self.synchronizer.close();
        tracing::info!(session = %self.id, "Session closed");
    }
}

fn pump_decoded(events: crossbeam_channel::Receiver<DecodeEvent>, synchronizer: &Synchronizer) {
    for event in events.iter() {
        match event {
            DecodeEvent::Video(frame) => synchronizer.on_video_frame_decoded(frame),
            DecodeEvent::Audio(frame) => synchronizer.on_audio_frame_decoded(frame),
            DecodeEvent::Failed { frame_type, pts, error } => {
                tracing::warn!("Failed to decode {} frame pts={}: {}", frame_type, pts, error);
            }
        }
    }
    tracing::debug!("decode-pump exiting");
}

/// Returns false once the session has been stopped
fn dispatch_all(dispatcher: &SharedDispatcher, frames: &mut Vec<EncodedFrame>) -> bool {
    let guard = dispatcher.lock();
    let Some(dispatcher) = guard.as_ref() else {
        frames.clear();
        return false;
    };
    for frame in frames.drain(..) {
        dispatcher.dispatch(frame);
    }
    true
}

async fn receive_loop(
    connector: Arc<dyn Connector>,
    mut reassembler: FrameReassembler,
    dispatcher: SharedDispatcher,
    events: broadcast::Sender<PlayerEvent>,
) {
    let mut chunks = match connector.connect().await {
        Ok(chunks) => {
            let _ = events.send(PlayerEvent::Connected);
            chunks
        }
        Err(e) => {
            tracing::error!("Failed to connect: {}", e);
            let _ = events.send(PlayerEvent::TransportError(e));
            return;
        }
    };

    let mut frames = Vec::new();
    while let Some(item) = chunks.next().await {
        let chunk = match item {
            Ok(chunk) => chunk,
            Err(e) => {
                tracing::error!("Transport error: {}", e);
                let _ = events.send(PlayerEvent::TransportError(e));
                return;
            }
        };

        if let Err(e) = reassembler.feed(&chunk, &mut frames) {
            tracing::warn!("Protocol error, resynchronizing: {}", e);
            let _ = events.send(PlayerEvent::ProtocolError(e));
        }
        if !frames.is_empty() && !dispatch_all(&dispatcher, &mut frames) {
            return;
        }
    }

    tracing::info!("Transport closed");
    let _ = events.send(PlayerEvent::TransportClosed);
}

async fn tick_loop(synchronizer: Arc<Synchronizer>, period: Duration) {
    synchronizer.wait_until_armed().await;
    tracing::debug!("Clock armed, scheduling every {:?}", period);

    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        interval.tick().await;
        let report = synchronizer.tick();
        if report.video_dropped > 0 || report.audio_dropped > 0 {
            tracing::trace!(
                "Tick at pts {:?}: dropped {} video / {} audio late frames",
                report.current_pts,
                report.video_dropped,
                report.audio_dropped
            );
        }
    }
}
