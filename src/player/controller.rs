//! Play / pause / stop lifecycle

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::codec::{DecoderSet, DispatchStats};
use crate::config::AppConfig;
use crate::error::{Error, ProtocolError, Result, TransportError};
use crate::player::session::Session;
use crate::protocol::ReassemblerStats;
use crate::sink::{AudioSink, VideoSink};
use crate::sync::{SyncStats, Synchronizer};
use crate::transport::Connector;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Builds a fresh set of decoders for every session
pub type DecoderFactory = Arc<dyn Fn() -> DecoderSet + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Paused,
    Playing,
    Stopped,
}

/// Notifications published to subscribers
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    StateChanged(PlaybackState),
    Connected,
    /// A malformed frame was skipped; the stream continues
    ProtocolError(ProtocolError),
    /// The transport failed; already queued frames keep playing out
    TransportError(TransportError),
    TransportClosed,
}

/// Snapshot across the pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerStats {
    pub state: PlaybackState,
    pub session: Option<Uuid>,
    pub reassembler: ReassemblerStats,
    pub dispatch: DispatchStats,
    pub sync: SyncStats,
}

struct Inner {
    state: PlaybackState,
    session: Option<Session>,
}

/// Owns the playback lifecycle
///
/// Starts `Paused` with no session. The first `play()` opens the transport and
/// spins up the pipeline; `pause()` keeps everything running but silences
/// output; `stop()` tears the session down so the next `play()` starts fresh.
pub struct PlaybackController {
    config: AppConfig,
    connector: Arc<dyn Connector>,
    decoders: DecoderFactory,
    video_sink: Arc<dyn VideoSink>,
    audio_sink: Arc<dyn AudioSink>,
    events: broadcast::Sender<PlayerEvent>,
    inner: Mutex<Inner>,
}

impl PlaybackController {
    pub fn new(
        config: AppConfig,
        connector: Arc<dyn Connector>,
        decoders: DecoderFactory,
        video_sink: Arc<dyn VideoSink>,
        audio_sink: Arc<dyn AudioSink>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            config,
            connector,
            decoders,
            video_sink,
            audio_sink,
            events,
            inner: Mutex::new(Inner {
                state: PlaybackState::Paused,
                session: None,
            }),
        }
    }

    /// Start or resume playback
    ///
    /// Must be called from within a tokio runtime when it needs to open a
    /// session.
    pub fn play(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.state == PlaybackState::Playing {
            return Ok(());
        }

        if inner.session.is_none() {
            let runtime = Handle::try_current().map_err(|e| Error::Runtime(e.to_string()))?;
            let session = Session::open(
                &runtime,
                &self.config,
                self.connector.clone(),
                (self.decoders)(),
                self.video_sink.clone(),
                self.audio_sink.clone(),
                self.events.clone(),
            )?;
            inner.session = Some(session);
        }

        if let Some(session) = &inner.session {
            session.synchronizer().set_rendering(true);
        }
        self.audio_sink.set_volume(1.0);
        self.transition(&mut inner, PlaybackState::Playing);
        Ok(())
    }

    /// Silence output; decoding and queueing continue
    pub fn pause(&self) {
        let mut inner = self.inner.lock();
        if inner.state != PlaybackState::Playing {
            return;
        }

        if let Some(session) = &inner.session {
            session.synchronizer().set_rendering(false);
        }
        self.audio_sink.set_volume(0.0);
        self.transition(&mut inner, PlaybackState::Paused);
    }

    /// End the session
    pub fn stop(&self) {
        let mut inner = self.inner.lock();
        if inner.state == PlaybackState::Stopped {
            return;
        }

        if let Some(session) = inner.session.take() {
            session.close();
        }
        self.audio_sink.set_volume(0.0);
        self.transition(&mut inner, PlaybackState::Stopped);
    }

    pub fn state(&self) -> PlaybackState {
        self.inner.lock().state
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.events.subscribe()
    }

    pub fn session_id(&self) -> Option<Uuid> {
        self.inner.lock().session.as_ref().map(|s| s.id())
    }

    /// Synchronizer of the open session
    pub fn synchronizer(&self) -> Option<Arc<Synchronizer>> {
        self.inner.lock().session.as_ref().map(|s| s.synchronizer().clone())
    }

    pub fn stats(&self) -> PlayerStats {
        let inner = self.inner.lock();
        match &inner.session {
            Some(session) => PlayerStats {
                state: inner.state,
                session: Some(session.id()),
                reassembler: session.reassembler_counters().snapshot(),
                dispatch: session.dispatch_counters().snapshot(),
                sync: session.synchronizer().stats(),
            },
            None => PlayerStats {
                state: inner.state,
                session: None,
                reassembler: ReassemblerStats::default(),
                dispatch: DispatchStats::default(),
                sync: SyncStats::default(),
            },
        }
    }

    fn transition(&self, inner: &mut Inner, next: PlaybackState) {
        tracing::info!("Playback {:?} -> {:?}", inner.state, next);
        inner.state = next;
        let _ = self.events.send(PlayerEvent::StateChanged(next));
    }
}

impl Drop for PlaybackController {
    fn drop(&mut self) {
        if let Some(session) = self.inner.get_mut().session.take() {
            session.close();
        }
    }
}
