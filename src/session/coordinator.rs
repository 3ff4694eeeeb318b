//! The per-call event loop: handshake, VAD wiring, segment merging,
//! generation-tagged audio sending and turn scheduling.

use std::collections::VecDeque;
use std::sync::Arc;

use log::{debug, error, info, warn};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, sleep_until, timeout, Duration, Instant, MissedTickBehavior};
use uuid::Uuid;

use crate::ai::tts::TtsBinding;
use crate::ai::{ChatMessage, Role};
use crate::audio::vad::{SpeechDetector, VadOutcome};
use crate::audio::{FRAME_BYTES, MULAW_SILENCE};
use crate::cache::{AudioCache, CacheRole};
use crate::config;
use crate::error::{ProtocolError, SendError, TransportError};
use crate::protocol::{self, PeerEvent, StartInfo};
use crate::registry::CallRegistryPort;
use crate::session::turn::{self, TurnContext};
use crate::session::{
    OutboundFrame, SendLabel, SessionControlIn, SessionHandle, SessionMap, SendResult,
    CONTROL_CHANNEL_CAPACITY, MEDIA_CHANNEL_CAPACITY,
};

const FRAME_INTERVAL: Duration = Duration::from_millis(20);
const MEDIA_LOG_EVERY: u64 = 100;
const CALL_ID_BIND_WINDOW: Duration = Duration::from_secs(2);

struct Playback {
    mulaw: Vec<u8>,
    offset: usize,
    gen: u64,
    label: SendLabel,
    done: Option<oneshot::Sender<SendResult>>,
}

pub struct SessionCoordinator {
    call_id: Option<String>,
    stream_id: Option<String>,

    connected: bool,
    start_received: bool,
    initial_sent: bool,
    greeting_scheduled: bool,

    active_gen: u64,
    stop_gen: u64,
    uninterruptible_gen: Option<u64>,
    sending: bool,
    greeting_in_progress: bool,
    playback: Option<Playback>,
    stop_waiters: Vec<oneshot::Sender<()>>,

    detector: SpeechDetector,
    pending_segments: Vec<Vec<u8>>,
    merge_deadline: Option<Instant>,
    segment_queue: VecDeque<Vec<u8>>,
    segment_running: bool,

    tts_binding: TtsBinding,
    closing_asked: bool,
    purpose_captured: bool,
    ai_enabled: bool,
    history: Vec<ChatMessage>,

    frames_seen: u64,
    frames_dropped: u64,
    closed: bool,

    registry: Arc<dyn CallRegistryPort>,
    cache: Arc<AudioCache>,
    session_map: SessionMap,
    control_tx: mpsc::Sender<SessionControlIn>,
    out_tx: mpsc::Sender<OutboundFrame>,
}

impl SessionCoordinator {
    /// Spawns the session actor. Returns the control handle (for the HTTP
    /// surface and internal tasks) and the media sender for the socket
    /// reader.
    pub fn spawn(
        call_id: Option<String>,
        registry: Arc<dyn CallRegistryPort>,
        cache: Arc<AudioCache>,
        session_map: SessionMap,
        out_tx: mpsc::Sender<OutboundFrame>,
    ) -> (SessionHandle, mpsc::Sender<PeerEvent>) {
        let (control_tx, control_rx) = mpsc::channel(CONTROL_CHANNEL_CAPACITY);
        let (media_tx, media_rx) = mpsc::channel(MEDIA_CHANNEL_CAPACITY);

        let mut coordinator = Self {
            call_id: call_id.clone(),
            stream_id: None,
            connected: false,
            start_received: false,
            initial_sent: false,
            greeting_scheduled: false,
            active_gen: 0,
            stop_gen: 0,
            uninterruptible_gen: None,
            sending: false,
            greeting_in_progress: false,
            playback: None,
            stop_waiters: Vec::new(),
            detector: SpeechDetector::new(config::vad_settings().clone()),
            pending_segments: Vec::new(),
            merge_deadline: None,
            segment_queue: VecDeque::new(),
            segment_running: false,
            tts_binding: TtsBinding::default(),
            closing_asked: false,
            purpose_captured: false,
            ai_enabled: true,
            history: Vec::new(),
            frames_seen: 0,
            frames_dropped: 0,
            closed: false,
            registry,
            cache,
            session_map,
            control_tx: control_tx.clone(),
            out_tx,
        };
        if let Some(id) = call_id {
            coordinator.register(&id);
        }

        tokio::spawn(async move {
            coordinator.run(control_rx, media_rx).await;
        });

        (SessionHandle { control_tx }, media_tx)
    }

    async fn run(
        &mut self,
        mut control_rx: mpsc::Receiver<SessionControlIn>,
        mut media_rx: mpsc::Receiver<PeerEvent>,
    ) {
        let mut tick = interval(FRAME_INTERVAL);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut media_open = true;
        let far_future = Instant::now() + Duration::from_secs(86_400);

        loop {
            let merge_at = self.merge_deadline.unwrap_or(far_future);
            tokio::select! {
                biased;
                maybe = control_rx.recv() => {
                    match maybe {
                        Some(ev) => {
                            if self.handle_control(ev).await {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                _ = tick.tick() => {
                    self.step_send();
                }
                maybe = media_rx.recv(), if media_open => {
                    match maybe {
                        Some(ev) => {
                            if self.handle_peer_event(ev).await {
                                break;
                            }
                        }
                        None => {
                            media_open = false;
                            self.teardown();
                            break;
                        }
                    }
                }
                _ = sleep_until(merge_at), if self.merge_deadline.is_some() => {
                    self.merge_deadline = None;
                    self.flush_pending_segments();
                }
            }
        }
        self.teardown();
        info!(
            "[session {}] closed (frames={}, greeted={}, purpose_captured={})",
            self.call_tag(),
            self.frames_seen,
            self.initial_sent,
            self.purpose_captured
        );
    }

    fn call_tag(&self) -> &str {
        self.call_id.as_deref().unwrap_or("unbound")
    }

    fn register(&mut self, call_id: &str) {
        if let Ok(mut map) = self.session_map.lock() {
            map.insert(
                call_id.to_string(),
                SessionHandle {
                    control_tx: self.control_tx.clone(),
                },
            );
        }
    }

    fn teardown(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Some(p) = self.playback.take() {
            self.finish_send(p, false);
        }
        self.sending = false;
        self.merge_deadline = None;
        self.pending_segments.clear();
        self.segment_queue.clear();
        for w in self.stop_waiters.drain(..) {
            let _ = w.send(());
        }
        let _ = self.out_tx.try_send(OutboundFrame::Close);
        if let Some(id) = &self.call_id {
            if let Ok(mut map) = self.session_map.lock() {
                map.remove(id);
            }
        }
    }

    // ---- peer events ------------------------------------------------------

    /// Returns true when the session should terminate.
    async fn handle_peer_event(&mut self, ev: PeerEvent) -> bool {
        match ev {
            PeerEvent::Connected => {
                if self.connected {
                    warn!(
                        "[session {}] {}",
                        self.call_tag(),
                        ProtocolError::UnexpectedEvent("repeated connected".to_string())
                    );
                    return false;
                }
                self.connected = true;
                info!("[session {}] peer connected", self.call_tag());
                let control_tx = self.control_tx.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(config::timeouts().greeting_wait).await;
                    let _ = control_tx.send(SessionControlIn::GreetingCheck).await;
                });
                self.maybe_schedule_greeting();
                false
            }
            PeerEvent::Start { start } => {
                self.handle_start(start).await;
                false
            }
            PeerEvent::Media { stream_sid, media } => {
                self.handle_media(stream_sid, media);
                false
            }
            PeerEvent::Mark { mark } => {
                info!(
                    "[session {}] mark acknowledged: {}",
                    self.call_tag(),
                    mark.map(|m| m.name).unwrap_or_default()
                );
                false
            }
            PeerEvent::Stop { .. } => {
                info!("[session {}] stop received", self.call_tag());
                self.teardown();
                true
            }
            PeerEvent::Unknown => {
                debug!(
                    "[session {}] {}",
                    self.call_tag(),
                    ProtocolError::UnexpectedEvent("unrecognized event".to_string())
                );
                false
            }
        }
    }

    async fn handle_start(&mut self, start: StartInfo) {
        self.stream_id = start.stream_sid.clone();
        self.start_received = true;
        info!(
            "[session {}] start received, stream_id={}",
            self.call_tag(),
            self.stream_id.as_deref().unwrap_or("?")
        );

        if self.call_id.is_none() {
            let bound = if let Some(call_sid) = start.call_sid {
                Some(call_sid)
            } else if let Some(account_sid) = start.account_sid {
                Some(account_sid)
            } else {
                // Best effort: the most recent ringing record in the
                // external registry, bounded so media handling resumes.
                match timeout(CALL_ID_BIND_WINDOW, self.registry.recent_ringing_call()).await {
                    Ok(Ok(found)) => found,
                    Ok(Err(err)) => {
                        warn!("[session] ringing lookup failed: {}", err);
                        None
                    }
                    Err(_) => {
                        warn!("[session] ringing lookup timed out");
                        None
                    }
                }
            };
            match bound {
                Some(id) => {
                    info!("[session {}] bound call id", id);
                    self.register(&id);
                    self.call_id = Some(id);
                }
                None => {
                    error!(
                        "[session] no call id binding; continuing without persistence"
                    );
                }
            }
        }
        self.maybe_schedule_greeting();
    }

    fn handle_media(&mut self, stream_sid: Option<String>, media: protocol::MediaInfo) {
        if !self.start_received {
            // Recoverable protocol slip: synthesize the stream id from the
            // media event when it carries one, otherwise drop the frame.
            match stream_sid {
                Some(sid) => {
                    warn!(
                        "[session {}] {}, adopting stream {}",
                        self.call_tag(),
                        ProtocolError::MediaBeforeStart,
                        sid
                    );
                    self.stream_id = Some(sid);
                    self.start_received = true;
                    self.maybe_schedule_greeting();
                }
                None => {
                    debug!(
                        "[session {}] {}, frame dropped",
                        self.call_tag(),
                        ProtocolError::MediaBeforeStart
                    );
                    return;
                }
            }
        }
        if !media.is_inbound() {
            return;
        }
        if self.greeting_in_progress {
            self.frames_dropped += 1;
            return;
        }

        let payload = match media.decode_payload() {
            Ok(p) => p,
            Err(err) => {
                warn!("[session {}] {}", self.call_tag(), err);
                return;
            }
        };

        self.frames_seen += 1;
        if self.frames_seen % MEDIA_LOG_EVERY == 0 {
            debug!(
                "[session {}] {} media frames ({} dropped)",
                self.call_tag(),
                self.frames_seen,
                self.frames_dropped
            );
        }

        match self.detector.ingest(&payload, self.sending) {
            VadOutcome::Started => {
                debug!("[session {}] speech start", self.call_tag());
                // Barge-in: the caller talks over the agent.
                if self.sending {
                    self.request_stop("caller_speech");
                }
                // A new utterance holds back any pending merge flush.
                self.merge_deadline = None;
            }
            VadOutcome::Finished(segment) => {
                info!(
                    "[session {}] segment captured ({} frames, {}ms)",
                    self.call_tag(),
                    segment.frames,
                    segment.duration_ms
                );
                self.enqueue_segment(segment.mulaw);
            }
            VadOutcome::Discarded => {
                debug!("[session {}] noise segment discarded", self.call_tag());
            }
            VadOutcome::Quiet | VadOutcome::Continuing => {}
        }
    }

    // ---- greeting ---------------------------------------------------------

    fn maybe_schedule_greeting(&mut self) {
        if self.greeting_scheduled
            || !self.connected
            || !self.start_received
            || self.stream_id.is_none()
        {
            return;
        }
        self.greeting_scheduled = true;

        let cache = self.cache.clone();
        let registry = self.registry.clone();
        let control_tx = self.control_tx.clone();
        let call_id = self.call_id.clone();
        tokio::spawn(async move {
            let default_binding = TtsBinding::default();

            // Fast path: a pre-rendered default greeting must not wait on
            // the per-call binding fetch.
            if let Some(bytes) = cache.lookup(CacheRole::Greeting, &default_binding).await {
                send_audio(
                    &control_tx,
                    bytes.as_ref().clone(),
                    SendLabel::Greeting,
                    true,
                )
                .await;
                if let Some(binding) = fetch_binding(&registry, call_id).await {
                    let _ = control_tx
                        .send(SessionControlIn::SetTtsBinding { binding })
                        .await;
                }
                return;
            }

            let binding = match fetch_binding(&registry, call_id).await {
                Some(binding) => {
                    let _ = control_tx
                        .send(SessionControlIn::SetTtsBinding {
                            binding: binding.clone(),
                        })
                        .await;
                    binding
                }
                None => default_binding,
            };
            match cache.get_or_synthesize(CacheRole::Greeting, &binding).await {
                Ok(bytes) => {
                    send_audio(
                        &control_tx,
                        bytes.as_ref().clone(),
                        SendLabel::Greeting,
                        true,
                    )
                    .await;
                }
                Err(err) => error!("[session] greeting skipped: {}", err),
            }
        });
    }

    // ---- segment merging and turns ---------------------------------------

    fn enqueue_segment(&mut self, mulaw: Vec<u8>) {
        self.pending_segments.push(mulaw);
        let cfg = config::turn_settings();
        let window = if self.sending {
            cfg.merge_window_ms_while_playing
        } else {
            cfg.merge_window_ms
        };
        self.merge_deadline = Some(Instant::now() + Duration::from_millis(window));
    }

    fn flush_pending_segments(&mut self) {
        if self.pending_segments.is_empty() {
            return;
        }
        // Earlier segments precede later ones in the concatenation.
        let merged: Vec<u8> = self.pending_segments.drain(..).flatten().collect();
        if self.segment_running {
            info!(
                "[session {}] turn busy, queueing segment ({} bytes)",
                self.call_tag(),
                merged.len()
            );
            self.segment_queue.push_back(merged);
        } else {
            self.start_turn(merged);
        }
    }

    fn start_turn(&mut self, mulaw: Vec<u8>) {
        self.segment_running = true;
        self.maybe_play_filler();

        let cfg = config::turn_settings();
        let tail_start = self
            .history
            .len()
            .saturating_sub(cfg.history_context_messages);
        let ctx = TurnContext {
            call_id: self.call_id.clone(),
            mulaw,
            history_tail: self.history[tail_start..].to_vec(),
            closing_asked: self.closing_asked,
            ai_enabled: self.ai_enabled,
            binding: self.tts_binding.clone(),
            control_tx: self.control_tx.clone(),
            registry: self.registry.clone(),
        };
        tokio::spawn(turn::run_turn(ctx));
    }

    /// Plays the pre-rendered "thinking" acknowledgement while the real
    /// reply is generated. Runs concurrently with the turn pipeline.
    fn maybe_play_filler(&mut self) {
        if !self.ai_enabled {
            return;
        }
        if self.sending {
            if self.uninterruptible_gen == Some(self.active_gen) {
                // Greeting still playing; it cannot be cut off.
                return;
            }
            self.request_stop("filler_handoff");
        }
        let cache = self.cache.clone();
        let binding = self.tts_binding.clone();
        let control_tx = self.control_tx.clone();
        tokio::spawn(async move {
            match cache.get_or_synthesize(CacheRole::Filler, &binding).await {
                Ok(bytes) => {
                    send_audio(&control_tx, bytes.as_ref().clone(), SendLabel::Filler, false)
                        .await;
                }
                Err(err) => warn!("[session] filler unavailable: {}", err),
            }
        });
    }

    // ---- audio sending ----------------------------------------------------

    fn start_send(
        &mut self,
        mulaw: Vec<u8>,
        label: SendLabel,
        uninterruptible: bool,
        done: Option<oneshot::Sender<SendResult>>,
    ) {
        if self.closed {
            if let Some(done) = done {
                let _ = done.send(Err(SendError::SessionClosed));
            }
            return;
        }
        if self.stream_id.is_none() {
            warn!("[session {}] send rejected: no stream id", self.call_tag());
            if let Some(done) = done {
                let _ = done.send(Err(SendError::NoStreamId));
            }
            return;
        }
        if let Some(current) = self.playback.take() {
            if label == SendLabel::Filler {
                // The filler lost the race against the real reply.
                debug!("[session {}] late filler dropped", self.call_tag());
                self.playback = Some(current);
                if let Some(done) = done {
                    let _ = done.send(Ok(false));
                }
                return;
            }
            warn!(
                "[session {}] {} send pre-empts gen={} ({})",
                self.call_tag(),
                label.as_str(),
                current.gen,
                current.label.as_str()
            );
            self.finish_send(current, false);
        }

        self.active_gen += 1;
        let gen = self.active_gen;
        if uninterruptible {
            self.uninterruptible_gen = Some(gen);
        }
        if label == SendLabel::Greeting {
            self.greeting_in_progress = true;
            self.initial_sent = true;
        }
        self.sending = true;
        info!(
            "[session {}] sending {} gen={} ({} bytes)",
            self.call_tag(),
            label.as_str(),
            gen,
            mulaw.len()
        );
        self.playback = Some(Playback {
            mulaw,
            offset: 0,
            gen,
            label,
            done,
        });
    }

    /// One 20 ms tick: cancellation check, then exactly one frame out.
    fn step_send(&mut self) {
        let Some(mut p) = self.playback.take() else {
            return;
        };
        if self.stop_gen == p.gen && self.uninterruptible_gen != Some(p.gen) {
            info!(
                "[session {}] {} gen={} cancelled at {}B",
                self.call_tag(),
                p.label.as_str(),
                p.gen,
                p.offset
            );
            self.finish_send(p, false);
            return;
        }

        let stream_id = match self.stream_id.clone() {
            Some(id) => id,
            None => {
                self.finish_send(p, false);
                return;
            }
        };
        let end = (p.offset + FRAME_BYTES).min(p.mulaw.len());
        let mut frame = p.mulaw[p.offset..end].to_vec();
        if frame.len() < FRAME_BYTES {
            frame.resize(FRAME_BYTES, MULAW_SILENCE);
        }
        p.offset = end;

        match self
            .out_tx
            .try_send(OutboundFrame::Text(protocol::media_event(&stream_id, &frame)))
        {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                // The 20 ms pacing is the backpressure; a full writer queue
                // means the socket stalled. Drop the frame, keep pacing.
                warn!("[session {}] writer backlogged, frame dropped", self.call_tag());
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                let err = TransportError::Closed;
                warn!("[session {}] {} mid-send", self.call_tag(), err);
                self.fail_send(p, SendError::Transport(err));
                self.teardown();
                return;
            }
        }

        if p.offset >= p.mulaw.len() {
            let name = format!("mark-{}", Uuid::new_v4());
            let _ = self
                .out_tx
                .try_send(OutboundFrame::Text(protocol::mark_event(&stream_id, &name)));
            info!(
                "[session {}] {} gen={} completed, mark={}",
                self.call_tag(),
                p.label.as_str(),
                p.gen,
                name
            );
            self.finish_send(p, true);
        } else {
            self.playback = Some(p);
        }
    }

    fn finish_send(&mut self, p: Playback, completed: bool) {
        self.wind_down_send(p, Ok(completed));
    }

    /// Send that died on the transport: the completion future resolves
    /// with the typed error instead of a cancellation.
    fn fail_send(&mut self, p: Playback, err: SendError) {
        self.wind_down_send(p, Err(err));
    }

    fn wind_down_send(&mut self, p: Playback, result: SendResult) {
        self.sending = false;
        if self.uninterruptible_gen == Some(p.gen) {
            self.uninterruptible_gen = None;
        }
        if p.label == SendLabel::Greeting {
            self.greeting_in_progress = false;
        }
        if let Some(done) = p.done {
            let _ = done.send(result);
        }
        for w in self.stop_waiters.drain(..) {
            let _ = w.send(());
        }
    }

    fn request_stop(&mut self, reason: &'static str) {
        if !self.sending {
            return;
        }
        if self.uninterruptible_gen == Some(self.active_gen) {
            debug!(
                "[session {}] stop ({}) ignored: gen={} uninterruptible",
                self.call_tag(),
                reason,
                self.active_gen
            );
            return;
        }
        self.stop_gen = self.active_gen;
        info!("[session {}] stop requested ({})", self.call_tag(), reason);
    }

    // ---- control ----------------------------------------------------------

    /// Returns true when the session should terminate.
    async fn handle_control(&mut self, ev: SessionControlIn) -> bool {
        match ev {
            SessionControlIn::SetAiEnabled { enabled } => {
                info!("[session {}] ai_enabled={}", self.call_tag(), enabled);
                self.ai_enabled = enabled;
            }
            SessionControlIn::Speak { text } => {
                info!("[session {}] operator speak: {}", self.call_tag(), text);
                self.append_log(Role::Assistant, text.clone());
                let control_tx = self.control_tx.clone();
                let binding = self.tts_binding.clone();
                tokio::spawn(async move {
                    turn::speak_text(&control_tx, &binding, &text, SendLabel::Manual).await;
                });
            }
            SessionControlIn::Transfer {
                message,
                target,
                done,
            } => {
                info!(
                    "[session {}] operator transfer to {}",
                    self.call_tag(),
                    target
                );
                let control_tx = self.control_tx.clone();
                let binding = self.tts_binding.clone();
                let registry = self.registry.clone();
                let call_id = self.call_id.clone();
                tokio::spawn(async move {
                    turn::speak_text(&control_tx, &binding, &message, SendLabel::Transfer).await;
                    let ok = match call_id {
                        Some(id) => match registry.redirect(id, target).await {
                            Ok(()) => true,
                            Err(err) => {
                                error!("[session] transfer redirect failed: {}", err);
                                false
                            }
                        },
                        None => false,
                    };
                    let _ = done.send(ok);
                });
            }
            SessionControlIn::SetTtsBinding { binding } => {
                info!(
                    "[session {}] tts binding {}",
                    self.call_tag(),
                    binding.key()
                );
                self.tts_binding = binding;
            }
            SessionControlIn::SendAudio {
                mulaw,
                label,
                uninterruptible,
                done,
            } => {
                self.start_send(mulaw, label, uninterruptible, done);
            }
            SessionControlIn::StopAudio { reason, wait } => {
                self.request_stop(reason);
                if let Some(w) = wait {
                    if self.playback.is_none() {
                        let _ = w.send(());
                    } else {
                        self.stop_waiters.push(w);
                    }
                }
            }
            SessionControlIn::AppendLog { role, text } => {
                self.append_log(role, text);
            }
            SessionControlIn::SetDialogFlags {
                closing_asked,
                purpose_captured,
            } => {
                if let Some(v) = closing_asked {
                    self.closing_asked = v;
                }
                if let Some(v) = purpose_captured {
                    self.purpose_captured = v;
                }
            }
            SessionControlIn::TurnFinished => {
                self.segment_running = false;
                if let Some(next) = self.segment_queue.pop_front() {
                    self.start_turn(next);
                }
            }
            SessionControlIn::GreetingCheck => {
                if !self.greeting_scheduled {
                    error!(
                        "[session {}] greeting skipped: handshake incomplete after {}ms \
                         (connected={}, start_received={})",
                        self.call_tag(),
                        config::timeouts().greeting_wait.as_millis(),
                        self.connected,
                        self.start_received
                    );
                }
            }
            SessionControlIn::Shutdown => {
                self.teardown();
                return true;
            }
        }
        false
    }

    fn append_log(&mut self, role: Role, text: String) {
        self.history.push(ChatMessage {
            role,
            content: text.clone(),
        });
        if let Some(call_id) = self.call_id.clone() {
            let registry = self.registry.clone();
            tokio::spawn(async move {
                if let Err(err) = registry.append_message(call_id, role.as_str(), text).await {
                    warn!("[registry] append failed: {}", err);
                }
            });
        }
    }
}

async fn fetch_binding(
    registry: &Arc<dyn CallRegistryPort>,
    call_id: Option<String>,
) -> Option<TtsBinding> {
    let call_id = call_id?;
    match timeout(config::timeouts().greeting_wait, registry.call_config(call_id)).await {
        Ok(Ok(Some(cfg))) => Some(cfg.into_binding()),
        Ok(Ok(None)) => None,
        Ok(Err(err)) => {
            warn!("[registry] call config fetch failed: {}", err);
            None
        }
        Err(_) => {
            warn!("[registry] call config fetch timed out");
            None
        }
    }
}

pub(crate) async fn send_audio(
    control_tx: &mpsc::Sender<SessionControlIn>,
    mulaw: Vec<u8>,
    label: SendLabel,
    uninterruptible: bool,
) -> Option<oneshot::Receiver<SendResult>> {
    let (done_tx, done_rx) = oneshot::channel();
    let sent = control_tx
        .send(SessionControlIn::SendAudio {
            mulaw,
            label,
            uninterruptible,
            done: Some(done_tx),
        })
        .await;
    match sent {
        Ok(()) => Some(done_rx),
        Err(_) => None,
    }
}
