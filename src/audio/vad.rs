//! Energy-based voice activity detection and speech segmentation.

use log::debug;

use crate::audio::{frame_level, SAMPLE_RATE};
use crate::config::VadSettings;

/// What a single ingested frame did to the detector.
#[derive(Debug, PartialEq, Eq)]
pub enum VadOutcome {
    /// No speech in progress and this frame did not confirm a start.
    Quiet,
    /// Speech-start confirmed on this frame.
    Started,
    /// Speech in progress, frame accumulated.
    Continuing,
    /// End-of-speech: a segment passed the minimum checks.
    Finished(Segment),
    /// End-of-speech, but the segment was noise-sized and dropped.
    Discarded,
}

#[derive(Debug, PartialEq, Eq)]
pub struct Segment {
    pub mulaw: Vec<u8>,
    pub frames: usize,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DetectorState {
    Idle,
    InSpeech,
}

/// Segments caller speech out of the inbound frame stream.
///
/// Frames accumulate verbatim from the first frame of the warm-up run;
/// silence inside speech is kept (dropping it distorts transcription).
/// Thresholds and warm-up counts switch to the `while_playing` variants
/// while the agent is sending audio, to resist echo of its own voice.
pub struct SpeechDetector {
    cfg: VadSettings,
    state: DetectorState,
    warmup_count: u32,
    warmup_frames: Vec<Vec<u8>>,
    segment_frames: Vec<Vec<u8>>,
    last_nonsilent_index: usize,
    clock_ms: u64,
    speech_start_ms: u64,
    last_speech_ms: u64,
}

impl SpeechDetector {
    pub fn new(cfg: VadSettings) -> Self {
        Self {
            cfg,
            state: DetectorState::Idle,
            warmup_count: 0,
            warmup_frames: Vec::new(),
            segment_frames: Vec::new(),
            last_nonsilent_index: 0,
            clock_ms: 0,
            speech_start_ms: 0,
            last_speech_ms: 0,
        }
    }

    pub fn speech_active(&self) -> bool {
        self.state == DetectorState::InSpeech
    }

    pub fn reset(&mut self) {
        self.state = DetectorState::Idle;
        self.warmup_count = 0;
        self.warmup_frames.clear();
        self.segment_frames.clear();
        self.last_nonsilent_index = 0;
    }

    pub fn ingest(&mut self, frame: &[u8], while_playing: bool) -> VadOutcome {
        if frame.is_empty() {
            return VadOutcome::Quiet;
        }
        let frame_ms = (frame.len() as u64 * 1000) / SAMPLE_RATE as u64;
        self.clock_ms += frame_ms.max(1);

        let (threshold, warmup) = if while_playing {
            (
                self.cfg.threshold_while_playing,
                self.cfg.warmup_frames_while_playing,
            )
        } else {
            (self.cfg.threshold, self.cfg.warmup_frames)
        };
        let voiced = frame_level(frame) >= threshold;

        match self.state {
            DetectorState::Idle => {
                if !voiced {
                    self.warmup_count = 0;
                    self.warmup_frames.clear();
                    return VadOutcome::Quiet;
                }
                self.warmup_count += 1;
                self.warmup_frames.push(frame.to_vec());
                if self.warmup_count < warmup {
                    return VadOutcome::Quiet;
                }
                // Confirmed: the warm-up frames are the head of the segment.
                self.state = DetectorState::InSpeech;
                self.segment_frames = std::mem::take(&mut self.warmup_frames);
                self.warmup_count = 0;
                self.last_nonsilent_index = self.segment_frames.len() - 1;
                self.speech_start_ms = self
                    .clock_ms
                    .saturating_sub(frame_ms * self.segment_frames.len() as u64);
                self.last_speech_ms = self.clock_ms;
                debug!("vad speech start at {}ms", self.speech_start_ms);
                VadOutcome::Started
            }
            DetectorState::InSpeech => {
                self.segment_frames.push(frame.to_vec());
                if voiced {
                    self.last_nonsilent_index = self.segment_frames.len() - 1;
                    self.last_speech_ms = self.clock_ms;
                    return VadOutcome::Continuing;
                }
                if self.clock_ms.saturating_sub(self.last_speech_ms) > self.cfg.silence_ms {
                    return self.finish();
                }
                VadOutcome::Continuing
            }
        }
    }

    fn finish(&mut self) -> VadOutcome {
        // Trim trailing silence: keep up to the last non-silent frame.
        let kept = self.last_nonsilent_index + 1;
        self.segment_frames.truncate(kept);
        let frames = self.segment_frames.len();
        let mulaw: Vec<u8> = self.segment_frames.drain(..).flatten().collect();
        let duration_ms = (mulaw.len() as u64 * 1000) / SAMPLE_RATE as u64;
        self.reset();

        if frames < self.cfg.min_speech_frames
            || mulaw.len() < self.cfg.min_speech_bytes
            || duration_ms < self.cfg.min_speech_ms
        {
            debug!(
                "vad segment dropped as noise ({} frames, {} bytes, {}ms)",
                frames,
                mulaw.len(),
                duration_ms
            );
            return VadOutcome::Discarded;
        }
        VadOutcome::Finished(Segment {
            mulaw,
            frames,
            duration_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{encode_mulaw, FRAME_BYTES, MULAW_SILENCE};

    fn settings() -> VadSettings {
        VadSettings {
            threshold: 2,
            threshold_while_playing: 6,
            warmup_frames: 2,
            warmup_frames_while_playing: 4,
            silence_ms: 300,
            min_speech_frames: 10,
            min_speech_bytes: 1600,
            min_speech_ms: 400,
        }
    }

    fn voiced_frame() -> Vec<u8> {
        encode_mulaw(&vec![6_000i16; FRAME_BYTES])
    }

    fn quiet_frame() -> Vec<u8> {
        vec![MULAW_SILENCE; FRAME_BYTES]
    }

    #[test]
    fn segment_emitted_after_trailing_silence() {
        let mut det = SpeechDetector::new(settings());
        assert_eq!(det.ingest(&voiced_frame(), false), VadOutcome::Quiet);
        assert_eq!(det.ingest(&voiced_frame(), false), VadOutcome::Started);
        for _ in 0..23 {
            assert_eq!(det.ingest(&voiced_frame(), false), VadOutcome::Continuing);
        }
        let mut finished = None;
        for _ in 0..20 {
            match det.ingest(&quiet_frame(), false) {
                VadOutcome::Finished(seg) => {
                    finished = Some(seg);
                    break;
                }
                VadOutcome::Continuing => {}
                other => panic!("unexpected outcome {:?}", other),
            }
        }
        let seg = finished.expect("segment");
        // Trailing silence trimmed: exactly the 25 voiced frames survive.
        assert_eq!(seg.frames, 25);
        assert_eq!(seg.mulaw.len(), 25 * FRAME_BYTES);
        assert_eq!(seg.duration_ms, 500);
        assert!(!det.speech_active());
    }

    #[test]
    fn short_burst_discarded() {
        let mut det = SpeechDetector::new(settings());
        for _ in 0..7 {
            det.ingest(&voiced_frame(), false);
        }
        let mut outcome = VadOutcome::Quiet;
        for _ in 0..20 {
            outcome = det.ingest(&quiet_frame(), false);
            if outcome != VadOutcome::Continuing {
                break;
            }
        }
        assert_eq!(outcome, VadOutcome::Discarded);
        assert!(!det.speech_active());
    }

    #[test]
    fn single_click_does_not_start_speech() {
        let mut det = SpeechDetector::new(settings());
        assert_eq!(det.ingest(&voiced_frame(), false), VadOutcome::Quiet);
        assert_eq!(det.ingest(&quiet_frame(), false), VadOutcome::Quiet);
        assert!(!det.speech_active());
        // Warm-up restarts from scratch after the dropout.
        assert_eq!(det.ingest(&voiced_frame(), false), VadOutcome::Quiet);
        assert_eq!(det.ingest(&voiced_frame(), false), VadOutcome::Started);
    }

    #[test]
    fn while_playing_needs_longer_warmup() {
        let mut det = SpeechDetector::new(settings());
        for _ in 0..3 {
            assert_eq!(det.ingest(&voiced_frame(), true), VadOutcome::Quiet);
        }
        assert_eq!(det.ingest(&voiced_frame(), true), VadOutcome::Started);
    }

    #[test]
    fn quiet_audio_ignored_while_playing() {
        // Level ~3 passes the idle threshold but not the while-playing one.
        let soft = encode_mulaw(&vec![1_100i16; FRAME_BYTES]);
        let mut det = SpeechDetector::new(settings());
        for _ in 0..8 {
            assert_eq!(det.ingest(&soft, true), VadOutcome::Quiet);
        }
        assert_eq!(det.ingest(&soft, false), VadOutcome::Quiet);
        assert_eq!(det.ingest(&soft, false), VadOutcome::Started);
    }

    #[test]
    fn mid_speech_silence_is_kept() {
        let mut det = SpeechDetector::new(settings());
        det.ingest(&voiced_frame(), false);
        det.ingest(&voiced_frame(), false);
        for _ in 0..10 {
            det.ingest(&voiced_frame(), false);
        }
        // 200ms gap, below silence_ms: stays in the segment.
        for _ in 0..10 {
            assert_eq!(det.ingest(&quiet_frame(), false), VadOutcome::Continuing);
        }
        for _ in 0..10 {
            det.ingest(&voiced_frame(), false);
        }
        let mut seg = None;
        for _ in 0..20 {
            if let VadOutcome::Finished(s) = det.ingest(&quiet_frame(), false) {
                seg = Some(s);
                break;
            }
        }
        let seg = seg.expect("segment");
        assert_eq!(seg.frames, 32);
    }
}
