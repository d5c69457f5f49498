//! Picture-in-picture overlay.
//!
//! Each repaint composes an [`OverlayFrame`] from a fresh
//! [`SessionSnapshot`] and pushes it into the capture stream opened by an
//! [`OverlayPlatform`]. Platforms without overlay support report
//! [`OverlayError::Unsupported`]; callers just don't offer the option.
//!
//! The stream is released on [`PictureInPicture::close`] and on drop, so a
//! torn-down session never leaves a live capture behind.

use std::cell::RefCell;
use std::f64::consts::PI;
use std::io::Write;
use std::rc::Rc;
use std::time::Duration;

use serde::Serialize;

use crate::error::OverlayError;
use crate::timer::{Phase, SessionSnapshot};

pub const FRAME_WIDTH: u32 = 640;
pub const FRAME_HEIGHT: u32 = 360;
pub const DEFAULT_FPS: u32 = 30;

const BACKGROUND: &str = "#0a0a0a";
const WORK_ACCENT: &str = "#3b82f6";
const BREAK_ACCENT: &str = "#22c55e";

/// Everything drawn on one overlay frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverlayFrame {
    pub width: u32,
    pub height: u32,
    pub background: &'static str,
    pub accent: &'static str,
    pub label: String,
    pub time_text: String,
    /// 0.0 .. 1.0
    pub progress: f64,
    /// Arc from 12 o'clock, clockwise, in radians.
    pub arc_start: f64,
    pub arc_end: f64,
    pub radius: f64,
    pub status: &'static str,
}

impl OverlayFrame {
    pub fn compose(snapshot: &SessionSnapshot) -> Self {
        let progress = if snapshot.total_seconds == 0 {
            0.0
        } else {
            snapshot.progress.clamp(0.0, 1.0)
        };
        let arc_start = -PI / 2.0;
        let center_x = f64::from(FRAME_WIDTH) / 2.0;
        let center_y = f64::from(FRAME_HEIGHT) / 2.0;
        Self {
            width: FRAME_WIDTH,
            height: FRAME_HEIGHT,
            background: BACKGROUND,
            accent: if snapshot.phase == Phase::Work {
                WORK_ACCENT
            } else {
                BREAK_ACCENT
            },
            label: snapshot.phase_label.clone(),
            time_text: snapshot.time_text.clone(),
            progress,
            arc_start,
            arc_end: arc_start + 2.0 * PI * progress,
            radius: center_x.min(center_y) - 40.0,
            status: if snapshot.is_running { "Running" } else { "Paused" },
        }
    }

    /// One-line text rendering for terminals.
    pub fn render_text(&self) -> String {
        const BAR: usize = 20;
        let filled = ((self.progress * BAR as f64).round() as usize).min(BAR);
        format!(
            "{:<11} {}  [{}{}] {:>3}%  {}",
            self.label,
            self.time_text,
            "#".repeat(filled),
            "-".repeat(BAR - filled),
            (self.progress * 100.0).floor() as u32,
            self.status
        )
    }
}

/// A live frame stream feeding the floating surface.
pub trait FrameSink {
    fn push(&mut self, frame: &OverlayFrame) -> Result<(), OverlayError>;
    /// Release the stream. Must be idempotent.
    fn stop(&mut self);
    fn is_active(&self) -> bool;
}

/// Where overlays come from.
pub trait OverlayPlatform {
    type Stream: FrameSink;

    fn is_supported(&self) -> bool;
    fn open_stream(&mut self, fps: u32) -> Result<Self::Stream, OverlayError>;
}

pub struct PictureInPicture<P: OverlayPlatform> {
    platform: P,
    stream: Option<P::Stream>,
    fps: u32,
    frames_rendered: u64,
}

impl<P: OverlayPlatform> PictureInPicture<P> {
    pub fn new(platform: P, fps: u32) -> Self {
        Self {
            platform,
            stream: None,
            fps: fps.max(1),
            frames_rendered: 0,
        }
    }

    pub fn is_available(&self) -> bool {
        self.platform.is_supported()
    }

    pub fn is_active(&self) -> bool {
        self.stream.as_ref().is_some_and(|s| s.is_active())
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs(1) / self.fps
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    /// Open the overlay and paint the first frame. The snapshot may come
    /// from a clock that has never ticked.
    pub fn open(&mut self, snapshot: &SessionSnapshot) -> Result<(), OverlayError> {
        if self.is_active() {
            return Ok(());
        }
        if !self.platform.is_supported() {
            return Err(OverlayError::Unsupported);
        }
        let mut stream = self.platform.open_stream(self.fps)?;
        let frame = OverlayFrame::compose(snapshot);
        if let Err(e) = stream.push(&frame) {
            stream.stop();
            return Err(e);
        }
        self.stream = Some(stream);
        self.frames_rendered = 1;
        tracing::debug!(fps = self.fps, "overlay opened");
        Ok(())
    }

    /// Paint the latest state. No-op while closed; a failing stream is
    /// released before the error is returned.
    pub fn repaint(&mut self, snapshot: &SessionSnapshot) -> Result<(), OverlayError> {
        let Some(stream) = self.stream.as_mut() else {
            return Ok(());
        };
        if !stream.is_active() {
            // The user dismissed the surface from outside.
            self.close();
            return Ok(());
        }
        let frame = OverlayFrame::compose(snapshot);
        match stream.push(&frame) {
            Ok(()) => {
                self.frames_rendered += 1;
                Ok(())
            }
            Err(e) => {
                self.close();
                Err(e)
            }
        }
    }

    /// Release the capture stream. Safe to call repeatedly.
    pub fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.stop();
            tracing::debug!(frames = self.frames_rendered, "overlay closed");
        }
    }
}

impl<P: OverlayPlatform> Drop for PictureInPicture<P> {
    fn drop(&mut self) {
        self.close();
    }
}

/// Overlay drawn as a single self-refreshing status line.
///
/// The writer lives in a slot shared with the open stream and goes back
/// into it when the stream stops, so the overlay can be reopened.
pub struct TerminalOverlay<W: Write> {
    slot: Rc<RefCell<Option<W>>>,
    supported: bool,
    permitted: bool,
}

impl<W: Write> TerminalOverlay<W> {
    pub fn new(out: W, supported: bool) -> Self {
        Self {
            slot: Rc::new(RefCell::new(Some(out))),
            supported,
            permitted: true,
        }
    }

    /// A denied overlay is supported but refuses to open.
    pub fn with_permission(mut self, permitted: bool) -> Self {
        self.permitted = permitted;
        self
    }

    /// True while a stream holds the writer.
    pub fn in_use(&self) -> bool {
        self.slot.borrow().is_none()
    }
}

impl TerminalOverlay<std::io::Stderr> {
    /// Supported only when stderr is an interactive terminal.
    pub fn stderr() -> Self {
        use std::io::IsTerminal;
        let err = std::io::stderr();
        let supported = err.is_terminal();
        Self::new(err, supported)
    }
}

impl<W: Write> OverlayPlatform for TerminalOverlay<W> {
    type Stream = TerminalStream<W>;

    fn is_supported(&self) -> bool {
        self.supported
    }

    fn open_stream(&mut self, _fps: u32) -> Result<Self::Stream, OverlayError> {
        if !self.permitted {
            return Err(OverlayError::PermissionDenied);
        }
        // One writer, one stream at a time.
        let out = self
            .slot
            .borrow_mut()
            .take()
            .ok_or_else(|| OverlayError::StreamFailed("terminal already in use".into()))?;
        Ok(TerminalStream {
            out: Some(out),
            slot: Rc::clone(&self.slot),
            last: String::new(),
        })
    }
}

pub struct TerminalStream<W: Write> {
    out: Option<W>,
    slot: Rc<RefCell<Option<W>>>,
    last: String,
}

impl<W: Write> FrameSink for TerminalStream<W> {
    fn push(&mut self, frame: &OverlayFrame) -> Result<(), OverlayError> {
        let out = self
            .out
            .as_mut()
            .ok_or_else(|| OverlayError::StreamFailed("stream stopped".into()))?;
        let text = frame.render_text();
        if text == self.last {
            return Ok(());
        }
        write!(out, "\r\x1b[2K{text}")
            .and_then(|_| out.flush())
            .map_err(|e| OverlayError::StreamFailed(e.to_string()))?;
        self.last = text;
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(mut out) = self.out.take() {
            let _ = writeln!(out);
            let _ = out.flush();
            *self.slot.borrow_mut() = Some(out);
        }
    }

    fn is_active(&self) -> bool {
        self.out.is_some()
    }
}

impl<W: Write> Drop for TerminalStream<W> {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Capture {
        frames: Vec<OverlayFrame>,
        open_streams: usize,
    }

    struct FakePlatform {
        supported: bool,
        capture: Arc<Mutex<Capture>>,
    }

    struct FakeStream {
        capture: Arc<Mutex<Capture>>,
        active: bool,
    }

    impl FrameSink for FakeStream {
        fn push(&mut self, frame: &OverlayFrame) -> Result<(), OverlayError> {
            self.capture.lock().unwrap().frames.push(frame.clone());
            Ok(())
        }

        fn stop(&mut self) {
            if self.active {
                self.active = false;
                self.capture.lock().unwrap().open_streams -= 1;
            }
        }

        fn is_active(&self) -> bool {
            self.active
        }
    }

    impl OverlayPlatform for FakePlatform {
        type Stream = FakeStream;

        fn is_supported(&self) -> bool {
            self.supported
        }

        fn open_stream(&mut self, _fps: u32) -> Result<FakeStream, OverlayError> {
            self.capture.lock().unwrap().open_streams += 1;
            Ok(FakeStream {
                capture: self.capture.clone(),
                active: true,
            })
        }
    }

    fn pip(supported: bool) -> (Arc<Mutex<Capture>>, PictureInPicture<FakePlatform>) {
        let capture = Arc::new(Mutex::new(Capture::default()));
        let platform = FakePlatform {
            supported,
            capture: capture.clone(),
        };
        (capture, PictureInPicture::new(platform, DEFAULT_FPS))
    }

    fn snapshot(phase: Phase, remaining: u64, total: u64, running: bool) -> SessionSnapshot {
        SessionSnapshot {
            phase,
            phase_label: phase.label().into(),
            seconds_remaining: remaining,
            total_seconds: total,
            time_text: crate::timer::format_mmss(remaining),
            progress: if total == 0 {
                0.0
            } else {
                (total - remaining) as f64 / total as f64
            },
            is_running: running,
            completed_work_phases: 0,
            sessions_before_long_break: 4,
            active_session_id: None,
            task_id: None,
            awaiting_presence: false,
        }
    }

    #[test]
    fn first_frame_has_zero_progress() {
        let (capture, mut pip) = pip(true);
        pip.open(&snapshot(Phase::Work, 1500, 1500, false)).unwrap();
        let cap = capture.lock().unwrap();
        let frames = &cap.frames;
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].progress, 0.0);
        assert_eq!(frames[0].arc_start, frames[0].arc_end);
        assert_eq!(frames[0].time_text, "25:00");
        assert_eq!(frames[0].status, "Paused");
        assert_eq!(frames[0].accent, WORK_ACCENT);
    }

    #[test]
    fn repaint_uses_latest_snapshot() {
        let (capture, mut pip) = pip(true);
        pip.open(&snapshot(Phase::Work, 1500, 1500, true)).unwrap();
        pip.repaint(&snapshot(Phase::ShortBreak, 150, 300, true)).unwrap();
        let cap = capture.lock().unwrap();
        let last = cap.frames.last().unwrap();
        assert_eq!(last.label, "Short Break");
        assert_eq!(last.accent, BREAK_ACCENT);
        assert!((last.progress - 0.5).abs() < 1e-9);
        assert!((last.arc_end - (last.arc_start + PI)).abs() < 1e-9);
        assert_eq!(pip.frames_rendered(), 2);
    }

    #[test]
    fn unsupported_platform_is_not_opened() {
        let (capture, mut pip) = pip(false);
        assert_eq!(
            pip.open(&snapshot(Phase::Work, 10, 10, false)),
            Err(OverlayError::Unsupported)
        );
        assert!(!pip.is_active());
        assert_eq!(capture.lock().unwrap().open_streams, 0);
        // Repainting a closed overlay is harmless.
        assert!(pip.repaint(&snapshot(Phase::Work, 9, 10, true)).is_ok());
    }

    #[test]
    fn close_is_idempotent_and_releases_stream() {
        let (capture, mut pip) = pip(true);
        pip.open(&snapshot(Phase::Work, 10, 10, true)).unwrap();
        assert_eq!(capture.lock().unwrap().open_streams, 1);
        pip.close();
        pip.close();
        assert_eq!(capture.lock().unwrap().open_streams, 0);
        assert!(!pip.is_active());
    }

    #[test]
    fn drop_releases_stream() {
        let (capture, mut pip) = pip(true);
        pip.open(&snapshot(Phase::Work, 10, 10, true)).unwrap();
        drop(pip);
        assert_eq!(capture.lock().unwrap().open_streams, 0);
    }

    #[test]
    fn terminal_overlay_writes_status_line() {
        let mut platform = TerminalOverlay::new(Vec::<u8>::new(), true);
        let mut stream = platform.open_stream(DEFAULT_FPS).unwrap();
        assert!(platform.is_supported());
        assert!(platform.in_use());
        assert!(matches!(
            platform.open_stream(DEFAULT_FPS),
            Err(OverlayError::StreamFailed(_))
        ));
        let frame = OverlayFrame::compose(&snapshot(Phase::Work, 750, 1500, true));
        stream.push(&frame).unwrap();
        assert!(stream.is_active());
        let text = frame.render_text();
        assert!(text.contains("12:30"));
        assert!(text.contains("50%"));
        assert!(text.contains("Running"));
        stream.stop();
        stream.stop();
        assert!(!stream.is_active());
        assert!(!platform.in_use());
        assert!(stream.push(&frame).is_err());
    }

    #[test]
    fn terminal_overlay_reopens_after_close() {
        let mut pip = PictureInPicture::new(TerminalOverlay::new(Vec::<u8>::new(), true), DEFAULT_FPS);
        let snap = snapshot(Phase::Work, 1500, 1500, false);
        for _ in 0..3 {
            pip.open(&snap).unwrap();
            assert!(pip.is_active());
            assert!(pip.platform().in_use());
            pip.close();
            assert!(!pip.is_active());
            assert!(!pip.platform().in_use());
        }
        assert!(pip.is_available());
    }

    #[test]
    fn denied_terminal_overlay_refuses_to_open() {
        let platform = TerminalOverlay::new(Vec::<u8>::new(), true).with_permission(false);
        let mut pip = PictureInPicture::new(platform, DEFAULT_FPS);
        assert!(pip.is_available());
        assert_eq!(
            pip.open(&snapshot(Phase::Work, 10, 10, false)),
            Err(OverlayError::PermissionDenied)
        );
        assert!(!pip.is_active());
        assert!(!pip.platform().in_use());
    }
}
