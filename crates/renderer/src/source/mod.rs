//! Frame producers feeding the viewer.
//!
//! A [`FrameSource`] draws RGBA8 canvases; the producer thread encodes them
//! into the selected wire format and hands complete [`SourceFrame`]s to the
//! render thread over a bounded channel. When the renderer falls behind the
//! newest frames are dropped instead of queueing.

mod convert;
mod pattern;
mod still;

use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use image::RgbaImage;
use tracing::{debug, info, warn};

use crate::types::{FrameBuffer, FrameFormat, PixelFormat, SourceConfig, SourceKind};

pub use convert::{encode, pitch_for};
pub use pattern::PatternSource;
pub use still::ImageSource;

const FRAME_QUEUE_DEPTH: usize = 2;

pub trait FrameSource: Send {
    fn name(&self) -> &str;

    /// Draws frame number `index`.
    fn next_canvas(&mut self, index: u64) -> Result<RgbaImage>;
}

/// Opens the source described by `config`.
pub fn open_source(config: &SourceConfig) -> Result<Box<dyn FrameSource>> {
    Ok(match &config.kind {
        SourceKind::Pattern => Box::new(PatternSource::new(config.size.0, config.size.1)),
        SourceKind::Image { path } => Box::new(ImageSource::open(path)?),
    })
}

/// One encoded frame, ready for the desktop.
#[derive(Debug, Clone)]
pub struct SourceFrame {
    pub index: u64,
    pub format: FrameFormat,
    pub data: FrameBuffer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProducerCommand {
    /// Switch to the next wire format in the cycle.
    CycleFormat,
    Shutdown,
}

/// Background thread producing frames at a fixed rate.
pub struct FrameProducer {
    commands: Sender<ProducerCommand>,
    frames: Receiver<SourceFrame>,
    join_handle: Option<JoinHandle<()>>,
}

impl FrameProducer {
    pub fn spawn(source: Box<dyn FrameSource>, format: PixelFormat, fps: f32) -> Result<Self> {
        if !fps.is_finite() || fps <= 0.0 {
            return Err(anyhow!("frame rate must be positive, got {fps}"));
        }
        let interval = Duration::try_from_secs_f32(1.0 / fps)
            .map_err(|err| anyhow!("frame rate {fps} gives an unusable interval: {err}"))?;
        let (frame_tx, frame_rx) = bounded(FRAME_QUEUE_DEPTH);
        let (command_tx, command_rx) = unbounded();

        let handle = thread::Builder::new()
            .name("relayview-producer".into())
            .spawn(move || run_producer(source, format, interval, command_rx, frame_tx))
            .map_err(|err| anyhow!("failed to spawn frame producer: {err}"))?;

        Ok(Self {
            commands: command_tx,
            frames: frame_rx,
            join_handle: Some(handle),
        })
    }

    /// Newest available frame, discarding older queued ones. Never blocks.
    pub fn latest(&self) -> Option<SourceFrame> {
        self.frames.try_iter().last()
    }

    pub fn cycle_format(&self) {
        let _ = self.commands.send(ProducerCommand::CycleFormat);
    }

    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(handle) = self.join_handle.take() {
            let _ = self.commands.send(ProducerCommand::Shutdown);
            if handle.join().is_err() {
                warn!("frame producer thread panicked");
            }
        }
    }
}

impl Drop for FrameProducer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_producer(
    mut source: Box<dyn FrameSource>,
    mut format: PixelFormat,
    interval: Duration,
    commands: Receiver<ProducerCommand>,
    frames: Sender<SourceFrame>,
) {
    info!(source = source.name(), %format, ?interval, "frame producer started");
    let mut index = 0u64;
    let mut dropped = 0u64;
    let mut deadline = Instant::now();

    loop {
        match commands.recv_deadline(deadline) {
            Ok(ProducerCommand::CycleFormat) => {
                format = format.next();
                info!(%format, "source format changed");
                continue;
            }
            Ok(ProducerCommand::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }

        match source.next_canvas(index) {
            Ok(canvas) => {
                let (frame_format, data) = encode(&canvas, format);
                let frame = SourceFrame {
                    index,
                    format: frame_format,
                    data,
                };
                match frames.try_send(frame) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        dropped += 1;
                        if dropped.is_power_of_two() {
                            debug!(dropped, "renderer is behind; dropping frames");
                        }
                    }
                    Err(TrySendError::Disconnected(_)) => break,
                }
            }
            Err(err) => warn!(index, error = %err, "failed to produce frame"),
        }

        index += 1;
        deadline += interval;
        let now = Instant::now();
        if deadline < now {
            deadline = now;
        }
    }
    info!(frames = index, dropped, "frame producer stopped");
}

/// Derives the source-changed flag from consecutive frame descriptors.
#[derive(Debug, Default)]
pub struct FrameTracker {
    last: Option<FrameFormat>,
}

impl FrameTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// True for the first frame and whenever the descriptor differs from the
    /// previous one.
    pub fn observe(&mut self, format: &FrameFormat) -> bool {
        let changed = self.last.as_ref() != Some(format);
        self.last = Some(*format);
        changed
    }

    /// Forces the next frame to count as a change.
    pub fn reset(&mut self) {
        self.last = None;
    }
}
