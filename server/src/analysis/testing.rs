//! In-memory video backend for tests.

use std::{
    path::Path,
    sync::{mpsc, Arc, Mutex},
};

use common::AnalysisError;

use super::{Frame, Probe, ProbeFormat, ProbeStream, VideoBackend, VideoSource};

pub(crate) fn sample_probe() -> Probe {
    Probe {
        streams: vec![
            ProbeStream {
                codec_type: Some("video".to_string()),
                codec_name: Some("h264".to_string()),
                width: Some(1920),
                height: Some(1080),
                avg_frame_rate: Some("30/1".to_string()),
                bit_rate: Some("4000000".to_string()),
                duration: Some("10.5".to_string()),
                color_space: Some("bt709".to_string()),
                field_order: Some("progressive".to_string()),
                ..Default::default()
            },
            ProbeStream {
                codec_type: Some("audio".to_string()),
                codec_name: Some("aac".to_string()),
                sample_rate: Some("48000".to_string()),
                channels: Some(2),
                bit_rate: Some("128000".to_string()),
                ..Default::default()
            },
        ],
        format: ProbeFormat::default(),
    }
}

/// Every frame is a small uniform image whose bytes all equal its level.
pub(crate) struct FakeBackend {
    pub probe: Result<Probe, AnalysisError>,
    pub levels: Vec<u8>,
    pub fps: f64,
    pub reported_frames: Option<u64>,
    pub fail_open: bool,
    pub fail_at: Option<u64>,
    pub reads: Arc<Mutex<Vec<u64>>>,
    gate: Mutex<Option<mpsc::Receiver<()>>>,
}

impl FakeBackend {
    pub fn with_levels(levels: Vec<u8>) -> Self {
        Self {
            probe: Ok(sample_probe()),
            levels,
            fps: 30.0,
            reported_frames: None,
            fail_open: false,
            fail_at: None,
            reads: Arc::new(Mutex::new(Vec::new())),
            gate: Mutex::new(None),
        }
    }

    /// The first probe blocks until the returned sender fires (or is dropped).
    pub fn gated(mut self) -> (Self, mpsc::Sender<()>) {
        let (tx, rx) = mpsc::channel();
        self.gate = Mutex::new(Some(rx));
        (self, tx)
    }

    pub fn source(&self) -> FakeSource {
        FakeSource {
            levels: self.levels.clone(),
            fps: self.fps,
            frame_count: self
                .reported_frames
                .unwrap_or(self.levels.len() as u64),
            fail_at: self.fail_at,
            reads: Arc::clone(&self.reads),
        }
    }

    pub fn reads(&self) -> Vec<u64> {
        self.reads.lock().unwrap().clone()
    }
}

impl VideoBackend for FakeBackend {
    fn probe(&self, _path: &Path) -> Result<Probe, AnalysisError> {
        let gate = self.gate.lock().unwrap().take();
        if let Some(rx) = gate {
            let _ = rx.recv();
        }
        self.probe.clone()
    }

    fn open(&self, _path: &Path) -> Result<Box<dyn VideoSource>, AnalysisError> {
        if self.fail_open {
            return Err(AnalysisError::VideoOpen("unsupported container".to_string()));
        }
        Ok(Box::new(self.source()))
    }
}

pub(crate) struct FakeSource {
    levels: Vec<u8>,
    fps: f64,
    frame_count: u64,
    fail_at: Option<u64>,
    reads: Arc<Mutex<Vec<u64>>>,
}

impl VideoSource for FakeSource {
    fn frame_count(&self) -> u64 {
        self.frame_count
    }

    fn frame_rate(&self) -> f64 {
        self.fps
    }

    fn read_frame(&mut self, index: u64) -> Result<Option<Frame>, AnalysisError> {
        self.reads.lock().unwrap().push(index);
        if self.fail_at == Some(index) {
            return Err(AnalysisError::Decode(format!("corrupt packet at {index}")));
        }
        Ok(self.levels.get(index as usize).map(|&level| Frame {
            width: 4,
            height: 4,
            rgb: vec![level; 4 * 4 * 3],
        }))
    }
}
