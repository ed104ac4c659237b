//! Microphone pipeline behind the energy wakeword.
//! cpal callback → ring buffer → processing thread → keyword spotter → callback.
//! The cpal stream is not Send, so it is built and dropped on the listener thread.

pub mod ring_buffer;
pub mod vad;
pub mod wake;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use serde::Deserialize;
use tracing::{error, info, warn};

use crate::wakeword::{KeywordCallback, WakeModel, WakewordError};
use ring_buffer::RingBuffer;
use wake::KeywordSpotter;

/// Audio pipeline configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub channels: u16,
    pub ring_buffer_secs: f32,
    /// Samples per processing frame.
    pub frame_size: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            channels: 1,
            ring_buffer_secs: 3.0,
            frame_size: 512, // ~32ms at 16kHz
        }
    }
}

/// Running listener thread. Dropping it stops and joins the thread.
pub struct ListenerHandle {
    stop_flag: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl ListenerHandle {
    /// Signal the thread and wait for it (blocking, at most one frame period).
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop_flag.store(true, Ordering::SeqCst);
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                error!("wakeword listener thread panicked");
            }
        }
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Spawn the listener thread and wait until its input stream is running.
/// Blocking: call from `spawn_blocking`.
pub fn spawn_listener(
    config: AudioConfig,
    model: WakeModel,
    callback: Arc<RwLock<Option<KeywordCallback>>>,
) -> Result<ListenerHandle, WakewordError> {
    let stop_flag = Arc::new(AtomicBool::new(false));
    let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<(), WakewordError>>(1);

    let stop_thread = Arc::clone(&stop_flag);
    let thread = std::thread::Builder::new()
        .name("wakeword-audio".into())
        .spawn(move || {
            let ring = Arc::new(Mutex::new(RingBuffer::new(
                config.sample_rate,
                config.ring_buffer_secs,
            )));
            let stream = match start_capture_stream(&config, Arc::clone(&ring)) {
                Ok(stream) => stream,
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };
            let _ = ready_tx.send(Ok(()));
            run_processing_loop(&ring, config.frame_size, &stop_thread, &model, &callback);
            drop(stream);
            info!("wakeword audio stream closed");
        })
        .map_err(|e| WakewordError::Thread(format!("failed to spawn listener thread: {e}")))?;

    let handle = ListenerHandle {
        stop_flag,
        thread: Some(thread),
    };
    match ready_rx.recv() {
        Ok(Ok(())) => Ok(handle),
        Ok(Err(e)) => Err(e),
        Err(_) => Err(WakewordError::Thread("listener thread exited during setup".into())),
    }
}

/// Start cpal audio capture stream.
fn start_capture_stream(
    config: &AudioConfig,
    ring: Arc<Mutex<RingBuffer>>,
) -> Result<cpal::Stream, WakewordError> {
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| WakewordError::Device("no audio input device available".into()))?;

    let stream_config = cpal::StreamConfig {
        channels: config.channels,
        sample_rate: cpal::SampleRate(config.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let stream = device
        .build_input_stream(
            &stream_config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                ring.lock().write(data);
            },
            |err| {
                error!(error = %err, "audio capture error");
            },
            None,
        )
        .map_err(|e| WakewordError::Device(format!("failed to build input stream: {e}")))?;

    stream
        .play()
        .map_err(|e| WakewordError::Device(format!("failed to start audio stream: {e}")))?;
    info!("wakeword audio stream started");

    Ok(stream)
}

fn run_processing_loop(
    ring: &Mutex<RingBuffer>,
    frame_size: usize,
    stop_flag: &AtomicBool,
    model: &WakeModel,
    callback: &RwLock<Option<KeywordCallback>>,
) {
    let mut spotter = KeywordSpotter::new(model);
    let mut frame_buf = vec![0i16; frame_size];
    let sleep_between = Duration::from_millis(20);

    info!(model = %model.name, "wakeword processing loop started");

    while !stop_flag.load(Ordering::Relaxed) {
        let read_count = {
            let mut rb = ring.lock();
            if rb.available() < frame_size {
                0
            } else {
                rb.read(&mut frame_buf)
            }
        };
        if read_count == 0 {
            std::thread::sleep(sleep_between);
            continue;
        }

        if spotter.process(&frame_buf[..read_count], Instant::now()) {
            info!("keyword_spotted");
            let registered = callback.read().clone();
            match registered {
                Some(cb) => cb(),
                None => warn!("keyword spotted but no callback registered"),
            }
        }
    }

    info!("wakeword processing loop stopping");
}
