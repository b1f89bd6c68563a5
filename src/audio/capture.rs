//! Microphone capture via cpal.
//!
//! Opens the default (or named) input device at its native rate, down-mixes
//! to mono, resamples to 16 kHz, and pushes fixed 2048-sample frames
//! (~128 ms) into the ring buffer. The cpal `Stream` is not `Send`, so it
//! lives on a dedicated thread owned by a [`CaptureHandle`]; stopping the
//! handle drops the stream and releases the device.

use std::sync::mpsc as std_mpsc;
use std::time::Duration;

use anyhow::anyhow;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::StreamConfig;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use super::pcm::INPUT_SAMPLE_RATE;
use super::ring_buffer::{FrameConsumer, FrameProducer};

/// Outbound frame size in samples (~128 ms at 16 kHz).
pub const FRAME_SAMPLES: usize = 2048;

/// How often the pump checks the ring buffer for a complete frame.
const PUMP_INTERVAL: Duration = Duration::from_millis(20);

/// Handle to a running capture stream. Dropping or stopping it releases
/// the input device.
pub struct CaptureHandle {
    stop_tx: std_mpsc::Sender<()>,
}

impl CaptureHandle {
    /// Stop capture and release the device.
    pub fn stop(self) {
        let _ = self.stop_tx.send(());
    }
}

/// Find and configure the input device.
fn resolve_device(device_name: Option<&str>) -> anyhow::Result<(cpal::Device, StreamConfig, u32)> {
    let host = cpal::default_host();

    let device = if let Some(name) = device_name {
        host.input_devices()
            .map_err(|e| anyhow!("failed to enumerate input devices: {e}"))?
            .find(|d| d.name().map(|n| n == name).unwrap_or(false))
            .ok_or_else(|| anyhow!("input device not found: {name}"))?
    } else {
        host.default_input_device()
            .ok_or_else(|| anyhow!("no default input device available"))?
    };

    let dev_name = device.name().unwrap_or_else(|_| "unknown".into());
    info!(device = %dev_name, "Selected input device");

    let default_config = device
        .default_input_config()
        .map_err(|e| anyhow!("failed to get default input config: {e}"))?;

    let native_rate = default_config.sample_rate().0;
    let channels = default_config.channels();

    let stream_config = StreamConfig {
        channels,
        sample_rate: cpal::SampleRate(native_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    info!(
        native_rate,
        channels, "Input device config (resampling to {}Hz mono)", INPUT_SAMPLE_RATE
    );

    Ok((device, stream_config, native_rate))
}

/// Simple linear resampler for mono f32 samples.
fn resample_linear(input: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate {
        return input.to_vec();
    }
    let ratio = from_rate as f64 / to_rate as f64;
    let out_len = ((input.len() as f64) / ratio).floor() as usize;
    let mut output = Vec::with_capacity(out_len);
    for i in 0..out_len {
        let src_idx = i as f64 * ratio;
        let idx0 = src_idx.floor() as usize;
        let frac = (src_idx - idx0 as f64) as f32;
        let s0 = input.get(idx0).copied().unwrap_or(0.0);
        let s1 = input.get(idx0 + 1).copied().unwrap_or(s0);
        output.push(s0 + frac * (s1 - s0));
    }
    output
}

/// Down-mix multi-channel audio to mono by averaging channels.
fn to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    let ch = channels as usize;
    samples
        .chunks_exact(ch)
        .map(|frame| frame.iter().sum::<f32>() / ch as f32)
        .collect()
}

/// Start capturing into `producer`. Returns once the device is open and the
/// stream is playing; the stream itself lives on a dedicated thread until
/// the handle is stopped.
pub fn start_capture(
    mut producer: FrameProducer,
    device_name: Option<String>,
) -> anyhow::Result<CaptureHandle> {
    let (stop_tx, stop_rx) = std_mpsc::channel::<()>();
    let (ready_tx, ready_rx) = std_mpsc::channel::<anyhow::Result<()>>();

    std::thread::spawn(move || {
        let built = (|| -> anyhow::Result<cpal::Stream> {
            let (device, stream_config, native_rate) = resolve_device(device_name.as_deref())?;
            let channels = stream_config.channels;
            let needs_resample = native_rate != INPUT_SAMPLE_RATE;
            let needs_downmix = channels > 1;

            let mut chunk_buf: Vec<f32> = Vec::with_capacity(FRAME_SAMPLES * 2);

            let stream = device
                .build_input_stream(
                    &stream_config,
                    move |data: &[f32], _info: &cpal::InputCallbackInfo| {
                        let mono = if needs_downmix {
                            to_mono(data, channels)
                        } else {
                            data.to_vec()
                        };
                        let resampled = if needs_resample {
                            resample_linear(&mono, native_rate, INPUT_SAMPLE_RATE)
                        } else {
                            mono
                        };

                        chunk_buf.extend_from_slice(&resampled);
                        while chunk_buf.len() >= FRAME_SAMPLES {
                            let chunk: Vec<f32> = chunk_buf.drain(..FRAME_SAMPLES).collect();
                            // A full ring buffer drops the tail; the pump
                            // will catch up.
                            let _ = producer.push_slice(&chunk);
                        }
                    },
                    move |err| {
                        error!("Audio input stream error: {}", err);
                    },
                    None,
                )
                .map_err(|e| anyhow!("failed to build input stream: {e}"))?;

            stream
                .play()
                .map_err(|e| anyhow!("failed to start input stream: {e}"))?;
            Ok(stream)
        })();

        match built {
            Ok(stream) => {
                let _ = ready_tx.send(Ok(()));
                // Keep the stream alive until asked to stop.
                let _ = stop_rx.recv();
                drop(stream);
                debug!("Capture stream released");
            }
            Err(e) => {
                let _ = ready_tx.send(Err(e));
            }
        }
    });

    ready_rx
        .recv()
        .map_err(|_| anyhow!("capture thread exited before reporting readiness"))??;

    info!("Audio capture started");
    Ok(CaptureHandle { stop_tx })
}

/// Drain complete frames out of the ring buffer and forward them to the
/// session. Exits when the session drops the receiving end.
pub fn spawn_frame_pump(mut consumer: FrameConsumer, tx: mpsc::UnboundedSender<Vec<f32>>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(PUMP_INTERVAL);
        loop {
            ticker.tick().await;
            if tx.is_closed() {
                debug!("Frame pump exiting, session gone");
                return;
            }
            while consumer.available() >= FRAME_SAMPLES {
                let mut frame = vec![0.0f32; FRAME_SAMPLES];
                let read = consumer.pop_slice(&mut frame);
                frame.truncate(read);
                if tx.send(frame).is_err() {
                    debug!("Frame pump exiting, session gone");
                    return;
                }
            }
        }
    });
}
