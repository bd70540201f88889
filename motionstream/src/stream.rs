/*!
Live stream capture.

Two threads, connected by a bounded channel:
1. Reader thread: owns the `Connection`, reads whole messages and forwards them
2. Printer (caller's thread): decodes each message and writes one JSON line

The reader checks the running flag between bounded reads, so Ctrl+C stops the
stream within one read timeout.
*/

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Local};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use motion_sdk::channels::ChannelSet;
use motion_sdk::format::{self, DecodedFrame};
use motion_sdk::{Connection, Service};
use serde_json::{json, Map, Value};
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Everything the reader thread needs to open and drive a connection
#[derive(Debug, Clone)]
pub struct StreamOptions {
    pub host: String,
    pub port: u16,
    pub service: Service,
    /// Stop after this many messages
    pub max_samples: Option<u64>,
    /// Print raw payloads as hex instead of decoded elements
    pub hex: bool,
    /// Sent once before the first read when streaming the Configurable service
    pub channels: ChannelSet,
    pub channel_capacity: usize,
    pub wait_timeout_secs: u64,
    pub read_timeout_secs: u64,
    pub write_timeout_secs: u64,
}

/// One message as it came off the wire
#[derive(Debug, Clone)]
pub struct Sample {
    pub received: DateTime<Local>,
    pub payload: Vec<u8>,
}

pub struct MotionStreamer {
    options: StreamOptions,
    running: Arc<AtomicBool>,
}

impl MotionStreamer {
    pub fn new(options: StreamOptions) -> Self {
        Self {
            options,
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Get a reference to the running flag for external control
    pub fn get_running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Stream until interrupted, the sample limit is hit, or the service
    /// closes the connection. Returns the number of messages written.
    pub fn start<W: Write>(&mut self, out: &mut W) -> Result<u64> {
        let (data_tx, data_rx) = bounded::<Sample>(self.options.channel_capacity.max(1));

        let options = self.options.clone();
        let running_reader = Arc::clone(&self.running);

        let reader_handle = thread::spawn(move || {
            match Self::reader_thread(options, data_tx, running_reader) {
                Ok(count) => {
                    info!("Reader thread finished after {} messages", count);
                    Ok(count)
                }
                Err(e) => {
                    error!("Reader thread failed: {:#}", e);
                    Err(e)
                }
            }
        });

        let written = Self::print_samples(&self.options, data_rx, out);

        // The printer only stops early on a write error, release the reader
        self.running.store(false, Ordering::SeqCst);
        let reader_result = reader_handle
            .join()
            .map_err(|_| anyhow!("Reader thread panicked"))?;

        reader_result?;
        written
    }

    fn reader_thread(
        options: StreamOptions,
        data_tx: Sender<Sample>,
        running: Arc<AtomicBool>,
    ) -> Result<u64> {
        info!(
            "Connecting to {} service at {}:{}",
            options.service, options.host, options.port
        );
        let mut client = Connection::connect(&options.host, options.port)
            .with_context(|| format!("Failed to connect to {}:{}", options.host, options.port))?;

        if options.service == Service::Configurable {
            if options.channels.is_empty() {
                warn!("No channels requested, the Configurable service will not send data");
            } else if client.write_data(
                &options.channels.to_bytes(),
                Some(options.write_timeout_secs),
            )? {
                info!("Sent {} channel definition(s)", options.channels.len());
            } else {
                warn!("Timed out sending the channel definition");
            }
        }

        if !client.wait_for_data(Some(options.wait_timeout_secs))? {
            warn!(
                "No data from {}:{} after {}s",
                options.host, options.port, options.wait_timeout_secs
            );
            return Ok(0);
        }

        let start_time = Instant::now();
        let mut count = 0u64;
        let mut dropped = 0u64;

        while running.load(Ordering::SeqCst) {
            if options.max_samples.is_some_and(|max| count >= max) {
                break;
            }

            match client.read_data(Some(options.read_timeout_secs))? {
                Some(payload) => {
                    let sample = Sample {
                        received: Local::now(),
                        payload,
                    };
                    match data_tx.try_send(sample) {
                        Ok(()) => count += 1,
                        Err(TrySendError::Full(_)) => {
                            dropped += 1;
                            warn!("Output channel full, dropping message");
                        }
                        Err(TrySendError::Disconnected(_)) => break,
                    }

                    if count > 0 && count % 1000 == 0 {
                        let rate = count as f64 / start_time.elapsed().as_secs_f64();
                        info!("Received {} messages, {:.1} per second", count, rate);
                    }
                }
                None if client.is_connected() => {
                    debug!("No message within {}s", options.read_timeout_secs);
                }
                None => {
                    info!("Service closed the connection");
                    break;
                }
            }
        }

        if dropped > 0 {
            warn!("Dropped {} messages", dropped);
        }
        if client.is_connected() {
            client.close()?;
        }

        Ok(count)
    }

    fn print_samples<W: Write>(
        options: &StreamOptions,
        data_rx: Receiver<Sample>,
        out: &mut W,
    ) -> Result<u64> {
        let mut written = 0u64;

        // Ends once the reader drops its sender
        for sample in data_rx.iter() {
            let line = if options.hex {
                hex_line(options.service, &sample)
            } else {
                let frame = format::decode(options.service, &sample.payload);
                if frame.is_empty() {
                    debug!(
                        "Message of {} bytes did not decode as {}",
                        sample.payload.len(),
                        options.service
                    );
                }
                frame_line(&frame, &sample)
            };

            writeln!(out, "{}", line).context("Failed to write output")?;
            out.flush().context("Failed to flush output")?;
            written += 1;
        }

        Ok(written)
    }
}

/// Raw payload as a JSON line
pub fn hex_line(service: Service, sample: &Sample) -> Value {
    json!({
        "timestamp": sample.received.to_rfc3339(),
        "service": service,
        "size": sample.payload.len(),
        "payload": hex::encode(&sample.payload),
    })
}

/// Decoded message as a JSON line, one entry per sensor id
pub fn frame_line(frame: &DecodedFrame, sample: &Sample) -> Value {
    json!({
        "timestamp": sample.received.to_rfc3339(),
        "service": frame.service(),
        "elements": elements_json(frame),
    })
}

fn elements_json(frame: &DecodedFrame) -> Value {
    let mut elements = Map::new();
    match frame {
        DecodedFrame::Preview(map) => {
            for (id, element) in map {
                elements.insert(
                    id.to_string(),
                    json!({
                        "global_quaternion": element.quaternion(false),
                        "local_quaternion": element.quaternion(true),
                        "euler": element.euler(),
                        "acceleration": element.acceleration(),
                    }),
                );
            }
        }
        DecodedFrame::Sensor(map) => {
            for (id, element) in map {
                elements.insert(
                    id.to_string(),
                    json!({
                        "accelerometer": element.accelerometer(),
                        "magnetometer": element.magnetometer(),
                        "gyroscope": element.gyroscope(),
                    }),
                );
            }
        }
        DecodedFrame::Raw(map) => {
            for (id, element) in map {
                elements.insert(
                    id.to_string(),
                    json!({
                        "accelerometer": element.accelerometer(),
                        "magnetometer": element.magnetometer(),
                        "gyroscope": element.gyroscope(),
                    }),
                );
            }
        }
        DecodedFrame::Configurable(map) => {
            for (id, element) in map {
                elements.insert(id.to_string(), json!(element.access()));
            }
        }
    }
    Value::Object(elements)
}
