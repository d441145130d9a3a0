//! MIDI control surface adapter
//!
//! Input: every message is decoded into a [`ControlEvent`] and queued on the
//! engine from the midir callback thread, without blocking.
//! Output: [`SurfaceOutput`] implements [`IndicatorSink`] (button LEDs and
//! motor fader positions).

pub mod squelch;

pub use squelch::PitchBendSquelch;

use crate::backend::{BackendError, IndicatorSink};
use crate::config::MidiConfig;
use crate::engine::EngineHandle;
use crate::mapping::{ControlEvent, ControlNumber};
use crate::midi::{decode_control_event, encode_feedback, encode_indicator, format_hex, MidiMessage};
use anyhow::{Context, Result};
use colored::*;
use midir::{MidiInput, MidiInputConnection, MidiOutput, MidiOutputConnection};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, trace};

const CLIENT_NAME: &str = "Surface-Mixer";

/// Writes indicator and feedback messages to the surface output port
pub struct SurfaceOutput {
    conn: Mutex<MidiOutputConnection>,
    port_name: String,
    squelch: PitchBendSquelch,
    squelch_ms: u64,
}

impl SurfaceOutput {
    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    fn send(&self, message: &MidiMessage) -> Result<(), BackendError> {
        let data = message.encode();
        self.conn
            .lock()
            .send(&data)
            .map_err(|e| BackendError::Write(e.to_string()))?;
        trace!("Sent: {} | {}", format_hex(&data), message);
        Ok(())
    }
}

impl IndicatorSink for SurfaceOutput {
    fn set_indicator(&self, source: u8, control: ControlNumber, on: bool) -> Result<(), BackendError> {
        match encode_indicator(source, control, on) {
            Some(message) => self.send(&message),
            None => Ok(()),
        }
    }

    fn send_continuous_feedback(
        &self,
        source: u8,
        control: ControlNumber,
        normalized: f32,
    ) -> Result<(), BackendError> {
        let message = encode_feedback(source, control, normalized);
        if let MidiMessage::PitchBend { value, .. } = message {
            self.squelch.arm(source, value, self.squelch_ms);
        }
        self.send(&message)
    }
}

/// Open surface connection; dropping it closes both ports
pub struct SurfaceConnection {
    _input: MidiInputConnection<()>,
    output: Arc<SurfaceOutput>,
}

impl SurfaceConnection {
    /// Connect both ports and start feeding the engine
    pub fn connect(config: &MidiConfig, engine: EngineHandle) -> Result<Self> {
        info!(
            "Connecting to surface - Input: '{}', Output: '{}'",
            config.input_port, config.output_port
        );
        let squelch = PitchBendSquelch::new();

        let midi_out = MidiOutput::new(CLIENT_NAME).context("Failed to create MIDI output")?;
        let out_port = find_port(&midi_out.ports(), |p| midi_out.port_name(p).ok(), &config.output_port)
            .ok_or_else(|| anyhow::anyhow!("Output port '{}' not found", config.output_port))?;
        let out_name = midi_out.port_name(&out_port).unwrap_or_default();
        let conn = midi_out
            .connect(&out_port, CLIENT_NAME)
            .map_err(|e| anyhow::anyhow!(e.to_string()))
            .context("Failed to connect to output port")?;
        info!("Connected to output port: {}", out_name);

        let midi_in = MidiInput::new(CLIENT_NAME).context("Failed to create MIDI input")?;
        let in_port = find_port(&midi_in.ports(), |p| midi_in.port_name(p).ok(), &config.input_port)
            .ok_or_else(|| anyhow::anyhow!("Input port '{}' not found", config.input_port))?;
        let in_name = midi_in.port_name(&in_port).unwrap_or_default();

        let input_squelch = squelch.clone();
        let input = midi_in
            .connect(
                &in_port,
                CLIENT_NAME,
                move |_timestamp, data, _| match decode_control_event(data) {
                    Some(event) if is_fader_echo(&event, &input_squelch) => {
                        trace!(source = event.source_channel, "Pitch bend squelched");
                    }
                    Some(event) => engine.control_event(event),
                    None => trace!("Ignored MIDI: {}", format_hex(data)),
                },
                (),
            )
            .map_err(|e| anyhow::anyhow!(e.to_string()))
            .context("Failed to connect to input port")?;
        info!("Connected to input port: {}", in_name);

        Ok(Self {
            _input: input,
            output: Arc::new(SurfaceOutput {
                conn: Mutex::new(conn),
                port_name: out_name,
                squelch,
                squelch_ms: config.pitch_bend_squelch_ms,
            }),
        })
    }

    /// The indicator sink to hand to the engine
    pub fn indicators(&self) -> Arc<SurfaceOutput> {
        Arc::clone(&self.output)
    }
}

fn is_fader_echo(event: &ControlEvent, squelch: &PitchBendSquelch) -> bool {
    event.control == ControlNumber::PitchBend && squelch.is_echo(event.source_channel, event.raw_value)
}

/// First port whose name contains `pattern`, case-insensitively
fn find_port<P: Clone>(ports: &[P], name_of: impl Fn(&P) -> Option<String>, pattern: &str) -> Option<P> {
    let pattern = pattern.to_lowercase();
    ports.iter().find_map(|port| {
        let name = name_of(port)?;
        if name.to_lowercase().contains(&pattern) {
            debug!("Found port '{}' matching pattern '{}'", name, pattern);
            Some(port.clone())
        } else {
            None
        }
    })
}

/// Names of the available input and output ports
pub fn list_ports() -> Result<(Vec<String>, Vec<String>)> {
    let midi_in = MidiInput::new(CLIENT_NAME).context("Failed to create MIDI input")?;
    let inputs = midi_in
        .ports()
        .iter()
        .filter_map(|p| midi_in.port_name(p).ok())
        .collect();

    let midi_out = MidiOutput::new(CLIENT_NAME).context("Failed to create MIDI output")?;
    let outputs = midi_out
        .ports()
        .iter()
        .filter_map(|p| midi_out.port_name(p).ok())
        .collect();

    Ok((inputs, outputs))
}

/// Print the available ports, marking the ones the config would pick
pub fn print_ports(config: &MidiConfig) -> Result<()> {
    let (inputs, outputs) = list_ports()?;

    println!("\n{}", "=== Available MIDI Ports ===".bold().cyan());
    for (title, ports, pattern) in [
        ("Input Ports:", &inputs, &config.input_port),
        ("Output Ports:", &outputs, &config.output_port),
    ] {
        println!("\n{}", title.bold());
        if ports.is_empty() {
            println!("  {}", "No ports found".dimmed());
            continue;
        }
        let chosen = find_port(ports, |name| Some(name.clone()), pattern);
        for name in ports {
            if chosen.as_ref() == Some(name) {
                println!("  {} {}", "[MATCH]".green(), name.bright_white());
            } else {
                println!("        {}", name);
            }
        }
    }
    println!();
    Ok(())
}
