//! MQTT wire contract for the RGB light, plus the actuator boundary.
//!
//! Command topics accept either a bare `TOGGLE` string or a JSON object with
//! optional `state`, `color` and `transition` keys. Status publishes mirror
//! the actuator state as `{"state":"ON","color":{"r":..,"g":..,"b":..}}`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const WHITE: Rgb = Rgb {
        r: 255,
        g: 255,
        b: 255,
    };
}

/// Minimal synchronous contract of the RGB/relay actuator collaborator.
pub trait LightActuator {
    fn turn_on(&mut self);
    fn turn_off(&mut self);
    /// Toggle between on and off.
    fn commute(&mut self);
    fn is_on(&self) -> bool;
    fn color(&self) -> Rgb;
    fn set_color(&mut self, color: Rgb, transition_s: Option<u16>);
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LightCommand {
    pub state: Option<String>,
    pub color: Option<Rgb>,
    pub transition: Option<u16>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LightRequest {
    Toggle,
    Set(LightCommand),
}

/// Parse a command-topic payload. Malformed payloads surface as an error;
/// callers log and discard them without touching the actuator.
pub fn parse_command(payload: &[u8]) -> Result<LightRequest> {
    let text = std::str::from_utf8(payload).context("payload is not UTF-8")?;
    if text.trim() == "TOGGLE" {
        return Ok(LightRequest::Toggle);
    }
    let command: LightCommand =
        serde_json::from_str(text).context("payload is not a light command")?;
    Ok(LightRequest::Set(command))
}

/// Apply a parsed command to the actuator. State is applied before color so
/// `{"state":"ON","color":..}` lights up with the requested color.
pub fn apply_request<L: LightActuator>(light: &mut L, request: &LightRequest) {
    match request {
        LightRequest::Toggle => light.commute(),
        LightRequest::Set(command) => {
            if let Some(state) = &command.state {
                if state == "ON" {
                    light.turn_on();
                } else {
                    light.turn_off();
                }
            }
            if let Some(color) = command.color {
                light.set_color(color, command.transition);
            }
        }
    }
}

/// Status payload mirroring the actuator. An off light reports no color.
pub fn state_payload(on: bool, color: Rgb) -> String {
    let value = if on {
        serde_json::json!({
            "state": "ON",
            "color": { "r": color.r, "g": color.g, "b": color.b },
        })
    } else {
        serde_json::json!({ "state": "OFF" })
    };
    value.to_string()
}
