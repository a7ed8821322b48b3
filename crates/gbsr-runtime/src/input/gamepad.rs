//! Joystick input through gilrs.
//!
//! One gamepad is active at a time. The configured name is preferred; when it
//! is missing the first connected gamepad is used instead.

use gilrs::{Axis, Button, Event, EventType, GamepadId, Gilrs};
use thiserror::Error;

use super::{EventSource, InputEvent};

#[derive(Error, Debug)]
pub enum GamepadError {
    #[error("failed to initialize gamepad backend: {0}")]
    Init(String),
}

/// Button order used to derive stable button indices.
const BUTTONS: [Button; 19] = [
    Button::South,
    Button::East,
    Button::North,
    Button::West,
    Button::C,
    Button::Z,
    Button::LeftTrigger,
    Button::LeftTrigger2,
    Button::RightTrigger,
    Button::RightTrigger2,
    Button::Select,
    Button::Start,
    Button::Mode,
    Button::LeftThumb,
    Button::RightThumb,
    Button::DPadUp,
    Button::DPadDown,
    Button::DPadLeft,
    Button::DPadRight,
];

fn button_index(button: Button) -> Option<u8> {
    BUTTONS.iter().position(|b| *b == button).map(|i| i as u8)
}

/// Axis index plus whether it rests fully released (a trigger).
fn axis_index(axis: Axis) -> Option<(u8, bool)> {
    match axis {
        Axis::LeftStickX => Some((0, false)),
        Axis::LeftStickY => Some((1, false)),
        Axis::LeftZ => Some((2, true)),
        Axis::RightStickX => Some((3, false)),
        Axis::RightStickY => Some((4, false)),
        Axis::RightZ => Some((5, true)),
        Axis::DPadX => Some((6, false)),
        Axis::DPadY => Some((7, false)),
        _ => None,
    }
}

/// Maps a gilrs reading onto the signed 16-bit axis range.
fn axis_value(value: f32, trigger: bool) -> i16 {
    if trigger {
        // Triggers report 0..=1 and rest at the bottom of the range.
        (value.clamp(0.0, 1.0) * 65535.0 - 32768.0) as i16
    } else {
        (value.clamp(-1.0, 1.0) * 32767.0) as i16
    }
}

#[derive(Debug, Clone)]
pub struct GamepadInfo {
    pub id: usize,
    pub name: String,
}

pub struct GamepadSource {
    gilrs: Gilrs,
    preferred: Option<String>,
    active: Option<GamepadId>,
}

impl GamepadSource {
    pub fn new(preferred: Option<&str>) -> Result<Self, GamepadError> {
        let gilrs = Gilrs::new().map_err(|e| {
            tracing::error!("Failed to initialize gilrs: {}", e);
            GamepadError::Init(e.to_string())
        })?;

        let mut source = Self {
            gilrs,
            preferred: preferred.map(str::to_owned),
            active: None,
        };
        source.select();
        Ok(source)
    }

    /// Connected gamepads in enumeration order.
    pub fn gamepads(&self) -> Vec<GamepadInfo> {
        self.gilrs
            .gamepads()
            .filter(|(_, gamepad)| gamepad.is_connected())
            .map(|(id, gamepad)| GamepadInfo {
                id: id.into(),
                name: gamepad.name().to_string(),
            })
            .collect()
    }

    /// Name of the gamepad whose events are forwarded, if any.
    pub fn opened_name(&self) -> Option<String> {
        self.active
            .map(|id| self.gilrs.gamepad(id).name().to_string())
    }

    fn select(&mut self) {
        let connected: Vec<(GamepadId, String)> = self
            .gilrs
            .gamepads()
            .filter(|(_, gamepad)| gamepad.is_connected())
            .map(|(id, gamepad)| (id, gamepad.name().to_string()))
            .collect();

        let by_name = self
            .preferred
            .as_deref()
            .and_then(|want| connected.iter().find(|(_, name)| name == want));

        if self.preferred.is_some() && by_name.is_none() && !connected.is_empty() {
            tracing::warn!(
                "Gamepad {:?} not found, falling back to the first connected one",
                self.preferred
            );
        }

        self.active = by_name.or(connected.first()).map(|(id, name)| {
            tracing::info!("Using gamepad: {} ({:?})", name, id);
            *id
        });
    }

    fn translate(&self, event: EventType) -> Option<InputEvent> {
        match event {
            EventType::ButtonPressed(button, _) => button_index(button).map(|index| {
                InputEvent::Button { index, down: true }
            }),
            EventType::ButtonReleased(button, _) => button_index(button).map(|index| {
                InputEvent::Button { index, down: false }
            }),
            EventType::AxisChanged(axis, value, _) => {
                axis_index(axis).map(|(index, trigger)| InputEvent::Axis {
                    index,
                    value: axis_value(value, trigger),
                    rest: trigger.then_some(i16::MIN),
                })
            }
            _ => None,
        }
    }
}

impl EventSource for GamepadSource {
    fn poll(&mut self, out: &mut Vec<InputEvent>) -> bool {
        while let Some(Event { id, event, .. }) = self.gilrs.next_event() {
            match event {
                EventType::Connected => {
                    tracing::info!("Gamepad connected: {} ({:?})", self.gilrs.gamepad(id).name(), id);
                    if self.active.is_none() {
                        self.select();
                    }
                }
                EventType::Disconnected => {
                    tracing::info!("Gamepad disconnected: {:?}", id);
                    if self.active == Some(id) {
                        self.active = None;
                        self.select();
                    }
                }
                other if self.active == Some(id) => {
                    out.extend(self.translate(other));
                }
                _ => {}
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn button_indices_follow_fixed_order() {
        assert_eq!(button_index(Button::South), Some(0));
        assert_eq!(button_index(Button::Start), Some(11));
        assert_eq!(button_index(Button::DPadRight), Some(18));
        assert_eq!(button_index(Button::Unknown), None);
    }

    #[test]
    fn trigger_rest_maps_to_minimum() {
        assert_eq!(axis_value(0.0, true), i16::MIN);
        assert_eq!(axis_value(1.0, true), i16::MAX);
        assert_eq!(axis_value(-1.0, false), -32767);
        assert_eq!(axis_value(0.0, false), 0);
    }

    #[test]
    fn z_axes_are_triggers() {
        assert_eq!(axis_index(Axis::LeftZ), Some((2, true)));
        assert_eq!(axis_index(Axis::RightStickY), Some((4, false)));
    }
}
