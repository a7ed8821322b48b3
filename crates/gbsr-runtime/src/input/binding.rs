//! Physical bindings for logical inputs.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use super::{LogicalInput, RawDeviceState};

/// Keyboard key identifier using SDL keycode numbering.
///
/// Printable keys use their lowercase ASCII value; everything else lives in
/// the `0x4000_0000` scancode-mask range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyCode(pub u32);

const SCANCODE_MASK: u32 = 1 << 30;

impl KeyCode {
    pub const BACKSPACE: Self = Self(0x08);
    pub const TAB: Self = Self(0x09);
    pub const RETURN: Self = Self(0x0D);
    pub const ESCAPE: Self = Self(0x1B);
    pub const SPACE: Self = Self(0x20);

    pub const F1: Self = Self(SCANCODE_MASK | 58);
    pub const F2: Self = Self(SCANCODE_MASK | 59);
    pub const F3: Self = Self(SCANCODE_MASK | 60);
    pub const F4: Self = Self(SCANCODE_MASK | 61);
    pub const F5: Self = Self(SCANCODE_MASK | 62);
    pub const F6: Self = Self(SCANCODE_MASK | 63);
    pub const F7: Self = Self(SCANCODE_MASK | 64);
    pub const F8: Self = Self(SCANCODE_MASK | 65);
    pub const F9: Self = Self(SCANCODE_MASK | 66);
    pub const F10: Self = Self(SCANCODE_MASK | 67);
    pub const F11: Self = Self(SCANCODE_MASK | 68);
    pub const F12: Self = Self(SCANCODE_MASK | 69);

    pub const RIGHT: Self = Self(SCANCODE_MASK | 79);
    pub const LEFT: Self = Self(SCANCODE_MASK | 80);
    pub const DOWN: Self = Self(SCANCODE_MASK | 81);
    pub const UP: Self = Self(SCANCODE_MASK | 82);

    /// Keycode for a printable ASCII character. Letters are case-folded.
    pub const fn from_char(c: char) -> Self {
        Self(c.to_ascii_lowercase() as u32)
    }

    /// Human-readable key name.
    pub fn name(self) -> String {
        const NAMED: [(KeyCode, &str); 9] = [
            (KeyCode::BACKSPACE, "Backspace"),
            (KeyCode::TAB, "Tab"),
            (KeyCode::RETURN, "Return"),
            (KeyCode::ESCAPE, "Escape"),
            (KeyCode::SPACE, "Space"),
            (KeyCode::RIGHT, "Right"),
            (KeyCode::LEFT, "Left"),
            (KeyCode::DOWN, "Down"),
            (KeyCode::UP, "Up"),
        ];

        if let Some((_, name)) = NAMED.iter().find(|(code, _)| *code == self) {
            return (*name).to_string();
        }

        if (Self::F1.0..=Self::F12.0).contains(&self.0) {
            return format!("F{}", self.0 - Self::F1.0 + 1);
        }

        match char::from_u32(self.0) {
            Some(c) if c.is_ascii_graphic() => c.to_ascii_uppercase().to_string(),
            _ => format!("Key {:#X}", self.0),
        }
    }
}

bitflags! {
    /// Keyboard modifier mask (SDL `KMOD_*` layout).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct Modifiers: u16 {
        const LSHIFT = 0x0001;
        const RSHIFT = 0x0002;
        const LCTRL = 0x0040;
        const RCTRL = 0x0080;
        const LALT = 0x0100;
        const RALT = 0x0200;
        const LGUI = 0x0400;
        const RGUI = 0x0800;

        const SHIFT = Self::LSHIFT.bits() | Self::RSHIFT.bits();
        const CTRL = Self::LCTRL.bits() | Self::RCTRL.bits();
        const ALT = Self::LALT.bits() | Self::RALT.bits();
        const GUI = Self::LGUI.bits() | Self::RGUI.bits();
    }
}

/// Mapping from a logical input to one physical signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Binding {
    Key {
        code: KeyCode,
        #[serde(default)]
        modifiers: Modifiers,
    },
    Button {
        index: u8,
    },
    Axis {
        index: u8,
        positive: bool,
    },
}

impl Binding {
    pub const fn key(code: KeyCode) -> Self {
        Self::Key {
            code,
            modifiers: Modifiers::empty(),
        }
    }

    pub const fn key_with(code: KeyCode, modifiers: Modifiers) -> Self {
        Self::Key { code, modifiers }
    }

    /// Whether the binding is currently satisfied by `raw`.
    ///
    /// A key binding with modifiers fires when any of its required modifiers
    /// is active, so Ctrl+R accepts either control key.
    pub fn is_satisfied(&self, raw: &RawDeviceState) -> bool {
        match *self {
            Binding::Key { code, modifiers } => {
                raw.is_key_down(code)
                    && (modifiers.is_empty() || raw.modifiers().intersects(modifiers))
            }
            Binding::Button { index } => raw.is_button_down(index),
            Binding::Axis { index, positive } => {
                let polarity = raw.axis(index);
                if positive {
                    polarity.positive
                } else {
                    polarity.negative
                }
            }
        }
    }

    /// Label shown in binding editors.
    pub fn label(&self) -> String {
        match *self {
            Binding::Key { code, modifiers } => {
                let mut label = String::new();
                for (flag, prefix) in [
                    (Modifiers::CTRL, "Ctrl+"),
                    (Modifiers::SHIFT, "Shift+"),
                    (Modifiers::ALT, "Alt+"),
                    (Modifiers::GUI, "Gui+"),
                ] {
                    if modifiers.intersects(flag) {
                        label.push_str(prefix);
                    }
                }
                label.push_str(&code.name());
                label
            }
            Binding::Button { index } => format!("Button {index}"),
            Binding::Axis { index, positive } => {
                format!("Axis {index} {}", if positive { '+' } else { '-' })
            }
        }
    }
}

/// User-assignable bindings, one per logical input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BindingSet {
    pub a: Binding,
    pub b: Binding,
    pub select: Binding,
    pub start: Binding,
    pub right: Binding,
    pub left: Binding,
    pub up: Binding,
    pub down: Binding,
    pub reset: Binding,
    pub save_state: Binding,
    pub load_state: Binding,
    pub previous_slot: Binding,
    pub next_slot: Binding,
}

impl Default for BindingSet {
    fn default() -> Self {
        Self {
            a: Binding::key(KeyCode::from_char('z')),
            b: Binding::key(KeyCode::from_char('x')),
            select: Binding::key(KeyCode::BACKSPACE),
            start: Binding::key(KeyCode::RETURN),
            right: Binding::key(KeyCode::RIGHT),
            left: Binding::key(KeyCode::LEFT),
            up: Binding::key(KeyCode::UP),
            down: Binding::key(KeyCode::DOWN),
            reset: Binding::key(KeyCode::from_char('r')),
            save_state: Binding::key(KeyCode::F1),
            load_state: Binding::key(KeyCode::F2),
            previous_slot: Binding::key(KeyCode::F3),
            next_slot: Binding::key(KeyCode::F4),
        }
    }
}

impl BindingSet {
    pub fn get(&self, input: LogicalInput) -> &Binding {
        match input {
            LogicalInput::A => &self.a,
            LogicalInput::B => &self.b,
            LogicalInput::Select => &self.select,
            LogicalInput::Start => &self.start,
            LogicalInput::Right => &self.right,
            LogicalInput::Left => &self.left,
            LogicalInput::Up => &self.up,
            LogicalInput::Down => &self.down,
            LogicalInput::Reset => &self.reset,
            LogicalInput::SaveState => &self.save_state,
            LogicalInput::LoadState => &self.load_state,
            LogicalInput::PreviousSlot => &self.previous_slot,
            LogicalInput::NextSlot => &self.next_slot,
        }
    }

    pub fn get_mut(&mut self, input: LogicalInput) -> &mut Binding {
        match input {
            LogicalInput::A => &mut self.a,
            LogicalInput::B => &mut self.b,
            LogicalInput::Select => &mut self.select,
            LogicalInput::Start => &mut self.start,
            LogicalInput::Right => &mut self.right,
            LogicalInput::Left => &mut self.left,
            LogicalInput::Up => &mut self.up,
            LogicalInput::Down => &mut self.down,
            LogicalInput::Reset => &mut self.reset,
            LogicalInput::SaveState => &mut self.save_state,
            LogicalInput::LoadState => &mut self.load_state,
            LogicalInput::PreviousSlot => &mut self.previous_slot,
            LogicalInput::NextSlot => &mut self.next_slot,
        }
    }
}

/// Fixed bindings that stay active on top of the user's set.
pub fn builtin_binding(input: LogicalInput) -> Option<Binding> {
    let ctrl = |c| Some(Binding::key_with(KeyCode::from_char(c), Modifiers::CTRL));
    match input {
        LogicalInput::Reset => ctrl('r'),
        LogicalInput::SaveState => ctrl('s'),
        LogicalInput::LoadState => ctrl('l'),
        LogicalInput::PreviousSlot => ctrl('z'),
        LogicalInput::NextSlot => ctrl('x'),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::InputEvent;

    fn raw_with(events: &[InputEvent]) -> RawDeviceState {
        let mut raw = RawDeviceState::default();
        for event in events {
            raw.apply(event);
        }
        raw
    }

    #[test]
    fn plain_key_ignores_modifiers() {
        let raw = raw_with(&[InputEvent::Key {
            code: KeyCode::from_char('z'),
            down: true,
            modifiers: Modifiers::LSHIFT,
        }]);
        assert!(Binding::key(KeyCode::from_char('z')).is_satisfied(&raw));
    }

    #[test]
    fn modified_key_needs_any_matching_modifier() {
        let binding = Binding::key_with(KeyCode::from_char('r'), Modifiers::CTRL);

        let bare = raw_with(&[InputEvent::Key {
            code: KeyCode::from_char('r'),
            down: true,
            modifiers: Modifiers::empty(),
        }]);
        assert!(!binding.is_satisfied(&bare));

        let right_ctrl = raw_with(&[InputEvent::Key {
            code: KeyCode::from_char('r'),
            down: true,
            modifiers: Modifiers::RCTRL,
        }]);
        assert!(binding.is_satisfied(&right_ctrl));
    }

    #[test]
    fn axis_binding_follows_stored_polarity() {
        let raw = raw_with(&[InputEvent::Axis {
            index: 1,
            value: -20_000,
            rest: None,
        }]);
        assert!(
            Binding::Axis {
                index: 1,
                positive: false
            }
            .is_satisfied(&raw)
        );
        assert!(
            !Binding::Axis {
                index: 1,
                positive: true
            }
            .is_satisfied(&raw)
        );
    }

    #[test]
    fn labels_follow_variant() {
        assert_eq!(Binding::key(KeyCode::from_char('z')).label(), "Z");
        assert_eq!(
            Binding::key_with(KeyCode::from_char('s'), Modifiers::LCTRL).label(),
            "Ctrl+S"
        );
        assert_eq!(Binding::key(KeyCode::F3).label(), "F3");
        assert_eq!(Binding::key(KeyCode::RETURN).label(), "Return");
        assert_eq!(Binding::Button { index: 7 }.label(), "Button 7");
        assert_eq!(
            Binding::Axis {
                index: 2,
                positive: true
            }
            .label(),
            "Axis 2 +"
        );
    }

    #[test]
    fn builtins_cover_only_hotkeys() {
        for input in LogicalInput::JOYPAD {
            assert!(builtin_binding(input).is_none());
        }
        assert_eq!(
            builtin_binding(LogicalInput::SaveState),
            Some(Binding::key_with(KeyCode::from_char('s'), Modifiers::CTRL))
        );
    }

    #[test]
    fn binding_set_round_trips_through_toml() {
        let set = BindingSet::default();
        let text = toml::to_string(&set).unwrap();
        let parsed: BindingSet = toml::from_str(&text).unwrap();
        assert_eq!(parsed, set);
    }
}
