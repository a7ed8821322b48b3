//! Input aggregation: raw device events in, per-frame logical input state out.

pub mod binding;
#[cfg(feature = "gamepad")]
pub mod gamepad;

use std::collections::{HashMap, HashSet};

use bitflags::bitflags;

pub use binding::{Binding, BindingSet, KeyCode, Modifiers, builtin_binding};

/// Distance from the resting position an analog stick must travel to count
/// as pressed.
pub const STICK_DEAD_ZONE: i16 = 8000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalInput {
    A,
    B,
    Select,
    Start,
    Right,
    Left,
    Up,
    Down,
    Reset,
    SaveState,
    LoadState,
    PreviousSlot,
    NextSlot,
}

impl LogicalInput {
    pub const COUNT: usize = 13;

    pub const ALL: [LogicalInput; Self::COUNT] = [
        LogicalInput::A,
        LogicalInput::B,
        LogicalInput::Select,
        LogicalInput::Start,
        LogicalInput::Right,
        LogicalInput::Left,
        LogicalInput::Up,
        LogicalInput::Down,
        LogicalInput::Reset,
        LogicalInput::SaveState,
        LogicalInput::LoadState,
        LogicalInput::PreviousSlot,
        LogicalInput::NextSlot,
    ];

    /// The eight inputs forwarded to the emulated joypad, in bit order.
    pub const JOYPAD: [LogicalInput; 8] = [
        LogicalInput::A,
        LogicalInput::B,
        LogicalInput::Select,
        LogicalInput::Start,
        LogicalInput::Right,
        LogicalInput::Left,
        LogicalInput::Up,
        LogicalInput::Down,
    ];

    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn name(self) -> &'static str {
        match self {
            LogicalInput::A => "A",
            LogicalInput::B => "B",
            LogicalInput::Select => "Select",
            LogicalInput::Start => "Start",
            LogicalInput::Right => "Right",
            LogicalInput::Left => "Left",
            LogicalInput::Up => "Up",
            LogicalInput::Down => "Down",
            LogicalInput::Reset => "Reset",
            LogicalInput::SaveState => "Save State",
            LogicalInput::LoadState => "Load State",
            LogicalInput::PreviousSlot => "Previous Slot",
            LogicalInput::NextSlot => "Next Slot",
        }
    }
}

bitflags! {
    /// Joypad lines handed to the emulation core.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Joypad: u8 {
        const A = 1 << 0;
        const B = 1 << 1;
        const SELECT = 1 << 2;
        const START = 1 << 3;
        const RIGHT = 1 << 4;
        const LEFT = 1 << 5;
        const UP = 1 << 6;
        const DOWN = 1 << 7;
    }
}

impl Joypad {
    pub fn from_state(state: &InputState) -> Self {
        LogicalInput::JOYPAD
            .iter()
            .enumerate()
            .filter(|(_, input)| state.held(**input))
            .fold(Joypad::empty(), |pad, (bit, _)| {
                pad | Joypad::from_bits_retain(1 << bit)
            })
    }
}

/// A raw device event as delivered by the platform layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    Key {
        code: KeyCode,
        down: bool,
        modifiers: Modifiers,
    },
    Button {
        index: u8,
        down: bool,
    },
    /// Analog axis motion. `rest` is the axis' initial reading when known;
    /// an axis resting at `i16::MIN` is treated as a trigger.
    Axis {
        index: u8,
        value: i16,
        rest: Option<i16>,
    },
}

/// A platform device layer that can be drained for raw events.
pub trait EventSource {
    /// Appends pending events to `out`. Returns `false` once the platform
    /// asked the application to quit.
    fn poll(&mut self, out: &mut Vec<InputEvent>) -> bool;
}

/// Two-sided pressed state of one analog axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AxisPolarity {
    pub positive: bool,
    pub negative: bool,
}

impl AxisPolarity {
    pub fn from_reading(value: i16, rest: Option<i16>) -> Self {
        if rest == Some(i16::MIN) {
            // Triggers have no negative side.
            return Self {
                positive: value > 0,
                negative: false,
            };
        }

        Self {
            positive: value > STICK_DEAD_ZONE,
            negative: value < -STICK_DEAD_ZONE,
        }
    }
}

/// Current physical state of every device the aggregator has seen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawDeviceState {
    keys: HashSet<KeyCode>,
    modifiers: Modifiers,
    buttons: HashSet<u8>,
    axes: HashMap<u8, AxisPolarity>,
}

impl RawDeviceState {
    pub fn apply(&mut self, event: &InputEvent) {
        match *event {
            InputEvent::Key {
                code,
                down,
                modifiers,
            } => {
                self.modifiers = modifiers;
                if down {
                    self.keys.insert(code);
                } else {
                    self.keys.remove(&code);
                }
            }
            InputEvent::Button { index, down } => {
                if down {
                    self.buttons.insert(index);
                } else {
                    self.buttons.remove(&index);
                }
            }
            InputEvent::Axis { index, value, rest } => {
                self.axes
                    .insert(index, AxisPolarity::from_reading(value, rest));
            }
        }
    }

    pub fn is_key_down(&self, code: KeyCode) -> bool {
        self.keys.contains(&code)
    }

    pub fn modifiers(&self) -> Modifiers {
        self.modifiers
    }

    pub fn is_button_down(&self, index: u8) -> bool {
        self.buttons.contains(&index)
    }

    pub fn axis(&self, index: u8) -> AxisPolarity {
        self.axes.get(&index).copied().unwrap_or_default()
    }
}

/// Logical input state for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InputState {
    held: [bool; LogicalInput::COUNT],
    pressed: [bool; LogicalInput::COUNT],
}

impl InputState {
    /// Whether the input is held this frame.
    pub fn held(&self, input: LogicalInput) -> bool {
        self.held[input.index()]
    }

    /// Whether the input went from released to held at this frame's update.
    pub fn pressed(&self, input: LogicalInput) -> bool {
        self.pressed[input.index()]
    }
}

/// Folds raw events into logical state, one snapshot per `update`.
#[derive(Debug, Clone, Default)]
pub struct InputAggregator {
    bindings: BindingSet,
    raw: RawDeviceState,
    state: InputState,
}

impl InputAggregator {
    pub fn new(bindings: BindingSet) -> Self {
        Self {
            bindings,
            raw: RawDeviceState::default(),
            state: InputState::default(),
        }
    }

    pub fn process_event(&mut self, event: &InputEvent) {
        self.raw.apply(event);
    }

    /// Recomputes held state from the current raw state and derives edges
    /// against the previous snapshot.
    pub fn update(&mut self) -> &InputState {
        let previous = self.state.held;
        let mut next = InputState::default();

        for input in LogicalInput::ALL {
            let i = input.index();
            let user = self.bindings.get(input).is_satisfied(&self.raw);
            let builtin = builtin_binding(input).is_some_and(|b| b.is_satisfied(&self.raw));
            next.held[i] = user || builtin;
            next.pressed[i] = next.held[i] && !previous[i];
        }

        self.state = next;
        &self.state
    }

    pub fn state(&self) -> &InputState {
        &self.state
    }

    pub fn raw(&self) -> &RawDeviceState {
        &self.raw
    }

    pub fn joypad(&self) -> Joypad {
        Joypad::from_state(&self.state)
    }

    pub fn bindings(&self) -> &BindingSet {
        &self.bindings
    }

    pub fn set_binding(&mut self, input: LogicalInput, binding: Binding) {
        *self.bindings.get_mut(input) = binding;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn key(c: char, down: bool) -> InputEvent {
        InputEvent::Key {
            code: KeyCode::from_char(c),
            down,
            modifiers: Modifiers::empty(),
        }
    }

    #[test]
    fn press_is_reported_once() {
        let mut agg = InputAggregator::default();
        agg.process_event(&key('z', true));

        let first = *agg.update();
        assert!(first.held(LogicalInput::A));
        assert!(first.pressed(LogicalInput::A));

        let second = *agg.update();
        assert!(second.held(LogicalInput::A));
        assert!(!second.pressed(LogicalInput::A));

        agg.process_event(&key('z', false));
        let third = *agg.update();
        assert!(!third.held(LogicalInput::A));
        assert!(!third.pressed(LogicalInput::A));
    }

    #[test]
    fn builtin_hotkey_works_alongside_user_binding() {
        let mut agg = InputAggregator::default();
        agg.process_event(&InputEvent::Key {
            code: KeyCode::from_char('s'),
            down: true,
            modifiers: Modifiers::LCTRL,
        });
        assert!(agg.update().pressed(LogicalInput::SaveState));

        let mut agg = InputAggregator::default();
        agg.process_event(&InputEvent::Key {
            code: KeyCode::F1,
            down: true,
            modifiers: Modifiers::empty(),
        });
        assert!(agg.update().pressed(LogicalInput::SaveState));
    }

    #[test]
    fn trigger_axis_fires_on_any_positive_value() {
        let trigger = AxisPolarity::from_reading(1, Some(i16::MIN));
        assert!(trigger.positive);
        assert!(!trigger.negative);

        let resting = AxisPolarity::from_reading(i16::MIN, Some(i16::MIN));
        assert_eq!(resting, AxisPolarity::default());
    }

    #[test]
    fn stick_axis_respects_dead_zone() {
        assert_eq!(
            AxisPolarity::from_reading(STICK_DEAD_ZONE, Some(0)),
            AxisPolarity::default()
        );
        assert!(AxisPolarity::from_reading(STICK_DEAD_ZONE + 1, None).positive);
        assert!(AxisPolarity::from_reading(-STICK_DEAD_ZONE - 1, None).negative);
    }

    #[test]
    fn joypad_bits_follow_logical_order() {
        let mut agg = InputAggregator::default();
        agg.process_event(&key('x', true));
        agg.process_event(&InputEvent::Key {
            code: KeyCode::DOWN,
            down: true,
            modifiers: Modifiers::empty(),
        });
        agg.update();
        assert_eq!(agg.joypad(), Joypad::B | Joypad::DOWN);
    }

    #[test]
    fn rebinding_takes_effect_on_next_update() {
        let mut agg = InputAggregator::default();
        agg.set_binding(LogicalInput::Start, Binding::Button { index: 9 });
        agg.process_event(&InputEvent::Button {
            index: 9,
            down: true,
        });
        assert!(agg.update().held(LogicalInput::Start));
    }

    fn event_strategy() -> impl Strategy<Value = InputEvent> {
        prop_oneof![
            (prop::sample::select(vec!['z', 'x', 'r', 's']), any::<bool>(), any::<bool>())
                .prop_map(|(c, down, ctrl)| InputEvent::Key {
                    code: KeyCode::from_char(c),
                    down,
                    modifiers: if ctrl { Modifiers::LCTRL } else { Modifiers::empty() },
                }),
            (0u8..4, any::<bool>()).prop_map(|(index, down)| InputEvent::Button { index, down }),
            (0u8..4, any::<i16>(), prop::option::of(Just(i16::MIN)))
                .prop_map(|(index, value, rest)| InputEvent::Axis { index, value, rest }),
        ]
    }

    proptest! {
        #[test]
        fn pressed_implies_held_and_not_previously_held(
            batches in prop::collection::vec(prop::collection::vec(event_strategy(), 0..6), 1..12),
        ) {
            let mut agg = InputAggregator::default();
            let mut previous = InputState::default();
            for batch in batches {
                for event in &batch {
                    agg.process_event(event);
                }
                let state = *agg.update();
                for input in LogicalInput::ALL {
                    prop_assert_eq!(
                        state.pressed(input),
                        state.held(input) && !previous.held(input)
                    );
                }
                previous = state;
            }
        }

        #[test]
        fn update_without_events_is_stable(
            events in prop::collection::vec(event_strategy(), 0..16),
        ) {
            let mut agg = InputAggregator::default();
            for event in &events {
                agg.process_event(event);
            }
            let first = *agg.update();
            let second = *agg.update();
            for input in LogicalInput::ALL {
                prop_assert_eq!(first.held(input), second.held(input));
                prop_assert!(!second.pressed(input));
            }
        }
    }
}
