pub mod audio;
pub mod cartridge;
pub mod emulator;
pub mod input;
pub mod quicksave;
pub mod reset;
pub mod runtime;
pub mod settings;

pub use audio::{AudioBackend, AudioError, AudioPipeline, CpalBackend, DEFAULT_DEVICE_NAME};
pub use cartridge::Cartridge;
pub use emulator::{EmulationCore, RunOutcome};
pub use input::{Binding, BindingSet, InputEvent, Joypad, LogicalInput};
pub use quicksave::{QuicksaveEnvelope, SlotSelector};
pub use reset::ResetPhase;
pub use runtime::{
    EventPump, EventSender, Runtime, RuntimeConfig, RuntimeError, RuntimeHandle,
    RuntimeNotification,
};
pub use settings::Settings;
