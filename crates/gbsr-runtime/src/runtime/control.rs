use std::path::PathBuf;
use std::time::Duration;

use crossbeam_channel::Sender;

use crate::cartridge::Cartridge;
use crate::input::{Binding, LogicalInput};
use crate::settings::Settings;

use super::types::{RuntimeError, RuntimeEventSender};

pub(crate) type Reply<T> = Sender<Result<T, RuntimeError>>;

pub(crate) enum ControlMessage {
    Stop,
    LoadRom(PathBuf, Reply<Cartridge>),
    LoadBios(PathBuf, Reply<()>),
    CloseRom(Reply<()>),
    OpenAudioDevice {
        name: String,
        volume: u8,
        reply: Reply<Option<String>>,
    },
    ListAudioDevices(Reply<Vec<String>>),
    SetVolume(u8, Reply<()>),
    SetBufferTarget(Duration, Reply<()>),
    SetBinding(LogicalInput, Binding, Reply<()>),
    Subscribe(Box<dyn RuntimeEventSender>, Reply<()>),
    /// Replies `false` when a reset was already running.
    Reset(Reply<bool>),
    SaveState(Reply<u32>),
    LoadState(Reply<u32>),
    StepSlot(i32, Reply<u32>),
    Settings(Reply<Settings>),
}
