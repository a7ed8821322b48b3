use std::{
    path::{Path, PathBuf},
    sync::{Arc, atomic::Ordering},
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use crossbeam_channel::{RecvTimeoutError, Sender, bounded, unbounded};

use crate::audio::AudioBackend;
use crate::cartridge::Cartridge;
use crate::emulator::{EmulationCore, VIDEO_BUFFER_LEN};
use crate::input::{Binding, InputEvent, Joypad, LogicalInput};
use crate::quicksave::preview_origin;
use crate::reset::ResetPhase;
use crate::settings::Settings;

use super::{
    control::{ControlMessage, Reply},
    frame::PublishedFrame,
    pubsub::NotificationHub,
    runner::{Runner, RunnerInit},
    state::RuntimeState,
    types::{
        CONTROL_REPLY_TIMEOUT, EVENT_QUEUE_CAPACITY, EventDispatcher, LOAD_REPLY_TIMEOUT,
        LoopEvent, RuntimeConfig, RuntimeError, RuntimeEventSender,
    },
};

struct RuntimeInner {
    ctrl_tx: Sender<ControlMessage>,
    events_tx: Sender<LoopEvent>,
    frame: Arc<PublishedFrame>,
    state: Arc<RuntimeState>,
}

/// Owns the driving-loop thread. Dropping it stops the loop and joins.
pub struct Runtime {
    inner: Arc<RuntimeInner>,
    join: Option<JoinHandle<()>>,
}

#[derive(Clone)]
pub struct RuntimeHandle {
    inner: Arc<RuntimeInner>,
}

/// Producer side of the bounded event hand-off queue.
#[derive(Clone)]
pub struct EventSender {
    tx: Sender<LoopEvent>,
    state: Arc<RuntimeState>,
}

impl EventSender {
    pub(crate) fn new(tx: Sender<LoopEvent>, state: Arc<RuntimeState>) -> Self {
        Self { tx, state }
    }

    /// Whether the driving loop is still running.
    pub fn is_connected(&self) -> bool {
        self.state.running.load(Ordering::Acquire)
    }

    /// Queues an input event, blocking while the queue is full. Returns
    /// `false` once the driving loop has exited.
    pub fn send_input(&self, event: InputEvent) -> bool {
        self.tx.send(LoopEvent::Input(event)).is_ok()
    }

    /// Asks the driving loop to exit after the events queued before this one.
    pub fn quit(&self) -> bool {
        self.tx.send(LoopEvent::Quit).is_ok()
    }
}

impl Runtime {
    pub fn start(
        core: Box<dyn EmulationCore>,
        backend: Box<dyn AudioBackend>,
        config: RuntimeConfig,
    ) -> Result<Self, RuntimeError> {
        Self::start_internal(core, backend, config, None, None)
    }

    pub fn start_with_sender(
        core: Box<dyn EmulationCore>,
        backend: Box<dyn AudioBackend>,
        config: RuntimeConfig,
        sender: Box<dyn RuntimeEventSender>,
    ) -> Result<Self, RuntimeError> {
        Self::start_internal(core, backend, config, None, Some(sender))
    }

    /// Starts the loop with a dispatcher that sees every dequeued input
    /// event and can stop the loop.
    pub fn start_with_dispatcher(
        core: Box<dyn EmulationCore>,
        backend: Box<dyn AudioBackend>,
        config: RuntimeConfig,
        dispatcher: Box<dyn EventDispatcher>,
    ) -> Result<Self, RuntimeError> {
        Self::start_internal(core, backend, config, Some(dispatcher), None)
    }

    fn start_internal(
        core: Box<dyn EmulationCore>,
        backend: Box<dyn AudioBackend>,
        config: RuntimeConfig,
        dispatcher: Option<Box<dyn EventDispatcher>>,
        event_sender: Option<Box<dyn RuntimeEventSender>>,
    ) -> Result<Self, RuntimeError> {
        let (ctrl_tx, ctrl_rx) = unbounded::<ControlMessage>();
        let (events_tx, events_rx) = bounded::<LoopEvent>(EVENT_QUEUE_CAPACITY);

        let state = Arc::new(RuntimeState::new());
        let frame = Arc::new(PublishedFrame::new());

        let mut hub = NotificationHub::new();
        if let Some(sender) = event_sender {
            hub.subscribe(sender);
        }

        let init = RunnerInit {
            core,
            backend,
            config,
            ctrl_rx,
            events_rx,
            dispatcher,
            hub,
            state: Arc::clone(&state),
            frame: Arc::clone(&frame),
        };

        let join = thread::Builder::new()
            .name("gbsr-runtime".into())
            .spawn(move || {
                let mut runner = Runner::new(init);
                runner.run();
            })
            .map_err(|e| RuntimeError::ThreadSpawnFailed(e.to_string()))?;

        tracing::info!("runtime started");

        Ok(Self {
            inner: Arc::new(RuntimeInner {
                ctrl_tx,
                events_tx,
                frame,
                state,
            }),
            join: Some(join),
        })
    }

    pub fn handle(&self) -> RuntimeHandle {
        RuntimeHandle {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Blocks until the driving loop exits on its own (quit event or
    /// dispatcher request).
    pub fn wait(mut self) {
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        let _ = self.inner.ctrl_tx.send(ControlMessage::Stop);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

impl RuntimeHandle {
    fn send_with_reply<T>(
        &self,
        op: &'static str,
        timeout: Duration,
        build: impl FnOnce(Reply<T>) -> ControlMessage,
    ) -> Result<T, RuntimeError> {
        let (reply_tx, reply_rx) = bounded::<Result<T, RuntimeError>>(1);
        self.inner
            .ctrl_tx
            .send(build(reply_tx))
            .map_err(|_| RuntimeError::ControlChannelDisconnected)?;
        match reply_rx.recv_timeout(timeout) {
            Ok(res) => res,
            Err(RecvTimeoutError::Timeout) => Err(RuntimeError::ControlTimeout { op }),
            Err(RecvTimeoutError::Disconnected) => Err(RuntimeError::ControlChannelDisconnected),
        }
    }

    pub fn load_rom(&self, path: impl Into<PathBuf>) -> Result<Cartridge, RuntimeError> {
        let path = path.into();
        self.send_with_reply("load_rom", LOAD_REPLY_TIMEOUT, |reply| {
            ControlMessage::LoadRom(path, reply)
        })
    }

    pub fn load_bios(&self, path: impl AsRef<Path>) -> Result<(), RuntimeError> {
        let path = path.as_ref().to_path_buf();
        self.send_with_reply("load_bios", LOAD_REPLY_TIMEOUT, |reply| {
            ControlMessage::LoadBios(path, reply)
        })
    }

    pub fn close_rom(&self) -> Result<(), RuntimeError> {
        self.send_with_reply("close_rom", CONTROL_REPLY_TIMEOUT, ControlMessage::CloseRom)
    }

    /// Opens `name` (or the default device for the sentinel, an empty or an
    /// unknown name). Returns the opened device's reported name.
    pub fn open_audio_device(&self, name: &str, volume: u8) -> Result<Option<String>, RuntimeError> {
        let name = name.to_string();
        self.send_with_reply("open_audio_device", LOAD_REPLY_TIMEOUT, |reply| {
            ControlMessage::OpenAudioDevice {
                name,
                volume,
                reply,
            }
        })
    }

    pub fn audio_devices(&self) -> Result<Vec<String>, RuntimeError> {
        self.send_with_reply(
            "audio_devices",
            CONTROL_REPLY_TIMEOUT,
            ControlMessage::ListAudioDevices,
        )
    }

    pub fn set_volume(&self, volume: u8) -> Result<(), RuntimeError> {
        self.send_with_reply("set_volume", CONTROL_REPLY_TIMEOUT, |reply| {
            ControlMessage::SetVolume(volume, reply)
        })
    }

    pub fn set_buffer_target(&self, target: Duration) -> Result<(), RuntimeError> {
        self.send_with_reply("set_buffer_target", CONTROL_REPLY_TIMEOUT, |reply| {
            ControlMessage::SetBufferTarget(target, reply)
        })
    }

    pub fn set_binding(&self, input: LogicalInput, binding: Binding) -> Result<(), RuntimeError> {
        self.send_with_reply("set_binding", CONTROL_REPLY_TIMEOUT, |reply| {
            ControlMessage::SetBinding(input, binding, reply)
        })
    }

    pub fn subscribe(&self, sender: Box<dyn RuntimeEventSender>) -> Result<(), RuntimeError> {
        self.send_with_reply("subscribe", CONTROL_REPLY_TIMEOUT, |reply| {
            ControlMessage::Subscribe(sender, reply)
        })
    }

    /// Starts the fade-and-reset sequence. `Ok(false)` means one is
    /// already running.
    pub fn reset(&self) -> Result<bool, RuntimeError> {
        self.send_with_reply("reset", CONTROL_REPLY_TIMEOUT, ControlMessage::Reset)
    }

    /// Saves to the selected slot and returns its number.
    pub fn save_state(&self) -> Result<u32, RuntimeError> {
        self.send_with_reply("save_state", LOAD_REPLY_TIMEOUT, ControlMessage::SaveState)
    }

    pub fn load_state(&self) -> Result<u32, RuntimeError> {
        self.send_with_reply("load_state", LOAD_REPLY_TIMEOUT, ControlMessage::LoadState)
    }

    pub fn step_slot(&self, delta: i32) -> Result<u32, RuntimeError> {
        self.send_with_reply("step_slot", CONTROL_REPLY_TIMEOUT, |reply| {
            ControlMessage::StepSlot(delta, reply)
        })
    }

    /// Snapshot of the live configuration, ready to persist.
    pub fn settings(&self) -> Result<Settings, RuntimeError> {
        self.send_with_reply("settings", CONTROL_REPLY_TIMEOUT, ControlMessage::Settings)
    }

    pub fn event_sender(&self) -> EventSender {
        EventSender::new(
            self.inner.events_tx.clone(),
            Arc::clone(&self.inner.state),
        )
    }

    pub fn set_paused(&self, paused: bool) {
        self.inner.state.paused.store(paused, Ordering::Release);
    }

    pub fn paused(&self) -> bool {
        self.inner.state.paused.load(Ordering::Acquire)
    }

    pub fn is_running(&self) -> bool {
        self.inner.state.running.load(Ordering::Acquire)
    }

    /// Whether both a ROM and a BIOS are loaded.
    pub fn is_ready(&self) -> bool {
        self.inner.state.ready.load(Ordering::Acquire)
    }

    pub fn reset_phase(&self) -> ResetPhase {
        self.inner.state.reset_phase()
    }

    pub fn slot(&self) -> u32 {
        self.inner.state.slot.load(Ordering::Acquire)
    }

    /// Preview snapshot of the selected slot, if its file exists.
    pub fn slot_preview(&self) -> Option<Vec<u8>> {
        self.inner.state.slot_preview.lock().clone()
    }

    /// Deadline of the slot overlay, set whenever the slot changes.
    pub fn slot_overlay_until(&self) -> Option<Instant> {
        *self.inner.state.slot_overlay_until.lock()
    }

    pub fn slot_overlay_visible(&self) -> bool {
        self.slot_overlay_until()
            .is_some_and(|until| Instant::now() < until)
    }

    /// Where the selected slot's preview goes in the overlay grid.
    pub fn slot_preview_origin(&self) -> (u32, u32) {
        preview_origin(self.slot())
    }

    /// Joypad mask handed to the core on the last emulated step.
    pub fn joypad(&self) -> Joypad {
        Joypad::from_bits_truncate(self.inner.state.joypad.load(Ordering::Acquire))
    }

    pub fn cartridge(&self) -> Option<Cartridge> {
        self.inner.state.cartridge.lock().clone()
    }

    pub fn opened_audio_device(&self) -> Option<String> {
        self.inner.state.audio_device.lock().clone()
    }

    /// Sequence number of the latest published frame.
    pub fn frame_seq(&self) -> u64 {
        self.inner.frame.seq()
    }

    /// Copies the latest frame (faded during a reset) into `out`.
    pub fn copy_frame(&self, out: &mut [u8]) -> u64 {
        self.inner.frame.copy_into(out)
    }

    /// Owned copy of the latest frame.
    pub fn frame(&self) -> (Vec<u8>, u64) {
        let mut pixels = vec![0; VIDEO_BUFFER_LEN];
        let seq = self.copy_frame(&mut pixels);
        (pixels, seq)
    }
}
