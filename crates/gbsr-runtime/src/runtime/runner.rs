use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::{path::Path, thread, time::Duration};

use crossbeam_channel::{Receiver, TryRecvError};
use rand::{SeedableRng, rngs::StdRng};

use crate::audio::{AudioBackend, AudioPipeline, clamp_buffer_target};
use crate::cartridge::{Cartridge, validate_bios};
use crate::emulator::{
    AUDIO_BUFFER_LEN, EmulationCore, NATIVE_CHANNELS, VIDEO_BUFFER_LEN,
};
use crate::input::{InputAggregator, LogicalInput};
use crate::quicksave::SlotSelector;
use crate::reset::{ResetAction, ResetMachine, ResetPhase};
use crate::settings::Settings;

use super::{
    control::ControlMessage,
    frame::{FrameCarry, PublishedFrame},
    pubsub::NotificationHub,
    state::RuntimeState,
    types::{
        EventDispatcher, IDLE_WAIT, LoopEvent, RuntimeConfig, RuntimeError, RuntimeNotification,
        default_device_label,
    },
};

/// What one iteration of the driving loop did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StepOutcome {
    Exit,
    /// Dispatched one queued event instead of emulating.
    Dispatched,
    /// Emulated one frame's worth of samples.
    Advanced { samples: u32 },
    /// Enough audio is queued; the caller should sleep this long.
    Throttled(Duration),
    /// ROM or BIOS missing.
    NotReady,
    Paused,
}

pub(crate) struct RunnerInit {
    pub(crate) core: Box<dyn EmulationCore>,
    pub(crate) backend: Box<dyn AudioBackend>,
    pub(crate) config: RuntimeConfig,
    pub(crate) ctrl_rx: Receiver<ControlMessage>,
    pub(crate) events_rx: Receiver<LoopEvent>,
    pub(crate) dispatcher: Option<Box<dyn EventDispatcher>>,
    pub(crate) hub: NotificationHub,
    pub(crate) state: Arc<RuntimeState>,
    pub(crate) frame: Arc<PublishedFrame>,
}

pub(crate) struct Runner {
    core: Box<dyn EmulationCore>,
    ctrl_rx: Receiver<ControlMessage>,
    events_rx: Receiver<LoopEvent>,
    dispatcher: Option<Box<dyn EventDispatcher>>,
    input: InputAggregator,
    reset: ResetMachine,
    audio: AudioPipeline,
    slots: SlotSelector,
    carry: FrameCarry,
    buffer_target: Duration,
    joystick_name: String,
    video: Vec<u8>,
    samples: Vec<i16>,
    cartridge: Option<Cartridge>,
    rom_loaded: bool,
    bios_loaded: bool,
    verify_bios: bool,
    rng: StdRng,
    hub: NotificationHub,
    state: Arc<RuntimeState>,
    frame: Arc<PublishedFrame>,
}

impl Runner {
    pub(crate) fn new(init: RunnerInit) -> Self {
        let RunnerInit {
            core,
            backend,
            config,
            ctrl_rx,
            events_rx,
            dispatcher,
            hub,
            state,
            frame,
        } = init;

        let rng = match config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        let mut runner = Self {
            core,
            ctrl_rx,
            events_rx,
            dispatcher,
            input: InputAggregator::new(config.bindings),
            reset: ResetMachine::new(),
            audio: AudioPipeline::new(backend),
            slots: SlotSelector::new(),
            carry: FrameCarry::default(),
            buffer_target: clamp_buffer_target(config.buffer_target),
            joystick_name: config.joystick_name,
            video: vec![0; VIDEO_BUFFER_LEN],
            samples: vec![0; AUDIO_BUFFER_LEN],
            cartridge: None,
            rom_loaded: false,
            bios_loaded: false,
            verify_bios: config.verify_bios,
            rng,
            hub,
            state,
            frame,
        };

        if let Err(e) = runner.open_audio(&config.audio_device_name, config.volume) {
            tracing::warn!("Starting without audio: {}", e);
        }
        runner
    }

    pub(crate) fn run(&mut self) {
        loop {
            match self.step() {
                StepOutcome::Exit => break,
                StepOutcome::Dispatched => {}
                StepOutcome::Advanced { samples } => tracing::trace!(samples, "advanced"),
                StepOutcome::Throttled(wait) => thread::sleep(wait),
                StepOutcome::NotReady | StepOutcome::Paused => {
                    if self.wait_idle() {
                        break;
                    }
                }
            }
        }

        self.audio.close();
        self.state.running.store(false, Ordering::Release);
        tracing::info!("runtime stopped");
    }

    /// One driving-loop iteration: drain control requests, then either
    /// dispatch one queued event or run one emulation step.
    pub(crate) fn step(&mut self) -> StepOutcome {
        while let Ok(msg) = self.ctrl_rx.try_recv() {
            if self.handle_control(msg) {
                return StepOutcome::Exit;
            }
        }

        match self.events_rx.try_recv() {
            Ok(event) => {
                return if self.handle_event(event) {
                    StepOutcome::Dispatched
                } else {
                    StepOutcome::Exit
                };
            }
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => {}
        }

        self.input.update();

        if !self.is_ready() {
            return StepOutcome::NotReady;
        }

        // Hotkeys still apply while paused; only emulation stops.
        let outcome = if self.state.paused.load(Ordering::Acquire) {
            StepOutcome::Paused
        } else if self.audio.queued_duration() >= self.buffer_target {
            StepOutcome::Throttled(self.buffer_target / 4)
        } else {
            StepOutcome::Advanced {
                samples: self.advance_frame(),
            }
        };

        if self.reset.is_idle() {
            self.process_hotkeys();
        }

        outcome
    }

    /// Blocks until a control message or event arrives, or `IDLE_WAIT`
    /// passes. Returns `true` when the loop should exit.
    fn wait_idle(&mut self) -> bool {
        let ctrl_rx = self.ctrl_rx.clone();
        let events_rx = self.events_rx.clone();
        crossbeam_channel::select! {
            recv(ctrl_rx) -> msg => match msg {
                Ok(msg) => self.handle_control(msg),
                Err(_) => true,
            },
            recv(events_rx) -> event => match event {
                Ok(event) => !self.handle_event(event),
                Err(_) => false,
            },
            default(IDLE_WAIT) => false,
        }
    }

    /// Returns `false` when the loop should stop.
    fn handle_event(&mut self, event: LoopEvent) -> bool {
        match event {
            LoopEvent::Quit => false,
            LoopEvent::Input(input) => {
                self.input.process_event(&input);
                self.dispatcher
                    .as_mut()
                    .is_none_or(|dispatcher| dispatcher.dispatch(&input))
            }
        }
    }

    fn is_ready(&self) -> bool {
        self.rom_loaded && self.bios_loaded
    }

    fn update_ready(&self) {
        self.state.ready.store(self.is_ready(), Ordering::Release);
    }

    fn advance_frame(&mut self) -> u32 {
        let joypad = self.input.joypad();
        self.core.set_joypad(joypad);
        self.state.joypad.store(joypad.bits(), Ordering::Release);

        let outcome = self
            .core
            .run_for(self.carry.budget(), &mut self.video, &mut self.samples);
        self.carry.record(outcome);

        let produced =
            (outcome.samples_elapsed as usize * NATIVE_CHANNELS as usize).min(self.samples.len());
        if let Err(e) = self.audio.queue(&self.samples[..produced]) {
            tracing::warn!("Failed to queue audio: {}", e);
        }

        if let Some(ResetAction::ResetCore { stall_samples }) =
            self.reset.advance(outcome.samples_elapsed)
        {
            tracing::debug!(stall_samples, "resetting core");
            self.core.reset(stall_samples);
        }

        let phase = self.reset.phase();
        self.state.set_reset_phase(phase);
        if phase == ResetPhase::JustCompleted {
            let checksum = self
                .cartridge
                .as_ref()
                .map(Cartridge::checksum_hex)
                .unwrap_or_default();
            self.hub.broadcast(RuntimeNotification::ResetCompleted {
                revision: self.core.revision(),
                checksum,
            });
        }

        let alpha = match phase {
            ResetPhase::FadingToBlack | ResetPhase::Stalling => self.reset.overlay_alpha(),
            ResetPhase::Idle | ResetPhase::JustCompleted => 0,
        };
        self.frame.publish(&self.video, alpha);

        outcome.samples_elapsed
    }

    fn process_hotkeys(&mut self) {
        let state = *self.input.state();

        if state.pressed(LogicalInput::PreviousSlot) {
            self.step_slot(-1);
        }
        if state.pressed(LogicalInput::NextSlot) {
            self.step_slot(1);
        }
        // Failures are reported through notifications.
        if state.pressed(LogicalInput::SaveState) {
            let _ = self.save_state();
        }
        if state.pressed(LogicalInput::LoadState) {
            let _ = self.load_state();
        }
        if state.pressed(LogicalInput::Reset) {
            self.begin_reset();
        }
    }

    fn begin_reset(&mut self) -> bool {
        let started = self.reset.begin(&mut self.rng);
        if started {
            self.state.set_reset_phase(self.reset.phase());
        }
        started
    }

    fn step_slot(&mut self, delta: i32) -> u32 {
        self.slots.advance(delta);
        self.publish_slot();
        let slot = self.slots.slot();
        self.hub
            .broadcast(RuntimeNotification::SlotSelected { slot });
        slot
    }

    fn publish_slot(&self) {
        self.state.slot.store(self.slots.slot(), Ordering::Release);
        *self.state.slot_preview.lock() = self
            .slots
            .preview()
            .map(|envelope| envelope.snapshot().to_vec());
        *self.state.slot_overlay_until.lock() = self.slots.shown_until();
    }

    fn save_state(&mut self) -> Result<u32, RuntimeError> {
        if !self.is_ready() {
            return Err(RuntimeError::CoreNotReady);
        }

        let slot = self.slots.slot();
        let path = self.slots.state_path();
        let result = self
            .core
            .save_state(&self.video)
            .map_err(|e| e.to_string())
            .and_then(|bytes| std::fs::write(&path, bytes).map_err(|e| e.to_string()));

        match result {
            Ok(()) => {
                tracing::info!(slot, path = %path.display(), "state saved");
                self.slots.refresh();
                self.publish_slot();
                self.hub.broadcast(RuntimeNotification::StateSaved { slot });
                Ok(slot)
            }
            Err(error) => self.state_io_failed(slot, &path, error),
        }
    }

    fn load_state(&mut self) -> Result<u32, RuntimeError> {
        if !self.is_ready() {
            return Err(RuntimeError::CoreNotReady);
        }

        let slot = self.slots.slot();
        let path = self.slots.state_path();
        let result = std::fs::read(&path)
            .map_err(|e| e.to_string())
            .and_then(|bytes| self.core.load_state(&bytes).map_err(|e| e.to_string()));

        match result {
            Ok(()) => {
                tracing::info!(slot, path = %path.display(), "state loaded");
                self.hub.broadcast(RuntimeNotification::StateLoaded { slot });
                Ok(slot)
            }
            Err(error) => self.state_io_failed(slot, &path, error),
        }
    }

    fn state_io_failed(&mut self, slot: u32, path: &Path, error: String) -> Result<u32, RuntimeError> {
        tracing::warn!(slot, path = %path.display(), "state I/O failed: {}", error);
        self.hub.broadcast(RuntimeNotification::StateIoFailed {
            slot,
            error: error.clone(),
        });
        Err(RuntimeError::StateIoFailed {
            path: path.to_path_buf(),
            error,
        })
    }

    fn load_rom(&mut self, path: &Path) -> Result<Cartridge, RuntimeError> {
        let fail = |error: String| RuntimeError::RomLoadFailed {
            path: path.to_path_buf(),
            error,
        };

        let bytes = std::fs::read(path).map_err(|e| fail(e.to_string()))?;
        if let Err(e) = self.core.load_rom(path) {
            self.rom_loaded = false;
            self.cartridge = None;
            *self.state.cartridge.lock() = None;
            self.update_ready();
            return Err(fail(e.to_string()));
        }

        let cartridge = Cartridge::from_rom_bytes(&bytes);
        tracing::info!(
            title = %cartridge.title_lossy(),
            crc = %cartridge.checksum_hex(),
            "ROM loaded"
        );

        self.rom_loaded = true;
        self.cartridge = Some(cartridge.clone());
        *self.state.cartridge.lock() = Some(cartridge.clone());
        self.carry = FrameCarry::default();
        self.reset = ResetMachine::new();
        self.state.set_reset_phase(ResetPhase::Idle);
        self.audio.clear();
        self.slots.set_rom_path(path);
        self.publish_slot();
        self.update_ready();

        self.hub.broadcast(RuntimeNotification::RomLoaded {
            title: cartridge.title_lossy(),
            checksum: cartridge.checksum_hex(),
        });
        Ok(cartridge)
    }

    fn load_bios(&mut self, path: &Path) -> Result<(), RuntimeError> {
        let result = std::fs::read(path)
            .map_err(|e| e.to_string())
            .and_then(|image| {
                if self.verify_bios {
                    validate_bios(&image).map_err(|e| e.to_string())?;
                }
                self.core.load_bios(&image).map_err(|e| e.to_string())
            });

        self.bios_loaded = result.is_ok();
        self.update_ready();

        result.map_err(|error| RuntimeError::BiosLoadFailed {
            path: path.to_path_buf(),
            error,
        })
    }

    fn close_rom(&mut self) {
        self.rom_loaded = false;
        self.cartridge = None;
        *self.state.cartridge.lock() = None;
        self.reset = ResetMachine::new();
        self.state.set_reset_phase(ResetPhase::Idle);
        self.carry = FrameCarry::default();
        self.audio.clear();
        self.update_ready();
    }

    fn open_audio(&mut self, name: &str, volume: u8) -> Result<Option<String>, RuntimeError> {
        let result = self.audio.open(name, volume);
        let opened = self.audio.opened_device_name().map(str::to_owned);
        *self.state.audio_device.lock() = opened.clone();

        match result {
            Ok(()) => Ok(opened),
            Err(e) => {
                self.hub.broadcast(RuntimeNotification::AudioInitFailed {
                    error: e.to_string(),
                });
                Err(e.into())
            }
        }
    }

    fn settings(&self) -> Settings {
        Settings {
            audio_device_name: default_device_label(self.audio.opened_device_name()),
            volume: self.audio.volume(),
            bindings: self.input.bindings().clone(),
            joystick_name: self.joystick_name.clone(),
            buffer_target_ms: self.buffer_target.as_millis() as u64,
        }
    }

    /// Returns `true` when the loop should exit.
    fn handle_control(&mut self, msg: ControlMessage) -> bool {
        match msg {
            ControlMessage::Stop => return true,
            ControlMessage::LoadRom(path, reply) => {
                let _ = reply.send(self.load_rom(&path));
            }
            ControlMessage::LoadBios(path, reply) => {
                let _ = reply.send(self.load_bios(&path));
            }
            ControlMessage::CloseRom(reply) => {
                self.close_rom();
                let _ = reply.send(Ok(()));
            }
            ControlMessage::OpenAudioDevice {
                name,
                volume,
                reply,
            } => {
                let _ = reply.send(self.open_audio(&name, volume));
            }
            ControlMessage::ListAudioDevices(reply) => {
                let _ = reply.send(Ok(self.audio.device_names()));
            }
            ControlMessage::SetVolume(volume, reply) => {
                self.audio.set_volume(volume);
                let _ = reply.send(Ok(()));
            }
            ControlMessage::SetBufferTarget(target, reply) => {
                self.buffer_target = clamp_buffer_target(target);
                if self.buffer_target != target {
                    tracing::warn!(?target, clamped = ?self.buffer_target, "buffer target out of range");
                }
                let _ = reply.send(Ok(()));
            }
            ControlMessage::SetBinding(input, binding, reply) => {
                self.input.set_binding(input, binding);
                let _ = reply.send(Ok(()));
            }
            ControlMessage::Subscribe(sender, reply) => {
                self.hub.subscribe(sender);
                let _ = reply.send(Ok(()));
            }
            ControlMessage::Reset(reply) => {
                let result = if self.is_ready() {
                    Ok(self.begin_reset())
                } else {
                    Err(RuntimeError::CoreNotReady)
                };
                let _ = reply.send(result);
            }
            ControlMessage::SaveState(reply) => {
                let _ = reply.send(self.save_state());
            }
            ControlMessage::LoadState(reply) => {
                let _ = reply.send(self.load_state());
            }
            ControlMessage::StepSlot(delta, reply) => {
                let _ = reply.send(Ok(self.step_slot(delta)));
            }
            ControlMessage::Settings(reply) => {
                let _ = reply.send(Ok(self.settings()));
            }
        }
        false
    }
}
