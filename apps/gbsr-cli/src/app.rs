use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossbeam_channel::unbounded;
use gbsr_runtime::{
    AudioBackend, CpalBackend, DEFAULT_DEVICE_NAME, EventPump, QuicksaveEnvelope, Runtime,
    RuntimeConfig, Settings, SlotSelector,
    input::{EventSource, gamepad::GamepadSource},
    quicksave::{PREVIEW_HEIGHT, PREVIEW_WIDTH},
};

use crate::{
    args::{Args, Command},
    pacing::BlankCore,
};

pub fn run(args: Args) -> Result<()> {
    let settings_path = args.settings.clone().unwrap_or_else(Settings::default_path);

    match args.command {
        Command::Devices => list_devices(),
        Command::Gamepads => list_gamepads(),
        Command::Settings { write } => show_settings(&settings_path, write),
        Command::Slot { path } => inspect_slot(&path),
        Command::SlotPath { rom, slot } => {
            let mut slots = SlotSelector::new();
            slots.set_rom_path(&rom);
            slots.advance(slot as i32 - 1);
            println!("{}", slots.state_path().display());
            Ok(())
        }
        Command::Pace {
            rom,
            bios,
            skip_bios_check,
            seconds,
            buffer_ms,
            device,
        } => {
            let settings = Settings::load(&settings_path);
            let mut config = RuntimeConfig::from_settings(&settings);
            config.verify_bios = !skip_bios_check;
            if let Some(ms) = buffer_ms {
                config.buffer_target = Duration::from_millis(ms);
            }
            if let Some(device) = device {
                config.audio_device_name = device;
            }
            pace(
                config,
                settings.joystick().map(str::to_owned),
                &rom,
                &bios,
                Duration::from_secs(seconds),
            )
        }
    }
}

fn list_devices() -> Result<()> {
    println!("{DEFAULT_DEVICE_NAME}");
    for name in CpalBackend.device_names() {
        println!("{name}");
    }
    Ok(())
}

fn list_gamepads() -> Result<()> {
    let source = GamepadSource::new(None)?;
    let pads = source.gamepads();
    if pads.is_empty() {
        println!("no gamepads connected");
    }
    for pad in pads {
        println!("{:>3}  {}", pad.id, pad.name);
    }
    Ok(())
}

fn show_settings(path: &std::path::Path, write: bool) -> Result<()> {
    let settings = Settings::load(path);
    println!("# {}", path.display());
    print!("{}", toml::to_string_pretty(&settings)?);
    if write {
        settings
            .save(path)
            .with_context(|| format!("writing {}", path.display()))?;
        tracing::info!(path = %path.display(), "settings written");
    }
    Ok(())
}

fn inspect_slot(path: &std::path::Path) -> Result<()> {
    let envelope =
        QuicksaveEnvelope::read(path).with_context(|| format!("reading {}", path.display()))?;
    let snapshot = envelope.snapshot().len();
    println!("file bytes:     {}", envelope.bytes().len());
    println!("snapshot bytes: {snapshot}");
    if snapshot == PREVIEW_WIDTH * PREVIEW_HEIGHT * 4 {
        println!("preview:        {PREVIEW_WIDTH}x{PREVIEW_HEIGHT} RGBA");
    } else {
        println!("preview:        none (unexpected snapshot size)");
    }
    Ok(())
}

fn pace(
    config: RuntimeConfig,
    joystick: Option<String>,
    rom: &std::path::Path,
    bios: &std::path::Path,
    duration: Duration,
) -> Result<()> {
    let (tx, rx) = unbounded();
    let runtime = Runtime::start_with_sender(
        Box::new(BlankCore::new()),
        Box::new(CpalBackend),
        config,
        Box::new(tx),
    )
    .context("Failed to start runtime")?;
    let handle = runtime.handle();

    handle.load_rom(rom).context("Failed to load ROM")?;
    handle.load_bios(bios).context("Failed to load BIOS")?;

    let mut pump = EventPump::spawn(
        move || -> Vec<Box<dyn EventSource>> {
            match GamepadSource::new(joystick.as_deref()) {
                Ok(source) => vec![Box::new(source)],
                Err(e) => {
                    tracing::warn!("Gamepad input unavailable: {}", e);
                    Vec::new()
                }
            }
        },
        handle.event_sender(),
    )?;

    let start = Instant::now();
    let mut last_report = start;
    let mut last_seq = handle.frame_seq();

    while start.elapsed() < duration && handle.is_running() {
        if let Ok(notification) = rx.recv_timeout(Duration::from_millis(50)) {
            println!("{}", notification.message());
        }

        let now = Instant::now();
        if now.duration_since(last_report) >= Duration::from_secs(1) {
            let seq = handle.frame_seq();
            let fps = (seq - last_seq) as f64 / now.duration_since(last_report).as_secs_f64();
            println!("{fps:6.2} fps  joypad {:?}", handle.joypad());
            last_seq = seq;
            last_report = now;
        }
    }

    pump.stop();
    let settings = handle.settings()?;
    tracing::info!(
        device = %settings.audio_device_name,
        buffer_ms = settings.buffer_target_ms,
        "pacing run finished"
    );
    Ok(())
}
