//! Pedalboard - live guitar effects from the terminal
//!
//! Opens the default output device (and input device for `source mic`),
//! builds the board from the configuration file and reads control commands
//! from stdin.

mod config;
mod loader;

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context};
use clap::Parser;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use ringbuf::traits::Producer;
use tracing_subscriber::EnvFilter;

use pedal_audio::{
    AudioGraphContext, EngineState, Pedalboard, Preset, RingSource, SignalSource, Silence,
    ToneSource,
};
use pedal_input::{parse_command, Command, SourceKind, HELP};

use config::{BoardConfig, InputKind};

/// How often the control loop wakes to collect engine events
const EVENT_POLL: Duration = Duration::from_millis(50);

#[derive(Parser, Debug)]
#[command(name = "pedalboard", version, about = "Live guitar pedalboard")]
struct Cli {
    /// Board configuration (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Preset to load instead of the configured chain
    #[arg(short, long)]
    preset: Option<PathBuf>,

    /// Override the configured input: mic, tone or silence
    #[arg(short, long)]
    source: Option<String>,

    /// Loop an audio file as the input
    #[arg(short, long, conflicts_with = "source")]
    file: Option<PathBuf>,

    /// Write the effective configuration and exit
    #[arg(long)]
    write_config: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(BoardConfig::config_path);
    let mut config = match &cli.config {
        Some(path) => BoardConfig::load_from(path)?,
        None => BoardConfig::load()?,
    };

    if cli.write_config {
        config.save_to(&config_path)?;
        println!("Wrote {}", config_path.display());
        return Ok(());
    }

    if let Some(name) = &cli.source {
        config.input.source = match name.to_ascii_lowercase().as_str() {
            "mic" => InputKind::Mic,
            "tone" => InputKind::Tone,
            "silence" => InputKind::Silence,
            other => return Err(anyhow!("unknown source '{}'", other)),
        };
    }
    if let Some(file) = &cli.file {
        config.input.source = InputKind::File;
        config.input.file = Some(file.clone());
    }

    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| anyhow!("no audio output device found"))?;
    let output_config = device
        .default_output_config()
        .context("querying output config")?;
    let sample_rate = output_config.sample_rate().0;
    let channels = output_config.channels() as usize;
    tracing::info!(
        "Output: {} at {} Hz, {} channels",
        device.name().unwrap_or_else(|_| "unknown".into()),
        sample_rate,
        channels
    );

    let ctx = AudioGraphContext::new(sample_rate, config.engine.block_size);
    let (mut board, state) = Pedalboard::create(
        ctx,
        config.voicings.clone(),
        config.smoothing,
        config.engine.queue_capacity,
    );

    let _output = start_output(&device, &output_config.into(), channels, state)?;
    let mut input = InputStream::default();

    let first = match config.input.source {
        InputKind::Mic => SourceKind::Mic,
        InputKind::Tone => SourceKind::Tone,
        InputKind::Silence => SourceKind::Silence,
        InputKind::File => match &config.input.file {
            Some(path) => SourceKind::File(path.clone()),
            None => {
                tracing::warn!("source = \"file\" without a file, using silence");
                SourceKind::Silence
            }
        },
    };
    if let Err(e) = switch_source(&mut board, &mut input, &config, sample_rate, &first) {
        tracing::error!("Could not open {}: {:#}", first, e);
    }

    match &cli.preset {
        Some(path) => match Preset::load_from(path) {
            Ok(preset) => board.load_preset(&preset)?,
            Err(e) => tracing::error!("Could not load preset {:?}: {}", path, e),
        },
        None => {
            for entry in &config.chain {
                if let Err(e) = board.add_entry(entry) {
                    tracing::error!("Skipping {}: {}", entry.effect_type, e);
                }
            }
        }
    }

    println!("pedalboard ready ({} Hz). Type 'help' for commands.", sample_rate);
    let lines = spawn_stdin_reader();
    run_control_loop(&mut board, &mut input, &config, sample_rate, &lines)?;

    if let Err(e) = board.shutdown() {
        tracing::warn!("Engine did not stop cleanly: {}", e);
    }
    thread::sleep(EVENT_POLL);
    board.drain_events();
    Ok(())
}

/// Build and start the output stream; the callback owns the engine state
fn start_output(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    channels: usize,
    mut state: EngineState,
) -> anyhow::Result<cpal::Stream> {
    // Mono render buffer, sized to the engine block
    let block = state.context().block_size();
    let mut mono = vec![0.0f32; block];

    let stream = device.build_output_stream(
        config,
        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
            for frames in data.chunks_mut(block * channels) {
                let n = frames.len() / channels;
                let buf = &mut mono[..n];
                state.process(buf);
                for (frame, sample) in frames.chunks_mut(channels).zip(buf.iter()) {
                    frame.fill(*sample);
                }
            }
        },
        |err| tracing::error!("Audio stream error: {}", err),
        None,
    )?;
    stream.play()?;
    Ok(stream)
}

/// Microphone stream, opened on demand
#[derive(Default)]
struct InputStream {
    stream: Option<cpal::Stream>,
}

impl InputStream {
    /// Open the default input and return the source that reads it
    fn open(&mut self, engine_rate: u32, buffer_secs: f32) -> anyhow::Result<RingSource> {
        self.close();
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| anyhow!("no audio input device found"))?;
        let config = device.default_input_config().context("querying input config")?;
        let channels = config.channels() as usize;
        if config.sample_rate().0 != engine_rate {
            tracing::warn!(
                "Input runs at {} Hz, output at {} Hz; pitch will be off",
                config.sample_rate().0,
                engine_rate
            );
        }

        let capacity = (engine_rate as f32 * buffer_secs.max(0.01)) as usize;
        let (mut producer, source) = RingSource::channel(capacity);
        let stream = device.build_input_stream(
            &config.into(),
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                // First channel only; overflow drops the newest samples
                producer.push_iter(data.iter().step_by(channels.max(1)).copied());
            },
            |err| tracing::error!("Input stream error: {}", err),
            None,
        )?;
        stream.play()?;
        tracing::info!("Input: {}", device.name().unwrap_or_else(|_| "unknown".into()));
        self.stream = Some(stream);
        Ok(source)
    }

    fn close(&mut self) {
        if self.stream.take().is_some() {
            tracing::debug!("Input stream closed");
        }
    }
}

fn switch_source(
    board: &mut Pedalboard,
    input: &mut InputStream,
    config: &BoardConfig,
    sample_rate: u32,
    kind: &SourceKind,
) -> anyhow::Result<()> {
    let source: Box<dyn SignalSource> = match kind {
        SourceKind::Mic => Box::new(input.open(sample_rate, config.engine.input_buffer_secs)?),
        SourceKind::Tone => Box::new(ToneSource::new(
            config.input.tone_frequency,
            config.input.tone_level,
        )),
        SourceKind::Silence => Box::new(Silence),
        SourceKind::File(path) => Box::new(loader::load_clip(path, sample_rate)?.into_source()),
    };
    board.set_source(source)?;
    if !matches!(kind, SourceKind::Mic) {
        input.close();
    }
    Ok(())
}

fn spawn_stdin_reader() -> Receiver<String> {
    let (tx, rx) = crossbeam_channel::bounded(16);
    thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!("stdin: {}", e);
                    break;
                }
            }
        }
    });
    rx
}

fn run_control_loop(
    board: &mut Pedalboard,
    input: &mut InputStream,
    config: &BoardConfig,
    sample_rate: u32,
    lines: &Receiver<String>,
) -> anyhow::Result<()> {
    prompt()?;
    loop {
        let line = match lines.recv_timeout(EVENT_POLL) {
            Ok(line) => line,
            Err(RecvTimeoutError::Timeout) => {
                board.drain_events();
                continue;
            }
            // stdin closed
            Err(RecvTimeoutError::Disconnected) => return Ok(()),
        };
        board.drain_events();

        let command = match parse_command(&line) {
            Ok(command) => command,
            Err(pedal_input::ParseError::Empty) => {
                prompt()?;
                continue;
            }
            Err(e) => {
                println!("error: {}", e);
                prompt()?;
                continue;
            }
        };
        if command == Command::Quit {
            return Ok(());
        }
        if let Err(e) = execute(board, input, config, sample_rate, command) {
            println!("error: {:#}", e);
        }
        prompt()?;
    }
}

fn execute(
    board: &mut Pedalboard,
    input: &mut InputStream,
    config: &BoardConfig,
    sample_rate: u32,
    command: Command,
) -> anyhow::Result<()> {
    match command {
        Command::Add(kind) => {
            let id = board.add_effect(kind)?;
            println!("added {} as {}", kind.display_name(), id);
        }
        Command::Remove(id) => board.remove_effect(id)?,
        Command::Move { from, to } => board.move_effect(from, to)?,
        Command::Source(kind) => {
            switch_source(board, input, config, sample_rate, &kind)?;
            println!("source: {}", kind);
        }
        Command::Set { id, param, value } => {
            if !board.update_parameter(id, &param, value)? {
                println!("{} has no parameter '{}'", id, param);
            }
        }
        Command::Mix { id, mix } => board.set_mix(id, mix)?,
        Command::Bypass(id) => {
            let bypassed = board.toggle_bypass(id)?;
            println!("{} {}", id, if bypassed { "bypassed" } else { "active" });
        }
        Command::Save(path) => {
            let path = resolve_preset(&path);
            board.preset(preset_name(&path)).save_to(&path)?;
            println!("saved {}", path.display());
        }
        Command::Load(path) => {
            let path = resolve_preset(&path);
            let preset = Preset::load_from(&path)?;
            board.load_preset(&preset)?;
            println!("loaded '{}'", preset.name);
        }
        Command::List => print_board(board),
        Command::Help => println!("{}", HELP),
        Command::Quit => {}
    }
    Ok(())
}

/// Bare names live in the preset directory
fn resolve_preset(path: &Path) -> PathBuf {
    if path.components().count() > 1 || path.is_absolute() {
        return path.to_path_buf();
    }
    let mut resolved = BoardConfig::preset_dir().join(path);
    if resolved.extension().is_none() {
        resolved.set_extension("json");
    }
    resolved
}

fn preset_name(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("preset")
        .to_string()
}

fn print_board(board: &Pedalboard) {
    println!("source: {}", board.source_label());
    if board.slots().is_empty() {
        println!("  (no pedals)");
    }
    for (position, slot) in board.slots().iter().enumerate() {
        let knobs: Vec<String> = slot
            .entry
            .params
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect();
        println!(
            "  {}. [{}] {}  mix={:.2}{}  {}",
            position,
            slot.id,
            slot.name,
            slot.entry.mix.unwrap_or(1.0),
            if slot.entry.bypassed { " (bypassed)" } else { "" },
            knobs.join(" ")
        );
    }
}

fn prompt() -> io::Result<()> {
    print!("> ");
    io::stdout().flush()
}
