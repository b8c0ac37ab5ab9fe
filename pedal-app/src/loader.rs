//! Audio file decoding for the file source
//!
//! Files are decoded with Symphonia, folded to mono and resampled to the
//! engine rate with Rubato before playback starts.

use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use pedal_audio::BufferSource;

/// Resampler chunk length in frames
const RESAMPLE_CHUNK: usize = 1024;

/// Decoded mono clip at the engine sample rate
pub struct Clip {
    pub samples: Arc<Vec<f32>>,
    pub sample_rate: u32,
}

impl Clip {
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }

    pub fn into_source(self) -> BufferSource {
        BufferSource::new(self.samples, self.sample_rate)
    }
}

/// Decode `path` and convert it to mono at `target_rate`
pub fn load_clip(path: &Path, target_rate: u32) -> anyhow::Result<Clip> {
    let file =
        std::fs::File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| anyhow!("unsupported format: {}", e))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| anyhow!("no audio track in {}", path.display()))?;
    let track_id = track.id;
    let codec_params = track.codec_params.clone();
    let source_rate = codec_params.sample_rate.unwrap_or(44100);

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| anyhow!("no decoder: {}", e))?;

    let mut mono: Vec<f32> = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => {
                tracing::debug!("Stopping decode of {:?}: {}", path, e);
                break;
            }
        };
        if packet.track_id() != track_id {
            continue;
        }
        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(SymphoniaError::DecodeError(e)) => {
                tracing::debug!("Skipping bad packet: {}", e);
                continue;
            }
            Err(e) => return Err(anyhow!("decode failed: {}", e)),
        };

        let spec = *decoded.spec();
        let channels = spec.channels.count().max(1);
        let mut buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        buf.copy_interleaved_ref(decoded);
        let scale = 1.0 / channels as f32;
        mono.extend(
            buf.samples()
                .chunks(channels)
                .map(|frame| frame.iter().sum::<f32>() * scale),
        );
    }

    if mono.is_empty() {
        return Err(anyhow!("{} contains no audio", path.display()));
    }

    let samples = if source_rate != target_rate {
        resample(&mono, source_rate, target_rate)?
    } else {
        mono
    };
    let clip = Clip {
        samples: Arc::new(samples),
        sample_rate: target_rate,
    };
    tracing::info!(
        "Loaded {:?}: {:.1}s, {} Hz -> {} Hz",
        path,
        clip.duration_secs(),
        source_rate,
        target_rate
    );
    Ok(clip)
}

/// Mono sample-rate conversion
fn resample(samples: &[f32], source_rate: u32, target_rate: u32) -> anyhow::Result<Vec<f32>> {
    use rubato::{FftFixedInOut, Resampler};

    let mut resampler = FftFixedInOut::<f32>::new(
        source_rate as usize,
        target_rate as usize,
        RESAMPLE_CHUNK,
        1,
    )
    .map_err(|e| anyhow!("resampler: {}", e))?;

    let chunk = resampler.input_frames_next();
    let delay = resampler.output_delay();
    let expected = samples.len() * target_rate as usize / source_rate as usize;
    let mut output = Vec::with_capacity(delay + expected + 2 * chunk);

    let mut blocks = samples.chunks_exact(chunk);
    for block in blocks.by_ref() {
        let resampled = resampler
            .process(&[block], None)
            .map_err(|e| anyhow!("resampling: {}", e))?;
        output.extend_from_slice(&resampled[0]);
    }
    let rest = [blocks.remainder()];
    if !rest[0].is_empty() {
        let resampled = resampler
            .process_partial(Some(&rest[..]), None)
            .map_err(|e| anyhow!("resampling: {}", e))?;
        output.extend_from_slice(&resampled[0]);
    }
    // Flush what is still inside the resampler's delay
    while output.len() < delay + expected {
        let resampled = resampler
            .process_partial::<&[f32]>(None, None)
            .map_err(|e| anyhow!("resampling: {}", e))?;
        if resampled[0].is_empty() {
            break;
        }
        output.extend_from_slice(&resampled[0]);
    }

    output.drain(..delay.min(output.len()));
    output.truncate(expected);
    Ok(output)
}
