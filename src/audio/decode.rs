use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use super::resample::resample_mono;
use super::sample::AudioSample;
use crate::config::AnalysisConfig;
use crate::error::DecodeError;

/// Extensions offered by the file picker. Decoding itself goes by content.
#[cfg(feature = "gui")]
pub const AUDIO_EXTENSIONS: &[&str] = &["wav", "mp3", "flac", "ogg", "aac", "m4a"];

/// Decode an audio file into a mono `AudioSample` at the analysis rate.
///
/// Channels are averaged. When `config.sample_rate` is non-zero and differs
/// from the file's rate, the signal is resampled.
pub fn decode_audio(path: &Path, config: &AnalysisConfig) -> Result<AudioSample, DecodeError> {
    if !path.exists() {
        return Err(DecodeError::NotFound(path.to_path_buf()));
    }

    let file = std::fs::File::open(path).map_err(|source| DecodeError::Open {
        path: path.to_path_buf(),
        source,
    })?;

    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let format_err = |source: SymphoniaError| DecodeError::Format {
        path: path.to_path_buf(),
        source,
    };

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(format_err)?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| DecodeError::NoTrack(path.to_path_buf()))?;

    let track_id = track.id;
    let channels = track.codec_params.channels.map_or(1, |c| c.count());
    let native_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| DecodeError::UnknownSampleRate(path.to_path_buf()))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(format_err)?;

    let mut mono: Vec<f32> = Vec::new();
    let mut skipped_packets = 0usize;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(e) => return Err(format_err(e)),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(SymphoniaError::DecodeError(reason)) => {
                log::debug!("Skipping corrupt packet: {}", reason);
                skipped_packets += 1;
                continue;
            }
            Err(e) => return Err(format_err(e)),
        };

        let spec = *decoded.spec();
        let num_frames = decoded.frames();

        let mut sample_buf = SampleBuffer::<f32>::new(num_frames as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);

        let samples = sample_buf.samples();
        let packet_channels = spec.channels.count().max(1);

        if packet_channels == 1 {
            mono.extend_from_slice(samples);
        } else {
            mono.extend(
                samples
                    .chunks(packet_channels)
                    .map(|frame| frame.iter().sum::<f32>() / packet_channels as f32),
            );
        }
    }

    if skipped_packets > 0 {
        log::warn!("Skipped {} undecodable packets in {}", skipped_packets, path.display());
    }

    if mono.is_empty() {
        return Err(DecodeError::Empty(path.to_path_buf()));
    }

    log::info!(
        "Decoded audio: {} samples, {} channel(s), {}Hz, {:.1}s",
        mono.len(),
        channels,
        native_rate,
        mono.len() as f32 / native_rate as f32
    );

    let (samples, sample_rate) = if config.sample_rate != 0 && config.sample_rate != native_rate {
        log::info!("Resampling {}Hz -> {}Hz", native_rate, config.sample_rate);
        (resample_mono(&mono, native_rate, config.sample_rate)?, config.sample_rate)
    } else {
        (mono, native_rate)
    };

    Ok(AudioSample::new(samples, sample_rate).with_source(path))
}
