//! Order-restoring assembly of synthesized segments into one WAV track.

use std::io::Cursor;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use slidecast_shared::{AudioSegment, Result, SlidecastError};
use slidecast_storage::{BlobStore, PresentationLayout};
use tracing::{info, instrument};

/// 16-bit mono PCM at `sample_rate`.
pub fn mono_spec(sample_rate: u32) -> WavSpec {
    WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    }
}

/// Decode a synthesized payload into samples.
///
/// Accepts a RIFF/WAVE container matching `spec`, or raw little-endian
/// 16-bit PCM.
pub fn decode_segment(payload: &[u8], spec: WavSpec) -> Result<Vec<i16>> {
    if payload.starts_with(b"RIFF") {
        let reader = WavReader::new(Cursor::new(payload))
            .map_err(|e| SlidecastError::Audio(format!("unreadable wav payload: {e}")))?;
        if reader.spec() != spec {
            return Err(SlidecastError::Audio(format!(
                "wav payload is {:?}, expected {spec:?}",
                reader.spec()
            )));
        }
        return reader
            .into_samples::<i16>()
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| SlidecastError::Audio(format!("corrupt wav samples: {e}")));
    }

    if payload.len() % 2 != 0 {
        return Err(SlidecastError::Audio(format!(
            "raw pcm payload has odd length {}",
            payload.len()
        )));
    }
    Ok(payload
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect())
}

/// Encode samples as a WAV file.
pub fn encode_wav(samples: &[i16], spec: WavSpec) -> Result<Vec<u8>> {
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, spec)
            .map_err(|e| SlidecastError::Audio(format!("wav header: {e}")))?;
        for &sample in samples {
            writer
                .write_sample(sample)
                .map_err(|e| SlidecastError::Audio(format!("wav write: {e}")))?;
        }
        writer
            .finalize()
            .map_err(|e| SlidecastError::Audio(format!("wav finalize: {e}")))?;
    }
    Ok(cursor.into_inner())
}

/// Writes per-segment artifacts and the combined track.
pub struct AudioAssembler<'a> {
    store: &'a dyn BlobStore,
    layout: &'a PresentationLayout,
    spec: WavSpec,
}

impl<'a> AudioAssembler<'a> {
    pub fn new(store: &'a dyn BlobStore, layout: &'a PresentationLayout, sample_rate: u32) -> Self {
        Self {
            store,
            layout,
            spec: mono_spec(sample_rate),
        }
    }

    /// Sort `segments` by index, persist each one, then persist the
    /// concatenation. Returns the combined track's key.
    #[instrument(skip_all, fields(root = self.layout.root(), segments = segments.len()))]
    pub async fn assemble(&self, mut segments: Vec<AudioSegment>) -> Result<String> {
        segments.sort_by_key(|s| s.index);

        let mut combined: Vec<i16> = Vec::new();
        for segment in &segments {
            let samples = decode_segment(&segment.waveform, self.spec)?;
            let wav = encode_wav(&samples, self.spec)?;
            self.store
                .put(&self.layout.segment(segment.index), &wav)
                .await?;
            combined.extend_from_slice(&samples);
        }

        let key = self.layout.combined_audio();
        self.store.put(&key, &encode_wav(&combined, self.spec)?).await?;

        let seconds = combined.len() as f64 / f64::from(self.spec.sample_rate);
        info!(samples = combined.len(), seconds, "combined track written");
        Ok(key)
    }
}
