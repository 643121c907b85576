//! Blob key layout for one presentation.
//!
//! ```text
//! presentations/{id}/
//! ├── content.json
//! ├── script.json
//! ├── intermediate_outputs/
//! │   ├── narrative/{batch_id}.txt
//! │   ├── narrative/{batch_id}.txt.metadata.json
//! │   └── json/{batch_id}.json
//! └── audio/
//!     ├── segment_{index}.wav
//!     ├── combined_audio.wav
//!     └── combined_audio.wav.metadata.json
//! ```
//!
//! Every batch and every audio unit writes to its own keys, so concurrent
//! workers never share a key.

use slidecast_shared::PresentationId;

/// Computes blob keys under `presentations/{id}/`.
#[derive(Debug, Clone)]
pub struct PresentationLayout {
    root: String,
}

impl PresentationLayout {
    pub fn new(id: &PresentationId) -> Self {
        Self {
            root: format!("presentations/{id}"),
        }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    /// Extracted slide texts (pipeline input).
    pub fn content(&self) -> String {
        format!("{}/content.json", self.root)
    }

    pub fn narrative(&self, batch_id: &str) -> String {
        format!("{}/intermediate_outputs/narrative/{batch_id}.txt", self.root)
    }

    /// Batch state record, stored beside the narration.
    pub fn narrative_metadata(&self, batch_id: &str) -> String {
        format!("{}.metadata.json", self.narrative(batch_id))
    }

    pub fn batch_json(&self, batch_id: &str) -> String {
        format!("{}/intermediate_outputs/json/{batch_id}.json", self.root)
    }

    pub fn script(&self) -> String {
        format!("{}/script.json", self.root)
    }

    pub fn segment(&self, index: usize) -> String {
        format!("{}/audio/segment_{index}.wav", self.root)
    }

    pub fn combined_audio(&self) -> String {
        format!("{}/audio/combined_audio.wav", self.root)
    }

    /// Records which script the combined track was assembled from.
    pub fn combined_audio_metadata(&self) -> String {
        format!("{}.metadata.json", self.combined_audio())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_match_layout() {
        let id: PresentationId = "deck-42".parse().unwrap();
        let layout = PresentationLayout::new(&id);

        assert_eq!(layout.content(), "presentations/deck-42/content.json");
        assert_eq!(
            layout.narrative("batch_0003"),
            "presentations/deck-42/intermediate_outputs/narrative/batch_0003.txt"
        );
        assert_eq!(
            layout.narrative_metadata("batch_0003"),
            "presentations/deck-42/intermediate_outputs/narrative/batch_0003.txt.metadata.json"
        );
        assert_eq!(
            layout.batch_json("batch_0003"),
            "presentations/deck-42/intermediate_outputs/json/batch_0003.json"
        );
        assert_eq!(layout.script(), "presentations/deck-42/script.json");
        assert_eq!(layout.segment(7), "presentations/deck-42/audio/segment_7.wav");
        assert_eq!(
            layout.combined_audio(),
            "presentations/deck-42/audio/combined_audio.wav"
        );
        assert_eq!(
            layout.combined_audio_metadata(),
            "presentations/deck-42/audio/combined_audio.wav.metadata.json"
        );
    }
}
