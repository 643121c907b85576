//! Core domain types for Slidecast presentations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, SlidecastError};

// ---------------------------------------------------------------------------
// PresentationId
// ---------------------------------------------------------------------------

/// Identifier of a presentation; the root of its blob key space.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PresentationId(String);

impl PresentationId {
    /// Generate a new time-sortable identifier.
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PresentationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for PresentationId {
    type Err = SlidecastError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s.contains('/') {
            return Err(SlidecastError::validation(format!(
                "invalid presentation id '{s}'"
            )));
        }
        Ok(Self(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Source document and Presentation
// ---------------------------------------------------------------------------

/// The extracted-text document stored as `content.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub slides: Vec<SourceSlide>,
}

/// One slide's extracted text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSlide {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub content: String,
}

impl SourceDocument {
    /// Build a document from bare slide texts.
    pub fn from_texts(title: Option<String>, texts: Vec<String>) -> Self {
        Self {
            title,
            slides: texts
                .into_iter()
                .enumerate()
                .map(|(i, content)| SourceSlide {
                    id: Some(format!("slide{}", i + 1)),
                    content,
                })
                .collect(),
        }
    }
}

/// An ordered, immutable sequence of raw slide texts.
#[derive(Debug, Clone)]
pub struct Presentation {
    pub id: PresentationId,
    pub title: Option<String>,
    pub slides: Vec<String>,
}

impl Presentation {
    /// Parse a stored `content.json` payload.
    pub fn from_document_bytes(id: PresentationId, bytes: &[u8]) -> Result<Self> {
        let doc: SourceDocument = serde_json::from_slice(bytes).map_err(|e| {
            SlidecastError::validation(format!("content.json for {id} does not parse: {e}"))
        })?;
        Ok(Self {
            id,
            title: doc.title,
            slides: doc.slides.into_iter().map(|s| s.content).collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.slides.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slides.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Batch
// ---------------------------------------------------------------------------

/// A contiguous group of slides generated together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    /// Stable id derived from the start index (`batch_0003`).
    pub id: String,
    /// 0-based index of the first slide in the presentation.
    pub start_index: usize,
    pub slides: Vec<String>,
}

impl Batch {
    pub fn new(start_index: usize, slides: Vec<String>) -> Self {
        Self {
            id: format!("batch_{start_index:04}"),
            start_index,
            slides,
        }
    }

    /// 1-based number of the first slide.
    pub fn first_slide_number(&self) -> u32 {
        self.start_index as u32 + 1
    }

    /// 1-based slide numbers this batch must produce, in order.
    pub fn slide_numbers(&self) -> std::ops::Range<u32> {
        let first = self.first_slide_number();
        first..first + self.slides.len() as u32
    }

    /// Half-open index range `[start, end)` covered by this batch.
    pub fn span(&self) -> std::ops::Range<usize> {
        self.start_index..self.start_index + self.slides.len()
    }
}

// ---------------------------------------------------------------------------
// SlideRecord / Script
// ---------------------------------------------------------------------------

/// One validated narration entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SlideRecord {
    pub slide: u32,
    pub title: String,
    pub script: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub should_skip: Option<bool>,
}

impl SlideRecord {
    pub fn is_skipped(&self) -> bool {
        self.should_skip.unwrap_or(false)
    }
}

/// The final, ordered narration for a whole presentation (`script.json`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Script {
    pub slides: Vec<SlideRecord>,
}

impl Script {
    /// Check that slides are numbered `1..=expected` in order.
    pub fn check_numbering(&self, expected: usize) -> Result<()> {
        if self.slides.len() != expected {
            return Err(SlidecastError::validation(format!(
                "script has {} slides, presentation has {expected}",
                self.slides.len()
            )));
        }
        for (i, record) in self.slides.iter().enumerate() {
            if record.slide as usize != i + 1 {
                return Err(SlidecastError::validation(format!(
                    "slide at position {} is numbered {}",
                    i + 1,
                    record.slide
                )));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// BatchState
// ---------------------------------------------------------------------------

/// Lifecycle of one stage within a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

/// Outcome of schema validation on the latest conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    Pending,
    Passed,
    Failed,
}

/// Narrative stage record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NarrativeState {
    pub state: StageStatus,
    pub attempts: u32,
    pub last_updated: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// JSON conversion stage record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonState {
    pub state: StageStatus,
    pub validation: ValidationStatus,
    pub attempts: u32,
    pub last_updated: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Per-batch progress, persisted next to the narration for observability.
///
/// Values are never edited in place; every transition returns a new record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchState {
    pub narrative: NarrativeState,
    pub json: JsonState,
}

impl BatchState {
    /// Fresh state with the json attempt counter seeded from earlier runs.
    pub fn new(prior_json_attempts: u32) -> Self {
        let now = Utc::now();
        Self {
            narrative: NarrativeState {
                state: StageStatus::Pending,
                attempts: 0,
                last_updated: now,
                error: None,
            },
            json: JsonState {
                state: StageStatus::Pending,
                validation: ValidationStatus::Pending,
                attempts: prior_json_attempts,
                last_updated: now,
                error: None,
            },
        }
    }

    pub fn narrative_started(&self) -> Self {
        Self {
            narrative: NarrativeState {
                state: StageStatus::InProgress,
                attempts: self.narrative.attempts + 1,
                last_updated: Utc::now(),
                error: None,
            },
            json: self.json.clone(),
        }
    }

    pub fn narrative_completed(&self) -> Self {
        Self {
            narrative: NarrativeState {
                state: StageStatus::Completed,
                last_updated: Utc::now(),
                error: None,
                ..self.narrative.clone()
            },
            json: self.json.clone(),
        }
    }

    pub fn narrative_failed(&self, error: &str) -> Self {
        Self {
            narrative: NarrativeState {
                state: StageStatus::Failed,
                last_updated: Utc::now(),
                error: Some(error.to_string()),
                ..self.narrative.clone()
            },
            json: self.json.clone(),
        }
    }

    pub fn json_started(&self) -> Self {
        Self {
            narrative: self.narrative.clone(),
            json: JsonState {
                state: StageStatus::InProgress,
                validation: ValidationStatus::Pending,
                attempts: self.json.attempts + 1,
                last_updated: Utc::now(),
                error: None,
            },
        }
    }

    pub fn json_completed(&self) -> Self {
        Self {
            narrative: self.narrative.clone(),
            json: JsonState {
                state: StageStatus::Completed,
                validation: ValidationStatus::Passed,
                last_updated: Utc::now(),
                error: None,
                ..self.json.clone()
            },
        }
    }

    /// `schema_rejected` distinguishes a validation failure from a service failure.
    pub fn json_failed(&self, error: &str, schema_rejected: bool) -> Self {
        Self {
            narrative: self.narrative.clone(),
            json: JsonState {
                state: StageStatus::Failed,
                validation: if schema_rejected {
                    ValidationStatus::Failed
                } else {
                    self.json.validation
                },
                last_updated: Utc::now(),
                error: Some(error.to_string()),
                ..self.json.clone()
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Audio
// ---------------------------------------------------------------------------

/// One non-skipped paragraph queued for synthesis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioUnit {
    /// Position in the unit sequence; orders segments in the final track.
    pub index: usize,
    /// Slide number the paragraph narrates.
    pub slide: u32,
    pub paragraph: String,
}

/// Synthesized payload for one unit, as returned by the speech service.
#[derive(Debug, Clone)]
pub struct AudioSegment {
    pub index: usize,
    pub waveform: Vec<u8>,
}
