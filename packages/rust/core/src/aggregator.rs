//! Reassemble per-batch records into the final script.

use slidecast_shared::{Batch, Result, Script, SlideRecord, SlidecastError};
use slidecast_storage::{BlobStore, PresentationLayout};
use tracing::{info, instrument};

/// Read every batch's records in planned order and publish `script.json`.
///
/// Call only after every batch has completed. Completion order is
/// irrelevant: records are read back by batch id, in the order `batches`
/// were planned. A missing batch file is a [`SlidecastError::MissingArtifact`]
/// and nothing is written.
#[instrument(skip_all, fields(root = layout.root(), batches = batches.len()))]
pub async fn aggregate_script(
    store: &dyn BlobStore,
    layout: &PresentationLayout,
    batches: &[Batch],
    slide_count: usize,
) -> Result<Script> {
    let mut slides = Vec::with_capacity(slide_count);
    for batch in batches {
        let bytes = store.get(&layout.batch_json(&batch.id)).await?;
        let records: Vec<SlideRecord> = serde_json::from_slice(&bytes).map_err(|e| {
            SlidecastError::validation(format!("stored records for {} do not parse: {e}", batch.id))
        })?;
        slides.extend(records);
    }

    let script = Script { slides };
    script.check_numbering(slide_count)?;

    let bytes = serde_json::to_vec_pretty(&script)
        .map_err(|e| SlidecastError::Storage(format!("serialize script: {e}")))?;
    store.put(&layout.script(), &bytes).await?;

    info!(slides = script.slides.len(), "script published");
    Ok(script)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batching::plan_batches;
    use slidecast_storage::MemoryBlobStore;

    fn record(slide: u32) -> SlideRecord {
        SlideRecord {
            slide,
            title: format!("Slide {slide}"),
            script: format!("Narration {slide}."),
            should_skip: None,
        }
    }

    async fn store_batch(store: &MemoryBlobStore, layout: &PresentationLayout, batch: &Batch) {
        let records: Vec<_> = batch.slide_numbers().map(record).collect();
        store
            .put(
                &layout.batch_json(&batch.id),
                &serde_json::to_vec(&records).unwrap(),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn concatenates_in_batch_order() {
        let store = MemoryBlobStore::new();
        let layout = PresentationLayout::new(&"deck".parse().unwrap());
        let slides: Vec<String> = (1..=7).map(|i| i.to_string()).collect();
        let batches = plan_batches(&slides, 3);

        // Stored out of order, as a concurrent window would.
        for batch in batches.iter().rev() {
            store_batch(&store, &layout, batch).await;
        }

        let script = aggregate_script(&store, &layout, &batches, 7).await.unwrap();
        assert_eq!(
            script.slides.iter().map(|r| r.slide).collect::<Vec<_>>(),
            (1..=7).collect::<Vec<_>>()
        );

        let stored: Script =
            serde_json::from_slice(&store.get(&layout.script()).await.unwrap()).unwrap();
        assert_eq!(stored, script);
        let text = String::from_utf8(store.get(&layout.script()).await.unwrap()).unwrap();
        assert!(text.contains("\n  \"slides\""), "script should be indented");
    }

    #[tokio::test]
    async fn missing_batch_publishes_nothing() {
        let store = MemoryBlobStore::new();
        let layout = PresentationLayout::new(&"deck".parse().unwrap());
        let slides: Vec<String> = (1..=6).map(|i| i.to_string()).collect();
        let batches = plan_batches(&slides, 3);
        store_batch(&store, &layout, &batches[0]).await;

        let err = aggregate_script(&store, &layout, &batches, 6)
            .await
            .unwrap_err();
        assert!(matches!(err, SlidecastError::MissingArtifact { .. }));
        assert!(!store.exists(&layout.script()).await.unwrap());
    }
}
