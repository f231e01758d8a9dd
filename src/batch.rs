//! Batch scheduler: chunked OCR over the image queue.
//!
//! The queue is cut into fixed-size index ranges. Each batch converts its
//! images concurrently, sends one OCR request, and maps the returned
//! segments back onto queue indices. Batches run strictly one after
//! another; a failed batch is logged and skipped.

use crate::convert::{EncodedImage, ImageConverter};
use crate::discovery::ImageCandidate;
use crate::ocr::{parse_batch_text, OcrService};
use futures::future::join_all;
use std::collections::HashMap;
use std::ops::Range;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Split `len` queue positions into consecutive ranges of at most `size`.
pub fn partition(len: usize, size: usize) -> Vec<Range<usize>> {
    let size = size.max(1);
    (0..len)
        .step_by(size)
        .map(|start| start..(start + size).min(len))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStatus {
    Pending,
    InFlight,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    pub range: Range<usize>,
    pub status: BatchStatus,
}

/// Queue index to extracted text, for images their batch answered for.
///
/// Text may be empty or the no-text sentinel; narration skips those.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchResultMap {
    texts: HashMap<usize, String>,
}

impl BatchResultMap {
    /// Record text for `index`. The first mapping wins; later ones are ignored.
    pub fn insert(&mut self, index: usize, text: String) -> bool {
        match self.texts.entry(index) {
            std::collections::hash_map::Entry::Occupied(_) => false,
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(text);
                true
            }
        }
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.texts.get(&index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.texts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }
}

/// Outcome of a scheduler run.
#[derive(Debug, Clone, Default)]
pub struct BatchRun {
    pub batches: Vec<Batch>,
    pub results: BatchResultMap,
}

pub struct BatchScheduler {
    ocr: Arc<dyn OcrService>,
    converter: ImageConverter,
}

impl BatchScheduler {
    pub fn new(ocr: Arc<dyn OcrService>, converter: ImageConverter) -> Self {
        Self { ocr, converter }
    }

    /// OCR the whole queue batch by batch. Never fails.
    ///
    /// Stops early, keeping what was mapped so far, once `cancel` fires.
    /// `on_progress` sees each batch as it completes or fails.
    pub async fn run(
        &self,
        queue: &[ImageCandidate],
        batch_size: usize,
        cancel: &CancellationToken,
        mut on_progress: impl FnMut(&Batch) + Send,
    ) -> BatchRun {
        let mut run = BatchRun {
            batches: partition(queue.len(), batch_size)
                .into_iter()
                .map(|range| Batch {
                    range,
                    status: BatchStatus::Pending,
                })
                .collect(),
            results: BatchResultMap::default(),
        };
        log::info!(
            "[BATCH] {} images in {} batches of up to {}",
            queue.len(),
            run.batches.len(),
            batch_size
        );

        let total = run.batches.len();
        for (n, batch) in run.batches.iter_mut().enumerate() {
            if cancel.is_cancelled() {
                log::info!("[BATCH] Cancelled before batch {}/{}", n + 1, total);
                break;
            }
            batch.status = BatchStatus::InFlight;
            let start = Instant::now();

            let outcome = tokio::select! {
                _ = cancel.cancelled() => None,
                mapped = self.run_batch(queue, batch.range.clone()) => Some(mapped),
            };
            let Some(mapped) = outcome else {
                log::info!("[BATCH] Cancelled during batch {}/{}", n + 1, total);
                batch.status = BatchStatus::Failed;
                break;
            };

            match mapped {
                Some(texts) => {
                    let count = texts.len();
                    for (index, text) in texts {
                        run.results.insert(index, text);
                    }
                    batch.status = BatchStatus::Completed;
                    log::info!(
                        "[BATCH] Batch {}/{} mapped {} of {} images in {}ms",
                        n + 1,
                        total,
                        count,
                        batch.range.len(),
                        start.elapsed().as_millis()
                    );
                }
                None => {
                    batch.status = BatchStatus::Failed;
                    log::warn!("[BATCH] Batch {}/{} failed, continuing", n + 1, total);
                }
            }
            on_progress(batch);
        }
        run
    }

    /// Convert, recognize and map one batch. `None` when nothing could be
    /// sent or the request failed.
    async fn run_batch(
        &self,
        queue: &[ImageCandidate],
        range: Range<usize>,
    ) -> Option<Vec<(usize, String)>> {
        let conversions = range.clone().map(|i| {
            let converter = &self.converter;
            let candidate = &queue[i];
            async move { (i, converter.to_bytes(candidate).await) }
        });

        let mut indices = Vec::new();
        let mut images: Vec<EncodedImage> = Vec::new();
        for (i, converted) in join_all(conversions).await {
            match converted {
                Ok(image) => {
                    indices.push(i);
                    images.push(image);
                }
                Err(e) => log::warn!("[BATCH] Skipping image {}: {}", i + 1, e),
            }
        }

        let response = match images.len() {
            0 => {
                log::warn!("[BATCH] No image in {:?} could be converted", range);
                return None;
            }
            1 => self.ocr.recognize(images.remove(0)).await,
            _ => self.ocr.recognize_batch(images).await,
        };

        let text = match response {
            Ok(text) => text,
            Err(e) => {
                log::error!("[BATCH] OCR request failed: {}", e);
                return None;
            }
        };

        let segments = if indices.len() == 1 {
            vec![text.trim().to_string()]
        } else {
            parse_batch_text(&text)
        };
        if segments.len() < indices.len() {
            log::warn!(
                "[BATCH] {} segments for {} images; the rest fall back to single OCR",
                segments.len(),
                indices.len()
            );
        }

        // No-text segments are kept: the image was answered for.
        Some(indices.into_iter().zip(segments).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partition_covers_queue_in_order() {
        assert_eq!(partition(7, 5), vec![0..5, 5..7]);
        assert_eq!(partition(10, 5), vec![0..5, 5..10]);
        assert_eq!(partition(1, 20), vec![0..1]);
        assert!(partition(0, 5).is_empty());
        assert_eq!(partition(3, 0), vec![0..1, 1..2, 2..3]);
    }

    #[test]
    fn result_map_keeps_first_mapping() {
        let mut map = BatchResultMap::default();
        assert!(map.insert(2, "first".to_string()));
        assert!(!map.insert(2, "second".to_string()));
        assert_eq!(map.get(2), Some("first"));
        assert_eq!(map.get(3), None);
        assert_eq!(map.len(), 1);
    }
}
