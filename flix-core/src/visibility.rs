use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::stream::{self, BoxStream, StreamExt};
use tokio::sync::broadcast;
use tracing::debug;

/// Scroll position reported by the host on every scroll or resize.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportSample {
    pub scroll_top: f64,
    pub client_height: f64,
}

/// Shared handle to the sentinel element's vertical offset. The host updates
/// it as content above the sentinel grows.
#[derive(Debug, Clone)]
pub struct ElementHandle {
    offset_top: Arc<AtomicU64>,
}

impl ElementHandle {
    pub fn new(offset_top: f64) -> Self {
        Self {
            offset_top: Arc::new(AtomicU64::new(offset_top.to_bits())),
        }
    }

    pub fn offset_top(&self) -> f64 {
        f64::from_bits(self.offset_top.load(Ordering::Relaxed))
    }

    pub fn set_offset_top(&self, offset_top: f64) {
        self.offset_top.store(offset_top.to_bits(), Ordering::Relaxed);
    }
}

pub fn is_near_viewport_end(sample: ViewportSample, element: &ElementHandle, threshold_px: f64) -> bool {
    sample.scroll_top + sample.client_height + threshold_px >= element.offset_top()
}

pub trait VisibilityTrigger {
    /// One `()` per sample in which `element` is within `threshold_px` of the
    /// bottom of the viewport. Unthrottled.
    fn observe(&self, element: ElementHandle, threshold_px: f64) -> BoxStream<'static, ()>;
}

#[derive(Debug, Clone)]
pub struct ScrollObserver {
    samples: broadcast::Sender<ViewportSample>,
}

impl ScrollObserver {
    pub fn new(capacity: usize) -> Self {
        let (samples, _) = broadcast::channel(capacity.max(1));
        Self { samples }
    }

    /// Feeds one viewport sample to every active observation.
    pub fn record(&self, sample: ViewportSample) {
        // No observers is not an error; the sample is just unseen.
        let _ = self.samples.send(sample);
    }
}

impl Default for ScrollObserver {
    fn default() -> Self {
        Self::new(64)
    }
}

impl VisibilityTrigger for ScrollObserver {
    fn observe(&self, element: ElementHandle, threshold_px: f64) -> BoxStream<'static, ()> {
        let receiver = self.samples.subscribe();
        stream::unfold(receiver, move |mut receiver| {
            let element = element.clone();
            async move {
                loop {
                    match receiver.recv().await {
                        Ok(sample) if is_near_viewport_end(sample, &element, threshold_px) => {
                            return Some(((), receiver));
                        }
                        Ok(_) => continue,
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            debug!(skipped, "visibility observer lagged behind scroll samples");
                        }
                        Err(broadcast::error::RecvError::Closed) => return None,
                    }
                }
            }
        })
        .boxed()
    }
}
