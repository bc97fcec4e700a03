// ── Slot update streams ──
//
// `Stream` adapters over the registry's broadcast channel.

mod filter;

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;

use crate::model::SlotUpdate;

pub use filter::UpdateFilter;

/// A stream of [`SlotUpdate`]s matching a filter.
///
/// A consumer that falls behind skips the updates it missed instead of
/// ending the stream; the registry still holds the current values.
pub struct SlotUpdateStream {
    inner: BroadcastStream<Arc<SlotUpdate>>,
    filter: UpdateFilter,
}

impl SlotUpdateStream {
    pub fn new(receiver: broadcast::Receiver<Arc<SlotUpdate>>, filter: UpdateFilter) -> Self {
        Self {
            inner: BroadcastStream::new(receiver),
            filter,
        }
    }
}

impl Stream for SlotUpdateStream {
    type Item = Arc<SlotUpdate>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            match Pin::new(&mut self.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(update))) => {
                    if self.filter.matches(&update) {
                        return Poll::Ready(Some(update));
                    }
                }
                Poll::Ready(Some(Err(BroadcastStreamRecvError::Lagged(skipped)))) => {
                    tracing::warn!(skipped, "slot update stream lagged");
                }
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
