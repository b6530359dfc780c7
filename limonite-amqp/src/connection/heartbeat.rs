//! Periodic heartbeat ticks for the connection engine

use std::pin::Pin;
use std::task::Poll;
use std::time::Duration;

use futures_util::Stream;
use tokio::time::Instant;
use tokio_stream::wrappers::IntervalStream;

/// A stream that ticks when it is time to send an empty frame, or never
/// when the peer advertised no idle timeout.
#[derive(Debug)]
pub(crate) struct HeartBeat {
    interval: Option<IntervalStream>,
}

impl HeartBeat {
    /// Never yields; used when the peer does not time out idle peers.
    pub fn never() -> Self {
        Self { interval: None }
    }

    /// Ticks every `period`, starting one period from now.
    pub fn new(period: Duration) -> Self {
        let interval = tokio::time::interval_at(Instant::now() + period, period);
        Self {
            interval: Some(IntervalStream::new(interval)),
        }
    }
}

impl Stream for HeartBeat {
    type Item = ();

    fn poll_next(
        mut self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> Poll<Option<Self::Item>> {
        match self.interval.as_mut() {
            Some(interval) => match Pin::new(interval).poll_next(cx) {
                Poll::Ready(Some(_instant)) => Poll::Ready(Some(())),
                Poll::Ready(None) => Poll::Ready(None),
                Poll::Pending => Poll::Pending,
            },
            None => Poll::Pending,
        }
    }
}
