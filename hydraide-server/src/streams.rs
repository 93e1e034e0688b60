//! Streaming responses for the two subscription RPCs (spec §4.E, §6). Each
//! wraps the `mpsc::Receiver` half of a Swamp's fan-out channel and
//! unsubscribes on drop, so a client that disconnects mid-stream (the
//! common case — these run until the caller walks away) cleans up the
//! Swamp's subscriber table without any extra bookkeeping in the RPC
//! handler itself.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::Stream;
use hydraide_storage::{Event, InfoEvent, Swamp};
use tokio::sync::mpsc;
use tonic::Status;
use uuid::Uuid;

use hydraide_proto::{event_to_wire, info_event_to_wire, wire};

pub struct EventSubscription {
    swamp: Arc<Swamp>,
    id: Uuid,
    rx: mpsc::Receiver<Event>,
}

impl EventSubscription {
    pub fn new(swamp: Arc<Swamp>, id: Uuid, rx: mpsc::Receiver<Event>) -> Self {
        EventSubscription { swamp, id, rx }
    }
}

impl Stream for EventSubscription {
    type Item = Result<wire::Event, Status>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match this.rx.poll_recv(cx) {
            Poll::Ready(Some(event)) => Poll::Ready(Some(Ok(event_to_wire(&event)))),
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for EventSubscription {
    fn drop(&mut self) {
        self.swamp.unsubscribe_from_events(self.id);
    }
}

pub struct InfoSubscription {
    swamp: Arc<Swamp>,
    id: Uuid,
    rx: mpsc::Receiver<InfoEvent>,
}

impl InfoSubscription {
    pub fn new(swamp: Arc<Swamp>, id: Uuid, rx: mpsc::Receiver<InfoEvent>) -> Self {
        InfoSubscription { swamp, id, rx }
    }
}

impl Stream for InfoSubscription {
    type Item = Result<wire::InfoEvent, Status>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match this.rx.poll_recv(cx) {
            Poll::Ready(Some(event)) => Poll::Ready(Some(Ok(info_event_to_wire(event)))),
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for InfoSubscription {
    fn drop(&mut self) {
        self.swamp.unsubscribe_from_info(self.id);
    }
}
