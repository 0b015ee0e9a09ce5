//! In-process channel transport
//!
//! Implements both stream traits over one bounded tokio mpsc channel.
//! This is the transport used when the pinger and the inserter run inside
//! the same process; everything flows through a single partition, which
//! trivially satisfies the "ordered within a partition" contract.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, trace};

use super::{StreamConsumer, StreamError, StreamProducer, StreamResult};

/// The single partition every payload lands in.
const PARTITION: u32 = 0;

#[derive(Debug)]
struct Envelope {
    topic: String,
    payload: Vec<u8>,
}

/// Producer half of an in-process stream.
pub struct ChannelProducer {
    tx: mpsc::Sender<Envelope>,
}

/// Consumer half of an in-process stream, bound to one topic.
pub struct ChannelConsumer {
    topic: String,
    rx: Mutex<mpsc::Receiver<Envelope>>,
}

/// Create a connected producer/consumer pair.
///
/// `capacity` bounds how many payloads may be in flight before `send`
/// backpressures. The consumer only yields payloads published to `topic`;
/// payloads for other topics are dropped at poll time.
pub fn channel_stream(topic: &str, capacity: usize) -> (Arc<ChannelProducer>, Arc<ChannelConsumer>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    debug!("in-process stream created for topic {topic} (capacity {capacity})");
    (
        Arc::new(ChannelProducer { tx }),
        Arc::new(ChannelConsumer {
            topic: topic.to_string(),
            rx: Mutex::new(rx),
        }),
    )
}

#[async_trait]
impl StreamProducer for ChannelProducer {
    async fn send(&self, topic: &str, payload: Vec<u8>) -> StreamResult<()> {
        trace!("publishing {} bytes to {topic}", payload.len());
        self.tx
            .send(Envelope {
                topic: topic.to_string(),
                payload,
            })
            .await
            .map_err(|_| StreamError::Closed(String::from("consumer side is gone")))
    }

    async fn close(&self) {
        debug!("in-process producer closed");
    }
}

#[async_trait]
impl StreamConsumer for ChannelConsumer {
    async fn poll(&self) -> HashMap<u32, Vec<Vec<u8>>> {
        let mut rx = self.rx.lock().await;
        let mut payloads = Vec::new();
        while let Ok(envelope) = rx.try_recv() {
            if envelope.topic == self.topic {
                payloads.push(envelope.payload);
            } else {
                trace!("dropping payload for unsubscribed topic {}", envelope.topic);
            }
        }
        drop(rx);

        let mut batch = HashMap::new();
        if !payloads.is_empty() {
            batch.insert(PARTITION, payloads);
        }
        batch
    }

    async fn close(&self) {
        self.rx.lock().await.close();
        debug!("in-process consumer closed");
    }
}
