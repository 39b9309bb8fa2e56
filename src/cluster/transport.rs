use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::codec::{Framed, LinesCodec};
use tracing::{debug, warn};

use super::message::{ClusterMessage, Envelope, Topic};
use super::subscription::SubscriptionTable;
use super::MAX_FRAME_LEN;
use crate::config::ClusterConfig;
use crate::error::{Result, StarbusError};
use crate::monitoring::AlertSink;
use crate::Lifecycle;

const ALERT_SOURCE: &str = "cluster_transport";

/// Member-side endpoint of the relay.
///
/// Owns the duplex link to the relay process, an outbound queue drained by a
/// writer task, and a reader task that parses, filters and dispatches
/// inbound envelopes to this transport's own [`SubscriptionTable`].
pub struct ClusterTransport {
    server_name: String,
    subscriptions: Arc<SubscriptionTable>,
    outbound: mpsc::UnboundedSender<String>,
    link_up: Arc<AtomicBool>,
    reader_handle: Mutex<Option<JoinHandle<()>>>,
    writer_handle: Mutex<Option<JoinHandle<()>>>,
}

impl ClusterTransport {
    /// Dial the relay and start the reader/writer tasks. The transport is
    /// usable as soon as this returns.
    ///
    /// Failing to reach the relay leaves the member unable to participate in
    /// the cluster at all, so it is reported on the alert sink as well as
    /// returned as an error.
    pub async fn connect(config: &ClusterConfig, alerts: AlertSink) -> Result<Self> {
        let stream = match timeout(
            config.connect_timeout(),
            TcpStream::connect(&config.relay_addr),
        )
        .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                let msg = format!("cannot reach relay at {}: {}", config.relay_addr, e);
                alerts.fatal(ALERT_SOURCE, &msg);
                return Err(StarbusError::transport(msg));
            }
            Err(_) => {
                let msg = format!("timed out connecting to relay at {}", config.relay_addr);
                alerts.fatal(ALERT_SOURCE, &msg);
                return Err(StarbusError::transport(msg));
            }
        };
        let _ = stream.set_nodelay(true);

        let framed = Framed::new(stream, LinesCodec::new_with_max_length(MAX_FRAME_LEN));
        let (mut sink, mut lines) = framed.split();

        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();
        let link_up = Arc::new(AtomicBool::new(true));
        let subscriptions = Arc::new(SubscriptionTable::new());

        let writer = {
            let link_up = link_up.clone();
            let alerts = alerts.clone();
            tokio::spawn(async move {
                while let Some(line) = outbound_rx.recv().await {
                    if let Err(e) = sink.send(line).await {
                        if link_up.swap(false, Ordering::SeqCst) {
                            alerts.fatal(ALERT_SOURCE, format!("relay link lost: {}", e));
                        }
                        break;
                    }
                }
            })
        };

        let reader = {
            let link_up = link_up.clone();
            let alerts = alerts.clone();
            let subscriptions = subscriptions.clone();
            let server_name = config.server_name.clone();
            tokio::spawn(async move {
                while let Some(frame) = lines.next().await {
                    match frame {
                        Ok(line) => Self::dispatch_frame(&line, &server_name, &subscriptions),
                        Err(e) => {
                            // One bad frame does not take the member down.
                            warn!("dropping inbound frame: {}", e);
                        }
                    }
                }
                if link_up.swap(false, Ordering::SeqCst) {
                    alerts.fatal(ALERT_SOURCE, "relay closed the connection");
                }
            })
        };

        debug!(
            "connected to relay at {} as {}",
            config.relay_addr, config.server_name
        );

        Ok(Self {
            server_name: config.server_name.clone(),
            subscriptions,
            outbound: outbound_tx,
            link_up,
            reader_handle: Mutex::new(Some(reader)),
            writer_handle: Mutex::new(Some(writer)),
        })
    }

    fn dispatch_frame(line: &str, server_name: &str, subscriptions: &SubscriptionTable) {
        let envelope: Envelope = match serde_json::from_str(line) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("dropping malformed envelope: {}", e);
                return;
            }
        };

        // The relay never echoes a frame back to its origin; this guard
        // holds that invariant even against a misbehaving relay.
        if envelope.from_server == server_name {
            return;
        }

        if !envelope.is_addressed_to(server_name) {
            return;
        }

        subscriptions.dispatch(&envelope);
    }

    /// Broadcast `message` to every other member.
    pub fn send(&self, message: ClusterMessage) -> Result<()> {
        self.transmit(Envelope::broadcast(message, self.server_name.clone()))
    }

    /// Send `message` to the single member named `to_server`. Every member
    /// receives the frame from the relay; only the named one delivers it.
    pub fn send_direct(&self, to_server: impl Into<String>, message: ClusterMessage) -> Result<()> {
        self.transmit(Envelope::direct(
            message,
            self.server_name.clone(),
            to_server,
        ))
    }

    fn transmit(&self, envelope: Envelope) -> Result<()> {
        if !self.link_up.load(Ordering::SeqCst) {
            return Err(StarbusError::transport("relay link is down"));
        }
        let line = serde_json::to_string(&envelope)?;
        self.outbound
            .send(line)
            .map_err(|_| StarbusError::transport("relay link is down"))
    }

    /// Register `callback` for every inbound envelope on `topic`. Multiple
    /// subscriptions to one topic all fire, in registration order.
    pub fn subscribe<F>(&self, topic: Topic, callback: F)
    where
        F: Fn(&ClusterMessage, &str) + Send + Sync + 'static,
    {
        self.subscriptions.subscribe(topic, callback);
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    pub fn is_connected(&self) -> bool {
        self.link_up.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Lifecycle for ClusterTransport {
    async fn when_ready(&self) -> Result<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(StarbusError::transport("relay link is down"))
        }
    }

    /// Tear down the reader/writer tasks. Subsequent sends fail.
    async fn close(&self) -> Result<()> {
        self.link_up.store(false, Ordering::SeqCst);
        if let Some(handle) = self.writer_handle.lock().await.take() {
            handle.abort();
        }
        if let Some(handle) = self.reader_handle.lock().await.take() {
            handle.abort();
        }
        debug!("transport {} closed", self.server_name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::message::Action;
    use parking_lot::Mutex;

    fn table_with_probe() -> (Arc<SubscriptionTable>, Arc<Mutex<Vec<String>>>) {
        let table = Arc::new(SubscriptionTable::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let probe = seen.clone();
        table.subscribe(Topic::Event, move |_, origin| {
            probe.lock().push(origin.to_string());
        });
        (table, seen)
    }

    #[test]
    fn malformed_lines_are_dropped() {
        let (table, seen) = table_with_probe();
        ClusterTransport::dispatch_frame("not json at all", "server-b", &table);
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn own_frames_are_never_dispatched() {
        let (table, seen) = table_with_probe();
        let envelope = Envelope::broadcast(
            ClusterMessage::new(Topic::Event, Action::Emit),
            "server-b",
        );
        let line = serde_json::to_string(&envelope).unwrap();
        ClusterTransport::dispatch_frame(&line, "server-b", &table);
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn frames_addressed_elsewhere_are_discarded() {
        let (table, seen) = table_with_probe();
        let envelope = Envelope::direct(
            ClusterMessage::new(Topic::Event, Action::Emit),
            "server-a",
            "server-c",
        );
        let line = serde_json::to_string(&envelope).unwrap();
        ClusterTransport::dispatch_frame(&line, "server-b", &table);
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn matching_frames_reach_subscribers() {
        let (table, seen) = table_with_probe();
        let envelope = Envelope::broadcast(
            ClusterMessage::new(Topic::Event, Action::Emit),
            "server-a",
        );
        let line = serde_json::to_string(&envelope).unwrap();
        ClusterTransport::dispatch_frame(&line, "server-b", &table);
        assert_eq!(*seen.lock(), vec!["server-a".to_string()]);
    }
}
