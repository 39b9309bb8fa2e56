use std::net::SocketAddr;
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::codec::{Framed, LinesCodec};
use tracing::{debug, error, info, warn};

use super::MAX_FRAME_LEN;
use crate::config::RelayConfig;
use crate::error::{Result, StarbusError};
use crate::Lifecycle;

#[derive(Debug, Clone)]
pub struct RelayMetrics {
    pub start_time: SystemTime,
    pub total_connections: u64,
    pub active_members: u32,
    pub forwarded_frames: u64,
    pub dropped_frames: u64,
}

type MemberMap = Arc<DashMap<SocketAddr, mpsc::UnboundedSender<String>>>;

/// The hub of the star topology.
///
/// Members connect over TCP; every line a member writes is forwarded
/// verbatim to every other connected member. The relay never parses an
/// envelope, keeps no per-message state, and does not retry: delivery is
/// at-most-once, in-order per sender.
pub struct Relay {
    config: RelayConfig,
    bound_addr: Arc<RwLock<Option<SocketAddr>>>,
    members: MemberMap,
    metrics: Arc<RwLock<RelayMetrics>>,
    shutdown_tx: Arc<Mutex<Option<mpsc::Sender<()>>>>,
    server_handle: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl Relay {
    pub fn new(config: RelayConfig) -> Self {
        Self {
            config,
            bound_addr: Arc::new(RwLock::new(None)),
            members: Arc::new(DashMap::new()),
            metrics: Arc::new(RwLock::new(RelayMetrics {
                start_time: SystemTime::now(),
                total_connections: 0,
                active_members: 0,
                forwarded_frames: 0,
                dropped_frames: 0,
            })),
            shutdown_tx: Arc::new(Mutex::new(None)),
            server_handle: Arc::new(Mutex::new(None)),
        }
    }

    /// Bind the listener and run the accept loop until [`Relay::stop`].
    /// Once this returns the relay is accepting member connections.
    pub async fn start(&self) -> Result<()> {
        if self.server_handle.lock().await.is_some() {
            return Err(StarbusError::relay("Relay is already running"));
        }

        let listener = TcpListener::bind(&self.config.bind_addr).await.map_err(|e| {
            StarbusError::relay(format!("Failed to bind {}: {}", self.config.bind_addr, e))
        })?;
        let addr = listener
            .local_addr()
            .map_err(|e| StarbusError::relay(format!("Failed to get local address: {}", e)))?;
        *self.bound_addr.write().await = Some(addr);

        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
        *self.shutdown_tx.lock().await = Some(shutdown_tx);

        let members = self.members.clone();
        let metrics = self.metrics.clone();
        let max_members = self.config.max_members;

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    accept_result = listener.accept() => {
                        match accept_result {
                            Ok((stream, peer)) => {
                                if members.len() as u32 >= max_members {
                                    warn!("member limit ({}) reached, rejecting {}", max_members, peer);
                                    continue;
                                }
                                metrics.write().await.total_connections += 1;

                                let members = members.clone();
                                let metrics = metrics.clone();
                                tokio::spawn(async move {
                                    Self::handle_member(stream, peer, members, metrics).await;
                                });
                            }
                            Err(e) => {
                                error!("accept error: {}", e);
                            }
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        debug!("relay received shutdown signal");
                        break;
                    }
                }
            }
            // Dropping the outbound queues winds down the member writer tasks.
            members.clear();
        });

        *self.server_handle.lock().await = Some(handle);
        info!("relay listening on {}", addr);
        Ok(())
    }

    async fn handle_member(
        stream: TcpStream,
        peer: SocketAddr,
        members: MemberMap,
        metrics: Arc<RwLock<RelayMetrics>>,
    ) {
        debug!("member connected from {}", peer);
        let framed = Framed::new(stream, LinesCodec::new_with_max_length(MAX_FRAME_LEN));
        let (mut sink, mut lines) = framed.split();

        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();
        members.insert(peer, outbound_tx);
        metrics.write().await.active_members = members.len() as u32;

        let writer = tokio::spawn(async move {
            while let Some(line) = outbound_rx.recv().await {
                if let Err(e) = sink.send(line).await {
                    debug!("write to {} failed: {}", peer, e);
                    break;
                }
            }
        });

        while let Some(frame) = lines.next().await {
            match frame {
                Ok(line) => {
                    let mut forwarded = 0u64;
                    for entry in members.iter() {
                        if *entry.key() == peer {
                            continue;
                        }
                        if entry.value().send(line.clone()).is_ok() {
                            forwarded += 1;
                        }
                    }
                    metrics.write().await.forwarded_frames += forwarded;
                }
                Err(e) => {
                    // An oversized frame means the member stream cannot be
                    // trusted to stay aligned; drop the member.
                    warn!("dropping frame from {}: {}", peer, e);
                    metrics.write().await.dropped_frames += 1;
                    break;
                }
            }
        }

        members.remove(&peer);
        metrics.write().await.active_members = members.len() as u32;
        // Frames still queued for this member are dropped with the writer:
        // at-most-once, best-effort.
        writer.abort();
        debug!("member {} disconnected", peer);
    }

    /// Signal shutdown and wait for the accept loop to finish.
    pub async fn stop(&self) -> Result<()> {
        let handle = self
            .server_handle
            .lock()
            .await
            .take()
            .ok_or_else(|| StarbusError::relay("Relay is not running"))?;

        if let Some(tx) = self.shutdown_tx.lock().await.take() {
            let _ = tx.send(()).await;
        }

        match tokio::time::timeout(self.config.shutdown_timeout(), handle).await {
            Ok(Err(e)) => error!("relay task failed: {}", e),
            Err(_) => error!("relay task did not stop within timeout"),
            Ok(Ok(())) => {}
        }

        *self.bound_addr.write().await = None;
        info!("relay stopped");
        Ok(())
    }

    /// Address the listener is bound to, once running. With a `:0` bind this
    /// is where members must connect.
    pub async fn bound_addr(&self) -> Option<SocketAddr> {
        *self.bound_addr.read().await
    }

    pub async fn metrics(&self) -> RelayMetrics {
        self.metrics.read().await.clone()
    }
}

#[async_trait]
impl Lifecycle for Relay {
    async fn when_ready(&self) -> Result<()> {
        if self.bound_addr.read().await.is_some() {
            Ok(())
        } else {
            Err(StarbusError::relay("Relay is not running"))
        }
    }

    async fn close(&self) -> Result<()> {
        self.stop().await
    }
}
