use crate::client::RpcClient;
use crate::error::RemoteError;
use crate::types::AttributeEncoding;
use async_stream::stream;
use cutover_core::shutdown::{self, ShutdownReceiver, ShutdownSender};
use cutover_core::{BlockHeader, ChainEvent, TxEvent, UPGRADE_ACTION};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_stream::{Stream, StreamExt};

#[derive(Debug, Clone)]
pub struct ListenerConfig {
    pub rpc_addr: String,
    pub poll_interval: Duration,
    pub encoding: AttributeEncoding,
    /// Capacity of each of the two output queues.
    pub capacity: usize,
    /// Only transactions carrying this attribute key are forwarded. `None`
    /// forwards every transaction.
    pub tx_filter: Option<String>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            rpc_addr: "tcp://127.0.0.1:26657".to_string(),
            poll_interval: Duration::from_secs(5),
            encoding: AttributeEncoding::Plain,
            capacity: 64,
            tx_filter: Some(UPGRADE_ACTION.to_string()),
        }
    }
}

impl ListenerConfig {
    fn forwards(&self, tx: &TxEvent) -> bool {
        match &self.tx_filter {
            Some(key) => tx.attributes.contains_key(key),
            None => true,
        }
    }
}

/// The two ordered queues fed by an [`EventListener`].
#[derive(Debug)]
pub struct EventStreams {
    pub transactions: mpsc::Receiver<TxEvent>,
    pub headers: mpsc::Receiver<BlockHeader>,
}

/// Background task routing chain events into [`EventStreams`].
///
/// The task ends on shared shutdown, on [`EventListener::stop`], or when the
/// listener handle is dropped.
#[derive(Debug)]
pub struct EventListener {
    stop: ShutdownSender,
    task: JoinHandle<()>,
}

impl EventListener {
    /// Polls the node at `config.rpc_addr`, starting after the height that is
    /// current when the first poll succeeds.
    pub fn spawn(
        config: ListenerConfig,
        shutdown: ShutdownReceiver,
    ) -> Result<(Self, EventStreams), RemoteError> {
        let client = RpcClient::new(&config.rpc_addr)?;
        tracing::info!(
            rpc = %client.base_url(),
            interval = ?config.poll_interval,
            encoding = %config.encoding,
            "Starting event listener"
        );
        let capacity = config.capacity;
        Ok(Self::from_stream(poll_chain(client, config), capacity, shutdown))
    }

    /// Routes an arbitrary event source. Useful for replaying recorded events.
    pub fn from_stream<S>(events: S, capacity: usize, shutdown: ShutdownReceiver) -> (Self, EventStreams)
    where
        S: Stream<Item = ChainEvent> + Send + 'static,
    {
        let (tx_sender, transactions) = mpsc::channel(capacity.max(1));
        let (header_sender, headers) = mpsc::channel(capacity.max(1));
        let (stop, stop_rx) = shutdown::channel();

        let task = tokio::spawn(route(events, tx_sender, header_sender, shutdown, stop_rx));

        (
            Self { stop, task },
            EventStreams {
                transactions,
                headers,
            },
        )
    }

    /// Unsubscribes and waits for the polling task to release its connection.
    pub async fn stop(self) {
        let _ = self.stop.send(true);
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "Event listener task failed");
        }
    }
}

fn poll_chain(client: RpcClient, config: ListenerConfig) -> impl Stream<Item = ChainEvent> {
    stream! {
        let mut ticker = tokio::time::interval(config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut next: Option<u64> = None;

        loop {
            ticker.tick().await;

            let latest = match client.latest_height().await {
                Ok(height) => height,
                Err(e) => {
                    tracing::warn!(error = %e, "Cannot fetch latest height, retrying");
                    continue;
                }
            };

            let Some(mut height) = next else {
                tracing::info!(height = latest, "Subscribed to chain events");
                next = Some(latest.saturating_add(1));
                continue;
            };

            while height <= latest {
                let txs = match client.block_events(height, config.encoding).await {
                    Ok(txs) => txs,
                    Err(e) => {
                        tracing::warn!(height, error = %e, "Cannot fetch block results, retrying");
                        break;
                    }
                };

                for tx in txs {
                    if config.forwards(&tx) {
                        yield ChainEvent::Transaction(tx);
                    }
                }
                yield ChainEvent::Header(BlockHeader { height });

                height += 1;
                next = Some(height);
            }
        }
    }
}

async fn route<S>(
    events: S,
    transactions: mpsc::Sender<TxEvent>,
    headers: mpsc::Sender<BlockHeader>,
    mut shutdown: ShutdownReceiver,
    mut stop: ShutdownReceiver,
) where
    S: Stream<Item = ChainEvent>,
{
    tokio::pin!(events);

    loop {
        let next = tokio::select! {
            _ = shutdown::requested(&mut shutdown) => break,
            _ = shutdown::requested(&mut stop) => break,
            next = events.next() => next,
        };
        let Some(event) = next else {
            tracing::debug!("Chain event source ended");
            break;
        };

        let delivered = tokio::select! {
            _ = shutdown::requested(&mut shutdown) => break,
            _ = shutdown::requested(&mut stop) => break,
            delivered = deliver(event, &transactions, &headers) => delivered,
        };
        if !delivered {
            tracing::debug!("Event consumer went away");
            break;
        }
    }

    tracing::info!("Event listener stopped");
}

async fn deliver(
    event: ChainEvent,
    transactions: &mpsc::Sender<TxEvent>,
    headers: &mpsc::Sender<BlockHeader>,
) -> bool {
    match event {
        ChainEvent::Transaction(tx) => transactions.send(tx).await.is_ok(),
        ChainEvent::Header(header) => {
            tracing::debug!(height = header.height, "New block header");
            headers.send(header).await.is_ok()
        }
    }
}
