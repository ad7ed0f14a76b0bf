use crate::error::UpgradeError;
use crate::state::{Completion, CoordinatorState};
use cutover_acquire::Acquire;
use cutover_core::shutdown::{self, ShutdownReceiver};
use cutover_core::{BlockHeader, Config, Layout, TxEvent, UpgradeInfo, check_binary};
use cutover_supervisor::Supervisor;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Correlates upgrade announcements with block heights and performs the
/// kill, switch, relaunch sequence when an upgrade becomes active.
pub struct Coordinator<S, A> {
    layout: Layout,
    allow_download: bool,
    restart_after_upgrade: bool,
    args: Vec<String>,
    supervisor: Arc<S>,
    acquirer: Arc<A>,
}

/// Outputs of a running coordinator.
#[derive(Debug)]
pub struct CoordinatorHandle {
    pub completions: mpsc::UnboundedReceiver<Completion>,
    pub errors: mpsc::UnboundedReceiver<UpgradeError>,
    pub state: watch::Receiver<CoordinatorState>,
    upgrades: JoinHandle<()>,
    heights: JoinHandle<Result<(), UpgradeError>>,
}

impl CoordinatorHandle {
    /// Waits for both watchers. Only returns once shutdown was requested or
    /// the input queues closed. The error is the failure to stop the node.
    pub async fn join(self) -> Result<(), UpgradeError> {
        let Self {
            upgrades, heights, ..
        } = self;
        upgrades.await?;
        heights.await?
    }
}

enum Wake {
    Shutdown,
    Upgrade(Option<UpgradeInfo>),
    Header(Option<BlockHeader>),
}

impl<S, A> Coordinator<S, A>
where
    S: Supervisor + 'static,
    S::Handle: 'static,
    A: Acquire + 'static,
{
    pub fn new(cfg: &Config, args: Vec<String>, supervisor: Arc<S>, acquirer: Arc<A>) -> Self {
        Self {
            layout: Layout::new(cfg),
            allow_download: cfg.allow_download,
            restart_after_upgrade: cfg.restart_after_upgrade,
            args,
            supervisor,
            acquirer,
        }
    }

    /// Starts the upgrade watcher and the height watcher. The height watcher
    /// takes ownership of `child`, the node started before the coordinator.
    pub fn spawn(
        self,
        child: S::Handle,
        transactions: mpsc::Receiver<TxEvent>,
        headers: mpsc::Receiver<BlockHeader>,
        shutdown: ShutdownReceiver,
    ) -> CoordinatorHandle {
        let this = Arc::new(self);
        let (handoff_tx, handoff_rx) = mpsc::channel(1);
        let (completion_tx, completions) = mpsc::unbounded_channel();
        let (error_tx, errors) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(CoordinatorState::Idle);

        let upgrades = tokio::spawn(Arc::clone(&this).watch_upgrades(
            transactions,
            handoff_tx,
            error_tx.clone(),
            shutdown.clone(),
        ));
        let heights = tokio::spawn(this.watch_heights(
            Some(child),
            headers,
            handoff_rx,
            completion_tx,
            error_tx,
            state_tx,
            shutdown,
        ));

        CoordinatorHandle {
            completions,
            errors,
            state,
            upgrades,
            heights,
        }
    }

    async fn watch_upgrades(
        self: Arc<Self>,
        mut transactions: mpsc::Receiver<TxEvent>,
        handoff: mpsc::Sender<UpgradeInfo>,
        errors: mpsc::UnboundedSender<UpgradeError>,
        mut shutdown: ShutdownReceiver,
    ) {
        loop {
            let event = tokio::select! {
                _ = shutdown::requested(&mut shutdown) => break,
                event = transactions.recv() => event,
            };
            let Some(event) = event else {
                tracing::debug!("Transaction queue closed");
                break;
            };
            let Some(payload) = event.upgrade_payload() else {
                continue;
            };

            let upgrade = match UpgradeInfo::parse(payload) {
                Ok(upgrade) => upgrade,
                Err(e) => {
                    tracing::warn!(payload = %payload, error = %e, "Ignoring malformed upgrade announcement");
                    let _ = errors.send(e.into());
                    continue;
                }
            };
            tracing::info!(upgrade = %upgrade.name, height = upgrade.height, version = %upgrade.version, "Upgrade announced");

            let prepared = tokio::select! {
                _ = shutdown::requested(&mut shutdown) => break,
                prepared = self.prepare(&upgrade) => prepared,
            };
            if let Err(e) = prepared {
                let handed_off = matches!(e, UpgradeError::BinaryMissing { .. });
                tracing::error!(upgrade = %upgrade.name, error = %e, "Upgrade binary unavailable");
                let _ = errors.send(e);
                if !handed_off {
                    continue;
                }
            }

            tokio::select! {
                _ = shutdown::requested(&mut shutdown) => break,
                sent = handoff.send(upgrade) => {
                    if sent.is_err() {
                        break;
                    }
                }
            }
        }
        tracing::debug!("Upgrade watcher stopped");
    }

    /// Makes sure the upgrade binary is installed, downloading it when
    /// allowed.
    async fn prepare(&self, upgrade: &UpgradeInfo) -> Result<(), UpgradeError> {
        let bin = self.layout.upgrade_bin(&upgrade.name);
        let Err(source) = check_binary(&bin) else {
            return Ok(());
        };

        if !self.allow_download {
            return Err(UpgradeError::BinaryMissing {
                name: upgrade.name.clone(),
                source,
            });
        }

        tracing::info!(upgrade = %upgrade.name, binary = ?bin, "Upgrade binary missing, acquiring");
        self.acquirer
            .acquire(upgrade)
            .await
            .map_err(|source| UpgradeError::Acquire {
                name: upgrade.name.clone(),
                source,
            })
    }

    #[allow(clippy::too_many_arguments)]
    async fn watch_heights(
        self: Arc<Self>,
        mut child: Option<S::Handle>,
        mut headers: mpsc::Receiver<BlockHeader>,
        mut handoff: mpsc::Receiver<UpgradeInfo>,
        completions: mpsc::UnboundedSender<Completion>,
        errors: mpsc::UnboundedSender<UpgradeError>,
        state: watch::Sender<CoordinatorState>,
        mut shutdown: ShutdownReceiver,
    ) -> Result<(), UpgradeError> {
        let mut pending: Option<UpgradeInfo> = None;
        let mut last_seen: Option<u64> = None;
        let mut handoff_open = true;
        let mut headers_open = true;

        loop {
            let wake = tokio::select! {
                _ = shutdown::requested(&mut shutdown) => Wake::Shutdown,
                upgrade = handoff.recv(), if handoff_open && pending.is_none() => Wake::Upgrade(upgrade),
                header = headers.recv(), if headers_open => Wake::Header(header),
            };

            let height = match wake {
                Wake::Shutdown => break,
                Wake::Upgrade(None) => {
                    handoff_open = false;
                    continue;
                }
                Wake::Upgrade(Some(upgrade)) => {
                    tracing::info!(upgrade = %upgrade.name, height = upgrade.height, "Awaiting activation height");
                    state.send_replace(CoordinatorState::AwaitingHeight {
                        name: upgrade.name.clone(),
                        height: upgrade.height,
                    });
                    let target = upgrade.height;
                    pending = Some(upgrade);
                    match last_seen {
                        Some(seen) if seen == target => seen,
                        _ => continue,
                    }
                }
                Wake::Header(None) => {
                    tracing::warn!("Header queue closed, no further upgrades can activate");
                    headers_open = false;
                    continue;
                }
                Wake::Header(Some(header)) => {
                    last_seen = Some(header.height);
                    header.height
                }
            };

            let Some(upgrade) = pending.take_if(|u| u.height == height) else {
                continue;
            };

            state.send_replace(CoordinatorState::Swapping {
                name: upgrade.name.clone(),
            });
            match self.swap(&upgrade, &mut child).await {
                Ok(relaunched) => {
                    tracing::info!(upgrade = %upgrade.name, height = upgrade.height, relaunched, "Upgrade applied");
                    let _ = completions.send(Completion {
                        name: upgrade.name,
                        height: upgrade.height,
                        relaunched,
                    });
                }
                Err(e) => {
                    tracing::error!(upgrade = %upgrade.name, error = %e, "Upgrade failed");
                    let _ = errors.send(e);
                }
            }
            last_seen = None;
            state.send_replace(CoordinatorState::Idle);
        }

        tracing::debug!("Height watcher stopped");
        if let Some(mut running) = child.take() {
            tracing::info!("Stopping node");
            self.supervisor.kill(&mut running).await?;
        }
        Ok(())
    }

    /// Kill, make sure the binary is there, switch, relaunch. Returns whether
    /// the node was relaunched.
    async fn swap(
        &self,
        upgrade: &UpgradeInfo,
        child: &mut Option<S::Handle>,
    ) -> Result<bool, UpgradeError> {
        tracing::info!(upgrade = %upgrade.name, height = upgrade.height, "Activation height reached, stopping node");
        if let Some(running) = child.as_mut() {
            self.supervisor.kill(running).await?;
        }
        *child = None;

        self.prepare(upgrade).await?;

        self.layout
            .set_current_upgrade(&upgrade.name)
            .map_err(|source| UpgradeError::Switch {
                name: upgrade.name.clone(),
                source,
            })?;

        if !self.restart_after_upgrade {
            tracing::info!(upgrade = %upgrade.name, "Restart after upgrade disabled, leaving node stopped");
            return Ok(false);
        }

        *child = Some(self.supervisor.launch(&self.args).await?);
        Ok(true)
    }
}
