use crate::cli::Cli;
use crate::error::DaemonError;
use crate::signals::Signals;
use cutover_acquire::MirrorAcquirer;
use cutover_coordinator::{Coordinator, CoordinatorHandle};
use cutover_core::{Config, Layout, shutdown};
use cutover_remote::EventListener;
use cutover_supervisor::{ProcessSupervisor, Supervisor};
use std::sync::Arc;

/// Launches the node, then supervises it until a signal, a fatal upgrade
/// error, or an upgrade applied with restart disabled.
pub async fn run(cli: Cli) -> Result<(), DaemonError> {
    let cfg = Config::from_env()?;
    tracing::info!(
        home = ?cfg.home,
        name = %cfg.name,
        allow_download = cfg.allow_download,
        restart_after_upgrade = cfg.restart_after_upgrade,
        "Configuration loaded"
    );

    let layout = Layout::new(&cfg);
    let supervisor = Arc::new(ProcessSupervisor::new(layout.clone()).with_stdio(cli.node_stdio()));
    let acquirer = Arc::new(MirrorAcquirer::new(layout, cli.acquire_config())?);
    let mut signals = Signals::new().map_err(DaemonError::Signal)?;

    let mut child = supervisor.launch(&cli.node_args).await?;

    tracing::info!(delay = ?cli.startup_delay(), "Waiting for the node to come up");
    tokio::select! {
        _ = tokio::time::sleep(cli.startup_delay()) => {}
        signal = signals.recv() => {
            tracing::info!(signal, "Received signal during startup, stopping node");
            supervisor.kill(&mut child).await?;
            return Ok(());
        }
    }

    let (shutdown_tx, shutdown_rx) = shutdown::channel();
    let (listener, streams) = match EventListener::spawn(cli.listener_config(), shutdown_rx.clone()) {
        Ok(spawned) => spawned,
        Err(e) => {
            supervisor.kill(&mut child).await?;
            return Err(e.into());
        }
    };

    let coordinator = Coordinator::new(&cfg, cli.node_args.clone(), supervisor, acquirer);
    let mut handle = coordinator.spawn(child, streams.transactions, streams.headers, shutdown_rx);

    let outcome = control_loop(&mut handle, &mut signals).await;

    let _ = shutdown_tx.send(true);
    listener.stop().await;
    let stopped = handle.join().await;

    outcome?;
    stopped?;
    tracing::info!("Supervisor exited cleanly");
    Ok(())
}

async fn control_loop(
    handle: &mut CoordinatorHandle,
    signals: &mut Signals,
) -> Result<(), DaemonError> {
    loop {
        tokio::select! {
            signal = signals.recv() => {
                tracing::info!(signal, "Received signal, shutting down");
                return Ok(());
            }
            Some(err) = handle.errors.recv() => {
                if err.is_fatal() {
                    tracing::error!(error = %err, "Fatal upgrade error, shutting down");
                    return Err(err.into());
                }
                tracing::warn!(error = %err, "Upgrade announcement ignored");
            }
            Some(done) = handle.completions.recv() => {
                tracing::info!(upgrade = %done.name, height = done.height, "Upgrade complete");
                if !done.relaunched {
                    tracing::info!(upgrade = %done.name, "Node left stopped for an external restart");
                    return Ok(());
                }
            }
            Ok(()) = handle.state.changed() => {
                let state = handle.state.borrow().clone();
                tracing::debug!(state = %state, "Coordinator state changed");
            }
        }
    }
}
