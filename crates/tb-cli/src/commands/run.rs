//! Benchmark run

use std::net::{Ipv6Addr, SocketAddr};
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::output::{format_report, print_error, print_success, print_warning};
use tb_core::config::BenchConfig;
use tb_core::traits::{ExchangeProbe, PollRecorder, Tunnel};
use tb_core::{BackendKind, HostDirectory, Role};
use tb_orchestrator::{HttpInitiatorProbe, HttpResponderProbe, Orchestrator, RunError, RunReport};
use tb_telemetry::{JsonFileSink, SysinfoSource, Telemetry, TelemetryOptions};
use tb_tunnel::TunnelController;

/// Run `rounds` benchmark rounds for `role` over `backend`
pub async fn run_command(config: &BenchConfig, role: Role, backend: BackendKind, rounds: u32) -> Result<RunReport> {
    // Configuration problems surface before anything is started
    let hosts = HostDirectory::load(&config.hosts_path)
        .with_context(|| format!("Failed to read hosts file {:?}", config.hosts_path))?;
    hosts.validate().context("Host directory is incomplete")?;
    let port = hosts.responder_port()?;
    let responder_address = hosts.lookup(Role::Responder)?.address.clone();

    let tunnel = TunnelController::from_hosts(backend, role, &hosts, config.tunnel.clone())?;

    let sink = Arc::new(JsonFileSink::for_session(
        &config.telemetry.data_dir,
        role,
        backend,
        chrono::Local::now(),
    ));
    let telemetry = Arc::new(Telemetry::start(
        Arc::new(SysinfoSource::new()),
        sink.clone(),
        TelemetryOptions::from(&config.telemetry),
    ));
    let recorder: Arc<dyn PollRecorder> = telemetry.clone();

    let outcome = match role {
        Role::Initiator => {
            let target = tunnel.backend_spec().probe_target(&responder_address);
            let probe = HttpInitiatorProbe::new(target.host, target.scope, port, config.probe.timeout);
            drive(Orchestrator::new(role, tunnel, probe, recorder, config.retry.clone()), rounds).await
        }
        Role::Responder => {
            let bind = SocketAddr::from((Ipv6Addr::UNSPECIFIED, port));
            match HttpResponderProbe::bind(bind, config.probe.accept_timeout).await {
                Ok(probe) => {
                    drive(Orchestrator::new(role, tunnel, probe, recorder, config.retry.clone()), rounds).await
                }
                Err(e) => Err(anyhow::anyhow!("Failed to listen on {}: {}", bind, e)),
            }
        }
    };

    match telemetry.stop().await {
        Ok(count) => tracing::info!("{} poll records saved to {:?}", count, sink.path()),
        Err(e) => print_warning(&format!("Telemetry was not saved: {}", e)),
    }

    let report = outcome?;
    print_success(&format!("Completed {} round(s) over {}", report.rounds_completed, backend));
    println!("{}", format_report(&report));
    Ok(report)
}

/// Run the rounds, closing the tunnel if interrupted
async fn drive<T: Tunnel, P: ExchangeProbe>(mut orchestrator: Orchestrator<T, P>, rounds: u32) -> Result<RunReport> {
    let result = tokio::select! {
        result = orchestrator.run(rounds) => Some(result),
        _ = tokio::signal::ctrl_c() => None,
    };

    match result {
        Some(Ok(report)) => Ok(report),
        Some(Err(e)) => {
            report_failure(&e);
            Err(e.into())
        }
        None => {
            print_warning("Interrupted, closing the tunnel");
            let (mut tunnel, _probe) = orchestrator.into_parts();
            tunnel.close().await;
            anyhow::bail!("Interrupted")
        }
    }
}

fn report_failure(error: &RunError) {
    print_error(&error.to_string());
    println!("{}", format_report(&error.report));
}
