//! Request handlers for the daemon

use crate::daemon::server::DaemonState;
use crate::protocol::{Action, Program, Request, Response, StartAction};
use anyhow::Result;
use command_executor::SignalKind;
use supervisor_config::{CommandLine, resolve_alias};
use supervisor_core::ServiceRef;
use tracing::{debug, info, warn};

/// Handle a request from a client
///
/// Failures become error responses; nothing here stops the daemon.
pub async fn handle_request(request: Request, state: &DaemonState) -> Response {
    debug!("Handling request: {:?}", request);

    let action = match request.validate() {
        Ok(action) => action,
        Err(e) => {
            warn!("Rejected request: {}", e);
            return Response::error(e.to_string());
        }
    };

    let result = match action {
        Action::Start(start) => start_service(start, state).await,
        Action::Signal { target, signal } => signal_service(&target, signal, state).await,
        Action::Status(target) => Ok(state.registry.status(&target).await.to_string()),
        Action::Output(target) => state.registry.output(&target).await.map_err(Into::into),
        Action::List => Ok(list_services(state).await),
    };

    match result {
        Ok(message) => Response::success(message),
        Err(e) => {
            warn!("Request failed: {}", e);
            Response::error(e.to_string())
        }
    }
}

async fn start_service(start: StartAction, state: &DaemonState) -> Result<String> {
    let line = match start.program {
        Program::Binary(program) => CommandLine {
            program,
            args: start.args,
        },
        Program::Alias(alias) => resolve_alias(&state.config, &alias)?.with_args(start.args),
    };
    let spec = line
        .into_spec()
        .with_env(start.env)
        .with_working_dir(start.working_dir);

    let id = match start.id {
        Some(id) => {
            state.registry.add(id.clone(), spec).await?;
            id
        }
        None => {
            state
                .registry
                .add_generated(state.config.settings.id_length, spec)
                .await?
        }
    };

    let pid = state.registry.start(&id).await?;
    info!("Started service {} with PID {}", id, pid);
    Ok(format!("Service {} started with pid: {}", id, pid))
}

async fn signal_service(target: &ServiceRef, signal: SignalKind, state: &DaemonState) -> Result<String> {
    let id = state.registry.signal(target, signal).await?;
    if signal.is_stop_class() {
        Ok(format!("Service {} stopped", id))
    } else {
        Ok(format!("Service {} received {}", id, signal))
    }
}

async fn list_services(state: &DaemonState) -> String {
    let services = state.registry.list().await;
    if services.is_empty() {
        return "no services".to_string();
    }

    services
        .iter()
        .map(|s| {
            let pid = s.pid.map_or_else(|| "-".to_string(), |pid| pid.to_string());
            format!("{}\t{}\t{}\t{}", s.id, s.state, pid, s.command)
        })
        .collect::<Vec<_>>()
        .join("\n")
}
