//! Background worker driving the runner one request at a time.
//!
//! The worker thread owns a current-thread tokio runtime and the
//! [`Supervisor`]; nothing else ever touches either. Each request produces
//! exactly one response, synthesized locally when the runner cannot be
//! reached or misbehaves.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::config::{IntentSettings, RunnerConfig, SharedSettings};
use crate::models::{Request, Response};
use crate::queue::RequestQueue;
use crate::runner::{Launcher, Supervisor};
use crate::IntentError;

/// Name given to the worker thread.
pub const WORKER_THREAD_NAME: &str = "intent-worker";

/// Spawn the worker thread.
///
/// The thread runs until [`RequestQueue::request_stop`] is called, then
/// shuts the runner down gracefully and exits.
///
/// # Errors
///
/// Returns the OS error if the thread cannot be created.
pub fn spawn_worker<L>(
    queue: Arc<RequestQueue>,
    settings: SharedSettings,
    launcher: L,
) -> std::io::Result<JoinHandle<()>>
where
    L: Launcher + 'static,
{
    thread::Builder::new()
        .name(WORKER_THREAD_NAME.into())
        .spawn(move || run_worker(&queue, &settings, launcher))
}

fn run_worker<L: Launcher>(queue: &RequestQueue, settings: &SharedSettings, launcher: L) {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            error!(%err, "failed to build worker runtime");
            let failure = IntentError::Process(format!("worker runtime unavailable: {err}"));
            while let Some(request) = queue.next_request() {
                queue.push_response(Response::failure(&request, &failure));
            }
            return;
        }
    };

    info!("intent worker started");
    let mut supervisor = Supervisor::new(launcher);

    while let Some(request) = queue.next_request() {
        let snapshot = settings.snapshot();
        let response = runtime.block_on(handle_request(&mut supervisor, &snapshot, &request));
        queue.push_response(response);
    }

    runtime.block_on(supervisor.shutdown());
    info!("intent worker stopped");
}

/// Run one request through the supervisor and always produce a response.
///
/// An exchange failure that leaves the runner in an unknown state terminates
/// it, so the next request starts from a fresh process.
pub async fn handle_request<L: Launcher>(
    supervisor: &mut Supervisor<L>,
    settings: &IntentSettings,
    request: &Request,
) -> Response {
    let span = info_span!(
        "intent_exchange",
        request_id = %request.id,
        subject = %request.subject.id
    );

    async {
        supervisor.set_cold_start_grace(settings.cold_start_grace());
        let config = RunnerConfig::resolve(settings);

        if let Err(err) = supervisor.ensure_running(&config).await {
            warn!(%err, "runner unavailable");
            return Response::failure(request, &err);
        }

        match supervisor.send_request(request, settings.timeout()).await {
            Ok(response) => {
                debug!(ok = response.ok, "runner answered");
                response
            }
            Err(err) => {
                warn!(%err, "runner exchange failed");
                if err.poisons_runner() {
                    supervisor.terminate().await;
                }
                Response::failure(request, &err)
            }
        }
    }
    .instrument(span)
    .await
}
