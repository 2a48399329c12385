//! # LogWriter: tracing-backed event renderer
//!
//! A minimal subscriber that renders incoming [`Event`]s through `tracing`.
//! Install a `tracing` subscriber (e.g. `tracing-subscriber`) to see the output.
//!
//! ## Example output
//! ```text
//! INFO  [rebuild] workers=5 components=12
//! INFO  [attached] worker="worker-0" component="cache"
//! ERROR [worker-failed] worker="worker-2" component="parser" reason="bad frame"
//! WARN  [respawned] worker="worker-7" replaced="worker-2" delay_ms=0
//! INFO  [shutdown-requested] cause=SIGTERM
//! ```

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let component = e.component.as_deref().unwrap_or("-");
        let worker = e.worker.as_deref().unwrap_or("-");
        let reason = e.reason.as_deref().unwrap_or("-");

        match e.kind {
            EventKind::ComponentAdded => info!("[added] component={component:?}"),
            EventKind::ComponentRemoved => info!("[removed] component={component:?}"),
            EventKind::RegistryRejected => {
                warn!("[registry-rejected] component={component:?} reason={reason}")
            }
            EventKind::ComponentActivity => {
                info!("[activity] component={component:?} state={reason}")
            }
            EventKind::SettingChanged => {
                info!("[setting] component={component:?} {reason}")
            }
            EventKind::SettingRejected => {
                warn!("[setting-rejected] component={component:?} reason={reason:?}")
            }
            EventKind::UpdateFailed => {
                warn!("[update-failed] component={component:?} reason={reason:?}")
            }
            EventKind::WorkerStarted => debug!("[worker-started] worker={worker:?}"),
            EventKind::WorkerStopped => debug!("[worker-stopped] worker={worker:?}"),
            EventKind::WorkerStopTimedOut => warn!(
                "[stop-timeout] worker={worker:?} timeout_ms={:?}",
                e.duration_ms
            ),
            EventKind::WorkerFailed => error!(
                "[worker-failed] worker={worker:?} component={component:?} reason={reason:?}"
            ),
            EventKind::WorkerRespawned => warn!(
                "[respawned] worker={worker:?} replaced={reason:?} delay_ms={:?}",
                e.delay_ms
            ),
            EventKind::ComponentAttached => {
                info!("[attached] worker={worker:?} component={component:?}")
            }
            EventKind::ComponentDetached => {
                info!("[detached] worker={worker:?} component={component:?}")
            }
            EventKind::ComponentPaused => {
                info!("[paused] worker={worker:?} component={component:?}")
            }
            EventKind::ComponentResumed => {
                info!("[resumed] worker={worker:?} component={component:?}")
            }
            EventKind::ActionCreated => debug!("[action] name={component:?}"),
            EventKind::SubscriptionDeferred => {
                debug!("[subscription-deferred] action={component:?}")
            }
            EventKind::SubscriptionResolved => {
                debug!("[subscription-resolved] action={component:?}")
            }
            EventKind::RebuildCompleted => info!("[rebuild] {reason}"),
            EventKind::ReconcileCompleted => info!("[reconcile] {reason}"),
            EventKind::ShutdownRequested => info!("[shutdown-requested] cause={reason}"),
            EventKind::ShutdownCompleted => info!("[shutdown-completed]"),
            EventKind::SubscriberOverflow => {
                warn!("[subscriber-overflow] subscriber={component:?} reason={reason:?}")
            }
            EventKind::SubscriberPanicked => {
                error!("[subscriber-panicked] subscriber={component} info={reason}")
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
