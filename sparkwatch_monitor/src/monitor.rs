//! Per-application monitor worker.
//!
//! One worker is spawned per submitted application. It resolves the
//! submission tag to a driver pod under a deadline, provisions the Spark UI
//! ingress, then polls the cluster and surfaces state transitions to the
//! listener until a terminal state is reached or the monitor is killed.

use ::std::future::Future;
use ::std::sync::atomic::{AtomicBool, Ordering};
use ::std::sync::{Arc, Mutex};

use ::sparkwatch_common::{
    anyhow::anyhow,
    application::{AppInfo, ApplicationState, ApplicationTag, SparkApplication},
    error::{Result, SparkwatchError},
    tracing::{debug, info, warn},
};
use ::tokio::sync::watch;
use ::tokio::task::JoinHandle;
use ::tokio::time::{sleep, timeout, Instant};
use ::tokio_util::sync::CancellationToken;

use crate::cluster::ClusterClient;
use crate::config::MonitorConfig;
use crate::reaper::LeakedAppsRegistry;
use crate::retry::retry;
use crate::submission::{ApplicationListener, DriverProcess};

/// Handle to one monitored application.
pub struct AppMonitor<C: ClusterClient> {
    tag: ApplicationTag,
    client: Arc<C>,
    config: Arc<MonitorConfig>,
    shared: Arc<MonitorShared>,
    resolved: watch::Receiver<Option<SparkApplication>>,
    cancel: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl<C: ClusterClient> AppMonitor<C> {
    /// Spawn the monitor worker for one submission.
    pub fn spawn(
        client: Arc<C>,
        leaked: Arc<LeakedAppsRegistry>,
        config: Arc<MonitorConfig>,
        tag: ApplicationTag,
        app_id: Option<String>,
        process: Option<Box<dyn DriverProcess>>,
        listener: Option<Box<dyn ApplicationListener>>,
    ) -> Self {
        let shared = Arc::new(MonitorShared {
            state: Mutex::new(ApplicationState::Starting),
            app_log: Mutex::new(Vec::new()),
            diagnostics: Mutex::new(Vec::new()),
            last_info: Mutex::new(AppInfo::default()),
            process,
            process_destroyed: AtomicBool::new(false),
            listener,
        });
        let (resolved_tx, resolved_rx) = watch::channel(None);
        let cancel = CancellationToken::new();
        let worker = MonitorWorker {
            tag: tag.clone(),
            app_id,
            client: client.clone(),
            leaked,
            config: config.clone(),
            shared: shared.clone(),
            cancel: cancel.clone(),
        };
        let handle = tokio::spawn(worker.run(resolved_tx));
        Self {
            tag,
            client,
            config,
            shared,
            resolved: resolved_rx,
            cancel,
            handle: Mutex::new(Some(handle)),
        }
    }

    pub fn tag(&self) -> &ApplicationTag {
        &self.tag
    }

    /// Current state of the monitored application.
    pub fn state(&self) -> ApplicationState {
        self.shared.state()
    }

    /// Aggregated driver log, child process output and cluster diagnostics.
    pub fn log(&self) -> Vec<String> {
        let mut lines = Vec::new();
        lines.push("stdout:".to_owned());
        lines.extend(self.shared.app_log.lock().unwrap().iter().cloned());
        lines.push("\nstderr:".to_owned());
        if let Some(process) = &self.shared.process {
            lines.extend(process.input_lines());
            lines.extend(process.error_lines());
        }
        lines.push("\nKubernetes Diagnostics:".to_owned());
        lines.extend(self.shared.diagnostics.lock().unwrap().iter().cloned());
        lines
    }

    /// Wait for the monitor worker to exit.
    pub async fn wait(&self) {
        let handle = self.handle.lock().unwrap().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("Monitor worker of {} panicked: {}", self.tag, e);
            }
        }
    }

    /// Kill the monitored application and stop the worker.
    ///
    /// Waits for tag resolution up to the lookup timeout and deletes the
    /// driver pod when an application was resolved. Timeouts while waiting
    /// are swallowed with a warning; the worker is cancelled and the child
    /// process handle destroyed either way.
    pub async fn kill(&self) {
        let mut resolved = self.resolved.clone();
        let waited = timeout(
            self.config.app_lookup_timeout(),
            resolved.wait_for(|app| app.is_some()),
        )
        .await;
        let app = match waited {
            Ok(Ok(app)) => (*app).clone(),
            Ok(Err(_)) | Err(_) => {
                warn!(
                    "Application {} was not resolved before the kill deadline, interrupting its monitor",
                    self.tag
                );
                None
            }
        };
        if let Some(app) = app {
            if let Err(e) = retry(|| self.client.kill_application(&app)).await {
                warn!("Failed to kill application {}: {}", self.tag, e);
            }
        }
        self.cancel.cancel();
        self.shared.destroy_process();
        self.wait().await;
    }
}

/// State shared between the worker and the monitor handle.
struct MonitorShared {
    state: Mutex<ApplicationState>,
    app_log: Mutex<Vec<String>>,
    diagnostics: Mutex<Vec<String>>,
    last_info: Mutex<AppInfo>,
    process: Option<Box<dyn DriverProcess>>,
    process_destroyed: AtomicBool,
    listener: Option<Box<dyn ApplicationListener>>,
}

impl MonitorShared {
    fn state(&self) -> ApplicationState {
        *self.state.lock().unwrap()
    }

    /// Move to `new` and notify the listener. Self-transitions are silent
    /// and terminal states are never left.
    fn transition(&self, new: ApplicationState) {
        let old = {
            let mut state = self.state.lock().unwrap();
            let old = *state;
            if old == new || old.is_terminal() {
                return;
            }
            *state = new;
            old
        };
        debug!("Application state changed from {} to {}", old, new);
        if let Some(listener) = &self.listener {
            listener.state_changed(old, new);
        }
    }

    /// Push `info` to the listener unless it equals the last emission.
    fn emit_info(&self, info: AppInfo) {
        {
            let mut last = self.last_info.lock().unwrap();
            if *last == info {
                return;
            }
            *last = info.clone();
        }
        if let Some(listener) = &self.listener {
            listener.info_changed(info);
        }
    }

    fn last_info(&self) -> AppInfo {
        self.last_info.lock().unwrap().clone()
    }

    fn set_app_log(&self, lines: Vec<String>) {
        *self.app_log.lock().unwrap() = lines;
    }

    fn set_diagnostics(&self, lines: Vec<String>) {
        *self.diagnostics.lock().unwrap() = lines;
    }

    /// Destroy the child process handle. Whichever of the worker cleanup and
    /// the kill path runs first wins; the handle is destroyed exactly once.
    fn destroy_process(&self) {
        if let Some(process) = &self.process {
            if !self.process_destroyed.swap(true, Ordering::SeqCst) {
                process.destroy();
            }
        }
    }
}

struct MonitorWorker<C: ClusterClient> {
    tag: ApplicationTag,
    app_id: Option<String>,
    client: Arc<C>,
    leaked: Arc<LeakedAppsRegistry>,
    config: Arc<MonitorConfig>,
    shared: Arc<MonitorShared>,
    cancel: CancellationToken,
}

impl<C: ClusterClient> MonitorWorker<C> {
    async fn run(self, resolved_tx: watch::Sender<Option<SparkApplication>>) {
        let mut app_id = self.app_id.clone();
        match self.watch_application(&resolved_tx, &mut app_id).await {
            Ok(()) => {}
            Err(e) if e.is_cancelled() => {
                info!("Monitoring of application {} was stopped by the user", self.tag);
                self.shared
                    .set_diagnostics(vec!["Application stopped by user.".to_owned()]);
                self.shared.transition(ApplicationState::Killed);
            }
            Err(e) => {
                warn!("Monitoring of application {} failed: {}", self.tag, e);
                self.shared.set_diagnostics(vec![e.to_string()]);
                self.shared.transition(ApplicationState::Failed);
            }
        }
        // cleanup runs regardless of how the loop ended
        self.shared.destroy_process();
        if let Some(base) = &self.config.ui_history_server_url {
            let mut info = self.shared.last_info();
            info.spark_ui_url = Some(format!(
                "{}/history/{}",
                base,
                app_id.as_deref().unwrap_or("unknown")
            ));
            self.shared.emit_info(info);
        }
    }

    async fn watch_application(
        &self,
        resolved_tx: &watch::Sender<Option<SparkApplication>>,
        app_id: &mut Option<String>,
    ) -> Result<()> {
        let app = self.resolve_application().await?;
        *app_id = Some(app.app_id().to_owned());
        let _ = resolved_tx.send(Some(app.clone()));
        info!(
            "Application {} resolved to driver pod {} in namespace {}",
            self.tag,
            app.driver_pod_name(),
            app.namespace()
        );
        if let Some(listener) = &self.shared.listener {
            listener.app_id_known(app.app_id());
        }

        // provisioned at most once per application; a failure here is fatal
        if self.config.ingress.create {
            self.cancellable(retry(|| self.client.create_spark_ui_ingress(&app)))
                .await?;
        }

        loop {
            let report = self
                .cancellable(retry(|| {
                    self.client.get_report(&app, self.config.spark_logs_cache_size)
                }))
                .await?;
            self.shared.set_app_log(report.log().to_vec());
            self.shared.set_diagnostics(report.diagnostics());
            let state = ApplicationState::from_pod_phase(&report.state(), self.tag.as_str());
            self.shared.transition(state);
            self.shared.emit_info(AppInfo {
                driver_log_url: report.driver_log_url(),
                tracking_url: report.tracking_url(),
                executors_log_urls: report.executors_log_urls(),
                spark_ui_url: None,
            });
            if self.shared.state().is_terminal() {
                return Ok(());
            }
            self.idle().await?;
        }
    }

    /// Find the driver pod carrying this monitor's tag. The deadline is
    /// computed once at worker start and is an exclusive upper bound.
    async fn resolve_application(&self) -> Result<SparkApplication> {
        let deadline = Instant::now() + self.config.app_lookup_timeout();
        loop {
            // reaching the deadline fails, even if a pod would be found now
            if Instant::now() >= deadline {
                self.shared.destroy_process();
                self.leaked.record(self.tag.clone());
                return Err(SparkwatchError::not_found(anyhow!(
                    "Application {} was not found in the cluster within {:?}. \
                     Either the submission failed, or the cluster has no capacity to start the driver.",
                    self.tag,
                    self.config.app_lookup_timeout()
                )));
            }
            let apps = self
                .cancellable(retry(|| self.client.list_applications()))
                .await?;
            // first match wins; duplicate tags are a user error but not fatal
            if let Some(app) = apps
                .into_iter()
                .find(|app| app.tag() == self.tag.as_str())
            {
                return Ok(app);
            }
            self.idle().await?;
        }
    }

    /// Run a cluster call, giving cancellation priority over its result.
    async fn cancellable<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(self.cancelled_error()),
            result = fut => result,
        }
    }

    /// Sleep one poll interval, waking early on cancellation.
    async fn idle(&self) -> Result<()> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(self.cancelled_error()),
            _ = sleep(self.config.poll_interval()) => Ok(()),
        }
    }

    fn cancelled_error(&self) -> SparkwatchError {
        SparkwatchError::cancelled(anyhow!(
            "Monitoring of application {} was cancelled.",
            self.tag
        ))
    }
}
