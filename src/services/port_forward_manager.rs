//! Port-forward manager - owns every forwarding session it starts
//!
//! Each session runs in its own supervisor task that either observes the
//! process exiting on its own or terminates it when the session's token is
//! cancelled. Removing a session from the registry is what hands the
//! termination duty to the caller, so a process is terminated at most once.
//! A forward that finishes starting after its session was stopped is
//! terminated by `start` itself.

use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::{ForwardExit, ForwardSession, ForwardSpec, ForwardStatus, SessionId};
use crate::error::ForwardError;
use crate::infrastructure::{ForwardProcess, Forwarder};

struct Entry {
    session: ForwardSession,
    cancel: CancellationToken,
    task: Option<JoinHandle<Result<(), ForwardError>>>,
}

type Registry = Arc<Mutex<HashMap<SessionId, Entry>>>;

pub struct PortForwardManager {
    forwarder: Arc<dyn Forwarder>,
    sessions: Registry,
    next_id: AtomicU64,
    shutdown: CancellationToken,
    /// Signalled whenever a session ends or leaves the registry
    ended: Arc<Notify>,
}

impl PortForwardManager {
    pub fn new(forwarder: Arc<dyn Forwarder>) -> Self {
        Self {
            forwarder,
            sessions: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
            shutdown: CancellationToken::new(),
            ended: Arc::new(Notify::new()),
        }
    }

    /// Start a background session and return its handle.
    ///
    /// A failed start only affects this session; it is removed from the
    /// registry and the error returned.
    pub async fn start(&self, spec: ForwardSpec) -> Result<SessionId, ForwardError> {
        let id = SessionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let cancel = self.shutdown.child_token();

        self.sessions.lock().insert(
            id,
            Entry {
                session: ForwardSession {
                    id,
                    spec: spec.clone(),
                    status: ForwardStatus::Starting,
                    started_at: Utc::now(),
                    error: None,
                },
                cancel: cancel.clone(),
                task: None,
            },
        );

        // A forward that is already up wins over a concurrent stop, so its
        // process goes through the orphan path below instead of being dropped.
        let started = tokio::select! {
            biased;
            started = self.forwarder.forward(&spec) => started,
            _ = cancel.cancelled() => Err(ForwardError::StoppedWhileStarting { session: id.0 }),
        };

        let process = match started {
            Ok(process) => process,
            Err(e) => {
                warn!("🔌 Forward {} {} failed: {}", id, spec, e);
                self.sessions.lock().remove(&id);
                self.ended.notify_waiters();
                return Err(e);
            }
        };

        let orphan = {
            let mut sessions = self.sessions.lock();
            match sessions.get_mut(&id) {
                Some(entry) => {
                    entry.session.status = ForwardStatus::Active;
                    entry.task = Some(tokio::spawn(supervise(
                        self.sessions.clone(),
                        self.ended.clone(),
                        id,
                        process,
                        cancel,
                    )));
                    None
                }
                // stopped by another task while the forward was starting
                None => Some(process),
            }
        };

        if let Some(mut process) = orphan {
            if let Err(e) = process.terminate().await {
                warn!("Forward {} did not stop cleanly: {}", id, e);
            }
            return Err(ForwardError::StoppedWhileStarting { session: id.0 });
        }

        info!("🔌 Forwarding {} ({})", spec, id);
        Ok(id)
    }

    /// Terminate one session
    pub async fn stop(&self, id: SessionId) -> Result<(), ForwardError> {
        let entry = self
            .sessions
            .lock()
            .remove(&id)
            .ok_or(ForwardError::UnknownSession { session: id.0 })?;
        finish(entry).await
    }

    /// Terminate every session this manager started. Returns how many were
    /// still live.
    pub async fn stop_all(&self) -> usize {
        let entries: Vec<Entry> = self.sessions.lock().drain().map(|(_, e)| e).collect();
        let live = entries
            .iter()
            .filter(|e| e.session.status.is_live())
            .count();

        for entry in entries {
            let id = entry.session.id;
            if let Err(e) = finish(entry).await {
                warn!("Forward {} did not stop cleanly: {}", id, e);
            }
        }

        if live > 0 {
            info!("🔌 Stopped {} port-forward session(s)", live);
        }
        live
    }

    pub fn active_count(&self) -> usize {
        self.sessions
            .lock()
            .values()
            .filter(|e| e.session.status.is_live())
            .count()
    }

    /// Snapshot of all tracked sessions, ordered by handle
    pub fn sessions(&self) -> Vec<ForwardSession> {
        let mut sessions: Vec<ForwardSession> = self
            .sessions
            .lock()
            .values()
            .map(|e| e.session.clone())
            .collect();
        sessions.sort_by_key(|s| s.id);
        sessions
    }

    /// Resolves once no tracked session is live any more
    pub async fn wait_all_exited(&self) {
        loop {
            let ended = self.ended.notified();
            tokio::pin!(ended);
            // registered before the check so a session ending in between is not missed
            ended.as_mut().enable();
            if self.active_count() == 0 {
                return;
            }
            ended.await;
        }
    }
}

impl Drop for PortForwardManager {
    fn drop(&mut self) {
        // Supervisors terminate their processes on cancel
        self.shutdown.cancel();
    }
}

async fn finish(mut entry: Entry) -> Result<(), ForwardError> {
    entry.cancel.cancel();
    match entry.task.take() {
        Some(task) => task.await.map_err(|e| ForwardError::Terminate {
            session: entry.session.id.0,
            message: e.to_string(),
        })?,
        None => Ok(()),
    }
}

async fn supervise(
    sessions: Registry,
    ended: Arc<Notify>,
    id: SessionId,
    mut process: Box<dyn ForwardProcess>,
    cancel: CancellationToken,
) -> Result<(), ForwardError> {
    let exited = tokio::select! {
        _ = cancel.cancelled() => None,
        exit = process.wait() => Some(exit),
    };

    let Some(exit) = exited else {
        debug!("Terminating forward {}", id);
        let terminated = process
            .terminate()
            .await
            .map_err(|message| ForwardError::Terminate {
                session: id.0,
                message,
            });
        ended.notify_waiters();
        return terminated;
    };

    let (status, error) = match exit {
        ForwardExit::Clean => {
            info!("🔌 Forward {} exited", id);
            (ForwardStatus::Stopped, None)
        }
        ForwardExit::Failed(message) => {
            warn!("🔌 Forward {} exited abnormally: {}", id, message);
            (ForwardStatus::Failed, Some(message))
        }
    };
    if let Some(entry) = sessions.lock().get_mut(&id) {
        entry.session.status = status;
        entry.session.error = error;
    }
    ended.notify_waiters();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::StubForwarder;
    use std::time::Duration;

    fn spec(port: u16, service: &str) -> ForwardSpec {
        ForwardSpec::new(port, service, 80, "shop")
    }

    async fn settle(manager: &PortForwardManager, active: usize) {
        for _ in 0..100 {
            if manager.active_count() == active {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {} active sessions", active);
    }

    #[tokio::test]
    async fn test_stop_all_after_one_crashed() {
        let forwarder = Arc::new(StubForwarder::new());
        let manager = PortForwardManager::new(forwarder.clone());

        manager.start(spec(8080, "app")).await.unwrap();
        manager.start(spec(27017, "mongo")).await.unwrap();
        manager.start(spec(9090, "metrics")).await.unwrap();
        assert_eq!(manager.active_count(), 3);

        forwarder.crash("mongo", "lost connection to pod");
        settle(&manager, 2).await;
        let crashed = manager
            .sessions()
            .into_iter()
            .find(|s| s.spec.service == "mongo")
            .unwrap();
        assert_eq!(crashed.status, ForwardStatus::Failed);
        assert_eq!(crashed.error.as_deref(), Some("lost connection to pod"));

        assert_eq!(manager.stop_all().await, 2);
        assert_eq!(manager.active_count(), 0);
        assert!(manager.sessions().is_empty());

        assert_eq!(forwarder.terminations("app"), 1);
        assert_eq!(forwarder.terminations("metrics"), 1);
        assert_eq!(forwarder.terminations("mongo"), 0);

        // nothing left to tear down
        assert_eq!(manager.stop_all().await, 0);
        assert_eq!(forwarder.terminations("app"), 1);
    }

    #[tokio::test]
    async fn test_failed_start_leaves_siblings_running() {
        let forwarder = Arc::new(StubForwarder::new().unreachable("ghost"));
        let manager = PortForwardManager::new(forwarder.clone());

        let app = manager.start(spec(8080, "app")).await.unwrap();
        let err = manager.start(spec(8081, "ghost")).await.unwrap_err();

        assert!(matches!(err, ForwardError::StartFailed { local_port: 8081, .. }));
        assert_eq!(manager.active_count(), 1);
        assert_eq!(manager.sessions()[0].id, app);
    }

    #[tokio::test]
    async fn test_stop_is_exactly_once() {
        let forwarder = Arc::new(StubForwarder::new());
        let manager = PortForwardManager::new(forwarder.clone());
        let app = manager.start(spec(8080, "app")).await.unwrap();
        let mongo = manager.start(spec(27017, "mongo")).await.unwrap();

        manager.stop(app).await.unwrap();
        let again = manager.stop(app).await.unwrap_err();

        assert!(matches!(again, ForwardError::UnknownSession { .. }));
        assert_eq!(forwarder.terminations("app"), 1);
        assert_eq!(forwarder.terminations("mongo"), 0);
        assert_eq!(manager.active_count(), 1);
        assert_eq!(manager.sessions()[0].id, mongo);
    }

    #[tokio::test]
    async fn test_drop_terminates_sessions() {
        let forwarder = Arc::new(StubForwarder::new());
        {
            let manager = PortForwardManager::new(forwarder.clone());
            manager.start(spec(8080, "app")).await.unwrap();
        }
        for _ in 0..100 {
            if forwarder.terminations("app") == 1 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("session was not terminated on drop");
    }

    async fn registered(manager: &PortForwardManager, count: usize) {
        for _ in 0..100 {
            if manager.sessions().len() == count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {} registered sessions", count);
    }

    fn start_in_background(
        manager: &Arc<PortForwardManager>,
        spec: ForwardSpec,
    ) -> JoinHandle<Result<SessionId, ForwardError>> {
        let manager = manager.clone();
        tokio::spawn(async move { manager.start(spec).await })
    }

    #[tokio::test]
    async fn test_forward_finishing_after_stop_is_terminated_once() {
        let forwarder = Arc::new(StubForwarder::new());
        let release = forwarder.gate("app");
        let manager = Arc::new(PortForwardManager::new(forwarder.clone()));

        let starting = start_in_background(&manager, spec(8080, "app"));
        registered(&manager, 1).await;

        // the forward comes up while the stop is already under way
        release.send(()).unwrap();
        assert_eq!(manager.stop_all().await, 1);

        let err = starting.await.unwrap().unwrap_err();
        assert!(matches!(err, ForwardError::StoppedWhileStarting { .. }));
        assert_eq!(forwarder.terminations("app"), 1);
        assert_eq!(manager.active_count(), 0);
        assert!(manager.sessions().is_empty());

        assert_eq!(manager.stop_all().await, 0);
        assert_eq!(forwarder.terminations("app"), 1);
    }

    #[tokio::test]
    async fn test_stop_while_forward_pending_abandons_start() {
        let forwarder = Arc::new(StubForwarder::new());
        let _held = forwarder.gate("app");
        let manager = Arc::new(PortForwardManager::new(forwarder.clone()));
        manager.start(spec(27017, "mongo")).await.unwrap();

        let starting = start_in_background(&manager, spec(8080, "app"));
        registered(&manager, 2).await;
        assert_eq!(manager.stop_all().await, 2);

        let err = starting.await.unwrap().unwrap_err();
        assert!(matches!(err, ForwardError::StoppedWhileStarting { .. }));
        // no process was ever handed out for app
        assert_eq!(forwarder.terminations("app"), 0);
        assert_eq!(forwarder.terminations("mongo"), 1);
        assert_eq!(manager.active_count(), 0);
    }

    #[tokio::test]
    async fn test_wait_all_exited_wakes_on_last_exit() {
        let forwarder = Arc::new(StubForwarder::new());
        let manager = PortForwardManager::new(forwarder.clone());
        manager.start(spec(8080, "app")).await.unwrap();
        manager.start(spec(27017, "mongo")).await.unwrap();

        let waiting = manager.wait_all_exited();
        tokio::pin!(waiting);
        assert!(
            tokio::time::timeout(Duration::from_millis(50), waiting.as_mut())
                .await
                .is_err()
        );

        forwarder.crash("app", "pod deleted");
        forwarder.crash("mongo", "pod deleted");
        tokio::time::timeout(Duration::from_secs(1), waiting)
            .await
            .expect("waiter should wake once both sessions ended");
        assert_eq!(manager.active_count(), 0);
    }

    #[tokio::test]
    async fn test_handles_are_unique() {
        let manager = PortForwardManager::new(Arc::new(StubForwarder::new()));
        let a = manager.start(spec(8080, "app")).await.unwrap();
        let b = manager.start(spec(8081, "app-admin")).await.unwrap();
        assert_ne!(a, b);
        manager.stop_all().await;
    }
}
