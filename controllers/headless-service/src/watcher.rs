//! Kubernetes Pod watcher.
//!
//! This module turns the `kube_runtime::watcher` stream into Add/Update/Delete
//! callbacks. The runtime watcher only reports "applied" and "deleted", so a
//! last-known-state cache of Pods decides whether an applied Pod is new, and
//! relists are diffed against the cache to catch deletions missed while the
//! watch was down. Cached Pods are redelivered to `on_update` on a fixed
//! resync period.

use crate::error::ControllerError;
use crate::resources::PodKey;
use futures::{Stream, StreamExt};
use k8s_openapi::api::core::v1::Pod;
use kube::Api;
use kube_runtime::{WatchStreamExt, watcher};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at};
use tracing::{debug, info, warn};

/// Callbacks invoked for Pod lifecycle events.
#[async_trait::async_trait]
pub trait PodEventHandler: Send + Sync {
    /// First time a Pod is seen.
    async fn on_add(&self, pod: &Pod) -> Result<(), ControllerError>;
    /// A known Pod changed, or a resync redelivered it.
    async fn on_update(&self, pod: &Pod) -> Result<(), ControllerError>;
    /// A Pod was deleted. Carries the last known state.
    async fn on_delete(&self, pod: &Pod) -> Result<(), ControllerError>;
}

/// Last known state of every Pod seen by the watch, plus relist bookkeeping.
///
/// Handler errors are logged and dropped; the next event or resync for the
/// same Pod retries implicitly.
pub struct PodCache<H> {
    handler: Arc<H>,
    pods: HashMap<PodKey, Pod>,
    relisted: Option<HashSet<PodKey>>,
}

impl<H> std::fmt::Debug for PodCache<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PodCache")
            .field("pods", &self.pods.len())
            .field("relisting", &self.relisted.is_some())
            .finish_non_exhaustive()
    }
}

impl<H: PodEventHandler> PodCache<H> {
    /// Creates an empty cache delivering to `handler`.
    pub fn new(handler: Arc<H>) -> Self {
        Self {
            handler,
            pods: HashMap::new(),
            relisted: None,
        }
    }

    /// Number of cached Pods.
    pub fn len(&self) -> usize {
        self.pods.len()
    }

    /// Applies one watch event.
    pub async fn handle_event(&mut self, event: watcher::Event<Pod>) {
        match event {
            watcher::Event::Init => {
                debug!("Pod relist started");
                self.relisted = Some(HashSet::new());
            }
            watcher::Event::InitApply(pod) => {
                if let (Some(seen), Ok(key)) = (self.relisted.as_mut(), PodKey::from_pod(&pod)) {
                    seen.insert(key);
                }
                self.apply(pod).await;
            }
            watcher::Event::InitDone => {
                self.finish_relist().await;
            }
            watcher::Event::Apply(pod) => {
                self.apply(pod).await;
            }
            watcher::Event::Delete(pod) => {
                self.delete(pod).await;
            }
        }
    }

    /// Redelivers every cached Pod to `on_update`.
    pub async fn resync(&self) {
        debug!("Resyncing {} pods", self.len());
        for (key, pod) in &self.pods {
            if let Err(e) = self.handler.on_update(pod).await {
                info!("Error updating service for pod {}: {}", key, e);
            }
        }
    }

    async fn apply(&mut self, pod: Pod) {
        let key = match PodKey::from_pod(&pod) {
            Ok(key) => key,
            Err(e) => {
                warn!("Ignoring pod event: {}", e);
                return;
            }
        };

        let known = self.pods.insert(key.clone(), pod.clone()).is_some();
        if known {
            if let Err(e) = self.handler.on_update(&pod).await {
                info!("Error updating service for pod {}: {}", key, e);
            }
        } else if let Err(e) = self.handler.on_add(&pod).await {
            info!("Error setting up service for pod {}: {}", key, e);
        }
    }

    async fn delete(&mut self, pod: Pod) {
        let key = match PodKey::from_pod(&pod) {
            Ok(key) => key,
            Err(e) => {
                warn!("Ignoring pod deletion: {}", e);
                return;
            }
        };

        self.pods.remove(&key);
        if let Err(e) = self.handler.on_delete(&pod).await {
            info!("Error deleting service for pod {}: {}", key, e);
        }
    }

    /// Pods cached before the relist but absent from it were deleted while
    /// the watch was down.
    async fn finish_relist(&mut self) {
        let Some(seen) = self.relisted.take() else {
            return;
        };

        let mut gone: Vec<PodKey> = self
            .pods
            .keys()
            .filter(|key| !seen.contains(*key))
            .cloned()
            .collect();
        gone.sort();

        for key in gone {
            if let Some(pod) = self.pods.remove(&key) {
                debug!("Pod {} disappeared during relist", key);
                if let Err(e) = self.handler.on_delete(&pod).await {
                    info!("Error deleting service for pod {}: {}", key, e);
                }
            }
        }
        info!("Pod relist complete, tracking {} pods", self.len());
    }

    /// Consumes watch events until the stream ends, resyncing on `resync_period`.
    pub async fn run<S>(
        mut self,
        stream: S,
        resync_period: Option<Duration>,
    ) -> Result<(), ControllerError>
    where
        S: Stream<Item = Result<watcher::Event<Pod>, watcher::Error>>,
    {
        let mut stream = std::pin::pin!(stream);
        let mut resync = resync_period.map(resync_interval);

        loop {
            tokio::select! {
                next = stream.next() => match next {
                    Some(Ok(event)) => self.handle_event(event).await,
                    Some(Err(e)) => warn!("Pod watch error: {}", e),
                    None => {
                        return Err(ControllerError::Watch("Pod watch stream ended".to_string()));
                    }
                },
                () = tick(resync.as_mut()) => self.resync().await,
            }
        }
    }
}

/// Watches Pods and drives a `PodEventHandler`.
pub struct Watcher<H> {
    pod_api: Api<Pod>,
    cache: PodCache<H>,
    resync_period: Option<Duration>,
}

impl<H> std::fmt::Debug for Watcher<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watcher")
            .field("cache", &self.cache)
            .field("resync_period", &self.resync_period)
            .finish_non_exhaustive()
    }
}

impl<H: PodEventHandler> Watcher<H> {
    /// Creates a new watcher instance. `None` disables the periodic resync.
    pub fn new(pod_api: Api<Pod>, handler: Arc<H>, resync_period: Option<Duration>) -> Self {
        Self {
            pod_api,
            cache: PodCache::new(handler),
            resync_period,
        }
    }

    /// Watches Pods until the stream ends.
    ///
    /// Stream errors are logged and the watch reconnects with the runtime's
    /// default backoff. Events are handled one at a time.
    pub async fn watch_pods(self) -> Result<(), ControllerError> {
        info!("Watching pods");

        let stream = watcher(self.pod_api, watcher::Config::default()).default_backoff();
        self.cache.run(stream, self.resync_period).await
    }
}

fn resync_interval(period: Duration) -> Interval {
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

async fn tick(interval: Option<&mut Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
