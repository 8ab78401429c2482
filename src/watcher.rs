use futures::{Stream, StreamExt};
use k8s_openapi::api::core::v1::Pod;
use kube::{
    Resource, ResourceExt,
    api::DynamicObject,
    runtime::{
        reflector::{self, ObjectRef, Store, store::Writer},
        watcher::{self, Error as WatcherError},
    },
};
use parking_lot::RwLock;
use serde::{Serialize, de::DeserializeOwned};
use std::{collections::HashSet, fmt::Debug, sync::Arc};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ResourceKind {
    Pod,
    Service,
    Node,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceKind::Pod => write!(f, "Pod"),
            ResourceKind::Service => write!(f, "Service"),
            ResourceKind::Node => write!(f, "Node"),
        }
    }
}

/// A change observed on a watch stream
#[derive(Debug, Clone)]
pub enum Notification<K> {
    Added(Arc<K>),
    Updated { old: Arc<K>, new: Arc<K> },
    Deleted(DeletedObject<K>),
}

pub type PodEvent = Notification<Pod>;

impl<K> Notification<K> {
    pub fn verb(&self) -> &'static str {
        match self {
            Notification::Added(_) => "add",
            Notification::Updated { .. } => "update",
            Notification::Deleted(_) => "delete",
        }
    }
}

#[derive(Debug, Clone)]
pub enum DeletedObject<K> {
    Object(Arc<K>),
    /// The deletion happened while the watch was disconnected
    Tombstone(Tombstone),
}

/// Last known state of an object whose final state was never observed.
#[derive(Debug, Clone)]
pub struct Tombstone {
    pub key: String,
    pub obj: DynamicObject,
}

impl Tombstone {
    pub fn new<K>(obj: &K) -> Result<Self>
    where
        K: Resource + Serialize,
    {
        let key = match obj.meta().namespace.as_deref() {
            Some(ns) => format!("{ns}/{}", obj.name_any()),
            None => obj.name_any(),
        };
        let obj = serde_json::from_value(serde_json::to_value(obj)?)?;
        Ok(Self { key, obj })
    }

    /// Recovers the typed snapshot, failing if the payload is some other kind.
    pub fn recover<K>(&self) -> Result<K>
    where
        K: Resource<DynamicType = ()> + DeserializeOwned,
    {
        let found = self
            .obj
            .types
            .as_ref()
            .map(|t| t.kind.as_str())
            .unwrap_or_default();
        let expected = K::kind(&());
        if found != expected.as_ref() {
            return Err(Error::MalformedTombstone {
                key: self.key.clone(),
                expected: expected.into_owned(),
                found: found.to_string(),
            });
        }
        Ok(serde_json::from_value(serde_json::to_value(&self.obj)?)?)
    }
}

pub trait EventHandler<K>: Send + Sync {
    fn handle(&self, notification: &Notification<K>) -> Result<()>;
}

type Handlers<K> = Arc<RwLock<Vec<Arc<dyn EventHandler<K>>>>>;

/// A running subscription for one resource kind on one cluster.
///
/// The driver task starts as soon as the stream is spawned and keeps a
/// reflector store current. Handlers see each change after the store has
/// been updated.
pub struct WatchStream<K>
where
    K: Resource<DynamicType = ()> + Clone + 'static,
{
    kind: ResourceKind,
    store: Store<K>,
    synced: watch::Receiver<bool>,
    handlers: Handlers<K>,
}

impl<K> WatchStream<K>
where
    K: Resource<DynamicType = ()> + Clone + Debug + Serialize + Send + Sync + 'static,
{
    pub fn spawn<S>(
        kind: ResourceKind,
        cluster: impl Into<String>,
        events: S,
        stop: CancellationToken,
    ) -> Arc<Self>
    where
        S: Stream<Item = Result<watcher::Event<K>, WatcherError>> + Send + Unpin + 'static,
    {
        let (store, writer) = reflector::store::<K>();
        let (synced_tx, synced_rx) = watch::channel(false);
        let handlers: Handlers<K> = Arc::default();

        let driver = Driver {
            kind,
            cluster: cluster.into(),
            store: store.clone(),
            writer,
            synced: synced_tx,
            handlers: handlers.clone(),
            relisted: None,
        };
        tokio::spawn(driver.run(events, stop));

        Arc::new(Self {
            kind,
            store,
            synced: synced_rx,
            handlers,
        })
    }
}

impl<K> WatchStream<K>
where
    K: Resource<DynamicType = ()> + Clone + 'static,
{
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn store(&self) -> &Store<K> {
        &self.store
    }

    pub fn has_synced(&self) -> bool {
        *self.synced.borrow()
    }

    /// Resolves once the initial list has been loaded. Never resolves if the
    /// driver exits first; callers bound this wait themselves.
    pub async fn synced(&self) {
        let mut rx = self.synced.clone();
        if rx.wait_for(|synced| *synced).await.is_err() {
            std::future::pending::<()>().await;
        }
    }

    pub fn add_handler(&self, handler: Arc<dyn EventHandler<K>>) {
        self.handlers.write().push(handler);
    }
}

struct Driver<K>
where
    K: Resource<DynamicType = ()> + Clone + 'static,
{
    kind: ResourceKind,
    cluster: String,
    store: Store<K>,
    writer: Writer<K>,
    synced: watch::Sender<bool>,
    handlers: Handlers<K>,
    // keys seen since the last Init, while a relist is in progress
    relisted: Option<HashSet<ObjectRef<K>>>,
}

impl<K> Driver<K>
where
    K: Resource<DynamicType = ()> + Clone + Debug + Serialize + Send + Sync + 'static,
{
    async fn run<S>(mut self, mut events: S, stop: CancellationToken)
    where
        S: Stream<Item = Result<watcher::Event<K>, WatcherError>> + Unpin,
    {
        info!(cluster = %self.cluster, kind = %self.kind, "watch stream started");

        loop {
            let event = tokio::select! {
                _ = stop.cancelled() => break,
                event = events.next() => event,
            };
            match event {
                Some(Ok(ev)) => self.process(ev),
                Some(Err(err)) => {
                    error!(cluster = %self.cluster, kind = %self.kind, "stream error: {err}")
                }
                None => break,
            }
        }

        info!(cluster = %self.cluster, kind = %self.kind, "watch stream stopped");
    }

    fn process(&mut self, event: watcher::Event<K>) {
        let mut notifications = Vec::new();

        match &event {
            watcher::Event::Init => {
                debug!(cluster = %self.cluster, kind = %self.kind, "relist started");
                self.relisted = Some(HashSet::new());
            }
            watcher::Event::InitApply(obj) => {
                if let Some(seen) = self.relisted.as_mut() {
                    seen.insert(ObjectRef::from_obj(obj));
                }
                notifications.push(self.applied(obj));
            }
            watcher::Event::Apply(obj) => notifications.push(self.applied(obj)),
            watcher::Event::Delete(obj) => {
                notifications.push(Notification::Deleted(DeletedObject::Object(Arc::new(
                    obj.clone(),
                ))));
            }
            watcher::Event::InitDone => {
                let seen = self.relisted.take().unwrap_or_default();
                for gone in self
                    .store
                    .state()
                    .into_iter()
                    .filter(|obj| !seen.contains(&ObjectRef::from_obj(obj.as_ref())))
                {
                    match Tombstone::new(gone.as_ref()) {
                        Ok(tombstone) => notifications
                            .push(Notification::Deleted(DeletedObject::Tombstone(tombstone))),
                        Err(err) => error!(
                            cluster = %self.cluster,
                            kind = %self.kind,
                            "couldn't build tombstone for {}: {err}",
                            gone.name_any()
                        ),
                    }
                }
            }
        }

        self.writer.apply_watcher_event(&event);

        if matches!(event, watcher::Event::InitDone) && !*self.synced.borrow() {
            info!(
                cluster = %self.cluster,
                kind = %self.kind,
                objects = self.store.state().len(),
                "watch stream synced"
            );
            self.synced.send_replace(true);
        }

        for notification in &notifications {
            self.notify(notification);
        }
    }

    fn applied(&self, obj: &K) -> Notification<K> {
        let new = Arc::new(obj.clone());
        match self.store.get(&ObjectRef::from_obj(obj)) {
            Some(old) => Notification::Updated { old, new },
            None => Notification::Added(new),
        }
    }

    fn notify(&self, notification: &Notification<K>) {
        let handlers = self.handlers.read().clone();
        for handler in handlers {
            if let Err(err) = handler.handle(notification) {
                error!(
                    cluster = %self.cluster,
                    kind = %self.kind,
                    "error on {} {} event: {err}",
                    notification.verb(),
                    self.kind
                );
            }
        }
    }
}
