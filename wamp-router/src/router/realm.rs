use std::sync::Arc;

use anyhow::Result;
use futures_util::lock::Mutex;
use log::info;
use tokio::sync::RwLock;

use crate::{
    auth::Identity,
    core::{
        error::InteractionError,
        hash::IndexMap,
        id::{
            Id,
            ScopedIdGenerator,
        },
        roles::PeerRole,
        uri::Uri,
    },
    router::{
        broker::Broker,
        dealer::Dealer,
        session::Session,
        snapshot::{
            RealmSnapshot,
            SessionSnapshot,
        },
    },
};

/// Configuration for a realm.
#[derive(Debug, Clone)]
pub struct RealmConfig {
    /// Name of the realm, mostly for logging.
    pub name: String,
    /// URI for peers to connect to the realm.
    pub uri: Uri,
}

/// A single session on a realm.
pub(crate) struct RealmSession {
    pub session: Arc<Session>,
    pub identity: Identity,
    pub roles: Vec<PeerRole>,
    /// The router sent GOODBYE, so nothing else is routed to the session.
    pub closing: bool,
}

/// Everything in a realm guarded by the realm lock.
#[derive(Default)]
pub(crate) struct RealmTables {
    /// Set once the realm is removed from the router, so that late joins try again.
    pub retired: bool,
    /// Sessions in the realm, in order of joining.
    pub sessions: IndexMap<Id, RealmSession>,
    pub broker: Broker,
    pub dealer: Dealer,
}

impl RealmTables {
    /// Checks if the session is still joined.
    ///
    /// Requests handled concurrently with the session's teardown must not touch the tables.
    pub fn has_session(&self, session: Id) -> bool {
        self.sessions.contains_key(&session)
    }
}

/// A realm, which is a scoped area for peer sessions and resources.
///
/// WAMP sessions cannot communicate across realms.
pub struct Realm {
    /// The realm configuration when created.
    pub config: RealmConfig,
    persistent: bool,
    pub(crate) ids: ScopedIdGenerator,
    pub(crate) tables: Mutex<RealmTables>,
}

impl std::fmt::Debug for Realm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Realm")
            .field("uri", self.uri())
            .field("persistent", &self.persistent)
            .finish_non_exhaustive()
    }
}

impl Realm {
    /// Creates a new realm.
    ///
    /// Persistent realms stay on the router when their last session leaves.
    pub fn new(config: RealmConfig, persistent: bool) -> Self {
        Self {
            config,
            persistent,
            ids: ScopedIdGenerator::default(),
            tables: Mutex::new(RealmTables::default()),
        }
    }

    /// The URI for accessing the realm.
    pub fn uri(&self) -> &Uri {
        &self.config.uri
    }

    pub fn persistent(&self) -> bool {
        self.persistent
    }

    pub(crate) async fn snapshot(&self) -> RealmSnapshot {
        let tables = self.tables.lock().await;
        RealmSnapshot {
            uri: self.uri().clone(),
            persistent: self.persistent,
            sessions: tables
                .sessions
                .values()
                .map(|session| SessionSnapshot {
                    id: session.session.id(),
                    identity: session.identity.clone(),
                    roles: session.roles.clone(),
                    queued_messages: session.session.sink().depth(),
                })
                .collect(),
            subscriptions: tables.broker.snapshot(),
            registrations: tables.dealer.snapshot(),
            pending_invocations: tables.dealer.pending_invocations(),
        }
    }
}

/// A manager for all realms owned by a router.
///
/// Lock order is the registry first, then a realm.
#[derive(Default)]
pub(crate) struct RealmManager {
    realms: RwLock<IndexMap<Uri, Arc<Realm>>>,
}

impl RealmManager {
    /// Creates a manager holding the configured realms, which are persistent.
    pub fn new(configs: &[RealmConfig]) -> Self {
        let realms = configs
            .iter()
            .map(|config| {
                (
                    config.uri.clone(),
                    Arc::new(Realm::new(config.clone(), true)),
                )
            })
            .collect();
        Self {
            realms: RwLock::new(realms),
        }
    }

    /// Looks up realm by URI.
    pub async fn get(&self, uri: &Uri) -> Option<Arc<Realm>> {
        self.realms.read().await.get(uri).cloned()
    }

    /// Looks up a realm by URI, creating it if allowed.
    pub async fn get_or_create(&self, uri: &Uri, create: bool) -> Result<Arc<Realm>> {
        if let Some(realm) = self.get(uri).await {
            return Ok(realm);
        }
        if !create {
            return Err(InteractionError::NoSuchRealm.into());
        }
        let mut realms = self.realms.write().await;
        let realm = realms
            .entry(uri.clone())
            .or_insert_with(|| {
                info!("Creating realm {uri}");
                Arc::new(Realm::new(
                    RealmConfig {
                        name: uri.to_string(),
                        uri: uri.clone(),
                    },
                    false,
                ))
            })
            .clone();
        Ok(realm)
    }

    /// Removes a realm that is not persistent and has no sessions.
    ///
    /// Returns whether the realm was removed.
    pub async fn remove_if_empty(&self, uri: &Uri) -> bool {
        let mut realms = self.realms.write().await;
        let realm = match realms.get(uri) {
            Some(realm) => realm.clone(),
            None => return false,
        };
        if realm.persistent() {
            return false;
        }
        let mut tables = realm.tables.lock().await;
        if tables.retired || !tables.sessions.is_empty() {
            return false;
        }
        tables.retired = true;
        drop(tables);
        realms.shift_remove(uri);
        info!("Removed empty realm {uri}");
        true
    }

    /// All realm URIs.
    pub async fn uris(&self) -> Vec<Uri> {
        self.realms.read().await.keys().cloned().collect()
    }

    /// All realms, in order of creation.
    pub async fn realms(&self) -> Vec<Arc<Realm>> {
        self.realms.read().await.values().cloned().collect()
    }
}
