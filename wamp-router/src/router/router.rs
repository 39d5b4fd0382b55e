use std::sync::Arc;

use anyhow::{
    Error,
    Result,
};
use log::{
    debug,
    info,
};
use tokio::sync::RwLock;

use crate::{
    auth::Authenticator,
    core::{
        close::CloseReason,
        error::{
            BasicError,
            InteractionError,
        },
        features::{
            PubSubFeatures,
            RpcFeatures,
        },
        hash::{
            HashMap,
            HashSet,
        },
        id::{
            Id,
            IdAllocator,
            SequentialIdAllocator,
        },
        peer_info::ConnectionType,
        roles::RouterRole,
        uri::Uri,
    },
    message::message::Message,
    router::{
        app::{
            pub_sub::PubSubPolicies,
            rpc::RpcPolicies,
        },
        connection::DirectConnection,
        context::RouterContext,
        observer::MessageObserver,
        realm::{
            RealmConfig,
            RealmManager,
        },
        session::Session,
        sink::OutgoingReceiver,
        snapshot::RouterSnapshot,
    },
    serializer::SerializerType,
};

const DEFAULT_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "-", env!("CARGO_PKG_VERSION"));

/// Configuration for a [`Router`].
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Agent name, communicated to peers.
    pub agent: String,
    /// Roles implemented by the router.
    pub roles: Vec<RouterRole>,
    /// Broker features announced in WELCOME.
    pub pub_sub_features: PubSubFeatures,
    /// Dealer features announced in WELCOME.
    pub rpc_features: RpcFeatures,
    /// Allowed serializers.
    ///
    /// The actual serializer is selected by the transport when the connection is established.
    pub serializers: HashSet<SerializerType>,
    /// Realms available on the router from the start.
    ///
    /// These realms are never removed.
    pub realms: Vec<RealmConfig>,
    /// Creates a realm when a peer asks to join one that does not exist.
    pub auto_create_realms: bool,
    /// Removes realms created on demand once their last session leaves.
    pub collect_empty_realms: bool,
    /// Number of queued outgoing messages after which a session is reported as saturated.
    pub outgoing_queue_limit: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            agent: DEFAULT_AGENT.to_owned(),
            roles: Vec::from_iter([RouterRole::Broker, RouterRole::Dealer]),
            pub_sub_features: PubSubFeatures::default(),
            rpc_features: RpcFeatures::default(),
            serializers: HashSet::from_iter(SerializerType::all()),
            realms: Vec::default(),
            auto_create_realms: true,
            collect_empty_realms: true,
            outgoing_queue_limit: 1024,
        }
    }
}

/// A WAMP router that manages realms and routes messages between sessions.
///
/// The router never touches a transport. Transports connect sessions through a [`RouterHandle`],
/// feed them incoming messages, and drain their [`OutgoingReceiver`].
pub struct Router {
    /// The router configuration when created.
    pub(crate) config: RouterConfig,

    /// Policies for pub/sub functionality.
    pub(crate) pub_sub_policies: Box<dyn PubSubPolicies>,

    /// Policies for RPC functionality.
    pub(crate) rpc_policies: Box<dyn RpcPolicies>,

    pub(crate) authenticator: Box<dyn Authenticator>,

    pub(crate) observers: Arc<[Arc<dyn MessageObserver>]>,

    /// Realm manager.
    pub(crate) realm_manager: RealmManager,

    /// Allocator for session IDs, which are global.
    pub(crate) id_allocator: Box<dyn IdAllocator>,

    /// Live sessions, whether or not they joined a realm.
    pub(crate) sessions: RwLock<HashMap<Id, Arc<Session>>>,
}

impl Router {
    /// Creates a new [`Router`].
    pub fn new(
        config: RouterConfig,
        pub_sub_policies: Box<dyn PubSubPolicies>,
        rpc_policies: Box<dyn RpcPolicies>,
        authenticator: Box<dyn Authenticator>,
    ) -> Result<Self> {
        if config.serializers.is_empty() {
            return Err(BasicError::InvalidArgument(
                "router must allow at least one serializer".to_owned(),
            )
            .into());
        }
        let realm_manager = RealmManager::new(&config.realms);
        Ok(Self {
            config,
            pub_sub_policies,
            rpc_policies,
            authenticator,
            observers: Arc::from([]),
            realm_manager,
            id_allocator: Box::new(SequentialIdAllocator::default()),
            sessions: RwLock::new(HashMap::default()),
        })
    }

    /// Adds an observer of all messages flowing through the router.
    pub fn add_message_observer(&mut self, observer: Arc<dyn MessageObserver>) {
        self.observers = self
            .observers
            .iter()
            .cloned()
            .chain([observer])
            .collect();
    }

    /// Starts the router.
    ///
    /// The returned handle can be used to interact with the router since its ownership is
    /// transferred away.
    pub fn start(self) -> RouterHandle {
        info!(
            "Starting router {} with realms {:?}",
            self.config.agent,
            self.config
                .realms
                .iter()
                .map(|realm| realm.uri.as_ref())
                .collect::<Vec<_>>()
        );
        RouterHandle {
            context: RouterContext::new(self),
        }
    }
}

/// A handle to a running [`Router`].
///
/// Cheap to clone. Every clone refers to the same router.
#[derive(Clone)]
pub struct RouterHandle {
    context: RouterContext,
}

impl RouterHandle {
    /// Connects a new session to the router.
    ///
    /// The transport feeds the session's incoming messages to [`Self::handle_incoming`] and
    /// delivers the messages yielded by the receiver to the peer.
    pub async fn connect(
        &self,
        serializer: SerializerType,
        connection_type: ConnectionType,
    ) -> Result<(Arc<Session>, OutgoingReceiver)> {
        let router = self.context.router();
        if !router.config.serializers.contains(&serializer) {
            return Err(
                BasicError::NotAllowed(format!("serializer {serializer} is not allowed")).into(),
            );
        }
        let id = router.id_allocator.generate_id();
        let (session, outgoing) = Session::new(id, connection_type, serializer, &self.context);
        let session = Arc::new(session);
        router.sessions.write().await.insert(id, session.clone());
        info!(
            "Connected session {id} over {} using {serializer}",
            session.connection_type()
        );
        Ok((session, outgoing))
    }

    /// Handles a message received from the session's peer.
    ///
    /// Returns an error if the message ended the session, in which case the peer was sent ABORT.
    pub async fn handle_incoming(&self, session: &Arc<Session>, message: Message) -> Result<()> {
        session.clone().handle_message(&self.context, message).await
    }

    /// Tears the session down after its transport closed.
    pub async fn disconnect(&self, session: &Session) {
        debug!("Transport for session {} disconnected", session.id());
        session.clean_up(&self.context).await;
    }

    /// Sends GOODBYE to the session's peer.
    ///
    /// The session is torn down once the peer replies with GOODBYE or disconnects.
    pub async fn close_session(&self, session: &Session, close_reason: CloseReason) -> Result<()> {
        session.close(close_reason).await
    }

    /// Ends every session in the realm with `wamp.close.close_realm`.
    pub async fn close_realm(&self, realm: &Uri) -> Result<()> {
        let realm = self
            .context
            .router()
            .realm_manager
            .get(realm)
            .await
            .ok_or(InteractionError::NoSuchRealm)?;
        let sessions = realm
            .tables
            .lock()
            .await
            .sessions
            .values()
            .map(|session| session.session.clone())
            .collect::<Vec<_>>();
        info!(
            "Closing realm {} with {} sessions",
            realm.uri(),
            sessions.len()
        );
        for session in sessions {
            session
                .shut_down(&self.context, CloseReason::CloseRealm)
                .await;
        }
        Ok(())
    }

    /// Starts an in-process connection to the router.
    pub async fn direct_connect(&self) -> Result<DirectConnection> {
        let serializer = SerializerType::all()
            .into_iter()
            .find(|serializer| {
                self.context
                    .router()
                    .config
                    .serializers
                    .contains(serializer)
            })
            .ok_or_else(|| Error::msg("router allows no serializers"))?;
        let (session, outgoing) = self.connect(serializer, ConnectionType::Direct).await?;
        Ok(DirectConnection::start(
            self.context.clone(),
            session,
            outgoing,
        ))
    }

    /// URIs of every realm on the router.
    pub async fn realms(&self) -> Vec<Uri> {
        self.context.router().realm_manager.uris().await
    }

    /// A read-only view of every realm.
    pub async fn snapshot(&self) -> RouterSnapshot {
        let mut snapshot = RouterSnapshot::default();
        for realm in self.context.router().realm_manager.realms().await {
            snapshot.realms.push(realm.snapshot().await);
        }
        snapshot
    }

    /// Ends every session with `wamp.close.system_shutdown`.
    pub async fn shut_down(&self) {
        let sessions = self
            .context
            .router()
            .sessions
            .read()
            .await
            .values()
            .cloned()
            .collect::<Vec<_>>();
        info!("Shutting down router with {} sessions", sessions.len());
        for session in sessions {
            session
                .shut_down(&self.context, CloseReason::SystemShutdown)
                .await;
        }
    }
}
