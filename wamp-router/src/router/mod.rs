mod app;
mod broker;
mod connection;
mod context;
mod dealer;
mod observer;
mod realm;
mod router;
mod session;
mod sink;
mod snapshot;

pub use app::{
    SessionContext,
    permissions::{
        PermissionAction,
        PermissionPolicies,
        Principal,
    },
    pub_sub::{
        EmptyPubSubPolicies,
        PubSubPolicies,
    },
    rpc::{
        EmptyRpcPolicies,
        RpcPolicies,
    },
};
pub use connection::DirectConnection;
pub use observer::{
    LoggingObserver,
    MessageObserver,
};
pub use realm::{
    Realm,
    RealmConfig,
};
pub use router::{
    Router,
    RouterConfig,
    RouterHandle,
};
pub use session::Session;
pub use sink::{
    OutgoingReceiver,
    SessionSink,
};
pub use snapshot::{
    RealmSnapshot,
    RegistrationSnapshot,
    RouterSnapshot,
    SessionSnapshot,
    SubscriptionSnapshot,
};
