pub mod cancel;
pub mod close;
pub mod error;
pub mod features;
pub mod hash;
pub mod id;
pub mod invocation_policy;
pub mod match_style;
pub mod options;
pub mod peer_info;
pub mod roles;
pub mod types;
pub mod uri;
