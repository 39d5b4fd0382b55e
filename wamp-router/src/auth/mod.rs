mod authenticator;
mod identity;

pub use authenticator::{
    AnonymousAuthenticator,
    Authenticator,
};
pub use identity::Identity;
