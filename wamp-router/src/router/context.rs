use std::sync::Arc;

use crate::router::router::Router;

/// The context of a task running for a router.
///
/// Used to share ownership of the router across many tasks.
#[derive(Clone)]
pub(crate) struct RouterContext {
    router: Arc<Router>,
}

impl RouterContext {
    /// Constructs a new context wrapper around a router.
    pub fn new(router: Router) -> Self {
        Self {
            router: Arc::new(router),
        }
    }

    pub fn router(&self) -> &Router {
        self.router.as_ref()
    }
}
