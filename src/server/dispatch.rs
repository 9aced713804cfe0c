use std::sync::Arc;

use crate::server::exchange::Exchange;

/// A request handler registered under a path prefix.
///
/// Handlers consume the exchange: read the request, set status and headers,
/// write body bytes. A returned error is reported to the client as a 500
/// and closes the connection.
pub trait Handler: Send + Sync {
    fn handle(&self, exchange: &mut Exchange<'_>) -> anyhow::Result<()>;
}

impl<F> Handler for F
where
    F: Fn(&mut Exchange<'_>) -> anyhow::Result<()> + Send + Sync,
{
    fn handle(&self, exchange: &mut Exchange<'_>) -> anyhow::Result<()> {
        self(exchange)
    }
}

/// Maps request paths to handlers by first-registered prefix match.
#[derive(Default)]
pub struct Dispatcher {
    routes: Vec<(String, Arc<dyn Handler>)>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, prefix: impl Into<String>, handler: Arc<dyn Handler>) {
        self.routes.push((prefix.into(), handler));
    }

    /// The first registered handler whose prefix the path starts with.
    pub fn find(&self, path: &str) -> Option<&Arc<dyn Handler>> {
        self.routes
            .iter()
            .find(|(prefix, _)| path.starts_with(prefix.as_str()))
            .map(|(_, handler)| handler)
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
