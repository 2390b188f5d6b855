use crate::adapters::wamp::WampSession;
use crate::domain::ports::{ConfigProvider, Procedure, SessionHandler};
use crate::utils::error::Result;
use std::future::Future;
use std::sync::Arc;

/// Joins a router realm, runs the on-join handlers, registers procedures and
/// serves calls until shutdown.
pub struct Component {
    router_url: String,
    realm: String,
    handlers: Vec<Arc<dyn SessionHandler>>,
    procedures: Vec<Arc<dyn Procedure>>,
}

impl Component {
    pub fn new(config: &impl ConfigProvider) -> Self {
        Self {
            router_url: config.router_url().to_string(),
            realm: config.realm().to_string(),
            handlers: Vec::new(),
            procedures: Vec::new(),
        }
    }

    pub fn on_join(mut self, handler: Arc<dyn SessionHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    pub fn register(mut self, procedure: Arc<dyn Procedure>) -> Self {
        self.procedures.push(procedure);
        self
    }

    pub async fn run<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        tracing::info!("Connecting to {} (realm '{}')", self.router_url, self.realm);
        let mut session = WampSession::join(&self.router_url, &self.realm).await?;

        // Tables must exist before the first invocation can arrive.
        for handler in &self.handlers {
            handler.on_join(session.details()).await?;
        }
        for procedure in self.procedures {
            session.register(procedure).await?;
        }
        tracing::info!("Ready to serve on session {}", session.details().session_id);

        session.run_until(shutdown).await
    }
}
