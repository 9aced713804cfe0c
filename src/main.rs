use std::sync::Arc;

use hearth::config::Config;
use hearth::server::{Exchange, Handler, Server, WorkerPool};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .init();

    let cfg = Config::load();
    let workers = cfg.server.workers;

    let mut server = Server::new(cfg)?;
    server.set_executor(Arc::new(WorkerPool::new(workers)?));
    server.handle("/", GreetingHandler);

    #[cfg(unix)]
    {
        let flag = server.shutdown_flag();
        signal_hook::flag::register(signal_hook::consts::SIGINT, flag.clone())?;
        signal_hook::flag::register(signal_hook::consts::SIGTERM, flag)?;
    }

    server.run()
}

/// Greets by the `name` parameter and counts visits in the session.
struct GreetingHandler;

impl Handler for GreetingHandler {
    fn handle(&self, exchange: &mut Exchange<'_>) -> anyhow::Result<()> {
        let name = exchange
            .request()
            .parameter("name")
            .unwrap_or("world")
            .to_string();

        let visits = match exchange.session() {
            Some(session) => {
                let visits = session.attribute::<u64>("visits").unwrap_or(0) + 1;
                session.set_attribute("visits", visits);
                visits
            }
            None => {
                let session = exchange.create_session();
                session.set_attribute("visits", 1u64);
                1
            }
        };

        exchange
            .response()
            .write_str(&format!("Hello, {}! (visit {})\n", name, visits))?;
        exchange.response().flush()?;
        Ok(())
    }
}
