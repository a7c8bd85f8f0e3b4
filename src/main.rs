use breakwater::http::{HttpStatus, ParamMap, Verb};
use breakwater::runtime_config::RuntimeConfig;
use breakwater::server::start_http_server;
use breakwater::{JobDispatcher, ProtocolError, ServletRegistry, TimerDaemon};
use clap::Parser;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "breakwater", about = "Demo server for the breakwater framework")]
struct Opt {
    /// Listen address; overrides BRKW_LISTEN_ADDR.
    #[arg(short, long)]
    addr: Option<String>,

    /// Dispatcher worker threads; overrides BRKW_DISPATCH_WORKERS.
    #[arg(short, long)]
    workers: Option<usize>,
}

#[derive(Serialize)]
struct TimeBody {
    monotonic_ms: u64,
    wall_utc_ms: u64,
}

fn main() -> breakwater::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let opt = Opt::parse();
    let mut config = RuntimeConfig::from_env();
    if let Some(addr) = opt.addr {
        config.listen_addr = addr;
    }
    if let Some(workers) = opt.workers {
        config.dispatch_workers = workers.max(1);
    }

    let dispatcher = JobDispatcher::start(config.dispatch_workers);
    let timers = TimerDaemon::start(dispatcher.clone());

    let servlets = Arc::new(ServletRegistry::new());
    servlets.register(
        "/hello",
        Arc::new(
            |_: &mut ParamMap,
             out_body: &mut Vec<u8>,
             _: Verb,
             query: &ParamMap,
             _: &ParamMap,
             _: &[u8]|
             -> Result<HttpStatus, ProtocolError> {
                let name = query.get("name").unwrap_or("world");
                out_body.extend_from_slice(format!("hello, {name}\n").as_bytes());
                Ok(HttpStatus::OK)
            },
        ),
    );
    servlets.register(
        "/time",
        Arc::new(
            |out_headers: &mut ParamMap,
             out_body: &mut Vec<u8>,
             _: Verb,
             _: &ParamMap,
             _: &ParamMap,
             _: &[u8]|
             -> Result<HttpStatus, ProtocolError> {
                let body = TimeBody {
                    monotonic_ms: breakwater::clock::now_ms(),
                    wall_utc_ms: breakwater::clock::wall_time_ms(true),
                };
                out_headers.set("Content-Type", "application/json");
                out_body.extend_from_slice(&serde_json::to_vec(&body).unwrap_or_default());
                Ok(HttpStatus::OK)
            },
        ),
    );

    // Heartbeat so an idle server shows signs of life in the logs.
    let heartbeat_dispatcher = dispatcher.clone();
    let _heartbeat = timers.register_relative(
        60_000,
        60_000,
        Arc::new(move |_, fired_at, _| {
            info!(
                uptime_ms = fired_at,
                pending_jobs = heartbeat_dispatcher.pending(),
                "heartbeat"
            );
        }),
    );

    let server = start_http_server(&config.listen_addr, dispatcher.clone(), servlets)?;
    info!(addr = %server.local_addr(), workers = config.dispatch_workers, "breakwater serving");
    server.join();

    timers.stop();
    dispatcher.stop();
    Ok(())
}
