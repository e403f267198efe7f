//! surfacewire CLI: run a demo host, or call into one as a surface.

mod cli;
mod demo;

use crate::cli::{Cli, Commands};
use anyhow::Context;
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use surfacewire_client::Proxy;
use surfacewire_host::Channel;
use surfacewire_transport::{
    ConnectConfig, HostConfig, HostNode, Router, SurfaceConnection, SurfaceEvent,
};
use surfacewire_types::config::{load_config, WireConfig};
use surfacewire_types::{Payload, Permission, Value};
use tracing::info;

fn init_tracing_stderr(default_level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref());
    init_tracing_stderr(&config.log_level);

    let result = match cli.command {
        Commands::Serve { listen } => cmd_serve(config, listen),
        Commands::Call {
            connect,
            channel,
            allow,
            function,
            args,
        } => cmd_call(config, connect, channel, allow, function, args),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

fn cmd_serve(mut config: WireConfig, listen: Option<SocketAddr>) -> anyhow::Result<()> {
    if let Some(addr) = listen {
        config.listen_addr = addr;
    }
    let rt = tokio::runtime::Runtime::new().context("Failed to create Tokio runtime")?;
    rt.block_on(serve(config))
}

async fn serve(config: WireConfig) -> anyhow::Result<()> {
    let router = Router::new();
    let channel = Channel::create(&router, demo::MATH_CHANNEL, demo::math_library(), None)
        .context("Failed to bind the math channel")?;

    let (node, _accept) = HostNode::start(HostConfig::from(&config), router)
        .await
        .with_context(|| format!("Failed to listen on {}", config.listen_addr))?;
    {
        let channel = Arc::clone(&channel);
        node.add_listener(move |event| match event {
            SurfaceEvent::Connected { id, name } => {
                info!(surface = %id, name = %name, "Subscribing surface to math");
                channel.subscribe(*id);
            }
            SurfaceEvent::Disconnected { id } => {
                channel.unsubscribe(*id);
            }
        });
    }
    println!("surfacewire host listening on {}", node.local_addr());

    tokio::signal::ctrl_c()
        .await
        .context("Failed to wait for Ctrl+C")?;

    let stats = channel.stats();
    info!(
        dispatched = stats.dispatched,
        dropped_unsubscribed = stats.dropped_unsubscribed,
        dropped_unresolved = stats.dropped_unresolved,
        failed = stats.failed,
        "Shutting down"
    );
    Ok(())
}

fn cmd_call(
    mut config: WireConfig,
    connect: Option<SocketAddr>,
    channel: String,
    allow: Vec<String>,
    function: String,
    args: Vec<String>,
) -> anyhow::Result<()> {
    if let Some(addr) = connect {
        config.listen_addr = addr;
    }
    let args = parse_args(&args)?;
    for name in allow {
        config.permissions.insert(name, Permission::Allow);
    }

    let rt = tokio::runtime::Runtime::new().context("Failed to create Tokio runtime")?;
    let value = rt.block_on(async {
        let conn = SurfaceConnection::connect(ConnectConfig::from(&config))
            .await
            .with_context(|| format!("Failed to connect to {}", config.listen_addr))?;
        let proxy = Proxy::create(conn, channel, config.permissions.clone());
        let value = proxy
            .call(&function, args)
            .await
            .with_context(|| format!("{}.{} failed", proxy.name(), function))?;
        anyhow::Ok(value)
    })?;

    println!("{}", render(value.as_ref()));
    Ok(())
}

fn parse_args(raw: &[String]) -> anyhow::Result<Vec<Payload>> {
    raw.iter()
        .map(|arg| {
            serde_json::from_str::<serde_json::Value>(arg)
                .map(Payload::Json)
                .with_context(|| format!("Argument is not valid JSON: {arg}"))
        })
        .collect()
}

fn render(value: Option<&Value>) -> String {
    match value {
        None => "(no value)".to_string(),
        Some(Value::Json(json)) => {
            serde_json::to_string_pretty(json).unwrap_or_else(|_| json.to_string())
        }
        Some(Value::Buffer(bytes)) => {
            let hex: Vec<String> = bytes.iter().map(|b| format!("{b:02x}")).collect();
            format!("<{} bytes> {}", bytes.len(), hex.join(" "))
        }
    }
}
