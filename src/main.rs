use anyhow::Context;
use clap::Parser;
use meshchat::{
    config::Config,
    constants::*,
    node::{ChatNode, Command, CommandOutcome},
    storage::MemoryStore,
};
use std::fs;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::signal;
use tokio::sync::mpsc;

#[derive(Parser, Debug)]
#[command(author, version, about = "MeshChat peer (JSON commands on stdin, events on stdout)")]
struct Args {
    /// Optional path to config file (TOML)
    #[arg(short, long)]
    config: Option<String>,

    /// Local profile; keeps state under data_<PROFILE>
    #[arg(long)]
    profile: Option<String>,

    /// Override the listen port
    #[arg(short, long)]
    port: Option<u16>,

    /// Override the display name
    #[arg(short, long)]
    name: Option<String>,
}

fn load_config(args: &Args) -> anyhow::Result<Config> {
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| "config.toml".to_string());
    let mut config = match fs::read_to_string(&config_path) {
        Ok(content) => {
            let cfg = Config::from_toml_str(&content)
                .with_context(|| format!("failed to parse config file '{}'", config_path))?;
            eprintln!("{}Loaded config from: {}", ICON_PLACEHOLDER, config_path);
            cfg
        }
        Err(_) => {
            eprintln!(
                "⚠️ No config file found at '{}', falling back to default config.",
                config_path
            );
            Config::default()
        }
    };
    if let Some(profile) = args.profile.as_deref() {
        config.apply_profile(profile);
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(name) = args.name.clone() {
        config.username = Some(name);
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;

    // Initialize events AFTER config is loaded so custom logging path can be applied
    meshchat::events::init_events_from_config(config.logging.as_ref()).await;
    meshchat::emit_system_event!(
        "config",
        meshchat::events::LogLevel::Info,
        "config_loaded",
        Some(format!(
            "port={} user={} state_dir={:?}",
            config.port,
            config.username(),
            config.state_dir
        ))
    );

    let store = Arc::new(MemoryStore::new());
    let (node, mut events) = ChatNode::start(config, store)
        .await
        .context("failed to start node")?;
    eprintln!(
        "🟢 {} {} is running on {} (advertising {}). Press Ctrl+C to shut down...",
        DEFAULT_APP_NAME,
        full_version(),
        node.local_addr(),
        node.address()
    );

    // Single writer for stdout so event and result lines never interleave.
    let (out_tx, mut out_rx) = mpsc::channel::<String>(256);
    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(line) = out_rx.recv().await {
            if stdout.write_all(line.as_bytes()).await.is_err()
                || stdout.write_all(b"\n").await.is_err()
            {
                break;
            }
            let _ = stdout.flush().await;
        }
    });

    let event_out = out_tx.clone();
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            if event_out.send(event.as_json()).await.is_err() {
                break;
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = signal::ctrl_c() => break,
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    // stdin closed: keep relaying until Ctrl+C
                    Ok(None) | Err(_) => {
                        let _ = signal::ctrl_c().await;
                        break;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }
                let outcome = match Command::from_json(&line) {
                    Ok(command) => node.execute(command).await,
                    Err(e) => CommandOutcome::rejected(format!("invalid command: {}", e)),
                };
                let json = serde_json::to_string(&outcome).unwrap_or_else(|_| "{}".into());
                let _ = out_tx.send(json).await;
            }
        }
    }

    eprintln!("🛑 {} shutting down gracefully.", DEFAULT_APP_NAME);
    drop(out_tx);
    writer.abort();
    meshchat::events::flush_all().await;
    Ok(())
}
