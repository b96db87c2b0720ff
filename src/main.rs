use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use postmock::dom::Document;
use postmock::{DirectorySink, ExportConfig, Exporter};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "postmock", version, about = "Social post mockup exporter and image relay")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the cross-origin image relay
    #[cfg(feature = "relay")]
    Serve {
        #[arg(long, default_value = "127.0.0.1:8787")]
        bind: std::net::SocketAddr,
        /// Restrict upstream hosts (repeatable); subdomains match too
        #[arg(long = "allow-host")]
        allow_hosts: Vec<String>,
        /// Only relay `image/*` responses
        #[arg(long)]
        images_only: bool,
        #[arg(long)]
        max_body_bytes: Option<usize>,
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
    /// Export a subtree of an HTML file as a PNG
    Export {
        /// HTML document containing the preview
        #[arg(long)]
        html: PathBuf,
        /// Id of the element to export
        #[arg(long)]
        target: String,
        /// File name prefix; the timestamp and `.png` are appended
        #[arg(long)]
        name: String,
        #[arg(long, default_value = ".")]
        out: PathBuf,
        /// JSON file with `ExportConfig` fields
        #[arg(long)]
        config: Option<PathBuf>,
        /// Origin the document is considered to be served from
        #[arg(long)]
        origin: Option<String>,
        #[arg(long)]
        relay_path: Option<String>,
        #[arg(long)]
        user_agent: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match cli.command {
        #[cfg(feature = "relay")]
        Command::Serve {
            bind,
            allow_hosts,
            images_only,
            max_body_bytes,
            timeout_ms,
        } => {
            let mut config = postmock::relay::RelayConfig {
                allowed_hosts: allow_hosts,
                images_only,
                ..Default::default()
            };
            if let Some(max) = max_body_bytes {
                config.max_body_bytes = max;
            }
            if let Some(ms) = timeout_ms {
                config.timeout_ms = ms;
            }
            if config.allowed_hosts.is_empty() {
                log::warn!("No --allow-host given: the relay will fetch from any host");
            }
            postmock::relay::serve(bind, config).await?;
        }
        Command::Export {
            html,
            target,
            name,
            out,
            config,
            origin,
            relay_path,
            user_agent,
        } => {
            let mut cfg = match config {
                Some(path) => {
                    let raw = std::fs::read_to_string(&path)
                        .with_context(|| format!("reading {}", path.display()))?;
                    serde_json::from_str::<ExportConfig>(&raw)
                        .with_context(|| format!("parsing {}", path.display()))?
                }
                None => ExportConfig::default(),
            };
            if let Some(origin) = origin {
                cfg.page_origin = origin;
            }
            if let Some(path) = relay_path {
                cfg.relay_path = path;
            }
            if let Some(ua) = user_agent {
                cfg.device.user_agent = ua;
            }

            let source = std::fs::read_to_string(&html)
                .with_context(|| format!("reading {}", html.display()))?;
            let mut doc = Document::parse(&source);

            let exporter = Exporter::new(cfg)?.with_sink(DirectorySink::new(&out));
            match exporter.try_export(&mut doc, &target, &name).await {
                Ok(file) => println!("{}", out.join(&file.file_name).display()),
                Err(e) => bail!("export of '{}' failed: {}", target, e),
            }
        }
    }
    Ok(())
}
