use flowlens::cli::{Cli, Commands, ConfigAction};
use flowlens::config::Config;
use flowlens::correlator::{Collector, FlowMessage, IngestClient};
use flowlens::error::{FlowlensError, Result};

fn main() -> Result<()> {
    init_logging();

    let cli = Cli::parse_args();

    match cli.command {
        Commands::Run {
            socket,
            out_dir,
            urls_file,
        } => {
            cmd_run(cli.config, socket, out_dir, urls_file)?;
        }
        Commands::Status => {
            cmd_status(cli.config)?;
        }
        Commands::Config { action } => {
            cmd_config(cli.config, action)?;
        }
    }

    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("flowlens=info"));

    fmt().with_env_filter(filter).with_target(false).init();
}

fn cmd_run(
    config_path: Option<std::path::PathBuf>,
    socket: Option<std::path::PathBuf>,
    out_dir: Option<std::path::PathBuf>,
    urls_file: Option<std::path::PathBuf>,
) -> Result<()> {
    let mut config = load_config(config_path)?;

    // CLI overrides win over file and environment
    if let Some(socket) = socket {
        config.capture.socket_path = socket;
    }
    if let Some(out_dir) = out_dir {
        config.output.directory = out_dir;
    }
    if let Some(urls_file) = urls_file {
        config.scope.allowed_domains = load_allowed_hosts(&urls_file)?;
    }

    config.capture.socket_path = expand_path(&config.capture.socket_path)?;
    config.output.directory = expand_path(&config.output.directory)?;

    tracing::info!("Starting capture run");

    let mut collector = Collector::new(config);

    let rt = tokio::runtime::Runtime::new().map_err(|e| FlowlensError::Io {
        source: e,
        context: "Failed to create tokio runtime".to_string(),
    })?;
    let artifact_path = rt.block_on(collector.run())?;

    println!("✓ Run finalized");
    println!("  Artifact: {}", artifact_path.display());

    Ok(())
}

fn cmd_status(config_path: Option<std::path::PathBuf>) -> Result<()> {
    let config = load_config(config_path)?;
    let socket_path = expand_path(&config.capture.socket_path)?;

    let rt = tokio::runtime::Runtime::new().map_err(|e| FlowlensError::Io {
        source: e,
        context: "Failed to create tokio runtime".to_string(),
    })?;

    let client = IngestClient::new(socket_path.clone());
    match rt.block_on(client.send(&FlowMessage::Status)) {
        Ok(ack) if ack.success => {
            println!("Collector: running ({})", socket_path.display());
        }
        _ => {
            println!("Collector: not running");
        }
    }

    Ok(())
}

fn cmd_config(config_path: Option<std::path::PathBuf>, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(config_path)?;
            let json = serde_json::to_string_pretty(&config).map_err(|e| FlowlensError::Json {
                source: e,
                context: "Failed to serialize config".to_string(),
            })?;
            println!("{}", json);
        }
        ConfigAction::Validate { file } => {
            let path = match file.or(config_path) {
                Some(path) => path,
                None => Config::default_path()?,
            };
            let config = Config::load(&path)?;
            println!("✓ Configuration is valid");
            println!("  Schema version: {}", config.meta.schema_version);
        }
        ConfigAction::Init { force } => {
            let path = Config::default_path()?;

            if path.exists() && !force {
                println!("Configuration file already exists at: {}", path.display());
                println!("Use --force to overwrite");
                return Ok(());
            }

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| FlowlensError::Io {
                    source: e,
                    context: format!("Failed to create config directory: {:?}", parent),
                })?;
            }

            let config = Config::default();
            config.save(&path)?;

            println!("✓ Configuration initialized at: {}", path.display());
        }
    }

    Ok(())
}

fn load_config(config_path: Option<std::path::PathBuf>) -> Result<Config> {
    let path = match config_path {
        Some(path) => path,
        None => Config::default_path()?,
    };

    if !path.exists() {
        tracing::warn!(
            "Config file not found, using defaults. Run 'flowlens config init' to create one."
        );
        let mut config = Config::default();
        config.apply_env_overrides();
        return Ok(config);
    }

    Config::load(&path)
}

/// Parse a target-URL list: one URL per line, blank lines and #-comments
/// skipped. The hostnames become the capture scope; an empty result means
/// unrestricted capture.
fn load_allowed_hosts(path: &std::path::Path) -> Result<Option<Vec<String>>> {
    let content = std::fs::read_to_string(path).map_err(|e| FlowlensError::Io {
        source: e,
        context: format!("Failed to read URLs file: {:?}", path),
    })?;

    let mut hosts: Vec<String> = Vec::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match url::Url::parse(line) {
            Ok(parsed) => {
                if let Some(host) = parsed.host_str() {
                    if !hosts.iter().any(|h| h == host) {
                        hosts.push(host.to_string());
                    }
                }
            }
            Err(e) => {
                tracing::warn!("Skipping unparsable URL '{}': {}", line, e);
            }
        }
    }

    if hosts.is_empty() {
        tracing::warn!("No hostnames loaded from {:?}, capturing everything", path);
        Ok(None)
    } else {
        Ok(Some(hosts))
    }
}

fn expand_path(path: &std::path::Path) -> Result<std::path::PathBuf> {
    let path_str = path
        .to_str()
        .ok_or_else(|| FlowlensError::Config("Invalid path encoding".to_string()))?;

    if let Some(stripped) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| FlowlensError::Config("Cannot determine home directory".to_string()))?;
        Ok(home.join(stripped))
    } else {
        Ok(path.to_path_buf())
    }
}
