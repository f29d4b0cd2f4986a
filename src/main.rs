use std::error::Error;
use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

use catalog_api::auth::purge_expired_credentials;
use catalog_api::config::loader::{load_config, ConfigError};
use catalog_api::config::validation::validate_config;
use catalog_api::http::{Collaborators, HttpServer};
use catalog_api::lifecycle::LifecycleController;
use catalog_api::observability::{logging, metrics};
use catalog_api::ApiConfig;

/// Movie catalog API server.
#[derive(Debug, Parser)]
#[command(name = "catalog-api", version, long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// API server port
    #[arg(long)]
    port: Option<u16>,

    /// Environment (development|staging|production)
    #[arg(long)]
    env: Option<String>,

    /// Rate limiter maximum requests per second
    #[arg(long = "limiter-rps")]
    limiter_rps: Option<f64>,

    /// Rate limiter maximum burst
    #[arg(long = "limiter-burst")]
    limiter_burst: Option<u32>,

    /// Enable rate limiter
    #[arg(long = "limiter-enabled")]
    limiter_enabled: Option<bool>,

    /// Trusted CORS origins (space separated)
    #[arg(long = "cors-trusted-origins")]
    cors_trusted_origins: Option<String>,
}

impl Cli {
    /// Apply command-line overrides on top of file values.
    fn apply(&self, config: &mut ApiConfig) {
        if let Some(port) = self.port {
            config.listener.bind_address = match config.listener.bind_address.parse::<SocketAddr>() {
                Ok(mut addr) => {
                    addr.set_port(port);
                    addr.to_string()
                }
                Err(_) => format!("0.0.0.0:{port}"),
            };
        }
        if let Some(env) = &self.env {
            config.listener.environment = env.clone();
        }
        if let Some(rps) = self.limiter_rps {
            config.limiter.requests_per_second = rps;
        }
        if let Some(burst) = self.limiter_burst {
            config.limiter.burst = burst;
        }
        if let Some(enabled) = self.limiter_enabled {
            config.limiter.enabled = enabled;
        }
        if let Some(origins) = &self.cors_trusted_origins {
            config.cors.trusted_origins = origins.split_whitespace().map(str::to_owned).collect();
        }
    }

    fn load(&self) -> Result<ApiConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => ApiConfig::default(),
        };
        self.apply(&mut config);
        validate_config(&config).map_err(ConfigError::Validation)?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match cli.load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("catalog-api: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = logging::init(&config.observability) {
        eprintln!("catalog-api: {e}");
        std::process::exit(1);
    }

    if let Err(e) = run(config).await {
        tracing::error!(error = %e, "Server exited with error");
        std::process::exit(1);
    }
}

async fn run(config: ApiConfig) -> Result<(), Box<dyn Error>> {
    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics exporter");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let controller = LifecycleController::new(&config.shutdown);
    let collaborators = Collaborators::in_memory(&config.auth.seed)?;

    let tasks = controller.tasks();
    tasks.run(
        "credential_purge",
        purge_expired_credentials(
            collaborators.credentials.clone(),
            config.auth.purge_interval(),
            controller.shutdown(),
        ),
    );

    let server = HttpServer::new(&config, collaborators, tasks);

    let sweeper = server
        .limiter()
        .is_enabled()
        .then(|| server.limiter().spawn_sweeper(controller.shutdown()));

    tracing::info!(
        addr = %config.listener.bind_address,
        env = %config.listener.environment,
        limiter_enabled = config.limiter.enabled,
        "Starting server"
    );

    let result = controller.run(&config.listener.bind_address, server.into_router()).await;

    if let Some(sweeper) = sweeper {
        // The trigger fired during shutdown; this returns promptly.
        let _ = sweeper.await;
    }
    Ok(result?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_file_values() {
        let cli = Cli::parse_from([
            "catalog-api",
            "--port",
            "8080",
            "--env",
            "staging",
            "--limiter-enabled",
            "true",
            "--limiter-rps",
            "5",
            "--cors-trusted-origins",
            "https://a.example https://b.example",
        ]);
        let mut config = ApiConfig::default();
        cli.apply(&mut config);

        assert_eq!(config.listener.bind_address, "0.0.0.0:8080");
        assert_eq!(config.listener.environment, "staging");
        assert!(config.limiter.enabled);
        assert_eq!(config.limiter.requests_per_second, 5.0);
        assert_eq!(config.limiter.burst, 4);
        assert_eq!(config.cors.trusted_origins.len(), 2);
    }

    #[test]
    fn invalid_override_fails_validation() {
        let cli = Cli::parse_from(["catalog-api", "--env", "qa"]);
        assert!(matches!(cli.load(), Err(ConfigError::Validation(_))));
    }
}
