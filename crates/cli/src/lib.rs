use clap::{Args, Parser, Subcommand};
use config::ConfigOverrides;
use std::path::PathBuf;

pub const DEFAULT_CONFIG_PATH: &str = "martd.yaml";

#[derive(Parser, Debug)]
#[command(name = "martd")]
#[command(about = "Loyalty ledger with asynchronous accrual reconciliation")]
#[command(version)]
#[command(args_conflicts_with_subcommands = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Flags accepted without a subcommand, equivalent to `martd serve ...`
    #[command(flatten)]
    pub serve: ServeArgs,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the HTTP API and the reconciliation worker (default)
    Serve(ServeArgs),

    /// Validate configuration without starting the service
    Validate {
        /// Path to the configuration file
        #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
    },

    /// Write a configuration file with all defaults
    Init {
        /// Output path for the new configuration file
        #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
        output: PathBuf,
    },
}

#[derive(Args, Debug, Clone, Default)]
pub struct ServeArgs {
    /// Path to the configuration file (missing file means defaults)
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// HTTP listen address, host:port
    #[arg(short = 'a', long = "address", env = "RUN_ADDRESS")]
    pub address: Option<String>,

    /// Accrual service base address
    #[arg(short = 'r', long = "accrual", env = "ACCRUAL_SYSTEM_ADDRESS")]
    pub accrual: Option<String>,

    /// PostgreSQL connection string; in-memory store when absent
    #[arg(short = 'd', long = "database", env = "DATABASE_URI", hide_env_values = true)]
    pub database: Option<String>,

    /// Token signing secret
    #[arg(long = "jwt-secret", env = "JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: Option<String>,

    /// Log filter directive
    #[arg(long = "log-level", env = "LOG_LEVEL")]
    pub log_level: Option<String>,
}

impl ServeArgs {
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            server_address: self.address.clone(),
            accrual_address: self.accrual.clone(),
            database_uri: self.database.clone(),
            jwt_secret: self.jwt_secret.clone(),
            log_level: self.log_level.clone(),
        }
    }
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// The subcommand to run; bare flags mean `serve`
    pub fn into_command(self) -> Commands {
        self.command.unwrap_or(Commands::Serve(self.serve))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_bare_flags_mean_serve() {
        let cli = Cli::try_parse_from(["martd", "-a", "0.0.0.0:8000", "-r", "accrual:9000"]).unwrap();
        match cli.into_command() {
            Commands::Serve(args) => {
                assert_eq!(args.address.as_deref(), Some("0.0.0.0:8000"));
                assert_eq!(args.accrual.as_deref(), Some("accrual:9000"));
                assert_eq!(args.config, PathBuf::from(DEFAULT_CONFIG_PATH));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_serve_subcommand_overrides() {
        let cli = Cli::try_parse_from([
            "martd",
            "serve",
            "-c",
            "/etc/martd.yaml",
            "-d",
            "postgres://localhost/mart",
        ])
        .unwrap();
        let Commands::Serve(args) = cli.into_command() else {
            panic!("expected serve");
        };
        let overrides = args.overrides();
        assert_eq!(args.config, PathBuf::from("/etc/martd.yaml"));
        assert_eq!(overrides.database_uri.as_deref(), Some("postgres://localhost/mart"));
    }

    #[test]
    fn test_validate_and_init() {
        let cli = Cli::try_parse_from(["martd", "validate", "-c", "x.yaml"]).unwrap();
        assert!(matches!(cli.into_command(), Commands::Validate { config } if config == PathBuf::from("x.yaml")));

        let cli = Cli::try_parse_from(["martd", "init"]).unwrap();
        assert!(matches!(cli.into_command(), Commands::Init { output } if output == PathBuf::from(DEFAULT_CONFIG_PATH)));
    }
}
