//! Command line interface for the `qrc` binary.

use std::net::SocketAddr;

use clap::{Parser, Subcommand};

/// Command line arguments for the `qrc` binary.
#[derive(Debug, Parser)]
#[command(name = "qrc", version, about = "Talk to a Q-SYS Core over QRC")]
pub struct Cli {
    /// Core to connect to, as HOST[:PORT]. The port defaults to 1710.
    #[arg(short, long)]
    pub core: String,

    /// User name to log on with.
    #[arg(short, long, requires = "password")]
    pub user: Option<String>,

    /// Password to log on with.
    #[arg(short, long, requires = "user")]
    pub password: Option<String>,

    /// Seconds to wait for each reply.
    #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout: u64,

    /// Serve Prometheus metrics on this address.
    #[arg(long)]
    pub metrics_addr: Option<SocketAddr>,

    #[command(subcommand)]
    pub command: Command,
}

/// Operations the binary can perform.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Send one method call and print its result as JSON.
    Call {
        /// Method name, for example `StatusGet`.
        method: String,
        /// Parameters as a JSON document.
        params: Option<String>,
    },
    /// List the components of the running design.
    Components,
    /// List the controls of a named component.
    Controls {
        /// Component name.
        name: String,
    },
    /// Print status transitions, engine status and notifications until
    /// interrupted.
    Watch,
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::{Cli, Command};

    #[test]
    fn parses_call_with_params() {
        let cli = Cli::parse_from([
            "qrc",
            "--core",
            "10.0.0.5",
            "call",
            "Control.Get",
            r#"["gain"]"#,
        ]);
        assert_eq!(cli.core, "10.0.0.5");
        assert_eq!(cli.timeout, 10);
        match cli.command {
            Command::Call { method, params } => {
                assert_eq!(method, "Control.Get");
                assert_eq!(params.as_deref(), Some(r#"["gain"]"#));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn user_requires_password() {
        let result = Cli::try_parse_from(["qrc", "--core", "core", "--user", "admin", "watch"]);
        assert!(result.is_err());
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let result = Cli::try_parse_from(["qrc", "--core", "core", "--timeout", "0", "components"]);
        assert!(result.is_err());
    }
}
