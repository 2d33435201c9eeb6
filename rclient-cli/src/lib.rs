//! Command-line front end for rclient.
//!
//! The argument model lives here so it can be tested; `main.rs` only wires
//! logging and the runtime.

pub mod commands;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use rclient::config::{CONFIG_ENV, ClientConfig};

/// Wallet and module deployment tool for RChain nodes
#[derive(Debug, Parser)]
#[command(name = "rclient")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Options shared by every command.
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Command to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Options shared by every command. Anything set here overrides the config file.
#[derive(Debug, Default, Args)]
pub struct GlobalArgs {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, env = CONFIG_ENV, global = true)]
    pub config: Option<PathBuf>,

    /// Keystore file
    #[arg(long, global = true)]
    pub keystore: Option<PathBuf>,

    /// Module registry file
    #[arg(long, global = true)]
    pub registry: Option<PathBuf>,

    /// Wallet contract source
    #[arg(long, global = true)]
    pub tools: Option<PathBuf>,

    /// Node host
    #[arg(long, global = true)]
    pub host: Option<String>,

    /// Node HTTP API port
    #[arg(long, global = true)]
    pub port: Option<u16>,

    /// Computation limit per deploy
    #[arg(long, global = true)]
    pub phlo_limit: Option<u64>,

    /// Price per computation unit
    #[arg(long, global = true)]
    pub phlo_price: Option<u64>,

    /// Milliseconds between result polls
    #[arg(long, global = true)]
    pub poll_interval: Option<u64>,

    /// Polls before giving up on a result
    #[arg(long, global = true)]
    pub max_polls: Option<u32>,
}

impl GlobalArgs {
    /// Apply command-line overrides on top of `config`.
    pub fn apply(&self, config: &mut ClientConfig) {
        if let Some(path) = &self.keystore {
            config.keystore.clone_from(path);
        }
        if let Some(path) = &self.registry {
            config.registry.clone_from(path);
        }
        if let Some(path) = &self.tools {
            config.tools_module.clone_from(path);
        }
        if let Some(host) = &self.host {
            config.node.host.clone_from(host);
        }
        if let Some(port) = self.port {
            config.node.port = port;
        }
        if let Some(limit) = self.phlo_limit {
            config.phlo.limit = limit;
        }
        if let Some(price) = self.phlo_price {
            config.phlo.price = price;
        }
        if let Some(interval) = self.poll_interval {
            config.poll.interval_ms = interval;
        }
        if let Some(max) = self.max_polls {
            config.poll.max_attempts = max;
        }
    }
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Generate a new key and store it under LABEL
    Keygen {
        /// Keystore label
        label: String,
    },

    /// Import a sealed key record or an Ethereum v3 keystore file
    Import {
        /// Keystore label
        label: String,
        /// Sealed key or v3 keystore JSON file
        file: PathBuf,
    },

    /// Show the identities derived from a stored key
    Info {
        /// Keystore label
        label: String,
    },

    /// Mint funds into the key's vault
    GenVault {
        /// Keystore label
        label: String,
        /// Amount to mint
        amount: u64,
    },

    /// Claim the wallet tied to the key's legacy address
    Claim {
        /// Keystore label
        label: String,
    },

    /// Show the key's vault balance
    Balance {
        /// Keystore label
        label: String,
    },

    /// Publish the key's wallet
    Publish {
        /// Keystore label
        label: String,
        /// The wallet was claimed rather than created
        #[arg(long)]
        claimed: bool,
        /// Publication nonce [default: current time in milliseconds]
        #[arg(long)]
        nonce: Option<u64>,
    },

    /// Transfer funds between vaults
    Transfer {
        /// Keystore label of the sender
        #[arg(long)]
        from: String,
        /// Destination vault address
        #[arg(long)]
        to: String,
        /// Amount to transfer
        amount: u64,
    },

    /// Sign the contents of a file with the legacy key
    Sign {
        /// Keystore label
        label: String,
        /// Sign the canonical form of a JSON document
        #[arg(long)]
        json: bool,
        /// File to sign
        file: PathBuf,
    },

    /// Deploy a Rholang term
    Deploy {
        /// Rholang source file
        file: PathBuf,
    },

    /// Deploy modules that are not yet in the registry
    Register {
        /// Rholang module files
        #[arg(required = true)]
        modules: Vec<PathBuf>,
    },
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("rclient").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_transfer() {
        let cli = parse(&["transfer", "--from", "alice", "--to", "1111abc", "25"]);
        match cli.command {
            Command::Transfer { from, to, amount } => {
                assert_eq!(from, "alice");
                assert_eq!(to, "1111abc");
                assert_eq!(amount, 25);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_parse_publish_flags() {
        let cli = parse(&["publish", "--claimed", "bob"]);
        assert!(matches!(
            cli.command,
            Command::Publish { claimed: true, nonce: None, ref label } if label == "bob"
        ));
        let cli = parse(&["publish", "--nonce", "42", "bob"]);
        assert!(matches!(
            cli.command,
            Command::Publish { claimed: false, nonce: Some(42), .. }
        ));
    }

    #[test]
    fn test_register_needs_modules() {
        assert!(Cli::try_parse_from(["rclient", "register"]).is_err());
        let cli = parse(&["register", "a.rho", "b.rho"]);
        assert!(matches!(cli.command, Command::Register { ref modules } if modules.len() == 2));
    }

    #[test]
    fn test_global_overrides() {
        let cli = parse(&[
            "--host",
            "node.example",
            "--port",
            "40413",
            "--phlo-limit",
            "500",
            "--max-polls",
            "3",
            "-vv",
            "balance",
            "carol",
            "--keystore",
            "/tmp/keys.json",
        ]);
        assert_eq!(cli.global.verbose, 2);

        let mut config = ClientConfig::default();
        cli.global.apply(&mut config);
        assert_eq!(config.node.base_url(), "http://node.example:40413");
        assert_eq!(config.phlo.limit, 500);
        assert_eq!(config.phlo.price, 1);
        assert_eq!(config.poll.max_attempts, 3);
        assert_eq!(config.keystore, PathBuf::from("/tmp/keys.json"));
        assert_eq!(config.registry, PathBuf::from("registry.json"));
    }
}
