//! hostwall CLI - Toggle host firewall access and block domains
//!
//! A command-line tool for allowing or denying ports and services,
//! blocking domains, and restoring a safe firewall baseline.

mod commands;
mod logger;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "hostwall")]
#[command(author, version, about = "Toggle host firewall access and block domains")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Settings file (default: ~/.hostwall/config.json)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Log every sub-command to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the numbered firewall rule listing
    Status,

    /// Allow (on) or deny (off) a named service
    Service {
        /// http, https, ssh, dns, ftp or smtp
        name: String,
        /// on or off
        action: String,
    },

    /// Allow (on) or deny (off) a port
    Port {
        /// Port number (1-65535)
        port: String,
        /// on or off
        action: String,
        /// tcp, udp or any
        #[arg(short, long, default_value = "tcp")]
        protocol: String,
    },

    /// Block a domain and its www. form
    Block { domain: String },

    /// Unblock a domain and its www. form
    Unblock { domain: String },

    /// List blocked domains
    #[command(alias = "ls")]
    Blocked,

    /// Remove every rule and restore deny-incoming / allow-outgoing
    Reset {
        /// Confirm the reset
        #[arg(long)]
        yes: bool,
    },

    /// Manage settings
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current settings
    Show,
    /// Write the default settings file if none exists
    Init,
    /// Print the settings file location
    Path,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logger::init(cli.verbose);

    let config = cli.config.as_deref();

    match cli.command {
        Commands::Status => commands::status::run(config, cli.json).await?,
        Commands::Service { name, action } => {
            commands::toggle::service(config, &name, &action, cli.json).await?
        }
        Commands::Port {
            port,
            action,
            protocol,
        } => commands::toggle::port(config, &port, &action, &protocol, cli.json).await?,
        Commands::Block { domain } => commands::domain::block(config, &domain, cli.json).await?,
        Commands::Unblock { domain } => {
            commands::domain::unblock(config, &domain, cli.json).await?
        }
        Commands::Blocked => commands::domain::list(config, cli.json).await?,
        Commands::Reset { yes } => commands::reset::run(config, yes, cli.json).await?,
        Commands::Config { action } => match action.unwrap_or(ConfigAction::Show) {
            ConfigAction::Show => commands::config::show(config, cli.json).await?,
            ConfigAction::Init => commands::config::init(config).await?,
            ConfigAction::Path => commands::config::path(config)?,
        },
    }

    Ok(())
}
