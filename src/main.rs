mod availability;
mod booking;
mod client;
mod commands;
mod config;
mod error;
mod hooks;
mod layout;
mod models;
#[cfg(test)]
mod testing;
mod view;
mod web;
mod widget;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};

use commands::Overrides;
use models::FormData;

/// Embeddable booking widget for the Timekit scheduling API.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Print detailed API responses
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// Log every widget lifecycle hook
    #[arg(long, global = true)]
    trace_hooks: bool,
}

#[derive(Args, Debug)]
struct ConfigArgs {
    /// Path to the widget config file
    #[arg(short = 'c', long, default_value = "widget.toml")]
    config: PathBuf,

    /// Override the app slug from config
    #[arg(long)]
    app: Option<String>,

    /// Override the host account email from config
    #[arg(short = 'e', long)]
    email: Option<String>,

    /// Override the host API token from config
    #[arg(long)]
    api_token: Option<String>,

    /// Load a remote widget definition by id
    #[arg(long, conflicts_with = "widget_slug")]
    widget_id: Option<String>,

    /// Load a remote widget definition by slug
    #[arg(long)]
    widget_slug: Option<String>,
}

impl ConfigArgs {
    fn load(&self) -> Result<serde_json::Value> {
        let overrides = Overrides {
            app: self.app.clone(),
            email: self.email.clone(),
            api_token: self.api_token.clone(),
            widget_id: self.widget_id.clone(),
            widget_slug: self.widget_slug.clone(),
        };
        commands::load_supplied(&self.config, &overrides)
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List bookable times the way the widget would render them
    Availability {
        #[command(flatten)]
        config: ConfigArgs,
    },

    /// Book one of the listed times
    ///
    /// Examples:
    ///   book 0 --name "Marty McFly" --customer-email marty@example.com
    ///   book 3 -n Doc --customer-email doc@example.com --comment "Flux capacitor"
    Book {
        /// Index of the slot as printed by `availability`
        #[arg(value_name = "INDEX")]
        index: usize,

        #[arg(short = 'n', long)]
        name: String,

        /// Customer email (receives the invitation)
        #[arg(long = "customer-email")]
        customer_email: String,

        #[arg(long)]
        comment: Option<String>,

        #[arg(long)]
        phone: Option<String>,

        #[arg(long)]
        voip: Option<String>,

        #[arg(long)]
        location: Option<String>,

        #[command(flatten)]
        config: ConfigArgs,
    },

    /// Show the config layers and the resolved settings
    Config {
        #[command(flatten)]
        config: ConfigArgs,
    },

    /// Serve the widget as a web page
    Serve {
        #[command(flatten)]
        config: ConfigArgs,

        /// Listen address (e.g. "0.0.0.0:3000")
        #[arg(short = 'a', long, default_value = "0.0.0.0:3009")]
        addr: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let hooks = commands::tracing_hooks(cli.trace_hooks);

    match cli.command {
        Command::Availability { config } => {
            commands::run_availability(config.load()?, hooks, cli.verbose).await?;
        }
        Command::Book {
            index,
            name,
            customer_email,
            comment,
            phone,
            voip,
            location,
            config,
        } => {
            let form = FormData {
                name,
                email: customer_email,
                comment,
                phone,
                voip,
                location,
            };
            commands::run_book(config.load()?, hooks, index, form).await?;
        }
        Command::Config { config } => {
            commands::run_config(config.load()?)?;
        }
        Command::Serve { config, addr } => {
            commands::run_serve(config.load()?, hooks, &addr).await?;
        }
    }

    Ok(())
}
