use clap::Parser;
use miette::IntoDiagnostic;

use queenbee_config::{AuthEntry, Config};

#[derive(Debug, Parser)]
pub struct Args {
    #[command(subcommand)]
    command: ConfigCommand,
}

#[derive(Debug, Parser)]
pub enum ConfigCommand {
    /// Print the current configuration
    View,
    /// Store an auth token for a registry domain
    Auth {
        /// Host the token applies to, e.g. registry.pollination.cloud
        domain: String,
        /// The token value
        token: String,
        /// Send the token under this header instead of a bearer header
        #[clap(long)]
        header_name: Option<String>,
    },
}

pub async fn execute(args: Args) -> miette::Result<()> {
    match args.command {
        ConfigCommand::View => {
            let config = Config::load().into_diagnostic()?;
            print!("{}", serde_yaml::to_string(&config).into_diagnostic()?);
            Ok(())
        }
        ConfigCommand::Auth {
            domain,
            token,
            header_name,
        } => {
            let mut config = Config::load().into_diagnostic()?;
            let entry = match header_name {
                Some(header_name) => AuthEntry {
                    domain,
                    access_token: None,
                    api_token: Some(token),
                    header_name: Some(header_name),
                },
                None => AuthEntry {
                    domain,
                    access_token: Some(token),
                    api_token: None,
                    header_name: None,
                },
            };
            config.add_auth(entry);
            config.save().into_diagnostic()?;
            println!("stored auth configuration");
            Ok(())
        }
    }
}
