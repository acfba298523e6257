use std::path::PathBuf;

use clap::Parser;
use miette::{Context, IntoDiagnostic};

use queenbee_manifest::{DependencyKind, Plugin};
use queenbee_repository::package_folder;

#[derive(Debug, Parser)]
pub struct Args {
    #[command(subcommand)]
    command: PluginCommand,
}

#[derive(Debug, Parser)]
pub enum PluginCommand {
    /// Scaffold a new plugin folder with a sample function
    New {
        /// Name of the plugin to create
        name: String,
        /// Folder to create the plugin in [default: ./<name>]
        #[clap(long)]
        path: Option<PathBuf>,
    },
    /// Parse and validate a plugin folder
    Lint {
        /// Path to the plugin folder
        path: PathBuf,
    },
    /// Package a plugin folder into a gzipped tar archive
    Package {
        /// Path to the plugin folder
        path: PathBuf,
        /// Folder to write the package into
        #[clap(short = 'd', long = "destination", default_value = ".")]
        destination: PathBuf,
        /// Overwrite an existing package file
        #[clap(short, long)]
        force: bool,
    },
}

pub async fn execute(args: Args) -> miette::Result<()> {
    match args.command {
        PluginCommand::New { name, path } => new(name, path),
        PluginCommand::Lint { path } => lint(path),
        PluginCommand::Package {
            path,
            destination,
            force,
        } => package(path, destination, force),
    }
}

fn new(name: String, path: Option<PathBuf>) -> miette::Result<()> {
    let folder = path.unwrap_or_else(|| PathBuf::from(&name));
    if folder.exists() {
        miette::bail!("`{}` already exists", folder.display());
    }

    let plugin = Plugin::from_value(serde_json::json!({
        "metadata": {
            "name": name,
            "tag": "0.1.0",
            "description": "A Queenbee plugin",
        },
        "config": {
            "docker": {"image": "alpine:3.19", "registry": null, "workdir": "/opt/run"},
            "local": null
        },
        "functions": [{
            "name": "say-hi",
            "description": "Print a greeting",
            "inputs": [{
                "type": "FunctionStringInput",
                "name": "greeting-name",
                "default": "world"
            }],
            "outputs": [{
                "type": "FunctionFileOutput",
                "name": "greeting",
                "path": "greeting.txt"
            }],
            "command": "echo hi {{inputs.greeting-name}} > greeting.txt"
        }]
    }))
    .into_diagnostic()?;

    plugin.to_folder(&folder).into_diagnostic()?;
    fs_err::write(
        folder.join("README.md"),
        format!("# {name}\n\nA Queenbee plugin.\n"),
    )
    .into_diagnostic()?;

    println!("created plugin `{}` at {}", name, folder.display());
    Ok(())
}

fn lint(path: PathBuf) -> miette::Result<()> {
    let plugin = Plugin::from_folder(&path)
        .wrap_err_with(|| format!("`{}` is not a valid plugin folder", path.display()))?;
    println!(
        "plugin `{}` ({} functions) is valid",
        plugin.metadata.name,
        plugin.functions.len()
    );
    Ok(())
}

fn package(path: PathBuf, destination: PathBuf, force: bool) -> miette::Result<()> {
    let (version, bytes) = package_folder(DependencyKind::Plugin, &path, None).into_diagnostic()?;

    fs_err::create_dir_all(&destination).into_diagnostic()?;
    let target = destination.join(version.archive_name());
    if target.exists() && !force {
        miette::bail!(
            "`{}` already exists; pass --force to overwrite",
            target.display()
        );
    }
    fs_err::write(&target, bytes).into_diagnostic()?;

    println!("packaged `{}` (digest {})", target.display(), version.digest);
    Ok(())
}
