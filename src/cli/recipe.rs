use std::path::PathBuf;

use clap::Parser;
use miette::{Context, IntoDiagnostic};
use tokio_util::sync::CancellationToken;

use queenbee_baker::bake;
use queenbee_config::Config;
use queenbee_manifest::{DependencyKind, Recipe};
use queenbee_repository::{package_folder, RepositoryIndex, Transport, INDEX_FILE};
use queenbee_resolver::{
    install_dependencies, link_dependency, load_installed_manifests, LockOptions,
};

#[derive(Debug, Parser)]
pub struct Args {
    #[command(subcommand)]
    command: RecipeCommand,
}

#[derive(Debug, Parser)]
pub enum RecipeCommand {
    /// Scaffold a new recipe folder
    New {
        /// Name of the recipe to create
        name: String,
        /// Folder to create the recipe in [default: ./<name>]
        #[clap(long)]
        path: Option<PathBuf>,
    },
    /// Fetch dependencies and write them to the `.dependencies` folder
    Install {
        /// Path to the recipe folder
        path: PathBuf,
        /// Fail when a locked digest disappeared from its index instead
        /// of re-locking
        #[clap(long)]
        strict_digest: bool,
    },
    /// Point a dependency at a locally checked-out folder
    Link {
        /// Ref-name of the dependency to replace
        dependency: String,
        /// Path to the local plugin or recipe folder
        path: PathBuf,
        /// Path to the recipe folder the link is created in
        #[clap(short, long, default_value = ".")]
        recipe_path: PathBuf,
    },
    /// Validate a recipe, including a full bake against its dependencies
    Lint {
        /// Path to the recipe folder
        path: PathBuf,
        /// Refresh the `.dependencies` folder before linting
        #[clap(short, long)]
        update: bool,
    },
    /// Package a recipe folder, optionally straight into a repository
    Package {
        /// Path to the recipe folder
        path: PathBuf,
        /// Local repository folder to add the package to
        #[clap(short, long)]
        repository: Option<PathBuf>,
        /// Overwrite an existing package or index entry
        #[clap(short, long)]
        force: bool,
        /// Use the installed `.dependencies` as-is instead of refreshing
        #[clap(long)]
        no_update: bool,
    },
}

pub async fn execute(args: Args, cancel: &CancellationToken) -> miette::Result<()> {
    match args.command {
        RecipeCommand::New { name, path } => new(name, path),
        RecipeCommand::Install { path, strict_digest } => {
            install(path, strict_digest, cancel).await?;
            Ok(())
        }
        RecipeCommand::Link {
            dependency,
            path,
            recipe_path,
        } => {
            link_dependency(&recipe_path, &dependency, &path).into_diagnostic()?;
            println!("linked `{}` to {}", dependency, path.display());
            Ok(())
        }
        RecipeCommand::Lint { path, update } => lint(path, update, cancel).await,
        RecipeCommand::Package {
            path,
            repository,
            force,
            no_update,
        } => package(path, repository, force, no_update, cancel).await,
    }
}

fn new(name: String, path: Option<PathBuf>) -> miette::Result<()> {
    let folder = path.unwrap_or_else(|| PathBuf::from(&name));
    if folder.exists() {
        miette::bail!("`{}` already exists", folder.display());
    }

    let recipe = Recipe::from_value(serde_json::json!({
        "metadata": {
            "name": name,
            "tag": "0.1.0",
            "description": "A Queenbee recipe",
        },
        "dependencies": [],
        "flow": [{
            "name": "main",
            "inputs": [{
                "type": "DAGStringInput",
                "name": "greeting-name",
                "default": "world"
            }],
            "tasks": [],
            "outputs": []
        }]
    }))
    .into_diagnostic()?;

    recipe.to_folder(&folder).into_diagnostic()?;
    fs_err::write(
        folder.join("README.md"),
        format!("# {name}\n\nA Queenbee recipe.\n"),
    )
    .into_diagnostic()?;

    println!("created recipe `{}` at {}", name, folder.display());
    Ok(())
}

async fn install(
    path: PathBuf,
    strict_digest: bool,
    cancel: &CancellationToken,
) -> miette::Result<Recipe> {
    let config = Config::load().into_diagnostic()?;
    let options = LockOptions {
        strict_digest,
        ..LockOptions::default()
    };
    // Relative `file:` sources in dependencies.yaml resolve against the
    // recipe folder.
    let path = fs_err::canonicalize(&path).into_diagnostic()?;
    std::env::set_current_dir(&path).into_diagnostic()?;
    let recipe = install_dependencies(&path, &Transport::new(), &config, &options, cancel)
        .await
        .into_diagnostic()?;
    println!(
        "installed {} dependencies for `{}`",
        recipe.dependencies.len(),
        recipe.metadata.name
    );
    Ok(recipe)
}

/// Load a recipe folder and bake it against its installed dependencies.
///
/// `path` must be absolute: `install` moves the working directory into
/// the recipe folder so relative dependency sources resolve.
async fn load_and_bake(
    path: &PathBuf,
    update: bool,
    cancel: &CancellationToken,
) -> miette::Result<queenbee_manifest::BakedRecipe> {
    let recipe = if update {
        install(path.clone(), false, cancel).await?
    } else {
        Recipe::from_folder(path).into_diagnostic()?
    };
    let manifests = load_installed_manifests(path, &recipe).into_diagnostic()?;
    bake(&recipe, &manifests).into_diagnostic()
}

async fn lint(path: PathBuf, update: bool, cancel: &CancellationToken) -> miette::Result<()> {
    let path = fs_err::canonicalize(&path).into_diagnostic()?;
    let baked = load_and_bake(&path, update, cancel).await?;
    println!(
        "recipe `{}` is valid (digest {})",
        baked.metadata.name, baked.digest
    );
    Ok(())
}

async fn package(
    path: PathBuf,
    repository: Option<PathBuf>,
    force: bool,
    no_update: bool,
    cancel: &CancellationToken,
) -> miette::Result<()> {
    let path = fs_err::canonicalize(&path).into_diagnostic()?;
    let repository = repository
        .map(|repository| fs_err::canonicalize(&repository).into_diagnostic())
        .transpose()?;
    // `install` may move the working directory; packages land where the
    // command was invoked from.
    let invocation_dir = std::env::current_dir().into_diagnostic()?;

    // A recipe that cannot bake must not be published.
    load_and_bake(&path, !no_update, cancel)
        .await
        .wrap_err("the recipe does not bake against its dependencies")?;

    let (version, bytes) = package_folder(DependencyKind::Recipe, &path, None).into_diagnostic()?;

    let destination = match &repository {
        Some(repository) => repository.join(version.kind.folder_name()),
        None => invocation_dir,
    };
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

    // Keep the repository index in sync with the folder contents.
    if let Some(repository) = repository {
        let index_path = repository.join(INDEX_FILE);
        let mut index = if index_path.is_file() {
            RepositoryIndex::from_file(&index_path).into_diagnostic()?
        } else {
            RepositoryIndex::default()
        };
        index
            .merge_folder(&repository, force, false)
            .into_diagnostic()?;
        index.to_file(&index_path).into_diagnostic()?;
        println!("updated index `{}`", index_path.display());
    }
    Ok(())
}
