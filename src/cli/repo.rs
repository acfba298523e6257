use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::extract::{Path as UrlPath, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Router, Server};
use clap::Parser;
use miette::IntoDiagnostic;
use tokio_util::sync::CancellationToken;

use queenbee_config::{Config, RepositoryReference};
use queenbee_manifest::DependencyKind;
use queenbee_repository::{
    init_repository, AuthHeader, RepositoryIndex, Transport, INDEX_FILE, LATEST_TAG,
};

#[derive(Debug, Parser)]
pub struct Args {
    #[command(subcommand)]
    command: RepoCommand,
}

#[derive(Debug, Parser)]
pub enum RepoCommand {
    /// Scaffold an empty repository folder
    Init {
        /// Folder to initialize
        path: PathBuf,
    },
    /// Crawl a repository folder and regenerate or merge its index
    Index {
        /// Path to the repository folder
        path: PathBuf,
        /// Merge into the existing index instead of regenerating
        #[clap(short, long)]
        merge: bool,
        /// Overwrite entries whose digest changed
        #[clap(short, long)]
        force: bool,
        /// Keep entries whose digest changed
        #[clap(short, long)]
        skip: bool,
    },
    /// Add a repository to the local configuration
    Add {
        /// Name to refer to the repository by
        name: String,
        /// Repository URL (`file:` or `http(s)`)
        url: String,
        /// Overwrite an existing repository with the same name
        #[clap(short, long)]
        force: bool,
    },
    /// List the repositories in the local configuration
    List,
    /// Remove a repository from the local configuration
    Remove {
        /// Name of the repository to remove
        name: String,
    },
    /// Search for packages across configured repositories
    Search {
        /// Only search the named repository
        #[clap(short, long)]
        repository: Option<String>,
        /// Only search for this kind of package
        #[clap(short = 't', long = "type")]
        kind: Option<DependencyKind>,
        /// Search query
        #[clap(short, long)]
        search: Option<String>,
    },
    /// Fetch and print one package version from a repository
    Get {
        /// Package kind (plugin or recipe)
        kind: DependencyKind,
        /// Name of the configured repository
        repo: String,
        /// Package name
        name: String,
        /// Package tag
        #[clap(short, long, default_value = LATEST_TAG)]
        tag: String,
    },
    /// Serve a local repository folder over HTTP
    Serve {
        /// Path to the repository folder
        path: PathBuf,
        /// Address to bind
        #[clap(short, long, default_value = "0.0.0.0")]
        address: String,
        /// Port to bind
        #[clap(short, long, default_value_t = 8000)]
        port: u16,
    },
}

pub async fn execute(args: Args, cancel: &CancellationToken) -> miette::Result<()> {
    match args.command {
        RepoCommand::Init { path } => {
            init_repository(&path).into_diagnostic()?;
            println!("initialized repository at {}", path.display());
            Ok(())
        }
        RepoCommand::Index {
            path,
            merge,
            force,
            skip,
        } => index(path, merge, force, skip),
        RepoCommand::Add { name, url, force } => add(name, url, force),
        RepoCommand::List => list(),
        RepoCommand::Remove { name } => remove(name),
        RepoCommand::Search {
            repository,
            kind,
            search,
        } => self::search(repository, kind, search, cancel).await,
        RepoCommand::Get {
            kind,
            repo,
            name,
            tag,
        } => get_package(kind, repo, name, tag, cancel).await,
        RepoCommand::Serve {
            path,
            address,
            port,
        } => serve(path, address, port).await,
    }
}

fn index(path: PathBuf, merge: bool, force: bool, skip: bool) -> miette::Result<()> {
    let index_path = path.join(INDEX_FILE);
    let index = if merge {
        let mut index = RepositoryIndex::from_file(&index_path).into_diagnostic()?;
        index.merge_folder(&path, force, skip).into_diagnostic()?;
        index
    } else {
        RepositoryIndex::from_folder(&path).into_diagnostic()?
    };
    index.to_file(&index_path).into_diagnostic()?;
    println!("indexed {}", index_path.display());
    Ok(())
}

fn add(name: String, url: String, force: bool) -> miette::Result<()> {
    let mut config = Config::load().into_diagnostic()?;
    config
        .add_repository(RepositoryReference::new(&name, url), force)
        .into_diagnostic()?;
    config.save().into_diagnostic()?;
    println!("added repository `{name}`");
    Ok(())
}

fn list() -> miette::Result<()> {
    let config = Config::load().into_diagnostic()?;
    println!(
        "{}",
        serde_json::to_string_pretty(&config.repositories).into_diagnostic()?
    );
    Ok(())
}

fn remove(name: String) -> miette::Result<()> {
    let mut config = Config::load().into_diagnostic()?;
    config.remove_repository(&name).into_diagnostic()?;
    config.save().into_diagnostic()?;
    println!("removed repository `{name}`");
    Ok(())
}

async fn fetch_index(
    config: &Config,
    reference: &RepositoryReference,
    transport: &Transport,
    cancel: &CancellationToken,
) -> miette::Result<RepositoryIndex> {
    let auth: Option<AuthHeader> = config.auth_header_for(&reference.path);
    let mut index = RepositoryIndex::fetch(&reference.path, transport, auth.as_ref(), cancel)
        .await
        .into_diagnostic()?;
    index.add_slugs(&reference.name);
    Ok(index)
}

async fn search(
    repository: Option<String>,
    kind: Option<DependencyKind>,
    query: Option<String>,
    cancel: &CancellationToken,
) -> miette::Result<()> {
    let config = Config::load().into_diagnostic()?;
    let transport = Transport::new();

    let references: Vec<&RepositoryReference> = match &repository {
        Some(name) => config
            .repository(name)
            .map(|reference| vec![reference])
            .unwrap_or_default(),
        None => config.repositories.iter().collect(),
    };

    let mut results = Vec::new();
    for reference in references {
        let index = fetch_index(&config, reference, &transport, cancel).await?;
        results.extend(index.search(kind, query.as_deref()));
    }
    println!("{}", serde_json::to_string_pretty(&results).into_diagnostic()?);
    Ok(())
}

async fn get_package(
    kind: DependencyKind,
    repo: String,
    name: String,
    tag: String,
    cancel: &CancellationToken,
) -> miette::Result<()> {
    let config = Config::load().into_diagnostic()?;
    let transport = Transport::new();

    let Some(reference) = config.repository(&repo) else {
        miette::bail!("no repository named `{repo}` is configured");
    };
    let index = fetch_index(&config, reference, &transport, cancel).await?;
    let row = index
        .package_by_tag(kind, &name, &tag)
        .into_diagnostic()?;

    let auth = config.auth_header_for(&reference.path);
    let mut package = row
        .fetch_package(&reference.path, &transport, auth.as_ref(), true, cancel)
        .await
        .into_diagnostic()?;
    package.slug = Some(format!("{repo}/{name}"));

    println!("{}", serde_json::to_string_pretty(&package).into_diagnostic()?);
    Ok(())
}

async fn serve(path: PathBuf, address: String, port: u16) -> miette::Result<()> {
    let root = fs_err::canonicalize(&path).into_diagnostic()?;
    let app = Router::new()
        .route("/", get(serve_index))
        .route("/*path", get(serve_file))
        .with_state(Arc::new(root));

    let addr: SocketAddr = format!("{address}:{port}").parse().into_diagnostic()?;
    println!("serving {} on http://{addr}/ ...", path.display());
    Server::bind(&addr)
        .serve(app.into_make_service())
        .await
        .into_diagnostic()
}

async fn serve_index(state: State<Arc<PathBuf>>) -> impl IntoResponse {
    serve_file(state, UrlPath(INDEX_FILE.to_string())).await
}

async fn serve_file(
    State(root): State<Arc<PathBuf>>,
    UrlPath(path): UrlPath<String>,
) -> (StatusCode, [(header::HeaderName, &'static str); 1], Vec<u8>) {
    let content_type = |path: &Path| match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => "application/json",
        Some("md") => "text/markdown",
        _ => "application/octet-stream",
    };

    // Reject traversal outside the repository root.
    if path.split('/').any(|segment| segment == "..") {
        return (
            StatusCode::NOT_FOUND,
            [(header::CONTENT_TYPE, "application/octet-stream")],
            Vec::new(),
        );
    }

    let target = root.join(&path);
    match tokio::fs::read(&target).await {
        Ok(bytes) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, content_type(&target))],
            bytes,
        ),
        Err(_) => (
            StatusCode::NOT_FOUND,
            [(header::CONTENT_TYPE, "application/octet-stream")],
            Vec::new(),
        ),
    }
}
