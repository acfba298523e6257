use clap::Parser;

mod cli;

#[tokio::main]
async fn main() -> miette::Result<()> {
    let args = cli::Args::parse();
    args.init_logging();
    cli::execute(args).await
}
