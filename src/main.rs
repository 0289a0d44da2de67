use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    comic_viewer::logging::init().context("init logging")?;

    let cli = comic_viewer::cli::Cli::parse();
    tracing::debug!(?cli, "parsed cli");
    let config = comic_viewer::commands::config_for(&cli);

    match cli.command {
        comic_viewer::cli::Command::Read(args) => {
            comic_viewer::commands::read(config, &cli.store, args)
                .await
                .context("read")?;
        }
        comic_viewer::cli::Command::Open(args) => {
            comic_viewer::commands::open(&cli.store, args).context("open")?;
        }
        comic_viewer::cli::Command::Show => {
            comic_viewer::commands::show(&cli.store).context("show")?;
        }
        comic_viewer::cli::Command::Clear => {
            comic_viewer::commands::clear(&cli.store).context("clear")?;
        }
        comic_viewer::cli::Command::Status(args) => {
            comic_viewer::commands::status(&config, args)
                .await
                .context("status")?;
        }
    }

    Ok(())
}
