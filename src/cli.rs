use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    /// Base URL of the extraction service (overrides COMIC_VIEWER_BACKEND_URL).
    #[arg(long, global = true)]
    pub backend_url: Option<String>,

    /// Base URL of the app serving the proxy routes (overrides COMIC_VIEWER_APP_URL).
    #[arg(long, global = true)]
    pub app_url: Option<String>,

    /// JSON file standing in for the browser's durable storage.
    #[arg(long, global = true, default_value = "comic-viewer-state.json")]
    pub store: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Extract an archive and read it interactively from stdin.
    Read(ReadArgs),
    /// Hand an edition over to the viewer (what a listing page does).
    Open(OpenArgs),
    /// Print the edition currently handed over, as JSON.
    Show,
    /// Forget the handed-over edition and any recovery marker.
    Clear,
    /// Follow an extraction task until it finishes, printing each progress response.
    Status(StatusArgs),
}

#[derive(Debug, Args)]
pub struct ReadArgs {
    /// Drive link to extract; defaults to the handed-over one.
    #[arg(long)]
    pub link: Option<String>,

    /// Edition title; defaults to the handed-over one.
    #[arg(long)]
    pub title: Option<String>,

    /// Location the viewer is mounted at, compared against the recovery marker.
    #[arg(long, default_value = crate::viewer::DEFAULT_LOCATION)]
    pub location: String,
}

#[derive(Debug, Args)]
pub struct OpenArgs {
    #[arg(long)]
    pub link: String,

    #[arg(long)]
    pub title: String,

    /// 1-based page numbers where chapters start.
    #[arg(long, value_delimiter = ',')]
    pub toc: Option<Vec<u32>>,

    /// Chapter labels, positionally matching `--toc`.
    #[arg(long, value_delimiter = ',')]
    pub labels: Option<Vec<String>>,

    /// Where to send the reader back once the session expires.
    #[arg(long, default_value = "/")]
    pub return_url: String,
}

#[derive(Debug, Args)]
pub struct StatusArgs {
    /// Task identifier returned by the extraction service.
    #[arg(long)]
    pub task: String,
}
