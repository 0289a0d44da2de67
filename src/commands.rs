use std::sync::Arc;

use anyhow::Context as _;
use tokio::io::{AsyncBufReadExt as _, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::backend::{ExtractionBackend, HttpBackend, HttpImageLoader, ImageLoader};
use crate::cli::{Cli, OpenArgs, ReadArgs, StatusArgs};
use crate::config::ViewerConfig;
use crate::handoff::{self, ViewerHandoff};
use crate::keepalive::Visibility;
use crate::layout::Preset;
use crate::poll::{PollEvent, PollOptions, spawn_poller};
use crate::recovery;
use crate::store::{JsonFileStore, KeyValueStore};
use crate::viewer::{ImageLoad, Notice, Viewer};

pub fn config_for(cli: &Cli) -> ViewerConfig {
    let mut config = ViewerConfig::from_env();
    if let Some(url) = &cli.backend_url {
        config = config.with_backend_url(url.as_str());
    }
    if let Some(url) = &cli.app_url {
        config = config.with_app_url(url.as_str());
    }
    config
}

pub fn open(store_path: &str, args: OpenArgs) -> anyhow::Result<()> {
    if args.link.trim().is_empty() {
        anyhow::bail!("--link must not be empty");
    }
    let store = JsonFileStore::open(store_path);
    let handoff = ViewerHandoff {
        link: args.link.trim().to_owned(),
        title: args.title,
        table_content: args.toc,
        labels: args.labels,
    };
    handoff::open_in_viewer(&store, &handoff, &args.return_url, recovery::now_ms());
    println!("{}", store.path().display());
    Ok(())
}

pub fn show(store_path: &str) -> anyhow::Result<()> {
    let store = JsonFileStore::open(store_path);
    let handoff = handoff::read_handoff(&store).context("no edition handed over")?;
    let json = serde_json::to_string_pretty(&handoff).context("serialize handoff")?;
    println!("{json}");
    Ok(())
}

pub fn clear(store_path: &str) -> anyhow::Result<()> {
    let store = JsonFileStore::open(store_path);
    handoff::clear_handoff(&store);
    Ok(())
}

/// Follows one task with the polling client and prints every snapshot as a JSON line.
pub async fn status(config: &ViewerConfig, args: StatusArgs) -> anyhow::Result<()> {
    let backend: Arc<dyn ExtractionBackend> =
        Arc::new(HttpBackend::new(&config.backend_url, &config.app_url));
    let options = PollOptions {
        interval: config.poll_interval,
        timeout: config.poll_timeout,
    };
    let (tx, mut rx) = mpsc::unbounded_channel();
    let root = CancellationToken::new();
    let _poller = spawn_poller(backend, args.task.clone(), options, &root, move |event| {
        let _ = tx.send(event);
    });

    while let Some(event) = rx.recv().await {
        match event {
            PollEvent::Update(snapshot) | PollEvent::Done(snapshot) => {
                let json = serde_json::to_string(&snapshot).context("serialize progress")?;
                println!("{json}");
            }
            PollEvent::Failed(err) => {
                return Err(err).with_context(|| format!("watch task {}", args.task));
            }
            PollEvent::Cleared => break,
        }
    }
    Ok(())
}

enum Input {
    Line(Option<String>),
    Notice(Notice),
    Image { src: String, result: Result<(), String> },
    Stepped,
    Interrupted,
}

/// Interactive reading session driven by stdin lines.
pub async fn read(config: ViewerConfig, store_path: &str, args: ReadArgs) -> anyhow::Result<()> {
    let store: Arc<dyn KeyValueStore> = Arc::new(JsonFileStore::open(store_path));
    let backend: Arc<dyn ExtractionBackend> =
        Arc::new(HttpBackend::new(&config.backend_url, &config.app_url));
    let loader: Arc<dyn ImageLoader> = Arc::new(HttpImageLoader::new(&config.app_url));

    let (mut viewer, mut notices) =
        Viewer::new(config, backend, Arc::clone(&store), Arc::clone(&loader));
    let decision = viewer.mount(&args.location);
    tracing::debug!(?decision, "mounted viewer");

    if let Some(title) = &args.title {
        viewer.set_title(title);
    }
    if let Some(link) = &args.link {
        let title = viewer.title().to_owned();
        viewer.submit(link, &title).context("submit link")?;
    }

    let (image_tx, mut image_rx) = mpsc::unbounded_channel();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let input = tokio::select! {
            line = lines.next_line() => Input::Line(line.context("read stdin")?),
            Some(notice) = notices.recv() => Input::Notice(notice),
            Some((src, result)) = image_rx.recv() => Input::Image { src, result },
            () = viewer.step() => Input::Stepped,
            _ = tokio::signal::ctrl_c() => Input::Interrupted,
        };

        match input {
            Input::Line(None) | Input::Interrupted => break,
            Input::Line(Some(line)) => {
                if !handle_line(&mut viewer, line.trim())? {
                    break;
                }
            }
            Input::Notice(notice) => {
                if !handle_notice(&viewer, &loader, &image_tx, notice) {
                    break;
                }
            }
            Input::Image { src, result } => match result {
                Ok(()) => viewer.on_image_load(&ImageLoad {
                    src,
                    natural_width: 0,
                    natural_height: 0,
                    rendered_height: 0,
                }),
                Err(err) => {
                    println!("image failed: {err}");
                    viewer.on_image_error(&src);
                }
            },
            Input::Stepped => {}
        }
    }

    viewer.unload();
    viewer.teardown();
    Ok(())
}

fn handle_line(viewer: &mut Viewer, line: &str) -> anyhow::Result<bool> {
    let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
    let rest = rest.trim();
    match command {
        "" => {}
        "q" | "quit" => return Ok(false),
        "n" | "next" => {
            viewer.go_next();
        }
        "p" | "prev" => {
            viewer.go_prev();
        }
        "g" | "goto" => match rest.parse::<usize>() {
            Ok(page) if page > 0 => {
                if !viewer.set_page(page - 1) {
                    println!("no page {page}");
                }
            }
            _ => println!("usage: g <page>"),
        },
        "+" => {
            viewer.zoom_in();
            print_layout(viewer);
        }
        "-" => {
            viewer.zoom_out();
            print_layout(viewer);
        }
        "preset" => match Preset::parse(rest) {
            Some(preset) => {
                viewer.apply_preset(preset);
                print_layout(viewer);
            }
            None => println!("usage: preset small|medium|large|reset"),
        },
        "height" => match rest.parse::<u32>() {
            Ok(height) => {
                viewer.set_height(height);
                print_layout(viewer);
            }
            Err(_) => println!("usage: height <percent>"),
        },
        "hide" => viewer.visibility_changed(Visibility::Hidden),
        "show" => viewer.visibility_changed(Visibility::Visible),
        "restart" => viewer.force_restart(),
        "submit" => {
            let title = viewer.title().to_owned();
            let link = if rest.is_empty() {
                viewer.link().to_owned()
            } else {
                rest.to_owned()
            };
            if let Err(err) = viewer.submit(&link, &title) {
                println!("error: {err}");
            }
        }
        "toc" => {
            let snapshot = viewer.snapshot();
            if snapshot.toc.is_empty() {
                println!("no table of contents");
            }
            for entry in snapshot.toc {
                println!("{:>4}  {}", entry.page_number, entry.label);
            }
        }
        "status" => {
            let json =
                serde_json::to_string_pretty(&viewer.snapshot()).context("serialize snapshot")?;
            println!("{json}");
        }
        other => println!("unknown command: {other}"),
    }
    Ok(true)
}

fn handle_notice(
    viewer: &Viewer,
    loader: &Arc<dyn ImageLoader>,
    image_tx: &mpsc::UnboundedSender<(String, Result<(), String>)>,
    notice: Notice,
) -> bool {
    match notice {
        Notice::Error(message) => println!("error: {message}"),
        Notice::Ready { pages } => println!("ready: {pages} pages"),
        Notice::PageChanged { index, url } => {
            let snapshot = viewer.snapshot();
            match snapshot.current_label {
                Some(label) => println!("page {}/{} [{label}] {url}", index + 1, snapshot.page_count),
                None => println!("page {}/{} {url}", index + 1, snapshot.page_count),
            }
            if !snapshot.image_loaded {
                load_image(loader, image_tx, url.clone(), url);
            }
        }
        Notice::RetryImage { src, retry_url } => {
            println!("retrying {retry_url}");
            load_image(loader, image_tx, src, retry_url);
        }
        Notice::Redirect { url } => {
            println!("redirect: {url}");
            return false;
        }
        Notice::ZoomIndicator { .. } => {}
    }
    true
}

fn load_image(
    loader: &Arc<dyn ImageLoader>,
    image_tx: &mpsc::UnboundedSender<(String, Result<(), String>)>,
    src: String,
    url: String,
) {
    let loader = Arc::clone(loader);
    let image_tx = image_tx.clone();
    tokio::spawn(async move {
        let result = loader.load(&url).await.map_err(|err| err.to_string());
        let _ = image_tx.send((src, result));
    });
}

fn print_layout(viewer: &Viewer) {
    let prefs = viewer.layout().prefs();
    println!(
        "width {}% double {}% height {}%",
        prefs.width, prefs.double_width, prefs.height
    );
}
