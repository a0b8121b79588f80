use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use livepad_core::{Dialect, render_shader_export};
use livepad_web::{
    AxumLivepadAdapter, CONFIG_FILE, ContentLoader, PreviewConfig, PreviewSession,
    QUICK_SHARE_LINE_LIMIT, compiler_from_config, embed_code, exceeds_quick_share, share_url,
};
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{Duration, Instant};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Editors often write a file in several steps; events closer together than
/// this are read once.
const FS_SETTLE: Duration = Duration::from_millis(120);

#[derive(Parser, Debug)]
#[command(name = "livepad", version)]
#[command(about = "Live preview for HTML, components, utility CSS and shaders")]
pub struct Cli {
    /// Log at debug level.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Config file. Defaults to ./livepad.json when present.
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the editor with a live preview.
    Dev {
        /// Seeds the editor; changes on disk are picked up while watching.
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
        #[arg(short, long)]
        dialect: Option<Dialect>,
        #[arg(short, long, default_value_t = 3000)]
        port: u16,
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        #[arg(long)]
        no_watch: bool,
    },
    /// Write the sandbox document for FILE.
    Build {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(short, long)]
        dialect: Option<Dialect>,
        #[arg(short, long, value_name = "PATH")]
        out: Option<PathBuf>,
        /// Standalone shader page without the loop guard.
        #[arg(long)]
        shader_export: bool,
    },
    /// Print a quick-share URL and embed snippet for FILE.
    Share {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(long, default_value = "http://localhost:3000")]
        origin: String,
        #[arg(long, default_value = "/")]
        path: String,
    },
    /// Resolve a URL fragment (`#code=…`, `#@url`) and print the text.
    Open {
        #[arg(value_name = "FRAGMENT")]
        fragment: String,
        #[arg(short, long)]
        dialect: Option<Dialect>,
    },
    /// Write the default boilerplate for a dialect.
    Init {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(short, long)]
        dialect: Option<Dialect>,
        #[arg(long)]
        force: bool,
    },
}

pub fn setup_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("livepad=debug")
    } else {
        std::env::var("LIVEPAD_LOG")
            .ok()
            .and_then(|directives| EnvFilter::try_new(directives).ok())
            .or_else(|| EnvFilter::try_from_default_env().ok())
            .unwrap_or_else(|| EnvFilter::new("livepad=info"))
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

pub async fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Dev {
            file,
            dialect,
            port,
            host,
            no_watch,
        } => {
            let dialect = resolve_dialect(dialect, file.as_deref());
            run_dev(config, file, dialect, &host, port, !no_watch).await
        }
        Command::Build {
            file,
            dialect,
            out,
            shader_export,
        } => {
            let dialect = resolve_dialect(dialect, Some(&file));
            let out = out.unwrap_or_else(|| default_out_path(&file));
            let built = build_file(&config, &file, dialect, shader_export)?;
            fs::write(&out, &built.html)
                .with_context(|| format!("failed to write {}", out.display()))?;
            if built.diagnostic {
                bail!(
                    "{} did not compile; diagnostic written to {}",
                    file.display(),
                    out.display()
                );
            }
            println!("wrote {}", out.display());
            Ok(())
        }
        Command::Share { file, origin, path } => {
            let text = fs::read_to_string(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let share = share_report(&text, &origin, &path);
            if share.oversized {
                eprintln!(
                    "warning: {} has more than {QUICK_SHARE_LINE_LIMIT} lines; the link may be \
                     too long to open, share it as a snippet URL instead",
                    file.display()
                );
            }
            println!("URL:   {}", share.url);
            println!("Embed: {}", share.embed);
            Ok(())
        }
        Command::Open { fragment, dialect } => {
            let dialect = dialect.unwrap_or(Dialect::Plain);
            let store = livepad_web::FileStore::new(config.storage_dir.clone());
            let loader = ContentLoader::with_http(dialect, Some(store), config.fetch_timeout());
            let loaded = loader.load_hash(&fragment).await;
            info!(origin = ?loaded.origin, bytes = loaded.text.len(), "resolved content");
            print!("{}", loaded.text);
            Ok(())
        }
        Command::Init {
            file,
            dialect,
            force,
        } => {
            let dialect = resolve_dialect(dialect, Some(&file));
            init_file(&file, dialect, force)?;
            println!("wrote {} ({dialect})", file.display());
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<PreviewConfig> {
    match path {
        Some(path) => {
            if !path.is_file() {
                bail!("config file {} not found", path.display());
            }
            Ok(PreviewConfig::load(path)?)
        }
        None => {
            let cwd = std::env::current_dir().context("failed to resolve working directory")?;
            let config = PreviewConfig::load_from_dir(&cwd)?;
            debug!(path = %cwd.join(CONFIG_FILE).display(), "config resolved");
            Ok(config)
        }
    }
}

/// An explicit dialect wins; otherwise the file extension decides, falling
/// back to plain markup.
pub fn resolve_dialect(explicit: Option<Dialect>, file: Option<&Path>) -> Dialect {
    if let Some(dialect) = explicit {
        return dialect;
    }
    let ext = file
        .and_then(|p| p.extension())
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    match ext.as_str() {
        "svelte" => Dialect::Component,
        "glsl" | "frag" | "fs" => Dialect::Shader,
        _ => Dialect::Plain,
    }
}

fn default_out_path(file: &Path) -> PathBuf {
    let stem = file
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("livepad");
    file.with_file_name(format!("{stem}.preview.html"))
}

pub struct BuiltFile {
    pub html: String,
    pub diagnostic: bool,
}

pub fn build_file(
    config: &PreviewConfig,
    file: &Path,
    dialect: Dialect,
    shader_export: bool,
) -> Result<BuiltFile> {
    let text =
        fs::read_to_string(file).with_context(|| format!("failed to read {}", file.display()))?;

    if shader_export {
        if dialect != Dialect::Shader {
            bail!("--shader-export needs the shader dialect, got {dialect}");
        }
        return Ok(BuiltFile {
            html: render_shader_export(&text, &config.cdn),
            diagnostic: false,
        });
    }

    let compiler = compiler_from_config(config.compiler.as_ref());
    let doc =
        livepad_core::build_document(&text, dialect, &config.build_options(), compiler.as_ref());
    if !doc.guarded_lines.is_empty() {
        debug!(lines = ?doc.guarded_lines, "loops guarded");
    }
    Ok(BuiltFile {
        diagnostic: doc.is_diagnostic(),
        html: doc.html,
    })
}

pub struct ShareReport {
    pub url: String,
    pub embed: String,
    pub oversized: bool,
}

pub fn share_report(text: &str, origin: &str, path: &str) -> ShareReport {
    let url = share_url(origin, path, text);
    ShareReport {
        embed: embed_code(&url),
        oversized: exceeds_quick_share(text),
        url,
    }
}

pub fn init_file(file: &Path, dialect: Dialect, force: bool) -> Result<()> {
    if file.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", file.display());
    }
    fs::write(file, dialect.default_source())
        .with_context(|| format!("failed to write {}", file.display()))
}

async fn run_dev(
    config: PreviewConfig,
    file: Option<PathBuf>,
    dialect: Dialect,
    host: &str,
    port: u16,
    watch: bool,
) -> Result<()> {
    let session = Arc::new(PreviewSession::from_config(dialect, &config));
    let loader =
        ContentLoader::with_http(dialect, session.store().cloned(), config.fetch_timeout());
    let mut adapter = AxumLivepadAdapter::new(Arc::clone(&session), loader);

    let watching = match &file {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            session.rebuild_now(&text).await;
            adapter = adapter.with_seed(text.clone());
            if watch {
                tokio::spawn(watch_file(path.clone(), adapter.clone(), text));
            }
            watch
        }
        None => false,
    };

    let app = adapter.router();
    let bind = format!("{host}:{port}");

    println!("LIVEPAD dev");
    println!("Dialect: {dialect}");
    if let Some(path) = &file {
        println!("File:  {}", path.display());
    }
    println!("URL:   http://{}:{port}", if host == "0.0.0.0" { "localhost" } else { host });
    println!("Watch: {}", if watching { "on" } else { "off" });

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;
    axum::serve(listener, app).await.context("server failed")?;
    Ok(())
}

async fn watch_file(path: PathBuf, adapter: AxumLivepadAdapter, mut last: String) {
    let (_watcher, mut rx) = match start_file_watcher(&path) {
        Ok(pair) => pair,
        Err(err) => {
            warn!(error = %err, "file watching unavailable");
            return;
        }
    };
    info!(path = %path.display(), "watching for changes");

    while rx.recv().await.is_some() {
        settle_fs_events(&mut rx).await;
        match tokio::fs::read_to_string(&path).await {
            Ok(text) if text != last => {
                debug!(bytes = text.len(), "watched file changed");
                adapter.publish(text.clone());
                adapter.session().edit(&text);
                last = text;
            }
            Ok(_) => {}
            Err(err) => warn!(path = %path.display(), error = %err, "failed to read watched file"),
        }
    }
}

async fn settle_fs_events(rx: &mut mpsc::UnboundedReceiver<()>) {
    let mut deadline = Instant::now() + FS_SETTLE;
    let sleep = tokio::time::sleep_until(deadline);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            _ = &mut sleep => break,
            maybe = rx.recv() => {
                if maybe.is_none() {
                    break;
                }
                deadline = Instant::now() + FS_SETTLE;
                sleep.as_mut().reset(deadline);
            }
        }
    }
}

/// Watches the file's directory rather than the file itself so atomic
/// replace-on-save keeps being seen.
fn start_file_watcher(file: &Path) -> Result<(RecommendedWatcher, mpsc::UnboundedReceiver<()>)> {
    let dir = match file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let name = file
        .file_name()
        .map(|n| n.to_os_string())
        .with_context(|| format!("{} has no file name", file.display()))?;

    let (tx, rx) = mpsc::unbounded_channel::<()>();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
        Ok(event) => {
            if event.paths.iter().any(|p| p.file_name() == Some(name.as_os_str())) {
                let _ = tx.send(());
            }
        }
        Err(_) => {
            let _ = tx.send(());
        }
    })
    .context("failed to initialize filesystem watcher")?;

    watcher
        .watch(&dir, RecursiveMode::NonRecursive)
        .with_context(|| format!("failed to watch {}", dir.display()))?;

    Ok((watcher, rx))
}
