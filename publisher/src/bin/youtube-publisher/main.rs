use args::{Cli, Command, UploadArgs};
use clap::Parser;
use eyre::WrapErr;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use youtube_publisher::{
    AuthSessionManager, ClientIdentity, Config, CredentialStore, LiveProvisioner,
    LiveSessionResult, OAuthManager, Progress, ProgressSink, ResumableUploader, UploadJob,
    VideoId, VideoMetadata, YouTubeClient,
};

mod args;
mod interactive;
mod progress;

/// Container formats the platform is known to accept; others are tried anyway.
const VIDEO_EXTENSIONS: [&str; 4] = ["mp4", "mov", "avi", "mkv"];

#[tokio::main]
async fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .init();

    let cli = Cli::parse();
    let app = App::new(Config {
        credential_cache: cli.global.credentials,
        client_secret: cli.global.client_secret,
        open_browser: !cli.global.no_browser,
        ..Config::default()
    });

    match cli.command {
        None => interactive::run(&app).await,
        Some(Command::Login { force }) => {
            app.handle(force).await?;
            println!(
                "Authorized. Credentials cached in {}",
                app.config.credential_cache.display()
            );
            Ok(())
        }
        Some(Command::Upload(args)) => upload(&app, args).await,
        Some(Command::Live { title, json }) => {
            let handle = app.handle(false).await?;
            let result = app.provision(handle, &title).await?;
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&result).wrap_err("serialize live session")?
                );
            } else {
                print_live_session(&result);
            }
            Ok(())
        }
    }
}

/// Everything a user action needs, built once from the command line.
pub struct App {
    pub config: Config,
}

impl App {
    fn new(config: Config) -> Self {
        Self { config }
    }

    /// Returns an authenticated handle, asking for consent if needed (or if `force`d).
    pub async fn handle(&self, force: bool) -> eyre::Result<YouTubeClient> {
        let identity = ClientIdentity::load(&self.config.client_secret)
            .await
            .wrap_err("load OAuth client identity")?;
        let http = OAuthManager::http_client()?;
        let oauth = OAuthManager::new(identity, http.clone())
            .with_open_browser(self.config.open_browser);
        let sessions = AuthSessionManager::new(
            CredentialStore::new(&self.config.credential_cache),
            oauth,
            http,
            self.config.endpoints.clone(),
        );

        let handle = if force {
            sessions.reconsent().await
        } else {
            sessions.get_authenticated_handle().await
        };
        handle.wrap_err("authenticate with YouTube")
    }

    /// Uploads the file at `source` with a progress bar.
    pub async fn upload(
        &self,
        handle: YouTubeClient,
        source: &Path,
        metadata: VideoMetadata,
    ) -> eyre::Result<VideoId> {
        let mut job = UploadJob::new(source, metadata).await?;
        let mut bar = progress::UploadBar::new(job.total_bytes());
        let uploader = ResumableUploader::new(handle, self.config.upload.clone());
        let result = uploader
            .run(&mut job, |p: Progress| bar.progress(p))
            .await;
        bar.finish();

        result.wrap_err_with(|| format!("upload {}", source.display()))
    }

    /// Provisions a live session titled `title`.
    pub async fn provision(
        &self,
        handle: YouTubeClient,
        title: &str,
    ) -> eyre::Result<LiveSessionResult> {
        let spinner = progress::spinner("Creating live stream...");
        let result = LiveProvisioner::new(handle, self.config.live.clone())
            .provision(title)
            .await;
        spinner.finish_and_clear();
        Ok(result?)
    }
}

async fn upload(app: &App, args: UploadArgs) -> eyre::Result<()> {
    let UploadArgs {
        file,
        title,
        description,
        category,
        privacy,
        chunk_size,
    } = args;
    let app = App::new(Config {
        upload: youtube_publisher::UploadConfig {
            chunk_size,
            ..app.config.upload.clone()
        },
        ..app.config.clone()
    });

    if title.trim().is_empty() {
        eyre::bail!("a video title is required");
    }
    let metadata = VideoMetadata {
        title,
        description,
        category_id: category,
        privacy_status: privacy,
    };

    // stdin is staged to disk so the upload can seek back after a failure
    let staged;
    let source: PathBuf = if file == Path::new("-") {
        staged = stage_stdin().await?;
        staged.to_path_buf()
    } else {
        warn_on_unusual_extension(&file);
        file
    };

    let handle = app.handle(false).await?;
    let id = app.upload(handle, &source, metadata).await?;
    println!("Uploaded video {id}: {}", id.watch_url());
    Ok(())
}

/// Copies stdin into a temporary file that is removed when the returned value drops.
async fn stage_stdin() -> eyre::Result<tempfile::TempPath> {
    let staged = tempfile::Builder::new()
        .prefix("youtube-upload-")
        .tempfile()
        .wrap_err("create staging file for stdin")?
        .into_temp_path();
    let mut out = tokio::fs::File::create(&staged)
        .await
        .wrap_err("open staging file")?;
    let copied = tokio::io::copy(&mut tokio::io::stdin(), &mut out)
        .await
        .wrap_err("stage stdin")?;
    out.sync_all().await.wrap_err("flush staging file")?;
    tracing::debug!(bytes = copied, path = %staged.display(), "staged stdin");
    Ok(staged)
}

pub fn warn_on_unusual_extension(path: &Path) {
    let known = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| VIDEO_EXTENSIONS.iter().any(|v| v.eq_ignore_ascii_case(e)));
    if !known {
        tracing::warn!(
            path = %path.display(),
            "file is not one of {}; YouTube may reject it",
            VIDEO_EXTENSIONS.join("/")
        );
    }
}

pub fn print_live_session(result: &LiveSessionResult) {
    println!("Live stream created.");
    println!("  Ingest URL: {}", result.ingest_url);
    println!("  Stream key: {}", result.stream_key);
    if let Some(backup) = &result.backup_ingest_url {
        println!("  Backup URL: {backup}");
    }
    println!("  Broadcast:  {}", result.watch_url());
    println!("  Starts at:  {}", result.scheduled_start_time);
    println!();
    println!("Use the ingest URL and stream key in OBS, FFmpeg, or another RTMP encoder.");
}
