use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use youtube_publisher::config::{DEFAULT_CLIENT_SECRET, DEFAULT_CREDENTIAL_CACHE};
use youtube_publisher::upload::DEFAULT_CATEGORY_ID;
use youtube_publisher::{ChunkSize, PrivacyStatus};

/// Upload videos to YouTube and set up live streams.
///
/// Run without a subcommand for an interactive menu.
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Where the OAuth credential is cached between runs
    #[arg(long, env = "YTP_CREDENTIALS", default_value = DEFAULT_CREDENTIAL_CACHE, global = true)]
    pub credentials: PathBuf,

    /// OAuth client identity downloaded from the Google Cloud console
    #[arg(long, env = "YTP_CLIENT_SECRET", default_value = DEFAULT_CLIENT_SECRET, global = true)]
    pub client_secret: PathBuf,

    /// Print the consent URL instead of opening a browser
    #[arg(long, env = "YTP_NO_BROWSER", global = true)]
    pub no_browser: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Authorize access to your channel, or refresh the cached credential
    Login {
        /// Ask for consent again even if a usable credential is cached
        #[arg(long)]
        force: bool,
    },
    /// Upload a video file
    Upload(UploadArgs),
    /// Create a live stream and broadcast and print the ingest settings
    Live {
        /// Title of the stream; the broadcast is titled "<TITLE> Broadcast"
        title: String,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Debug)]
pub struct UploadArgs {
    /// Video file to upload, or `-` to read it from stdin
    pub file: PathBuf,

    #[arg(long)]
    pub title: String,

    #[arg(long, default_value = "")]
    pub description: String,

    /// Numeric YouTube category ID
    #[arg(long, default_value = DEFAULT_CATEGORY_ID)]
    pub category: String,

    /// public, private, or unlisted
    #[arg(long, default_value_t = PrivacyStatus::Private)]
    pub privacy: PrivacyStatus,

    /// Bytes per request as a multiple of 256 KiB (e.g. 8MiB), or -1 for a single request
    #[arg(long, env = "YTP_CHUNK_SIZE", default_value_t = ChunkSize::TransportDefault, allow_hyphen_values = true)]
    pub chunk_size: ChunkSize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn upload_defaults() {
        let cli = Cli::try_parse_from(["youtube-publisher", "upload", "clip.mp4", "--title", "Clip"])
            .unwrap();
        let Some(Command::Upload(args)) = cli.command else {
            panic!("expected upload");
        };
        assert_eq!(args.category, "22");
        assert_eq!(args.privacy, PrivacyStatus::Private);
        assert_eq!(args.chunk_size, ChunkSize::TransportDefault);
    }

    #[test]
    fn upload_options() {
        let cli = Cli::try_parse_from([
            "youtube-publisher",
            "upload",
            "-",
            "--title",
            "Piped",
            "--privacy",
            "unlisted",
            "--chunk-size",
            "8MiB",
        ])
        .unwrap();
        let Some(Command::Upload(args)) = cli.command else {
            panic!("expected upload");
        };
        assert_eq!(args.file, PathBuf::from("-"));
        assert_eq!(args.privacy, PrivacyStatus::Unlisted);
        assert_eq!(args.chunk_size, ChunkSize::Bytes(8 * 1024 * 1024));
    }

    #[test]
    fn bad_chunk_size_is_refused() {
        let err = Cli::try_parse_from([
            "youtube-publisher",
            "upload",
            "clip.mp4",
            "--title",
            "Clip",
            "--chunk-size",
            "1000",
        ])
        .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn no_subcommand_means_interactive() {
        let cli = Cli::try_parse_from(["youtube-publisher"]).unwrap();
        assert!(cli.command.is_none());
    }
}
