use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "degenerate-meme")]
#[command(about = "Generate meme stickers with Gemini image models")]
pub struct Cli {
    /// Directory holding config.json and the local database
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List the built-in prompt options
    Options,
    /// Generate a batch of images
    Generate(GenerateArgs),
    /// Manage the saved reference image
    #[command(subcommand)]
    Upload(UploadCommand),
    /// Manage favorites
    #[command(subcommand)]
    Favorites(FavoritesCommand),
    /// Print the effective configuration
    Config,
}

#[derive(Args, Debug)]
pub struct GenerateArgs {
    /// Built-in prompt option id (see `options`)
    #[arg(long, conflicts_with = "prompt", required_unless_present = "prompt")]
    pub option: Option<String>,

    /// Free-form prompt text
    #[arg(long)]
    pub prompt: Option<String>,

    /// Number of images, 1 to 20
    #[arg(short = 'n', long, default_value_t = 1)]
    pub count: usize,

    /// Reference image; replaces the saved upload
    #[arg(long)]
    pub image: Option<PathBuf>,

    /// Directory the selected images are written to
    #[arg(short, long, default_value = ".")]
    pub out: PathBuf,

    /// Image numbers to export (comma-separated, 1-based); all when omitted
    #[arg(long, value_delimiter = ',')]
    pub select: Vec<usize>,

    /// Image numbers to add to favorites (comma-separated, 1-based)
    #[arg(long, value_delimiter = ',')]
    pub favorite: Vec<usize>,
}

#[derive(Subcommand, Debug)]
pub enum UploadCommand {
    /// Save an image as the reference for later runs
    Set { path: PathBuf },
    /// Show the saved reference image
    Show,
    /// Forget the saved reference image
    Clear,
}

#[derive(Subcommand, Debug)]
pub enum FavoritesCommand {
    /// List favorites, newest first
    List,
    /// Remove one favorite by id
    Remove { id: String },
    /// Remove every favorite
    Clear,
    /// Write favorite number N (1-based, as listed) to a directory
    Export {
        number: usize,
        #[arg(short, long, default_value = ".")]
        out: PathBuf,
    },
    /// Print favorites whenever another instance changes them
    Watch,
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
    fn generate_parses_selection_lists() {
        let cli = Cli::parse_from([
            "degenerate-meme",
            "generate",
            "--option",
            "meme",
            "-n",
            "9",
            "--select",
            "1,3,9",
            "--favorite",
            "2",
        ]);
        let Command::Generate(args) = cli.command else {
            panic!("expected generate");
        };
        assert_eq!(args.option.as_deref(), Some("meme"));
        assert_eq!(args.count, 9);
        assert_eq!(args.select, vec![1, 3, 9]);
        assert_eq!(args.favorite, vec![2]);
    }

    #[test]
    fn generate_requires_exactly_one_prompt_source() {
        assert!(Cli::try_parse_from(["degenerate-meme", "generate"]).is_err());
        assert!(Cli::try_parse_from([
            "degenerate-meme",
            "generate",
            "--option",
            "meme",
            "--prompt",
            "a cat"
        ])
        .is_err());
    }

    #[test]
    fn data_dir_is_accepted_after_the_subcommand() {
        let cli = Cli::parse_from(["degenerate-meme", "favorites", "list", "--data-dir", "/tmp/x"]);
        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/x")));
        assert!(matches!(cli.command, Command::Favorites(FavoritesCommand::List)));
    }
}
