use clap::Parser;

use crate::pack::OpenOptions;

#[derive(Parser, Debug)]
#[command(name = "lpack")]
#[command(version)]
#[command(about = "A LayerPack reader with HTTP URL support", long_about = None)]
#[command(after_help = "Examples:\n  \
  lpack base.lpack -x .lua            extract all entries except scripts\n  \
  lpack -p base.lpack hello.txt       print one entry to stdout\n  \
  lpack -t mod.lpack                  verify every entry\n  \
  lpack base.lpack --layer mod.lpack --resolve ui/icon.png\n  \
  lpack base.lpack --layer-dir mods --resolve ui/icon.png\n  \
  lpack -l https://example.com/base.lpack   list entries of a remote pack")]
pub struct Cli {
    /// Pack file path or HTTP URL
    #[arg(value_name = "FILE")]
    pub file: String,

    /// Entries to extract (default: all)
    #[arg(value_name = "ENTRIES")]
    pub files: Vec<String>,

    /// List entries (short format)
    #[arg(short = 'l')]
    pub list: bool,

    /// List verbosely, with pack metadata
    #[arg(short = 'v')]
    pub verbose: bool,

    /// Test pack integrity
    #[arg(short = 't')]
    pub test: bool,

    /// Extract entries to pipe, no messages
    #[arg(short = 'p')]
    pub pipe: bool,

    /// Extract entries into exdir
    #[arg(short = 'd', value_name = "DIR")]
    pub extract_dir: Option<String>,

    /// Exclude entries that follow
    #[arg(short = 'x', value_name = "ENTRY", num_args = 1..)]
    pub exclude: Vec<String>,

    /// Never overwrite existing files
    #[arg(short = 'n')]
    pub never_overwrite: bool,

    /// Overwrite files WITHOUT prompting
    #[arg(short = 'o')]
    pub overwrite: bool,

    /// Junk paths (do not make directories)
    #[arg(short = 'j')]
    pub junk_paths: bool,

    /// Quiet mode (-qq => quieter)
    #[arg(short = 'q', action = clap::ArgAction::Count)]
    pub quiet: u8,

    /// Verify all checksums while opening
    #[arg(long)]
    pub eager: bool,

    /// Skip checksum verification on extraction
    #[arg(long, conflicts_with = "eager")]
    pub no_verify: bool,

    /// Resolve an entry across FILE and every --layer pack
    #[arg(long, value_name = "ENTRY")]
    pub resolve: Option<String>,

    /// Additional pack to layer over FILE (repeatable)
    #[arg(long = "layer", value_name = "PACK", requires = "resolve")]
    pub layers: Vec<String>,

    /// Layer every .lpack file found in DIR over FILE
    #[arg(long, value_name = "DIR", requires = "resolve")]
    pub layer_dir: Option<String>,
}

impl Cli {
    pub fn is_http_url(&self) -> bool {
        is_http_url(&self.file)
    }

    pub fn is_quiet(&self) -> bool {
        self.quiet > 0 || self.pipe
    }

    pub fn is_very_quiet(&self) -> bool {
        self.quiet > 1
    }

    /// Reader settings selected on the command line.
    pub fn open_options(&self) -> OpenOptions {
        OpenOptions::new()
            .eager_checksum(self.eager)
            .verify_checksums(!self.no_verify)
    }
}

pub fn is_http_url(location: &str) -> bool {
    location.starts_with("http://") || location.starts_with("https://")
}
