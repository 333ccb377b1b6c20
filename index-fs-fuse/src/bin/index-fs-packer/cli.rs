use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
pub struct Cli {
    /// Directory whose files are packed, one inode each
    #[arg(long, short)]
    pub source: PathBuf,

    /// Output image
    #[arg(long, short = 'O')]
    pub out: PathBuf,

    /// Sectors in the image
    #[arg(long, short = 'n', default_value_t = 16 * 2048)]
    pub sectors: u32,
}
