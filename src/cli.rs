use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "target-woocommerce")]
#[command(about = "Singer target that upserts orders, inventory, products and order notes into WooCommerce")]
#[command(version)]
pub struct Cli {
    /// Path to the JSON config file
    #[arg(long, short = 'c')]
    pub config: PathBuf,

    /// Read Singer messages from this file instead of stdin
    #[arg(long)]
    pub input: Option<PathBuf>,
}
