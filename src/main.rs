mod app;
mod backup;
mod cli;
mod config;
mod error;
mod library;
mod load_order;
mod metadata;
mod preset;
mod session;

use anyhow::Result;

fn main() -> Result<()> {
    cli::run()
}
