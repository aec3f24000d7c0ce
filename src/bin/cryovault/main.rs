use anyhow::Result;
use clap::Parser;
use env_logger::{Builder, Env};

mod cli;
mod cmd_extract;
mod cmd_inspect;
mod cmd_verify;
mod util;

fn init_logger() {
    // Уровень берём из RUST_LOG, иначе дефолт — info.
    // Пример: RUST_LOG=debug ./cryovault ...
    Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();
}

fn main() {
    init_logger();

    if let Err(e) = run() {
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = cli::Cli::parse();
    match cli.cmd {
        cli::Cmd::Inspect { path, machine, json } => cmd_inspect::exec(path, machine, json),

        cli::Cmd::Verify { path, machine, json } => cmd_verify::exec(path, machine, json),

        cli::Cmd::Extract { path, module, out } => cmd_extract::exec(path, module, out),
    }
}
