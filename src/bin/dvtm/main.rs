//! dvtm: a dynamic virtual terminal manager for the console.

mod clients;
mod commands;
mod config;
mod event_loop;
mod fifo;
mod input;
mod layout;
mod mouse;
mod mux;
mod screen;
mod signals;
mod statusbar;

use anyhow::{Context, Result};
use clap::Parser;
use config::Cli;
use fifo::Fifo;
use mux::Mux;
use std::process::ExitCode;

fn main() -> ExitCode {
    dvtm::init_tracing();
    let cli = Cli::parse();
    if cli.version {
        println!("dvtm-{}", dvtm::VERSION);
        return ExitCode::SUCCESS;
    }
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("dvtm: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut mux = Mux::new();
    mux.escdelay = config::resolve_escdelay(cli.escdelay);
    if cli.toggle_mouse {
        mux.mouse_enabled = !mux.mouse_enabled;
    }
    if let Some(modifier) = cli.modifier.as_deref().and_then(config::parse_modifier) {
        mux.override_modifier(modifier);
    }
    if let Some(history) = cli.history {
        mux.screen.history = history;
    }
    mux.title_override = cli.title.clone();

    // FIFO setup is fatal when it fails; paths are exported so children
    // can reach the pipes.
    if let Some(path) = &cli.status_fifo {
        let fifo = Fifo::open_or_create(path)?;
        mux.bar.fifo = Some(fifo);
    }
    if let Some(path) = &cli.cmd_fifo {
        let fifo = Fifo::open_or_create(path)?;
        let real = fifo.real_path().context("cannot resolve command fifo path")?;
        std::env::set_var("DVTM_CMD_FIFO", &real);
        mux.cmdfifo = Some(fifo);
    }
    if let Some(path) = &cli.event_fifo {
        let fifo = Fifo::open_or_create(path)?;
        let real = fifo.real_path().context("cannot resolve event fifo path")?;
        std::env::set_var("DVTM_EVENT_FIFO", &real);
        mux.evtfifo = Some(fifo);
    }

    signals::install_handlers()?;
    mux.backend
        .init(mux.mouse_enabled)
        .context("cannot initialize the screen")?;

    mux.resize_screen();

    if cli.commands.is_empty() {
        commands::startup(&mut mux, &[]);
    } else {
        for cmd in &cli.commands {
            mux.create(&[cmd]);
        }
    }

    let result = event_loop::run(&mut mux);
    mux.cleanup();
    result
}
