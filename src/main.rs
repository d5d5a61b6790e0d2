mod capture;
mod config;
mod error;
mod eventloop;
mod fbtransform;
mod keyboard;
mod keymap;
mod output;
mod pointer;
mod rfb;
mod seat;
mod shm;
mod uinputdev;
mod wayland_app;

use clap::Parser;
use log::LevelFilter;
use simple_logger::SimpleLogger;

use config::CmdArgs;

fn main() {
    let args = CmdArgs::parse();

    let level = match args.verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    SimpleLogger::new().with_level(level).env().init().unwrap();

    if let Err(e) = eventloop::run(args) {
        log::error!("{e}");
        std::process::exit(1);
    }
}
