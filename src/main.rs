mod classifier;
mod cli;
mod config;
mod engine;
mod gestures;
mod history;
mod input;
mod ipc;
mod landmarks;
mod logging;
mod predicates;
mod replay;

fn main() -> anyhow::Result<()> {
    logging::init();
    cli::run()
}
