//! copilot-ops: ask a language model to change the files of a repository.

mod cli;
mod core;
mod domain;
mod infra;

fn main() -> anyhow::Result<()> {
    cli::commands::run()
}
