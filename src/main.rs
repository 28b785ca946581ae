use crate::cli::run;

mod backend;
pub mod cli;
mod config;
pub mod domain;
mod external;
mod http_client;
mod jobs;
mod pipeline;
mod ranking;
pub mod storage;

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    run()
}
