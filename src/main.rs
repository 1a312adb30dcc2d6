use clap::Parser;
use log::{LevelFilter, error};

use etf_planner::config::{Cli, Command, build_simulation_request};
use etf_planner::core::EtfCatalog;
use etf_planner::planner::simulate_offline;

fn init_logging(verbose: bool) {
    let env = env_logger::Env::default().default_filter_or("info");
    let mut builder = env_logger::Builder::from_env(env);
    if verbose {
        builder.filter_level(LevelFilter::Debug);
    }
    builder.init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Serve(args) => {
            if let Err(e) = etf_planner::api::run_http_server(args).await {
                error!("server error: {e}");
                eprintln!("Server error: {e}");
                std::process::exit(1);
            }
        }
        Command::Simulate(args) => {
            let request = match build_simulation_request(args) {
                Ok(request) => request,
                Err(msg) => {
                    eprintln!("{msg}");
                    std::process::exit(2);
                }
            };
            let outcome = simulate_offline(&request, &EtfCatalog::builtin());
            match serde_json::to_string_pretty(&outcome) {
                Ok(json) => println!("{json}"),
                Err(e) => {
                    eprintln!("Failed to encode results: {e}");
                    std::process::exit(1);
                }
            }
        }
    }
}
