//! BTC Settlement - Operator Binary
//!
//! Run modes:
//!   settlement                  - Show usage
//!   settlement api [--port N]   - Start REST API
//!   settlement config           - Print the loaded configuration

use btc_settlement::api;
use btc_settlement::common::{init_from_config, SettlementConfig};
use btc_settlement::SettlementService;
use std::env;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_usage();
        return ExitCode::SUCCESS;
    }

    let config = match SettlementConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match args[1].as_str() {
        "api" => run_api_server(config, &args[2..]).await,
        "config" => {
            config.print_summary();
            ExitCode::SUCCESS
        }
        _ => {
            print_usage();
            ExitCode::SUCCESS
        }
    }
}

fn print_usage() {
    println!("BTC Settlement - Sweep Settlement & Reserved Deposits");
    println!();
    println!("Usage:");
    println!("  settlement api [--port <port>]   Start REST API server (default: 3001)");
    println!("  settlement config                Print loaded configuration");
    println!();
    println!("Environment Variables:");
    println!("  SETTLEMENT_NETWORK        mainnet | testnet | regtest (default: regtest)");
    println!("  SETTLEMENT_API_PORT       REST API port (default: 3001)");
    println!("  SETTLEMENT_DB_PATH        SQLite database (default: data/settlement.db)");
    println!("  SETTLEMENT_TREASURY       Treasury account (required on mainnet)");
    println!("  SETTLEMENT_LOG_LEVEL      trace | debug | info | warn | error");
}

/// Start REST API server
async fn run_api_server(mut config: SettlementConfig, args: &[String]) -> ExitCode {
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--port" if i + 1 < args.len() => {
                match args[i + 1].parse() {
                    Ok(port) => config.api_port = port,
                    Err(_) => {
                        eprintln!("Invalid port: {}", args[i + 1]);
                        return ExitCode::FAILURE;
                    }
                }
                i += 2;
            }
            _ => i += 1,
        }
    }

    if let Err(e) = init_from_config(&config) {
        eprintln!("Logging error: {}", e);
        return ExitCode::FAILURE;
    }

    let service = match SettlementService::from_config(&config).await {
        Ok(service) => service,
        Err(e) => {
            eprintln!("Failed to start settlement service: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = api::start_server(service, config.api_port).await {
        eprintln!("API server error: {}", e);
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
