use aeolus::error::exit_code;
use aeolus::{Config, Gateway};
use tracing::{error, info};

fn usage() -> ! {
    eprintln!("usage: aeolus [-c <config file>]");
    std::process::exit(exit_code::CONFIG);
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let mut args = std::env::args().skip(1);
    let mut config_path: Option<String> = None;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-c" | "--config" => match args.next() {
                Some(path) => config_path = Some(path),
                None => usage(),
            },
            "-h" | "--help" => usage(),
            _ => usage(),
        }
    }

    let config = match Config::load_with_override(config_path.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(exit_code::CONFIG);
        }
    };

    if let Err(e) = aeolus::logging::init_logging(&config.logging) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(exit_code::CONFIG);
    }

    info!("Aeolus weather-station gateway starting up");

    let mut gateway = match Gateway::new(config).await {
        Ok(gateway) => gateway,
        Err(e) => {
            error!("Failed to start gateway: {}", e);
            std::process::exit(e.exit_code());
        }
    };

    match gateway.run().await {
        Ok(()) => {
            info!("Gateway shutdown complete");
            std::process::exit(exit_code::OK);
        }
        Err(e) => {
            error!("Gateway failed with error: {}", e);
            std::process::exit(e.exit_code());
        }
    }
}
