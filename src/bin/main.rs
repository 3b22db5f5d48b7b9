use clap::{Parser, Subcommand};
use std::path::PathBuf;
use webview_bridge::bootstrap;
use webview_bridge::config::{self, OriginRules};

/// Bidirectional bridge between web view page script and a native host
#[derive(Parser)]
#[command(name = "webview-bridge")]
#[command(version)]
#[command(about = "Bidirectional bridge between web view page script and a native host")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the page bootstrap script for the effective settings
    Bootstrap {
        /// Settings file layered over the user config
        #[arg(long)]
        config: Option<PathBuf>,

        /// Also print the platform-ready dispatcher
        #[arg(long)]
        platform_ready: bool,
    },
    /// Validate a settings file
    CheckConfig {
        /// The settings file to check
        path: PathBuf,
    },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Bootstrap {
            config,
            platform_ready,
        } => {
            let outcome = config::load_settings(config.as_deref(), None);
            for event in &outcome.events {
                event.log();
            }
            let settings = outcome.settings;

            let origin_rules = config::validate(&settings)
                .and_then(|_| OriginRules::compile(settings.allowed_origin_rules()))
                .unwrap_or_else(|e| {
                    eprintln!("Error: {}", e);
                    std::process::exit(1);
                });

            println!(
                "{}",
                bootstrap::bridge_js_source(
                    settings.bridge_name(),
                    settings.bridge_secret(),
                    settings.transport(),
                    &origin_rules,
                    settings.for_main_frame_only(),
                )
            );
            if platform_ready {
                println!("{}", bootstrap::platform_ready_js_source(&settings));
            }
        }
        Commands::CheckConfig { path } => {
            let result = config::load_from_path(&path).and_then(|settings| {
                config::validate(&settings)?;
                OriginRules::compile(settings.allowed_origin_rules())?;
                Ok(settings)
            });
            match result {
                Ok(settings) => {
                    eprintln!("{}: ok", path.display());
                    eprintln!("Bridge name: {}", settings.bridge_name());
                    eprintln!("Origin rules: {}", settings.allowed_origin_rules().len());
                    eprintln!("Custom schemes: {}", settings.resource_custom_schemes().len());
                    eprintln!("Path handlers: {}", settings.path_handlers().len());
                }
                Err(e) => {
                    eprintln!("Error: {}", e);
                    std::process::exit(1);
                }
            }
        }
    }
}
