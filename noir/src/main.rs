//! Noir detective story, played line by line in the terminal.
//!
//! ```bash
//! cargo run -p noir -- --premise "A body in the harbour at dawn"
//! ```
//!
//! Set `RUST_LOG=noir_core=debug` to see narrator traffic.

mod headless;

use std::path::PathBuf;

/// Command line options.
#[derive(Debug, Clone, PartialEq)]
pub struct CliConfig {
    pub premise: Option<String>,
    pub save_dir: PathBuf,
    pub model: Option<String>,
    pub help: bool,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            premise: None,
            save_dir: PathBuf::from("saves"),
            model: None,
            help: false,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file if present
    dotenvy::dotenv().ok();
    init_logging();

    let args: Vec<String> = std::env::args().collect();
    let config = parse_args(&args);

    if config.help {
        print_help();
        return Ok(());
    }

    if std::env::var("ANTHROPIC_API_KEY").is_err() {
        eprintln!("Warning: ANTHROPIC_API_KEY is not set. The narrator is offline;");
        eprintln!("saved cases can be inspected but not played.");
    }

    headless::run(config).await?;
    Ok(())
}

fn init_logging() {
    let mut builder = env_logger::Builder::new();
    builder.filter_level(log::LevelFilter::Warn);
    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }
    builder.init();
}

/// Parse command line arguments. Unknown arguments are ignored.
pub fn parse_args(args: &[String]) -> CliConfig {
    let mut config = CliConfig::default();

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--premise" => {
                if let Some(premise) = args.get(i + 1) {
                    config.premise = Some(premise.clone());
                    i += 1;
                }
            }
            "--save-dir" => {
                if let Some(dir) = args.get(i + 1) {
                    config.save_dir = PathBuf::from(dir);
                    i += 1;
                }
            }
            "--model" => {
                if let Some(model) = args.get(i + 1) {
                    config.model = Some(model.clone());
                    i += 1;
                }
            }
            "-h" | "--help" => config.help = true,
            _ => {}
        }
        i += 1;
    }

    config
}

fn print_help() {
    println!("Noir - an interactive detective story with an AI narrator");
    println!();
    println!("USAGE:");
    println!("  noir [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("  -h, --help          Show this help message");
    println!("  --premise <TEXT>    Premise for a new case (default: a missing singer, 1947)");
    println!("  --save-dir <DIR>    Where the case is saved (default: saves)");
    println!("  --model <ID>        Narrator model (default: $NOIR_MODEL or claude-sonnet-4)");
    println!();
    println!("ENVIRONMENT:");
    println!("  ANTHROPIC_API_KEY   Required to play");
    println!("  NOIR_MODEL, NOIR_MAX_TOKENS, NOIR_TEMPERATURE");
    println!("  RUST_LOG            Log filter (default: warn)");
    println!();
    println!("Type #help once running for the list of commands.");
}
