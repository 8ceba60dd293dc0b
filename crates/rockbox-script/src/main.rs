use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use rockbox_ext::{Bridge, BridgeError, SandboxConfig, ScriptSandbox};
use serde_json::Value;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(author, version, about = "Run sandboxed scripts against a Rockbox player", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a WASM script to completion and print its result
    Run {
        /// Script module exporting `start` and `resume`
        wasm: PathBuf,
        /// JSON value handed to the script as its input
        #[arg(value_parser = parse_json, default_value = "null")]
        input: Value,
    },
    /// Print TypeScript declarations for the `rb` namespace
    Types,
    /// Print the `rb` namespace as JSON
    Describe,
}

fn parse_json(raw: &str) -> Result<Value, String> {
    serde_json::from_str(raw).map_err(|e| format!("input is not JSON: {e}"))
}

async fn run(command: Commands) -> Result<(), BridgeError> {
    let bridge = Bridge::from_env().await?;

    match command {
        Commands::Types => print!("{}", bridge.projection().typescript()),
        Commands::Describe => println!("{}", serde_json::to_string_pretty(&bridge.projection().describe())?),
        Commands::Run { wasm, input } => {
            let sandbox = ScriptSandbox::load(&wasm, SandboxConfig::from_env())?;
            tracing::info!(script = %wasm.display(), "running script");
            let session = bridge.session(sandbox);

            let outcome = tokio::select! {
                result = session.run(input) => Some(result),
                _ = tokio::signal::ctrl_c() => None,
            };
            bridge.shutdown().await;

            match outcome {
                Some(result) => println!("{}", serde_json::to_string_pretty(&result?)?),
                None => tracing::warn!("interrupted; outstanding calls cancelled"),
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match run(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_subcommands() {
        let cli = Cli::try_parse_from(["rockbox-script", "types"]).unwrap();
        assert!(matches!(cli.command, Commands::Types));
        let cli = Cli::try_parse_from(["rockbox-script", "describe"]).unwrap();
        assert!(matches!(cli.command, Commands::Describe));

        let cli = Cli::try_parse_from(["rockbox-script", "run", "party.wasm", r#"{"shuffle":true}"#]).unwrap();
        match cli.command {
            Commands::Run { wasm, input } => {
                assert_eq!(wasm, PathBuf::from("party.wasm"));
                assert_eq!(input["shuffle"], true);
            }
            _ => panic!("expected a run command"),
        }

        let cli = Cli::try_parse_from(["rockbox-script", "run", "party.wasm"]).unwrap();
        assert!(matches!(cli.command, Commands::Run { input: Value::Null, .. }));
    }

    #[test]
    fn test_parse_errors() {
        assert!(Cli::try_parse_from(["rockbox-script"]).is_err());
        let err = Cli::try_parse_from(["rockbox-script", "run", "a.wasm", "{not json"])
            .err()
            .unwrap();
        assert!(err.to_string().contains("not JSON"));
        assert!(Cli::try_parse_from(["rockbox-script", "types", "extra"]).is_err());
    }
}
