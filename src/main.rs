mod config;
mod docs;
mod error;
mod resources;
mod safety;
mod sandbox;
mod tools;
mod verifier;

use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use tokio::io::BufReader;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::safety::SafetyClassifier;
use crate::sandbox::Sandbox;
use crate::tools::server::StdioServer;
use crate::tools::ToolMultiplexer;
use crate::verifier::Orchestrator;

/// Resource used when none is given on the command line.
const RESOURCE_ENV: &str = "DOC_VERIFIER_RESOURCE";

fn print_help() {
    println!(
        "\
doc-verifier v{}

Verifies that the shell commands documented in a resource actually work,
without running anything destructive on the host.

USAGE:
    doc-verifier [OPTIONS] <RESOURCE> [INSTRUCTION...]
    doc-verifier [OPTIONS] --list
    doc-verifier [OPTIONS] serve

ARGUMENTS:
    RESOURCE       Name of the resource to verify (e.g. git for git.md)
    INSTRUCTION    Optional free text, echoed in the report
    serve          Run the tool server on stdin/stdout (JSON-RPC)

OPTIONS:
    -c, --config <PATH>    Path to TOML configuration file
                           [default: {}]
    -l, --list             List available resources and exit
    -h, --help             Print this help message and exit
    -V, --version          Print version and exit

ENVIRONMENT VARIABLES:
    Variables are referenced in the config file via ${{VAR_NAME}} syntax.

    RUST_LOG                 Log level filter for tracing
                             (e.g. debug, doc_verifier=debug,warn)
    {RESOURCE_ENV}    Resource to verify when none is given

EXAMPLES:
    doc-verifier git                          # verify resources/git.md
    doc-verifier docker check the run flags   # with an instruction
    doc-verifier -c /etc/verifier.toml --list
    RUST_LOG=debug doc-verifier git           # with debug logging",
        env!("CARGO_PKG_VERSION"),
        config::DEFAULT_CONFIG_PATH,
    );
}

#[derive(Debug, PartialEq)]
enum Command {
    Verify {
        resource: String,
        instruction: Option<String>,
    },
    List,
    Serve,
    Help,
    Version,
}

#[derive(Debug, PartialEq)]
struct Cli {
    config_path: Option<String>,
    command: Command,
}

fn parse_args<I>(args: I, env_resource: Option<String>) -> Result<Cli>
where
    I: IntoIterator<Item = String>,
{
    let mut config_path = None;
    let mut list = false;
    let mut positional = Vec::new();

    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--version" | "-V" => {
                return Ok(Cli {
                    config_path,
                    command: Command::Version,
                })
            }
            "--help" | "-h" => {
                return Ok(Cli {
                    config_path,
                    command: Command::Help,
                })
            }
            "--config" | "-c" => {
                let path = args
                    .next()
                    .ok_or_else(|| anyhow!("{arg} requires a path"))?;
                config_path = Some(path);
            }
            "--list" | "-l" => list = true,
            flag if flag.starts_with('-') && positional.is_empty() => {
                bail!("unknown option: {flag} (see --help)")
            }
            _ => positional.push(arg),
        }
    }

    let command = if list {
        Command::List
    } else if positional.first().map(String::as_str) == Some("serve") {
        Command::Serve
    } else {
        let mut words = positional.into_iter();
        let resource = words
            .next()
            .or(env_resource)
            .filter(|r| !r.is_empty())
            .ok_or_else(|| anyhow!("no resource given (see --help)"))?;
        let instruction = words.collect::<Vec<_>>().join(" ");
        Command::Verify {
            resource,
            instruction: (!instruction.is_empty()).then_some(instruction),
        }
    };

    Ok(Cli {
        config_path,
        command,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = parse_args(std::env::args().skip(1), std::env::var(RESOURCE_ENV).ok())?;
    match cli.command {
        Command::Version => {
            println!("doc-verifier v{}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        Command::Help => {
            print_help();
            return Ok(());
        }
        _ => {}
    }

    // Logs go to stderr: stdout carries the report or the protocol.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("doc_verifier=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = Config::load_or_default(cli.config_path.as_deref())?;
    info!(
        "Resources: {} | mode: {} | safety checks: {}",
        config.resources.path.display(),
        config.verifier.mode,
        if config.verifier.safety_checks { "on" } else { "off" }
    );

    match cli.command {
        Command::Serve => serve(&config).await,
        Command::List => {
            let names = Orchestrator::new(&config).list_resources().await?;
            for name in names {
                println!("{name}");
            }
            Ok(())
        }
        Command::Verify {
            resource,
            instruction,
        } => {
            let orchestrator = Orchestrator::new(&config);
            tokio::select! {
                result = orchestrator.verify(&resource, instruction.as_deref()) => {
                    print!("{}", result?);
                    Ok(())
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown signal received, cancelling run");
                    Ok(())
                }
            }
        }
        Command::Help | Command::Version => Ok(()),
    }
}

async fn serve(config: &Config) -> Result<()> {
    let sandbox = Arc::new(Sandbox::new(config.sandbox.clone()));
    let guard = config
        .tools
        .enforce_safety
        .then(|| Arc::new(SafetyClassifier::new(sandbox.scratch_dir())));
    if guard.is_none() {
        info!("Safety guard disabled for tool calls");
    }
    let server = StdioServer::new(Arc::new(ToolMultiplexer::standard(sandbox, guard)));

    tokio::select! {
        result = server.serve(BufReader::new(tokio::io::stdin()), tokio::io::stdout()) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received, exiting");
            Ok(())
        }
    }
}
