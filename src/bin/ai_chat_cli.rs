//! ai-chat-cli: render, inspect and dry-run chat commands without a provider.
//!
//! Usage:
//!   ai-chat-cli render <command.yaml> [OPTIONS]     Print the rendered conversation
//!   ai-chat-cli run <command.yaml> [OPTIONS]        Run against the offline echo backend
//!   ai-chat-cli metadata [<command.yaml>] [OPTIONS] Print the merged settings metadata

use ai_chat_steps::chat::{ChatStepFactory, EchoBackend};
use ai_chat_steps::command::{ChatCommand, CommandDescription, PRINT_PROMPT};
use ai_chat_steps::runner::deadline_token;
use ai_chat_steps::settings::{ApiType, ParameterMap, SettingsMerger, StepSettings};
use anyhow::{anyhow, bail, Context};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        print_usage();
        std::process::exit(1);
    }

    match args[1].as_str() {
        "render" => cmd_run(&args[2..], true).await,
        "run" => cmd_run(&args[2..], false).await,
        "metadata" => cmd_metadata(&args[2..]),
        "version" | "--version" | "-V" => {
            println!("ai-chat-cli {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {other}");
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}

fn print_usage() {
    println!(
        r#"ai-chat-cli: chat command toolbox

USAGE:
    ai-chat-cli <COMMAND> [OPTIONS]

COMMANDS:
    render <command.yaml>       Print the rendered conversation
    run <command.yaml>          Run the command against the offline echo backend
                                (api type defaults to ollama, so no key is needed)
    metadata [<command.yaml>]   Print the merged settings metadata as YAML
    version                     Show version information
    help                        Show this help message

OPTIONS:
    --config <file>             Flat YAML settings file (repeatable, later wins)
    --set <name>=<value>        Parameter value or settings override (repeatable)
    --timeout <seconds>         Cancel the run after this many seconds

ENVIRONMENT:
    RUST_LOG                    Log filter, e.g. ai_chat_steps=debug"#
    );
}

#[derive(Debug, Default)]
struct Options {
    command_file: Option<PathBuf>,
    config_files: Vec<PathBuf>,
    values: ParameterMap,
    timeout: Option<Duration>,
}

fn parse_options(args: &[String]) -> anyhow::Result<Options> {
    let mut options = Options::default();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => {
                let path = iter.next().ok_or_else(|| anyhow!("--config needs a file"))?;
                options.config_files.push(PathBuf::from(path));
            }
            "--set" => {
                let pair = iter.next().ok_or_else(|| anyhow!("--set needs name=value"))?;
                let (name, value) = pair
                    .split_once('=')
                    .ok_or_else(|| anyhow!("invalid --set '{pair}', expected name=value"))?;
                options
                    .values
                    .insert(name.trim().to_string(), Value::String(value.to_string()));
            }
            "--timeout" => {
                let secs = iter.next().ok_or_else(|| anyhow!("--timeout needs seconds"))?;
                let secs: u64 = secs.parse().with_context(|| format!("invalid timeout '{secs}'"))?;
                options.timeout = Some(Duration::from_secs(secs));
            }
            flag if flag.starts_with("--") => bail!("unknown option {flag}"),
            path if options.command_file.is_none() => {
                options.command_file = Some(PathBuf::from(path));
            }
            extra => bail!("unexpected argument '{extra}'"),
        }
    }
    Ok(options)
}

fn load_description(options: &Options) -> anyhow::Result<Option<CommandDescription>> {
    options
        .command_file
        .as_ref()
        .map(|path| {
            CommandDescription::from_file(path)
                .with_context(|| format!("cannot load command {}", path.display()))
        })
        .transpose()
}

/// Lowest layer for the offline run: no key and no real model are needed.
fn dry_run_defaults(description: &CommandDescription) -> StepSettings {
    let mut settings = description.default_settings();
    settings.chat.api_type.get_or_insert(ApiType::Ollama);
    settings.chat.engine.get_or_insert_with(|| "echo".to_string());
    settings
}

fn build_merger(options: &Options, defaults: StepSettings) -> anyhow::Result<SettingsMerger> {
    let mut merger = SettingsMerger::new(defaults);
    for path in &options.config_files {
        merger = merger
            .with_config_file(path)
            .with_context(|| format!("cannot load settings {}", path.display()))?;
    }
    Ok(merger.with_command_line(options.values.clone()))
}

async fn cmd_run(args: &[String], render_only: bool) -> anyhow::Result<()> {
    let mut options = parse_options(args)?;
    let description = load_description(&options)?.ok_or_else(|| anyhow!("missing <command.yaml>"))?;
    if render_only {
        options.values.insert(PRINT_PROMPT.to_string(), Value::Bool(true));
    }

    let merger = build_merger(&options, dry_run_defaults(&description))?;
    let factory = ChatStepFactory::from_merger(&merger, Arc::new(EchoBackend))?;
    let command = ChatCommand::new(description, factory);

    let root = CancellationToken::new();
    let interrupt = root.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.cancel();
        }
    });
    let deadline = options.timeout.map(|timeout| deadline_token(&root, timeout));
    let cancel = deadline.as_ref().map_or(root, |d| d.token().clone());

    let mut stdout = tokio::io::stdout();
    command.run(&cancel, &options.values, &mut stdout).await?;
    Ok(())
}

fn cmd_metadata(args: &[String]) -> anyhow::Result<()> {
    let options = parse_options(args)?;
    let description = load_description(&options)?;
    let defaults = description.map(|d| d.default_settings()).unwrap_or_default();
    let settings = build_merger(&options, defaults)?.merge()?;
    print!("{}", serde_yaml::to_string(&settings.get_metadata())?);
    Ok(())
}
