use std::{
    io::{self, Write},
    path::{Path, PathBuf},
};

use anyhow::{bail, ensure, Context, Result};
use clap::{Parser, Subcommand};
use dial_core::{config::Config, PluginInstance};
use dial_plugin_sdk::{Status, C_HEADER};
use tracing_subscriber::{fmt, EnvFilter};

/// Function name no plugin is expected to declare; `check` expects it to be rejected.
const UNDECLARED_FUNCTION: &str = "__dial_check_nonexistent__";

#[derive(Parser, Debug)]
#[command(
    name = "dial",
    author,
    version,
    about = "Drive the reference Dial plugin through its C entry points"
)]
struct Cli {
    /// Sets the log level (error, warn, info, debug, trace).
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the plugin's function schema.
    Schema {
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,
    },
    /// Invoke one function and write its result to stdout.
    Invoke {
        #[arg(value_name = "FUNCTION")]
        function: String,
        /// Argument buffer, passed through verbatim (usually JSON).
        #[arg(long, value_name = "ARGS")]
        args: Option<String>,
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,
    },
    /// Perform every [[calls]] entry of a configuration file in order.
    Run {
        #[arg(
            short,
            long,
            value_name = "FILE",
            default_value = "config/minimal.dial.toml"
        )]
        config: PathBuf,
    },
    /// Exercise the whole plugin lifecycle and report each step.
    Check {
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,
    },
    /// Interact with configuration files.
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Print the C header declaring the plugin entry points.
    Header,
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Validates the provided configuration file.
    Validate {
        #[arg(value_name = "FILE")]
        config: PathBuf,
    },
    /// Prints the bundled minimal example configuration.
    Example,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level)?;
    match cli.command {
        Commands::Schema { config } => handle_schema(config.as_deref()),
        Commands::Invoke {
            function,
            args,
            config,
        } => handle_invoke(&function, args.as_deref(), config.as_deref()),
        Commands::Run { config } => handle_run(&config),
        Commands::Check { config } => handle_check(config.as_deref()),
        Commands::Config { command } => handle_config(command),
        Commands::Header => {
            print!("{C_HEADER}");
            Ok(())
        }
    }
}

fn init_tracing(level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init()
        .ok();
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let Some(path) = path else {
        return Ok(Config::default());
    };
    let config = Config::load(path)?;
    config.validate()?;
    Ok(config)
}

fn open(config: &Config) -> Result<PluginInstance> {
    let init_args = config.init_args()?;
    let instance = PluginInstance::init(dial_time_plugin::dial_plugin_vtable(), &init_args)
        .context("plugin initialization failed")?;
    tracing::info!(
        host_version = dial_core::version(),
        init_len = init_args.len(),
        "plugin ready"
    );
    Ok(instance)
}

fn handle_schema(config: Option<&Path>) -> Result<()> {
    let instance = open(&load_config(config)?)?;
    let schema = instance.schema()?;
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(())
}

fn handle_invoke(function: &str, args: Option<&str>, config: Option<&Path>) -> Result<()> {
    let instance = open(&load_config(config)?)?;
    let args = args.unwrap_or_default();
    let result = instance
        .invoke(function, args.as_bytes())
        .with_context(|| format!("failed to invoke `{function}`"))?;
    io::stdout().write_all(&result)?;
    Ok(())
}

fn handle_run(path: &Path) -> Result<()> {
    let config = load_config(Some(path))?;
    if config.calls.is_empty() {
        tracing::warn!(config = %path.display(), "no [[calls]] entries to run");
        return Ok(());
    }
    let instance = open(&config)?;
    let mut stdout = io::stdout().lock();
    for call in &config.calls {
        let args = call.args_bytes()?;
        let result = instance
            .invoke(&call.function, &args)
            .with_context(|| format!("failed to invoke `{}`", call.function))?;
        stdout.write_all(&result)?;
    }
    Ok(())
}

fn handle_check(config: Option<&Path>) -> Result<()> {
    let instance = open(&load_config(config)?)?;
    println!("ok   init");

    let first = instance.schema_bytes()?.to_vec();
    ensure!(
        instance.schema_bytes()? == first.as_slice(),
        "schema changed between consecutive calls"
    );
    let schema = instance.schema()?;
    println!("ok   schema ({} functions)", schema.len());

    for function in schema.functions() {
        if function.takes_arguments() {
            println!("skip {} (declares parameters)", function.name);
            continue;
        }
        let result = instance
            .invoke(&function.name, &[])
            .with_context(|| format!("`{}` failed with empty arguments", function.name))?;
        println!("ok   invoke {} ({} bytes)", function.name, result.len());
    }

    match instance.invoke(UNDECLARED_FUNCTION, &[]) {
        Err(err) if err.status() == Some(Status::InvokeError) => {
            println!("ok   unknown function rejected");
        }
        Err(err) => bail!("unknown function rejected with the wrong status: {err}"),
        Ok(_) => bail!("plugin accepted undeclared function `{UNDECLARED_FUNCTION}`"),
    }

    instance.deinit();
    println!("ok   deinit");
    Ok(())
}

fn handle_config(command: ConfigCommands) -> Result<()> {
    match command {
        ConfigCommands::Validate { config } => {
            load_config(Some(&config))?;
            println!("configuration OK: {}", config.display());
        }
        ConfigCommands::Example => {
            print!("{}", dial_core::config::EXAMPLE);
        }
    }
    Ok(())
}
