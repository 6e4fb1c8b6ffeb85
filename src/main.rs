use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};

use invaders_cfn::{AppConfig, Template};

#[derive(Parser, Debug)]
#[command(name = "invaders_cfn")]
#[command(about = "Synthesize and deploy the game backend CloudFormation stack")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write the template to a file, or stdout
    Synth {
        #[arg(long, short = 'c')]
        config: PathBuf,
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
        #[arg(long, short = 'f', value_enum, default_value_t = Format::Json)]
        format: Format,
    },
    /// Create or update the stack and print its outputs
    #[cfg(feature = "deploy")]
    Deploy {
        #[arg(long, short = 'c')]
        config: PathBuf,
        /// overrides `stack_name` from the config
        #[arg(long)]
        stack_name: Option<String>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Format {
    Json,
    Yaml,
}

fn load(path: &Path) -> anyhow::Result<(AppConfig, Template)> {
    let config = AppConfig::load(path).with_context(|| format!("Failed to load config from {:?}", path))?;
    let template = invaders_cfn::synthesize(&config).context("Failed to synthesize template")?;
    Ok((config, template))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "invaders_cfn=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Synth { config, output, format } => {
            let (_, template) = load(&config)?;
            let body = match format {
                Format::Json => template.to_json_pretty()?,
                Format::Yaml => template.to_yaml()?,
            };
            match output {
                Some(path) => {
                    std::fs::write(&path, body).with_context(|| format!("Failed to write {:?}", path))?;
                    tracing::info!(?path, "wrote template");
                }
                None => println!("{body}"),
            }
        }
        #[cfg(feature = "deploy")]
        Command::Deploy { config, stack_name } => {
            let (config, template) = load(&config)?;
            let stack_name = match stack_name {
                Some(name) => {
                    invaders_cfn::cfn::validate_stack_name(&name)?;
                    name
                }
                None => invaders_cfn::stack_name(&config)?,
            };
            let outputs = invaders_cfn::deploy::deploy(&stack_name, &config.region, &template).await?;
            for (key, value) in outputs {
                println!("{key} = {value}");
            }
        }
    }
    Ok(())
}
