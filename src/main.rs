use std::{
    fs,
    io::{self, Write},
    path::PathBuf,
};

use amf::ClassAliasRegistry;
use amf_sampler::{
    config::{SamplerConfig, read_config, register_class_aliases},
    converter::{try_amf_message_to_xml, try_xml_to_amf_message},
    logger,
    render::render_response,
    sampler::AmfSampler,
    substitution::Substitution,
};
use anyhow::{Context, Result, ensure};
use clap::{Parser, Subcommand};
use tracing::info;

#[derive(Parser, Debug)]
#[command(version, about = "Sends AMF requests described as XML and shows AMF responses as XML")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Encode an XML action message into AMF bytes.
    Encode {
        input: PathBuf,
        /// Write the bytes here instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Replace FIND with REPLACE in the XML before encoding. Applied in order.
        #[arg(short, long = "substitute", value_name = "FIND=REPLACE", value_parser = parse_substitution)]
        substitutions: Vec<Substitution>,
    },
    /// Print the XML form of an AMF action message.
    Decode { input: PathBuf },
    /// Run a single sample described by a JSON config file.
    Sample { config: PathBuf },
}

fn parse_substitution(arg: &str) -> Result<Substitution, String> {
    arg.split_once('=')
        .map(|(find, replace)| Substitution::new(find, replace))
        .ok_or_else(|| format!("expected FIND=REPLACE, got {arg:?}"))
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = read_config();
    logger::init_logger(config.logger.clone()).context("Failed to initialize logger")?;
    register_class_aliases(&config.class_aliases);

    match args.command {
        Command::Encode {
            input,
            output,
            substitutions,
        } => {
            let xml = fs::read_to_string(&input)
                .with_context(|| format!("Failed to read {}", input.display()))?;
            let amf = try_xml_to_amf_message(&xml, &substitutions)?;
            match output {
                Some(output) => fs::write(&output, &amf)
                    .with_context(|| format!("Failed to write {}", output.display()))?,
                None => io::stdout().write_all(&amf)?,
            }
        }
        Command::Decode { input } => {
            let amf =
                fs::read(&input).with_context(|| format!("Failed to read {}", input.display()))?;
            let aliases = ClassAliasRegistry::global().snapshot();
            println!("{}", try_amf_message_to_xml(&amf, &aliases)?);
        }
        Command::Sample { config: path } => {
            let json = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let sampler_config = SamplerConfig::from_json(&json)?;
            let sampler = AmfSampler::new(sampler_config, config.request_timeout)?;
            let result = sampler.sample();

            info!(label = result.label, "Sample done");
            println!("{} {}", result.label, result.response_message);
            println!("elapsed: {} ms", result.elapsed.as_millis());
            let aliases = ClassAliasRegistry::global().snapshot();
            let content_type = result.content_type.as_deref().unwrap_or_default();
            println!(
                "{}",
                render_response(content_type, &result.response_data, &aliases)
            );
            for (name, value) in &result.variables {
                println!("{name} = {value}");
            }
            ensure!(
                result.successful,
                "Sample failed: {}",
                result.status.map_or_else(
                    || result.response_message.clone(),
                    |status| status.to_string()
                )
            );
        }
    }
    Ok(())
}
