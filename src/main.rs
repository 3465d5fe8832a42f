use apirelay::services::logger::Logger;
use apirelay::utils::args::join_argv;
use apirelay::{CallContext, CallResult, RelayManager};
use base64::Engine;
use clap::{Parser, Subcommand};
use serde_json::{Map, Value};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "apirelay", about = "Config-driven HTTP API relay")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one command line through the call pipeline.
    Call {
        #[arg(long)]
        data_dir: PathBuf,
        #[arg(long)]
        user_id: Option<String>,
        #[arg(long)]
        group_id: Option<String>,
        #[arg(long)]
        admin: bool,
        /// Extra `{{config.*}}` values as key=value, repeatable.
        #[arg(long = "config", value_name = "KEY=VALUE")]
        config: Vec<String>,
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        raw: Vec<String>,
    },
    /// Fire one entry of schedules.json now, as the scheduler would.
    Schedule {
        #[arg(long)]
        data_dir: PathBuf,
        #[arg(long)]
        index: usize,
    },
}

fn parse_extra_config(pairs: &[String]) -> Result<Option<Map<String, Value>>, String> {
    if pairs.is_empty() {
        return Ok(None);
    }
    let mut out = Map::new();
    for pair in pairs {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| format!("--config expects KEY=VALUE, got '{}'", pair))?;
        out.insert(key.trim().to_string(), Value::String(value.to_string()));
    }
    Ok(Some(out))
}

fn render(result: &CallResult) -> Value {
    let mut out = serde_json::to_value(result).unwrap_or(Value::Null);
    if let (Some(bytes), Value::Object(map)) = (&result.media_bytes, &mut out) {
        map.insert(
            "media_base64".to_string(),
            Value::String(base64::engine::general_purpose::STANDARD.encode(bytes)),
        );
    }
    out
}

async fn run(cli: Cli) -> Result<bool, String> {
    let relay = RelayManager::new(Logger::new("apirelay"));
    let result = match cli.command {
        Command::Call {
            data_dir,
            user_id,
            group_id,
            admin,
            config,
            raw,
        } => {
            let extra = parse_extra_config(&config)?;
            let ctx = CallContext::new(user_id, group_id, admin);
            relay
                .run(&data_dir, &join_argv(&raw), &ctx, extra.as_ref())
                .await
        }
        Command::Schedule { data_dir, index } => {
            let schedules = relay.config_store().schedules(&data_dir);
            let entry = schedules
                .get(index)
                .ok_or_else(|| format!("No schedule entry at index {}", index))?;
            relay.run_scheduled(&data_dir, entry, None).await
        }
    };
    let rendered = serde_json::to_string_pretty(&render(&result)).map_err(|e| e.to_string())?;
    println!("{}", rendered);
    Ok(result.success)
}

#[tokio::main]
async fn main() {
    match run(Cli::parse()).await {
        Ok(true) => {}
        Ok(false) => std::process::exit(2),
        Err(err) => {
            eprintln!("apirelay: {}", err);
            std::process::exit(1);
        }
    }
}
