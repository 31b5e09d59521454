use std::path::PathBuf;

use clap::Args;
use courtbot::{
    Aggregated, ErrorMode, LogLevel, get_case_parties, get_case_party_events, logger::init_tracing,
};

use super::CliContext;

#[derive(Args, Debug)]
pub struct LookupArgs {
    /// Case number
    #[arg(long)]
    pub case: String,

    /// Party id; lists that party's events instead of the case's parties
    #[arg(long)]
    pub party: Option<String>,

    /// Return `{ values, errors }` instead of the bare values
    #[arg(long, default_value_t = false)]
    pub errors: bool,

    /// YAML case fixtures (defaults to COURTBOT_FIXTURES)
    #[arg(long)]
    pub fixtures: Option<PathBuf>,

    /// Log level override (e.g. error, warn, info, debug, trace)
    #[arg(long)]
    pub log_level: Option<String>,
}

impl LookupArgs {
    pub fn mode(&self) -> ErrorMode {
        if self.errors { ErrorMode::RECORD } else { ErrorMode::DEFAULT }
    }
}

pub async fn execute(args: LookupArgs, context: &CliContext) -> anyhow::Result<()> {
    let log_level = args
        .log_level
        .as_deref()
        .map(LogLevel::from)
        .unwrap_or(context.settings.log_level);
    let telemetry = init_tracing(&context.root, log_level)?;

    let bus = context.provider_bus(args.fixtures.clone())?;
    let mode = args.mode();
    let result: Aggregated = telemetry
        .instrument_request("lookup", || async {
            let result = match &args.party {
                Some(party) => get_case_party_events(&bus, &args.case, party, mode).await,
                None => get_case_parties(&bus, &args.case, mode).await,
            };
            Ok::<_, anyhow::Error>(result)
        })
        .await?;

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
