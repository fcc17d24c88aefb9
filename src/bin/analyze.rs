//! Run one aggregation from the command line and print the result as JSON.
//!
//! ```bash
//! analyze <numeric_column> [reference_column] [--month Jan --year 2024] [--input sales.xlsx]
//! ```
//!
//! With `--input` the file is first ingested like an upload, replacing the
//! stored dataset. The job goes through the same queue the HTTP service
//! uses, so `RUSTY_SALES_*` variables (environment or `.env`) apply here too.

use std::path::PathBuf;

use anyhow::{Context, bail};
use rusty_sales::analysis::{AggregationRequest, DrillDown};
use rusty_sales::config::ServiceConfig;
use rusty_sales::data::loader;
use rusty_sales::jobs::JobQueue;

const USAGE: &str = "Usage: analyze <numeric_column> [reference_column] \
                     [--month <Mon> --year <YYYY>] [--input <file>]";

struct CliArgs {
    request: AggregationRequest,
    input: Option<PathBuf>,
}

impl CliArgs {
    fn from_args(args: &[String]) -> anyhow::Result<Self> {
        let flag = |name: &str| {
            args.windows(2)
                .find(|w| w[0] == name)
                .map(|w| w[1].clone())
        };

        let mut positional = Vec::new();
        let mut iter = args.iter();
        while let Some(arg) = iter.next() {
            if arg.starts_with("--") {
                // skip the flag's value
                iter.next();
            } else {
                positional.push(arg.clone());
            }
        }

        let Some(numeric) = positional.first() else {
            bail!("Missing numeric column. {USAGE}");
        };
        let mut request = AggregationRequest::new(numeric.clone());
        if let Some(reference) = positional.get(1) {
            request = request.with_reference(reference.clone());
        }

        match (flag("--month"), flag("--year")) {
            (Some(month), Some(year)) => {
                request = request.with_drill_down(DrillDown::new(month, year));
            }
            (None, None) => {}
            _ => bail!("--month and --year must be given together. {USAGE}"),
        }

        Ok(Self {
            request,
            input: flag("--input").map(PathBuf::from),
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let cli = CliArgs::from_args(&args)?;
    let config = ServiceConfig::from_env();

    if let Some(input) = &cli.input {
        let dataset = loader::load_file(input)
            .with_context(|| format!("loading {}", input.display()))?;
        config.dataset_store().save(&dataset)?;
    }

    let jobs = JobQueue::from_config(&config);
    let id = jobs.submit(cli.request);
    let result = jobs
        .wait(&id)
        .await
        .context("job result was evicted before it could be read")?;

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
