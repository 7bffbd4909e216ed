use anyhow::{Context, Result};
use clap::Parser;
use retrier::command::{CommandFailure, CommandSpec};
use retrier::config::RetryConfig;
use retrier::http::HttpClient;
use retrier::retry::{Cancelled, retry_until};
use retrier::runtime::RealRuntime;
use std::path::PathBuf;
use std::process::ExitCode;

/// retrier - run things until they work
///
/// Repeats a failing command or HTTP request with exponential backoff.
///
/// Settings are taken from the config file ($RETRIER_CONFIG, or
/// retrier/config.json in the platform config directory), then overridden by
/// environment variables and flags.
///
/// Examples:
///   retrier -n 5 run -- curl -fsS https://example.com/health
///   retrier --transient-only fetch https://example.com/status.json
#[derive(Parser, Debug)]
#[command(author, version = env!("RETRIER_VERSION"), about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    policy: PolicyArgs,
}

#[derive(clap::Args, Debug, Default)]
struct PolicyArgs {
    /// Maximum number of attempts, including the first
    #[arg(
        long = "attempts",
        short = 'n',
        env = "RETRIER_ATTEMPTS",
        value_name = "N",
        global = true
    )]
    attempts: Option<u32>,

    /// Delay before the first retry, in milliseconds
    #[arg(
        long = "initial-delay",
        env = "RETRIER_INITIAL_DELAY",
        value_name = "MS",
        global = true
    )]
    initial_delay_ms: Option<u64>,

    /// Factor the delay grows by after every failed attempt
    #[arg(
        long = "multiplier",
        env = "RETRIER_MULTIPLIER",
        value_name = "FACTOR",
        global = true
    )]
    multiplier: Option<f64>,

    /// Upper bound on a single delay, in milliseconds
    #[arg(
        long = "max-delay",
        env = "RETRIER_MAX_DELAY",
        value_name = "MS",
        global = true
    )]
    max_delay_ms: Option<u64>,

    /// Config file to read instead of the default one
    #[arg(long = "config", value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    /// Give up right away on failures that don't look transient
    #[arg(long = "transient-only", global = true)]
    transient_only: bool,
}

impl PolicyArgs {
    fn to_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.attempts,
            initial_delay_ms: self.initial_delay_ms,
            backoff_multiplier: self.multiplier,
            max_delay_ms: self.max_delay_ms,
            transient_only: self.transient_only.then_some(true),
        }
    }
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Run a command until it exits successfully
    Run(RunArgs),

    /// Fetch a URL and print the response body
    Fetch(FetchArgs),
}

#[derive(clap::Args, Debug)]
struct RunArgs {
    /// The command and its arguments
    #[arg(
        value_name = "COMMAND",
        required = true,
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    command: Vec<String>,
}

#[derive(clap::Args, Debug)]
struct FetchArgs {
    /// The URL to GET
    #[arg(value_name = "URL")]
    url: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) if e.downcast_ref::<Cancelled>().is_some() => {
            eprintln!("\nInterrupted");
            ExitCode::from(130) // Standard exit code for Ctrl-C
        }
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(exit_code_for(&e))
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let file_config = RetryConfig::discover(&RealRuntime, cli.policy.config.as_deref())?;
    let policy = file_config
        .merge(cli.policy.to_config())
        .to_policy()?
        .on_retry(|e, attempt| {
            eprintln!("retrier: attempt {} failed: {:#}", attempt, e);
            Ok(())
        });

    match cli.command {
        Commands::Run(args) => {
            let spec = CommandSpec::from_argv(&args.command).context("No command given")?;
            retry_until(|| spec.run_once(), &policy, interrupted()).await
        }
        Commands::Fetch(args) => {
            let client = HttpClient::with_defaults()?;
            let body = client
                .get_text_until(&args.url, &policy, interrupted())
                .await?;
            print!("{}", body);
            Ok(())
        }
    }
}

/// Completes on Ctrl-C. Never completes if the signal can't be watched.
async fn interrupted() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// A failed command's own exit code, 1 for everything else.
fn exit_code_for(error: &anyhow::Error) -> u8 {
    error
        .downcast_ref::<CommandFailure>()
        .and_then(|failure| failure.code)
        .and_then(|code| u8::try_from(code).ok())
        .filter(|code| *code != 0)
        .unwrap_or(1)
}
