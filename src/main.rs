//! pytest-discord CLI - post pytest session results to a Discord channel.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use console::style;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

use pytest_discord::config;
use pytest_discord::hook::{DiscordNotifier, SessionObserver};
use pytest_discord::junit;
use pytest_discord::options::{DiscordArgs, OptResolver};
use pytest_discord::render::make_results_message;
use pytest_discord::runner::PytestRunner;
use pytest_discord::session::Session;
use pytest_discord::stats::{self, Outcome};

#[derive(Parser)]
#[command(name = "pytest-discord")]
#[command(about = "Post pytest session results to a Discord channel", long_about = None)]
#[command(version)]
struct Cli {
    /// Persisted defaults file path
    #[arg(long, default_value = "pytest-discord.toml")]
    defaults_file: PathBuf,

    /// Verbose output (also the fallback notification verbosity)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(flatten)]
    discord: DiscordArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a pytest command and post its results
    Run {
        /// pytest invocation to wrap
        #[arg(long, default_value = "python -m pytest")]
        pytest: String,

        /// Extra arguments passed through to pytest
        #[arg(trailing_var_arg = true)]
        args: Vec<String>,
    },

    /// Post results from an existing JUnit XML file
    Notify {
        /// Result file produced with pytest --junitxml
        junit_xml: PathBuf,
    },

    /// Initialize a defaults file
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let log_level = if cli.verbose > 0 {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let defaults = config::load_defaults(&cli.defaults_file)
        .with_context(|| format!("Failed to load {}", cli.defaults_file.display()))?;
    let resolver = OptResolver::new(cli.discord, defaults);
    let ambient = i64::from(cli.verbose);

    match cli.command {
        Commands::Run { pytest, args } => run_and_notify(resolver, &pytest, args, ambient).await,
        Commands::Notify { junit_xml } => notify_from_file(resolver, &junit_xml, ambient).await,
        Commands::Init => init_defaults(&cli.defaults_file),
    }
}

async fn run_and_notify(
    resolver: OptResolver,
    pytest: &str,
    args: Vec<String>,
    ambient: i64,
) -> Result<()> {
    let runner = PytestRunner::new(pytest).with_args(args);
    let outcome = runner.run(ambient).await?;

    echo_outcome(&outcome.session);

    DiscordNotifier::new(resolver)
        .on_session_end(&outcome.session)
        .await;

    // The notification never changes the run's result; pytest's own exit
    // code is what callers observe.
    std::process::exit(outcome.exit_code);
}

async fn notify_from_file(resolver: OptResolver, junit_xml: &Path, ambient: i64) -> Result<()> {
    let summary = junit::read_junit_file(junit_xml)
        .with_context(|| format!("Failed to read JUnit XML from {}", junit_xml.display()))?;
    let session = summary.into_session(ambient);

    info!(
        tests = session.store.len(),
        "loaded results from {}",
        junit_xml.display()
    );

    DiscordNotifier::new(resolver).on_session_end(&session).await;

    Ok(())
}

fn echo_outcome(session: &Session) {
    let counts = stats::extract(&session.store);
    let summary = format!(
        "{} in {:.1} seconds",
        make_results_message(&counts),
        session.duration.as_secs_f64()
    );

    match stats::classify(&counts) {
        Outcome::Success => println!("{}", style(summary).green()),
        Outcome::Skip => println!("{}", style(summary).yellow()),
        Outcome::Fail => println!("{}", style(summary).red()),
    }
}

fn init_defaults(path: &Path) -> Result<()> {
    if path.exists() {
        eprintln!(
            "{} already exists. Remove it first or edit manually.",
            path.display()
        );
        std::process::exit(1);
    }

    let template = r#"# pytest-discord defaults file
#
# Every key is optional and can be overridden per run by the matching
# --discord-* flag or PYTEST_DISCORD_* environment variable.

# discord_webhook = "https://discord.com/api/webhooks/<id>/<token>"
# discord_verbose = 1
# discord_username = "pytest-discord"
# discord_success_icon = "https://example.com/success.png"
# discord_skip_icon = "https://example.com/skip.png"
# discord_fail_icon = "https://example.com/fail.png"
# discord_attach_file = false
"#;

    std::fs::write(path, template)?;
    println!("Created {}", path.display());
    println!();
    println!("Edit the defaults as needed, then run:");
    println!("  pytest-discord run -- tests");

    Ok(())
}
