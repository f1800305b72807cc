use std::process::ExitCode;

use shotsync::config::{SyncConfig, token_path_from_env};
use shotsync::runner::{self, RunMode, Runner};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CliMode {
    Run(RunMode),
    Logout,
    Help,
}

fn parse_cli_mode<I>(args: I) -> anyhow::Result<CliMode>
where
    I: IntoIterator<Item = String>,
{
    let mut interactive = false;
    let mut assume_yes = false;
    let mut logout = false;
    let mut args = args.into_iter().skip(1);
    while let Some(arg) = args.next() {
        let mode_value = match arg.as_str() {
            "--mode" => Some(
                args.next()
                    .ok_or_else(|| anyhow::anyhow!("--mode requires a value"))?,
            ),
            other => other.strip_prefix("--mode=").map(str::to_string),
        };
        if let Some(value) = mode_value {
            interactive = match value.as_str() {
                "auto" => false,
                "interactive" => true,
                other => anyhow::bail!("unknown mode: {other} (expected auto or interactive)"),
            };
            continue;
        }
        match arg.as_str() {
            "--yes" | "-y" => assume_yes = true,
            "--logout" => logout = true,
            "--help" | "-h" => return Ok(CliMode::Help),
            other => anyhow::bail!("unknown argument: {other}"),
        }
    }
    if logout {
        return Ok(CliMode::Logout);
    }
    Ok(CliMode::Run(if interactive {
        RunMode::Interactive { assume_yes }
    } else {
        RunMode::Auto
    }))
}

fn print_help() {
    println!("Usage: shotsync [--mode auto|interactive] [--yes] [--logout]");
    println!("  --mode auto         Upload without asking (default)");
    println!("  --mode interactive  Show the pending uploads and ask before starting");
    println!("  --yes, -y           Skip the question in interactive mode");
    println!("  --logout            Remove the saved OAuth token and exit");
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let mode = match parse_cli_mode(std::env::args())? {
        CliMode::Logout => {
            let path = token_path_from_env()?;
            if shotsync::auth::logout(&path)? {
                tracing::info!(path = %path.display(), "saved token removed");
            } else {
                tracing::info!(path = %path.display(), "no saved token");
            }
            return Ok(ExitCode::SUCCESS);
        }
        CliMode::Help => {
            print_help();
            return Ok(ExitCode::SUCCESS);
        }
        CliMode::Run(mode) => mode,
    };

    let config = SyncConfig::from_env()?;
    let store = runner::connect(&config, mode).await?;
    let summary = Runner::new(config, store).run(mode).await?;
    Ok(if summary.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
