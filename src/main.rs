use anyhow::{Context, Result};
use clap::Parser;
use mvn_query::app::MvnQuery;
use mvn_query::cli::Cli;
use mvn_query::config::{DEFAULTS, QueryConfig};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let cli = parse_cli();

    if cli.version {
        eprintln!("{}", version_line());
        return Ok(());
    }

    init_logging(cli.quiet);

    let config = QueryConfig::from_cli(&cli, DEFAULTS)?;
    let app = MvnQuery::new(config)?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    app.perform(&mut out)
        .with_context(|| format!("query against {} failed", app.config().repository))?;
    Ok(())
}

/// Help and usage errors both end the process with status 2.
fn parse_cli() -> Cli {
    match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            std::process::exit(2);
        }
    }
}

fn version_line() -> String {
    format!("mvn-query version {}", env!("CARGO_PKG_VERSION"))
}

fn init_logging(quiet: bool) {
    let default_level = if quiet { "warn" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    // Results own stdout; progress goes to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_line_names_the_binary() {
        let line = version_line();
        assert!(line.starts_with("mvn-query version "));
        assert!(line.ends_with(env!("CARGO_PKG_VERSION")));
    }

    #[test]
    fn version_flag_parses_without_other_arguments() {
        let cli = Cli::try_parse_from(["mvn-query", "-v"]).unwrap();
        assert!(cli.version);
        let cli = Cli::try_parse_from(["mvn-query", "--version"]).unwrap();
        assert!(cli.version);
    }

    #[test]
    fn unknown_flags_are_usage_errors() {
        let err = Cli::try_parse_from(["mvn-query", "--no-such-flag"]).err().unwrap();
        assert_eq!(err.exit_code(), 2);
    }
}
