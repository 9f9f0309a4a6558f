use clap::{Parser, Subcommand};
use marksite::build::{Build, BuildOptions};
use marksite::config::Project;
use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "marksite", version, about = "Builds a blog from Markdown posts and pages")]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace). `RUST_LOG` overrides.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build the site into the configured output directory.
    Build {
        /// The project directory. Defaults to the nearest directory at or
        /// above the current one that contains `config.yaml`.
        #[arg(long, value_name = "DIR")]
        project_dir: Option<PathBuf>,

        /// Include posts marked as drafts.
        #[arg(long)]
        drafts: bool,

        /// Fail if any content file can't be parsed.
        #[arg(long)]
        strict: bool,
    },
}

fn init_tracing(verbose: u8) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = match verbose {
        0 => "marksite=info",
        1 => "marksite=debug",
        _ => "marksite=trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    match cli.command {
        Command::Build {
            project_dir,
            drafts,
            strict,
        } => {
            let project = match project_dir {
                Some(dir) => Project::at(&dir),
                None => Project::locate(&std::env::current_dir()?)?,
            };
            let options = BuildOptions {
                include_drafts: drafts,
                strict,
            };
            let report = Build::new(project, options).run()?;
            tracing::info!(
                posts = report.posts,
                pages = report.pages,
                tags = report.tags,
                index_pages = report.index_pages,
                assets = report.assets,
                skipped = report.diagnostics.len(),
                "built {}",
                report.output_dir.display()
            );
            Ok(())
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{}", error_message(err.as_ref()));
            ExitCode::FAILURE
        }
    }
}

/// Every error in the crate already embeds its source's message, so only the
/// outermost one is printed.
fn error_message(err: &dyn Error) -> String {
    format!("error: {}", err)
}
