//! `rsop` command line.
//!
//! Answers "what can this identity do?" against a live secrets service or a
//! repository of mirrored bindings, and "what changed, and for whom?" for the
//! uncommitted edits in such a repository.

mod logging;
mod report;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use report::OutputFormat;
use rsop_gitops::{analyze_changes, ChangeImpactPropagator, GitOpsConfig, GitRepository, IdentityBinding, Repository, Revision};
use rsop_vault::{download_all, ReadthroughPolicyProvider, VaultClient, VaultConfig};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Resultant Set of Policy analysis.
#[derive(Parser, Debug)]
#[command(name = "rsop", version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the RSoP of tokens, token accessors or role paths
    Resolve(ResolveArgs),

    /// Print the RSoP of an identity binding stored in a repository
    Show(ShowArgs),

    /// Work with a repository mirroring the secrets service
    #[command(subcommand)]
    Gitops(GitopsCommand),
}

#[derive(Args, Debug)]
struct ResolveArgs {
    /// Token, token accessor or role path (e.g. auth/kubernetes/role/web)
    #[arg(required = true)]
    things: Vec<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t, ignore_case = true)]
    format: OutputFormat,

    /// Read policies from this directory before asking the service
    #[arg(long, env = "RSOP_OFFLINE_DIR")]
    offline_dir: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ShowArgs {
    /// Repository-relative path of the identity binding
    identity: String,

    /// Repository directory
    #[arg(short = 'C', long, default_value = ".")]
    directory: PathBuf,

    /// Revision to read; the working copy when omitted
    #[arg(short, long)]
    revision: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t, ignore_case = true)]
    format: OutputFormat,
}

#[derive(Subcommand, Debug)]
enum GitopsCommand {
    /// Print the effective changes of every identity affected by uncommitted edits
    Diff(DiffArgs),

    /// Mirror every policy and identity binding from the secrets service
    Download(DownloadArgs),
}

#[derive(Args, Debug)]
struct DiffArgs {
    /// Repository directory
    #[arg(short = 'C', long, default_value = ".")]
    directory: PathBuf,

    /// Revision to compare against; resolved from the repository when omitted
    #[arg(long, env = "RSOP_COMPARE_REF")]
    compare_ref: Option<String>,
}

#[derive(Args, Debug)]
struct DownloadArgs {
    /// Directory to write the mirror to
    #[arg(short = 'C', long, default_value = ".")]
    directory: PathBuf,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, cancelling");
            on_interrupt.cancel();
        }
    });

    match cli.command {
        Command::Resolve(args) => resolve(args).await,
        Command::Show(args) => show(args).await,
        Command::Gitops(GitopsCommand::Diff(args)) => diff(args, cancel).await,
        Command::Gitops(GitopsCommand::Download(args)) => download(args).await,
    }
}

async fn resolve(args: ResolveArgs) -> Result<ExitCode> {
    let config = VaultConfig::from_env();
    config.require_token()?;
    let client = VaultClient::new(config).context("error creating secrets service client")?;
    let provider = ReadthroughPolicyProvider::new(args.offline_dir, Some(client));

    for (index, thing) in args.things.iter().enumerate() {
        // arguments may be tokens, so they are referred to by position
        let rsop = provider
            .get_rsop(thing)
            .await
            .with_context(|| format!("error generating RSoP for argument {}", index + 1))?;
        println!("{}", report::render_capabilities(&rsop.capability_map(), args.format));
    }
    Ok(ExitCode::SUCCESS)
}

async fn show(args: ShowArgs) -> Result<ExitCode> {
    let repo = GitRepository::new(args.directory.clone());
    let revision = args.revision.map(Revision::Commit).unwrap_or(Revision::Working);
    let config = GitOpsConfig::from_env();

    let data = repo
        .read_file_at(&revision, &args.identity)
        .await
        .with_context(|| format!("error reading {} at {}", args.identity, revision))?;
    let binding = IdentityBinding::parse(&data, &args.identity)?;
    let rsop = ChangeImpactPropagator::new(&repo, revision.clone(), &config)
        .load_rsop(&binding, &revision)
        .await
        .with_context(|| format!("error loading policies of {}", args.identity))?;

    println!("{}", report::render_capabilities(&rsop.capability_map(), args.format));
    Ok(ExitCode::SUCCESS)
}

async fn diff(args: DiffArgs, cancel: CancellationToken) -> Result<ExitCode> {
    let repo = GitRepository::new(args.directory.clone());
    let mut config = GitOpsConfig::from_env();
    if let Some(compare_ref) = args.compare_ref {
        config = config.with_compare_ref(compare_ref);
    }

    let impact = analyze_changes(&repo, &config, cancel)
        .await
        .context("error computing differentials")?;
    print!("{}", report::render_impact(&impact.report));

    if impact.report.failures.is_empty() {
        return Ok(ExitCode::SUCCESS);
    }
    for failure in &impact.report.failures {
        error!(path = %failure.path, code = failure.error.error_code(), "{}", failure.error);
    }
    error!(
        failed = impact.report.failures.len(),
        compare_ref = %impact.compare_ref,
        "Some differentials could not be computed"
    );
    Ok(ExitCode::FAILURE)
}

async fn download(args: DownloadArgs) -> Result<ExitCode> {
    let config = VaultConfig::from_env();
    config.require_token()?;
    let client = VaultClient::new(config).context("error creating secrets service client")?;

    if !args.directory.is_dir() {
        bail!("{} is not a directory", args.directory.display());
    }
    let summary = download_all(&client, &args.directory, &GitOpsConfig::from_env())
        .await
        .context("error mirroring the secrets service")?;
    info!(
        identities = summary.identities,
        policies = summary.policies,
        directory = %args.directory.display(),
        "Mirror complete"
    );
    Ok(ExitCode::SUCCESS)
}
