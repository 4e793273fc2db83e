//! kmanager: create, delete, list and describe managed GKE clusters.

mod preflight;
mod terminal;

use clap::{Parser, Subcommand};
use provision::{
    teardown, ClusterStore, ExecContext, HttpManifestSource, ProcessRunner, ProvisionError,
    Provisioner, Settings,
};
use std::process::ExitCode;
use terminal::TerminalPrompter;
use tokio_util::sync::CancellationToken;

const DEFAULT_TOOL_NAME: &str = "kmanager";

#[derive(Parser, Debug)]
#[command(name = "kmanager", version, about = "Provision and tear down managed GKE clusters")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a new cluster interactively
    Create,
    /// Delete a cluster and everything provisioned for it
    Delete {
        name: Option<String>,
        /// Keep the managed DNS zone
        #[arg(long = "leave-dns-zone")]
        leave_dns_zone: bool,
    },
    /// List known clusters
    List,
    /// Print the stored configuration of a cluster
    Describe { name: Option<String> },
}

fn usage(command: &str) -> ExitCode {
    eprintln!(
        "expected '{0} [cluster name]'.\ncluster name is a required argument for the {0} command",
        command
    );
    ExitCode::FAILURE
}

fn open_store() -> Result<(ClusterStore, Settings), ProvisionError> {
    let default_store = ClusterStore::for_user(DEFAULT_TOOL_NAME)?;
    let settings = Settings::load(default_store.root())?;
    let store = ClusterStore::for_user(&settings.tool_name)?;
    Ok((store, settings))
}

async fn create(
    store: &ClusterStore,
    settings: &Settings,
    cancel: CancellationToken,
) -> Result<(), ProvisionError> {
    let prompter = TerminalPrompter::new(cancel.clone());
    let name = prompter.cluster_name()?;
    let domain = prompter.domain_name()?;

    let runner = ProcessRunner::new();
    let source = HttpManifestSource::new(settings.http_timeout())?;
    let exec = ExecContext::new(&runner, &prompter, cancel);

    let state = Provisioner::new(exec, store, settings, &source)
        .create(&name, &domain)
        .await?;
    println!("{}", store.read_raw(&state.name)?);
    Ok(())
}

async fn delete(
    store: &ClusterStore,
    name: &str,
    leave_dns_zone: bool,
    cancel: CancellationToken,
) -> Result<(), ProvisionError> {
    let runner = ProcessRunner::new();
    let prompter = TerminalPrompter::new(cancel.clone());
    let exec = ExecContext::new(&runner, &prompter, cancel);

    let report = teardown(&exec, store, name, leave_dns_zone).await?;
    for (step, reason) in &report.failures {
        eprintln!("{}: {}", step, reason);
    }
    println!("Cluster {} deleted", name);
    Ok(())
}

fn list(store: &ClusterStore) -> Result<(), ProvisionError> {
    let clusters = store.list()?;
    if clusters.is_empty() {
        println!("No cluster found!");
        return Ok(());
    }
    println!("clusters:");
    println!("---------");
    for name in clusters {
        println!("{}", name);
    }
    Ok(())
}

fn describe(store: &ClusterStore, name: &str) -> ExitCode {
    match store.read_raw(name) {
        Ok(raw) => {
            println!("{}", raw);
            ExitCode::SUCCESS
        }
        Err(ProvisionError::ClusterNotFound(_)) => {
            eprintln!("Unable to print configuration, config.json file not exists");
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn preflight_ok(cancel: &CancellationToken) -> bool {
    preflight::check_tools(&ProcessRunner::quiet(), cancel).await
}

fn report(result: Result<(), ProvisionError>) -> ExitCode {
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Default to info level if RUST_LOG not set
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();

    let (store, settings) = match open_store() {
        Ok(opened) => opened,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, stopping (press Ctrl-C again to exit now)");
            on_interrupt.cancel();
        }
        // A second interrupt cannot reach a prompt blocked on stdin.
        if tokio::signal::ctrl_c().await.is_ok() {
            std::process::exit(130);
        }
    });

    match cli.command {
        Command::Create => {
            if !preflight_ok(&cancel).await {
                return ExitCode::FAILURE;
            }
            report(create(&store, &settings, cancel).await)
        }
        Command::Delete {
            name,
            leave_dns_zone,
        } => {
            let Some(name) = name else {
                return usage("delete");
            };
            if !preflight_ok(&cancel).await {
                return ExitCode::FAILURE;
            }
            report(delete(&store, &name, leave_dns_zone, cancel).await)
        }
        Command::List => report(list(&store)),
        Command::Describe { name } => match name {
            Some(name) => describe(&store, &name),
            None => usage("describe"),
        },
    }
}
