use std::path::Path;

use self::cli::{Cli, SubCommands};
use self::config::RunConfig;
use self::job::{Job, JobError, ValidationError};
use self::kubernetes_objects::cluster::KubeCluster;
use self::kubernetes_objects::template::{TemplateError, load_template};
use self::shutdown::Shutdown;
use kube::config::{KubeConfigOptions, Kubeconfig, KubeconfigError};
use thiserror::Error;
use tracing::{info, instrument};
use tracing_error::ExtractSpanTrace;
use tracing_error::SpanTrace;

pub mod cli;
pub mod config;
pub mod error;
pub mod job;
pub mod kubernetes_objects;
pub mod shutdown;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid configuration.\n{0}")]
    ConfigError(#[from] config::ConfigError),

    #[error("Failed to load kubeconfig.\n{0}")]
    KubeconfigError(#[from] KubeconfigError),

    #[error("Failed to initialize kubernetes client.\n{0}")]
    KubeClientError(#[from] kube::Error),

    #[error("Failed to load job template.\n{0}")]
    TemplateError(#[from] TemplateError),

    #[error("Invalid job.\n{0}")]
    ValidationError(#[from] ValidationError),

    #[error("Job stopped due to following error:\n{0}")]
    JobError(#[from] JobError),
}

impl ExtractSpanTrace for AppError {
    fn span_trace(&self) -> Option<&SpanTrace> {
        match self {
            AppError::JobError(e) => e.span_trace(),
            _ => None,
        }
    }
}

pub async fn app(cli: Cli) -> Result<(), AppError> {
    match cli.subcommand {
        SubCommands::Version {} => {
            print_version();
            Ok(())
        }
        SubCommands::Run(args) => {
            let config = RunConfig::from_args(args, cli.config)?;
            info!("Config Loaded.");
            run(config).await
        }
    }
}

#[instrument(
    "kube_job",
    skip_all,
    fields(template = %config.template_file, container = %config.container)
)]
async fn run(config: RunConfig) -> Result<(), AppError> {
    let client = kube_client(config.kubeconfig.as_deref()).await?;

    info!("Kubernetes Client Initialized.");

    let template = load_template(&config.template_file).await?;
    let job = Job::new(
        KubeCluster::new(client),
        template,
        config.args,
        config.container,
        config.timeout,
    )?
    .with_watch_config(config.watch)
    .with_shutdown(Shutdown::new());

    job.run_and_cleanup(config.cleanup, config.ignore_sidecar)
        .await?;
    Ok(())
}

async fn kube_client(kubeconfig: Option<&Path>) -> Result<kube::Client, AppError> {
    let Some(path) = kubeconfig else {
        return Ok(kube::Client::try_default().await?);
    };
    info!("Using config file: {}", path.display());
    let kubeconfig = Kubeconfig::read_from(path)?;
    let config =
        kube::Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default()).await?;
    Ok(kube::Client::try_from(config)?)
}

fn print_version() {
    println!("Version : {}", env!("CARGO_PKG_VERSION"));
    println!(
        "Revision: {}",
        option_env!("KUBE_JOB_REVISION").unwrap_or("unknown")
    );
    println!("Build   : {}", option_env!("KUBE_JOB_BUILD").unwrap_or("unknown"));
}
