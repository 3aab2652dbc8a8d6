//! The runner-manager daemon: loads config, wires the store/cluster/
//! source-control clients, seeds tenant caps, then runs the dispatcher,
//! reconciler, and cleanup loops until told to stop.

mod args;
mod dry_run;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use jit_cluster::{ClusterClient, K8sCluster};
use jit_core::Conf;
use jit_orchestrator::{cleanup, dispatcher, reconciler, tenant_caps, worker};
use jit_sourcecontrol::GitHubSourceControl;
use jit_store::{RedisStore, StateStore};
use tracing::{event, Level};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let args = args::Args::parse();
    let conf = Conf::new(&args.config).expect("failed to load config");
    event!(Level::INFO, config = args.config, dry_run = args.dry_run, "starting runner-manager daemon");

    let store: Arc<dyn StateStore> = Arc::new(
        RedisStore::connect(&conf.store.url, conf.store.namespace.clone())
            .await
            .expect("failed to connect to state store"),
    );
    let cluster: Arc<dyn ClusterClient> = if args.dry_run {
        Arc::new(dry_run::DryRunCluster)
    } else {
        Arc::new(K8sCluster::connect(conf.cluster.clone()).await.expect("failed to connect to cluster"))
    };
    let source_control: Arc<dyn jit_sourcecontrol::SourceControl> = Arc::new(
        GitHubSourceControl::new(conf.source_control.clone()).expect("failed to build source control client"),
    );

    tenant_caps::initialize_from_file(store.as_ref(), &conf.tenant_caps.file, false)
        .await
        .unwrap_or_else(|err| event!(Level::WARN, error = %err, "failed to seed tenant caps"));

    let runner_ttl = Duration::from_secs(conf.store.runner_record_ttl_secs);
    let worker_max_attempts = conf.dispatch.worker_max_attempts;
    let worker_backoff = Duration::from_secs(conf.dispatch.worker_backoff_secs);

    let dispatcher_handle = {
        let store = store.clone();
        let cluster = cluster.clone();
        let source_control = source_control.clone();
        let dispatch_conf = conf.dispatch.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(dispatch_conf.dispatcher_period_secs));
            loop {
                ticker.tick().await;
                match dispatcher::tick(store.as_ref(), cluster.as_ref(), &dispatch_conf).await {
                    Ok(dispatcher::TickOutcome::Selected(jobs)) => {
                        for job in jobs {
                            let store = store.clone();
                            let cluster = cluster.clone();
                            let source_control = source_control.clone();
                            tokio::spawn(async move {
                                worker::dispatch(
                                    store.as_ref(),
                                    cluster.as_ref(),
                                    source_control.as_ref(),
                                    runner_ttl,
                                    worker_max_attempts,
                                    worker_backoff,
                                    job,
                                )
                                .await;
                            });
                        }
                    }
                    Ok(_) => {}
                    Err(err) => event!(Level::ERROR, error = %err, "dispatcher tick failed"),
                }
            }
        })
    };

    let reconciler_handle = {
        let store = store.clone();
        let cluster = cluster.clone();
        let period = conf.dispatch.reconciler_period_secs;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(period));
            loop {
                ticker.tick().await;
                if let Err(err) = reconciler::tick(store.as_ref(), cluster.as_ref()).await {
                    event!(Level::ERROR, error = %err, "reconciler tick failed");
                }
            }
        })
    };

    let cleanup_handle = {
        let cluster = cluster.clone();
        let period = conf.dispatch.cleanup_period_secs;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(period));
            loop {
                ticker.tick().await;
                if let Err(err) = cleanup::tick(cluster.as_ref()).await {
                    event!(Level::ERROR, error = %err, "cleanup tick failed");
                }
            }
        })
    };

    tokio::signal::ctrl_c().await.expect("failed to listen for shutdown signal");
    event!(Level::INFO, "shutdown signal received, stopping");
    dispatcher_handle.abort();
    reconciler_handle.abort();
    cleanup_handle.abort();
}
