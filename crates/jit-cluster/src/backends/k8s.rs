//! The shipped [`ClusterClient`], backed by the `kube` API client.
//!
//! A single `Api<Pod>` scoped to a namespace, 404-tolerant deletes, and
//! phase read off `status.phase` directly rather than through a typed
//! enum (the k8s API itself only guarantees those four string values,
//! plus empty/unset).

use jit_core::conf::Cluster as ClusterConf;
use jit_core::error::Error;
use jit_core::error::Result;
use jit_core::models::{PodInfo, PodPhase, PodRequest};
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use tracing::instrument;

use crate::podspec::build_pod;
use crate::ClusterClient;

pub struct K8sCluster {
    api: Api<Pod>,
    conf: ClusterConf,
}

impl K8sCluster {
    pub async fn connect(conf: ClusterConf) -> Result<Self> {
        let client = if conf.in_cluster {
            kube::Client::try_default()
                .await
                .map_err(|e| Error::ClusterApi(e.to_string()))?
        } else {
            let kubeconfig = kube::config::Kubeconfig::read()
                .map_err(|e| Error::ClusterApi(e.to_string()))?;
            let options = kube::config::KubeConfigOptions::default();
            let config = kube::Config::from_custom_kubeconfig(kubeconfig, &options)
                .await
                .map_err(|e| Error::ClusterApi(e.to_string()))?;
            kube::Client::try_from(config).map_err(|e| Error::ClusterApi(e.to_string()))?
        };
        let api: Api<Pod> = Api::namespaced(client, &conf.namespace);
        Ok(K8sCluster { api, conf })
    }
}

fn phase_of(pod: &Pod) -> PodPhase {
    match pod.status.as_ref().and_then(|s| s.phase.as_deref()) {
        Some("Pending") => PodPhase::Pending,
        Some("Running") => PodPhase::Running,
        Some("Succeeded") => PodPhase::Succeeded,
        Some("Failed") => PodPhase::Failed,
        _ => PodPhase::Unknown,
    }
}

fn tenant_of(pod: &Pod) -> String {
    pod.metadata
        .labels
        .as_ref()
        .and_then(|labels| labels.get("tenant"))
        .cloned()
        .unwrap_or_default()
}

#[async_trait::async_trait]
impl ClusterClient for K8sCluster {
    #[instrument(name = "cluster::list_managed_pods", skip(self), err(Debug))]
    async fn list_managed_pods(&self) -> Result<Vec<PodInfo>> {
        let selector = format!("app={}", self.conf.managed_label);
        let params = ListParams::default().labels(&selector);
        let pods = self
            .api
            .list(&params)
            .await
            .map_err(|e| Error::ClusterApi(e.to_string()))?;
        let infos = pods
            .into_iter()
            .filter_map(|pod| {
                let name = pod.metadata.name.clone()?;
                Some(PodInfo { name, tenant: tenant_of(&pod), phase: phase_of(&pod) })
            })
            .collect();
        Ok(infos)
    }

    #[instrument(name = "cluster::create_pod", skip(self, req), fields(job_id = req.job_id), err(Debug))]
    async fn create_pod(&self, req: PodRequest) -> Result<()> {
        let pod = build_pod(&self.conf, &req);
        match self.api.create(&PostParams::default(), &pod).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(err)) if err.code == 409 => Ok(()),
            Err(err) => Err(Error::ClusterApi(err.to_string())),
        }
    }

    #[instrument(name = "cluster::delete_pod", skip(self), err(Debug))]
    async fn delete_pod(&self, name: &str) -> Result<()> {
        let params = DeleteParams::default()
            .grace_period(self.conf.pod_delete_grace_period_secs);
        match self.api.delete(name, &params).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(err)) if err.code == 404 => Ok(()),
            Err(err) => Err(Error::ClusterApi(err.to_string())),
        }
    }
}
