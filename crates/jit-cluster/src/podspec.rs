//! Builds the two-container runner pod spec: a `serde_json::json!`
//! skeleton deserialized into the typed `k8s_openapi` struct.

use std::collections::BTreeMap;

use jit_core::conf::Cluster;
use jit_core::models::PodRequest;
use k8s_openapi::api::core::v1::Pod;
use serde_json::json;

/// Builds the runner pod: a `runner` container paired with a privileged
/// `sidecar` container, sharing a work directory and a docker-socket
/// directory via two `emptyDir` volumes.
pub fn build_pod(cluster: &Cluster, req: &PodRequest) -> Pod {
    let mut labels = BTreeMap::new();
    labels.insert("app".to_string(), cluster.managed_label.clone());
    labels.insert("tenant".to_string(), req.tenant.clone());
    labels.insert("job-id".to_string(), req.job_id.to_string());
    labels.insert("runner-name".to_string(), req.runner_name.clone());

    let runner_args = format!(
        "echo \"{config}\" | base64 -d > /home/runner/.runner && \
         /home/runner/run.sh --jitconfig /home/runner/.runner",
        config = req.encoded_jit_config,
    );

    let raw = json!({
        "apiVersion": "v1",
        "kind": "Pod",
        "metadata": {
            "name": req.runner_name,
            "namespace": cluster.namespace,
            "labels": labels,
        },
        "spec": {
            "restartPolicy": "Never",
            "terminationGracePeriodSeconds": cluster.pod_delete_grace_period_secs,
            "containers": [
                {
                    "name": "runner",
                    "image": cluster.runner_image,
                    "imagePullPolicy": "IfNotPresent",
                    "command": ["/bin/sh", "-c"],
                    "args": [runner_args],
                    "env": [
                        {"name": "DOCKER_HOST", "value": "unix:///var/run/docker.sock"},
                        {"name": "RUNNER_ALLOW_RUNASROOT", "value": "1"},
                    ],
                    "resources": {
                        "requests": {
                            "cpu": cluster.runner_cpu_request,
                            "memory": cluster.runner_memory_request,
                        },
                        "limits": {
                            "cpu": cluster.runner_cpu_limit,
                            "memory": cluster.runner_memory_limit,
                        },
                    },
                    "volumeMounts": [
                        {"name": "work", "mountPath": "/home/runner/_work"},
                        {"name": "dind-sock", "mountPath": "/var/run"},
                    ],
                },
                {
                    "name": "sidecar",
                    "image": cluster.sidecar_image,
                    "imagePullPolicy": "IfNotPresent",
                    "args": [
                        "dockerd",
                        "--host=unix:///var/run/docker.sock",
                        "--host=tcp://0.0.0.0:2376",
                    ],
                    "securityContext": {"privileged": true},
                    "volumeMounts": [
                        {"name": "work", "mountPath": "/home/runner/_work"},
                        {"name": "dind-sock", "mountPath": "/var/run"},
                    ],
                },
            ],
            "volumes": [
                {"name": "work", "emptyDir": {}},
                {"name": "dind-sock", "emptyDir": {}},
            ],
        },
    });
    serde_json::from_value(raw).expect("runner pod spec is always well-formed")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cluster() -> Cluster {
        Cluster {
            namespace: "jit-runners".into(),
            runner_image: "ghcr.io/actions/actions-runner:latest".into(),
            sidecar_image: "docker:dind".into(),
            managed_label: "jit-runner".into(),
            runner_cpu_request: "500m".into(),
            runner_cpu_limit: "1".into(),
            runner_memory_request: "512Mi".into(),
            runner_memory_limit: "1Gi".into(),
            pod_delete_grace_period_secs: 30,
            in_cluster: false,
        }
    }

    #[test]
    fn pod_carries_two_containers_and_managed_label() {
        let req = PodRequest {
            runner_name: "jit-runner-42".into(),
            tenant: "acme".into(),
            job_id: 42,
            encoded_jit_config: "abc123".into(),
            labels: vec!["self-hosted".into()],
        };
        let pod = build_pod(&cluster(), &req);
        assert_eq!(pod.metadata.name.as_deref(), Some("jit-runner-42"));
        let labels = pod.metadata.labels.unwrap();
        assert_eq!(labels.get("app"), Some(&"jit-runner".to_string()));
        assert_eq!(labels.get("tenant"), Some(&"acme".to_string()));
        assert_eq!(labels.get("job-id"), Some(&"42".to_string()));
        assert_eq!(labels.get("runner-name"), Some(&"jit-runner-42".to_string()));
        let containers = &pod.spec.unwrap().containers;
        assert_eq!(containers.len(), 2);
        assert_eq!(containers[0].name, "runner");
        assert_eq!(containers[1].name, "sidecar");
    }
}
