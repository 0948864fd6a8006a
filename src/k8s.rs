use anyhow::{Context, Result};
use chrono::Local;
use futures::FutureExt;
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::api::{AttachParams, ListParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Api, Client, Config, ResourceExt};
use std::path::PathBuf;
use tracing::debug;

use crate::model::{Instance, Phase, Snapshot};
use crate::session::{ByteReader, ByteWriter, ExecRequest, RemoteCompletion, RemoteSession};

const LIST_PAGE_SIZE: u32 = 500;

/// Read side of the cluster: one snapshot of pods per call.
pub trait InventoryClient {
    async fn list_instances(&self) -> Result<Snapshot>;
}

/// Attach side of the cluster: negotiates an exec session on one pod.
pub trait SessionExecutor {
    async fn open_session(&self, target: &Instance, request: &ExecRequest)
    -> Result<RemoteSession>;
}

#[derive(Debug, Clone, Default)]
pub struct ConnectOptions {
    pub kubeconfig: Option<PathBuf>,
    pub context: Option<String>,
    pub namespace: Option<String>,
}

#[derive(Clone)]
pub struct KubeGateway {
    client: Client,
    context: String,
    cluster: String,
    namespace: Option<String>,
}

impl KubeGateway {
    pub async fn connect(options: &ConnectOptions) -> Result<Self> {
        let kube_options = KubeConfigOptions {
            context: options.context.clone(),
            cluster: None,
            user: None,
        };

        let kubeconfig = match &options.kubeconfig {
            Some(path) => Some(
                Kubeconfig::read_from(path)
                    .with_context(|| format!("failed to read kubeconfig {}", path.display()))?,
            ),
            None => Kubeconfig::read().ok(),
        };

        let config = if let Some(kubeconfig_value) = kubeconfig.clone() {
            Config::from_custom_kubeconfig(kubeconfig_value, &kube_options)
                .await
                .context("failed to load Kubernetes configuration from kubeconfig")?
        } else {
            if options.context.is_some() {
                anyhow::bail!("kubeconfig not found; --context cannot be applied");
            }
            Config::infer()
                .await
                .context("failed to infer Kubernetes configuration")?
        };

        let cluster = config.cluster_url.to_string();
        let client = Client::try_from(config).context("failed to initialize Kubernetes client")?;
        let context = options
            .context
            .clone()
            .or_else(|| {
                kubeconfig
                    .as_ref()
                    .and_then(|cfg| cfg.current_context.clone())
            })
            .unwrap_or_else(|| "in-cluster".to_string());

        Ok(Self::from_client(
            client,
            context,
            cluster,
            options.namespace.as_deref(),
        ))
    }

    /// A blank namespace means all namespaces.
    fn from_client(
        client: Client,
        context: String,
        cluster: String,
        namespace: Option<&str>,
    ) -> Self {
        let namespace = namespace
            .map(str::trim)
            .filter(|namespace| !namespace.is_empty())
            .map(str::to_string);

        Self {
            client,
            context,
            cluster,
            namespace,
        }
    }

    pub fn cluster(&self) -> &str {
        &self.cluster
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    fn pods(&self) -> Api<Pod> {
        match &self.namespace {
            Some(namespace) => Api::namespaced(self.client.clone(), namespace),
            None => Api::all(self.client.clone()),
        }
    }
}

impl InventoryClient for KubeGateway {
    async fn list_instances(&self) -> Result<Snapshot> {
        let pods = self.pods();
        let mut params = list_params();
        let mut instances = Vec::new();
        let mut pages = 0usize;

        loop {
            let page = pods.list(&params).await.context("pod list request failed")?;
            pages += 1;
            let next = page
                .metadata
                .continue_
                .clone()
                .filter(|token| !token.is_empty());
            instances.extend(page.items.iter().map(instance_from_pod));

            match next {
                Some(token) => params = list_params().continue_token(&token),
                None => break,
            }
        }

        debug!("listed {} pods in {pages} page(s)", instances.len());
        Ok(Snapshot::new(instances, Local::now()))
    }
}

impl SessionExecutor for KubeGateway {
    async fn open_session(
        &self,
        target: &Instance,
        request: &ExecRequest,
    ) -> Result<RemoteSession> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), &target.namespace);
        let params = attach_params(request);

        let mut attached = pods
            .exec(&target.name, request.command.clone(), &params)
            .await
            .with_context(|| {
                format!(
                    "exec upgrade failed for {} (command {:?})",
                    target.qualified_name(),
                    request.command
                )
            })?;

        let stdin = attached
            .stdin()
            .map(|writer| Box::new(writer) as ByteWriter);
        let stdout = attached
            .stdout()
            .map(|reader| Box::new(reader) as ByteReader);
        let stderr = attached
            .stderr()
            .map(|reader| Box::new(reader) as ByteReader);
        let resize = if request.tty {
            attached.terminal_size()
        } else {
            None
        };
        let status = attached.take_status();

        let completion = async move {
            let status = match status {
                Some(status) => status.await,
                None => None,
            };
            let transport_error = attached.join().await.err().map(|error| error.to_string());
            RemoteCompletion {
                status,
                transport_error,
            }
        }
        .boxed();

        Ok(RemoteSession {
            stdin,
            stdout,
            stderr,
            resize,
            completion,
        })
    }
}

/// stdin and stdout always; stderr only without a tty, where it is not merged
/// into the terminal stream.
fn attach_params(request: &ExecRequest) -> AttachParams {
    let params = AttachParams::default()
        .stdin(true)
        .stdout(true)
        .stderr(!request.tty)
        .tty(request.tty);
    match &request.container {
        Some(container) => params.container(container.clone()),
        None => params,
    }
}

fn instance_from_pod(pod: &Pod) -> Instance {
    let containers = pod
        .spec
        .as_ref()
        .map(|spec| {
            spec.containers
                .iter()
                .map(|container| container.name.clone())
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();
    let phase = Phase::from_pod_phase(
        pod.status
            .as_ref()
            .and_then(|status| status.phase.as_deref()),
    );
    let node = pod
        .spec
        .as_ref()
        .and_then(|spec| spec.node_name.clone())
        .unwrap_or_else(|| "-".to_string());

    Instance {
        containers,
        node,
        age: human_age(pod.metadata.creation_timestamp.as_ref()),
        ..Instance::new(pod.name_any(), pod.namespace().unwrap_or_default()).with_phase(phase)
    }
}

fn list_params() -> ListParams {
    ListParams::default().limit(LIST_PAGE_SIZE)
}

fn human_age(timestamp: Option<&Time>) -> String {
    let Some(timestamp) = timestamp else {
        return "-".to_string();
    };

    let elapsed_seconds =
        (k8s_openapi::jiff::Timestamp::now().as_second() - timestamp.0.as_second()).max(0);
    format_elapsed_seconds(elapsed_seconds)
}

fn format_elapsed_seconds(seconds: i64) -> String {
    if seconds >= 86_400 {
        return format!("{}d", seconds / 86_400);
    }

    if seconds >= 3_600 {
        return format!("{}h", seconds / 3_600);
    }

    if seconds >= 60 {
        return format!("{}m", seconds / 60);
    }

    format!("{seconds}s")
}

#[cfg(test)]
mod tests {
    use super::{
        InventoryClient, KubeGateway, attach_params, format_elapsed_seconds, instance_from_pod,
    };
    use crate::model::Phase;
    use crate::session::ExecRequest;
    use http::{Request, Response};
    use k8s_openapi::api::core::v1::Pod;
    use kube::Client;
    use kube::client::Body;
    use serde_json::{Value, json};

    type ApiHandle = tower_test::mock::Handle<Request<Body>, Response<Body>>;

    fn mocked_gateway(namespace: Option<&str>) -> (KubeGateway, ApiHandle) {
        let (service, handle) = tower_test::mock::pair::<Request<Body>, Response<Body>>();
        let client = Client::new(service, "default");
        let gateway = KubeGateway::from_client(
            client,
            "test".to_string(),
            "https://127.0.0.1:6443".to_string(),
            namespace,
        );
        (gateway, handle)
    }

    fn pod_list(names: &[(&str, &str)], continue_token: &str) -> Value {
        let items = names
            .iter()
            .map(|(namespace, name)| {
                json!({
                    "metadata": { "name": name, "namespace": namespace },
                    "spec": { "containers": [{ "name": "app" }] },
                    "status": { "phase": "Running" }
                })
            })
            .collect::<Vec<_>>();
        json!({
            "apiVersion": "v1",
            "kind": "PodList",
            "metadata": { "resourceVersion": "100", "continue": continue_token },
            "items": items
        })
    }

    async fn answer(handle: &mut ApiHandle, page: Value) -> Request<Body> {
        let (request, send) = handle
            .next_request()
            .await
            .expect("pod list request expected");
        let body = serde_json::to_vec(&page).expect("page should serialize");
        send.send_response(Response::builder().body(Body::from(body)).unwrap());
        request
    }

    fn pod_fixture() -> Pod {
        serde_json::from_value(json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {
                "name": "web-1",
                "namespace": "prod",
                "creationTimestamp": "2024-01-01T00:00:00Z"
            },
            "spec": {
                "nodeName": "node-a",
                "containers": [
                    { "name": "app", "image": "nginx:1.27" },
                    { "name": "sidecar", "image": "envoy:1.30" }
                ]
            },
            "status": { "phase": "Running" }
        }))
        .expect("pod fixture should deserialize")
    }

    #[test]
    fn pod_converts_to_instance() {
        let instance = instance_from_pod(&pod_fixture());
        assert_eq!(instance.name, "web-1");
        assert_eq!(instance.namespace, "prod");
        assert_eq!(instance.phase, Phase::Running);
        assert_eq!(instance.containers, vec!["app", "sidecar"]);
        assert_eq!(instance.node, "node-a");
        assert!(instance.age.ends_with('d'));
    }

    #[test]
    fn pod_without_status_is_unknown() {
        let pod: Pod = serde_json::from_value(json!({
            "metadata": { "name": "pending-0", "namespace": "dev" }
        }))
        .expect("pod fixture should deserialize");
        let instance = instance_from_pod(&pod);
        assert_eq!(instance.phase, Phase::Unknown);
        assert!(instance.containers.is_empty());
        assert_eq!(instance.node, "-");
        assert_eq!(instance.age, "-");
    }

    #[test]
    fn tty_sessions_leave_stderr_to_the_terminal() {
        let request = ExecRequest::shell("web-1", "/bin/sh", None, None, true);
        let params = attach_params(&request);
        assert!(params.stdin);
        assert!(params.stdout);
        assert!(!params.stderr);
        assert!(params.tty);
        assert_eq!(params.container, None);
    }

    #[test]
    fn non_tty_sessions_attach_stderr_and_container() {
        let request =
            ExecRequest::shell("web-1", "/bin/sh", None, Some("app".to_string()), false);
        let params = attach_params(&request);
        assert!(params.stderr);
        assert!(!params.tty);
        assert_eq!(params.container.as_deref(), Some("app"));
    }

    #[tokio::test]
    async fn listing_follows_continue_tokens_in_order() {
        let (gateway, mut handle) = mocked_gateway(None);
        let server = tokio::spawn(async move {
            let first = answer(
                &mut handle,
                pod_list(&[("prod", "web-1"), ("prod", "api-0")], "page-2"),
            )
            .await;
            let second = answer(&mut handle, pod_list(&[("staging", "web-2")], "")).await;
            (first.uri().clone(), second.uri().clone())
        });

        let snapshot = gateway.list_instances().await.unwrap();
        let (first, second) = server.await.unwrap();

        let names = snapshot
            .instances()
            .iter()
            .map(|instance| instance.qualified_name())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["prod/web-1", "prod/api-0", "staging/web-2"]);

        assert_eq!(first.path(), "/api/v1/pods");
        let first_query = first.query().unwrap_or_default();
        assert!(first_query.contains("limit=500"), "{first_query}");
        assert!(!first_query.contains("continue="), "{first_query}");
        let second_query = second.query().unwrap_or_default();
        assert!(second_query.contains("continue=page-2"), "{second_query}");
    }

    #[tokio::test]
    async fn namespace_scope_lists_one_namespace() {
        let (gateway, mut handle) = mocked_gateway(Some("payments"));
        let server = tokio::spawn(async move {
            let request = answer(&mut handle, pod_list(&[("payments", "db-0")], "")).await;
            request.uri().path().to_string()
        });

        let snapshot = gateway.list_instances().await.unwrap();

        assert_eq!(server.await.unwrap(), "/api/v1/namespaces/payments/pods");
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.instances()[0].phase, Phase::Running);
    }

    #[test]
    fn elapsed_seconds_format_like_kubectl() {
        assert_eq!(format_elapsed_seconds(42), "42s");
        assert_eq!(format_elapsed_seconds(3 * 60), "3m");
        assert_eq!(format_elapsed_seconds(5 * 3_600), "5h");
        assert_eq!(format_elapsed_seconds(2 * 86_400), "2d");
    }
}
