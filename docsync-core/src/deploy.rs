//! # deploy: Helm chart, Compose and Swarm manifests from the Shared Bundle
//!
//! Inputs are the bundle's `deploy` group (scaling, health endpoints, server
//! configuration, fenced examples) and its metadata. Every generated YAML
//! file carries a fixed header whose date is the SOT's `last_updated`, so a
//! rerun against an unchanged SOT writes nothing.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::atomic::{write_if_changed, WriteError, WriteOutcome};
use crate::config::DeployConfig;
use crate::sot_parser::{DeploySpec, SharedBundle};

const DEFAULT_MIN_REPLICAS: u32 = 2;
const DEFAULT_MAX_REPLICAS: u32 = 10;
const DEFAULT_CPU_TARGET: u32 = 70;
const DEFAULT_POSTGRES_MAJOR: &str = "18";
const DEFAULT_LIVENESS: &str = "/health/live";
const DEFAULT_READINESS: &str = "/health/ready";

static CPU_TRIGGER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"CPU\s*>\s*(\d+)").expect("static regex"));
static MAJOR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+)").expect("static regex"));

#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error("failed to serialise {name}: {source}")]
    Yaml {
        name: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error(transparent)]
    Write(#[from] WriteError),
}

/// Replica bounds and CPU target for the API component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScalingPlan {
    pub min_replicas: u32,
    pub max_replicas: u32,
    pub cpu_target: u32,
}

impl ScalingPlan {
    pub fn from_spec(spec: &DeploySpec) -> ScalingPlan {
        let mut plan = ScalingPlan {
            min_replicas: DEFAULT_MIN_REPLICAS,
            max_replicas: DEFAULT_MAX_REPLICAS,
            cpu_target: DEFAULT_CPU_TARGET,
        };
        if let Some(rule) = spec.scaling.iter().find(|r| r.component.contains("API")) {
            plan.min_replicas = rule.min.trim().parse().unwrap_or(DEFAULT_MIN_REPLICAS);
            plan.max_replicas = rule.max.trim().parse().unwrap_or(DEFAULT_MAX_REPLICAS);
            if let Some(cpu) = CPU_TRIGGER_RE
                .captures(&rule.trigger)
                .and_then(|c| c[1].parse().ok())
            {
                plan.cpu_target = cpu;
            }
        }
        plan
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbePaths {
    pub liveness: String,
    pub readiness: String,
}

impl ProbePaths {
    pub fn from_spec(spec: &DeploySpec) -> ProbePaths {
        let find = |needle: &str, default: &str| {
            spec.health_endpoints
                .iter()
                .find(|h| {
                    h.endpoint.to_lowercase().contains(needle)
                        || h.purpose.to_lowercase().contains(needle)
                })
                .map(|h| h.endpoint.trim_matches('`').to_string())
                .unwrap_or_else(|| default.to_string())
        };
        ProbePaths {
            liveness: find("live", DEFAULT_LIVENESS),
            readiness: find("ready", DEFAULT_READINESS),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnvEntry {
    pub name: String,
    pub value: String,
}

/// Server configuration rows that name an environment variable.
pub fn env_entries(spec: &DeploySpec) -> Vec<EnvEntry> {
    spec.server_config
        .iter()
        .map(|s| (s.env.trim_matches('`').trim(), s.default.trim_matches('`').trim()))
        .filter(|(env, _)| !env.is_empty() && *env != "-")
        .map(|(env, default)| EnvEntry {
            name: env.to_string(),
            value: if default == "-" { String::new() } else { default.to_string() },
        })
        .collect()
}

pub fn postgres_major(metadata: &BTreeMap<String, String>) -> String {
    metadata
        .get("postgresql_version")
        .and_then(|v| MAJOR_RE.captures(v))
        .map(|c| c[1].to_string())
        .unwrap_or_else(|| DEFAULT_POSTGRES_MAJOR.to_string())
}

fn header(metadata: &BTreeMap<String, String>) -> String {
    let generated = metadata
        .get("last_updated")
        .map(String::as_str)
        .unwrap_or("unknown");
    format!(
        "# Auto-generated from SOURCE_OF_TRUTH.md\n# Do not edit directly\n# Generated: {generated}\n\n"
    )
}

/// Output locations; both absolute.
#[derive(Debug, Clone)]
pub struct DeployPaths {
    pub charts_dir: PathBuf,
    pub deploy_dir: PathBuf,
}

/// A rendered file waiting to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployFile {
    pub path: PathBuf,
    pub content: String,
}

#[derive(Debug, Default)]
pub struct DeployReport {
    pub outcomes: Vec<(PathBuf, WriteOutcome)>,
}

impl DeployReport {
    pub fn changed(&self) -> usize {
        self.outcomes.iter().filter(|(_, o)| o.is_change()).count()
    }
}

const HELMIGNORE: &str = "# Patterns to ignore when building packages\n.DS_Store\n*.swp\n*.bak\n*.tmp\n*~\n.git\n.gitignore\n.vscode\n";

const HELPERS_TPL: &str = r#"{{/*
Expand the name of the chart.
*/}}
{{- define "__APP__.name" -}}
{{- default .Chart.Name .Values.nameOverride | trunc 63 | trimSuffix "-" }}
{{- end }}

{{/*
Fully qualified app name.
*/}}
{{- define "__APP__.fullname" -}}
{{- if .Values.fullnameOverride }}
{{- .Values.fullnameOverride | trunc 63 | trimSuffix "-" }}
{{- else }}
{{- $name := default .Chart.Name .Values.nameOverride }}
{{- if contains $name .Release.Name }}
{{- .Release.Name | trunc 63 | trimSuffix "-" }}
{{- else }}
{{- printf "%s-%s" .Release.Name $name | trunc 63 | trimSuffix "-" }}
{{- end }}
{{- end }}
{{- end }}

{{/*
Common labels
*/}}
{{- define "__APP__.labels" -}}
helm.sh/chart: {{ printf "%s-%s" .Chart.Name .Chart.Version | replace "+" "_" | trunc 63 | trimSuffix "-" }}
{{ include "__APP__.selectorLabels" . }}
app.kubernetes.io/version: {{ .Chart.AppVersion | quote }}
app.kubernetes.io/managed-by: {{ .Release.Service }}
{{- end }}

{{/*
Selector labels
*/}}
{{- define "__APP__.selectorLabels" -}}
app.kubernetes.io/name: {{ include "__APP__.name" . }}
app.kubernetes.io/instance: {{ .Release.Name }}
{{- end }}
"#;

const DEPLOYMENT_YAML: &str = r#"apiVersion: apps/v1
kind: Deployment
metadata:
  name: {{ include "__APP__.fullname" . }}
  labels:
    {{- include "__APP__.labels" . | nindent 4 }}
spec:
  {{- if not .Values.autoscaling.enabled }}
  replicas: {{ .Values.replicaCount }}
  {{- end }}
  selector:
    matchLabels:
      {{- include "__APP__.selectorLabels" . | nindent 6 }}
  template:
    metadata:
      labels:
        {{- include "__APP__.labels" . | nindent 8 }}
    spec:
      containers:
        - name: {{ .Chart.Name }}
          image: "{{ .Values.image.repository }}:{{ .Values.image.tag | default .Chart.AppVersion }}"
          imagePullPolicy: {{ .Values.image.pullPolicy }}
          ports:
            - name: http
              containerPort: {{ .Values.service.port }}
          env:
            {{- range .Values.env }}
            - name: {{ .name }}
              value: {{ .value | quote }}
            {{- end }}
          livenessProbe:
            {{- toYaml .Values.livenessProbe | nindent 12 }}
          readinessProbe:
            {{- toYaml .Values.readinessProbe | nindent 12 }}
          resources:
            {{- toYaml .Values.resources | nindent 12 }}
"#;

const SERVICE_YAML: &str = r#"apiVersion: v1
kind: Service
metadata:
  name: {{ include "__APP__.fullname" . }}
  labels:
    {{- include "__APP__.labels" . | nindent 4 }}
spec:
  type: {{ .Values.service.type }}
  ports:
    - port: {{ .Values.service.port }}
      targetPort: http
      name: http
  selector:
    {{- include "__APP__.selectorLabels" . | nindent 4 }}
"#;

const HPA_YAML: &str = r#"{{- if .Values.autoscaling.enabled }}
apiVersion: autoscaling/v2
kind: HorizontalPodAutoscaler
metadata:
  name: {{ include "__APP__.fullname" . }}
  labels:
    {{- include "__APP__.labels" . | nindent 4 }}
spec:
  scaleTargetRef:
    apiVersion: apps/v1
    kind: Deployment
    name: {{ include "__APP__.fullname" . }}
  minReplicas: {{ .Values.autoscaling.minReplicas }}
  maxReplicas: {{ .Values.autoscaling.maxReplicas }}
  metrics:
    - type: Resource
      resource:
        name: cpu
        target:
          type: Utilization
          averageUtilization: {{ .Values.autoscaling.targetCPUUtilizationPercentage }}
{{- end }}
"#;

/// Renders deployment files from one bundle and deploy settings.
pub struct DeployGenerator<'a> {
    cfg: &'a DeployConfig,
    bundle: &'a SharedBundle,
}

impl<'a> DeployGenerator<'a> {
    pub fn new(cfg: &'a DeployConfig, bundle: &'a SharedBundle) -> Self {
        DeployGenerator { cfg, bundle }
    }

    fn yaml(&self, name: &str, value: &Value) -> Result<String, DeployError> {
        let body = serde_yaml::to_string(value).map_err(|source| DeployError::Yaml {
            name: name.to_string(),
            source,
        })?;
        Ok(format!("{}{body}", header(&self.bundle.metadata)))
    }

    fn app_version(&self) -> String {
        self.bundle
            .metadata
            .get("app_version")
            .cloned()
            .unwrap_or_else(|| "0.1.0".to_string())
    }

    pub fn chart_yaml(&self) -> Result<String, DeployError> {
        let chart = json!({
            "apiVersion": "v2",
            "name": self.cfg.app_name,
            "type": "application",
            "version": "0.1.0",
            "appVersion": self.app_version(),
        });
        self.yaml("Chart.yaml", &chart)
    }

    pub fn values_yaml(&self) -> Result<String, DeployError> {
        let spec = &self.bundle.deploy;
        let scaling = ScalingPlan::from_spec(spec);
        let probes = ProbePaths::from_spec(spec);
        let values = json!({
            "replicaCount": scaling.min_replicas,
            "image": {
                "repository": self.cfg.image,
                "pullPolicy": "IfNotPresent",
                "tag": "",
            },
            "service": {"type": "ClusterIP", "port": self.cfg.port},
            "resources": {
                "limits": {"memory": "1Gi"},
                "requests": {"cpu": "100m", "memory": "256Mi"},
            },
            "livenessProbe": {
                "httpGet": {"path": probes.liveness, "port": "http"},
                "initialDelaySeconds": 10,
                "periodSeconds": 30,
                "timeoutSeconds": 10,
            },
            "readinessProbe": {
                "httpGet": {"path": probes.readiness, "port": "http"},
                "initialDelaySeconds": 5,
                "periodSeconds": 10,
                "timeoutSeconds": 5,
            },
            "autoscaling": {
                "enabled": true,
                "minReplicas": scaling.min_replicas,
                "maxReplicas": scaling.max_replicas,
                "targetCPUUtilizationPercentage": scaling.cpu_target,
            },
            "env": env_entries(spec),
        });
        self.yaml("values.yaml", &values)
    }

    fn app_service(&self) -> Value {
        let port = self.cfg.port;
        let probes = ProbePaths::from_spec(&self.bundle.deploy);
        json!({
            "image": format!("{}:${{APP_VERSION:-latest}}", self.cfg.image),
            "environment": {
                "DATABASE_HOST": "db",
                "DATABASE_PORT": "5432",
                "CACHE_HOST": "dragonfly",
                "CACHE_PORT": "6379",
            },
            "networks": ["backend"],
            "healthcheck": {
                "test": ["CMD", "wget", "--no-verbose", "--tries=1", "--spider",
                         format!("http://localhost:{port}{}", probes.readiness)],
                "interval": "30s",
                "timeout": "10s",
                "retries": 3,
            },
        })
    }

    pub fn compose_yaml(&self) -> Result<String, DeployError> {
        let pg = postgres_major(&self.bundle.metadata);
        let port = self.cfg.port;
        let mut app = self.app_service();
        if let Some(obj) = app.as_object_mut() {
            obj.insert("ports".into(), json!([format!("{port}:{port}")]));
            obj.insert(
                "depends_on".into(),
                json!({
                    "db": {"condition": "service_healthy"},
                    "dragonfly": {"condition": "service_healthy"},
                }),
            );
            obj.insert("restart".into(), json!("unless-stopped"));
        }
        let compose = json!({
            "services": {
                (self.cfg.app_name.clone()): app,
                "db": {
                    "image": format!("postgres:{pg}-alpine"),
                    "environment": {
                        "POSTGRES_DB": self.cfg.app_name,
                        "POSTGRES_USER": self.cfg.app_name,
                        "POSTGRES_PASSWORD": "${DB_PASSWORD:-dev_password}",
                    },
                    "volumes": ["pgdata:/var/lib/postgresql/data"],
                    "networks": ["backend"],
                    "healthcheck": {
                        "test": ["CMD-SHELL", format!("pg_isready -U {0} -d {0}", self.cfg.app_name)],
                        "interval": "10s",
                        "timeout": "5s",
                        "retries": 5,
                    },
                    "restart": "unless-stopped",
                },
                "dragonfly": {
                    "image": "docker.dragonflydb.io/dragonflydb/dragonfly:latest",
                    "command": "dragonfly --logtostderr",
                    "volumes": ["dfdata:/data"],
                    "networks": ["backend"],
                    "healthcheck": {
                        "test": ["CMD", "redis-cli", "ping"],
                        "interval": "10s",
                        "timeout": "5s",
                        "retries": 5,
                    },
                    "restart": "unless-stopped",
                },
            },
            "volumes": {"pgdata": null, "dfdata": null},
            "networks": {"backend": {"driver": "bridge"}},
        });
        self.yaml("docker-compose.yml", &compose)
    }

    pub fn swarm_yaml(&self) -> Result<String, DeployError> {
        let pg = postgres_major(&self.bundle.metadata);
        let replicas = ScalingPlan::from_spec(&self.bundle.deploy).min_replicas;
        let manager_only = json!({
            "replicas": 1,
            "placement": {"constraints": ["node.role == manager"]},
        });
        let mut app = self.app_service();
        if let Some(obj) = app.as_object_mut() {
            obj.insert(
                "deploy".into(),
                json!({
                    "replicas": replicas,
                    "update_config": {"parallelism": 1, "delay": "10s", "failure_action": "rollback"},
                    "restart_policy": {"condition": "on-failure", "max_attempts": 3},
                }),
            );
            obj.insert("secrets".into(), json!(["db_password"]));
        }
        let swarm = json!({
            "services": {
                (self.cfg.app_name.clone()): app,
                "db": {
                    "image": format!("postgres:{pg}-alpine"),
                    "deploy": manager_only,
                    "environment": {
                        "POSTGRES_DB": self.cfg.app_name,
                        "POSTGRES_USER": self.cfg.app_name,
                        "POSTGRES_PASSWORD_FILE": "/run/secrets/db_password",
                    },
                    "secrets": ["db_password"],
                    "volumes": ["pgdata:/var/lib/postgresql/data"],
                    "networks": ["backend"],
                },
                "dragonfly": {
                    "image": "docker.dragonflydb.io/dragonflydb/dragonfly:latest",
                    "deploy": manager_only,
                    "command": "dragonfly --logtostderr",
                    "volumes": ["dfdata:/data"],
                    "networks": ["backend"],
                },
            },
            "secrets": {"db_password": {"external": true}},
            "volumes": {"pgdata": null, "dfdata": null},
            "networks": {"backend": {"driver": "overlay"}},
        });
        self.yaml("docker-stack.yml", &swarm)
    }

    pub fn readme(&self) -> String {
        let app = &self.cfg.app_name;
        let mut out = format!(
            "# Deployment\n\n\
             > Auto-generated from SOURCE_OF_TRUTH.md. Do not edit directly; run `docsync deploy --apply`.\n\n\
             ## Docker Compose\n\n```bash\ndocker compose -f deploy/docker-compose.yml up -d\n```\n\n\
             ## Docker Swarm\n\n```bash\necho \"your-password\" | docker secret create db_password -\n\
             docker stack deploy -c deploy/docker-stack.yml {app}\n```\n\n\
             ## Kubernetes (Helm)\n\n```bash\nhelm install {app} charts/{app} --namespace {app} --create-namespace\n```\n"
        );
        let spec = &self.bundle.deploy;
        for (title, example) in [
            ("Kubernetes Reference", &spec.kubernetes_example),
            ("Swarm Reference", &spec.swarm_example),
        ] {
            if let Some(text) = example {
                out.push_str(&format!("\n## {title}\n\n```yaml\n{}\n```\n", text.trim_end()));
            }
        }
        out
    }

    /// Every output file under `paths`, in write order.
    pub fn render(&self, paths: &DeployPaths) -> Result<Vec<DeployFile>, DeployError> {
        let chart = paths.charts_dir.join(&self.cfg.app_name);
        let templates = chart.join("templates");
        let app = self.cfg.app_name.as_str();
        let helm = |text: &str| text.replace("__APP__", app);
        let files = vec![
            (chart.join("Chart.yaml"), self.chart_yaml()?),
            (chart.join("values.yaml"), self.values_yaml()?),
            (chart.join(".helmignore"), HELMIGNORE.to_string()),
            (templates.join("_helpers.tpl"), helm(HELPERS_TPL)),
            (templates.join("deployment.yaml"), helm(DEPLOYMENT_YAML)),
            (templates.join("service.yaml"), helm(SERVICE_YAML)),
            (templates.join("hpa.yaml"), helm(HPA_YAML)),
            (paths.deploy_dir.join("docker-compose.yml"), self.compose_yaml()?),
            (paths.deploy_dir.join("docker-stack.yml"), self.swarm_yaml()?),
            (paths.deploy_dir.join("README.md"), self.readme()),
        ];
        Ok(files
            .into_iter()
            .map(|(path, content)| DeployFile { path, content })
            .collect())
    }
}

/// Renders and writes every deployment file; writes only with `apply`.
pub fn generate_deploy(
    cfg: &DeployConfig,
    bundle: &SharedBundle,
    paths: &DeployPaths,
    apply: bool,
) -> Result<DeployReport, DeployError> {
    let files = DeployGenerator::new(cfg, bundle).render(paths)?;
    let mut report = DeployReport::default();
    for file in files {
        let outcome = write_if_changed(&file.path, &file.content, apply)?;
        debug!(path = %file.path.display(), outcome = outcome.as_str(), "[DEPLOY] File");
        report.outcomes.push((file.path, outcome));
    }
    info!(
        files = report.outcomes.len(),
        changed = report.changed(),
        apply,
        "[DEPLOY] Deployment files generated"
    );
    Ok(report)
}
