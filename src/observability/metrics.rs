//! Prometheus metrics.

use crate::config::{MetricsPushGatewaySettings, MetricsSettings};
use crate::{Error, Result};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle, PrometheusRecorder};
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::thread;
use std::time::Duration;

/// Default listener port.
pub const DEFAULT_METRICS_PORT: u16 = 9090;

/// Push gateway configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushGatewayConfig {
    /// Push gateway endpoint URI.
    pub endpoint: String,
    /// Optional username for basic auth.
    pub username: Option<String>,
    /// Optional password for basic auth.
    pub password: Option<String>,
    /// Whether to use HTTP POST instead of PUT.
    pub use_http_post: bool,
}

/// Metrics configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsConfig {
    /// Whether metrics are enabled.
    pub enabled: bool,
    /// Address to bind the metrics exporter.
    pub listen_addr: SocketAddr,
    /// Optional push gateway configuration.
    pub push_gateway: Option<PushGatewayConfig>,
}

impl MetricsConfig {
    /// Builds metrics configuration from config settings with env overrides.
    #[must_use]
    pub fn from_settings(settings: Option<&MetricsSettings>) -> Self {
        let mut config = Self::from_file_settings(settings);

        if let Some(enabled) = parse_bool_env("JNEXT_METRICS_ENABLED") {
            config.enabled = enabled;
        }
        if let Some(port) = parse_port_env("JNEXT_METRICS_PORT") {
            config.listen_addr = listen_addr(port);
        }
        if let Some(endpoint) = parse_string_env("JNEXT_METRICS_PUSH_GATEWAY_ENDPOINT") {
            let gateway = config.push_gateway.get_or_insert_with(|| PushGatewayConfig {
                endpoint: String::new(),
                username: None,
                password: None,
                use_http_post: true,
            });
            gateway.endpoint = endpoint;
        }

        config
    }

    /// Builds metrics configuration from config settings alone.
    #[must_use]
    pub fn from_file_settings(settings: Option<&MetricsSettings>) -> Self {
        Self {
            enabled: settings.and_then(|s| s.enabled).unwrap_or(false),
            listen_addr: listen_addr(
                settings
                    .and_then(|s| s.port)
                    .unwrap_or(DEFAULT_METRICS_PORT),
            ),
            push_gateway: settings
                .and_then(|s| s.push_gateway.as_ref())
                .and_then(parse_push_gateway_settings),
        }
    }
}

const fn listen_addr(port: u16) -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port)
}

/// Metrics handle for flushing on shutdown.
#[derive(Debug)]
pub struct MetricsHandle {
    prometheus: PrometheusHandle,
    push_gateway: Option<PushGatewayConfig>,
}

impl MetricsHandle {
    /// Renders the current metrics in the Prometheus text format.
    #[must_use]
    pub fn render(&self) -> String {
        self.prometheus.render()
    }
}

/// Installs the Prometheus recorder, and the HTTP listener when `expose` is
/// set.
///
/// Returns `None` when metrics are disabled.
///
/// # Errors
///
/// Returns an error if a recorder is already installed or the listener
/// cannot start.
pub fn install_prometheus(config: &MetricsConfig, expose: bool) -> Result<Option<MetricsHandle>> {
    if !config.enabled {
        return Ok(None);
    }

    let builder = PrometheusBuilder::new();
    let prometheus = if expose {
        install_listener(builder.with_http_listener(config.listen_addr))?
    } else {
        let recorder = builder.build_recorder();
        let handle = recorder.handle();
        set_global_recorder(recorder)?;
        handle
    };

    tracing::debug!(expose, listen_addr = %config.listen_addr, "Installed Prometheus recorder");
    Ok(Some(MetricsHandle {
        prometheus,
        push_gateway: config.push_gateway.clone(),
    }))
}

/// Pushes metrics to the push gateway if one is configured.
pub fn flush(handle: &MetricsHandle) {
    let Some(push_gateway) = &handle.push_gateway else {
        tracing::debug!("No push gateway configured, skipping flush");
        return;
    };

    let mut payload = handle.prometheus.render();
    if !payload.ends_with('\n') {
        payload.push('\n');
    }

    let client = Client::new();
    let request = if push_gateway.use_http_post {
        client.post(&push_gateway.endpoint)
    } else {
        client.put(&push_gateway.endpoint)
    };
    let request = match &push_gateway.username {
        Some(username) => request.basic_auth(username, push_gateway.password.as_deref()),
        None => request,
    };

    match request
        .header(CONTENT_TYPE, "text/plain; version=0.0.4")
        .timeout(Duration::from_secs(5))
        .body(payload)
        .send()
    {
        Ok(resp) if resp.status().is_success() => {
            tracing::debug!(status = %resp.status(), "Metrics pushed");
        },
        Ok(resp) => tracing::warn!(status = %resp.status(), "Metrics push failed"),
        Err(e) => tracing::warn!(error = %e, "Failed to push metrics"),
    }
}

fn install_listener(builder: PrometheusBuilder) -> Result<PrometheusHandle> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| Error::OperationFailed {
            operation: "metrics_runtime_init".to_string(),
            cause: e.to_string(),
        })?;

    let (recorder, exporter) = {
        let _guard = runtime.enter();
        builder.build().map_err(|e| Error::OperationFailed {
            operation: "metrics_exporter_build".to_string(),
            cause: e.to_string(),
        })?
    };
    let handle = recorder.handle();
    set_global_recorder(recorder)?;

    thread::Builder::new()
        .name("metrics-exporter-prometheus-http".to_string())
        .spawn(move || {
            if let Err(e) = runtime.block_on(exporter) {
                tracing::warn!(error = ?e, "Metrics listener stopped");
            }
        })
        .map_err(|e| Error::OperationFailed {
            operation: "metrics_runtime_thread".to_string(),
            cause: e.to_string(),
        })?;
    Ok(handle)
}

fn set_global_recorder(recorder: PrometheusRecorder) -> Result<()> {
    metrics::set_global_recorder(recorder).map_err(|e| Error::OperationFailed {
        operation: "metrics_recorder_install".to_string(),
        cause: e.to_string(),
    })
}

fn parse_bool_env(key: &str) -> Option<bool> {
    std::env::var(key).ok().map(|value| {
        let value = value.to_lowercase();
        value == "true" || value == "1" || value == "yes"
    })
}

fn parse_port_env(key: &str) -> Option<u16> {
    std::env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<u16>().ok())
}

fn parse_string_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn non_blank(value: Option<&String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_push_gateway_settings(settings: &MetricsPushGatewaySettings) -> Option<PushGatewayConfig> {
    Some(PushGatewayConfig {
        endpoint: non_blank(settings.endpoint.as_ref())?,
        username: non_blank(settings.username.as_ref()),
        password: non_blank(settings.password.as_ref()),
        // POST accumulates; PUT would replace the group on every run.
        use_http_post: settings.use_http_post.unwrap_or(true),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_by_default() {
        let config = MetricsConfig::from_file_settings(None);
        assert!(!config.enabled);
        assert_eq!(config.listen_addr.port(), DEFAULT_METRICS_PORT);
        assert!(config.push_gateway.is_none());
        assert!(install_prometheus(&config, false).unwrap().is_none());
    }

    #[test]
    fn test_push_gateway_requires_endpoint() {
        let blank = MetricsSettings {
            enabled: Some(true),
            port: Some(9100),
            push_gateway: Some(MetricsPushGatewaySettings {
                endpoint: Some("  ".to_string()),
                ..MetricsPushGatewaySettings::default()
            }),
        };
        let config = MetricsConfig::from_file_settings(Some(&blank));
        assert!(config.enabled);
        assert_eq!(config.listen_addr.port(), 9100);
        assert!(config.push_gateway.is_none());

        let set = MetricsSettings {
            push_gateway: Some(MetricsPushGatewaySettings {
                endpoint: Some("http://push:9091/metrics/job/jnext".to_string()),
                username: Some("ops".to_string()),
                ..MetricsPushGatewaySettings::default()
            }),
            ..MetricsSettings::default()
        };
        let gateway = MetricsConfig::from_file_settings(Some(&set))
            .push_gateway
            .unwrap();
        assert!(gateway.use_http_post);
        assert_eq!(gateway.username.as_deref(), Some("ops"));
        assert!(gateway.password.is_none());
    }

    #[test]
    fn test_metrics_registry_smoke() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        metrics::with_local_recorder(&recorder, || {
            metrics::counter!("capture_total", "outcome" => "captured").increment(1);
        });
        assert!(handle.render().contains("capture_total"));
    }
}
