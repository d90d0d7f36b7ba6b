//! 可观测性模块
//!
//! 提供流水线指标、结构化日志和健康检查。

use axum::{Json, Router, extract::State, response::IntoResponse, routing::get};

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::config::LoggingConfig;

// ===== Pipeline Metrics =====

/// 单轮处理的统计，写入 `pipeline_turn_metrics` 日志事件
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct TurnStats {
    pub candidates: usize,
    pub nodes_created: usize,
    pub merges: usize,
    pub ambiguous: usize,
    pub edges_created: usize,
    pub template_questions: usize,
    pub extraction_ms: u64,
    pub dedup_ms: u64,
    pub graph_write_ms: u64,
    pub question_ms: u64,
    pub total_ms: u64,
}

/// 流水线指标
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    pub turns_total: AtomicU64,
    pub turns_captured: AtomicU64,
    pub extraction_failures: AtomicU64,
    pub graph_write_failures: AtomicU64,
    pub collaborator_errors: AtomicU64,
    pub nodes_created: AtomicU64,
    pub merges_total: AtomicU64,
    pub edges_created: AtomicU64,
    pub template_questions: AtomicU64,
    pub turn_latency_ms_sum: AtomicU64,
}

impl PipelineMetrics {
    /// 记录一轮成功捕获
    pub fn record_captured(&self, stats: &TurnStats) {
        self.turns_total.fetch_add(1, Ordering::Relaxed);
        self.turns_captured.fetch_add(1, Ordering::Relaxed);
        self.nodes_created
            .fetch_add(stats.nodes_created as u64, Ordering::Relaxed);
        self.merges_total
            .fetch_add(stats.merges as u64, Ordering::Relaxed);
        self.edges_created
            .fetch_add(stats.edges_created as u64, Ordering::Relaxed);
        self.template_questions
            .fetch_add(stats.template_questions as u64, Ordering::Relaxed);
        self.turn_latency_ms_sum
            .fetch_add(stats.total_ms, Ordering::Relaxed);
    }

    /// 记录抽取失败
    pub fn record_extraction_failure(&self) {
        self.turns_total.fetch_add(1, Ordering::Relaxed);
        self.extraction_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// 记录图写入失败
    pub fn record_graph_write_failure(&self) {
        self.turns_total.fetch_add(1, Ordering::Relaxed);
        self.graph_write_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// 记录协作方错误（轮次未完成）
    pub fn record_collaborator_error(&self) {
        self.collaborator_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// 生成 Prometheus 格式指标
    pub fn gather(&self) -> String {
        let turns = self.turns_total.load(Ordering::Relaxed);
        let captured = self.turns_captured.load(Ordering::Relaxed);
        format!(
            r#"# HELP pipeline_turns_total Total processed turns
# TYPE pipeline_turns_total counter
pipeline_turns_total {}
# HELP pipeline_turns_captured_total Turns that captured at least one candidate
# TYPE pipeline_turns_captured_total counter
pipeline_turns_captured_total {}
# HELP pipeline_extraction_failures_total Turns with nothing usable extracted
# TYPE pipeline_extraction_failures_total counter
pipeline_extraction_failures_total {}
# HELP pipeline_graph_write_failures_total Turns whose graph write failed after retry
# TYPE pipeline_graph_write_failures_total counter
pipeline_graph_write_failures_total {}
# HELP pipeline_collaborator_errors_total Turns aborted by a collaborator failure
# TYPE pipeline_collaborator_errors_total counter
pipeline_collaborator_errors_total {}
# HELP pipeline_nodes_created_total Nodes created
# TYPE pipeline_nodes_created_total counter
pipeline_nodes_created_total {}
# HELP pipeline_merges_total Candidates merged into existing nodes
# TYPE pipeline_merges_total counter
pipeline_merges_total {}
# HELP pipeline_edges_created_total Edges created
# TYPE pipeline_edges_created_total counter
pipeline_edges_created_total {}
# HELP pipeline_template_questions_total Questions served from templates
# TYPE pipeline_template_questions_total counter
pipeline_template_questions_total {}
# HELP pipeline_turn_duration_seconds Captured turn latency in seconds
# TYPE pipeline_turn_duration_seconds summary
pipeline_turn_duration_seconds_sum {}
pipeline_turn_duration_seconds_count {}
"#,
            turns,
            captured,
            self.extraction_failures.load(Ordering::Relaxed),
            self.graph_write_failures.load(Ordering::Relaxed),
            self.collaborator_errors.load(Ordering::Relaxed),
            self.nodes_created.load(Ordering::Relaxed),
            self.merges_total.load(Ordering::Relaxed),
            self.edges_created.load(Ordering::Relaxed),
            self.template_questions.load(Ordering::Relaxed),
            self.turn_latency_ms_sum.load(Ordering::Relaxed) as f64 / 1000.0,
            captured,
        )
    }
}

// ===== Health Check =====

/// 健康检查状态
#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: String,
    pub timestamp: String,
    pub version: String,
    pub uptime_seconds: f64,
}

/// 可观测性路由状态
#[derive(Debug, Clone)]
pub struct ObservabilityState {
    pub metrics: Arc<PipelineMetrics>,
    pub start_time: DateTime<Utc>,
    pub version: String,
}

impl ObservabilityState {
    pub fn new(metrics: Arc<PipelineMetrics>, version: String) -> Self {
        Self {
            metrics,
            start_time: Utc::now(),
            version,
        }
    }

    /// 获取应用正常运行时间
    pub fn uptime_seconds(&self) -> f64 {
        (Utc::now() - self.start_time).num_seconds() as f64
    }
}

/// 健康状态
pub async fn health_check(State(state): State<Arc<ObservabilityState>>) -> impl IntoResponse {
    Json(HealthStatus {
        status: "healthy".to_string(),
        timestamp: Utc::now().to_rfc3339(),
        version: state.version.clone(),
        uptime_seconds: state.uptime_seconds(),
    })
}

/// 简单存活检查
pub async fn liveness() -> impl IntoResponse {
    "OK"
}

/// Prometheus 指标端点
pub async fn metrics(State(state): State<Arc<ObservabilityState>>) -> impl IntoResponse {
    (axum::http::StatusCode::OK, state.metrics.gather())
}

/// 创建可观测性路由
pub fn create_observability_router(state: Arc<ObservabilityState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/health/live", get(liveness))
        .route("/metrics", get(metrics))
        .with_state(state)
}

// ===== Structured Logging =====

/// 初始化日志
///
/// 级别优先取 `RUST_LOG`，否则用配置；`structured` 时输出 JSON。设置了 `log_dir`
/// 时同时按天滚动写文件，返回的 guard 需要在进程退出前一直持有。
pub fn init_tracing(config: &LoggingConfig) -> Option<WorkerGuard> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},sponge={}", config.level, config.level)));

    let (file_writer, guard) = match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "sponge.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(writer), Some(guard))
        }
        None => (None, None),
    };

    let registry = tracing_subscriber::registry().with(env_filter);
    let result = if config.structured {
        registry
            .with(fmt::layer().json().with_target(true))
            .with(file_writer.map(|w| fmt::layer().json().with_ansi(false).with_writer(w)))
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_target(true).with_line_number(true))
            .with(file_writer.map(|w| fmt::layer().with_ansi(false).with_writer(w)))
            .try_init()
    };

    if let Err(e) = result {
        eprintln!("tracing subscriber already set: {}", e);
    }
    guard
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    #[test]
    fn test_metrics_gather() {
        let metrics = PipelineMetrics::default();
        metrics.record_captured(&TurnStats {
            nodes_created: 2,
            edges_created: 1,
            total_ms: 1500,
            ..Default::default()
        });
        metrics.record_extraction_failure();

        let output = metrics.gather();
        assert!(output.contains("pipeline_turns_total 2"));
        assert!(output.contains("pipeline_turns_captured_total 1"));
        assert!(output.contains("pipeline_nodes_created_total 2"));
        assert!(output.contains("pipeline_turn_duration_seconds_sum 1.5"));
    }

    #[tokio::test]
    async fn test_health_route() {
        let state = Arc::new(ObservabilityState::new(
            Arc::new(PipelineMetrics::default()),
            "0.1.0".into(),
        ));
        let app = create_observability_router(state);

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
