//! 설정 관리 — bloomgate.toml 파싱 및 런타임 설정
//!
//! [`BloomgateConfig`]는 브리지 전체의 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`BLOOMGATE_BUS_ENDPOINT=host:port` 형식)
//! 3. 설정 파일 (`bloomgate.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! 설정 검증은 태스크가 하나라도 스폰되기 전에 수행되며, 실패 시
//! 프로세스는 설명 메시지와 함께 비정상 종료합니다.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{BloomgateError, ConfigError};

/// Bloomgate 통합 설정
///
/// `bloomgate.toml` 파일의 최상위 구조를 나타냅니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BloomgateConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 버스(업스트림) 설정
    #[serde(default)]
    pub bus: BusConfig,
    /// 싱크(다운스트림) 설정
    #[serde(default)]
    pub sink: SinkConfig,
    /// 수퍼바이저(재시작 정책) 설정
    #[serde(default)]
    pub supervisor: SupervisorConfig,
    /// 메트릭 엔드포인트 설정
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl BloomgateConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, BloomgateError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, BloomgateError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                BloomgateError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                BloomgateError::Io(e)
            }
        })?;
        Self::parse(&content)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, BloomgateError> {
        toml::from_str(toml_str).map_err(|e| {
            BloomgateError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `BLOOMGATE_{SECTION}_{FIELD}`
    /// 예: `BLOOMGATE_BUS_ENDPOINT=threatbus:13370`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "BLOOMGATE_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "BLOOMGATE_GENERAL_LOG_FORMAT");

        // Bus
        override_string(&mut self.bus.endpoint, "BLOOMGATE_BUS_ENDPOINT");
        override_string(&mut self.bus.topic, "BLOOMGATE_BUS_TOPIC");
        override_u32(&mut self.bus.snapshot, "BLOOMGATE_BUS_SNAPSHOT");
        override_u64(
            &mut self.bus.request_timeout_secs,
            "BLOOMGATE_BUS_REQUEST_TIMEOUT_SECS",
        );
        override_u64(
            &mut self.bus.heartbeat_interval_secs,
            "BLOOMGATE_BUS_HEARTBEAT_INTERVAL_SECS",
        );

        // Sink
        override_string(&mut self.sink.addr, "BLOOMGATE_SINK_ADDR");
        override_u64(
            &mut self.sink.connect_timeout_secs,
            "BLOOMGATE_SINK_CONNECT_TIMEOUT_SECS",
        );
        override_u32(
            &mut self.sink.max_add_attempts,
            "BLOOMGATE_SINK_MAX_ADD_ATTEMPTS",
        );
        override_u64(&mut self.sink.retry_delay_ms, "BLOOMGATE_SINK_RETRY_DELAY_MS");
        override_csv(&mut self.sink.allowed_paths, "BLOOMGATE_SINK_ALLOWED_PATHS");

        // Supervisor
        override_u32(
            &mut self.supervisor.max_restarts,
            "BLOOMGATE_SUPERVISOR_MAX_RESTARTS",
        );
        override_u64(
            &mut self.supervisor.restart_delay_secs,
            "BLOOMGATE_SUPERVISOR_RESTART_DELAY_SECS",
        );

        // Metrics
        override_bool(&mut self.metrics.enabled, "BLOOMGATE_METRICS_ENABLED");
        override_string(&mut self.metrics.listen_addr, "BLOOMGATE_METRICS_LISTEN_ADDR");
        override_u16(&mut self.metrics.port, "BLOOMGATE_METRICS_PORT");
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), BloomgateError> {
        // log_level 검증
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_level".to_owned(),
                reason: format!("must be one of: {}", valid_levels.join(", ")),
            }
            .into());
        }

        // log_format 검증
        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_format".to_owned(),
                reason: format!("must be one of: {}", valid_formats.join(", ")),
            }
            .into());
        }

        // 버스 관리 엔드포인트는 host:port 형태여야 함
        if !is_host_port(&self.bus.endpoint) {
            return Err(ConfigError::InvalidValue {
                field: "bus.endpoint".to_owned(),
                reason: "expected host:port".to_owned(),
            }
            .into());
        }

        if self.bus.topic.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "bus.topic".to_owned(),
                reason: "topic must not be empty".to_owned(),
            }
            .into());
        }

        if self.bus.request_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "bus.request_timeout_secs".to_owned(),
                reason: "must be greater than 0".to_owned(),
            }
            .into());
        }

        if self.bus.heartbeat_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "bus.heartbeat_interval_secs".to_owned(),
                reason: "must be greater than 0".to_owned(),
            }
            .into());
        }

        if !is_host_port(&self.sink.addr) {
            return Err(ConfigError::InvalidValue {
                field: "sink.addr".to_owned(),
                reason: "expected host:port".to_owned(),
            }
            .into());
        }

        if self.sink.connect_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "sink.connect_timeout_secs".to_owned(),
                reason: "must be greater than 0".to_owned(),
            }
            .into());
        }

        // 허용 경로가 비면 모든 인디케이터가 거부되므로 설정 오류로 취급
        if self.sink.allowed_paths.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "sink.allowed_paths".to_owned(),
                reason: "at least one object path must be allow-listed".to_owned(),
            }
            .into());
        }

        Ok(())
    }
}

/// `host:port` 형태인지 확인합니다. 호스트명은 검증하지 않습니다.
fn is_host_port(s: &str) -> bool {
    match s.rsplit_once(':') {
        Some((host, port)) => !host.is_empty() && port.parse::<u16>().is_ok(),
        None => false,
    }
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
        }
    }
}

/// 버스(업스트림) 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// 관리 엔드포인트 (host:port)
    pub endpoint: String,
    /// 구독 요청 토픽
    pub topic: String,
    /// 과거 인디케이터 스냅샷 요청 범위 (일)
    pub snapshot: u32,
    /// 관리 요청 타임아웃 (초)
    pub request_timeout_secs: u64,
    /// 하트비트 주기 (초)
    pub heartbeat_interval_secs: u64,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            endpoint: "localhost:13370".to_owned(),
            topic: "stix2/indicator".to_owned(),
            snapshot: 30,
            request_timeout_secs: 5,
            heartbeat_interval_secs: 5,
        }
    }
}

/// 싱크(다운스트림) 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    /// 싱크 RPC 주소 (host:port)
    pub addr: String,
    /// 연결 타임아웃 (초)
    pub connect_timeout_secs: u64,
    /// 아이템당 최대 add 시도 횟수 (0 = 무제한)
    ///
    /// 수립된 연결에서 실패한 add 호출만 세는 한도입니다. 연결 수립
    /// 실패는 이 한도와 무관하게 취소될 때까지 계속 재시도하므로,
    /// 싱크가 완전히 죽어 있는 동안에는 아이템이 버려지지 않습니다.
    pub max_add_attempts: u32,
    /// 재시도 전 대기 시간 (밀리초)
    pub retry_delay_ms: u64,
    /// 허용된 객체 경로 목록
    pub allowed_paths: Vec<String>,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:5570".to_owned(),
            connect_timeout_secs: 5,
            max_add_attempts: 0,
            retry_delay_ms: 100,
            allowed_paths: vec!["file:hashes.MD5".to_owned()],
        }
    }
}

/// 수퍼바이저(재시작 정책) 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// 최대 에포크 재시작 횟수 (0 = 무제한)
    pub max_restarts: u32,
    /// 재시작 전 대기 시간 (초)
    pub restart_delay_secs: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            max_restarts: 0,
            restart_delay_secs: 1,
        }
    }
}

/// 메트릭 엔드포인트 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// 수신 주소
    pub listen_addr: String,
    /// 수신 포트
    pub port: u16,
    /// 스크레이프 경로
    pub endpoint: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "127.0.0.1".to_owned(),
            port: 9186,
            endpoint: "/metrics".to_owned(),
        }
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_u16(target: &mut u16, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u16>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u16 from env var, ignoring"
            ),
        }
    }
}

fn override_u32(target: &mut u32, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u32>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u32 from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}

fn override_csv(target: &mut Vec<String>, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val.split(',').map(|s| s.trim().to_owned()).collect();
    }
}
