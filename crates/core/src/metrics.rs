//! 메트릭 상수 및 설명 등록
//!
//! 모든 Prometheus 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 각 모듈은 이 상수를 사용하여 `metrics::counter!()`, `metrics::gauge!()`
//! 매크로를 호출합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `bloomgate_`
//! - 모듈명: `bus_`, `queue_`, `processor_`, `sink_`, `daemon_`
//! - 접미어: `_total` (counter), 없음 (gauge)

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 드롭/거부 사유 레이블 키 (malformed, suffix, revoked, pattern, path, decode)
pub const LABEL_REASON: &str = "reason";

// ─── 버스 수신 메트릭 ──────────────────────────────────────────────

/// Bus: 데이터 채널에서 수신한 전체 메시지 수 (counter)
pub const BUS_MESSAGES_RECEIVED_TOTAL: &str = "bloomgate_bus_messages_received_total";

/// Bus: 드롭된 메시지 수 (counter, label: reason)
pub const BUS_MESSAGES_DROPPED_TOTAL: &str = "bloomgate_bus_messages_dropped_total";

/// Bus: 하트비트 실패 수 (counter)
pub const BUS_HEARTBEAT_FAILURES_TOTAL: &str = "bloomgate_bus_heartbeat_failures_total";

// ─── 큐 메트릭 ─────────────────────────────────────────────────────

/// Queue: 큐에 들어간 인디케이터 페이로드 수 (counter)
pub const QUEUE_ENQUEUED_TOTAL: &str = "bloomgate_queue_enqueued_total";

// ─── 프로세서 메트릭 ────────────────────────────────────────────────

/// Processor: 싱크로 전달 완료된 인디케이터 수 (counter)
pub const PROCESSOR_FORWARDED_TOTAL: &str = "bloomgate_processor_forwarded_total";

/// Processor: 영구 거부된 인디케이터 수 (counter, label: reason)
pub const PROCESSOR_REJECTED_TOTAL: &str = "bloomgate_processor_rejected_total";

// ─── 싱크 메트릭 ────────────────────────────────────────────────────

/// Sink: 재연결 수행 횟수 (counter)
pub const SINK_RECONNECTS_TOTAL: &str = "bloomgate_sink_reconnects_total";

/// Sink: add 호출 실패 횟수 (counter)
pub const SINK_ADD_FAILURES_TOTAL: &str = "bloomgate_sink_add_failures_total";

// ─── Daemon 메트릭 ──────────────────────────────────────────────────

/// Daemon: 시작된 에포크 수 (counter)
pub const DAEMON_EPOCHS_STARTED_TOTAL: &str = "bloomgate_daemon_epochs_started_total";

/// Daemon: 가동 시간 (gauge, 초)
pub const DAEMON_UPTIME_SECONDS: &str = "bloomgate_daemon_uptime_seconds";

/// Daemon: 빌드 정보 (gauge, 항상 1, label: version)
pub const DAEMON_BUILD_INFO: &str = "bloomgate_daemon_build_info";

// ─── 설명 등록 함수 ─────────────────────────────────────────────────

/// 모든 메트릭의 설명(description)을 등록합니다.
///
/// 전역 레코더 설치 후 한 번만 호출해야 합니다.
/// 일반적으로 `bloomgate-daemon`의 시작 시점에서 호출합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge};

    describe_counter!(
        BUS_MESSAGES_RECEIVED_TOTAL,
        "Total number of messages received on the bus data channel"
    );
    describe_counter!(
        BUS_MESSAGES_DROPPED_TOTAL,
        "Total number of data-channel messages dropped (by reason)"
    );
    describe_counter!(
        BUS_HEARTBEAT_FAILURES_TOTAL,
        "Total number of heartbeat failures against the bus management endpoint"
    );
    describe_counter!(
        QUEUE_ENQUEUED_TOTAL,
        "Total number of indicator payloads enqueued for processing"
    );
    describe_counter!(
        PROCESSOR_FORWARDED_TOTAL,
        "Total number of indicators successfully added to the sink"
    );
    describe_counter!(
        PROCESSOR_REJECTED_TOTAL,
        "Total number of indicators permanently rejected (by reason)"
    );
    describe_counter!(
        SINK_RECONNECTS_TOTAL,
        "Total number of sink reconnect attempts"
    );
    describe_counter!(
        SINK_ADD_FAILURES_TOTAL,
        "Total number of failed sink add calls"
    );
    describe_counter!(
        DAEMON_EPOCHS_STARTED_TOTAL,
        "Total number of bridge epochs started (first epoch included)"
    );
    describe_gauge!(DAEMON_UPTIME_SECONDS, "Bloomgate daemon uptime in seconds");
    describe_gauge!(
        DAEMON_BUILD_INFO,
        "Build information (always 1, with version label)"
    );
}
