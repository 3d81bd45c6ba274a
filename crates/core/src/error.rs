//! 에러 타입 — 도메인별 에러 정의
//!
//! 설정, 핸드셰이크, 싱크 전송, 검증의 네 분류를 각각 enum으로
//! 표현합니다. 메시지 단위 에러는 로깅 후 드롭, 연결 단위
//! 에러는 재연결, 리스 단위 에러는 에포크 재시작으로 이어집니다.

/// Bloomgate 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum BloomgateError {
    /// 설정 관련 에러 (시작 전에만 발생, 치명적)
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 버스 관리 프로토콜 핸드셰이크 에러
    #[error("handshake error: {0}")]
    Handshake(#[from] HandshakeError),

    /// 싱크 원격 호출 에러
    #[error("sink error: {0}")]
    Sink(#[from] SinkError),

    /// 인디케이터 검증 에러 (아이템 단위, 영구 거부)
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 버스 관리 엔드포인트와의 요청/응답 에러
///
/// subscribe/unsubscribe/heartbeat 요청에서 발생합니다.
/// subscribe 실패는 해당 에포크의 시작을 중단시키고,
/// heartbeat 실패는 에포크 재시작을 유발합니다.
#[derive(Debug, thiserror::Error)]
pub enum HandshakeError {
    /// 응답 대기 시간 초과
    #[error("no reply from {endpoint} within {timeout_secs}s")]
    Timeout { endpoint: String, timeout_secs: u64 },

    /// 피어가 요청을 거부함 (status != "success")
    #[error("bus rejected '{action}' request: status={status}")]
    Rejected { action: String, status: String },

    /// 응답이 예상한 매핑 형태가 아니거나 필수 필드 누락
    #[error("malformed reply from bus: {reason}")]
    MalformedReply { reason: String },

    /// 연결 수립/송수신 실패
    #[error("management transport error ({endpoint}): {reason}")]
    Transport { endpoint: String, reason: String },

    /// 엔드포인트 문자열이 host:port 형태가 아님
    #[error("invalid endpoint '{endpoint}': expected host:port")]
    InvalidEndpoint { endpoint: String },
}

/// 싱크 원격 호출 에러
///
/// 모든 변종은 연결 단위 에러로 취급됩니다. 호출자는 다음 시도 전에
/// 반드시 새 연결을 수립해야 합니다.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// 연결 수립 실패
    #[error("failed to connect to sink {addr}: {reason}")]
    Connect { addr: String, reason: String },

    /// 원격 호출 송수신 실패 (연결 무효화)
    #[error("sink rpc failed: {reason}")]
    Rpc { reason: String },

    /// 응답 디코딩 실패 (연결 무효화)
    #[error("malformed sink reply: {reason}")]
    MalformedReply { reason: String },
}

/// 인디케이터 검증 에러 — 아이템 단위 영구 거부 사유
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    /// 페이로드 디코딩 실패
    #[error("failed to decode indicator: {reason}")]
    Decode { reason: String },

    /// 제거 플래그가 설정된 인디케이터
    #[error("indicator is revoked")]
    Revoked,

    /// 단일 등호 포인트 패턴이 아님
    #[error("unsupported pattern shape: {pattern}")]
    UnsupportedPattern { pattern: String },

    /// 객체 경로가 허용 목록에 없음
    #[error("object path not allow-listed: {path}")]
    DisallowedPath { path: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handshake_timeout_display() {
        let err = HandshakeError::Timeout {
            endpoint: "localhost:13370".to_owned(),
            timeout_secs: 5,
        };
        let msg = err.to_string();
        assert!(msg.contains("localhost:13370"));
        assert!(msg.contains("5s"));
    }

    #[test]
    fn handshake_rejected_display() {
        let err = HandshakeError::Rejected {
            action: "heartbeat".to_owned(),
            status: "failure".to_owned(),
        };
        assert!(err.to_string().contains("heartbeat"));
        assert!(err.to_string().contains("failure"));
    }

    #[test]
    fn validation_disallowed_path_display() {
        let err = ValidationError::DisallowedPath {
            path: "file:hashes.SHA256".to_owned(),
        };
        assert!(err.to_string().contains("file:hashes.SHA256"));
    }

    #[test]
    fn sink_error_converts_to_bloomgate_error() {
        let err: BloomgateError = SinkError::Rpc {
            reason: "broken pipe".to_owned(),
        }
        .into();
        assert!(matches!(err, BloomgateError::Sink(_)));
        assert!(err.to_string().contains("broken pipe"));
    }

    #[test]
    fn config_error_converts_to_bloomgate_error() {
        let err: BloomgateError = ConfigError::InvalidValue {
            field: "bus.endpoint".to_owned(),
            reason: "expected host:port".to_owned(),
        }
        .into();
        assert!(matches!(err, BloomgateError::Config(_)));
        assert!(err.to_string().contains("bus.endpoint"));
    }
}
