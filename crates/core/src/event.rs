//! 이벤트 타입 — 수신기와 프로세서 사이의 기본 데이터 단위
//!
//! [`RawEvent`]는 데이터 채널에서 막 수신된 임시 메시지이고,
//! [`Indicator`]는 큐에서 꺼낸 페이로드를 디코딩한 결과입니다.
//! [`PathValuePair`]는 포인트 패턴에서 추출한 (경로, 값) 쌍으로,
//! 허용 목록 검사를 통과해야만 싱크로 전달됩니다.

use std::fmt;
use std::time::SystemTime;

use bytes::Bytes;
use serde::Deserialize;

use crate::error::ValidationError;

/// 데이터 채널 토픽의 인디케이터 이벤트 타입 접미사
///
/// 버스는 리스 토픽 뒤에 메시지 타입을 붙여 발행합니다
/// (예: `"abc123/indicator"`). 이 접미사가 아닌 메시지는 수신기에서
/// 조용히 드롭됩니다.
pub const INDICATOR_SUFFIX: &str = "indicator";

/// 데이터 채널에서 수신한 원시 이벤트
///
/// 수신기가 생성하고 즉시 소비됩니다. 큐에 들어가거나 버려질 뿐,
/// 저장되지 않습니다.
#[derive(Debug, Clone)]
pub struct RawEvent {
    /// 메시지 토픽 (리스 토픽 + 타입 접미사)
    pub topic: String,
    /// 페이로드 바이트
    pub payload: Bytes,
    /// 로그 상관용 추적 ID (UUID v4)
    pub trace_id: String,
    /// 수신 시각
    pub received_at: SystemTime,
}

impl RawEvent {
    /// 새 원시 이벤트를 생성합니다.
    pub fn new(topic: impl Into<String>, payload: Bytes) -> Self {
        Self {
            topic: topic.into(),
            payload,
            trace_id: uuid::Uuid::new_v4().to_string(),
            received_at: SystemTime::now(),
        }
    }

    /// 토픽이 인디케이터 이벤트 타입인지 확인합니다.
    pub fn is_indicator(&self) -> bool {
        self.topic.ends_with(INDICATOR_SUFFIX)
    }
}

impl fmt::Display for RawEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RawEvent[{}] topic={} size={}",
            &self.trace_id[..8.min(self.trace_id.len())],
            self.topic,
            self.payload.len(),
        )
    }
}

/// 디코딩된 위협 인디케이터
///
/// 매칭 패턴과 제거 플래그를 담습니다. 처리(성공 또는 영구 거부) 후
/// 소멸됩니다. 알 수 없는 필드는 무시합니다.
#[derive(Debug, Clone, Deserialize)]
pub struct Indicator {
    /// 인디케이터 식별자 (예: `"indicator--<uuid>"`)
    #[serde(default)]
    pub id: Option<String>,
    /// 매칭 패턴 (예: `"[file:hashes.MD5 = 'deadbeef']"`)
    pub pattern: String,
    /// 제거 플래그 — 설정되어 있으면 싱크로 전달하지 않습니다
    #[serde(default)]
    pub revoked: bool,
}

impl Indicator {
    /// JSON 페이로드에서 인디케이터를 디코딩합니다.
    ///
    /// 디코딩 실패는 영구 거부 사유입니다 (재시도 없음).
    pub fn from_json(payload: &[u8]) -> Result<Self, ValidationError> {
        serde_json::from_slice(payload).map_err(|e| ValidationError::Decode {
            reason: e.to_string(),
        })
    }

    /// 로그 출력용 식별자를 반환합니다.
    pub fn display_id(&self) -> &str {
        self.id.as_deref().unwrap_or("<no-id>")
    }
}

/// 포인트 패턴에서 추출한 객체 경로와 값의 쌍
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathValuePair {
    /// 객체 경로 (예: `"file:hashes.MD5"`)
    pub path: String,
    /// 비교 대상 값 (예: `"deadbeef"`)
    pub value: String,
}

impl PathValuePair {
    /// 새 경로-값 쌍을 생성합니다.
    pub fn new(path: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            value: value.into(),
        }
    }
}

impl fmt::Display for PathValuePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}", self.path, self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_event_suffix_check() {
        let ev = RawEvent::new("abc123/indicator", Bytes::from_static(b"{}"));
        assert!(ev.is_indicator());

        let ev = RawEvent::new("abc123/sighting", Bytes::from_static(b"{}"));
        assert!(!ev.is_indicator());
    }

    #[test]
    fn raw_event_has_trace_id() {
        let ev = RawEvent::new("t", Bytes::new());
        // UUID v4 형식 확인: 8-4-4-4-12
        assert_eq!(ev.trace_id.len(), 36);
        assert_eq!(ev.trace_id.chars().filter(|c| *c == '-').count(), 4);
    }

    #[test]
    fn raw_event_display() {
        let ev = RawEvent::new("abc/indicator", Bytes::from_static(b"payload"));
        let s = ev.to_string();
        assert!(s.contains("abc/indicator"));
        assert!(s.contains("size=7"));
    }

    #[test]
    fn indicator_decodes_minimal_json() {
        let ind = Indicator::from_json(br#"{"pattern":"[file:hashes.MD5 = 'd41d8cd9']"}"#)
            .unwrap();
        assert_eq!(ind.pattern, "[file:hashes.MD5 = 'd41d8cd9']");
        assert!(!ind.revoked);
        assert_eq!(ind.display_id(), "<no-id>");
    }

    #[test]
    fn indicator_decodes_full_stix_object() {
        let payload = br#"{
            "type": "indicator",
            "id": "indicator--01234567-89ab-cdef-0123-456789abcdef",
            "pattern": "[file:hashes.MD5 = 'deadbeef']",
            "pattern_type": "stix",
            "revoked": true,
            "valid_from": "2021-05-27T00:00:00Z"
        }"#;
        let ind = Indicator::from_json(payload).unwrap();
        assert!(ind.revoked);
        assert!(ind.display_id().starts_with("indicator--"));
    }

    #[test]
    fn indicator_decode_failure_is_validation_error() {
        let err = Indicator::from_json(b"not json").unwrap_err();
        assert!(matches!(err, ValidationError::Decode { .. }));
    }

    #[test]
    fn indicator_missing_pattern_is_decode_error() {
        let err = Indicator::from_json(br#"{"id":"indicator--x"}"#).unwrap_err();
        assert!(matches!(err, ValidationError::Decode { .. }));
    }

    #[test]
    fn path_value_pair_display() {
        let pair = PathValuePair::new("file:hashes.MD5", "deadbeef");
        assert_eq!(pair.to_string(), "file:hashes.MD5 = deadbeef");
    }

    #[test]
    fn events_are_send_sync() {
        fn assert_send_sync<T: Send + Sync + 'static>() {}
        assert_send_sync::<RawEvent>();
        assert_send_sync::<Indicator>();
        assert_send_sync::<PathValuePair>();
    }
}
