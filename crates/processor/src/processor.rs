//! 인디케이터 프로세서
//!
//! 큐에서 원시 이벤트를 꺼내 디코딩/검증하고, 통과한 값을 싱크에
//! 추가합니다. 검증 실패는 아이템 단위 영구 거부이고, 싱크 호출
//! 실패는 연결 교체 후 재시도합니다.
//!
//! # 재시도 정책
//!
//! - 싱크 연결 수립은 성공할 때까지 무기한 재시도합니다 (취소 제외).
//! - add 호출 실패는 연결을 버리고 새 연결로 다시 시도합니다.
//!   `max_add_attempts`가 0이면 무제한, 아니면 그 횟수를 넘긴
//!   아이템은 에러 로그와 함께 버립니다.

use std::time::Duration;

use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use bloomgate_core::error::ValidationError;
use bloomgate_core::event::{Indicator, PathValuePair, RawEvent};
use bloomgate_core::metrics::{
    LABEL_REASON, PROCESSOR_FORWARDED_TOTAL, PROCESSOR_REJECTED_TOTAL, SINK_ADD_FAILURES_TOTAL,
    SINK_RECONNECTS_TOTAL,
};
use bloomgate_sink::{SinkClient, SinkConnection};

use crate::pattern::parse_point_pattern;

/// 큐 소비 및 싱크 전달 루프
pub struct IndicatorProcessor {
    rx: UnboundedReceiver<RawEvent>,
    client: SinkClient,
    allowed_paths: Vec<String>,
    max_add_attempts: u32,
    retry_delay: Duration,
    cancel: CancellationToken,
    conn: Option<SinkConnection>,
}

impl IndicatorProcessor {
    pub fn new(
        rx: UnboundedReceiver<RawEvent>,
        client: SinkClient,
        allowed_paths: Vec<String>,
        max_add_attempts: u32,
        retry_delay: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            rx,
            client,
            allowed_paths,
            max_add_attempts,
            retry_delay,
            cancel,
            conn: None,
        }
    }

    /// 처리 루프를 실행합니다. 취소 토큰이 신호될 때까지 반환하지 않습니다.
    ///
    /// 종료 시 큐 수신기를 돌려주므로, 호출자는 남은 아이템을 보존한 채
    /// 새 프로세서를 만들 수 있습니다.
    pub async fn run(mut self) -> UnboundedReceiver<RawEvent> {
        info!(sink = %self.client.addr(), "Indicator processor started");
        loop {
            let event = tokio::select! {
                _ = self.cancel.cancelled() => break,
                event = self.rx.recv() => match event {
                    Some(event) => event,
                    // 송신 측이 모두 닫힘 — 셧다운 경합
                    None => break,
                },
            };
            self.process(event).await;
        }
        info!("Indicator processor stopped");
        self.rx
    }

    /// 이벤트 하나를 검증하고 싱크로 전달합니다.
    async fn process(&mut self, event: RawEvent) {
        let pair = match validate(&event.payload, &self.allowed_paths) {
            Ok(pair) => pair,
            Err(e) => {
                reject(&event, &e);
                return;
            }
        };

        if self.submit(&pair, &event.trace_id).await {
            metrics::counter!(PROCESSOR_FORWARDED_TOTAL).increment(1);
            debug!(trace_id = %event.trace_id, %pair, "Indicator forwarded to sink");
        }
    }

    /// 값을 싱크에 추가합니다. 실패 시 연결을 교체하며 재시도합니다.
    ///
    /// 전달에 성공하면 `true`, 취소되었거나 시도 횟수를 소진했으면
    /// `false`를 반환합니다.
    async fn submit(&mut self, pair: &PathValuePair, trace_id: &str) -> bool {
        let cancel = self.cancel.clone();
        let mut attempts = 0u32;
        loop {
            if cancel.is_cancelled() {
                return false;
            }

            let Some(conn) = self.conn.as_mut() else {
                if !self.reconnect().await {
                    return false;
                }
                continue;
            };

            // 응답 없는 싱크가 셧다운을 막지 않도록 add 대기도 취소 대상
            let result = tokio::select! {
                _ = cancel.cancelled() => return false,
                result = conn.add(&pair.value) => result,
            };
            match result {
                Ok(added) => {
                    debug!(trace_id, added, "Sink accepted value");
                    return true;
                }
                Err(e) => {
                    // 모든 싱크 에러는 연결 단위 — 연결을 버리고 새로 연결
                    self.conn = None;
                    metrics::counter!(SINK_ADD_FAILURES_TOTAL).increment(1);
                    attempts += 1;
                    if self.max_add_attempts != 0 && attempts >= self.max_add_attempts {
                        metrics::counter!(PROCESSOR_REJECTED_TOTAL, LABEL_REASON => "attempts")
                            .increment(1);
                        error!(
                            trace_id,
                            attempts,
                            error = %e,
                            "Giving up on indicator after exhausting add attempts"
                        );
                        return false;
                    }
                    warn!(trace_id, attempts, error = %e, "Sink add failed, will retry");
                    tokio::select! {
                        _ = self.cancel.cancelled() => return false,
                        _ = tokio::time::sleep(self.retry_delay) => {}
                    }
                }
            }
        }
    }

    /// 싱크 연결을 한 번 시도합니다. 실패하면 재시도 지연 후 `true`로
    /// 돌아가 호출자가 다시 시도하게 합니다. 취소되면 `false`입니다.
    async fn reconnect(&mut self) -> bool {
        metrics::counter!(SINK_RECONNECTS_TOTAL).increment(1);
        let result = tokio::select! {
            _ = self.cancel.cancelled() => return false,
            result = self.client.connect() => result,
        };
        match result {
            Ok(conn) => {
                self.conn = Some(conn);
                true
            }
            Err(e) => {
                warn!(sink = %self.client.addr(), error = %e, "Sink connection failed, retrying");
                tokio::select! {
                    _ = self.cancel.cancelled() => false,
                    _ = tokio::time::sleep(self.retry_delay) => true,
                }
            }
        }
    }
}

/// 페이로드 하나를 디코딩하고 전달 가능 여부를 검사합니다.
///
/// 통과하면 싱크에 넣을 (경로, 값) 쌍을 반환합니다.
fn validate(payload: &[u8], allowed_paths: &[String]) -> Result<PathValuePair, ValidationError> {
    let indicator = Indicator::from_json(payload)?;
    if indicator.revoked {
        return Err(ValidationError::Revoked);
    }
    let pair = parse_point_pattern(&indicator.pattern).ok_or_else(|| {
        ValidationError::UnsupportedPattern {
            pattern: indicator.pattern.clone(),
        }
    })?;
    if !allowed_paths.iter().any(|p| p == &pair.path) {
        return Err(ValidationError::DisallowedPath { path: pair.path });
    }
    Ok(pair)
}

/// 영구 거부를 기록합니다. 제거 플래그는 정상 동작이므로 조용히 넘깁니다.
fn reject(event: &RawEvent, error: &ValidationError) {
    let reason = match error {
        ValidationError::Decode { .. } => "decode",
        ValidationError::Revoked => "revoked",
        ValidationError::UnsupportedPattern { .. } => "pattern",
        ValidationError::DisallowedPath { .. } => "path",
    };
    metrics::counter!(PROCESSOR_REJECTED_TOTAL, LABEL_REASON => reason).increment(1);
    match error {
        ValidationError::Revoked => {
            debug!(trace_id = %event.trace_id, "Skipping revoked indicator");
        }
        _ => {
            warn!(trace_id = %event.trace_id, error = %error, "Rejecting indicator");
        }
    }
}
