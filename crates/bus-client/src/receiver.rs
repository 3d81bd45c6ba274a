//! 데이터 채널 수신기
//!
//! 발행 엔드포인트에 구독 스트림을 유지하면서 메시지를 줄 단위로 읽고,
//! 인디케이터 토픽의 페이로드만 큐에 넣습니다. 스트림이 끊기면 잠시
//! 기다렸다가 같은 리스 토픽으로 재연결합니다.

use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use bloomgate_core::event::RawEvent;
use bloomgate_core::metrics::{
    BUS_MESSAGES_DROPPED_TOTAL, BUS_MESSAGES_RECEIVED_TOTAL, LABEL_REASON, QUEUE_ENQUEUED_TOTAL,
};

use crate::transport::SubscribeStream;

/// 재연결 전 대기 시간
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// 데이터 채널 수신 루프
///
/// 취소될 때까지 실행됩니다. 개별 메시지 오류는 루프를 멈추지 않습니다.
pub struct EventReceiver {
    pub_endpoint: String,
    lease_topic: String,
    tx: UnboundedSender<RawEvent>,
    cancel: CancellationToken,
}

impl EventReceiver {
    pub fn new(
        pub_endpoint: impl Into<String>,
        lease_topic: impl Into<String>,
        tx: UnboundedSender<RawEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            pub_endpoint: pub_endpoint.into(),
            lease_topic: lease_topic.into(),
            tx,
            cancel,
        }
    }

    /// 수신 루프를 실행합니다. 취소 토큰이 신호될 때까지 반환하지 않습니다.
    pub async fn run(self) {
        info!(
            pub_endpoint = %self.pub_endpoint,
            lease_topic = %self.lease_topic,
            "Event receiver started"
        );
        loop {
            let mut stream = tokio::select! {
                _ = self.cancel.cancelled() => break,
                result = SubscribeStream::connect(&self.pub_endpoint, &self.lease_topic) => {
                    match result {
                        Ok(stream) => stream,
                        Err(e) => {
                            warn!(
                                pub_endpoint = %self.pub_endpoint,
                                error = %e,
                                "Failed to connect data channel, retrying"
                            );
                            tokio::select! {
                                _ = self.cancel.cancelled() => break,
                                _ = tokio::time::sleep(RECONNECT_DELAY) => continue,
                            }
                        }
                    }
                }
            };
            debug!(pub_endpoint = %self.pub_endpoint, "Data channel connected");

            loop {
                let line = tokio::select! {
                    _ = self.cancel.cancelled() => return self.log_stopped(),
                    result = stream.recv() => match result {
                        Ok(Some(line)) => line,
                        Ok(None) => {
                            warn!(pub_endpoint = %self.pub_endpoint, "Data channel closed by peer");
                            break;
                        }
                        Err(e) => {
                            warn!(pub_endpoint = %self.pub_endpoint, error = %e, "Data channel read error");
                            break;
                        }
                    }
                };
                self.handle_line(&line);
            }

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(RECONNECT_DELAY) => {}
            }
        }
        self.log_stopped();
    }

    /// 메시지 한 줄을 분해하여 인디케이터 페이로드면 큐에 넣습니다.
    ///
    /// 잘못된 인코딩이나 구분자 누락은 해당 메시지만 버립니다.
    fn handle_line(&self, line: &[u8]) {
        metrics::counter!(BUS_MESSAGES_RECEIVED_TOTAL).increment(1);

        let Ok(text) = std::str::from_utf8(line) else {
            metrics::counter!(BUS_MESSAGES_DROPPED_TOTAL, LABEL_REASON => "malformed").increment(1);
            error!(line_len = line.len(), "Dropping bus message with invalid encoding");
            return;
        };
        let Some((topic, payload)) = text.split_once(' ') else {
            metrics::counter!(BUS_MESSAGES_DROPPED_TOTAL, LABEL_REASON => "malformed").increment(1);
            warn!(line_len = line.len(), "Dropping malformed bus message without topic separator");
            return;
        };

        let event = RawEvent::new(topic, Bytes::copy_from_slice(payload.as_bytes()));
        if !event.is_indicator() {
            metrics::counter!(BUS_MESSAGES_DROPPED_TOTAL, LABEL_REASON => "suffix").increment(1);
            debug!(topic, "Ignoring message on non-indicator topic");
            return;
        }

        metrics::counter!(QUEUE_ENQUEUED_TOTAL).increment(1);
        debug!(topic, trace_id = %event.trace_id, "Enqueued indicator payload");
        // 수신 측이 닫힌 경우는 셧다운 경합이므로 조용히 무시
        let _ = self.tx.send(event);
    }

    fn log_stopped(&self) {
        info!(lease_topic = %self.lease_topic, "Event receiver stopped");
    }
}
