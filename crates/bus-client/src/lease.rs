//! 리스 관리 — 구독/해지/하트비트
//!
//! 관리 엔드포인트와의 3가지 작업을 제공합니다.
//!
//! - [`LeaseManager::subscribe`]: 토픽 구독을 등록하고 [`Subscription`]
//!   (리스 토픽, 데이터 채널 엔드포인트)을 받습니다.
//! - [`LeaseManager::unsubscribe`]: 리스 토픽 해지. 최선 노력(best-effort)
//!   작업으로 실패해도 에러를 전파하지 않습니다.
//! - [`LeaseManager::heartbeat`]: 주기적으로 리스 유효성을 확인하는 루프.
//!   리스가 무효화되면 종료하여 상위 레이어의 재시작을 유도합니다.

use std::time::Duration;

use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use bloomgate_core::error::HandshakeError;
use bloomgate_core::metrics::BUS_HEARTBEAT_FAILURES_TOTAL;

use crate::transport::request;

/// 구독 성공 시 버스가 돌려주는 리스 정보
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    /// 구독에 사용된 관리 엔드포인트 (`host:port`)
    pub management_endpoint: String,
    /// 구독을 요청한 원래 토픽
    pub topic: String,
    /// 이 구독에 부여된 리스 토픽 (데이터 채널 필터 접두사)
    pub lease_topic: String,
    /// 데이터 채널 발행 엔드포인트 (`host:pub_port`) — 수신용
    pub pub_endpoint: String,
    /// 데이터 채널 구독 엔드포인트 (`host:sub_port`) — 버스 방향 발행용
    pub sub_endpoint: String,
}

/// 하트비트 루프의 종료 사유
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatOutcome {
    /// 버스가 리스를 더 이상 인정하지 않음. 재구독이 필요합니다.
    LeaseInvalid,
    /// 취소 토큰에 의한 정상 종료
    Cancelled,
}

/// 관리 응답의 status 필드가 성공을 나타내는지 판정합니다.
pub fn reply_is_success(reply: &serde_json::Value) -> bool {
    reply
        .get("status")
        .and_then(|s| s.as_str())
        .is_some_and(|s| s == "success")
}

/// 관리 엔드포인트에 대한 리스 생명주기 관리자
pub struct LeaseManager {
    endpoint: String,
    request_timeout: Duration,
}

impl LeaseManager {
    pub fn new(endpoint: impl Into<String>, request_timeout: Duration) -> Self {
        Self {
            endpoint: endpoint.into(),
            request_timeout,
        }
    }

    /// 관리 엔드포인트 (`host:port`)
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// 토픽 구독을 등록합니다.
    ///
    /// 성공 시 버스가 부여한 리스 토픽과 데이터 채널 포트를 담은
    /// [`Subscription`]을 반환합니다. 데이터 채널 호스트는 관리
    /// 엔드포인트의 호스트를 그대로 사용합니다.
    pub async fn subscribe(
        &self,
        topic: &str,
        snapshot: u64,
    ) -> Result<Subscription, HandshakeError> {
        let body = json!({
            "action": "subscribe",
            "topic": topic,
            "snapshot": snapshot,
        });
        debug!(endpoint = %self.endpoint, topic, snapshot, "Sending subscribe request");
        let reply = request(&self.endpoint, &body, self.request_timeout).await?;

        if !reply_is_success(&reply) {
            return Err(HandshakeError::Rejected {
                action: "subscribe".to_owned(),
                status: reply
                    .get("status")
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "<missing>".to_owned()),
            });
        }

        let lease_topic = reply
            .get("topic")
            .and_then(|t| t.as_str())
            .ok_or_else(|| HandshakeError::MalformedReply {
                reason: "subscribe reply missing 'topic' field".to_owned(),
            })?
            .to_owned();
        let pub_port = reply
            .get("pub_port")
            .and_then(|p| p.as_u64())
            .ok_or_else(|| HandshakeError::MalformedReply {
                reason: "subscribe reply missing 'pub_port' field".to_owned(),
            })?;
        let sub_port = reply
            .get("sub_port")
            .and_then(|p| p.as_u64())
            .ok_or_else(|| HandshakeError::MalformedReply {
                reason: "subscribe reply missing 'sub_port' field".to_owned(),
            })?;

        let host = endpoint_host(&self.endpoint)?;
        let subscription = Subscription {
            management_endpoint: self.endpoint.clone(),
            topic: topic.to_owned(),
            lease_topic,
            pub_endpoint: format!("{host}:{pub_port}"),
            sub_endpoint: format!("{host}:{sub_port}"),
        };
        info!(
            lease_topic = %subscription.lease_topic,
            pub_endpoint = %subscription.pub_endpoint,
            "Subscribed to bus"
        );
        Ok(subscription)
    }

    /// 리스 토픽을 해지합니다. 최선 노력 작업입니다.
    ///
    /// 실패는 경고로 기록될 뿐 전파되지 않습니다. 버스는 어차피
    /// 하트비트 부재로 리스를 회수합니다.
    pub async fn unsubscribe(&self, lease_topic: &str) {
        let body = json!({
            "action": "unsubscribe",
            "topic": lease_topic,
        });
        match request(&self.endpoint, &body, self.request_timeout).await {
            Ok(reply) if reply_is_success(&reply) => {
                info!(lease_topic, "Unsubscribed from bus");
            }
            Ok(reply) => {
                warn!(lease_topic, ?reply, "Bus did not confirm unsubscription");
            }
            Err(e) => {
                warn!(lease_topic, error = %e, "Failed to unsubscribe from bus");
            }
        }
    }

    /// 하트비트 루프를 실행합니다.
    ///
    /// `interval`마다 리스 토픽으로 heartbeat 요청을 보내고, 응답도
    /// 최대 `interval`까지만 기다립니다.
    /// 버스가 리스를 거부하거나 요청이 실패하면
    /// [`HeartbeatOutcome::LeaseInvalid`]로 종료하여 상위 레이어가
    /// 에포크를 재시작하게 합니다.
    pub async fn heartbeat(
        &self,
        lease_topic: &str,
        interval: Duration,
        cancel: CancellationToken,
    ) -> HeartbeatOutcome {
        let body = json!({
            "action": "heartbeat",
            "topic": lease_topic,
        });
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(lease_topic, "Heartbeat loop cancelled");
                    return HeartbeatOutcome::Cancelled;
                }
                _ = tokio::time::sleep(interval) => {}
            }

            match request(&self.endpoint, &body, interval).await {
                Ok(reply) if reply_is_success(&reply) => {
                    debug!(lease_topic, "Heartbeat acknowledged");
                }
                Ok(reply) => {
                    metrics::counter!(BUS_HEARTBEAT_FAILURES_TOTAL).increment(1);
                    warn!(lease_topic, ?reply, "Bus invalidated our lease");
                    return HeartbeatOutcome::LeaseInvalid;
                }
                Err(e) => {
                    metrics::counter!(BUS_HEARTBEAT_FAILURES_TOTAL).increment(1);
                    warn!(lease_topic, error = %e, "Heartbeat request failed");
                    return HeartbeatOutcome::LeaseInvalid;
                }
            }
        }
    }
}

/// `host:port` 형식의 엔드포인트에서 호스트 부분을 추출합니다.
fn endpoint_host(endpoint: &str) -> Result<&str, HandshakeError> {
    endpoint
        .rsplit_once(':')
        .map(|(host, _)| host)
        .filter(|host| !host.is_empty())
        .ok_or_else(|| HandshakeError::InvalidEndpoint {
            endpoint: endpoint.to_owned(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;

    /// 관리 요청을 `count`건 받아 각각 준비된 응답을 돌려주는 모의 서버
    async fn mock_management(replies: Vec<serde_json::Value>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            for reply in replies {
                let (stream, _) = listener.accept().await.unwrap();
                let (read_half, mut write_half) = stream.into_split();
                let mut reader = BufReader::new(read_half);
                let mut line = String::new();
                reader.read_line(&mut line).await.unwrap();
                let encoded = format!("{reply}\n");
                write_half.write_all(encoded.as_bytes()).await.unwrap();
            }
        });
        addr
    }

    #[test]
    fn reply_is_success_checks_status_field() {
        assert!(reply_is_success(&json!({"status": "success"})));
        assert!(!reply_is_success(&json!({"status": "error"})));
        assert!(!reply_is_success(&json!({"status": 1})));
        assert!(!reply_is_success(&json!({})));
    }

    #[test]
    fn endpoint_host_extracts_host_part() {
        assert_eq!(endpoint_host("localhost:13370").unwrap(), "localhost");
        assert_eq!(endpoint_host("10.0.0.1:9999").unwrap(), "10.0.0.1");
        assert!(endpoint_host("no-port-here").is_err());
        assert!(endpoint_host(":13370").is_err());
    }

    #[tokio::test]
    async fn subscribe_returns_lease_and_pub_endpoint() {
        let addr = mock_management(vec![json!({
            "status": "success",
            "topic": "lease-abc",
            "pub_port": 41001,
            "sub_port": 41002,
        })])
        .await;

        let manager = LeaseManager::new(addr.clone(), Duration::from_secs(5));
        let sub = manager.subscribe("stix2/indicator", 30).await.unwrap();

        assert_eq!(sub.lease_topic, "lease-abc");
        assert_eq!(sub.topic, "stix2/indicator");
        assert_eq!(sub.pub_endpoint, "127.0.0.1:41001");
        assert_eq!(sub.sub_endpoint, "127.0.0.1:41002");
        assert_eq!(sub.management_endpoint, addr);
    }

    #[tokio::test]
    async fn subscribe_rejection_is_an_error() {
        let addr = mock_management(vec![json!({"status": "error"})]).await;
        let manager = LeaseManager::new(addr, Duration::from_secs(5));
        let err = manager.subscribe("stix2/indicator", 30).await.unwrap_err();
        assert!(matches!(err, HandshakeError::Rejected { .. }));
    }

    #[tokio::test]
    async fn subscribe_reply_without_pub_port_is_malformed() {
        let addr = mock_management(vec![json!({
            "status": "success",
            "topic": "lease-abc",
            "sub_port": 41002,
        })])
        .await;
        let manager = LeaseManager::new(addr, Duration::from_secs(5));
        let err = manager.subscribe("stix2/indicator", 30).await.unwrap_err();
        assert!(matches!(err, HandshakeError::MalformedReply { .. }));
    }

    #[tokio::test]
    async fn heartbeat_exits_on_lease_invalidation() {
        let addr = mock_management(vec![
            json!({"status": "success"}),
            json!({"status": "unknown topic"}),
        ])
        .await;
        let manager = LeaseManager::new(addr, Duration::from_secs(5));
        let outcome = manager
            .heartbeat(
                "lease-abc",
                Duration::from_millis(10),
                CancellationToken::new(),
            )
            .await;
        assert_eq!(outcome, HeartbeatOutcome::LeaseInvalid);
    }

    #[tokio::test]
    async fn heartbeat_reply_window_is_bounded_by_interval() {
        // 연결은 받지만 응답하지 않는 관리 서버
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read_half, _write_half) = stream.into_split();
            let mut reader = BufReader::new(read_half);
            let mut line = String::new();
            reader.read_line(&mut line).await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
        });

        // request_timeout이 아무리 길어도 응답 대기는 interval로 제한됨
        let manager = LeaseManager::new(addr, Duration::from_secs(60));
        let outcome = tokio::time::timeout(
            Duration::from_secs(2),
            manager.heartbeat(
                "lease-abc",
                Duration::from_millis(100),
                CancellationToken::new(),
            ),
        )
        .await
        .expect("heartbeat did not give up within the interval");
        assert_eq!(outcome, HeartbeatOutcome::LeaseInvalid);
    }

    #[tokio::test]
    async fn heartbeat_exits_on_cancellation() {
        // 서버 없이도 취소는 sleep 중에 동작해야 함
        let manager = LeaseManager::new("127.0.0.1:1", Duration::from_secs(5));
        let cancel = CancellationToken::new();
        let handle = tokio::spawn({
            let cancel = cancel.clone();
            async move {
                manager
                    .heartbeat("lease-abc", Duration::from_secs(60), cancel)
                    .await
            }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
        assert_eq!(handle.await.unwrap(), HeartbeatOutcome::Cancelled);
    }

    #[tokio::test]
    async fn unsubscribe_failure_is_swallowed() {
        // 아무도 듣지 않는 주소
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let manager = LeaseManager::new(addr, Duration::from_millis(200));
        // 에러를 반환하지 않고 완료되어야 함
        manager.unsubscribe("lease-abc").await;
    }
}
