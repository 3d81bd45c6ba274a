//! 버스 전송 프리미티브 — 요청/응답과 구독 스트림
//!
//! 두 가지 저수준 통신 형태를 제공합니다.
//!
//! - [`request`]: 관리 엔드포인트와의 1회성 요청/응답. 연결을 열고
//!   JSON 한 줄을 쓰고, 제한 시간 내에 JSON 한 줄을 읽은 뒤 닫습니다.
//! - [`SubscribeStream`]: 데이터 채널 구독 스트림. 연결 직후 리스 토픽
//!   접두사를 한 줄로 보내 전송 계층 필터를 등록하고, 이후 줄 단위로
//!   메시지를 수신합니다.
//!
//! 프레이밍은 개행 구분이며, 메시지 형식 자체는 상위 레이어가 해석합니다.

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;

use bloomgate_core::error::HandshakeError;

/// 관리 엔드포인트로 요청 한 건을 보내고 응답 한 건을 기다립니다.
///
/// 연결 수립, 요청 전송, 응답 수신 전체가 `window` 안에 끝나야 합니다.
/// 시간 초과는 내부에서 재시도하지 않습니다. 재시작 여부는 호출자가
/// 결정합니다.
pub async fn request(
    endpoint: &str,
    body: &serde_json::Value,
    window: Duration,
) -> Result<serde_json::Value, HandshakeError> {
    let deadline_err = || HandshakeError::Timeout {
        endpoint: endpoint.to_owned(),
        timeout_secs: window.as_secs(),
    };

    let stream = timeout(window, TcpStream::connect(endpoint))
        .await
        .map_err(|_| deadline_err())?
        .map_err(|e| HandshakeError::Transport {
            endpoint: endpoint.to_owned(),
            reason: e.to_string(),
        })?;

    let (read_half, mut write_half) = stream.into_split();

    let mut line = serde_json::to_string(body).map_err(|e| HandshakeError::Transport {
        endpoint: endpoint.to_owned(),
        reason: format!("failed to encode request: {e}"),
    })?;
    line.push('\n');

    timeout(window, write_half.write_all(line.as_bytes()))
        .await
        .map_err(|_| deadline_err())?
        .map_err(|e| HandshakeError::Transport {
            endpoint: endpoint.to_owned(),
            reason: e.to_string(),
        })?;

    let mut reader = BufReader::new(read_half);
    let mut reply_line = String::new();
    let n = timeout(window, reader.read_line(&mut reply_line))
        .await
        .map_err(|_| deadline_err())?
        .map_err(|e| HandshakeError::Transport {
            endpoint: endpoint.to_owned(),
            reason: e.to_string(),
        })?;
    if n == 0 {
        return Err(HandshakeError::MalformedReply {
            reason: "connection closed before reply".to_owned(),
        });
    }

    serde_json::from_str(reply_line.trim_end()).map_err(|e| HandshakeError::MalformedReply {
        reason: e.to_string(),
    })
}

/// 데이터 채널 구독 스트림
///
/// 연결 직후 토픽 접두사를 보내 전송 계층에서 필터링을 등록합니다.
/// 이후 [`SubscribeStream::recv`]로 `"<topic> <payload>"` 형식의 줄을
/// 하나씩 읽습니다. 줄은 원시 바이트로 반환되며, 문자 인코딩 검증은
/// 메시지 단위 드롭을 위해 소비자의 몫입니다.
pub struct SubscribeStream {
    reader: BufReader<TcpStream>,
}

impl SubscribeStream {
    /// 발행 엔드포인트에 연결하고 토픽 접두사 구독을 등록합니다.
    pub async fn connect(pub_endpoint: &str, topic_prefix: &str) -> std::io::Result<Self> {
        let mut stream = TcpStream::connect(pub_endpoint).await?;
        stream
            .write_all(format!("{topic_prefix}\n").as_bytes())
            .await?;
        Ok(Self {
            reader: BufReader::new(stream),
        })
    }

    /// 메시지 한 줄을 수신합니다.
    ///
    /// 스트림이 닫히면 `Ok(None)`을 반환합니다. 후행 개행은 제거됩니다.
    pub async fn recv(&mut self) -> std::io::Result<Option<Vec<u8>>> {
        let mut buf = Vec::new();
        let n = self.reader.read_until(b'\n', &mut buf).await?;
        if n == 0 {
            return Ok(None);
        }
        while matches!(buf.last(), Some(b'\n' | b'\r')) {
            buf.pop();
        }
        Ok(Some(buf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;

    /// 요청 한 건을 받아 고정 응답을 돌려주는 단발성 서버를 띄웁니다.
    async fn one_shot_server(reply: Option<String>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read_half, mut write_half) = stream.into_split();
            let mut reader = BufReader::new(read_half);
            let mut line = String::new();
            reader.read_line(&mut line).await.unwrap();
            match reply {
                Some(reply) => {
                    write_half
                        .write_all(format!("{reply}\n").as_bytes())
                        .await
                        .unwrap();
                }
                None => {
                    // 응답 없이 연결을 유지해 타임아웃을 유도
                    tokio::time::sleep(Duration::from_secs(30)).await;
                }
            }
        });
        addr.to_string()
    }

    #[tokio::test]
    async fn request_round_trip() {
        let addr = one_shot_server(Some(r#"{"status":"success"}"#.to_owned())).await;
        let reply = request(
            &addr,
            &json!({"action": "heartbeat", "topic": "abc"}),
            Duration::from_secs(5),
        )
        .await
        .unwrap();
        assert_eq!(reply["status"], "success");
    }

    #[tokio::test]
    async fn request_times_out_without_reply() {
        let addr = one_shot_server(None).await;
        let err = request(&addr, &json!({"action": "subscribe"}), Duration::from_millis(200))
            .await
            .unwrap_err();
        assert!(matches!(err, HandshakeError::Timeout { .. }));
    }

    #[tokio::test]
    async fn request_connection_refused_is_transport_error() {
        // 방금 닫은 리스너의 주소는 아무도 듣지 않음
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let err = request(&addr, &json!({}), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, HandshakeError::Transport { .. }));
    }

    #[tokio::test]
    async fn request_non_json_reply_is_malformed() {
        let addr = one_shot_server(Some("not json at all".to_owned())).await;
        let err = request(&addr, &json!({}), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, HandshakeError::MalformedReply { .. }));
    }

    #[tokio::test]
    async fn subscribe_stream_registers_prefix_and_receives_lines() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read_half, mut write_half) = stream.into_split();
            let mut reader = BufReader::new(read_half);
            let mut prefix = String::new();
            reader.read_line(&mut prefix).await.unwrap();
            assert_eq!(prefix.trim_end(), "abc123");
            write_half
                .write_all(b"abc123/indicator {\"pattern\":\"x\"}\n")
                .await
                .unwrap();
            write_half.write_all(b"abc123/sighting {}\n").await.unwrap();
        });

        let mut stream = SubscribeStream::connect(&addr, "abc123").await.unwrap();
        let first = stream.recv().await.unwrap().unwrap();
        assert_eq!(first, b"abc123/indicator {\"pattern\":\"x\"}");
        let second = stream.recv().await.unwrap().unwrap();
        assert_eq!(second, b"abc123/sighting {}");
        // 서버가 닫으면 None
        assert!(stream.recv().await.unwrap().is_none());

        server.await.unwrap();
    }
}
