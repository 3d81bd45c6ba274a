//! 싱크 RPC 클라이언트
//!
//! 싱크와는 개행 구분 JSON을 주고받는 지속 연결 하나를 유지합니다.
//! 지원하는 호출은 두 가지입니다.
//!
//! - `info`: 싱크의 현재 원소 수와 용량을 조회합니다. 연결 직후
//!   생존 확인을 겸해 한 번 호출합니다.
//! - `add`: 값 하나를 싱크에 추가합니다.
//!
//! 연결이 끊기면 이 연결 객체를 버리고 [`SinkClient::connect`]로
//! 새로 만들어야 합니다. 호출 단위 재시도는 상위 레이어의 몫입니다.

use std::time::Duration;

use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::time::timeout;
use tracing::{debug, info};

use bloomgate_core::error::SinkError;

/// `info` 호출 응답
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct SinkInfo {
    /// 현재 저장된 원소 수
    pub elements: u64,
    /// 싱크 용량
    pub capacity: u64,
}

/// 싱크 연결 팩토리
#[derive(Debug, Clone)]
pub struct SinkClient {
    addr: String,
    connect_timeout: Duration,
}

impl SinkClient {
    pub fn new(addr: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            connect_timeout,
        }
    }

    /// 싱크 주소 (`host:port`)
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// 싱크에 연결하고 `info` 호출로 생존을 확인합니다.
    pub async fn connect(&self) -> Result<SinkConnection, SinkError> {
        let stream = timeout(self.connect_timeout, TcpStream::connect(&self.addr))
            .await
            .map_err(|_| SinkError::Connect {
                addr: self.addr.clone(),
                reason: format!("connect timed out after {:?}", self.connect_timeout),
            })?
            .map_err(|e| SinkError::Connect {
                addr: self.addr.clone(),
                reason: e.to_string(),
            })?;

        let (read_half, write_half) = stream.into_split();
        let mut conn = SinkConnection {
            reader: BufReader::new(read_half),
            writer: write_half,
        };

        let sink_info = conn.info().await?;
        info!(
            addr = %self.addr,
            elements = sink_info.elements,
            capacity = sink_info.capacity,
            "Connected to sink"
        );
        Ok(conn)
    }
}

/// 싱크와의 단일 지속 연결
#[derive(Debug)]
pub struct SinkConnection {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl SinkConnection {
    /// 싱크 상태를 조회합니다.
    pub async fn info(&mut self) -> Result<SinkInfo, SinkError> {
        let reply = self
            .call(&serde_json::json!({"command": "info"}))
            .await?;
        serde_json::from_value(reply).map_err(|e| SinkError::MalformedReply {
            reason: format!("info reply: {e}"),
        })
    }

    /// 값 하나를 싱크에 추가하고, 실제로 추가된 개수를 반환합니다.
    ///
    /// 이미 존재하는 값이면 0이 반환될 수 있습니다. 둘 다 성공입니다.
    pub async fn add(&mut self, value: &str) -> Result<u64, SinkError> {
        let reply = self
            .call(&serde_json::json!({"command": "add", "value": value}))
            .await?;
        let added = reply
            .get("added")
            .and_then(|a| a.as_u64())
            .ok_or_else(|| SinkError::MalformedReply {
                reason: "add reply missing 'added' field".to_owned(),
            })?;
        debug!(added, "Sink add call completed");
        Ok(added)
    }

    /// 요청 한 줄을 쓰고 응답 한 줄을 읽습니다.
    async fn call(&mut self, body: &serde_json::Value) -> Result<serde_json::Value, SinkError> {
        let mut line = serde_json::to_string(body).map_err(|e| SinkError::Rpc {
            reason: format!("failed to encode request: {e}"),
        })?;
        line.push('\n');
        self.writer
            .write_all(line.as_bytes())
            .await
            .map_err(|e| SinkError::Rpc {
                reason: e.to_string(),
            })?;

        let mut reply_line = String::new();
        let n = self
            .reader
            .read_line(&mut reply_line)
            .await
            .map_err(|e| SinkError::Rpc {
                reason: e.to_string(),
            })?;
        if n == 0 {
            return Err(SinkError::Rpc {
                reason: "connection closed by sink".to_owned(),
            });
        }

        serde_json::from_str(reply_line.trim_end()).map_err(|e| SinkError::MalformedReply {
            reason: e.to_string(),
        })
    }
}
