//! 스트림 명령 채널 (한 줄 요청/응답)
//!
//! TCP 연결 위에서 `\n` 으로 끝나는 한 줄씩 주고받음.
//! 같은 버퍼드 리더를 명령과 원시 바이트 전송이 함께 쓰므로
//! 줄 뒤에 이어 온 데이터가 버퍼에 남아도 잃지 않음.

use std::io;
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::message::Response;
use crate::{Error, Result};

/// 한 줄 최대 길이 (바이트)
pub const MAX_LINE_LEN: usize = 4096;

/// 한 줄 전송 (`\n` 추가)
pub async fn write_line<W>(conn: &mut W, line: &str) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut buf = Vec::with_capacity(line.len() + 1);
    buf.extend_from_slice(line.as_bytes());
    buf.push(b'\n');

    conn.write_all(&buf).await.map_err(Error::Connection)?;
    conn.flush().await.map_err(Error::Connection)?;
    Ok(())
}

/// 응답 한 줄 대기
///
/// - 타임아웃 → `Error::Timeout`
/// - 상대가 닫음 → `Error::Connection(UnexpectedEof)`
/// - UTF-8 아님 → `Error::Protocol`
pub async fn read_line<R>(conn: &mut R, timeout: Duration) -> Result<Response>
where
    R: AsyncBufRead + Unpin,
{
    let line = match tokio::time::timeout(timeout, next_line(conn)).await {
        Ok(Ok(Some(line))) => line,
        Ok(Ok(None)) => {
            return Err(Error::Connection(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "응답 전에 연결 종료",
            )))
        }
        Ok(Err(e)) if e.kind() == io::ErrorKind::InvalidData => {
            return Err(Error::Protocol(e.to_string()))
        }
        Ok(Err(e)) => return Err(Error::Connection(e)),
        Err(_) => return Err(Error::Timeout),
    };

    Ok(Response::new(&line))
}

/// 다음 줄 읽기 (개행 제외), EOF 면 `None`
///
/// 타임아웃 없음. 서버의 명령 대기 루프에서 사용.
pub async fn next_line<R>(conn: &mut R) -> io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    let mut raw = Vec::new();
    let n = read_until_newline(conn, &mut raw).await?;
    if n == 0 {
        return Ok(None);
    }

    if raw.last() == Some(&b'\n') {
        raw.pop();
    }
    if raw.last() == Some(&b'\r') {
        raw.pop();
    }

    String::from_utf8(raw)
        .map(Some)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "줄이 UTF-8 이 아님"))
}

/// `MAX_LINE_LEN` 까지만 버퍼링하는 read_until
async fn read_until_newline<R>(conn: &mut R, out: &mut Vec<u8>) -> io::Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut total = 0;
    loop {
        let available = conn.fill_buf().await?;
        if available.is_empty() {
            return Ok(total);
        }

        let (used, done) = match available.iter().position(|&b| b == b'\n') {
            Some(i) => (i + 1, true),
            None => (available.len(), false),
        };
        out.extend_from_slice(&available[..used]);
        conn.consume(used);
        total += used;

        if done {
            return Ok(total);
        }
        if out.len() > MAX_LINE_LEN {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "줄이 너무 김"));
        }
    }
}
