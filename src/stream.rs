//! 스트림 대량 전송
//!
//! 협상이 끝난 연결 위에서 선언된 크기만큼 원시 바이트를 고정 크기 청크로 복사.
//! 프레이밍 없음: 수신측은 바이트 수로만 끝을 판단함.

use std::io;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::session::{CancelFlag, TransferSession};
use crate::{Error, Result};

/// 버퍼를 최대한 채워 읽음 (EOF 면 덜 채워짐)
///
/// 파일 읽기가 짧게 끊겨도 청크 경계가 흔들리지 않게 함
pub(crate) async fn read_chunk<R>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// 로컬 데이터를 연결로 전송
///
/// `session.total_size()` 바이트를 보내고 나면 종료.
/// 로컬 데이터가 먼저 끝나면 `Error::Io(UnexpectedEof)`.
pub async fn send_file<W, R>(
    conn: &mut W,
    reader: &mut R,
    session: &mut TransferSession,
    chunk_size: usize,
    cancel: &CancelFlag,
) -> Result<u64>
where
    W: AsyncWrite + Unpin,
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; chunk_size.max(1)];
    session.begin();

    while session.remaining() > 0 {
        cancel.check()?;

        let want = session.remaining().min(buf.len() as u64) as usize;
        let n = read_chunk(reader, &mut buf[..want]).await?;
        if n == 0 {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "로컬 파일이 선언 크기보다 짧음: {}/{}",
                    session.transferred_bytes(),
                    session.total_size()
                ),
            )));
        }

        conn.write_all(&buf[..n])
            .await
            .map_err(Error::TransferFailed)?;
        session.advance(n);
    }

    conn.flush().await.map_err(Error::TransferFailed)?;
    debug!(
        "스트림 송신 완료: {} ({} bytes)",
        session.filename(),
        session.transferred_bytes()
    );
    Ok(session.transferred_bytes())
}

/// 연결에서 선언 크기만큼 받아 기록
///
/// - 읽기마다 `read_timeout` 적용 (전체 기한 없음)
/// - 크기 도달 전 EOF → `Error::Incomplete` (받은 부분은 남겨둠)
pub async fn receive_file<R, W>(
    conn: &mut R,
    writer: &mut W,
    session: &mut TransferSession,
    chunk_size: usize,
    read_timeout: Duration,
    cancel: &CancelFlag,
) -> Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; chunk_size.max(1)];
    session.begin();

    while session.remaining() > 0 {
        cancel.check()?;

        let want = session.remaining().min(buf.len() as u64) as usize;
        let n = match tokio::time::timeout(read_timeout, conn.read(&mut buf[..want])).await {
            Ok(Ok(n)) => n,
            Ok(Err(e)) => return Err(Error::TransferFailed(e)),
            Err(_) => return Err(Error::Timeout),
        };

        if n == 0 {
            writer.flush().await?;
            return Err(Error::Incomplete {
                received: session.transferred_bytes(),
                expected: session.total_size(),
            });
        }

        writer.write_all(&buf[..n]).await?;
        session.advance(n);
    }

    writer.flush().await?;
    debug!(
        "스트림 수신 완료: {} ({} bytes)",
        session.filename(),
        session.transferred_bytes()
    );
    Ok(session.transferred_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Direction;
    use std::sync::{Arc, Mutex};

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[tokio::test]
    async fn test_send_in_fixed_chunks() {
        let data = pattern(2500);
        let chunks = Arc::new(Mutex::new(Vec::new()));
        let sink = chunks.clone();

        let mut session = TransferSession::new("f.bin", Direction::Upload, 2500);
        session.set_observer(Box::new(move |p| sink.lock().unwrap().push(p.chunk)));

        let (mut local, mut peer) = tokio::io::duplex(8192);
        let mut reader = &data[..];
        let sent = send_file(&mut local, &mut reader, &mut session, 1024, &CancelFlag::new())
            .await
            .unwrap();
        drop(local);

        assert_eq!(sent, 2500);
        assert_eq!(*chunks.lock().unwrap(), vec![1024, 1024, 452]);

        let mut received = Vec::new();
        peer.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, data);
    }

    #[tokio::test]
    async fn test_chunks_over_4gib_declared_size() {
        // 남은 크기의 하위 32비트가 10 이어도 청크는 버퍼 크기만큼
        let total = u64::from(u32::MAX) + 11;
        let data = pattern(2048);
        let chunks = Arc::new(Mutex::new(Vec::new()));
        let sink = chunks.clone();

        let mut session = TransferSession::new("huge.bin", Direction::Upload, total);
        session.set_observer(Box::new(move |p| sink.lock().unwrap().push(p.chunk)));

        let (mut local, _peer) = tokio::io::duplex(8192);
        let mut reader = &data[..];
        let result = send_file(&mut local, &mut reader, &mut session, 1024, &CancelFlag::new()).await;

        assert!(matches!(result, Err(Error::Io(e)) if e.kind() == io::ErrorKind::UnexpectedEof));
        assert_eq!(*chunks.lock().unwrap(), vec![1024, 1024]);
        assert_eq!(session.remaining(), total - 2048);
    }

    #[tokio::test]
    async fn test_receive_exact_size() {
        let data = pattern(3000);
        let (mut peer, mut local) = tokio::io::duplex(8192);
        // 선언 크기 뒤에 온 바이트는 읽지 않음
        peer.write_all(&data).await.unwrap();
        peer.write_all(b"trailing").await.unwrap();

        let mut session = TransferSession::new("f.bin", Direction::Download, 3000);
        let mut out = Vec::new();
        let received = receive_file(
            &mut local,
            &mut out,
            &mut session,
            1024,
            Duration::from_secs(1),
            &CancelFlag::new(),
        )
        .await
        .unwrap();

        assert_eq!(received, 3000);
        assert!(session.is_complete());
        assert_eq!(out, data);
    }

    #[tokio::test]
    async fn test_early_close_is_incomplete() {
        let (mut peer, mut local) = tokio::io::duplex(8192);
        peer.write_all(&pattern(100)).await.unwrap();
        drop(peer);

        let mut session = TransferSession::new("f.bin", Direction::Download, 500);
        let mut out = Vec::new();
        let result = receive_file(
            &mut local,
            &mut out,
            &mut session,
            1024,
            Duration::from_secs(1),
            &CancelFlag::new(),
        )
        .await;

        assert!(matches!(
            result,
            Err(Error::Incomplete {
                received: 100,
                expected: 500
            })
        ));
        // 받은 부분은 그대로 남음
        assert_eq!(out.len(), 100);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_peer_times_out() {
        let (_peer, mut local) = tokio::io::duplex(64);
        let mut session = TransferSession::new("f.bin", Direction::Download, 10);
        let mut out = Vec::new();

        let result = receive_file(
            &mut local,
            &mut out,
            &mut session,
            1024,
            Duration::from_secs(5),
            &CancelFlag::new(),
        )
        .await;
        assert!(matches!(result, Err(Error::Timeout)));
    }

    #[tokio::test]
    async fn test_cancel_between_chunks() {
        let cancel = CancelFlag::new();
        let flag = cancel.clone();

        let mut session = TransferSession::new("f.bin", Direction::Upload, 4096);
        session.set_observer(Box::new(move |_| flag.cancel()));

        let data = pattern(4096);
        let (mut local, _peer) = tokio::io::duplex(8192);
        let mut reader = &data[..];
        let result = send_file(&mut local, &mut reader, &mut session, 1024, &cancel).await;

        assert!(matches!(result, Err(Error::Cancelled)));
        assert_eq!(session.transferred_bytes(), 1024);
    }

    #[tokio::test]
    async fn test_short_local_file() {
        let data = pattern(10);
        let (mut local, _peer) = tokio::io::duplex(64);
        let mut reader = &data[..];
        let mut session = TransferSession::new("f.bin", Direction::Upload, 20);

        let result = send_file(&mut local, &mut reader, &mut session, 8, &CancelFlag::new()).await;
        assert!(matches!(result, Err(Error::Io(_))));
    }

    #[tokio::test]
    async fn test_empty_transfer() {
        let (mut local, _peer) = tokio::io::duplex(64);
        let mut reader: &[u8] = &[];
        let mut session = TransferSession::new("empty", Direction::Upload, 0);

        let sent = send_file(&mut local, &mut reader, &mut session, 1024, &CancelFlag::new())
            .await
            .unwrap();
        assert_eq!(sent, 0);
    }
}
