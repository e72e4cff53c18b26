//! ARQ 데이터그램 패킷 정의
//!
//! 와이어 포맷 (빅엔디안):
//!
//! ```text
//! +----------------+------------+----------------------+
//! | seq: u32       | length: u16| payload: length 바이트 |
//! +----------------+------------+----------------------+
//! ```
//!
//! seq = `0xFFFFFFFF` 는 종료 센티널이며 페이로드가 없음

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{Error, Result, SENTINEL_SEQ};

/// 헤더 길이: seq(4) + length(2)
pub const HEADER_LEN: usize = 6;

/// ARQ 패킷
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// 시퀀스 번호 (0부터 1씩 증가)
    pub seq: u32,

    /// 데이터
    pub payload: Bytes,
}

impl Packet {
    /// 데이터 패킷 생성
    pub fn data(seq: u32, payload: Bytes) -> Self {
        debug_assert!(payload.len() <= u16::MAX as usize);
        Self { seq, payload }
    }

    /// 종료 센티널 패킷
    pub fn sentinel() -> Self {
        Self {
            seq: SENTINEL_SEQ,
            payload: Bytes::new(),
        }
    }

    pub fn is_sentinel(&self) -> bool {
        self.seq == SENTINEL_SEQ
    }

    /// 와이어 포맷으로 직렬화
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(HEADER_LEN + self.payload.len());
        buf.put_u32(self.seq);
        buf.put_u16(self.payload.len() as u16);
        buf.put_slice(&self.payload);
        buf.freeze()
    }

    /// 데이터그램에서 역직렬화
    ///
    /// 앞 4바이트가 센티널이면 나머지와 관계없이 센티널로 취급
    pub fn decode(datagram: &[u8]) -> Result<Self> {
        if datagram.len() < 4 {
            return Err(Error::Protocol(format!(
                "패킷이 너무 짧음: {} bytes",
                datagram.len()
            )));
        }

        let mut buf = datagram;
        let seq = buf.get_u32();
        if seq == SENTINEL_SEQ {
            return Ok(Self::sentinel());
        }

        if buf.remaining() < 2 {
            return Err(Error::Protocol(format!("헤더 누락: seq={seq}")));
        }
        let length = buf.get_u16() as usize;
        if buf.remaining() < length {
            return Err(Error::Protocol(format!(
                "페이로드 잘림: seq={seq}, length={length}, remaining={}",
                buf.remaining()
            )));
        }

        Ok(Self {
            seq,
            payload: Bytes::copy_from_slice(&buf[..length]),
        })
    }
}
