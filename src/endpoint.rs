//! 원격 엔드포인트와 전송 방식

use std::fmt;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use crate::{Error, Result, DEFAULT_TCP_PORT, DEFAULT_UDP_PORT};

/// 전송 방식 (세션 동안 고정)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportMode {
    /// 신뢰성 있는 바이트 스트림 (TCP)
    Stream,
    /// 비신뢰 데이터그램 (UDP) + ARQ
    Datagram,
}

impl TransportMode {
    /// 전송 방식별 기본 포트
    pub fn default_port(self) -> u16 {
        match self {
            TransportMode::Stream => DEFAULT_TCP_PORT,
            TransportMode::Datagram => DEFAULT_UDP_PORT,
        }
    }
}

impl fmt::Display for TransportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportMode::Stream => f.write_str("TCP"),
            TransportMode::Datagram => f.write_str("UDP"),
        }
    }
}

/// 원격 엔드포인트 (IPv4 + 포트)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint {
    pub host: Ipv4Addr,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: Ipv4Addr, port: u16) -> Self {
        Self { host, port }
    }

    /// 텍스트 입력 검증 후 생성
    ///
    /// 점 4개로 구분된 IPv4, 포트 1~65535만 허용
    pub fn parse(host: &str, port: &str) -> Result<Self> {
        let host: Ipv4Addr = host
            .trim()
            .parse()
            .map_err(|_| Error::InvalidEndpoint(format!("IP 주소 형식 오류: {host}")))?;

        let port: u16 = port
            .trim()
            .parse()
            .map_err(|_| Error::InvalidEndpoint(format!("포트 형식 오류: {port}")))?;
        if port == 0 {
            return Err(Error::InvalidEndpoint("포트는 1~65535 범위".into()));
        }

        Ok(Self { host, port })
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.host, self.port))
    }
}

impl From<SocketAddrV4> for Endpoint {
    fn from(addr: SocketAddrV4) -> Self {
        Self::new(*addr.ip(), addr.port())
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid() {
        let endpoint = Endpoint::parse("192.168.1.4", "8080").unwrap();
        assert_eq!(endpoint.host, Ipv4Addr::new(192, 168, 1, 4));
        assert_eq!(endpoint.port, 8080);
        assert_eq!(endpoint.to_string(), "192.168.1.4:8080");
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(matches!(
            Endpoint::parse("256.1.1.1", "80"),
            Err(Error::InvalidEndpoint(_))
        ));
        assert!(matches!(
            Endpoint::parse("10.0.0", "80"),
            Err(Error::InvalidEndpoint(_))
        ));
        assert!(matches!(
            Endpoint::parse("10.0.0.1", "0"),
            Err(Error::InvalidEndpoint(_))
        ));
        assert!(matches!(
            Endpoint::parse("10.0.0.1", "65536"),
            Err(Error::InvalidEndpoint(_))
        ));
        assert!(matches!(
            Endpoint::parse("10.0.0.1", "http"),
            Err(Error::InvalidEndpoint(_))
        ));
    }

    #[test]
    fn test_default_ports() {
        assert_eq!(TransportMode::Stream.default_port(), 8080);
        assert_eq!(TransportMode::Datagram.default_port(), 8081);
    }
}
