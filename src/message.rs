//! 명령 채널 메시지 정의
//!
//! 모든 명령/응답은 한 줄 UTF-8 텍스트, 공백으로 토큰 구분

use std::fmt;

use crate::{Error, Result};

/// 명령 (첫 토큰이 동사)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `UPLOAD <name> <size>` (TCP)
    Upload { name: String, size: u64 },

    /// `DOWNLOAD <name> [<offset>]` (TCP)
    ///
    /// `offset` 부터 이어받기. 생략하면 0.
    Download { name: String, offset: u64 },

    /// `UDP_UPLOAD <name> <size>`
    UdpUpload { name: String, size: u64 },

    /// `UDP_DOWNLOAD <name>`
    UdpDownload { name: String },

    /// `ACK <seq>`
    Ack { seq: u32 },

    /// `ECHO <text>`
    Echo(String),

    /// `TIME` / `UDP_TIME`
    Time,

    /// `CLOSE` / `EXIT` / `QUIT`
    Close,

    /// 그 외 (그대로 전달)
    Other(String),
}

impl Command {
    /// 한 줄 파싱
    ///
    /// 알려진 동사의 인자가 잘못되면 `Error::Protocol`
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim();
        let (verb, rest) = match line.split_once(' ') {
            Some((verb, rest)) => (verb, rest.trim()),
            None => (line, ""),
        };

        match verb {
            "UPLOAD" => {
                let (name, size) = parse_name_and_size(rest).ok_or_else(|| usage(verb))?;
                Ok(Command::Upload { name, size })
            }
            "UDP_UPLOAD" => {
                let (name, size) = parse_name_and_size(rest).ok_or_else(|| usage(verb))?;
                Ok(Command::UdpUpload { name, size })
            }
            "DOWNLOAD" if !rest.is_empty() => {
                let (name, offset) = parse_name_and_offset(rest);
                Ok(Command::Download { name, offset })
            }
            "UDP_DOWNLOAD" if !rest.is_empty() => Ok(Command::UdpDownload {
                name: rest.to_string(),
            }),
            "DOWNLOAD" | "UDP_DOWNLOAD" => Err(usage(verb)),
            "ACK" => rest
                .parse()
                .map(|seq| Command::Ack { seq })
                .map_err(|_| Error::Protocol(format!("ACK 번호 파싱 실패: {rest:?}"))),
            "ECHO" => Ok(Command::Echo(rest.to_string())),
            "TIME" if rest.is_empty() => Ok(Command::Time),
            "UDP_TIME" => Ok(Command::Time),
            "CLOSE" | "EXIT" | "QUIT" if rest.is_empty() => Ok(Command::Close),
            _ => Ok(Command::Other(line.to_string())),
        }
    }

    /// 와이어 형식 (개행 제외)
    pub fn to_line(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Upload { name, size } => write!(f, "UPLOAD {name} {size}"),
            Command::Download { name, offset } => {
                // 이름 끝 토큰이 숫자면 오프셋으로 읽히므로 0 이라도 명시
                if *offset > 0 || parse_name_and_size(name).is_some() {
                    write!(f, "DOWNLOAD {name} {offset}")
                } else {
                    write!(f, "DOWNLOAD {name}")
                }
            }
            Command::UdpUpload { name, size } => write!(f, "UDP_UPLOAD {name} {size}"),
            Command::UdpDownload { name } => write!(f, "UDP_DOWNLOAD {name}"),
            Command::Ack { seq } => write!(f, "ACK {seq}"),
            Command::Echo(text) => write!(f, "ECHO {text}"),
            Command::Time => f.write_str("TIME"),
            Command::Close => f.write_str("CLOSE"),
            Command::Other(text) => f.write_str(text),
        }
    }
}

/// 업로드 인자: 마지막 토큰이 크기, 그 앞 전부가 이름 (공백 포함 가능)
fn parse_name_and_size(rest: &str) -> Option<(String, u64)> {
    let (name, size) = rest.rsplit_once(' ')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    let size = size.trim().parse().ok()?;
    Some((name.to_string(), size))
}

/// 다운로드 인자: 마지막 토큰이 숫자이고 앞에 이름이 있으면 오프셋
fn parse_name_and_offset(rest: &str) -> (String, u64) {
    match parse_name_and_size(rest) {
        Some((name, offset)) => (name, offset),
        None => (rest.to_string(), 0),
    }
}

fn usage(verb: &str) -> Error {
    let args = match verb {
        "UPLOAD" | "UDP_UPLOAD" => "<filename> <filesize>",
        _ => "<filename>",
    };
    Error::Protocol(format!("usage: {verb} {args}"))
}

/// 응답 한 줄 (끝 공백 제거됨)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    text: String,
}

impl Response {
    pub fn new(raw: &str) -> Self {
        Self {
            text: raw.trim_end().to_string(),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn into_text(self) -> String {
        self.text
    }

    /// `READY` 포함 여부
    pub fn is_ready(&self) -> bool {
        self.text.contains("READY")
    }

    /// 정확히 `READY`
    pub fn is_exact_ready(&self) -> bool {
        self.text == "READY"
    }

    /// `READY <size>` 에서 크기 추출
    ///
    /// READY 가 없으면 `ServerRejected`, 크기 파싱 실패는 `Protocol`
    pub fn ready_size(&self) -> Result<u64> {
        if !self.is_ready() {
            return Err(Error::ServerRejected(self.text.clone()));
        }

        self.text
            .strip_prefix("READY")
            .map(str::trim)
            .and_then(|size| size.parse().ok())
            .ok_or_else(|| Error::Protocol(format!("크기 필드 파싱 실패: {:?}", self.text)))
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}
