//! Quartz router TCP client
//!
//! One connection per command: connect, write `cmd\r\n`, read until `\r\n`
//! (or EOF / read timeout), close.

use super::reply;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

/// Default Quartz control port
pub const DEFAULT_PORT: u16 = 6543;
/// Default connect/read timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

const MAX_REPLY_BYTES: usize = 4096;

/// Line-protocol router device
///
/// On this firmware the name verbs are swapped: true source (input) names
/// come from [`RouterDevice::read_output_name`].
#[async_trait]
pub trait RouterDevice: Send + Sync {
    /// `.RD{n}`
    async fn read_input_name(&self, n: u32) -> Result<String>;

    /// `.RS{n}`
    async fn read_output_name(&self, n: u32) -> Result<String>;

    /// `.IV{output}`; `None` when the output has no assignment
    async fn read_routing(&self, output: u32) -> Result<Option<u32>>;

    /// `.SV{output},{input}`
    async fn switch(&self, output: u32, input: u32) -> Result<()>;
}

/// TCP client for one Quartz router
#[derive(Debug, Clone)]
pub struct QuartzClient {
    host: String,
    port: u16,
    timeout: Duration,
}

impl QuartzClient {
    pub fn new(host: impl Into<String>, port: u16, timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            timeout,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Send one command and return the reply line (trimmed)
    pub async fn send(&self, command: &str) -> Result<String> {
        let addr = format!("{}:{}", self.host, self.port);

        let mut stream = match timeout(self.timeout, TcpStream::connect(&addr)).await {
            Ok(Ok(s)) => s,
            Ok(Err(e)) => {
                return Err(Error::Transport(format!("Quartz connect to {} failed: {}", addr, e)))
            }
            Err(_) => return Err(Error::Transport(format!("Quartz connect to {} timed out", addr))),
        };

        let line = format!("{}\r\n", command);
        match timeout(self.timeout, stream.write_all(line.as_bytes())).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(Error::Transport(format!("Quartz write failed: {}", e))),
            Err(_) => return Err(Error::Transport("Quartz write timed out".to_string())),
        }

        let mut data = Vec::with_capacity(128);
        let mut buf = [0u8; 1024];
        loop {
            match timeout(self.timeout, stream.read(&mut buf)).await {
                Ok(Ok(0)) => break,
                Ok(Ok(n)) => {
                    data.extend_from_slice(&buf[..n]);
                    if data.windows(2).any(|w| w == b"\r\n") || data.len() >= MAX_REPLY_BYTES {
                        break;
                    }
                }
                Ok(Err(e)) => return Err(Error::Transport(format!("Quartz read failed: {}", e))),
                // Partial replies are accepted on read timeout
                Err(_) if !data.is_empty() => break,
                Err(_) => {
                    return Err(Error::Transport(format!(
                        "No reply from {} to {:?}",
                        addr, command
                    )))
                }
            }
        }

        let reply = String::from_utf8_lossy(&data).trim().to_string();
        debug!(command = %command, reply = %reply, "Quartz exchange");
        Ok(reply)
    }
}

#[async_trait]
impl RouterDevice for QuartzClient {
    async fn read_input_name(&self, n: u32) -> Result<String> {
        let line = self.send(&format!(".RD{}", n)).await?;
        reply::parse_name(&line, &format!("input {}", n))
    }

    async fn read_output_name(&self, n: u32) -> Result<String> {
        let line = self.send(&format!(".RS{}", n)).await?;
        reply::parse_name(&line, &format!("output {}", n))
    }

    async fn read_routing(&self, output: u32) -> Result<Option<u32>> {
        let line = self.send(&format!(".IV{}", output)).await?;
        reply::parse_routing(&line, output)
    }

    async fn switch(&self, output: u32, input: u32) -> Result<()> {
        let line = self.send(&format!(".SV{},{}", output, input)).await?;
        reply::parse_switch(&line, output, input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, BufReader};
    use tokio::net::TcpListener;

    /// Fake router: answers each connection's single command line
    async fn spawn_fake() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            loop {
                let (socket, _) = match listener.accept().await {
                    Ok(s) => s,
                    Err(_) => return,
                };
                tokio::spawn(async move {
                    let (read, mut write) = socket.into_split();
                    let mut lines = BufReader::new(read).lines();
                    let Ok(Some(cmd)) = lines.next_line().await else {
                        return;
                    };
                    let reply = match cmd.as_str() {
                        ".RD1" => ".RAD1,OUT A".to_string(),
                        ".RS1" => ".RAS1,CAM 1".to_string(),
                        ".RS2" => ".E".to_string(),
                        ".IV5" => ".AV5,17".to_string(),
                        ".IV6" => ".AV6".to_string(),
                        ".SV7,3" => ".UV7,3".to_string(),
                        ".SV8,3" => ".BV8".to_string(),
                        ".SV9,3" => ".E".to_string(),
                        // Silent: never answers
                        ".RS99" => {
                            tokio::time::sleep(Duration::from_secs(5)).await;
                            return;
                        }
                        other => format!(".E{}", other),
                    };
                    let _ = write.write_all(format!("{}\r\n", reply).as_bytes()).await;
                });
            }
        });

        port
    }

    fn client(port: u16) -> QuartzClient {
        QuartzClient::new("127.0.0.1", port, Duration::from_millis(300))
    }

    #[tokio::test]
    async fn test_name_reads() {
        let port = spawn_fake().await;
        let c = client(port);
        assert_eq!(c.read_input_name(1).await.unwrap(), "OUT A");
        assert_eq!(c.read_output_name(1).await.unwrap(), "CAM 1");
        assert!(matches!(c.read_output_name(2).await, Err(Error::Protocol(_))));
    }

    #[tokio::test]
    async fn test_routing_reads() {
        let port = spawn_fake().await;
        let c = client(port);
        assert_eq!(c.read_routing(5).await.unwrap(), Some(17));
        assert_eq!(c.read_routing(6).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_switch_outcomes() {
        let port = spawn_fake().await;
        let c = client(port);
        assert!(c.switch(7, 3).await.is_ok());
        assert!(matches!(c.switch(8, 3).await, Err(Error::OutputLocked { output: 8 })));
        assert!(matches!(c.switch(9, 3).await, Err(Error::Protocol(_))));
    }

    #[tokio::test]
    async fn test_silent_device_times_out() {
        let port = spawn_fake().await;
        let err = client(port).read_output_name(99).await.unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
    }

    #[tokio::test]
    async fn test_refused_connection_is_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let err = client(port).read_input_name(1).await.unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
    }
}
