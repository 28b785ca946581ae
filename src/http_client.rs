//! Shared HTTP client setup and bounded response helpers.

use std::io::{self, Read, Write};
use std::sync::OnceLock;
use std::time::Duration;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const READ_TIMEOUT: Duration = Duration::from_secs(30);
const WRITE_TIMEOUT: Duration = Duration::from_secs(30);

/// Retry settings for network operations with exponential backoff.
#[derive(Clone, Copy, Debug)]
pub(crate) struct RetryConfig {
    /// Maximum number of attempts, including the first try.
    pub max_attempts: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(2),
        }
    }
}

/// Shared agent for the download backend.
pub(crate) fn agent() -> &'static ureq::Agent {
    static AGENT: OnceLock<ureq::Agent> = OnceLock::new();
    AGENT.get_or_init(|| agent_with_timeout(READ_TIMEOUT))
}

/// Agent for a single upstream API with its own read budget.
pub(crate) fn agent_with_timeout(read_timeout: Duration) -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout_connect(CONNECT_TIMEOUT)
        .timeout_read(read_timeout)
        .timeout_write(WRITE_TIMEOUT)
        .build()
}

/// Transport failures are worth another try, HTTP statuses are answers.
pub(crate) fn is_transport_error(err: &ureq::Error) -> bool {
    matches!(err, ureq::Error::Transport(_))
}

pub(crate) fn retry_with_backoff<T, E, F, R>(
    config: RetryConfig,
    mut action: F,
    mut should_retry: R,
) -> Result<T, E>
where
    F: FnMut() -> Result<T, E>,
    R: FnMut(&E) -> bool,
{
    let mut attempt = 0usize;
    loop {
        attempt += 1;
        match action() {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt >= config.max_attempts || !should_retry(&err) {
                    return Err(err);
                }
                std::thread::sleep(backoff_delay(config.base_delay, config.max_delay, attempt));
            }
        }
    }
}

/// Read a response into memory, enforcing a maximum byte size.
pub(crate) fn read_response_bytes(
    response: ureq::Response,
    max_bytes: usize,
) -> Result<Vec<u8>, io::Error> {
    check_content_length(&response, max_bytes as u64)?;
    let mut limited = response.into_reader().take(max_bytes as u64 + 1);
    let mut bytes = Vec::new();
    limited.read_to_end(&mut bytes)?;
    if bytes.len() > max_bytes {
        return Err(too_large(format!("response exceeded {max_bytes} bytes")));
    }
    Ok(bytes)
}

/// Stream a response to `writer`, enforcing a maximum byte size. Returns the
/// number of bytes written.
pub(crate) fn copy_response_to_writer(
    response: ureq::Response,
    writer: &mut impl Write,
    max_bytes: u64,
) -> Result<u64, io::Error> {
    check_content_length(&response, max_bytes)?;
    let mut limited = response.into_reader().take(max_bytes + 1);
    let mut total = 0u64;
    let mut buf = [0u8; 64 * 1024];
    loop {
        let read = limited.read(&mut buf)?;
        if read == 0 {
            break;
        }
        total += read as u64;
        if total > max_bytes {
            return Err(too_large(format!("response exceeded {max_bytes} bytes")));
        }
        writer.write_all(&buf[..read])?;
    }
    Ok(total)
}

fn check_content_length(response: &ureq::Response, max_bytes: u64) -> Result<(), io::Error> {
    let Some(length) = response.header("Content-Length") else {
        return Ok(());
    };
    let Ok(length) = length.parse::<u64>() else {
        return Ok(());
    };
    if length > max_bytes {
        return Err(too_large(format!("response too large: {length} bytes")));
    }
    Ok(())
}

fn too_large(message: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message)
}

fn backoff_delay(base: Duration, max: Duration, attempt: usize) -> Duration {
    let exponent = u32::try_from(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
    let factor = 1u32.checked_shl(exponent).unwrap_or(u32::MAX);
    base.checked_mul(factor).unwrap_or(max).min(max)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    /// Answers exactly one request with the raw `response`, returns the base url.
    pub(crate) fn serve_once(response: String) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                let mut buf = [0u8; 4096];
                let _ = stream.read(&mut buf);
                let _ = stream.write_all(response.as_bytes());
            }
        });
        format!("http://{addr}")
    }

    pub(crate) fn http_response(status: &str, content_type: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {status}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        )
    }

    #[test]
    fn read_response_bytes_rejects_content_length_over_max() {
        let url = serve_once("HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\nok".to_string());
        let response = agent().get(&url).call().unwrap();
        let err = read_response_bytes(response, 10).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn copy_response_rejects_body_over_max() {
        let body = "a".repeat(32);
        let url = serve_once(format!("HTTP/1.0 200 OK\r\n\r\n{body}"));
        let response = agent().get(&url).call().unwrap();
        let mut sink = Vec::new();
        let err = copy_response_to_writer(response, &mut sink, 16).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn copy_response_streams_body_under_limit() {
        let url = serve_once(http_response("200 OK", "audio/mpeg", "ID3data"));
        let response = agent().get(&url).call().unwrap();
        let mut sink = Vec::new();
        let written = copy_response_to_writer(response, &mut sink, 1024).unwrap();
        assert_eq!(written, 7);
        assert_eq!(sink, b"ID3data");
    }

    #[test]
    fn retry_with_backoff_stops_after_success() {
        let mut attempts = 0usize;
        let config = RetryConfig {
            max_attempts: 4,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        };
        let result: Result<u32, &'static str> = retry_with_backoff(
            config,
            || {
                attempts += 1;
                if attempts < 3 { Err("fail") } else { Ok(7) }
            },
            |_| true,
        );
        assert_eq!(result, Ok(7));
        assert_eq!(attempts, 3);
    }

    #[test]
    fn retry_with_backoff_honors_should_retry() {
        let mut attempts = 0usize;
        let config = RetryConfig {
            max_attempts: 3,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        };
        let result: Result<u32, &'static str> = retry_with_backoff(
            config,
            || {
                attempts += 1;
                Err("fail")
            },
            |_| false,
        );
        assert_eq!(result, Err("fail"));
        assert_eq!(attempts, 1);
    }

    #[test]
    fn backoff_is_capped() {
        let base = Duration::from_millis(100);
        let max = Duration::from_millis(350);
        assert_eq!(backoff_delay(base, max, 1), Duration::from_millis(100));
        assert_eq!(backoff_delay(base, max, 2), Duration::from_millis(200));
        assert_eq!(backoff_delay(base, max, 3), max);
        assert_eq!(backoff_delay(base, max, 64), max);
    }
}
