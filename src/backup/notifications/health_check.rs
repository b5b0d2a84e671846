use crate::backup::notifications::FailurePing;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::WithMsg;
use std::time::Duration;
use tracing::{info, warn};

const PING_TIMEOUT: Duration = Duration::from_secs(10);

/// A healthchecks.io style check: `GET <url>/fail` marks the check as failed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HealthCheck {
    url: String,
}

impl HealthCheck {
    pub fn new<S: Into<String>>(url: S) -> Self {
        Self { url: url.into() }
    }

    pub fn fail_url(&self) -> String {
        format!("{}/fail", self.url.trim_end_matches('/'))
    }
}

impl FailurePing for HealthCheck {
    fn ping_fail(&self) -> Result<()> {
        let url = self.fail_url();
        info!("Pinging health check {}", url);
        let response = reqwest::blocking::Client::builder()
            .timeout(PING_TIMEOUT)
            .build()
            .and_then(|client| client.get(&url).send())
            .map_err(Error::from)
            .with_msg(format!("Health check ping to {} failed", url))?;

        if !response.status().is_success() {
            warn!("Health check {} answered {}", url, response.status());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;

    #[test]
    fn test_fail_url() {
        assert_eq!(
            HealthCheck::new("https://hc-ping.com/abc/").fail_url(),
            "https://hc-ping.com/abc/fail"
        );
        assert_eq!(
            HealthCheck::new("https://hc-ping.com/abc").fail_url(),
            "https://hc-ping.com/abc/fail"
        );
    }

    #[test]
    fn test_ping_sends_get_to_fail_endpoint() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut request_line = String::new();
            reader.read_line(&mut request_line).unwrap();
            // drain headers so closing the socket does not reset the connection
            let mut header = String::new();
            while reader.read_line(&mut header).unwrap() > 0 && header != "\r\n" {
                header.clear();
            }
            stream
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: close\r\n\r\nOK")
                .unwrap();
            request_line
        });

        HealthCheck::new(format!("http://{}/check-uuid", addr))
            .ping_fail()
            .unwrap();

        let request_line = server.join().unwrap();
        assert!(request_line.starts_with("GET /check-uuid/fail HTTP/1.1"));
    }

    #[test]
    fn test_unreachable_endpoint_is_an_error() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        assert!(HealthCheck::new(format!("http://{}", addr)).ping_fail().is_err());
    }
}
