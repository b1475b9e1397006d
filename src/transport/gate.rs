use std::time::Duration;

use crate::error::{transport_timed_out, ActuationError};

use super::Actuator;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration for an HTTP gate endpoint.
#[derive(Clone, Debug)]
pub struct GateConfig {
    /// Trigger URL; receives an empty POST.
    pub url: String,
    pub timeout: Duration,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            url: "http://192.168.4.1/gate".to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct GateStats {
    pub commands_sent: u64,
    pub failures: u64,
    /// Commands that reached the device but got a non-success status.
    pub rejected: u64,
}

/// Gate driven by an empty HTTP POST.
pub struct HttpGate {
    config: GateConfig,
    agent: ureq::Agent,
    stats: GateStats,
}

impl HttpGate {
    pub fn new(config: GateConfig) -> anyhow::Result<Self> {
        if config.timeout.is_zero() {
            anyhow::bail!("gate timeout must be greater than zero");
        }
        let agent = ureq::AgentBuilder::new().timeout(config.timeout).build();
        Ok(Self {
            config,
            agent,
            stats: GateStats::default(),
        })
    }

    pub fn stats(&self) -> GateStats {
        self.stats.clone()
    }
}

impl Actuator for HttpGate {
    fn describe(&self) -> String {
        format!("http:{}", self.config.url)
    }

    fn trigger(&mut self) -> Result<(), ActuationError> {
        let url = &self.config.url;
        match self.agent.post(url).call() {
            Ok(_) => {
                self.stats.commands_sent += 1;
                Ok(())
            }
            // The device answered; the status is not part of the contract.
            Err(ureq::Error::Status(code, _)) => {
                self.stats.commands_sent += 1;
                self.stats.rejected += 1;
                log::debug!("gate {} answered with status {}", url, code);
                Ok(())
            }
            Err(ureq::Error::Transport(transport)) => {
                self.stats.failures += 1;
                if transport_timed_out(&transport) {
                    return Err(ActuationError::Timeout { url: url.clone() });
                }
                Err(ActuationError::Transport {
                    url: url.clone(),
                    message: transport.to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::sync::mpsc;

    fn gate_server(status: &'static str) -> (String, mpsc::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                let mut request = [0u8; 2048];
                let read = stream.read(&mut request).unwrap_or(0);
                let _ = tx.send(String::from_utf8_lossy(&request[..read]).to_string());
                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                    status
                );
                let _ = stream.write_all(response.as_bytes());
            }
        });
        (format!("http://{}/gate", addr), rx)
    }

    fn gate(url: String, timeout: Duration) -> HttpGate {
        HttpGate::new(GateConfig { url, timeout }).expect("gate")
    }

    #[test]
    fn trigger_sends_empty_post() {
        let (url, requests) = gate_server("200 OK");
        let mut gate = gate(url, Duration::from_secs(2));

        gate.trigger().expect("trigger");

        let request = requests.recv().expect("request");
        assert!(request.starts_with("POST /gate HTTP/1.1"));
        assert_eq!(gate.stats().commands_sent, 1);
    }

    #[test]
    fn error_status_is_not_an_actuation_failure() {
        let (url, _requests) = gate_server("500 Internal Server Error");
        let mut gate = gate(url, Duration::from_secs(2));

        gate.trigger().expect("status is not interpreted");
        assert_eq!(gate.stats().rejected, 1);
    }

    #[test]
    fn unreachable_gate_is_an_actuation_error() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        drop(listener);

        let mut gate = gate(format!("http://{}/gate", addr), Duration::from_secs(2));
        assert!(gate.trigger().is_err());
        assert_eq!(gate.stats().failures, 1);
    }

    #[test]
    fn silent_gate_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        std::thread::spawn(move || {
            if let Ok((stream, _)) = listener.accept() {
                std::thread::sleep(Duration::from_secs(2));
                drop(stream);
            }
        });

        let mut gate = gate(format!("http://{}/gate", addr), Duration::from_millis(200));
        let started = std::time::Instant::now();
        assert!(gate.trigger().is_err());
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(gate.stats().failures, 1);
    }
}
