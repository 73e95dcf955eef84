use std::thread;
use std::time::Duration;

use crate::progress::{ProgressRecord, RemoteSave, RemoteSaveError};

fn should_retry_http_status(status: u16) -> bool {
    status == 408 || status == 429 || (500..=599).contains(&status)
}

pub(crate) fn post_json_with_retries(
    url: &str,
    body: &str,
    connect_timeout: Duration,
    read_timeout: Duration,
    attempts: usize,
    retry_delay: Duration,
) -> Result<(), RemoteSaveError> {
    let attempts = attempts.max(1);
    let agent = ureq::AgentBuilder::new()
        .timeout_connect(connect_timeout)
        .timeout_read(read_timeout)
        .timeout_write(read_timeout)
        .build();

    for attempt in 1..=attempts {
        let request = agent
            .post(url)
            .set("Content-Type", "application/json")
            .set("Accept", "application/json");

        match request.send_string(body) {
            Ok(_) => return Ok(()),
            Err(ureq::Error::Status(status, response)) => {
                if should_retry_http_status(status) && attempt < attempts {
                    thread::sleep(retry_delay);
                    continue;
                }
                let response_body = response.into_string().ok().unwrap_or_default();
                let body = response_body.trim().chars().take(240).collect::<String>();
                return Err(RemoteSaveError::Status { status, body });
            }
            Err(ureq::Error::Transport(err)) => {
                if attempt < attempts {
                    thread::sleep(retry_delay);
                    continue;
                }
                return Err(RemoteSaveError::Transport(format!(
                    "failed after {attempts} attempt(s): {err}"
                )));
            }
        }
    }

    Err(RemoteSaveError::Transport(
        "exhausted attempts without a concrete error".to_string(),
    ))
}

/// POSTs each record as JSON to `<base>/api/progress`.
#[derive(Debug, Clone)]
pub(crate) struct HttpProgressSink {
    endpoint: String,
    connect_timeout: Duration,
    read_timeout: Duration,
    attempts: usize,
    retry_delay: Duration,
}

impl HttpProgressSink {
    pub(crate) fn new(base_url: &str) -> Self {
        Self {
            endpoint: format!("{}/api/progress", base_url.trim_end_matches('/')),
            connect_timeout: Duration::from_secs(3),
            read_timeout: Duration::from_secs(6),
            attempts: 3,
            retry_delay: Duration::from_millis(500),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_retry(mut self, attempts: usize, retry_delay: Duration) -> Self {
        self.attempts = attempts;
        self.retry_delay = retry_delay;
        self
    }

    #[cfg(test)]
    pub(crate) fn with_timeouts(mut self, connect: Duration, read: Duration) -> Self {
        self.connect_timeout = connect;
        self.read_timeout = read;
        self
    }

    #[cfg(test)]
    pub(crate) fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl RemoteSave for HttpProgressSink {
    fn save(&self, record: &ProgressRecord) -> Result<(), RemoteSaveError> {
        let body = serde_json::to_string(record)?;
        post_json_with_retries(
            &self.endpoint,
            &body,
            self.connect_timeout,
            self.read_timeout,
            self.attempts,
            self.retry_delay,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::sample_record;
    use std::collections::VecDeque;
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::sync::mpsc;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone)]
    enum Behavior {
        Respond(u16),
        DelayRespond(Duration, u16),
    }

    #[derive(Debug)]
    struct TestServer {
        base_url: String,
        requests: Arc<Mutex<Vec<String>>>,
        shutdown_tx: mpsc::Sender<()>,
        join_handle: Option<std::thread::JoinHandle<()>>,
    }

    impl TestServer {
        fn spawn(behaviors: Vec<Behavior>) -> Self {
            let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind test server");
            listener.set_nonblocking(true).expect("set nonblocking");
            let addr = listener.local_addr().expect("local addr");

            let requests = Arc::new(Mutex::new(Vec::new()));
            let requests_clone = Arc::clone(&requests);
            let shared_behaviors = Arc::new(Mutex::new(VecDeque::from(behaviors)));
            let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

            let join_handle = std::thread::spawn(move || {
                loop {
                    if shutdown_rx.try_recv().is_ok() {
                        break;
                    }

                    match listener.accept() {
                        Ok((mut stream, _)) => {
                            let behavior = {
                                let mut queue = shared_behaviors.lock().expect("lock behaviors");
                                queue.pop_front().unwrap_or(Behavior::Respond(200))
                            };
                            let requests = Arc::clone(&requests_clone);
                            std::thread::spawn(move || {
                                let raw = read_request(&mut stream).unwrap_or_default();
                                requests.lock().expect("lock requests").push(raw);
                                serve_behavior(&mut stream, behavior);
                            });
                        }
                        Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                            std::thread::sleep(Duration::from_millis(5));
                        }
                        Err(_) => break,
                    }
                }
            });

            Self {
                base_url: format!("http://{addr}"),
                requests,
                shutdown_tx,
                join_handle: Some(join_handle),
            }
        }

        fn request_count(&self) -> usize {
            self.requests.lock().expect("lock requests").len()
        }

        fn requests(&self) -> Vec<String> {
            self.requests.lock().expect("lock requests").clone()
        }
    }

    impl Drop for TestServer {
        fn drop(&mut self) {
            let _ = self.shutdown_tx.send(());
            if let Some(handle) = self.join_handle.take() {
                let _ = handle.join();
            }
        }
    }

    fn read_request(stream: &mut TcpStream) -> std::io::Result<String> {
        stream.set_read_timeout(Some(Duration::from_millis(200)))?;
        let mut buf = [0_u8; 1024];
        let mut data = Vec::new();
        loop {
            match stream.read(&mut buf) {
                Ok(0) => break,
                Ok(read) => {
                    data.extend_from_slice(&buf[..read]);
                    if request_complete(&data) {
                        break;
                    }
                }
                Err(err)
                    if err.kind() == std::io::ErrorKind::WouldBlock
                        || err.kind() == std::io::ErrorKind::TimedOut =>
                {
                    break;
                }
                Err(err) => return Err(err),
            }
        }
        Ok(String::from_utf8_lossy(&data).into_owned())
    }

    fn request_complete(data: &[u8]) -> bool {
        let Some(header_end) = data.windows(4).position(|window| window == b"\r\n\r\n") else {
            return false;
        };
        let headers = String::from_utf8_lossy(&data[..header_end]).to_ascii_lowercase();
        let content_length = headers
            .lines()
            .find_map(|line| line.strip_prefix("content-length:"))
            .and_then(|value| value.trim().parse::<usize>().ok())
            .unwrap_or(0);
        data.len() >= header_end + 4 + content_length
    }

    fn reason_phrase(status: u16) -> &'static str {
        match status {
            200 => "OK",
            201 => "Created",
            400 => "Bad Request",
            404 => "Not Found",
            429 => "Too Many Requests",
            500 => "Internal Server Error",
            503 => "Service Unavailable",
            _ => "Status",
        }
    }

    fn serve_behavior(stream: &mut TcpStream, behavior: Behavior) {
        match behavior {
            Behavior::Respond(status) => {
                let _ = write_response(stream, status);
            }
            Behavior::DelayRespond(delay, status) => {
                std::thread::sleep(delay);
                let _ = write_response(stream, status);
            }
        }
    }

    fn write_response(stream: &mut TcpStream, status: u16) -> std::io::Result<()> {
        let reason = reason_phrase(status);
        let payload = reason.as_bytes();
        write!(
            stream,
            "HTTP/1.1 {status} {reason}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            payload.len()
        )?;
        stream.write_all(payload)?;
        stream.flush()
    }

    fn sink(server: &TestServer, attempts: usize) -> HttpProgressSink {
        HttpProgressSink::new(&server.base_url)
            .with_retry(attempts, Duration::from_millis(1))
            .with_timeouts(Duration::from_millis(200), Duration::from_millis(200))
    }

    #[test]
    fn posts_record_json_to_progress_endpoint() {
        let server = TestServer::spawn(vec![Behavior::Respond(201)]);
        let record = sample_record(1078605, None, 42.0, 7);

        sink(&server, 1).save(&record).expect("save should succeed");

        let requests = server.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].starts_with("POST /api/progress "));
        assert!(requests[0].contains("\"id\":\"movie_1078605\""));
        assert!(requests[0].contains("\"tmdbId\":1078605"));
    }

    #[test]
    fn endpoint_ignores_trailing_slash() {
        let sink = HttpProgressSink::new("https://example.test/");
        assert_eq!(sink.endpoint(), "https://example.test/api/progress");
    }

    #[test]
    fn retries_retryable_statuses_until_success() {
        let server = TestServer::spawn(vec![
            Behavior::Respond(500),
            Behavior::Respond(429),
            Behavior::Respond(200),
        ]);

        sink(&server, 3)
            .save(&sample_record(1, None, 10.0, 1))
            .expect("should eventually succeed");

        assert_eq!(server.request_count(), 3);
    }

    #[test]
    fn does_not_retry_hard_client_errors() {
        let server = TestServer::spawn(vec![Behavior::Respond(400)]);

        let err = sink(&server, 5)
            .save(&sample_record(1, None, 10.0, 1))
            .expect_err("400 should not be retried");

        assert!(matches!(err, RemoteSaveError::Status { status: 400, .. }));
        assert_eq!(server.request_count(), 1);
    }

    #[test]
    fn retries_transport_timeout_and_recovers() {
        let server = TestServer::spawn(vec![
            Behavior::DelayRespond(Duration::from_millis(120), 200),
            Behavior::Respond(200),
        ]);
        let sink = HttpProgressSink::new(&server.base_url)
            .with_retry(2, Duration::from_millis(1))
            .with_timeouts(Duration::from_millis(250), Duration::from_millis(20));

        sink.save(&sample_record(1, None, 10.0, 1))
            .expect("timeout should be retried");

        assert_eq!(server.request_count(), 2);
    }

    #[test]
    fn reports_last_status_after_exhausting_retries() {
        let server = TestServer::spawn(vec![Behavior::Respond(503), Behavior::Respond(503)]);

        let err = sink(&server, 2)
            .save(&sample_record(1, None, 10.0, 1))
            .expect_err("retryable failures should eventually error");

        assert!(matches!(err, RemoteSaveError::Status { status: 503, .. }));
        assert_eq!(server.request_count(), 2);
    }
}
