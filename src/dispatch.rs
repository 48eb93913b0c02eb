//! Paced fan-out of one command to every server of a group.
//!
//! Requests are launched in server order, one tokio task per server, with
//! the pacing interval slept between launches. Tasks run concurrently and
//! may finish in any order. A round is over only when every task has
//! reported its outcome.

use std::sync::Arc;
use std::time::Duration;

use futures::future::{join, join_all};

use crate::group::Server;
use crate::report::Reporter;
use crate::transport::{DispatchOutcome, Transport};

/// The outcome of one server's request, tied back to its server.
#[derive(Debug, Clone)]
pub struct ServerResult {
    pub server: Server,
    pub url: String,
    pub outcome: DispatchOutcome,
}

/// Results of one fan-out round, in server-list order.
#[derive(Debug, Clone)]
pub struct RoundReport {
    pub command: String,
    pub results: Vec<ServerResult>,
}

impl RoundReport {
    pub fn failures(&self) -> usize {
        self.results.iter().filter(|r| r.outcome.is_failure()).count()
    }
}

/// Message sent from a request task when its outcome is known.
#[derive(Debug)]
struct Completion {
    /// Index of the server in the round's server list.
    index: usize,
    outcome: DispatchOutcome,
}

pub struct Dispatcher {
    transport: Arc<dyn Transport>,
    reporter: Arc<dyn Reporter>,
}

impl Dispatcher {
    pub fn new(transport: Arc<dyn Transport>, reporter: Arc<dyn Reporter>) -> Self {
        Self {
            transport,
            reporter,
        }
    }

    pub fn reporter(&self) -> &dyn Reporter {
        self.reporter.as_ref()
    }

    /// Sends `command` to every server and waits for all outcomes.
    ///
    /// `pacing` separates consecutive launches, not completions. There is no
    /// sleep after the last launch. Results are reported as they arrive.
    pub async fn dispatch(&self, servers: &[Server], command: &str, pacing: Duration) -> RoundReport {
        let num_servers = servers.len();
        if num_servers == 0 {
            return RoundReport {
                command: command.to_string(),
                results: vec![],
            };
        }

        // Every task sends exactly one completion, so the channel never blocks.
        let (done_tx, done_rx) = flume::bounded::<Completion>(num_servers);

        let launch = async {
            let mut tasks = Vec::with_capacity(num_servers);
            for (index, server) in servers.iter().enumerate() {
                if index > 0 && !pacing.is_zero() {
                    tokio::time::sleep(pacing).await;
                }
                tasks.push(spawn_request(
                    Arc::clone(&self.transport),
                    index,
                    server.command_url(command),
                    done_tx.clone(),
                ));
            }
            // The channel closes once the last task drops its sender.
            drop(done_tx);
            tasks
        };

        let collect = async {
            let mut outcomes: Vec<Option<DispatchOutcome>> = (0..num_servers).map(|_| None).collect();
            while let Ok(Completion { index, outcome }) = done_rx.recv_async().await {
                self.report(&servers[index], command, &outcome);
                outcomes[index] = Some(outcome);
            }
            outcomes
        };

        let (tasks, outcomes) = join(launch, collect).await;
        for joined in join_all(tasks).await {
            if let Err(e) = joined {
                tracing::error!("Request task failed: {}", e);
            }
        }

        let results = servers
            .iter()
            .zip(outcomes)
            .map(|(server, outcome)| {
                let outcome = outcome.unwrap_or_else(|| {
                    // The task died before reporting. It still counts as one outcome.
                    let outcome = DispatchOutcome::TransportError("request task aborted".to_string());
                    self.report(server, command, &outcome);
                    outcome
                });
                ServerResult {
                    server: server.clone(),
                    url: server.command_url(command),
                    outcome,
                }
            })
            .collect();

        RoundReport {
            command: command.to_string(),
            results,
        }
    }

    fn report(&self, server: &Server, command: &str, outcome: &DispatchOutcome) {
        self.reporter.server_result(&ServerResult {
            server: server.clone(),
            url: server.command_url(command),
            outcome: outcome.clone(),
        });
    }
}

/// Spawns an async task that fetches `url` and sends its outcome back.
fn spawn_request(
    transport: Arc<dyn Transport>,
    index: usize,
    url: String,
    done_tx: flume::Sender<Completion>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let outcome = transport.fetch(&url).await;
        let _ = done_tx.send_async(Completion { index, outcome }).await;
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Instant;

    use async_trait::async_trait;
    use reqwest::StatusCode;
    use tokio::sync::Mutex;

    /// Answers `http://slow*` servers after 100ms, fails `http://fail`,
    /// panics on `http://panic` and answers the rest at once.
    /// Records when each request started.
    struct FakeTransport {
        started: Mutex<Vec<(String, Instant)>>,
    }

    #[async_trait]
    impl Transport for FakeTransport {
        async fn fetch(&self, url: &str) -> DispatchOutcome {
            self.started.lock().await.push((url.to_string(), Instant::now()));
            if url.starts_with("http://slow") {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
            if url.starts_with("http://fail") {
                return DispatchOutcome::TransportError("connection refused".into());
            }
            if url.starts_with("http://panic") {
                panic!("transport blew up");
            }
            DispatchOutcome::Success {
                status: StatusCode::OK,
                body: url.to_string(),
            }
        }
    }

    #[derive(Default)]
    struct CollectingReporter {
        seen: std::sync::Mutex<Vec<String>>,
    }

    impl Reporter for CollectingReporter {
        fn round_started(&self, _user: &str, _command: &str) {}

        fn server_result(&self, result: &ServerResult) {
            self.seen.lock().unwrap().push(result.server.base_url.clone());
        }
    }

    fn setup() -> (Dispatcher, Arc<FakeTransport>, Arc<CollectingReporter>) {
        let transport = Arc::new(FakeTransport {
            started: Mutex::new(vec![]),
        });
        let reporter = Arc::new(CollectingReporter::default());
        let dispatcher = Dispatcher::new(transport.clone(), reporter.clone());
        (dispatcher, transport, reporter)
    }

    fn servers(urls: &[&str]) -> Vec<Server> {
        urls.iter().map(|url| Server::new(url)).collect()
    }

    #[tokio::test]
    async fn test_empty_server_list() {
        let (dispatcher, transport, reporter) = setup();
        let report = dispatcher.dispatch(&[], "/ping", Duration::from_secs(10)).await;
        assert!(report.results.is_empty());
        assert!(transport.started.lock().await.is_empty());
        assert!(reporter.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_one_outcome_per_server_despite_failures() {
        let (dispatcher, _, reporter) = setup();
        let servers = servers(&["http://a", "http://fail", "http://panic", "http://b"]);
        let report = dispatcher.dispatch(&servers, "/ping", Duration::ZERO).await;

        assert_eq!(report.results.len(), 4);
        assert_eq!(report.failures(), 2);
        assert_eq!(report.results[0].url, "http://a/ping");
        assert!(!report.results[0].outcome.is_failure());
        assert!(matches!(report.results[1].outcome, DispatchOutcome::TransportError(_)));
        assert!(matches!(report.results[2].outcome, DispatchOutcome::TransportError(_)));
        assert_eq!(
            report.results[3].outcome,
            DispatchOutcome::Success {
                status: StatusCode::OK,
                body: "http://b/ping".into(),
            }
        );
        assert_eq!(reporter.seen.lock().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_results_reported_in_completion_order() {
        let (dispatcher, _, reporter) = setup();
        let servers = servers(&["http://slow", "http://fast"]);
        let report = dispatcher.dispatch(&servers, "/ping", Duration::ZERO).await;

        // The report keeps server order, the reporter sees completion order.
        assert_eq!(report.results[0].server.base_url, "http://slow");
        assert_eq!(*reporter.seen.lock().unwrap(), vec!["http://fast", "http://slow"]);
    }

    #[tokio::test]
    async fn test_pacing_spaces_launches_not_completions() {
        let (dispatcher, transport, _) = setup();
        let pacing = Duration::from_millis(50);
        let servers = servers(&["http://slow", "http://a", "http://b"]);
        let start = Instant::now();
        dispatcher.dispatch(&servers, "/ping", pacing).await;
        let elapsed = start.elapsed();

        let started = transport.started.lock().await;
        assert_eq!(started.len(), 3);
        // A few ms of slack for when each task first gets polled.
        for pair in started.windows(2) {
            assert!(pair[1].1.duration_since(pair[0].1) >= pacing - Duration::from_millis(5));
        }
        // The slow server's 100ms overlaps the pacing sleeps, and there is no
        // trailing sleep: two gaps of 50ms, not three.
        assert!(elapsed < Duration::from_millis(100) + pacing * 3);
    }

    #[tokio::test]
    async fn test_zero_pacing_launches_everything_at_once() {
        let (dispatcher, transport, _) = setup();
        let servers = servers(&["http://slow", "http://slow2", "http://slow3"]);
        let start = Instant::now();
        dispatcher.dispatch(&servers, "/ping", Duration::ZERO).await;

        // Three 100ms requests running concurrently.
        assert!(start.elapsed() < Duration::from_millis(250));
        let started = transport.started.lock().await;
        let first = started[0].1;
        assert!(started.iter().all(|(_, at)| at.duration_since(first) < Duration::from_millis(50)));
    }
}
