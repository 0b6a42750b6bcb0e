use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::Duration;

/// Local stand-in for the forms download site.
///
/// Paths in `live` answer 200, paths in `head_rejected` answer 405 to HEAD
/// and 200 to GET, everything else is 404.
pub struct FormsStub {
    pub base_url: String,
    hits: Arc<Mutex<HashMap<String, usize>>>,
    shutdown_tx: Option<mpsc::Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl FormsStub {
    pub fn spawn(live: &[&str], head_rejected: &[&str]) -> Self {
        let server = tiny_http::Server::http("127.0.0.1:0").expect("start forms stub server");
        let base_url = format!("http://{}", server.server_addr());

        let live = live.iter().map(|p| (*p).to_owned()).collect::<HashSet<_>>();
        let head_rejected = head_rejected
            .iter()
            .map(|p| (*p).to_owned())
            .collect::<HashSet<_>>();
        let hits = Arc::new(Mutex::new(HashMap::<String, usize>::new()));
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let server_hits = Arc::clone(&hits);
        let handle = thread::spawn(move || {
            loop {
                if shutdown_rx.try_recv().is_ok() {
                    break;
                }

                let request = match server.recv_timeout(Duration::from_millis(50)) {
                    Ok(Some(req)) => req,
                    Ok(None) => continue,
                    Err(_) => break,
                };

                let path = request.url().to_string();
                *server_hits
                    .lock()
                    .expect("lock hits")
                    .entry(path.clone())
                    .or_default() += 1;

                let is_head = request.method() == &tiny_http::Method::Head;
                let status = if live.contains(&path) {
                    200
                } else if head_rejected.contains(&path) {
                    if is_head { 405 } else { 200 }
                } else {
                    404
                };

                let _ = request.respond(
                    tiny_http::Response::from_string("%PDF-1.4 stub").with_status_code(status),
                );
            }
        });

        Self {
            base_url,
            hits,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    /// Requests received for `path`, HEAD and GET combined.
    pub fn hits(&self, path: &str) -> usize {
        self.hits
            .lock()
            .expect("lock hits")
            .get(path)
            .copied()
            .unwrap_or(0)
    }
}

impl Drop for FormsStub {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
