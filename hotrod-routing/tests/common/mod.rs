use futures::FutureExt;
use hotrod_routing::cluster::{Router, ServerAddress, TcpConnectionManager};
use hotrod_routing::error::Result;
use hotrod_routing::transport::TransportTcp;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

pub type TcpRouter = Router<TransportTcp, TcpConnectionManager>;

/// Minimal in-process server. Answers every 1-byte request with its own id.
pub struct TestServer {
    address: ServerAddress,
    accept_task: JoinHandle<()>,
    connection_tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
    accepted: Arc<AtomicUsize>,
    served: Arc<AtomicUsize>,
}

impl TestServer {
    pub async fn start(id: u8) -> TestServer {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = ServerAddress::from(listener.local_addr().unwrap());

        let connection_tasks = Arc::new(Mutex::new(vec![]));
        let accepted = Arc::new(AtomicUsize::new(0));
        let served = Arc::new(AtomicUsize::new(0));

        let accept_task = tokio::spawn({
            let connection_tasks = connection_tasks.clone();
            let accepted = accepted.clone();
            let served = served.clone();

            async move {
                while let Ok((mut socket, _)) = listener.accept().await {
                    accepted.fetch_add(1, Ordering::SeqCst);

                    let served = served.clone();
                    let task = tokio::spawn(async move {
                        let mut request = [0u8; 1];
                        while socket.read_exact(&mut request).await.is_ok() {
                            if socket.write_all(&[id]).await.is_err() {
                                break;
                            }

                            served.fetch_add(1, Ordering::SeqCst);
                        }
                    });

                    connection_tasks.lock().unwrap().push(task);
                }
            }
        });

        TestServer {
            address,
            accept_task,
            connection_tasks,
            accepted,
            served,
        }
    }

    pub fn address(&self) -> ServerAddress {
        self.address.clone()
    }

    /// Number of accepted connections.
    #[allow(dead_code)]
    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    /// Number of answered requests.
    #[allow(dead_code)]
    pub fn served(&self) -> usize {
        self.served.load(Ordering::SeqCst)
    }

    /// Stops listening and closes all connections.
    pub async fn stop(self) {
        self.accept_task.abort();
        let _ = self.accept_task.await;

        let connection_tasks = std::mem::take(&mut *self.connection_tasks.lock().unwrap());
        for task in connection_tasks {
            task.abort();
            let _ = task.await;
        }
    }
}

/// Sends a single request and returns the id of the server which answered it.
pub async fn request(router: &TcpRouter) -> Result<u8> {
    router
        .execute(|transport| {
            async move {
                transport.write_all(&[0]).await?;

                let mut response = [0u8; 1];
                transport.read_exact(&mut response).await?;
                Ok(response[0])
            }
            .boxed()
        })
        .await
}
