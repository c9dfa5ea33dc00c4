//! Connection establishment
//!
//! A refused connection means the server is not up yet: launch it and try
//! again with exponential backoff, up to the configured number of attempts.

use std::io;

use tokio::net::TcpStream;

use crate::common::config::RetryPolicy;
use crate::common::{Error, Result};

use super::launcher::DaemonLauncher;
use super::shutdown::ShutdownHandle;

/// Connect to the server at `host:port`, launching it on refusal
pub async fn connect(
    host: &str,
    port: u16,
    policy: RetryPolicy,
    launcher: &dyn DaemonLauncher,
    shutdown: &ShutdownHandle,
) -> Result<TcpStream> {
    tokio::select! {
        biased;
        _ = shutdown.closed() => Err(Error::Interrupted),
        result = connect_with_retry(host, port, policy, launcher) => result,
    }
}

async fn connect_with_retry(
    host: &str,
    port: u16,
    policy: RetryPolicy,
    launcher: &dyn DaemonLauncher,
) -> Result<TcpStream> {
    let mut attempt = 1;

    loop {
        let delay = policy.delay_before(attempt);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        tracing::debug!(host, port, attempt, "Connecting to groovyserver");
        match TcpStream::connect((host, port)).await {
            Ok(stream) => {
                tracing::debug!("Connected to groovyserver");
                return Ok(stream);
            }
            Err(e) if e.kind() == io::ErrorKind::ConnectionRefused => {
                if attempt >= policy.max_attempts {
                    return Err(Error::DaemonStartFailed { attempts: attempt });
                }
                tracing::debug!("Connection refused, ensuring groovyserver is running");
                launcher.ensure_daemon_running().await?;
                attempt += 1;
            }
            Err(e) => return Err(Error::ConnectionFailed(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::net::TcpListener;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
        }
    }

    /// Reserve a loopback port with nothing listening on it
    fn free_port() -> u16 {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    }

    /// Launcher that starts listening on the first launch
    struct BindingLauncher {
        port: u16,
        launches: AtomicU32,
        listener: Mutex<Option<std::net::TcpListener>>,
    }

    #[async_trait]
    impl DaemonLauncher for BindingLauncher {
        async fn ensure_daemon_running(&self) -> Result<()> {
            self.launches.fetch_add(1, Ordering::SeqCst);
            let mut listener = self.listener.lock().unwrap();
            if listener.is_none() {
                *listener = Some(std::net::TcpListener::bind(("127.0.0.1", self.port))?);
            }
            Ok(())
        }
    }

    /// Launcher that never manages to start anything
    #[derive(Default)]
    struct NoopLauncher {
        launches: AtomicU32,
    }

    #[async_trait]
    impl DaemonLauncher for NoopLauncher {
        async fn ensure_daemon_running(&self) -> Result<()> {
            self.launches.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FailingLauncher;

    #[async_trait]
    impl DaemonLauncher for FailingLauncher {
        async fn ensure_daemon_running(&self) -> Result<()> {
            Err(Error::DaemonLaunchFailed("boom".to_string()))
        }
    }

    #[tokio::test]
    async fn test_connects_without_launch_when_listening() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let launcher = NoopLauncher::default();

        connect("127.0.0.1", port, fast_policy(3), &launcher, &ShutdownHandle::new())
            .await
            .unwrap();
        assert_eq!(launcher.launches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_refused_then_launch_then_connect() {
        let port = free_port();
        let launcher = BindingLauncher {
            port,
            launches: AtomicU32::new(0),
            listener: Mutex::new(None),
        };

        let _stream = connect("127.0.0.1", port, fast_policy(3), &launcher, &ShutdownHandle::new())
            .await
            .unwrap();
        assert_eq!(launcher.launches.load(Ordering::SeqCst), 1);

        // Exactly one connection reached the server
        let guard = launcher.listener.lock().unwrap();
        let listener = guard.as_ref().unwrap();
        listener.set_nonblocking(true).unwrap();
        assert!(listener.accept().is_ok());
        let second = listener.accept().unwrap_err();
        assert_eq!(second.kind(), io::ErrorKind::WouldBlock);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let port = free_port();
        let launcher = NoopLauncher::default();

        let err = connect("127.0.0.1", port, fast_policy(4), &launcher, &ShutdownHandle::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DaemonStartFailed { attempts: 4 }));
        assert_eq!(launcher.launches.load(Ordering::SeqCst), 3);
    }

    /// Only launches that cannot run at all stop the retry
    #[tokio::test]
    async fn test_launch_error_is_fatal() {
        let port = free_port();
        let err = connect("127.0.0.1", port, fast_policy(4), &FailingLauncher, &ShutdownHandle::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DaemonLaunchFailed(_)));
    }

    #[tokio::test]
    async fn test_interrupted_while_retrying() {
        let port = free_port();
        let launcher = NoopLauncher::default();
        let shutdown = ShutdownHandle::new();
        shutdown.close();

        let policy = RetryPolicy {
            max_attempts: 100,
            initial_backoff: Duration::from_secs(10),
            max_backoff: Duration::from_secs(10),
        };
        let err = connect("127.0.0.1", port, policy, &launcher, &shutdown)
            .await
            .unwrap_err();
        assert!(err.is_interrupt());
    }
}
