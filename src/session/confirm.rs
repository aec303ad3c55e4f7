use crate::error::Result;
use async_trait::async_trait;
use std::io::{self, BufRead, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use tokio::sync::oneshot;

/// Single-shot "operator is ready" signal the login flow blocks on.
#[async_trait]
pub trait ConfirmationSignal: Send + Sync {
    async fn wait(&self, prompt: &str) -> Result<()>;
}

/// Prints the prompt and waits for ENTER on stdin. No timeout.
pub struct StdinConfirmation;

#[async_trait]
impl ConfirmationSignal for StdinConfirmation {
    async fn wait(&self, prompt: &str) -> Result<()> {
        wait_for_line(prompt, || io::stdin().lock()).await
    }
}

/// Print `prompt` and resolve once `open()` yields a line (or EOF).
///
/// The read runs on a detached thread rather than the blocking pool: an
/// unanswered prompt must not keep the runtime alive after an interrupt.
async fn wait_for_line<F, R>(prompt: &str, open: F) -> Result<()>
where
    F: FnOnce() -> R + Send + 'static,
    R: BufRead,
{
    let (tx, rx) = oneshot::channel();
    let prompt = prompt.to_string();
    thread::spawn(move || {
        let read = || -> io::Result<()> {
            let mut stdout = io::stdout();
            writeln!(stdout, "{prompt}")?;
            stdout.flush()?;
            let mut line = String::new();
            open().read_line(&mut line)?;
            Ok(())
        };
        let _ = tx.send(read());
    });
    rx.await
        .map_err(|_| io::Error::other("confirmation reader exited without an answer"))??;
    Ok(())
}

/// Already resolved; records how often it was awaited.
#[derive(Default)]
pub struct ReadyConfirmation {
    waits: AtomicUsize,
}

impl ReadyConfirmation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn wait_count(&self) -> usize {
        self.waits.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConfirmationSignal for ReadyConfirmation {
    async fn wait(&self, _prompt: &str) -> Result<()> {
        self.waits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_ready_confirmation_counts_waits() {
        let signal = ReadyConfirmation::new();
        signal.wait("ready?").await.unwrap();
        signal.wait("ready?").await.unwrap();
        assert_eq!(signal.wait_count(), 2);
    }

    #[tokio::test]
    async fn test_line_resolves_wait() {
        wait_for_line("press enter", || io::Cursor::new(b"\n".to_vec()))
            .await
            .unwrap();
    }

    /// A terminal nobody answers.
    struct SilentInput;

    impl io::Read for SilentInput {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            loop {
                thread::sleep(Duration::from_secs(3600));
            }
        }
    }

    #[test]
    fn test_unanswered_prompt_does_not_block_runtime_shutdown() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async {
            tokio::select! {
                _ = wait_for_line("log in", || io::BufReader::new(SilentInput)) => panic!("nobody answered"),
                _ = tokio::time::sleep(Duration::from_millis(50)) => {}
            }
        });

        let (done_tx, done_rx) = std::sync::mpsc::channel();
        thread::spawn(move || {
            drop(runtime);
            let _ = done_tx.send(());
        });
        assert!(
            done_rx.recv_timeout(Duration::from_secs(5)).is_ok(),
            "runtime shutdown waited on the pending stdin read"
        );
    }
}
