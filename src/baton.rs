//! Progress reporting. One worker thread owns stdout during progress-mode
//! output and consumes a queue of typed messages. Log lines are printed at
//! the cursor position of the progress indicator so the two never interleave;
//! callers that must print to stdout directly block on [`Baton::sync`] first.

use bstr::BString;
use std::io::Write as _;
use std::sync::mpsc;

enum Message {
    Log(BString),
    Progress(BString),
    Sync(oneshot::Sender<()>),
    Done,
}

pub struct Baton {
    tx: mpsc::Sender<Message>,
    handle: Option<std::thread::JoinHandle<()>>,
}

impl Baton {
    /// Starts the worker. With `enabled == false`, progress messages are
    /// dropped and log messages still flow, which keeps call sites uniform
    /// in batch mode.
    pub fn start(enabled: bool) -> Baton {
        let (tx, rx) = mpsc::channel::<Message>();
        let handle = std::thread::Builder::new()
            .name("baton".into())
            .spawn(move || run_worker(rx, enabled))
            .expect("failed to spawn baton thread");
        Baton {
            tx,
            handle: Some(handle),
        }
    }

    pub fn log(&self, msg: impl Into<BString>) {
        let _ignored = self.tx.send(Message::Log(msg.into()));
    }

    pub fn progress(&self, msg: impl Into<BString>) {
        let _ignored = self.tx.send(Message::Progress(msg.into()));
    }

    /// Blocks until the worker has drained its queue and flushed stdout.
    /// Call before printing to stdout outside the baton.
    pub fn sync(&self) {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.tx.send(Message::Sync(reply_tx)).is_ok() {
            let _ignored = reply_rx.recv();
        }
    }

    /// Clears the progress line and joins the worker.
    pub fn finish(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ignored = self.tx.send(Message::Done);
            let _ignored = handle.join();
        }
    }
}

impl Drop for Baton {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_worker(rx: mpsc::Receiver<Message>, enabled: bool) {
    let mut stdout = std::io::stdout();
    let mut last_progress: Option<BString> = None;
    for msg in rx {
        match msg {
            Message::Log(line) => {
                if last_progress.is_some() {
                    let _ignored = stdout.write_all(b"\r\x1b[K");
                }
                let _ignored = stdout.write_all(&line);
                let _ignored = stdout.write_all(b"\n");
                if let Some(progress) = &last_progress {
                    let _ignored = stdout.write_all(progress);
                }
                let _ignored = stdout.flush();
            }
            Message::Progress(line) => {
                if !enabled {
                    continue;
                }
                let _ignored = stdout.write_all(b"\r\x1b[K");
                let _ignored = stdout.write_all(&line);
                let _ignored = stdout.flush();
                last_progress = Some(line);
            }
            Message::Sync(reply) => {
                let _ignored = stdout.flush();
                let _ignored = reply.send(());
            }
            Message::Done => break,
        }
    }
    if last_progress.is_some() {
        let _ignored = stdout.write_all(b"\r\x1b[K");
        let _ignored = stdout.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_after_messages() {
        let baton = Baton::start(false);
        baton.progress("reading revision 100");
        baton.log("note");
        baton.sync();
        baton.finish();
    }
}
