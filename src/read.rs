use crate::check::{Budget, TestId};
use crate::defs::SampleQueue;
use atomic_counter::{AtomicCounter, RelaxedCounter};
use serde_derive::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{event, Level};

/// Reads sample records in the background until the stream ends or it is
/// told to stop. Records are only queued here; folding happens once the
/// reader is done.
pub struct Collector {
    queue: Arc<SampleQueue>,
    received: Arc<RelaxedCounter>,
    stop: Arc<Notify>,
    handle: JoinHandle<std::io::Result<()>>,
}

impl Collector {
    pub fn spawn<R>(reader: R) -> Self
    where
        R: AsyncBufRead + Unpin + Send + 'static,
    {
        let queue = Arc::new(SampleQueue::new());
        let received = Arc::new(RelaxedCounter::new(0));
        let stop = Arc::new(Notify::new());

        let handle = tokio::spawn(read_records(
            reader,
            queue.clone(),
            received.clone(),
            stop.clone(),
        ));

        Collector {
            queue,
            received,
            stop,
            handle,
        }
    }

    pub fn is_done(&self) -> bool {
        self.handle.is_finished()
    }

    pub fn received(&self) -> usize {
        self.received.get()
    }

    /// Waits for the stream to end and hands back every record read.
    pub async fn join(self) -> anyhow::Result<Vec<String>> {
        let Collector { queue, handle, .. } = self;
        handle.await??;
        Ok(drain(&queue))
    }

    /// Like [`Collector::join`], but gives the stream at most `limit` to end
    /// before terminating the reader.
    pub async fn join_within(mut self, limit: Duration, grace: Duration) -> anyhow::Result<Vec<String>> {
        match tokio::time::timeout(limit, &mut self.handle).await {
            Ok(joined) => {
                joined??;
                Ok(drain(&self.queue))
            }
            Err(_) => {
                event!(Level::INFO, "stopping sample reader after {:?}", limit);
                self.terminate(grace).await
            }
        }
    }

    /// Asks the reader to stop, waits at most `grace` for it and aborts it
    /// after that. Records read so far are kept either way.
    pub async fn terminate(self, grace: Duration) -> anyhow::Result<Vec<String>> {
        let Collector {
            queue,
            stop,
            mut handle,
            ..
        } = self;
        stop.notify_one();
        match tokio::time::timeout(grace, &mut handle).await {
            Ok(joined) => {
                if let Err(e) = joined? {
                    event!(Level::WARN, "sample reader failed: {}", e);
                }
            }
            Err(_) => {
                event!(Level::WARN, "sample reader did not stop within {:?}, aborting", grace);
                handle.abort();
            }
        }
        Ok(drain(&queue))
    }
}

async fn read_records<R>(
    reader: R,
    queue: Arc<SampleQueue>,
    count: Arc<RelaxedCounter>,
    stop: Arc<Notify>,
) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    loop {
        tokio::select! {
            _ = stop.notified() => {
                event!(Level::DEBUG, "sample reader stopped after {} records", count.get());
                return Ok(());
            }
            line = lines.next_line() => match line? {
                Some(line) => {
                    queue.push(line);
                    count.inc();
                }
                None => return Ok(()),
            }
        }
    }
}

fn drain(queue: &SampleQueue) -> Vec<String> {
    let mut records = Vec::with_capacity(queue.len());
    while let Some(record) = queue.try_pop() {
        records.push(record);
    }
    records
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TestBudgets {
    pub function: String,
    pub module: String,
    #[serde(default)]
    pub checks: Vec<Budget>,
}

impl TestBudgets {
    pub fn id(&self) -> TestId {
        TestId::new(self.function.clone(), self.module.clone())
    }
}

/// Declared tests, in the order they should be checked.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct Manifest {
    pub tests: Vec<TestBudgets>,
}

pub fn read_manifest(in_file: &Path) -> Result<Manifest, anyhow::Error> {
    use std::fs::File;
    use std::io::BufReader;
    let infile = File::open(in_file)?;
    let bufreader = BufReader::new(infile);
    let manifest: Manifest = serde_json::from_reader(bufreader)?;
    Ok(manifest)
}
