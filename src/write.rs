use crate::defs::DUMP_PREFIX;
use crate::stats::{NodeId, Stats};
use crate::structs::Metrics;
use serde_derive::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ProcessDump {
    pub pid: u32,
    pub threads: Vec<ThreadDump>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ThreadDump {
    pub tid: String,
    pub total: Metrics,
    pub children: Vec<FrameDump>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct FrameDump {
    pub function: String,
    pub module: String,
    pub line: u32,
    pub total: Metrics,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<FrameDump>,
}

fn frame_dump(stats: &Stats, id: NodeId) -> FrameDump {
    let node = stats.node(id);
    FrameDump {
        function: node.label.function.clone(),
        module: node.label.module.clone(),
        line: node.label.line,
        total: node.total,
        children: node
            .children
            .values()
            .map(|child| frame_dump(stats, *child))
            .collect(),
    }
}

/// Nested copy of the tree, ready to serialize.
pub fn snapshot(stats: &Stats) -> Vec<ProcessDump> {
    stats
        .processes
        .iter()
        .map(|(pid, process)| ProcessDump {
            pid: *pid,
            threads: process
                .threads
                .iter()
                .map(|(tid, thread)| ThreadDump {
                    tid: tid.clone(),
                    total: thread.total,
                    children: thread
                        .children
                        .values()
                        .map(|id| frame_dump(stats, *id))
                        .collect(),
                })
                .collect(),
        })
        .collect()
}

/// `.budgeteer_<timestamp>.json` under `dir`.
pub fn dump_path(dir: &Path) -> PathBuf {
    let stamp = chrono::Utc::now().timestamp_micros() % 100_000_000_000_000;
    dir.join(format!("{DUMP_PREFIX}{stamp}.json"))
}

pub async fn write_stats(stats: &Stats, out_file: &Path) -> Result<(), anyhow::Error> {
    let outbuf = serde_json::to_vec(&snapshot(stats))?;
    let outfile = File::create(out_file).await?;
    let mut bufwriter = BufWriter::new(outfile);
    bufwriter.write_all(&outbuf).await?;
    bufwriter.flush().await?;
    bufwriter.shutdown().await?;
    Ok(())
}
