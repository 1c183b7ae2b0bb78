//! Best-effort process-table snapshots for debugging resource leaks.

use std::collections::BTreeMap;
use std::fs::File;

use serde::Serialize;
use sysinfo::System;

use crate::error::Result;

#[derive(Serialize)]
struct ProcessInfo {
    name: String,
    cmd: Vec<String>,
    parent: Option<u32>,
    memory_bytes: u64,
    cpu_percent: f32,
}

/// Snapshot the local process table to `rank-{rank}_{seq}.proclist`.
///
/// Purely a debugging aid: failures are logged and swallowed, and a process
/// that disappears mid-snapshot is simply absent from the file.
pub fn dump_process_table(rank: usize, seq: u64) {
    tracing::info!(rank, seq, "dumping process list");
    if let Err(err) = try_dump(rank, seq) {
        tracing::warn!(rank, seq, error = %err, "process list dump failed");
    }
}

fn try_dump(rank: usize, seq: u64) -> Result<()> {
    let sys = System::new_all();
    let table: BTreeMap<u32, ProcessInfo> = sys
        .processes()
        .iter()
        .map(|(pid, process)| {
            (
                pid.as_u32(),
                ProcessInfo {
                    name: process.name().to_string_lossy().into_owned(),
                    cmd: process
                        .cmd()
                        .iter()
                        .map(|arg| arg.to_string_lossy().into_owned())
                        .collect(),
                    parent: process.parent().map(|parent| parent.as_u32()),
                    memory_bytes: process.memory(),
                    cpu_percent: process.cpu_usage(),
                },
            )
        })
        .collect();

    let file = File::create(format!("rank-{rank}_{seq}.proclist"))?;
    serde_json::to_writer_pretty(file, &table)?;
    Ok(())
}
