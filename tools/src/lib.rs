//! Inspection and simulation tools for netarray delta records.
//!
//! - Read a record header and explain its size
//! - Replay a deterministic host/observer session over a lossy link
//!
//! # Design Principles
//!
//! - **First-class tooling** - These tools are part of the product, not afterthoughts.
//! - **Human-readable output** - Make it easy to see what the protocol is doing.

mod sim;

use std::fmt::Write as _;

use bitstream::BitReader;
use netarray::{CodecError, DeltaLimits, LimitKind};
use serde::Serialize;

pub use sim::{simulate, DemoCrate, SimConfig, SimSummary};

/// Header fields of one delta record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordReport {
    pub sequence: i32,
    pub previous: i32,
    pub deleted_count: u32,
    pub changed_count: u32,
    pub deleted: Vec<u32>,
    /// Bits following the deleted identities: changed identities plus
    /// item payloads.
    pub changed_bits: usize,
    pub total_bytes: usize,
}

/// Reads the header and deleted identities of a record.
///
/// Changed payloads are opaque here; only their total size is reported.
pub fn inspect_record(bytes: &[u8], limits: &DeltaLimits) -> Result<RecordReport, CodecError> {
    let mut reader = BitReader::new(bytes);
    let sequence = reader.read_i32()?;
    let previous = reader.read_i32()?;
    let deleted_count = reader.read_u32()?;
    check_limit(LimitKind::Deleted, deleted_count, limits.max_deleted)?;
    let changed_count = reader.read_u32()?;
    check_limit(LimitKind::Changed, changed_count, limits.max_changed)?;

    let deleted = (0..deleted_count)
        .map(|_| reader.read_u32())
        .collect::<Result<Vec<_>, _>>()?;

    Ok(RecordReport {
        sequence,
        previous,
        deleted_count,
        changed_count,
        deleted,
        changed_bits: reader.bits_remaining(),
        total_bytes: bytes.len(),
    })
}

fn check_limit(kind: LimitKind, actual: u32, limit: usize) -> Result<(), CodecError> {
    let actual = actual as usize;
    if actual > limit {
        return Err(CodecError::LimitsExceeded {
            kind,
            limit,
            actual,
        });
    }
    Ok(())
}

/// Renders a report for terminal output.
#[must_use]
pub fn format_record_pretty(report: &RecordReport) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "sequence: {} previous: {}{}",
        report.sequence,
        report.previous,
        if report.previous == -1 {
            " (no acknowledged state)"
        } else {
            ""
        }
    );
    let _ = writeln!(
        out,
        "deleted: {} changed: {} ({} bytes total)",
        report.deleted_count, report.changed_count, report.total_bytes
    );
    if !report.deleted.is_empty() {
        let ids: Vec<String> = report.deleted.iter().map(u32::to_string).collect();
        let _ = writeln!(out, "deleted ids: {}", ids.join(", "));
    }
    if report.changed_count > 0 {
        let per_item = report.changed_bits / report.changed_count as usize;
        let _ = writeln!(
            out,
            "changed section: {} bits (~{per_item} bits per item)",
            report.changed_bits
        );
    }
    out
}
