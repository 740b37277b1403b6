//! Deterministic host/observer session over a lossy link.

use std::collections::BTreeMap;
use std::num::NonZeroUsize;

use anyhow::{Context, Result};
use bitstream::{BitReader, BitVecWriter};
use netarray::{
    decode_delta, CodecResult, DeltaLimits, ItemDecode, ItemEncode, ItemId, NetArray,
    NoReferences, ObserverChannel, PeerRole, RefContext, ReferenceResolver, SendId, WriteOutcome,
};
use serde::Serialize;

/// Demo item: a crate on a grid with some health.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DemoCrate {
    pub x: i16,
    pub y: i16,
    pub hp: u8,
}

impl ItemEncode for DemoCrate {
    fn encode(&self, writer: &mut BitVecWriter) -> CodecResult<()> {
        writer.write_bits(u64::from(self.x as u16), 16)?;
        writer.write_bits(u64::from(self.y as u16), 16)?;
        writer.write_bits(u64::from(self.hp), 8)?;
        Ok(())
    }
}

impl<R: ReferenceResolver + ?Sized> ItemDecode<R> for DemoCrate {
    fn decode(
        &mut self,
        reader: &mut BitReader<'_>,
        _refs: &mut RefContext<'_, R>,
    ) -> CodecResult<()> {
        self.x = reader.read_bits(16)? as u16 as i16;
        self.y = reader.read_bits(16)? as u16 as i16;
        self.hp = reader.read_bits(8)? as u8;
        Ok(())
    }
}

/// Parameters of one simulated session.
#[derive(Debug, Clone)]
pub struct SimConfig {
    pub ticks: u32,
    pub seed: u64,
    /// Chance, in percent, that a record or its acknowledgement is lost.
    pub loss_percent: u8,
    pub max_items: usize,
    pub limits: DeltaLimits,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            ticks: 300,
            seed: 1,
            loss_percent: 10,
            max_items: 64,
            limits: DeltaLimits::default(),
        }
    }
}

/// Record size statistics for a finished session.
#[derive(Debug, Serialize)]
pub struct SimSummary {
    pub ticks: u32,
    pub seed: u64,
    pub loss_percent: u8,
    pub records_written: u32,
    pub records_delivered: u32,
    pub acks_received: u32,
    pub unchanged_ticks: u32,
    pub bytes_total: u64,
    pub avg_record_bytes: u64,
    pub p95_record_bytes: u64,
    pub max_record_bytes: u64,
    pub final_items: usize,
    #[serde(skip)]
    sizes: Vec<u64>,
}

impl SimSummary {
    fn new(config: &SimConfig) -> Self {
        Self {
            ticks: config.ticks,
            seed: config.seed,
            loss_percent: config.loss_percent,
            records_written: 0,
            records_delivered: 0,
            acks_received: 0,
            unchanged_ticks: 0,
            bytes_total: 0,
            avg_record_bytes: 0,
            p95_record_bytes: 0,
            max_record_bytes: 0,
            final_items: 0,
            sizes: Vec::new(),
        }
    }

    fn push_record(&mut self, bytes: u64) {
        self.records_written += 1;
        self.bytes_total += bytes;
        self.max_record_bytes = self.max_record_bytes.max(bytes);
        self.sizes.push(bytes);
    }

    fn finalize(&mut self) {
        if self.sizes.is_empty() {
            return;
        }
        self.avg_record_bytes = self.bytes_total / self.sizes.len() as u64;
        self.sizes.sort_unstable();
        let idx = ((self.sizes.len() as f64) * 0.95).ceil() as usize;
        let idx = idx.saturating_sub(1).min(self.sizes.len() - 1);
        self.p95_record_bytes = self.sizes[idx];
    }
}

/// Runs a session, handing every written record to `capture`.
///
/// The observer is checked against the host after every delivered record;
/// any divergence is an error.
pub fn simulate(
    config: &SimConfig,
    mut capture: impl FnMut(u32, &[u8]) -> Result<()>,
) -> Result<SimSummary> {
    let mut rng = Rng::new(config.seed);
    let mut host = NetArray::new();
    let mut observer: NetArray<DemoCrate> = NetArray::new();
    let history = NonZeroUsize::new(32).context("history capacity")?;
    let mut channel = ObserverChannel::new(PeerRole::Authority, history);
    let mut summary = SimSummary::new(config);

    for tick in 1..=config.ticks {
        step_host(&mut host, &mut rng, config.max_items);

        let send = SendId::new(tick);
        let mut writer = BitVecWriter::new();
        let outcome = channel
            .write(&mut host, send, &mut writer)
            .with_context(|| format!("encode record for tick {tick}"))?;
        if outcome == WriteOutcome::Unchanged {
            summary.unchanged_ticks += 1;
            continue;
        }
        let bytes = writer.finish();
        summary.push_record(bytes.len() as u64);
        capture(tick, &bytes)?;

        if rng.chance(config.loss_percent) {
            log::debug!("tick {tick}: record lost");
            continue;
        }
        let mut reader = BitReader::new(&bytes);
        decode_delta(
            &mut observer,
            &mut reader,
            &NoReferences,
            &mut (),
            &config.limits,
        )
        .with_context(|| format!("apply record for tick {tick}"))?;
        summary.records_delivered += 1;
        if by_id(&observer) != by_id(&host) {
            anyhow::bail!("observer diverged from host at tick {tick}");
        }

        if rng.chance(config.loss_percent) {
            log::debug!("tick {tick}: acknowledgement lost");
            continue;
        }
        channel
            .acknowledge(send)
            .with_context(|| format!("acknowledge tick {tick}"))?;
        summary.acks_received += 1;
    }

    summary.final_items = host.len();
    summary.finalize();
    Ok(summary)
}

fn step_host(host: &mut NetArray<DemoCrate>, rng: &mut Rng, max_items: usize) {
    for _ in 0..rng.below(4) {
        let len = host.len();
        match rng.below(4) {
            0 if len < max_items => {
                host.push(DemoCrate {
                    x: rng.range_i16(-500, 500),
                    y: rng.range_i16(-500, 500),
                    hp: 100,
                });
            }
            1 if len > 0 => {
                let index = rng.below(len);
                let dx = rng.range_i16(-3, 3);
                host.modify(index, |item| item.x = item.x.saturating_add(dx));
            }
            2 if len > 0 => {
                let index = rng.below(len);
                let damage = rng.below(40) as u8;
                let destroyed = host
                    .modify(index, |item| {
                        item.hp = item.hp.saturating_sub(damage);
                        item.hp == 0
                    })
                    .unwrap_or(false);
                if destroyed {
                    host.swap_remove(index);
                }
            }
            3 if len > 0 => {
                host.remove(rng.below(len));
            }
            _ => {}
        }
    }
}

fn by_id(array: &NetArray<DemoCrate>) -> BTreeMap<ItemId, DemoCrate> {
    array
        .items()
        .iter()
        .map(|item| (item.id(), *item.value()))
        .collect()
}

struct Rng {
    state: u64,
}

impl Rng {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn next_u32(&mut self) -> u32 {
        self.state = self.state.wrapping_mul(6364136223846793005).wrapping_add(1);
        (self.state >> 32) as u32
    }

    fn below(&mut self, bound: usize) -> usize {
        if bound == 0 {
            return 0;
        }
        self.next_u32() as usize % bound
    }

    fn range_i16(&mut self, min: i16, max: i16) -> i16 {
        let span = (i32::from(max) - i32::from(min)).unsigned_abs() + 1;
        let value = self.next_u32() % span;
        (i32::from(min) + value as i32) as i16
    }

    fn chance(&mut self, percent: u8) -> bool {
        self.next_u32() % 100 < u32::from(percent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(config: &SimConfig) -> (SimSummary, Vec<Vec<u8>>) {
        let mut records = Vec::new();
        let summary = simulate(config, |_, bytes| {
            records.push(bytes.to_vec());
            Ok(())
        })
        .unwrap();
        (summary, records)
    }

    #[test]
    fn lossless_session_converges() {
        let config = SimConfig {
            ticks: 120,
            loss_percent: 0,
            ..SimConfig::default()
        };
        let (summary, records) = run(&config);
        assert_eq!(summary.records_delivered, summary.records_written);
        assert_eq!(summary.acks_received, summary.records_written);
        assert_eq!(records.len() as u32, summary.records_written);
    }

    #[test]
    fn lossy_session_converges() {
        let config = SimConfig {
            ticks: 400,
            seed: 7,
            loss_percent: 40,
            ..SimConfig::default()
        };
        let (summary, _) = run(&config);
        assert!(summary.records_delivered < summary.records_written);
        assert!(summary.p95_record_bytes <= summary.max_record_bytes);
    }

    #[test]
    fn sessions_are_deterministic() {
        let config = SimConfig {
            ticks: 80,
            seed: 3,
            ..SimConfig::default()
        };
        let (_, a) = run(&config);
        let (_, b) = run(&config);
        assert_eq!(a, b);
    }

    #[test]
    fn demo_crate_survives_negative_coordinates() {
        let item = DemoCrate {
            x: -300,
            y: 17,
            hp: 5,
        };
        let mut writer = BitVecWriter::new();
        item.encode(&mut writer).unwrap();
        let bytes = writer.finish();
        let mut decoded = DemoCrate::default();
        let mut reader = BitReader::new(&bytes);
        let mut refs = RefContext::new(&NoReferences);
        decoded.decode(&mut reader, &mut refs).unwrap();
        assert_eq!(decoded, item);
    }
}
