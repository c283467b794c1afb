//! Art snapshots and the asynchronous re-encoding path.
//!
//! A snapshot bundles DNA with both parameter sets. It is built off the render
//! thread and handed over whole through a channel; the render loop swaps its
//! `Arc` in one assignment, so simulation and shading parameters never disagree.
//!
//! Submissions are last-write-wins: when a newer record arrives while an older
//! one is still encoding, the older result is dropped instead of published.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::dna::{Dna, DnaEncoder};
use super::synth::{ParameterSynthesizer, ShadingParameters, SimulationParameters};
use crate::schema::BehaviorRecord;

/// DNA plus the parameters derived from it, produced together.
#[derive(Debug, Clone, PartialEq)]
pub struct ArtSnapshot {
    /// Submission generation this snapshot was built for.
    pub generation: u64,
    pub dna: Dna,
    pub simulation: SimulationParameters,
    pub shading: ShadingParameters,
}

impl ArtSnapshot {
    /// Synthesize parameters for `dna`.
    pub fn from_dna(dna: Dna, generation: u64) -> Self {
        let (simulation, shading) = ParameterSynthesizer::synthesize(&dna);
        Self {
            generation,
            dna,
            simulation,
            shading,
        }
    }

    /// Encode and synthesize a record against `as_of`.
    pub fn from_record(record: &BehaviorRecord, as_of: DateTime<Utc>, generation: u64) -> Self {
        Self::from_dna(DnaEncoder::encode_at(record, as_of), generation)
    }

    /// Serializable view for previews and export.
    pub fn summary(&self) -> ArtSummary {
        ArtSummary {
            generation: self.generation,
            sequence: self.dna.sequence_string(),
            sequence_length: self.dna.sequence.len(),
            symbol_counts: self.dna.counts(),
            characteristics: self.dna.characteristics,
            chaos_index: self.dna.chaos_index,
            fractal_dimension: self.dna.fractal_dimension,
            evolution_factor: self.dna.evolution_factor,
            simulation: self.simulation,
            shading: self.shading,
        }
    }
}

/// Read-only "current art parameters" view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtSummary {
    pub generation: u64,
    pub sequence: String,
    pub sequence_length: usize,
    /// Counts in A T C G U X order.
    pub symbol_counts: [usize; 6],
    pub characteristics: [f64; 8],
    pub chaos_index: f64,
    pub fractal_dimension: f64,
    pub evolution_factor: f64,
    pub simulation: SimulationParameters,
    pub shading: ShadingParameters,
}

struct EncodeJob {
    record: BehaviorRecord,
    as_of: Option<DateTime<Utc>>,
    generation: u64,
}

/// Background encoder fed by record-change notifications.
pub struct SnapshotWorker {
    jobs: Option<Sender<EncodeJob>>,
    results: Receiver<Arc<ArtSnapshot>>,
    generation: Arc<AtomicU64>,
    handle: Option<JoinHandle<()>>,
}

impl SnapshotWorker {
    /// Spawn the encoder thread.
    pub fn spawn() -> std::io::Result<Self> {
        let (job_tx, job_rx) = mpsc::channel::<EncodeJob>();
        let (result_tx, result_rx) = mpsc::channel::<Arc<ArtSnapshot>>();
        let generation = Arc::new(AtomicU64::new(0));
        let latest = Arc::clone(&generation);

        let handle = thread::Builder::new()
            .name("art-encoder".into())
            .spawn(move || encode_loop(job_rx, result_tx, latest))?;

        Ok(Self {
            jobs: Some(job_tx),
            results: result_rx,
            generation,
            handle: Some(handle),
        })
    }

    /// Queue a record for encoding against the wall clock at encode time.
    /// Returns the generation assigned to it.
    pub fn submit(&self, record: BehaviorRecord) -> u64 {
        self.enqueue(record, None)
    }

    /// Queue a record for encoding against a fixed instant.
    pub fn submit_at(&self, record: BehaviorRecord, as_of: DateTime<Utc>) -> u64 {
        self.enqueue(record, Some(as_of))
    }

    fn enqueue(&self, record: BehaviorRecord, as_of: Option<DateTime<Utc>>) -> u64 {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        if let Some(jobs) = &self.jobs {
            if jobs
                .send(EncodeJob {
                    record,
                    as_of,
                    generation,
                })
                .is_err()
            {
                log::warn!("Encoder thread has exited; dropping generation {}", generation);
            }
        }
        generation
    }

    /// Newest generation handed to [`submit`](Self::submit).
    pub fn latest_generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Drain finished snapshots, keeping only the newest. Never blocks.
    pub fn latest(&self) -> Option<Arc<ArtSnapshot>> {
        self.results.try_iter().last()
    }

    /// Block until the snapshot for `generation` (or newer) is available.
    pub fn wait_for(&self, generation: u64) -> Option<Arc<ArtSnapshot>> {
        loop {
            match self.results.recv() {
                Ok(snapshot) if snapshot.generation >= generation => {
                    let newer = self.latest();
                    return Some(newer.unwrap_or(snapshot));
                }
                Ok(_) => continue,
                Err(_) => return None,
            }
        }
    }
}

impl Drop for SnapshotWorker {
    fn drop(&mut self) {
        // Closing the job channel ends the loop.
        self.jobs.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::warn!("Encoder thread panicked");
            }
        }
    }
}

fn encode_loop(
    jobs: Receiver<EncodeJob>,
    results: Sender<Arc<ArtSnapshot>>,
    latest: Arc<AtomicU64>,
) {
    while let Ok(EncodeJob {
        record,
        as_of,
        generation,
    }) = jobs.recv()
    {
        if generation < latest.load(Ordering::Acquire) {
            log::debug!("Skipping stale record generation {}", generation);
            continue;
        }

        let snapshot =
            ArtSnapshot::from_record(&record, as_of.unwrap_or_else(Utc::now), generation);

        if generation < latest.load(Ordering::Acquire) {
            log::debug!("Discarding stale snapshot generation {}", generation);
            continue;
        }
        if results.send(Arc::new(snapshot)).is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::BehaviorCategory;
    use chrono::TimeZone;

    fn record(id: &str, completion: f64) -> BehaviorRecord {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        BehaviorRecord {
            completion_rate: completion,
            streak_days: 12,
            intensity: 0.4,
            growth_rate: 0.6,
            history: (0..40).map(|i| i % 4 != 1).collect(),
            ..BehaviorRecord::new(id, BehaviorCategory::Learning, start)
        }
    }

    fn as_of() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_snapshot_matches_direct_pipeline() {
        let r = record("read", 0.7);
        let snapshot = ArtSnapshot::from_record(&r, as_of(), 1);
        let dna = DnaEncoder::encode_at(&r, as_of());
        let (sim, shade) = ParameterSynthesizer::synthesize(&dna);
        assert_eq!(snapshot.dna, dna);
        assert_eq!(snapshot.simulation, sim);
        assert_eq!(snapshot.shading, shade);
    }

    #[test]
    fn test_summary_fields() {
        let snapshot = ArtSnapshot::from_record(&record("read", 0.7), as_of(), 3);
        let summary = snapshot.summary();
        assert_eq!(summary.generation, 3);
        assert_eq!(summary.sequence.len(), summary.sequence_length);
        assert_eq!(
            summary.symbol_counts.iter().sum::<usize>(),
            summary.sequence_length
        );
        let json = serde_json::to_string(&summary).unwrap();
        let back: ArtSummary = serde_json::from_str(&json).unwrap();
        assert_eq!(back.sequence, summary.sequence);
    }

    #[test]
    fn test_worker_publishes_latest() {
        let worker = SnapshotWorker::spawn().unwrap();
        let mut last = 0;
        for i in 0..5 {
            last = worker.submit_at(record("read", 0.1 * i as f64), as_of());
        }
        assert_eq!(last, 5);
        assert_eq!(worker.latest_generation(), 5);

        let snapshot = worker.wait_for(last).expect("worker alive");
        assert_eq!(snapshot.generation, 5);
        let expected = ArtSnapshot::from_record(&record("read", 0.4), as_of(), 5);
        assert_eq!(*snapshot, expected);
    }

    #[test]
    fn test_worker_never_publishes_older_after_newer() {
        let worker = SnapshotWorker::spawn().unwrap();
        let first = worker.submit_at(record("a", 0.2), as_of());
        let first_snapshot = worker.wait_for(first).unwrap();
        assert_eq!(first_snapshot.generation, first);

        let second = worker.submit_at(record("b", 0.9), as_of());
        let second_snapshot = worker.wait_for(second).unwrap();
        assert_eq!(second_snapshot.generation, second);
        assert!(worker.latest().is_none());
    }
}
