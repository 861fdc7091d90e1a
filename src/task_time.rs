//! Task execution times rebuilt from scheduler start/end records.
//!
//! The scheduler log on gen4 chips has no duration field. A task's time is
//! the span between its start record and the next end record from the same
//! device carrying the same (stream_id, task_id). Records must be fed in
//! write order, one device after another.

use std::collections::HashMap;

use log::debug;

use crate::decode::{FuncType, Record, StarsLogRecord, TimedRecord};
use crate::parser::stamp;
use crate::timebase::{DataQualityWarning, TimeBaseReconciler};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskTimeRecord {
    pub stream_id: u16,
    pub task_id: u16,
    pub core_id: u16,
    pub start_cycle: u64,
    pub end_cycle: u64,
}

impl TaskTimeRecord {
    pub fn duration_cycles(&self) -> u64 {
        self.end_cycle.saturating_sub(self.start_cycle)
    }
}

/// Pairs start and end records as they stream past.
///
/// Pairing never crosses devices. Starts still open when the stream moves on
/// to another device are counted as unmatched and dropped.
#[derive(Debug, Default)]
pub struct TaskTimeBuilder {
    device: Option<u32>,
    open: HashMap<(u16, u16), StarsLogRecord>,
    done: Vec<(u32, TaskTimeRecord)>,
    unmatched_starts: usize,
    unmatched_ends: usize,
}

impl TaskTimeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, device: u32, record: &StarsLogRecord) {
        if self.device != Some(device) {
            self.unmatched_starts += self.open.len();
            self.open.clear();
            self.device = Some(device);
        }

        let key = (record.stream_id, record.task_id);
        match record.func_type {
            FuncType::TaskStart => {
                // A second start before the end replaces the first.
                self.open.insert(key, record.clone());
            }
            FuncType::TaskEnd => match self.open.remove(&key) {
                Some(start) => self.done.push((
                    device,
                    TaskTimeRecord {
                        stream_id: start.stream_id,
                        task_id: start.task_id,
                        core_id: start.core_id,
                        start_cycle: start.sys_cycle,
                        end_cycle: record.sys_cycle,
                    },
                )),
                None => self.unmatched_ends += 1,
            },
            FuncType::Unknown(_) => {}
        }
    }

    /// Feed every scheduler record out of a decoded stream.
    pub fn extend<'a>(&mut self, records: impl IntoIterator<Item = &'a TimedRecord>) {
        for timed in records {
            if let Record::StarsLog(r) = &timed.record {
                self.push(timed.device, r);
            }
        }
    }

    /// Finish pairing and convert the results to timed records.
    pub fn finish(
        self,
        reconciler: &TimeBaseReconciler,
        warnings: &mut Vec<DataQualityWarning>,
    ) -> TaskTimeSummary {
        let unmatched_starts = self.unmatched_starts + self.open.len();
        if self.unmatched_ends > 0 || unmatched_starts > 0 {
            debug!(
                "task time pairing: {} unmatched ends, {} unmatched starts",
                self.unmatched_ends, unmatched_starts
            );
        }
        TaskTimeSummary {
            records: self
                .done
                .into_iter()
                .map(|(device, r)| stamp(Record::TaskTime(r), device, reconciler, warnings))
                .collect(),
            unmatched_starts,
            unmatched_ends: self.unmatched_ends,
        }
    }
}

#[derive(Debug, Default)]
pub struct TaskTimeSummary {
    pub records: Vec<TimedRecord>,
    pub unmatched_starts: usize,
    pub unmatched_ends: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timebase::TimeBaseReference;

    fn event(func_type: FuncType, task_id: u16, sys_cycle: u64) -> StarsLogRecord {
        StarsLogRecord {
            func_type,
            core_id: 12,
            stream_id: 1,
            task_id,
            sqe_type: 0,
            sys_cycle,
            block_num: 1,
        }
    }

    fn reconciler() -> TimeBaseReconciler {
        TimeBaseReconciler::new(
            TimeBaseReference {
                reference_cycle_count: 0,
                reference_wall_time_ns: 0,
                cycles_per_microsecond: 1.0,
            },
            None,
        )
        .unwrap()
    }

    #[test]
    fn test_pairs_start_and_end() {
        let mut builder = TaskTimeBuilder::new();
        builder.push(0, &event(FuncType::TaskStart, 1, 100));
        builder.push(0, &event(FuncType::TaskStart, 2, 150));
        builder.push(0, &event(FuncType::TaskEnd, 1, 300));
        builder.push(0, &event(FuncType::TaskEnd, 2, 400));

        let mut warnings = Vec::new();
        let summary = builder.finish(&reconciler(), &mut warnings);
        assert_eq!(summary.records.len(), 2);
        assert_eq!(summary.unmatched_starts, 0);
        assert_eq!(summary.unmatched_ends, 0);

        let first = &summary.records[0];
        assert_eq!(first.start_ns, Some(100_000));
        assert_eq!(first.end_ns, Some(300_000));
        match &first.record {
            Record::TaskTime(r) => {
                assert_eq!(r.task_id, 1);
                assert_eq!(r.core_id, 12);
                assert_eq!(r.duration_cycles(), 200);
            }
            other => panic!("unexpected record {other:?}"),
        }
    }

    #[test]
    fn test_unmatched_records_are_counted() {
        let mut builder = TaskTimeBuilder::new();
        builder.push(0, &event(FuncType::TaskEnd, 9, 50));
        builder.push(0, &event(FuncType::TaskStart, 3, 100));
        builder.push(0, &event(FuncType::Unknown(7), 3, 120));

        let summary = builder.finish(&reconciler(), &mut Vec::new());
        assert!(summary.records.is_empty());
        assert_eq!(summary.unmatched_starts, 1);
        assert_eq!(summary.unmatched_ends, 1);
    }

    #[test]
    fn test_task_id_reuse() {
        let mut builder = TaskTimeBuilder::new();
        builder.push(0, &event(FuncType::TaskStart, 1, 100));
        builder.push(0, &event(FuncType::TaskEnd, 1, 200));
        builder.push(0, &event(FuncType::TaskStart, 1, 300));
        builder.push(0, &event(FuncType::TaskEnd, 1, 450));

        let summary = builder.finish(&reconciler(), &mut Vec::new());
        assert_eq!(summary.records.len(), 2);
        assert_eq!(summary.records[1].start_ns, Some(300_000));
    }

    #[test]
    fn test_pairing_does_not_cross_devices() {
        let mut builder = TaskTimeBuilder::new();
        builder.push(0, &event(FuncType::TaskStart, 5, 100));
        builder.push(1, &event(FuncType::TaskEnd, 5, 90));
        builder.push(1, &event(FuncType::TaskStart, 5, 200));
        builder.push(1, &event(FuncType::TaskEnd, 5, 260));

        let summary = builder.finish(&reconciler(), &mut Vec::new());
        assert_eq!(summary.records.len(), 1);
        assert_eq!(summary.unmatched_starts, 1);
        assert_eq!(summary.unmatched_ends, 1);

        let timed = &summary.records[0];
        assert_eq!(timed.device, 1);
        assert_eq!(timed.start_ns, Some(200_000));
        assert_eq!(timed.end_ns, Some(260_000));
    }
}
