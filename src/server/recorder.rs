use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
};

/// Lock-free counters for unique and duplicate numbers.
///
/// The per-period counters are reset every time a report is taken; the
/// unique total only ever grows.
#[derive(Debug, Default)]
pub struct Recorder {
    unique: AtomicU64,
    duplicates: AtomicU64,
    total: AtomicU64,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_unique(&self) {
        self.unique.fetch_add(1, Ordering::Relaxed);
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn mark_duplicate(&self) {
        self.duplicates.fetch_add(1, Ordering::Relaxed);
    }

    /// Takes the counts for the current period and starts a new one.
    pub fn snapshot(&self) -> Report {
        Report {
            unique: self.unique.swap(0, Ordering::Relaxed),
            duplicates: self.duplicates.swap(0, Ordering::Relaxed),
            total: self.total.load(Ordering::Relaxed),
        }
    }

    /// Same as [`Recorder::snapshot`], rendered as the report line.
    pub fn report(&self) -> String {
        self.snapshot().to_string()
    }

    /// Unique numbers seen since the recorder was created.
    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }
}

/// Counts for one reporting period.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Report {
    pub unique: u64,
    pub duplicates: u64,
    pub total: u64,
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Received {} unique numbers, {} duplicates. Unique total: {}",
            self.unique, self.duplicates, self.total
        )
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread};

    use super::*;

    #[test]
    fn empty_report() {
        let recorder = Recorder::new();
        assert_eq!(
            recorder.report(),
            "Received 0 unique numbers, 0 duplicates. Unique total: 0"
        );
    }

    #[test]
    fn report_resets_period_counters() {
        let recorder = Recorder::new();
        for _ in 0..3 {
            recorder.mark_unique();
        }
        for _ in 0..2 {
            recorder.mark_duplicate();
        }

        assert_eq!(
            recorder.report(),
            "Received 3 unique numbers, 2 duplicates. Unique total: 3"
        );
        assert_eq!(
            recorder.report(),
            "Received 0 unique numbers, 0 duplicates. Unique total: 3"
        );

        recorder.mark_unique();
        assert_eq!(
            recorder.snapshot(),
            Report {
                unique: 1,
                duplicates: 0,
                total: 4
            }
        );
    }

    #[test]
    fn concurrent_marks_are_all_counted() {
        let recorder = Arc::new(Recorder::new());
        let workers: Vec<_> = (0..8)
            .map(|i| {
                let recorder = recorder.clone();
                thread::spawn(move || {
                    for _ in 0..1_000 {
                        if i % 2 == 0 {
                            recorder.mark_unique();
                        } else {
                            recorder.mark_duplicate();
                        }
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        let report = recorder.snapshot();
        assert_eq!(report.unique, 4_000);
        assert_eq!(report.duplicates, 4_000);
        assert_eq!(report.total, 4_000);
        assert_eq!(recorder.total(), 4_000);
    }
}
