// file: src/pipeline/progress.rs
// description: progress tracking and statistics reporting for pipeline execution
// reference: uses indicatif for progress bars and tracks processing metrics

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    pub documents_completed: usize,
    pub documents_failed: usize,
    pub annotations_created: usize,
    pub duration_secs: f64,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total_documents(&self) -> usize {
        self.documents_completed + self.documents_failed
    }

    pub fn documents_per_second(&self) -> f64 {
        if self.duration_secs <= 0.0 {
            return 0.0;
        }
        self.total_documents() as f64 / self.duration_secs
    }

    pub fn success_rate(&self) -> f64 {
        let total = self.total_documents();
        if total == 0 {
            return 0.0;
        }
        (self.documents_completed as f64 / total as f64) * 100.0
    }
}

pub struct ProgressTracker {
    main_bar: ProgressBar,
    detail_bar: ProgressBar,
    documents_completed: AtomicUsize,
    documents_failed: AtomicUsize,
    annotations_created: AtomicUsize,
    start_time: Instant,
}

impl ProgressTracker {
    pub fn with_color(total_documents: usize, colored: bool) -> Self {
        let multi_progress = MultiProgress::new();
        Self::build(&multi_progress, total_documents, colored)
    }

    pub fn hidden(total_documents: usize) -> Self {
        let multi_progress = MultiProgress::with_draw_target(ProgressDrawTarget::hidden());
        Self::build(&multi_progress, total_documents, false)
    }

    fn build(multi_progress: &MultiProgress, total_documents: usize, colored: bool) -> Self {
        let main_bar = create_progress_bar(multi_progress, total_documents as u64, colored);
        let detail_bar = create_detail_bar(multi_progress);

        Self {
            main_bar,
            detail_bar,
            documents_completed: AtomicUsize::new(0),
            documents_failed: AtomicUsize::new(0),
            annotations_created: AtomicUsize::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn inc_completed(&self) {
        self.documents_completed.fetch_add(1, Ordering::SeqCst);
        self.main_bar.inc(1);
        self.update_detail_bar();
    }

    pub fn inc_failed(&self) {
        self.documents_failed.fetch_add(1, Ordering::SeqCst);
        self.main_bar.inc(1);
        self.update_detail_bar();
    }

    pub fn add_annotations(&self, count: usize) {
        self.annotations_created.fetch_add(count, Ordering::SeqCst);
    }

    pub fn finish(&self) {
        self.main_bar.finish_with_message("Processing complete");
        self.detail_bar.finish_and_clear();
    }

    pub fn get_stats(&self) -> PipelineStats {
        PipelineStats {
            documents_completed: self.documents_completed.load(Ordering::SeqCst),
            documents_failed: self.documents_failed.load(Ordering::SeqCst),
            annotations_created: self.annotations_created.load(Ordering::SeqCst),
            duration_secs: self.start_time.elapsed().as_secs_f64(),
        }
    }

    fn update_detail_bar(&self) {
        let annotations = self.annotations_created.load(Ordering::SeqCst);
        let failed = self.documents_failed.load(Ordering::SeqCst);

        let message = format!("Annotations: {} | Failed: {}", annotations, failed);

        self.detail_bar.set_message(message);
    }
}

impl Drop for ProgressTracker {
    fn drop(&mut self) {
        self.finish();
    }
}

fn create_progress_bar(multi_progress: &MultiProgress, total: u64, colored: bool) -> ProgressBar {
    let bar = multi_progress.add(ProgressBar::new(total));
    let (template, chars) = if colored {
        (
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
            "█▓▒░",
        )
    } else {
        (
            "{spinner} [{elapsed_precise}] [{bar:40}] {pos}/{len} ({eta}) {msg}",
            "=>-",
        )
    };

    let style = ProgressStyle::default_bar()
        .template(template)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars(chars);
    bar.set_style(style);
    bar
}

fn create_detail_bar(multi_progress: &MultiProgress) -> ProgressBar {
    let bar = multi_progress.add(ProgressBar::new(0));
    let style = ProgressStyle::default_bar()
        .template("{msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    bar.set_style(style);
    bar
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_stats_calculations() {
        let stats = PipelineStats {
            documents_completed: 90,
            documents_failed: 10,
            annotations_created: 400,
            duration_secs: 10.0,
        };

        assert_eq!(stats.total_documents(), 100);
        assert_eq!(stats.documents_per_second(), 10.0);
        assert!((stats.success_rate() - 90.0).abs() < 0.01);
    }

    #[test]
    fn test_pipeline_stats_zero_duration() {
        let stats = PipelineStats::new();
        assert_eq!(stats.documents_per_second(), 0.0);
        assert_eq!(stats.success_rate(), 0.0);
    }

    #[test]
    fn test_progress_tracker_counts() {
        let tracker = ProgressTracker::hidden(10);

        tracker.inc_completed();
        tracker.inc_completed();
        tracker.inc_failed();
        tracker.add_annotations(7);

        let stats = tracker.get_stats();
        assert_eq!(stats.documents_completed, 2);
        assert_eq!(stats.documents_failed, 1);
        assert_eq!(stats.annotations_created, 7);
    }
}
