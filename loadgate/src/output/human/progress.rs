use std::sync::Mutex;

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};

/// Run-wide progress bar on stderr, sized in requests.
pub(crate) struct HumanProgress {
    inner: Mutex<Inner>,
}

struct Inner {
    multi: MultiProgress,
    bar: Option<ProgressBar>,
}

impl HumanProgress {
    pub(crate) fn new() -> Self {
        let multi = MultiProgress::new();
        multi.set_draw_target(ProgressDrawTarget::stderr_with_hz(5));

        Self {
            inner: Mutex::new(Inner { multi, bar: None }),
        }
    }

    pub(crate) fn update(&self, completed: u64, total: u64, message: String) {
        let mut inner = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let Inner { multi, bar } = &mut *inner;
        let pb = bar.get_or_insert_with(|| {
            let pb = multi.add(ProgressBar::new(total));
            pb.set_style(bar_style());
            pb.set_prefix("run");
            pb
        });

        pb.set_length(total);
        pb.set_position(completed.min(total));
        pb.set_message(message);
    }

    pub(crate) fn finish(&self) {
        let mut inner = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(pb) = inner.bar.take() {
            pb.finish_and_clear();
        }
        let _ = inner.multi.clear();
    }
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template("{prefix} [ {bar:20.cyan/blue} ] {percent:>3}% {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█░")
}
