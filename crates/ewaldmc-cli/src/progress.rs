use ewaldmc::engine::progress::{Progress, ProgressCallback};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

/// An attempt counter on stderr fed by engine progress events.
pub struct AttemptBar {
    bar: ProgressBar,
}

impl AttemptBar {
    pub fn new() -> Self {
        Self::with_target(ProgressDrawTarget::stderr())
    }

    fn with_target(target: ProgressDrawTarget) -> Self {
        let bar = ProgressBar::with_draw_target(Some(0), target).with_style(
            ProgressStyle::with_template("{msg} [{bar:40.cyan/blue}] {pos}/{len} attempts ({eta})")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("##-"),
        );
        Self { bar }
    }

    pub fn callback(&self) -> ProgressCallback<'static> {
        let bar = self.bar.clone();
        Box::new(move |progress| match progress {
            Progress::PhaseStart { name } => bar.set_message(name),
            Progress::TaskStart { total_steps } => {
                bar.set_length(total_steps);
                bar.set_position(0);
            }
            Progress::TaskAdvance { steps } => bar.inc(steps),
            Progress::TaskFinish => bar.finish(),
            Progress::PhaseFinish => {}
            Progress::Message(text) => bar.println(text),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn callback_counts_attempts_until_finished() {
        let bar = AttemptBar::with_target(ProgressDrawTarget::hidden());
        let callback = bar.callback();

        callback(Progress::PhaseStart {
            name: "Monte Carlo",
        });
        callback(Progress::TaskStart { total_steps: 1000 });
        callback(Progress::TaskAdvance { steps: 10 });
        callback(Progress::TaskAdvance { steps: 10 });
        assert_eq!(bar.bar.message(), "Monte Carlo");
        assert_eq!(bar.bar.length(), Some(1000));
        assert_eq!(bar.bar.position(), 20);
        assert!(!bar.bar.is_finished());

        callback(Progress::TaskFinish);
        callback(Progress::PhaseFinish);
        assert!(bar.bar.is_finished());
    }
}
