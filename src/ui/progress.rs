//! Progress display for disk builds

use super::context::UiContext;
use super::output;
use crate::disk::{BuildState, ImageDescriptor};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

fn short_id(id: &str) -> &str {
    &id[..12.min(id.len())]
}

/// Spinner text for the transient states
fn state_message(requested: &str, state: BuildState, image: Option<&ImageDescriptor>) -> Option<String> {
    match state {
        BuildState::Resolving => Some(format!("Resolving {}", requested)),
        BuildState::Locking => image.map(|i| format!("Locking disk cache for {}", short_id(&i.id))),
        BuildState::CacheCheck => Some("Checking for a cached disk".to_string()),
        _ => None,
    }
}

/// Follows [`BuildState`] transitions of a disk build.
///
/// Shows an indicatif spinner up to the cache decision, then gets out of the
/// way so attached installer output owns the terminal.
pub struct InstallProgress {
    ctx: UiContext,
    requested: String,
    bar: Option<ProgressBar>,
}

impl InstallProgress {
    pub fn new(ctx: &UiContext, requested: &str) -> Self {
        let bar = if ctx.use_fancy_output() {
            let bar = ProgressBar::new_spinner();
            if let Ok(style) = ProgressStyle::default_spinner()
                .template("  {spinner:.cyan} {msg}  {elapsed:.dim}")
            {
                bar.set_style(style.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ "));
            }
            bar.enable_steady_tick(Duration::from_millis(120));
            Some(bar)
        } else {
            None
        };
        Self {
            ctx: ctx.clone(),
            requested: requested.to_string(),
            bar,
        }
    }

    /// Observe a transition
    pub fn on_state(&mut self, state: BuildState, image: Option<&ImageDescriptor>) {
        if let Some(message) = state_message(&self.requested, state, image) {
            if let Some(ref bar) = self.bar {
                bar.set_message(message);
            }
            return;
        }

        self.finish();
        match (state, image) {
            (BuildState::Reuse, Some(image)) => output::step_ok_detail(
                &self.ctx,
                "Reusing cached disk",
                short_id(&image.id),
            ),
            (BuildState::Building, Some(image)) => output::step_info(
                &self.ctx,
                &format!(
                    "Executing `bootc install to-disk` from container image {} to create disk image",
                    image.repo_tag
                ),
            ),
            _ => {}
        }
    }

    /// Clear the spinner
    pub fn finish(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.disable_steady_tick();
            bar.finish_and_clear();
        }
    }
}

impl Drop for InstallProgress {
    fn drop(&mut self) {
        self.finish();
    }
}
