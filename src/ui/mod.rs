//! Terminal output
//!
//! Uses `cliclack` and `indicatif` on interactive terminals, with plain
//! tagged lines in CI or when output is piped.
//!
//! ```rust,ignore
//! use bootdisk::ui::{self, UiContext};
//!
//! let ctx = UiContext::detect().with_quiet(args.quiet);
//! ui::step_ok(&ctx, "Disk ready");
//! if ui::confirm(&ctx, "Remove 3 cached disks?", false).await? { /* ... */ }
//! ```

mod context;
mod output;
mod progress;
mod prompts;

pub use context::UiContext;
pub use output::{key_value, step_error_detail, step_info, step_ok, step_ok_detail, step_warn_hint};
pub use progress::InstallProgress;
pub use prompts::confirm;
