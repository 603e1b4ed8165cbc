//! RFC 3261 dialogs (section 12).
//!
//! - [`DialogId`]: Call-ID plus local and remote tag
//! - [`Dialog`]: dialog state, sequence numbers, route set and remote target
//! - [`DialogState`]: Early, Confirmed, Terminated
//! - [`dialog_utils`]: helpers shared by dialog creation and refresh
//!
//! ## Dialog Lifecycle
//!
//! ```text
//!  1xx with to-tag        2xx            BYE final / 481 / 408
//! ─────────────────▶ Early ───▶ Confirmed ──────────────────────▶ Terminated
//!                      │                                             ▲
//!                      └──── 300-699 to the dialog-creating request ─┘
//! ```
//!
//! Dialogs are created and driven through the [`DialogManager`](crate::manager::DialogManager).

pub mod dialog_id;
pub mod dialog_impl;
pub mod dialog_state;
pub mod dialog_utils;

pub use dialog_id::DialogId;
pub use dialog_impl::Dialog;
pub use dialog_state::DialogState;
pub use dialog_utils::*;
