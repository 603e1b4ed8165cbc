//! RFC 3261 transaction and dialog layers for the sipwire stack.
//!
//! - [`transaction`]: the four transaction state machines (INVITE and
//!   non-INVITE, client and server) and the [`TransactionManager`] that
//!   routes transport messages to them
//! - [`dialog`]: the [`Dialog`] model, its identity and state
//! - [`manager`]: the [`DialogManager`], which creates dialogs from
//!   transactions and keeps them up to date
//!
//! Both layers report to the application through channels:
//! [`TransactionEvent`]s from the transaction manager (every logical
//! request, response and timeout exactly once) and [`DialogEvent`]s from
//! the dialog manager.

pub mod dialog;
pub mod errors;
pub mod manager;
pub mod transaction;

pub use dialog::{Dialog, DialogId, DialogState};
pub use errors::{DialogError, DialogResult};
pub use manager::{DialogEvent, DialogManager};
pub use transaction::{
    TimerSettings, TransactionEvent, TransactionKey, TransactionKind, TransactionManager, TransactionState,
};

pub mod prelude {
    pub use crate::dialog::{Dialog, DialogId, DialogState};
    pub use crate::errors::{DialogError, DialogResult};
    pub use crate::manager::{DialogEvent, DialogManager};
    pub use crate::transaction::utils::{create_request, create_response, generate_branch, generate_tag};
    pub use crate::transaction::{
        TimerSettings, TransactionEvent, TransactionKey, TransactionKind, TransactionManager, TransactionState,
    };
}
