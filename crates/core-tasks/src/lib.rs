//! Build and run user snippets out of process with a selectable toolchain.
//!
//! Every failure carries a stable numeric code (see [`TaskErrorKind::code`]) so a front end can
//! react without parsing messages. A build that ran and failed is *not* an error: it comes back as
//! a [`TaskResult`] with `success == false` and the compiler output attached.

mod envelope;
mod error;
mod runner;
mod scaffold;
mod task;
mod toolchains;

pub use envelope::{from_envelope, to_envelope};
pub use error::{TaskError, TaskErrorKind};
pub use runner::{OutputSink, RunOutcome, TaskCancel, TaskHandle, TaskRunner, run_executable};
pub use scaffold::{BIN_TARGET_NAME, create_cargo_scaffold, parse_dep_comments};
pub use task::{Task, TaskKind, TaskOutput, TaskResult};
pub use toolchains::{
    HOST_TRIPLE, ToolchainChannel, ToolchainInfo, list_toolchains, list_toolchains_in,
    rustup_home,
};
