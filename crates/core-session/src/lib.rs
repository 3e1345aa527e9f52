//! Session façade between a UI front end and an out-of-process editing engine.
//!
//! The UI calls [`Session`] methods and reads its cache; the engine talks back through an
//! [`EngineLink`] whose inbound frames are queued on a [`SessionHandle`]. Nothing touches session
//! state except the task that owns the `Session`.

mod error;
mod handle;
mod link;
mod session;
mod wire;

pub use error::BridgeError;
pub use handle::{FrontendEvent, FrontendEvents, Rect, SessionHandle};
pub use link::{ChannelLink, EngineLink, ProcessLink};
pub use session::{Session, StyledLine};
