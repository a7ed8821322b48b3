//! The driving loop thread and the handles used to control it.

mod control;
mod frame;
mod handle;
mod pubsub;
mod pump;
mod runner;
mod state;
mod types;

pub use frame::{FrameCarry, apply_fade};
pub use handle::{EventSender, Runtime, RuntimeHandle};
pub use pump::EventPump;
pub use types::{
    EVENT_QUEUE_CAPACITY, EventDispatcher, LoopEvent, RuntimeConfig, RuntimeError,
    RuntimeEventSender, RuntimeNotification,
};
