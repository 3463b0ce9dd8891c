//! Resilient HTTP streaming for live internet radio.
//!
//! ```text
//!              ┌───────────────────────────────────────────────┐
//!              │                 StreamSession                 │
//!              │                                               │
//!  Tuner ─────►│  resolve ──► open ──► read ──► SessionEvent ──┼──► consumer
//!              │   (.pls)      ▲         │                     │
//!              │               │         ▼ LoadError           │
//!              │            sleep ◄── classify + RetryPolicy   │
//!              │                          │ fatal              │
//!              │                          └──► Failed ─────────┼──► consumer
//!              └───────────────────────────────────────────────┘
//!
//!  CachingSource ──► InfiniteLengthAdapter ──► HttpStreamSource ──► HttpClient
//! ```
pub mod buffer;
pub mod cache;
pub mod classify;
pub mod config;
pub mod error;
pub mod load_error;
pub mod playlist;
pub mod retry;
pub mod session;
pub mod sniff;
pub mod source;
pub mod tuner;
pub mod util;

pub use buffer::{BufferPlan, LoadControl};
pub use classify::{classify, ErrorClass};
pub use config::OnairConfig;
pub use error::{OnairError, OnairResult, OpenError, ReadError};
pub use load_error::{DataType, ErrorKind, LoadError, LoadErrorInfo};
pub use retry::{RetryDecision, RetryPolicy};
pub use session::{SessionEvent, StreamSession};
pub use source::{LengthHint, StreamRequest, StreamSource};
pub use tuner::Tuner;
pub use util::http::HttpClient;
