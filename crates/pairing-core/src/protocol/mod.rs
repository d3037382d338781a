//! Wire protocol: the events clients and broker exchange, and the JSON
//! envelope they travel in.
//!
//! ```text
//! {"event":"register-display"}
//! {"event":"connect-to-display","data":"482913"}
//! {"event":"send-credentials","data":{"user":"a","pass":"b"}}
//! ```
//!
//! - **`messages`** – typed [`ClientEvent`]/[`ServerEvent`] enums.
//! - **`codec`** – envelope parsing and the [`EventNames`] vocabulary, which
//!   derives role-bearing event names from a configurable display label.
//!
//! [`ClientEvent`]: messages::ClientEvent
//! [`ServerEvent`]: messages::ServerEvent
//! [`EventNames`]: codec::EventNames

pub mod codec;
pub mod messages;
