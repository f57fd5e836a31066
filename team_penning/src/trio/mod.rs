//! Trio formation and lifecycle.
//!
//! A trio is always created together with its three membership links, so a
//! stored trio never has fewer or more than three members. Totals are
//! computed from the members when the trio is built.
//!
//! ```no_run
//! use std::sync::Arc;
//! use chrono::NaiveDate;
//! use team_penning::db::InMemoryStore;
//! use team_penning::trio::TrioManager;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(InMemoryStore::new());
//! let manager = TrioManager::new(store);
//! let on = NaiveDate::from_ymd_opt(2024, 7, 1).unwrap();
//! let trio = manager.create_trio(1, 2, &[10, 11, 12], on).await?;
//! println!("Trio {} formed", trio.number);
//! # Ok(())
//! # }
//! ```

pub mod errors;
pub mod manager;
pub mod models;

pub use errors::{TrioError, TrioResult};
pub use manager::TrioManager;
pub use models::{
    CupType, EventId, NewTrio, Renumbering, RunTemplate, Trio, TrioId, TrioMember, TrioRemoval,
    TrioStatus, member_links,
};
