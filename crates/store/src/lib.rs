//! Persistence for the CRM.
//!
//! `MemoryStore` keeps guests, bookings, visits, settings and broadcasts in
//! DashMap tables behind the `crm_core::repository` traits. A SQL backend can
//! be swapped in behind the same traits.

pub mod memory;

pub use memory::MemoryStore;
