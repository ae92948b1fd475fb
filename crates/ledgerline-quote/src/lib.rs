//! Ledgerline quote bounded context.
//!
//! A quote is opened for a customer, collects coverages, is priced and is
//! finally bound into a policy. Pricing and underwriting rules are
//! placeholders; the context exists to drive the aggregate engine end to end,
//! including events whose names changed since they were first written.

pub mod application;
pub mod domain;
