//! Clinic Billing Service - bills, payment reconciliation, audit trail and
//! daily sales analytics for clinic visits.

pub mod billing;
pub mod config;
pub mod dtos;
pub mod error;
pub mod handlers;
pub mod models;
pub mod services;
pub mod startup;
