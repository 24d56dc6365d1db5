//! Costing engine library crate.
//!
//! This crate prices research projects from staff and non-staff cost
//! lines against institutional rate tables, and moves projects through
//! an approval lifecycle.  External applications may depend on the
//! `costing_engine` crate and drive [`service::CostingService`]
//! directly or embed the API via `api::build_router`.

pub mod api;
pub mod approval;
pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod models;
pub mod pricing;
pub mod rates;
pub mod service;
pub mod store;
