//! Service layer for tracker use-cases.
//!
//! # Responsibility
//! - Orchestrate repository calls into transactional use-cases.
//! - Resolve human references into stable identities.

pub mod resolver;
pub mod task_service;
