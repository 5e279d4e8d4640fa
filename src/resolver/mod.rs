//! Signature eligibility resolution.

pub mod eligibility;

pub use eligibility::{
    applicable_requirements, can_sign, is_fully_signed, list_pending_work,
};
