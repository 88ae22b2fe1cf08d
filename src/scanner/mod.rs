//! Path scanner: directory walker, exclude rules, placeholder probe, explicit file lists.

pub mod availability;
pub mod file_list;
pub mod ignore;
pub mod walker;
