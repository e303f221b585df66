//! Production mail server binding.

mod soap;

pub use soap::{
    connect, message_to_wire, saved_draft_from_wire, search_results_from_wire, search_to_wire,
};
