//! The built-in operation library.
//!
//! Every kind here shares the contract in [`crate::graph::operation`] and
//! can be constructed from a parameter record through the registry.

pub mod blur;
pub mod channels;
pub mod color_balance;
pub mod mix;
pub mod registry;
pub mod source;
pub mod tonemap;

use registry::OperationRegistry;

/// Register every built-in operation kind.
pub fn register_all(registry: &mut OperationRegistry) {
    source::register(registry);
    color_balance::register(registry);
    tonemap::register(registry);
    channels::register(registry);
    blur::register(registry);
    mix::register(registry);
}
