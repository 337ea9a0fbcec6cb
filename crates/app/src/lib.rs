//! Session engine, storefront backend adapter and order desk built on the `quire` cart engine.

pub mod clock;
pub mod collaborators;
pub mod config;
pub mod context;
pub mod errors;
pub mod http;
pub mod observability;
pub mod orders;
pub mod session;

#[cfg(test)]
mod test_helpers;
