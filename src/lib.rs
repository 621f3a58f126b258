//! Migrates a legacy hierarchical media catalog into the normalized target schema.

pub mod logging;
pub mod migrate;
pub mod store;

pub mod util {
    pub mod db;
    pub mod env;
}
