//! Node id translation
//!
//! Simulators hand over one-based ids offset by their population base; the
//! container stores zero-based ids relative to the population. Setting
//! `LIBSONATA_ZERO_BASED_GIDS` (to any value) declares the inputs already
//! zero-based and disables the translation.

use crate::error::{Error, Result};

/// Environment variable that declares incoming node ids zero-based
pub const ZERO_BASED_GIDS_ENV: &str = "LIBSONATA_ZERO_BASED_GIDS";

/// Translate node ids in place for writing.
///
/// With the default one-based convention every id maps to
/// `id - population_offset - 1`; an id of zero (or any id at or below the
/// offset) means the caller declared one-based inputs but handed zero-based
/// ones, which is fatal.
pub fn convert_gids(node_ids: &mut [u64], population_offset: u64) -> Result<()> {
    if std::env::var_os(ZERO_BASED_GIDS_ENV).is_some() {
        return Ok(());
    }
    for id in node_ids.iter_mut() {
        *id = id
            .checked_sub(population_offset + 1)
            .ok_or(Error::GidUnderflow {
                node_id: *id,
                population_offset,
            })?;
    }
    Ok(())
}
