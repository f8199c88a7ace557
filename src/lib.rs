pub mod circular;
pub mod error;
pub mod io;
pub mod processing;
pub mod ranking;

pub use error::{CurateError, Result};

/// Stand-in for `-` and `_` inside a sample id while it is glued to a header.
pub const SAMPLE_PLACEHOLDER: char = '~';

/// Delimiter between the fields of a record id and of a canonical id.
pub const ID_DELIMITER: char = '_';

/// Replace hyphens and underscores in `sample_id` with [`SAMPLE_PLACEHOLDER`]
/// so the whole id survives a split on [`ID_DELIMITER`].
pub fn mask_sample_id(sample_id: &str) -> String {
    sample_id
        .chars()
        .map(|c| match c {
            '-' | '_' => SAMPLE_PLACEHOLDER,
            c => c,
        })
        .collect()
}

/// Undo [`mask_sample_id`] for output. Placeholders come back as the id
/// delimiter, so `s-1` and `s_1` are both written as `s_1`.
pub fn restore_sample_id(masked: &str) -> String {
    masked.replace(SAMPLE_PLACEHOLDER, "_")
}

/// Derive a sample id from an assembly file name.
///
/// A trailing `.gz` is ignored. Assembler stage outputs such as `S12-6.fa`
/// (name, hyphen, stage digit, dot) are cut at the hyphen; anything else
/// loses its last extension. Returns `None` when no usable name remains.
pub fn sample_id_from_path(path: &std::path::Path) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    let name = name.strip_suffix(".gz").unwrap_or(name);

    let stage_cut = name
        .as_bytes()
        .windows(3)
        .position(|w| w[0] == b'-' && w[1].is_ascii_digit() && w[2] == b'.');

    let stem = match (stage_cut, name.rfind('.')) {
        (Some(i), _) => &name[..i],
        (None, Some(i)) if i > 0 => &name[..i],
        _ => name,
    };

    if stem.is_empty() {
        None
    } else {
        Some(stem.to_string())
    }
}
