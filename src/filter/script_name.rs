//! Logical script names derived from configured file references.
//!
//! Uploaded script files are named `<category>_script_<entry point>.<ext>`.
//! The file's stem is the import name and the text after the last
//! `_script_` marker is the function to call.

use std::fmt;

/// Marker separating the category prefix from the entry-point name.
pub const SCRIPT_METHOD_MARKER: &str = "_script_";

/// Import name and entry-point name of a configured script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptName {
    logical: String,
    entry_point: String,
}

impl ScriptName {
    /// Derive a script name from a file reference such as
    /// `/usr/local/data/scripts/MyCat_script_transform.py`.
    ///
    /// Any leading path is dropped and a trailing `.{extension}` removed.
    /// Without a marker the whole stem doubles as the entry point. Returns
    /// `None` for references with no file name.
    pub fn from_file_reference(reference: &str, extension: &str) -> Option<Self> {
        let file = reference.rsplit('/').next().unwrap_or(reference).trim();
        let suffix = format!(".{}", extension);
        let stem = file.strip_suffix(suffix.as_str()).unwrap_or(file);
        if stem.is_empty() {
            return None;
        }

        let entry_point = match stem.rfind(SCRIPT_METHOD_MARKER) {
            Some(pos) if pos + SCRIPT_METHOD_MARKER.len() < stem.len() => {
                &stem[pos + SCRIPT_METHOD_MARKER.len()..]
            }
            _ => stem,
        };

        Some(Self {
            logical: stem.to_string(),
            entry_point: entry_point.to_string(),
        })
    }

    /// Name the script unit is imported under.
    pub fn logical(&self) -> &str {
        &self.logical
    }

    /// Name of the transform function inside the unit.
    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }
}

impl fmt::Display for ScriptName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.logical)
    }
}
