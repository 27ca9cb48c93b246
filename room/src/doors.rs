//! The room's door registry: a named external executable the room may
//! expose to visitors. Door *execution* is out of scope here; this is
//! the thin advertised-doors list the control client reports in
//! `Register`.

use std::path::Path;

use unn_common::room::DoorName;

#[derive(Clone, Debug, Default)]
pub struct DoorRegistry {
    doors: Vec<DoorName>,
}

impl DoorRegistry {
    /// Scan `dir` for executable entries and advertise their file names as
    /// door names; a missing or unreadable directory yields an empty
    /// registry rather than an error, since doors are optional.
    pub fn scan(dir: Option<&Path>) -> Self {
        let Some(dir) = dir else {
            return Self::default();
        };
        let Ok(entries) = std::fs::read_dir(dir) else {
            tracing::warn!(dir = %dir.display(), "doors directory unreadable, advertising no doors");
            return Self::default();
        };

        let doors = entries
            .filter_map(Result::ok)
            .filter(|entry| is_executable(&entry.path()))
            .filter_map(|entry| entry.file_name().into_string().ok())
            .map(DoorName::from)
            .collect();

        Self { doors }
    }

    pub fn names(&self) -> Vec<DoorName> {
        self.doors.clone()
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    std::fs::metadata(path).map(|m| m.is_file()).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_directory_yields_no_doors() {
        let registry = DoorRegistry::scan(Some(Path::new("/nonexistent/unn-doors-test")));
        assert!(registry.names().is_empty());
    }

    #[test]
    fn none_directory_yields_no_doors() {
        let registry = DoorRegistry::scan(None);
        assert!(registry.names().is_empty());
    }
}
