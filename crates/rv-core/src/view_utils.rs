//! Small display helpers shared by the views

use serde::{Deserialize, Serialize};

const WINDOWS_ARCHIVE_PREFIX: &str = r"\\isis\inst$\";
const LINUX_ARCHIVE_PREFIX: &str = "/isis/";

/// Who submitted a run, decoded from the `started_by` column.
///
/// Negative and zero ids are control codes rather than users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StartedBy {
    Unknown,
    DevelopmentTeam,
    AutoreductionService,
    User { id: i64 },
}

impl StartedBy {
    pub fn from_id(started_by: Option<i64>) -> Self {
        match started_by {
            None => StartedBy::Unknown,
            Some(id) if id < -1 => StartedBy::Unknown,
            Some(-1) => StartedBy::DevelopmentTeam,
            Some(0) => StartedBy::AutoreductionService,
            Some(id) => StartedBy::User { id },
        }
    }

    /// Fixed display name for control codes; users need a lookup.
    pub fn fixed_name(self) -> Option<&'static str> {
        match self {
            StartedBy::DevelopmentTeam => Some("Development team"),
            StartedBy::AutoreductionService => Some("Autoreduction service"),
            StartedBy::Unknown | StartedBy::User { .. } => None,
        }
    }
}

/// Convert an archive path from its Windows share form to the Linux mount.
pub fn windows_to_linux_path(path: &str) -> String {
    path.replace(WINDOWS_ARCHIVE_PREFIX, LINUX_ARCHIVE_PREFIX)
        .replace('\\', "/")
}

/// Convert an archive path from the Linux mount to its Windows share form.
pub fn linux_to_windows_path(path: &str) -> String {
    path.replace(LINUX_ARCHIVE_PREFIX, WINDOWS_ARCHIVE_PREFIX)
        .replace('/', "\\")
}

/// Link into the data analysis site for a reduction output directory.
///
/// Locations outside `/instrument/` have no counterpart there and give an
/// empty string.
pub fn data_analysis_url(base_url: &str, reduction_location: &str) -> String {
    match reduction_location.split_once("/instrument/") {
        Some((_, rest)) => format!("{}{}", base_url, rest),
        None => String::new(),
    }
}

/// Path display style selected with `?path_type=`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathType {
    #[default]
    Linux,
    Windows,
}

impl PathType {
    pub fn parse_lenient(value: Option<&str>) -> Self {
        match value {
            Some("windows") => PathType::Windows,
            _ => PathType::Linux,
        }
    }

    pub fn convert(self, path: &str) -> String {
        match self {
            PathType::Linux => windows_to_linux_path(path),
            PathType::Windows => linux_to_windows_path(path),
        }
    }

    /// The style the toggle link on the page should switch to
    pub fn toggled(self) -> Self {
        match self {
            PathType::Linux => PathType::Windows,
            PathType::Windows => PathType::Linux,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_started_by_control_codes() {
        assert_eq!(StartedBy::from_id(Some(-1)).fixed_name(), Some("Development team"));
        assert_eq!(StartedBy::from_id(Some(0)).fixed_name(), Some("Autoreduction service"));
        assert_eq!(StartedBy::from_id(Some(-5)), StartedBy::Unknown);
        assert_eq!(StartedBy::from_id(None), StartedBy::Unknown);
        assert_eq!(StartedBy::from_id(Some(100)), StartedBy::User { id: 100 });
    }

    #[test]
    fn test_path_conversion() {
        assert_eq!(
            windows_to_linux_path(r"\\isis\inst$\NDXMARI\Instrument\data\MAR25581.nxs"),
            "/isis/NDXMARI/Instrument/data/MAR25581.nxs"
        );
        assert_eq!(
            linux_to_windows_path("/isis/NDXMARI/Instrument/data/MAR25581.nxs"),
            r"\\isis\inst$\NDXMARI\Instrument\data\MAR25581.nxs"
        );
    }

    #[test]
    fn test_data_analysis_url() {
        assert_eq!(data_analysis_url("https://da.example/", "apples"), "");
        let url = data_analysis_url(
            "https://da.example/",
            "/instrument/TestInstrument/RBNumber/RB1234567/autoreduced",
        );
        assert_eq!(
            url,
            "https://da.example/TestInstrument/RBNumber/RB1234567/autoreduced"
        );
    }

    #[test]
    fn test_path_type_toggle() {
        assert_eq!(PathType::parse_lenient(None), PathType::Linux);
        assert_eq!(PathType::parse_lenient(Some("windows")).toggled(), PathType::Linux);
    }
}
