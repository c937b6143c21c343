use lazy_static::lazy_static;
use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

const TEAM_SECTION: &str = "[/Script/ShadowTrackerExtra.FCustomTeamLogoAndColor]";

lazy_static! {
    static ref TEAM_TUPLE: Regex =
        Regex::new(r"TeamLogoAndColor=\(TeamNo=(\d+),TeamName=([^,]+),TeamLogoPath=([^,)]+)")
            .expect("team tuple pattern");
}

/// Static lookup of configured team identities, parsed once at startup from
/// the server's INI file. The engine only ever asks two questions of it:
/// the display name for a numeric id, and the logo URL for a display name.
#[derive(Debug, Clone, Default)]
pub struct TeamDirectory {
    name_by_id: BTreeMap<String, String>,
    logo_by_lower_name: HashMap<String, String>,
    logo_base_url: String,
    default_team_logo: String,
    default_player_photo: String,
}

impl TeamDirectory {
    pub fn empty(
        logo_base_url: String,
        default_team_logo: String,
        default_player_photo: String,
    ) -> Self {
        Self {
            logo_base_url,
            default_team_logo,
            default_player_photo,
            ..Self::default()
        }
    }

    /// Reads the team config. A missing or unreadable file yields an empty
    /// directory with a warning; team identity is cosmetic, never fatal.
    pub fn load(
        path: &Path,
        logo_base_url: String,
        default_team_logo: String,
        default_player_photo: String,
    ) -> Self {
        let mut directory = Self::empty(logo_base_url, default_team_logo, default_player_photo);

        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(error) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %error,
                    "team config not readable, continuing with defaults"
                );
                return directory;
            }
        };

        let mut in_section = false;
        for line in contents.lines() {
            let trimmed = line.trim();
            if trimmed.starts_with('[') {
                in_section = trimmed == TEAM_SECTION;
                continue;
            }
            if !in_section {
                continue;
            }
            if let Some(captures) = TEAM_TUPLE.captures(trimmed) {
                let team_id = captures[1].trim_start_matches('0');
                let team_id = if team_id.is_empty() { "0" } else { team_id };
                let name = captures[2].trim().to_string();
                let logo_path = captures[3].trim();

                let logo_url = logo_path
                    .rsplit(['/', '\\'])
                    .next()
                    .filter(|file_name| !file_name.is_empty())
                    .map(|file_name| format!("{}{}", directory.logo_base_url, file_name))
                    .unwrap_or_else(|| directory.default_team_logo.clone());

                directory
                    .logo_by_lower_name
                    .insert(name.to_lowercase(), logo_url);
                directory.name_by_id.insert(team_id.to_string(), name);
            }
        }

        tracing::info!(
            path = %path.display(),
            teams = directory.name_by_id.len(),
            "loaded team directory"
        );
        directory
    }

    pub fn resolve_name(&self, team_id: &str) -> Option<&str> {
        self.name_by_id.get(team_id).map(String::as_str)
    }

    /// Logo URL for a team name, case-insensitively, falling back to the
    /// configured default.
    pub fn resolve_logo(&self, team_name: &str) -> String {
        self.logo_by_lower_name
            .get(&team_name.to_lowercase())
            .cloned()
            .unwrap_or_else(|| self.default_team_logo.clone())
    }

    pub fn default_player_photo(&self) -> &str {
        &self.default_player_photo
    }

    pub fn len(&self) -> usize {
        self.name_by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.name_by_id.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::TeamDirectory;
    use std::io::Write;

    const SAMPLE: &str = "\
[/Script/SomeOther.Section]\n\
TeamLogoAndColor=(TeamNo=9,TeamName=Ignored,TeamLogoPath=ignored.png)\n\
[/Script/ShadowTrackerExtra.FCustomTeamLogoAndColor]\n\
TeamLogoAndColor=(TeamNo=1,TeamName=Alpha,TeamLogoPath=logos/alpha.png,TeamColor=(R=1))\n\
TeamLogoAndColor=(TeamNo=02,TeamName=Bravo Squad,TeamLogoPath=bravo.png)\n\
not a tuple line\n";

    fn directory_from(contents: &str) -> TeamDirectory {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(contents.as_bytes()).expect("write sample");
        TeamDirectory::load(
            file.path(),
            "/assets/".to_string(),
            "/assets/default.png".to_string(),
            "/assets/player.png".to_string(),
        )
    }

    #[test]
    fn parses_only_the_logo_section() {
        let directory = directory_from(SAMPLE);
        assert_eq!(directory.len(), 2);
        assert_eq!(directory.resolve_name("1"), Some("Alpha"));
        assert_eq!(directory.resolve_name("9"), None);
    }

    #[test]
    fn numeric_ids_are_normalized() {
        let directory = directory_from(SAMPLE);
        assert_eq!(
            directory.resolve_name("2"),
            Some("Bravo Squad"),
            "Leading zeros in TeamNo should not matter"
        );
    }

    #[test]
    fn logo_lookup_is_case_insensitive_with_default() {
        let directory = directory_from(SAMPLE);
        assert_eq!(directory.resolve_logo("ALPHA"), "/assets/alpha.png");
        assert_eq!(directory.resolve_logo("Unknown"), "/assets/default.png");
    }

    #[test]
    fn missing_file_yields_empty_directory() {
        let directory = TeamDirectory::load(
            std::path::Path::new("/definitely/not/here.ini"),
            String::new(),
            "default.png".to_string(),
            "player.png".to_string(),
        );
        assert!(directory.is_empty());
        assert_eq!(directory.resolve_logo("Anyone"), "default.png");
    }
}
